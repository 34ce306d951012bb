//! Global hotkey collaborator.
//!
//! Registers the configured chord and turns raw key events into debounced
//! toggle triggers. Key-repeat fires press events continuously while the key
//! is held; without the debounce a single long press would toggle the
//! recorder several times.

use anyhow::{anyhow, Context, Result};
use global_hotkey::{
    hotkey::{Code, HotKey, Modifiers},
    GlobalHotKeyEvent, GlobalHotKeyManager,
};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::HotkeyConfig;

/// Minimum interval between accepted triggers.
const DEBOUNCE: Duration = Duration::from_millis(500);

/// Registered global hotkey with key-repeat debouncing.
pub struct HotkeyManager {
    manager: GlobalHotKeyManager,
    hotkey: HotKey,
    last_trigger: Mutex<Option<Instant>>,
}

impl HotkeyManager {
    /// Create and register the global hotkey from config.
    ///
    /// # Errors
    /// Returns error if the chord cannot be parsed or registered.
    pub fn new(config: &HotkeyConfig) -> Result<Self> {
        let manager = GlobalHotKeyManager::new().context("failed to create hotkey manager")?;

        let modifiers = Self::parse_modifiers(&config.modifiers)?;
        let code = Self::parse_key(&config.key)?;

        let hotkey = if modifiers.is_empty() {
            HotKey::new(None, code)
        } else {
            HotKey::new(Some(modifiers), code)
        };
        manager
            .register(hotkey)
            .context("failed to register hotkey")?;

        info!("registered hotkey: {:?} + {}", config.modifiers, config.key);

        Ok(Self {
            manager,
            hotkey,
            last_trigger: Mutex::new(None),
        })
    }

    /// Whether `event` is a fresh press of our chord. Release events, other
    /// hotkeys, and repeats inside the debounce window all return false.
    pub fn is_trigger(&self, event: &GlobalHotKeyEvent) -> bool {
        if event.id != self.hotkey.id()
            || !matches!(event.state, global_hotkey::HotKeyState::Pressed)
        {
            return false;
        }

        let mut last = self.last_trigger.lock();
        let now = Instant::now();
        if accept_trigger(*last, now, DEBOUNCE) {
            *last = Some(now);
            true
        } else {
            debug!("hotkey repeat ignored");
            false
        }
    }

    fn parse_modifiers(modifiers: &[String]) -> Result<Modifiers> {
        let mut result = Modifiers::empty();
        for modifier in modifiers {
            match modifier.as_str() {
                "Control" | "Ctrl" => result |= Modifiers::CONTROL,
                "Option" | "Alt" => result |= Modifiers::ALT,
                "Command" | "Super" => result |= Modifiers::SUPER,
                "Shift" => result |= Modifiers::SHIFT,
                _ => return Err(anyhow!("unknown modifier: {}", modifier)),
            }
        }
        Ok(result)
    }

    fn parse_key(key: &str) -> Result<Code> {
        match key {
            "A" => Ok(Code::KeyA),
            "B" => Ok(Code::KeyB),
            "C" => Ok(Code::KeyC),
            "D" => Ok(Code::KeyD),
            "E" => Ok(Code::KeyE),
            "F" => Ok(Code::KeyF),
            "G" => Ok(Code::KeyG),
            "H" => Ok(Code::KeyH),
            "I" => Ok(Code::KeyI),
            "J" => Ok(Code::KeyJ),
            "K" => Ok(Code::KeyK),
            "L" => Ok(Code::KeyL),
            "M" => Ok(Code::KeyM),
            "N" => Ok(Code::KeyN),
            "O" => Ok(Code::KeyO),
            "P" => Ok(Code::KeyP),
            "Q" => Ok(Code::KeyQ),
            "R" => Ok(Code::KeyR),
            "S" => Ok(Code::KeyS),
            "T" => Ok(Code::KeyT),
            "U" => Ok(Code::KeyU),
            "V" => Ok(Code::KeyV),
            "W" => Ok(Code::KeyW),
            "X" => Ok(Code::KeyX),
            "Y" => Ok(Code::KeyY),
            "Z" => Ok(Code::KeyZ),
            "Space" => Ok(Code::Space),
            "F1" => Ok(Code::F1),
            "F2" => Ok(Code::F2),
            "F3" => Ok(Code::F3),
            "F4" => Ok(Code::F4),
            "F5" => Ok(Code::F5),
            "F6" => Ok(Code::F6),
            "F7" => Ok(Code::F7),
            "F8" => Ok(Code::F8),
            "F9" => Ok(Code::F9),
            "F10" => Ok(Code::F10),
            "F11" => Ok(Code::F11),
            "F12" => Ok(Code::F12),
            _ => Err(anyhow!("unsupported key: {}", key)),
        }
    }
}

impl Drop for HotkeyManager {
    fn drop(&mut self) {
        if let Err(e) = self.manager.unregister(self.hotkey) {
            tracing::error!("failed to unregister hotkey: {}", e);
        }
    }
}

/// Debounce decision: accept a trigger at `now` given the previous accepted
/// trigger time.
fn accept_trigger(last: Option<Instant>, now: Instant, debounce: Duration) -> bool {
    last.is_none_or(|t| now.duration_since(t) >= debounce)
}
