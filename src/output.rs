//! Clipboard/paste collaborator.
//!
//! Consumes `TranscriptReady` events from the binary's event loop: copies the
//! text to the clipboard and optionally injects the platform paste chord into
//! whatever has focus. The core state machine never calls this directly.

use anyhow::{anyhow, Context, Result};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use std::time::Duration;
use tracing::debug;

use crate::config::OutputConfig;

/// Delivers a finished transcript to the focused application.
#[derive(Debug, Clone)]
pub struct TextDelivery {
    copy_to_clipboard: bool,
    auto_paste: bool,
    /// Wait between clipboard write and paste injection, so the clipboard
    /// owner change settles and the user has released the hotkey modifiers.
    paste_delay: Duration,
}

impl TextDelivery {
    /// Build from config with the standard settle delay.
    #[must_use]
    pub const fn from_config(config: &OutputConfig) -> Self {
        Self {
            copy_to_clipboard: config.copy_to_clipboard,
            auto_paste: config.auto_paste,
            paste_delay: Duration::from_millis(150),
        }
    }

    /// Copy and/or paste `text` per config. Empty text is a no-op.
    ///
    /// # Errors
    /// Returns error if the clipboard cannot be opened or the paste chord
    /// cannot be injected; the transcript stays in the clipboard when only
    /// the paste step fails.
    pub fn deliver(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        if self.copy_to_clipboard {
            let mut clipboard = arboard::Clipboard::new().context("failed to open clipboard")?;
            clipboard
                .set_text(text.to_owned())
                .context("failed to copy transcript to clipboard")?;
            debug!(chars = text.chars().count(), "transcript copied to clipboard");
        }

        if self.auto_paste {
            std::thread::sleep(self.paste_delay);
            simulate_paste()?;
            debug!("paste chord injected");
        }

        Ok(())
    }
}

fn simulate_paste() -> Result<()> {
    let mut enigo =
        Enigo::new(&Settings::default()).map_err(|e| anyhow!("failed to create injector: {e}"))?;

    let modifier = if cfg!(target_os = "macos") {
        Key::Meta
    } else {
        Key::Control
    };

    enigo
        .key(modifier, Direction::Press)
        .map_err(|e| anyhow!("failed to press paste modifier: {e}"))?;
    let result = enigo
        .key(Key::Unicode('v'), Direction::Click)
        .map_err(|e| anyhow!("failed to press V: {e}"));
    // Always release the modifier, even when the V press failed.
    enigo
        .key(modifier, Direction::Release)
        .map_err(|e| anyhow!("failed to release paste modifier: {e}"))?;
    result?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;

    #[test]
    fn test_empty_text_is_a_no_op() {
        let delivery = TextDelivery::from_config(&OutputConfig {
            copy_to_clipboard: true,
            auto_paste: true,
        });
        assert!(delivery.deliver("").is_ok());
    }

    #[test]
    fn test_disabled_outputs_do_nothing() {
        let delivery = TextDelivery::from_config(&OutputConfig {
            copy_to_clipboard: false,
            auto_paste: false,
        });
        assert!(delivery.deliver("hello").is_ok());
    }

    #[test]
    #[ignore = "requires a display server and clipboard access"]
    fn test_clipboard_round_trip() {
        let delivery = TextDelivery::from_config(&OutputConfig {
            copy_to_clipboard: true,
            auto_paste: false,
        });
        delivery.deliver("vox test").unwrap();

        let mut clipboard = arboard::Clipboard::new().unwrap();
        assert_eq!(clipboard.get_text().unwrap(), "vox test");
    }
}
