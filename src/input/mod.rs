/// Global hotkey registration and debouncing
pub mod hotkey;

pub use hotkey::HotkeyManager;
