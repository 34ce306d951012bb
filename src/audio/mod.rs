/// Block accumulation across the capture/transcribe handoff
pub mod buffer;
/// One recording's stream lifetime and stop conditions
pub mod capture;
/// Input device enumeration and stream backends
pub mod device;
/// Normalized loudness metering
pub mod level;

pub use buffer::BlockBuffer;
pub use capture::{CaptureConfig, CaptureHooks, CaptureSession};
pub use device::{CaptureError, CpalBackend, InputBackend, InputDeviceInfo, StreamFormat};
pub use level::LevelMeter;
