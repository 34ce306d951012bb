//! Input-device collaborator: enumeration plus stream opening.
//!
//! [`InputBackend`] is the seam between the capture session and the OS audio
//! stack; tests substitute a scripted implementation. [`CpalBackend`] is the
//! production implementation. A cpal stream is not `Send`, so each open
//! stream lives on its own thread and is stopped through a channel; the
//! returned handle is `Send` and releases the device on drop.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from the audio-device collaborator.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The selected microphone cannot be opened: in use, disconnected, or not
    /// found under the configured name.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device cannot deliver the requested sample rate / channel layout.
    #[error("unsupported capture format: {0}")]
    UnsupportedFormat(String),

    /// The stream could not be built or started.
    #[error("audio stream error: {0}")]
    Stream(String),
}

/// One selectable input device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeviceInfo {
    /// Stable identifier. cpal identifies devices by name, so this mirrors
    /// `name`; kept separate so a backend with real ids can differ.
    pub id: String,
    /// Human-readable device name.
    pub name: String,
}

/// Requested capture format. Blocks are delivered as signed 16-bit mono
/// samples at this rate; no resampling is performed downstream.
#[derive(Debug, Clone, Copy)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
}

/// Per-block delivery callback. Must not block: it runs on (or directly
/// downstream of) the real-time audio callback.
pub type BlockCallback = Box<dyn FnMut(&[i16]) + Send + 'static>;

/// Stream-fault callback. A fault after a successful open must be reported
/// here, never raised out of the audio callback.
pub type FaultCallback = Box<dyn FnMut(String) + Send + 'static>;

/// An open input stream. Dropping the handle stops the stream and releases
/// the device.
pub trait InputStreamHandle: Send {}

/// Abstraction over the OS audio input stack.
pub trait InputBackend: Send + Sync {
    /// Enumerate input-capable devices.
    ///
    /// # Errors
    /// Returns error if the host cannot enumerate devices.
    fn list_input_devices(&self) -> Result<Vec<InputDeviceInfo>, CaptureError>;

    /// Open `device` (empty string = system default) at `format`, delivering
    /// blocks to `on_block` and faults to `on_fault` until the returned
    /// handle is dropped.
    ///
    /// # Errors
    /// Returns [`CaptureError::DeviceUnavailable`] if the device cannot be
    /// acquired, [`CaptureError::UnsupportedFormat`] if it cannot satisfy
    /// `format`.
    fn open(
        &self,
        device: &str,
        format: StreamFormat,
        on_block: BlockCallback,
        on_fault: FaultCallback,
    ) -> Result<Box<dyn InputStreamHandle>, CaptureError>;
}

/// Production backend on top of cpal.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    /// Create a backend using the default cpal host.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn resolve_device(name: &str) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();

        if name.is_empty() {
            return host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable("no input device available".to_owned()));
        }

        let mut devices = host
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        devices
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no input device named '{name}'")))
    }

    fn pick_config(
        device: &cpal::Device,
        format: StreamFormat,
    ) -> Result<cpal::SupportedStreamConfig, CaptureError> {
        let ranges = device
            .supported_input_configs()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        let rate = cpal::SampleRate(format.sample_rate);
        let mut fallback = None;

        for range in ranges {
            if range.channels() != format.channels
                || range.min_sample_rate() > rate
                || range.max_sample_rate() < rate
            {
                continue;
            }
            match range.sample_format() {
                // Native i16 wins; f32 is converted in the callback.
                cpal::SampleFormat::I16 => return Ok(range.with_sample_rate(rate)),
                cpal::SampleFormat::F32 => fallback = Some(range.with_sample_rate(rate)),
                _ => {}
            }
        }

        fallback.ok_or_else(|| {
            CaptureError::UnsupportedFormat(format!(
                "device does not support {} Hz {}-channel capture in i16 or f32",
                format.sample_rate, format.channels
            ))
        })
    }
}

impl InputBackend for CpalBackend {
    fn list_input_devices(&self) -> Result<Vec<InputDeviceInfo>, CaptureError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;

        Ok(devices
            .filter_map(|d| d.name().ok())
            .map(|name| InputDeviceInfo {
                id: name.clone(),
                name,
            })
            .collect())
    }

    fn open(
        &self,
        device: &str,
        format: StreamFormat,
        mut on_block: BlockCallback,
        mut on_fault: FaultCallback,
    ) -> Result<Box<dyn InputStreamHandle>, CaptureError> {
        let device_name = device.to_owned();
        let (ready_tx, ready_rx) = bounded::<Result<(), CaptureError>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        // The stream must be created, owned, and dropped on one thread.
        let thread = std::thread::Builder::new()
            .name("audio-stream".to_owned())
            .spawn(move || {
                let result = (|| {
                    let device = Self::resolve_device(&device_name)?;
                    let name = device.name().unwrap_or_else(|_| "unknown".to_owned());
                    let supported = Self::pick_config(&device, format)?;
                    let sample_format = supported.sample_format();
                    let config: cpal::StreamConfig = supported.into();

                    info!(
                        device = %name,
                        rate = config.sample_rate.0,
                        channels = config.channels,
                        format = ?sample_format,
                        "opening input stream"
                    );

                    let stream = match sample_format {
                        cpal::SampleFormat::I16 => device
                            .build_input_stream(
                                &config,
                                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                                    on_block(data);
                                },
                                move |err| {
                                    warn!("audio stream fault: {err}");
                                    on_fault(err.to_string());
                                },
                                None,
                            )
                            .map_err(|e| CaptureError::Stream(e.to_string()))?,
                        cpal::SampleFormat::F32 => {
                            let mut scratch: Vec<i16> = Vec::new();
                            device
                                .build_input_stream(
                                    &config,
                                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                                        scratch.clear();
                                        scratch.extend(data.iter().map(|&s| f32_to_i16(s)));
                                        on_block(&scratch);
                                    },
                                    move |err| {
                                        warn!("audio stream fault: {err}");
                                        on_fault(err.to_string());
                                    },
                                    None,
                                )
                                .map_err(|e| CaptureError::Stream(e.to_string()))?
                        }
                        other => {
                            return Err(CaptureError::UnsupportedFormat(format!(
                                "unsupported sample format {other:?}"
                            )))
                        }
                    };

                    stream
                        .play()
                        .map_err(|e| CaptureError::Stream(e.to_string()))?;
                    Ok(stream)
                })();

                match result {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Park until the handle drops, keeping the stream alive.
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| CaptureError::Stream(format!("failed to spawn stream thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStreamHandle {
                stop_tx,
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::Stream("stream thread exited before ready".to_owned()))
            }
        }
    }
}

struct CpalStreamHandle {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl InputStreamHandle for CpalStreamHandle {}

impl Drop for CpalStreamHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Convert one f32 sample in [-1, 1] to i16 full scale.
#[allow(clippy::cast_possible_truncation)]
fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_conversion_maps_full_scale() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), -i16::MAX);
    }

    #[test]
    fn test_f32_conversion_clamps_out_of_range() {
        assert_eq!(f32_to_i16(2.5), i16::MAX);
        assert_eq!(f32_to_i16(-3.0), -i16::MAX);
    }

    #[test]
    fn test_f32_conversion_is_monotonic_around_zero() {
        assert!(f32_to_i16(0.5) > f32_to_i16(0.1));
        assert!(f32_to_i16(-0.5) < f32_to_i16(-0.1));
    }

    // Hardware-dependent tests (run with: cargo test -- --ignored)

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_list_devices_returns_at_least_default() {
        let backend = CpalBackend::new();
        let devices = backend.list_input_devices().unwrap();
        assert!(!devices.is_empty());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_open_unknown_device_is_unavailable() {
        let backend = CpalBackend::new();
        let result = backend.open(
            "no-such-device-name",
            StreamFormat {
                sample_rate: 16000,
                channels: 1,
            },
            Box::new(|_| {}),
            Box::new(|_| {}),
        );
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    }
}
