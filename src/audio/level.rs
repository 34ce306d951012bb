//! Normalized loudness from a raw sample block.
//!
//! Used both for the live level display and for silence detection. The
//! calibration constant maps "full scale fraction" to level 1.0; raw
//! microphone gain differs wildly between devices, so this must stay a
//! configuration knob rather than a built-in constant.

/// Computes a normalized loudness scalar in [0, 1] from a block of samples.
#[derive(Debug, Clone, Copy)]
pub struct LevelMeter {
    /// Full-scale fraction that maps to level 1.0.
    calibration: f32,
}

impl LevelMeter {
    /// Create a meter with the given calibration constant.
    ///
    /// A calibration of 0.02 means a block whose mean absolute amplitude is
    /// 2% of full scale reads as level 1.0. Non-positive values are clamped
    /// to a small epsilon so the meter stays total.
    #[must_use]
    pub fn new(calibration: f32) -> Self {
        Self {
            calibration: calibration.max(f32::EPSILON),
        }
    }

    /// Mean absolute amplitude of `block`, normalized by the calibration
    /// constant and clamped to 1.0. Pure; empty blocks read as 0.0.
    #[must_use]
    pub fn level(&self, block: &[i16]) -> f32 {
        if block.is_empty() {
            return 0.0;
        }

        // Sum in f64: 300s of 16 kHz i16 magnitudes overflows f32 precision.
        let sum: f64 = block.iter().map(|&s| f64::from(s).abs()).sum();
        #[allow(clippy::cast_precision_loss)]
        let mean_abs = (sum / block.len() as f64) / f64::from(i16::MAX);

        #[allow(clippy::cast_possible_truncation)]
        let normalized = (mean_abs as f32) / self.calibration;
        normalized.min(1.0)
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new(0.02)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)] // Test assertions with known exact values
mod tests {
    use super::*;

    #[test]
    fn test_empty_block_is_silent() {
        let meter = LevelMeter::default();
        assert_eq!(meter.level(&[]), 0.0);
    }

    #[test]
    fn test_zero_samples_are_silent() {
        let meter = LevelMeter::default();
        assert_eq!(meter.level(&[0; 160]), 0.0);
    }

    #[test]
    fn test_full_scale_clamps_to_one() {
        let meter = LevelMeter::default();
        let block = vec![i16::MAX; 160];
        assert_eq!(meter.level(&block), 1.0);
    }

    #[test]
    fn test_negative_samples_count_as_loud() {
        let meter = LevelMeter::default();
        let positive = vec![8000_i16; 160];
        let negative = vec![-8000_i16; 160];
        assert_eq!(meter.level(&positive), meter.level(&negative));
    }

    #[test]
    fn test_level_scales_with_calibration() {
        // mean_abs fraction of this block is ~0.01 of full scale
        let block = vec![328_i16; 160];

        let sensitive = LevelMeter::new(0.02);
        let insensitive = LevelMeter::new(0.2);

        assert!(sensitive.level(&block) > insensitive.level(&block));
        assert!((sensitive.level(&block) - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_quiet_hiss_reads_low() {
        // ~0.1% of full scale, typical background hiss
        let block = vec![33_i16; 160];
        let meter = LevelMeter::default();
        assert!(meter.level(&block) < 0.1);
    }

    #[test]
    fn test_zero_calibration_does_not_divide_by_zero() {
        let meter = LevelMeter::new(0.0);
        let block = vec![1000_i16; 16];
        assert_eq!(meter.level(&block), 1.0);
    }
}
