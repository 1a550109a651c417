//! Output safety clipper
//!
//! Hard clip of the final mix to full scale. Stateless and sample-exact, so
//! the same input always produces the same output; non-finite samples are
//! replaced with silence before they reach the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::types::StereoSample;

/// Hard clipper with a clip indicator for the UI
pub struct OutputClipper {
    ceiling: f32,
    /// Set by the audio thread when a block clipped; the UI reads and clears it
    clip_active: Arc<AtomicBool>,
}

impl OutputClipper {
    /// Clip at 0 dBFS
    pub fn new() -> Self {
        Self::with_indicator(Arc::new(AtomicBool::new(false)))
    }

    /// Clip at 0 dBFS, reporting into an existing indicator
    pub fn with_indicator(clip_active: Arc<AtomicBool>) -> Self {
        Self {
            ceiling: 1.0,
            clip_active,
        }
    }

    /// Get the clip indicator atomic (shared with UI thread)
    pub fn clip_indicator(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.clip_active)
    }

    /// Clip a block in place
    pub fn process(&mut self, block: &mut [StereoSample]) {
        let mut clipped = false;
        for sample in block.iter_mut() {
            sample.left = self.clip(sample.left, &mut clipped);
            sample.right = self.clip(sample.right, &mut clipped);
        }
        if clipped {
            self.clip_active.store(true, Ordering::Relaxed);
        }
    }

    #[inline]
    fn clip(&self, value: f32, clipped: &mut bool) -> f32 {
        if value.is_nan() {
            *clipped = true;
            return 0.0;
        }
        if value > self.ceiling || value < -self.ceiling {
            *clipped = true;
            return value.clamp(-self.ceiling, self.ceiling);
        }
        value
    }
}

impl Default for OutputClipper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_ceiling_is_untouched() {
        let mut clipper = OutputClipper::new();
        let mut block = [StereoSample::new(0.5, -0.999), StereoSample::new(1.0, -1.0)];
        clipper.process(&mut block);

        assert_eq!(block[0], StereoSample::new(0.5, -0.999));
        assert_eq!(block[1], StereoSample::new(1.0, -1.0));
        assert!(!clipper.clip_indicator().load(Ordering::Relaxed));
    }

    #[test]
    fn test_overs_are_clamped_and_flagged() {
        let mut clipper = OutputClipper::new();
        let indicator = clipper.clip_indicator();
        let mut block = [
            StereoSample::new(1.7, -3.0),
            StereoSample::new(f32::INFINITY, f32::NAN),
        ];
        clipper.process(&mut block);

        assert_eq!(block[0], StereoSample::new(1.0, -1.0));
        assert_eq!(block[1], StereoSample::new(1.0, 0.0));
        assert!(indicator.load(Ordering::Relaxed));
    }
}
