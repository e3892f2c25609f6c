//! Per-peer adaptive frame size.
//!
//! Not congestion control: the rating only nudges the frame budget up while
//! frames keep filling and the link keeps up, and down when deltas pile up
//! waiting for resend.

use crate::config::FrameConfig;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthRating {
    rating: u32,
    min: u32,
    max: u32,
}

impl BandwidthRating {
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            rating: config.initial_rating.clamp(config.min_rating, config.max_rating),
            min: config.min_rating,
            max: config.max_rating,
        }
    }

    pub fn value(&self) -> u32 {
        self.rating
    }

    /// Byte budget for a regular frame at the current rating.
    pub fn max_frame_bytes(&self, config: &FrameConfig) -> usize {
        let scaled = config.baseline_bytes + self.rating as usize * config.rating_scale;
        scaled.min(config.transport_max)
    }

    /// Adjusts the rating after a frame went out.
    ///
    /// `filled` is whether the frame stopped because the budget ran out;
    /// `overdue_share` is the fraction of pool entries that were waiting for
    /// resend when the frame was built.
    pub fn observe(&mut self, filled: bool, overdue_share: f32, config: &FrameConfig) {
        let before = self.rating;
        if overdue_share > config.resend_share_threshold {
            self.rating = self.rating.saturating_sub(1).max(self.min);
        } else if filled {
            self.rating = (self.rating + 1).min(self.max);
        }
        if self.rating != before {
            debug!("Bandwidth rating {} -> {}", before, self.rating);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_follows_rating() {
        let config = FrameConfig::default();
        let rating = BandwidthRating::new(&config);
        assert_eq!(
            rating.max_frame_bytes(&config),
            config.baseline_bytes + config.initial_rating as usize * config.rating_scale
        );
    }

    #[test]
    fn test_budget_capped_by_transport() {
        let config = FrameConfig {
            initial_rating: 100,
            rating_scale: 100,
            ..Default::default()
        };
        let rating = BandwidthRating::new(&config);
        assert_eq!(rating.max_frame_bytes(&config), config.transport_max);
    }

    #[test]
    fn test_full_frames_raise_overdue_lowers() {
        let config = FrameConfig::default();
        let mut rating = BandwidthRating::new(&config);
        let start = rating.value();

        rating.observe(true, 0.0, &config);
        assert_eq!(rating.value(), start + 1);

        rating.observe(false, 0.0, &config);
        assert_eq!(rating.value(), start + 1);

        rating.observe(true, 0.9, &config);
        assert_eq!(rating.value(), start);
    }

    #[test]
    fn test_rating_stays_in_range() {
        let config = FrameConfig {
            initial_rating: 1,
            min_rating: 1,
            max_rating: 2,
            ..Default::default()
        };
        let mut rating = BandwidthRating::new(&config);
        for _ in 0..5 {
            rating.observe(false, 1.0, &config);
        }
        assert_eq!(rating.value(), 1);
        for _ in 0..5 {
            rating.observe(true, 0.0, &config);
        }
        assert_eq!(rating.value(), 2);
    }
}
