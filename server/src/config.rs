//! Server-side tuning: relevance scoring, frame budgets and peer limits.
//!
//! All values are defaults; none of them is load-bearing for correctness.

use serde::{Deserialize, Serialize};
use shared::config::MAX_DATAGRAM_SIZE;
use shared::packets::FRAME_OVERHEAD;
use shared::{ConfigError, ReliabilityConfig};
use std::time::Duration;

pub const DEFAULT_MAX_CLIENTS: usize = 16;
pub const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_TICK_RATE: u32 = 35;

pub const DEFAULT_CLOSE_RADIUS: f32 = 256.0;
pub const DEFAULT_FAR_RADIUS: f32 = 4096.0;
pub const DEFAULT_RELEVANCE_DISTANCE: f32 = 1024.0;
pub const DEFAULT_MAP_BOUND: f32 = 32768.0;
pub const DEFAULT_AGE_SCALE_MILLIS: u64 = 500;
pub const DEFAULT_NULL_BOOST: f32 = 4.0;
pub const DEFAULT_SOUND_MAX_AGE_MILLIS: u64 = 1000;

pub const DEFAULT_FRAME_INTERVAL: u32 = 2;
pub const DEFAULT_BASELINE_BYTES: usize = 300;
pub const DEFAULT_RATING_SCALE: usize = 10;
pub const DEFAULT_INITIAL_RATING: u32 = 40;
pub const DEFAULT_MIN_RATING: u32 = 0;
pub const DEFAULT_MAX_RATING: u32 = 100;
pub const DEFAULT_FIRST_FRAME_MAX: usize = MAX_DATAGRAM_SIZE;
pub const DEFAULT_CONGESTION_CEILING: usize = 16 * 1024;
pub const DEFAULT_RESEND_SHARE_THRESHOLD: f32 = 0.25;

/// How deltas are scored against a peer's viewpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Anything closer than this scores as if it were exactly this far.
    pub close_radius: f32,
    /// Anything farther is skipped for the current pass.
    pub far_radius: f32,
    /// Distance assumed for deltas without an origin, or for untrusted viewers.
    pub default_distance: f32,
    /// Viewer coordinates beyond +/- this are not trusted.
    pub map_bound: f32,
    /// Waiting this long doubles a delta's score.
    pub age_scale: Duration,
    pub null_boost: f32,
    pub sound_max_age: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            close_radius: DEFAULT_CLOSE_RADIUS,
            far_radius: DEFAULT_FAR_RADIUS,
            default_distance: DEFAULT_RELEVANCE_DISTANCE,
            map_bound: DEFAULT_MAP_BOUND,
            age_scale: Duration::from_millis(DEFAULT_AGE_SCALE_MILLIS),
            null_boost: DEFAULT_NULL_BOOST,
            sound_max_age: Duration::from_millis(DEFAULT_SOUND_MAX_AGE_MILLIS),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("close_radius", self.close_radius),
            ("far_radius", self.far_radius),
            ("default_distance", self.default_distance),
            ("map_bound", self.map_bound),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.age_scale.is_zero() {
            return Err(ConfigError::Zero { field: "age_scale" });
        }
        if self.close_radius > self.far_radius {
            return Err(ConfigError::Inverted {
                low: "close_radius",
                low_value: self.close_radius as f64,
                high: "far_radius",
                high_value: self.far_radius as f64,
            });
        }
        Ok(())
    }
}

/// Frame sizing, pacing and the adaptive rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// A peer gets a frame every this many ticks.
    pub frame_interval: u32,
    pub baseline_bytes: usize,
    /// Extra bytes per rating point.
    pub rating_scale: usize,
    pub initial_rating: u32,
    pub min_rating: u32,
    pub max_rating: u32,
    pub transport_max: usize,
    pub first_frame_max: usize,
    /// Unconfirmed bytes a peer may have outstanding before frames pause.
    pub congestion_ceiling: usize,
    /// Share of overdue deltas above which the rating drops.
    pub resend_share_threshold: f32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            baseline_bytes: DEFAULT_BASELINE_BYTES,
            rating_scale: DEFAULT_RATING_SCALE,
            initial_rating: DEFAULT_INITIAL_RATING,
            min_rating: DEFAULT_MIN_RATING,
            max_rating: DEFAULT_MAX_RATING,
            transport_max: MAX_DATAGRAM_SIZE,
            first_frame_max: DEFAULT_FIRST_FRAME_MAX,
            congestion_ceiling: DEFAULT_CONGESTION_CEILING,
            resend_share_threshold: DEFAULT_RESEND_SHARE_THRESHOLD,
        }
    }
}

impl FrameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_interval == 0 {
            return Err(ConfigError::Zero {
                field: "frame_interval",
            });
        }
        if self.baseline_bytes <= FRAME_OVERHEAD {
            return Err(ConfigError::Inverted {
                low: "frame overhead",
                low_value: FRAME_OVERHEAD as f64,
                high: "baseline_bytes",
                high_value: self.baseline_bytes as f64,
            });
        }
        if self.min_rating > self.max_rating {
            return Err(ConfigError::Inverted {
                low: "min_rating",
                low_value: self.min_rating as f64,
                high: "max_rating",
                high_value: self.max_rating as f64,
            });
        }
        for (field, value) in [
            ("transport_max", self.transport_max),
            ("first_frame_max", self.first_frame_max),
        ] {
            if value > MAX_DATAGRAM_SIZE {
                return Err(ConfigError::ExceedsTransport {
                    field,
                    value,
                    limit: MAX_DATAGRAM_SIZE,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub tick_rate: u32,
    pub pool: PoolConfig,
    pub frame: FrameConfig,
    pub reliability: ReliabilityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
            client_timeout: Duration::from_secs(DEFAULT_CLIENT_TIMEOUT_SECS),
            tick_rate: DEFAULT_TICK_RATE,
            pool: PoolConfig::default(),
            frame: FrameConfig::default(),
            reliability: ReliabilityConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients == 0 {
            return Err(ConfigError::Zero {
                field: "max_clients",
            });
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::Zero { field: "tick_rate" });
        }
        self.pool.validate()?;
        self.frame.validate()?;
        self.reliability.validate()
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}
