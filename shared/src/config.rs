//! Reliability tuning shared by both ends of a connection.
//!
//! Every constant here is a default, not a correctness requirement. Hosts can
//! embed [`ReliabilityConfig`] in their own config files through serde.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_INITIAL_RESEND_MILLIS: u64 = 200;
pub const DEFAULT_MIN_RESEND_MILLIS: u64 = 50;
pub const DEFAULT_MAX_RESEND_MILLIS: u64 = 2000;
pub const DEFAULT_HISTORY_SIZE: usize = 128;
pub const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 1024;

/// Largest datagram either side will put on the wire.
pub const MAX_DATAGRAM_SIZE: usize = 1400;

pub const RTT_ALPHA: f64 = 0.125;
pub const RTT_BETA: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Resend threshold before the first RTT sample.
    pub initial_resend: Duration,
    pub min_resend: Duration,
    pub max_resend: Duration,
    /// How many inbound message ids are remembered for deduplication.
    pub history_size: usize,
    pub inbound_queue_capacity: usize,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            initial_resend: Duration::from_millis(DEFAULT_INITIAL_RESEND_MILLIS),
            min_resend: Duration::from_millis(DEFAULT_MIN_RESEND_MILLIS),
            max_resend: Duration::from_millis(DEFAULT_MAX_RESEND_MILLIS),
            history_size: DEFAULT_HISTORY_SIZE,
            inbound_queue_capacity: DEFAULT_INBOUND_QUEUE_CAPACITY,
        }
    }
}

impl ReliabilityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_resend.is_zero() {
            return Err(ConfigError::Zero {
                field: "min_resend",
            });
        }
        if self.history_size == 0 {
            return Err(ConfigError::Zero {
                field: "history_size",
            });
        }
        if self.inbound_queue_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "inbound_queue_capacity",
            });
        }
        if self.min_resend > self.max_resend {
            return Err(ConfigError::Inverted {
                low: "min_resend",
                low_value: self.min_resend.as_secs_f64(),
                high: "max_resend",
                high_value: self.max_resend.as_secs_f64(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ReliabilityConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_resend_bounds_rejected() {
        let config = ReliabilityConfig {
            min_resend: Duration::from_secs(3),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Inverted {
                low: "min_resend",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_history_rejected() {
        let config = ReliabilityConfig {
            history_size: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "history_size"
            })
        );
    }
}
