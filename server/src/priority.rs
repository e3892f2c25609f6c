//! Relevance scoring for pending deltas.
//!
//! A delta's score grows with how close its origin is to the peer's viewer
//! and with how long it has been waiting, so distant or unimportant changes
//! are delayed but never starved.

use crate::config::PoolConfig;
use shared::DeltaKind;
use std::time::Duration;

/// Relative importance of each entity kind at equal distance.
pub fn kind_weight(kind: DeltaKind) -> f32 {
    match kind {
        DeltaKind::Player => 3.0,
        DeltaKind::Object => 2.0,
        DeltaKind::Sound(_) => 2.0,
        DeltaKind::Polyobj => 1.5,
        DeltaKind::Sector => 1.0,
        DeltaKind::Side => 0.5,
    }
}

/// Viewer position the pool scores against. Untrusted positions fall back to
/// the default distance for every delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewer {
    position: Option<[f32; 3]>,
}

impl Viewer {
    pub const UNKNOWN: Viewer = Viewer { position: None };

    /// Accepts `position` only if it is finite and inside the map bounds.
    pub fn new(position: [f32; 3], map_bound: f32) -> Self {
        let trusted = position
            .iter()
            .all(|c| c.is_finite() && c.abs() <= map_bound);
        Self {
            position: trusted.then_some(position),
        }
    }

    pub fn position(&self) -> Option<[f32; 3]> {
        self.position
    }

    pub fn is_trusted(&self) -> bool {
        self.position.is_some()
    }
}

impl Default for Viewer {
    fn default() -> Self {
        Viewer::UNKNOWN
    }
}

pub struct RelevanceModel<'a> {
    config: &'a PoolConfig,
}

impl<'a> RelevanceModel<'a> {
    pub fn new(config: &'a PoolConfig) -> Self {
        Self { config }
    }

    /// Effective distance used for scoring, or `None` if the delta is beyond
    /// the far radius and should wait for a later pass.
    pub fn distance(&self, origin: Option<[f32; 3]>, viewer: &Viewer) -> Option<f32> {
        let (Some(origin), Some(eye)) = (origin, viewer.position()) else {
            return Some(self.config.default_distance);
        };
        let dx = origin[0] - eye[0];
        let dy = origin[1] - eye[1];
        let dz = origin[2] - eye[2];
        let distance = (dx * dx + dy * dy + dz * dz).sqrt();
        if !distance.is_finite() {
            return Some(self.config.default_distance);
        }
        if distance > self.config.far_radius {
            return None;
        }
        Some(distance.max(self.config.close_radius))
    }

    pub fn score(&self, kind: DeltaKind, is_null: bool, distance: f32, waited: Duration) -> f32 {
        let closeness = self.config.close_radius / distance;
        let age = waited.as_secs_f32() / self.config.age_scale.as_secs_f32();
        let mut score = kind_weight(kind) * closeness * (1.0 + age);
        if is_null {
            score *= self.config.null_boost;
        }
        score
    }
}
