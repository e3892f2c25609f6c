//! Per-peer working set of pending deltas
//!
//! The pool is the server's memory of what a single peer has not yet
//! acknowledged. World changes are registered into it, the frame assembler
//! drains it in priority order, and frame acks from the peer remove what
//! arrived.
//!
//! ## Lifecycle
//! - **New**: registered, never written into a frame
//! - **Unacked**: written into the frame of `generation_set`; becomes a
//!   resend candidate once it has waited longer than the peer's resend
//!   threshold
//! - **Acked**: removed from the pool, either by an ack for its generation
//!   set or by an ack for its resend tag
//!
//! ## Coalescing
//! A change for an entity that already has a New delta is merged into it.
//! Fields it carries are stripped from older Unacked deltas of the same
//! entity, so a late resend can never roll a field back. Removals drop
//! everything pending for the entity. Sounds are events and never merge.

use crate::bandwidth::BandwidthRating;
use crate::config::PoolConfig;
use crate::priority::{RelevanceModel, Viewer};
use log::{debug, trace};
use shared::delta::Resent;
use shared::{Delta, EntityKey, MessageId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub type EntryId = u64;

/// A change reported by the world, with the position used for relevance
#[derive(Debug, Clone, PartialEq)]
pub struct WorldChange {
    pub delta: Delta,
    pub origin: Option<[f32; 3]>,
}

impl WorldChange {
    pub fn new(delta: Delta) -> Self {
        Self { delta, origin: None }
    }

    pub fn at(delta: Delta, origin: [f32; 3]) -> Self {
        Self {
            delta,
            origin: Some(origin),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    New,
    Unacked,
}

/// A delta plus the pool's bookkeeping for it
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub delta: Delta,
    pub lifecycle: Lifecycle,
    /// Set of the frame that first carried the delta. Kept across resends.
    pub generation_set: u8,
    /// Assigned the first time the delta is resent, never changed after.
    pub resend_tag: Option<u8>,
    pub last_sent_at: Option<Instant>,
    pub registered_at: Instant,
    /// World position used only for relevance.
    pub origin: Option<[f32; 3]>,
}

/// The next delta to try writing into a frame
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub entry: EntryId,
    pub delta: Delta,
    /// Present when the delta is a retransmission.
    pub resent: Option<Resent>,
}

/// What the last `prioritize` pass saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub considered: usize,
    pub queued: usize,
    /// Unacked deltas past the resend threshold.
    pub overdue: usize,
    /// Deltas beyond the far radius.
    pub out_of_range: usize,
}

impl PassStats {
    pub fn overdue_share(&self) -> f32 {
        if self.considered == 0 {
            0.0
        } else {
            self.overdue as f32 / self.considered as f32
        }
    }
}

pub struct Pool {
    config: PoolConfig,
    entries: HashMap<EntryId, PoolEntry>,
    by_entity: HashMap<EntityKey, Vec<EntryId>>,
    next_entry: EntryId,
    /// Ascending priority; the best candidate is at the end.
    queue: Vec<EntryId>,
    set_counter: u8,
    resend_counter: u8,
    is_first_frame: bool,
    /// Store id of the first frame until the peer confirms it. Later frames
    /// wait so they can never be overtaken by its retransmission.
    first_frame_message: Option<MessageId>,
    last_pass: PassStats,
    pub rating: BandwidthRating,
}

impl Pool {
    pub fn new(config: PoolConfig, rating: BandwidthRating) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            by_entity: HashMap::new(),
            next_entry: 0,
            queue: Vec::new(),
            set_counter: 0,
            resend_counter: 0,
            is_first_frame: true,
            first_frame_message: None,
            last_pass: PassStats::default(),
            rating,
        }
    }

    /// Records a world change for this peer.
    ///
    /// `origin` overrides the position the delta itself carries, for entities
    /// whose deltas do not include their location.
    pub fn register_change(&mut self, delta: Delta, origin: Option<[f32; 3]>, now: Instant) {
        if delta.is_empty() {
            trace!("Ignoring empty change for {:?}", delta.key());
            return;
        }
        let key = delta.key();
        let origin = origin.or_else(|| delta.origin());

        if delta.is_null() {
            self.remove_entity(key);
            self.insert(delta, origin, now);
            return;
        }
        if key.kind.is_sound() {
            self.insert(delta, origin, now);
            return;
        }

        let existing = self.by_entity.get(&key).cloned().unwrap_or_default();
        let mut merged = false;
        for id in existing {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            match entry.lifecycle {
                // A removal resent after this change would delete the entity
                // again.
                Lifecycle::Unacked if entry.delta.is_null() => {
                    trace!("Dropping unacked removal of {:?}, entity is back", key);
                    self.remove_entry(id);
                }
                Lifecycle::Unacked => {
                    entry.delta.subtract(&delta);
                    if entry.delta.is_empty() {
                        trace!("Unacked delta for {:?} fully superseded", key);
                        self.remove_entry(id);
                    }
                }
                Lifecycle::New if !merged => {
                    if entry.delta.merge(&delta) {
                        if origin.is_some() {
                            entry.origin = origin;
                        }
                        merged = true;
                    }
                }
                Lifecycle::New => {}
            }
        }

        if !merged {
            self.insert(delta, origin, now);
        }
    }

    /// Orders every sendable delta for the next frame. Returns how many were
    /// queued.
    pub fn prioritize(&mut self, now: Instant, viewer: &Viewer, resend_threshold: Duration) -> usize {
        self.expire_sounds(now);

        let model = RelevanceModel::new(&self.config);
        let mut stats = PassStats::default();
        let mut scored: Vec<(f32, EntryId)> = Vec::with_capacity(self.entries.len());

        for (&id, entry) in &self.entries {
            stats.considered += 1;
            let waited = match (entry.lifecycle, entry.last_sent_at) {
                (Lifecycle::New, _) => now.saturating_duration_since(entry.registered_at),
                (Lifecycle::Unacked, Some(sent_at)) => {
                    let since = now.saturating_duration_since(sent_at);
                    if since < resend_threshold {
                        continue;
                    }
                    stats.overdue += 1;
                    since
                }
                (Lifecycle::Unacked, None) => continue,
            };
            let Some(distance) = model.distance(entry.origin, viewer) else {
                stats.out_of_range += 1;
                continue;
            };
            let score = model.score(entry.delta.kind(), entry.delta.is_null(), distance, waited);
            scored.push((score, id));
        }

        // Highest score last; among equals the oldest entry pops first.
        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.1.cmp(&a.1))
        });
        self.queue = scored.into_iter().map(|(_, id)| id).collect();
        stats.queued = self.queue.len();
        self.last_pass = stats;
        stats.queued
    }

    /// Pops the best remaining candidate. Lifecycle is untouched until
    /// `mark_sent`.
    pub fn take_next(&mut self) -> Option<Candidate> {
        while let Some(id) = self.queue.pop() {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            let resent = match entry.lifecycle {
                Lifecycle::New => None,
                Lifecycle::Unacked => Some(Resent {
                    set: entry.generation_set,
                    tag: entry
                        .resend_tag
                        .unwrap_or_else(|| next_resend_tag(self.resend_counter)),
                }),
            };
            return Some(Candidate {
                entry: id,
                delta: entry.delta.clone(),
                resent,
            });
        }
        None
    }

    /// Commits a candidate that made it into the current frame.
    pub fn mark_sent(&mut self, id: EntryId, now: Instant) {
        let tag = next_resend_tag(self.resend_counter);
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let mut tagged = false;
        match entry.lifecycle {
            Lifecycle::New => {
                entry.lifecycle = Lifecycle::Unacked;
                entry.generation_set = self.set_counter;
            }
            Lifecycle::Unacked => {
                if entry.resend_tag.is_none() {
                    entry.resend_tag = Some(tag);
                    tagged = true;
                }
            }
        }
        entry.last_sent_at = Some(now);

        if tagged {
            self.resend_counter = tag;
            // After a wrap the tag may still sit on an old delta; that one
            // gets a fresh tag on its next resend.
            for (other_id, other) in self.entries.iter_mut() {
                if *other_id != id && other.resend_tag == Some(tag) {
                    other.resend_tag = None;
                }
            }
        }
    }

    /// Removes every Unacked delta first sent in frame `set`.
    pub fn acknowledge_set(&mut self, set: u8) -> usize {
        let acked: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.lifecycle == Lifecycle::Unacked && e.generation_set == set)
            .map(|(&id, _)| id)
            .collect();
        for &id in &acked {
            self.remove_entry(id);
        }
        if !acked.is_empty() {
            trace!("Set {} acknowledged, {} deltas done", set, acked.len());
        }
        acked.len()
    }

    /// Removes the Unacked delta carrying resend tag `tag`.
    pub fn acknowledge_resend(&mut self, tag: u8) -> bool {
        let found = self
            .entries
            .iter()
            .find(|(_, e)| e.lifecycle == Lifecycle::Unacked && e.resend_tag == Some(tag))
            .map(|(&id, _)| id);
        match found {
            Some(id) => {
                self.remove_entry(id);
                true
            }
            None => false,
        }
    }

    /// Moves to the next generation set. Called once per frame sent.
    pub fn advance_set(&mut self) {
        self.set_counter = self.set_counter.wrapping_add(1);
    }

    /// Forgets everything; the next frame is a first frame.
    pub fn reset(&mut self) {
        debug!("Pool reset, dropping {} deltas", self.entries.len());
        self.entries.clear();
        self.by_entity.clear();
        self.queue.clear();
        self.is_first_frame = true;
        self.first_frame_message = None;
    }

    pub fn is_first_frame(&self) -> bool {
        self.is_first_frame
    }

    pub fn clear_first_frame(&mut self) {
        self.is_first_frame = false;
    }

    pub fn first_frame_message(&self) -> Option<MessageId> {
        self.first_frame_message
    }

    pub fn set_first_frame_message(&mut self, id: Option<MessageId>) {
        self.first_frame_message = id;
    }

    pub fn set_counter(&self) -> u8 {
        self.set_counter
    }

    pub fn resend_counter(&self) -> u8 {
        self.resend_counter
    }

    pub fn last_pass(&self) -> PassStats {
        self.last_pass
    }

    pub fn entry(&self, id: EntryId) -> Option<&PoolEntry> {
        self.entries.get(&id)
    }

    pub fn entries(&self) -> impl Iterator<Item = (EntryId, &PoolEntry)> {
        self.entries.iter().map(|(&id, entry)| (id, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, delta: Delta, origin: Option<[f32; 3]>, now: Instant) {
        let id = self.next_entry;
        self.next_entry += 1;
        self.by_entity.entry(delta.key()).or_default().push(id);
        self.entries.insert(
            id,
            PoolEntry {
                delta,
                lifecycle: Lifecycle::New,
                generation_set: 0,
                resend_tag: None,
                last_sent_at: None,
                registered_at: now,
                origin,
            },
        );
    }

    fn remove_entry(&mut self, id: EntryId) {
        let Some(entry) = self.entries.remove(&id) else {
            return;
        };
        let key = entry.delta.key();
        if let Some(ids) = self.by_entity.get_mut(&key) {
            ids.retain(|&other| other != id);
            if ids.is_empty() {
                self.by_entity.remove(&key);
            }
        }
    }

    fn remove_entity(&mut self, key: EntityKey) {
        if let Some(ids) = self.by_entity.remove(&key) {
            for id in ids {
                self.entries.remove(&id);
            }
        }
    }

    fn expire_sounds(&mut self, now: Instant) {
        let max_age = self.config.sound_max_age;
        let expired: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                e.delta.kind().is_sound()
                    && now.saturating_duration_since(e.registered_at) > max_age
            })
            .map(|(&id, _)| id)
            .collect();
        if !expired.is_empty() {
            trace!("Expiring {} stale sounds", expired.len());
        }
        for id in expired {
            self.remove_entry(id);
        }
    }
}

/// Resend tags wrap through 1..=255; zero is never used.
fn next_resend_tag(counter: u8) -> u8 {
    match counter.wrapping_add(1) {
        0 => 1,
        tag => tag,
    }
}
