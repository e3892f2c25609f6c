//! Per-peer reliable message store
//!
//! Every datagram either side exchanges goes through a [`Store`]:
//!
//! ```text
//! [id: u16 LE][body ...]
//! ```
//!
//! - `id == 0`: Unreliable, fire and forget.
//! - `id != 0`: tracked; the receiver answers with a 2-byte confirmation that
//!   echoes the id. Bodies are never empty, so a 2-byte datagram is always a
//!   confirmation.
//!
//! Confirmed messages are retransmitted by [`Store::update`] until confirmed.
//! Ordered messages additionally wait for the previous Ordered message to be
//! confirmed before going on the wire, so the peer observes them in send
//! order. Inbound ids run through an [`IdHistory`] so a retransmitted message
//! is confirmed again but handed to the caller only once.
//!
//! The store never touches a socket. Outgoing datagrams collect in an outbox
//! drained by the owner.

use crate::config::{ReliabilityConfig, RTT_ALPHA, RTT_BETA};
use crate::error::ProtocolError;
use crate::history::IdHistory;
use log::{debug, trace};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Length of the id header, and of a confirmation datagram.
pub const HEADER_LEN: usize = 2;

pub type MessageId = u16;

/// Delivery guarantee requested for an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryClass {
    Unreliable,
    Confirmed,
    Ordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Ordered message waiting behind an unconfirmed one.
    Queued,
    InFlight { sent_at: Instant, resends: u32 },
    /// Purged on the next `update`.
    Confirmed,
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub id: MessageId,
    pub class: DeliveryClass,
    pub body: Vec<u8>,
    pub state: MessageState,
    pub created_at: Instant,
}

impl SentMessage {
    fn is_pending(&self) -> bool {
        self.state != MessageState::Confirmed
    }
}

/// What an inbound datagram turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A new message; `id` is 0 for Unreliable traffic.
    Payload { id: MessageId, body: Vec<u8> },
    /// A tracked message delivered before. It has been confirmed again.
    Duplicate(MessageId),
    /// The peer confirmed one of our messages.
    Confirmed(MessageId),
    /// Confirmation for a message we no longer track.
    StaleConfirmation(MessageId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub sent: u64,
    pub resent: u64,
    pub confirmed: u64,
    pub duplicates: u64,
    pub abandoned: u64,
}

pub struct Store {
    config: ReliabilityConfig,
    messages: VecDeque<SentMessage>,
    id_counter: MessageId,
    history: IdHistory<MessageId>,
    outbox: Vec<Vec<u8>>,
    srtt_ms: Option<f64>,
    rttvar_ms: f64,
    resend_threshold: Duration,
    stats: StoreStats,
}

impl Store {
    pub fn new(config: ReliabilityConfig) -> Self {
        let history = IdHistory::new(config.history_size);
        let resend_threshold = config.initial_resend;
        Self {
            config,
            messages: VecDeque::new(),
            id_counter: 0,
            history,
            outbox: Vec::new(),
            srtt_ms: None,
            rttvar_ms: 0.0,
            resend_threshold,
            stats: StoreStats::default(),
        }
    }

    /// Queues `body` for the peer. Returns the assigned id for tracked
    /// classes, `None` for Unreliable.
    pub fn send(&mut self, body: Vec<u8>, class: DeliveryClass, now: Instant) -> Option<MessageId> {
        debug_assert!(!body.is_empty(), "message bodies are never empty");
        self.stats.sent += 1;

        if class == DeliveryClass::Unreliable {
            self.outbox.push(frame_datagram(0, &body));
            return None;
        }

        let id = self.next_id();
        let blocked = class == DeliveryClass::Ordered && self.ordered_pending();
        let mut message = SentMessage {
            id,
            class,
            body,
            state: MessageState::Queued,
            created_at: now,
        };
        if blocked {
            trace!("Ordered message {} queued behind an unconfirmed one", id);
        } else {
            transmit(&mut self.outbox, &mut message, now);
        }
        self.messages.push_back(message);
        Some(id)
    }

    /// Classifies one inbound datagram from the peer.
    pub fn on_receive(&mut self, raw: &[u8], now: Instant) -> Result<Received, ProtocolError> {
        if raw.len() < HEADER_LEN {
            return Err(ProtocolError::ShortDatagram(raw.len()));
        }
        let id = MessageId::from_le_bytes([raw[0], raw[1]]);

        if raw.len() == HEADER_LEN {
            return Ok(self.on_confirmation(id, now));
        }

        let body = raw[HEADER_LEN..].to_vec();
        if id == 0 {
            return Ok(Received::Payload { id, body });
        }

        // Confirm every tracked arrival, repeats included: the first
        // confirmation may have been lost.
        self.outbox.push(id.to_le_bytes().to_vec());
        if self.history.insert(id) {
            Ok(Received::Payload { id, body })
        } else {
            self.stats.duplicates += 1;
            trace!("Duplicate message {} dropped", id);
            Ok(Received::Duplicate(id))
        }
    }

    fn on_confirmation(&mut self, id: MessageId, now: Instant) -> Received {
        let Some(message) = self
            .messages
            .iter_mut()
            .find(|message| message.id == id && message.is_pending())
        else {
            return Received::StaleConfirmation(id);
        };

        let sample = match message.state {
            // Karn: a resent message's round trip is ambiguous.
            MessageState::InFlight {
                sent_at,
                resends: 0,
            } => Some(now.saturating_duration_since(sent_at)),
            _ => None,
        };
        let was_ordered = message.class == DeliveryClass::Ordered;
        message.state = MessageState::Confirmed;
        self.stats.confirmed += 1;

        if let Some(sample) = sample {
            self.update_rtt(sample.as_micros() as f64 / 1000.0);
        }
        if was_ordered {
            self.release_next_ordered(now);
        }
        Received::Confirmed(id)
    }

    /// Retransmits overdue messages and purges confirmed ones.
    pub fn update(&mut self, now: Instant) {
        self.messages.retain(SentMessage::is_pending);

        let threshold = self.resend_threshold;
        let mut resent = 0;
        for message in self.messages.iter_mut() {
            if let MessageState::InFlight { sent_at, resends } = message.state {
                if now.saturating_duration_since(sent_at) >= threshold {
                    self.outbox.push(frame_datagram(message.id, &message.body));
                    message.state = MessageState::InFlight {
                        sent_at: now,
                        resends: resends + 1,
                    };
                    resent += 1;
                }
            }
        }
        if resent > 0 {
            debug!(
                "Resent {} messages (threshold {:?})",
                resent, self.resend_threshold
            );
            self.stats.resent += resent;
        }
    }

    /// Drops every pending message without retrying. Used on teardown.
    pub fn abandon(&mut self) {
        let abandoned = self.messages.iter().filter(|m| m.is_pending()).count();
        if abandoned > 0 {
            debug!("Abandoning {} unconfirmed messages", abandoned);
        }
        self.stats.abandoned += abandoned as u64;
        self.messages.clear();
        self.outbox.clear();
    }

    /// Stops tracking message `id` without waiting for its confirmation.
    /// A copy still sitting in the outbox is dropped too.
    pub fn cancel(&mut self, id: MessageId, now: Instant) -> bool {
        let Some(index) = self
            .messages
            .iter()
            .position(|m| m.id == id && m.is_pending())
        else {
            return false;
        };
        let Some(message) = self.messages.remove(index) else {
            return false;
        };
        let header = id.to_le_bytes();
        self.outbox
            .retain(|datagram| datagram.len() == HEADER_LEN || datagram[..HEADER_LEN] != header);
        self.stats.abandoned += 1;
        debug!("Cancelled message {}", id);

        let was_in_flight = matches!(message.state, MessageState::InFlight { .. });
        if message.class == DeliveryClass::Ordered && was_in_flight {
            self.release_next_ordered(now);
        }
        true
    }

    /// Takes every datagram prepared since the last call.
    pub fn drain_outbox(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }

    /// Number of tracked messages not yet confirmed.
    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }

    /// True while message `id` is tracked and unconfirmed.
    pub fn is_pending(&self, id: MessageId) -> bool {
        self.messages.iter().any(|m| m.id == id && m.is_pending())
    }

    /// Body bytes of tracked messages not yet confirmed.
    pub fn pending_bytes(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.is_pending())
            .map(|m| m.body.len())
            .sum()
    }

    pub fn messages(&self) -> impl Iterator<Item = &SentMessage> {
        self.messages.iter()
    }

    /// Current retransmission threshold.
    pub fn resend_threshold(&self) -> Duration {
        self.resend_threshold
    }

    pub fn srtt(&self) -> Option<Duration> {
        self.srtt_ms.map(millis_to_duration)
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    fn next_id(&mut self) -> MessageId {
        self.id_counter = self.id_counter.wrapping_add(1);
        if self.id_counter == 0 {
            self.id_counter = 1;
        }
        self.id_counter
    }

    fn ordered_pending(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.class == DeliveryClass::Ordered && m.is_pending())
    }

    fn release_next_ordered(&mut self, now: Instant) {
        let Some(index) = self
            .messages
            .iter()
            .position(|m| m.class == DeliveryClass::Ordered && m.state == MessageState::Queued)
        else {
            return;
        };
        transmit(&mut self.outbox, &mut self.messages[index], now);
    }

    fn update_rtt(&mut self, sample_ms: f64) {
        match self.srtt_ms {
            None => {
                self.srtt_ms = Some(sample_ms);
                self.rttvar_ms = sample_ms / 2.0;
            }
            Some(srtt) => {
                self.rttvar_ms =
                    (1.0 - RTT_BETA) * self.rttvar_ms + RTT_BETA * (sample_ms - srtt).abs();
                self.srtt_ms = Some((1.0 - RTT_ALPHA) * srtt + RTT_ALPHA * sample_ms);
            }
        }
        let srtt = self.srtt_ms.unwrap_or(sample_ms);
        let threshold = millis_to_duration(srtt + 4.0 * self.rttvar_ms);
        self.resend_threshold = threshold.clamp(self.config.min_resend, self.config.max_resend);
    }
}

fn transmit(outbox: &mut Vec<Vec<u8>>, message: &mut SentMessage, now: Instant) {
    outbox.push(frame_datagram(message.id, &message.body));
    message.state = MessageState::InFlight {
        sent_at: now,
        resends: 0,
    };
}

fn millis_to_duration(ms: f64) -> Duration {
    Duration::from_micros((ms.max(0.0) * 1000.0).round() as u64)
}

fn frame_datagram(id: MessageId, body: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(HEADER_LEN + body.len());
    datagram.extend_from_slice(&id.to_le_bytes());
    datagram.extend_from_slice(body);
    datagram
}
