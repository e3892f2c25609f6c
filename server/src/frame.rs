//! Frame assembly: turns a peer's pool into at most one datagram per tick.
//!
//! A frame is built only when the peer is ready, is not backed up, and its
//! staggered slot comes around. Deltas are written in priority order until
//! the next one would push the datagram past the byte budget; the frame is
//! then handed to the peer's store whole, never partially.

use crate::client_manager::Session;
use crate::config::FrameConfig;
use log::{trace, warn};
use shared::delta;
use shared::packets::FrameHeader;
use shared::store::HEADER_LEN;
use shared::wire::ByteWriter;
use shared::DeliveryClass;
use std::time::Instant;

/// Result of one `transmit` attempt. Only `Sent` puts bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitOutcome {
    /// Handshake not finished.
    NotReady,
    /// The first frame has not been confirmed yet.
    AwaitingFirstFrame,
    /// Too many unconfirmed bytes outstanding; retried next tick.
    Backpressure { pending_bytes: usize },
    /// Not this peer's tick.
    NotScheduled,
    /// Nothing sendable in the pool.
    Empty,
    Sent {
        set: u8,
        deltas: usize,
        /// Datagram size including the store header.
        bytes: usize,
        first: bool,
    },
}

/// Where a peer sits in the transmit rotation for this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub tick: u64,
    pub index: usize,
    pub peers: usize,
}

impl Schedule {
    /// Peers are spread evenly across the frame interval so they do not all
    /// send on the same tick.
    pub fn is_due(&self, frame_interval: u32) -> bool {
        let interval = frame_interval.max(1) as u64;
        let peers = self.peers.max(1) as u64;
        let offset = (self.index as u64 * interval) / peers;
        self.tick % interval == offset
    }
}

pub struct FrameAssembler {
    config: FrameConfig,
    started_at: Instant,
}

impl FrameAssembler {
    pub fn new(config: FrameConfig, started_at: Instant) -> Self {
        Self { config, started_at }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Milliseconds since the server started, as carried in frame headers.
    pub fn timestamp(&self, now: Instant) -> u32 {
        now.saturating_duration_since(self.started_at).as_millis() as u32
    }

    pub fn transmit(&self, session: &mut Session, schedule: Schedule, now: Instant) -> TransmitOutcome {
        if !session.ready {
            return TransmitOutcome::NotReady;
        }
        if let Some(id) = session.pool.first_frame_message() {
            if session.store.is_pending(id) {
                return TransmitOutcome::AwaitingFirstFrame;
            }
            session.pool.set_first_frame_message(None);
        }
        let pending_bytes = session.store.pending_bytes();
        if pending_bytes > self.config.congestion_ceiling {
            trace!(
                "Client {} backed up with {} unconfirmed bytes",
                session.id,
                pending_bytes
            );
            return TransmitOutcome::Backpressure { pending_bytes };
        }
        if !schedule.is_due(self.config.frame_interval) {
            return TransmitOutcome::NotScheduled;
        }

        let first = session.pool.is_first_frame();
        let max_bytes = if first {
            self.config.first_frame_max
        } else {
            session.pool.rating.max_frame_bytes(&self.config)
        };

        let resend_threshold = session.store.resend_threshold();
        session.pool.prioritize(now, &session.viewer, resend_threshold);

        let header = FrameHeader {
            first,
            level: session.level_id as u8,
            set: session.pool.set_counter(),
            timestamp: self.timestamp(now),
        };
        let mut writer = ByteWriter::with_capacity(max_bytes);
        header.write(&mut writer);

        let mut deltas = 0;
        let mut filled = false;
        while let Some(candidate) = session.pool.take_next() {
            let mark = writer.mark();
            let encoded = match candidate.resent {
                Some(resent) => delta::encode_resent(&candidate.delta, resent, &mut writer),
                None => delta::encode(&candidate.delta, &mut writer),
            };
            if let Err(e) = encoded {
                warn!("Skipping delta for {:?}: {}", candidate.delta.key(), e);
                writer.rewind(mark);
                continue;
            }
            if HEADER_LEN + writer.len() > max_bytes {
                writer.rewind(mark);
                filled = true;
                break;
            }
            session.pool.mark_sent(candidate.entry, now);
            deltas += 1;
        }

        if deltas == 0 {
            return TransmitOutcome::Empty;
        }

        let bytes = HEADER_LEN + writer.len();
        let class = if first {
            session.pool.clear_first_frame();
            DeliveryClass::Confirmed
        } else {
            DeliveryClass::Unreliable
        };
        let message = session.store.send(writer.into_bytes(), class, now);
        if first {
            session.pool.set_first_frame_message(message);
        }
        session.pool.advance_set();

        if !first {
            let overdue_share = session.pool.last_pass().overdue_share();
            session.pool.rating.observe(filled, overdue_share, &self.config);
        }

        trace!(
            "Frame {} to client {}: {} deltas, {} bytes",
            header.set,
            session.id,
            deltas,
            bytes
        );
        TransmitOutcome::Sent {
            set: header.set,
            deltas,
            bytes,
            first,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::pool::Lifecycle;
    use shared::delta::SectorFields;
    use shared::packets::{Packet, FRAME_OVERHEAD};
    use shared::{Delta, PacketType};
    use std::net::SocketAddr;

    // tag + id + flags + light
    const SECTOR_LIGHT_LEN: usize = 6;

    const DUE: Schedule = Schedule {
        tick: 0,
        index: 0,
        peers: 1,
    };

    fn sector_light(id: u16) -> Delta {
        Delta::Sector {
            id,
            fields: SectorFields {
                light: Some(200),
                ..Default::default()
            },
        }
    }

    fn setup(frame: FrameConfig) -> (FrameAssembler, Session, Instant) {
        let now = Instant::now();
        let config = ServerConfig {
            frame,
            ..Default::default()
        };
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let mut session = Session::new(1, addr, &config, now);
        session.ready = true;
        (FrameAssembler::new(config.frame, now), session, now)
    }

    fn budget_for(deltas: usize) -> FrameConfig {
        FrameConfig {
            baseline_bytes: FRAME_OVERHEAD + deltas * SECTOR_LIGHT_LEN,
            initial_rating: 0,
            min_rating: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_budget_fits_four_of_five() {
        let (assembler, mut session, now) = setup(budget_for(4));
        session.pool.clear_first_frame();
        for id in 1..=5 {
            session.pool.register_change(sector_light(id), None, now);
        }

        let outcome = assembler.transmit(&mut session, DUE, now);
        assert_eq!(
            outcome,
            TransmitOutcome::Sent {
                set: 0,
                deltas: 4,
                bytes: FRAME_OVERHEAD + 4 * SECTOR_LIGHT_LEN,
                first: false,
            }
        );

        let waiting: Vec<_> = session
            .pool
            .entries()
            .filter(|(_, e)| e.lifecycle == Lifecycle::New)
            .map(|(_, e)| e.delta.target_id())
            .collect();
        assert_eq!(waiting, vec![5]);
        assert_eq!(session.pool.set_counter(), 1);

        // Ordinary frames are fire-and-forget.
        assert_eq!(session.store.pending_count(), 0);
        let outbox = session.store.drain_outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(&outbox[0][..2], &[0, 0]);
    }

    #[test]
    fn test_first_frame_is_confirmed() {
        let (assembler, mut session, now) = setup(FrameConfig::default());
        session.pool.register_change(sector_light(1), None, now);

        let outcome = assembler.transmit(&mut session, DUE, now);
        assert!(matches!(outcome, TransmitOutcome::Sent { first: true, .. }));
        assert!(!session.pool.is_first_frame());
        assert_eq!(session.store.pending_count(), 1);

        let outbox = session.store.drain_outbox();
        assert_eq!(outbox[0][2], PacketType::FirstFrame as u8);
        match Packet::parse(&outbox[0][2..]).unwrap() {
            Packet::Frame { header, deltas } => {
                assert!(header.first);
                assert_eq!(deltas[0].delta, sector_light(1));
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_frames_wait_for_first_frame_confirmation() {
        let (assembler, mut session, now) = setup(FrameConfig::default());
        session.pool.register_change(sector_light(1), None, now);
        assert!(matches!(
            assembler.transmit(&mut session, DUE, now),
            TransmitOutcome::Sent { first: true, .. }
        ));
        session.pool.register_change(sector_light(2), None, now);
        assert_eq!(
            assembler.transmit(&mut session, DUE, now),
            TransmitOutcome::AwaitingFirstFrame
        );

        let id = session.pool.first_frame_message().unwrap();
        session.store.on_receive(&id.to_le_bytes(), now).unwrap();
        assert!(matches!(
            assembler.transmit(&mut session, DUE, now),
            TransmitOutcome::Sent { first: false, .. }
        ));
        assert_eq!(session.pool.first_frame_message(), None);
    }

    #[test]
    fn test_first_frame_survives_empty_pool() {
        let (assembler, mut session, now) = setup(FrameConfig::default());
        assert_eq!(assembler.transmit(&mut session, DUE, now), TransmitOutcome::Empty);
        assert!(session.pool.is_first_frame());
    }

    #[test]
    fn test_not_ready_peer_gets_nothing() {
        let (assembler, mut session, now) = setup(FrameConfig::default());
        session.ready = false;
        session.pool.register_change(sector_light(1), None, now);
        assert_eq!(
            assembler.transmit(&mut session, DUE, now),
            TransmitOutcome::NotReady
        );
        assert!(session.store.drain_outbox().is_empty());
    }

    #[test]
    fn test_backpressure_defers_frame() {
        let (assembler, mut session, now) = setup(FrameConfig::default());
        session.pool.register_change(sector_light(1), None, now);
        let ceiling = assembler.config().congestion_ceiling;
        session
            .store
            .send(vec![0xaa; ceiling + 1], DeliveryClass::Confirmed, now);
        session.store.drain_outbox();

        assert_eq!(
            assembler.transmit(&mut session, DUE, now),
            TransmitOutcome::Backpressure {
                pending_bytes: ceiling + 1
            }
        );
        assert_eq!(session.pool.len(), 1);
    }

    #[test]
    fn test_stagger_spreads_peers() {
        let due = |tick, index| {
            Schedule {
                tick,
                index,
                peers: 2,
            }
            .is_due(4)
        };
        assert!(due(0, 0));
        assert!(!due(0, 1));
        assert!(due(2, 1));
        assert!(due(4, 0));
        assert!(!due(5, 0));

        // One peer, interval 1: every tick.
        assert!((0..5).all(|tick| Schedule {
            tick,
            index: 0,
            peers: 1
        }
        .is_due(1)));
    }

    #[test]
    fn test_frames_never_exceed_budget() {
        let frame = FrameConfig {
            max_rating: 0,
            ..budget_for(10)
        };
        let max_bytes = frame.baseline_bytes;
        let (assembler, mut session, now) = setup(frame);
        session.pool.clear_first_frame();
        for id in 0..200 {
            session.pool.register_change(sector_light(id), None, now);
        }

        let mut sent = 0;
        for _ in 0..25 {
            if let TransmitOutcome::Sent { deltas, bytes, .. } =
                assembler.transmit(&mut session, DUE, now)
            {
                assert!(bytes <= max_bytes);
                sent += deltas;
            }
        }
        for datagram in session.store.drain_outbox() {
            assert!(datagram.len() <= max_bytes);
        }
        assert_eq!(sent, 200);
    }

    #[test]
    fn test_full_frames_raise_rating() {
        let (assembler, mut session, now) = setup(budget_for(1));
        session.pool.clear_first_frame();
        for id in 0..3 {
            session.pool.register_change(sector_light(id), None, now);
        }
        let before = session.pool.rating.value();
        assembler.transmit(&mut session, DUE, now);
        assert_eq!(session.pool.rating.value(), before + 1);
    }
}
