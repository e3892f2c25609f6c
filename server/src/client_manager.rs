//! Client session management for the replication server
//!
//! This module owns every connected peer's replication state:
//! - Session lifecycle (handshake, ready, timeout, goodbye)
//! - The per-peer pool of pending deltas and reliable message store
//! - Fan-out of world changes into every pool
//! - Per-tick frame transmission and retransmission
//!
//! Sessions live in a generational slot arena. A [`ClientHandle`] names a
//! slot and the generation it was issued for, so a handle kept after a peer
//! disconnects can never address whoever reuses that slot.

use crate::bandwidth::BandwidthRating;
use crate::config::ServerConfig;
use crate::frame::{FrameAssembler, Schedule, TransmitOutcome};
use crate::pool::{Pool, WorldChange};
use crate::priority::Viewer;
use log::{debug, info, trace, warn};
use shared::packets::PROTOCOL_VERSION;
use shared::{
    ControlPacket, DeliveryClass, InboundMessage, NetError, Packet, Received, ResourceError, Store,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Stable reference to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientHandle {
    slot: u32,
    generation: u32,
}

impl ClientHandle {
    pub fn slot(&self) -> usize {
        self.slot as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Everything the server tracks for one connected peer
pub struct Session {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Deltas this peer has not acknowledged yet
    pub pool: Pool,
    /// Reliable delivery state for datagrams to and from this peer
    pub store: Store,
    /// Set once the peer has sent `Ready` after `Welcome`
    pub ready: bool,
    /// Viewpoint used to score relevance
    pub viewer: Viewer,
    /// Level this peer's frames are built for
    pub level_id: u32,
    /// Last time we received any datagram from this peer
    pub last_seen: Instant,
}

impl Session {
    pub fn new(id: u32, addr: SocketAddr, config: &ServerConfig, now: Instant) -> Self {
        Self {
            id,
            addr,
            pool: Pool::new(config.pool.clone(), BandwidthRating::new(&config.frame)),
            store: Store::new(config.reliability.clone()),
            ready: false,
            viewer: Viewer::UNKNOWN,
            level_id: 0,
            last_seen: now,
        }
    }

    /// Returns true if nothing has arrived from the peer within `timeout`.
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }

    pub fn send_control(&mut self, packet: &ControlPacket, class: DeliveryClass, now: Instant) {
        match packet.encode() {
            Ok(body) => {
                self.store.send(body, class, now);
            }
            Err(e) => warn!("Failed to encode {:?} for client {}: {}", packet, self.id, e),
        }
    }
}

/// Session changes the world layer needs to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Handshake started; the peer has been welcomed.
    Joined { handle: ClientHandle, client_id: u32 },
    /// The peer is ready for frames; its pool was reset and expects a full
    /// snapshot.
    Ready { handle: ClientHandle, client_id: u32 },
    /// The peer is gone.
    Left { client_id: u32, reason: String },
}

struct Slot {
    generation: u32,
    session: Option<Session>,
}

/// Owns all sessions and drives their per-tick replication work
pub struct ClientManager {
    config: ServerConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    assembler: FrameAssembler,
    next_client_id: u32,
    level_id: u32,
    /// Datagrams for addresses that no longer have a session (goodbyes,
    /// server-full replies).
    farewells: Vec<(SocketAddr, Vec<u8>)>,
}

impl ClientManager {
    /// Creates an empty manager. Client IDs start from 1.
    pub fn new(config: ServerConfig, now: Instant) -> Self {
        let assembler = FrameAssembler::new(config.frame.clone(), now);
        Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            assembler,
            next_client_id: 1,
            level_id: 0,
            farewells: Vec::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn level_id(&self) -> u32 {
        self.level_id
    }

    /// Allocates a session for a new peer
    ///
    /// Fails with `ServerFull` once `max_clients` sessions exist; nothing
    /// else is affected.
    pub fn add_client(&mut self, addr: SocketAddr, now: Instant) -> Result<ClientHandle, ResourceError> {
        if self.len() >= self.config.max_clients {
            return Err(ResourceError::ServerFull {
                max_clients: self.config.max_clients,
            });
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;
        let mut session = Session::new(client_id, addr, &self.config, now);
        session.level_id = self.level_id;

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    session: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let entry = &mut self.slots[slot as usize];
        entry.session = Some(session);

        info!("Client {} connected from {}", client_id, addr);
        Ok(ClientHandle {
            slot,
            generation: entry.generation,
        })
    }

    /// Tears a session down immediately. Pending messages are abandoned.
    pub fn remove_client(&mut self, handle: ClientHandle) -> Option<u32> {
        let slot = self.slots.get_mut(handle.slot())?;
        if slot.generation != handle.generation {
            return None;
        }
        let mut session = slot.session.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.slot);

        session.store.abandon();
        info!("Client {} disconnected", session.id);
        Some(session.id)
    }

    /// Says goodbye (best effort, unreliable) and removes the session.
    pub fn disconnect(&mut self, handle: ClientHandle, reason: &str, now: Instant) -> Option<u32> {
        let addr = self.get(handle)?.addr;
        self.queue_goodbye(addr, reason, now);
        self.remove_client(handle)
    }

    pub fn get(&self, handle: ClientHandle) -> Option<&Session> {
        let slot = self.slots.get(handle.slot())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.session.as_ref()
    }

    pub fn get_mut(&mut self, handle: ClientHandle) -> Option<&mut Session> {
        let slot = self.slots.get_mut(handle.slot())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.session.as_mut()
    }

    /// Finds a session by the peer's network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ClientHandle> {
        self.sessions()
            .find(|(_, session)| session.addr == addr)
            .map(|(handle, _)| handle)
    }

    pub fn sessions(&self) -> impl Iterator<Item = (ClientHandle, &Session)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.session.as_ref().map(|session| {
                (
                    ClientHandle {
                        slot: index as u32,
                        generation: slot.generation,
                    },
                    session,
                )
            })
        })
    }

    fn sessions_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.slots.iter_mut().filter_map(|slot| slot.session.as_mut())
    }

    /// Fans a world change out into every peer's pool
    pub fn register_change(&mut self, change: &WorldChange, now: Instant) {
        for session in self.sessions_mut() {
            session
                .pool
                .register_change(change.delta.clone(), change.origin, now);
        }
    }

    /// Registers a change for a single peer, e.g. the snapshot after `Ready`.
    pub fn register_change_for(&mut self, handle: ClientHandle, change: WorldChange, now: Instant) -> bool {
        match self.get_mut(handle) {
            Some(session) => {
                session.pool.register_change(change.delta, change.origin, now);
                true
            }
            None => false,
        }
    }

    /// Updates the position a peer's deltas are scored against. Untrusted
    /// positions are accepted and simply ignored by scoring.
    pub fn set_viewer(&mut self, handle: ClientHandle, position: [f32; 3]) -> bool {
        let map_bound = self.config.pool.map_bound;
        match self.get_mut(handle) {
            Some(session) => {
                session.viewer = Viewer::new(position, map_bound);
                true
            }
            None => false,
        }
    }

    /// Processes one inbound datagram
    ///
    /// Unknown addresses are only accepted when they open with `Hello`.
    /// Protocol errors are returned for logging; the session survives them.
    pub fn handle_datagram(&mut self, message: &InboundMessage, now: Instant) -> Result<Option<PeerEvent>, NetError> {
        let handle = match self.find_client_by_addr(message.sender) {
            Some(handle) => handle,
            None if is_hello(&message.bytes) => match self.add_client(message.sender, now) {
                Ok(handle) => handle,
                Err(e) => {
                    self.queue_goodbye(message.sender, "Server full", now);
                    return Err(e.into());
                }
            },
            None => {
                trace!("Ignoring datagram from unknown peer {}", message.sender);
                return Ok(None);
            }
        };

        let Some(session) = self.get_mut(handle) else {
            return Ok(None);
        };
        session.last_seen = now;
        let client_id = session.id;

        let body = match session.store.on_receive(&message.bytes, now)? {
            Received::Payload { body, .. } => body,
            _ => return Ok(None),
        };

        match Packet::parse(&body)? {
            Packet::Control(ControlPacket::Hello { client_version }) => {
                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Client {} speaks protocol {}, expected {}",
                        client_id, client_version, PROTOCOL_VERSION
                    );
                    self.disconnect(handle, "Protocol version mismatch", now);
                    return Ok(Some(PeerEvent::Left {
                        client_id,
                        reason: "Protocol version mismatch".to_string(),
                    }));
                }
                let level_id = session.level_id;
                session.send_control(
                    &ControlPacket::Welcome {
                        client_id,
                        level_id,
                    },
                    DeliveryClass::Ordered,
                    now,
                );
                Ok(Some(PeerEvent::Joined { handle, client_id }))
            }
            Packet::Control(ControlPacket::Ready) => {
                session.pool.reset();
                session.ready = true;
                debug!("Client {} ready", client_id);
                Ok(Some(PeerEvent::Ready { handle, client_id }))
            }
            Packet::Control(ControlPacket::Goodbye { reason }) => {
                self.remove_client(handle);
                Ok(Some(PeerEvent::Left { client_id, reason }))
            }
            Packet::FrameAck(ack) => {
                let mut acked = session.pool.acknowledge_set(ack.set);
                for tag in ack.resend_tags {
                    if session.pool.acknowledge_resend(tag) {
                        acked += 1;
                    }
                }
                trace!("Client {} acked set {}: {} deltas", client_id, ack.set, acked);
                Ok(None)
            }
            other => {
                warn!("Unexpected packet from client {}: {:?}", client_id, other);
                Ok(None)
            }
        }
    }

    /// Restarts replication for a new level: every pool is cleared and every
    /// peer has to send `Ready` again.
    ///
    /// An unconfirmed first frame of the old level is cancelled so the store
    /// stops retransmitting it into the new one.
    pub fn change_level(&mut self, level_id: u32, now: Instant) {
        info!("Changing to level {}", level_id);
        self.level_id = level_id;
        for session in self.sessions_mut() {
            if let Some(id) = session.pool.first_frame_message() {
                session.store.cancel(id, now);
            }
            session.level_id = level_id;
            session.pool.reset();
            session.ready = false;
            session.send_control(
                &ControlPacket::LevelChange { level_id },
                DeliveryClass::Ordered,
                now,
            );
        }
    }

    /// Removes peers that have been silent longer than the client timeout
    ///
    /// Returns the client IDs removed so the world can clean up after them.
    pub fn check_timeouts(&mut self, now: Instant) -> Vec<u32> {
        let timeout = self.config.client_timeout;
        let timed_out: Vec<ClientHandle> = self
            .sessions()
            .filter(|(_, session)| session.is_timed_out(now, timeout))
            .map(|(handle, _)| handle)
            .collect();

        timed_out
            .into_iter()
            .filter_map(|handle| {
                let client_id = self.remove_client(handle)?;
                info!("Client {} timed out", client_id);
                Some(client_id)
            })
            .collect()
    }

    /// Builds this tick's frames, staggered across peers
    pub fn transmit_frames(&mut self, tick: u64, now: Instant) -> Vec<(ClientHandle, TransmitOutcome)> {
        let peers = self.len();
        let mut outcomes = Vec::with_capacity(peers);
        let mut index = 0;
        for (slot_index, slot) in self.slots.iter_mut().enumerate() {
            let Some(session) = slot.session.as_mut() else {
                continue;
            };
            let schedule = Schedule { tick, index, peers };
            index += 1;
            let outcome = self.assembler.transmit(session, schedule, now);
            outcomes.push((
                ClientHandle {
                    slot: slot_index as u32,
                    generation: slot.generation,
                },
                outcome,
            ));
        }
        outcomes
    }

    /// Retransmits overdue reliable messages for every peer
    pub fn update(&mut self, now: Instant) {
        for session in self.sessions_mut() {
            session.store.update(now);
        }
    }

    /// Collects every datagram ready for the wire, addressed
    pub fn drain_outbox(&mut self) -> Vec<(SocketAddr, Vec<u8>)> {
        let mut datagrams = std::mem::take(&mut self.farewells);
        for session in self.sessions_mut() {
            let addr = session.addr;
            datagrams.extend(
                session
                    .store
                    .drain_outbox()
                    .into_iter()
                    .map(|datagram| (addr, datagram)),
            );
        }
        datagrams
    }

    /// Says goodbye to everyone and drops all sessions
    pub fn shutdown(&mut self, reason: &str, now: Instant) {
        let handles: Vec<ClientHandle> = self.sessions().map(|(handle, _)| handle).collect();
        for handle in handles {
            self.disconnect(handle, reason, now);
        }
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.session.is_some()).count()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn queue_goodbye(&mut self, addr: SocketAddr, reason: &str, now: Instant) {
        // Goodbyes bypass the session's store since it is about to go away.
        let packet = ControlPacket::Goodbye {
            reason: reason.to_string(),
        };
        let mut store = Store::new(self.config.reliability.clone());
        match packet.encode() {
            Ok(body) => {
                store.send(body, DeliveryClass::Unreliable, now);
                self.farewells
                    .extend(store.drain_outbox().into_iter().map(|d| (addr, d)));
            }
            Err(e) => warn!("Failed to encode goodbye for {}: {}", addr, e),
        }
    }
}

fn is_hello(datagram: &[u8]) -> bool {
    datagram.len() > shared::store::HEADER_LEN
        && matches!(
            Packet::parse(&datagram[shared::store::HEADER_LEN..]),
            Ok(Packet::Control(ControlPacket::Hello { .. }))
        )
}

/// Test suite for session management
///
/// Tests cover the handshake, capacity enforcement, stale handles, timeouts,
/// frame acknowledgement and change fan-out.
#[cfg(test)]
mod tests {
    use super::*;
    use shared::delta::SectorFields;
    use shared::packets::FrameAck;
    use shared::Delta;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn manager(max_clients: usize) -> (ClientManager, Instant) {
        let now = Instant::now();
        let config = ServerConfig {
            max_clients,
            ..Default::default()
        };
        (ClientManager::new(config, now), now)
    }

    /// Wraps a body the way a client store would.
    fn datagram(id: u16, body: Vec<u8>) -> Vec<u8> {
        let mut bytes = id.to_le_bytes().to_vec();
        bytes.extend(body);
        bytes
    }

    fn hello(id: u16) -> Vec<u8> {
        datagram(
            id,
            ControlPacket::Hello {
                client_version: PROTOCOL_VERSION,
            }
            .encode()
            .unwrap(),
        )
    }

    fn light_change(id: u16) -> WorldChange {
        WorldChange {
            delta: Delta::Sector {
                id,
                fields: SectorFields {
                    light: Some(1),
                    ..Default::default()
                },
            },
            origin: None,
        }
    }

    fn connect_ready(manager: &mut ClientManager, addr: SocketAddr, now: Instant) -> ClientHandle {
        let event = manager
            .handle_datagram(&InboundMessage::new(addr, hello(1)), now)
            .unwrap();
        let Some(PeerEvent::Joined { handle, .. }) = event else {
            panic!("Expected join, got {:?}", event);
        };
        let ready = datagram(2, ControlPacket::Ready.encode().unwrap());
        manager
            .handle_datagram(&InboundMessage::new(addr, ready), now)
            .unwrap();
        manager.drain_outbox();
        handle
    }

    #[test]
    fn test_add_client() {
        let (mut manager, now) = manager(2);
        let handle = manager.add_client(test_addr(), now).unwrap();
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.get(handle).unwrap().id, 1);
        assert_eq!(manager.find_client_by_addr(test_addr()), Some(handle));
        assert_eq!(manager.find_client_by_addr(test_addr2()), None);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let (mut manager, now) = manager(1);
        assert!(manager.add_client(test_addr(), now).is_ok());
        assert_eq!(
            manager.add_client(test_addr2(), now),
            Err(ResourceError::ServerFull { max_clients: 1 })
        );
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_stale_handle_misses_reused_slot() {
        let (mut manager, now) = manager(2);
        let old = manager.add_client(test_addr(), now).unwrap();
        assert_eq!(manager.remove_client(old), Some(1));

        let new = manager.add_client(test_addr2(), now).unwrap();
        assert_eq!(new.slot(), old.slot());
        assert!(manager.get(old).is_none());
        assert_eq!(manager.remove_client(old), None);
        assert_eq!(manager.get(new).unwrap().id, 2);
    }

    #[test]
    fn test_handshake() {
        let (mut manager, now) = manager(4);
        let event = manager
            .handle_datagram(&InboundMessage::new(test_addr(), hello(1)), now)
            .unwrap();
        let Some(PeerEvent::Joined { handle, client_id }) = event else {
            panic!("Expected join, got {:?}", event);
        };
        assert_eq!(client_id, 1);
        assert!(!manager.get(handle).unwrap().ready);

        // Confirmation for Hello, then Welcome.
        let outbox = manager.drain_outbox();
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox[0].1, vec![1, 0]);
        match Packet::parse(&outbox[1].1[2..]).unwrap() {
            Packet::Control(ControlPacket::Welcome { client_id, level_id }) => {
                assert_eq!(client_id, 1);
                assert_eq!(level_id, 0);
            }
            other => panic!("Unexpected packet {:?}", other),
        }

        let ready = datagram(2, ControlPacket::Ready.encode().unwrap());
        let event = manager
            .handle_datagram(&InboundMessage::new(test_addr(), ready), now)
            .unwrap();
        assert_eq!(event, Some(PeerEvent::Ready { handle, client_id }));
        assert!(manager.get(handle).unwrap().ready);
    }

    #[test]
    fn test_unknown_peer_without_hello_ignored() {
        let (mut manager, now) = manager(4);
        let ready = datagram(2, ControlPacket::Ready.encode().unwrap());
        let event = manager
            .handle_datagram(&InboundMessage::new(test_addr(), ready), now)
            .unwrap();
        assert_eq!(event, None);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_full_server_says_goodbye() {
        let (mut manager, now) = manager(1);
        manager.add_client(test_addr(), now).unwrap();
        let result = manager.handle_datagram(&InboundMessage::new(test_addr2(), hello(1)), now);
        assert!(matches!(result, Err(NetError::Resource(_))));

        let outbox = manager.drain_outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].0, test_addr2());
        assert!(matches!(
            Packet::parse(&outbox[0].1[2..]),
            Ok(Packet::Control(ControlPacket::Goodbye { .. }))
        ));
    }

    #[test]
    fn test_frame_ack_drains_pool() {
        let (mut manager, now) = manager(4);
        let handle = connect_ready(&mut manager, test_addr(), now);
        manager.register_change(&light_change(1), now);
        manager.register_change(&light_change(2), now);

        let outcomes = manager.transmit_frames(0, now);
        assert!(matches!(outcomes[0].1, TransmitOutcome::Sent { set: 0, .. }));
        assert_eq!(manager.get(handle).unwrap().pool.len(), 2);

        let ack = datagram(0, FrameAck { set: 0, resend_tags: vec![] }.encode());
        manager
            .handle_datagram(&InboundMessage::new(test_addr(), ack), now)
            .unwrap();
        assert!(manager.get(handle).unwrap().pool.is_empty());
    }

    #[test]
    fn test_level_change_cancels_unconfirmed_first_frame() {
        let (mut manager, now) = manager(4);
        let handle = connect_ready(&mut manager, test_addr(), now);
        manager.register_change(&light_change(1), now);
        let outcomes = manager.transmit_frames(0, now);
        assert!(matches!(outcomes[0].1, TransmitOutcome::Sent { first: true, .. }));
        // The first frame never reaches the client.
        manager.drain_outbox();

        manager.change_level(2, now);
        let session = manager.get(handle).unwrap();
        assert_eq!(session.level_id, 2);
        assert!(session.pool.is_empty());
        assert_eq!(manager.level_id(), 2);

        manager.update(now + Duration::from_secs(5));
        for (_, datagram) in manager.drain_outbox() {
            if datagram.len() > 2 {
                assert!(
                    !matches!(Packet::parse(&datagram[2..]), Ok(Packet::Frame { .. })),
                    "old level frame retransmitted"
                );
            }
        }
    }

    #[test]
    fn test_changes_fan_out_to_every_peer() {
        let (mut manager, now) = manager(4);
        let a = manager.add_client(test_addr(), now).unwrap();
        let b = manager.add_client(test_addr2(), now).unwrap();
        manager.register_change(&light_change(9), now);
        assert_eq!(manager.get(a).unwrap().pool.len(), 1);
        assert_eq!(manager.get(b).unwrap().pool.len(), 1);

        assert!(manager.register_change_for(a, light_change(10), now));
        assert_eq!(manager.get(a).unwrap().pool.len(), 2);
        assert_eq!(manager.get(b).unwrap().pool.len(), 1);
    }

    #[test]
    fn test_check_timeouts() {
        let (mut manager, now) = manager(4);
        let a = manager.add_client(test_addr(), now).unwrap();
        manager.add_client(test_addr2(), now).unwrap();
        manager.get_mut(a).unwrap().last_seen = now + Duration::from_secs(10);

        let removed = manager.check_timeouts(now + Duration::from_secs(6));
        assert_eq!(removed, vec![2]);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_goodbye_removes_client() {
        let (mut manager, now) = manager(4);
        connect_ready(&mut manager, test_addr(), now);
        let goodbye = datagram(
            3,
            ControlPacket::Goodbye {
                reason: "Quit".to_string(),
            }
            .encode()
            .unwrap(),
        );
        let event = manager
            .handle_datagram(&InboundMessage::new(test_addr(), goodbye), now)
            .unwrap();
        assert_eq!(
            event,
            Some(PeerEvent::Left {
                client_id: 1,
                reason: "Quit".to_string()
            })
        );
        assert!(manager.is_empty());
    }

    #[test]
    fn test_level_change_requires_ready_again() {
        let (mut manager, now) = manager(4);
        let handle = connect_ready(&mut manager, test_addr(), now);
        manager.register_change(&light_change(1), now);

        manager.change_level(2, now);
        let session = manager.get(handle).unwrap();
        assert!(!session.ready);
        assert!(session.pool.is_empty());
        assert!(session.pool.is_first_frame());
    }

    #[test]
    fn test_protocol_error_keeps_session() {
        let (mut manager, now) = manager(4);
        let handle = connect_ready(&mut manager, test_addr(), now);
        let garbage = datagram(0, vec![0x7f, 1, 2]);
        let result = manager.handle_datagram(&InboundMessage::new(test_addr(), garbage), now);
        assert!(matches!(result, Err(NetError::Protocol(_))));
        assert!(manager.get(handle).is_some());
    }
}
