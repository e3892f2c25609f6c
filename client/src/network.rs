//! Client network layer: handshake, frame application and acknowledgement

use crate::game::ClientWorld;
use log::{debug, error, info, trace, warn};
use shared::history::IdHistory;
use shared::packets::{FrameHeader, PROTOCOL_VERSION};
use shared::{
    ControlPacket, DeliveryClass, FrameAck, NetError, Packet, Received, ReliabilityConfig, Store,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Hello sent, waiting for Welcome.
    Connecting,
    /// Ready sent; frames are expected.
    Ready { client_id: u32 },
    Closed { reason: String },
}

/// What a datagram did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Welcomed { client_id: u32 },
    LevelChanged { level_id: u32 },
    Frame {
        set: u8,
        first: bool,
        applied: usize,
        /// Resent deltas we had already applied.
        skipped: usize,
    },
    Closed { reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub frames: u64,
    pub deltas_applied: u64,
    pub resends_skipped: u64,
    /// Frames built for a level we already left.
    pub stale_frames: u64,
}

/// Protocol state of one client, without the socket
pub struct ClientSession {
    store: Store,
    state: ConnectionState,
    world: ClientWorld,
    /// (generation set, resend tag) of resent deltas already applied
    applied_resends: IdHistory<(u8, u8)>,
    /// Low byte of the current level, as carried in frame headers
    level: Option<u8>,
    last_frame: Option<FrameHeader>,
    stats: ClientStats,
}

impl ClientSession {
    pub fn new(config: ReliabilityConfig) -> Self {
        let applied_resends = IdHistory::new(config.history_size * 2);
        Self {
            store: Store::new(config),
            state: ConnectionState::Disconnected,
            world: ClientWorld::new(),
            applied_resends,
            level: None,
            last_frame: None,
            stats: ClientStats::default(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn client_id(&self) -> Option<u32> {
        match self.state {
            ConnectionState::Ready { client_id } => Some(client_id),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ConnectionState::Closed { .. })
    }

    pub fn world(&self) -> &ClientWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut ClientWorld {
        &mut self.world
    }

    pub fn last_frame(&self) -> Option<FrameHeader> {
        self.last_frame
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Starts the handshake
    pub fn connect(&mut self, now: Instant) {
        info!("Connecting to server...");
        self.send_control(
            &ControlPacket::Hello {
                client_version: PROTOCOL_VERSION,
            },
            DeliveryClass::Ordered,
            now,
        );
        self.state = ConnectionState::Connecting;
    }

    /// Tells the server we are leaving. Best effort.
    pub fn disconnect(&mut self, now: Instant) {
        if self.is_closed() {
            return;
        }
        self.send_control(
            &ControlPacket::Goodbye {
                reason: "Client quit".to_string(),
            },
            DeliveryClass::Unreliable,
            now,
        );
        self.state = ConnectionState::Closed {
            reason: "Client quit".to_string(),
        };
    }

    fn send_control(&mut self, packet: &ControlPacket, class: DeliveryClass, now: Instant) {
        match packet.encode() {
            Ok(body) => {
                self.store.send(body, class, now);
            }
            Err(e) => error!("Failed to encode {:?}: {}", packet, e),
        }
    }

    /// Processes one datagram from the server
    pub fn handle_datagram(&mut self, raw: &[u8], now: Instant) -> Result<Option<ClientEvent>, NetError> {
        let body = match self.store.on_receive(raw, now)? {
            Received::Payload { body, .. } => body,
            _ => return Ok(None),
        };

        match Packet::parse(&body)? {
            Packet::Control(ControlPacket::Welcome { client_id, level_id }) => {
                info!("Connected! Client ID: {}", client_id);
                self.world.clear();
                self.level = Some(level_id as u8);
                self.send_control(&ControlPacket::Ready, DeliveryClass::Confirmed, now);
                self.state = ConnectionState::Ready { client_id };
                Ok(Some(ClientEvent::Welcomed { client_id }))
            }
            Packet::Control(ControlPacket::LevelChange { level_id }) => {
                info!("Level changed to {}", level_id);
                self.world.clear();
                self.applied_resends.clear();
                self.level = Some(level_id as u8);
                self.send_control(&ControlPacket::Ready, DeliveryClass::Confirmed, now);
                Ok(Some(ClientEvent::LevelChanged { level_id }))
            }
            Packet::Control(ControlPacket::Goodbye { reason }) => {
                warn!("Disconnected: {}", reason);
                self.state = ConnectionState::Closed {
                    reason: reason.clone(),
                };
                Ok(Some(ClientEvent::Closed { reason }))
            }
            Packet::Frame { header, .. } if self.level != Some(header.level) => {
                trace!(
                    "Dropping frame {} built for level byte {}",
                    header.set,
                    header.level
                );
                self.stats.stale_frames += 1;
                Ok(None)
            }
            Packet::Frame { header, deltas } => {
                let mut applied = 0;
                let mut skipped = 0;
                let mut resend_tags = Vec::new();
                for decoded in &deltas {
                    if let Some(resent) = decoded.resent {
                        resend_tags.push(resent.tag);
                        if !self.applied_resends.insert((resent.set, resent.tag)) {
                            skipped += 1;
                            continue;
                        }
                    }
                    self.world.apply(&decoded.delta);
                    applied += 1;
                }

                let ack = FrameAck {
                    set: header.set,
                    resend_tags,
                };
                self.store.send(ack.encode(), DeliveryClass::Unreliable, now);

                self.stats.frames += 1;
                self.stats.deltas_applied += applied as u64;
                self.stats.resends_skipped += skipped as u64;
                self.last_frame = Some(header);
                trace!(
                    "Frame {}: {} applied, {} skipped",
                    header.set,
                    applied,
                    skipped
                );
                Ok(Some(ClientEvent::Frame {
                    set: header.set,
                    first: header.first,
                    applied,
                    skipped,
                }))
            }
            other => {
                warn!("Unexpected packet: {:?}", other);
                Ok(None)
            }
        }
    }

    /// Retransmits anything overdue
    pub fn update(&mut self, now: Instant) {
        self.store.update(now);
    }

    pub fn drain_outbox(&mut self) -> Vec<Vec<u8>> {
        self.store.drain_outbox()
    }
}

/// Headless client connected to a server over UDP
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    session: ClientSession,
    fake_ping_ms: u64,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
        config: ReliabilityConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            session: ClientSession::new(config),
            fake_ping_ms,
        })
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    async fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let outbox = self.session.drain_outbox();
        if outbox.is_empty() {
            return Ok(());
        }
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }
        for datagram in outbox {
            self.socket.send_to(&datagram, self.server_addr).await?;
        }
        Ok(())
    }

    /// Runs until the server says goodbye, Ctrl+C, or `duration` elapses
    pub async fn run(&mut self, duration: Option<Duration>) -> Result<(), Box<dyn std::error::Error>> {
        let started = Instant::now();
        self.session.connect(started);
        self.flush().await?;

        let mut update_interval = interval(Duration::from_millis(20));
        let mut stats_interval = interval(Duration::from_secs(5));
        let mut buffer = [0u8; 2048];

        while !self.session.is_closed() {
            if duration.is_some_and(|limit| started.elapsed() >= limit) {
                break;
            }

            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, addr)) if addr == self.server_addr => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }
                            if let Err(e) = self.session.handle_datagram(&buffer[..len], Instant::now()) {
                                debug!("Dropping datagram: {}", e);
                            }
                            self.flush().await?;
                        },
                        Ok((_, addr)) => trace!("Ignoring datagram from {}", addr),
                        Err(e) => error!("Error receiving datagram: {}", e),
                    }
                },

                _ = update_interval.tick() => {
                    self.session.update(Instant::now());
                    self.flush().await?;
                },

                _ = stats_interval.tick() => {
                    let stats = self.session.stats();
                    let world = self.session.world();
                    info!(
                        "{} frames, {} deltas applied, {} resends skipped; tracking {} objects, {} sectors",
                        stats.frames,
                        stats.deltas_applied,
                        stats.resends_skipped,
                        world.objects.len(),
                        world.sectors.len()
                    );
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, disconnecting...");
                    break;
                }
            }
        }

        if !self.session.is_closed() {
            self.session.disconnect(Instant::now());
            self.flush().await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::delta::{self, Resent, SectorFields};
    use shared::wire::ByteWriter;
    use shared::Delta;

    fn server_datagram(id: u16, body: Vec<u8>) -> Vec<u8> {
        let mut bytes = id.to_le_bytes().to_vec();
        bytes.extend(body);
        bytes
    }

    fn sector(id: u16, light: u8) -> Delta {
        Delta::Sector {
            id,
            fields: SectorFields {
                light: Some(light),
                ..Default::default()
            },
        }
    }

    fn frame(set: u8, deltas: &[(Delta, Option<Resent>)]) -> Vec<u8> {
        frame_for_level(0, set, deltas)
    }

    fn frame_for_level(level: u8, set: u8, deltas: &[(Delta, Option<Resent>)]) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        FrameHeader {
            first: false,
            level,
            set,
            timestamp: 0,
        }
        .write(&mut writer);
        for (delta, resent) in deltas {
            match resent {
                Some(resent) => delta::encode_resent(delta, *resent, &mut writer).unwrap(),
                None => delta::encode(delta, &mut writer).unwrap(),
            }
        }
        server_datagram(0, writer.into_bytes())
    }

    fn welcomed(now: Instant) -> ClientSession {
        let mut session = ClientSession::new(ReliabilityConfig::default());
        session.connect(now);
        let welcome = ControlPacket::Welcome {
            client_id: 7,
            level_id: 0,
        }
        .encode()
        .unwrap();
        session
            .handle_datagram(&server_datagram(1, welcome), now)
            .unwrap();
        session.drain_outbox();
        session
    }

    #[test]
    fn test_welcome_answers_ready() {
        let now = Instant::now();
        let mut session = ClientSession::new(ReliabilityConfig::default());
        session.connect(now);
        assert_eq!(session.state(), &ConnectionState::Connecting);

        let welcome = ControlPacket::Welcome {
            client_id: 7,
            level_id: 0,
        }
        .encode()
        .unwrap();
        let event = session
            .handle_datagram(&server_datagram(1, welcome), now)
            .unwrap();
        assert_eq!(event, Some(ClientEvent::Welcomed { client_id: 7 }));
        assert_eq!(session.client_id(), Some(7));

        let outbox = session.drain_outbox();
        // Hello, confirmation of Welcome, Ready.
        assert_eq!(outbox.len(), 3);
        assert_eq!(outbox[1], vec![1, 0]);
        assert_eq!(
            Packet::parse(&outbox[2][2..]).unwrap(),
            Packet::Control(ControlPacket::Ready)
        );
    }

    #[test]
    fn test_frame_is_applied_and_acked() {
        let now = Instant::now();
        let mut session = welcomed(now);
        let event = session
            .handle_datagram(&frame(4, &[(sector(1, 50), None), (sector(2, 60), None)]), now)
            .unwrap();
        assert_eq!(
            event,
            Some(ClientEvent::Frame {
                set: 4,
                first: false,
                applied: 2,
                skipped: 0
            })
        );
        assert_eq!(session.world().sectors[&2].light, Some(60));

        let outbox = session.drain_outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(
            Packet::parse(&outbox[0][2..]).unwrap(),
            Packet::FrameAck(FrameAck {
                set: 4,
                resend_tags: vec![]
            })
        );
    }

    #[test]
    fn test_repeated_resend_applied_once_but_acked_twice() {
        let now = Instant::now();
        let mut session = welcomed(now);
        let resent = Some(Resent { set: 2, tag: 9 });

        session
            .handle_datagram(&frame(5, &[(sector(1, 50), resent)]), now)
            .unwrap();
        // A newer value arrives before the resend is seen again.
        session
            .handle_datagram(&frame(6, &[(sector(1, 70), None)]), now)
            .unwrap();
        let event = session
            .handle_datagram(&frame(7, &[(sector(1, 50), resent)]), now)
            .unwrap();

        assert!(matches!(
            event,
            Some(ClientEvent::Frame {
                applied: 0,
                skipped: 1,
                ..
            })
        ));
        assert_eq!(session.world().sectors[&1].light, Some(70));

        let acks: Vec<_> = session
            .drain_outbox()
            .iter()
            .map(|datagram| Packet::parse(&datagram[2..]).unwrap())
            .collect();
        assert_eq!(
            acks.last(),
            Some(&Packet::FrameAck(FrameAck {
                set: 7,
                resend_tags: vec![9]
            }))
        );
    }

    #[test]
    fn test_level_change_clears_world() {
        let now = Instant::now();
        let mut session = welcomed(now);
        session
            .handle_datagram(&frame(0, &[(sector(1, 50), None)]), now)
            .unwrap();
        let level = ControlPacket::LevelChange { level_id: 3 }.encode().unwrap();
        let event = session
            .handle_datagram(&server_datagram(2, level), now)
            .unwrap();
        assert_eq!(event, Some(ClientEvent::LevelChanged { level_id: 3 }));
        assert_eq!(session.world().entity_count(), 0);
    }

    #[test]
    fn test_frames_from_previous_level_are_dropped() {
        let now = Instant::now();
        let mut session = welcomed(now);
        let level = ControlPacket::LevelChange { level_id: 3 }.encode().unwrap();
        session
            .handle_datagram(&server_datagram(2, level), now)
            .unwrap();
        session.drain_outbox();

        // A copy of a level 0 frame still arrives after the change.
        let event = session
            .handle_datagram(&frame(0, &[(sector(1, 50), None)]), now)
            .unwrap();
        assert_eq!(event, None);
        assert_eq!(session.world().entity_count(), 0);
        assert_eq!(session.stats().stale_frames, 1);
        assert!(session.drain_outbox().is_empty(), "stale frames are not acked");

        let event = session
            .handle_datagram(&frame_for_level(3, 0, &[(sector(2, 60), None)]), now)
            .unwrap();
        assert!(matches!(event, Some(ClientEvent::Frame { applied: 1, .. })));
        assert_eq!(session.world().sectors[&2].light, Some(60));
    }

    #[test]
    fn test_goodbye_closes() {
        let now = Instant::now();
        let mut session = welcomed(now);
        let goodbye = ControlPacket::Goodbye {
            reason: "Server shutting down".to_string(),
        }
        .encode()
        .unwrap();
        session
            .handle_datagram(&server_datagram(0, goodbye), now)
            .unwrap();
        assert!(session.is_closed());
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        let now = Instant::now();
        let mut session = welcomed(now);
        let mut bytes = frame(1, &[(sector(1, 50), None)]);
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            session.handle_datagram(&bytes, now),
            Err(NetError::Protocol(_))
        ));
        assert_eq!(session.world().entity_count(), 0);
    }
}
