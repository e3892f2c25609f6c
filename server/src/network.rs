//! Server network layer handling UDP communications and tick coordination
//!
//! Two long-lived tasks sit on the socket: the receiver pushes every datagram
//! into the bounded inbound queue, and the sender writes whatever the tick
//! loop hands it. The tick loop itself owns all replication state, so no
//! locks are involved.

use crate::client_manager::{ClientManager, PeerEvent};
use crate::config::ServerConfig;
use crate::frame::TransmitOutcome;
use crate::game::GameState;
use crate::pool::WorldChange;
use log::{debug, error, info, trace, warn};
use shared::config::MAX_DATAGRAM_SIZE;
use shared::{InboundMessage, InboundQueue, InboundSender, NetError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Datagram ready for the wire
pub type Outgoing = (SocketAddr, Vec<u8>);

/// Caps a single tick's simulation step after a stall
const MAX_DELTA_TIME: f32 = 0.05;

/// Everything the server does per tick, without the socket
///
/// Kept separate from [`Server`] so the whole replication path can be driven
/// in-process.
pub struct ServerLoop {
    pub clients: ClientManager,
    pub game: GameState,
    tick: u64,
}

impl ServerLoop {
    pub fn new(config: ServerConfig, game: GameState, now: Instant) -> Self {
        Self {
            clients: ClientManager::new(config, now),
            game,
            tick: 0,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Processes one inbound datagram. Bad datagrams are logged and dropped.
    pub fn handle_datagram(&mut self, message: &InboundMessage, now: Instant) {
        match self.clients.handle_datagram(message, now) {
            Ok(Some(event)) => self.on_peer_event(event, now),
            Ok(None) => {}
            Err(NetError::Protocol(e)) => {
                warn!("Dropping datagram from {}: {}", message.sender, e)
            }
            Err(e) => warn!("Rejected {}: {}", message.sender, e),
        }
    }

    fn on_peer_event(&mut self, event: PeerEvent, now: Instant) {
        match event {
            PeerEvent::Joined { client_id, .. } => {
                let change = self.game.add_player(client_id);
                self.clients.register_change(&change, now);
            }
            PeerEvent::Ready { handle, client_id } => {
                let snapshot = self.game.snapshot();
                debug!(
                    "Sending snapshot of {} changes to client {}",
                    snapshot.len(),
                    client_id
                );
                for change in snapshot {
                    self.clients.register_change_for(handle, change, now);
                }
            }
            PeerEvent::Left { client_id, reason } => {
                info!("Client {} left: {}", client_id, reason);
                self.remove_player(client_id, now);
            }
        }
    }

    fn remove_player(&mut self, client_id: u32, now: Instant) {
        if let Some(change) = self.game.remove_player(client_id) {
            self.clients.register_change(&change, now);
        }
    }

    /// Runs one server tick and returns the datagrams to send
    pub fn tick(&mut self, dt: f32, now: Instant) -> Vec<Outgoing> {
        for client_id in self.clients.check_timeouts(now) {
            self.remove_player(client_id, now);
        }

        let changes: Vec<WorldChange> = self.game.step(dt.min(MAX_DELTA_TIME));
        for change in &changes {
            self.clients.register_change(change, now);
        }

        let viewers: Vec<_> = self
            .clients
            .sessions()
            .filter_map(|(handle, session)| {
                self.game
                    .viewer_position(session.id)
                    .map(|position| (handle, position))
            })
            .collect();
        for (handle, position) in viewers {
            self.clients.set_viewer(handle, position);
        }

        let sent = self
            .clients
            .transmit_frames(self.tick, now)
            .into_iter()
            .filter(|(_, outcome)| matches!(outcome, TransmitOutcome::Sent { .. }))
            .count();
        self.clients.update(now);

        if self.tick % 100 == 0 && !self.clients.is_empty() {
            debug!(
                "Tick {}: {} clients, {} changes, {} frames",
                self.tick,
                self.clients.len(),
                changes.len(),
                sent
            );
        }
        self.tick += 1;
        self.clients.drain_outbox()
    }

    /// Says goodbye to everyone; returns the final datagrams
    pub fn shutdown(&mut self, now: Instant) -> Vec<Outgoing> {
        self.clients.shutdown("Server shutting down", now);
        self.clients.drain_outbox()
    }
}

/// Main server coordinating the socket tasks and the tick loop
pub struct Server {
    socket: Arc<UdpSocket>,
    core: ServerLoop,
    tick_duration: Duration,

    // Communication channels
    inbound_tx: InboundSender,
    inbound: InboundQueue,
    outbound_tx: Option<mpsc::UnboundedSender<Outgoing>>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outgoing>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: ServerConfig,
        game: GameState,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let tick_duration = config.tick_duration();
        let (inbound_tx, inbound) = InboundQueue::new(config.reliability.inbound_queue_capacity);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            core: ServerLoop::new(config, game, Instant::now()),
            tick_duration,
            inbound_tx,
            inbound,
            outbound_tx: Some(outbound_tx),
            outbound_rx: Some(outbound_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let inbound_tx = self.inbound_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE * 2];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        inbound_tx.push(InboundMessage::new(addr, buffer[..len].to_vec()));
                    }
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Spawns task that drains the outgoing datagram queue
    fn spawn_network_sender(&mut self) -> Option<JoinHandle<()>> {
        let socket = Arc::clone(&self.socket);
        let mut outbound_rx = self.outbound_rx.take()?;

        Some(tokio::spawn(async move {
            while let Some((addr, datagram)) = outbound_rx.recv().await {
                if let Err(e) = socket.send_to(&datagram, addr).await {
                    error!("Failed to send datagram to {}: {}", addr, e);
                }
            }
        }))
    }

    fn send_all(&self, datagrams: Vec<Outgoing>) {
        let Some(outbound_tx) = &self.outbound_tx else {
            return;
        };
        for datagram in datagrams {
            if outbound_tx.send(datagram).is_err() {
                error!("Sender task is gone");
                return;
            }
        }
    }

    /// Main server loop; returns after Ctrl+C once goodbyes are flushed
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let receiver = self.spawn_network_receiver();
        let sender = self.spawn_network_sender();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    let inbound = self.inbound.drain();
                    if !inbound.is_empty() {
                        trace!("Processing {} datagrams", inbound.len());
                    }
                    for message in &inbound {
                        self.core.handle_datagram(message, now);
                    }

                    let outgoing = self.core.tick(dt, now);
                    self.send_all(outgoing);
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down gracefully...");
                    break;
                }
            }
        }

        let farewells = self.core.shutdown(Instant::now());
        self.send_all(farewells);
        self.outbound_tx = None;
        if let Some(sender) = sender {
            sender.await?;
        }
        receiver.abort();

        if self.inbound.dropped() > 0 {
            warn!("Dropped {} inbound datagrams in total", self.inbound.dropped());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::packets::PROTOCOL_VERSION;
    use shared::{ControlPacket, Packet};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn datagram(id: u16, packet: ControlPacket) -> InboundMessage {
        let mut bytes = id.to_le_bytes().to_vec();
        bytes.extend(packet.encode().unwrap());
        InboundMessage::new(test_addr(), bytes)
    }

    fn server_loop() -> (ServerLoop, Instant) {
        let now = Instant::now();
        let config = ServerConfig {
            frame: crate::config::FrameConfig {
                frame_interval: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        (ServerLoop::new(config, GameState::new(1, 3, 2), now), now)
    }

    #[test]
    fn test_join_spawns_player() {
        let (mut core, now) = server_loop();
        core.handle_datagram(
            &datagram(
                1,
                ControlPacket::Hello {
                    client_version: PROTOCOL_VERSION,
                },
            ),
            now,
        );
        assert_eq!(core.clients.len(), 1);
        assert!(core.game.viewer_position(1).is_some());
    }

    #[test]
    fn test_ready_client_receives_first_frame() {
        let (mut core, now) = server_loop();
        core.handle_datagram(
            &datagram(
                1,
                ControlPacket::Hello {
                    client_version: PROTOCOL_VERSION,
                },
            ),
            now,
        );
        core.handle_datagram(&datagram(2, ControlPacket::Ready), now);

        let outgoing = core.tick(0.03, now);
        let frames: Vec<_> = outgoing
            .iter()
            .filter(|(_, bytes)| bytes.len() > 2)
            .filter_map(|(_, bytes)| Packet::parse(&bytes[2..]).ok())
            .filter(|packet| matches!(packet, Packet::Frame { .. }))
            .collect();
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Packet::Frame { header, deltas } => {
                assert!(header.first);
                assert!(!deltas.is_empty());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_goodbye_removes_player() {
        let (mut core, now) = server_loop();
        core.handle_datagram(
            &datagram(
                1,
                ControlPacket::Hello {
                    client_version: PROTOCOL_VERSION,
                },
            ),
            now,
        );
        core.handle_datagram(
            &datagram(
                2,
                ControlPacket::Goodbye {
                    reason: "Bye".to_string(),
                },
            ),
            now,
        );
        assert!(core.clients.is_empty());
        assert!(core.game.viewer_position(1).is_none());
    }

    #[test]
    fn test_silent_client_times_out() {
        let (mut core, now) = server_loop();
        core.handle_datagram(
            &datagram(
                1,
                ControlPacket::Hello {
                    client_version: PROTOCOL_VERSION,
                },
            ),
            now,
        );
        core.tick(0.03, now + Duration::from_secs(10));
        assert!(core.clients.is_empty());
        assert!(core.game.players.is_empty());
    }

    #[test]
    fn test_shutdown_says_goodbye() {
        let (mut core, now) = server_loop();
        core.handle_datagram(
            &datagram(
                1,
                ControlPacket::Hello {
                    client_version: PROTOCOL_VERSION,
                },
            ),
            now,
        );
        let farewells = core.shutdown(now);
        assert!(farewells.iter().any(|(_, bytes)| matches!(
            Packet::parse(&bytes[2..]),
            Ok(Packet::Control(ControlPacket::Goodbye { .. }))
        )));
        assert!(core.clients.is_empty());
    }
}
