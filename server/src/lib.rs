//! # World Sync Server Library
//!
//! This library provides the authoritative side of world-state replication.
//! The world reports what changed each tick; the server keeps, per connected
//! peer, everything that peer has not acknowledged yet and streams it out in
//! size-bounded frames, most relevant changes first.
//!
//! ## Core Responsibilities
//!
//! ### Change Tracking
//! Every world change is registered into each peer's pool. Changes to the
//! same entity coalesce while unsent, and newer fields are stripped from
//! older unacknowledged deltas so a late resend never rolls state back.
//!
//! ### Prioritization
//! Before each frame the pool is scored against the peer's viewpoint:
//! nearby entities and important kinds go first, waiting raises a delta's
//! score, removals are boosted, and anything beyond the far radius waits.
//!
//! ### Frame Assembly
//! Frames are built from the top of the priority queue until the next delta
//! would break the byte budget. The first frame after a (re)start is sent
//! reliably; ordinary frames are fire-and-forget and recovered through the
//! pool's own resend logic.
//!
//! ### Client Management
//! Handles the complete lifecycle of client connections including:
//! - Hello/Welcome/Ready handshake and level changes
//! - Frame acknowledgements by set and by resend tag
//! - Timeout detection and cleanup
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Tick Loop
//! All replication state is owned by one tick loop. Socket tasks only move
//! bytes: the receiver feeds the bounded inbound queue, and the sender drains
//! an outgoing channel. No locks guard the pools or stores.
//!
//! ### Per-Peer Isolation
//! Pools, stores and bandwidth ratings are per peer. One slow peer never
//! delays frames to another, and each peer's frames are staggered across the
//! frame interval.
//!
//! ## Module Organization
//!
//! ### Pool (`pool`, `priority`, `bandwidth`)
//! Per-peer pending deltas, relevance scoring and the adaptive frame budget.
//!
//! ### Frame Assembler (`frame`)
//! Turns a pool into at most one datagram per scheduled tick.
//!
//! ### Client Manager (`client_manager`)
//! Session arena, handshake and acknowledgement handling.
//!
//! ### Network (`network`)
//! UDP socket tasks and the tick loop.
//!
//! ### Game (`game`)
//! A small demo world that generates changes to replicate.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::game::GameState;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let game = GameState::new(1, 64, 32);
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default(), game).await?;
//!
//!     // Runs until Ctrl+C, then says goodbye to every client.
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bandwidth;
pub mod client_manager;
pub mod config;
pub mod frame;
pub mod game;
pub mod network;
pub mod pool;
pub mod priority;
