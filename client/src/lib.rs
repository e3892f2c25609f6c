//! # World Sync Client Library
//!
//! This library provides the receiving side of world-state replication: a
//! headless client that connects to the server, keeps a mirror of the
//! replicated world up to date, and acknowledges every frame it receives.
//!
//! ## Architecture Overview
//!
//! ### Handshake
//! The client sends `Hello` (confirmed), answers `Welcome` with `Ready`
//! (confirmed) and from then on receives frames. A level change clears the
//! mirror and asks for `Ready` again.
//!
//! ### Frame Application
//! Each frame's deltas are folded into the mirror in order. Deltas marked as
//! resent carry the set they were first sent in plus a resend tag; the pair
//! is remembered so a resend that arrives twice is applied only once and can
//! never roll a newer value back.
//!
//! ### Acknowledgement
//! Every frame is answered with an unreliable ack naming its set and the
//! resend tags it carried. Lost acks are harmless: the server resends and
//! the client acks again.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The client-side world mirror and the queue of received sound events.
//!
//! ### Network Module (`network`)
//! Protocol state (`ClientSession`) and the UDP client around it.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use shared::ReliabilityConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:8080", 0, ReliabilityConfig::default()).await?;
//!
//!     // Mirror the world for ten seconds, then say goodbye.
//!     client.run(Some(Duration::from_secs(10))).await?;
//!     println!("Tracking {} entities", client.session().world().entity_count());
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
