//! # World Sync Shared Library
//!
//! Protocol pieces used by both ends of a world-state synchronization link:
//! the server replicates authoritative world state to clients over UDP, and
//! this crate defines everything the two sides have to agree on.
//!
//! ## Module Organization
//!
//! ### Delta Codec (`delta`, `wire`, `fixed`)
//! A delta is one entity's changed fields. Each entity kind (objects,
//! players, sectors, sides, polyobjs, sounds) has its own field set and
//! flag word; only present fields are written, in flag-bit order. Values are
//! narrowed from 16.16 fixed point on the wire.
//!
//! ### Reliable Message Store (`store`, `history`)
//! Per-peer bookkeeping on top of fire-and-forget datagrams:
//! - Unreliable messages go out once and are forgotten
//! - Confirmed messages are resent on an adaptive timer until confirmed
//! - Ordered messages also wait for their predecessor's confirmation
//! - Inbound ids are deduplicated against a bounded history
//!
//! ### Packets (`packets`)
//! Body layouts for control traffic (bincode), frames and frame acks.
//!
//! ### Inbound Queue (`inbound`)
//! Bounded multi-producer queue from the socket tasks into the tick loop.
//!
//! ### Errors and Configuration (`error`, `config`)
//! Protocol errors drop the offending message and keep the connection.
//! Reliability constants are configurable defaults.

pub mod config;
pub mod delta;
pub mod error;
pub mod fixed;
pub mod history;
pub mod inbound;
pub mod packets;
pub mod store;
pub mod wire;

pub use config::ReliabilityConfig;
pub use delta::{Delta, DeltaKind, EntityKey, SoundEmitter};
pub use error::{ConfigError, NetError, ProtocolError, ResourceError};
pub use fixed::{Angle, Fixed};
pub use inbound::{InboundMessage, InboundQueue, InboundSender};
pub use packets::{ControlPacket, FrameAck, FrameHeader, Packet, PacketType};
pub use store::{DeliveryClass, MessageId, Received, Store};
