//! Error types shared by the server and client crates

use thiserror::Error;

/// Malformed or unexpected bytes from a peer. The offending message is
/// dropped; the connection survives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Truncated input: needed {needed} more bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("Unknown delta type tag 0x{0:02x}")]
    UnknownTypeTag(u8),

    #[error("Undefined field flags 0x{0:x}")]
    UnknownFlags(u32),

    #[error("Unknown packet type 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("Refusing to encode a delta with no changed fields")]
    EmptyDelta,

    #[error("Datagram of {0} bytes is too short to carry a message header")]
    ShortDatagram(usize),

    #[error("Malformed control packet: {0}")]
    BadControl(String),
}

/// Failure to allocate per-peer state. Fatal only to the triggering operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Server full ({max_clients} clients)")]
    ServerFull { max_clients: usize },
}

/// Invalid configuration value
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be > 0")]
    Zero { field: &'static str },

    #[error("{low} ({low_value}) must not exceed {high} ({high_value})")]
    Inverted {
        low: &'static str,
        low_value: f64,
        high: &'static str,
        high_value: f64,
    },

    #[error("{field} ({value}) exceeds the transport limit of {limit} bytes")]
    ExceedsTransport {
        field: &'static str,
        value: usize,
        limit: usize,
    },
}

/// Umbrella error used at task and binary boundaries
#[derive(Debug, Error)]
pub enum NetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, NetError>;
