//! Message bodies carried inside store datagrams
//!
//! The first body byte is the packet type. Control traffic (handshake, level
//! changes, goodbye) is a serde enum encoded with bincode; frames and frame
//! acks use the compact hand-written layouts below since they make up nearly
//! all of the bandwidth.
//!
//! ```text
//! frame      0x10|0x11  level u8  set u8  timestamp u32  delta...
//! frame ack  0x12       set u8  count u8       resend tag...
//! ```

use crate::delta::{self, DecodedDelta};
use crate::error::ProtocolError;
use crate::store;
use crate::wire::{ByteReader, ByteWriter};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;

/// Type byte, level, set and timestamp.
pub const FRAME_HEADER_LEN: usize = 7;

/// Bytes of a frame datagram that are not deltas.
pub const FRAME_OVERHEAD: usize = store::HEADER_LEN + FRAME_HEADER_LEN;

/// Most resend tags a single ack can carry.
pub const MAX_ACK_TAGS: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Control = 0x01,
    Frame = 0x10,
    FirstFrame = 0x11,
    FrameAck = 0x12,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(PacketType::Control),
            0x10 => Ok(PacketType::Frame),
            0x11 => Ok(PacketType::FirstFrame),
            0x12 => Ok(PacketType::FrameAck),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// Session control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlPacket {
    // Client to server
    Hello { client_version: u32 },
    Ready,

    // Server to client
    Welcome { client_id: u32, level_id: u32 },
    LevelChange { level_id: u32 },

    // Either direction
    Goodbye { reason: String },
}

impl ControlPacket {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut body = vec![PacketType::Control as u8];
        let payload =
            bincode::serialize(self).map_err(|e| ProtocolError::BadControl(e.to_string()))?;
        body.extend_from_slice(&payload);
        Ok(body)
    }
}

/// Header written at the front of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub first: bool,
    /// Low byte of the level the frame was built for. Frames from a
    /// previous level are discarded by the client.
    pub level: u8,
    pub set: u8,
    /// Milliseconds since the server started.
    pub timestamp: u32,
}

impl FrameHeader {
    pub fn write(&self, writer: &mut ByteWriter) {
        let packet_type = if self.first {
            PacketType::FirstFrame
        } else {
            PacketType::Frame
        };
        writer.write_u8(packet_type as u8);
        writer.write_u8(self.level);
        writer.write_u8(self.set);
        writer.write_u32(self.timestamp);
    }
}

/// Acknowledges a frame's set and every resent delta it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameAck {
    pub set: u8,
    pub resend_tags: Vec<u8>,
}

impl FrameAck {
    pub fn encode(&self) -> Vec<u8> {
        let tags = &self.resend_tags[..self.resend_tags.len().min(MAX_ACK_TAGS)];
        let mut writer = ByteWriter::with_capacity(3 + tags.len());
        writer.write_u8(PacketType::FrameAck as u8);
        writer.write_u8(self.set);
        writer.write_u8(tags.len() as u8);
        writer.write_bytes(tags);
        writer.into_bytes()
    }
}

/// A fully parsed message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Control(ControlPacket),
    Frame {
        header: FrameHeader,
        deltas: Vec<DecodedDelta>,
    },
    FrameAck(FrameAck),
}

impl Packet {
    /// Parses a body handed out by the store. Any malformed part rejects the
    /// whole message.
    pub fn parse(body: &[u8]) -> Result<Packet, ProtocolError> {
        let mut reader = ByteReader::new(body);
        let packet_type = PacketType::try_from(reader.read_u8()?)?;

        match packet_type {
            PacketType::Control => {
                let control = bincode::deserialize(reader.rest())
                    .map_err(|e| ProtocolError::BadControl(e.to_string()))?;
                Ok(Packet::Control(control))
            }
            PacketType::Frame | PacketType::FirstFrame => {
                let header = FrameHeader {
                    first: packet_type == PacketType::FirstFrame,
                    level: reader.read_u8()?,
                    set: reader.read_u8()?,
                    timestamp: reader.read_u32()?,
                };
                let mut deltas = Vec::new();
                while !reader.is_empty() {
                    deltas.push(delta::decode(&mut reader)?);
                }
                Ok(Packet::Frame { header, deltas })
            }
            PacketType::FrameAck => {
                let set = reader.read_u8()?;
                let count = reader.read_u8()? as usize;
                let resend_tags = reader.read_bytes(count)?.to_vec();
                Ok(Packet::FrameAck(FrameAck { set, resend_tags }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{Delta, DeltaKind, Resent, SectorFields};

    #[test]
    fn test_control_roundtrip() {
        let packets = vec![
            ControlPacket::Hello {
                client_version: PROTOCOL_VERSION,
            },
            ControlPacket::Welcome {
                client_id: 4,
                level_id: 1,
            },
            ControlPacket::Ready,
            ControlPacket::LevelChange { level_id: 2 },
            ControlPacket::Goodbye {
                reason: "Server shutting down".to_string(),
            },
        ];
        for packet in packets {
            let body = packet.encode().unwrap();
            assert_eq!(body[0], PacketType::Control as u8);
            assert_eq!(Packet::parse(&body).unwrap(), Packet::Control(packet));
        }
    }

    #[test]
    fn test_frame_with_deltas() {
        let header = FrameHeader {
            first: true,
            level: 3,
            set: 9,
            timestamp: 123_456,
        };
        let sector = Delta::Sector {
            id: 7,
            fields: SectorFields {
                light: Some(80),
                ..Default::default()
            },
        };
        let null = Delta::Null {
            kind: DeltaKind::Object,
            id: 3,
        };

        let mut writer = ByteWriter::new();
        header.write(&mut writer);
        assert_eq!(writer.len(), FRAME_HEADER_LEN);
        delta::encode(&sector, &mut writer).unwrap();
        delta::encode_resent(&null, Resent { set: 8, tag: 1 }, &mut writer).unwrap();

        match Packet::parse(writer.as_slice()).unwrap() {
            Packet::Frame {
                header: parsed,
                deltas,
            } => {
                assert_eq!(parsed, header);
                assert_eq!(deltas.len(), 2);
                assert_eq!(deltas[0].delta, sector);
                assert_eq!(deltas[1].resent, Some(Resent { set: 8, tag: 1 }));
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_frame_ack_layout() {
        let ack = FrameAck {
            set: 200,
            resend_tags: vec![4, 5],
        };
        let body = ack.encode();
        assert_eq!(body, vec![0x12, 200, 2, 4, 5]);
        assert_eq!(Packet::parse(&body).unwrap(), Packet::FrameAck(ack));
    }

    #[test]
    fn test_unknown_packet_type() {
        assert_eq!(
            Packet::parse(&[0x7f, 0, 0]),
            Err(ProtocolError::UnknownPacketType(0x7f))
        );
    }

    #[test]
    fn test_bad_control_body() {
        let result = Packet::parse(&[PacketType::Control as u8, 0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(ProtocolError::BadControl(_))));
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let body = [PacketType::Frame as u8, 0, 1, 0, 0, 0, 0, 0x02, 0x07];
        assert!(matches!(
            Packet::parse(&body),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}
