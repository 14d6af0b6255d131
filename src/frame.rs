//! Provides the on-wire frame used by the reliable-datagram transport, and the
//! utilities for encoding/decoding it from a raw UDP payload.

use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::Cursor;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Fixed header size: 1 byte type + 4 byte sequence + 4 byte address + 2 byte port.
pub const HEADER_SIZE: usize = 11;

/// Maximum payload carried by a single frame.
pub const MAX_PAYLOAD_SIZE: usize = 1013;

/// Maximum total frame size (header + payload).
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// The one-byte `packet_type` field.
#[derive(TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    Ack = 0,
    Syn = 1,
    Fin = 2,
    Nack = 3,
    SynAck = 4,
    Data = 5,
    FinAck = 6,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("datagram too short to contain an 11-byte header: {0} bytes")]
    TooShort(usize),

    #[error("invalid packet_type byte: {0}")]
    InvalidPacketType(u8),

    #[error("payload exceeds maximum frame payload of {MAX_PAYLOAD_SIZE} bytes: {0}")]
    PayloadTooLarge(usize),
}

/// A single application-level datagram: the 11-byte header plus payload.
///
/// `peer_address`/`peer_port` duplicate the UDP source address inside the
/// frame itself. Per spec they are never used to validate or authenticate
/// the datagram's true source — routing always relies on the UDP source
/// address reported by the socket layer. They exist for the engine's own
/// sequence tracking and for logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub packet_type: PacketType,
    pub sequence_number: u32,
    pub peer_address: Ipv4Addr,
    pub peer_port: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(
        packet_type: PacketType,
        sequence_number: u32,
        peer_address: Ipv4Addr,
        peer_port: u16,
        payload: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        Ok(Frame {
            packet_type,
            sequence_number,
            peer_address,
            peer_port,
            payload,
        })
    }

    /// A control frame (no payload) of the given type.
    pub fn control(
        packet_type: PacketType,
        sequence_number: u32,
        peer_address: Ipv4Addr,
        peer_port: u16,
    ) -> Self {
        Frame {
            packet_type,
            sequence_number,
            peer_address,
            peer_port,
            payload: Vec::new(),
        }
    }

    /// Encode this frame to its wire representation.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_u8(self.packet_type.into());
        buf.put_u32(self.sequence_number);
        buf.put_slice(&self.peer_address.octets());
        buf.put_u16(self.peer_port);
        buf.put_slice(&self.payload);
        buf
    }

    /// Decode a frame from a raw datagram. Datagrams shorter than the
    /// 11-byte header are rejected; callers are expected to discard these
    /// silently rather than propagate the error further.
    pub fn decode(datagram: &[u8]) -> Result<Self, FrameError> {
        if datagram.len() < HEADER_SIZE {
            return Err(FrameError::TooShort(datagram.len()));
        }

        let mut buf = Cursor::new(datagram);
        let packet_type_byte = buf.get_u8();
        let packet_type = PacketType::try_from(packet_type_byte)
            .map_err(|_| FrameError::InvalidPacketType(packet_type_byte))?;
        let sequence_number = buf.get_u32();
        let peer_address = Ipv4Addr::new(buf.get_u8(), buf.get_u8(), buf.get_u8(), buf.get_u8());
        let peer_port = buf.get_u16();

        let mut payload = vec![0u8; datagram.len() - HEADER_SIZE];
        buf.copy_to_slice(&mut payload);

        Ok(Frame {
            packet_type,
            sequence_number,
            peer_address,
            peer_port,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(payload: Vec<u8>) -> Frame {
        Frame::new(
            PacketType::Data,
            42,
            Ipv4Addr::new(127, 0, 0, 1),
            9000,
            payload,
        )
        .unwrap()
    }

    #[test]
    fn round_trips_empty_payload() {
        let frame = sample(Vec::new());
        let encoded = frame.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn round_trips_max_payload() {
        let frame = sample(vec![0xAB; MAX_PAYLOAD_SIZE]);
        let encoded = frame.encode();
        assert_eq!(encoded.len(), MAX_FRAME_SIZE);
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn rejects_oversized_payload() {
        let err = Frame::new(
            PacketType::Data,
            1,
            Ipv4Addr::new(0, 0, 0, 0),
            0,
            vec![0; MAX_PAYLOAD_SIZE + 1],
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge(_)));
    }

    #[test]
    fn rejects_short_datagram() {
        let err = Frame::decode(&[0u8; HEADER_SIZE - 1]).unwrap_err();
        assert!(matches!(err, FrameError::TooShort(_)));
    }

    #[test]
    fn rejects_invalid_packet_type() {
        let mut bytes = sample(Vec::new()).encode();
        bytes[0] = 0xFF;
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::InvalidPacketType(0xFF)));
    }

    #[test]
    fn packet_type_enum_matches_wire_values() {
        assert_eq!(u8::from(PacketType::Ack), 0);
        assert_eq!(u8::from(PacketType::Syn), 1);
        assert_eq!(u8::from(PacketType::Fin), 2);
        assert_eq!(u8::from(PacketType::Nack), 3);
        assert_eq!(u8::from(PacketType::SynAck), 4);
        assert_eq!(u8::from(PacketType::Data), 5);
        assert_eq!(u8::from(PacketType::FinAck), 6);
    }
}
