//! MeshCore raw packet decoding.
//!
//! Companion firmware can forward every packet it hears over the air
//! (the "RX log"). This crate decodes the routing envelope of such a raw
//! packet so that a host can show how a message travelled through the mesh
//! and de-duplicate copies heard over different paths.
//!
//! ## Header byte
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! +-------+---------------+-------+
//! |version| payload type  | route |
//! +-------+---------------+-------+
//! ```
//!
//! The layout is a wire contract shared with the firmware; the masks and
//! shifts below are the only place it is encoded.

mod codec;
mod error;

pub use codec::*;
pub use error::*;

use serde::Serialize;

/// Size of the optional transport code block.
pub const TRANSPORT_CODES_SIZE: usize = 4;

/// Route type occupies bits 0-1.
pub const ROUTE_TYPE_MASK: u8 = 0x03;
/// Payload type occupies bits 2-5.
pub const PAYLOAD_TYPE_SHIFT: u8 = 2;
/// Mask applied after shifting the payload type down.
pub const PAYLOAD_TYPE_MASK: u8 = 0x0F;
/// Payload version occupies bits 6-7.
pub const PAYLOAD_VERSION_SHIFT: u8 = 6;
/// Mask applied after shifting the payload version down.
pub const PAYLOAD_VERSION_MASK: u8 = 0x03;

/// How a packet is routed through the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RouteType {
    /// Flood routing with a transport code block ("tc-flood").
    TransportFlood,
    /// Flood routing: every repeater rebroadcasts.
    Flood,
    /// Direct routing along an explicit hop list.
    Direct,
    /// Direct routing with a transport code block ("tc-direct").
    TransportDirect,
}

impl RouteType {
    /// Decode the two route bits.
    pub fn from_bits(bits: u8) -> Self {
        match bits & ROUTE_TYPE_MASK {
            0 => RouteType::TransportFlood,
            1 => RouteType::Flood,
            2 => RouteType::Direct,
            _ => RouteType::TransportDirect,
        }
    }

    /// The two route bits for this type.
    pub fn bits(self) -> u8 {
        match self {
            RouteType::TransportFlood => 0,
            RouteType::Flood => 1,
            RouteType::Direct => 2,
            RouteType::TransportDirect => 3,
        }
    }

    /// Whether a 4-byte transport code block follows the header.
    pub fn has_transport_codes(self) -> bool {
        matches!(self, RouteType::TransportFlood | RouteType::TransportDirect)
    }

    /// Whether the packet follows an explicit path.
    pub fn is_direct(self) -> bool {
        matches!(self, RouteType::Direct | RouteType::TransportDirect)
    }
}

/// What a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PayloadType {
    /// Encrypted request to a node.
    Request,
    /// Encrypted response to a request.
    Response,
    /// Direct (one-to-one) text message.
    TextMessage,
    /// Message acknowledgement.
    Ack,
    /// Node advertisement.
    Advert,
    /// Group (channel) text message.
    GroupText,
    /// Group (channel) datagram.
    GroupData,
    /// Anonymous request (sender key in clear).
    AnonRequest,
    /// Returned path.
    Path,
    /// Trace packet.
    Trace,
    /// Multipart packet.
    Multipart,
    /// Control packet.
    Control,
    /// Reserved value (12-14) or anything the host does not know.
    Unknown(u8),
    /// Application defined raw payload (15).
    RawCustom,
}

impl PayloadType {
    /// Decode the four payload type bits.
    pub fn from_bits(bits: u8) -> Self {
        match bits & PAYLOAD_TYPE_MASK {
            0x00 => PayloadType::Request,
            0x01 => PayloadType::Response,
            0x02 => PayloadType::TextMessage,
            0x03 => PayloadType::Ack,
            0x04 => PayloadType::Advert,
            0x05 => PayloadType::GroupText,
            0x06 => PayloadType::GroupData,
            0x07 => PayloadType::AnonRequest,
            0x08 => PayloadType::Path,
            0x09 => PayloadType::Trace,
            0x0A => PayloadType::Multipart,
            0x0B => PayloadType::Control,
            0x0F => PayloadType::RawCustom,
            other => PayloadType::Unknown(other),
        }
    }

    /// The four payload type bits.
    pub fn bits(self) -> u8 {
        match self {
            PayloadType::Request => 0x00,
            PayloadType::Response => 0x01,
            PayloadType::TextMessage => 0x02,
            PayloadType::Ack => 0x03,
            PayloadType::Advert => 0x04,
            PayloadType::GroupText => 0x05,
            PayloadType::GroupData => 0x06,
            PayloadType::AnonRequest => 0x07,
            PayloadType::Path => 0x08,
            PayloadType::Trace => 0x09,
            PayloadType::Multipart => 0x0A,
            PayloadType::Control => 0x0B,
            PayloadType::Unknown(bits) => bits & PAYLOAD_TYPE_MASK,
            PayloadType::RawCustom => 0x0F,
        }
    }
}

/// Two 16-bit transport codes carried by the `Transport*` route types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransportCodes {
    /// First transport code.
    pub code1: u16,
    /// Second transport code.
    pub code2: u16,
}

impl TransportCodes {
    /// Decode from exactly four bytes (little-endian pair).
    pub fn decode(bytes: &[u8; TRANSPORT_CODES_SIZE]) -> Self {
        TransportCodes {
            code1: u16::from_le_bytes([bytes[0], bytes[1]]),
            code2: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Encode back to the wire representation.
    pub fn encode(&self) -> [u8; TRANSPORT_CODES_SIZE] {
        let a = self.code1.to_le_bytes();
        let b = self.code2.to_le_bytes();
        [a[0], a[1], b[0], b[1]]
    }
}

/// The decoded header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketHeader {
    /// Route classification.
    pub route_type: RouteType,
    /// Payload classification.
    pub payload_type: PayloadType,
    /// Payload format version (0-3).
    pub version: u8,
}

impl PacketHeader {
    /// Split a header byte into its three fields.
    pub fn from_header_byte(byte: u8) -> Self {
        PacketHeader {
            route_type: RouteType::from_bits(byte),
            payload_type: PayloadType::from_bits(byte >> PAYLOAD_TYPE_SHIFT),
            version: (byte >> PAYLOAD_VERSION_SHIFT) & PAYLOAD_VERSION_MASK,
        }
    }

    /// Pack the three fields back into a header byte.
    pub fn encode_header_byte(&self) -> u8 {
        ((self.version & PAYLOAD_VERSION_MASK) << PAYLOAD_VERSION_SHIFT)
            | ((self.payload_type.bits() & PAYLOAD_TYPE_MASK) << PAYLOAD_TYPE_SHIFT)
            | (self.route_type.bits() & ROUTE_TYPE_MASK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_0x15_is_flood_group_text() {
        let header = PacketHeader::from_header_byte(0x15);
        assert_eq!(header.route_type, RouteType::Flood);
        assert_eq!(header.payload_type, PayloadType::GroupText);
        assert_eq!(header.version, 0);
        assert!(!header.route_type.has_transport_codes());
    }

    #[test]
    fn test_header_0x54_is_transport_flood_v1() {
        let header = PacketHeader::from_header_byte(0x54);
        assert_eq!(header.route_type, RouteType::TransportFlood);
        assert_eq!(header.payload_type, PayloadType::GroupText);
        assert_eq!(header.version, 1);
        assert!(header.route_type.has_transport_codes());
    }

    #[test]
    fn test_reserved_payload_types_are_unknown() {
        for bits in 12..=14u8 {
            assert_eq!(PayloadType::from_bits(bits), PayloadType::Unknown(bits));
        }
        assert_eq!(PayloadType::from_bits(15), PayloadType::RawCustom);
    }

    #[test]
    fn test_header_byte_reencodes() {
        for byte in 0..=u8::MAX {
            assert_eq!(PacketHeader::from_header_byte(byte).encode_header_byte(), byte);
        }
    }

    #[test]
    fn test_transport_codes_little_endian() {
        let codes = TransportCodes::decode(&[0x34, 0x12, 0x78, 0x56]);
        assert_eq!(codes.code1, 0x1234);
        assert_eq!(codes.code2, 0x5678);
        assert_eq!(codes.encode(), [0x34, 0x12, 0x78, 0x56]);
    }
}
