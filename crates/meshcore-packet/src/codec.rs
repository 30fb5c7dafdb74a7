//! Route log decoding.
//!
//! A route log entry is one raw packet as heard by the radio:
//!
//! | Field           | Size (bytes)                     | Description                                          |
//! |-----------------|----------------------------------|------------------------------------------------------|
//! | header          | 1                                | Route type, payload type and payload version.        |
//! | transport_codes | 4 (optional)                     | Present only for the `Transport*` route types.       |
//! | path_len        | 1                                | Number of path bytes that follow.                    |
//! | path            | path_len                         | One hash byte per hop the packet travelled through.  |
//! | payload         | rest of the packet               | Opaque (usually encrypted) packet payload.           |
//!
//! Over-the-air packets stay within 64 path bytes and 184 payload bytes, but
//! the log reports whatever the radio heard, so neither bound is enforced.
//!
//! Signal metadata (SNR, RSSI) is carried by the companion frame around the
//! raw bytes and never enters the content hash.

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

use crate::{
    PacketError, PacketHeader, PayloadType, RouteType, TransportCodes, TRANSPORT_CODES_SIZE,
};

/// Seed for the de-duplication hash. Changing it invalidates stored hashes.
const CONTENT_HASH_SEED: u64 = 0;

/// One decoded raw packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteLogRecord {
    /// Route classification.
    pub route_type: RouteType,
    /// Payload classification.
    pub payload_type: PayloadType,
    /// Payload format version.
    pub payload_version: u8,
    /// Transport codes (tc-flood / tc-direct only).
    pub transport_codes: Option<TransportCodes>,
    /// Declared path length.
    pub path_len: u8,
    /// Path node hashes, one byte per hop.
    pub path: Vec<u8>,
    /// Recipient identity hash (direct text messages only).
    pub recipient_hash: Option<u8>,
    /// Sender identity hash (direct text messages only).
    pub sender_hash: Option<u8>,
    /// Payload remainder after any extracted identity hints.
    pub payload: Vec<u8>,
    /// Stable hash of the full packet payload.
    pub content_hash: u64,
}

impl RouteLogRecord {
    /// Number of hops recorded in the path.
    pub fn hop_count(&self) -> usize {
        self.path.len()
    }

    /// Path rendered as hex hop hashes, e.g. `"a1,3f,07"`.
    pub fn path_hex(&self) -> String {
        self.path
            .iter()
            .map(|hop| hex::encode([*hop]))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Content hash rendered as 16 hex digits.
    pub fn content_hash_hex(&self) -> String {
        hex::encode(self.content_hash.to_be_bytes())
    }
}

/// Stable hash over packet payload bytes.
///
/// Two copies of the same packet heard over different paths (or with
/// different signal quality) hash identically.
pub fn content_hash(payload: &[u8]) -> u64 {
    xxh64(payload, CONTENT_HASH_SEED)
}

/// Decode one raw packet from the RX log.
pub fn parse_route_log(data: &[u8]) -> Result<RouteLogRecord, PacketError> {
    if data.is_empty() {
        return Err(PacketError::decode_at(0, "Empty packet data"));
    }

    let mut offset = 0;

    // 1. Header byte
    let header = PacketHeader::from_header_byte(data[offset]);
    offset += 1;

    // 2. Transport codes (optional, 4 bytes)
    let transport_codes = if header.route_type.has_transport_codes() {
        let bytes: &[u8; TRANSPORT_CODES_SIZE] = data
            .get(offset..offset + TRANSPORT_CODES_SIZE)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| PacketError::decode_at(offset, "Not enough data for transport codes"))?;
        offset += TRANSPORT_CODES_SIZE;
        Some(TransportCodes::decode(bytes))
    } else {
        None
    };

    // 3. Path length (1 byte)
    let path_len = *data
        .get(offset)
        .ok_or_else(|| PacketError::decode_at(offset, "Not enough data for path length"))?;
    offset += 1;

    // 4. Path (variable length)
    let path = data
        .get(offset..offset + path_len as usize)
        .ok_or_else(|| {
            PacketError::decode_at(
                offset,
                format!(
                    "Not enough data for path: need {} bytes, have {}",
                    path_len,
                    data.len() - offset
                ),
            )
        })?
        .to_vec();
    offset += path.len();

    // 5. Payload (rest of packet)
    let payload = &data[offset..];

    let (recipient_hash, sender_hash, remainder) =
        split_identity_hints(header.route_type, header.payload_type, payload);

    Ok(RouteLogRecord {
        route_type: header.route_type,
        payload_type: header.payload_type,
        payload_version: header.version,
        transport_codes,
        path_len,
        path,
        recipient_hash,
        sender_hash,
        payload: remainder.to_vec(),
        content_hash: content_hash(payload),
    })
}

/// Direct text messages start with `dest_hash(1) + src_hash(1)` ahead of the
/// MAC and ciphertext. Flood and group traffic carries no sender hint.
fn split_identity_hints(
    route_type: RouteType,
    payload_type: PayloadType,
    payload: &[u8],
) -> (Option<u8>, Option<u8>, &[u8]) {
    if payload_type != PayloadType::TextMessage || !route_type.is_direct() {
        return (None, None, payload);
    }
    match payload {
        [dest, src, rest @ ..] => (Some(*dest), Some(*src), rest),
        _ => (None, None, payload),
    }
}

// ============================================================================
// Tests
// ============================================================================
