//! Events decoded from firmware frames.
//!
//! Responses and pushes share one [`Event`] type. Decoding consults
//! [`min_frame_len`] before reading any field and then reads through a
//! [`FrameReader`], so every malformed frame ends up as
//! [`Event::ParseFailure`] rather than a panic.

use meshcore_packet::{parse_route_log, PacketError, RouteLogRecord};

use crate::constants::*;
use crate::error::*;
use crate::reader::FrameReader;
use crate::telemetry::{decode_telemetry, TelemetryPoint};
use crate::types::*;

/// A raw packet forwarded from the radio's receive log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxLogEntry {
    /// SNR (scaled by 4).
    pub snr_x4: i8,
    pub rssi: i8,
    /// Raw over-the-air packet.
    pub raw: Vec<u8>,
}

impl RxLogEntry {
    pub fn snr(&self) -> f32 {
        self.snr_x4 as f32 / 4.0
    }

    /// Decode the routing envelope of the raw packet.
    pub fn route(&self) -> Result<RouteLogRecord, PacketError> {
        parse_route_log(&self.raw)
    }
}

/// Result of a trace packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceInfo {
    pub tag: u32,
    pub auth_code: u32,
    pub flags: u8,
    pub path_len: u8,
    /// Hop hashes.
    pub path_hashes: Vec<u8>,
    /// Per-hop SNR values (scaled by 4).
    pub path_snrs: Vec<i8>,
    /// SNR of the final hop back to this node (scaled by 4).
    pub final_snr_x4: i8,
}

/// A decoded response or push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Generic OK, optionally carrying a value.
    Ok { value: Option<u32> },
    /// Firmware reported an error.
    Error { code: FirmwareErrorCode },
    /// Feature disabled on the firmware.
    Disabled,
    /// Start of a contact enumeration.
    ContactsStart { count: u32 },
    Contact(ContactInfo),
    /// End of a contact enumeration, carrying the new high-water mark.
    EndOfContacts { last_modified: u32 },
    SelfInfo(SelfInfo),
    /// A message was queued for transmission.
    Sent {
        is_flood: bool,
        expected_ack: u32,
        est_timeout_ms: u32,
    },
    ContactMessage(ReceivedContactMessage),
    ChannelMessage(ReceivedChannelMessage),
    CurrentTime { time_secs: u32 },
    NoMoreMessages,
    ExportedContact { data: Vec<u8> },
    Battery(BatteryAndStorage),
    DeviceInfo(DeviceInfo),
    ChannelInfo(ChannelInfo),
    /// Signing accepted; chunks may be at most `max_len` bytes.
    SignStart { max_len: u32 },
    Signature { signature: [u8; SIGNATURE_SIZE] },
    StatsCore(CoreStats),
    StatsRadio(RadioStats),
    StatsPackets(PacketStats),

    /// An advertisement updated a known contact.
    Advert { public_key: PublicKey },
    PathUpdated { public_key: PublicKey },
    /// A message acknowledgement arrived.
    SendConfirmed { ack_code: u32, round_trip_ms: u32 },
    /// Messages are queued on the device.
    MessagesWaiting,
    RawData {
        snr_x4: i8,
        rssi: i8,
        payload: Vec<u8>,
    },
    LoginSuccess {
        prefix: PublicKeyPrefix,
        is_admin: bool,
        server_timestamp: Option<u32>,
        acl_permissions: Option<u8>,
        firmware_level: Option<u8>,
    },
    LoginFail { prefix: PublicKeyPrefix },
    StatusResponse {
        prefix: PublicKeyPrefix,
        status: DeviceStatus,
    },
    LogRxData(RxLogEntry),
    TraceData(TraceInfo),
    /// A previously unknown node advertised itself (manual-add mode).
    NewAdvert(ContactInfo),
    TelemetryResponse {
        prefix: PublicKeyPrefix,
        data: Vec<u8>,
    },
    BinaryResponse { tag: u32, data: Vec<u8> },
    PathDiscoveryResponse {
        prefix: PublicKeyPrefix,
        out_path: Vec<u8>,
        in_path: Vec<u8>,
    },
    ControlData {
        snr_x4: i8,
        rssi: i8,
        path_len: u8,
        payload: Vec<u8>,
    },

    /// The frame could not be decoded.
    ParseFailure { code: Option<u8>, reason: String },
}

/// Name and minimum whole-frame length for a discriminator.
fn frame_layout(code: u8) -> Option<(&'static str, usize)> {
    let contact_len = 1 + PUB_KEY_SIZE + 3 + MAX_PATH_SIZE + NAME_SIZE + 4;
    Some(match code {
        RESP_CODE_OK => ("ok", 1),
        RESP_CODE_ERR => ("error", 2),
        RESP_CODE_CONTACTS_START => ("contacts start", 5),
        RESP_CODE_CONTACT => ("contact", contact_len),
        RESP_CODE_END_OF_CONTACTS => ("end of contacts", 5),
        RESP_CODE_SELF_INFO => ("self info", 58),
        RESP_CODE_SENT => ("sent", 10),
        RESP_CODE_CONTACT_MSG_RECV => ("contact message", 13),
        RESP_CODE_CHANNEL_MSG_RECV => ("channel message", 8),
        RESP_CODE_CURR_TIME => ("current time", 5),
        RESP_CODE_NO_MORE_MESSAGES => ("no more messages", 1),
        RESP_CODE_EXPORT_CONTACT => ("exported contact", 1),
        RESP_CODE_BATT_AND_STORAGE => ("battery", 3),
        RESP_CODE_DEVICE_INFO => ("device info", 80),
        RESP_CODE_DISABLED => ("disabled", 1),
        RESP_CODE_CONTACT_MSG_RECV_V3 => ("contact message v3", 16),
        RESP_CODE_CHANNEL_MSG_RECV_V3 => ("channel message v3", 11),
        RESP_CODE_CHANNEL_INFO => ("channel info", 2 + NAME_SIZE + CHANNEL_SECRET_SIZE),
        RESP_CODE_SIGN_START => ("sign start", 6),
        RESP_CODE_SIGNATURE => ("signature", 1 + SIGNATURE_SIZE),
        RESP_CODE_STATS => ("stats", 2),
        PUSH_CODE_ADVERT => ("advert", 1 + PUB_KEY_SIZE),
        PUSH_CODE_PATH_UPDATED => ("path updated", 1 + PUB_KEY_SIZE),
        PUSH_CODE_SEND_CONFIRMED => ("send confirmed", 9),
        PUSH_CODE_MSG_WAITING => ("messages waiting", 1),
        PUSH_CODE_RAW_DATA => ("raw data", 4),
        PUSH_CODE_LOGIN_SUCCESS => ("login success", 8),
        PUSH_CODE_LOGIN_FAIL => ("login fail", 8),
        PUSH_CODE_STATUS_RESPONSE => (
            "status response",
            2 + PUB_KEY_PREFIX_SIZE + DeviceStatus::MIN_WIRE_SIZE,
        ),
        PUSH_CODE_LOG_RX_DATA => ("rx log", 3),
        PUSH_CODE_TRACE_DATA => ("trace data", 12),
        PUSH_CODE_NEW_ADVERT => ("new advert", contact_len),
        PUSH_CODE_TELEMETRY_RESPONSE => ("telemetry response", 2 + PUB_KEY_PREFIX_SIZE),
        PUSH_CODE_BINARY_RESPONSE => ("binary response", 6),
        PUSH_CODE_PATH_DISCOVERY_RESPONSE => ("path discovery response", 9),
        PUSH_CODE_CONTROL_DATA => ("control data", 4),
        _ => return None,
    })
}

/// Minimum whole-frame length (including the code byte) for a response or
/// push code, or `None` if the code is unknown.
pub fn min_frame_len(code: u8) -> Option<usize> {
    frame_layout(code).map(|(_, len)| len)
}

impl Event {
    /// Decode one frame. Never fails: malformed input becomes
    /// [`Event::ParseFailure`].
    pub fn decode(frame: &[u8]) -> Event {
        match Self::try_decode(frame) {
            Ok(event) => {
                log::trace!("decoded {} frame", event.name());
                event
            }
            Err(err) => {
                log::debug!("unparseable frame ({} bytes): {}", frame.len(), err);
                Event::ParseFailure {
                    code: frame.first().copied(),
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Decode one frame, reporting why it could not be decoded.
    pub fn try_decode(frame: &[u8]) -> Result<Event, ProtocolError> {
        let Some(&code) = frame.first() else {
            return Err(ProtocolError::FrameTooShort {
                kind: "empty",
                expected: 1,
                actual: 0,
            });
        };
        let (kind, min_len) = frame_layout(code).ok_or(ProtocolError::UnknownCode(code))?;
        if frame.len() < min_len {
            return Err(ProtocolError::FrameTooShort {
                kind,
                expected: min_len,
                actual: frame.len(),
            });
        }

        let mut r = FrameReader::after_code(kind, frame);

        let event = match code {
            RESP_CODE_OK => Event::Ok {
                value: r.opt_u32(),
            },
            RESP_CODE_ERR => Event::Error {
                code: FirmwareErrorCode::from(r.u8()?),
            },
            RESP_CODE_DISABLED => Event::Disabled,
            RESP_CODE_CONTACTS_START => Event::ContactsStart { count: r.u32()? },
            RESP_CODE_CONTACT => Event::Contact(decode_contact(&mut r)?),
            RESP_CODE_END_OF_CONTACTS => Event::EndOfContacts {
                last_modified: r.u32()?,
            },
            RESP_CODE_SELF_INFO => Event::SelfInfo(decode_self_info(&mut r)?),
            RESP_CODE_SENT => Event::Sent {
                is_flood: r.u8()? != 0,
                expected_ack: r.u32()?,
                est_timeout_ms: r.u32()?,
            },
            RESP_CODE_CONTACT_MSG_RECV => {
                Event::ContactMessage(decode_contact_message(&mut r, false)?)
            }
            RESP_CODE_CONTACT_MSG_RECV_V3 => {
                Event::ContactMessage(decode_contact_message(&mut r, true)?)
            }
            RESP_CODE_CHANNEL_MSG_RECV => {
                Event::ChannelMessage(decode_channel_message(&mut r, false)?)
            }
            RESP_CODE_CHANNEL_MSG_RECV_V3 => {
                Event::ChannelMessage(decode_channel_message(&mut r, true)?)
            }
            RESP_CODE_CURR_TIME => Event::CurrentTime { time_secs: r.u32()? },
            RESP_CODE_NO_MORE_MESSAGES => Event::NoMoreMessages,
            RESP_CODE_EXPORT_CONTACT => Event::ExportedContact {
                data: r.rest().to_vec(),
            },
            RESP_CODE_BATT_AND_STORAGE => Event::Battery(BatteryAndStorage {
                battery_millivolts: r.u16()?,
                storage_used_kb: r.opt_u32(),
                storage_total_kb: r.opt_u32(),
            }),
            RESP_CODE_DEVICE_INFO => Event::DeviceInfo(DeviceInfo {
                firmware_version_code: r.u8()?,
                max_contacts_half: r.u8()?,
                max_channels: r.u8()?,
                ble_pin: r.u32()?,
                build_date: r.fixed_str(12)?,
                model: r.fixed_str(40)?,
                version: r.fixed_str(20)?,
            }),
            RESP_CODE_CHANNEL_INFO => Event::ChannelInfo(ChannelInfo {
                index: r.u8()?,
                name: r.fixed_str(NAME_SIZE)?,
                secret: r.array()?,
            }),
            RESP_CODE_SIGN_START => {
                r.skip(1)?;
                Event::SignStart { max_len: r.u32()? }
            }
            RESP_CODE_SIGNATURE => Event::Signature {
                signature: r.array()?,
            },
            RESP_CODE_STATS => decode_stats(&mut r)?,

            PUSH_CODE_ADVERT => Event::Advert {
                public_key: PublicKey(r.array()?),
            },
            PUSH_CODE_PATH_UPDATED => Event::PathUpdated {
                public_key: PublicKey(r.array()?),
            },
            PUSH_CODE_SEND_CONFIRMED => Event::SendConfirmed {
                ack_code: r.u32()?,
                round_trip_ms: r.u32()?,
            },
            PUSH_CODE_MSG_WAITING => Event::MessagesWaiting,
            PUSH_CODE_RAW_DATA => {
                let snr_x4 = r.i8()?;
                let rssi = r.i8()?;
                r.skip(1)?;
                Event::RawData {
                    snr_x4,
                    rssi,
                    payload: r.rest().to_vec(),
                }
            }
            PUSH_CODE_LOGIN_SUCCESS => {
                let is_admin = r.u8()? != 0;
                let prefix = PublicKeyPrefix(r.array()?);
                Event::LoginSuccess {
                    prefix,
                    is_admin,
                    server_timestamp: r.opt_u32(),
                    acl_permissions: r.u8().ok(),
                    firmware_level: r.u8().ok(),
                }
            }
            PUSH_CODE_LOGIN_FAIL => {
                r.skip(1)?;
                Event::LoginFail {
                    prefix: PublicKeyPrefix(r.array()?),
                }
            }
            PUSH_CODE_STATUS_RESPONSE => {
                r.skip(1)?;
                let prefix = PublicKeyPrefix(r.array()?);
                Event::StatusResponse {
                    prefix,
                    status: decode_status(&mut r)?,
                }
            }
            PUSH_CODE_LOG_RX_DATA => Event::LogRxData(RxLogEntry {
                snr_x4: r.i8()?,
                rssi: r.i8()?,
                raw: r.rest().to_vec(),
            }),
            PUSH_CODE_TRACE_DATA => Event::TraceData(decode_trace(&mut r)?),
            PUSH_CODE_NEW_ADVERT => Event::NewAdvert(decode_contact(&mut r)?),
            PUSH_CODE_TELEMETRY_RESPONSE => {
                r.skip(1)?;
                let prefix = PublicKeyPrefix(r.array()?);
                Event::TelemetryResponse {
                    prefix,
                    data: r.rest().to_vec(),
                }
            }
            PUSH_CODE_BINARY_RESPONSE => {
                r.skip(1)?;
                let tag = r.u32()?;
                Event::BinaryResponse {
                    tag,
                    data: r.rest().to_vec(),
                }
            }
            PUSH_CODE_PATH_DISCOVERY_RESPONSE => {
                r.skip(1)?;
                let prefix = PublicKeyPrefix(r.array()?);
                let out_len = r.u8()? as usize;
                let out_path = r.take(out_len)?.to_vec();
                let in_len = r.u8()? as usize;
                let in_path = r.take(in_len)?.to_vec();
                Event::PathDiscoveryResponse {
                    prefix,
                    out_path,
                    in_path,
                }
            }
            PUSH_CODE_CONTROL_DATA => Event::ControlData {
                snr_x4: r.i8()?,
                rssi: r.i8()?,
                path_len: r.u8()?,
                payload: r.rest().to_vec(),
            },
            _ => return Err(ProtocolError::UnknownCode(code)),
        };

        Ok(event)
    }

    /// Stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Ok { .. } => "ok",
            Event::Error { .. } => "error",
            Event::Disabled => "disabled",
            Event::ContactsStart { .. } => "contacts start",
            Event::Contact(_) => "contact",
            Event::EndOfContacts { .. } => "end of contacts",
            Event::SelfInfo(_) => "self info",
            Event::Sent { .. } => "sent",
            Event::ContactMessage(_) => "contact message",
            Event::ChannelMessage(_) => "channel message",
            Event::CurrentTime { .. } => "current time",
            Event::NoMoreMessages => "no more messages",
            Event::ExportedContact { .. } => "exported contact",
            Event::Battery(_) => "battery",
            Event::DeviceInfo(_) => "device info",
            Event::ChannelInfo(_) => "channel info",
            Event::SignStart { .. } => "sign start",
            Event::Signature { .. } => "signature",
            Event::StatsCore(_) => "core stats",
            Event::StatsRadio(_) => "radio stats",
            Event::StatsPackets(_) => "packet stats",
            Event::Advert { .. } => "advert",
            Event::PathUpdated { .. } => "path updated",
            Event::SendConfirmed { .. } => "send confirmed",
            Event::MessagesWaiting => "messages waiting",
            Event::RawData { .. } => "raw data",
            Event::LoginSuccess { .. } => "login success",
            Event::LoginFail { .. } => "login fail",
            Event::StatusResponse { .. } => "status response",
            Event::LogRxData(_) => "rx log",
            Event::TraceData(_) => "trace data",
            Event::NewAdvert(_) => "new advert",
            Event::TelemetryResponse { .. } => "telemetry response",
            Event::BinaryResponse { .. } => "binary response",
            Event::PathDiscoveryResponse { .. } => "path discovery response",
            Event::ControlData { .. } => "control data",
            Event::ParseFailure { .. } => "parse failure",
        }
    }

    /// Discriminator byte this event was decoded from.
    pub fn code(&self) -> Option<u8> {
        Some(match self {
            Event::Ok { .. } => RESP_CODE_OK,
            Event::Error { .. } => RESP_CODE_ERR,
            Event::Disabled => RESP_CODE_DISABLED,
            Event::ContactsStart { .. } => RESP_CODE_CONTACTS_START,
            Event::Contact(_) => RESP_CODE_CONTACT,
            Event::EndOfContacts { .. } => RESP_CODE_END_OF_CONTACTS,
            Event::SelfInfo(_) => RESP_CODE_SELF_INFO,
            Event::Sent { .. } => RESP_CODE_SENT,
            Event::ContactMessage(m) if m.snr_x4.is_some() => RESP_CODE_CONTACT_MSG_RECV_V3,
            Event::ContactMessage(_) => RESP_CODE_CONTACT_MSG_RECV,
            Event::ChannelMessage(m) if m.snr_x4.is_some() => RESP_CODE_CHANNEL_MSG_RECV_V3,
            Event::ChannelMessage(_) => RESP_CODE_CHANNEL_MSG_RECV,
            Event::CurrentTime { .. } => RESP_CODE_CURR_TIME,
            Event::NoMoreMessages => RESP_CODE_NO_MORE_MESSAGES,
            Event::ExportedContact { .. } => RESP_CODE_EXPORT_CONTACT,
            Event::Battery(_) => RESP_CODE_BATT_AND_STORAGE,
            Event::DeviceInfo(_) => RESP_CODE_DEVICE_INFO,
            Event::ChannelInfo(_) => RESP_CODE_CHANNEL_INFO,
            Event::SignStart { .. } => RESP_CODE_SIGN_START,
            Event::Signature { .. } => RESP_CODE_SIGNATURE,
            Event::StatsCore(_) | Event::StatsRadio(_) | Event::StatsPackets(_) => RESP_CODE_STATS,
            Event::Advert { .. } => PUSH_CODE_ADVERT,
            Event::PathUpdated { .. } => PUSH_CODE_PATH_UPDATED,
            Event::SendConfirmed { .. } => PUSH_CODE_SEND_CONFIRMED,
            Event::MessagesWaiting => PUSH_CODE_MSG_WAITING,
            Event::RawData { .. } => PUSH_CODE_RAW_DATA,
            Event::LoginSuccess { .. } => PUSH_CODE_LOGIN_SUCCESS,
            Event::LoginFail { .. } => PUSH_CODE_LOGIN_FAIL,
            Event::StatusResponse { .. } => PUSH_CODE_STATUS_RESPONSE,
            Event::LogRxData(_) => PUSH_CODE_LOG_RX_DATA,
            Event::TraceData(_) => PUSH_CODE_TRACE_DATA,
            Event::NewAdvert(_) => PUSH_CODE_NEW_ADVERT,
            Event::TelemetryResponse { .. } => PUSH_CODE_TELEMETRY_RESPONSE,
            Event::BinaryResponse { .. } => PUSH_CODE_BINARY_RESPONSE,
            Event::PathDiscoveryResponse { .. } => PUSH_CODE_PATH_DISCOVERY_RESPONSE,
            Event::ControlData { .. } => PUSH_CODE_CONTROL_DATA,
            Event::ParseFailure { code, .. } => return *code,
        })
    }

    /// Whether this event arrived unsolicited.
    pub fn is_push(&self) -> bool {
        self.code().map_or(false, |c| c & 0x80 != 0)
    }

    /// Sensor readings carried by a telemetry response (empty otherwise).
    pub fn readings(&self) -> Vec<TelemetryPoint> {
        match self {
            Event::TelemetryResponse { data, .. } => decode_telemetry(data),
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// Helper decode functions
// ============================================================================

fn decode_contact(r: &mut FrameReader<'_>) -> Result<ContactInfo, ProtocolError> {
    let public_key = PublicKey(r.array()?);
    let contact_type = ContactType::from(r.u8()?);
    let flags = r.u8()?;
    let path_len = r.i8()?;
    let path = r.take(MAX_PATH_SIZE)?;
    let name = r.fixed_str(NAME_SIZE)?;
    let last_advert = r.u32()?;

    // Location and lastmod were added later; older firmware omits them.
    let (lat, lon) = if r.remaining() >= 8 {
        (r.i32()?, r.i32()?)
    } else {
        (0, 0)
    };
    let last_modified = r.opt_u32().unwrap_or(0);

    Ok(ContactInfo {
        public_key,
        contact_type,
        flags,
        out_path: OutPath::from_wire(path_len, path),
        name,
        last_advert,
        lat,
        lon,
        last_modified,
    })
}

fn decode_self_info(r: &mut FrameReader<'_>) -> Result<SelfInfo, ProtocolError> {
    Ok(SelfInfo {
        advert_type: r.u8()?,
        tx_power_dbm: r.u8()?,
        max_tx_power_dbm: r.u8()?,
        public_key: PublicKey(r.array()?),
        lat: r.i32()?,
        lon: r.i32()?,
        multi_acks: r.u8()?,
        advert_loc_policy: r.u8()?,
        telemetry_modes: r.u8()?,
        manual_add_contacts: r.u8()?,
        radio: RadioParams {
            freq: r.u32()?,
            bandwidth: r.u32()?,
            spreading_factor: r.u8()?,
            coding_rate: r.u8()?,
        },
        name: r.rest_str(),
    })
}

fn decode_contact_message(
    r: &mut FrameReader<'_>,
    v3: bool,
) -> Result<ReceivedContactMessage, ProtocolError> {
    let snr_x4 = if v3 {
        let snr = r.i8()?;
        r.skip(2)?;
        Some(snr)
    } else {
        None
    };
    let sender_prefix = PublicKeyPrefix(r.array()?);
    let path_len = r.u8()?;
    let text_type = TextType::from(r.u8()?);
    let timestamp = r.u32()?;

    let signature = if text_type == TextType::SignedPlain {
        Some(r.array::<4>()?)
    } else {
        None
    };

    Ok(ReceivedContactMessage {
        sender_prefix,
        path_len,
        text_type,
        timestamp,
        snr_x4,
        signature,
        text: r.rest_str(),
    })
}

fn decode_channel_message(
    r: &mut FrameReader<'_>,
    v3: bool,
) -> Result<ReceivedChannelMessage, ProtocolError> {
    let snr_x4 = if v3 {
        let snr = r.i8()?;
        r.skip(2)?;
        Some(snr)
    } else {
        None
    };

    Ok(ReceivedChannelMessage {
        channel_idx: r.u8()?,
        path_len: r.u8()?,
        text_type: TextType::from(r.u8()?),
        timestamp: r.u32()?,
        snr_x4,
        text: r.rest_str(),
    })
}

fn decode_stats(r: &mut FrameReader<'_>) -> Result<Event, ProtocolError> {
    let stats_type = r.u8()?;
    match stats_type {
        STATS_TYPE_CORE => {
            let mut r = FrameReader::new("core stats", r.rest());
            Ok(Event::StatsCore(CoreStats {
                battery_mv: r.u16()?,
                uptime_secs: r.u32()?,
                error_flags: r.u16()?,
                queue_len: r.u8()?,
            }))
        }
        STATS_TYPE_RADIO => {
            let mut r = FrameReader::new("radio stats", r.rest());
            Ok(Event::StatsRadio(RadioStats {
                noise_floor: r.i16()?,
                last_rssi: r.i8()?,
                last_snr_x4: r.i8()?,
                tx_air_secs: r.u32()?,
                rx_air_secs: r.u32()?,
            }))
        }
        STATS_TYPE_PACKETS => {
            let mut r = FrameReader::new("packet stats", r.rest());
            Ok(Event::StatsPackets(PacketStats {
                recv: r.u32()?,
                sent: r.u32()?,
                sent_flood: r.u32()?,
                sent_direct: r.u32()?,
                recv_flood: r.u32()?,
                recv_direct: r.u32()?,
            }))
        }
        other => Err(ProtocolError::UnknownStatsType(other)),
    }
}

fn decode_status(r: &mut FrameReader<'_>) -> Result<DeviceStatus, ProtocolError> {
    Ok(DeviceStatus {
        battery_mv: r.u16()?,
        tx_queue_len: r.u16()?,
        noise_floor: r.i16()?,
        last_rssi: r.i16()?,
        packets_recv: r.u32()?,
        packets_sent: r.u32()?,
        airtime_secs: r.u32()?,
        uptime_secs: r.u32()?,
        sent_flood: r.u32()?,
        sent_direct: r.u32()?,
        recv_flood: r.u32()?,
        recv_direct: r.u32()?,
        full_events: r.u16()?,
        last_snr_x4: r.i16()?,
        direct_dups: r.u16()?,
        flood_dups: r.u16()?,
        rx_airtime_secs: r.opt_u32(),
    })
}

fn decode_trace(r: &mut FrameReader<'_>) -> Result<TraceInfo, ProtocolError> {
    r.skip(1)?;
    let path_len = r.u8()?;
    let flags = r.u8()?;
    let tag = r.u32()?;
    let auth_code = r.u32()?;

    // The low two flag bits give log2 of the hash size per hop.
    let hash_size_shift = flags & 0x03;
    let path_hashes = r.take(path_len as usize)?.to_vec();
    let snr_count = (path_len as usize) >> hash_size_shift;
    let path_snrs = r.take(snr_count)?.iter().map(|&b| b as i8).collect();
    let final_snr_x4 = r.i8()?;

    Ok(TraceInfo {
        tag,
        auth_code,
        flags,
        path_len,
        path_hashes,
        path_snrs,
        final_snr_x4,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact_frame(code: u8, key: u8, name: &str, path_len: i8, with_tail: bool) -> Vec<u8> {
        let mut frame = vec![code];
        frame.extend([key; PUB_KEY_SIZE]);
        frame.extend([ADV_TYPE_CHAT, 0, path_len as u8]);
        let mut path = [0u8; MAX_PATH_SIZE];
        path[0] = 0xA1;
        path[1] = 0xB2;
        frame.extend(path);
        frame.extend(crate::reader::encode_fixed_str(name, NAME_SIZE));
        frame.extend(1_700_000_000u32.to_le_bytes());
        if with_tail {
            frame.extend(37_774_900i32.to_le_bytes());
            frame.extend((-122_419_400i32).to_le_bytes());
            frame.extend(1_700_000_500u32.to_le_bytes());
        }
        frame
    }

    #[test]
    fn test_decode_ok_with_and_without_value() {
        assert_eq!(Event::decode(&[0]), Event::Ok { value: None });
        assert_eq!(
            Event::decode(&[0, 5, 0, 0, 0]),
            Event::Ok { value: Some(5) }
        );
    }

    #[test]
    fn test_decode_error_code() {
        assert_eq!(
            Event::decode(&[1, 2]),
            Event::Error {
                code: FirmwareErrorCode::NotFound
            }
        );
    }

    #[test]
    fn test_decode_contact_with_location() {
        let frame = contact_frame(RESP_CODE_CONTACT, 0x11, "alice", 2, true);
        let Event::Contact(contact) = Event::decode(&frame) else {
            panic!("expected contact");
        };
        assert_eq!(contact.public_key, PublicKey([0x11; PUB_KEY_SIZE]));
        assert_eq!(contact.name, "alice");
        assert_eq!(contact.out_path, OutPath::Direct(vec![0xA1, 0xB2]));
        assert_eq!(contact.lat, 37_774_900);
        assert_eq!(contact.lon, -122_419_400);
        assert_eq!(contact.last_modified, 1_700_000_500);
    }

    #[test]
    fn test_decode_contact_without_tail() {
        let frame = contact_frame(PUSH_CODE_NEW_ADVERT, 0x22, "bob", -1, false);
        let Event::NewAdvert(contact) = Event::decode(&frame) else {
            panic!("expected new advert");
        };
        assert!(contact.out_path.is_flood());
        assert_eq!(contact.lat, 0);
        assert_eq!(contact.last_modified, 0);
    }

    #[test]
    fn test_short_contact_is_parse_failure() {
        let frame = contact_frame(RESP_CODE_CONTACT, 0x11, "alice", 0, false);
        match Event::decode(&frame[..40]) {
            Event::ParseFailure { code, reason } => {
                assert_eq!(code, Some(RESP_CODE_CONTACT));
                assert!(reason.contains("contact"));
                assert!(reason.contains("too short"));
            }
            other => panic!("expected parse failure, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_sent_and_confirm() {
        let mut frame = vec![RESP_CODE_SENT, 1];
        frame.extend(0xDEAD_BEEFu32.to_le_bytes());
        frame.extend(4000u32.to_le_bytes());
        assert_eq!(
            Event::decode(&frame),
            Event::Sent {
                is_flood: true,
                expected_ack: 0xDEAD_BEEF,
                est_timeout_ms: 4000
            }
        );

        let mut frame = vec![PUSH_CODE_SEND_CONFIRMED];
        frame.extend(0xDEAD_BEEFu32.to_le_bytes());
        frame.extend(850u32.to_le_bytes());
        assert_eq!(
            Event::decode(&frame),
            Event::SendConfirmed {
                ack_code: 0xDEAD_BEEF,
                round_trip_ms: 850
            }
        );
    }

    #[test]
    fn test_decode_contact_message_v3() {
        let mut frame = vec![RESP_CODE_CONTACT_MSG_RECV_V3, 0xF6, 0, 0];
        frame.extend([1, 2, 3, 4, 5, 6]);
        frame.extend([PATH_LEN_FLOOD, TXT_TYPE_PLAIN]);
        frame.extend(42u32.to_le_bytes());
        frame.extend(b"hello\0");
        let Event::ContactMessage(msg) = Event::decode(&frame) else {
            panic!("expected contact message");
        };
        assert_eq!(msg.sender_prefix, PublicKeyPrefix([1, 2, 3, 4, 5, 6]));
        assert_eq!(msg.snr(), Some(-2.5));
        assert!(msg.is_flood());
        assert_eq!(msg.timestamp, 42);
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn test_decode_signed_message_v2() {
        let mut frame = vec![RESP_CODE_CONTACT_MSG_RECV];
        frame.extend([1, 2, 3, 4, 5, 6]);
        frame.extend([0, TXT_TYPE_SIGNED_PLAIN]);
        frame.extend(7u32.to_le_bytes());
        frame.extend([9, 9, 9, 9]);
        frame.extend(b"signed");
        let Event::ContactMessage(msg) = Event::decode(&frame) else {
            panic!("expected contact message");
        };
        assert_eq!(msg.snr_x4, None);
        assert_eq!(msg.signature, Some([9, 9, 9, 9]));
        assert_eq!(msg.text, "signed");
    }

    #[test]
    fn test_decode_channel_message_v3() {
        let mut frame = vec![RESP_CODE_CHANNEL_MSG_RECV_V3, 0x10, 0, 0, 3, 2, 0];
        frame.extend(9u32.to_le_bytes());
        frame.extend(b"carol: hi");
        let Event::ChannelMessage(msg) = Event::decode(&frame) else {
            panic!("expected channel message");
        };
        assert_eq!(msg.channel_idx, 3);
        assert_eq!(msg.snr(), Some(4.0));
        assert_eq!(msg.text, "carol: hi");
    }

    #[test]
    fn test_decode_status_response() {
        let mut frame = vec![PUSH_CODE_STATUS_RESPONSE, 0];
        frame.extend([0xAA; PUB_KEY_PREFIX_SIZE]);
        frame.extend(4100u16.to_le_bytes()); // battery
        frame.extend(3u16.to_le_bytes()); // tx queue
        frame.extend((-110i16).to_le_bytes()); // noise floor
        frame.extend((-80i16).to_le_bytes()); // last rssi
        for v in 1..=8u32 {
            frame.extend(v.to_le_bytes());
        }
        frame.extend(9u16.to_le_bytes()); // full events
        frame.extend(22i16.to_le_bytes()); // last snr x4
        frame.extend(10u16.to_le_bytes()); // direct dups
        frame.extend(11u16.to_le_bytes()); // flood dups
        frame.extend(12u32.to_le_bytes()); // rx airtime

        let Event::StatusResponse { prefix, status } = Event::decode(&frame) else {
            panic!("expected status response");
        };
        assert_eq!(prefix, PublicKeyPrefix([0xAA; 6]));
        assert_eq!(status.battery_mv, 4100);
        assert_eq!(status.noise_floor, -110);
        assert_eq!(status.packets_recv, 1);
        assert_eq!(status.uptime_secs, 4);
        assert_eq!(status.recv_direct, 8);
        assert_eq!(status.last_snr(), 5.5);
        assert_eq!(status.rx_airtime_secs, Some(12));
        assert_eq!(frame.len(), 2 + PUB_KEY_PREFIX_SIZE + DeviceStatus::WIRE_SIZE);
    }

    #[test]
    fn test_decode_status_response_without_rx_airtime() {
        // 58 bytes after the code: the sixteen fixed fields plus three
        // trailing bytes too short to hold the airtime counter.
        let mut frame = vec![PUSH_CODE_STATUS_RESPONSE, 0];
        frame.extend([0x11; PUB_KEY_PREFIX_SIZE]);
        frame.extend(3700u16.to_le_bytes());
        frame.resize(1 + 58, 0);
        assert!(min_frame_len(PUSH_CODE_STATUS_RESPONSE).unwrap() <= frame.len());

        let Event::StatusResponse { prefix, status } = Event::decode(&frame) else {
            panic!("expected status response");
        };
        assert_eq!(prefix, PublicKeyPrefix([0x11; 6]));
        assert_eq!(status.battery_mv, 3700);
        assert_eq!(status.flood_dups, 0);
        assert_eq!(status.rx_airtime_secs, None);

        frame.truncate(2 + PUB_KEY_PREFIX_SIZE + DeviceStatus::MIN_WIRE_SIZE - 1);
        assert!(matches!(
            Event::decode(&frame),
            Event::ParseFailure { code: Some(PUSH_CODE_STATUS_RESPONSE), .. }
        ));
    }

    #[test]
    fn test_decode_stats_variants() {
        let mut frame = vec![RESP_CODE_STATS, STATS_TYPE_CORE];
        frame.extend(3900u16.to_le_bytes());
        frame.extend(3600u32.to_le_bytes());
        frame.extend(0u16.to_le_bytes());
        frame.push(2);
        assert_eq!(
            Event::decode(&frame),
            Event::StatsCore(CoreStats {
                battery_mv: 3900,
                uptime_secs: 3600,
                error_flags: 0,
                queue_len: 2
            })
        );

        match Event::decode(&[RESP_CODE_STATS, STATS_TYPE_RADIO, 1]) {
            Event::ParseFailure { reason, .. } => {
                assert!(reason.contains("radio stats"));
                assert!(reason.contains("too short"));
            }
            other => panic!("expected parse failure, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_stats_type() {
        match Event::decode(&[RESP_CODE_STATS, 9]) {
            Event::ParseFailure { reason, .. } => assert!(reason.contains("stats type")),
            other => panic!("expected parse failure, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_code() {
        match Event::decode(&[0x7F, 1, 2]) {
            Event::ParseFailure { code, reason } => {
                assert_eq!(code, Some(0x7F));
                assert!(reason.contains("0x7F"));
            }
            other => panic!("expected parse failure, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_trace_data() {
        let mut frame = vec![PUSH_CODE_TRACE_DATA, 0, 2, 0];
        frame.extend(77u32.to_le_bytes());
        frame.extend(5u32.to_le_bytes());
        frame.extend([0x11, 0x22]); // hashes
        frame.extend([8, 0xFC]); // snrs
        frame.push(12); // final snr
        let Event::TraceData(trace) = Event::decode(&frame) else {
            panic!("expected trace");
        };
        assert_eq!(trace.tag, 77);
        assert_eq!(trace.path_hashes, vec![0x11, 0x22]);
        assert_eq!(trace.path_snrs, vec![8, -4]);
        assert_eq!(trace.final_snr_x4, 12);

        // Declared path longer than the frame.
        frame.truncate(14);
        assert!(matches!(Event::decode(&frame), Event::ParseFailure { .. }));
    }

    #[test]
    fn test_decode_path_discovery() {
        let mut frame = vec![PUSH_CODE_PATH_DISCOVERY_RESPONSE, 0];
        frame.extend([7; 6]);
        frame.extend([2, 0xA, 0xB, 1, 0xC]);
        assert_eq!(
            Event::decode(&frame),
            Event::PathDiscoveryResponse {
                prefix: PublicKeyPrefix([7; 6]),
                out_path: vec![0xA, 0xB],
                in_path: vec![0xC],
            }
        );
    }

    #[test]
    fn test_telemetry_response_readings() {
        let mut frame = vec![PUSH_CODE_TELEMETRY_RESPONSE, 0];
        frame.extend([5; 6]);
        frame.extend([1, 103, 0xFF, 0x00]);
        let event = Event::decode(&frame);
        let readings = event.readings();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].value.as_f64(), Some(25.5));
    }

    #[test]
    fn test_log_rx_data_route() {
        let frame = [PUSH_CODE_LOG_RX_DATA, 0x28, 0xB0, 0x15, 0x00, 0x42];
        let Event::LogRxData(entry) = Event::decode(&frame) else {
            panic!("expected rx log");
        };
        assert_eq!(entry.snr(), 10.0);
        assert_eq!(entry.rssi, -80);
        let route = entry.route().unwrap();
        assert_eq!(route.payload, vec![0x42]);
    }

    #[test]
    fn test_login_success_optional_fields() {
        let mut frame = vec![PUSH_CODE_LOGIN_SUCCESS, 1];
        frame.extend([3; 6]);
        let event = Event::decode(&frame);
        assert_eq!(
            event,
            Event::LoginSuccess {
                prefix: PublicKeyPrefix([3; 6]),
                is_admin: true,
                server_timestamp: None,
                acl_permissions: None,
                firmware_level: None,
            }
        );
        assert!(event.is_push());
    }

    #[test]
    fn test_code_and_name_agree_with_table() {
        let event = Event::decode(&[RESP_CODE_NO_MORE_MESSAGES]);
        assert_eq!(event.code(), Some(RESP_CODE_NO_MORE_MESSAGES));
        assert_eq!(event.name(), "no more messages");
        assert!(!event.is_push());
    }

    #[test]
    fn test_short_frames_never_panic() {
        for code in 0..=u8::MAX {
            for len in 0..200usize {
                for fill in [0x00u8, 0xFF] {
                    let mut frame = vec![fill; len];
                    if let Some(first) = frame.first_mut() {
                        *first = code;
                    }
                    let event = Event::decode(&frame);
                    let Some(min) = min_frame_len(code) else {
                        continue;
                    };
                    if len < min {
                        match event {
                            Event::ParseFailure { reason, .. } => {
                                assert!(
                                    reason.contains("too short"),
                                    "code {:#04x} len {}: {}",
                                    code,
                                    len,
                                    reason
                                );
                            }
                            other => panic!("code {:#04x} len {} decoded to {:?}", code, len, other),
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_empty_frame() {
        match Event::decode(&[]) {
            Event::ParseFailure { code, reason } => {
                assert_eq!(code, None);
                assert!(reason.contains("too short"));
            }
            other => panic!("expected parse failure, got {:?}", other),
        }
    }
}
