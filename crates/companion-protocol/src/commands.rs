//! Host-to-radio command frames.
//!
//! Each [`Command`] encodes to exactly one frame: the discriminator byte
//! followed by little-endian fields. [`Command::validate`] reports every
//! input the wire cannot represent before anything is written.

use bytes::{BufMut, BytesMut};

use crate::constants::*;
use crate::error::ProtocolError;
use crate::reader::{encode_fixed_str, truncate_utf8};
use crate::types::*;

/// One command frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start-session handshake.
    AppStart {
        app_version: u8,
        /// NUL-padded to 12 bytes on the wire.
        client_id: String,
    },

    DeviceQuery {
        app_version: u8,
    },

    /// Direct message, addressed by key prefix.
    SendTextMessage {
        text_type: TextType,
        /// Zero for the first send, incremented on resends.
        attempt: u8,
        timestamp: u32,
        recipient: PublicKeyPrefix,
        text: String,
    },

    SendChannelTextMessage {
        text_type: TextType,
        channel_idx: u8,
        timestamp: u32,
        text: String,
    },

    /// Start a contact enumeration.
    GetContacts {
        /// Incremental sync: only contacts modified after this timestamp.
        since: Option<u32>,
    },

    GetDeviceTime,

    SetDeviceTime {
        time_secs: u32,
    },

    /// Advertise this node.
    SendSelfAdvert {
        /// Flood through repeaters instead of zero-hop.
        flood: bool,
    },

    SetAdvertName {
        name: String,
    },

    /// Advertised position; latitude and longitude in microdegrees.
    SetAdvertLatLon {
        lat: i32,
        lon: i32,
        /// Metres.
        alt: i32,
    },

    AddUpdateContact {
        contact: ContactInfo,
    },

    RemoveContact {
        public_key: PublicKey,
    },

    /// Reset the path to a contact (back to flood).
    ResetPath {
        public_key: PublicKey,
    },

    GetContactByKey {
        public_key: PublicKey,
    },

    /// Re-broadcast a stored advert to zero-hop neighbours.
    ShareContact {
        public_key: PublicKey,
    },

    /// Export a contact card; `None` exports this node's own card.
    ExportContact {
        public_key: Option<PublicKey>,
    },

    /// Import a contact from an exported blob.
    ImportContact {
        data: Vec<u8>,
    },

    /// Pop one message from the offline queue.
    SyncNextMessage,

    SetRadioParams {
        params: RadioParams,
    },

    SetRadioTxPower {
        /// dBm.
        power_dbm: u8,
    },

    /// Set other parameters. Trailing options are only sent when every
    /// earlier one is present.
    SetOtherParams {
        manual_add_contacts: u8,
        telemetry_modes: Option<u8>,
        advert_loc_policy: Option<u8>,
        multi_acks: Option<u8>,
    },

    Reboot,

    GetBatteryAndStorage,

    /// Send login request to a repeater or room server.
    SendLogin {
        public_key: PublicKey,
        password: String,
    },

    SendStatusRequest {
        public_key: PublicKey,
    },

    SendTelemetryRequest {
        public_key: PublicKey,
    },

    Logout {
        public_key: PublicKey,
    },

    GetChannel {
        index: u8,
    },

    SetChannel {
        channel: ChannelInfo,
    },

    /// Start a signing operation for `data_len` bytes.
    SignStart {
        data_len: u32,
    },

    /// Provide one chunk of data to sign.
    SignData {
        data: Vec<u8>,
    },

    SignFinish,

    /// Send a trace packet along an explicit path.
    SendTracePath {
        tag: u32,
        auth: u32,
        flags: u8,
        path: Vec<u8>,
    },

    SetDevicePin {
        /// Zero disables the PIN; otherwise six digits.
        pin: u32,
    },

    /// Send a binary request to a remote node.
    SendBinaryRequest {
        public_key: PublicKey,
        request_type: u8,
        payload: Vec<u8>,
    },

    SendPathDiscoveryRequest {
        public_key: PublicKey,
    },

    /// Send control data (first byte must have bit 7 set).
    SendControlData {
        data: Vec<u8>,
    },

    GetStats {
        stats_type: StatsType,
    },
}

impl Command {
    /// Coordinates from degrees (rounded to microdegrees).
    pub fn set_coordinates(lat_degrees: f64, lon_degrees: f64, alt_metres: i32) -> Self {
        Command::SetAdvertLatLon {
            lat: degrees_to_micro(lat_degrees),
            lon: degrees_to_micro(lon_degrees),
            alt: alt_metres,
        }
    }

    /// Discriminator byte.
    pub fn code(&self) -> u8 {
        match self {
            Command::AppStart { .. } => CMD_APP_START,
            Command::DeviceQuery { .. } => CMD_DEVICE_QUERY,
            Command::SendTextMessage { .. } => CMD_SEND_TXT_MSG,
            Command::SendChannelTextMessage { .. } => CMD_SEND_CHANNEL_TXT_MSG,
            Command::GetContacts { .. } => CMD_GET_CONTACTS,
            Command::GetDeviceTime => CMD_GET_DEVICE_TIME,
            Command::SetDeviceTime { .. } => CMD_SET_DEVICE_TIME,
            Command::SendSelfAdvert { .. } => CMD_SEND_SELF_ADVERT,
            Command::SetAdvertName { .. } => CMD_SET_ADVERT_NAME,
            Command::SetAdvertLatLon { .. } => CMD_SET_ADVERT_LATLON,
            Command::AddUpdateContact { .. } => CMD_ADD_UPDATE_CONTACT,
            Command::RemoveContact { .. } => CMD_REMOVE_CONTACT,
            Command::ResetPath { .. } => CMD_RESET_PATH,
            Command::GetContactByKey { .. } => CMD_GET_CONTACT_BY_KEY,
            Command::ShareContact { .. } => CMD_SHARE_CONTACT,
            Command::ExportContact { .. } => CMD_EXPORT_CONTACT,
            Command::ImportContact { .. } => CMD_IMPORT_CONTACT,
            Command::SyncNextMessage => CMD_SYNC_NEXT_MESSAGE,
            Command::SetRadioParams { .. } => CMD_SET_RADIO_PARAMS,
            Command::SetRadioTxPower { .. } => CMD_SET_RADIO_TX_POWER,
            Command::SetOtherParams { .. } => CMD_SET_OTHER_PARAMS,
            Command::Reboot => CMD_REBOOT,
            Command::GetBatteryAndStorage => CMD_GET_BATT_AND_STORAGE,
            Command::SendLogin { .. } => CMD_SEND_LOGIN,
            Command::SendStatusRequest { .. } => CMD_SEND_STATUS_REQ,
            Command::SendTelemetryRequest { .. } => CMD_SEND_TELEMETRY_REQ,
            Command::Logout { .. } => CMD_LOGOUT,
            Command::GetChannel { .. } => CMD_GET_CHANNEL,
            Command::SetChannel { .. } => CMD_SET_CHANNEL,
            Command::SignStart { .. } => CMD_SIGN_START,
            Command::SignData { .. } => CMD_SIGN_DATA,
            Command::SignFinish => CMD_SIGN_FINISH,
            Command::SendTracePath { .. } => CMD_SEND_TRACE_PATH,
            Command::SetDevicePin { .. } => CMD_SET_DEVICE_PIN,
            Command::SendBinaryRequest { .. } => CMD_SEND_BINARY_REQ,
            Command::SendPathDiscoveryRequest { .. } => CMD_SEND_PATH_DISCOVERY_REQ,
            Command::SendControlData { .. } => CMD_SEND_CONTROL_DATA,
            Command::GetStats { .. } => CMD_GET_STATS,
        }
    }

    /// Reject values the firmware cannot accept, before any I/O.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Command::AppStart { client_id, .. } if client_id.is_empty() => {
                Err(ProtocolError::invalid_input("client id must not be empty"))
            }
            Command::SetAdvertName { name } if name.is_empty() => {
                Err(ProtocolError::invalid_input("advert name must not be empty"))
            }
            Command::SendTextMessage { text, .. } | Command::SendChannelTextMessage { text, .. }
                if text.is_empty() =>
            {
                Err(ProtocolError::invalid_input("message text must not be empty"))
            }
            Command::SetChannel { channel } if channel.name.is_empty() => {
                Err(ProtocolError::invalid_input("channel name must not be empty"))
            }
            Command::SignData { data } if data.is_empty() => {
                Err(ProtocolError::invalid_input("sign chunk must not be empty"))
            }
            Command::ImportContact { data } if data.is_empty() => {
                Err(ProtocolError::invalid_input("contact blob must not be empty"))
            }
            Command::SendTracePath { path, .. } if path.len() > MAX_PATH_SIZE => {
                Err(ProtocolError::invalid_input(format!(
                    "trace path of {} hops exceeds {}",
                    path.len(),
                    MAX_PATH_SIZE
                )))
            }
            Command::SendControlData { data } if data.first().map_or(true, |b| b & 0x80 == 0) => {
                Err(ProtocolError::invalid_input(
                    "control data must start with a byte that has bit 7 set",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Validate, then encode.
    pub fn try_encode(&self) -> Result<Vec<u8>, ProtocolError> {
        self.validate()?;
        Ok(self.encode())
    }

    /// Frame bytes. Does not validate; see [`Command::try_encode`].
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(MAX_FRAME_SIZE);
        buf.put_u8(self.code());

        match self {
            Command::AppStart {
                app_version,
                client_id,
            } => {
                buf.put_u8(*app_version);
                buf.put_slice(&encode_fixed_str(client_id, CLIENT_ID_SIZE));
            }

            Command::DeviceQuery { app_version } => {
                buf.put_u8(*app_version);
            }

            Command::SendTextMessage {
                text_type,
                attempt,
                timestamp,
                recipient,
                text,
            } => {
                buf.put_u8((*text_type).into());
                buf.put_u8(*attempt);
                buf.put_u32_le(*timestamp);
                buf.put_slice(recipient.as_bytes());
                buf.put_slice(text.as_bytes());
            }

            Command::SendChannelTextMessage {
                text_type,
                channel_idx,
                timestamp,
                text,
            } => {
                buf.put_u8((*text_type).into());
                buf.put_u8(*channel_idx);
                buf.put_u32_le(*timestamp);
                buf.put_slice(text.as_bytes());
            }

            Command::GetContacts { since } => {
                if let Some(since) = since {
                    buf.put_u32_le(*since);
                }
            }

            Command::SetDeviceTime { time_secs } => {
                buf.put_u32_le(*time_secs);
            }

            Command::SendSelfAdvert { flood } => {
                buf.put_u8(u8::from(*flood));
            }

            Command::SetAdvertName { name } => {
                buf.put_slice(truncate_utf8(name, NAME_SIZE).as_bytes());
            }

            Command::SetAdvertLatLon { lat, lon, alt } => {
                buf.put_i32_le(*lat);
                buf.put_i32_le(*lon);
                buf.put_i32_le(*alt);
            }

            Command::AddUpdateContact { contact } => {
                buf.put_slice(contact.public_key.as_bytes());
                buf.put_u8(contact.contact_type.into());
                buf.put_u8(contact.flags);
                buf.put_i8(contact.out_path.wire_len());
                buf.put_slice(&contact.out_path.wire_bytes());
                buf.put_slice(&encode_fixed_str(&contact.name, NAME_SIZE));
                buf.put_u32_le(contact.last_advert);
                buf.put_i32_le(contact.lat);
                buf.put_i32_le(contact.lon);
                buf.put_u32_le(contact.last_modified);
            }

            Command::RemoveContact { public_key }
            | Command::ResetPath { public_key }
            | Command::GetContactByKey { public_key }
            | Command::ShareContact { public_key }
            | Command::SendStatusRequest { public_key }
            | Command::Logout { public_key } => {
                buf.put_slice(public_key.as_bytes());
            }

            Command::ExportContact { public_key } => {
                if let Some(pk) = public_key {
                    buf.put_slice(pk.as_bytes());
                }
            }

            Command::ImportContact { data } => {
                buf.put_slice(data);
            }

            Command::SetRadioParams { params } => {
                buf.put_u32_le(params.freq);
                buf.put_u32_le(params.bandwidth);
                buf.put_u8(params.spreading_factor);
                buf.put_u8(params.coding_rate);
            }

            Command::SetRadioTxPower { power_dbm } => {
                buf.put_u8(*power_dbm);
            }

            Command::SetOtherParams {
                manual_add_contacts,
                telemetry_modes,
                advert_loc_policy,
                multi_acks,
            } => {
                buf.put_u8(*manual_add_contacts);
                if let Some(tm) = telemetry_modes {
                    buf.put_u8(*tm);
                    if let Some(alp) = advert_loc_policy {
                        buf.put_u8(*alp);
                        if let Some(ma) = multi_acks {
                            buf.put_u8(*ma);
                        }
                    }
                }
            }

            Command::Reboot => {
                buf.put_slice(b"reboot");
            }

            Command::SendLogin {
                public_key,
                password,
            } => {
                buf.put_slice(public_key.as_bytes());
                buf.put_slice(password.as_bytes());
            }

            Command::SendTelemetryRequest { public_key } => {
                buf.put_slice(&[0, 0, 0]);
                buf.put_slice(public_key.as_bytes());
            }

            Command::GetChannel { index } => {
                buf.put_u8(*index);
            }

            Command::SetChannel { channel } => {
                buf.put_u8(channel.index);
                buf.put_slice(&encode_fixed_str(&channel.name, NAME_SIZE));
                buf.put_slice(&channel.secret);
            }

            Command::SignStart { data_len } => {
                buf.put_u32_le(*data_len);
            }

            Command::SignData { data } => {
                buf.put_slice(data);
            }

            Command::SendTracePath {
                tag,
                auth,
                flags,
                path,
            } => {
                buf.put_u32_le(*tag);
                buf.put_u32_le(*auth);
                buf.put_u8(*flags);
                buf.put_slice(path);
            }

            Command::SetDevicePin { pin } => {
                buf.put_u32_le(*pin);
            }

            Command::SendBinaryRequest {
                public_key,
                request_type,
                payload,
            } => {
                buf.put_slice(public_key.as_bytes());
                buf.put_u8(*request_type);
                buf.put_slice(payload);
            }

            Command::SendPathDiscoveryRequest { public_key } => {
                buf.put_u8(0);
                buf.put_slice(public_key.as_bytes());
            }

            Command::SendControlData { data } => {
                buf.put_slice(data);
            }

            Command::GetStats { stats_type } => {
                buf.put_u8((*stats_type).into());
            }

            Command::GetDeviceTime
            | Command::SyncNextMessage
            | Command::GetBatteryAndStorage
            | Command::SignFinish => {}
        }

        buf.to_vec()
    }
}
