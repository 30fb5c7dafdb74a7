//! Typed values carried by command and response frames.

use crate::constants::*;
use crate::error::ProtocolError;

/// A 32-byte public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PublicKey(pub [u8; PUB_KEY_SIZE]);

impl PublicKey {
    pub fn new(bytes: [u8; PUB_KEY_SIZE]) -> Self {
        PublicKey(bytes)
    }

    /// Create from a slice, truncating input longer than 32 bytes.
    pub fn from_bytes(slice: &[u8]) -> Result<Self, ProtocolError> {
        if slice.len() < PUB_KEY_SIZE {
            return Err(ProtocolError::invalid_input(format!(
                "public key needs {} bytes, got {}",
                PUB_KEY_SIZE,
                slice.len()
            )));
        }
        let mut bytes = [0u8; PUB_KEY_SIZE];
        bytes.copy_from_slice(&slice[..PUB_KEY_SIZE]);
        Ok(PublicKey(bytes))
    }

    /// Parse a 64-digit hex string.
    pub fn from_hex(text: &str) -> Result<Self, ProtocolError> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| ProtocolError::invalid_input(format!("bad public key hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// The 6-byte prefix used to address this key in many messages.
    pub fn prefix(&self) -> PublicKeyPrefix {
        PublicKeyPrefix::from(self)
    }

    pub fn as_bytes(&self) -> &[u8; PUB_KEY_SIZE] {
        &self.0
    }

    /// Lowercase hex, no separators.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A 6-byte public key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PublicKeyPrefix(pub [u8; PUB_KEY_PREFIX_SIZE]);

impl PublicKeyPrefix {
    pub fn new(bytes: [u8; PUB_KEY_PREFIX_SIZE]) -> Self {
        PublicKeyPrefix(bytes)
    }

    /// Create from a slice, truncating input longer than 6 bytes.
    pub fn from_bytes(slice: &[u8]) -> Result<Self, ProtocolError> {
        if slice.len() < PUB_KEY_PREFIX_SIZE {
            return Err(ProtocolError::invalid_input(format!(
                "key prefix needs {} bytes, got {}",
                PUB_KEY_PREFIX_SIZE,
                slice.len()
            )));
        }
        let mut bytes = [0u8; PUB_KEY_PREFIX_SIZE];
        bytes.copy_from_slice(&slice[..PUB_KEY_PREFIX_SIZE]);
        Ok(PublicKeyPrefix(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; PUB_KEY_PREFIX_SIZE] {
        &self.0
    }

    /// Lowercase hex, no separators.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether `key` starts with this prefix.
    pub fn matches(&self, key: &PublicKey) -> bool {
        key.0.starts_with(&self.0)
    }
}

impl From<&PublicKey> for PublicKeyPrefix {
    fn from(key: &PublicKey) -> Self {
        let mut prefix = [0u8; PUB_KEY_PREFIX_SIZE];
        prefix.copy_from_slice(&key.0[..PUB_KEY_PREFIX_SIZE]);
        PublicKeyPrefix(prefix)
    }
}

impl std::fmt::Display for PublicKeyPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Kind of node a contact represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactType {
    Chat,
    Repeater,
    RoomServer,
    Sensor,
    Unknown(u8),
}

impl From<u8> for ContactType {
    fn from(value: u8) -> Self {
        match value {
            ADV_TYPE_CHAT => ContactType::Chat,
            ADV_TYPE_REPEATER => ContactType::Repeater,
            ADV_TYPE_ROOM_SERVER => ContactType::RoomServer,
            ADV_TYPE_SENSOR => ContactType::Sensor,
            other => ContactType::Unknown(other),
        }
    }
}

impl From<ContactType> for u8 {
    fn from(value: ContactType) -> Self {
        match value {
            ContactType::Chat => ADV_TYPE_CHAT,
            ContactType::Repeater => ADV_TYPE_REPEATER,
            ContactType::RoomServer => ADV_TYPE_ROOM_SERVER,
            ContactType::Sensor => ADV_TYPE_SENSOR,
            ContactType::Unknown(v) => v,
        }
    }
}

/// Outbound route to a contact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum OutPath {
    /// No known path; messages are flooded.
    #[default]
    Flood,
    /// Explicit hop list (one hash byte per hop, at most 64).
    Direct(Vec<u8>),
}

impl OutPath {
    /// Build from the signed wire length and the 64-byte path field.
    pub fn from_wire(len: i8, path: &[u8]) -> Self {
        if len < 0 {
            OutPath::Flood
        } else {
            let len = (len as usize).min(path.len()).min(MAX_PATH_SIZE);
            OutPath::Direct(path[..len].to_vec())
        }
    }

    /// Signed wire length (-1 for flood).
    pub fn wire_len(&self) -> i8 {
        match self {
            OutPath::Flood => OUT_PATH_FLOOD,
            OutPath::Direct(hops) => hops.len().min(MAX_PATH_SIZE) as i8,
        }
    }

    /// The 64-byte zero-padded path field.
    pub fn wire_bytes(&self) -> [u8; MAX_PATH_SIZE] {
        let mut out = [0u8; MAX_PATH_SIZE];
        if let OutPath::Direct(hops) = self {
            let len = hops.len().min(MAX_PATH_SIZE);
            out[..len].copy_from_slice(&hops[..len]);
        }
        out
    }

    pub fn is_flood(&self) -> bool {
        matches!(self, OutPath::Flood)
    }
}

/// One entry of the radio's contact table.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactInfo {
    /// Contact's public key.
    pub public_key: PublicKey,
    /// Contact type (Chat, Repeater, RoomServer, Sensor).
    pub contact_type: ContactType,
    /// Contact flags.
    pub flags: u8,
    /// Outbound path.
    pub out_path: OutPath,
    /// Contact name (up to 32 bytes).
    pub name: String,
    /// When the contact last advertised, by its own clock.
    pub last_advert: u32,
    /// Microdegrees.
    pub lat: i32,
    /// Microdegrees.
    pub lon: i32,
    /// Radio-side change time; drives incremental contact sync.
    pub last_modified: u32,
}

impl Default for ContactInfo {
    fn default() -> Self {
        ContactInfo {
            public_key: PublicKey::default(),
            contact_type: ContactType::Chat,
            flags: 0,
            out_path: OutPath::Flood,
            name: String::new(),
            last_advert: 0,
            lat: 0,
            lon: 0,
            last_modified: 0,
        }
    }
}

impl ContactInfo {
    /// Degrees.
    pub fn latitude(&self) -> f64 {
        self.lat as f64 / 1_000_000.0
    }

    pub fn longitude(&self) -> f64 {
        self.lon as f64 / 1_000_000.0
    }

    /// False while messages to this contact still flood.
    pub fn has_direct_path(&self) -> bool {
        !self.out_path.is_flood()
    }

    /// Check if coordinates were advertised.
    pub fn has_location(&self) -> bool {
        self.lat != 0 || self.lon != 0
    }
}

/// Channel details.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelInfo {
    /// Channel slot index (0-based).
    pub index: u8,
    /// Channel name (up to 32 bytes).
    pub name: String,
    /// Channel secret key (128-bit).
    pub secret: [u8; CHANNEL_SECRET_SIZE],
}

/// Identity and radio settings reported at the start-session handshake.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelfInfo {
    pub advert_type: u8,
    /// dBm.
    pub tx_power_dbm: u8,
    pub max_tx_power_dbm: u8,
    /// Node's public key.
    pub public_key: PublicKey,
    /// Latitude (microdegrees).
    pub lat: i32,
    /// Longitude (microdegrees).
    pub lon: i32,
    /// Multi-ACK count.
    pub multi_acks: u8,
    pub advert_loc_policy: u8,
    /// Two bits per telemetry class (base, location, environment).
    pub telemetry_modes: u8,
    /// Non-zero: new adverts are held for approval instead of auto-added.
    pub manual_add_contacts: u8,
    /// Radio parameters.
    pub radio: RadioParams,
    /// Node name.
    pub name: String,
}

impl SelfInfo {
    /// Degrees.
    pub fn latitude(&self) -> f64 {
        self.lat as f64 / 1_000_000.0
    }

    pub fn longitude(&self) -> f64 {
        self.lon as f64 / 1_000_000.0
    }
}

/// Firmware and board description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub firmware_version_code: u8,
    /// Maximum contacts / 2.
    pub max_contacts_half: u8,
    pub max_channels: u8,
    /// BLE PIN code.
    pub ble_pin: u32,
    /// Firmware build date.
    pub build_date: String,
    /// Manufacturer / board name.
    pub model: String,
    /// Human-readable firmware version, e.g. `v1.9.0`.
    pub version: String,
}

impl DeviceInfo {
    /// Contact table capacity; the wire carries half of it.
    pub fn max_contacts(&self) -> usize {
        (self.max_contacts_half as usize) * 2
    }
}

/// LoRa radio parameters.
///
/// Frequency and bandwidth are fixed-point: MHz × 1000 and kHz × 1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioParams {
    /// Frequency in kHz (MHz × 1000).
    pub freq: u32,
    /// Bandwidth in Hz (kHz × 1000).
    pub bandwidth: u32,
    /// 5 to 12.
    pub spreading_factor: u8,
    /// Coding rate (5-8).
    pub coding_rate: u8,
}

impl Default for RadioParams {
    fn default() -> Self {
        RadioParams {
            freq: 910_525,     // 910.525 MHz
            bandwidth: 62_500, // 62.5 kHz
            spreading_factor: 7,
            coding_rate: 5,
        }
    }
}

impl RadioParams {
    /// Build from human units.
    pub fn from_mhz_khz(freq_mhz: f64, bandwidth_khz: f64, spreading_factor: u8, coding_rate: u8) -> Self {
        RadioParams {
            freq: (freq_mhz * 1000.0).round() as u32,
            bandwidth: (bandwidth_khz * 1000.0).round() as u32,
            spreading_factor,
            coding_rate,
        }
    }

    /// Get frequency in MHz.
    pub fn frequency_mhz(&self) -> f64 {
        self.freq as f64 / 1000.0
    }

    /// Get bandwidth in kHz.
    pub fn bandwidth_khz(&self) -> f64 {
        self.bandwidth as f64 / 1000.0
    }
}

/// Battery level and, on newer firmware, flash usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryAndStorage {
    pub battery_millivolts: u16,
    /// Storage used in KB (newer firmware only).
    pub storage_used_kb: Option<u32>,
    /// Total storage in KB (newer firmware only).
    pub storage_total_kb: Option<u32>,
}

impl BatteryAndStorage {
    pub fn battery_volts(&self) -> f32 {
        self.battery_millivolts as f32 / 1000.0
    }
}

/// How the text of a message is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextType {
    /// Plain text message.
    #[default]
    Plain,
    /// CLI/command data.
    CliData,
    /// Signed plain text.
    SignedPlain,
    /// Unknown type.
    Unknown(u8),
}

impl From<u8> for TextType {
    fn from(value: u8) -> Self {
        match value {
            TXT_TYPE_PLAIN => TextType::Plain,
            TXT_TYPE_CLI_DATA => TextType::CliData,
            TXT_TYPE_SIGNED_PLAIN => TextType::SignedPlain,
            _ => TextType::Unknown(value),
        }
    }
}

impl From<TextType> for u8 {
    fn from(value: TextType) -> Self {
        match value {
            TextType::Plain => TXT_TYPE_PLAIN,
            TextType::CliData => TXT_TYPE_CLI_DATA,
            TextType::SignedPlain => TXT_TYPE_SIGNED_PLAIN,
            TextType::Unknown(v) => v,
        }
    }
}

/// Which statistics block to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsType {
    Core,
    Radio,
    Packets,
}

impl From<StatsType> for u8 {
    fn from(value: StatsType) -> Self {
        match value {
            StatsType::Core => STATS_TYPE_CORE,
            StatsType::Radio => STATS_TYPE_RADIO,
            StatsType::Packets => STATS_TYPE_PACKETS,
        }
    }
}

/// Core statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreStats {
    pub battery_mv: u16,
    /// Uptime in seconds.
    pub uptime_secs: u32,
    /// Error flags.
    pub error_flags: u16,
    /// Packets waiting to be transmitted.
    pub queue_len: u8,
}

/// Radio statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioStats {
    /// Noise floor in dBm.
    pub noise_floor: i16,
    /// Last RSSI.
    pub last_rssi: i8,
    /// Quarter-dB units.
    pub last_snr_x4: i8,
    pub tx_air_secs: u32,
    pub rx_air_secs: u32,
}

impl RadioStats {
    /// dB.
    pub fn last_snr(&self) -> f32 {
        self.last_snr_x4 as f32 / 4.0
    }
}

/// Packet statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketStats {
    pub recv: u32,
    pub sent: u32,
    pub sent_flood: u32,
    pub sent_direct: u32,
    pub recv_flood: u32,
    pub recv_direct: u32,
}

/// Status block reported by a remote repeater or room server.
///
/// Fields sit at fixed offsets in this declaration order, all
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStatus {
    pub battery_mv: u16,
    pub tx_queue_len: u16,
    pub noise_floor: i16,
    pub last_rssi: i16,
    pub packets_recv: u32,
    pub packets_sent: u32,
    pub airtime_secs: u32,
    pub uptime_secs: u32,
    pub sent_flood: u32,
    pub sent_direct: u32,
    pub recv_flood: u32,
    pub recv_direct: u32,
    pub full_events: u16,
    /// Quarter-dB units.
    pub last_snr_x4: i16,
    pub direct_dups: u16,
    pub flood_dups: u16,
    /// Appended by newer firmware.
    pub rx_airtime_secs: Option<u32>,
}

impl DeviceStatus {
    /// Size of the sixteen fields every firmware sends.
    pub const MIN_WIRE_SIZE: usize = 48;
    /// Size including the trailing receive airtime counter.
    pub const WIRE_SIZE: usize = Self::MIN_WIRE_SIZE + 4;

    /// dB.
    pub fn last_snr(&self) -> f32 {
        self.last_snr_x4 as f32 / 4.0
    }
}

/// Direct message pulled from the offline queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedContactMessage {
    pub sender_prefix: PublicKeyPrefix,
    /// Hops travelled, or [`PATH_LEN_FLOOD`].
    pub path_len: u8,
    /// Message type.
    pub text_type: TextType,
    /// Sender's timestamp.
    pub timestamp: u32,
    /// Quarter-dB units; absent in the pre-v3 layout.
    pub snr_x4: Option<i8>,
    /// Signer prefix for signed messages.
    pub signature: Option<[u8; 4]>,
    /// Message text.
    pub text: String,
}

impl ReceivedContactMessage {
    /// dB.
    pub fn snr(&self) -> Option<f32> {
        self.snr_x4.map(|s| s as f32 / 4.0)
    }

    pub fn is_flood(&self) -> bool {
        self.path_len == PATH_LEN_FLOOD
    }
}

/// Channel message pulled from the offline queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedChannelMessage {
    /// Channel index.
    pub channel_idx: u8,
    /// Hops travelled, or [`PATH_LEN_FLOOD`].
    pub path_len: u8,
    /// Message type.
    pub text_type: TextType,
    /// Sender's timestamp.
    pub timestamp: u32,
    /// Quarter-dB units; absent in the pre-v3 layout.
    pub snr_x4: Option<i8>,
    /// Message text ("sender: body" by convention).
    pub text: String,
}

impl ReceivedChannelMessage {
    /// dB.
    pub fn snr(&self) -> Option<f32> {
        self.snr_x4.map(|s| s as f32 / 4.0)
    }

    pub fn is_flood(&self) -> bool {
        self.path_len == PATH_LEN_FLOOD
    }
}

/// Convert degrees to the ×1e6 fixed-point used on the wire.
pub fn degrees_to_micro(degrees: f64) -> i32 {
    (degrees * 1_000_000.0).round() as i32
}
