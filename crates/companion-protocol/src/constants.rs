//! Wire constants.
//!
//! Every frame starts with one discriminator byte. Host commands, firmware
//! responses and firmware pushes share the byte space: pushes live at 0x80
//! and above, so a frame can be classified before it is decoded.

// ============================================================================
// Commands (host to radio)
// ============================================================================

/// Start-session handshake. The radio answers with its self info.
pub const CMD_APP_START: u8 = 1;
pub const CMD_SEND_TXT_MSG: u8 = 2;
pub const CMD_SEND_CHANNEL_TXT_MSG: u8 = 3;
/// Contact enumeration, optionally limited to entries changed after a
/// timestamp.
pub const CMD_GET_CONTACTS: u8 = 4;
pub const CMD_GET_DEVICE_TIME: u8 = 5;
pub const CMD_SET_DEVICE_TIME: u8 = 6;
pub const CMD_SEND_SELF_ADVERT: u8 = 7;
pub const CMD_SET_ADVERT_NAME: u8 = 8;
pub const CMD_ADD_UPDATE_CONTACT: u8 = 9;
/// Pop one message from the radio's offline queue.
pub const CMD_SYNC_NEXT_MESSAGE: u8 = 10;
pub const CMD_SET_RADIO_PARAMS: u8 = 11;
pub const CMD_SET_RADIO_TX_POWER: u8 = 12;
/// Forget the stored direct path so the next send floods.
pub const CMD_RESET_PATH: u8 = 13;
pub const CMD_SET_ADVERT_LATLON: u8 = 14;
pub const CMD_REMOVE_CONTACT: u8 = 15;
/// Re-broadcast a stored contact advert to zero-hop neighbours.
pub const CMD_SHARE_CONTACT: u8 = 16;
pub const CMD_EXPORT_CONTACT: u8 = 17;
pub const CMD_IMPORT_CONTACT: u8 = 18;
pub const CMD_REBOOT: u8 = 19;
pub const CMD_GET_BATT_AND_STORAGE: u8 = 20;
pub const CMD_DEVICE_QUERY: u8 = 22;
pub const CMD_SEND_LOGIN: u8 = 26;
pub const CMD_SEND_STATUS_REQ: u8 = 27;
pub const CMD_LOGOUT: u8 = 29;
pub const CMD_GET_CONTACT_BY_KEY: u8 = 30;
pub const CMD_GET_CHANNEL: u8 = 31;
pub const CMD_SET_CHANNEL: u8 = 32;
// Signing is a three step exchange: start, one or more data chunks, finish.
pub const CMD_SIGN_START: u8 = 33;
pub const CMD_SIGN_DATA: u8 = 34;
pub const CMD_SIGN_FINISH: u8 = 35;
pub const CMD_SEND_TRACE_PATH: u8 = 36;
pub const CMD_SET_DEVICE_PIN: u8 = 37;
/// Manual-add, telemetry mode and advert location policy bits.
pub const CMD_SET_OTHER_PARAMS: u8 = 38;
pub const CMD_SEND_TELEMETRY_REQ: u8 = 39;
pub const CMD_SEND_BINARY_REQ: u8 = 50;
pub const CMD_SEND_PATH_DISCOVERY_REQ: u8 = 52;
pub const CMD_SEND_CONTROL_DATA: u8 = 55;
pub const CMD_GET_STATS: u8 = 56;

// Second byte of CMD_GET_STATS and RESP_CODE_STATS.
pub const STATS_TYPE_CORE: u8 = 0;
pub const STATS_TYPE_RADIO: u8 = 1;
pub const STATS_TYPE_PACKETS: u8 = 2;

// ============================================================================
// Responses (radio to host, answering a command)
// ============================================================================

pub const RESP_CODE_OK: u8 = 0;
/// Followed by one firmware error byte.
pub const RESP_CODE_ERR: u8 = 1;
pub const RESP_CODE_CONTACTS_START: u8 = 2;
pub const RESP_CODE_CONTACT: u8 = 3;
pub const RESP_CODE_END_OF_CONTACTS: u8 = 4;
pub const RESP_CODE_SELF_INFO: u8 = 5;
/// A message or request was queued for transmission.
pub const RESP_CODE_SENT: u8 = 6;
/// Pre-v3 layout without SNR.
pub const RESP_CODE_CONTACT_MSG_RECV: u8 = 7;
/// Pre-v3 layout without SNR.
pub const RESP_CODE_CHANNEL_MSG_RECV: u8 = 8;
pub const RESP_CODE_CURR_TIME: u8 = 9;
pub const RESP_CODE_NO_MORE_MESSAGES: u8 = 10;
pub const RESP_CODE_EXPORT_CONTACT: u8 = 11;
pub const RESP_CODE_BATT_AND_STORAGE: u8 = 12;
pub const RESP_CODE_DEVICE_INFO: u8 = 13;
/// The radio was built without the requested feature.
pub const RESP_CODE_DISABLED: u8 = 15;
pub const RESP_CODE_CONTACT_MSG_RECV_V3: u8 = 16;
pub const RESP_CODE_CHANNEL_MSG_RECV_V3: u8 = 17;
pub const RESP_CODE_CHANNEL_INFO: u8 = 18;
/// Carries the largest signing chunk the radio accepts.
pub const RESP_CODE_SIGN_START: u8 = 19;
pub const RESP_CODE_SIGNATURE: u8 = 20;
pub const RESP_CODE_STATS: u8 = 24;

// ============================================================================
// Pushes (radio to host, unsolicited)
// ============================================================================

pub const PUSH_CODE_ADVERT: u8 = 0x80;
pub const PUSH_CODE_PATH_UPDATED: u8 = 0x81;
/// The recipient acknowledged a message; carries the ack code.
pub const PUSH_CODE_SEND_CONFIRMED: u8 = 0x82;
/// The offline queue has something to fetch.
pub const PUSH_CODE_MSG_WAITING: u8 = 0x83;
pub const PUSH_CODE_RAW_DATA: u8 = 0x84;
pub const PUSH_CODE_LOGIN_SUCCESS: u8 = 0x85;
pub const PUSH_CODE_LOGIN_FAIL: u8 = 0x86;
pub const PUSH_CODE_STATUS_RESPONSE: u8 = 0x87;
/// Every packet heard over the air, with signal quality.
pub const PUSH_CODE_LOG_RX_DATA: u8 = 0x88;
pub const PUSH_CODE_TRACE_DATA: u8 = 0x89;
/// An advert from an unknown node while auto-add is off.
pub const PUSH_CODE_NEW_ADVERT: u8 = 0x8A;
pub const PUSH_CODE_TELEMETRY_RESPONSE: u8 = 0x8B;
pub const PUSH_CODE_BINARY_RESPONSE: u8 = 0x8C;
pub const PUSH_CODE_PATH_DISCOVERY_RESPONSE: u8 = 0x8D;
pub const PUSH_CODE_CONTROL_DATA: u8 = 0x8E;

// ============================================================================
// Firmware error bytes
// ============================================================================

pub const ERR_CODE_UNSUPPORTED_CMD: u8 = 1;
pub const ERR_CODE_NOT_FOUND: u8 = 2;
pub const ERR_CODE_TABLE_FULL: u8 = 3;
pub const ERR_CODE_BAD_STATE: u8 = 4;
pub const ERR_CODE_FILE_IO_ERROR: u8 = 5;
pub const ERR_CODE_ILLEGAL_ARG: u8 = 6;

// ============================================================================
// Text and node types
// ============================================================================

pub const TXT_TYPE_PLAIN: u8 = 0;
/// Text is a command line for a repeater or room server.
pub const TXT_TYPE_CLI_DATA: u8 = 1;
pub const TXT_TYPE_SIGNED_PLAIN: u8 = 2;

pub const ADV_TYPE_CHAT: u8 = 1;
pub const ADV_TYPE_REPEATER: u8 = 2;
pub const ADV_TYPE_ROOM_SERVER: u8 = 3;
pub const ADV_TYPE_SENSOR: u8 = 4;

// First payload byte of a binary request.
pub const REQ_TYPE_GET_STATUS: u8 = 0x01;
pub const REQ_TYPE_KEEP_ALIVE: u8 = 0x02;
pub const REQ_TYPE_GET_TELEMETRY: u8 = 0x03;
/// Min/max/average telemetry history.
pub const REQ_TYPE_GET_MMA: u8 = 0x04;
pub const REQ_TYPE_GET_ACL: u8 = 0x05;
pub const REQ_TYPE_GET_NEIGHBOURS: u8 = 0x06;

// ============================================================================
// Field widths
// ============================================================================

pub const PUB_KEY_SIZE: usize = 32;
/// Leading key bytes that identify a node in messages and responses.
pub const PUB_KEY_PREFIX_SIZE: usize = 6;
pub const SIGNATURE_SIZE: usize = 64;
pub const MAX_PATH_SIZE: usize = 64;
/// Contact and channel names are NUL-padded to this width.
pub const NAME_SIZE: usize = 32;
/// Client identifier width in the start-session frame.
pub const CLIENT_ID_SIZE: usize = 12;
pub const CHANNEL_SECRET_SIZE: usize = 16;
pub const MAX_FRAME_SIZE: usize = 256;
/// Stored path length meaning no direct path is known.
pub const OUT_PATH_FLOOD: i8 = -1;
/// Path length byte of a received message that arrived by flood.
pub const PATH_LEN_FLOOD: u8 = 0xFF;
