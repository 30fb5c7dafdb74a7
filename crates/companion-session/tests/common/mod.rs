//! Scripted companion firmware for session integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use companion_protocol::*;
use companion_session::{ChannelTransport, DeviceLink, Session, SessionConfig};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub const SELF_KEY: [u8; 32] = [0x42; 32];

/// Install a test log subscriber once (`RUST_LOG=companion_session=trace`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn key(byte: u8) -> PublicKey {
    PublicKey([byte; PUB_KEY_SIZE])
}

// ============================================================================
// Frame builders
// ============================================================================

pub fn ok_frame() -> Vec<u8> {
    vec![RESP_CODE_OK]
}

pub fn error_frame(code: u8) -> Vec<u8> {
    vec![RESP_CODE_ERR, code]
}

pub fn self_info_frame(name: &str) -> Vec<u8> {
    let mut frame = vec![RESP_CODE_SELF_INFO, ADV_TYPE_CHAT, 20, 22];
    frame.extend(SELF_KEY);
    frame.extend(37_774_900i32.to_le_bytes());
    frame.extend((-122_419_400i32).to_le_bytes());
    frame.extend([0, 0, 0, 0]);
    frame.extend(910_525u32.to_le_bytes());
    frame.extend(62_500u32.to_le_bytes());
    frame.extend([7, 5]);
    frame.extend(name.as_bytes());
    frame
}

pub fn device_info_frame() -> Vec<u8> {
    let mut frame = vec![RESP_CODE_DEVICE_INFO, 8, 50, 8];
    frame.extend(123_456u32.to_le_bytes());
    frame.extend(encode_fixed_str("19 Oct 2026", 12));
    frame.extend(encode_fixed_str("Heltec V3", 40));
    frame.extend(encode_fixed_str("v1.9.0", 20));
    frame
}

pub fn contact_frame(code: u8, key_byte: u8, name: &str, last_modified: u32) -> Vec<u8> {
    let mut frame = vec![code];
    frame.extend([key_byte; PUB_KEY_SIZE]);
    frame.extend([ADV_TYPE_REPEATER, 0, OUT_PATH_FLOOD as u8]);
    frame.extend([0u8; MAX_PATH_SIZE]);
    frame.extend(encode_fixed_str(name, NAME_SIZE));
    frame.extend(last_modified.to_le_bytes());
    frame.extend(0i32.to_le_bytes());
    frame.extend(0i32.to_le_bytes());
    frame.extend(last_modified.to_le_bytes());
    frame
}

pub fn sent_frame(ack: u32, timeout_ms: u32) -> Vec<u8> {
    let mut frame = vec![RESP_CODE_SENT, 0];
    frame.extend(ack.to_le_bytes());
    frame.extend(timeout_ms.to_le_bytes());
    frame
}

pub fn confirm_frame(ack: u32, round_trip_ms: u32) -> Vec<u8> {
    let mut frame = vec![PUSH_CODE_SEND_CONFIRMED];
    frame.extend(ack.to_le_bytes());
    frame.extend(round_trip_ms.to_le_bytes());
    frame
}

pub fn contact_message_frame(sender: u8, text: &str) -> Vec<u8> {
    let mut frame = vec![RESP_CODE_CONTACT_MSG_RECV_V3, 20, 0, 0];
    frame.extend([sender; PUB_KEY_PREFIX_SIZE]);
    frame.extend([1, TXT_TYPE_PLAIN]);
    frame.extend(1_760_000_000u32.to_le_bytes());
    frame.extend(text.as_bytes());
    frame
}

pub fn status_frame(prefix: &[u8], battery_mv: u16) -> Vec<u8> {
    let mut frame = vec![PUSH_CODE_STATUS_RESPONSE, 0];
    frame.extend(prefix);
    frame.extend(battery_mv.to_le_bytes());
    frame.extend([0u8; DeviceStatus::WIRE_SIZE - 2]);
    frame
}

pub fn telemetry_frame(prefix: &[u8]) -> Vec<u8> {
    let mut frame = vec![PUSH_CODE_TELEMETRY_RESPONSE, 0];
    frame.extend(prefix);
    frame.extend([1, 116, 0x9A, 0x01]); // 4.10 V
    frame.extend([2, 103, 0xFF, 0x00]); // 25.5 C
    frame
}

// ============================================================================
// Firmware
// ============================================================================

/// Knobs and observations shared between a test and its fake firmware.
pub struct FirmwareState {
    pub name: String,
    /// Every frame the host wrote.
    pub received: Vec<Vec<u8>>,
    /// Commands that get no answer.
    pub silent: HashSet<u8>,
    /// Commands answered with an error code.
    pub errors: HashMap<u8, u8>,
    pub contacts: Vec<Vec<u8>>,
    /// Count announced by the contacts start marker (defaults to the
    /// number of contacts).
    pub announced_contacts: Option<u32>,
    pub contacts_last_modified: u32,
    pub inbox: VecDeque<Vec<u8>>,
    pub next_ack: u32,
    pub ack_timeout_ms: u32,
    /// Push a send-confirmed right after each sent response.
    pub confirm_acks: bool,
    /// Answer status and telemetry requests.
    pub answer_remote: bool,
    pub sign_max_len: u32,
    pub sign_chunks: Vec<Vec<u8>>,
}

impl Default for FirmwareState {
    fn default() -> Self {
        FirmwareState {
            name: "base".into(),
            received: Vec::new(),
            silent: HashSet::new(),
            errors: HashMap::new(),
            contacts: Vec::new(),
            announced_contacts: None,
            contacts_last_modified: 0,
            inbox: VecDeque::new(),
            next_ack: 0x1000,
            ack_timeout_ms: 3_000,
            confirm_acks: true,
            answer_remote: true,
            sign_max_len: 8,
            sign_chunks: Vec::new(),
        }
    }
}

impl FirmwareState {
    fn respond(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        self.received.push(frame.to_vec());
        let Some(&code) = frame.first() else {
            return Vec::new();
        };
        if self.silent.contains(&code) {
            return Vec::new();
        }
        if let Some(&err) = self.errors.get(&code) {
            return vec![error_frame(err)];
        }

        match code {
            CMD_APP_START => vec![self_info_frame(&self.name)],
            CMD_DEVICE_QUERY => vec![device_info_frame()],
            CMD_GET_BATT_AND_STORAGE => {
                let mut frame = vec![RESP_CODE_BATT_AND_STORAGE];
                frame.extend(4_100u16.to_le_bytes());
                vec![frame]
            }
            CMD_GET_CONTACTS => {
                let count = self
                    .announced_contacts
                    .unwrap_or(self.contacts.len() as u32);
                let mut start = vec![RESP_CODE_CONTACTS_START];
                start.extend(count.to_le_bytes());
                let mut end = vec![RESP_CODE_END_OF_CONTACTS];
                end.extend(self.contacts_last_modified.to_le_bytes());

                let mut out = vec![start];
                out.extend(self.contacts.iter().cloned());
                out.push(end);
                out
            }
            CMD_SEND_TXT_MSG | CMD_SEND_BINARY_REQ => {
                let ack = self.next_ack;
                self.next_ack += 1;
                let mut out = vec![sent_frame(ack, self.ack_timeout_ms)];
                if code == CMD_SEND_TXT_MSG && self.confirm_acks {
                    out.push(confirm_frame(ack, 420));
                }
                if code == CMD_SEND_BINARY_REQ && self.answer_remote {
                    let mut response = vec![PUSH_CODE_BINARY_RESPONSE, 0];
                    response.extend(ack.to_le_bytes());
                    response.extend(&frame[33..]);
                    out.push(response);
                }
                out
            }
            CMD_SYNC_NEXT_MESSAGE => vec![self
                .inbox
                .pop_front()
                .unwrap_or_else(|| vec![RESP_CODE_NO_MORE_MESSAGES])],
            CMD_SIGN_START => {
                let mut frame = vec![RESP_CODE_SIGN_START, 0];
                frame.extend(self.sign_max_len.to_le_bytes());
                vec![frame]
            }
            CMD_SIGN_DATA => {
                self.sign_chunks.push(frame[1..].to_vec());
                vec![ok_frame()]
            }
            CMD_SIGN_FINISH => {
                let mut frame = vec![RESP_CODE_SIGNATURE];
                frame.extend([0x5A; SIGNATURE_SIZE]);
                vec![frame]
            }
            CMD_SEND_STATUS_REQ => {
                let mut out = vec![sent_frame(0, 0)];
                if self.answer_remote {
                    out.push(status_frame(&frame[1..7], 3_950));
                }
                out
            }
            CMD_SEND_TELEMETRY_REQ => {
                let mut out = vec![sent_frame(0, 0)];
                if self.answer_remote {
                    out.push(telemetry_frame(&frame[4..10]));
                }
                out
            }
            CMD_SEND_LOGIN => {
                let mut out = vec![sent_frame(0, 0)];
                let granted = &frame[33..] == b"hunter2";
                let code = if granted {
                    PUSH_CODE_LOGIN_SUCCESS
                } else {
                    PUSH_CODE_LOGIN_FAIL
                };
                let mut push = vec![code, u8::from(granted)];
                push.extend(&frame[1..7]);
                out.push(push);
                out
            }
            CMD_SEND_TRACE_PATH => {
                let mut trace = vec![PUSH_CODE_TRACE_DATA, 0, (frame.len() - 10) as u8, 0];
                trace.extend(&frame[1..5]); // tag
                trace.extend(&frame[5..9]); // auth
                trace.extend(&frame[10..]); // hashes
                trace.extend(std::iter::repeat(16).take(frame.len() - 10)); // snrs
                trace.push(24);
                vec![sent_frame(0, 0), trace]
            }
            _ => vec![ok_frame()],
        }
    }
}

/// Handle on a running fake firmware.
pub struct FakeFirmware {
    pub state: Arc<Mutex<FirmwareState>>,
    pushes: mpsc::UnboundedSender<Vec<u8>>,
}

impl FakeFirmware {
    /// Start answering frames arriving on `link`.
    pub fn spawn(mut link: DeviceLink, state: FirmwareState) -> FakeFirmware {
        let state = Arc::new(Mutex::new(state));
        let (pushes, mut push_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let shared = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = link.recv() => {
                        let Some(frame) = frame else { break };
                        let replies = shared.lock().respond(&frame);
                        for reply in replies {
                            if link.push(reply).is_err() {
                                return;
                            }
                        }
                    }
                    push = push_rx.recv() => {
                        let Some(push) = push else { break };
                        if link.push(push).is_err() {
                            return;
                        }
                    }
                }
            }
        });
        FakeFirmware { state, pushes }
    }

    /// Send an unsolicited frame to the host.
    pub fn push(&self, frame: Vec<u8>) {
        let _ = self.pushes.send(frame);
    }

    /// Frames the host wrote that start with `code`.
    pub fn commands(&self, code: u8) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .received
            .iter()
            .filter(|frame| frame.first() == Some(&code))
            .cloned()
            .collect()
    }
}

/// Connect a session to a fresh fake firmware.
pub async fn connect(state: FirmwareState, config: SessionConfig) -> (Session, FakeFirmware) {
    init_tracing();
    let (transport, link) = ChannelTransport::pair();
    let firmware = FakeFirmware::spawn(link, state);
    let session = Session::connect(Arc::new(transport), config)
        .await
        .expect("handshake");
    (session, firmware)
}

pub fn quiet_config() -> SessionConfig {
    SessionConfig {
        client_id: "tests".into(),
        auto_fetch_messages: false,
        ..SessionConfig::default()
    }
}
