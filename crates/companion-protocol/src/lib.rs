//! MeshCore Companion Protocol
//!
//! Types and codecs for operating a MeshCore companion radio from a host
//! application. The link (BLE characteristic, serial port, TCP socket) is
//! message oriented: every delivery is one complete frame whose first byte
//! is the discriminator.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → firmware): start with a `CMD_*` byte
//! - **Responses** (firmware → host): start with a `RESP_CODE_*` byte
//! - **Push notifications** (firmware → host, unsolicited): start with a
//!   `PUSH_CODE_*` byte (0x80+)
//!
//! Responses and pushes both decode into a single [`Event`]. Decoding never
//! fails outright: malformed input becomes [`Event::ParseFailure`] so that
//! observers can inspect and ignore it uniformly.
//!
//! # Example
//!
//! ```rust
//! use companion_protocol::{Command, Event};
//!
//! let frame = Command::DeviceQuery { app_version: 3 }.encode();
//! assert_eq!(frame, vec![22, 3]);
//!
//! match Event::decode(&[0x00]) {
//!     Event::Ok { value } => assert_eq!(value, None),
//!     other => panic!("unexpected event {:?}", other),
//! }
//! ```

mod commands;
mod constants;
mod error;
mod events;
mod reader;
mod telemetry;
mod types;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use events::*;
pub use reader::*;
pub use telemetry::*;
pub use types::*;
