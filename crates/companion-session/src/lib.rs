//! Companion Session
//!
//! Async engine for driving a MeshCore companion radio over any
//! message-oriented [`Transport`]. It layers request/response correlation,
//! event fan-out and contact tracking on top of the `companion-protocol`
//! codec.
//!
//! # Architecture
//!
//! - [`EventBroadcaster`]: every decoded frame is delivered, in arrival
//!   order, to each live [`EventSubscription`]. Late subscribers see only
//!   later events.
//! - [`PendingRegistry`]: in-flight requests keyed by tag or by
//!   (sender prefix, request kind), each resolved exactly once by its
//!   answer, its timeout or cancellation.
//! - [`ContactCache`]: approved and pending contacts plus the enumeration
//!   high-water mark.
//! - [`Session`]: handshake, paged contact sync, message send/ack,
//!   background message draining, chunked signing and remote requests.
//! - [`Clock`]: every timeout runs on an injectable clock so tests can
//!   drive virtual time.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use companion_session::{ChannelTransport, Session, SessionConfig};
//!
//! # async fn run() -> companion_session::Result<()> {
//! let (transport, _radio) = ChannelTransport::pair();
//! let session = Session::connect(Arc::new(transport), SessionConfig::default()).await?;
//! let contacts = session.refresh_contacts().await?;
//! println!("{} contacts", contacts.len());
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod broadcast;
mod clock;
mod config;
mod contacts;
mod error;
mod messaging;
mod pending;
mod remote;
mod session;
mod transport;

pub use broadcast::*;
pub use clock::*;
pub use config::*;
pub use contacts::*;
pub use error::*;
pub use messaging::*;
pub use pending::*;
pub use remote::*;
pub use session::{ContactSync, DeviceStats, Session};
pub use transport::*;

pub use tokio_util::sync::CancellationToken;
