//! Link to the companion radio.
//!
//! The engine only needs a message-oriented pipe: every inbound delivery is
//! one complete frame. BLE, serial and TCP adapters live outside this crate
//! and implement [`Transport`].

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("transport is already connected")]
    AlreadyConnected,

    /// The other end of the link went away.
    #[error("link closed")]
    Closed,

    #[error("link I/O error: {0}")]
    Io(String),
}

/// Frames arriving from the radio.
pub type FrameStream = mpsc::UnboundedReceiver<Vec<u8>>;

/// Message-oriented link to the radio.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link and hand back the inbound frame stream.
    async fn connect(&self) -> Result<FrameStream, TransportError>;

    /// Close the link.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Write one frame. Fails if not connected.
    async fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

/// In-memory transport. The paired [`DeviceLink`] plays the radio.
pub struct ChannelTransport {
    to_device: mpsc::UnboundedSender<Vec<u8>>,
    from_device: Mutex<Option<FrameStream>>,
    connected: AtomicBool,
}

/// Radio side of a [`ChannelTransport`].
pub struct DeviceLink {
    to_host: mpsc::UnboundedSender<Vec<u8>>,
    from_host: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl ChannelTransport {
    /// Create a connected-pair of host transport and device link.
    pub fn pair() -> (ChannelTransport, DeviceLink) {
        let (to_device, from_host) = mpsc::unbounded_channel();
        let (to_host, from_device) = mpsc::unbounded_channel();
        (
            ChannelTransport {
                to_device,
                from_device: Mutex::new(Some(from_device)),
                connected: AtomicBool::new(false),
            },
            DeviceLink { to_host, from_host },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self) -> Result<FrameStream, TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::AlreadyConnected);
        }
        let stream = self
            .from_device
            .lock()
            .take()
            .ok_or(TransportError::Closed)?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(stream)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.to_device
            .send(frame.to_vec())
            .map_err(|_| TransportError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl DeviceLink {
    /// Deliver one frame to the host.
    pub fn push(&self, frame: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        self.to_host
            .send(frame.into())
            .map_err(|_| TransportError::Closed)
    }

    /// Next frame written by the host, or `None` once the host side is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.from_host.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.from_host.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_the_pair() {
        let (transport, mut device) = ChannelTransport::pair();
        let mut inbound = transport.connect().await.unwrap();

        transport.send(&[22, 3]).await.unwrap();
        assert_eq!(device.recv().await, Some(vec![22, 3]));

        device.push(vec![0x83]).unwrap();
        assert_eq!(inbound.recv().await, Some(vec![0x83]));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (transport, _device) = ChannelTransport::pair();
        assert_eq!(
            transport.send(&[1]).await,
            Err(TransportError::NotConnected)
        );

        let _inbound = transport.connect().await.unwrap();
        assert_eq!(
            transport.connect().await.err(),
            Some(TransportError::AlreadyConnected)
        );

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
        assert_eq!(
            transport.send(&[1]).await,
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_send_after_device_dropped() {
        let (transport, device) = ChannelTransport::pair();
        let _inbound = transport.connect().await.unwrap();
        drop(device);
        assert_eq!(transport.send(&[1]).await, Err(TransportError::Closed));
    }
}
