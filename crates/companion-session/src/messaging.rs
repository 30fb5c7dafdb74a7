//! Text messaging, the background message drain and chunked signing.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use companion_protocol::{
    Command, Event, PublicKey, ReceivedChannelMessage, ReceivedContactMessage, TextType,
    SIGNATURE_SIZE,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Result, SessionError};
use crate::pending::{PendingRequest, Resolution};
use crate::session::{cancellable, device_failure, expect_ok, unix_now, Session, SessionInner};

/// A message pulled from the device queue.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceivedMessage {
    Contact(ReceivedContactMessage),
    Channel(ReceivedChannelMessage),
}

impl ReceivedMessage {
    pub fn text(&self) -> &str {
        match self {
            ReceivedMessage::Contact(msg) => &msg.text,
            ReceivedMessage::Channel(msg) => &msg.text,
        }
    }

    pub fn timestamp(&self) -> u32 {
        match self {
            ReceivedMessage::Contact(msg) => msg.timestamp,
            ReceivedMessage::Channel(msg) => msg.timestamp,
        }
    }
}

/// What became of a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The recipient acknowledged it.
    Confirmed { round_trip: Duration },
    /// No acknowledgement before the deadline. The message may still have
    /// arrived.
    Unconfirmed,
}

/// Handle on a queued message, resolved by its acknowledgement.
#[derive(Debug)]
pub struct MessageReceipt {
    /// Ack code the recipient will echo.
    pub expected_ack: u32,
    pub is_flood: bool,
    /// How long [`MessageReceipt::wait`] waits for the ack.
    pub timeout: Duration,
    pending: PendingRequest,
}

impl MessageReceipt {
    pub async fn wait(self) -> Result<DeliveryOutcome> {
        match self.pending.wait().await {
            Resolution::Completed(event) => match &*event {
                Event::SendConfirmed { round_trip_ms, .. } => Ok(DeliveryOutcome::Confirmed {
                    round_trip: Duration::from_millis(u64::from(*round_trip_ms)),
                }),
                other => Err(SessionError::UnexpectedResponse {
                    operation: "message ack",
                    event: other.name(),
                }),
            },
            Resolution::TimedOut => Ok(DeliveryOutcome::Unconfirmed),
            Resolution::Cancelled => Err(SessionError::Cancelled),
        }
    }
}

impl SessionInner {
    async fn send_text(
        &self,
        recipient: &PublicKey,
        text_type: TextType,
        text: &str,
    ) -> Result<MessageReceipt> {
        let command = Command::SendTextMessage {
            text_type,
            attempt: 0,
            timestamp: unix_now(),
            recipient: recipient.prefix(),
            text: text.to_string(),
        };
        command.validate()?;

        let guard = self.lock_commands().await;
        let ((is_flood, expected_ack, suggested_ms), mut events) = self
            .exchange(
                &command,
                "send message",
                self.config.command_timeout(),
                &self.shutdown,
                |event| match event {
                    Event::Sent {
                        is_flood,
                        expected_ack,
                        est_timeout_ms,
                    } => Some(Ok((*is_flood, *expected_ack, *est_timeout_ms))),
                    other => device_failure(other),
                },
            )
            .await?;
        drop(guard);

        let timeout = match suggested_ms {
            0 => self.config.default_ack_timeout(),
            ms => Duration::from_millis(u64::from(ms)),
        };
        let pending = self.pending.register_tag(expected_ack, timeout)?;
        self.adopt_backlog(&mut events, pending.key());
        debug!(ack = expected_ack, is_flood, ?timeout, "message queued");

        Ok(MessageReceipt {
            expected_ack,
            is_flood,
            timeout,
            pending,
        })
    }

    pub(crate) async fn fetch_next(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<ReceivedMessage>> {
        let _guard = self.lock_commands().await;
        let (message, _) = self
            .exchange(
                &Command::SyncNextMessage,
                "fetch message",
                self.config.command_timeout(),
                cancel,
                |event| match event {
                    Event::ContactMessage(msg) => {
                        Some(Ok(Some(ReceivedMessage::Contact(msg.clone()))))
                    }
                    Event::ChannelMessage(msg) => {
                        Some(Ok(Some(ReceivedMessage::Channel(msg.clone()))))
                    }
                    Event::NoMoreMessages => Some(Ok(None)),
                    other => device_failure(other),
                },
            )
            .await?;
        Ok(message)
    }

    /// Start the drain loop unless one is already running; a running loop
    /// makes one more pass before it stops.
    pub(crate) fn start_drain(self: &Arc<Self>) {
        let mut slot = self.drain.token.lock();
        self.drain.rearm.store(true, Ordering::SeqCst);
        if slot.is_some() {
            return;
        }
        let token = self.shutdown.child_token();
        *slot = Some(token.clone());
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.drain_messages(token).await });
    }

    /// Cancel the running loop. A later start spawns a fresh one even if
    /// the cancelled loop has not exited yet.
    pub(crate) fn stop_drain(&self) {
        if let Some(token) = self.drain.token.lock().take() {
            token.cancel();
        }
    }

    async fn drain_messages(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            self.drain.rearm.store(false, Ordering::SeqCst);
            let fetched = self.drain_until_empty(&cancel).await;
            trace!(fetched, "message drain pass finished");

            let again = {
                let mut slot = self.drain.token.lock();
                if cancel.is_cancelled() {
                    // Stopped: the slot is empty or owned by a newer loop,
                    // unless the whole session shut down.
                    if slot.as_ref().map_or(false, CancellationToken::is_cancelled) {
                        *slot = None;
                    }
                    return;
                }
                // A trigger that raced with the final fetch gets one more pass.
                let again = self.drain.rearm.load(Ordering::SeqCst);
                if !again {
                    *slot = None;
                }
                again
            };
            if !again {
                return;
            }
        }
    }

    async fn drain_until_empty(&self, cancel: &CancellationToken) -> usize {
        let mut fetched = 0;
        loop {
            if cancel.is_cancelled() || !self.is_connected() {
                return fetched;
            }
            match self.fetch_next(cancel).await {
                Ok(Some(_)) => fetched += 1,
                Ok(None) => return fetched,
                Err(SessionError::Timeout { .. }) => {
                    warn!("message fetch timed out; retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return fetched,
                        _ = self.clock.sleep(self.config.drain_retry()) => {}
                    }
                }
                Err(SessionError::Cancelled) | Err(SessionError::NotConnected) => return fetched,
                Err(err) => {
                    warn!(%err, "message drain stopped");
                    return fetched;
                }
            }
        }
    }

    async fn sign(&self, data: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
        if data.is_empty() {
            return Err(SessionError::InvalidInput("nothing to sign".into()));
        }
        let data_len = u32::try_from(data.len())
            .map_err(|_| SessionError::InvalidInput("data too large to sign".into()))?;
        let timeout = self.config.command_timeout();

        let _guard = self.lock_commands().await;
        let (max_len, _) = self
            .exchange(
                &Command::SignStart { data_len },
                "sign start",
                timeout,
                &self.shutdown,
                |event| match event {
                    Event::SignStart { max_len } => Some(Ok(*max_len)),
                    other => device_failure(other),
                },
            )
            .await?;

        let chunk_size = match max_len as usize {
            0 => self.config.max_sign_chunk,
            limit => limit.min(self.config.max_sign_chunk),
        };
        for chunk in data.chunks(chunk_size) {
            self.exchange(
                &Command::SignData {
                    data: chunk.to_vec(),
                },
                "sign data",
                timeout,
                &self.shutdown,
                expect_ok,
            )
            .await?;
        }

        let (signature, _) = self
            .exchange(
                &Command::SignFinish,
                "sign finish",
                timeout,
                &self.shutdown,
                |event| match event {
                    Event::Signature { signature } => Some(Ok(*signature)),
                    other => device_failure(other),
                },
            )
            .await?;
        debug!(len = data.len(), chunk_size, "signed");
        Ok(signature)
    }
}

impl Session {
    /// Send a plain text message. The receipt resolves when the recipient
    /// acknowledges it.
    pub async fn send_message(&self, recipient: &PublicKey, text: &str) -> Result<MessageReceipt> {
        self.inner.send_text(recipient, TextType::Plain, text).await
    }

    /// Send a CLI command to a repeater or room server.
    pub async fn send_command(&self, recipient: &PublicKey, text: &str) -> Result<MessageReceipt> {
        self.inner.send_text(recipient, TextType::CliData, text).await
    }

    pub async fn send_channel_message(&self, channel_idx: u8, text: &str) -> Result<()> {
        let command = Command::SendChannelTextMessage {
            text_type: TextType::Plain,
            channel_idx,
            timestamp: unix_now(),
            text: text.to_string(),
        };
        self.inner
            .request(command, "send channel message", |event| match event {
                Event::Ok { .. } | Event::Sent { .. } => Some(Ok(())),
                other => device_failure(other),
            })
            .await
    }

    /// Pull one message from the device queue. `None` means the queue is
    /// empty.
    pub async fn fetch_next_message(&self) -> Result<Option<ReceivedMessage>> {
        self.inner.fetch_next(&self.inner.shutdown).await
    }

    pub async fn fetch_next_message_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<ReceivedMessage>> {
        cancellable(cancel, self.fetch_next_message()).await
    }

    /// Drain the device queue in the background. Messages reach observers
    /// as broadcast events.
    pub fn start_message_drain(&self) {
        self.inner.start_drain();
    }

    pub fn stop_message_drain(&self) {
        self.inner.stop_drain();
    }

    pub fn is_draining(&self) -> bool {
        self.inner.drain.token.lock().is_some()
    }

    /// Have the device sign `data` with its private key.
    pub async fn sign(&self, data: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
        self.inner.sign(data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_message_accessors() {
        let msg = ReceivedMessage::Channel(ReceivedChannelMessage {
            channel_idx: 0,
            path_len: 1,
            text_type: TextType::Plain,
            timestamp: 99,
            snr_x4: None,
            text: "hi".into(),
        });
        assert_eq!(msg.text(), "hi");
        assert_eq!(msg.timestamp(), 99);
    }
}
