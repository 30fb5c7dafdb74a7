//! Requests answered over the mesh by a remote node.
//!
//! Status, telemetry, login and path discovery answers carry no tag, so
//! they are correlated by (sender prefix, request kind) and registered
//! before the request is written. Binary requests and traces carry a tag.

use std::sync::Arc;

use companion_protocol::{
    Command, DeviceStatus, Event, PublicKey, TelemetryPoint, TraceInfo, MAX_PATH_SIZE,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::pending::{PendingRequest, RequestKind, Resolution};
use crate::session::{cancellable, device_failure, Session, SessionInner};

/// Answer to a login request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Granted {
        is_admin: bool,
        permissions: Option<u8>,
    },
    Denied,
}

/// Paths reported by a path discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPath {
    /// Hop hashes from here to the target.
    pub out_path: Vec<u8>,
    /// Hop hashes from the target back here.
    pub in_path: Vec<u8>,
}

fn accept_queued(event: &Event) -> Option<Result<()>> {
    match event {
        Event::Sent { .. } | Event::Ok { .. } => Some(Ok(())),
        other => device_failure(other),
    }
}

fn unexpected<T>(operation: &'static str, event: &Event) -> Result<T> {
    Err(SessionError::UnexpectedResponse {
        operation,
        event: event.name(),
    })
}

impl SessionInner {
    /// Write `command` while holding the command lock and wait for the
    /// firmware to queue it.
    async fn queue(&self, command: &Command, operation: &'static str) -> Result<()> {
        let _guard = self.lock_commands().await;
        self.exchange(
            command,
            operation,
            self.config.command_timeout(),
            &self.shutdown,
            accept_queued,
        )
        .await?;
        Ok(())
    }

    async fn settle(
        &self,
        pending: PendingRequest,
        operation: &'static str,
    ) -> Result<Arc<Event>> {
        let timeout = pending.timeout();
        match pending.wait_or_cancel(&self.shutdown).await {
            Resolution::Completed(event) => Ok(event),
            Resolution::TimedOut => Err(SessionError::Timeout { operation, timeout }),
            Resolution::Cancelled => Err(SessionError::Cancelled),
        }
    }

    async fn routed(
        &self,
        public_key: &PublicKey,
        kind: RequestKind,
        command: Command,
        operation: &'static str,
    ) -> Result<Arc<Event>> {
        command.validate()?;
        let pending =
            self.pending
                .register_route(public_key.prefix(), kind, self.config.response_timeout())?;
        self.queue(&command, operation).await?;
        debug!(?kind, target = %public_key.prefix(), "remote request queued");
        self.settle(pending, operation).await
    }
}

impl Session {
    /// Ask a repeater or room server for its status block.
    pub async fn request_status(&self, public_key: &PublicKey) -> Result<DeviceStatus> {
        let command = Command::SendStatusRequest {
            public_key: *public_key,
        };
        let event = self
            .inner
            .routed(public_key, RequestKind::Status, command, "status request")
            .await?;
        match &*event {
            Event::StatusResponse { status, .. } => Ok(*status),
            other => unexpected("status request", other),
        }
    }

    /// Ask a node for its sensor readings.
    pub async fn request_telemetry(&self, public_key: &PublicKey) -> Result<Vec<TelemetryPoint>> {
        let command = Command::SendTelemetryRequest {
            public_key: *public_key,
        };
        let event = self
            .inner
            .routed(public_key, RequestKind::Telemetry, command, "telemetry request")
            .await?;
        match &*event {
            Event::TelemetryResponse { .. } => Ok(event.readings()),
            other => unexpected("telemetry request", other),
        }
    }

    pub async fn login(&self, public_key: &PublicKey, password: &str) -> Result<LoginOutcome> {
        let command = Command::SendLogin {
            public_key: *public_key,
            password: password.to_string(),
        };
        let event = self
            .inner
            .routed(public_key, RequestKind::Login, command, "login")
            .await?;
        match &*event {
            Event::LoginSuccess {
                is_admin,
                acl_permissions,
                ..
            } => Ok(LoginOutcome::Granted {
                is_admin: *is_admin,
                permissions: *acl_permissions,
            }),
            Event::LoginFail { .. } => Ok(LoginOutcome::Denied),
            other => unexpected("login", other),
        }
    }

    pub async fn logout(&self, public_key: &PublicKey) -> Result<()> {
        let command = Command::Logout {
            public_key: *public_key,
        };
        self.inner.queue(&command, "logout").await
    }

    /// Find the current round-trip path to a node.
    pub async fn discover_path(&self, public_key: &PublicKey) -> Result<DiscoveredPath> {
        let command = Command::SendPathDiscoveryRequest {
            public_key: *public_key,
        };
        let event = self
            .inner
            .routed(public_key, RequestKind::PathDiscovery, command, "path discovery")
            .await?;
        match &*event {
            Event::PathDiscoveryResponse {
                out_path, in_path, ..
            } => Ok(DiscoveredPath {
                out_path: out_path.clone(),
                in_path: in_path.clone(),
            }),
            other => unexpected("path discovery", other),
        }
    }

    /// Send a typed binary request; the answer is matched by the ack tag the
    /// firmware assigns.
    pub async fn send_binary_request(
        &self,
        public_key: &PublicKey,
        request_type: u8,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let command = Command::SendBinaryRequest {
            public_key: *public_key,
            request_type,
            payload,
        };
        command.validate()?;

        let inner = &self.inner;
        let guard = inner.lock_commands().await;
        let (tag, mut events) = inner
            .exchange(
                &command,
                "binary request",
                inner.config.command_timeout(),
                &inner.shutdown,
                |event| match event {
                    Event::Sent { expected_ack, .. } => Some(Ok(*expected_ack)),
                    other => device_failure(other),
                },
            )
            .await?;
        drop(guard);

        let pending = inner
            .pending
            .register_tag(tag, inner.config.response_timeout())?;
        inner.adopt_backlog(&mut events, pending.key());
        drop(events);

        let event = inner.settle(pending, "binary request").await?;
        match &*event {
            Event::BinaryResponse { data, .. } => Ok(data.clone()),
            other => unexpected("binary request", other),
        }
    }

    /// Trace a packet along `path` (one hash byte per hop).
    pub async fn trace_path(&self, path: &[u8]) -> Result<TraceInfo> {
        if path.len() > MAX_PATH_SIZE {
            return Err(SessionError::InvalidInput(format!(
                "trace path has {} hops, limit is {}",
                path.len(),
                MAX_PATH_SIZE
            )));
        }
        let inner = &self.inner;
        let tag = inner.next_tag();
        let command = Command::SendTracePath {
            tag,
            auth: 0,
            flags: 0,
            path: path.to_vec(),
        };
        let pending = inner.pending.register_tag(tag, inner.config.response_timeout())?;
        inner.queue(&command, "trace").await?;

        let event = inner.settle(pending, "trace").await?;
        match &*event {
            Event::TraceData(trace) => Ok(trace.clone()),
            other => unexpected("trace", other),
        }
    }

    // Variants that end early with `SessionError::Cancelled` when the
    // caller's token fires. The session stays usable.

    pub async fn request_status_with_cancel(
        &self,
        public_key: &PublicKey,
        cancel: &CancellationToken,
    ) -> Result<DeviceStatus> {
        cancellable(cancel, self.request_status(public_key)).await
    }

    pub async fn request_telemetry_with_cancel(
        &self,
        public_key: &PublicKey,
        cancel: &CancellationToken,
    ) -> Result<Vec<TelemetryPoint>> {
        cancellable(cancel, self.request_telemetry(public_key)).await
    }

    pub async fn login_with_cancel(
        &self,
        public_key: &PublicKey,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<LoginOutcome> {
        cancellable(cancel, self.login(public_key, password)).await
    }

    pub async fn discover_path_with_cancel(
        &self,
        public_key: &PublicKey,
        cancel: &CancellationToken,
    ) -> Result<DiscoveredPath> {
        cancellable(cancel, self.discover_path(public_key)).await
    }

    pub async fn send_binary_request_with_cancel(
        &self,
        public_key: &PublicKey,
        request_type: u8,
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        cancellable(cancel, self.send_binary_request(public_key, request_type, payload)).await
    }

    pub async fn trace_path_with_cancel(
        &self,
        path: &[u8],
        cancel: &CancellationToken,
    ) -> Result<TraceInfo> {
        cancellable(cancel, self.trace_path(path)).await
    }
}
