//! Session orchestrator.
//!
//! A [`Session`] owns one transport. A background pump task decodes every
//! inbound frame and, in this order, broadcasts it, offers it to the
//! pending request registry and applies it to the contact cache. Command
//! exchanges are serialised by an async mutex; each exchange subscribes to
//! the broadcast stream *before* writing its frame so the answer cannot be
//! missed.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use companion_protocol::{
    BatteryAndStorage, ChannelInfo, Command, ContactInfo, CoreStats, DeviceInfo, Event,
    PacketStats, PublicKey, RadioParams, RadioStats, SelfInfo, StatsType,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::{EventBroadcaster, EventSubscription};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::contacts::ContactCache;
use crate::error::{Result, SessionError};
use crate::pending::{correlation, PendingKey, PendingRegistry};
use crate::transport::{FrameStream, Transport};

/// Result of one contact enumeration.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactSync {
    pub contacts: Vec<ContactInfo>,
    /// High-water mark reported by the end marker.
    pub last_modified: u32,
    /// Count announced by the start marker, if one arrived.
    pub expected: Option<u32>,
}

/// One statistics block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStats {
    Core(CoreStats),
    Radio(RadioStats),
    Packets(PacketStats),
}

/// The drain loop is running while `token` holds its cancellation token.
#[derive(Default)]
pub(crate) struct DrainState {
    pub(crate) rearm: AtomicBool,
    pub(crate) token: Mutex<Option<CancellationToken>>,
}

pub(crate) struct SessionInner {
    pub(crate) config: SessionConfig,
    transport: Arc<dyn Transport>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) events: EventBroadcaster,
    pub(crate) pending: PendingRegistry,
    pub(crate) contacts: ContactCache,
    command_lock: tokio::sync::Mutex<()>,
    pub(crate) shutdown: CancellationToken,
    connected: AtomicBool,
    self_info: Mutex<Option<SelfInfo>>,
    pub(crate) drain: DrainState,
    next_tag: AtomicU32,
}

/// Connected session with one companion radio.
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

/// Firmware error and disabled responses, which end any exchange.
pub(crate) fn device_failure<T>(event: &Event) -> Option<Result<T>> {
    match event {
        Event::Error { code } => Some(Err(SessionError::Device(*code))),
        Event::Disabled => Some(Err(SessionError::Disabled)),
        _ => None,
    }
}

pub(crate) fn expect_ok(event: &Event) -> Option<Result<()>> {
    match event {
        Event::Ok { .. } => Some(Ok(())),
        other => device_failure(other),
    }
}

/// Run `operation` until it finishes or `cancel` fires. Everything an
/// operation holds (command lock, pending slot, subscription) is released
/// when its future is dropped.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SessionError::Cancelled),
        result = operation => result,
    }
}

/// Current wall-clock time as a protocol timestamp.
pub(crate) fn unix_now() -> u32 {
    chrono::Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32
}

impl SessionInner {
    pub(crate) async fn lock_commands(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.command_lock.lock().await
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn transmit(&self, command: &Command) -> Result<()> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let frame = command.try_encode()?;
        debug!(code = command.code(), len = frame.len(), "sending command");
        self.transport.send(&frame).await?;
        Ok(())
    }

    /// Send `command` and wait until `accept` produces a result. Caller
    /// holds the command lock. The subscription is handed back so callers
    /// can inspect whatever arrived after the answer.
    pub(crate) async fn exchange<T, F>(
        &self,
        command: &Command,
        operation: &'static str,
        timeout: Duration,
        cancel: &CancellationToken,
        accept: F,
    ) -> Result<(T, EventSubscription)>
    where
        F: FnMut(&Event) -> Option<Result<T>>,
    {
        let mut events = self.events.subscribe();
        self.transmit(command).await?;
        let value = self
            .await_response(&mut events, operation, timeout, cancel, accept)
            .await?;
        Ok((value, events))
    }

    async fn await_response<T, F>(
        &self,
        events: &mut EventSubscription,
        operation: &'static str,
        timeout: Duration,
        cancel: &CancellationToken,
        mut accept: F,
    ) -> Result<T>
    where
        F: FnMut(&Event) -> Option<Result<T>>,
    {
        let mut deadline = self.clock.sleep(timeout);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                event = events.recv() => {
                    let Some(event) = event else {
                        return Err(SessionError::NotConnected);
                    };
                    if let Some(result) = accept(&event) {
                        return result;
                    }
                }
                _ = &mut deadline => {
                    return Err(SessionError::Timeout { operation, timeout });
                }
            }
        }
    }

    /// Lock, exchange with the default command timeout, unlock.
    pub(crate) async fn request<T, F>(
        &self,
        command: Command,
        operation: &'static str,
        accept: F,
    ) -> Result<T>
    where
        F: FnMut(&Event) -> Option<Result<T>>,
    {
        command.validate()?;
        let _guard = self.lock_commands().await;
        let (value, _) = self
            .exchange(
                &command,
                operation,
                self.config.command_timeout(),
                &self.shutdown,
                accept,
            )
            .await?;
        Ok(value)
    }

    /// Complete `key` from events that were queued before it was registered.
    pub(crate) fn adopt_backlog(&self, events: &mut EventSubscription, key: PendingKey) {
        while let Some(event) = events.try_recv() {
            if correlation(&event) == Some(key) {
                self.pending.complete_key(key, event);
                return;
            }
        }
    }

    pub(crate) fn next_tag(&self) -> u32 {
        self.next_tag.fetch_add(1, Ordering::Relaxed)
    }

    fn handle_frame(self: &Arc<Self>, frame: &[u8]) {
        let event = Arc::new(Event::decode(frame));
        match &*event {
            Event::ParseFailure { code, reason } => {
                warn!(code = ?code, %reason, "ignoring unparseable frame")
            }
            other => debug!(event = other.name(), "dispatching event"),
        }

        self.events.dispatch(Arc::clone(&event));
        self.pending.complete_event(&event);
        self.contacts.track_event(&event);

        if matches!(*event, Event::MessagesWaiting) && self.config.auto_fetch_messages {
            self.start_drain();
        }
    }

    async fn handshake(&self) -> Result<SelfInfo> {
        let command = Command::AppStart {
            app_version: self.config.app_version,
            client_id: self.config.client_id.clone(),
        };
        command.validate()?;
        let _guard = self.lock_commands().await;
        let (info, _) = self
            .exchange(
                &command,
                "handshake",
                self.config.handshake_timeout(),
                &self.shutdown,
                |event| match event {
                    Event::SelfInfo(info) => Some(Ok(info.clone())),
                    other => device_failure(other),
                },
            )
            .await?;
        *self.self_info.lock() = Some(info.clone());
        Ok(info)
    }

    async fn close(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_drain();
        self.shutdown.cancel();
        let cancelled = self.pending.cancel_all();
        self.transport.disconnect().await?;
        info!(cancelled, "disconnected");
        Ok(())
    }
}

async fn pump(inner: Weak<SessionInner>, mut frames: FrameStream, shutdown: CancellationToken) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = frames.recv() => frame,
        };
        let Some(frame) = frame else {
            debug!("inbound frame stream closed");
            break;
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_frame(&frame);
    }
}

impl Session {
    /// Open `transport` and perform the handshake.
    pub async fn connect(transport: Arc<dyn Transport>, config: SessionConfig) -> Result<Session> {
        Self::connect_with_clock(transport, config, Arc::new(SystemClock)).await
    }

    /// As [`Session::connect`], with an explicit time source.
    pub async fn connect_with_clock(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Session> {
        config.validate()?;
        let frames = transport.connect().await?;

        let inner = Arc::new(SessionInner {
            pending: PendingRegistry::new(Arc::clone(&clock)),
            config,
            transport,
            clock,
            events: EventBroadcaster::new(),
            contacts: ContactCache::new(),
            command_lock: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            connected: AtomicBool::new(true),
            self_info: Mutex::new(None),
            drain: DrainState::default(),
            next_tag: AtomicU32::new(chrono::Utc::now().timestamp_subsec_nanos() | 1),
        });
        tokio::spawn(pump(
            Arc::downgrade(&inner),
            frames,
            inner.shutdown.clone(),
        ));

        let session = Session { inner };
        match session.inner.handshake().await {
            Ok(info) => {
                info!(name = %info.name, key = %info.public_key.prefix(), "connected");
                Ok(session)
            }
            Err(err) => {
                warn!(%err, "handshake failed");
                if let Err(close_err) = session.inner.close().await {
                    debug!(%close_err, "transport close after failed handshake");
                }
                Err(err)
            }
        }
    }

    /// Cancel background work and every outstanding wait, then close the
    /// transport.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.close().await
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Identity reported at handshake.
    pub fn self_info(&self) -> Option<SelfInfo> {
        self.inner.self_info.lock().clone()
    }

    pub fn contacts(&self) -> &ContactCache {
        &self.inner.contacts
    }

    pub fn pending_requests(&self) -> &PendingRegistry {
        &self.inner.pending
    }

    /// Observe every event decoded from now on.
    pub fn subscribe(&self) -> EventSubscription {
        self.inner.events.subscribe()
    }

    /// Wait for the first event satisfying `predicate`.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Result<Arc<Event>>
    where
        F: FnMut(&Event) -> bool + Send,
    {
        let mut events = self.inner.events.subscribe();
        tokio::select! {
            found = events.wait_for(self.inner.clock.as_ref(), timeout, predicate) => {
                found.ok_or(SessionError::Timeout { operation: "wait for event", timeout })
            }
            _ = self.inner.shutdown.cancelled() => Err(SessionError::Cancelled),
        }
    }

    // ------------------------------------------------------------------
    // Device
    // ------------------------------------------------------------------

    pub async fn device_query(&self) -> Result<DeviceInfo> {
        let command = Command::DeviceQuery {
            app_version: self.inner.config.app_version,
        };
        self.inner
            .request(command, "device query", |event| match event {
                Event::DeviceInfo(info) => Some(Ok(info.clone())),
                other => device_failure(other),
            })
            .await
    }

    pub async fn battery(&self) -> Result<BatteryAndStorage> {
        self.inner
            .request(Command::GetBatteryAndStorage, "battery", |event| match event {
                Event::Battery(battery) => Some(Ok(*battery)),
                other => device_failure(other),
            })
            .await
    }

    /// Device clock, seconds since the Unix epoch.
    pub async fn device_time(&self) -> Result<u32> {
        self.inner
            .request(Command::GetDeviceTime, "device time", |event| match event {
                Event::CurrentTime { time_secs } => Some(Ok(*time_secs)),
                other => device_failure(other),
            })
            .await
    }

    pub async fn set_device_time(&self, time_secs: u32) -> Result<()> {
        self.inner
            .request(Command::SetDeviceTime { time_secs }, "set time", expect_ok)
            .await
    }

    /// Set the device clock to the host's wall clock. Returns the value sent.
    pub async fn sync_device_time(&self) -> Result<u32> {
        let now = unix_now();
        self.set_device_time(now).await?;
        Ok(now)
    }

    pub async fn set_coordinates(
        &self,
        lat_degrees: f64,
        lon_degrees: f64,
        alt_metres: i32,
    ) -> Result<()> {
        if !(-90.0..=90.0).contains(&lat_degrees) || !(-180.0..=180.0).contains(&lon_degrees) {
            return Err(SessionError::InvalidInput(format!(
                "coordinates out of range: {}, {}",
                lat_degrees, lon_degrees
            )));
        }
        let command = Command::set_coordinates(lat_degrees, lon_degrees, alt_metres);
        self.inner.request(command, "set coordinates", expect_ok).await
    }

    pub async fn set_radio_params(&self, params: RadioParams) -> Result<()> {
        self.inner
            .request(Command::SetRadioParams { params }, "set radio params", expect_ok)
            .await
    }

    pub async fn set_tx_power(&self, power_dbm: u8) -> Result<()> {
        self.inner
            .request(Command::SetRadioTxPower { power_dbm }, "set tx power", expect_ok)
            .await
    }

    pub async fn set_name(&self, name: &str) -> Result<()> {
        let command = Command::SetAdvertName {
            name: name.to_string(),
        };
        self.inner.request(command, "set name", expect_ok).await?;
        if let Some(info) = self.inner.self_info.lock().as_mut() {
            info.name = name.to_string();
        }
        Ok(())
    }

    /// Advertise this node, flooded or zero-hop.
    pub async fn send_advert(&self, flood: bool) -> Result<()> {
        self.inner
            .request(Command::SendSelfAdvert { flood }, "send advert", expect_ok)
            .await
    }

    pub async fn set_device_pin(&self, pin: u32) -> Result<()> {
        if pin != 0 && !(100_000..=999_999).contains(&pin) {
            return Err(SessionError::InvalidInput(format!(
                "pin must be 0 or six digits, got {}",
                pin
            )));
        }
        self.inner
            .request(Command::SetDevicePin { pin }, "set pin", expect_ok)
            .await
    }

    /// Ask the device to reboot. No answer is expected.
    pub async fn reboot(&self) -> Result<()> {
        let _guard = self.inner.lock_commands().await;
        self.inner.transmit(&Command::Reboot).await
    }

    pub async fn get_stats(&self, stats_type: StatsType) -> Result<DeviceStats> {
        self.inner
            .request(Command::GetStats { stats_type }, "get stats", |event| match event {
                Event::StatsCore(stats) => Some(Ok(DeviceStats::Core(*stats))),
                Event::StatsRadio(stats) => Some(Ok(DeviceStats::Radio(*stats))),
                Event::StatsPackets(stats) => Some(Ok(DeviceStats::Packets(*stats))),
                other => device_failure(other),
            })
            .await
    }

    pub async fn send_control_data(&self, data: Vec<u8>) -> Result<()> {
        self.inner
            .request(Command::SendControlData { data }, "control data", expect_ok)
            .await
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    pub async fn get_channel(&self, index: u8) -> Result<ChannelInfo> {
        self.inner
            .request(Command::GetChannel { index }, "get channel", |event| match event {
                Event::ChannelInfo(channel) => Some(Ok(channel.clone())),
                other => device_failure(other),
            })
            .await
    }

    pub async fn set_channel(&self, channel: ChannelInfo) -> Result<()> {
        self.inner
            .request(Command::SetChannel { channel }, "set channel", expect_ok)
            .await
    }

    // ------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------

    /// Enumerate contacts, optionally only those modified after `since`.
    pub async fn get_contacts(&self, since: Option<u32>) -> Result<ContactSync> {
        let command = Command::GetContacts { since };
        let _guard = self.inner.lock_commands().await;

        let mut expected = None;
        let mut received = Vec::new();
        let (sync, _) = self
            .inner
            .exchange(
                &command,
                "contact sync",
                self.inner.config.contact_sync_timeout(),
                &self.inner.shutdown,
                |event| match event {
                    Event::ContactsStart { count } => {
                        expected = Some(*count);
                        None
                    }
                    Event::Contact(contact) => {
                        received.push(contact.clone());
                        None
                    }
                    Event::EndOfContacts { last_modified } => Some(Ok(ContactSync {
                        contacts: std::mem::take(&mut received),
                        last_modified: *last_modified,
                        expected,
                    })),
                    other => device_failure(other),
                },
            )
            .await?;

        if let Some(count) = sync.expected {
            if count as usize != sync.contacts.len() {
                debug!(
                    announced = count,
                    received = sync.contacts.len(),
                    "contact count mismatch"
                );
            }
        }
        Ok(sync)
    }

    /// Bring the cache up to date. Full enumeration the first time,
    /// incremental from the high-water mark afterwards.
    /// [`get_contacts`](Self::get_contacts), abandoned with
    /// [`SessionError::Cancelled`] when `cancel` fires.
    pub async fn get_contacts_with_cancel(
        &self,
        since: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<ContactSync> {
        cancellable(cancel, self.get_contacts(since)).await
    }

    pub async fn refresh_contacts(&self) -> Result<Vec<ContactInfo>> {
        let cache = &self.inner.contacts;
        let since = (!cache.is_empty() && cache.last_modified() > 0).then(|| cache.last_modified());
        let sync = self.get_contacts(since).await?;
        match since {
            None => cache.update_cache(sync.contacts, sync.last_modified),
            Some(_) => cache.merge(sync.contacts, sync.last_modified),
        }
        Ok(cache.contacts())
    }

    pub async fn get_contact_by_key(&self, public_key: &PublicKey) -> Result<ContactInfo> {
        let command = Command::GetContactByKey {
            public_key: *public_key,
        };
        let contact = self
            .inner
            .request(command, "get contact", |event| match event {
                Event::Contact(contact) => Some(Ok(contact.clone())),
                other => device_failure(other),
            })
            .await?;
        Ok(contact)
    }

    /// Write a contact to the device, then to the cache.
    pub async fn add_contact(&self, contact: ContactInfo) -> Result<()> {
        let command = Command::AddUpdateContact {
            contact: contact.clone(),
        };
        self.inner.request(command, "add contact", expect_ok).await?;
        self.inner.contacts.store(contact);
        Ok(())
    }

    /// Approve a contact from the pending holding area.
    pub async fn approve_pending_contact(&self, public_key: &PublicKey) -> Result<ContactInfo> {
        let contact = self.inner.contacts.pop_pending(public_key).ok_or_else(|| {
            SessionError::InvalidInput(format!("no pending contact {}", public_key.prefix()))
        })?;
        if let Err(err) = self.add_contact(contact.clone()).await {
            self.inner.contacts.add_pending(contact);
            return Err(err);
        }
        Ok(contact)
    }

    /// Remove a contact from the device and the cache.
    pub async fn remove_contact(&self, public_key: &PublicKey) -> Result<()> {
        let command = Command::RemoveContact {
            public_key: *public_key,
        };
        self.inner.request(command, "remove contact", expect_ok).await?;
        self.inner.contacts.remove(public_key);
        Ok(())
    }

    /// Forget the direct path to a contact so the next send floods.
    pub async fn reset_path(&self, public_key: &PublicKey) -> Result<()> {
        let command = Command::ResetPath {
            public_key: *public_key,
        };
        self.inner.request(command, "reset path", expect_ok).await?;
        self.inner.contacts.mark_dirty();
        Ok(())
    }

    pub async fn share_contact(&self, public_key: &PublicKey) -> Result<()> {
        let command = Command::ShareContact {
            public_key: *public_key,
        };
        self.inner.request(command, "share contact", expect_ok).await
    }

    /// Export a contact card, or this node's own card when `public_key` is
    /// `None`.
    pub async fn export_contact(&self, public_key: Option<PublicKey>) -> Result<Vec<u8>> {
        self.inner
            .request(Command::ExportContact { public_key }, "export contact", |event| {
                match event {
                    Event::ExportedContact { data } => Some(Ok(data.clone())),
                    other => device_failure(other),
                }
            })
            .await
    }

    pub async fn import_contact(&self, data: Vec<u8>) -> Result<()> {
        self.inner
            .request(Command::ImportContact { data }, "import contact", expect_ok)
            .await?;
        self.inner.contacts.mark_dirty();
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.stop_drain();
        self.inner.shutdown.cancel();
        self.inner.pending.cancel_all();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connected", &self.is_connected())
            .field("contacts", &self.inner.contacts.len())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}
