//! Host session manager.
//!
//! A [`HostSession`] owns at most one live [`Port`] to the native host. Each port gets a
//! single listener task that routes correlated responses into the port's pending table
//! and everything else onto the push-notification stream.
//!
//! # Request flow
//!
//! 1. `request()` takes the current port's sender and pending table
//! 2. A fresh id is registered with a oneshot channel
//! 3. The envelope is queued on the port
//! 4. The listener removes the matching entry and completes the oneshot
//! 5. A timeout, send failure or port loss fails the attempt; retryable failures
//!    reconnect and try again with a fresh id
//!
//! Lifecycle changes (connect, disconnect, reconnect) are serialized. Every port carries
//! a generation number so a recovery path can tell that the port it saw fail has
//! already been replaced; duplicate disconnect signals coalesce on that check alone.
//! After an explicit `disconnect()` nothing reconnects until `connect()` or
//! `reconnect()` is called again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex as LifecycleLock};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::{HostError, Result};
use crate::protocol::{
    is_api_compatible, HostMessage, InitResponse, RequestEnvelope, RequestIdGenerator,
    RequestType, ResponseEnvelope,
};
use crate::transport::{BoxFuture, CloseHook, Connector, Port};

const NOTIFICATION_CAPACITY: usize = 64;

/// Decides how many times a request is tried and what happens between tries.
pub trait RetryStrategy: Send + Sync {
    /// Attempts including the first. Values below one are treated as one.
    fn max_attempts(&self) -> u32;

    /// Pause after `failed_attempts` failures, before reconnecting.
    fn backoff(&self, _failed_attempts: u32) -> Duration {
        Duration::ZERO
    }

    fn should_retry(&self, error: &HostError) -> bool {
        error.is_retryable()
    }
}

/// Fixed attempt budget with a constant pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl FixedRetry {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            attempts: config.max_attempts,
            delay: config.retry_delay(),
        }
    }
}

impl RetryStrategy for FixedRetry {
    fn max_attempts(&self) -> u32 {
        self.attempts
    }

    fn backoff(&self, _failed_attempts: u32) -> Duration {
        self.delay
    }
}

/// Outstanding requests on one port, keyed by request id.
#[derive(Debug, Default)]
struct PendingTable {
    entries: Mutex<HashMap<String, oneshot::Sender<ResponseEnvelope>>>,
}

impl PendingTable {
    fn register(&self, id: String) -> oneshot::Receiver<ResponseEnvelope> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().insert(id, tx);
        rx
    }

    /// Remove the matching entry and hand it the response in one step.
    fn resolve(&self, response: ResponseEnvelope) -> std::result::Result<(), ResponseEnvelope> {
        let waiter = self.entries.lock().remove(&response.request_id);
        match waiter {
            Some(tx) => tx.send(response),
            None => Err(response),
        }
    }

    fn remove(&self, id: &str) {
        self.entries.lock().remove(id);
    }

    /// Drop every entry; their receivers observe the port as gone.
    fn fail_all(&self) -> usize {
        let mut entries = self.entries.lock();
        let failed = entries.len();
        entries.clear();
        failed
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Port has not finished its handshake yet.
const UNARMED: u8 = 0;
/// Handshake done; losing the port triggers a reconnect.
const ARMED: u8 = 1;
/// Port is gone, either dropped by the host or closed by us.
const LOST: u8 = 2;

/// Removes a request's entry on every exit path: response, timeout, error or drop.
struct PendingGuard {
    table: Arc<PendingTable>,
    id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

struct LivePort {
    generation: u64,
    outbound: mpsc::UnboundedSender<Value>,
    pending: Arc<PendingTable>,
    /// `UNARMED`, `ARMED` or `LOST`.
    link: Arc<AtomicU8>,
    listener: JoinHandle<()>,
    on_close: Option<CloseHook>,
}

impl LivePort {
    fn close(mut self) -> usize {
        self.link.store(LOST, Ordering::SeqCst);
        self.listener.abort();
        if let Some(hook) = self.on_close.take() {
            hook();
        }
        self.pending.fail_all()
    }
}

#[derive(Default)]
struct State {
    port: Option<LivePort>,
    last_generation: u64,
    host_api_version: Option<String>,
    is_validated_on_host: bool,
    /// Set by `disconnect()`, cleared by `connect()` and `reconnect()`.
    closed: bool,
}

struct Inner {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    retry: Arc<dyn RetryStrategy>,
    ids: RequestIdGenerator,
    state: Mutex<State>,
    lifecycle: LifecycleLock<()>,
    notifications: broadcast::Sender<Value>,
}

/// Everything a port's listener task needs.
struct Listener {
    generation: u64,
    pending: Arc<PendingTable>,
    link: Arc<AtomicU8>,
    notifications: broadcast::Sender<Value>,
    session: Weak<Inner>,
}

async fn listen(mut inbound: mpsc::UnboundedReceiver<Value>, ctx: Listener) {
    while let Some(raw) = inbound.recv().await {
        match HostMessage::classify(raw) {
            HostMessage::Response(response) => {
                let id = response.request_id.clone();
                match ctx.pending.resolve(response) {
                    Ok(()) => tracing::debug!(id = %id, "response matched"),
                    Err(_) => tracing::debug!(id = %id, "dropping response with no pending request"),
                }
            }
            HostMessage::Notification(message) => {
                tracing::debug!("host notification: {message}");
                let _ = ctx.notifications.send(message);
            }
        }
    }

    let failed = ctx.pending.fail_all();
    tracing::info!(generation = ctx.generation, failed, "native host port disconnected");
    // An unarmed port is picked up by the handshake that arms it.
    if ctx.link.swap(LOST, Ordering::SeqCst) == ARMED {
        if let Some(inner) = ctx.session.upgrade() {
            tokio::spawn(inner.on_port_lost(ctx.generation));
        }
    }
}

impl Inner {
    fn live_generation(&self) -> Option<u64> {
        self.state.lock().port.as_ref().map(|port| port.generation)
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    async fn open_port(self: &Arc<Self>) -> Result<u64> {
        let Port {
            outbound,
            inbound,
            on_close,
        } = self.connector.open(&self.config.host_name).await?;

        let pending = Arc::new(PendingTable::default());
        let link = Arc::new(AtomicU8::new(UNARMED));
        let (generation, stale) = {
            let mut state = self.state.lock();
            state.last_generation += 1;
            let generation = state.last_generation;
            let listener = tokio::spawn(listen(
                inbound,
                Listener {
                    generation,
                    pending: Arc::clone(&pending),
                    link: Arc::clone(&link),
                    notifications: self.notifications.clone(),
                    session: Arc::downgrade(self),
                },
            ));
            let stale = state.port.replace(LivePort {
                generation,
                outbound,
                pending,
                link,
                listener,
                on_close,
            });
            (generation, stale)
        };
        if let Some(stale) = stale {
            stale.close();
        }
        tracing::debug!(host = %self.config.host_name, generation, "opened native host port");
        Ok(generation)
    }

    fn teardown(&self) {
        let port = self.state.lock().port.take();
        if let Some(port) = port {
            let generation = port.generation;
            let failed = port.close();
            tracing::info!(generation, failed, "extension disconnected from native host");
        }
    }

    /// Open a port and handshake, reopening before each retry.
    async fn connect_locked(self: &Arc<Self>) -> Result<()> {
        let attempts = self.retry.max_attempts().max(1);
        let parameters = serde_json::to_value(self.config.init_parameters())?;
        let mut attempt = 1;
        loop {
            self.teardown();
            let outcome = match self.open_port().await {
                Ok(generation) => self
                    .handshake(&parameters)
                    .await
                    .map(|init| (generation, init)),
                Err(err) => Err(err),
            };
            match outcome {
                Ok((generation, init)) => {
                    let lost_early = {
                        let mut state = self.state.lock();
                        state.host_api_version = Some(init.api_version.clone());
                        state.is_validated_on_host = init.is_validated_on_host;
                        state
                            .port
                            .as_ref()
                            .filter(|p| p.generation == generation)
                            .is_some_and(|port| {
                                port.link
                                    .compare_exchange(UNARMED, ARMED, Ordering::SeqCst, Ordering::SeqCst)
                                    .is_err()
                            })
                    };
                    tracing::info!(
                        generation,
                        api_version = %init.api_version,
                        validated = init.is_validated_on_host,
                        "native host api initialized"
                    );
                    if lost_early {
                        tracing::info!(generation, "native host port dropped right after handshake");
                        tokio::spawn(Arc::clone(self).on_port_lost(generation));
                    }
                    return Ok(());
                }
                Err(err) if attempt >= attempts || !self.retry.should_retry(&err) => {
                    self.teardown();
                    return Err(HostError::Unavailable {
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    tracing::warn!(attempt, "native host handshake failed: {err}");
                    let delay = self.retry.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn handshake(&self, parameters: &Value) -> Result<InitResponse> {
        let reply = self.request_once(RequestType::Init, Some(parameters)).await?;
        Ok(serde_json::from_value(reply)?)
    }

    async fn reconnect_locked(self: &Arc<Self>) -> Result<()> {
        self.teardown();
        self.connect_locked().await
    }

    /// Reconnect unless the port observed as failing has already been replaced, or the
    /// session was disconnected on purpose.
    async fn recover(self: &Arc<Self>, observed: Option<u64>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let (live, closed) = {
            let state = self.state.lock();
            (state.port.as_ref().map(|port| port.generation), state.closed)
        };
        if closed {
            tracing::debug!(?observed, "session disconnected, not reconnecting");
            return Err(HostError::Disconnected);
        }
        if live.is_some() && live != observed {
            tracing::debug!(?observed, ?live, "port already replaced, skipping reconnect");
            return Ok(());
        }
        self.reconnect_locked().await
    }

    /// Disconnect listener.
    ///
    /// Boxed because it is spawned from the listener of a port that the reconnect
    /// itself opens.
    fn on_port_lost(self: Arc<Self>, generation: u64) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if let Err(err) = self.recover(Some(generation)).await {
                tracing::warn!(generation, "automatic reconnect to native host failed: {err}");
            }
        })
    }

    async fn request_once(&self, ty: RequestType, parameters: Option<&Value>) -> Result<Value> {
        let (outbound, pending) = {
            let state = self.state.lock();
            let port = state.port.as_ref().ok_or(HostError::NotConnected)?;
            (port.outbound.clone(), Arc::clone(&port.pending))
        };

        let id = self.ids.next_id();
        let envelope = serde_json::to_value(RequestEnvelope {
            id: &id,
            ty,
            parameters,
        })?;
        let response = pending.register(id.clone());
        let _guard = PendingGuard {
            table: pending,
            id: id.clone(),
        };

        tracing::debug!(id = %id, request = %ty, "sending request to native host");
        outbound.send(envelope).map_err(|_| HostError::Disconnected)?;

        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(response)) => response.into_result(ty),
            Ok(Err(_)) => Err(HostError::Disconnected),
            Err(_) => Err(HostError::Timeout {
                request_type: ty,
                timeout,
            }),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(port) = self.state.get_mut().port.take() {
            port.close();
        }
    }
}

/// Request/response session with the native host.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct HostSession {
    inner: Arc<Inner>,
}

/// Builder for [`HostSession`].
pub struct HostSessionBuilder {
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    retry: Option<Arc<dyn RetryStrategy>>,
}

impl HostSessionBuilder {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the retry strategy derived from the config.
    pub fn retry_strategy(mut self, retry: impl RetryStrategy + 'static) -> Self {
        self.retry = Some(Arc::new(retry));
        self
    }

    pub fn build(self) -> HostSession {
        let retry = self
            .retry
            .unwrap_or_else(|| Arc::new(FixedRetry::from_config(&self.config)));
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        HostSession {
            inner: Arc::new(Inner {
                ids: RequestIdGenerator::new(self.config.request_id_prefix.clone()),
                config: self.config,
                connector: self.connector,
                retry,
                state: Mutex::new(State::default()),
                lifecycle: LifecycleLock::new(()),
                notifications,
            }),
        }
    }
}

impl HostSession {
    pub fn builder(connector: Arc<dyn Connector>) -> HostSessionBuilder {
        HostSessionBuilder {
            connector,
            config: SessionConfig::default(),
            retry: None,
        }
    }

    pub fn new(connector: Arc<dyn Connector>, config: SessionConfig) -> Self {
        Self::builder(connector).config(config).build()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Open a port, handshake, and start watching for disconnects.
    ///
    /// Fails with [`HostError::Unavailable`] when the handshake never succeeds; the
    /// session is then left disconnected and does not reconnect on its own.
    pub async fn connect(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.state.lock().closed = false;
        self.inner.connect_locked().await
    }

    /// Close the current port, failing whatever is still pending on it. No-op when
    /// already disconnected.
    ///
    /// In-flight requests fail with [`HostError::Disconnected`] instead of retrying, and
    /// the session stays down until [`connect`](Self::connect) is called again.
    pub async fn disconnect(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.state.lock().closed = true;
        self.inner.teardown();
    }

    /// Disconnect, then connect again.
    pub async fn reconnect(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.state.lock().closed = false;
        self.inner.reconnect_locked().await
    }

    /// Send `ty` to the host and wait for its answer, retrying through reconnects.
    ///
    /// Resolves with the response `parameters` (`null` when the host sent none).
    pub async fn request(&self, ty: RequestType, parameters: Option<Value>) -> Result<Value> {
        let inner = &self.inner;
        let attempts = inner.retry.max_attempts().max(1);
        let mut recover_error = None;
        let mut attempt = 1;
        loop {
            let observed = inner.live_generation();
            let err = match inner.request_once(ty, parameters.as_ref()).await {
                Ok(reply) => return Ok(reply),
                Err(err) => err,
            };
            if attempt >= attempts || !inner.retry.should_retry(&err) || inner.is_closed() {
                return Err(match (err, recover_error) {
                    (HostError::NotConnected, Some(recover_error)) => recover_error,
                    (err, _) => err,
                });
            }

            tracing::warn!(request = %ty, attempt, "native host request failed, reconnecting: {err}");
            let delay = inner.retry.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            recover_error = inner.recover(observed).await.err();
            if let Some(err) = &recover_error {
                tracing::warn!(request = %ty, attempt, "reconnect failed: {err}");
            }
            attempt += 1;
        }
    }

    /// Stream of unsolicited host messages.
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.inner.notifications.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .lock()
            .port
            .as_ref()
            .is_some_and(|port| !port.outbound.is_closed())
    }

    /// API version the host reported in its last handshake.
    pub fn host_api_version(&self) -> Option<String> {
        self.inner.state.lock().host_api_version.clone()
    }

    pub fn is_validated_on_host(&self) -> bool {
        self.inner.state.lock().is_validated_on_host
    }

    /// Whether the host speaks at least our API version. False before a handshake.
    pub fn are_api_versions_up_to_date(&self) -> bool {
        self.host_api_version()
            .is_some_and(|host| is_api_compatible(&self.inner.config.api_version, &host))
    }

    /// Requests awaiting a response on the current port.
    pub fn pending_requests(&self) -> usize {
        self.inner
            .state
            .lock()
            .port
            .as_ref()
            .map_or(0, |port| port.pending.len())
    }
}
