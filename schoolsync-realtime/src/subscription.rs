//! One live change-feed channel for one session profile.
//!
//! [`RealtimeSubscription::start`] validates the profile, claims its channel
//! name and spawns a worker task. The worker owns the channel, the router
//! and the reconnect backoff, and is driven by a single `tokio::select!`
//! over:
//!
//! - commands from the handle (resume, shutdown)
//! - the in-flight channel open, if any
//! - signals from the open channel
//! - the reconnect deadline
//! - the debounce deadline
//!
//! so events are handled strictly in delivery order, a torn-down worker
//! can never flush a stale batch, and a hung open never delays shutdown.

use crate::backoff::Backoff;
use crate::context::RealtimeContext;
use crate::error::{RealtimeError, RealtimeResult, TransportError};
use crate::feed::{FeedChannel, FeedSignal, ListenerSpec};
use crate::registry::ChannelClaim;
use crate::router::EventRouter;
use crate::status::{RealtimeStatus, StatusHandle};
use chrono::Utc;
use schoolsync_core::RoleSubscriptionProfile;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

type PendingOpen =
    Pin<Box<dyn Future<Output = Result<Box<dyn FeedChannel>, TransportError>> + Send>>;

#[derive(Debug)]
enum Command {
    Resume,
    Shutdown,
}

/// Handle to a running subscription.
///
/// Dropping the handle aborts the worker; call [`shutdown`](Self::shutdown)
/// for an orderly close.
#[derive(Debug)]
pub struct RealtimeSubscription {
    profile: RoleSubscriptionProfile,
    status: StatusHandle,
    commands: Option<mpsc::Sender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeSubscription {
    /// Start a subscription with its own status channel.
    pub fn start(ctx: &RealtimeContext, profile: RoleSubscriptionProfile) -> RealtimeResult<Self> {
        Self::start_with_status(ctx, profile, StatusHandle::new())
    }

    /// Start a subscription that reports into an existing status channel.
    pub fn start_with_status(
        ctx: &RealtimeContext,
        profile: RoleSubscriptionProfile,
        status: StatusHandle,
    ) -> RealtimeResult<Self> {
        if let Err(e) = profile.validate() {
            tracing::error!(
                channel = %profile.channel_name,
                error = %e,
                "Rejected realtime subscription profile"
            );
            return Err(e.into());
        }

        if profile.is_empty() {
            tracing::info!(
                channel = %profile.channel_name,
                "Profile has no subscriptions; not opening a channel"
            );
            return Ok(Self {
                profile,
                status,
                commands: None,
                task: None,
            });
        }

        let claim = ctx.registry().claim(&profile.channel_name).map_err(|e| {
            tracing::error!(channel = %profile.channel_name, error = %e, "Channel name already live");
            e
        })?;

        let (tx, rx) = mpsc::channel(ctx.settings().command_buffer);
        let worker = Worker::new(ctx.clone(), profile.clone(), status.clone(), rx, claim);
        let task = tokio::spawn(worker.run());

        Ok(Self {
            profile,
            status,
            commands: Some(tx),
            task: Some(task),
        })
    }

    pub fn channel_name(&self) -> &str {
        &self.profile.channel_name
    }

    pub fn profile(&self) -> &RoleSubscriptionProfile {
        &self.profile
    }

    pub fn status(&self) -> watch::Receiver<RealtimeStatus> {
        self.status.subscribe()
    }

    /// False for an empty profile, or once the worker has exited.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Reopen the channel if it dropped and invalidate every subscribed key.
    pub async fn resume(&self) -> RealtimeResult<()> {
        match &self.commands {
            Some(commands) => commands
                .send(Command::Resume)
                .await
                .map_err(|_| RealtimeError::WorkerGone),
            None => Ok(()),
        }
    }

    /// Close the channel, drop pending invalidations and wait for the worker
    /// to exit. The channel name is free again once this returns.
    pub async fn shutdown(mut self) -> RealtimeResult<()> {
        if let Some(commands) = self.commands.take() {
            // A closed queue means the worker already exited; joining below
            // still reports how.
            let _ = commands.send(Command::Shutdown).await;
        }
        match self.task.take() {
            Some(task) => task.await.map_err(|e| {
                tracing::warn!(channel = %self.profile.channel_name, error = %e, "Subscription worker failed");
                RealtimeError::WorkerGone
            }),
            None => Ok(()),
        }
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Worker {
    ctx: RealtimeContext,
    profile: RoleSubscriptionProfile,
    listeners: Vec<ListenerSpec>,
    router: EventRouter,
    status: StatusHandle,
    backoff: Backoff,
    channel: Option<Box<dyn FeedChannel>>,
    opening: Option<PendingOpen>,
    retry_at: Option<Instant>,
    commands: mpsc::Receiver<Command>,
    _claim: ChannelClaim,
}

impl Worker {
    fn new(
        ctx: RealtimeContext,
        profile: RoleSubscriptionProfile,
        status: StatusHandle,
        commands: mpsc::Receiver<Command>,
        claim: ChannelClaim,
    ) -> Self {
        let listeners = profile.subscriptions.iter().map(ListenerSpec::from).collect();
        let router = EventRouter::new(ctx.tracker().clone(), profile.debounce());
        let backoff = Backoff::new(ctx.settings().reconnect.clone());
        Self {
            ctx,
            profile,
            listeners,
            router,
            status,
            backoff,
            channel: None,
            opening: None,
            retry_at: None,
            commands,
            _claim: claim,
        }
    }

    async fn run(mut self) {
        tracing::info!(
            channel = %self.profile.channel_name,
            listeners = self.listeners.len(),
            debounce_ms = self.profile.debounce_ms,
            "Realtime subscription started"
        );
        self.begin_open();

        loop {
            let retry_at = self.retry_at;
            let flush_at = self.router.deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Resume) => self.resume().await,
                    Some(Command::Shutdown) | None => break,
                },
                opened = pending_open(&mut self.opening) => {
                    self.opening = None;
                    self.on_opened(opened);
                }
                signal = next_signal(&mut self.channel) => match signal {
                    Some(signal) => self.handle_signal(signal).await,
                    None => self.on_closed("channel stream ended".to_string()).await,
                },
                _ = sleep_until_some(retry_at) => {
                    self.retry_at = None;
                    self.begin_open();
                }
                _ = sleep_until_some(flush_at) => self.flush(),
            }
        }

        self.teardown().await;
    }

    /// Start opening the channel. The open is polled by the run loop, so
    /// commands keep flowing while it is in flight.
    fn begin_open(&mut self) {
        let feed = Arc::clone(self.ctx.feed());
        let channel_name = self.profile.channel_name.clone();
        let listeners = self.listeners.clone();
        let open: PendingOpen = Box::pin(async move { feed.open(&channel_name, &listeners).await });
        self.opening = Some(open);
    }

    fn on_opened(&mut self, opened: Result<Box<dyn FeedChannel>, TransportError>) {
        let channel_name = self.profile.channel_name.as_str();
        match opened {
            Ok(channel) => {
                tracing::debug!(channel = %channel_name, "Opened realtime channel");
                self.channel = Some(channel);
            }
            Err(e) => {
                tracing::warn!(channel = %channel_name, error = %e, "Failed to open realtime channel");
                self.status.record_error(e.to_string());
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        match self.backoff.next_delay() {
            Some(delay) => {
                tracing::debug!(
                    channel = %self.profile.channel_name,
                    attempt = self.backoff.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.retry_at = Some(Instant::now() + delay);
            }
            None => {
                tracing::warn!(
                    channel = %self.profile.channel_name,
                    attempts = self.backoff.attempts(),
                    "Reconnect attempts exhausted; waiting for foreground resume"
                );
                self.retry_at = None;
            }
        }
    }

    async fn handle_signal(&mut self, signal: FeedSignal) {
        match signal {
            FeedSignal::Subscribed => {
                tracing::info!(channel = %self.profile.channel_name, "Realtime channel subscribed");
                self.backoff.reset();
                self.status.mark_connected();
            }
            FeedSignal::Change { listener, event } => {
                let Some(config) = self.profile.subscriptions.get(listener) else {
                    tracing::warn!(
                        channel = %self.profile.channel_name,
                        listener,
                        "Change for unknown listener"
                    );
                    return;
                };
                if config.table != event.table || !config.event.accepts(event.kind) {
                    tracing::debug!(
                        channel = %self.profile.channel_name,
                        table = %event.table,
                        kind = event.kind.as_str(),
                        "Change does not match its listener; ignoring"
                    );
                    return;
                }
                let outcome = self.router.route(&event, &config.query_keys, Instant::now());
                if outcome.is_accepted() {
                    self.status.record_event(Utc::now());
                }
            }
            FeedSignal::Error(message) => {
                tracing::warn!(channel = %self.profile.channel_name, error = %message, "Realtime channel error");
                let still_open = self.channel.as_ref().is_some_and(|c| c.is_open());
                if still_open {
                    self.status.record_warning(message);
                } else {
                    self.status.record_error(message);
                    self.drop_channel().await;
                    self.schedule_retry();
                }
            }
            FeedSignal::Closed { reason } => self.on_closed(reason).await,
        }
    }

    async fn on_closed(&mut self, reason: String) {
        tracing::warn!(channel = %self.profile.channel_name, reason = %reason, "Realtime channel closed");
        self.status.record_error(format!("channel closed: {}", reason));
        self.drop_channel().await;
        self.schedule_retry();
    }

    fn flush(&mut self) {
        let keys = self.router.flush_due(Instant::now());
        if keys.is_empty() {
            return;
        }
        for key in &keys {
            self.ctx.cache().invalidate(key);
        }
        tracing::debug!(channel = %self.profile.channel_name, keys = keys.len(), "Flushed invalidations");
    }

    async fn resume(&mut self) {
        let dropped = self.router.cancel();
        let reopen =
            self.opening.is_none() && !self.channel.as_ref().is_some_and(|c| c.is_open());
        if reopen {
            self.drop_channel().await;
            self.backoff.reset();
            self.retry_at = None;
            self.begin_open();
        }
        let keys = self.profile.all_query_keys();
        for key in &keys {
            self.ctx.cache().invalidate(key);
        }
        tracing::info!(
            channel = %self.profile.channel_name,
            reopened = reopen,
            keys = keys.len(),
            dropped,
            "Realtime subscription resumed"
        );
    }

    async fn drop_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                tracing::debug!(channel = %self.profile.channel_name, error = %e, "Error closing stale channel");
            }
        }
    }

    async fn teardown(&mut self) {
        let dropped = self.router.cancel();
        self.retry_at = None;
        if self.opening.take().is_some() {
            tracing::debug!(channel = %self.profile.channel_name, "Abandoned in-flight channel open");
        }
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                tracing::warn!(channel = %self.profile.channel_name, error = %e, "Failed to close realtime channel");
            }
        }
        self.status.mark_disconnected();
        tracing::info!(channel = %self.profile.channel_name, dropped, "Realtime subscription stopped");
    }
}

async fn next_signal(channel: &mut Option<Box<dyn FeedChannel>>) -> Option<FeedSignal> {
    match channel {
        Some(channel) => channel.next_signal().await,
        None => std::future::pending().await,
    }
}

async fn pending_open(
    opening: &mut Option<PendingOpen>,
) -> Result<Box<dyn FeedChannel>, TransportError> {
    match opening {
        Some(open) => open.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
