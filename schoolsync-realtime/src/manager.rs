//! Session-level supervisor.
//!
//! Follows the auth context and the app lifecycle, keeping at most one
//! [`RealtimeSubscription`] alive for the current identity. Rebuilds are
//! serialized in one task: the old subscription is fully shut down before
//! the new one starts, so a live listener set is never mutated in place.
//! Status carries over when a rebuild keeps the channel name and starts
//! from default when it moves to another channel.

use crate::context::RealtimeContext;
use crate::error::{RealtimeError, RealtimeResult};
use crate::lifecycle::{AppState, LifecycleAction, LifecycleController};
use crate::status::{RealtimeStatus, StatusHandle};
use crate::subscription::RealtimeSubscription;
use schoolsync_core::{build_profile, SessionIdentity};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Handle to the supervisor task.
#[derive(Debug)]
pub struct RealtimeManager {
    status: watch::Receiver<RealtimeStatus>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RealtimeManager {
    /// Spawn the supervisor.
    ///
    /// It exits when the identity sender is dropped, when the handle is
    /// dropped, or on [`shutdown`](Self::shutdown).
    pub fn spawn(
        ctx: RealtimeContext,
        identity: watch::Receiver<Option<SessionIdentity>>,
        lifecycle: watch::Receiver<AppState>,
    ) -> Self {
        let status = StatusHandle::new();
        let receiver = status.subscribe();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let supervisor = Supervisor {
            ctx,
            status,
            identity,
            lifecycle,
            controller: LifecycleController::default(),
            active: None,
        };
        let task = tokio::spawn(supervisor.run(shutdown_rx));
        Self {
            status: receiver,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Status of whichever subscription is current. Survives rebuilds.
    pub fn status(&self) -> watch::Receiver<RealtimeStatus> {
        self.status.clone()
    }

    pub async fn shutdown(mut self) -> RealtimeResult<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match self.task.take() {
            Some(task) => task.await.map_err(|_| RealtimeError::WorkerGone),
            None => Ok(()),
        }
    }
}

struct Supervisor {
    ctx: RealtimeContext,
    status: StatusHandle,
    identity: watch::Receiver<Option<SessionIdentity>>,
    lifecycle: watch::Receiver<AppState>,
    controller: LifecycleController,
    active: Option<RealtimeSubscription>,
}

impl Supervisor {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        self.controller = LifecycleController::new(*self.lifecycle.borrow_and_update());
        let initial = self.identity.borrow_and_update().clone();
        self.apply_identity(initial).await;

        let mut lifecycle_open = true;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                changed = self.identity.changed() => {
                    if changed.is_err() {
                        tracing::info!("Session source closed; stopping realtime");
                        break;
                    }
                    let identity = self.identity.borrow_and_update().clone();
                    self.apply_identity(identity).await;
                }
                changed = self.lifecycle.changed(), if lifecycle_open => match changed {
                    Ok(()) => {
                        let state = *self.lifecycle.borrow_and_update();
                        self.on_app_state(state).await;
                    }
                    Err(_) => lifecycle_open = false,
                },
            }
        }

        self.stop_active().await;
        self.status.reset();
    }

    async fn apply_identity(&mut self, identity: Option<SessionIdentity>) {
        let Some(identity) = identity else {
            if self.active.is_some() {
                tracing::info!("Session ended; tearing down realtime subscription");
            }
            self.stop_active().await;
            self.status.reset();
            return;
        };

        let profile = match build_profile(&identity) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!(role = %identity.role(), error = %e, "Could not build subscription profile");
                self.stop_active().await;
                self.status.record_error(e.to_string());
                return;
            }
        };

        if self
            .active
            .as_ref()
            .is_some_and(|active| active.profile() == &profile)
        {
            tracing::debug!(channel = %profile.channel_name, "Profile unchanged; keeping subscription");
            return;
        }

        let previous = self
            .active
            .as_ref()
            .map(|active| active.channel_name().to_string());
        self.stop_active().await;
        // A different channel is a different session; its status starts clean.
        if previous.as_deref() != Some(profile.channel_name.as_str()) {
            self.status.reset();
        }
        tracing::info!(
            role = %identity.role(),
            channel = %profile.channel_name,
            subscriptions = profile.subscriptions.len(),
            "Starting realtime subscription"
        );
        match RealtimeSubscription::start_with_status(&self.ctx, profile, self.status.clone()) {
            Ok(subscription) => self.active = Some(subscription),
            Err(e) => self.status.record_error(e.to_string()),
        }
    }

    async fn on_app_state(&mut self, state: AppState) {
        match self.controller.on_signal(state) {
            LifecycleAction::Resume => {
                if let Some(active) = &self.active {
                    if let Err(e) = active.resume().await {
                        tracing::warn!(channel = %active.channel_name(), error = %e, "Resume failed");
                    }
                }
            }
            LifecycleAction::Noop => {
                tracing::debug!(state = ?state, "Lifecycle signal needs no action");
            }
        }
    }

    async fn stop_active(&mut self) {
        if let Some(active) = self.active.take() {
            let channel = active.channel_name().to_string();
            if let Err(e) = active.shutdown().await {
                tracing::warn!(channel = %channel, error = %e, "Subscription did not shut down cleanly");
            }
        }
    }
}
