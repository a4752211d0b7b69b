//! Async driver for the session lifecycle.
//!
//! One task owns the `SessionMachine` and multiplexes every trigger source
//! (identity events, slot changes, the periodic check, the settle window,
//! the auto-expiry deadline, commands from the UI) through a single
//! `select!`, so checks and teardowns are strictly serialized. The session
//! is published through a `watch` channel; observers never mutate it.

use std::future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::identity::{IdentityEvent, IdentityError, IdentityProvider, IdentityState};
use super::machine::{CheckOutcome, CheckTrigger, Effect, LifecycleConfig, SessionMachine};
use super::session::Session;
use crate::slot::{CredentialSlot, SlotWatcher};

/// Buffer size for UI commands. Commands are rare and tiny.
const COMMAND_BUFFER_SIZE: usize = 8;

#[derive(Debug)]
enum Command {
    SignOut,
    CredentialStored,
    Check,
    Shutdown,
}

/// Builder for the lifecycle task.
pub struct SessionManager {
    config: LifecycleConfig,
    slot: Arc<dyn CredentialSlot>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(
        config: LifecycleConfig,
        slot: Arc<dyn CredentialSlot>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            slot,
            identity,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn the lifecycle task. Must be called inside a tokio runtime.
    pub fn start(self) -> SessionHandle {
        let (state_tx, state_rx) = watch::channel(Session::loading());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);

        // Subscribe before the task starts so no early event is missed.
        let identity_events = self.identity.subscribe();
        let slot_watcher = self.slot.watch();

        let driver = Driver {
            machine: SessionMachine::new(self.config),
            slot: self.slot,
            identity: self.identity,
            clock: self.clock,
            state_tx,
            revocations: JoinSet::new(),
        };
        let task = tokio::spawn(driver.run(command_rx, identity_events, slot_watcher));
        info!("Session lifecycle started");

        SessionHandle {
            commands: command_tx,
            state: state_rx,
            task: Some(task),
        }
    }
}

/// Owner of a running lifecycle. Dropping it stops the task.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<Session>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Latest published session. Never blocks.
    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.clone()
    }

    /// Read-only view that can be handed to UI code.
    pub fn observer(&self) -> SessionObserver {
        SessionObserver {
            state: self.state.clone(),
        }
    }

    /// Invoke `callback` with the current session and then on every change.
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&Session) + Send + 'static,
    {
        self.observer().on_change(callback)
    }

    /// Explicit sign-out (nav bar "Logout").
    pub async fn sign_out(&self) {
        self.send(Command::SignOut).await;
    }

    /// The credential exchange stored a token in this context; stop waiting
    /// for the settle delay.
    pub async fn credential_stored(&self) {
        self.send(Command::CredentialStored).await;
    }

    pub async fn check_now(&self) {
        self.send(Command::Check).await;
    }

    /// Stop the lifecycle and wait until every timer and listener is released.
    pub async fn shutdown(mut self) {
        self.send(Command::Shutdown).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Session lifecycle task failed");
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    async fn send(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            debug!("Session lifecycle already stopped");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Cloneable read-only access to the session.
#[derive(Clone)]
pub struct SessionObserver {
    state: watch::Receiver<Session>,
}

impl SessionObserver {
    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.clone()
    }

    pub fn on_change<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(&Session) + Send + 'static,
    {
        let mut rx = self.state.clone();
        let task = tokio::spawn(async move {
            loop {
                let session = rx.borrow_and_update().clone();
                callback(&session);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });
        Subscription { task: Some(task) }
    }
}

/// Callback registration; unsubscribes on drop.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.abort();
    }
}

struct Driver {
    machine: SessionMachine,
    slot: Arc<dyn CredentialSlot>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    state_tx: watch::Sender<Session>,
    revocations: JoinSet<Result<(), IdentityError>>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut identity_events: broadcast::Receiver<IdentityEvent>,
        mut slot_watcher: SlotWatcher,
    ) {
        // Pick up whatever the provider already knows.
        match self.identity.state() {
            IdentityState::SignedIn(principal) => {
                self.machine.on_signed_in(principal, self.clock.now())
            }
            IdentityState::SignedOut => self.machine.on_signed_out(),
            IdentityState::Unknown => debug!("Waiting for identity provider"),
        }
        self.apply();

        let period = self.machine.config().check_interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut identity_open = true;

        loop {
            let settle_at = self.machine.settle_deadline().map(|at| self.deadline(at));
            let logout_at = self.machine.logout_deadline().map(|at| self.deadline(at));

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::SignOut) => self.machine.on_sign_out_requested(),
                    Some(Command::CredentialStored) => self.check(CheckTrigger::Acknowledged),
                    Some(Command::Check) => self.check(CheckTrigger::Manual),
                    Some(Command::Shutdown) | None => break,
                },
                event = identity_events.recv(), if identity_open => match event {
                    Ok(IdentityEvent::SignedIn(principal)) => {
                        self.machine.on_signed_in(principal, self.clock.now())
                    }
                    Ok(IdentityEvent::SignedOut) => self.machine.on_signed_out(),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed identity events, resyncing");
                        match self.identity.state() {
                            IdentityState::SignedIn(principal) => {
                                self.machine.on_signed_in(principal, self.clock.now())
                            }
                            IdentityState::SignedOut => self.machine.on_signed_out(),
                            IdentityState::Unknown => {}
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("Identity provider stopped sending events");
                        identity_open = false;
                    }
                },
                change = slot_watcher.changed(), if !slot_watcher.is_closed() => {
                    if let Some(change) = change {
                        debug!(present = change.present, "Credential slot changed elsewhere");
                        self.check(CheckTrigger::SlotChanged);
                    }
                },
                _ = ticker.tick() => {
                    if self.machine.wants_periodic_check() {
                        self.check(CheckTrigger::Periodic);
                    }
                },
                _ = sleep_until(settle_at) => self.check(CheckTrigger::SettleElapsed),
                _ = sleep_until(logout_at) => self.machine.on_logout_due(),
                Some(joined) = self.revocations.join_next() => match joined {
                    Ok(Ok(())) => debug!("Identity session revoked"),
                    Ok(Err(e)) => warn!(error = %e, "Identity revoke failed, session already cleared"),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => warn!(error = %e, "Identity revoke task failed"),
                },
            }

            self.apply();
        }

        // Timers, listeners and in-flight revocations are dropped with `self`.
        self.revocations.abort_all();
        info!("Session lifecycle stopped");
    }

    fn check(&mut self, trigger: CheckTrigger) {
        let stored = match self.slot.get() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read credential slot, treating as absent");
                None
            }
        };
        let outcome = self.machine.check(stored.as_deref(), trigger, self.clock.now());
        match &outcome {
            CheckOutcome::Authenticated { logout_at } => {
                debug!(?trigger, %logout_at, "Credential valid, auto-logout armed")
            }
            CheckOutcome::Deferred => debug!(?trigger, "Credential check deferred"),
            CheckOutcome::TornDown(reason) => debug!(?trigger, ?reason, "Credential check failed"),
        }
    }

    /// Carry out pending effects and publish the session if it changed.
    fn apply(&mut self) {
        for effect in self.machine.drain_effects() {
            match effect {
                Effect::RevokeIdentity => {
                    let identity = Arc::clone(&self.identity);
                    self.revocations.spawn(async move { identity.sign_out().await });
                }
                Effect::ClearSlot => {
                    if let Err(e) = self.slot.clear() {
                        warn!(error = %e, "Failed to clear credential slot");
                    }
                }
            }
        }

        let session = self.machine.session();
        self.state_tx.send_if_modified(|current| {
            if current == session {
                false
            } else {
                *current = session.clone();
                true
            }
        });
    }

    /// Map a wall-clock instant onto the tokio timer wheel.
    fn deadline(&self, at: DateTime<Utc>) -> Instant {
        let wait = (at - self.clock.now()).to_std().unwrap_or_default();
        Instant::now() + wait
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use futures::future::{BoxFuture, FutureExt};

    use super::*;
    use crate::auth::clock::TokioClock;
    use crate::auth::credential::tests::token_expiring_at;
    use crate::auth::identity::LocalIdentityProvider;
    use crate::auth::session::{Principal, SessionStatus};
    use crate::slot::{MemorySlot, MemoryStore};

    const T0: i64 = 1_700_000_000;

    struct Harness {
        handle: SessionHandle,
        identity: Arc<LocalIdentityProvider>,
        /// Another context (tab) on the same store.
        other_tab: MemorySlot,
        /// The manager's own context.
        own_slot: Arc<MemorySlot>,
    }

    fn start_with(identity: LocalIdentityProvider, token: Option<String>) -> Harness {
        let store = MemoryStore::new();
        let other_tab = store.context();
        if let Some(token) = token {
            other_tab.set(&token).unwrap();
        }
        let own_slot = Arc::new(store.context());
        let identity = Arc::new(identity);
        let clock = TokioClock::starting_at(DateTime::from_timestamp(T0, 0).unwrap());

        let handle = SessionManager::new(
            LifecycleConfig::default(),
            own_slot.clone(),
            identity.clone(),
        )
        .with_clock(Arc::new(clock))
        .start();

        Harness {
            handle,
            identity,
            other_tab,
            own_slot,
        }
    }

    async fn advance_ms(ms: u64) {
        time::sleep(Duration::from_millis(ms)).await;
    }

    fn status(h: &Harness) -> SessionStatus {
        h.handle.current().status
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_loading_until_provider_reports() {
        let h = start_with(LocalIdentityProvider::new(), Some(token_expiring_at(T0 + 3600)));

        advance_ms(30_000).await;
        assert_eq!(status(&h), SessionStatus::Loading);

        h.identity.sign_in(Principal::new("uid-1"));
        advance_ms(600).await;
        assert_eq!(status(&h), SessionStatus::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_out_provider_resolves_unauthenticated() {
        let h = start_with(LocalIdentityProvider::signed_out(), Some(token_expiring_at(T0 + 3600)));

        advance_ms(10).await;
        assert_eq!(status(&h), SessionStatus::Unauthenticated);
        assert_eq!(h.other_tab.get().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticates_after_settle_delay() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 3600)),
        );

        advance_ms(400).await;
        assert_eq!(status(&h), SessionStatus::Loading);

        advance_ms(200).await;
        let session = h.handle.current();
        assert_eq!(session.status, SessionStatus::Authenticated);
        assert_eq!(session.principal.map(|p| p.uid), Some("uid-1".to_string()));
        assert!(session.credential.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_expiry_fires_before_deadline() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 10)),
        );

        advance_ms(600).await;
        assert_eq!(status(&h), SessionStatus::Authenticated);

        // Fires at T0 + 10s - 5s skew.
        advance_ms(4_300).await;
        assert_eq!(status(&h), SessionStatus::Authenticated);
        advance_ms(200).await;
        assert_eq!(status(&h), SessionStatus::Unauthenticated);
        assert_eq!(h.other_tab.get().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_credential_within_settle_window() {
        let h = start_with(LocalIdentityProvider::signed_in(Principal::new("uid-1")), None);

        advance_ms(400).await;
        h.other_tab.set(&token_expiring_at(T0 + 3600)).unwrap();
        assert_eq!(status(&h), SessionStatus::Loading);

        advance_ms(150).await;
        assert_eq!(status(&h), SessionStatus::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_after_settle_tears_down() {
        let h = start_with(LocalIdentityProvider::signed_in(Principal::new("uid-1")), None);

        advance_ms(450).await;
        assert_eq!(status(&h), SessionStatus::Loading);

        advance_ms(100).await;
        assert_eq!(status(&h), SessionStatus::Unauthenticated);
        assert_eq!(
            h.identity.state(),
            IdentityState::SignedOut,
            "teardown revokes the identity session"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_tab_sign_out_converges() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 3600)),
        );
        advance_ms(600).await;
        assert_eq!(status(&h), SessionStatus::Authenticated);

        h.other_tab.clear().unwrap();
        advance_ms(1).await;
        assert_eq!(status(&h), SessionStatus::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_tab_sign_out_during_principal_refresh() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 3600)),
        );
        advance_ms(600).await;
        assert_eq!(status(&h), SessionStatus::Authenticated);

        h.identity
            .sign_in(Principal::new("uid-1").with_email("owner@example.com"));
        advance_ms(1).await;
        assert_eq!(status(&h), SessionStatus::Authenticated);

        h.other_tab.clear().unwrap();
        advance_ms(1).await;
        assert_eq!(h.handle.current(), Session::unauthenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoke_echo_does_not_clear_fresh_credential() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 3600)),
        );
        advance_ms(600).await;

        h.handle.sign_out().await;
        advance_ms(1).await;
        assert_eq!(h.identity.state(), IdentityState::SignedOut);

        // A later sign-in elsewhere stores a new credential; the revoke echo
        // already ran and nothing clears it again.
        let fresh = token_expiring_at(T0 + 7200);
        h.other_tab.set(&fresh).unwrap();
        advance_ms(6_000).await;
        assert_eq!(h.other_tab.get().unwrap(), Some(fresh));
        assert_eq!(status(&h), SessionStatus::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_tab_garbage_converges() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 3600)),
        );
        advance_ms(600).await;

        h.other_tab.set("not.a.jwt").unwrap();
        advance_ms(1).await;
        assert_eq!(status(&h), SessionStatus::Unauthenticated);
        assert_eq!(h.other_tab.get().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_tab_refresh_moves_deadline() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 10)),
        );
        advance_ms(600).await;

        h.other_tab.set(&token_expiring_at(T0 + 3600)).unwrap();
        advance_ms(10_000).await;
        assert_eq!(status(&h), SessionStatus::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_check_catches_silent_removal() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 3600)),
        );
        advance_ms(600).await;

        // A write from the manager's own context is not announced to it.
        h.own_slot.clear().unwrap();
        advance_ms(1_000).await;
        assert_eq!(status(&h), SessionStatus::Authenticated);

        advance_ms(4_000).await;
        assert_eq!(status(&h), SessionStatus::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_sign_out_tears_down() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 3600)),
        );
        advance_ms(600).await;

        h.identity.sign_out_now();
        advance_ms(1).await;
        assert_eq!(h.handle.current(), Session::unauthenticated());
        assert_eq!(h.other_tab.get().unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_sign_out() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 3600)),
        );
        advance_ms(600).await;

        h.handle.sign_out().await;
        advance_ms(1).await;
        assert_eq!(status(&h), SessionStatus::Unauthenticated);
        assert_eq!(h.identity.state(), IdentityState::SignedOut);
        assert_eq!(h.other_tab.get().unwrap(), None);

        // Nothing resurrects the session without a new sign-in.
        h.other_tab.set(&token_expiring_at(T0 + 3600)).unwrap();
        advance_ms(6_000).await;
        assert_eq!(status(&h), SessionStatus::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledgement_skips_settle_delay() {
        let h = start_with(LocalIdentityProvider::signed_in(Principal::new("uid-1")), None);

        advance_ms(50).await;
        h.own_slot.set(&token_expiring_at(T0 + 3600)).unwrap();
        h.handle.credential_stored().await;
        advance_ms(1).await;
        assert_eq!(status(&h), SessionStatus::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sign_in_after_teardown_authenticates_again() {
        let h = start_with(LocalIdentityProvider::signed_out(), None);
        advance_ms(10).await;
        assert_eq!(status(&h), SessionStatus::Unauthenticated);

        h.identity.sign_in(Principal::new("uid-2"));
        h.other_tab.set(&token_expiring_at(T0 + 3600)).unwrap();
        advance_ms(600).await;
        assert_eq!(status(&h), SessionStatus::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_change_reports_transitions() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 10)),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = h.handle.on_change(move |s| {
            let mut seen = sink.lock().unwrap();
            if seen.last() != Some(&s.status) {
                seen.push(s.status);
            }
        });

        advance_ms(6_000).await;
        subscription.unsubscribe();
        h.identity.sign_in(Principal::new("uid-1"));
        h.other_tab.set(&token_expiring_at(T0 + 3600)).unwrap();
        advance_ms(1_000).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                SessionStatus::Loading,
                SessionStatus::Authenticated,
                SessionStatus::Unauthenticated,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_checks_do_not_notify() {
        let h = start_with(
            LocalIdentityProvider::signed_in(Principal::new("uid-1")),
            Some(token_expiring_at(T0 + 3600)),
        );
        advance_ms(600).await;

        let mut rx = h.handle.subscribe();
        rx.borrow_and_update();
        h.handle.check_now().await;
        h.handle.check_now().await;
        advance_ms(11_000).await;

        assert!(!rx.has_changed().unwrap());
        assert_eq!(status(&h), SessionStatus::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_settle_releases_everything() {
        let h = start_with(LocalIdentityProvider::signed_in(Principal::new("uid-1")), None);
        let observer = h.handle.observer();
        let mut rx = observer.subscribe();

        advance_ms(100).await;
        h.handle.shutdown().await;

        // The sender side is gone with the task.
        while rx.changed().await.is_ok() {}
        assert_eq!(observer.current().status, SessionStatus::Loading);
        // Unmounting is not a sign-out.
        assert_eq!(h.identity.state(), IdentityState::SignedIn(Principal::new("uid-1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_task() {
        let h = start_with(LocalIdentityProvider::new(), None);
        let observer = h.handle.observer();
        let mut rx = observer.subscribe();

        drop(h.handle);
        advance_ms(1).await;
        while rx.changed().await.is_ok() {}
        assert!(rx.has_changed().is_err());
    }

    /// Provider whose revoke always fails.
    struct FailingRevoke {
        inner: LocalIdentityProvider,
    }

    impl IdentityProvider for FailingRevoke {
        fn state(&self) -> IdentityState {
            self.inner.state()
        }

        fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
            self.inner.subscribe()
        }

        fn sign_out(&self) -> BoxFuture<'_, Result<(), IdentityError>> {
            async { Err::<(), _>(IdentityError::RevokeFailed("network down".to_string())) }.boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoke_failure_still_unauthenticates() {
        let store = MemoryStore::new();
        let other_tab = store.context();
        other_tab.set(&token_expiring_at(T0 + 3600)).unwrap();
        let identity = Arc::new(FailingRevoke {
            inner: LocalIdentityProvider::signed_in(Principal::new("uid-1")),
        });
        let handle = SessionManager::new(
            LifecycleConfig::default(),
            Arc::new(store.context()),
            identity,
        )
        .with_clock(Arc::new(TokioClock::starting_at(
            DateTime::from_timestamp(T0, 0).unwrap(),
        )))
        .start();

        advance_ms(600).await;
        assert_eq!(handle.current().status, SessionStatus::Authenticated);

        handle.sign_out().await;
        advance_ms(10).await;
        assert_eq!(handle.current().status, SessionStatus::Unauthenticated);
        assert_eq!(other_tab.get().unwrap(), None);
        assert!(handle.is_running());
    }
}
