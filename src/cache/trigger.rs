//! Expiration Trigger Module
//!
//! Pluggable signals that can expire an entry independently of time-based policies.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::clock::SystemClock;

/// Callback handed to [`ExpirationTrigger::register_callback`].
pub type TriggerCallback = Box<dyn FnOnce() + Send + 'static>;

// == Expiration Trigger ==
/// A boolean signal that marks entries expired once it fires.
///
/// The cache polls [`has_fired`](ExpirationTrigger::has_fired) on access and
/// during sweeps. Triggers that can push a notification report
/// [`is_active`](ExpirationTrigger::is_active) and accept callbacks, which lets
/// the cache evict an entry as soon as the trigger fires.
pub trait ExpirationTrigger: Debug + Send + Sync {
    /// True while the trigger can still deliver callbacks. False once fired,
    /// or for poll-only triggers.
    fn is_active(&self) -> bool;

    /// True once the trigger has fired.
    fn has_fired(&self) -> bool;

    /// Registers a callback invoked at most once, when the trigger fires.
    /// Triggers that already fired run the callback immediately.
    ///
    /// Dropping the returned registration unregisters the callback.
    fn register_callback(&self, callback: TriggerCallback) -> TriggerRegistration;
}

// == Trigger Registration ==
/// Keeps a trigger callback registered. Dropping it unregisters the callback.
#[must_use = "dropping the registration unregisters the callback"]
pub struct TriggerRegistration {
    unregister: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl TriggerRegistration {
    /// A registration that runs `unregister` when dropped.
    pub fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// A registration with nothing to undo.
    pub fn empty() -> Self {
        Self { unregister: None }
    }
}

impl Drop for TriggerRegistration {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl Debug for TriggerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerRegistration")
            .field("active", &self.unregister.is_some())
            .finish()
    }
}

/// Non-owning reference to a trigger, as held by entries and links.
pub(crate) type TriggerRef = Weak<dyn ExpirationTrigger>;

/// Reports whether a weakly held trigger fired. Dropped triggers never fire.
pub(crate) fn trigger_fired(trigger: &TriggerRef) -> bool {
    trigger.upgrade().is_some_and(|t| t.has_fired())
}

/// Appends `trigger` unless the same trigger is already present.
pub(crate) fn push_unique(triggers: &mut Vec<TriggerRef>, trigger: &TriggerRef) -> bool {
    if triggers.iter().any(|t| Weak::ptr_eq(t, trigger)) {
        return false;
    }
    triggers.push(trigger.clone());
    true
}

// == Manual Trigger ==
#[derive(Default)]
struct CallbackList {
    next_id: u64,
    callbacks: Vec<(u64, TriggerCallback)>,
}

/// Trigger fired explicitly by calling [`ManualTrigger::fire`].
#[derive(Default)]
pub struct ManualTrigger {
    fired: AtomicBool,
    poll_only: bool,
    callbacks: Arc<Mutex<CallbackList>>,
}

impl ManualTrigger {
    /// Creates a trigger that pushes callbacks when fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a trigger that is only ever polled; registered callbacks are dropped.
    pub fn poll_only() -> Self {
        Self {
            poll_only: true,
            ..Self::default()
        }
    }

    /// Fires the trigger. Only the first call has an effect.
    pub fn fire(&self) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        let callbacks = std::mem::take(&mut self.callbacks.lock().callbacks);
        debug!(callbacks = callbacks.len(), "manual trigger fired");
        for (_, callback) in callbacks {
            callback();
        }
    }

    /// Callbacks currently waiting for the trigger to fire.
    pub fn registered_callbacks(&self) -> usize {
        self.callbacks.lock().callbacks.len()
    }
}

impl Debug for ManualTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTrigger")
            .field("fired", &self.has_fired())
            .field("poll_only", &self.poll_only)
            .field("callbacks", &self.registered_callbacks())
            .finish()
    }
}

impl ExpirationTrigger for ManualTrigger {
    fn is_active(&self) -> bool {
        !self.poll_only && !self.has_fired()
    }

    fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    fn register_callback(&self, callback: TriggerCallback) -> TriggerRegistration {
        if self.poll_only {
            return TriggerRegistration::empty();
        }
        {
            let mut list = self.callbacks.lock();
            if !self.has_fired() {
                let id = list.next_id;
                list.next_id += 1;
                list.callbacks.push((id, callback));

                let list = Arc::downgrade(&self.callbacks);
                return TriggerRegistration::new(move || {
                    if let Some(list) = list.upgrade() {
                        list.lock().callbacks.retain(|(registered, _)| *registered != id);
                    }
                });
            }
        }
        callback();
        TriggerRegistration::empty()
    }
}

// == Time Trigger ==
/// Poll-only trigger that fires once its clock reaches a deadline.
#[derive(Debug)]
pub struct TimeTrigger {
    deadline: DateTime<Utc>,
    clock: Arc<dyn SystemClock>,
}

impl TimeTrigger {
    pub fn new(deadline: DateTime<Utc>, clock: Arc<dyn SystemClock>) -> Self {
        Self { deadline, clock }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }
}

impl ExpirationTrigger for TimeTrigger {
    fn is_active(&self) -> bool {
        false
    }

    fn has_fired(&self) -> bool {
        self.clock.utc_now() >= self.deadline
    }

    fn register_callback(&self, _callback: TriggerCallback) -> TriggerRegistration {
        TriggerRegistration::empty()
    }
}

// == Cancellation Trigger ==
/// Trigger that fires when a [`CancellationToken`] is cancelled.
///
/// Callbacks are pushed only when registered from within a tokio runtime;
/// outside one the trigger is poll-only.
#[derive(Debug, Clone, Default)]
pub struct CancellationTrigger {
    token: CancellationToken,
}

impl CancellationTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl ExpirationTrigger for CancellationTrigger {
    fn is_active(&self) -> bool {
        !self.token.is_cancelled() && tokio::runtime::Handle::try_current().is_ok()
    }

    fn has_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    fn register_callback(&self, callback: TriggerCallback) -> TriggerRegistration {
        if self.token.is_cancelled() {
            callback();
            return TriggerRegistration::empty();
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return TriggerRegistration::empty();
        };

        // The waiting task ends when either the trigger fires or the registration is dropped.
        let token = self.token.clone();
        let stop = CancellationToken::new();
        let stopped = stop.clone();
        handle.spawn(async move {
            let fired = tokio::select! {
                _ = token.cancelled() => true,
                _ = stopped.cancelled() => false,
            };
            if fired {
                callback();
            }
        });
        TriggerRegistration::new(move || stop.cancel())
    }
}
