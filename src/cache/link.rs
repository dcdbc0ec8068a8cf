//! Entry Link Module
//!
//! Links aggregate the tightest expiration constraint (soonest absolute
//! expiration, union of triggers) across the entries that contribute to them.
//! Entries that subscribe to a link re-read its aggregate on every access.
//!
//! Scopes make a link ambient for one logical execution context. They live on
//! a [`LinkScopeStack`], and releasing a scope merges its aggregate into the
//! scope below it.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::cache::trigger::{push_unique, trigger_fired, ExpirationTrigger, TriggerRef};

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct LinkAggregate {
    absolute_expiration: Option<DateTime<Utc>>,
    triggers: Vec<TriggerRef>,
}

struct LinkInner {
    id: u64,
    aggregate: Mutex<LinkAggregate>,
    version: AtomicU64,
}

// == Entry Link ==
/// Aggregation target for expiration constraints. Cloning yields another
/// handle to the same link.
#[derive(Clone)]
pub struct EntryLink {
    inner: Arc<LinkInner>,
}

impl EntryLink {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LinkInner {
                id: NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed),
                aggregate: Mutex::new(LinkAggregate::default()),
                version: AtomicU64::new(0),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Soonest absolute expiration contributed so far.
    pub fn absolute_expiration(&self) -> Option<DateTime<Utc>> {
        self.inner.aggregate.lock().absolute_expiration
    }

    /// Contributed triggers that are still alive.
    pub fn triggers(&self) -> Vec<Arc<dyn ExpirationTrigger>> {
        self.inner
            .aggregate
            .lock()
            .triggers
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Incremented every time a contribution tightens the aggregate.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    pub fn ptr_eq(&self, other: &EntryLink) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Merges an absolute expiration and triggers into the aggregate.
    /// Returns true if the aggregate changed.
    pub(crate) fn contribute(
        &self,
        absolute_expiration: Option<DateTime<Utc>>,
        triggers: &[TriggerRef],
    ) -> bool {
        let mut changed = false;
        {
            let mut aggregate = self.inner.aggregate.lock();
            if let Some(at) = absolute_expiration {
                if aggregate.absolute_expiration.map_or(true, |current| at < current) {
                    aggregate.absolute_expiration = Some(at);
                    changed = true;
                }
            }
            for trigger in triggers {
                changed |= push_unique(&mut aggregate.triggers, trigger);
            }
        }
        if changed {
            self.inner.version.fetch_add(1, Ordering::AcqRel);
        }
        changed
    }

    /// Merges this link's aggregate into `target`.
    pub fn merge_into(&self, target: &EntryLink) -> bool {
        if self.ptr_eq(target) {
            return false;
        }
        let (absolute_expiration, triggers) = self.snapshot();
        target.contribute(absolute_expiration, &triggers)
    }

    pub(crate) fn snapshot(&self) -> (Option<DateTime<Utc>>, Vec<TriggerRef>) {
        let aggregate = self.inner.aggregate.lock();
        (aggregate.absolute_expiration, aggregate.triggers.clone())
    }

    /// Evaluates the live aggregate against `now`.
    pub(crate) fn check_expired(&self, now: DateTime<Utc>) -> Option<LinkExpiry> {
        let aggregate = self.inner.aggregate.lock();
        if aggregate.absolute_expiration.is_some_and(|at| at <= now) {
            return Some(LinkExpiry::Deadline);
        }
        if aggregate.triggers.iter().any(trigger_fired) {
            return Some(LinkExpiry::Trigger);
        }
        None
    }

    pub(crate) fn downgrade(&self) -> WeakEntryLink {
        WeakEntryLink(Arc::downgrade(&self.inner))
    }
}

impl Default for EntryLink {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for EntryLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let aggregate = self.inner.aggregate.lock();
        f.debug_struct("EntryLink")
            .field("id", &self.inner.id)
            .field("absolute_expiration", &aggregate.absolute_expiration)
            .field("triggers", &aggregate.triggers.len())
            .field("version", &self.version())
            .finish()
    }
}

/// Why a link reports its subscribers expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkExpiry {
    Deadline,
    Trigger,
}

/// Subscription handle held by entries. A dropped link imposes no constraint.
#[derive(Clone)]
pub(crate) struct WeakEntryLink(Weak<LinkInner>);

impl WeakEntryLink {
    pub(crate) fn upgrade(&self) -> Option<EntryLink> {
        self.0.upgrade().map(|inner| EntryLink { inner })
    }
}

// == Scope Stack ==
struct ScopeFrame {
    id: u64,
    link: EntryLink,
}

/// Ambient stack of active link scopes for one logical execution context.
#[derive(Clone, Default)]
pub struct LinkScopeStack {
    frames: Arc<Mutex<Vec<ScopeFrame>>>,
}

impl LinkScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a scope around a fresh link and returns its guard.
    pub fn push(&self) -> EntryLinkScope {
        let link = EntryLink::new();
        let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        let parent = {
            let mut frames = self.frames.lock();
            let parent = frames.last().map(|f| f.link.clone());
            frames.push(ScopeFrame {
                id,
                link: link.clone(),
            });
            parent
        };
        debug!(scope = id, link = link.id(), "link scope opened");
        EntryLinkScope {
            id,
            link,
            parent,
            stack: Arc::downgrade(&self.frames),
            released: false,
        }
    }

    /// Innermost active link.
    pub fn current(&self) -> Option<EntryLink> {
        self.frames.lock().last().map(|f| f.link.clone())
    }

    /// Active links, innermost first.
    pub fn ambient_links(&self) -> Vec<EntryLink> {
        self.frames
            .lock()
            .iter()
            .rev()
            .map(|f| f.link.clone())
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }
}

// == Entry Link Scope ==
/// Guard that keeps a link ambient until dropped or released.
pub struct EntryLinkScope {
    id: u64,
    link: EntryLink,
    parent: Option<EntryLink>,
    stack: Weak<Mutex<Vec<ScopeFrame>>>,
    released: bool,
}

impl EntryLinkScope {
    /// The link this scope aggregates into.
    pub fn link(&self) -> &EntryLink {
        &self.link
    }

    /// The link that was ambient when this scope opened.
    pub fn parent_link(&self) -> Option<&EntryLink> {
        self.parent.as_ref()
    }

    /// Pops the scope. Idempotent.
    ///
    /// The scope is located by identity. Scopes still open above it are popped
    /// with it; each popped link merges into the one below, and the last into
    /// whichever link is ambient afterwards.
    pub fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        let Some(stack) = self.stack.upgrade() else {
            return;
        };
        let mut frames = stack.lock();
        let Some(pos) = frames.iter().position(|f| f.id == self.id) else {
            return;
        };
        let popped = frames.split_off(pos);
        for pair in popped.windows(2).rev() {
            pair[1].link.merge_into(&pair[0].link);
        }
        if let Some(top) = frames.last() {
            if self.link.merge_into(&top.link) {
                debug!(from = self.link.id(), into = top.link.id(), "link aggregate bubbled");
            }
        }
        debug!(scope = self.id, popped = popped.len(), "link scope released");
    }
}

impl Drop for EntryLinkScope {
    fn drop(&mut self) {
        self.release();
    }
}

impl Debug for EntryLinkScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryLinkScope")
            .field("id", &self.id)
            .field("link", &self.link.id())
            .field("released", &self.released)
            .finish()
    }
}
