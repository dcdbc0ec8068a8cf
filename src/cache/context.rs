//! Linking Context Module
//!
//! Cache handle bound to one stack of ambient link scopes. Every `set` made
//! through the context contributes the new entry's absolute expiration and
//! triggers to each link currently open on that stack.

use std::fmt::Debug;

use crate::cache::link::{EntryLink, EntryLinkScope, LinkScopeStack};
use crate::cache::options::CacheEntryOptions;
use crate::cache::store::MemoryCache;
use crate::error::Result;

/// One logical execution flow's view of the cache.
pub struct LinkingContext<V> {
    cache: MemoryCache<V>,
    scopes: LinkScopeStack,
}

impl<V> LinkingContext<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(cache: MemoryCache<V>) -> Self {
        Self {
            cache,
            scopes: LinkScopeStack::new(),
        }
    }

    /// Opens a scope around a fresh link. The link stays ambient until the
    /// returned guard is dropped or released.
    pub fn create_linking_scope(&self) -> EntryLinkScope {
        self.scopes.push()
    }

    /// The innermost open link, if any.
    pub fn current_link(&self) -> Option<EntryLink> {
        self.scopes.current()
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Stores `value` and contributes it to every open link it does not subscribe to.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: V,
        options: &CacheEntryOptions<V>,
    ) -> Result<V> {
        let ambient = self.scopes.ambient_links();
        self.cache
            .set_with_ambient(key.into(), value, options, &ambient)
    }

    /// Stores `value` with default options.
    pub fn insert(&self, key: impl Into<String>, value: V) -> Result<V> {
        self.set(key, value, &CacheEntryOptions::new())
    }

    /// Like [`set`](Self::set), with `link` contributed to as well.
    pub fn set_linked(
        &self,
        key: impl Into<String>,
        value: V,
        link: &EntryLink,
        options: &CacheEntryOptions<V>,
    ) -> Result<V> {
        let mut ambient = self.scopes.ambient_links();
        if !ambient.iter().any(|l| l.ptr_eq(link)) {
            ambient.insert(0, link.clone());
        }
        self.cache
            .set_with_ambient(key.into(), value, options, &ambient)
    }

    pub fn try_get(&self, key: &str) -> Option<V> {
        self.cache.try_get(key)
    }

    pub fn remove(&self, key: &str) {
        self.cache.remove(key)
    }

    pub fn cache(&self) -> &MemoryCache<V> {
        &self.cache
    }
}

impl<V> Debug for LinkingContext<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkingContext")
            .field("cache", &self.cache)
            .field("scope_depth", &self.scopes.depth())
            .finish()
    }
}
