//! Integration Tests for Entry Links
//!
//! Links collect expiration constraints from the entries stored while they are
//! ambient, and entries subscribing to a link expire with it.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use linkcache::cache::ManualTrigger;
use linkcache::{
    CacheEntryOptions, EntryLink, ExpirationTrigger, MemoryCache, MemoryCacheOptions,
    SystemClock, TestClock,
};

// == Helper Functions ==

fn create_cache(clock: &Arc<TestClock>) -> MemoryCache<&'static str> {
    MemoryCache::new(
        MemoryCacheOptions::default()
            .with_clock(clock.clone())
            .with_compact_on_memory_pressure(false),
    )
}

fn trigger() -> (Arc<ManualTrigger>, Arc<dyn ExpirationTrigger>) {
    let manual = Arc::new(ManualTrigger::new());
    let as_dyn: Arc<dyn ExpirationTrigger> = manual.clone();
    (manual, as_dyn)
}

// == Explicit Links ==

#[test]
fn test_set_with_link_populates_triggers() {
    let clock = Arc::new(TestClock::new());
    let cache = create_cache(&clock);
    let link = EntryLink::new();
    let (_manual, t) = trigger();

    cache
        .set_linked(
            "myKey",
            "value",
            &link,
            &CacheEntryOptions::new().add_expiration_trigger(t),
        )
        .unwrap();

    assert_eq!(link.triggers().len(), 1);
    assert!(link.absolute_expiration().is_none());
}

#[test]
fn test_set_with_link_populates_absolute_expiration() {
    let clock = Arc::new(TestClock::new());
    let cache = create_cache(&clock);
    let link = EntryLink::new();
    let time = Utc.with_ymd_and_hms(2051, 1, 1, 1, 1, 1).unwrap();

    cache
        .set_linked(
            "myKey",
            "value",
            &link,
            &CacheEntryOptions::new().set_absolute_expiration(time).unwrap(),
        )
        .unwrap();

    assert!(link.triggers().is_empty());
    assert_eq!(link.absolute_expiration(), Some(time));
}

#[test]
fn test_trigger_expires_linked_entry() {
    let clock = Arc::new(TestClock::new());
    let cache = create_cache(&clock);
    let link = EntryLink::new();
    let (manual, t) = trigger();

    cache
        .set_linked(
            "myKey",
            "value",
            &link,
            &CacheEntryOptions::new().add_expiration_trigger(t),
        )
        .unwrap();
    cache
        .set("myKey1", "value", &CacheEntryOptions::new().add_entry_link(&link))
        .unwrap();

    assert_eq!(cache.try_get("myKey"), Some("value"));
    assert_eq!(cache.try_get("myKey1"), Some("value"));

    manual.fire();

    assert!(cache.try_get("myKey1").is_none());
    assert!(cache.try_get("myKey").is_none());
}

#[test]
fn test_absolute_expiration_works_across_link() {
    let clock = Arc::new(TestClock::new());
    let cache = create_cache(&clock);
    let link = EntryLink::new();

    cache
        .set_linked(
            "myKey",
            "value",
            &link,
            &CacheEntryOptions::new()
                .set_absolute_expiration_relative_to_now(Duration::seconds(5))
                .unwrap(),
        )
        .unwrap();
    cache
        .set("myKey1", "value", &CacheEntryOptions::new().add_entry_link(&link))
        .unwrap();

    assert_eq!(cache.try_get("myKey"), Some("value"));
    assert_eq!(cache.try_get("myKey1"), Some("value"));

    clock.add(Duration::seconds(10));

    assert!(cache.try_get("myKey1").is_none());
    assert!(cache.try_get("myKey").is_none());
}

#[test]
fn test_subscriber_sees_later_contributions() {
    let clock = Arc::new(TestClock::new());
    let cache = create_cache(&clock);
    let link = EntryLink::new();

    cache
        .set("subscriber", "value", &CacheEntryOptions::new().add_entry_link(&link))
        .unwrap();
    cache
        .set_linked(
            "late",
            "value",
            &link,
            &CacheEntryOptions::new()
                .set_absolute_expiration_relative_to_now(Duration::seconds(5))
                .unwrap(),
        )
        .unwrap();

    clock.add(Duration::seconds(5));
    assert!(cache.try_get("subscriber").is_none());
}

#[test]
fn test_dropped_link_imposes_no_constraint() {
    let clock = Arc::new(TestClock::new());
    let cache = create_cache(&clock);
    let link = EntryLink::new();
    let options = CacheEntryOptions::new().add_entry_link(&link);

    cache.set("myKey", "value", &options).unwrap();
    drop(options);
    drop(link);

    clock.add(Duration::days(365));
    assert_eq!(cache.try_get("myKey"), Some("value"));
}

// == Linking Scopes ==

#[test]
fn test_implicit_link_populates_triggers() {
    let clock = Arc::new(TestClock::new());
    let cache = create_cache(&clock);
    let ctx = cache.linking_context();
    let (_manual, t) = trigger();

    assert!(ctx.current_link().is_none());
    let link = {
        let scope = ctx.create_linking_scope();
        assert!(ctx.current_link().unwrap().ptr_eq(scope.link()));
        ctx.set("myKey", "value", &CacheEntryOptions::new().add_expiration_trigger(t))
            .unwrap();
        scope.link().clone()
    };
    assert!(ctx.current_link().is_none());

    assert_eq!(link.triggers().len(), 1);
    assert!(link.absolute_expiration().is_none());

    ctx.set("myKey1", "value", &CacheEntryOptions::new().add_entry_link(&link))
        .unwrap();
    assert_eq!(ctx.try_get("myKey1"), Some("value"));
}

#[test]
fn test_link_scopes_can_nest() {
    let clock = Arc::new(TestClock::new());
    let cache = create_cache(&clock);
    let ctx = cache.linking_context();
    let (_manual, t) = trigger();

    let (link1, link2) = {
        let outer = ctx.create_linking_scope();
        assert!(ctx.current_link().unwrap().ptr_eq(outer.link()));
        let link2 = {
            let inner = ctx.create_linking_scope();
            assert!(ctx.current_link().unwrap().ptr_eq(inner.link()));
            ctx.set("myKey", "value", &CacheEntryOptions::new().add_expiration_trigger(t))
                .unwrap();
            inner.link().clone()
        };
        assert!(ctx.current_link().unwrap().ptr_eq(outer.link()));
        (outer.link().clone(), link2)
    };
    assert!(ctx.current_link().is_none());

    // Every open scope sees the entry, so the outer link carries the trigger too.
    assert_eq!(link1.triggers().len(), 1);
    assert!(link1.absolute_expiration().is_none());
    assert_eq!(link2.triggers().len(), 1);
    assert!(link2.absolute_expiration().is_none());

    cache
        .set("myKey1", "value", &CacheEntryOptions::new().add_entry_link(&link2))
        .unwrap();
}

#[test]
fn test_nested_link_scopes_can_aggregate() {
    let clock = Arc::new(TestClock::new());
    let cache = create_cache(&clock);
    let ctx = cache.linking_context();
    let (_manual2, trigger2) = trigger();
    let (_manual3, trigger3) = trigger();

    let (link1, link2) = {
        let outer = ctx.create_linking_scope();
        let link1 = outer.link().clone();
        ctx.set("myKey1", "value", &CacheEntryOptions::new().add_entry_link(&link1))
            .unwrap();

        let link2 = {
            let inner = ctx.create_linking_scope();
            let link2 = inner.link().clone();
            ctx.set(
                "myKey2",
                "value",
                &CacheEntryOptions::new()
                    .add_expiration_trigger(trigger2)
                    .set_absolute_expiration_relative_to_now(Duration::seconds(10))
                    .unwrap()
                    .add_entry_link(&link2),
            )
            .unwrap();
            ctx.set(
                "myKey3",
                "value",
                &CacheEntryOptions::new()
                    .add_expiration_trigger(trigger3)
                    .set_absolute_expiration_relative_to_now(Duration::seconds(15))
                    .unwrap(),
            )
            .unwrap();
            link2
        };
        (link1, link2)
    };

    assert_eq!(link1.triggers().len(), 2);
    assert_eq!(
        link1.absolute_expiration(),
        Some(clock.utc_now() + Duration::seconds(10))
    );

    assert_eq!(link2.triggers().len(), 1);
    assert_eq!(
        link2.absolute_expiration(),
        Some(clock.utc_now() + Duration::seconds(15))
    );

    cache
        .set("myKey1", "value", &CacheEntryOptions::new().add_entry_link(&link2))
        .unwrap();
}

#[test]
fn test_subscriber_does_not_contribute_to_its_own_link() {
    let clock = Arc::new(TestClock::new());
    let cache = create_cache(&clock);
    let ctx = cache.linking_context();
    let scope = ctx.create_linking_scope();

    ctx.set(
        "self",
        "value",
        &CacheEntryOptions::new()
            .set_absolute_expiration_relative_to_now(Duration::seconds(5))
            .unwrap()
            .add_entry_link(scope.link()),
    )
    .unwrap();

    assert!(scope.link().absolute_expiration().is_none());
}

#[test]
fn test_scope_release_expires_outer_subscriber() {
    let clock = Arc::new(TestClock::new());
    let cache = create_cache(&clock);
    let ctx = cache.linking_context();
    let (manual, t) = trigger();

    let outer = ctx.create_linking_scope();
    assert_eq!(ctx.scope_depth(), 1);
    {
        let _inner = ctx.create_linking_scope();
        ctx.set("leaf", "value", &CacheEntryOptions::new().add_expiration_trigger(t))
            .unwrap();
    }
    cache
        .set(
            "parent",
            "value",
            &CacheEntryOptions::new().add_entry_link(outer.link()),
        )
        .unwrap();

    assert_eq!(cache.try_get("parent"), Some("value"));
    manual.fire();
    assert!(cache.try_get("parent").is_none());
}
