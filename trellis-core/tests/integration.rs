//! Integration Tests for the Cache
//!
//! These tests drive the public API end to end: normalization, selector
//! reads, staleness, watchers, batching, the optimistic overlay and garbage
//! collection working together.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde_json::json;

use trellis_core::{
    Cache, CacheConfig, DeleteOptions, EntityKey, Error, Expiry, FieldConfig, InvalidateOptions,
    ManualClock, ObjectType, ReadOptions, ReadResult, Schema, Subscription, Value, ValueType,
    WriteOptions,
};

fn schema() -> Schema {
    Schema::new()
        .with(
            ObjectType::named("User")
                .field("id", ValueType::string())
                .field("name", ValueType::string())
                .field("friend", "User"),
        )
        .unwrap()
        .with(
            ObjectType::named("Comment")
                .field("id", ValueType::string())
                .field("text", ValueType::string())
                .field("author", "User"),
        )
        .unwrap()
        .with(
            ObjectType::named("Post")
                .field("id", ValueType::string())
                .field("title", ValueType::string())
                .field("author", "User")
                .field("comments", ValueType::array("Comment"))
                .field("tags", ValueType::array(ValueType::string()))
                .field(
                    "log",
                    FieldConfig::new()
                        .ty(ValueType::array(ValueType::string()))
                        .write(|incoming, existing| {
                            let mut merged = existing.and_then(Value::as_array).cloned().unwrap_or_default();
                            merged.extend(incoming.as_array().cloned().unwrap_or_default());
                            Value::Array(merged)
                        }),
                ),
        )
        .unwrap()
        .with(
            ObjectType::named("Node")
                .field("id", ValueType::string())
                .field("child", "Node"),
        )
        .unwrap()
}

fn cache() -> Cache {
    Cache::with_clock(schema(), CacheConfig::default(), ManualClock::new(0))
}

fn post(id: &str) -> ReadOptions {
    ReadOptions::new("Post").id(id)
}

/// Count notifications and remember the latest `(new, previous)` staleness.
struct Recorder {
    calls: Rc<Cell<usize>>,
    last: Rc<RefCell<Option<(bool, bool)>>>,
    _subscription: Subscription,
}

fn record(cache: &mut Cache, options: ReadOptions) -> Recorder {
    let calls = Rc::new(Cell::new(0));
    let last = Rc::new(RefCell::new(None));
    let (seen_calls, seen_last) = (calls.clone(), last.clone());
    let subscription = cache.watch(options, move |next: &ReadResult, previous: &ReadResult| {
        seen_calls.set(seen_calls.get() + 1);
        *seen_last.borrow_mut() = Some((next.stale, previous.stale));
    });
    Recorder {
        calls,
        last,
        _subscription: subscription,
    }
}

/// Test that nested entities are split out and read back through references.
#[test]
fn write_normalizes_and_read_denormalizes() {
    let mut cache = cache();
    let result = cache
        .write(WriteOptions::new(
            "Post",
            json!({
                "id": "1",
                "title": "Hello",
                "author": { "id": "u1", "name": "Ada" },
                "comments": [{ "id": "c1", "text": "First", "author": { "id": "u1" } }]
            }),
        ))
        .unwrap();

    assert_eq!(result.entity_id, Some(EntityKey::new("Post", "1")));
    assert!(result.invalid_fields.is_empty());
    assert_eq!(cache.len(false), 3);

    // The post stores a reference, not a copy.
    let stored = cache.get(&EntityKey::new("Post", "1"), false).unwrap();
    assert!(stored.value.get("author").unwrap().as_reference().is_some());

    let read = cache.read(&post("1").selector_text("{ title author { name } comments { text author { name } } }").unwrap());
    assert_eq!(
        read.data.unwrap(),
        json!({
            "title": "Hello",
            "author": { "name": "Ada" },
            "comments": [{ "text": "First", "author": { "name": "Ada" } }]
        })
    );
    assert!(!read.stale);
}

/// Test that a custom field merge function sees the previous value.
#[test]
fn custom_merge_combines_with_existing_value() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "log": ["created"] })))
        .unwrap();
    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "log": ["edited"] })))
        .unwrap();

    let read = cache.read(&post("1").selector_text("{ log }").unwrap());
    assert_eq!(read.data.unwrap(), json!({ "log": ["created", "edited"] }));

    // Everything else round-trips verbatim.
    let full = cache.read(&post("1"));
    assert_eq!(full.data.unwrap(), json!({ "id": "1", "log": ["created", "edited"] }));
}

/// Test that writes merge into existing entities rather than replacing them.
#[test]
fn partial_writes_keep_other_fields() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Hello", "tags": ["a"] })))
        .unwrap();
    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Bye" })))
        .unwrap();

    let read = cache.read(&post("1").selector_text("{ title tags }").unwrap());
    assert_eq!(read.data.unwrap(), json!({ "title": "Bye", "tags": ["a"] }));
}

/// Test that writing identical data twice notifies only once.
#[test]
fn identical_writes_do_not_renotify() {
    let mut cache = cache();
    let recorder = record(&mut cache, post("1").selector_text("{ title }").unwrap());
    let write = || WriteOptions::new("Post", json!({ "id": "1", "title": "Hello" }));

    cache.write(write()).unwrap();
    assert_eq!(recorder.calls.get(), 1);
    assert_eq!(*recorder.last.borrow(), Some((false, true)));

    cache.write(write()).unwrap();
    assert_eq!(recorder.calls.get(), 1);
}

/// Test that registering a watcher does not call it.
#[test]
fn watch_registration_is_silent() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Hello" })))
        .unwrap();
    let recorder = record(&mut cache, post("1"));
    assert_eq!(recorder.calls.get(), 0);
    assert_eq!(cache.watcher_count(), 1);
}

/// Test that a cyclic graph reads back as a self-referential structure.
#[test]
fn cyclic_graph_reads_without_looping() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new(
            "User",
            json!({ "id": "a", "name": "A", "friend": { "id": "b", "name": "B", "friend": { "id": "a" } } }),
        ))
        .unwrap();

    let read = cache.read(&ReadOptions::new("User").id("a"));
    let root = read.data.unwrap();
    let friend = root.get("friend").unwrap();
    assert_eq!(friend.get("name").unwrap().as_str(), Some("B"));
    assert!(friend.get("friend").unwrap().same_object(&root));

    // A selector bounds the walk by its depth instead.
    let bounded = cache.read(&ReadOptions::new("User").id("a").selector_text("{ friend { friend { name } } }").unwrap());
    assert_eq!(bounded.data.unwrap(), json!({ "friend": { "friend": { "name": "A" } } }));
}

/// Test that expiry makes results stale once the clock passes it.
#[test]
fn expired_fields_make_results_stale() {
    let clock = ManualClock::new(0);
    let mut cache = Cache::with_clock(schema(), CacheConfig::default(), clock.clone());
    cache
        .write(
            WriteOptions::new("Post", json!({ "id": "1", "title": "Hello", "author": { "id": "u1", "name": "Ada" } }))
                .expires_at(Expiry::PerType([("User".to_string(), 1_000)].into_iter().collect())),
        )
        .unwrap();

    let options = post("1").selector_text("{ title author { name } }").unwrap();
    let fresh = cache.read(&options);
    assert!(!fresh.stale);
    assert_eq!(fresh.expires_at, Some(1_000));

    clock.set(1_000);
    assert!(cache.read(&options).stale);

    // The post's own fields never expire.
    assert!(!cache.read(&post("1").selector_text("{ title }").unwrap()).stale);
}

/// Test that an expiry already in the past is stale immediately.
#[test]
fn past_expiry_is_stale_at_once() {
    let mut cache = Cache::with_clock(schema(), CacheConfig::default(), ManualClock::new(10_000));
    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Old" })).expires_at(Expiry::At(9_999)))
        .unwrap();
    assert!(cache.read(&post("1")).stale);

    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "New" })).expires_at(Expiry::At(70_000)))
        .unwrap();
    assert!(!cache.read(&post("1")).stale);
}

/// Test that the configured default time-to-live applies to plain writes.
#[test]
fn default_ttl_stamps_writes() {
    let config = CacheConfig {
        default_ttl_ms: Some(500),
        ..CacheConfig::default()
    };
    let mut cache = Cache::with_clock(schema(), config, ManualClock::new(100));
    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Hello" })))
        .unwrap();

    assert_eq!(cache.read(&post("1")).expires_at, Some(600));
}

/// Test that invalidating a referenced entity marks dependents stale and
/// that fresh data clears it again.
#[test]
fn invalidation_propagates_to_watchers() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new(
            "Post",
            json!({ "id": "1", "title": "Hello", "author": { "id": "u1", "name": "Ada" } }),
        ))
        .unwrap();
    let recorder = record(&mut cache, post("1").selector_text("{ title author { name } }").unwrap());

    cache
        .invalidate(InvalidateOptions::new("User").id("u1"))
        .unwrap();
    assert_eq!(recorder.calls.get(), 1);
    assert_eq!(*recorder.last.borrow(), Some((true, false)));

    let read = cache.read(&post("1").selector_text("{ title author { name } }").unwrap());
    assert!(read.invalidated);
    assert!(read.stale);
    // Data is still served.
    assert_eq!(read.data.unwrap(), json!({ "title": "Hello", "author": { "name": "Ada" } }));

    cache
        .write(WriteOptions::new("User", json!({ "id": "u1", "name": "Ada" })))
        .unwrap();
    assert_eq!(recorder.calls.get(), 2);
    assert_eq!(*recorder.last.borrow(), Some((false, true)));
}

/// Test that invalidating through a selector reaches nested entities.
#[test]
fn invalidate_with_selector_follows_references() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new(
            "Post",
            json!({ "id": "1", "title": "Hello", "author": { "id": "u1", "name": "Ada" } }),
        ))
        .unwrap();

    cache
        .invalidate(InvalidateOptions::new("Post").id("1").selector_text("{ author { name } }").unwrap())
        .unwrap();

    let user = cache.get(&EntityKey::new("User", "u1"), false).unwrap();
    assert!(user.is_invalidated("name"));
    assert!(cache.read(&ReadOptions::new("User").id("u1").selector_text("{ name }").unwrap()).invalidated);
    let post = cache.get(&EntityKey::new("Post", "1"), false).unwrap();
    assert!(!post.is_invalidated("title"));
}

/// Test that delete removes selected leaves or the whole entity.
#[test]
fn delete_removes_fields_and_entities() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new(
            "Post",
            json!({ "id": "1", "title": "Hello", "author": { "id": "u1", "name": "Ada" } }),
        ))
        .unwrap();

    cache
        .delete(DeleteOptions::new("Post").id("1").selector_text("{ author { name } }").unwrap())
        .unwrap();
    let read = cache.read(&post("1").selector_text("{ title author { name } }").unwrap());
    assert_eq!(read.data.unwrap(), json!({ "title": "Hello", "author": {} }));
    assert_eq!(read.missing_fields.len(), 1);

    cache.delete(DeleteOptions::new("Post").id("1")).unwrap();
    assert!(cache.get(&EntityKey::new("Post", "1"), false).is_none());
    assert!(cache.read(&post("1")).data.is_none());
}

/// Test the wildcard: present fields plus explicit sub-selections.
#[test]
fn wildcard_expands_to_present_fields() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new(
            "Post",
            json!({
                "id": "1",
                "title": "Hello",
                "comments": [{ "id": "c1", "text": "First", "author": { "id": "u1", "name": "Ada" } }]
            }),
        ))
        .unwrap();

    let read = cache.read(&post("1").selector_text("{ * comments { text } }").unwrap());
    assert_eq!(
        read.data.unwrap(),
        json!({ "id": "1", "title": "Hello", "comments": [{ "text": "First" }] })
    );
}

/// Test that several writes in one transaction produce one notification.
#[test]
fn transaction_batches_notifications() {
    let mut cache = cache();
    let recorder = record(&mut cache, post("1").selector_text("{ title tags }").unwrap());

    cache.transaction(|cache| {
        cache
            .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Hello" })))
            .unwrap();
        cache
            .write(WriteOptions::new("Post", json!({ "id": "1", "tags": ["a"] })))
            .unwrap();
        // Nothing delivered while the transaction is open.
        assert_eq!(recorder.calls.get(), 0);
    });

    assert_eq!(recorder.calls.get(), 1);
}

/// Test that silent mutations are never delivered on their own.
#[test]
fn silent_suppresses_notifications() {
    let mut cache = cache();
    let recorder = record(&mut cache, post("1"));

    cache.silent(|cache| {
        cache
            .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Hello" })))
            .unwrap();
    });
    assert_eq!(recorder.calls.get(), 0);

    // The data is there all the same.
    assert!(cache.read(&post("1")).data.is_some());
}

/// Test that an unsubscribed watcher is never called again.
#[test]
fn unsubscribe_stops_notifications() {
    let mut cache = cache();
    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    let subscription = cache.watch(post("1"), move |_, _| seen.set(seen.get() + 1));

    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Hello" })))
        .unwrap();
    assert_eq!(calls.get(), 1);

    subscription.unsubscribe();
    assert_eq!(cache.watcher_count(), 0);
    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Bye" })))
        .unwrap();
    assert_eq!(calls.get(), 1);
}

/// Test garbage collection roots: retains and what they reference survive.
#[test]
fn gc_keeps_only_reachable_entities() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new("Node", json!({ "id": "a", "child": { "id": "b" } })))
        .unwrap();
    cache
        .write(WriteOptions::new("Node", json!({ "id": "c" })))
        .unwrap();

    let retained = cache.retain(EntityKey::new("Node", "a"));
    assert_eq!(cache.retain_count(&EntityKey::new("Node", "a")), 1);

    let stats = cache.gc();
    assert_eq!(stats.removed, 1);
    let mut keys: Vec<String> = cache.keys(false).iter().map(|key| key.to_string()).collect();
    keys.sort();
    assert_eq!(keys, vec!["Node:a", "Node:b"]);

    drop(retained);
    cache
        .delete(DeleteOptions::new("Node").id("a").selector_text("{ child }").unwrap())
        .unwrap();
    cache.gc();
    assert!(cache.is_empty());
}

/// Test that a watcher's subject is a collection root.
#[test]
fn gc_keeps_watched_entities() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new("Node", json!({ "id": "a", "child": { "id": "b" } })))
        .unwrap();
    let subscription = cache.watch(ReadOptions::new("Node").id("a"), |_, _| {});

    cache.gc();
    assert_eq!(cache.len(false), 2);

    drop(subscription);
    cache.gc();
    assert_eq!(cache.len(false), 0);
}

fn append_tag(view: &mut trellis_core::OptimisticView<'_>) -> trellis_core::Result<()> {
    let key = EntityKey::new("Post", "1");
    let mut tags: Vec<String> = view
        .get(&key)
        .and_then(|entity| entity.value.get("tags"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect();
    tags.push("pending".into());
    view.write(&WriteOptions::new("Post", json!({ "id": "1", "tags": tags })))?;
    Ok(())
}

/// Test that the overlay is rebuilt on top of new confirmed data.
#[test]
fn optimistic_updates_rebase_on_confirmed_writes() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Draft", "tags": ["a"] })))
        .unwrap();
    let update = cache.add_optimistic_update(append_tag);

    let optimistic = post("1").selector_text("{ title tags }").unwrap().optimistic();
    assert_eq!(
        cache.read(&optimistic).data.unwrap(),
        json!({ "title": "Draft", "tags": ["a", "pending"] })
    );

    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Published" })))
        .unwrap();
    assert_eq!(
        cache.read(&optimistic).data.unwrap(),
        json!({ "title": "Published", "tags": ["a", "pending"] })
    );

    // Confirmed data never sees the speculation.
    let confirmed = cache.read(&post("1").selector_text("{ tags }").unwrap());
    assert_eq!(confirmed.data.unwrap(), json!({ "tags": ["a"] }));

    assert!(cache.remove_optimistic_update(update));
    assert_eq!(
        cache.read(&optimistic).data.unwrap(),
        json!({ "title": "Published", "tags": ["a"] })
    );
}

/// Test that optimistic watchers follow the overlay queue.
#[test]
fn optimistic_watchers_see_queue_changes() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "tags": [] })))
        .unwrap();
    let optimistic = record(&mut cache, post("1").selector_text("{ tags }").unwrap().optimistic());
    let confirmed = record(&mut cache, post("1").selector_text("{ tags }").unwrap());

    let update = cache.add_optimistic_update(append_tag);
    assert_eq!(optimistic.calls.get(), 1);
    assert_eq!(confirmed.calls.get(), 0);

    cache.remove_optimistic_update(update);
    assert_eq!(optimistic.calls.get(), 2);
    assert_eq!(confirmed.calls.get(), 0);
}

/// Test the error surface: bad selectors and unidentifiable entities.
#[test]
fn errors_are_reported_not_panicked() {
    let mut cache = cache();

    let syntax = post("1").selector_text("{ title ");
    assert!(matches!(syntax, Err(Error::Syntax { .. })));

    let missing = cache.write(WriteOptions::new("Post", json!({ "title": "No id" })));
    assert!(matches!(missing, Err(Error::MissingId { .. })));

    // Reads never fail: an unidentifiable subject is just empty and stale.
    let read = cache.read(&ReadOptions::new("Post"));
    assert!(read.data.is_none());
    assert!(read.stale);
}

/// Test that values failing their declared type are stored but reported.
#[test]
fn invalid_values_are_reported() {
    let mut cache = cache();
    let result = cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": 42 })))
        .unwrap();
    assert_eq!(result.invalid_fields.len(), 1);

    let read = cache.read(&post("1").selector_text("{ title }").unwrap());
    assert_eq!(read.invalid_fields.len(), 1);
    assert_eq!(read.data.unwrap(), json!({ "title": 42 }));
}

/// Test that reset clears everything and leaves old handles harmless.
#[test]
fn reset_clears_all_state() {
    let mut cache = cache();
    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Hello" })))
        .unwrap();
    let recorder = record(&mut cache, post("1"));
    let retained = cache.retain(EntityKey::new("Post", "1"));
    cache.add_optimistic_update(append_tag);

    cache.reset();
    assert!(cache.is_empty());
    assert_eq!(cache.len(true), 0);
    assert_eq!(cache.watcher_count(), 0);

    let again = cache.retain(EntityKey::new("Post", "1"));
    drop(retained);
    assert_eq!(cache.retain_count(again.key()), 1);

    cache
        .write(WriteOptions::new("Post", json!({ "id": "1", "title": "Hello" })))
        .unwrap();
    assert_eq!(recorder.calls.get(), 0);
}

/// Test that a failing optimistic update is skipped while later ones still
/// replay. Runs under a subscriber so the warning path is exercised.
#[test]
fn failing_optimistic_update_is_skipped() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let mut cache = cache();
        cache
            .write(WriteOptions::new("Post", json!({ "id": "1", "tags": ["a"] })))
            .unwrap();

        cache.add_optimistic_update(|view| {
            view.write(&WriteOptions::new("Post", json!({ "title": "no id" })))?;
            Ok(())
        });
        cache.add_optimistic_update(append_tag);

        let read = cache.read(&post("1").selector_text("{ tags }").unwrap().optimistic());
        assert_eq!(read.data.unwrap(), json!({ "tags": ["a", "pending"] }));
    });
}

/// Test that a reference chain far deeper than the call stack reads, compares
/// and drops without a selector.
#[test]
fn long_reference_chain_reads_without_selector() {
    let mut cache = cache();
    let len = 100_000;
    cache.silent(|cache| {
        for i in 0..len {
            cache
                .write(WriteOptions::new(
                    "Node",
                    json!({ "id": i.to_string(), "child": { "id": (i + 1).to_string() } }),
                ))
                .unwrap();
        }
    });

    let root = ReadOptions::new("Node").id("0");
    let read = cache.read(&root);
    assert!(read.missing_fields.is_empty());
    let mut node = read.data.unwrap();
    let mut depth = 1;
    while let Some(child) = node.get("child") {
        node = child;
        depth += 1;
    }
    assert_eq!(depth, len + 1);
    assert_eq!(node.get("id").unwrap().as_str(), Some("100000"));
    drop(node);

    // Re-reading after a write at the far end compares both chains in full.
    let recorder = record(&mut cache, root);
    cache
        .write(WriteOptions::new(
            "Node",
            json!({ "id": len.to_string(), "child": { "id": "tail" } }),
        ))
        .unwrap();
    assert_eq!(recorder.calls.get(), 1);
}
