use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use super::*;

#[derive(Debug, PartialEq, Clone)]
struct TestValue {
    value: String,
}

#[derive(Clone, Default)]
struct Counter(Arc<AtomicUsize>);

#[test]
fn test_basic_operations() {
    let context = Context::new();

    context.insert(42);
    context.insert("hello".to_string());

    assert_eq!(context.get::<i32>(), Some(42));
    assert_eq!(context.get::<String>(), Some("hello".to_string()));

    context.remove::<i32>();
    assert!(context.get::<i32>().is_none());
    assert_eq!(context.get::<String>(), Some("hello".to_string()));
}

#[test]
fn test_overwrite() {
    let context = Context::new();
    context.insert(TestValue {
        value: "first".to_string(),
    });
    context.insert(TestValue {
        value: "second".to_string(),
    });
    assert_eq!(
        context.get::<TestValue>(),
        Some(TestValue {
            value: "second".to_string()
        })
    );
}

#[test]
fn test_get_or_insert_with_initializes_once() {
    let context = Context::new();
    let mut calls = 0;

    let first = context.get_or_insert_with(|| {
        calls += 1;
        Counter::default()
    });
    first.0.fetch_add(1, Ordering::SeqCst);

    let second = context.get_or_insert_with(|| {
        calls += 1;
        Counter::default()
    });

    assert_eq!(calls, 1);
    assert!(Arc::ptr_eq(&first.0, &second.0));
    assert_eq!(second.0.load(Ordering::SeqCst), 1);
}

#[test]
fn test_clones_share_entries() {
    let context = Context::new();
    let clone = context.clone();
    clone.insert(7u8);
    assert_eq!(context.get::<u8>(), Some(7));
}

#[test]
fn test_contexts_are_isolated() {
    let first = Context::new();
    let second = Context::new();

    let counter = first.get_or_insert_with(Counter::default);
    counter.0.fetch_add(5, Ordering::SeqCst);

    let other = second.get_or_insert_with(Counter::default);
    assert_eq!(other.0.load(Ordering::SeqCst), 0);
    assert!(!Arc::ptr_eq(&counter.0, &other.0));
}

#[test]
fn test_concurrent_first_access() {
    let context = Context::new();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let context = context.clone();
            std::thread::spawn(move || context.get_or_insert_with(Counter::default))
        })
        .collect();

    let counters: Vec<Counter> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    for counter in &counters[1..] {
        assert!(Arc::ptr_eq(&counters[0].0, &counter.0));
    }
}
