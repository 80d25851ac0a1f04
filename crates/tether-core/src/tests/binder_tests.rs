use super::*;
use crate::dom::Document;
use crate::value::MutableValue;

fn counter() -> (Rc<Cell<usize>>, LifecycleHandler) {
    let count = Rc::new(Cell::new(0));
    let handler: LifecycleHandler = {
        let count = count.clone();
        Rc::new(move || count.set(count.get() + 1))
    };
    (count, handler)
}

fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, ValueHandler<T>) {
    let seen: Rc<RefCell<Vec<T>>> = Rc::default();
    let handler: ValueHandler<T> = {
        let seen = seen.clone();
        Rc::new(move |value: &T| seen.borrow_mut().push(value.clone()))
    };
    (seen, handler)
}

fn detached_binder() -> (Document, Node, Binder) {
    let document = Document::new();
    let node = document.create_element("div");
    let binder = Binder::new(&node, false);
    (document, node, binder)
}

struct BrokenValue {
    fail: Cell<bool>,
    inner: MutableValue<i32>,
}

impl Observable<i32> for BrokenValue {
    fn get(&self) -> Result<i32, ValueError> {
        if self.fail.get() {
            Err(ValueError::Unavailable("broken".into()))
        } else {
            self.inner.get()
        }
    }

    fn subscribe(&self, handler: &ValueHandler<i32>) {
        self.inner.subscribe(handler);
    }

    fn unsubscribe(&self, handler: &ValueHandler<i32>) {
        self.inner.unsubscribe(handler);
    }
}

#[test]
fn before_then_removed_without_after_leaves_everything_inactive() {
    let (_document, _node, binder) = detached_binder();
    let value = MutableValue::new(1);
    let (_, handler) = recorder::<i32>();
    binder.watch(value.observable(), handler);

    binder.notify_before_inserted();
    assert!(binder.is_attached());
    assert_eq!(binder.active_subscriptions(), 1);
    binder.notify_after_removed();

    assert!(!binder.is_attached());
    assert!(!binder.is_expecting_insertion());
    assert_eq!(binder.active_subscriptions(), 0);
    assert_eq!(value.subscriber_count(), 0);
}

#[test]
fn repeated_before_insert_is_a_no_op() {
    let (_document, _node, binder) = detached_binder();
    let value = MutableValue::new(1);
    let (count, before) = counter();
    let (_, handler) = recorder::<i32>();
    binder.on_inserted(before, InsertPhase::Before);
    binder.watch(value.observable(), handler);

    binder.notify_before_inserted();
    binder.notify_before_inserted();

    assert_eq!(count.get(), 1);
    assert_eq!(value.subscriber_count(), 1);
}

#[test]
fn after_insert_requires_pending_before_insert() {
    let (_document, _node, binder) = detached_binder();
    let (count, after) = counter();
    binder.on_inserted(after, InsertPhase::After);

    binder.notify_after_inserted();
    assert_eq!(count.get(), 0);

    binder.notify_before_inserted();
    binder.notify_after_inserted();
    binder.notify_after_inserted();
    assert_eq!(count.get(), 1);
}

#[test]
fn removal_only_fires_when_attached() {
    let (_document, _node, binder) = detached_binder();
    let (count, removed) = counter();
    binder.on_removed(removed);
    binder.notify_after_removed();
    assert_eq!(count.get(), 0);
    binder.notify_before_inserted();
    binder.notify_after_removed();
    binder.notify_after_removed();
    assert_eq!(count.get(), 1);
}

#[test]
fn off_handlers_are_idempotent() {
    let (_document, _node, binder) = detached_binder();
    let (count, handler) = counter();
    let (_, stranger) = counter();
    binder.on_inserted(handler.clone(), InsertPhase::Before);
    binder.on_removed(handler.clone());
    binder.off_inserted(&stranger, InsertPhase::Before);
    binder.off_inserted(&handler, InsertPhase::After);
    binder.off_inserted(&handler, InsertPhase::Before);
    binder.off_inserted(&handler, InsertPhase::Before);
    binder.off_removed(&handler);

    binder.notify_before_inserted();
    binder.notify_after_removed();
    assert_eq!(count.get(), 0);
}

#[test]
fn handlers_fire_in_registration_order() {
    let (_document, _node, binder) = detached_binder();
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::default();
    for (label, phase) in [
        ("after-1", InsertPhase::After),
        ("before-1", InsertPhase::Before),
        ("before-2", InsertPhase::Before),
        ("after-2", InsertPhase::After),
    ] {
        let order = order.clone();
        binder.on_inserted(Rc::new(move || order.borrow_mut().push(label)), phase);
    }
    binder.notify_before_inserted();
    binder.notify_after_inserted();
    assert_eq!(
        *order.borrow(),
        vec!["before-1", "before-2", "after-1", "after-2"]
    );
}

#[test]
fn reattach_delivers_only_the_changed_value_once() {
    let (_document, _node, binder) = detached_binder();
    let value = MutableValue::new("uwu".to_string());
    let (seen, handler) = recorder::<String>();
    binder.watch_and_run(value.observable(), handler).unwrap();
    binder.notify_before_inserted();
    binder.notify_after_inserted();
    assert_eq!(*seen.borrow(), vec!["uwu".to_string()]);

    binder.notify_after_removed();
    value.set("owo".to_string());
    assert_eq!(seen.borrow().len(), 1);

    binder.notify_before_inserted();
    binder.notify_after_inserted();
    assert_eq!(*seen.borrow(), vec!["uwu".to_string(), "owo".to_string()]);
}

#[test]
fn watch_without_run_delivers_on_first_insertion() {
    let (_document, _node, binder) = detached_binder();
    let value = MutableValue::new(7);
    let (seen, handler) = recorder::<i32>();
    binder.watch(value.observable(), handler);
    assert!(seen.borrow().is_empty());
    assert_eq!(value.subscriber_count(), 0);

    binder.notify_before_inserted();
    assert_eq!(*seen.borrow(), vec![7]);
    value.set(8);
    assert_eq!(*seen.borrow(), vec![7, 8]);
}

#[test]
fn watch_on_attached_binder_subscribes_without_delivering() {
    let document = Document::new();
    let node = document.create_element("div");
    let binder = Binder::new(&node, true);
    let value = MutableValue::new(1);
    let (seen, handler) = recorder::<i32>();
    binder.watch(value.observable(), handler);
    assert!(seen.borrow().is_empty());
    assert_eq!(value.subscriber_count(), 1);
    value.set(2);
    assert_eq!(*seen.borrow(), vec![2]);
}

#[test]
fn watch_and_run_then_unwatch_restores_subscriber_count() {
    let document = Document::new();
    let node = document.create_element("div");
    let binder = Binder::new(&node, true);
    let value = MutableValue::new(0);
    let (_, other) = recorder::<i32>();
    value.subscribe(&other);
    let baseline = value.subscriber_count();

    let (seen, handler) = recorder::<i32>();
    binder.watch_and_run(value.observable(), handler.clone()).unwrap();
    assert_eq!(*seen.borrow(), vec![0]);
    binder.unwatch(&handler);

    assert_eq!(binder.active_subscriptions(), 0);
    assert_eq!(binder.watched_count(), 0);
    assert_eq!(value.subscriber_count(), baseline);
}

#[test]
fn failed_read_on_insertion_neutralizes_until_removal() {
    let (_document, _node, binder) = detached_binder();
    let broken = Rc::new(BrokenValue {
        fail: Cell::new(false),
        inner: MutableValue::new(1),
    });
    let healthy = MutableValue::new(10);
    let (broken_seen, broken_handler) = recorder::<i32>();
    let (healthy_seen, healthy_handler) = recorder::<i32>();
    let (inserted, on_inserted) = counter();
    binder.watch_and_run(broken.clone(), broken_handler).unwrap();
    binder.watch_and_run(healthy.observable(), healthy_handler).unwrap();
    binder.on_inserted(on_inserted, InsertPhase::Before);

    broken.fail.set(true);
    broken.inner.set(2);
    healthy.set(11);
    binder.notify_before_inserted();

    assert_eq!(inserted.get(), 1);
    assert_eq!(*healthy_seen.borrow(), vec![10, 11]);
    assert_eq!(binder.active_subscriptions(), 2);
    broken.inner.set(3);
    assert_eq!(*broken_seen.borrow(), vec![1]);

    binder.notify_after_removed();
    broken.fail.set(false);
    binder.notify_before_inserted();
    assert_eq!(*broken_seen.borrow(), vec![1, 3]);
    broken.inner.set(4);
    assert_eq!(*broken_seen.borrow(), vec![1, 3, 4]);
}

#[test]
fn watch_and_run_with_failing_read_registers_nothing() {
    let (_document, _node, binder) = detached_binder();
    let broken = Rc::new(BrokenValue {
        fail: Cell::new(true),
        inner: MutableValue::new(1),
    });
    let (_, handler) = recorder::<i32>();
    let err = binder.watch_and_run(broken, handler).unwrap_err();
    assert_eq!(err, ValueError::Unavailable("broken".into()));
    assert_eq!(binder.watched_count(), 0);
}

#[test]
fn value_handler_detaching_node_stops_the_pass() {
    let (_document, _node, binder) = detached_binder();
    let value = MutableValue::new(1);
    let detach: ValueHandler<i32> = {
        let weak = binder.downgrade();
        Rc::new(move |_: &i32| {
            if let Some(binder) = weak.upgrade() {
                binder.notify_after_removed();
            }
        })
    };
    let later = MutableValue::new(2);
    let (later_seen, later_handler) = recorder::<i32>();
    let (before_count, before) = counter();
    binder.watch(value.observable(), detach);
    binder.watch(later.observable(), later_handler);
    binder.on_inserted(before, InsertPhase::Before);

    binder.notify_before_inserted();

    assert!(!binder.is_attached());
    assert!(later_seen.borrow().is_empty());
    assert_eq!(before_count.get(), 0);
    assert_eq!(binder.active_subscriptions(), 0);
    assert_eq!(later.subscriber_count(), 0);
}

#[test]
fn force_attachment_runs_both_insert_phases() {
    let (_document, _node, binder) = detached_binder();
    let (before_count, before) = counter();
    let (after_count, after) = counter();
    binder.on_inserted(before, InsertPhase::Before);
    binder.on_inserted(after, InsertPhase::After);
    binder.force_attachment(true);
    assert_eq!((before_count.get(), after_count.get()), (1, 1));
    binder.force_attachment(false);
    assert!(!binder.is_attached());
}

#[test]
fn binder_holds_its_node_weakly() {
    let (_document, node, binder) = detached_binder();
    assert_eq!(binder.node(), Some(node.clone()));
    drop(node);
    assert!(binder.node().is_none());
}

#[test]
fn table_prunes_entries_of_dropped_nodes() {
    let document = Document::new();
    let table = BinderTable::new(3);
    for _ in 0..2 {
        let temp = document.create_element("temp");
        table.get_or_create(&temp, || false);
    }
    assert_eq!(table.len(), 2);
    let kept = document.create_element("kept");
    table.get_or_create(&kept, || false);
    // The third insertion pruned both temporaries.
    assert_eq!(table.len(), 1);
    assert!(table.contains(&kept));
    let again = table.get_or_create(&kept, || true);
    assert!(!again.is_attached());
}

#[test]
fn table_collects_subtree_in_pre_order() {
    let document = Document::new();
    let table = BinderTable::new(64);
    let root = document.create_element("root");
    let a = document.create_element("a");
    let b = document.create_element("b");
    let c = document.create_element("c");
    root.append_child(&a).unwrap();
    a.append_child(&b).unwrap();
    root.append_child(&c).unwrap();
    table.get_or_create(&c, || false);
    table.get_or_create(&b, || false);
    table.get_or_create(&root, || false);

    let order: Vec<_> = table
        .collect_subtree(&root)
        .into_iter()
        .map(|(node, _)| node)
        .collect();
    assert_eq!(order, vec![root, b, c]);
}
