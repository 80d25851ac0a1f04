use std::cell::Cell;
use std::rc::Rc;

use tether_core::{
    bind_value, on_mount, BindOptions, Cleanup, IfAttached, InsertPhase, MaybeReactive,
    MountError, MountOptions, MutableValue,
};
use tether_testing::{assert_log, CallLog, Fixture, ValueRecorder};

fn logging_mount(log: &CallLog, label: &'static str) -> impl Fn() -> Option<Cleanup> + 'static {
    let log = log.clone();
    move || {
        log.push(format!("{label}:mount"));
        let log = log.clone();
        let cleanup: Cleanup = Box::new(move || log.push(format!("{label}:cleanup")));
        Some(cleanup)
    }
}

#[test]
fn mount_on_attached_node_fails_by_default() {
    let fx = Fixture::new();
    let log = CallLog::new();
    let node = fx.element("div");
    fx.body().append_child(&node).expect("attach");

    let error = on_mount(&node, logging_mount(&log, "node"), MountOptions::default())
        .expect_err("node is attached");
    assert_eq!(error, MountError::AlreadyAttached { node: node.id() });
    assert!(error.to_string().contains("already attached"));

    node.remove().expect("detach");
    fx.body().append_child(&node).expect("reattach");
    assert!(log.is_empty(), "a failed registration must not run later");
}

#[test]
fn mount_on_attached_node_can_wait_for_the_next_insertion() {
    let fx = Fixture::new();
    let log = CallLog::new();
    let node = fx.element("div");
    fx.body().append_child(&node).expect("attach");

    on_mount(
        &node,
        logging_mount(&log, "node"),
        MountOptions {
            if_attached: IfAttached::Ignore,
            ..MountOptions::default()
        },
    )
    .expect("register");
    assert!(log.is_empty());

    node.remove().expect("detach");
    assert!(log.is_empty());
    fx.body().append_child(&node).expect("reattach");
    assert_log(&log, &["node:mount"]);
}

#[test]
fn mount_on_attached_node_can_run_immediately() {
    let fx = Fixture::new();
    let log = CallLog::new();
    let node = fx.element("div");
    fx.body().append_child(&node).expect("attach");

    on_mount(
        &node,
        logging_mount(&log, "node"),
        MountOptions {
            if_attached: IfAttached::Call,
            ..MountOptions::default()
        },
    )
    .expect("register");
    assert_log(&log, &["node:mount"]);

    node.remove().expect("detach");
    assert_log(&log, &["node:cleanup"]);
}

#[test]
fn cleanup_runs_once_per_mount() {
    let fx = Fixture::new();
    let log = CallLog::new();
    let node = fx.element("div");
    on_mount(&node, logging_mount(&log, "node"), MountOptions::default()).expect("register");

    for _ in 0..3 {
        fx.body().append_child(&node).expect("attach");
        node.remove().expect("detach");
    }
    assert_log(
        &log,
        &[
            "node:mount",
            "node:cleanup",
            "node:mount",
            "node:cleanup",
            "node:mount",
            "node:cleanup",
        ],
    );
    fx.assert_consistent();
}

#[test]
fn mount_without_cleanup_leaves_removal_alone() {
    let fx = Fixture::new();
    let runs = Rc::new(Cell::new(0));
    let node = fx.element("div");
    {
        let runs = runs.clone();
        on_mount(
            &node,
            move || {
                runs.set(runs.get() + 1);
                None
            },
            MountOptions::default(),
        )
        .expect("register");
    }

    fx.body().append_child(&node).expect("attach");
    node.remove().expect("detach");
    fx.body().append_child(&node).expect("reattach");
    assert_eq!(runs.get(), 2);
}

#[test]
fn before_phase_mount_runs_before_after_handlers() {
    let fx = Fixture::new();
    let log = CallLog::new();
    let node = fx.element("div");
    fx.binder(&node)
        .on_inserted(log.handler("after"), InsertPhase::After);
    on_mount(
        &node,
        logging_mount(&log, "node"),
        MountOptions {
            phase: InsertPhase::Before,
            ..MountOptions::default()
        },
    )
    .expect("register");

    fx.body().append_child(&node).expect("attach");
    assert_log(&log, &["node:mount", "after"]);
}

#[test]
fn plain_values_are_delivered_once() {
    let fx = Fixture::new();
    let recorder = ValueRecorder::new();
    let node = fx.element("div");

    bind_value(
        &node,
        MaybeReactive::Plain(7),
        recorder.handler(),
        BindOptions::default(),
    )
    .expect("bind");
    fx.body().append_child(&node).expect("attach");
    assert_eq!(recorder.take(), vec![7]);
    assert_eq!(fx.binder(&node).watched_count(), 0);

    bind_value(
        &node,
        MaybeReactive::Plain(8),
        recorder.handler(),
        BindOptions { skip_initial: true },
    )
    .expect("bind");
    assert!(recorder.seen().is_empty());
}

#[test]
fn reactive_values_follow_attachment() {
    let fx = Fixture::new();
    let value = MutableValue::new(1);
    let recorder = ValueRecorder::new();
    let node = fx.element("div");

    bind_value(&node, (&value).into(), recorder.handler(), BindOptions::default()).expect("bind");
    assert_eq!(recorder.take(), vec![1]);
    assert_eq!(value.subscriber_count(), 0);

    value.set(2);
    assert!(recorder.seen().is_empty());
    fx.body().append_child(&node).expect("attach");
    assert_eq!(recorder.take(), vec![2]);
    assert_eq!(value.subscriber_count(), 1);

    value.set(3);
    node.remove().expect("detach");
    value.set(4);
    assert_eq!(recorder.take(), vec![3]);
    assert_eq!(value.subscriber_count(), 0);
}

#[test]
fn skip_initial_defers_to_the_first_insertion() {
    let fx = Fixture::new();
    let value = MutableValue::new("a".to_string());
    let recorder = ValueRecorder::new();
    let node = fx.element("div");

    bind_value(
        &node,
        (&value).into(),
        recorder.handler(),
        BindOptions { skip_initial: true },
    )
    .expect("bind");
    assert!(recorder.seen().is_empty());

    fx.body().append_child(&node).expect("attach");
    assert_eq!(recorder.take(), vec!["a".to_string()]);
}
