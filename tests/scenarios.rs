// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Black-box end-to-end scenarios against the public [`Simulation`] API
//! (`spec.md §8`, "End-to-end scenarios" 1-6).

use ros2_devsim::qos::InnerQos;
use ros2_devsim::{CallbackAction, Configuration, Operation, Simulation};

fn sim() -> Simulation {
    Simulation::new(Configuration::default(), 1).unwrap()
}

/// Scenario 1: single pub/sub, same node — the canonical chain collapses
/// to the intra-process fast path, with no `rmw_publish`/`rmw_take`.
#[test]
fn scenario_1_single_pub_sub_same_node() {
    let mut s = sim();
    s.submit(Operation::CreateNode { name: "N".into() }).unwrap();
    s.submit(Operation::CreatePublisher {
        node_name: "N".into(),
        topic: "/t".into(),
        qos: InnerQos::default(),
    })
    .unwrap();
    s.submit(Operation::CreateSubscription {
        node_name: "N".into(),
        topic: "/t".into(),
        qos: InnerQos::default(),
        callback: CallbackAction::NoOp,
    })
    .unwrap();
    s.submit(Operation::Publish {
        node_name: Some("N".into()),
        topic: Some("/t".into()),
        publisher_handle: None,
        payload: vec![1],
    })
    .unwrap();
    s.run_until(1_000_000).unwrap();

    assert_eq!(s.trace().events_of_kind("rcl_init").count(), 1);
    assert_eq!(s.trace().events_of_kind("rcl_node_init").count(), 1);
    assert_eq!(s.trace().events_of_kind("rcl_publisher_init").count(), 1);
    assert_eq!(s.trace().events_of_kind("rmw_publisher_init").count(), 1);
    assert_eq!(s.trace().events_of_kind("rcl_subscription_init").count(), 1);
    assert_eq!(s.trace().events_of_kind("rmw_subscription_init").count(), 1);
    assert_eq!(s.trace().events_of_kind("rclcpp_publish").count(), 1);
    assert_eq!(s.trace().events_of_kind("rcl_publish").count(), 1);
    assert_eq!(s.trace().events_of_kind("rmw_publish").count(), 0, "intra-process must not touch rmw_publish (P4)");
    assert_eq!(s.trace().events_of_kind("rclcpp_take").count(), 1);
    assert_eq!(s.trace().events_of_kind("callback_start").count(), 1);
    assert_eq!(s.trace().events_of_kind("callback_end").count(), 1);
}

/// Scenario 2: two nodes, cross-node publish — the full chain including
/// `rmw_publish`/`rmw_take` since the fast path cannot apply across nodes.
#[test]
fn scenario_2_cross_node_publish_full_chain() {
    let mut s = sim();
    s.submit(Operation::CreateNode { name: "A".into() }).unwrap();
    s.submit(Operation::CreateNode { name: "B".into() }).unwrap();
    s.submit(Operation::CreatePublisher {
        node_name: "A".into(),
        topic: "/t".into(),
        qos: InnerQos::default(),
    })
    .unwrap();
    s.submit(Operation::CreateSubscription {
        node_name: "B".into(),
        topic: "/t".into(),
        qos: InnerQos::default(),
        callback: CallbackAction::NoOp,
    })
    .unwrap();
    s.submit(Operation::Publish {
        node_name: Some("A".into()),
        topic: Some("/t".into()),
        publisher_handle: None,
        payload: vec![1],
    })
    .unwrap();
    s.run_until(10_000_000).unwrap();

    assert_eq!(s.trace().events_of_kind("rclcpp_publish").count(), 1);
    assert_eq!(s.trace().events_of_kind("rcl_publish").count(), 1);
    assert_eq!(s.trace().events_of_kind("rmw_publish").count(), 1);
    assert_eq!(s.trace().events_of_kind("rmw_take").count(), 1);
    assert_eq!(s.trace().events_of_kind("rclcpp_take").count(), 1);
    assert_eq!(s.trace().events_of_kind("callback_start").count(), 1);
    assert_eq!(s.trace().events_of_kind("callback_end").count(), 1);
}

/// Scenario 3: QoS mismatch — the publish chain runs up to `rmw_publish`,
/// then the delivery is rejected with `qos_incompatible`; no callback runs.
#[test]
fn scenario_3_qos_mismatch_rejects_delivery() {
    let mut s = sim();
    s.submit(Operation::CreateNode { name: "A".into() }).unwrap();
    s.submit(Operation::CreateNode { name: "B".into() }).unwrap();
    s.submit(Operation::CreatePublisher {
        node_name: "A".into(),
        topic: "/t".into(),
        qos: InnerQos::best_effort(),
    })
    .unwrap();
    s.submit(Operation::CreateSubscription {
        node_name: "B".into(),
        topic: "/t".into(),
        qos: InnerQos::default(),
        callback: CallbackAction::NoOp,
    })
    .unwrap();
    s.submit(Operation::Publish {
        node_name: Some("A".into()),
        topic: Some("/t".into()),
        publisher_handle: None,
        payload: vec![7],
    })
    .unwrap();
    s.run_until(10_000_000).unwrap();

    assert_eq!(s.trace().events_of_kind("rmw_publish").count(), 1);
    assert_eq!(s.trace().events_of_kind("qos_incompatible").count(), 1);
    assert_eq!(s.trace().events_of_kind("rmw_take").count(), 0);
    assert_eq!(s.trace().events_of_kind("callback_start").count(), 0);
}

/// Scenario 4: timer-driven publish. A 1-second-period timer run over 3.5
/// virtual seconds fires within the P5 bound (`≤ ⌈D/T⌉ + 1`); this
/// implementation's `last_fire = creation_time` rule (see `DESIGN.md`)
/// produces firings at t=1,2,3 (3 firings), not a firing at t=0 as well.
#[test]
fn scenario_4_timer_driven_publish_within_p5_bound() {
    let mut s = sim();
    s.submit(Operation::CreateNode { name: "N".into() }).unwrap();
    s.submit(Operation::CreatePublisher {
        node_name: "N".into(),
        topic: "/t".into(),
        qos: InnerQos::default(),
    })
    .unwrap();
    let publisher = s.publisher_handle("N", "/t").expect("publisher just created");
    s.submit(Operation::CreateTimer {
        node_name: "N".into(),
        period_ns: 1_000_000_000,
        callback: CallbackAction::Publish {
            publisher,
            payload: vec![42],
        },
    })
    .unwrap();
    s.run_until(3_500_000_000).unwrap();

    let timer_fires = s.trace().events_of_kind("callback_start").count();
    assert!(timer_fires <= 4, "P5: firings must not exceed ceil(D/T) + 1");
    assert_eq!(timer_fires, 3);
    assert_eq!(s.trace().events_of_kind("rcl_publish").count(), 3);
    assert_eq!(s.trace().events_of_kind("callback_start").count(), s.trace().events_of_kind("callback_end").count());
}

/// Scenario 5: lifecycle disable. Disabling a node's publishers drops a
/// subsequent publish silently at the ICL boundary, with no chain beyond it.
#[test]
fn scenario_5_lifecycle_disable_blocks_publish() {
    let mut s = sim();
    s.submit(Operation::CreateNode { name: "N".into() }).unwrap();
    s.submit(Operation::CreatePublisher {
        node_name: "N".into(),
        topic: "/t".into(),
        qos: InnerQos::default(),
    })
    .unwrap();
    s.submit(Operation::Lifecycle {
        target_node: "N".into(),
        enable_publishers: Some(false),
        enable_timers: None,
    })
    .unwrap();
    s.submit(Operation::Publish {
        node_name: Some("N".into()),
        topic: Some("/t".into()),
        publisher_handle: None,
        payload: vec![9],
    })
    .unwrap();
    s.run_until(1_000_000).unwrap();

    assert_eq!(s.trace().events_of_kind("rclcpp_publish").count(), 1);
    assert_eq!(s.trace().events_of_kind("publisher_disabled").count(), 1);
    assert_eq!(s.trace().events_of_kind("rcl_publish").count(), 0);
    assert_eq!(s.trace().events_of_kind("rmw_publish").count(), 0);
}

/// Scenario 6: deferred creation. A publisher request against a node name
/// that doesn't exist yet is queued, then drained once the node is created.
#[test]
fn scenario_6_deferred_creation_drains_on_node_creation() {
    let mut s = sim();
    s.submit(Operation::CreatePublisher {
        node_name: "X".into(),
        topic: "/q".into(),
        qos: InnerQos::default(),
    })
    .unwrap();
    assert_eq!(s.trace().events_of_kind("rcl_publisher_init").count(), 0, "deferred until the node exists");

    s.submit(Operation::CreateNode { name: "X".into() }).unwrap();

    assert_eq!(s.trace().events_of_kind("rcl_node_init").count(), 1);
    assert_eq!(s.trace().events_of_kind("rcl_publisher_init").count(), 1);
    assert!(s.publisher_handle("X", "/q").is_some());

    let node_init_seq = s.trace().events_of_kind("rcl_node_init").next().unwrap().seq;
    let publisher_init_seq = s.trace().events_of_kind("rcl_publisher_init").next().unwrap().seq;
    assert!(publisher_init_seq > node_init_seq);
}
