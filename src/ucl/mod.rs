// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The user client library (C5, `spec.md §4.5`).
//!
//! The application's front door: node/publisher/subscription records
//! keyed by name, the deferred-creation queue, and the executor spin
//! loop. This is the one layer with a UCL-prefixed trace family
//! (`rclcpp_*`) that genuinely precedes the `rcl_*`/`rmw_*` chain
//! (invariant I4) — the condensed event list in `spec.md §6` is
//! explicitly non-exhaustive ("at minimum"), and `rclcpp_layer.py` (the
//! original this was distilled from) emits its own `rclcpp_init` and
//! per-entity `rclcpp_*_init` events ahead of `rcl_*_init`, so those are
//! reproduced here.

use std::collections::HashMap;

use crate::core::{Envelope, Handle, MessageId, NodeHandle, PublisherHandle, SubscriptionHandle};
use crate::devs::TimeAdvance;
use crate::error::SimError;
use crate::executor::{CallbackAction, Dispatched, Executor, WorkItem, WorkKind};
use crate::icl::Icl;
use crate::qos::InnerQos;
use crate::trace::{FieldValue, TraceLog};

/// An operation queued for a node that does not exist yet
/// (`spec.md §4.5`: "deferred entity creation").
enum Deferred {
    CreatePublisher { topic: String, qos: InnerQos },
    CreateSubscription {
        topic: String,
        qos: InnerQos,
        callback: CallbackAction,
    },
}

struct NodeRecord {
    handle: NodeHandle,
    publishers: HashMap<String, PublisherHandle>,
    subscriptions: HashMap<String, SubscriptionHandle>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Active,
}

/// The user-facing operation descriptors from `spec.md §6`.
pub enum Operation {
    CreateNode {
        name: String,
    },
    CreatePublisher {
        node_name: String,
        topic: String,
        qos: InnerQos,
    },
    CreateSubscription {
        node_name: String,
        topic: String,
        qos: InnerQos,
        callback: CallbackAction,
    },
    CreateTimer {
        node_name: String,
        period_ns: u64,
        callback: CallbackAction,
    },
    Publish {
        node_name: Option<String>,
        topic: Option<String>,
        publisher_handle: Option<PublisherHandle>,
        payload: Vec<u8>,
    },
    Lifecycle {
        target_node: String,
        enable_publishers: Option<bool>,
        enable_timers: Option<bool>,
    },
}

/// Bundles the layers below UCL that every operation threads through, so
/// `submit` doesn't carry five separate `&mut` parameters at every call
/// site.
pub struct Layers<'a> {
    pub icl: &'a mut Icl,
    pub mw: &'a mut crate::rmw::Middleware,
    pub dds: &'a mut crate::dds::Participant,
    pub registry: &'a crate::registry::TypeRegistry,
}

pub struct Ucl {
    phase: Phase,
    nodes: HashMap<String, NodeRecord>,
    deferred: HashMap<String, Vec<Deferred>>,
    executor: Executor,
    spin_period_ns: u64,
    message_counter: u64,
    context: String,
}

impl Ucl {
    pub fn new(context: impl Into<String>, spin_period_us: u64) -> Self {
        Self {
            phase: Phase::Uninitialized,
            nodes: HashMap::new(),
            deferred: HashMap::new(),
            executor: Executor::new(),
            spin_period_ns: spin_period_us * 1_000,
            message_counter: 0,
            context: context.into(),
        }
    }

    fn ensure_init(&mut self, trace: &mut TraceLog, now: u64) {
        if self.phase == Phase::Uninitialized {
            trace.log_event("rclcpp_init", vec![], Some(self.context.clone()), now);
            self.phase = Phase::Active;
        }
    }

    /// Mints the message id here, not in ICL: the id must be stable
    /// across layers (`spec.md §3`) and `rclcpp_publish` — the first
    /// event to reference it — is logged before ICL ever runs.
    fn next_message_id(&mut self) -> MessageId {
        let id = self.message_counter;
        self.message_counter += 1;
        MessageId::from_raw(Handle::new(id))
    }

    /// Submits one application operation descriptor (`spec.md §4.5`/§6).
    /// Returns a stamped envelope when the operation was a publish that
    /// needs to cross the transport multiplexer.
    pub fn submit(
        &mut self,
        layers: &mut Layers<'_>,
        trace: &mut TraceLog,
        now: u64,
        op: Operation,
    ) -> Result<Option<Envelope>, SimError> {
        self.ensure_init(trace, now);
        match op {
            Operation::CreateNode { name } => {
                self.create_node(layers, trace, now, &name)?;
                Ok(None)
            }
            Operation::CreatePublisher { node_name, topic, qos } => {
                self.create_publisher(layers, trace, now, &node_name, &topic, qos)?;
                Ok(None)
            }
            Operation::CreateSubscription {
                node_name,
                topic,
                qos,
                callback,
            } => {
                self.create_subscription(layers, trace, now, &node_name, &topic, qos, callback)?;
                Ok(None)
            }
            Operation::CreateTimer {
                node_name,
                period_ns,
                callback,
            } => {
                let node = self.resolve_node(&node_name)?;
                layers.icl.create_timer(trace, now, node, period_ns, callback)?;
                Ok(None)
            }
            Operation::Lifecycle {
                target_node,
                enable_publishers,
                enable_timers,
            } => {
                let node = self.resolve_node(&target_node)?;
                layers.icl.lifecycle(node, enable_publishers, enable_timers)?;
                Ok(None)
            }
            Operation::Publish {
                node_name,
                topic,
                publisher_handle,
                payload,
            } => self.publish(layers, trace, now, node_name, topic, publisher_handle, payload),
        }
    }

    /// Looks up a publisher already created on `node_name` for `topic`
    /// (`spec.md §4.5`'s own node-name+topic resolution table, exposed for
    /// callers that need the handle directly — e.g. to build a timer
    /// callback that publishes on it).
    pub fn publisher_handle(&self, node_name: &str, topic: &str) -> Option<PublisherHandle> {
        self.nodes.get(node_name)?.publishers.get(topic).copied()
    }

    fn resolve_node(&self, name: &str) -> Result<NodeHandle, SimError> {
        self.nodes
            .get(name)
            .map(|r| r.handle)
            .ok_or_else(|| SimError::InvariantViolation(format!("unknown node {name}")))
    }

    fn create_node(
        &mut self,
        layers: &mut Layers<'_>,
        trace: &mut TraceLog,
        now: u64,
        name: &str,
    ) -> Result<NodeHandle, SimError> {
        trace.log_event(
            "rclcpp_node_init",
            vec![("node_name", FieldValue::from(name))],
            Some(self.context.clone()),
            now,
        );
        let handle = layers.icl.create_node(trace, now, name);
        self.nodes.insert(
            name.to_string(),
            NodeRecord {
                handle,
                publishers: HashMap::new(),
                subscriptions: HashMap::new(),
            },
        );
        if let Some(queued) = self.deferred.remove(name) {
            for d in queued {
                match d {
                    Deferred::CreatePublisher { topic, qos } => {
                        self.create_publisher(layers, trace, now, name, &topic, qos)?;
                    }
                    Deferred::CreateSubscription { topic, qos, callback } => {
                        self.create_subscription(layers, trace, now, name, &topic, qos, callback)?;
                    }
                }
            }
        }
        Ok(handle)
    }

    /// Creates a publisher, or — if `node_name` has no node yet — defers
    /// it (`spec.md §4.5`).
    fn create_publisher(
        &mut self,
        layers: &mut Layers<'_>,
        trace: &mut TraceLog,
        now: u64,
        node_name: &str,
        topic: &str,
        qos: InnerQos,
    ) -> Result<Option<PublisherHandle>, SimError> {
        let Some(node) = self.nodes.get(node_name).map(|r| r.handle) else {
            self.deferred
                .entry(node_name.to_string())
                .or_default()
                .push(Deferred::CreatePublisher {
                    topic: topic.to_string(),
                    qos,
                });
            return Ok(None);
        };
        trace.log_event(
            "rclcpp_publisher_init",
            vec![("node_name", FieldValue::from(node_name)), ("topic", FieldValue::from(topic))],
            Some(self.context.clone()),
            now,
        );
        let handle = layers
            .icl
            .create_publisher(layers.mw, layers.dds, trace, now, node, node_name, topic, qos)?;
        self.nodes
            .get_mut(node_name)
            .expect("node exists")
            .publishers
            .insert(topic.to_string(), handle);
        Ok(Some(handle))
    }

    fn create_subscription(
        &mut self,
        layers: &mut Layers<'_>,
        trace: &mut TraceLog,
        now: u64,
        node_name: &str,
        topic: &str,
        qos: InnerQos,
        callback: CallbackAction,
    ) -> Result<Option<SubscriptionHandle>, SimError> {
        let Some(node) = self.nodes.get(node_name).map(|r| r.handle) else {
            self.deferred
                .entry(node_name.to_string())
                .or_default()
                .push(Deferred::CreateSubscription {
                    topic: topic.to_string(),
                    qos,
                    callback,
                });
            return Ok(None);
        };
        trace.log_event(
            "rclcpp_subscription_init",
            vec![("node_name", FieldValue::from(node_name)), ("topic", FieldValue::from(topic))],
            Some(self.context.clone()),
            now,
        );
        let handle = layers
            .icl
            .create_subscription(layers.mw, layers.dds, trace, now, node, node_name, topic, qos, callback)?;
        self.nodes
            .get_mut(node_name)
            .expect("node exists")
            .subscriptions
            .insert(topic.to_string(), handle);
        Ok(Some(handle))
    }

    /// `publish{node_name?, publisher_handle?, message}` (`spec.md §6`):
    /// auto-resolves the publisher handle from `node_name`+`topic` when
    /// not given directly (`spec.md §4.5`).
    #[allow(clippy::too_many_arguments)]
    fn publish(
        &mut self,
        layers: &mut Layers<'_>,
        trace: &mut TraceLog,
        now: u64,
        node_name: Option<String>,
        topic: Option<String>,
        publisher_handle: Option<PublisherHandle>,
        payload: Vec<u8>,
    ) -> Result<Option<Envelope>, SimError> {
        let publisher = match publisher_handle {
            Some(h) => h,
            None => {
                let (Some(node_name), Some(topic)) = (node_name.as_deref(), topic.as_deref()) else {
                    return Err(SimError::InvariantViolation(
                        "publish requires publisher_handle or node_name+topic".into(),
                    ));
                };
                *self
                    .nodes
                    .get(node_name)
                    .and_then(|r| r.publishers.get(topic))
                    .ok_or_else(|| SimError::InvariantViolation(format!("no publisher for {node_name}/{topic}")))?
            }
        };
        let id = self.next_message_id();
        trace.log_event(
            "rclcpp_publish",
            vec![
                ("publisher_handle", FieldValue::from(publisher.raw())),
                ("msg", FieldValue::from(id.raw())),
            ],
            Some(self.context.clone()),
            now,
        );
        let stamped = layers
            .icl
            .publish(layers.mw, layers.dds, layers.registry, trace, now, publisher, id, payload)?;
        for (sub, callback, envelope) in layers.icl.drain_intra_process() {
            self.take(trace, now, sub, callback, envelope);
        }
        Ok(stamped)
    }

    /// Called when a delivery reaches this node's application boundary —
    /// either straight from the intra-process fast path, or from the
    /// `mw_take`/`icl_take` chain after a transport round trip. Emits
    /// `rclcpp_take` and enqueues a subscription work item for the
    /// executor (`spec.md §4.7`'s canonical chain terminus before
    /// `callback_start`).
    pub fn take(
        &mut self,
        trace: &mut TraceLog,
        now: u64,
        subscription: SubscriptionHandle,
        callback: CallbackAction,
        envelope: Envelope,
    ) {
        trace.log_event(
            "rclcpp_take",
            vec![
                ("subscription_handle", FieldValue::from(subscription.raw())),
                ("msg", FieldValue::from(envelope.id.raw())),
            ],
            Some(self.context.clone()),
            now,
        );
        self.executor.push(WorkItem {
            kind: WorkKind::Subscription,
            handle: subscription.raw(),
            callback,
            message: Some(envelope),
            cancelled: false,
        });
    }

    pub fn push_timer_work(&mut self, item: WorkItem) {
        self.executor.push(item);
    }

    /// One executor spin (`spec.md §4.5`): always emits `spin_some`, then
    /// dispatches at most one ready item. A `Publish` callback action
    /// re-enters the publish path; a `Raise` is reported as a recoverable
    /// `CallbackError` and otherwise ignored (`spec.md §7` class 5).
    pub fn spin_once(
        &mut self,
        layers: &mut Layers<'_>,
        trace: &mut TraceLog,
        now: u64,
    ) -> Result<Option<Envelope>, SimError> {
        trace.log_event("rclcpp_executor_spin_some", vec![], Some(self.context.clone()), now);
        if self.executor.is_empty() {
            trace.log_event(
                "rclcpp_executor_wait_for_work",
                vec![],
                Some(self.context.clone()),
                now,
            );
            return Ok(None);
        }
        trace.log_event(
            "rclcpp_executor_get_next_ready",
            vec![],
            Some(self.context.clone()),
            now,
        );
        trace.log_event("rclcpp_executor_execute", vec![], Some(self.context.clone()), now);
        match self.executor.dispatch(trace, now, &self.context) {
            None | Some(Dispatched::Cancelled) => Ok(None),
            Some(Dispatched::Ran { action, error }) => {
                if let Some(err) = error {
                    trace.log_event(
                        err.trace_kind(),
                        vec![("detail", FieldValue::from(err.to_string()))],
                        Some(self.context.clone()),
                        now,
                    );
                }
                match action {
                    Some(CallbackAction::Publish { publisher, payload }) => {
                        self.publish(layers, trace, now, None, None, Some(publisher), payload)
                    }
                    _ => Ok(None),
                }
            }
        }
    }
}

impl Ucl {
    /// Nanoseconds of virtual time until the next spin tick is due. Not a
    /// [`crate::devs::Machine`] impl: `spin_once` needs `&mut` access to
    /// `icl`/`mw`/`dds` to re-enter the publish path for callback-driven
    /// publishes, which a `Machine::output`'s fixed `(now, &mut TraceLog)`
    /// signature has no room for. [`crate::sim::Simulation`] calls this
    /// directly instead of folding UCL into the generic machine list.
    pub fn time_advance(&self, _now: u64) -> TimeAdvance {
        if self.phase == Phase::Uninitialized || !self.executor.is_empty() {
            TimeAdvance::At(0)
        } else {
            TimeAdvance::At(self.spin_period_ns)
        }
    }
}
