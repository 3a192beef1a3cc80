// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The inner client library (C4, `spec.md §4.4`).
//!
//! Owns the node/publisher/subscription/timer/guard-condition tables, the
//! timer manager, and the intra-process fast path. Node/publisher/
//! subscription/guard-condition creation is synchronous bookkeeping (no
//! modeled delay), so only the timer manager needs a genuine
//! [`crate::devs::Machine`] time-advance — it is the one thing in this
//! layer that must wake on its own, without an external stimulus
//! (`spec.md §4.4`: "time-advance yields 0 when an operation is pending,
//! INFINITY otherwise, except that it wakes whenever the nearest timer
//! expiration falls due"). The "0 when pending" half of that rule is
//! trivially satisfied here: every non-timer operation below is a direct
//! call that completes within the same scheduler step it was submitted
//! in, so nothing instance-level is ever left "pending" across a step.

use crate::core::{
    Envelope, GuardHandle, HandleTable, MessageId, MessageKind, NodeHandle, PublisherHandle,
    RmwPublisherHandle, RmwSubscriptionHandle, SubscriptionHandle, TimerHandle,
};
use crate::devs::{Machine, TimeAdvance};
use crate::error::SimError;
use crate::executor::{CallbackAction, WorkItem, WorkKind};
use crate::qos::InnerQos;
use crate::trace::{FieldValue, TraceLog};

struct NodeEntry {
    name: String,
    publishers_enabled: bool,
    timers_enabled: bool,
}

struct PublisherEntry {
    node: NodeHandle,
    topic: String,
    rmw_handle: RmwPublisherHandle,
}

struct SubscriptionEntry {
    node: NodeHandle,
    topic: String,
    rmw_handle: RmwSubscriptionHandle,
    callback: CallbackAction,
}

struct TimerEntry {
    node: NodeHandle,
    period_ns: u64,
    last_fire: u64,
    callback: CallbackAction,
}

struct GuardEntry {
    callback: CallbackAction,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Active,
}

pub struct Icl {
    phase: Phase,
    nodes: HandleTable<NodeHandle, NodeEntry>,
    publishers: HandleTable<PublisherHandle, PublisherEntry>,
    subscriptions: HandleTable<SubscriptionHandle, SubscriptionEntry>,
    timers: HandleTable<TimerHandle, TimerEntry>,
    guards: HandleTable<GuardHandle, GuardEntry>,
    pending_intra: Vec<(SubscriptionHandle, Envelope)>,
    context: String,
}

impl Icl {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            phase: Phase::Uninitialized,
            nodes: HandleTable::new(0),
            publishers: HandleTable::new(0),
            subscriptions: HandleTable::new(0),
            timers: HandleTable::new(0),
            guards: HandleTable::new(0),
            pending_intra: Vec::new(),
            context: context.into(),
        }
    }

    fn ensure_init(&mut self, trace: &mut TraceLog, now: u64) {
        if self.phase == Phase::Uninitialized {
            trace.log_event("rcl_init", vec![], Some(self.context.clone()), now);
            self.phase = Phase::Active;
        }
    }

    pub fn create_node(&mut self, trace: &mut TraceLog, now: u64, name: &str) -> NodeHandle {
        self.ensure_init(trace, now);
        let handle = self.nodes.insert(|_h| NodeEntry {
            name: name.to_string(),
            publishers_enabled: true,
            timers_enabled: true,
        });
        trace.log_event(
            "rcl_node_init",
            vec![
                ("node_handle", FieldValue::from(handle.raw())),
                ("node_name", FieldValue::from(name)),
            ],
            Some(self.context.clone()),
            now,
        );
        handle
    }

    pub fn create_publisher(
        &mut self,
        mw: &mut crate::rmw::Middleware,
        dds: &mut crate::dds::Participant,
        trace: &mut TraceLog,
        now: u64,
        node: NodeHandle,
        node_name: &str,
        topic: &str,
        qos: InnerQos,
    ) -> Result<PublisherHandle, SimError> {
        if !self.nodes.contains(node) {
            return Err(SimError::UnknownHandle(node.raw()));
        }
        let rmw_handle = mw.create_publisher(dds, trace, now, node_name, topic, qos);
        let handle = self.publishers.insert(|_h| PublisherEntry {
            node,
            topic: topic.to_string(),
            rmw_handle,
        });
        trace.log_event(
            "rcl_publisher_init",
            vec![
                ("publisher_handle", FieldValue::from(handle.raw())),
                ("node_handle", FieldValue::from(node.raw())),
                ("topic", FieldValue::from(topic)),
            ],
            Some(self.context.clone()),
            now,
        );
        Ok(handle)
    }

    pub fn create_subscription(
        &mut self,
        mw: &mut crate::rmw::Middleware,
        dds: &mut crate::dds::Participant,
        trace: &mut TraceLog,
        now: u64,
        node: NodeHandle,
        node_name: &str,
        topic: &str,
        qos: InnerQos,
        callback: CallbackAction,
    ) -> Result<SubscriptionHandle, SimError> {
        if !self.nodes.contains(node) {
            return Err(SimError::UnknownHandle(node.raw()));
        }
        let rmw_handle = mw.create_subscription(dds, trace, now, node_name, topic, qos);
        let handle = self.subscriptions.insert(|_h| SubscriptionEntry {
            node,
            topic: topic.to_string(),
            rmw_handle,
            callback,
        });
        trace.log_event(
            "rcl_subscription_init",
            vec![
                ("subscription_handle", FieldValue::from(handle.raw())),
                ("node_handle", FieldValue::from(node.raw())),
                ("topic", FieldValue::from(topic)),
            ],
            Some(self.context.clone()),
            now,
        );
        Ok(handle)
    }

    pub fn create_timer(
        &mut self,
        trace: &mut TraceLog,
        now: u64,
        node: NodeHandle,
        period_ns: u64,
        callback: CallbackAction,
    ) -> Result<TimerHandle, SimError> {
        if !self.nodes.contains(node) {
            return Err(SimError::UnknownHandle(node.raw()));
        }
        let handle = self.timers.insert(|_h| TimerEntry {
            node,
            period_ns,
            last_fire: now,
            callback,
        });
        trace.log_event(
            "rcl_timer_init",
            vec![
                ("timer_handle", FieldValue::from(handle.raw())),
                ("node_handle", FieldValue::from(node.raw())),
                ("period_ns", FieldValue::from(period_ns)),
            ],
            Some(self.context.clone()),
            now,
        );
        Ok(handle)
    }

    pub fn create_guard_condition(&mut self, callback: CallbackAction) -> GuardHandle {
        self.guards.insert(|_h| GuardEntry { callback })
    }

    pub fn trigger_guard_condition(&self, handle: GuardHandle) -> Result<WorkItem, SimError> {
        let entry = self
            .guards
            .get(handle)
            .ok_or(SimError::UnknownHandle(handle.raw()))?;
        Ok(WorkItem {
            kind: WorkKind::GuardCondition,
            handle: handle.raw(),
            callback: entry.callback.clone(),
            message: None,
            cancelled: false,
        })
    }

    /// Lifecycle control port (`spec.md §4.4`): `{target_node,
    /// enable_publishers?, enable_timers?}`.
    pub fn lifecycle(
        &mut self,
        node: NodeHandle,
        enable_publishers: Option<bool>,
        enable_timers: Option<bool>,
    ) -> Result<(), SimError> {
        let entry = self
            .nodes
            .get_mut(node)
            .ok_or(SimError::UnknownHandle(node.raw()))?;
        if let Some(v) = enable_publishers {
            entry.publishers_enabled = v;
        }
        if let Some(v) = enable_timers {
            entry.timers_enabled = v;
        }
        Ok(())
    }

    /// `publish(publisher_handle, payload)` (`spec.md §4.4`). Tries the
    /// intra-process fast path first; if no co-located subscription
    /// matches, forwards through the middleware and returns the stamped
    /// envelope for the caller to hand to the transport multiplexer
    /// (invariant I5: exactly one of the two paths fires). `id` is minted
    /// by the caller (UCL), not here — the message id must be stable
    /// across layers (`spec.md §3`), and `rclcpp_publish` needs it before
    /// this method ever runs.
    #[allow(clippy::too_many_arguments)]
    pub fn publish(
        &mut self,
        mw: &mut crate::rmw::Middleware,
        dds: &mut crate::dds::Participant,
        registry: &crate::registry::TypeRegistry,
        trace: &mut TraceLog,
        now: u64,
        publisher: PublisherHandle,
        id: MessageId,
        payload: Vec<u8>,
    ) -> Result<Option<Envelope>, SimError> {
        let pub_entry = self
            .publishers
            .get(publisher)
            .ok_or(SimError::UnknownHandle(publisher.raw()))?;
        let node = self
            .nodes
            .get(pub_entry.node)
            .ok_or(SimError::UnknownHandle(pub_entry.node.raw()))?;
        if !node.publishers_enabled {
            trace.log_event(
                "publisher_disabled",
                vec![("publisher_handle", FieldValue::from(publisher.raw()))],
                Some(self.context.clone()),
                now,
            );
            return Ok(None);
        }
        let topic = pub_entry.topic.clone();
        let rmw_handle = pub_entry.rmw_handle;
        let owner_node = pub_entry.node;

        trace.log_event(
            "rcl_publish",
            vec![
                ("publisher_handle", FieldValue::from(publisher.raw())),
                ("msg", FieldValue::from(id.raw())),
                ("topic", FieldValue::from(topic.clone())),
            ],
            Some(self.context.clone()),
            now,
        );

        let matches: Vec<SubscriptionHandle> = self
            .subscriptions
            .iter()
            .filter(|(_, s)| s.topic == topic && s.node == owner_node)
            .map(|(h, _)| *h)
            .collect();

        if !matches.is_empty() {
            for sub in matches {
                // Caller drains `take_intra_process_delivery` per match;
                // here we just stamp and hand back via the queue so the
                // caller can push executor work items with access to its
                // own executor (kept outside `Icl` to avoid a dependency
                // cycle between the two modules).
                self.pending_intra.push((
                    sub,
                    Envelope::new(id, topic.clone(), MessageKind::Data, payload.clone()),
                ));
            }
            return Ok(None);
        }

        let mut envelope = Envelope::new(id, topic, MessageKind::Data, payload);
        envelope.created_at_vt = now;
        let stamped = mw.publish(dds, registry, trace, now, rmw_handle, envelope)?;
        Ok(Some(stamped))
    }

    /// Drain envelopes queued by the intra-process fast path during the
    /// most recent `publish` call, paired with the callback that should
    /// receive them.
    pub fn drain_intra_process(&mut self) -> Vec<(SubscriptionHandle, CallbackAction, Envelope)> {
        self.pending_intra
            .drain(..)
            .map(|(sub, env)| {
                let cb = self
                    .subscriptions
                    .get(sub)
                    .map(|s| s.callback.clone())
                    .unwrap_or(CallbackAction::NoOp);
                (sub, cb, env)
            })
            .collect()
    }

    /// `mw_take`-accepted delivery arriving from below: looks up the
    /// subscription's callback for the executor to dispatch.
    pub fn take(
        &self,
        trace: &mut TraceLog,
        now: u64,
        subscription: SubscriptionHandle,
        envelope: Envelope,
    ) -> Result<(CallbackAction, Envelope), SimError> {
        let entry = self
            .subscriptions
            .get(subscription)
            .ok_or(SimError::UnknownHandle(subscription.raw()))?;
        trace.log_event(
            "rcl_take",
            vec![
                ("subscription_handle", FieldValue::from(subscription.raw())),
                ("msg", FieldValue::from(envelope.id.raw())),
                ("topic", FieldValue::from(entry.topic.clone())),
            ],
            Some(self.context.clone()),
            now,
        );
        Ok((entry.callback.clone(), envelope))
    }

    pub fn subscription_by_rmw(&self, rmw: RmwSubscriptionHandle) -> Option<SubscriptionHandle> {
        self.subscriptions
            .iter()
            .find(|(_, s)| s.rmw_handle == rmw)
            .map(|(h, _)| *h)
    }

    /// The timer with the smallest `last_fire + period`, ties broken by
    /// handle value for determinism. This is the one the scheduler may
    /// wake for; exactly this timer fires on the matching `output` call.
    fn earliest_timer(&self) -> Option<(TimerHandle, u64)> {
        self.timers
            .iter()
            .map(|(h, t)| (*h, t.last_fire + t.period_ns))
            .min_by_key(|&(h, at)| (at, h.raw().value()))
    }
}

impl Machine for Icl {
    fn name(&self) -> &'static str {
        "ICL"
    }

    fn time_advance(&self, now: u64) -> TimeAdvance {
        match self.earliest_timer() {
            Some((_, at)) => TimeAdvance::At(at.saturating_sub(now)),
            None => TimeAdvance::Infinity,
        }
    }

    /// Fires exactly the one timer whose expiration matches `now`
    /// (`spec.md §4.4`): emits `timer_disabled` and still advances
    /// `last_fire` if the owning node's timers are disabled (so a
    /// disabled timer does not spin the scheduler), otherwise produces an
    /// executor work item.
    fn output(&mut self, now: u64, trace: &mut TraceLog) -> Vec<crate::sim::Effect> {
        let Some((handle, _)) = self.earliest_timer() else {
            return Vec::new();
        };
        let Some(entry) = self.timers.get(handle) else {
            return Vec::new();
        };
        let enabled = self.nodes.get(entry.node).map(|n| n.timers_enabled).unwrap_or(false);
        if !enabled {
            trace.log_event(
                "timer_disabled",
                vec![("timer_handle", FieldValue::from(handle.raw()))],
                Some(self.context.clone()),
                now,
            );
            return Vec::new();
        }
        vec![crate::sim::Effect::ToExecutor(WorkItem {
            kind: WorkKind::Timer,
            handle: handle.raw(),
            callback: entry.callback.clone(),
            message: None,
            cancelled: false,
        })]
    }

    /// Non-accumulating fire-time advance (`spec.md §4.4`): `last_fire`
    /// becomes `max(now, last_fire + period)`, never `now` alone, so a
    /// timer created mid-period still lands on its original phase.
    fn internal_transition(&mut self, now: u64) {
        let Some((handle, _)) = self.earliest_timer() else {
            return;
        };
        if let Some(entry) = self.timers.get_mut(handle) {
            entry.last_fire = now.max(entry.last_fire + entry.period_ns);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_node_creation_emits_rcl_init_once() {
        let mut icl = Icl::new("rcl");
        let mut trace = TraceLog::new();
        icl.create_node(&mut trace, 0, "A");
        icl.create_node(&mut trace, 0, "B");
        assert_eq!(trace.events_of_kind("rcl_init").count(), 1);
        assert_eq!(trace.events_of_kind("rcl_node_init").count(), 2);
    }

    #[test]
    fn disabled_publisher_drops_silently() {
        let mut icl = Icl::new("rcl");
        let mut dds = crate::dds::Participant::new(0);
        let mut mw = crate::rmw::Middleware::new("rmw");
        let registry = crate::registry::TypeRegistry::default();
        let mut trace = TraceLog::new();
        let node = icl.create_node(&mut trace, 0, "N");
        let publisher = icl
            .create_publisher(&mut mw, &mut dds, &mut trace, 0, node, "N", "/t", InnerQos::default())
            .unwrap();
        icl.lifecycle(node, Some(false), None).unwrap();
        let id = MessageId::from_raw(crate::core::Handle::new(0));
        let result = icl
            .publish(&mut mw, &mut dds, &registry, &mut trace, 0, publisher, id, vec![1])
            .unwrap();
        assert!(result.is_none());
        assert_eq!(trace.events_of_kind("publisher_disabled").count(), 1);
    }
}
