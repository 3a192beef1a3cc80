// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The middleware abstraction (C3, `spec.md §4.3`).
//!
//! Sits between the inner client library and the DDS participant: it owns
//! the RMW-level publisher/subscription tables, coerces QoS between the
//! inner (ms/infinity) and lower (ns/option) representations, gates
//! inbound delivery on QoS compatibility, and emits the `rmw_*` slice of
//! the canonical trace chain plus graph events. Like [`crate::dds`], it
//! has no autonomous time-advance — every operation here is a direct call
//! from [`crate::icl`], not a scheduled transition.

use crate::core::{Envelope, Handle, HandleTable, RmwPublisherHandle, RmwSubscriptionHandle};
use crate::dds::Participant;
use crate::error::SimError;
use crate::qos::InnerQos;
use crate::registry::TypeRegistry;
use crate::trace::{FieldValue, TraceLog};

struct PublisherEntry {
    topic: String,
    node: String,
    qos: InnerQos,
    writer: crate::core::WriterGuid,
}

struct SubscriptionEntry {
    topic: String,
    node: String,
    qos: InnerQos,
    reader: crate::core::ReaderGuid,
}

/// An accepted inbound delivery, handed up to the inner client library.
pub struct Delivery {
    pub subscription: RmwSubscriptionHandle,
    pub envelope: Envelope,
}

pub struct Middleware {
    publishers: HandleTable<RmwPublisherHandle, PublisherEntry>,
    subscriptions: HandleTable<RmwSubscriptionHandle, SubscriptionEntry>,
    context: String,
}

impl Middleware {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            publishers: HandleTable::new(0),
            subscriptions: HandleTable::new(0),
            context: context.into(),
        }
    }

    pub fn topic_of_publisher(&self, handle: RmwPublisherHandle) -> Option<&str> {
        self.publishers.get(handle).map(|p| p.topic.as_str())
    }

    pub fn qos_of_publisher(&self, handle: RmwPublisherHandle) -> Option<InnerQos> {
        self.publishers.get(handle).map(|p| p.qos)
    }

    /// `create_publisher(topic, qos, node_name)` (`spec.md §4.3`): coerces
    /// QoS inward, calls `participant.create_writer`, emits
    /// `rmw_publisher_init` then `publisher_created`.
    pub fn create_publisher(
        &mut self,
        dds: &mut Participant,
        trace: &mut TraceLog,
        now: u64,
        node: &str,
        topic: &str,
        qos: InnerQos,
    ) -> RmwPublisherHandle {
        let writer = dds.create_writer(topic, qos.to_lower());
        let handle = self.publishers.insert(|_h| PublisherEntry {
            topic: topic.to_string(),
            node: node.to_string(),
            qos,
            writer,
        });
        trace.log_event(
            "rmw_publisher_init",
            vec![
                ("publisher_handle", FieldValue::from(handle.raw())),
                ("topic", FieldValue::from(topic)),
                ("writer_guid", FieldValue::from(writer.raw())),
            ],
            Some(self.context.clone()),
            now,
        );
        self.emit_graph_event(trace, now, "publisher_created", topic, node);
        handle
    }

    /// `create_subscription(...)` (`spec.md §4.3`): symmetric; registers
    /// the participant-level reader that routes inbound data back to this
    /// subscription.
    pub fn create_subscription(
        &mut self,
        dds: &mut Participant,
        trace: &mut TraceLog,
        now: u64,
        node: &str,
        topic: &str,
        qos: InnerQos,
    ) -> RmwSubscriptionHandle {
        let handle = self.subscriptions.insert(|_h| SubscriptionEntry {
            topic: topic.to_string(),
            node: node.to_string(),
            qos,
            reader: crate::core::ReaderGuid::from_raw(Handle::new(0)),
        });
        let reader = dds.create_reader(topic, qos.to_lower(), handle);
        self.subscriptions.get_mut(handle).expect("just inserted").reader = reader;
        trace.log_event(
            "rmw_subscription_init",
            vec![
                ("subscription_handle", FieldValue::from(handle.raw())),
                ("topic", FieldValue::from(topic)),
                ("reader_guid", FieldValue::from(reader.raw())),
            ],
            Some(self.context.clone()),
            now,
        );
        self.emit_graph_event(trace, now, "subscription_created", topic, node);
        handle
    }

    /// `publish(envelope)` (`spec.md §4.3`): estimates serialized size,
    /// attaches the publisher's QoS as the envelope's hint (so the
    /// receiving side can gate on it), emits `rmw_publish`, and stamps the
    /// envelope via the participant's writer.
    pub fn publish(
        &mut self,
        dds: &mut Participant,
        registry: &TypeRegistry,
        trace: &mut TraceLog,
        now: u64,
        handle: RmwPublisherHandle,
        mut envelope: Envelope,
    ) -> Result<Envelope, SimError> {
        let entry = self
            .publishers
            .get(handle)
            .ok_or(SimError::UnknownHandle(handle.raw()))?;
        envelope.qos_hint = Some(entry.qos);
        envelope.serialized_size = Some(registry.estimate_size(&envelope.payload));
        trace.log_event(
            "rmw_publish",
            vec![
                ("publisher_handle", FieldValue::from(handle.raw())),
                ("msg", FieldValue::from(envelope.id.raw())),
                ("topic", FieldValue::from(entry.topic.clone())),
            ],
            Some(self.context.clone()),
            now,
        );
        dds.write_data(entry.writer, envelope, now)
    }

    /// Runs delivery gating (`spec.md §4.3`) over every reader match the
    /// participant produced, emitting `rmw_take` for accepted deliveries
    /// and `qos_incompatible` for rejected ones. Returns only the
    /// accepted deliveries for the inner client library to take further.
    pub fn deliver(
        &self,
        trace: &mut TraceLog,
        now: u64,
        matches: Vec<crate::dds::Delivery>,
    ) -> Vec<Delivery> {
        let mut accepted = Vec::new();
        for m in matches {
            let Some(sub) = self.subscriptions.get(m.owner) else {
                continue;
            };
            let publisher_qos = m
                .envelope
                .qos_hint
                .map(InnerQos::to_lower)
                .unwrap_or_default();
            match crate::qos::check_compatible(&publisher_qos, &m.qos) {
                Ok(()) => {
                    trace.log_event(
                        "rmw_take",
                        vec![
                            ("subscription_handle", FieldValue::from(m.owner.raw())),
                            ("msg", FieldValue::from(m.envelope.id.raw())),
                            ("topic", FieldValue::from(sub.topic.clone())),
                        ],
                        Some(self.context.clone()),
                        now,
                    );
                    accepted.push(Delivery {
                        subscription: m.owner,
                        envelope: m.envelope,
                    });
                }
                Err(reason) => {
                    trace.log_event(
                        "qos_incompatible",
                        vec![
                            ("subscription_handle", FieldValue::from(m.owner.raw())),
                            ("topic", FieldValue::from(sub.topic.clone())),
                            ("reason", FieldValue::from(reason.to_string())),
                        ],
                        Some(self.context.clone()),
                        now,
                    );
                }
            }
        }
        accepted
    }

    fn emit_graph_event(&self, trace: &mut TraceLog, now: u64, kind: &'static str, topic: &str, node: &str) {
        trace.log_event(
            "rmw_graph_event",
            vec![
                ("event_kind", FieldValue::from(kind)),
                ("topic", FieldValue::from(topic)),
                ("node", FieldValue::from(node)),
            ],
            Some(self.context.clone()),
            now,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Handle, MessageId, MessageKind};

    fn envelope() -> Envelope {
        Envelope::new(MessageId::from_raw(Handle::new(1)), "/t", MessageKind::Data, vec![1, 2, 3])
    }

    #[test]
    fn publish_emits_rmw_publish_and_stamps_writer() {
        let mut dds = Participant::new(0);
        let mut mw = Middleware::new("rmw");
        let mut trace = TraceLog::new();
        let registry = TypeRegistry::default();
        let pub_h = mw.create_publisher(&mut dds, &mut trace, 0, "N", "/t", InnerQos::default());
        let stamped = mw
            .publish(&mut dds, &registry, &mut trace, 0, pub_h, envelope())
            .unwrap();
        assert_eq!(stamped.sequence_number, Some(0));
        assert!(trace.events_of_kind("rmw_publish").count() == 1);
    }

    #[test]
    fn incompatible_delivery_is_rejected_not_taken() {
        let mut dds = Participant::new(0);
        let mut mw = Middleware::new("rmw");
        let mut trace = TraceLog::new();
        let registry = TypeRegistry::default();
        let pub_h = mw.create_publisher(&mut dds, &mut trace, 0, "A", "/t", InnerQos::best_effort());
        let sub_h = mw.create_subscription(&mut dds, &mut trace, 0, "B", "/t", InnerQos::default());
        let stamped = mw
            .publish(&mut dds, &registry, &mut trace, 0, pub_h, envelope())
            .unwrap();
        let matches = dds.on_inbound(&stamped);
        let accepted = mw.deliver(&mut trace, 0, matches);
        assert!(accepted.is_empty());
        assert_eq!(trace.events_of_kind("qos_incompatible").count(), 1);
        let _ = sub_h;
    }

    #[test]
    fn compatible_delivery_is_taken() {
        let mut dds = Participant::new(0);
        let mut mw = Middleware::new("rmw");
        let mut trace = TraceLog::new();
        let registry = TypeRegistry::default();
        let pub_h = mw.create_publisher(&mut dds, &mut trace, 0, "A", "/t", InnerQos::default());
        mw.create_subscription(&mut dds, &mut trace, 0, "B", "/t", InnerQos::default());
        let stamped = mw
            .publish(&mut dds, &registry, &mut trace, 0, pub_h, envelope())
            .unwrap();
        let matches = dds.on_inbound(&stamped);
        let accepted = mw.deliver(&mut trace, 0, matches);
        assert_eq!(accepted.len(), 1);
        assert_eq!(trace.events_of_kind("rmw_take").count(), 1);
    }
}
