// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport multiplexer (C1, `spec.md §4.1`).
//!
//! Models loopback/shared-memory/UDP/TCP cost and ordering without
//! realizing actual wire delivery (`spec.md §1` Non-goal 1). An outbound
//! envelope is held for a modeled latency, then handed back to the DDS
//! participant as an inbound envelope, or dropped. FIFO is preserved
//! within a `(writer_guid, topic)` pair (the `(src, dst, topic)` triple of
//! `spec.md §4.1`, collapsed because every simulated participant is
//! local); reordering across pairs is permitted and, in this
//! implementation, occurs naturally because each pair has its own queue
//! with its own latency.

use std::collections::{HashMap, VecDeque};

use crate::core::{Envelope, WriterGuid};
use crate::devs::{Machine, TimeAdvance};
use crate::qos::Reliability;
use crate::sim::Effect;
use crate::trace::{FieldValue, TraceLog};

/// Transport kind tag carried on outbound envelopes (`spec.md §4.1`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    IntraProcess,
    Shmem,
    Udp,
    Tcp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::IntraProcess => "INTRAPROCESS",
            Self::Shmem => "SHMEM",
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
        };
        write!(f, "{s}")
    }
}

/// Cost model parameters for one transport kind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostModel {
    pub base_latency_ns: u64,
    pub per_byte_latency_ns: u64,
    /// Drop probability in `[0, 1]`, only meaningful for best-effort paths.
    pub drop_probability: f64,
}

impl TransportKind {
    pub fn default_cost(self) -> CostModel {
        match self {
            Self::IntraProcess => CostModel {
                base_latency_ns: 0,
                per_byte_latency_ns: 0,
                drop_probability: 0.0,
            },
            Self::Shmem => CostModel {
                base_latency_ns: 500,
                per_byte_latency_ns: 1,
                drop_probability: 0.0,
            },
            Self::Udp => CostModel {
                base_latency_ns: 50_000,
                per_byte_latency_ns: 8,
                drop_probability: 0.001,
            },
            Self::Tcp => CostModel {
                base_latency_ns: 150_000,
                per_byte_latency_ns: 8,
                drop_probability: 0.0,
            },
        }
    }
}

struct InFlight {
    deliver_at: u64,
    envelope: Envelope,
    kind: TransportKind,
}

/// A deterministic xorshift64* generator, used only to decide modeled
/// drops reproducibly (`spec.md` P7: identical seed, identical trace).
/// Not suitable outside this narrow use.
struct DropRng(u64);

impl DropRng {
    /// Seeds and warms up the generator: a handful of low-entropy seeds
    /// (1, 7, 42, ...) otherwise produce a tiny, heavily-correlated first
    /// `next_u64`, which under the UDP drop probability always drops the
    /// very first message.
    fn seeded(seed: u64) -> Self {
        let mut rng = Self(seed | 1);
        for _ in 0..16 {
            rng.next_u64();
        }
        rng
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn next_unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// The transport multiplexer atomic machine.
pub struct TransportMultiplexer {
    cost: HashMap<TransportKind, CostModel>,
    queues: HashMap<(WriterGuid, String), VecDeque<InFlight>>,
    rng: DropRng,
    context: String,
}

impl TransportMultiplexer {
    pub fn new(seed: u64, context: String) -> Self {
        let mut cost = HashMap::new();
        for kind in [
            TransportKind::IntraProcess,
            TransportKind::Shmem,
            TransportKind::Udp,
            TransportKind::Tcp,
        ] {
            cost.insert(kind, kind.default_cost());
        }
        Self {
            cost,
            queues: HashMap::new(),
            rng: DropRng::seeded(seed),
            context,
        }
    }

    pub fn set_cost(&mut self, kind: TransportKind, cost: CostModel) {
        self.cost.insert(kind, cost);
    }

    /// Enqueue an outbound envelope from the DDS participant.
    pub fn send(&mut self, writer: WriterGuid, kind: TransportKind, envelope: Envelope, now: u64) {
        let cost = self.cost.get(&kind).copied().unwrap_or(kind.default_cost());
        let delay = cost.base_latency_ns + cost.per_byte_latency_ns * envelope.payload.len() as u64;
        let topic = envelope.topic.clone();
        self.queues
            .entry((writer, topic))
            .or_default()
            .push_back(InFlight {
                deliver_at: now + delay,
                envelope,
                kind,
            });
    }

    fn earliest(&self) -> Option<u64> {
        self.queues
            .values()
            .filter_map(|q| q.front().map(|f| f.deliver_at))
            .min()
    }
}

impl Machine for TransportMultiplexer {
    fn name(&self) -> &'static str {
        "TRANSPORT"
    }

    fn time_advance(&self, now: u64) -> TimeAdvance {
        match self.earliest() {
            Some(at) => TimeAdvance::At(at.saturating_sub(now)),
            None => TimeAdvance::Infinity,
        }
    }

    fn output(&mut self, now: u64, trace: &mut TraceLog) -> Vec<Effect> {
        let ready_keys: Vec<(WriterGuid, String)> = self
            .queues
            .iter()
            .filter(|&(_, q)| q.front().map(|f| f.deliver_at) == Some(now))
            .map(|(k, _)| k.clone())
            .collect();
        let Some(key) = ready_keys.into_iter().min_by(|a, b| a.1.cmp(&b.1)) else {
            return Vec::new();
        };
        let queue = self.queues.get_mut(&key).expect("key just observed");
        let item = queue.pop_front().expect("front checked above");

        let cost = self
            .cost
            .get(&item.kind)
            .copied()
            .unwrap_or(item.kind.default_cost());
        let lossy = item
            .envelope
            .qos_hint
            .map(|q| q.reliability == Reliability::BestEffort)
            .unwrap_or(false);
        if lossy && cost.drop_probability > 0.0 && self.rng.next_unit() < cost.drop_probability {
            trace.log_event(
                "transport_drop",
                vec![
                    ("topic", FieldValue::from(item.envelope.topic.clone())),
                    ("kind", FieldValue::from(item.kind.to_string())),
                ],
                Some(self.context.clone()),
                now,
            );
            return Vec::new();
        }
        vec![Effect::ToDds(crate::dds::DdsOp::Inbound(item.envelope))]
    }

    fn internal_transition(&mut self, _now: u64) {
        // The item was already popped in `output`; nothing further to do.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Handle, MessageId, MessageKind};

    fn envelope() -> Envelope {
        Envelope::new(MessageId::from_raw(Handle::new(1)), "/t", MessageKind::Data, vec![0; 100])
    }

    #[test]
    fn intraprocess_has_zero_cost() {
        let mut mux = TransportMultiplexer::new(42, "transport".into());
        let writer = WriterGuid::from_raw(Handle::new(1));
        mux.send(writer, TransportKind::IntraProcess, envelope(), 1000);
        assert_eq!(mux.time_advance(1000), TimeAdvance::At(0));
    }

    #[test]
    fn udp_has_nonzero_base_latency() {
        let mut mux = TransportMultiplexer::new(42, "transport".into());
        let writer = WriterGuid::from_raw(Handle::new(1));
        mux.send(writer, TransportKind::Udp, envelope(), 0);
        let ta = mux.time_advance(0);
        assert!(matches!(ta, TimeAdvance::At(ns) if ns > 0));
    }

    #[test]
    fn fifo_within_same_writer_topic_pair() {
        let mut mux = TransportMultiplexer::new(7, "transport".into());
        let writer = WriterGuid::from_raw(Handle::new(1));
        let mut e1 = envelope();
        e1.id = MessageId::from_raw(Handle::new(1));
        let mut e2 = envelope();
        e2.id = MessageId::from_raw(Handle::new(2));
        mux.send(writer, TransportKind::IntraProcess, e1, 0);
        mux.send(writer, TransportKind::IntraProcess, e2, 0);
        let q = mux.queues.get(&(writer, "/t".to_string())).unwrap();
        assert_eq!(q[0].envelope.id, MessageId::from_raw(Handle::new(1)));
        assert_eq!(q[1].envelope.id, MessageId::from_raw(Handle::new(2)));
    }
}
