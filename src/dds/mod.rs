// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The DDS participant (C2, `spec.md §4.2`).
//!
//! Unlike the transport multiplexer, the participant has no autonomous
//! time-advance of its own — writer/reader creation, write stamping, and
//! local fan-out are instantaneous bookkeeping, so it is a plain
//! synchronous component invoked directly from [`crate::rmw`] and from
//! [`crate::sim::Simulation`]'s effect-draining loop, not a
//! [`crate::devs::Machine`]. Discovery is local-only: every participant in
//! this process sees every other (`spec.md §4.2`, "same-process
//! participants are always visible").

use crate::core::{Envelope, HandleTable, ReaderGuid, WriterGuid};
use crate::qos::LowerQos;

/// A registered writer. Owns the per-writer sequence counter
/// (`spec.md §4.2`: "per-(writer, reader) messages delivered in sequence
/// order").
pub struct Writer {
    pub guid: WriterGuid,
    pub topic: String,
    pub qos: LowerQos,
    sequence: u64,
}

impl Writer {
    fn next_sequence(&mut self) -> u64 {
        let n = self.sequence;
        self.sequence += 1;
        n
    }
}

/// A registered reader. `owner` is the RMW-level subscription this reader
/// feeds; the participant does not call into it directly (the middleware
/// is what actually owns `rmw_take` emission) — instead `on_inbound`
/// reports the set of matching readers and lets the caller drive delivery.
pub struct Reader {
    pub guid: ReaderGuid,
    pub topic: String,
    pub qos: LowerQos,
    pub owner: crate::core::RmwSubscriptionHandle,
}

/// Operations crossing into the participant from below (transport) or
/// above (middleware). Only [`DdsOp::Inbound`] is routed through
/// [`crate::sim::Effect`]; `create_writer`/`create_reader`/`write_data`
/// are ordinary method calls from `crate::rmw` since they carry no
/// modeled delay.
pub enum DdsOp {
    /// An envelope handed back by the transport multiplexer, addressed by
    /// topic (`spec.md §4.1`'s "output is the same envelope delivered on
    /// the opposite side").
    Inbound(Envelope),
}

/// One reader's acceptance of an inbound envelope, for the caller
/// (`crate::rmw`) to gate and forward.
pub struct Delivery {
    pub reader: ReaderGuid,
    pub owner: crate::core::RmwSubscriptionHandle,
    pub qos: LowerQos,
    pub envelope: Envelope,
}

pub struct Participant {
    writers: HandleTable<WriterGuid, Writer>,
    readers: HandleTable<ReaderGuid, Reader>,
    pub domain_id: u32,
}

impl Participant {
    pub fn new(domain_id: u32) -> Self {
        Self {
            writers: HandleTable::new(0),
            readers: HandleTable::new(0),
            domain_id,
        }
    }

    /// `create_writer(topic, qos) -> guid` (`spec.md §4.2`).
    pub fn create_writer(&mut self, topic: impl Into<String>, qos: LowerQos) -> WriterGuid {
        let topic = topic.into();
        self.writers.insert(|guid| Writer {
            guid,
            topic,
            qos,
            sequence: 0,
        })
    }

    /// `create_reader(topic, qos, owner) -> guid` (`spec.md §4.2`). `owner`
    /// is the RMW subscription this reader feeds inbound data to.
    pub fn create_reader(
        &mut self,
        topic: impl Into<String>,
        qos: LowerQos,
        owner: crate::core::RmwSubscriptionHandle,
    ) -> ReaderGuid {
        let topic = topic.into();
        self.readers.insert(|guid| Reader {
            guid,
            topic,
            qos,
            owner,
        })
    }

    pub fn writer(&self, guid: WriterGuid) -> Option<&Writer> {
        self.writers.get(guid)
    }

    pub fn reader(&self, guid: ReaderGuid) -> Option<&Reader> {
        self.readers.get(guid)
    }

    /// `write_data(writer_guid, envelope)` (`spec.md §4.2`): stamps the
    /// envelope with a per-writer monotonic sequence number and the
    /// writer's guid, then returns the transport kind to forward it on.
    /// Never fails with a recoverable error — an unknown writer is an
    /// invariant violation (the caller always resolves the writer via the
    /// same table it creates writers in).
    pub fn write_data(
        &mut self,
        writer_guid: WriterGuid,
        mut envelope: Envelope,
        now: u64,
    ) -> Result<Envelope, crate::error::SimError> {
        let writer = self
            .writers
            .get_mut(writer_guid)
            .ok_or(crate::error::SimError::UnknownHandle(writer_guid.raw()))?;
        envelope.writer_guid = Some(writer_guid);
        envelope.sequence_number = Some(writer.next_sequence());
        envelope.created_at_vt = now;
        Ok(envelope)
    }

    /// `on_inbound(envelope)` (`spec.md §4.2`): every local reader whose
    /// topic matches receives the envelope. Ordering across distinct
    /// readers is undefined (`spec.md §4.2`); callers iterate the returned
    /// vector in the order produced, which is table-iteration order.
    pub fn on_inbound(&self, envelope: &Envelope) -> Vec<Delivery> {
        self.readers
            .values()
            .filter(|r| r.topic == envelope.topic)
            .map(|r| Delivery {
                reader: r.guid,
                owner: r.owner,
                qos: r.qos,
                envelope: envelope.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Handle, MessageId, MessageKind, RmwSubscriptionHandle};

    fn envelope() -> Envelope {
        Envelope::new(MessageId::from_raw(Handle::new(1)), "/t", MessageKind::Data, vec![1, 2, 3])
    }

    #[test]
    fn write_data_assigns_increasing_sequence_numbers() {
        let mut p = Participant::new(0);
        let w = p.create_writer("/t", LowerQos::default());
        let e1 = p.write_data(w, envelope(), 0).unwrap();
        let e2 = p.write_data(w, envelope(), 10).unwrap();
        assert_eq!(e1.sequence_number, Some(0));
        assert_eq!(e2.sequence_number, Some(1));
    }

    #[test]
    fn on_inbound_matches_by_topic_only() {
        let mut p = Participant::new(0);
        let owner = RmwSubscriptionHandle::from_raw(Handle::new(1));
        p.create_reader("/t", LowerQos::default(), owner);
        p.create_reader("/other", LowerQos::default(), owner);
        let deliveries = p.on_inbound(&envelope());
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].owner, owner);
    }

    #[test]
    fn unknown_writer_is_reported() {
        let mut p = Participant::new(0);
        let bogus = WriterGuid::from_raw(Handle::new(999));
        assert!(p.write_data(bogus, envelope(), 0).is_err());
    }
}
