// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cross-layer primitives: opaque handles, arena tables, and the message
//! envelope shared by every layer (`spec.md §3`).

/// Opaque per-layer handles and arena-backed handle tables.
pub mod handle;

pub use handle::{
    GuardHandle, Handle, HandleCounter, HandleTable, MessageId, NodeHandle, PublisherHandle,
    ReaderGuid, RmwPublisherHandle, RmwSubscriptionHandle, SubscriptionHandle, TimerHandle,
    WriterGuid,
};

use std::fmt;

/// Message-kind tag carried by every envelope (`spec.md §3`). Service and
/// action kinds are carried as opaque tags only — the request/reply and
/// action-protocol state machines themselves are out of scope
/// (`spec.md §1` Non-goals; `SPEC_FULL.md §11`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Data,
    ServiceRequest,
    ServiceResponse,
    ActionGoal,
    ActionFeedback,
    ActionResult,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Data => "DATA",
            Self::ServiceRequest => "SERVICE_REQUEST",
            Self::ServiceResponse => "SERVICE_RESPONSE",
            Self::ActionGoal => "ACTION_GOAL",
            Self::ActionFeedback => "ACTION_FEEDBACK",
            Self::ActionResult => "ACTION_RESULT",
        };
        write!(f, "{s}")
    }
}

/// A data-carrying artifact moving through the layers. The payload is an
/// opaque blob — message type dataclasses are an external collaborator
/// (`spec.md §1`).
#[derive(Clone, Debug)]
pub struct Envelope {
    pub id: MessageId,
    pub topic: String,
    pub created_at_vt: u64,
    pub kind: MessageKind,
    pub qos_hint: Option<crate::qos::InnerQos>,
    pub payload: Vec<u8>,
    /// Set by the DDS participant when written (`spec.md §4.2`).
    pub writer_guid: Option<WriterGuid>,
    pub sequence_number: Option<u64>,
    /// Set by the middleware at publish time (`spec.md §4.3`).
    pub serialized_size: Option<usize>,
}

impl Envelope {
    pub fn new(id: MessageId, topic: impl Into<String>, kind: MessageKind, payload: Vec<u8>) -> Self {
        Self {
            id,
            topic: topic.into(),
            created_at_vt: 0,
            kind,
            qos_hint: None,
            payload,
            writer_guid: None,
            sequence_number: None,
            serialized_size: None,
        }
    }
}
