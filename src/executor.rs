// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The waitset-driven callback dispatcher (C6, `spec.md §4.6`).
//!
//! Per the "dynamic callbacks" design note (`spec.md §9`), user callbacks
//! are modeled as capability handles rather than closures: a
//! [`CallbackAction`] is a small, cloneable description of what firing a
//! callback *does*, invoked by value each time its owning work item is
//! dispatched. This sidesteps re-entrant borrows into the simulation (a
//! timer callback that itself publishes would otherwise need to call back
//! into the very executor driving it) while still letting a subscription
//! or timer callback trigger a downstream publish.

use std::collections::VecDeque;

use crate::core::{Envelope, Handle};
use crate::error::SimError;
use crate::trace::{FieldValue, TraceLog};

/// What a callback does when invoked. `Publish` is handed back to the
/// caller of [`Executor::dispatch`] to re-enter the publish path; `NoOp`
/// and `Raise` are fully handled inside `dispatch`.
#[derive(Clone, Debug, PartialEq)]
pub enum CallbackAction {
    NoOp,
    Publish {
        publisher: crate::core::PublisherHandle,
        payload: Vec<u8>,
    },
    Raise(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkKind {
    Timer,
    Subscription,
    GuardCondition,
}

impl WorkKind {
    fn trace_tag(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Subscription => "subscription",
            Self::GuardCondition => "guard_condition",
        }
    }
}

/// A unit of dispatchable work (`spec.md §4.6`).
pub struct WorkItem {
    pub kind: WorkKind,
    pub handle: Handle,
    pub callback: CallbackAction,
    pub message: Option<Envelope>,
    pub cancelled: bool,
}

/// Outcome of dispatching one work item, for the caller to act on.
pub enum Dispatched {
    Cancelled,
    /// The callback ran; `action` is `None` for `NoOp` (or a caught
    /// `Raise`, which is reported via `error`), `Some(..)` for `Publish`
    /// so the caller can re-enter the publish path.
    Ran {
        action: Option<CallbackAction>,
        error: Option<SimError>,
    },
}

/// Three priority-ordered FIFO queues: timers > subscriptions > guard
/// conditions (`spec.md §4.6`).
#[derive(Default)]
pub struct Executor {
    timers: VecDeque<WorkItem>,
    subscriptions: VecDeque<WorkItem>,
    guards: VecDeque<WorkItem>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: WorkItem) {
        match item.kind {
            WorkKind::Timer => self.timers.push_back(item),
            WorkKind::Subscription => self.subscriptions.push_back(item),
            WorkKind::GuardCondition => self.guards.push_back(item),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty() && self.subscriptions.is_empty() && self.guards.is_empty()
    }

    fn pop_next(&mut self) -> Option<WorkItem> {
        self.timers
            .pop_front()
            .or_else(|| self.subscriptions.pop_front())
            .or_else(|| self.guards.pop_front())
    }

    /// Pop and run the highest-priority pending item, emitting
    /// `callback_start`/`callback_end` (or `callback_cancelled`) around
    /// the invocation (`spec.md §4.6`).
    pub fn dispatch(&mut self, trace: &mut TraceLog, now: u64, context: &str) -> Option<Dispatched> {
        let item = self.pop_next()?;
        if item.cancelled {
            trace.log_event(
                "callback_cancelled",
                vec![
                    ("handle", FieldValue::from(item.handle)),
                    ("kind", FieldValue::from(item.kind.trace_tag())),
                ],
                Some(context.to_string()),
                now,
            );
            return Some(Dispatched::Cancelled);
        }
        trace.log_event(
            "callback_start",
            vec![
                ("handle", FieldValue::from(item.handle)),
                ("kind", FieldValue::from(item.kind.trace_tag())),
            ],
            Some(context.to_string()),
            now,
        );
        let (action, error) = match item.callback {
            CallbackAction::NoOp => (None, None),
            CallbackAction::Publish { publisher, payload } => (
                Some(CallbackAction::Publish { publisher, payload }),
                None,
            ),
            CallbackAction::Raise(message) => (
                None,
                Some(SimError::CallbackError {
                    handle: item.handle,
                    message,
                }),
            ),
        };
        trace.log_event(
            "callback_end",
            vec![
                ("handle", FieldValue::from(item.handle)),
                ("kind", FieldValue::from(item.kind.trace_tag())),
            ],
            Some(context.to_string()),
            now,
        );
        Some(Dispatched::Ran { action, error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PublisherHandle;

    fn item(kind: WorkKind) -> WorkItem {
        WorkItem {
            kind,
            handle: Handle::new(1),
            callback: CallbackAction::NoOp,
            message: None,
            cancelled: false,
        }
    }

    #[test]
    fn timers_dispatch_before_subscriptions() {
        let mut exec = Executor::new();
        exec.push(item(WorkKind::Subscription));
        exec.push(item(WorkKind::Timer));
        let mut trace = TraceLog::new();
        exec.dispatch(&mut trace, 0, "executor");
        // The timer queue is drained first regardless of push order.
        assert!(exec.timers.is_empty());
        assert_eq!(exec.subscriptions.len(), 1);
    }

    #[test]
    fn cancelled_item_skips_invocation() {
        let mut exec = Executor::new();
        let mut cancelled = item(WorkKind::GuardCondition);
        cancelled.cancelled = true;
        exec.push(cancelled);
        let mut trace = TraceLog::new();
        let outcome = exec.dispatch(&mut trace, 0, "executor").unwrap();
        assert!(matches!(outcome, Dispatched::Cancelled));
        assert_eq!(trace.events_of_kind("callback_cancelled").count(), 1);
        assert_eq!(trace.events_of_kind("callback_start").count(), 0);
    }

    #[test]
    fn raise_surfaces_as_callback_error() {
        let mut exec = Executor::new();
        let mut raising = item(WorkKind::Timer);
        raising.callback = CallbackAction::Raise("boom".into());
        exec.push(raising);
        let mut trace = TraceLog::new();
        let outcome = exec.dispatch(&mut trace, 0, "executor").unwrap();
        match outcome {
            Dispatched::Ran { error: Some(SimError::CallbackError { .. }), .. } => {}
            _ => panic!("expected callback error"),
        }
    }

    #[test]
    fn publish_action_is_returned_for_caller_to_reenter() {
        let mut exec = Executor::new();
        let mut publishing = item(WorkKind::Timer);
        publishing.callback = CallbackAction::Publish {
            publisher: PublisherHandle::from_raw(Handle::new(5)),
            payload: vec![1, 2, 3],
        };
        exec.push(publishing);
        let mut trace = TraceLog::new();
        let outcome = exec.dispatch(&mut trace, 0, "executor").unwrap();
        match outcome {
            Dispatched::Ran { action: Some(CallbackAction::Publish { .. }), .. } => {}
            _ => panic!("expected publish action"),
        }
    }
}
