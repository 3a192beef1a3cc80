// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy (`spec.md §7`).
//!
//! Errors are not an exception channel to the application — the only
//! user-visible surface is the trace stream. This enum exists for internal
//! propagation between components and to decide, at one place, whether an
//! error is locally recoverable (dropped + traced, simulation continues)
//! or fatal (simulation terminates with a diagnostic).

use std::fmt;

use crate::core::Handle;

/// A single error condition, tagged with the layer-local handle it
/// concerns where applicable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimError {
    /// Reference to a handle not present in the owning layer's table.
    UnknownHandle(Handle),
    /// Delivery gated by QoS incompatibility (`spec.md §4.3`).
    QosIncompatible {
        topic: String,
        reason: &'static str,
    },
    /// Publish attempted from a node whose publishers are disabled.
    PublisherDisabled(Handle),
    /// Timer firing suppressed because its node's timers are disabled.
    TimerDisabled(Handle),
    /// Modeled transport loss on a best-effort path.
    TransportDrop { topic: String },
    /// A user callback raised; the owning subscription/timer continues.
    CallbackError { handle: Handle, message: String },
    /// Configuration value outside its valid range. Detected at init.
    ConfigInvalid(String),
    /// Internal consistency check failed (an I1–I5 invariant broke).
    InvariantViolation(String),
}

impl SimError {
    /// Classes 1-5: drop the offending event, trace it, keep running.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ConfigInvalid(_) | Self::InvariantViolation(_))
    }

    /// The trace event kind this error should be reported under.
    pub fn trace_kind(&self) -> &'static str {
        match self {
            Self::UnknownHandle(_) => "unknown_handle",
            Self::QosIncompatible { .. } => "qos_incompatible",
            Self::PublisherDisabled(_) => "publisher_disabled",
            Self::TimerDisabled(_) => "timer_disabled",
            Self::TransportDrop { .. } => "transport_drop",
            Self::CallbackError { .. } => "callback_error",
            Self::ConfigInvalid(_) => "config_invalid",
            Self::InvariantViolation(_) => "invariant_violation",
        }
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownHandle(h) => write!(f, "unknown handle {h}"),
            Self::QosIncompatible { topic, reason } => {
                write!(f, "QoS incompatible on {topic}: {reason}")
            }
            Self::PublisherDisabled(h) => write!(f, "publisher {h} is disabled"),
            Self::TimerDisabled(h) => write!(f, "timer {h} is disabled"),
            Self::TransportDrop { topic } => write!(f, "transport dropped message on {topic}"),
            Self::CallbackError { handle, message } => {
                write!(f, "callback {handle} raised: {message}")
            }
            Self::ConfigInvalid(msg) => write!(f, "invalid configuration: {msg}"),
            Self::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for SimError {}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_and_invariant_errors_are_fatal() {
        assert!(!SimError::ConfigInvalid("bad".into()).is_recoverable());
        assert!(!SimError::InvariantViolation("bad".into()).is_recoverable());
    }

    #[test]
    fn delivery_errors_are_recoverable() {
        assert!(SimError::UnknownHandle(Handle::new(1)).is_recoverable());
        assert!(SimError::QosIncompatible {
            topic: "/t".into(),
            reason: "reliability mismatch"
        }
        .is_recoverable());
    }
}
