// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The DEVS scheduling core (`spec.md §2`, §5, §9).
//!
//! This is the hard part: a single-threaded, cooperative, deterministic
//! scheduler over a fixed set of cooperating atomic machines. Each machine
//! advertises a *time-advance* (how far in virtual time until it next
//! wants to act), an *output function* (executed immediately before its
//! internal transition, and the only place traces may be emitted —
//! `spec.md §9`, normalizing invariant I4), and an *internal transition*
//! (applied once its time-advance elapses). Messages a machine emits are
//! routed to other machines' queues by [`crate::sim::Simulation`] — that
//! routing is the static coupling `spec.md §2`'s data-flow table
//! describes; "external transition" here is simply a machine's queue
//! receiving a new item (matching `rcl_layer.py`'s `extTransition`
//! appending to `pending_operations`).
//!
//! Exactly one machine executes a transition per scheduler step
//! (`spec.md §5`): the one with the smallest time-advance, ties broken by
//! machine name. This is a deliberate simplification of full parallel
//! DEVS (where all imminent machines fire together) that the spec calls
//! for explicitly: "Exactly one machine executes a transition at a time."

use std::fmt;

/// How long, in nanoseconds of virtual time, until a machine next wants
/// to run its output function and internal transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimeAdvance {
    /// Fire after `ns` nanoseconds of virtual time elapse.
    At(u64),
    /// Never fire on its own; only an external transition can wake it.
    Infinity,
}

impl TimeAdvance {
    pub fn is_infinity(self) -> bool {
        matches!(self, Self::Infinity)
    }

    pub fn ns(self) -> Option<u64> {
        match self {
            Self::At(ns) => Some(ns),
            Self::Infinity => None,
        }
    }
}

/// An atomic DEVS machine managed by the scheduler.
///
/// Implementors must not emit trace events anywhere except from
/// [`Machine::output`] — that is what keeps the trace sequence in lock
/// step with the scheduled event order (`spec.md §9`, invariant I4).
pub trait Machine {
    /// Stable identity used for scheduling tie-breaks. Must be a fixed
    /// string (not derived from mutable state).
    fn name(&self) -> &'static str;

    /// Nanoseconds of virtual time, relative to `now`, until this machine
    /// next wants to act. `TimeAdvance::Infinity` means "not unless
    /// something external wakes me".
    fn time_advance(&self, now: u64) -> TimeAdvance;

    /// Executed immediately before the internal transition, when this
    /// machine is the one selected to run. Returns the effects to route
    /// to other machines (or to the application outbox). `trace` is
    /// threaded through explicitly (rather than held by each machine)
    /// because it is the one piece of state every machine may touch, and
    /// only from here (`spec.md §9`).
    fn output(&mut self, now: u64, trace: &mut crate::trace::TraceLog) -> Vec<crate::sim::Effect>;

    /// Applied after `output`, consuming whatever state change the
    /// selected time-advance represented (e.g. popping the processed
    /// pending operation, advancing a timer's last-fire time).
    fn internal_transition(&mut self, now: u64);
}

/// Picks the next machine to run: minimum time-advance, ties broken
/// lexicographically by name (`spec.md §5`, explicit tie-break rule so
/// independent reimplementations agree).
///
/// Returns `None` if every machine reports `Infinity` — the simulation is
/// quiescent until an external operation is submitted.
pub fn select_next(candidates: &[(&'static str, TimeAdvance)]) -> Option<(&'static str, u64)> {
    candidates
        .iter()
        .filter_map(|&(name, ta)| ta.ns().map(|ns| (name, ns)))
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
}

impl fmt::Display for TimeAdvance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(ns) => write!(f, "+{ns}ns"),
            Self::Infinity => write!(f, "inf"),
        }
    }
}
