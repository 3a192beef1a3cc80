// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Quality-of-Service profiles and the inner/lower representation duality.
//!
//! Two parallel `QoS` shapes exist across the simulated stack:
//!
//! - [`InnerQos`]: the shape the inner client library and user client
//!   library exchange. Durations are `f64` milliseconds; "unset" is
//!   represented by `f64::INFINITY`.
//! - [`LowerQos`]: the shape the DDS participant and writer/reader tables
//!   use. Durations are `u64` nanoseconds; "unset" is `None`.
//!
//! The middleware abstraction (`crate::rmw`) coerces between the two at
//! the layer boundary. Conversion is centralized here (not duplicated at
//! each call site) so the two representations cannot drift apart.

use std::fmt;

/// Reliability policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config-loader", derive(serde::Deserialize))]
pub enum Reliability {
    Reliable,
    BestEffort,
}

/// Durability policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config-loader", derive(serde::Deserialize))]
pub enum Durability {
    Volatile,
    TransientLocal,
    Transient,
    Persistent,
}

/// History policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config-loader", derive(serde::Deserialize))]
pub enum History {
    KeepLast(u32),
    KeepAll,
}

impl fmt::Display for Reliability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reliable => write!(f, "RELIABLE"),
            Self::BestEffort => write!(f, "BEST_EFFORT"),
        }
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volatile => write!(f, "VOLATILE"),
            Self::TransientLocal => write!(f, "TRANSIENT_LOCAL"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Persistent => write!(f, "PERSISTENT"),
        }
    }
}

impl fmt::Display for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepLast(n) => write!(f, "KEEP_LAST({n})"),
            Self::KeepAll => write!(f, "KEEP_ALL"),
        }
    }
}

/// QoS profile as seen by UCL/ICL: durations in milliseconds, unset as infinity.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "config-loader", derive(serde::Deserialize))]
pub struct InnerQos {
    pub reliability: Reliability,
    pub durability: Durability,
    pub history: History,
    pub depth: u32,
    pub deadline_ms: f64,
    pub lifespan_ms: f64,
}

/// QoS profile as seen by the DDS participant/writer/reader: durations in
/// nanoseconds, unset as `None`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LowerQos {
    pub reliability: Reliability,
    pub durability: Durability,
    pub history: History,
    pub depth: u32,
    pub deadline_ns: Option<u64>,
    pub lifespan_ns: Option<u64>,
}

impl Default for InnerQos {
    fn default() -> Self {
        Self {
            reliability: Reliability::Reliable,
            durability: Durability::Volatile,
            history: History::KeepLast(10),
            depth: 10,
            deadline_ms: f64::INFINITY,
            lifespan_ms: f64::INFINITY,
        }
    }
}

impl Default for LowerQos {
    fn default() -> Self {
        Self {
            reliability: Reliability::Reliable,
            durability: Durability::Volatile,
            history: History::KeepLast(10),
            depth: 10,
            deadline_ns: None,
            lifespan_ns: None,
        }
    }
}

impl InnerQos {
    pub fn best_effort() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            ..Self::default()
        }
    }

    /// Coerce into the lower (ns/Option) representation.
    ///
    /// `inf` ms maps to `None` ns; any finite value rounds to the nearest
    /// nanosecond. This is the inverse of [`LowerQos::to_inner`].
    pub fn to_lower(self) -> LowerQos {
        LowerQos {
            reliability: self.reliability,
            durability: self.durability,
            history: self.history,
            depth: self.depth,
            deadline_ns: ms_to_ns(self.deadline_ms),
            lifespan_ns: ms_to_ns(self.lifespan_ms),
        }
    }
}

impl LowerQos {
    pub fn best_effort() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            ..Self::default()
        }
    }

    /// Coerce into the inner (ms/infinity) representation.
    pub fn to_inner(self) -> InnerQos {
        InnerQos {
            reliability: self.reliability,
            durability: self.durability,
            history: self.history,
            depth: self.depth,
            deadline_ms: ns_to_ms(self.deadline_ns),
            lifespan_ms: ns_to_ms(self.lifespan_ns),
        }
    }
}

fn ms_to_ns(ms: f64) -> Option<u64> {
    if ms.is_infinite() {
        None
    } else {
        Some((ms * 1_000_000.0).round() as u64)
    }
}

fn ns_to_ms(ns: Option<u64>) -> f64 {
    match ns {
        None => f64::INFINITY,
        Some(ns) => ns as f64 / 1_000_000.0,
    }
}

/// Reasons a publisher/subscription QoS pairing can be rejected at delivery
/// time (`spec.md §4.3`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QosMismatch {
    Reliability,
    Durability,
}

impl fmt::Display for QosMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reliability => write!(f, "reliability mismatch"),
            Self::Durability => write!(f, "durability mismatch"),
        }
    }
}

/// Check whether a publisher's QoS is compatible with a subscription's QoS
/// for delivery gating (`spec.md §4.3`).
pub fn check_compatible(publisher: &LowerQos, subscription: &LowerQos) -> Result<(), QosMismatch> {
    if subscription.reliability == Reliability::Reliable
        && publisher.reliability == Reliability::BestEffort
    {
        return Err(QosMismatch::Reliability);
    }
    if subscription.durability == Durability::TransientLocal
        && publisher.durability == Durability::Volatile
    {
        return Err(QosMismatch::Durability);
    }
    Ok(())
}
