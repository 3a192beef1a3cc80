// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type and cost registry (C8, `spec.md §4.8`).
//!
//! Message type dataclasses are an external collaborator (`spec.md §1`);
//! what lives here is the narrow cost-estimator interface the middleware
//! consumes at publish time, plus the serializer's size/latency model.

use std::collections::HashMap;

use crate::core::MessageKind;

/// The logical shape of a payload, for recursive size estimation
/// (`spec.md §4.8`). `Envelope::payload` itself is an opaque byte blob by
/// the time it reaches the middleware; a shape is supplied by the caller
/// at the application boundary when it wants a size estimate sharper than
/// "byte length" — e.g. to reproduce the source's per-field overhead
/// model for a structured message that hasn't been serialized yet.
#[derive(Clone, Debug, PartialEq)]
pub enum PayloadShape {
    Scalar1,
    Scalar2,
    Scalar4,
    Scalar8,
    Utf8String(usize),
    Sequence(Vec<PayloadShape>),
    Mapping(Vec<(PayloadShape, PayloadShape)>),
    Opaque(Vec<PayloadShape>),
}

const LENGTH_PREFIX_BYTES: usize = 4;
const OPAQUE_FIXED_OVERHEAD: usize = 8;

/// Recursive size estimate over a payload's logical shape
/// (`spec.md §4.8`). Monotone in content size (R2): adding any element to
/// a sequence/mapping/opaque object strictly increases the estimate.
pub fn estimate_shape_size(shape: &PayloadShape) -> usize {
    match shape {
        PayloadShape::Scalar1 => 1,
        PayloadShape::Scalar2 => 2,
        PayloadShape::Scalar4 => 4,
        PayloadShape::Scalar8 => 8,
        PayloadShape::Utf8String(len) => len + LENGTH_PREFIX_BYTES,
        PayloadShape::Sequence(items) => {
            LENGTH_PREFIX_BYTES + items.iter().map(estimate_shape_size).sum::<usize>()
        }
        PayloadShape::Mapping(pairs) => {
            LENGTH_PREFIX_BYTES
                + pairs
                    .iter()
                    .map(|(k, v)| estimate_shape_size(k) + estimate_shape_size(v))
                    .sum::<usize>()
        }
        PayloadShape::Opaque(fields) => {
            OPAQUE_FIXED_OVERHEAD + fields.iter().map(estimate_shape_size).sum::<usize>()
        }
    }
}

/// Per-format cost model: latency, cpu, and memory for a given byte count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FormatCost {
    pub throughput_bytes_per_ns: f64,
    pub base_latency_ns: u64,
    pub cpu_overhead_cycles: u64,
    pub cycles_per_byte: u64,
    pub memory_overhead_bytes: usize,
}

impl Default for FormatCost {
    fn default() -> Self {
        Self {
            throughput_bytes_per_ns: 4.0,
            base_latency_ns: 200,
            cpu_overhead_cycles: 50,
            cycles_per_byte: 2,
            memory_overhead_bytes: 32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Cost {
    pub latency_ns: u64,
    pub cpu_cycles: u64,
    pub memory_bytes: usize,
}

/// Load-dependent penalty weights for the adaptive cost variant
/// (`spec.md §4.8`: "multiplies by load-dependent penalties").
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadPenalty {
    pub cpu_weight: f64,
    pub memory_weight: f64,
    pub network_weight: f64,
    /// Additional multiplier per in-flight message beyond the first.
    pub message_rate_penalty: f64,
}

impl Default for LoadPenalty {
    fn default() -> Self {
        Self {
            cpu_weight: 1.0,
            memory_weight: 1.0,
            network_weight: 1.0,
            message_rate_penalty: 0.01,
        }
    }
}

/// Format-keyed cost table (`spec.md §4.8`). `estimate_size` uses byte
/// length directly since `Envelope::payload` already carries a serialized
/// (or pre-serialized) blob by the time the middleware touches it; the
/// shape-based estimator above is offered separately for callers that
/// still have a structured message.
pub struct TypeRegistry {
    formats: HashMap<String, FormatCost>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let mut formats = HashMap::new();
        formats.insert("cdr".to_string(), FormatCost::default());
        formats.insert(
            "cdr2".to_string(),
            FormatCost {
                throughput_bytes_per_ns: 6.0,
                base_latency_ns: 150,
                ..FormatCost::default()
            },
        );
        formats.insert(
            "json".to_string(),
            FormatCost {
                throughput_bytes_per_ns: 1.0,
                base_latency_ns: 800,
                cpu_overhead_cycles: 400,
                cycles_per_byte: 6,
                memory_overhead_bytes: 128,
            },
        );
        Self { formats }
    }
}

impl TypeRegistry {
    pub fn register_format(&mut self, name: impl Into<String>, cost: FormatCost) {
        self.formats.insert(name.into(), cost);
    }

    /// `estimate_size(payload) -> bytes` (`spec.md §4.8`).
    pub fn estimate_size(&self, payload: &[u8]) -> usize {
        payload.len()
    }

    fn format_cost(&self, format: &str) -> FormatCost {
        self.formats.get(format).copied().unwrap_or_default()
    }

    /// `cost_of(kind, bytes, format) -> {latency_ns, cpu_cycles, memory_bytes}`
    /// (`spec.md §4.8`).
    pub fn cost_of(&self, kind: MessageKind, bytes: usize, format: &str) -> Cost {
        let fc = self.format_cost(format);
        let kind_multiplier = match kind {
            MessageKind::Data => 1.0,
            MessageKind::ServiceRequest | MessageKind::ServiceResponse => 1.1,
            MessageKind::ActionGoal | MessageKind::ActionFeedback | MessageKind::ActionResult => 1.2,
        };
        let transmit_ns = (bytes as f64 / fc.throughput_bytes_per_ns) * kind_multiplier;
        Cost {
            latency_ns: fc.base_latency_ns + transmit_ns.round() as u64,
            cpu_cycles: fc.cpu_overhead_cycles + fc.cycles_per_byte * bytes as u64,
            memory_bytes: fc.memory_overhead_bytes + bytes,
        }
    }

    /// Adaptive variant: multiplies the baseline cost by load-dependent
    /// penalties (`spec.md §4.8`). `in_flight` is the number of messages
    /// concurrently outstanding on the path being costed.
    pub fn adaptive_cost_of(
        &self,
        kind: MessageKind,
        bytes: usize,
        format: &str,
        penalty: LoadPenalty,
        in_flight: usize,
    ) -> Cost {
        let base = self.cost_of(kind, bytes, format);
        let rate_factor = 1.0 + penalty.message_rate_penalty * in_flight.saturating_sub(1) as f64;
        Cost {
            latency_ns: ((base.latency_ns as f64) * penalty.network_weight * rate_factor).round() as u64,
            cpu_cycles: ((base.cpu_cycles as f64) * penalty.cpu_weight * rate_factor).round() as u64,
            memory_bytes: ((base.memory_bytes as f64) * penalty.memory_weight).round() as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_estimate_is_monotone_in_content_size() {
        let small = PayloadShape::Sequence(vec![PayloadShape::Scalar4]);
        let bigger = PayloadShape::Sequence(vec![PayloadShape::Scalar4, PayloadShape::Scalar4]);
        assert!(estimate_shape_size(&bigger) > estimate_shape_size(&small));
    }

    #[test]
    fn byte_estimate_is_payload_length() {
        let registry = TypeRegistry::default();
        assert_eq!(registry.estimate_size(&[0u8; 42]), 42);
    }

    #[test]
    fn unknown_format_falls_back_to_default_cost() {
        let registry = TypeRegistry::default();
        let cost = registry.cost_of(MessageKind::Data, 100, "unknown-format");
        assert!(cost.latency_ns > 0);
    }

    #[test]
    fn adaptive_cost_grows_with_in_flight_count() {
        let registry = TypeRegistry::default();
        let penalty = LoadPenalty::default();
        let light = registry.adaptive_cost_of(MessageKind::Data, 100, "cdr", penalty, 1);
        let heavy = registry.adaptive_cost_of(MessageKind::Data, 100, "cdr", penalty, 20);
        assert!(heavy.latency_ns > light.latency_ns);
    }
}
