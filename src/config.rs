// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration and context registry (C9, `spec.md §4.9`).

use crate::error::SimError;
use crate::qos::InnerQos;

/// The flat configuration record from `spec.md §4.9`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "config-loader", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-loader", serde(default))]
pub struct Configuration {
    pub domain_id: u32,
    pub executor_spin_period_us: u64,
    pub serializer_format: String,
    pub transport_default_kind: crate::transport::TransportKind,
    pub real_time_simulation: bool,
    pub qos_defaults: InnerQos,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            domain_id: 0,
            executor_spin_period_us: 1000,
            serializer_format: "cdr".to_string(),
            transport_default_kind: crate::transport::TransportKind::Udp,
            real_time_simulation: false,
            qos_defaults: InnerQos::default(),
        }
    }
}

impl Configuration {
    /// Validate ranges; out-of-range values are `ConfigInvalid` (fatal,
    /// `spec.md §7` class 6), detected at init.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.executor_spin_period_us == 0 {
            return Err(SimError::ConfigInvalid(
                "executor.spin_period_us must be > 0".into(),
            ));
        }
        if self.qos_defaults.depth == 0 {
            return Err(SimError::ConfigInvalid("qos.defaults.depth must be > 0".into()));
        }
        Ok(())
    }

    #[cfg(feature = "config-loader")]
    pub fn from_yaml_str(s: &str) -> Result<Self, SimError> {
        let cfg: Self =
            serde_yaml::from_str(s).map_err(|e| SimError::ConfigInvalid(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[cfg(feature = "config-loader")]
    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::ConfigInvalid(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }
}

#[cfg(feature = "config-loader")]
impl<'de> serde::Deserialize<'de> for crate::transport::TransportKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "intraprocess" => Ok(Self::IntraProcess),
            "shmem" => Ok(Self::Shmem),
            "udp" => Ok(Self::Udp),
            "tcp" => Ok(Self::Tcp),
            other => Err(D::Error::custom(format!("unknown transport kind: {other}"))),
        }
    }
}

/// An opaque token identifying a registered component, passed with every
/// trace event for correlation (`spec.md §4.9`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(pub String);

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registers components and hands back their context tokens. A plain map
/// is sufficient here: registration happens once per component at
/// simulation construction, not on a hot path.
#[derive(Default)]
pub struct ContextRegistry {
    names: std::collections::HashSet<String>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under `(component, layer)`, returning a
    /// context token of the form `layer` (matching `spec.md §6`'s
    /// `ctx=<name>` trace suffix, e.g. `ctx=rcl`).
    pub fn register(&mut self, layer: &str) -> ContextId {
        self.names.insert(layer.to_string());
        ContextId(layer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Configuration::default().validate().is_ok());
    }

    #[test]
    fn zero_spin_period_is_invalid() {
        let cfg = Configuration {
            executor_spin_period_us: 0,
            ..Configuration::default()
        };
        assert!(matches!(cfg.validate(), Err(SimError::ConfigInvalid(_))));
    }

    #[test]
    fn context_registry_hands_back_stable_tokens() {
        let mut reg = ContextRegistry::new();
        let ctx = reg.register("rcl");
        assert_eq!(ctx.to_string(), "rcl");
    }

    #[cfg(feature = "config-loader")]
    #[test]
    fn loads_partial_yaml_over_defaults() {
        let cfg = Configuration::from_yaml_str("domain_id: 7\n").unwrap();
        assert_eq!(cfg.domain_id, 7);
        assert_eq!(cfg.executor_spin_period_us, 1000);
    }
}
