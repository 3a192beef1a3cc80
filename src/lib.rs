// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # ros2-devsim - Discrete-event performance simulator for a layered ROS2-style stack
//!
//! A cooperative, single-threaded DEVS (Discrete Event System Specification)
//! model of the layers a ROS2 publish/subscribe call actually crosses: the
//! user client library, the inner client library, the middleware
//! abstraction, a DDS participant, and a transport multiplexer that models
//! loopback/shared-memory/UDP/TCP cost without realizing wire delivery.
//!
//! ## Quick Start
//!
//! ```rust
//! use ros2_devsim::{CallbackAction, Configuration, Operation, Simulation};
//! use ros2_devsim::qos::InnerQos;
//!
//! let mut sim = Simulation::new(Configuration::default(), 42).unwrap();
//! sim.submit(Operation::CreateNode { name: "talker".into() }).unwrap();
//! sim.submit(Operation::CreatePublisher {
//!     node_name: "talker".into(),
//!     topic: "/chatter".into(),
//!     qos: InnerQos::default(),
//! })
//! .unwrap();
//! sim.submit(Operation::Publish {
//!     node_name: Some("talker".into()),
//!     topic: Some("/chatter".into()),
//!     publisher_handle: None,
//!     payload: b"hello".to_vec(),
//! })
//! .unwrap();
//! sim.run_until(1_000_000).unwrap();
//! let _ = CallbackAction::NoOp;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------------------+
//! |  User Client Library (ucl)   node/pub/sub registry, executor    |
//! +-----------------------------------------------------------------+
//! |  Inner Client Library (icl)  handle tables, timers, intra-proc  |
//! +-----------------------------------------------------------------+
//! |  Middleware (rmw)            QoS gating, graph events           |
//! +-----------------------------------------------------------------+
//! |  DDS Participant (dds)       writer/reader guids, sequencing    |
//! +-----------------------------------------------------------------+
//! |  Transport (transport)       modeled latency/drop, FIFO queues  |
//! +-----------------------------------------------------------------+
//! ```
//!
//! Only the transport multiplexer, the inner client library's timer
//! manager, and the user client library's executor spin loop have a
//! genuine autonomous time-advance; they are the [`devs::Machine`]s the
//! [`sim::Simulation`] scheduler drives via [`devs::select_next`]. The
//! middleware and DDS participant introduce no modeled delay of their own
//! and are invoked as ordinary method calls from whichever machine is
//! driving a given step.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Simulation`] | Owns every layer and drives the scheduler; the crate's entry point |
//! | [`Operation`] | A user-facing request descriptor (create node, publish, ...) |
//! | [`CallbackAction`] | Declarative description of what a timer/subscription callback does |
//! | [`Configuration`] | Flat simulation configuration, optionally loaded from YAML |
//!
//! ## Modules Overview
//!
//! - [`sim`] - composition root: wires every layer into one coupled model
//! - [`ucl`] - user client library (node/publisher/subscription registry, executor spin loop)
//! - [`icl`] - inner client library (handle tables, timer manager, intra-process fast path)
//! - [`rmw`] - middleware abstraction (QoS gating, graph events)
//! - [`dds`] - DDS participant (writer/reader guids, sequencing)
//! - [`transport`] - transport multiplexer (modeled latency/drop, FIFO queues)
//! - [`executor`] - waitset-driven callback dispatcher
//! - [`registry`] - type/cost registry (size estimation, serialization cost model)
//! - [`devs`] - the DEVS scheduling core (`Machine` trait, tie-break rules)
//! - [`trace`] - ordered, structured trace emission
//! - [`qos`] - QoS profile duality and compatibility checking
//! - [`config`] - configuration and context registry
//! - [`core`] - cross-layer primitives: handles, arena tables, envelopes
//! - [`error`] - the error taxonomy shared by every layer

/// Cross-layer primitives: opaque handles, arena tables, message envelopes.
pub mod core;
/// The error taxonomy (`SimError`) shared by every layer.
pub mod error;
/// `QoS` profile duality (inner ms/infinity vs lower ns/Option) and compatibility checks.
pub mod qos;
/// The DEVS scheduling core: the `Machine` trait, time-advance, and tie-break selection.
pub mod devs;
/// Ordered, structured trace emission.
pub mod trace;
/// Configuration and context registry.
pub mod config;
/// Transport multiplexer: modeled latency/drop cost over FIFO queues.
pub mod transport;
/// The DDS participant: writer/reader guid tables and sequencing.
pub mod dds;
/// The middleware abstraction: QoS gating, graph events, publish/take.
pub mod rmw;
/// Type and cost registry: size estimation and serialization cost model.
pub mod registry;
/// The waitset-driven callback dispatcher.
pub mod executor;
/// The inner client library: handle tables, timer manager, intra-process fast path.
pub mod icl;
/// The user client library: node/publisher/subscription registry, executor spin loop.
pub mod ucl;
/// The coupled DEVS composition and its public API.
pub mod sim;

pub use config::Configuration;
pub use executor::CallbackAction;
pub use error::{SimError, SimResult};
pub use sim::Simulation;
pub use ucl::Operation;
