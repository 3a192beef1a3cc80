// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The coupled DEVS composition (`spec.md §2`, §5) and its public API.
//!
//! [`Simulation`] owns every component and drives the scheduler described
//! in `crate::devs`. Three components have a genuine autonomous
//! time-advance and are scheduled through [`crate::devs::select_next`]:
//! the transport multiplexer, the inner client library (its timer
//! manager), and the user client library (its executor spin loop). The
//! middleware abstraction and DDS participant are purely reactive and are
//! invoked as ordinary method calls from whichever of the three drives
//! them at a given step — matching `spec.md §9`'s instruction to keep the
//! coupling explicit rather than relying on an implicit global bus.

use crate::config::{ContextRegistry, Configuration};
use crate::core::Envelope;
use crate::devs::{select_next, Machine};
use crate::dds::{DdsOp, Participant};
use crate::error::SimError;
use crate::executor::WorkItem;
use crate::icl::Icl;
use crate::registry::TypeRegistry;
use crate::rmw::Middleware;
use crate::transport::TransportMultiplexer;
use crate::trace::TraceLog;
use crate::ucl::{Layers, Operation, Ucl};

/// Effects a [`Machine`] hands back to the simulation to route to a
/// sibling component. Only machines whose output can't directly hold
/// `&mut` references to the components it must call into (because the
/// simulation itself owns the borrow) return these; see
/// [`crate::devs::Machine::output`].
pub enum Effect {
    /// An envelope the transport multiplexer has delivered to the DDS
    /// participant's inbound side.
    ToDds(DdsOp),
    /// A work item the inner client library's timer manager produced for
    /// the executor (owned by [`crate::ucl::Ucl`]).
    ToExecutor(WorkItem),
}

const TRANSPORT_CONTEXT: &str = "transport";
const RCL_CONTEXT: &str = "rcl";
const RMW_CONTEXT: &str = "rmw";
const RCLCPP_CONTEXT: &str = "rclcpp";

pub struct Simulation {
    now: u64,
    config: Configuration,
    contexts: ContextRegistry,
    trace: TraceLog,
    dds: Participant,
    mw: Middleware,
    icl: Icl,
    ucl: Ucl,
    transport: TransportMultiplexer,
    registry: TypeRegistry,
}

impl Simulation {
    pub fn new(config: Configuration, seed: u64) -> Result<Self, SimError> {
        config.validate()?;
        let mut contexts = ContextRegistry::new();
        contexts.register(RCLCPP_CONTEXT);
        contexts.register(RCL_CONTEXT);
        contexts.register(RMW_CONTEXT);
        contexts.register(TRANSPORT_CONTEXT);
        Ok(Self {
            now: 0,
            dds: Participant::new(config.domain_id),
            mw: Middleware::new(RMW_CONTEXT),
            icl: Icl::new(RCL_CONTEXT),
            ucl: Ucl::new(RCLCPP_CONTEXT, config.executor_spin_period_us),
            transport: TransportMultiplexer::new(seed, TRANSPORT_CONTEXT.to_string()),
            registry: TypeRegistry::default(),
            contexts,
            config,
            trace: TraceLog::new(),
        })
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    /// Looks up a publisher already created on `node_name` for `topic`,
    /// for callers building a timer or subscription callback that
    /// publishes on it.
    pub fn publisher_handle(&self, node_name: &str, topic: &str) -> Option<crate::core::PublisherHandle> {
        self.ucl.publisher_handle(node_name, topic)
    }

    pub fn tee_trace_to(&mut self, w: Box<dyn std::io::Write + Send>) {
        self.trace.tee_to(w);
    }

    /// Submits one application operation descriptor (`spec.md §6`),
    /// applying the error-propagation policy from `spec.md §7`: a
    /// recoverable failure is traced under its own `trace_kind` and
    /// swallowed, a fatal one is returned to the caller.
    pub fn submit(&mut self, op: Operation) -> Result<(), SimError> {
        let mut layers = Layers {
            icl: &mut self.icl,
            mw: &mut self.mw,
            dds: &mut self.dds,
            registry: &self.registry,
        };
        let result = self.ucl.submit(&mut layers, &mut self.trace, self.now, op);
        match result {
            Ok(Some(envelope)) => {
                self.forward_to_transport(envelope);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) if e.is_recoverable() => {
                self.trace.log_event(
                    e.trace_kind(),
                    vec![("detail", crate::trace::FieldValue::from(e.to_string()))],
                    Some(RCL_CONTEXT.to_string()),
                    self.now,
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn forward_to_transport(&mut self, envelope: Envelope) {
        let writer = envelope
            .writer_guid
            .expect("mw::Middleware::publish always stamps writer_guid");
        self.transport
            .send(writer, self.config.transport_default_kind, envelope, self.now);
    }

    fn route(&mut self, effects: Vec<Effect>) -> Result<(), SimError> {
        for effect in effects {
            match effect {
                Effect::ToDds(DdsOp::Inbound(envelope)) => {
                    let matches = self.dds.on_inbound(&envelope);
                    let accepted = self.mw.deliver(&mut self.trace, self.now, matches);
                    for delivery in accepted {
                        let Some(sub) = self.icl.subscription_by_rmw(delivery.subscription) else {
                            continue;
                        };
                        let (callback, envelope) =
                            self.icl.take(&mut self.trace, self.now, sub, delivery.envelope)?;
                        self.ucl.take(&mut self.trace, self.now, sub, callback, envelope);
                    }
                }
                Effect::ToExecutor(item) => self.ucl.push_timer_work(item),
            }
        }
        Ok(())
    }

    /// Runs the cooperative scheduler (`spec.md §5`) until either virtual
    /// time `end_time` is reached or every machine reports `Infinity`
    /// (quiescence).
    pub fn run_until(&mut self, end_time: u64) -> Result<(), SimError> {
        loop {
            let candidates = [
                ("ICL", self.icl.time_advance(self.now)),
                ("TRANSPORT", self.transport.time_advance(self.now)),
                ("UCL", self.ucl.time_advance(self.now)),
            ];
            let Some((name, delta)) = select_next(&candidates) else {
                return Ok(());
            };
            let next_now = self.now.saturating_add(delta);
            if next_now > end_time {
                return Ok(());
            }
            self.now = next_now;
            match name {
                "ICL" => {
                    let effects = self.icl.output(self.now, &mut self.trace);
                    self.icl.internal_transition(self.now);
                    self.route(effects)?;
                }
                "TRANSPORT" => {
                    let effects = self.transport.output(self.now, &mut self.trace);
                    self.transport.internal_transition(self.now);
                    self.route(effects)?;
                }
                "UCL" => {
                    let mut layers = Layers {
                        icl: &mut self.icl,
                        mw: &mut self.mw,
                        dds: &mut self.dds,
                        registry: &self.registry,
                    };
                    let stamped = self.ucl.spin_once(&mut layers, &mut self.trace, self.now)?;
                    if let Some(envelope) = stamped {
                        self.forward_to_transport(envelope);
                    }
                }
                _ => unreachable!("select_next only returns names from `candidates`"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CallbackAction;
    use crate::qos::InnerQos;

    fn sim() -> Simulation {
        Simulation::new(Configuration::default(), 7).unwrap()
    }

    #[test]
    fn single_pub_sub_same_node_is_intra_process() {
        let mut s = sim();
        s.submit(Operation::CreateNode { name: "N".into() }).unwrap();
        s.submit(Operation::CreatePublisher {
            node_name: "N".into(),
            topic: "/t".into(),
            qos: InnerQos::default(),
        })
        .unwrap();
        s.submit(Operation::CreateSubscription {
            node_name: "N".into(),
            topic: "/t".into(),
            qos: InnerQos::default(),
            callback: CallbackAction::NoOp,
        })
        .unwrap();
        s.submit(Operation::Publish {
            node_name: Some("N".into()),
            topic: Some("/t".into()),
            publisher_handle: None,
            payload: vec![1, 2, 3],
        })
        .unwrap();
        s.run_until(1_000_000).unwrap();
        assert_eq!(s.trace().events_of_kind("rmw_publish").count(), 0);
        assert_eq!(s.trace().events_of_kind("rclcpp_take").count(), 1);
        assert_eq!(s.trace().events_of_kind("callback_start").count(), 1);
    }

    #[test]
    fn cross_node_publish_goes_through_rmw() {
        let mut s = sim();
        s.submit(Operation::CreateNode { name: "A".into() }).unwrap();
        s.submit(Operation::CreateNode { name: "B".into() }).unwrap();
        s.submit(Operation::CreatePublisher {
            node_name: "A".into(),
            topic: "/t".into(),
            qos: InnerQos::default(),
        })
        .unwrap();
        s.submit(Operation::CreateSubscription {
            node_name: "B".into(),
            topic: "/t".into(),
            qos: InnerQos::default(),
            callback: CallbackAction::NoOp,
        })
        .unwrap();
        s.submit(Operation::Publish {
            node_name: Some("A".into()),
            topic: Some("/t".into()),
            publisher_handle: None,
            payload: vec![9],
        })
        .unwrap();
        s.run_until(10_000_000).unwrap();
        assert_eq!(s.trace().events_of_kind("rmw_publish").count(), 1);
        assert_eq!(s.trace().events_of_kind("rmw_take").count(), 1);
        assert_eq!(s.trace().events_of_kind("callback_start").count(), 1);
    }

    #[test]
    fn lifecycle_disable_blocks_publish() {
        let mut s = sim();
        s.submit(Operation::CreateNode { name: "N".into() }).unwrap();
        s.submit(Operation::CreatePublisher {
            node_name: "N".into(),
            topic: "/t".into(),
            qos: InnerQos::default(),
        })
        .unwrap();
        s.submit(Operation::Lifecycle {
            target_node: "N".into(),
            enable_publishers: Some(false),
            enable_timers: None,
        })
        .unwrap();
        s.submit(Operation::Publish {
            node_name: Some("N".into()),
            topic: Some("/t".into()),
            publisher_handle: None,
            payload: vec![9],
        })
        .unwrap();
        assert_eq!(s.trace().events_of_kind("publisher_disabled").count(), 1);
        assert_eq!(s.trace().events_of_kind("rcl_publish").count(), 0);
    }
}
