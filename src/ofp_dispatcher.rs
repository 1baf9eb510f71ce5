//! Routing of switch messages to application handlers.
//!
//! The application value lives behind a single mutex, the handler gate. Every handler
//! invocation (message handlers from any connection thread, timer handlers, `start`)
//! takes the gate, so at most one handler body runs at any instant. Message I/O does
//! not take the gate and proceeds concurrently.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use tracing::debug;

use crate::ofp_controller::{HandlerResult, OfpController};
use crate::ofp_registry::Registry;
use crate::openflow0x01::message::Message;
use crate::openflow0x01::PortReason;

pub struct Dispatcher<C> {
    app: Mutex<C>,
    registry: Arc<Registry>,
}

impl<C: OfpController> Dispatcher<C> {
    pub fn new(app: C, registry: Arc<Registry>) -> Dispatcher<C> {
        Dispatcher {
            app: Mutex::new(app),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // A handler that panicked left the gate poisoned; keep serving.
    fn gate(&self) -> MutexGuard<'_, C> {
        self.app.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one handler while holding the gate.
    pub fn invoke<F>(&self, handler: F) -> HandlerResult
        where F: FnOnce(&mut C, &Registry) -> HandlerResult
    {
        let mut app = self.gate();
        handler(&mut app, &self.registry)
    }

    /// Inspect or modify the application outside of any event, still under the gate.
    pub fn with_app<R, F: FnOnce(&mut C) -> R>(&self, f: F) -> R {
        f(&mut self.gate())
    }

    /// Deliver one message received from `dpid` to the application.
    ///
    /// Non-keepalive messages are logged in the registry and passed to
    /// `message_received` first. Then exactly one kind-specific handler runs, or none
    /// for kinds the controller does not route.
    pub fn route(&self, dpid: u64, xid: u32, msg: Message) -> HandlerResult {
        if !matches!(msg, Message::EchoRequest(_)) {
            debug!(dpid, kind = msg.kind(), "Switch received message");
            self.registry.append_message(dpid, xid, msg.clone());
            self.invoke(|c, reg| c.message_received(reg, dpid, xid, &msg))?;
        }

        match msg {
            Message::Error(err) => self.invoke(|c, reg| c.error(reg, dpid, xid, err)),
            Message::EchoRequest(payload) => {
                self.invoke(|c, reg| c.echo_request(reg, dpid, xid, payload))
            }
            Message::FeaturesReply(features) => {
                self.invoke(|c, reg| c.features_reply(reg, dpid, xid, features))
            }
            Message::PacketIn(pkt) => self.invoke(|c, reg| c.packet_in(reg, dpid, xid, pkt)),
            Message::PortStatus(sts) => {
                match sts.reason {
                    PortReason::PortAdd => self.invoke(|c, reg| c.port_add(reg, dpid, xid, sts)),
                    PortReason::PortDelete => {
                        self.invoke(|c, reg| c.port_delete(reg, dpid, xid, sts))
                    }
                    PortReason::PortModify => {
                        self.invoke(|c, reg| c.port_modify(reg, dpid, xid, sts))
                    }
                    PortReason::Other(code) => {
                        debug!(dpid, code, "Ignoring port status with unknown reason");
                        Ok(())
                    }
                }
            }
            Message::FlowRemoved(flow) => {
                self.invoke(|c, reg| c.flow_removed(reg, dpid, xid, flow))
            }
            _ => Ok(()),
        }
    }
}

/// Run `f`, turning a panic into an error so it ends only the calling thread's loop.
pub fn catch_handler_panic<F: FnOnce() -> HandlerResult>(f: F) -> HandlerResult {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(anyhow!("handler panicked: {}", panic_message(payload.as_ref())))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use anyhow::bail;

    use super::*;
    use crate::openflow0x01::{PortDesc, PortStatus};
    use crate::test_util::{connected, switch_read};

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl OfpController for Recorder {
        fn message_received(&mut self, _: &Registry, dpid: u64, _: u32, msg: &Message) -> HandlerResult {
            self.events.push(format!("message_received {} {}", dpid, msg.kind()));
            Ok(())
        }

        fn port_add(&mut self, _: &Registry, dpid: u64, _: u32, _: PortStatus) -> HandlerResult {
            self.events.push(format!("port_add {}", dpid));
            Ok(())
        }

        fn port_delete(&mut self, _: &Registry, dpid: u64, _: u32, _: PortStatus) -> HandlerResult {
            self.events.push(format!("port_delete {}", dpid));
            Ok(())
        }

        fn port_modify(&mut self, _: &Registry, dpid: u64, _: u32, _: PortStatus) -> HandlerResult {
            self.events.push(format!("port_modify {}", dpid));
            Ok(())
        }

        fn packet_in(&mut self, _: &Registry, _: u64, _: u32, _: crate::openflow0x01::PacketIn) -> HandlerResult {
            bail!("packet_in refused")
        }
    }

    fn dispatcher() -> Dispatcher<Recorder> {
        Dispatcher::new(Recorder::default(), Arc::new(Registry::new(None)))
    }

    fn port_status(reason: PortReason) -> Message {
        Message::PortStatus(PortStatus {
            reason,
            desc: PortDesc::new(1, "eth1"),
        })
    }

    #[test]
    fn port_status_goes_to_exactly_one_reason_handler() {
        let d = dispatcher();
        d.route(1, 0, port_status(PortReason::PortAdd)).unwrap();
        d.route(1, 0, port_status(PortReason::PortModify)).unwrap();
        d.route(1, 0, port_status(PortReason::PortDelete)).unwrap();

        let events = d.with_app(|app| app.events.clone());
        assert_eq!(events,
                   vec!["message_received 1 OFPT_PORT_STATUS",
                        "port_add 1",
                        "message_received 1 OFPT_PORT_STATUS",
                        "port_modify 1",
                        "message_received 1 OFPT_PORT_STATUS",
                        "port_delete 1"]);
    }

    #[test]
    fn unknown_port_reason_reaches_no_port_handler() {
        let registry = Arc::new(Registry::new(None));
        let d = Dispatcher::new(Recorder::default(), registry.clone());
        let (conn, _switch) = connected(2);
        registry.register(2, Arc::new(conn));

        d.route(2, 6, port_status(PortReason::Other(5))).unwrap();

        let events = d.with_app(|app| app.events.clone());
        assert_eq!(events, vec!["message_received 2 OFPT_PORT_STATUS"]);
        assert_eq!(registry.last_message_for(2),
                   Some((6, port_status(PortReason::Other(5)))));
    }

    #[test]
    fn unrouted_kinds_only_reach_message_received() {
        let d = dispatcher();
        d.route(4, 0, Message::BarrierReply).unwrap();
        d.route(4,
                0,
                Message::Other {
                    code: 0x63,
                    body: vec![],
                })
            .unwrap();

        let events = d.with_app(|app| app.events.clone());
        assert_eq!(events,
                   vec!["message_received 4 OFPT_BARRIER_REPLY",
                        "message_received 4 OFPT_OTHER"]);
    }

    #[test]
    fn echo_request_is_answered_and_not_logged() {
        let registry = Arc::new(Registry::new(None));
        let d = Dispatcher::new(Recorder::default(), registry.clone());
        let (conn, mut switch) = connected(3);
        registry.register(3, Arc::new(conn));

        d.route(3, 0x51, Message::EchoRequest(vec![1, 2])).unwrap();

        assert_eq!(switch_read(&mut switch), (0x51, Message::EchoReply(vec![1, 2])));
        assert_eq!(registry.messages_for(3), Some(vec![]));
        assert!(d.with_app(|app| app.events.is_empty()));
    }

    #[test]
    fn non_echo_messages_are_logged() {
        let registry = Arc::new(Registry::new(None));
        let d = Dispatcher::new(Recorder::default(), registry.clone());
        let (conn, _switch) = connected(3);
        registry.register(3, Arc::new(conn));

        d.route(3, 8, Message::BarrierReply).unwrap();
        assert_eq!(registry.messages_for(3), Some(vec![(8, Message::BarrierReply)]));
    }

    #[test]
    fn handler_errors_propagate() {
        let d = dispatcher();
        let pkt = crate::openflow0x01::PacketIn {
            input_payload: crate::openflow0x01::Payload::NotBuffered(vec![]),
            total_len: 0,
            port: 1,
            reason: crate::openflow0x01::PacketInReason::NoMatch,
        };
        assert!(d.route(1, 0, Message::PacketIn(pkt)).is_err());
    }

    #[test]
    fn panics_become_errors_and_gate_survives() {
        let d = dispatcher();
        let result = catch_handler_panic(|| d.invoke(|_, _| panic!("boom")));
        assert!(format!("{}", result.unwrap_err()).contains("boom"));

        d.invoke(|app, _| {
                app.events.push("after".to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(d.with_app(|app| app.events.len()), 1);
    }

    #[test]
    fn invocations_never_overlap() {
        let d = Arc::new(dispatcher());
        let spans = Arc::new(Mutex::new(Vec::new()));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let d = d.clone();
                let spans = spans.clone();
                thread::spawn(move || for _ in 0..5 {
                    d.invoke(|_, _| {
                            let entered = Instant::now();
                            thread::sleep(Duration::from_millis(2));
                            spans.lock().unwrap().push((entered, Instant::now()));
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let mut spans = spans.lock().unwrap().clone();
        spans.sort();
        assert_eq!(spans.len(), 40);
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "handler spans overlap");
        }
    }
}
