use crate::ofp_registry::Registry;
use crate::openflow0x01::message::Message;
use crate::openflow0x01::{ErrorMsg, FlowRemoved, PacketIn, PortStatus, SwitchFeatures};

/// Outcome of a handler. An `Err` ends the calling connection (or timer).
pub type HandlerResult = anyhow::Result<()>;

/// OpenFlow Controller
///
/// The handlers an application implements. Every handler has a default body, so an
/// application only overrides the events it cares about. Handlers are invoked one at
/// a time across the whole server, so `&mut self` is never shared between switches
/// or timers.
///
/// Each handler receives the `Registry`, through which it can list connected switches,
/// read their message logs and send messages.
pub trait OfpController: Send + 'static {
    /// Called once, before the server starts listening, with the startup arguments.
    fn start(&mut self, _reg: &Registry, _args: &[String]) -> HandlerResult {
        Ok(())
    }

    /// A switch completed the handshake and was registered.
    fn switch_ready(&mut self, _reg: &Registry, _dpid: u64) -> HandlerResult {
        Ok(())
    }

    /// A registered switch's connection ended.
    fn switch_disconnected(&mut self, _reg: &Registry, _dpid: u64) -> HandlerResult {
        Ok(())
    }

    /// Every message except EchoRequest, before its kind-specific handler.
    fn message_received(&mut self,
                        _reg: &Registry,
                        _dpid: u64,
                        _xid: u32,
                        _msg: &Message)
                        -> HandlerResult {
        Ok(())
    }

    fn error(&mut self, _reg: &Registry, _dpid: u64, _xid: u32, _err: ErrorMsg) -> HandlerResult {
        Ok(())
    }

    /// Replies with an EchoReply carrying the same transaction id and payload.
    fn echo_request(&mut self,
                    reg: &Registry,
                    dpid: u64,
                    xid: u32,
                    payload: Vec<u8>)
                    -> HandlerResult {
        reg.send(dpid, xid, &Message::EchoReply(payload))?;
        Ok(())
    }

    fn features_reply(&mut self,
                      _reg: &Registry,
                      _dpid: u64,
                      _xid: u32,
                      _features: SwitchFeatures)
                      -> HandlerResult {
        Ok(())
    }

    fn packet_in(&mut self, _reg: &Registry, _dpid: u64, _xid: u32, _pkt: PacketIn) -> HandlerResult {
        Ok(())
    }

    fn port_add(&mut self, _reg: &Registry, _dpid: u64, _xid: u32, _sts: PortStatus) -> HandlerResult {
        Ok(())
    }

    fn port_delete(&mut self,
                   _reg: &Registry,
                   _dpid: u64,
                   _xid: u32,
                   _sts: PortStatus)
                   -> HandlerResult {
        Ok(())
    }

    fn port_modify(&mut self,
                   _reg: &Registry,
                   _dpid: u64,
                   _xid: u32,
                   _sts: PortStatus)
                   -> HandlerResult {
        Ok(())
    }

    fn flow_removed(&mut self,
                    _reg: &Registry,
                    _dpid: u64,
                    _xid: u32,
                    _flow: FlowRemoved)
                    -> HandlerResult {
        Ok(())
    }
}
