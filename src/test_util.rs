use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

use crate::ofp_connection::{Connection, HandshakeState};
use crate::ofp_message::OfpMessage;
use crate::openflow0x01::message::Message;
use crate::openflow0x01::SwitchFeatures;

/// A connected loopback socket pair: (controller side, its peer address, switch side).
pub fn loopback_pair() -> (TcpStream, SocketAddr, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let switch_side = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (controller_side, peer) = listener.accept().unwrap();
    (controller_side, peer, switch_side)
}

pub fn switch_read(stream: &mut TcpStream) -> (u32, Message) {
    Message::read_from(stream).unwrap()
}

pub fn switch_write(stream: &mut TcpStream, xid: u32, msg: &Message) {
    Message::write_to(stream, xid, msg).unwrap()
}

/// Scripted switch side of the handshake.
pub struct FakeSwitch {
    stream: TcpStream,
    dpid: u64,
}

impl FakeSwitch {
    pub fn new(stream: TcpStream, dpid: u64) -> FakeSwitch {
        FakeSwitch { stream, dpid }
    }

    /// Complete the handshake and hand back the switch side of the socket.
    pub fn handshake(mut self) -> TcpStream {
        self.run(None);
        self.stream
    }

    /// Follow the handshake until `state`, then answer with a Hello (or, for the
    /// very first step, an EchoRequest) instead of the expected message.
    pub fn misbehave_at(mut self, state: HandshakeState) {
        self.run(Some(state));
    }

    fn run(&mut self, misbehave: Option<HandshakeState>) {
        if misbehave == Some(HandshakeState::Connecting) {
            switch_write(&mut self.stream, 0, &Message::EchoRequest(vec![]));
            return;
        }
        switch_write(&mut self.stream, 0, &Message::Hello);
        assert_eq!(switch_read(&mut self.stream).1, Message::Hello);

        let (xid, msg) = switch_read(&mut self.stream);
        assert!(matches!(msg, Message::EchoRequest(_)));
        if misbehave == Some(HandshakeState::AwaitingEcho) {
            switch_write(&mut self.stream, xid, &Message::Hello);
            return;
        }
        switch_write(&mut self.stream, xid, &Message::EchoReply(vec![]));

        let (xid, msg) = switch_read(&mut self.stream);
        assert_eq!(msg, Message::FeaturesReq);
        if misbehave == Some(HandshakeState::AwaitingFeatures) {
            switch_write(&mut self.stream, xid, &Message::Hello);
            return;
        }
        let features = SwitchFeatures {
            datapath_id: self.dpid,
            ..SwitchFeatures::default()
        };
        switch_write(&mut self.stream, xid, &Message::FeaturesReply(features));
    }
}

/// A `Connection` that completed the handshake with a fake switch reporting `dpid`.
pub fn connected(dpid: u64) -> (Connection, TcpStream) {
    let (controller_side, peer, switch_side) = loopback_pair();
    let switch = thread::spawn(move || FakeSwitch::new(switch_side, dpid).handshake());
    let conn = Connection::accept(controller_side, peer, None).unwrap();
    (conn, switch.join().unwrap())
}
