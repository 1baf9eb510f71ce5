//! Switch connections and the controller side of the OpenFlow handshake.
//!
//! A `Handshake` drives a freshly accepted socket through
//! Hello -> Echo -> Features. Only once the switch has reported its
//! datapath id does it become a `Connection`, so a `Connection` always has a
//! valid datapath id.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::error::{HandshakeError, OfpError};
use crate::ofp_message::OfpMessage;
use crate::openflow0x01::message::Message;
use crate::openflow0x01::SwitchFeatures;

/// Steps of the controller side of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the switch's Hello.
    Connecting,
    /// Our EchoRequest is out, waiting for the EchoReply.
    AwaitingEcho,
    /// Our FeaturesRequest is out, waiting for the FeaturesReply.
    AwaitingFeatures,
    Ready,
    Failed,
}

/// An accepted socket that has not yet completed the handshake.
pub struct Handshake {
    reader: TcpStream,
    writer: TcpStream,
    peer: SocketAddr,
    state: HandshakeState,
    next_xid: u32,
    features: Option<SwitchFeatures>,
}

impl Handshake {
    /// Wrap an accepted socket. `timeout` bounds each blocking read while negotiating;
    /// `None` or a zero duration waits forever.
    pub fn new(stream: TcpStream,
               peer: SocketAddr,
               timeout: Option<Duration>)
               -> Result<Handshake, HandshakeError> {
        let timeout = timeout.filter(|t| !t.is_zero());
        let setup = |stream: &TcpStream| -> Result<TcpStream, OfpError> {
            stream.set_read_timeout(timeout)?;
            Ok(stream.try_clone()?)
        };
        let writer = setup(&stream).map_err(|source| {
                HandshakeError::Stream {
                    state: HandshakeState::Connecting,
                    source,
                }
            })?;
        Ok(Handshake {
            reader: stream,
            writer,
            peer,
            state: HandshakeState::Connecting,
            next_xid: 0,
            features: None,
        })
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The negotiated datapath id, available once `Ready`.
    pub fn datapath_id(&self) -> Option<u64> {
        self.features.as_ref().map(|f| f.datapath_id)
    }

    /// Perform one blocking step of the handshake and return the new state.
    /// Any failure moves the handshake to `Failed` for good.
    pub fn step(&mut self) -> Result<HandshakeState, HandshakeError> {
        let result = match self.state {
            HandshakeState::Connecting => self.exchange_hello(),
            HandshakeState::AwaitingEcho => self.exchange_echo(),
            HandshakeState::AwaitingFeatures => self.exchange_features(),
            HandshakeState::Ready |
            HandshakeState::Failed => return Ok(self.state),
        };
        match result {
            Ok(next) => {
                self.state = next;
                Ok(next)
            }
            Err(e) => {
                self.state = HandshakeState::Failed;
                Err(e)
            }
        }
    }

    /// Drive the handshake to completion.
    pub fn complete(mut self) -> Result<Connection, HandshakeError> {
        loop {
            match self.step()? {
                HandshakeState::Ready => return self.into_connection(),
                HandshakeState::Failed => {
                    return Err(HandshakeError::Incomplete { state: HandshakeState::Failed })
                }
                _ => {}
            }
        }
    }

    // The switch's Hello is read before ours goes out.
    fn exchange_hello(&mut self) -> Result<HandshakeState, HandshakeError> {
        debug!(peer = %self.peer, "Wait OFPT_HELLO");
        match self.receive()? {
            Message::Hello => {}
            other => return Err(self.unexpected(&other)),
        }
        self.send(&Message::Hello)?;
        Ok(HandshakeState::AwaitingEcho)
    }

    fn exchange_echo(&mut self) -> Result<HandshakeState, HandshakeError> {
        self.send(&Message::EchoRequest(vec![]))?;
        debug!(peer = %self.peer, "Wait OFPT_ECHO_REPLY");
        match self.receive()? {
            Message::EchoReply(_) => Ok(HandshakeState::AwaitingFeatures),
            other => Err(self.unexpected(&other)),
        }
    }

    fn exchange_features(&mut self) -> Result<HandshakeState, HandshakeError> {
        self.send(&Message::FeaturesReq)?;
        debug!(peer = %self.peer, "Wait OFPT_FEATURES_REPLY");
        match self.receive()? {
            Message::FeaturesReply(features) => {
                debug!(peer = %self.peer,
                       dpid = features.datapath_id,
                       "OFPT_FEATURES_REPLY received");
                self.features = Some(features);
                Ok(HandshakeState::Ready)
            }
            other => Err(self.unexpected(&other)),
        }
    }

    fn receive(&mut self) -> Result<Message, HandshakeError> {
        let state = self.state;
        Message::read_from(&mut self.reader)
            .map(|(_, msg)| msg)
            .map_err(|source| HandshakeError::Stream { state, source })
    }

    fn send(&mut self, msg: &Message) -> Result<(), HandshakeError> {
        let state = self.state;
        let xid = self.next_xid;
        self.next_xid = self.next_xid.wrapping_add(1);
        Message::write_to(&mut self.writer, xid, msg)
            .map_err(|source| HandshakeError::Stream { state, source })
    }

    fn unexpected(&self, got: &Message) -> HandshakeError {
        HandshakeError::UnexpectedMessage {
            state: self.state,
            got: got.kind(),
        }
    }

    fn into_connection(self) -> Result<Connection, HandshakeError> {
        let state = self.state;
        let features = match self.features {
            Some(features) => features,
            None => return Err(HandshakeError::Incomplete { state }),
        };
        self.reader
            .set_read_timeout(None)
            .map_err(|e| HandshakeError::Stream {
                state,
                source: e.into(),
            })?;
        Ok(Connection {
            datapath_id: features.datapath_id,
            features,
            peer: self.peer,
            reader: Mutex::new(self.reader),
            writer: Mutex::new(self.writer),
            next_xid: AtomicU32::new(self.next_xid),
        })
    }
}

/// A switch that completed the handshake.
///
/// Reads happen only on the connection's own lifecycle thread. Writes may come from
/// that thread or from any handler, and are serialized so messages never interleave.
#[derive(Debug)]
pub struct Connection {
    datapath_id: u64,
    features: SwitchFeatures,
    peer: SocketAddr,
    reader: Mutex<TcpStream>,
    writer: Mutex<TcpStream>,
    next_xid: AtomicU32,
}

impl Connection {
    /// Perform the full handshake on an accepted socket.
    pub fn accept(stream: TcpStream,
                  peer: SocketAddr,
                  handshake_timeout: Option<Duration>)
                  -> Result<Connection, HandshakeError> {
        Handshake::new(stream, peer, handshake_timeout)?.complete()
    }

    pub fn datapath_id(&self) -> u64 {
        self.datapath_id
    }

    /// The FeaturesReply the switch sent during the handshake.
    pub fn features(&self) -> &SwitchFeatures {
        &self.features
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// A fresh transaction id for a controller-initiated request.
    pub fn next_xid(&self) -> u32 {
        self.next_xid.fetch_add(1, Ordering::Relaxed)
    }

    /// Block until the next message arrives from the switch.
    pub fn receive(&self) -> Result<(u32, Message), OfpError> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        Message::read_from(&mut *reader)
    }

    /// Write one message to the switch.
    pub fn send(&self, xid: u32, msg: &Message) -> Result<(), OfpError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        Message::write_to(&mut *writer, xid, msg)
    }

    /// Shut down the socket. A blocked `receive` then returns an error, which ends the
    /// connection's lifecycle thread.
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.shutdown(how)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rstest::rstest;

    use super::*;
    use crate::test_util::{loopback_pair, switch_read, switch_write, FakeSwitch};

    #[test]
    fn handshake_reaches_ready() {
        let (controller_side, peer, switch_side) = loopback_pair();
        let switch = thread::spawn(move || FakeSwitch::new(switch_side, 0x2a).handshake());

        let mut hs = Handshake::new(controller_side, peer, None).unwrap();
        assert_eq!(hs.state(), HandshakeState::Connecting);
        assert_eq!(hs.step().unwrap(), HandshakeState::AwaitingEcho);
        assert_eq!(hs.step().unwrap(), HandshakeState::AwaitingFeatures);
        assert_eq!(hs.datapath_id(), None);
        assert_eq!(hs.step().unwrap(), HandshakeState::Ready);
        assert_eq!(hs.datapath_id(), Some(0x2a));

        let conn = hs.complete().unwrap();
        assert_eq!(conn.datapath_id(), 0x2a);
        switch.join().unwrap();
    }

    #[test]
    fn peer_hello_is_read_before_ours_is_sent() {
        let (controller_side, peer, mut switch_side) = loopback_pair();
        let controller = thread::spawn(move || {
            let mut hs = Handshake::new(controller_side, peer, None).unwrap();
            hs.step().map(|_| ())
        });

        switch_side.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
        let early = Message::read_from(&mut switch_side);
        assert!(early.is_err(), "controller spoke first: {:?}", early);

        switch_side.set_read_timeout(None).unwrap();
        switch_write(&mut switch_side, 0, &Message::Hello);
        assert_eq!(switch_read(&mut switch_side).1, Message::Hello);
        controller.join().unwrap().unwrap();
    }

    #[rstest]
    #[case::echo_instead_of_hello(HandshakeState::Connecting)]
    #[case::hello_instead_of_echo_reply(HandshakeState::AwaitingEcho)]
    #[case::hello_instead_of_features_reply(HandshakeState::AwaitingFeatures)]
    fn wrong_message_fails_at_that_step(#[case] failing: HandshakeState) {
        let (controller_side, peer, switch_side) = loopback_pair();
        let switch = thread::spawn(move || FakeSwitch::new(switch_side, 1).misbehave_at(failing));

        let err = Connection::accept(controller_side, peer, None).unwrap_err();
        assert_eq!(err.state(), failing);
        assert!(matches!(err, HandshakeError::UnexpectedMessage { .. }));
        switch.join().unwrap();
    }

    #[test]
    fn failed_handshake_stays_failed() {
        let (controller_side, peer, mut switch_side) = loopback_pair();
        switch_write(&mut switch_side, 0, &Message::EchoRequest(vec![]));

        let mut hs = Handshake::new(controller_side, peer, None).unwrap();
        assert!(hs.step().is_err());
        assert_eq!(hs.state(), HandshakeState::Failed);
        assert_eq!(hs.step().unwrap(), HandshakeState::Failed);
    }

    #[test]
    fn closed_stream_fails_handshake() {
        let (controller_side, peer, switch_side) = loopback_pair();
        drop(switch_side);

        let err = Connection::accept(controller_side, peer, None).unwrap_err();
        assert!(matches!(err,
                         HandshakeError::Stream {
                             state: HandshakeState::Connecting,
                             source: OfpError::Closed,
                         }));
    }

    #[test]
    fn silent_peer_times_out_when_configured() {
        let (controller_side, peer, _switch_side) = loopback_pair();

        let err = Connection::accept(controller_side, peer, Some(Duration::from_millis(50)))
            .unwrap_err();
        assert!(matches!(err, HandshakeError::Stream { source: OfpError::Io(_), .. }));
    }

    #[test]
    fn zero_timeout_means_no_timeout() {
        let (controller_side, peer, switch_side) = loopback_pair();
        let switch = thread::spawn(move || FakeSwitch::new(switch_side, 0x10).handshake());

        let conn = Connection::accept(controller_side, peer, Some(Duration::ZERO)).unwrap();
        assert_eq!(conn.datapath_id(), 0x10);
        switch.join().unwrap();
    }

    #[test]
    fn send_and_receive_after_ready() {
        let (conn, mut switch_side) = crate::test_util::connected(7);

        conn.send(conn.next_xid(), &Message::BarrierRequest).unwrap();
        assert_eq!(switch_read(&mut switch_side).1, Message::BarrierRequest);

        switch_write(&mut switch_side, 99, &Message::BarrierReply);
        assert_eq!(conn.receive().unwrap(), (99, Message::BarrierReply));

        drop(switch_side);
        assert!(matches!(conn.receive(), Err(OfpError::Closed)));
    }
}
