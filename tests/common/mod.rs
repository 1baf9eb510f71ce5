#![allow(dead_code)]

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rust_ofp::ofp_dispatcher::Dispatcher;
use rust_ofp::ofp_message::OfpMessage;
use rust_ofp::openflow0x01::SwitchFeatures;
use rust_ofp::{Message, OfpController, Registry, Server, ServerConfig, TimerEvent};

/// A controller listening on an ephemeral loopback port, accepting on its own thread.
pub struct Running<C: OfpController> {
    pub addr: SocketAddr,
    pub dispatcher: Arc<Dispatcher<C>>,
    pub registry: Arc<Registry>,
}

pub fn start_controller<C: OfpController>(app: C,
                                          args: &[&str],
                                          timers: Vec<TimerEvent<C>>)
                                          -> Running<C> {
    let config = ServerConfig {
        ip: "127.0.0.1".to_string(),
        port: 0,
        handshake_timeout: Some(Duration::from_secs(5)),
        ..ServerConfig::default()
    };
    let server = timers.into_iter().fold(Server::new(app, config), |s, t| s.timer(t));
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let listening = server.bind(&args).unwrap();
    let running = Running {
        addr: listening.local_addr(),
        dispatcher: listening.dispatcher(),
        registry: listening.registry(),
    };
    thread::spawn(move || listening.run());
    running
}

pub fn read(stream: &mut TcpStream) -> (u32, Message) {
    Message::read_from(stream).unwrap()
}

pub fn write(stream: &mut TcpStream, xid: u32, msg: &Message) {
    Message::write_to(stream, xid, msg).unwrap()
}

/// Connect to `addr` and play the switch side of the handshake as `dpid`.
pub fn connect_switch(addr: SocketAddr, dpid: u64) -> TcpStream {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    write(&mut stream, 0, &Message::Hello);
    assert_eq!(read(&mut stream).1, Message::Hello);

    let (xid, msg) = read(&mut stream);
    assert!(matches!(msg, Message::EchoRequest(_)), "expected echo, got {:?}", msg);
    write(&mut stream, xid, &Message::EchoReply(vec![]));

    let (xid, msg) = read(&mut stream);
    assert_eq!(msg, Message::FeaturesReq);
    let features = SwitchFeatures {
        datapath_id: dpid,
        ..SwitchFeatures::default()
    };
    write(&mut stream, xid, &Message::FeaturesReply(features));
    stream
}

/// Poll `cond` until it holds, failing the test after a few seconds.
pub fn wait_until<F: FnMut() -> bool>(what: &str, mut cond: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}
