//! The accept loop and the per-switch lifecycle threads.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::ofp_connection::Connection;
use crate::ofp_controller::OfpController;
use crate::ofp_dispatcher::{catch_handler_panic, Dispatcher};
use crate::ofp_registry::Registry;
use crate::ofp_timer::{spawn_timer, TimerEvent};

/// An OpenFlow controller server for the application `C`.
pub struct Server<C: OfpController> {
    dispatcher: Arc<Dispatcher<C>>,
    timers: Vec<TimerEvent<C>>,
    config: ServerConfig,
}

impl<C: OfpController> Server<C> {
    pub fn new(app: C, config: ServerConfig) -> Server<C> {
        let registry = Arc::new(Registry::new(config.message_log_capacity));
        Server {
            dispatcher: Arc::new(Dispatcher::new(app, registry)),
            timers: vec![],
            config,
        }
    }

    /// Add a timer. Timers start firing once the server runs.
    pub fn timer(mut self, event: TimerEvent<C>) -> Server<C> {
        self.timers.push(event);
        self
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.dispatcher.registry().clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher<C>> {
        self.dispatcher.clone()
    }

    /// Call the application's `start` handler with `args`, then bind the listener.
    pub fn bind(self, args: &[String]) -> Result<Listening<C>, ServerError> {
        self.dispatcher.invoke(|c, reg| c.start(reg, args)).map_err(ServerError::Start)?;

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind { addr, source })?;
        info!("Controller running on {}", local_addr);

        Ok(Listening {
            listener,
            local_addr,
            dispatcher: self.dispatcher,
            timers: self.timers,
            handshake_timeout: self.config.handshake_timeout,
        })
    }

    /// `bind` then `Listening::run`.
    pub fn run(self, args: &[String]) -> Result<(), ServerError> {
        self.bind(args)?.run()
    }
}

/// A server whose listener is bound but which is not accepting yet.
pub struct Listening<C: OfpController> {
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher<C>>,
    timers: Vec<TimerEvent<C>>,
    handshake_timeout: Option<Duration>,
}

impl<C: OfpController> Listening<C> {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.dispatcher.registry().clone()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher<C>> {
        self.dispatcher.clone()
    }

    /// Start the timers, then accept switches forever, one thread per connection.
    /// Returns only if the listener fails.
    pub fn run(self) -> Result<(), ServerError> {
        for event in self.timers {
            let name = event.name();
            spawn_timer(self.dispatcher.clone(), event)
                .map_err(|source| ServerError::Spawn { what: format!("timer {}", name), source })?;
        }

        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(source) => {
                    error!(addr = %self.local_addr, error = %source, "Accept failed");
                    return Err(ServerError::Accept {
                        addr: self.local_addr,
                        source,
                    });
                }
            };
            debug!(peer = %peer, "Socket accepted");

            let dispatcher = self.dispatcher.clone();
            let timeout = self.handshake_timeout;
            let spawned = thread::Builder::new()
                .name(format!("switch-{}", peer))
                .spawn(move || handle_client_connected(&dispatcher, stream, peer, timeout));
            if let Err(e) = spawned {
                warn!(peer = %peer, error = %e, "Could not start switch thread, dropping connection");
            }
        }
    }
}

/// Perform handshake and begin loop reading incoming messages from client stream.
///
/// Runs on the connection's own thread. Every way out of the receive loop unregisters
/// the switch and fires `switch_disconnected` once.
fn handle_client_connected<C: OfpController>(dispatcher: &Dispatcher<C>,
                                             stream: TcpStream,
                                             peer: SocketAddr,
                                             handshake_timeout: Option<Duration>) {
    let connection = match Connection::accept(stream, peer, handshake_timeout) {
        Ok(connection) => Arc::new(connection),
        Err(e) => {
            debug!(peer = %peer, state = ?e.state(), error = %e, "Switch handshake failed");
            return;
        }
    };
    let dpid = connection.datapath_id();
    let registry = dispatcher.registry();

    // The replaced connection keeps its socket until its own thread notices a fault.
    if let Some(stale) = registry.register(dpid, connection.clone()) {
        warn!(dpid, stale_peer = %stale.peer_addr(), "Switch re-registered over a live entry");
    }
    info!(dpid, peer = %peer, "Switch is ready");

    let result = catch_handler_panic(|| {
        dispatcher.invoke(|c, reg| c.switch_ready(reg, dpid))?;
        loop {
            let (xid, msg) = connection.receive()?;
            dispatcher.route(dpid, xid, msg)?;
        }
    });
    if let Err(e) = result {
        debug!(dpid, error = %format!("{:#}", e), "Switch error");
    }

    registry.unregister(dpid);
    info!(dpid, "Switch is disconnected");
    let notified = catch_handler_panic(|| {
        dispatcher.invoke(|c, reg| c.switch_disconnected(reg, dpid))
    });
    if let Err(e) = notified {
        warn!(dpid, error = %format!("{:#}", e), "switch_disconnected handler failed");
    }
}
