//! An OpenFlow 1.0 controller framework.
//!
//! Applications implement `OfpController` and hand it to a `Server`, which accepts
//! switches, performs the handshake, tracks them in a `Registry` and dispatches their
//! messages to the application one handler at a time.

mod bits;
pub mod config;
pub mod error;
pub mod ofp_connection;
pub mod ofp_controller;
pub mod ofp_dispatcher;
pub mod ofp_header;
pub mod ofp_message;
pub mod ofp_registry;
pub mod ofp_server;
pub mod ofp_timer;
pub mod openflow0x01;

#[cfg(test)]
mod test_util;

pub use config::ServerConfig;
pub use error::{HandshakeError, OfpError, RegistryError, ServerError};
pub use ofp_connection::{Connection, HandshakeState};
pub use ofp_controller::{HandlerResult, OfpController};
pub use ofp_registry::Registry;
pub use ofp_server::{Listening, Server};
pub use ofp_timer::TimerEvent;
pub use openflow0x01::message::Message;
