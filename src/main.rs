use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

use rust_ofp::config::{DEFAULT_IP_ADDRESS, DEFAULT_TCP_PORT};
use rust_ofp::openflow0x01::{ErrorMsg, FlowRemoved, PortStatus};
use rust_ofp::{HandlerResult, OfpController, Registry, Server, ServerConfig, TimerEvent};

/// OpenFlow 1.0 controller that reports switch and port activity.
#[derive(Parser, Debug)]
#[command(name = "rust_ofp_controller", version, about)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_IP_ADDRESS)]
    ip: String,

    /// TCP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_TCP_PORT)]
    port: u16,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    debug: bool,

    /// Keep at most this many received messages per switch
    #[arg(long, value_name = "N")]
    log_capacity: Option<usize>,

    /// Give up on a handshake read after this many seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    handshake_timeout_secs: Option<u64>,

    /// Passed to the controller's start handler
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[derive(Default)]
struct Monitor {
    ports_added: usize,
    ports_removed: usize,
}

impl OfpController for Monitor {
    fn start(&mut self, _: &Registry, args: &[String]) -> HandlerResult {
        if !args.is_empty() {
            info!(?args, "Monitor starting");
        }
        Ok(())
    }

    fn switch_ready(&mut self, reg: &Registry, dpid: u64) -> HandlerResult {
        let ports = reg.lookup(dpid).map(|c| c.features().ports.len()).unwrap_or(0);
        info!(dpid, ports, "Switch joined");
        Ok(())
    }

    fn switch_disconnected(&mut self, _: &Registry, dpid: u64) -> HandlerResult {
        info!(dpid, "Switch left");
        Ok(())
    }

    fn error(&mut self, _: &Registry, dpid: u64, xid: u32, err: ErrorMsg) -> HandlerResult {
        warn!(dpid, xid, typ = err.typ, code = err.code, "Switch reported error");
        Ok(())
    }

    fn port_add(&mut self, _: &Registry, dpid: u64, _: u32, sts: PortStatus) -> HandlerResult {
        self.ports_added += 1;
        info!(dpid, port = sts.desc.port_no, name = %sts.desc.name, "Port added");
        Ok(())
    }

    fn port_delete(&mut self, _: &Registry, dpid: u64, _: u32, sts: PortStatus) -> HandlerResult {
        self.ports_removed += 1;
        info!(dpid, port = sts.desc.port_no, name = %sts.desc.name, "Port deleted");
        Ok(())
    }

    fn port_modify(&mut self, _: &Registry, dpid: u64, _: u32, sts: PortStatus) -> HandlerResult {
        info!(dpid, port = sts.desc.port_no, state = ?sts.desc.state, "Port modified");
        Ok(())
    }

    fn flow_removed(&mut self, _: &Registry, dpid: u64, _: u32, flow: FlowRemoved) -> HandlerResult {
        info!(dpid,
              cookie = flow.cookie,
              packets = flow.packet_count,
              reason = ?flow.reason,
              "Flow removed");
        Ok(())
    }
}

fn report_switches(app: &mut Monitor, reg: &Registry) -> HandlerResult {
    info!(switches = reg.len(),
          ports_added = app.ports_added,
          ports_removed = app.ports_removed,
          "Connected switches: {:?}",
          reg.datapath_ids());
    Ok(())
}

fn main() {
    let args = Args::parse();

    let default_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    fmt().with_env_filter(filter).with_target(true).init();

    let config = ServerConfig {
        ip: args.ip,
        port: args.port,
        message_log_capacity: args.log_capacity,
        handshake_timeout: args.handshake_timeout_secs.map(Duration::from_secs),
    };

    let server = Server::new(Monitor::default(), config)
        .timer(TimerEvent::new("report", Duration::from_secs(30), report_switches));
    if let Err(e) = server.run(&args.args) {
        error!("{}", e);
        process::exit(1);
    }
}
