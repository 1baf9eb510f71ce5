use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error};

use crate::ofp_controller::{HandlerResult, OfpController};
use crate::ofp_dispatcher::{catch_handler_panic, Dispatcher};
use crate::ofp_registry::Registry;

pub type TimerHandler<C> = fn(&mut C, &Registry) -> HandlerResult;

/// A handler fired repeatedly at a fixed interval for the life of the server.
pub struct TimerEvent<C> {
    name: &'static str,
    interval: Duration,
    handler: TimerHandler<C>,
}

impl<C> TimerEvent<C> {
    pub fn new(name: &'static str, interval: Duration, handler: TimerHandler<C>) -> TimerEvent<C> {
        TimerEvent {
            name,
            interval,
            handler,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl<C> fmt::Debug for TimerEvent<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TimerEvent")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Start the thread for `event`. It fires the handler, then sleeps for the interval,
/// forever. A failing handler stops only this timer.
pub fn spawn_timer<C: OfpController>(dispatcher: Arc<Dispatcher<C>>,
                                     event: TimerEvent<C>)
                                     -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("timer-{}", event.name))
        .spawn(move || {
            debug!(timer = event.name, interval = ?event.interval, "Timer started");
            loop {
                let fired = catch_handler_panic(|| {
                    dispatcher.invoke(|c, reg| (event.handler)(c, reg))
                });
                if let Err(e) = fired {
                    error!(timer = event.name,
                           error = %format!("{:#}", e),
                           "Timer handler failed, timer stopped");
                    return;
                }
                thread::sleep(event.interval);
            }
        })
}
