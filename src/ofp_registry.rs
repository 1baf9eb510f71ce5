//! Connected switches keyed by datapath id, with each switch's message log.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::RegistryError;
use crate::ofp_connection::Connection;
use crate::openflow0x01::message::Message;

struct Entry {
    connection: Arc<Connection>,
    messages: VecDeque<(u32, Message)>,
}

/// Registry of switches that completed the handshake.
///
/// Internally synchronized, independent of the handler gate. The lock is never held
/// while writing to a socket.
pub struct Registry {
    entries: Mutex<HashMap<u64, Entry>>,
    log_capacity: Option<usize>,
}

impl Registry {
    /// `log_capacity` bounds each switch's message log; `None` keeps every message.
    pub fn new(log_capacity: Option<usize>) -> Registry {
        Registry {
            entries: Mutex::new(HashMap::new()),
            log_capacity,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `connection` under `dpid` with an empty message log.
    ///
    /// An existing entry is replaced and returned. Its socket is left open.
    pub fn register(&self, dpid: u64, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let entry = Entry {
            connection,
            messages: VecDeque::new(),
        };
        self.entries().insert(dpid, entry).map(|stale| stale.connection)
    }

    /// Remove `dpid`. Returns whether it was registered.
    pub fn unregister(&self, dpid: u64) -> bool {
        self.entries().remove(&dpid).is_some()
    }

    pub fn lookup(&self, dpid: u64) -> Option<Arc<Connection>> {
        self.entries().get(&dpid).map(|e| e.connection.clone())
    }

    pub fn contains(&self, dpid: u64) -> bool {
        self.entries().contains_key(&dpid)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Snapshot of the registered datapath ids, sorted.
    pub fn datapath_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.entries().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Append to the message log of `dpid`. Does nothing if `dpid` is not registered.
    pub fn append_message(&self, dpid: u64, xid: u32, msg: Message) -> bool {
        let mut entries = self.entries();
        let entry = match entries.get_mut(&dpid) {
            Some(entry) => entry,
            None => return false,
        };
        if let Some(capacity) = self.log_capacity {
            if capacity == 0 {
                return true;
            }
            while entry.messages.len() >= capacity {
                entry.messages.pop_front();
            }
        }
        entry.messages.push_back((xid, msg));
        true
    }

    /// Messages received from `dpid`, oldest first.
    pub fn messages_for(&self, dpid: u64) -> Option<Vec<(u32, Message)>> {
        self.entries().get(&dpid).map(|e| e.messages.iter().cloned().collect())
    }

    pub fn last_message_for(&self, dpid: u64) -> Option<(u32, Message)> {
        self.entries().get(&dpid).and_then(|e| e.messages.back().cloned())
    }

    /// The lowest registered datapath id, used by the single-switch helpers below.
    pub fn first_datapath_id(&self) -> Option<u64> {
        self.entries().keys().min().copied()
    }

    /// `messages_for` the first switch.
    pub fn messages(&self) -> Option<Vec<(u32, Message)>> {
        self.first_datapath_id().and_then(|dpid| self.messages_for(dpid))
    }

    /// `last_message_for` the first switch.
    pub fn last_message(&self) -> Option<(u32, Message)> {
        self.first_datapath_id().and_then(|dpid| self.last_message_for(dpid))
    }

    /// `send` to the first switch.
    pub fn send_message(&self, xid: u32, msg: &Message) -> Result<(), RegistryError> {
        let dpid = self.first_datapath_id().ok_or(RegistryError::NoSwitches)?;
        self.send(dpid, xid, msg)
    }

    /// Send `msg` to the switch registered under `dpid`.
    pub fn send(&self, dpid: u64, xid: u32, msg: &Message) -> Result<(), RegistryError> {
        let connection = self.lookup(dpid).ok_or(RegistryError::NotFound(dpid))?;
        connection.send(xid, msg).map_err(|source| RegistryError::Send { dpid, source })
    }

    /// Send `msg` to every registered switch. Returns the sends that failed; a failure
    /// does not stop delivery to the others.
    pub fn broadcast(&self, xid: u32, msg: &Message) -> Vec<(u64, RegistryError)> {
        let mut failures = vec![];
        for dpid in self.datapath_ids() {
            if let Err(e) = self.send(dpid, xid, msg) {
                debug!(dpid, error = %e, "Broadcast send failed");
                failures.push((dpid, e));
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use std::net::Shutdown;

    use super::*;
    use crate::test_util::{connected, switch_read};

    #[test]
    fn register_lookup_unregister() {
        let registry = Registry::new(None);
        let (conn, _switch) = connected(1);
        let conn = Arc::new(conn);

        assert!(registry.register(1, conn.clone()).is_none());
        assert_eq!(registry.datapath_ids(), vec![1]);
        assert!(Arc::ptr_eq(&registry.lookup(1).unwrap(), &conn));
        assert_eq!(registry.messages_for(1), Some(vec![]));

        assert!(registry.unregister(1));
        assert!(!registry.unregister(1));
        assert!(registry.lookup(1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn register_overwrites_and_resets_log() {
        let registry = Registry::new(None);
        let (first, _s1) = connected(5);
        let (second, _s2) = connected(5);
        let first = Arc::new(first);

        registry.register(5, first.clone());
        registry.append_message(5, 1, Message::BarrierReply);
        let stale = registry.register(5, Arc::new(second)).unwrap();

        assert!(Arc::ptr_eq(&stale, &first));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.messages_for(5), Some(vec![]));
    }

    #[test]
    fn log_appends_in_order_and_ignores_unknown_ids() {
        let registry = Registry::new(None);
        let (conn, _switch) = connected(2);
        registry.register(2, Arc::new(conn));

        assert!(registry.append_message(2, 10, Message::Hello));
        assert!(registry.append_message(2, 11, Message::BarrierReply));
        assert!(!registry.append_message(3, 12, Message::Hello));

        assert_eq!(registry.messages_for(2),
                   Some(vec![(10, Message::Hello), (11, Message::BarrierReply)]));
        assert_eq!(registry.last_message_for(2), Some((11, Message::BarrierReply)));
        assert_eq!(registry.messages_for(3), None);
    }

    #[test]
    fn bounded_log_drops_oldest() {
        let registry = Registry::new(Some(2));
        let (conn, _switch) = connected(2);
        registry.register(2, Arc::new(conn));

        for xid in 0..5 {
            registry.append_message(2, xid, Message::BarrierReply);
        }
        let xids: Vec<u32> = registry.messages_for(2).unwrap().into_iter().map(|(x, _)| x).collect();
        assert_eq!(xids, vec![3, 4]);
    }

    #[test]
    fn send_to_unknown_id_is_not_found() {
        let registry = Registry::new(None);
        assert!(matches!(registry.send(9, 0, &Message::Hello),
                         Err(RegistryError::NotFound(9))));
    }

    #[test]
    fn single_switch_helpers_use_lowest_id() {
        let registry = Registry::new(None);
        assert_eq!(registry.messages(), None);
        assert!(matches!(registry.send_message(0, &Message::Hello),
                         Err(RegistryError::NoSwitches)));

        let (c4, mut s4) = connected(4);
        let (c9, _s9) = connected(9);
        registry.register(9, Arc::new(c9));
        registry.register(4, Arc::new(c4));
        registry.append_message(4, 1, Message::Hello);
        registry.append_message(4, 2, Message::BarrierReply);
        registry.append_message(9, 3, Message::Hello);

        assert_eq!(registry.first_datapath_id(), Some(4));
        assert_eq!(registry.messages(),
                   Some(vec![(1, Message::Hello), (2, Message::BarrierReply)]));
        assert_eq!(registry.last_message(), Some((2, Message::BarrierReply)));

        registry.send_message(21, &Message::BarrierRequest).unwrap();
        assert_eq!(switch_read(&mut s4), (21, Message::BarrierRequest));
    }

    #[test]
    fn broadcast_continues_past_failures() {
        let registry = Registry::new(None);
        let (c1, mut s1) = connected(1);
        let (c2, _s2) = connected(2);
        let (c3, mut s3) = connected(3);
        // Writes to a socket shut down on our side fail immediately.
        c2.shutdown(Shutdown::Write).unwrap();
        registry.register(1, Arc::new(c1));
        registry.register(2, Arc::new(c2));
        registry.register(3, Arc::new(c3));

        let failures = registry.broadcast(77, &Message::BarrierRequest);

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 2);
        assert!(matches!(failures[0].1, RegistryError::Send { dpid: 2, .. }));
        assert_eq!(switch_read(&mut s1), (77, Message::BarrierRequest));
        assert_eq!(switch_read(&mut s3), (77, Message::BarrierRequest));
    }
}
