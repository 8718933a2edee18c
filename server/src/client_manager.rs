//! Connection registry for the arena server
//!
//! This module tracks which network addresses are connected and which
//! session id each one was given:
//! - Session id allocation on first join, with a capacity limit
//! - Address lookup for routing inbound packets to a session
//! - Liveness tracking and timeout detection for silent connections
//!
//! The registry knows nothing about players. Removing a connection here is
//! paired with a `leave` on the game state by the network loop.

use log::info;
use shared::SessionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected client
#[derive(Debug)]
pub struct Client {
    /// Session id assigned by the server
    pub id: SessionId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    pub fn new(id: SessionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Returns true if nothing has been received within the timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks all connected clients and enforces the capacity limit
///
/// Session ids start at 1 and are never reused within a server's
/// lifetime, so ascending id order is connection order.
pub struct ClientManager {
    /// Connected clients indexed by session id
    clients: HashMap<SessionId, Client>,
    /// Next session id to hand out
    next_client_id: SessionId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection
    ///
    /// Returns Some(session_id) if successful, None if the server is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<SessionId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a connection, returning false if it was already gone
    pub fn remove_client(&mut self, client_id: &SessionId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<SessionId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Refreshes a client's liveness timestamp
    ///
    /// Returns false if the session id is unknown.
    pub fn touch(&mut self, client_id: SessionId) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
            true
        } else {
            false
        }
    }

    /// Removes and returns every client silent for longer than `timeout`
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<SessionId> {
        let timed_out: Vec<SessionId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// All session ids and their addresses, for broadcasting
    pub fn get_client_addrs(&self) -> Vec<(SessionId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());

        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);

        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_session_ids_increase() {
        let mut manager = ClientManager::new(3);

        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(client_id1, 1);
        assert_eq!(client_id2, 2);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_session_ids_not_reused() {
        let mut manager = ClientManager::new(3);

        let first = manager.add_client(test_addr()).unwrap();
        manager.remove_client(&first);
        let second = manager.add_client(test_addr()).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client(test_addr()).is_some());
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();

        assert!(manager.remove_client(&client_id));
        assert!(manager.is_empty());
        assert!(!manager.remove_client(&client_id));
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);

        let client_id1 = manager.add_client(test_addr()).unwrap();
        manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_touch_refreshes_liveness() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();

        manager.clients.get_mut(&client_id).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);

        assert!(manager.touch(client_id));
        assert!(manager.check_timeouts(Duration::from_secs(5)).is_empty());
        assert!(!manager.touch(99));
    }

    #[test]
    fn test_check_timeouts_removes_silent_clients() {
        let mut manager = ClientManager::new(3);
        let stale = manager.add_client(test_addr()).unwrap();
        let fresh = manager.add_client(test_addr2()).unwrap();

        manager.clients.get_mut(&stale).unwrap().last_seen =
            Instant::now() - Duration::from_secs(10);

        let timed_out = manager.check_timeouts(Duration::from_secs(5));

        assert_eq!(timed_out, vec![stale]);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.find_client_by_addr(test_addr2()), Some(fresh));
    }

    #[test]
    fn test_get_client_addrs() {
        let mut manager = ClientManager::new(3);
        let id1 = manager.add_client(test_addr()).unwrap();
        let id2 = manager.add_client(test_addr2()).unwrap();

        let mut addrs = manager.get_client_addrs();
        addrs.sort_by_key(|(id, _)| *id);

        assert_eq!(addrs, vec![(id1, test_addr()), (id2, test_addr2())]);
    }
}
