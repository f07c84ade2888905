//! Subscriber bookkeeping for the tracking feed
//!
//! This module tracks the map clients currently talking to the feed:
//! - Subscriber lifecycle (connect, disconnect, timeout)
//! - Address lookup so replies reach the right socket
//! - Capacity enforcement
//!
//! Subscribers keep themselves alive by querying; a map polls positions every
//! couple of seconds, so a subscriber that stays silent for longer than the
//! timeout is assumed gone.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which a subscriber is dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// A connected map client
#[derive(Debug)]
pub struct Subscriber {
    /// Identifier handed out in `Connected`
    pub id: u32,
    /// Where replies are sent
    pub addr: SocketAddr,
    /// Last time any packet arrived from this subscriber
    pub last_seen: Instant,
    /// Requests answered so far
    pub requests_served: u64,
}

impl Subscriber {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            requests_served: 0,
        }
    }

    /// Records activity from this subscriber.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
        self.requests_served += 1;
    }

    /// Returns true if nothing arrived from this subscriber within `timeout`.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Registry of every subscriber, bounded by a capacity limit
pub struct ClientManager {
    /// Subscribers indexed by their id
    clients: HashMap<u32, Subscriber>,
    /// Next id to hand out
    next_client_id: u32,
    /// Maximum number of concurrent subscribers
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty manager. Ids start from 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a subscriber at `addr`.
    ///
    /// Returns the new id, or None when the feed is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Subscriber {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Subscriber::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a subscriber. Returns false if it was already gone.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Subscriber {} disconnected after {} requests",
                client.id, client.requests_served
            );
            true
        } else {
            false
        }
    }

    /// Finds the subscriber talking from `addr`.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Marks a subscriber as active. Returns false for unknown ids.
    pub fn touch(&mut self, client_id: u32) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.touch();
            true
        } else {
            false
        }
    }

    pub fn get(&self, client_id: u32) -> Option<&Subscriber> {
        self.clients.get(&client_id)
    }

    /// Drops every subscriber silent for longer than `timeout` and returns
    /// their ids.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<u32> {
        let timed_out: Vec<u32> = self
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

    /// All subscriber ids with their addresses, for broadcasts.
    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
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
