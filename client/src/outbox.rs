//! Outbound request queue drained by the transport

use log::debug;
use shared::{Packet, Request};
use std::collections::VecDeque;

/// Queue of requests waiting to be sent, each tagged with the id its
/// response or failure will carry back.
pub struct Outbox {
    next_id: u64,
    queue: VecDeque<(u64, Request)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            queue: VecDeque::new(),
        }
    }

    /// Allocates a request id without queueing anything yet.
    pub fn reserve(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Queues `request` under an id from [`Outbox::reserve`].
    pub fn send(&mut self, request_id: u64, request: Request) {
        debug!("Queueing {} request #{}", request.name(), request_id);
        self.queue.push_back((request_id, request));
    }

    pub fn push(&mut self, request: Request) -> u64 {
        let id = self.reserve();
        self.send(id, request);
        id
    }

    /// Everything queued so far, as wire packets in queue order.
    pub fn drain_packets(&mut self) -> Vec<Packet> {
        self.queue
            .drain(..)
            .map(|(request_id, request)| Packet::Request {
                request_id,
                request,
            })
            .collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &(u64, Request)> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase_and_drain_in_order() {
        let mut outbox = Outbox::new();
        let first = outbox.push(Request::ClusterChildren { cluster_id: 1 });
        let second = outbox.push(Request::ClusterAssociations { cluster_id: 1 });
        assert!(second > first);
        assert_eq!(outbox.len(), 2);

        let packets = outbox.drain_packets();
        assert!(outbox.is_empty());
        match &packets[0] {
            Packet::Request { request_id, request } => {
                assert_eq!(*request_id, first);
                assert_eq!(request.name(), "cluster");
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_reserved_id_is_not_reused() {
        let mut outbox = Outbox::new();
        let reserved = outbox.reserve();
        let pushed = outbox.push(Request::ClusterChildren { cluster_id: 2 });
        assert_ne!(reserved, pushed);

        outbox.send(reserved, Request::ClusterChildren { cluster_id: 3 });
        let ids: Vec<u64> = outbox.pending().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![pushed, reserved]);
    }
}
