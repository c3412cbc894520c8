// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority queue for task admission and the observer port allocator.

use ov_core::Task;
use std::collections::HashMap;

struct QueuedTask {
    task: Task,
    /// Insertion order, the FIFO tie-break
    seq: u64,
}

/// Queue ordered by (priority desc, insertion order asc).
///
/// Kept sorted on insert with a binary search, so `dequeue` is a front pop.
#[derive(Default)]
pub struct PriorityQueue {
    items: Vec<QueuedTask>,
    next_seq: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task at its priority position.
    pub fn enqueue(&mut self, task: Task) {
        let seq = self.next_seq;
        self.next_seq += 1;
        // All earlier tasks with priority >= this one stay in front; equal
        // priorities keep insertion order.
        let index = self
            .items
            .partition_point(|q| q.task.priority >= task.priority);
        self.items.insert(index, QueuedTask { task, seq });
    }

    /// Remove and return the highest-priority task.
    pub fn dequeue(&mut self) -> Option<Task> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0).task)
        }
    }

    /// The task `dequeue` would return, without removing it.
    pub fn peek(&self) -> Option<&Task> {
        self.items.first().map(|q| &q.task)
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Matching tasks, in queue order, without removal.
    pub fn filter(&self, predicate: impl Fn(&Task) -> bool) -> Vec<Task> {
        self.items
            .iter()
            .filter(|q| predicate(&q.task))
            .map(|q| q.task.clone())
            .collect()
    }

    /// Remove and return matching tasks.
    pub fn remove(&mut self, predicate: impl Fn(&Task) -> bool) -> Vec<Task> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.items.len());
        for item in self.items.drain(..) {
            if predicate(&item.task) {
                removed.push(item.task);
            } else {
                kept.push(item);
            }
        }
        self.items = kept;
        removed
    }

    /// Copy of the queue contents, in dequeue order.
    pub fn snapshot(&self) -> Vec<Task> {
        self.items.iter().map(|q| q.task.clone()).collect()
    }

    #[cfg(test)]
    fn seq_of(&self, index: usize) -> u64 {
        self.items[index].seq
    }
}

/// Monotonic port allocator for external observers.
///
/// Ports start at 9000. Requesting a port for an agent that already holds
/// one returns the same port (idempotent).
pub struct PortAllocator {
    next: u16,
    assigned: HashMap<String, u16>,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self {
            next: 9000,
            assigned: HashMap::new(),
        }
    }
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate (or return the existing) port for an agent.
    pub fn allocate_port(&mut self, agent_id: &str, _parent_agent_id: Option<&str>) -> u16 {
        if let Some(port) = self.assigned.get(agent_id) {
            return *port;
        }
        let port = self.next;
        self.next += 1;
        self.assigned.insert(agent_id.to_string(), port);
        port
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
