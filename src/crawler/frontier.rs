//! Work queue of crawl targets
//!
//! The frontier owns the FIFO queue and the seen-target set. It is driven only
//! by the orchestrator loop, so it needs no locking.

use crate::url::seen_key;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use url::Url;

/// Run-unique target identifier, assigned in admission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A URL to crawl and the rule set to extract it with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub id: TargetId,
    pub url: Url,
    pub rule_set: String,
    /// Link distance from a seed; seeds are 0
    pub depth: u32,
    pub parent: Option<TargetId>,
}

/// Why a URL was or was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued(TargetId),
    /// Already admitted earlier under the same rule set
    Duplicate,
    DepthExceeded,
    LimitReached,
}

#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<Target>,
    seen: HashSet<String>,
    next_id: u64,
    max_targets: usize,
    max_depth: u32,
}

impl Frontier {
    pub fn new(max_targets: usize, max_depth: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            next_id: 0,
            max_targets,
            max_depth,
        }
    }

    /// Offers a URL for crawling
    ///
    /// Checks run in order: depth, seen set, target limit. A URL turned away
    /// by the limit is not marked as seen.
    pub fn offer(
        &mut self,
        url: Url,
        rule_set: &str,
        depth: u32,
        parent: Option<TargetId>,
    ) -> Admission {
        if depth > self.max_depth {
            return Admission::DepthExceeded;
        }

        let key = seen_key(&url, rule_set);
        if self.seen.contains(&key) {
            return Admission::Duplicate;
        }

        if self.admitted() >= self.max_targets {
            return Admission::LimitReached;
        }

        self.seen.insert(key);
        let id = TargetId(self.next_id);
        self.next_id += 1;
        self.queue.push_back(Target {
            id,
            url,
            rule_set: rule_set.to_string(),
            depth,
            parent,
        });

        Admission::Queued(id)
    }

    pub fn pop(&mut self) -> Option<Target> {
        self.queue.pop_front()
    }

    /// Most recently admitted target, while it is still queued
    pub fn newest(&self) -> Option<&Target> {
        self.queue.back()
    }

    /// Removes every queued target, in queue order
    pub fn drain(&mut self) -> Vec<Target> {
        self.queue.drain(..).collect()
    }

    /// Total targets ever admitted, queued or not
    pub fn admitted(&self) -> usize {
        self.next_id as usize
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
