//! Synthetic ids for one compilation

use std::fmt;

/// Id of a dataflow node, SQL sub-query or execution task, e.g. `jdo_4`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub prefix: &'static str,
    pub index: u64,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.prefix, self.index)
    }
}

/// Hands out increasing ids. Each compilation owns one, so the same query over the same model
/// always gets the same ids.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new(start: u64) -> Self {
        IdAllocator { next: start }
    }

    pub fn next_id(&mut self, prefix: &'static str) -> NodeId {
        let id = NodeId { prefix, index: self.next };
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        IdAllocator::new(0)
    }
}
