//! A complete dataflow plan: a DAG reachable from its sink nodes

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::ids::NodeId;
use super::node::DataflowNodeRef;

#[derive(Debug, Clone)]
pub struct DataflowPlan {
    pub sink_nodes: Vec<DataflowNodeRef>,
}

impl DataflowPlan {
    pub fn new(sink_nodes: Vec<DataflowNodeRef>) -> Self {
        DataflowPlan { sink_nodes }
    }

    /// The only sink. Plans with zero or several sinks violate a compiler invariant.
    pub fn sink_node(&self) -> Result<&DataflowNodeRef> {
        match self.sink_nodes.as_slice() {
            [sink] if sink.is_sink() => Ok(sink),
            [node] => Err(Error::internal(format!("{} is not a sink node", node.id()))),
            [] => Err(Error::internal("dataflow plan has no sink node")),
            sinks => Err(Error::internal(format!("dataflow plan has {} sink nodes", sinks.len()))),
        }
    }

    /// Every distinct node, parents before children
    pub fn nodes(&self) -> Vec<DataflowNodeRef> {
        fn visit(node: &DataflowNodeRef, seen: &mut HashSet<NodeId>, out: &mut Vec<DataflowNodeRef>) {
            if !seen.insert(node.id().clone()) {
                return;
            }
            for parent in node.parents() {
                visit(parent, seen, out);
            }
            out.push(node.clone());
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for sink in &self.sink_nodes {
            visit(sink, &mut seen, &mut out);
        }
        out
    }

    /// Whether no node is its own ancestor
    pub fn is_acyclic(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        fn visit(node: &DataflowNodeRef, marks: &mut HashMap<NodeId, Mark>) -> bool {
            match marks.get(node.id()) {
                Some(Mark::Done) => return true,
                Some(Mark::Visiting) => return false,
                None => {}
            }
            marks.insert(node.id().clone(), Mark::Visiting);
            for parent in node.parents() {
                if !visit(parent, marks) {
                    return false;
                }
            }
            marks.insert(node.id().clone(), Mark::Done);
            true
        }

        let mut marks = HashMap::new();
        self.sink_nodes.iter().all(|s| visit(s, &mut marks))
    }

    /// Indented text rendering, sink first
    pub fn explain(&self) -> String {
        super::explain::explain_plan(self)
    }
}
