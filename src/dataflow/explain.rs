use super::node::{DataflowNode, DataflowNodeRef};
use super::plan::DataflowPlan;

/// Render a dataflow plan as human-readable multiline text, sink first.
pub fn explain_plan(plan: &DataflowPlan) -> String {
    let mut s = String::new();
    for sink in &plan.sink_nodes {
        fmt_node(sink, 0, &mut s);
    }
    s
}

fn fmt_node(node: &DataflowNodeRef, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    out.push_str(&format!("{pad}{} ({}) {}\n", node.node_type(), node.id(), node.description()));
    match node.as_ref() {
        DataflowNode::JoinToBaseOutput(n) => {
            fmt_node(&n.left, indent + 1, out);
            for target in &n.join_targets {
                out.push_str(&format!("{pad}  on {}:\n", target.join_on_identifier.qualified_name()));
                fmt_node(&target.join_node, indent + 2, out);
            }
        }
        DataflowNode::WhereConstraint(n) => {
            out.push_str(&format!("{pad}  where={}\n", n.where_filter.where_sql));
            fmt_node(&n.parent, indent + 1, out);
        }
        _ => {
            for parent in node.parents() {
                fmt_node(parent, indent + 1, out);
            }
        }
    }
}
