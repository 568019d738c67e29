use crate::execution::{ExecutionTrace, NodeReport, NodeState};
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the evaluation of a tree, one line per node, with every node's
/// step, state, entity count and the problems it added to the trail.
pub fn format_trace(trace: &ExecutionTrace) -> String {
    let mut tracer = Tracer {
        reports: trace.reports.iter().map(|r| (r.path.as_slice(), r)).collect(),
        output: String::new(),
    };

    let root_path: &[usize] = &[];
    match tracer.reports.get(root_path).copied() {
        Some(root) => {
            let _ = writeln!(tracer.output, "EXECUTION TRACE for '{}':", root.title);
            let _ = writeln!(tracer.output, "--------------------------------------------------");
            let mut path = Vec::new();
            tracer.trace_node(&mut path, 1, "");
        }
        None => {
            let _ = writeln!(tracer.output, "Error: nothing was evaluated");
        }
    }
    tracer.output
}

struct Tracer<'a> {
    reports: HashMap<&'a [usize], &'a NodeReport>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, path: &mut Vec<usize>, level: usize, prefix: &str) {
        let Some(report) = self.reports.get(path.as_slice()).copied() else {
            let _ = writeln!(self.output, "{}[L{}] (not evaluated)", prefix, level);
            return;
        };

        let state = match report.state {
            NodeState::Done => String::new(),
            other => format!(" ({:?})", other),
        };
        let _ = writeln!(
            self.output,
            "{}[L{}] {} <{}> = {} [{} entities]{}",
            prefix, level, report.title, report.node_type, report.step, report.entity_count, state
        );

        let stem = self.build_child_stem(prefix);
        for err in &report.errors {
            let rail = if report.children > 0 { "|" } else { " " };
            let _ = writeln!(self.output, "{}{}  ! {}", stem, rail, err);
        }

        for i in 0..report.children {
            let connector = if i + 1 == report.children { "`--" } else { "|--" };
            path.push(i);
            self.trace_node(path, level + 1, &format!("{}{}", stem, connector));
            path.pop();
        }
    }

    fn build_child_stem(&self, current_prefix: &str) -> String {
        current_prefix.replace("`--", "   ").replace("|--", "|  ")
    }
}
