use crate::graph::ExecutionNode;

/// Address of a node: child indices from the root.
pub type NodePath = Vec<usize>;

/// Total number of nodes in the tree.
pub fn node_count(root: &ExecutionNode) -> usize {
    1 + root.children.iter().map(node_count).sum::<usize>()
}

/// Length of the longest root-to-leaf chain; a single node has depth 1.
pub fn depth(root: &ExecutionNode) -> usize {
    1 + root.children.iter().map(depth).max().unwrap_or(0)
}

/// Post-order listing: every child appears before its parent, children in
/// array order. This is the order the evaluator completes nodes in.
pub fn post_order(root: &ExecutionNode) -> Vec<NodePath> {
    let mut order = Vec::with_capacity(node_count(root));
    let mut path = Vec::new();
    visit(root, &mut path, &mut order);
    order
}

fn visit(node: &ExecutionNode, path: &mut NodePath, order: &mut Vec<NodePath>) {
    for (i, child) in node.children.iter().enumerate() {
        path.push(i);
        visit(child, path, order);
        path.pop();
    }
    order.push(path.clone());
}

pub fn node_at<'a>(root: &'a ExecutionNode, path: &[usize]) -> Option<&'a ExecutionNode> {
    path.iter().try_fold(root, |node, &i| node.children.get(i))
}
