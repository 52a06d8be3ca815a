use core::{fmt, ptr::NonNull};
use std::collections::VecDeque;

use crate::{links, AvlTree, Link, Links, TreeNode};

impl<T, C> AvlTree<T, C>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Renders the tree shape sideways, one node per line.
    ///
    /// Each node is printed with `printer` below its parent, left child first. A node with a
    /// single child shows the missing side as `∅`:
    ///
    /// ```text
    /// └── 2
    ///     ├── 1
    ///     └── 3
    ///         ├── ∅
    ///         └── 4
    /// ```
    pub fn render<F, D>(&self, mut printer: F) -> String
    where
        F: FnMut(&T) -> D,
        D: fmt::Display,
    {
        let mut out = String::new();
        // Writing to a `String` only fails if `printer`'s output does.
        let _ = self.write_rendered(&mut out, &mut printer);
        out
    }

    pub(crate) fn write_rendered<W, F, D>(&self, w: &mut W, printer: &mut F) -> fmt::Result
    where
        W: fmt::Write,
        F: FnMut(&T) -> D,
        D: fmt::Display,
    {
        // (node or missing sibling, prefix, is the last child of its parent)
        let mut stack: Vec<(Link<T>, String, bool)> = Vec::new();
        if let Some(root) = self.root {
            stack.push((Some(root), String::new(), true));
        }

        while let Some((opt_node, prefix, is_tail)) = stack.pop() {
            let branch = if is_tail { "└── " } else { "├── " };
            let Some(node) = opt_node else {
                writeln!(w, "{prefix}{branch}∅")?;
                continue;
            };

            writeln!(w, "{prefix}{branch}{}", printer(unsafe { node.as_ref() }))?;

            let left = unsafe { links(node).left() };
            let right = unsafe { links(node).right() };
            if left.is_none() && right.is_none() {
                continue;
            }

            let indent = format!("{prefix}{}", if is_tail { "    " } else { "│   " });

            // The right child is printed last, so it goes on the stack first.
            stack.push((right, indent.clone(), true));
            stack.push((left, indent, false));
        }

        Ok(())
    }

    /// Writes the tree as a Graphviz digraph, labelling each node with `printer`'s output and its
    /// balance factor.
    pub fn dotgraph<W, F, D>(&self, name: &str, mut printer: F, mut w: W) -> fmt::Result
    where
        W: fmt::Write,
        F: FnMut(&T) -> D,
        D: fmt::Display,
    {
        let root = match self.root {
            Some(r) => r,
            None => return write!(w, "digraph \"graph-{name}\" {{}}"),
        };

        enum Item<T: ?Sized> {
            Node(NonNull<T>, usize),
            Missing(u32),
        }

        let mut queue = VecDeque::new();
        queue.push_back(Item::Node(root, 0));

        write!(
            w,
            "digraph \"graph-{name}\" {{\n subgraph \"subgraph-{name}\" {{"
        )?;

        let mut next_id = 1;
        let mut missing = 0;
        let mut edges = String::new();

        while !queue.is_empty() {
            use fmt::Write;

            write!(w, "{{rank=same; ")?;

            for _ in 0..queue.len() {
                let Some(item) = queue.pop_front() else {
                    break;
                };

                let (node, id) = match item {
                    Item::Node(node, id) => (node, id),
                    Item::Missing(id) => {
                        write!(w, "\"graph{name}-missing{id}\" [shape=point]; ")?;
                        continue;
                    }
                };

                let label = printer(unsafe { node.as_ref() });
                let balance = unsafe { links(node).balance() };
                write!(w, "\"graph{name}-{id}\" [label=\"{label}:{balance}\"]; ")?;

                for child in unsafe { [links(node).left(), links(node).right()] } {
                    if let Some(child) = child {
                        queue.push_back(Item::Node(child, next_id));
                        writeln!(edges, "\"graph{name}-{id}\" -> \"graph{name}-{next_id}\";")?;
                        next_id += 1;
                    } else {
                        queue.push_back(Item::Missing(missing));
                        writeln!(
                            edges,
                            "\"graph{name}-{id}\" -> \"graph{name}-missing{missing}\";"
                        )?;
                        missing += 1;
                    }
                }
            }

            writeln!(w, "}}")?;
        }

        w.write_str(&edges)?;

        w.write_str(" }\n}")
    }
}
