//! Indented rendering of a forest, honouring each node's expand flag.

use std::io::{self, Write};

use strata_core::tree::{TreeItem, TreeNode};

/// Write the visible part of `forest`: roots always, children only below an
/// expanded node.
///
/// Pretty mode draws `▾`/`▸` markers; text mode emits
/// `depth<TAB>id<TAB>label` rows.
pub fn write_forest<T: TreeItem>(
    w: &mut dyn Write,
    forest: &[TreeNode<T>],
    pretty: bool,
    label: &dyn Fn(&T) -> String,
) -> io::Result<()> {
    let mut stack: Vec<(&TreeNode<T>, usize)> = forest.iter().rev().map(|n| (n, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        write_node(w, node, depth, pretty, label)?;
        if node.expanded {
            stack.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
        }
    }
    Ok(())
}

fn write_node<T: TreeItem>(
    w: &mut dyn Write,
    node: &TreeNode<T>,
    depth: usize,
    pretty: bool,
    label: &dyn Fn(&T) -> String,
) -> io::Result<()> {
    if pretty {
        let marker = if node.is_leaf() {
            " "
        } else if node.expanded {
            "▾"
        } else {
            "▸"
        };
        let hidden = if !node.is_leaf() && !node.expanded {
            format!(" (+{})", node.descendant_count())
        } else {
            String::new()
        };
        writeln!(
            w,
            "{:indent$}{marker} {}  {}{hidden}",
            "",
            label(&node.item),
            node.id(),
            indent = depth * 2
        )
    } else {
        writeln!(w, "{depth}\t{}\t{}", node.id(), label(&node.item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        id: String,
        parent: Option<String>,
    }

    impl TreeItem for Item {
        fn node_id(&self) -> &str {
            &self.id
        }

        fn parent_id(&self) -> Option<&str> {
            self.parent.as_deref()
        }

        fn search_fields(&self) -> Vec<&str> {
            vec![self.id.as_str()]
        }
    }

    fn item(id: &str, parent: Option<&str>) -> Item {
        Item {
            id: id.into(),
            parent: parent.map(str::to_string),
        }
    }

    fn render(forest: &[TreeNode<Item>], pretty: bool) -> String {
        let mut buf = Vec::new();
        write_forest(&mut buf, forest, pretty, &|i: &Item| i.id.to_uppercase())
            .expect("write");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn collapsed_children_are_hidden() {
        let forest = strata_core::tree::build_tree(vec![
            item("a", None),
            item("b", Some("a")),
            item("c", Some("b")),
        ]);
        // Root expanded, `b` collapsed: `c` stays hidden.
        assert_eq!(render(&forest, false), "0\ta\tA\n1\tb\tB\n");
    }

    #[test]
    fn pretty_marks_collapsed_branches() {
        let forest = strata_core::tree::build_tree(vec![
            item("a", None),
            item("b", Some("a")),
            item("c", Some("b")),
        ]);
        let text = render(&forest, true);
        assert!(text.starts_with("▾ A  a\n"));
        assert!(text.contains("  ▸ B  b (+1)\n"));
    }
}
