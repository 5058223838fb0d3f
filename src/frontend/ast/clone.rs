use std::collections::BTreeMap;

use tracing::trace;

use super::{NodeId, Tree};

impl Tree {
    /// Deep copies the subtree rooted at `root` and returns the detached copy.
    ///
    /// Links between nodes of the subtree (children, aliases, bindings and
    /// dependency edges) are retargeted to the copies. Links leaving the
    /// subtree keep pointing at the shared original, so a cloned method still
    /// belongs to the same class. Copies start out unresolved.
    pub fn clone_subtree(&mut self, root: NodeId) -> NodeId {
        let originals = self.preorder(root);
        let mut copies = BTreeMap::new();

        for original in &originals {
            let copy = self.nodes.push(self.nodes[*original].clone());
            copies.insert(*original, copy);
        }

        let remap = |id: NodeId| copies.get(&id).copied().unwrap_or(id);

        for original in &originals {
            let copy = remap(*original);
            let node = &mut self.nodes[copy];

            node.parent = if *original == root {
                None
            } else {
                node.parent.map(remap)
            };
            node.resolved = false;

            for child in &mut node.children {
                *child = remap(*child);
            }
            for slot in node.kind.member_nodes_mut() {
                *slot = remap(*slot);
            }
            for list in node.kind.member_lists_mut() {
                for slot in list.iter_mut() {
                    *slot = remap(*slot);
                }
            }
            for slot in node.kind.reference_slots_mut() {
                *slot = remap(*slot);
            }
            for ty in node.kind.types_mut() {
                ty.remap_classes(&remap);
            }

            let dependencies: Vec<_> = self.dependencies.of(*original).map(remap).collect();
            for dependency in dependencies {
                self.dependencies.add(copy, dependency);
            }
            if self.dependencies.is_collected(*original) {
                self.dependencies.mark_collected(copy);
            }
        }

        let copy = remap(root);
        trace!(%root, %copy, nodes = originals.len(), "cloned subtree");
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{
        ast::{Binary, BinaryOperatorKind, IntLiteral, NodeKind},
        lexer::Span,
    };

    #[test]
    fn cloned_expressions_are_independent() {
        let mut tree = Tree::new();
        let lhs = tree.add(
            NodeKind::IntLiteral(IntLiteral {
                value: 1,
                kind: None,
            }),
            Span::default(),
        );
        let rhs = tree.add(
            NodeKind::IntLiteral(IntLiteral {
                value: 2,
                kind: None,
            }),
            Span::default(),
        );
        let sum = tree.add(
            NodeKind::Binary(Binary {
                operator: BinaryOperatorKind::Add,
                lhs,
                rhs,
                ty: None,
            }),
            Span::default(),
        );
        tree.find_dependencies(sum);

        let copy = tree.clone_subtree(sum);
        let NodeKind::Binary(binary) = tree.kind(copy).clone() else {
            unreachable!()
        };

        assert_ne!(binary.lhs, lhs);
        assert_eq!(tree.parent(binary.lhs), Some(copy));
        assert!(tree.dependencies().depends_on(copy, binary.lhs));
        assert!(!tree.dependencies().depends_on(copy, lhs));

        if let NodeKind::IntLiteral(literal) = tree.kind_mut(binary.lhs) {
            literal.value = 40;
        }

        let NodeKind::IntLiteral(original) = tree.kind(lhs) else {
            unreachable!()
        };
        assert_eq!(original.value, 1);
        assert!(tree.is_consistent());
    }
}
