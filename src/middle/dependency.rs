use std::collections::{BTreeMap, BTreeSet};

use crate::frontend::ast::{NodeId, NodeKind, Tree};

/// "Must be resolved after" edges between nodes. Kept apart from the tree so
/// edges stay valid while the tree is reshaped.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// Nodes whose dependencies have already been declared
    collected: BTreeSet<NodeId>,
}

impl DependencyGraph {
    pub fn add(&mut self, node: NodeId, dependency: NodeId) {
        if node != dependency {
            self.edges.entry(node).or_default().insert(dependency);
        }
    }

    pub fn of(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.edges.get(&node).into_iter().flatten().copied()
    }

    pub fn depends_on(&self, node: NodeId, dependency: NodeId) -> bool {
        self.edges
            .get(&node)
            .is_some_and(|dependencies| dependencies.contains(&dependency))
    }

    pub fn is_collected(&self, node: NodeId) -> bool {
        self.collected.contains(&node)
    }

    pub fn mark_collected(&mut self, node: NodeId) {
        self.collected.insert(node);
    }
}

/// The nodes `id` declares it must be resolved after
fn declared_dependencies(tree: &Tree, id: NodeId) -> Vec<NodeId> {
    match tree.kind(id) {
        NodeKind::ClassMethod(method) => vec![method.class],
        NodeKind::ReturnExpr(ret) => ret.value.into_iter().collect(),
        NodeKind::VarDecl(var) | NodeKind::ConstVarExpr(var) | NodeKind::MemberVarDecl(var) => {
            var.initializer.into_iter().collect()
        }
        NodeKind::Call(call) => vec![call.callee],
        NodeKind::Binary(binary) => vec![binary.lhs, binary.rhs],
        NodeKind::Unary(unary) => vec![unary.operand],
        NodeKind::Assign(assign) => vec![assign.value],
        NodeKind::MemberAccess(access) => vec![access.target],
        _ => Vec::new(),
    }
}

impl Tree {
    /// Declares the dependencies of `id`. Only the first call for a node has
    /// any effect.
    pub fn find_dependencies(&mut self, id: NodeId) {
        if self.dependencies().is_collected(id) {
            return;
        }

        let declared = declared_dependencies(self, id);
        let graph = self.dependencies_mut();
        for dependency in declared {
            graph.add(id, dependency);
        }
        graph.mark_collected(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frontend::{
            ast::{IntLiteral, ReturnExpr},
            lexer::Span,
        },
        index::Index,
    };

    #[test]
    fn self_edges_are_ignored() {
        let mut graph = DependencyGraph::default();
        graph.add(NodeId::new(1), NodeId::new(1));
        graph.add(NodeId::new(1), NodeId::new(2));
        graph.add(NodeId::new(1), NodeId::new(2));

        assert_eq!(graph.of(NodeId::new(1)).collect::<Vec<_>>(), vec![NodeId::new(2)]);
        assert!(graph.depends_on(NodeId::new(1), NodeId::new(2)));
        assert_eq!(graph.of(NodeId::new(2)).count(), 0);
    }

    #[test]
    fn return_depends_on_its_operand_once() {
        let mut tree = Tree::new();
        let value = tree.add(
            NodeKind::IntLiteral(IntLiteral {
                value: 1,
                kind: None,
            }),
            Span::default(),
        );
        let ret = tree.add(
            NodeKind::ReturnExpr(ReturnExpr { value: Some(value) }),
            Span::default(),
        );

        tree.find_dependencies(ret);
        assert!(tree.dependencies().depends_on(ret, value));

        // A second call must not pick up edges declared after the first
        if let NodeKind::ReturnExpr(ret_expr) = tree.kind_mut(ret) {
            ret_expr.value = None;
        }
        tree.find_dependencies(ret);
        assert_eq!(tree.dependencies().of(ret).collect::<Vec<_>>(), vec![value]);
    }
}
