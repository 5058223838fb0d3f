//! The syntax tree. Nodes live in a single arena owned by [`Tree`] and are
//! addressed by [`NodeId`]. Every node is owned by exactly one parent's child
//! list (or is a root) and keeps a non-owning back link to that parent.
//!
//! Each variant keeps a *logical* view of its children in named fields (a
//! class's members, a function's parameters, ...). The *tree* view is the
//! node's `children` list. The enumerations in this module
//! ([`NodeKind::member_nodes_mut`], [`NodeKind::member_lists_mut`],
//! [`NodeKind::reference_slots_mut`]) expose every slot so that generic walkers
//! like cloning and dependency collection never special case a variant.

use std::collections::BTreeMap;

use strum::Display;

use super::{intern::InternedSymbol, lexer::Span};
use crate::{
    error::FatalError,
    index::{IndexVec, simple_index},
    middle::{dependency::DependencyGraph, primitive::IntKind, ty::Type},
};

pub mod clone;
pub mod facets;

simple_index! {
    /// Identifies a node in the tree arena. Stable for the lifetime of the
    /// tree, even while the tree shape is being mutated.
    pub struct NodeId;
}

#[derive(Debug, Default)]
pub struct Tree {
    nodes: IndexVec<NodeId, Node>,
    root: Option<NodeId>,
    dependencies: DependencyGraph,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub resolved: bool,
    pub span: Span,
    pub kind: NodeKind,
}

/// Coarse classification of a node, mostly used in messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum NodeClass {
    Module,
    Declaration,
    Statement,
    Expression,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Module(Module),
    ClassDecl(ClassDecl),
    MemberVarDecl(VarDecl),
    Function(Function),
    ClassMethod(ClassMethod),
    ExternFunction(ExternFunction),
    Parameter(Parameter),
    Block(Block),
    VarDecl(VarDecl),
    ConstVarExpr(VarDecl),
    ReturnExpr(ReturnExpr),
    IfStmt(IfStmt),
    ExprStmt(ExprStmt),
    IntLiteral(IntLiteral),
    BoolLiteral(bool),
    Identifier(Identifier),
    This(This),
    MemberAccess(MemberAccess),
    Call(Call),
    Binary(Binary),
    Unary(Unary),
    Assign(Assign),
}

/// A type as written in source, or a type synthesized by the compiler
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Named { name: InternedSymbol, span: Span },
    Known(Type),
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub items: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: InternedSymbol,
    /// Fields and methods in declaration order
    pub members: Vec<NodeId>,
    pub ty: Option<Type>,
}

/// Shared by locals, constants and class fields
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: InternedSymbol,
    pub declared: Option<TypeExpr>,
    pub initializer: Option<NodeId>,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: InternedSymbol,
    pub params: Vec<NodeId>,
    pub return_type: Option<TypeExpr>,
    pub body: NodeId,
    /// Signature type, set before the body is resolved
    pub ty: Option<Type>,
}

/// A function bound to a class. `params[0]` is always the synthesized
/// receiver, which `this_param` aliases.
#[derive(Debug, Clone)]
pub struct ClassMethod {
    pub function: Function,
    /// Owning class. Not owned by the method.
    pub class: NodeId,
    pub this_param: NodeId,
}

#[derive(Debug, Clone)]
pub struct ExternFunction {
    pub name: InternedSymbol,
    pub params: Vec<NodeId>,
    pub return_type: Option<TypeExpr>,
    pub variadic: bool,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: InternedSymbol,
    pub declared: TypeExpr,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub statements: Vec<NodeId>,
    /// Locals declared directly in this block, filled during resolution
    pub locals: BTreeMap<InternedSymbol, NodeId>,
}

#[derive(Debug, Clone)]
pub struct ReturnExpr {
    pub value: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub condition: NodeId,
    pub then_block: NodeId,
    /// Either a block or another if statement (`elif`)
    pub else_branch: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct ExprStmt {
    pub expression: NodeId,
}

#[derive(Debug, Clone)]
pub struct IntLiteral {
    pub value: u64,
    pub kind: Option<IntKind>,
}

/// What a name refers to once resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local(NodeId),
    Parameter(NodeId),
    /// A class member reached implicitly through a method's receiver
    Member { receiver: NodeId, member: NodeId },
    Function(NodeId),
    Class(NodeId),
}

#[derive(Debug, Clone)]
pub struct Identifier {
    pub name: InternedSymbol,
    pub binding: Option<Binding>,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, Default)]
pub struct This {
    /// The receiver parameter of the enclosing method
    pub receiver: Option<NodeId>,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct MemberAccess {
    pub target: NodeId,
    pub member: InternedSymbol,
    pub member_span: Span,
    pub resolved_member: Option<NodeId>,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    /// An explicit `target.method()` target expression
    Expression(NodeId),
    /// The enclosing method's own receiver parameter
    Parameter(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTarget {
    pub function: NodeId,
    pub receiver: Option<Receiver>,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub callee: NodeId,
    pub arguments: Vec<NodeId>,
    pub target: Option<CallTarget>,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct Binary {
    pub operator: BinaryOperatorKind,
    pub lhs: NodeId,
    pub rhs: NodeId,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct Unary {
    pub operator: UnaryOperatorKind,
    pub operand: NodeId,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone)]
pub struct Assign {
    pub target: NodeId,
    pub value: NodeId,
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinaryOperatorKind {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulus,
    #[strum(serialize = "==")]
    Equals,
    #[strum(serialize = "!=")]
    NotEquals,
    #[strum(serialize = "<")]
    LessThan,
    #[strum(serialize = "<=")]
    LessThanOrEqualTo,
    #[strum(serialize = ">")]
    GreaterThan,
    #[strum(serialize = ">=")]
    GreaterThanOrEqualTo,
    #[strum(serialize = "&&")]
    LogicalAnd,
    #[strum(serialize = "||")]
    LogicalOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    Arithmetic,
    Ordering,
    Equality,
    Logical,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Modulus => {
                BinaryOperatorClass::Arithmetic
            }
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo => BinaryOperatorClass::Ordering,
            Self::Equals | Self::NotEquals => BinaryOperatorClass::Equality,
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnaryOperatorKind {
    #[strum(serialize = "-")]
    Negate,
    #[strum(serialize = "!")]
    LogicalNot,
}

impl NodeKind {
    pub fn class(&self) -> NodeClass {
        match self {
            NodeKind::Module(_) => NodeClass::Module,
            NodeKind::ClassDecl(_)
            | NodeKind::MemberVarDecl(_)
            | NodeKind::Function(_)
            | NodeKind::ClassMethod(_)
            | NodeKind::ExternFunction(_)
            | NodeKind::Parameter(_) => NodeClass::Declaration,
            NodeKind::Block(_)
            | NodeKind::VarDecl(_)
            | NodeKind::ReturnExpr(_)
            | NodeKind::IfStmt(_)
            | NodeKind::ExprStmt(_) => NodeClass::Statement,
            NodeKind::ConstVarExpr(_)
            | NodeKind::IntLiteral(_)
            | NodeKind::BoolLiteral(_)
            | NodeKind::Identifier(_)
            | NodeKind::This(_)
            | NodeKind::MemberAccess(_)
            | NodeKind::Call(_)
            | NodeKind::Binary(_)
            | NodeKind::Unary(_)
            | NodeKind::Assign(_) => NodeClass::Expression,
        }
    }

    /// Short variant name for logs and messages
    pub fn variant_name(&self) -> &'static str {
        match self {
            NodeKind::Module(_) => "Module",
            NodeKind::ClassDecl(_) => "ClassDecl",
            NodeKind::MemberVarDecl(_) => "MemberVarDecl",
            NodeKind::Function(_) => "Function",
            NodeKind::ClassMethod(_) => "ClassMethod",
            NodeKind::ExternFunction(_) => "ExternFunction",
            NodeKind::Parameter(_) => "Parameter",
            NodeKind::Block(_) => "Block",
            NodeKind::VarDecl(_) => "VarDecl",
            NodeKind::ConstVarExpr(_) => "ConstVarExpr",
            NodeKind::ReturnExpr(_) => "ReturnExpr",
            NodeKind::IfStmt(_) => "IfStmt",
            NodeKind::ExprStmt(_) => "ExprStmt",
            NodeKind::IntLiteral(_) => "IntLiteral",
            NodeKind::BoolLiteral(_) => "BoolLiteral",
            NodeKind::Identifier(_) => "Identifier",
            NodeKind::This(_) => "This",
            NodeKind::MemberAccess(_) => "MemberAccess",
            NodeKind::Call(_) => "Call",
            NodeKind::Binary(_) => "Binary",
            NodeKind::Unary(_) => "Unary",
            NodeKind::Assign(_) => "Assign",
        }
    }

    /// The function part of a function-like node
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            NodeKind::Function(function) => Some(function),
            NodeKind::ClassMethod(method) => Some(&method.function),
            _ => None,
        }
    }

    /// Parameters of anything callable, receiver included
    pub fn parameters(&self) -> Option<&[NodeId]> {
        match self {
            NodeKind::Function(function) => Some(&function.params),
            NodeKind::ClassMethod(method) => Some(&method.function.params),
            NodeKind::ExternFunction(function) => Some(&function.params),
            _ => None,
        }
    }

    /// Owned single-node slots
    pub fn member_nodes_mut(&mut self) -> Vec<&mut NodeId> {
        match self {
            NodeKind::Function(function) => vec![&mut function.body],
            NodeKind::ClassMethod(method) => vec![&mut method.function.body],
            NodeKind::MemberVarDecl(var) | NodeKind::VarDecl(var) | NodeKind::ConstVarExpr(var) => {
                var.initializer.iter_mut().collect()
            }
            NodeKind::ReturnExpr(ret) => ret.value.iter_mut().collect(),
            NodeKind::IfStmt(stmt) => {
                let mut slots = vec![&mut stmt.condition, &mut stmt.then_block];
                slots.extend(stmt.else_branch.iter_mut());
                slots
            }
            NodeKind::ExprStmt(stmt) => vec![&mut stmt.expression],
            NodeKind::MemberAccess(access) => vec![&mut access.target],
            NodeKind::Call(call) => vec![&mut call.callee],
            NodeKind::Binary(binary) => vec![&mut binary.lhs, &mut binary.rhs],
            NodeKind::Unary(unary) => vec![&mut unary.operand],
            NodeKind::Assign(assign) => vec![&mut assign.target, &mut assign.value],
            NodeKind::Module(_)
            | NodeKind::ClassDecl(_)
            | NodeKind::ExternFunction(_)
            | NodeKind::Parameter(_)
            | NodeKind::Block(_)
            | NodeKind::IntLiteral(_)
            | NodeKind::BoolLiteral(_)
            | NodeKind::Identifier(_)
            | NodeKind::This(_) => Vec::new(),
        }
    }

    /// Owned node lists
    pub fn member_lists_mut(&mut self) -> Vec<&mut Vec<NodeId>> {
        match self {
            NodeKind::Module(module) => vec![&mut module.items],
            NodeKind::ClassDecl(class) => vec![&mut class.members],
            NodeKind::Function(function) => vec![&mut function.params],
            NodeKind::ClassMethod(method) => vec![&mut method.function.params],
            NodeKind::ExternFunction(function) => vec![&mut function.params],
            NodeKind::Block(block) => vec![&mut block.statements],
            NodeKind::Call(call) => vec![&mut call.arguments],
            _ => Vec::new(),
        }
    }

    /// Non-owning references to other nodes: back links, aliases and
    /// resolution results. These may point outside of the node's subtree.
    pub fn reference_slots_mut(&mut self) -> Vec<&mut NodeId> {
        match self {
            NodeKind::ClassMethod(method) => vec![&mut method.class, &mut method.this_param],
            NodeKind::Block(block) => block.locals.values_mut().collect(),
            NodeKind::Identifier(identifier) => match &mut identifier.binding {
                Some(
                    Binding::Local(id)
                    | Binding::Parameter(id)
                    | Binding::Function(id)
                    | Binding::Class(id),
                ) => vec![id],
                Some(Binding::Member { receiver, member }) => vec![receiver, member],
                None => Vec::new(),
            },
            NodeKind::This(this) => this.receiver.iter_mut().collect(),
            NodeKind::MemberAccess(access) => access.resolved_member.iter_mut().collect(),
            NodeKind::Call(call) => match &mut call.target {
                Some(CallTarget {
                    function,
                    receiver: Some(Receiver::Expression(receiver) | Receiver::Parameter(receiver)),
                }) => vec![function, receiver],
                Some(CallTarget {
                    function,
                    receiver: None,
                }) => vec![function],
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// The slot holding the node's resolved type, for variants that have one
    pub fn ty_mut(&mut self) -> Option<&mut Option<Type>> {
        match self {
            NodeKind::ClassDecl(class) => Some(&mut class.ty),
            NodeKind::MemberVarDecl(var) | NodeKind::VarDecl(var) | NodeKind::ConstVarExpr(var) => {
                Some(&mut var.ty)
            }
            NodeKind::Function(function) | NodeKind::ClassMethod(ClassMethod { function, .. }) => {
                Some(&mut function.ty)
            }
            NodeKind::ExternFunction(function) => Some(&mut function.ty),
            NodeKind::Parameter(param) => Some(&mut param.ty),
            NodeKind::Identifier(identifier) => Some(&mut identifier.ty),
            NodeKind::This(this) => Some(&mut this.ty),
            NodeKind::MemberAccess(access) => Some(&mut access.ty),
            NodeKind::Call(call) => Some(&mut call.ty),
            NodeKind::Binary(binary) => Some(&mut binary.ty),
            NodeKind::Unary(unary) => Some(&mut unary.ty),
            NodeKind::Assign(assign) => Some(&mut assign.ty),
            NodeKind::Module(_)
            | NodeKind::Block(_)
            | NodeKind::ReturnExpr(_)
            | NodeKind::IfStmt(_)
            | NodeKind::ExprStmt(_)
            | NodeKind::IntLiteral(_)
            | NodeKind::BoolLiteral(_) => None,
        }
    }

    /// Every type stored in the node, declared or derived
    pub fn types_mut(&mut self) -> Vec<&mut Type> {
        fn known(expr: &mut Option<TypeExpr>) -> Option<&mut Type> {
            match expr {
                Some(TypeExpr::Known(ty)) => Some(ty),
                _ => None,
            }
        }

        let mut types = Vec::new();

        match self {
            NodeKind::ClassDecl(class) => types.extend(class.ty.as_mut()),
            NodeKind::MemberVarDecl(var) | NodeKind::VarDecl(var) | NodeKind::ConstVarExpr(var) => {
                types.extend(known(&mut var.declared));
                types.extend(var.ty.as_mut());
            }
            NodeKind::Function(function) | NodeKind::ClassMethod(ClassMethod { function, .. }) => {
                types.extend(known(&mut function.return_type));
                types.extend(function.ty.as_mut());
            }
            NodeKind::ExternFunction(function) => {
                types.extend(known(&mut function.return_type));
                types.extend(function.ty.as_mut());
            }
            NodeKind::Parameter(param) => {
                if let TypeExpr::Known(ty) = &mut param.declared {
                    types.push(ty);
                }
                types.extend(param.ty.as_mut());
            }
            NodeKind::Identifier(identifier) => types.extend(identifier.ty.as_mut()),
            NodeKind::This(this) => types.extend(this.ty.as_mut()),
            NodeKind::MemberAccess(access) => types.extend(access.ty.as_mut()),
            NodeKind::Call(call) => types.extend(call.ty.as_mut()),
            NodeKind::Binary(binary) => types.extend(binary.ty.as_mut()),
            NodeKind::Unary(unary) => types.extend(unary.ty.as_mut()),
            NodeKind::Assign(assign) => types.extend(assign.ty.as_mut()),
            NodeKind::Module(_)
            | NodeKind::Block(_)
            | NodeKind::ReturnExpr(_)
            | NodeKind::IfStmt(_)
            | NodeKind::ExprStmt(_)
            | NodeKind::IntLiteral(_)
            | NodeKind::BoolLiteral(_) => {}
        }

        types
    }

    /// Owned children in canonical tree order
    pub fn owned_children(&mut self) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = Vec::new();

        // Lists come first for every variant that has both (parameters before
        // a function body, callee handled below)
        if let NodeKind::Call(call) = self {
            children.push(call.callee);
            children.extend(call.arguments.iter().copied());
            return children;
        }

        for list in self.member_lists_mut() {
            children.extend(list.iter().copied());
        }

        for slot in self.member_nodes_mut() {
            children.push(*slot);
        }

        children
    }

    /// Drops `child` from whichever logical slot holds it. Required slots
    /// cannot be emptied.
    fn forget_child(&mut self, child: NodeId) -> bool {
        for list in self.member_lists_mut() {
            if let Some(index) = list.iter().position(|id| *id == child) {
                list.remove(index);
                return true;
            }
        }

        let optional = match self {
            NodeKind::MemberVarDecl(var) | NodeKind::VarDecl(var) | NodeKind::ConstVarExpr(var) => {
                &mut var.initializer
            }
            NodeKind::ReturnExpr(ret) => &mut ret.value,
            NodeKind::IfStmt(stmt) => &mut stmt.else_branch,
            _ => return false,
        };

        if *optional == Some(child) {
            *optional = None;
            return true;
        }

        false
    }
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    pub fn dependencies_mut(&mut self) -> &mut DependencyGraph {
        &mut self.dependencies
    }

    /// Allocates a node and adopts every child its kind refers to. The
    /// children must not already have a parent.
    pub fn add(&mut self, mut kind: NodeKind, span: Span) -> NodeId {
        let children = kind.owned_children();
        let id = self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            resolved: false,
            span,
            kind,
        });

        for child in &children {
            debug_assert!(self.nodes[*child].parent.is_none());
            self.nodes[*child].parent = Some(id);
        }

        self.nodes[id].children = children;
        id
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id].span
    }

    pub fn is_resolved(&self, id: NodeId) -> bool {
        self.nodes[id].resolved
    }

    /// Parents of `id`, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// Nearest ancestor satisfying `predicate`
    pub fn find_parent(
        &self,
        id: NodeId,
        predicate: impl Fn(&NodeKind) -> bool,
    ) -> Option<NodeId> {
        self.ancestors(id).find(|ancestor| predicate(self.kind(*ancestor)))
    }

    pub fn enclosing_function(&self, id: NodeId) -> Option<NodeId> {
        self.find_parent(id, |kind| kind.as_function().is_some())
    }

    pub fn enclosing_method(&self, id: NodeId) -> Option<NodeId> {
        self.find_parent(id, |kind| matches!(kind, NodeKind::ClassMethod(_)))
    }

    /// `root` and all its descendants, parents before children
    pub fn preorder(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }

        order
    }

    /// Appends `child` to the member list of a module, class or block
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), FatalError> {
        let list = match &mut self.nodes[parent].kind {
            NodeKind::Module(module) => &mut module.items,
            NodeKind::ClassDecl(class) => &mut class.members,
            NodeKind::Block(block) => &mut block.statements,
            other => {
                return Err(crate::fatal!(
                    "cannot append children to a {}",
                    other.variant_name()
                ));
            }
        };

        list.push(child);
        self.attach(parent, child, None)
    }

    /// Links `child` into `parent`'s tree children at `index` (or at the end).
    /// The caller keeps the logical slot in sync.
    pub fn attach(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: Option<usize>,
    ) -> Result<(), FatalError> {
        if let Some(old_parent) = self.nodes[child].parent {
            return Err(crate::fatal!(
                "node {child} is already owned by node {old_parent}"
            ));
        }

        let children = &mut self.nodes[parent].children;
        match index {
            Some(index) if index <= children.len() => children.insert(index, child),
            Some(index) => {
                return Err(crate::fatal!(
                    "child index {index} out of bounds for node {parent}"
                ));
            }
            None => children.push(child),
        }

        self.nodes[child].parent = Some(parent);
        Ok(())
    }

    /// Unlinks `child` from both the tree and the logical view of `parent`.
    /// The detached subtree becomes a root of its own.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), FatalError> {
        let Some(position) = self.children(parent).iter().position(|id| *id == child) else {
            return Err(crate::fatal!("node {child} is not a child of node {parent}"));
        };

        if !self.nodes[parent].kind.forget_child(child) {
            return Err(crate::fatal!(
                "node {child} occupies a required slot of a {}",
                self.kind(parent).variant_name()
            ));
        }

        self.nodes[parent].children.remove(position);
        self.nodes[child].parent = None;
        Ok(())
    }

    /// Checks that parent links and child lists agree everywhere and that
    /// each node's tree children match its logical slots.
    pub fn is_consistent(&self) -> bool {
        self.nodes.enumerate().all(|(id, node)| {
            let links_agree = node
                .children
                .iter()
                .all(|child| self.nodes[*child].parent == Some(id));

            let owned_once = match node.parent {
                Some(parent) => {
                    self.nodes[parent]
                        .children
                        .iter()
                        .filter(|child| **child == id)
                        .count()
                        == 1
                }
                None => true,
            };

            let mut kind = node.kind.clone();
            let mut logical = kind.owned_children();
            let mut tree = node.children.clone();
            logical.sort();
            tree.sort();

            links_agree && owned_once && logical == tree
        })
    }
}

impl core::ops::Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(tree: &mut Tree, value: u64) -> NodeId {
        tree.add(
            NodeKind::IntLiteral(IntLiteral { value, kind: None }),
            Span::default(),
        )
    }

    fn field(tree: &mut Tree, name: &str) -> NodeId {
        tree.add(
            NodeKind::MemberVarDecl(VarDecl {
                name: InternedSymbol::new(name),
                declared: None,
                initializer: None,
                ty: None,
            }),
            Span::default(),
        )
    }

    #[test]
    fn add_adopts_children_in_order() {
        let mut tree = Tree::new();
        let lhs = literal(&mut tree, 1);
        let rhs = literal(&mut tree, 2);
        let binary = tree.add(
            NodeKind::Binary(Binary {
                operator: BinaryOperatorKind::Add,
                lhs,
                rhs,
                ty: None,
            }),
            Span::default(),
        );

        assert_eq!(tree.children(binary), &[lhs, rhs]);
        assert_eq!(tree.parent(lhs), Some(binary));
        assert_eq!(tree.parent(binary), None);
        assert!(tree.is_consistent());
    }

    #[test]
    fn append_and_remove_keep_views_in_sync() {
        let mut tree = Tree::new();
        let class = tree.add(
            NodeKind::ClassDecl(ClassDecl {
                name: InternedSymbol::new("Point"),
                members: Vec::new(),
                ty: None,
            }),
            Span::default(),
        );
        let x = field(&mut tree, "x");
        let y = field(&mut tree, "y");

        tree.append_child(class, x).unwrap();
        tree.append_child(class, y).unwrap();
        assert!(tree.is_consistent());

        tree.remove_child(class, x).unwrap();

        let NodeKind::ClassDecl(decl) = tree.kind(class) else {
            unreachable!()
        };
        assert_eq!(decl.members, vec![y]);
        assert_eq!(tree.children(class), &[y]);
        assert_eq!(tree.parent(x), None);
        assert!(tree.is_consistent());
    }

    #[test]
    fn attaching_an_owned_node_is_fatal() {
        let mut tree = Tree::new();
        let block = tree.add(NodeKind::Block(Block::default()), Span::default());
        let other = tree.add(NodeKind::Block(Block::default()), Span::default());
        let value = literal(&mut tree, 1);
        let stmt = tree.add(
            NodeKind::ExprStmt(ExprStmt { expression: value }),
            Span::default(),
        );

        tree.append_child(block, stmt).unwrap();
        assert!(tree.append_child(other, stmt).is_err());
    }

    #[test]
    fn required_slots_cannot_be_removed() {
        let mut tree = Tree::new();
        let value = literal(&mut tree, 1);
        let stmt = tree.add(
            NodeKind::ExprStmt(ExprStmt { expression: value }),
            Span::default(),
        );

        assert!(tree.remove_child(stmt, value).is_err());
        assert_eq!(tree.parent(value), Some(stmt));
    }

    #[test]
    fn preorder_visits_parents_first() {
        let mut tree = Tree::new();
        let value = literal(&mut tree, 7);
        let ret = tree.add(
            NodeKind::ReturnExpr(ReturnExpr { value: Some(value) }),
            Span::default(),
        );
        let block = tree.add(
            NodeKind::Block(Block {
                statements: vec![ret],
                locals: BTreeMap::new(),
            }),
            Span::default(),
        );

        assert_eq!(tree.preorder(block), vec![block, ret, value]);
        assert_eq!(tree.ancestors(value).collect::<Vec<_>>(), vec![ret, block]);
        assert_eq!(tree.kind(ret).class(), NodeClass::Statement);
    }
}
