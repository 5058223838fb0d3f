//! Capabilities a node variant may provide independently of one another. The
//! resolver and code generator query these through [`NodeKind::as_named`] and
//! friends rather than matching on every variant.

use super::{
    Binding, Block, ClassDecl, ExternFunction, Function, Module, NodeId, NodeKind, Parameter, This,
    Tree, VarDecl,
};
use crate::{
    frontend::intern::InternedSymbol,
    middle::{primitive::IntKind, ty::Type},
};

/// Has a name that scopes can look it up by
pub trait Named {
    fn name(&self) -> InternedSymbol;
}

/// Carries a type once it has been resolved
pub trait Typed {
    fn ty(&self) -> Option<&Type>;
}

/// Exposes the members of the class its value refers to
pub trait Accessible: Typed {
    /// Looks up `name` on the class this node's type refers to. `this` is the
    /// id of the node being accessed through.
    fn access(&self, tree: &Tree, this: NodeId, name: InternedSymbol) -> Option<Binding> {
        let class = self.ty()?.class_id()?;
        let member = tree.class_member(class, name)?;

        Some(Binding::Member {
            receiver: this,
            member,
        })
    }
}

/// Owns a collection of named members used for scoped lookup
pub trait Scope {
    fn lookup(&self, tree: &Tree, name: InternedSymbol) -> Option<NodeId>;
}

impl Named for ClassDecl {
    fn name(&self) -> InternedSymbol {
        self.name
    }
}

impl Named for VarDecl {
    fn name(&self) -> InternedSymbol {
        self.name
    }
}

impl Named for Function {
    fn name(&self) -> InternedSymbol {
        self.name
    }
}

impl Named for ExternFunction {
    fn name(&self) -> InternedSymbol {
        self.name
    }
}

impl Named for Parameter {
    fn name(&self) -> InternedSymbol {
        self.name
    }
}

impl Typed for ClassDecl {
    fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }
}

impl Typed for VarDecl {
    fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }
}

impl Typed for Function {
    fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }
}

impl Typed for ExternFunction {
    fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }
}

impl Typed for Parameter {
    fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }
}

impl Typed for This {
    fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }
}

impl Accessible for VarDecl {}
impl Accessible for Parameter {}
impl Accessible for This {}

fn lookup_named(tree: &Tree, nodes: &[NodeId], name: InternedSymbol) -> Option<NodeId> {
    nodes.iter().copied().find(|id| {
        tree.kind(*id)
            .as_named()
            .is_some_and(|named| named.name() == name)
    })
}

impl Scope for ClassDecl {
    fn lookup(&self, tree: &Tree, name: InternedSymbol) -> Option<NodeId> {
        lookup_named(tree, &self.members, name)
    }
}

impl Scope for Module {
    fn lookup(&self, tree: &Tree, name: InternedSymbol) -> Option<NodeId> {
        lookup_named(tree, &self.items, name)
    }
}

impl Scope for Block {
    fn lookup(&self, _tree: &Tree, name: InternedSymbol) -> Option<NodeId> {
        self.locals.get(&name).copied()
    }
}

impl NodeKind {
    pub fn as_named(&self) -> Option<&dyn Named> {
        match self {
            NodeKind::ClassDecl(class) => Some(class),
            NodeKind::MemberVarDecl(var) | NodeKind::VarDecl(var) | NodeKind::ConstVarExpr(var) => {
                Some(var)
            }
            NodeKind::Function(function) => Some(function),
            NodeKind::ClassMethod(method) => Some(&method.function),
            NodeKind::ExternFunction(function) => Some(function),
            NodeKind::Parameter(param) => Some(param),
            _ => None,
        }
    }

    /// Declarations and expressions that carry a type. Expression types are
    /// stored inline on each expression variant.
    pub fn as_typed(&self) -> Option<&dyn Typed> {
        match self {
            NodeKind::ClassDecl(class) => Some(class),
            NodeKind::MemberVarDecl(var) | NodeKind::VarDecl(var) | NodeKind::ConstVarExpr(var) => {
                Some(var)
            }
            NodeKind::Function(function) => Some(function),
            NodeKind::ClassMethod(method) => Some(&method.function),
            NodeKind::ExternFunction(function) => Some(function),
            NodeKind::Parameter(param) => Some(param),
            NodeKind::This(this) => Some(this),
            _ => None,
        }
    }

    pub fn as_accessible(&self) -> Option<&dyn Accessible> {
        match self {
            NodeKind::MemberVarDecl(var) | NodeKind::VarDecl(var) | NodeKind::ConstVarExpr(var) => {
                Some(var)
            }
            NodeKind::Parameter(param) => Some(param),
            NodeKind::This(this) => Some(this),
            _ => None,
        }
    }

    pub fn as_scope(&self) -> Option<&dyn Scope> {
        match self {
            NodeKind::ClassDecl(class) => Some(class),
            NodeKind::Module(module) => Some(module),
            NodeKind::Block(block) => Some(block),
            _ => None,
        }
    }

    /// The type of an expression or declaration, if it has been resolved
    pub fn ty(&self) -> Option<Type> {
        match self {
            NodeKind::IntLiteral(literal) => {
                Some(Type::Int(literal.kind.unwrap_or(IntKind::I64)))
            }
            NodeKind::BoolLiteral(_) => Some(Type::Bool),
            NodeKind::Identifier(identifier) => identifier.ty.clone(),
            NodeKind::MemberAccess(access) => access.ty.clone(),
            NodeKind::Call(call) => call.ty.clone(),
            NodeKind::Binary(binary) => binary.ty.clone(),
            NodeKind::Unary(unary) => unary.ty.clone(),
            NodeKind::Assign(assign) => assign.ty.clone(),
            other => other.as_typed().and_then(Typed::ty).cloned(),
        }
    }
}

impl Tree {
    /// A field or method of `class` by name
    pub fn class_member(&self, class: NodeId, name: InternedSymbol) -> Option<NodeId> {
        match self.kind(class) {
            NodeKind::ClassDecl(decl) => decl.lookup(self, name),
            _ => None,
        }
    }

    /// Fields of `class` in declaration order, methods excluded
    pub fn class_fields(&self, class: NodeId) -> Vec<NodeId> {
        match self.kind(class) {
            NodeKind::ClassDecl(decl) => decl
                .members
                .iter()
                .copied()
                .filter(|member| matches!(self.kind(*member), NodeKind::MemberVarDecl(_)))
                .collect(),
            _ => Vec::new(),
        }
    }
}
