//! Lowering of class constructs onto plain functions. A method becomes a
//! function whose first parameter is a reference to its class, and field
//! accesses become offsets into the class layout.

use tracing::debug;

use crate::{
    error::{FatalError, FatalErrorKind},
    fatal,
    frontend::{
        ast::{ClassMethod, Function, NodeId, NodeKind, Parameter, Tree, TypeExpr},
        intern::InternedSymbol,
        lexer::Span,
    },
    middle::ty::Type,
};

/// Everything a method has before its receiver is synthesized
#[derive(Debug)]
pub struct MethodSignature {
    pub name: InternedSymbol,
    pub params: Vec<NodeId>,
    pub return_type: Option<TypeExpr>,
    pub body: NodeId,
    pub span: Span,
}

/// Creates a method of `class`, inserting a `this` parameter of type
/// `Class&` ahead of the declared parameters. The method is returned
/// detached so the caller can place it among the class members.
pub fn create_class_method(
    tree: &mut Tree,
    class: Option<NodeId>,
    signature: MethodSignature,
) -> Result<NodeId, FatalError> {
    let Some((class, class_name)) = class.and_then(|class| match tree.kind(class) {
        NodeKind::ClassDecl(decl) => Some((class, decl.name)),
        _ => None,
    }) else {
        return Err(fatal!(kind: FatalErrorKind::MethodWithoutClass(
            signature.name.value().to_owned()
        )));
    };

    let receiver_type = Type::class(class, class_name).reference();
    let this_param = tree.add(
        NodeKind::Parameter(Parameter {
            name: InternedSymbol::new("this"),
            declared: TypeExpr::Known(receiver_type),
            ty: None,
        }),
        signature.span,
    );

    let method = tree.add(
        NodeKind::ClassMethod(ClassMethod {
            function: Function {
                name: signature.name,
                params: signature.params,
                return_type: signature.return_type,
                body: signature.body,
                ty: None,
            },
            class,
            this_param,
        }),
        signature.span,
    );

    // The receiver goes ahead of the first declared parameter in both views
    let tree_index = match tree.kind(method).parameters().and_then(|params| params.first()) {
        Some(first) => tree
            .children(method)
            .iter()
            .position(|child| child == first)
            .ok_or_else(|| fatal!("parameter {first} is not a child of its method"))?,
        None => 0,
    };

    if let NodeKind::ClassMethod(decl) = tree.kind_mut(method) {
        decl.function.params.insert(0, this_param);
    }
    tree.attach(method, this_param, Some(tree_index))?;

    tree.dependencies_mut().add(method, class);

    debug!(
        method = %signature.name,
        class = %class_name,
        "synthesized receiver parameter"
    );

    Ok(method)
}

/// Zero-based position of a field among all members of its class, methods
/// included. Always computed from the current member list.
pub fn member_offset(tree: &Tree, member: NodeId) -> Result<usize, FatalError> {
    let name = match tree.kind(member) {
        NodeKind::MemberVarDecl(var) => var.name.value(),
        other => return Err(fatal!("offset requested for a {}", other.variant_name())),
    };

    let Some(class) = tree.find_parent(member, |kind| matches!(kind, NodeKind::ClassDecl(_)))
    else {
        return Err(fatal!(kind: FatalErrorKind::NoParentClass(name.to_owned())));
    };

    let NodeKind::ClassDecl(decl) = tree.kind(class) else {
        return Err(fatal!(kind: FatalErrorKind::NoParentClass(name.to_owned())));
    };

    decl.members
        .iter()
        .position(|candidate| *candidate == member)
        .ok_or_else(|| fatal!(kind: FatalErrorKind::MemberNotInParent(name.to_owned())))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::frontend::ast::{Block, ClassDecl, VarDecl};

    fn class(tree: &mut Tree, name: &str) -> NodeId {
        tree.add(
            NodeKind::ClassDecl(ClassDecl {
                name: InternedSymbol::new(name),
                members: Vec::new(),
                ty: None,
            }),
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

    fn parameter(tree: &mut Tree, name: &str) -> NodeId {
        tree.add(
            NodeKind::Parameter(Parameter {
                name: InternedSymbol::new(name),
                declared: TypeExpr::Known(Type::Bool),
                ty: None,
            }),
            Span::default(),
        )
    }

    fn signature(tree: &mut Tree, params: Vec<NodeId>) -> MethodSignature {
        let body = tree.add(
            NodeKind::Block(Block {
                statements: Vec::new(),
                locals: BTreeMap::new(),
            }),
            Span::default(),
        );

        MethodSignature {
            name: InternedSymbol::new("method"),
            params,
            return_type: None,
            body,
            span: Span::default(),
        }
    }

    fn params(tree: &Tree, method: NodeId) -> Vec<NodeId> {
        tree.kind(method)
            .parameters()
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default()
    }

    #[test]
    fn receiver_is_inserted_first() {
        let mut tree = Tree::new();
        let point = class(&mut tree, "Point");
        let a = parameter(&mut tree, "a");
        let b = parameter(&mut tree, "b");
        let signature = signature(&mut tree, vec![a, b]);

        let method = create_class_method(&mut tree, Some(point), signature).unwrap();
        let params = params(&tree, method);

        let NodeKind::ClassMethod(decl) = tree.kind(method) else {
            unreachable!()
        };
        assert_eq!(params, vec![decl.this_param, a, b]);
        assert_eq!(tree.children(method)[0], decl.this_param);
        assert!(tree.dependencies().depends_on(method, point));
        assert!(tree.is_consistent());

        let NodeKind::Parameter(this) = tree.kind(decl.this_param) else {
            unreachable!()
        };
        assert_eq!(this.name.value(), "this");
        assert_eq!(
            this.declared,
            TypeExpr::Known(Type::class(point, InternedSymbol::new("Point")).reference())
        );
    }

    #[test]
    fn receiver_is_first_without_declared_parameters() {
        let mut tree = Tree::new();
        let point = class(&mut tree, "Point");
        let signature = signature(&mut tree, Vec::new());

        let method = create_class_method(&mut tree, Some(point), signature).unwrap();

        assert_eq!(params(&tree, method).len(), 1);
        assert_eq!(tree.children(method).len(), 2);
        assert!(tree.is_consistent());
    }

    #[test]
    fn methods_require_a_class() {
        let mut tree = Tree::new();
        let signature = signature(&mut tree, Vec::new());
        let not_a_class = signature.body;

        let error = create_class_method(&mut tree, None, signature).unwrap_err();
        assert_eq!(
            error.kind,
            FatalErrorKind::MethodWithoutClass("method".to_owned())
        );

        let signature = self::signature(&mut tree, Vec::new());
        assert!(create_class_method(&mut tree, Some(not_a_class), signature).is_err());
    }

    #[test]
    fn cloned_methods_keep_receiver_and_class() {
        let mut tree = Tree::new();
        let point = class(&mut tree, "Point");
        let a = parameter(&mut tree, "a");
        let signature = signature(&mut tree, vec![a]);
        let method = create_class_method(&mut tree, Some(point), signature).unwrap();

        let copy = tree.clone_subtree(method);
        let copied = params(&tree, copy);

        let NodeKind::ClassMethod(decl) = tree.kind(copy) else {
            unreachable!()
        };
        assert_eq!(copied.len(), 2);
        assert_eq!(copied[0], decl.this_param);
        assert_ne!(copied[0], params(&tree, method)[0]);
        assert_eq!(tree.children(copy)[0], decl.this_param);
        assert_eq!(decl.class, point);
        assert!(tree.dependencies().depends_on(copy, point));
        assert!(tree.is_consistent());
    }

    #[test]
    fn offsets_follow_member_changes() {
        let mut tree = Tree::new();
        let point = class(&mut tree, "Point");
        let x = field(&mut tree, "x");
        let y = field(&mut tree, "y");
        let z = field(&mut tree, "z");
        for member in [x, y, z] {
            tree.append_child(point, member).unwrap();
        }

        assert_eq!(member_offset(&tree, x).unwrap(), 0);
        assert_eq!(member_offset(&tree, y).unwrap(), 1);
        assert_eq!(member_offset(&tree, z).unwrap(), 2);

        tree.remove_child(point, x).unwrap();
        assert_eq!(member_offset(&tree, y).unwrap(), 0);
        assert_eq!(member_offset(&tree, z).unwrap(), 1);

        // Reorder by moving y to the end
        tree.remove_child(point, y).unwrap();
        tree.append_child(point, y).unwrap();
        assert_eq!(member_offset(&tree, z).unwrap(), 0);
        assert_eq!(member_offset(&tree, y).unwrap(), 1);
    }

    #[test]
    fn offsets_count_methods() {
        let mut tree = Tree::new();
        let point = class(&mut tree, "Point");
        let signature = signature(&mut tree, Vec::new());
        let method = create_class_method(&mut tree, Some(point), signature).unwrap();
        let x = field(&mut tree, "x");
        tree.append_child(point, method).unwrap();
        tree.append_child(point, x).unwrap();

        assert_eq!(member_offset(&tree, x).unwrap(), 1);

        tree.remove_child(point, method).unwrap();
        assert_eq!(member_offset(&tree, x).unwrap(), 0);
    }

    #[test]
    fn detached_fields_have_no_offset() {
        let mut tree = Tree::new();
        let x = field(&mut tree, "x");

        let error = member_offset(&tree, x).unwrap_err();
        assert_eq!(error.kind, FatalErrorKind::NoParentClass("x".to_owned()));
    }
}
