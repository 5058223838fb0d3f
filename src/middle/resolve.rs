//! Name binding and type inference over the syntax tree.
//!
//! Every node is resolved at most once. Before a node computes its own state
//! the nodes it declared as dependencies are resolved, and a node that is
//! reached again while it is still being resolved (a dependency cycle) is
//! skipped so resolution always terminates. Anything reading the type of such
//! a node sees no type at all rather than a half computed one, and reports
//! that instead.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::{
    diagnostics::{CompileContext, Severity},
    error::FatalError,
    fatal,
    frontend::{
        ast::{
            BinaryOperatorClass, Binding, Call, CallTarget, Function, NodeId, NodeKind, Receiver,
            Tree, TypeExpr, UnaryOperatorKind, VarDecl,
        },
        intern::InternedSymbol,
        lexer::Span,
    },
    middle::{
        primitive::{IntKind, PrimitiveKind},
        ty::Type,
    },
};

macro_rules! report_error {
    ($self:expr, $span:expr, $($message:tt)+) => {{
        #[cfg(feature = "error-backtrace")]
        let origin = Some(format!("{}:{}:{}", file!(), line!(), column!()));
        #[cfg(not(feature = "error-backtrace"))]
        let origin = None;

        $self.report_error($span, format!($($message)+), origin)
    }};
}

pub struct Resolver<'tree, 'ctx, 'source> {
    tree: &'tree mut Tree,
    context: &'ctx mut CompileContext<'source>,
    in_progress: BTreeSet<NodeId>,
}

/// Resolves the whole tree. Semantic errors end up as diagnostics in the
/// context; only broken compiler invariants are returned as errors.
pub fn resolve_tree(tree: &mut Tree, context: &mut CompileContext) -> Result<(), FatalError> {
    let Some(root) = tree.root() else {
        return Err(fatal!("tree has no root to resolve"));
    };

    let order = tree.preorder(root);
    for id in &order {
        tree.find_dependencies(*id);
    }

    let mut resolver = Resolver::new(tree, context);
    for id in order {
        resolver.resolve(id)?;
    }

    Ok(())
}

/// Largest magnitude a literal of `kind` may be written with
fn literal_max(kind: IntKind) -> u64 {
    match (kind.is_signed(), kind.bits()) {
        (false, 64) => u64::MAX,
        (true, bits) => (1u64 << (bits - 1)) - 1,
        (false, bits) => (1u64 << bits) - 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Local,
    Constant,
    Member,
}

impl<'tree, 'ctx, 'source> Resolver<'tree, 'ctx, 'source> {
    pub fn new(tree: &'tree mut Tree, context: &'ctx mut CompileContext<'source>) -> Self {
        Self {
            tree,
            context,
            in_progress: BTreeSet::new(),
        }
    }

    fn report_error(&mut self, span: Span, message: String, origin: Option<String>) {
        self.context.report(Severity::Error, span, message, origin);
    }

    /// Resolves `id`. Does nothing if it is already resolved or currently
    /// being resolved further up the stack.
    pub fn resolve(&mut self, id: NodeId) -> Result<(), FatalError> {
        if self.tree.is_resolved(id) {
            return Ok(());
        }

        if !self.in_progress.insert(id) {
            debug!(
                node = %id,
                kind = self.tree.kind(id).variant_name(),
                "breaking dependency cycle"
            );
            return Ok(());
        }

        self.tree.find_dependencies(id);
        let dependencies: Vec<_> = self.tree.dependencies().of(id).collect();
        for dependency in dependencies {
            self.resolve(dependency)?;
        }

        let result = self.resolve_node(id);
        self.in_progress.remove(&id);
        result?;

        trace!(node = %id, kind = self.tree.kind(id).variant_name(), "resolved");
        self.tree.node_mut(id).resolved = true;

        Ok(())
    }

    fn resolve_node(&mut self, id: NodeId) -> Result<(), FatalError> {
        match self.tree.kind(id).clone() {
            NodeKind::Module(module) => {
                self.check_duplicates(&module.items, |name| {
                    format!("duplicate definition of `{name}`")
                });

                for item in module.items {
                    self.resolve(item)?;
                }
            }
            NodeKind::ClassDecl(class) => {
                self.set_type(id, Type::class(id, class.name));

                self.check_duplicates(&class.members, |name| {
                    format!("duplicate member `{name}` in class `{}`", class.name)
                });

                for member in class.members {
                    self.resolve(member)?;
                }

                if self.contains_by_value(id, id, &mut BTreeSet::new()) {
                    report_error!(
                        self,
                        self.tree.span(id),
                        "class `{}` contains itself by value",
                        class.name
                    );
                }
            }
            NodeKind::MemberVarDecl(var) => self.resolve_var(id, var, VarKind::Member)?,
            NodeKind::VarDecl(var) => self.resolve_var(id, var, VarKind::Local)?,
            NodeKind::ConstVarExpr(var) => self.resolve_var(id, var, VarKind::Constant)?,
            NodeKind::Function(function) => self.resolve_function(id, function)?,
            NodeKind::ClassMethod(method) => self.resolve_function(id, method.function)?,
            NodeKind::ExternFunction(function) => {
                let parameters = self.resolve_parameters(&function.params)?;
                let return_type = self.resolve_return_type(id, function.return_type.as_ref());

                self.set_type(
                    id,
                    Type::Function {
                        parameters: parameters.into(),
                        return_type: Box::new(return_type),
                        is_variadic: function.variadic,
                    },
                );
            }
            NodeKind::Parameter(param) => {
                let mut ty = self.resolve_type_expr(id, &param.declared);
                if ty.is_void() {
                    report_error!(self, self.tree.span(id), "parameter `{}` cannot have type `void`", param.name);
                    ty = Type::Error;
                }

                self.set_type(id, ty);
            }
            NodeKind::Block(block) => {
                for statement in block.statements {
                    self.resolve(statement)?;
                }
            }
            NodeKind::ReturnExpr(ret) => self.resolve_return(id, ret.value)?,
            NodeKind::IfStmt(stmt) => {
                self.resolve(stmt.condition)?;

                let condition = self.expression_type(stmt.condition);
                if !condition.is_bool() && !condition.is_error() {
                    report_error!(
                        self,
                        self.tree.span(stmt.condition),
                        "if condition must be `bool`, found `{condition}`"
                    );
                }

                self.resolve(stmt.then_block)?;
                if let Some(else_branch) = stmt.else_branch {
                    self.resolve(else_branch)?;
                }
            }
            NodeKind::ExprStmt(stmt) => self.resolve(stmt.expression)?,
            NodeKind::IntLiteral(literal) => {
                // A negated literal is range checked by its negation
                if !self.is_negated(id) {
                    let kind = literal.kind.unwrap_or(IntKind::I64);

                    if literal.value > literal_max(kind) {
                        report_error!(
                            self,
                            self.tree.span(id),
                            "literal `{}` does not fit in `{kind}`",
                            literal.value
                        );
                    }
                }
            }
            NodeKind::BoolLiteral(_) => {}
            NodeKind::Identifier(identifier) => self.resolve_identifier(id, identifier.name)?,
            NodeKind::This(_) => {
                let receiver = self.tree.enclosing_method(id).and_then(|method| {
                    match self.tree.kind(method) {
                        NodeKind::ClassMethod(method) => Some(method.this_param),
                        _ => None,
                    }
                });

                let ty = match receiver {
                    Some(receiver) => {
                        if let NodeKind::This(this) = self.tree.kind_mut(id) {
                            this.receiver = Some(receiver);
                        }

                        self.declaration_type(id, receiver)?
                    }
                    None => {
                        report_error!(self, self.tree.span(id), "`this` used outside of a method");
                        Type::Error
                    }
                };

                self.set_type(id, ty);
            }
            NodeKind::MemberAccess(access) => {
                self.resolve(access.target)?;

                let target = self.expression_type(access.target);
                let ty = if target.is_error() {
                    Type::Error
                } else if let Some(class) = target.class_id() {
                    match self.tree.class_member(class, access.member) {
                        Some(member) => {
                            if let NodeKind::MemberAccess(access) = self.tree.kind_mut(id) {
                                access.resolved_member = Some(member);
                            }

                            self.member_type(id, member, access.member_span)?
                        }
                        None => {
                            report_error!(
                                self,
                                access.member_span,
                                "class `{}` has no member `{}`",
                                self.name_of(class),
                                access.member
                            );
                            Type::Error
                        }
                    }
                } else {
                    report_error!(
                        self,
                        self.tree.span(access.target),
                        "type `{target}` has no members"
                    );
                    Type::Error
                };

                self.set_type(id, ty);
            }
            NodeKind::Call(call) => self.resolve_call(id, call)?,
            NodeKind::Binary(binary) => {
                self.resolve(binary.lhs)?;
                self.resolve(binary.rhs)?;

                let lhs = self.expression_type(binary.lhs);
                let rhs = self.expression_type(binary.rhs);
                let operator = binary.operator;

                let ty = match operator.class() {
                    _ if lhs.is_error() || rhs.is_error() => match operator.class() {
                        BinaryOperatorClass::Arithmetic => Type::Error,
                        _ => Type::Bool,
                    },
                    BinaryOperatorClass::Arithmetic if lhs.is_integer() && rhs.is_integer() => lhs,
                    BinaryOperatorClass::Ordering if lhs.is_integer() && rhs.is_integer() => {
                        Type::Bool
                    }
                    BinaryOperatorClass::Equality
                        if (lhs.is_integer() && rhs.is_integer())
                            || (lhs.is_bool() && rhs.is_bool()) =>
                    {
                        Type::Bool
                    }
                    BinaryOperatorClass::Logical if lhs.is_bool() && rhs.is_bool() => Type::Bool,
                    class => {
                        let expected = match class {
                            BinaryOperatorClass::Logical => "`bool`",
                            BinaryOperatorClass::Equality => "matching integer or `bool`",
                            _ => "integer",
                        };

                        report_error!(
                            self,
                            self.tree.span(id),
                            "operator `{operator}` requires {expected} operands, found `{lhs}` and `{rhs}`"
                        );

                        match class {
                            BinaryOperatorClass::Arithmetic => Type::Error,
                            _ => Type::Bool,
                        }
                    }
                };

                self.set_type(id, ty);
            }
            NodeKind::Unary(unary) => {
                self.resolve(unary.operand)?;

                let negated_literal = match (unary.operator, self.tree.kind(unary.operand)) {
                    (UnaryOperatorKind::Negate, NodeKind::IntLiteral(literal)) => {
                        Some((literal.value, literal.kind.unwrap_or(IntKind::I64)))
                    }
                    _ => None,
                };

                if let Some((value, kind)) = negated_literal {
                    let max = match kind.is_signed() {
                        true => literal_max(kind) + 1,
                        false => literal_max(kind),
                    };

                    if value > max {
                        report_error!(self, self.tree.span(id), "literal `-{value}` does not fit in `{kind}`");
                    }
                }

                let operand = self.expression_type(unary.operand);
                let ty = match unary.operator {
                    _ if operand.is_error() => Type::Error,
                    UnaryOperatorKind::Negate if operand.is_integer() => operand,
                    UnaryOperatorKind::LogicalNot if operand.is_bool() => Type::Bool,
                    operator => {
                        report_error!(
                            self,
                            self.tree.span(id),
                            "operator `{operator}` cannot be applied to `{operand}`"
                        );
                        Type::Error
                    }
                };

                self.set_type(id, ty);
            }
            NodeKind::Assign(assign) => {
                self.resolve(assign.target)?;
                self.resolve(assign.value)?;

                self.check_assignment_target(assign.target);

                let target = self.expression_type(assign.target);
                let value = self.expression_type(assign.value);
                if !target.is_assignable_from(&value) {
                    report_error!(
                        self,
                        self.tree.span(assign.value),
                        "cannot assign a value of type `{value}` to a target of type `{target}`"
                    );
                }

                self.set_type(id, target);
            }
        }

        Ok(())
    }

    fn set_type(&mut self, id: NodeId, ty: Type) {
        if let Some(slot) = self.tree.kind_mut(id).ty_mut() {
            *slot = Some(ty);
        }
    }

    fn name_of(&self, id: NodeId) -> InternedSymbol {
        self.tree
            .kind(id)
            .as_named()
            .map(|named| named.name())
            .unwrap_or_else(|| InternedSymbol::new("<anonymous>"))
    }

    /// Type of an already resolved expression. An expression left without a
    /// type has already been reported on.
    fn expression_type(&self, id: NodeId) -> Type {
        self.tree.kind(id).ty().unwrap_or(Type::Error)
    }

    /// Resolves `declaration` on behalf of `user` and returns its type. A
    /// declaration caught in a cycle has no type yet, which is reported at
    /// the use site.
    fn declaration_type(&mut self, user: NodeId, declaration: NodeId) -> Result<Type, FatalError> {
        self.resolve(declaration)?;

        match self.tree.kind(declaration).ty() {
            Some(ty) => Ok(ty),
            None => {
                report_error!(
                    self,
                    self.tree.span(user),
                    "`{}` is used before its type is known",
                    self.name_of(declaration)
                );
                Ok(Type::Error)
            }
        }
    }

    /// Type of a class member named at `user`. Methods may only be named as
    /// the callee of a call.
    fn member_type(&mut self, user: NodeId, member: NodeId, span: Span) -> Result<Type, FatalError> {
        let is_method = matches!(self.tree.kind(member), NodeKind::ClassMethod(_));

        if is_method && !self.is_callee(user) {
            report_error!(self, span, "method `{}` must be called", self.name_of(member));
        }

        self.declaration_type(user, member)
    }

    fn is_callee(&self, id: NodeId) -> bool {
        self.tree
            .parent(id)
            .is_some_and(|parent| matches!(self.tree.kind(parent), NodeKind::Call(call) if call.callee == id))
    }

    fn check_duplicates(&mut self, nodes: &[NodeId], message: impl Fn(InternedSymbol) -> String) {
        let mut seen = BTreeMap::new();

        for node in nodes {
            let Some(name) = self.tree.kind(*node).as_named().map(|named| named.name()) else {
                continue;
            };

            if seen.insert(name, *node).is_some() {
                report_error!(self, self.tree.span(*node), "{}", message(name));
            }
        }
    }

    /// Module level scope, used for class names and functions
    fn module_of(&self, id: NodeId) -> Option<NodeId> {
        self.tree
            .find_parent(id, |kind| matches!(kind, NodeKind::Module(_)))
            .or(self.tree.root())
    }

    fn resolve_type_expr(&mut self, from: NodeId, expr: &TypeExpr) -> Type {
        let (name, span) = match expr {
            TypeExpr::Known(ty) => return ty.clone(),
            TypeExpr::Named { name, span } => (*name, *span),
        };

        if let Ok(primitive) = name.value().parse::<PrimitiveKind>() {
            return primitive.ty();
        }

        match self.class_named(from, name) {
            Some(class) => Type::class(class, name),
            None => {
                report_error!(self, span, "unknown type `{name}`");
                Type::Error
            }
        }
    }

    fn class_named(&self, from: NodeId, name: InternedSymbol) -> Option<NodeId> {
        self.module_of(from).and_then(|module| match self.tree.kind(module) {
            NodeKind::Module(module) => module
                .items
                .iter()
                .copied()
                .find(|item| matches!(self.tree.kind(*item), NodeKind::ClassDecl(class) if class.name == name)),
            _ => None,
        })
    }

    /// Class stored by value in `field`, read from its type or, before the
    /// field is resolved, from its declared type
    fn field_class(&self, field: NodeId) -> Option<NodeId> {
        if let Some(Type::Class { id, .. }) = self.tree.kind(field).ty() {
            return Some(id);
        }

        match self.tree.kind(field) {
            NodeKind::MemberVarDecl(VarDecl {
                declared: Some(TypeExpr::Named { name, .. }),
                ..
            }) => self.class_named(field, *name),
            _ => None,
        }
    }

    /// Whether an instance of `class` holds an instance of `target` at any
    /// depth of by-value fields
    fn contains_by_value(&self, class: NodeId, target: NodeId, visited: &mut BTreeSet<NodeId>) -> bool {
        self.tree.class_fields(class).into_iter().any(|field| {
            let Some(nested) = self.field_class(field) else {
                return false;
            };

            nested == target
                || (visited.insert(nested) && self.contains_by_value(nested, target, visited))
        })
    }

    fn is_negated(&self, literal: NodeId) -> bool {
        self.tree.parent(literal).is_some_and(|parent| {
            matches!(
                self.tree.kind(parent),
                NodeKind::Unary(unary)
                    if unary.operator == UnaryOperatorKind::Negate && unary.operand == literal
            )
        })
    }

    fn resolve_return_type(&mut self, id: NodeId, return_type: Option<&TypeExpr>) -> Type {
        return_type
            .map(|return_type| self.resolve_type_expr(id, return_type))
            .unwrap_or(Type::Void)
    }

    fn resolve_parameters(&mut self, params: &[NodeId]) -> Result<Vec<Type>, FatalError> {
        self.check_duplicates(params, |name| format!("duplicate parameter `{name}`"));

        let mut types = Vec::with_capacity(params.len());
        for param in params {
            self.resolve(*param)?;
            types.push(self.expression_type(*param));
        }

        Ok(types)
    }

    /// The signature is set before the body is resolved so that recursive
    /// calls see it.
    fn resolve_function(&mut self, id: NodeId, function: Function) -> Result<(), FatalError> {
        let parameters = self.resolve_parameters(&function.params)?;
        let return_type = self.resolve_return_type(id, function.return_type.as_ref());

        self.set_type(
            id,
            Type::Function {
                parameters: parameters.into(),
                return_type: Box::new(return_type),
                is_variadic: false,
            },
        );

        self.resolve(function.body)
    }

    fn resolve_var(&mut self, id: NodeId, var: VarDecl, kind: VarKind) -> Result<(), FatalError> {
        if let Some(initializer) = var.initializer {
            self.resolve(initializer)?;
        }

        let declared = var
            .declared
            .as_ref()
            .map(|declared| self.resolve_type_expr(id, declared));
        let initialized = var
            .initializer
            .map(|initializer| (initializer, self.expression_type(initializer)));

        let mut ty = match (declared, initialized) {
            (Some(declared), Some((initializer, found))) => {
                if !declared.is_assignable_from(&found) {
                    report_error!(
                        self,
                        self.tree.span(initializer),
                        "cannot initialize `{}` of type `{declared}` with a value of type `{found}`",
                        var.name
                    );
                }
                declared
            }
            (Some(declared), None) => declared,
            (None, Some((_, found))) => found,
            (None, None) => {
                report_error!(
                    self,
                    self.tree.span(id),
                    "cannot infer the type of `{}` without an initializer",
                    var.name
                );
                Type::Error
            }
        };

        if kind == VarKind::Constant && var.initializer.is_none() {
            report_error!(self, self.tree.span(id), "constant `{}` requires an initializer", var.name);
        }

        if ty.is_void() {
            report_error!(self, self.tree.span(id), "`{}` cannot have type `void`", var.name);
            ty = Type::Error;
        }

        self.set_type(id, ty);

        if kind != VarKind::Member {
            self.declare_local(id, var.name);
        }

        Ok(())
    }

    fn declare_local(&mut self, id: NodeId, name: InternedSymbol) {
        let Some(block) = self
            .tree
            .find_parent(id, |kind| matches!(kind, NodeKind::Block(_)))
        else {
            return;
        };

        let previous = match self.tree.kind_mut(block) {
            NodeKind::Block(block) => *block.locals.entry(name).or_insert(id),
            _ => id,
        };

        if previous != id {
            report_error!(self, self.tree.span(id), "duplicate local `{name}`");
        }
    }

    fn resolve_return(&mut self, id: NodeId, value: Option<NodeId>) -> Result<(), FatalError> {
        if let Some(value) = value {
            self.resolve(value)?;
        }

        let Some(function) = self.tree.enclosing_function(id) else {
            report_error!(self, self.tree.span(id), "return outside of a function");
            return Ok(());
        };

        let expected = match self.tree.kind(function).ty() {
            Some(Type::Function { return_type, .. }) => *return_type,
            _ => Type::Error,
        };

        match value {
            None if !expected.is_void() && !expected.is_error() => {
                report_error!(
                    self,
                    self.tree.span(id),
                    "missing return value in function returning `{expected}`"
                );
            }
            Some(value) if expected.is_void() => {
                report_error!(
                    self,
                    self.tree.span(value),
                    "cannot return a value from a function returning `void`"
                );
            }
            Some(value) => {
                let found = self.expression_type(value);
                if !expected.is_assignable_from(&found) {
                    report_error!(
                        self,
                        self.tree.span(value),
                        "mismatched return type: expected `{expected}`, found `{found}`"
                    );
                }
            }
            None => {}
        }

        Ok(())
    }

    /// Walks outwards from `from` looking for `name`: block locals declared so
    /// far, parameters, members reachable through the receiver, then module
    /// items.
    fn lookup_value(&self, from: NodeId, name: InternedSymbol) -> Option<Binding> {
        for ancestor in self.tree.ancestors(from) {
            let kind = self.tree.kind(ancestor);

            let found = kind.as_scope().and_then(|scope| scope.lookup(self.tree, name));

            if let (NodeKind::Block(_), Some(local)) = (kind, found) {
                return Some(Binding::Local(local));
            }

            if let Some(params) = kind.parameters() {
                let param = params.iter().copied().find(|param| {
                    self.tree
                        .kind(*param)
                        .as_named()
                        .is_some_and(|named| named.name() == name)
                });

                if let Some(param) = param {
                    return Some(Binding::Parameter(param));
                }
            }

            if let NodeKind::ClassMethod(method) = kind {
                let access = self
                    .tree
                    .kind(method.this_param)
                    .as_accessible()
                    .and_then(|receiver| receiver.access(self.tree, method.this_param, name));

                if access.is_some() {
                    return access;
                }
            }

            if let NodeKind::Module(_) = kind {
                let item = found?;

                return match self.tree.kind(item) {
                    NodeKind::ClassDecl(_) => Some(Binding::Class(item)),
                    NodeKind::Function(_) | NodeKind::ExternFunction(_) => Some(Binding::Function(item)),
                    _ => None,
                };
            }
        }

        None
    }

    fn resolve_identifier(&mut self, id: NodeId, name: InternedSymbol) -> Result<(), FatalError> {
        let span = self.tree.span(id);
        let binding = self.lookup_value(id, name);

        if let NodeKind::Identifier(identifier) = self.tree.kind_mut(id) {
            identifier.binding = binding;
        }

        let ty = match binding {
            None => {
                report_error!(self, span, "unknown name `{name}`");
                Type::Error
            }
            Some(Binding::Local(declaration) | Binding::Parameter(declaration)) => {
                self.declaration_type(id, declaration)?
            }
            Some(Binding::Member { member, .. }) => self.member_type(id, member, span)?,
            Some(Binding::Function(function)) => {
                if !self.is_callee(id) {
                    report_error!(self, span, "function `{name}` cannot be used as a value");
                }

                self.declaration_type(id, function)?
            }
            Some(Binding::Class(_)) => {
                report_error!(self, span, "class `{name}` cannot be used as a value");
                Type::Error
            }
        };

        self.set_type(id, ty);
        Ok(())
    }

    fn resolve_call(&mut self, id: NodeId, call: Call) -> Result<(), FatalError> {
        self.resolve(call.callee)?;
        for argument in &call.arguments {
            self.resolve(*argument)?;
        }

        let target = match self.tree.kind(call.callee) {
            NodeKind::Identifier(identifier) => match identifier.binding {
                Some(Binding::Function(function)) => Some(CallTarget {
                    function,
                    receiver: None,
                }),
                Some(Binding::Member { receiver, member })
                    if matches!(self.tree.kind(member), NodeKind::ClassMethod(_)) =>
                {
                    Some(CallTarget {
                        function: member,
                        receiver: Some(Receiver::Parameter(receiver)),
                    })
                }
                _ => None,
            },
            NodeKind::MemberAccess(access) => match access.resolved_member {
                Some(member) if matches!(self.tree.kind(member), NodeKind::ClassMethod(_)) => {
                    Some(CallTarget {
                        function: member,
                        receiver: Some(Receiver::Expression(access.target)),
                    })
                }
                _ => None,
            },
            _ => None,
        };

        let Some(target) = target else {
            if !self.expression_type(call.callee).is_error() {
                report_error!(self, self.tree.span(call.callee), "expression is not callable");
            }

            self.set_type(id, Type::Error);
            return Ok(());
        };

        if let NodeKind::Call(call) = self.tree.kind_mut(id) {
            call.target = Some(target);
        }

        let (parameters, return_type, is_variadic) = match self.expression_type(call.callee) {
            Type::Function {
                parameters,
                return_type,
                is_variadic,
            } => (parameters, *return_type, is_variadic),
            _ => {
                self.set_type(id, Type::Error);
                return Ok(());
            }
        };

        // The receiver is passed implicitly
        let skip = usize::from(target.receiver.is_some());
        let expected = parameters.get(skip..).unwrap_or_default();
        let name = self.name_of(target.function);

        let arity_ok = if is_variadic {
            call.arguments.len() >= expected.len()
        } else {
            call.arguments.len() == expected.len()
        };

        if !arity_ok {
            report_error!(
                self,
                self.tree.span(id),
                "`{name}` expects {}{} argument(s), found {}",
                if is_variadic { "at least " } else { "" },
                expected.len(),
                call.arguments.len()
            );
        } else {
            for (index, (argument, parameter)) in call.arguments.iter().zip(expected).enumerate() {
                let found = self.expression_type(*argument);

                if !parameter.is_assignable_from(&found) {
                    report_error!(
                        self,
                        self.tree.span(*argument),
                        "argument {} of `{name}` has type `{found}`, expected `{parameter}`",
                        index + 1
                    );
                }
            }
        }

        self.set_type(id, return_type);
        Ok(())
    }

    fn check_assignment_target(&mut self, target: NodeId) {
        let span = self.tree.span(target);

        let problem = match self.tree.kind(target) {
            NodeKind::Identifier(identifier) => match identifier.binding {
                Some(Binding::Local(local)) => match self.tree.kind(local) {
                    NodeKind::ConstVarExpr(_) => {
                        Some(format!("cannot assign to constant `{}`", identifier.name))
                    }
                    _ => None,
                },
                Some(Binding::Member { member, .. }) => match self.tree.kind(member) {
                    NodeKind::MemberVarDecl(_) => None,
                    _ => Some(format!("cannot assign to method `{}`", identifier.name)),
                },
                Some(Binding::Parameter(_)) => {
                    Some(format!("cannot assign to parameter `{}`", identifier.name))
                }
                None => None,
                Some(Binding::Function(_) | Binding::Class(_)) => {
                    Some("invalid assignment target".to_owned())
                }
            },
            NodeKind::MemberAccess(access) => match access.resolved_member {
                Some(member) if matches!(self.tree.kind(member), NodeKind::ClassMethod(_)) => {
                    Some(format!("cannot assign to method `{}`", access.member))
                }
                _ => None,
            },
            _ => Some("invalid assignment target".to_owned()),
        };

        if let Some(problem) = problem {
            report_error!(self, span, "{problem}");
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        diagnostics::MessageLog,
        frontend::{SourceFile, parser::Parser},
        middle::desugar::member_offset,
    };

    fn resolve(source: &str) -> (Tree, Vec<String>) {
        let source = SourceFile::memory(source);
        let mut tree = Parser::parse_module(&source).unwrap();
        let mut log = MessageLog::new();
        log.set_running(true);

        let mut context = CompileContext::new(&source, &mut log);
        resolve_tree(&mut tree, &mut context).unwrap();

        let messages = log.messages().iter().map(|d| d.message.clone()).collect();
        (tree, messages)
    }

    fn find(tree: &Tree, predicate: impl Fn(&NodeKind) -> bool) -> Vec<NodeId> {
        tree.preorder(tree.root().unwrap())
            .into_iter()
            .filter(|id| predicate(tree.kind(*id)))
            .collect()
    }

    fn named(tree: &Tree, name: &str) -> NodeId {
        find(tree, |kind| {
            kind.as_named()
                .is_some_and(|named| named.name().value() == name)
        })[0]
    }

    const POINT: &str = indoc! {"
        class Point {
            x: int;
            y: int;

            def getX() -> int {
                return x;
            }
        }
    "};

    #[test]
    fn point_resolves_cleanly() {
        let (tree, messages) = resolve(POINT);
        assert_eq!(messages, Vec::<String>::new());

        let method = named(&tree, "getX");
        let NodeKind::ClassMethod(decl) = tree.kind(method) else {
            panic!("expected a method");
        };

        let params: Vec<_> = decl
            .function
            .params
            .iter()
            .map(|param| {
                let NodeKind::Parameter(param) = tree.kind(*param) else {
                    unreachable!()
                };
                format!("{}: {}", param.name, param.ty.as_ref().unwrap())
            })
            .collect();
        assert_eq!(params, vec!["this: Point&"]);

        assert_eq!(member_offset(&tree, named(&tree, "x")).unwrap(), 0);
        assert_eq!(member_offset(&tree, named(&tree, "y")).unwrap(), 1);

        let identifier = find(&tree, |kind| matches!(kind, NodeKind::Identifier(_)))[0];
        let NodeKind::Identifier(identifier) = tree.kind(identifier) else {
            unreachable!()
        };
        assert_eq!(
            identifier.binding,
            Some(Binding::Member {
                receiver: decl.this_param,
                member: named(&tree, "x"),
            })
        );
        assert_eq!(identifier.ty, Some(Type::Int(IntKind::I64)));
    }

    #[test]
    fn resolving_twice_changes_nothing() {
        let source = SourceFile::memory(POINT);
        let mut tree = Parser::parse_module(&source).unwrap();
        let mut log = MessageLog::new();
        log.set_running(true);

        let mut context = CompileContext::new(&source, &mut log);
        resolve_tree(&mut tree, &mut context).unwrap();
        let first = format!("{tree:?}");

        let root = tree.root().unwrap();
        let mut resolver = Resolver::new(&mut tree, &mut context);
        resolver.resolve(root).unwrap();
        resolve_tree(&mut tree, &mut context).unwrap();

        assert_eq!(format!("{tree:?}"), first);
        assert!(log.messages().is_empty());
    }

    #[test]
    fn diagnostics_do_not_stop_resolution() {
        let (_, messages) = resolve(indoc! {"
            def f(a: int) -> int {
                var b: bool = a;
                return c;
            }

            def g() {
                return 1;
            }
        "});

        assert_eq!(
            messages,
            vec![
                "cannot initialize `b` of type `bool` with a value of type `int`",
                "unknown name `c`",
                "cannot return a value from a function returning `void`",
            ]
        );
    }

    #[test]
    fn duplicates_are_reported() {
        let (_, messages) = resolve(indoc! {"
            class A {
                x: int;
                x: bool;
            }

            def f(a: int, a: int) {
                var b = 1;
                var b = 2;
            }

            def f() {}
        "});

        assert_eq!(
            messages,
            vec![
                "duplicate definition of `f`",
                "duplicate member `x` in class `A`",
                "duplicate parameter `a`",
                "duplicate local `b`",
            ]
        );
    }

    #[test]
    fn calls_check_arity_and_types() {
        let (tree, messages) = resolve(indoc! {"
            extern def printf(format: int, ...) -> int;

            class Counter {
                count: int;

                def add(amount: int) -> int {
                    count = count + amount;
                    return count;
                }

                def twice() -> int {
                    add(1);
                    return add(true);
                }
            }

            def main() -> int {
                var c: Counter;
                printf(1, 2, 3);
                printf();
                return c.add(2, 3);
            }
        "});

        assert_eq!(
            messages,
            vec![
                "argument 1 of `add` has type `bool`, expected `int`",
                "`printf` expects at least 1 argument(s), found 0",
                "`add` expects 1 argument(s), found 2",
            ]
        );

        let calls = find(&tree, |kind| matches!(kind, NodeKind::Call(_)));
        let NodeKind::Call(first) = tree.kind(calls[0]) else {
            unreachable!()
        };
        assert!(matches!(
            first.target,
            Some(CallTarget {
                receiver: Some(Receiver::Parameter(_)),
                ..
            })
        ));

        let NodeKind::Call(last) = tree.kind(*calls.last().unwrap()) else {
            unreachable!()
        };
        assert!(matches!(
            last.target,
            Some(CallTarget {
                receiver: Some(Receiver::Expression(_)),
                ..
            })
        ));
    }

    #[test]
    fn assignment_targets_are_checked() {
        let (_, messages) = resolve(indoc! {"
            def f(p: int) {
                const a = 1;
                var b = 2;
                a = 3;
                p = 4;
                b = true;
                1 = b;
            }
        "});

        assert_eq!(
            messages,
            vec![
                "cannot assign to constant `a`",
                "cannot assign to parameter `p`",
                "cannot assign a value of type `bool` to a target of type `int`",
                "invalid assignment target",
            ]
        );
    }

    #[test]
    fn operators_and_conditions_are_typed() {
        let (_, messages) = resolve(indoc! {"
            def f(a: int, b: bool) -> bool {
                if (a) {}
                elif (a < 3 && b) {}
                var c = a + b;
                return !a;
            }
        "});

        assert_eq!(
            messages,
            vec![
                "if condition must be `bool`, found `int`",
                "operator `+` requires integer operands, found `int` and `bool`",
                "operator `!` cannot be applied to `int`",
            ]
        );
    }

    #[test]
    fn members_and_this() {
        let (tree, messages) = resolve(indoc! {"
            class Point {
                x: int;

                def get() -> int {
                    return this.x;
                }
            }

            def f(p: Point) -> int {
                var q = this;
                p.get;
                return p.z;
            }
        "});

        assert_eq!(
            messages,
            vec![
                "`this` used outside of a method",
                "method `get` must be called",
                "class `Point` has no member `z`",
            ]
        );

        let this = find(&tree, |kind| matches!(kind, NodeKind::This(_)))[0];
        let NodeKind::This(this) = tree.kind(this) else {
            unreachable!()
        };
        assert_eq!(this.ty.as_ref().unwrap().to_string(), "Point&");
    }

    #[test]
    fn unknown_types_and_oversized_literals() {
        let (_, messages) = resolve(indoc! {"
            def f(a: Missing) -> int {
                var b = 300u8;
                return 1;
            }
        "});

        assert_eq!(
            messages,
            vec![
                "unknown type `Missing`",
                "literal `300` does not fit in `uint8`",
            ]
        );
    }

    #[test]
    fn cycle_broken_dependents_see_no_type() {
        let (_, messages) = resolve(indoc! {"
            class A {
                x: int = f();
            }

            def f() -> int {
                var a: A;
                return a.x;
            }
        "});

        assert_eq!(messages, vec!["`x` is used before its type is known"]);
    }

    #[test]
    fn recursion_sees_the_signature() {
        let (_, messages) = resolve(indoc! {"
            def even(n: int) -> bool {
                if (n == 0) { return true; }
                return odd(n - 1);
            }

            def odd(n: int) -> bool {
                if (n == 0) { return false; }
                return even(n - 1);
            }
        "});

        assert!(messages.is_empty(), "{messages:?}");
    }

    #[test]
    fn classes_cannot_contain_themselves() {
        let (_, messages) = resolve(indoc! {"
            class A {
                next: A;
            }

            class B {
                c: C;
            }

            class C {
                b: B;
            }

            class D {
                b: B;
                n: int;
            }
        "});

        assert_eq!(
            messages,
            vec![
                "class `A` contains itself by value",
                "class `B` contains itself by value",
                "class `C` contains itself by value",
            ]
        );
    }

    #[test]
    fn negated_literals_use_the_negative_range() {
        let (_, messages) = resolve(indoc! {"
            def f() -> int {
                var a = -9223372036854775808;
                var b = -9223372036854775809;
                var c = 9223372036854775808;
                var d = -128i8;
                var e = -129i8;
                return a;
            }
        "});

        assert_eq!(
            messages,
            vec![
                "literal `-9223372036854775809` does not fit in `int64`",
                "literal `9223372036854775808` does not fit in `int64`",
                "literal `-129` does not fit in `int8`",
            ]
        );
    }
}
