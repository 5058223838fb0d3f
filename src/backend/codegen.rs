//! Lowers a fully resolved tree through a [`Builder`]. Classes become
//! structs, methods become functions taking the receiver's address first and
//! every function body is emitted as an entry block, the statements, and a
//! shared exit block that returns the value left in the return slot.

use std::{collections::BTreeMap, rc::Rc};

use tracing::{debug, trace};

use super::{
    Builder, FunctionSignature, ValueType,
    symtab::{FunctionFrame, SymbolTable},
};
use crate::{
    error::{FatalError, FatalErrorKind},
    fatal,
    frontend::ast::{Binding, Call, IfStmt, NodeId, NodeKind, Receiver, Tree, VarDecl},
    middle::{desugar::member_offset, primitive::IntKind, ty::Type},
};

/// Lowers every item of the tree's root module
pub fn generate<B: Builder>(tree: &Tree, builder: &mut B) -> Result<(), FatalError> {
    let Some(root) = tree.root() else {
        return Err(fatal!("tree has no root to lower"));
    };

    let NodeKind::Module(module) = tree.kind(root) else {
        return Err(fatal!(
            "expected a module at the root, found a {}",
            tree.kind(root).variant_name()
        ));
    };

    let mut codegen = Codegen::new(tree, builder);
    codegen.declare_items(&module.items)?;

    for item in &module.items {
        codegen.lower_item(*item)?;
    }

    Ok(())
}

pub struct Codegen<'a, B: Builder> {
    tree: &'a Tree,
    builder: &'a mut B,
    symbols: SymbolTable<B>,
    structs: BTreeMap<NodeId, B::Struct>,
    functions: BTreeMap<NodeId, B::Function>,
}

struct Signature {
    parameters: Rc<[Type]>,
    return_type: Type,
    is_variadic: bool,
}

impl<'a, B: Builder> Codegen<'a, B> {
    pub fn new(tree: &'a Tree, builder: &'a mut B) -> Self {
        Self {
            tree,
            builder,
            symbols: SymbolTable::new(),
            structs: BTreeMap::new(),
            functions: BTreeMap::new(),
        }
    }

    /// Lowering an unresolved node is a compiler bug
    fn ensure_resolved(&self, id: NodeId) -> Result<(), FatalError> {
        if self.tree.is_resolved(id) {
            Ok(())
        } else {
            Err(fatal!(kind: FatalErrorKind::Unresolved(
                id,
                self.tree.kind(id).variant_name()
            )))
        }
    }

    fn type_of(&self, id: NodeId) -> Result<Type, FatalError> {
        match self.tree.kind(id).ty() {
            Some(Type::Error) => Err(fatal!(
                "node {id} ({}) has an error type",
                self.tree.kind(id).variant_name()
            )),
            Some(ty) => Ok(ty),
            None => Err(fatal!(kind: FatalErrorKind::Unresolved(
                id,
                self.tree.kind(id).variant_name()
            ))),
        }
    }

    fn lower_type(&self, ty: &Type) -> Result<ValueType<B::Struct>, FatalError> {
        Ok(match ty {
            Type::Void => ValueType::Void,
            Type::Bool => ValueType::Bool,
            Type::Int(kind) => ValueType::Int(*kind),
            Type::Class { id, name } => match self.structs.get(id) {
                Some(handle) => ValueType::Struct(*handle),
                None => return Err(fatal!("class `{name}` has no struct")),
            },
            Type::Reference(_) => ValueType::Pointer,
            Type::Function { .. } | Type::Error => {
                return Err(fatal!("type `{ty}` has no value representation"));
            }
        })
    }

    fn signature(&self, id: NodeId) -> Result<Signature, FatalError> {
        match self.type_of(id)? {
            Type::Function {
                parameters,
                return_type,
                is_variadic,
            } => Ok(Signature {
                parameters,
                return_type: *return_type,
                is_variadic,
            }),
            other => Err(fatal!("node {id} has non-function type `{other}`")),
        }
    }

    fn struct_of(&self, class: NodeId) -> Result<B::Struct, FatalError> {
        self.structs
            .get(&class)
            .copied()
            .ok_or_else(|| fatal!("class node {class} has no struct"))
    }

    /// Declares structs and functions up front so bodies may refer to any of
    /// them regardless of order
    fn declare_items(&mut self, items: &[NodeId]) -> Result<(), FatalError> {
        let tree = self.tree;
        let classes: Vec<_> = items
            .iter()
            .copied()
            .filter_map(|item| match tree.kind(item) {
                NodeKind::ClassDecl(class) => Some((item, class)),
                _ => None,
            })
            .collect();

        for (id, class) in &classes {
            let handle = self.builder.declare_struct(class.name.value());
            self.structs.insert(*id, handle);
        }

        for (id, class) in &classes {
            self.ensure_resolved(*id)?;

            let fields = tree
                .class_fields(*id)
                .into_iter()
                .map(|field| self.type_of(field).and_then(|ty| self.lower_type(&ty)))
                .collect::<Result<Vec<_>, _>>()?;

            self.builder.define_struct(self.structs[id], fields)?;

            for member in &class.members {
                if let NodeKind::ClassMethod(method) = tree.kind(*member) {
                    let name = format!("{}.{}", class.name, method.function.name);
                    self.declare_function(*member, name, false)?;
                }
            }
        }

        for item in items {
            match tree.kind(*item) {
                NodeKind::Function(function) => {
                    self.declare_function(*item, function.name.value().to_owned(), false)?
                }
                NodeKind::ExternFunction(function) => {
                    self.declare_function(*item, function.name.value().to_owned(), true)?
                }
                _ => {}
            }
        }

        Ok(())
    }

    fn declare_function(
        &mut self,
        id: NodeId,
        name: String,
        is_external: bool,
    ) -> Result<(), FatalError> {
        self.ensure_resolved(id)?;
        let signature = self.signature(id)?;

        let parameters = signature
            .parameters
            .iter()
            .map(|ty| self.lower_type(ty))
            .collect::<Result<Vec<_>, _>>()?;
        let return_type = self.lower_type(&signature.return_type)?;

        trace!(symbol = %name, "declaring function");

        let handle = self.builder.declare_function(FunctionSignature {
            name,
            parameters,
            return_type,
            is_variadic: signature.is_variadic,
            is_external,
        });
        self.functions.insert(id, handle);

        Ok(())
    }

    fn lower_item(&mut self, id: NodeId) -> Result<(), FatalError> {
        let tree = self.tree;
        match tree.kind(id) {
            NodeKind::ClassDecl(class) => {
                for member in &class.members {
                    if matches!(tree.kind(*member), NodeKind::ClassMethod(_)) {
                        self.lower_function(*member)?;
                    }
                }
                Ok(())
            }
            NodeKind::Function(_) => self.lower_function(id),
            NodeKind::ExternFunction(_) => Ok(()),
            other => Err(fatal!("unexpected {} at module level", other.variant_name())),
        }
    }

    fn lower_function(&mut self, id: NodeId) -> Result<(), FatalError> {
        let tree = self.tree;
        let Some(function) = tree.kind(id).as_function() else {
            return Err(fatal!("node {id} is not a function"));
        };

        let Some(handle) = self.functions.get(&id).copied() else {
            return Err(fatal!("function `{}` was never declared", function.name));
        };

        debug!(function = %function.name, "lowering function");

        let return_type = self.signature(id)?.return_type;

        self.builder.begin_function(handle)?;
        let return_slot = if return_type.is_void() {
            None
        } else {
            let ty = self.lower_type(&return_type)?;
            Some(self.builder.alloca(ty)?)
        };
        let function_end = self.builder.create_block("function_end")?;

        self.symbols
            .push(FunctionFrame::new(handle, Some(function_end), return_slot));

        for (index, param) in function.params.iter().enumerate() {
            let value = self.builder.parameter(self.symbols.function()?, index)?;
            self.symbols.insert(*param, value)?;
        }

        self.lower_statement(function.body)?;
        self.terminate_with_branch(function_end)?;

        self.builder.set_insertion_point(function_end)?;
        let value = match return_slot {
            Some(slot) => {
                let ty = self.lower_type(&return_type)?;
                Some(self.builder.load(ty, slot)?)
            }
            None => None,
        };
        self.builder.ret(value)?;

        self.symbols.pop()?;
        self.builder.end_function()
    }

    fn current_block(&self) -> Result<B::Block, FatalError> {
        self.builder
            .insertion_point()
            .ok_or_else(|| fatal!("no insertion point set"))
    }

    /// Branches to `destination` unless the current block already ends in a
    /// control transfer
    fn terminate_with_branch(&mut self, destination: B::Block) -> Result<(), FatalError> {
        let current = self.current_block()?;
        if !self.builder.is_terminated(current)? {
            self.builder.branch(destination)?;
        }
        Ok(())
    }

    fn lower_statement(&mut self, id: NodeId) -> Result<(), FatalError> {
        self.ensure_resolved(id)?;

        let tree = self.tree;
        match tree.kind(id) {
            NodeKind::Block(block) => {
                for statement in &block.statements {
                    // Statements after a return still need somewhere to go
                    let current = self.current_block()?;
                    if self.builder.is_terminated(current)? {
                        let unreachable = self.builder.create_block("unreachable")?;
                        self.builder.set_insertion_point(unreachable)?;
                    }

                    self.lower_statement(*statement)?;
                }
                Ok(())
            }
            NodeKind::VarDecl(var) | NodeKind::ConstVarExpr(var) => self.lower_local(id, var),
            NodeKind::ReturnExpr(ret) => self.lower_return(id, ret.value),
            NodeKind::IfStmt(stmt) => self.lower_if(stmt),
            NodeKind::ExprStmt(stmt) => match tree.kind(stmt.expression) {
                NodeKind::Call(call) => {
                    self.ensure_resolved(stmt.expression)?;
                    self.lower_call(call).map(|_| ())
                }
                _ => self.lower_expression(stmt.expression).map(|_| ()),
            },
            other => Err(fatal!("cannot lower a {} as a statement", other.variant_name())),
        }
    }

    fn lower_local(&mut self, id: NodeId, var: &VarDecl) -> Result<(), FatalError> {
        let ty = self.type_of(id)?;
        let storage = self.lower_type(&ty)?;
        let slot = self.builder.alloca(storage)?;

        match (var.initializer, &ty) {
            (Some(initializer), _) => {
                let value = self.lower_value_as(initializer, &ty)?;
                self.builder.store(value, slot)?;
            }
            (None, Type::Class { id: class, .. }) => self.initialize_fields(*class, slot)?,
            (None, _) => {}
        }

        self.symbols.insert(id, slot)
    }

    /// Stores each field initializer of `class` into the instance at
    /// `instance`, recursing into fields of class type without one
    fn initialize_fields(&mut self, class: NodeId, instance: B::Value) -> Result<(), FatalError> {
        let tree = self.tree;
        let handle = self.struct_of(class)?;

        for field in tree.class_fields(class) {
            let NodeKind::MemberVarDecl(var) = tree.kind(field) else {
                continue;
            };

            let ty = self.type_of(field)?;
            match (var.initializer, &ty) {
                (Some(initializer), _) => {
                    let slot = self.field_slot(field)?;
                    let pointer = self.builder.field_pointer(handle, instance, slot)?;
                    let value = self.lower_value_as(initializer, &ty)?;
                    self.builder.store(value, pointer)?;
                }
                (None, Type::Class { id: nested, .. }) => {
                    let slot = self.field_slot(field)?;
                    let pointer = self.builder.field_pointer(handle, instance, slot)?;
                    self.initialize_fields(*nested, pointer)?;
                }
                (None, _) => {}
            }
        }

        Ok(())
    }

    fn lower_return(&mut self, id: NodeId, value: Option<NodeId>) -> Result<(), FatalError> {
        let function_end = self.symbols.function_end()?;

        if let Some(value) = value {
            let slot = self.symbols.return_slot()?;
            let Some(function) = self.tree.enclosing_function(id) else {
                return Err(fatal!("return node {id} outside of a function"));
            };
            let return_type = self.signature(function)?.return_type;

            let value = self.lower_value_as(value, &return_type)?;
            self.builder.store(value, slot)?;
        }

        self.builder.branch(function_end)
    }

    fn lower_if(&mut self, stmt: &IfStmt) -> Result<(), FatalError> {
        let condition = self.lower_value(stmt.condition)?;

        let positive = self.builder.create_block("if_then")?;
        let negative = match stmt.else_branch {
            Some(_) => Some(self.builder.create_block("if_else")?),
            None => None,
        };
        let merge = self.builder.create_block("if_merge")?;

        self.builder
            .conditional_branch(condition, positive, negative.unwrap_or(merge))?;

        self.builder.set_insertion_point(positive)?;
        self.lower_statement(stmt.then_block)?;
        self.terminate_with_branch(merge)?;

        if let (Some(else_branch), Some(negative)) = (stmt.else_branch, negative) {
            self.builder.set_insertion_point(negative)?;
            self.lower_statement(else_branch)?;
            self.terminate_with_branch(merge)?;
        }

        self.builder.set_insertion_point(merge)
    }

    /// Whether the lowered form of `id` is the address of its storage rather
    /// than its value
    fn returns_pointer(&self, id: NodeId) -> bool {
        match self.tree.kind(id) {
            NodeKind::Identifier(identifier) => matches!(
                identifier.binding,
                Some(Binding::Local(_) | Binding::Member { .. })
            ),
            NodeKind::MemberAccess(access) => access
                .resolved_member
                .is_some_and(|member| matches!(self.tree.kind(member), NodeKind::MemberVarDecl(_))),
            _ => false,
        }
    }

    /// Lowers `id` and loads the result if it is a pointer to storage
    fn lower_value(&mut self, id: NodeId) -> Result<B::Value, FatalError> {
        let lowered = self.lower_expression(id)?;

        if self.returns_pointer(id) {
            let ty = self.type_of(id)?;
            let ty = self.lower_type(&ty)?;
            self.builder.load(ty, lowered)
        } else {
            Ok(lowered)
        }
    }

    /// Lowers `id` for a destination of type `expected`, converting between
    /// integer widths and taking the address of instances passed by
    /// reference
    fn lower_value_as(&mut self, id: NodeId, expected: &Type) -> Result<B::Value, FatalError> {
        let found = self.type_of(id)?;

        match (expected, &found) {
            (Type::Reference(_), Type::Class { .. }) => self.lower_instance_address(id),
            (Type::Int(expected), Type::Int(found)) if expected != found => {
                let value = self.lower_value(id)?;
                self.builder.int_cast(*expected, value)
            }
            _ => self.lower_value(id),
        }
    }

    /// Address of the class instance `id` evaluates to
    fn lower_instance_address(&mut self, id: NodeId) -> Result<B::Value, FatalError> {
        match self.type_of(id)? {
            Type::Reference(_) => self.lower_value(id),
            Type::Class { .. } if self.returns_pointer(id) => self.lower_expression(id),
            ty @ Type::Class { .. } => {
                // Temporaries get storage so their fields can be addressed
                let value = self.lower_expression(id)?;
                let storage = self.lower_type(&ty)?;
                let slot = self.builder.alloca(storage)?;
                self.builder.store(value, slot)?;
                Ok(slot)
            }
            other => Err(fatal!("type `{other}` has no members")),
        }
    }

    /// Struct slot of a field. Methods sit among the members but have no
    /// slot, so the slot counts only the fields before the member offset.
    fn field_slot(&self, member: NodeId) -> Result<usize, FatalError> {
        let offset = member_offset(self.tree, member)?;
        let class = self.class_of(member)?;

        let NodeKind::ClassDecl(decl) = self.tree.kind(class) else {
            return Err(fatal!("member {member} lost its class"));
        };

        Ok(decl.members[..offset]
            .iter()
            .filter(|other| matches!(self.tree.kind(**other), NodeKind::MemberVarDecl(_)))
            .count())
    }

    fn class_of(&self, member: NodeId) -> Result<NodeId, FatalError> {
        self.tree
            .find_parent(member, |kind| matches!(kind, NodeKind::ClassDecl(_)))
            .ok_or_else(|| fatal!("member {member} lost its class"))
    }

    fn field_pointer(&mut self, instance: B::Value, member: NodeId) -> Result<B::Value, FatalError> {
        let slot = self.field_slot(member)?;
        let handle = self.struct_of(self.class_of(member)?)?;

        self.builder.field_pointer(handle, instance, slot)
    }

    fn lower_expression(&mut self, id: NodeId) -> Result<B::Value, FatalError> {
        self.ensure_resolved(id)?;

        let tree = self.tree;
        match tree.kind(id) {
            NodeKind::IntLiteral(literal) => Ok(self
                .builder
                .int_constant(literal.kind.unwrap_or(IntKind::I64), literal.value)),
            NodeKind::BoolLiteral(value) => Ok(self.builder.bool_constant(*value)),
            NodeKind::Identifier(identifier) => match identifier.binding {
                Some(Binding::Local(declaration) | Binding::Parameter(declaration)) => {
                    self.symbols.lookup(declaration)
                }
                Some(Binding::Member { receiver, member }) => {
                    let instance = self.symbols.lookup(receiver)?;
                    self.field_pointer(instance, member)
                }
                Some(Binding::Function(_) | Binding::Class(_)) => Err(fatal!(
                    "`{}` cannot be lowered as a value",
                    identifier.name
                )),
                None => Err(fatal!(kind: FatalErrorKind::Unresolved(id, "Identifier"))),
            },
            NodeKind::This(this) => match this.receiver {
                Some(receiver) => self.symbols.lookup(receiver),
                None => Err(fatal!(kind: FatalErrorKind::Unresolved(id, "This"))),
            },
            NodeKind::MemberAccess(access) => {
                let Some(member) = access.resolved_member else {
                    return Err(fatal!(kind: FatalErrorKind::Unresolved(id, "MemberAccess")));
                };

                let instance = self.lower_instance_address(access.target)?;
                self.field_pointer(instance, member)
            }
            NodeKind::Call(call) => self
                .lower_call(call)?
                .ok_or_else(|| fatal!("void call to node {id} used as a value")),
            NodeKind::Binary(binary) => {
                let lhs_type = self.type_of(binary.lhs)?;
                let lhs = self.lower_value(binary.lhs)?;
                let rhs = self.lower_value_as(binary.rhs, &lhs_type)?;

                let ty = self.lower_type(&lhs_type)?;
                self.builder.binary(binary.operator, ty, lhs, rhs)
            }
            NodeKind::Unary(unary) => {
                let operand_type = self.type_of(unary.operand)?;
                let ty = self.lower_type(&operand_type)?;
                let operand = self.lower_value(unary.operand)?;
                self.builder.unary(unary.operator, ty, operand)
            }
            NodeKind::Assign(assign) => {
                if !self.returns_pointer(assign.target) {
                    return Err(fatal!(
                        "assignment target node {} has no storage",
                        assign.target
                    ));
                }

                let target_type = self.type_of(assign.target)?;
                let value = self.lower_value_as(assign.value, &target_type)?;
                let place = self.lower_expression(assign.target)?;
                self.builder.store(value, place)?;

                Ok(value)
            }
            other => Err(fatal!("cannot lower a {} as an expression", other.variant_name())),
        }
    }

    /// Lowers a call, passing the receiver's address first for methods
    fn lower_call(&mut self, call: &Call) -> Result<Option<B::Value>, FatalError> {
        let Some(target) = call.target else {
            return Err(fatal!(kind: FatalErrorKind::Unresolved(call.callee, "Call")));
        };

        let Some(function) = self.functions.get(&target.function).copied() else {
            return Err(fatal!("call to undeclared node {}", target.function));
        };

        let signature = self.signature(target.function)?;
        let mut arguments = Vec::with_capacity(signature.parameters.len());

        if let Some(receiver) = target.receiver {
            let address = match receiver {
                Receiver::Expression(expression) => self.lower_instance_address(expression)?,
                Receiver::Parameter(param) => self.symbols.lookup(param)?,
            };
            arguments.push(address);
        }

        let skip = arguments.len();
        for (index, argument) in call.arguments.iter().enumerate() {
            let value = match signature.parameters.get(skip + index) {
                Some(expected) => self.lower_value_as(*argument, expected)?,
                None if signature.is_variadic => self.lower_value(*argument)?,
                None => return Err(fatal!("too many arguments reached codegen")),
            };
            arguments.push(value);
        }

        self.builder.call(function, arguments)
    }
}
