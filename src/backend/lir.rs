//! LIR (Low-level Intermediate Representation). In this form, classes are
//! plain structs, control structures are blocks joined by jumps and
//! expression trees are flattened into ordered operations on virtual
//! registers.

use std::collections::BTreeSet;

use super::{Builder, FunctionSignature, ValueType};
use crate::{
    error::FatalError,
    fatal,
    frontend::ast::{BinaryOperatorClass, BinaryOperatorKind, UnaryOperatorKind},
    index::{IndexVec, simple_index},
    middle::primitive::IntKind,
};

simple_index! {
    /// Identifies a struct declared in an LIR module
    pub struct StructId;
}

simple_index! {
    /// Identifies a function declared in an LIR module
    pub struct FunctionId;
}

simple_index! {
    /// Identifies a block within one function
    pub struct BlockId;
}

simple_index! {
    /// Identifies a virtual LIR register which holds a temporary value
    pub struct RegisterId;
}

pub type Type = ValueType<StructId>;

#[derive(Debug, Default)]
pub struct Module {
    pub structs: IndexVec<StructId, StructDefinition>,
    pub functions: IndexVec<FunctionId, FunctionDefinition>,
}

impl Module {
    pub fn function(&self, symbol_name: &str) -> Option<&FunctionDefinition> {
        self.functions
            .iter()
            .find(|function| function.symbol_name == symbol_name)
    }
}

#[derive(Debug)]
pub struct StructDefinition {
    pub name: String,
    /// Field types in offset order, `None` until the struct is defined
    pub fields: Option<Vec<Type>>,
}

#[derive(Debug)]
pub struct FunctionDefinition {
    pub id: FunctionId,
    pub symbol_name: String,
    pub return_type: Type,
    pub is_variadic: bool,
    pub is_external: bool,
    /// Allocated virtual registers used to store temporary data
    pub registers: IndexVec<RegisterId, Register>,
    pub arguments: Vec<RegisterId>,
    pub blocks: IndexVec<BlockId, Block>,
}

/// A temporary virtual register of some type
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    pub id: RegisterId,
    pub ty: Type,
}

#[derive(Debug)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub instructions: Vec<Instruction>,
    pub predecessors: BTreeSet<BlockId>,
}

impl Block {
    pub fn is_terminated(&self) -> bool {
        self.instructions.last().is_some_and(|i| {
            matches!(
                i,
                Instruction::Jump { .. } | Instruction::Branch { .. } | Instruction::Return { .. }
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    AllocStack {
        destination: RegisterId,
        ty: Type,
    },
    LoadMem {
        destination: RegisterId,
        ty: Type,
        source: Operand,
    },
    StoreMem {
        destination: Operand,
        source: Operand,
    },
    GetStructElementPointer {
        destination: RegisterId,
        source: Operand,
        ty: StructId,
        index: usize,
    },
    IntegerCast {
        kind: IntKind,
        destination: RegisterId,
        operand: Operand,
    },
    UnaryOperation {
        operator: UnaryOperatorKind,
        destination: RegisterId,
        operand: Operand,
    },
    BinaryOperation {
        operator: BinaryOperatorKind,
        destination: RegisterId,
        lhs: Operand,
        rhs: Operand,
    },
    Branch {
        condition: Operand,
        positive: BlockId,
        negative: BlockId,
    },
    Jump {
        destination: BlockId,
    },
    Return {
        value: Option<Operand>,
    },
    FunctionCall {
        target: FunctionId,
        arguments: Vec<Operand>,
        destination: Option<RegisterId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    Int(u64, IntKind),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Immediate(Immediate),
    Register(RegisterId),
}

/// Builds an LIR [`Module`]. Only one function body is open at a time.
#[derive(Debug, Default)]
pub struct LirBuilder {
    module: Module,
    current: Option<FunctionId>,
    cursor: Option<BlockId>,
}

impl LirBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn into_module(self) -> Module {
        self.module
    }

    fn current_function(&mut self) -> Result<&mut FunctionDefinition, FatalError> {
        let Some(current) = self.current else {
            return Err(fatal!("no function body is being emitted"));
        };

        Ok(&mut self.module.functions[current])
    }

    fn create_register(&mut self, ty: Type) -> Result<RegisterId, FatalError> {
        let function = self.current_function()?;
        let id = function.registers.next_index();
        Ok(function.registers.push(Register { id, ty }))
    }

    fn push_instruction(&mut self, instruction: Instruction) -> Result<(), FatalError> {
        let Some(cursor) = self.cursor else {
            return Err(fatal!("no insertion point set"));
        };

        let block = &mut self.current_function()?.blocks[cursor];
        if block.is_terminated() {
            return Err(fatal!(
                "emitting into block {cursor} after its terminator"
            ));
        }

        block.instructions.push(instruction);
        Ok(())
    }

    fn block(&mut self, id: BlockId) -> Result<&mut Block, FatalError> {
        self.current_function()?
            .blocks
            .get_mut(id)
            .ok_or_else(|| fatal!("block {id} does not exist in the current function"))
    }

    fn add_predecessor(&mut self, block: BlockId) -> Result<(), FatalError> {
        let Some(cursor) = self.cursor else {
            return Err(fatal!("no insertion point set"));
        };

        self.block(block)?.predecessors.insert(cursor);
        Ok(())
    }

    fn register_type(&self, operand: Operand) -> Option<Type> {
        match operand {
            Operand::Immediate(Immediate::Int(_, kind)) => Some(Type::Int(kind)),
            Operand::Immediate(Immediate::Bool(_)) => Some(Type::Bool),
            Operand::Register(register) => self
                .current
                .and_then(|current| self.module.functions[current].registers.get(register))
                .map(|register| register.ty),
        }
    }
}

impl Builder for LirBuilder {
    type Value = Operand;
    type Block = BlockId;
    type Function = FunctionId;
    type Struct = StructId;

    fn declare_struct(&mut self, name: &str) -> StructId {
        self.module.structs.push(StructDefinition {
            name: name.to_owned(),
            fields: None,
        })
    }

    fn define_struct(&mut self, handle: StructId, fields: Vec<Type>) -> Result<(), FatalError> {
        let Some(definition) = self.module.structs.get_mut(handle) else {
            return Err(fatal!("struct {handle} was never declared"));
        };

        if definition.fields.is_some() {
            return Err(fatal!("struct `{}` defined twice", definition.name));
        }

        definition.fields = Some(fields);
        Ok(())
    }

    fn declare_function(&mut self, signature: FunctionSignature<StructId>) -> FunctionId {
        let id = self.module.functions.next_index();

        let mut registers = IndexVec::new();
        let arguments = signature
            .parameters
            .into_iter()
            .map(|ty| {
                let id = registers.next_index();
                registers.push(Register { id, ty })
            })
            .collect();

        self.module.functions.push(FunctionDefinition {
            id,
            symbol_name: signature.name,
            return_type: signature.return_type,
            is_variadic: signature.is_variadic,
            is_external: signature.is_external,
            registers,
            arguments,
            blocks: IndexVec::new(),
        })
    }

    fn begin_function(&mut self, function: FunctionId) -> Result<BlockId, FatalError> {
        if let Some(current) = self.current {
            return Err(fatal!(
                "cannot begin {function} while {current} is still open"
            ));
        }

        let Some(definition) = self.module.functions.get(function) else {
            return Err(fatal!("function {function} was never declared"));
        };

        if definition.is_external || !definition.blocks.is_empty() {
            return Err(fatal!(
                "function `{}` cannot be given a body",
                definition.symbol_name
            ));
        }

        self.current = Some(function);
        let entry = self.create_block("entry")?;
        self.cursor = Some(entry);

        Ok(entry)
    }

    fn end_function(&mut self) -> Result<(), FatalError> {
        if self.current.take().is_none() {
            return Err(fatal!("no function body is being emitted"));
        }

        self.cursor = None;
        Ok(())
    }

    fn parameter(&self, function: FunctionId, index: usize) -> Result<Operand, FatalError> {
        self.module
            .functions
            .get(function)
            .and_then(|definition| definition.arguments.get(index))
            .map(|register| Operand::Register(*register))
            .ok_or_else(|| fatal!("function {function} has no parameter {index}"))
    }

    fn create_block(&mut self, name: &str) -> Result<BlockId, FatalError> {
        let function = self.current_function()?;
        let id = function.blocks.next_index();

        Ok(function.blocks.push(Block {
            id,
            name: name.to_owned(),
            instructions: Vec::new(),
            predecessors: BTreeSet::new(),
        }))
    }

    fn insertion_point(&self) -> Option<BlockId> {
        self.cursor
    }

    fn set_insertion_point(&mut self, block: BlockId) -> Result<(), FatalError> {
        self.block(block)?;
        self.cursor = Some(block);
        Ok(())
    }

    fn is_terminated(&self, block: BlockId) -> Result<bool, FatalError> {
        self.current
            .and_then(|current| self.module.functions[current].blocks.get(block))
            .map(Block::is_terminated)
            .ok_or_else(|| fatal!("block {block} does not exist in the current function"))
    }

    fn int_constant(&mut self, kind: IntKind, value: u64) -> Operand {
        Operand::Immediate(Immediate::Int(value, kind))
    }

    fn bool_constant(&mut self, value: bool) -> Operand {
        Operand::Immediate(Immediate::Bool(value))
    }

    fn alloca(&mut self, ty: Type) -> Result<Operand, FatalError> {
        let destination = self.create_register(Type::Pointer)?;
        self.push_instruction(Instruction::AllocStack { destination, ty })?;
        Ok(Operand::Register(destination))
    }

    fn load(&mut self, ty: Type, pointer: Operand) -> Result<Operand, FatalError> {
        let destination = self.create_register(ty)?;
        self.push_instruction(Instruction::LoadMem {
            destination,
            ty,
            source: pointer,
        })?;
        Ok(Operand::Register(destination))
    }

    fn store(&mut self, value: Operand, pointer: Operand) -> Result<(), FatalError> {
        self.push_instruction(Instruction::StoreMem {
            destination: pointer,
            source: value,
        })
    }

    fn field_pointer(
        &mut self,
        ty: StructId,
        pointer: Operand,
        index: usize,
    ) -> Result<Operand, FatalError> {
        let field_count = self
            .module
            .structs
            .get(ty)
            .and_then(|definition| definition.fields.as_ref())
            .map(Vec::len);

        if field_count.is_none_or(|count| index >= count) {
            return Err(fatal!("struct {ty} has no field {index}"));
        }

        let destination = self.create_register(Type::Pointer)?;
        self.push_instruction(Instruction::GetStructElementPointer {
            destination,
            source: pointer,
            ty,
            index,
        })?;
        Ok(Operand::Register(destination))
    }

    fn int_cast(&mut self, kind: IntKind, value: Operand) -> Result<Operand, FatalError> {
        if self.register_type(value) == Some(Type::Int(kind)) {
            return Ok(value);
        }

        // Immediates are retyped in place
        if let Operand::Immediate(Immediate::Int(value, _)) = value {
            return Ok(Operand::Immediate(Immediate::Int(value, kind)));
        }

        let destination = self.create_register(Type::Int(kind))?;
        self.push_instruction(Instruction::IntegerCast {
            kind,
            destination,
            operand: value,
        })?;
        Ok(Operand::Register(destination))
    }

    fn unary(
        &mut self,
        operator: UnaryOperatorKind,
        ty: Type,
        operand: Operand,
    ) -> Result<Operand, FatalError> {
        let destination = self.create_register(ty)?;
        self.push_instruction(Instruction::UnaryOperation {
            operator,
            destination,
            operand,
        })?;
        Ok(Operand::Register(destination))
    }

    fn binary(
        &mut self,
        operator: BinaryOperatorKind,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    ) -> Result<Operand, FatalError> {
        let result = match operator.class() {
            BinaryOperatorClass::Arithmetic => ty,
            _ => Type::Bool,
        };

        let destination = self.create_register(result)?;
        self.push_instruction(Instruction::BinaryOperation {
            operator,
            destination,
            lhs,
            rhs,
        })?;
        Ok(Operand::Register(destination))
    }

    fn call(
        &mut self,
        function: FunctionId,
        arguments: Vec<Operand>,
    ) -> Result<Option<Operand>, FatalError> {
        let Some(definition) = self.module.functions.get(function) else {
            return Err(fatal!("function {function} was never declared"));
        };

        let return_type = definition.return_type;
        let destination = if return_type.is_void() {
            None
        } else {
            Some(self.create_register(return_type)?)
        };

        self.push_instruction(Instruction::FunctionCall {
            target: function,
            arguments,
            destination,
        })?;

        Ok(destination.map(Operand::Register))
    }

    fn branch(&mut self, destination: BlockId) -> Result<(), FatalError> {
        self.add_predecessor(destination)?;
        self.push_instruction(Instruction::Jump { destination })
    }

    fn conditional_branch(
        &mut self,
        condition: Operand,
        positive: BlockId,
        negative: BlockId,
    ) -> Result<(), FatalError> {
        self.add_predecessor(positive)?;
        self.add_predecessor(negative)?;
        self.push_instruction(Instruction::Branch {
            condition,
            positive,
            negative,
        })
    }

    fn ret(&mut self, value: Option<Operand>) -> Result<(), FatalError> {
        self.push_instruction(Instruction::Return { value })
    }
}
