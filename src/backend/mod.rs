//! The backend lowers a resolved tree into instructions. Lowering talks to an
//! instruction emitter only through the [`Builder`] trait, whose handles are
//! opaque to the code generator. [`lir::LirBuilder`] is the builder the
//! driver uses; it produces an in-memory [`lir::Module`] that can be pretty
//! printed.

use core::fmt::Debug;

use crate::{
    error::FatalError,
    frontend::ast::{BinaryOperatorKind, UnaryOperatorKind},
    middle::primitive::IntKind,
};

pub mod codegen;
pub mod lir;
pub mod pretty_print;
pub mod symtab;

/// Machine level type of a value, parameterized over the builder's struct
/// handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType<S> {
    Void,
    Bool,
    Int(IntKind),
    Pointer,
    Struct(S),
}

impl<S> ValueType<S> {
    pub fn is_void(&self) -> bool {
        matches!(self, ValueType::Void)
    }
}

/// Declaration of a function to a builder
#[derive(Debug, Clone)]
pub struct FunctionSignature<S> {
    pub name: String,
    pub parameters: Vec<ValueType<S>>,
    pub return_type: ValueType<S>,
    pub is_variadic: bool,
    /// Defined elsewhere, never gets a body
    pub is_external: bool,
}

/// An instruction emitter with a single insertion cursor. Every emitting call
/// appends at the current insertion point.
pub trait Builder {
    type Value: Debug + Clone + Copy + PartialEq;
    type Block: Debug + Clone + Copy + PartialEq;
    type Function: Debug + Clone + Copy + PartialEq;
    type Struct: Debug + Clone + Copy + PartialEq;

    fn declare_struct(&mut self, name: &str) -> Self::Struct;
    fn define_struct(
        &mut self,
        handle: Self::Struct,
        fields: Vec<ValueType<Self::Struct>>,
    ) -> Result<(), FatalError>;

    fn declare_function(&mut self, signature: FunctionSignature<Self::Struct>) -> Self::Function;

    /// Starts emitting the body of `function`, returning its entry block with
    /// the cursor placed in it
    fn begin_function(&mut self, function: Self::Function) -> Result<Self::Block, FatalError>;
    fn end_function(&mut self) -> Result<(), FatalError>;
    fn parameter(&self, function: Self::Function, index: usize) -> Result<Self::Value, FatalError>;

    fn create_block(&mut self, name: &str) -> Result<Self::Block, FatalError>;
    fn insertion_point(&self) -> Option<Self::Block>;
    fn set_insertion_point(&mut self, block: Self::Block) -> Result<(), FatalError>;
    /// Whether `block` already ends in a control transfer
    fn is_terminated(&self, block: Self::Block) -> Result<bool, FatalError>;

    fn int_constant(&mut self, kind: IntKind, value: u64) -> Self::Value;
    fn bool_constant(&mut self, value: bool) -> Self::Value;

    fn alloca(&mut self, ty: ValueType<Self::Struct>) -> Result<Self::Value, FatalError>;
    fn load(
        &mut self,
        ty: ValueType<Self::Struct>,
        pointer: Self::Value,
    ) -> Result<Self::Value, FatalError>;
    fn store(&mut self, value: Self::Value, pointer: Self::Value) -> Result<(), FatalError>;
    fn field_pointer(
        &mut self,
        ty: Self::Struct,
        pointer: Self::Value,
        index: usize,
    ) -> Result<Self::Value, FatalError>;

    fn int_cast(&mut self, kind: IntKind, value: Self::Value) -> Result<Self::Value, FatalError>;
    fn unary(
        &mut self,
        operator: UnaryOperatorKind,
        ty: ValueType<Self::Struct>,
        operand: Self::Value,
    ) -> Result<Self::Value, FatalError>;
    fn binary(
        &mut self,
        operator: BinaryOperatorKind,
        ty: ValueType<Self::Struct>,
        lhs: Self::Value,
        rhs: Self::Value,
    ) -> Result<Self::Value, FatalError>;
    /// Returns the call's result, or `None` for a void callee
    fn call(
        &mut self,
        function: Self::Function,
        arguments: Vec<Self::Value>,
    ) -> Result<Option<Self::Value>, FatalError>;

    fn branch(&mut self, destination: Self::Block) -> Result<(), FatalError>;
    fn conditional_branch(
        &mut self,
        condition: Self::Value,
        positive: Self::Block,
        negative: Self::Block,
    ) -> Result<(), FatalError>;
    fn ret(&mut self, value: Option<Self::Value>) -> Result<(), FatalError>;
}
