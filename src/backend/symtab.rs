use std::collections::BTreeMap;

use super::Builder;
use crate::{
    error::{FatalError, FatalErrorKind},
    fatal,
    frontend::ast::NodeId,
};

/// Per-function state the code generator needs while a body is emitted
#[derive(Debug)]
pub struct FunctionFrame<B: Builder> {
    pub function: B::Function,
    /// Block every return branches to, created before the body is emitted
    pub function_end: Option<B::Block>,
    /// Storage for the return value of a non-void function
    pub return_slot: Option<B::Value>,
    /// Lowered values of parameters and storage of locals
    values: BTreeMap<NodeId, B::Value>,
}

impl<B: Builder> FunctionFrame<B> {
    pub fn new(
        function: B::Function,
        function_end: Option<B::Block>,
        return_slot: Option<B::Value>,
    ) -> Self {
        Self {
            function,
            function_end,
            return_slot,
            values: BTreeMap::new(),
        }
    }
}

/// Stack of function frames. Every lookup requires an active frame.
#[derive(Debug)]
pub struct SymbolTable<B: Builder> {
    frames: Vec<FunctionFrame<B>>,
}

impl<B: Builder> Default for SymbolTable<B> {
    fn default() -> Self {
        Self { frames: Vec::new() }
    }
}

impl<B: Builder> SymbolTable<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: FunctionFrame<B>) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Result<FunctionFrame<B>, FatalError> {
        self.frames
            .pop()
            .ok_or_else(|| fatal!(kind: FatalErrorKind::NoActiveFunction))
    }

    fn active(&self) -> Result<&FunctionFrame<B>, FatalError> {
        self.frames
            .last()
            .ok_or_else(|| fatal!(kind: FatalErrorKind::NoActiveFunction))
    }

    pub fn function(&self) -> Result<B::Function, FatalError> {
        Ok(self.active()?.function)
    }

    pub fn function_end(&self) -> Result<B::Block, FatalError> {
        self.active()?
            .function_end
            .ok_or_else(|| fatal!(kind: FatalErrorKind::MissingFunctionEnd))
    }

    pub fn return_slot(&self) -> Result<B::Value, FatalError> {
        self.active()?
            .return_slot
            .ok_or_else(|| fatal!(kind: FatalErrorKind::MissingReturnSlot))
    }

    pub fn insert(&mut self, node: NodeId, value: B::Value) -> Result<(), FatalError> {
        let Some(frame) = self.frames.last_mut() else {
            return Err(fatal!(kind: FatalErrorKind::NoActiveFunction));
        };

        frame.values.insert(node, value);
        Ok(())
    }

    pub fn lookup(&self, node: NodeId) -> Result<B::Value, FatalError> {
        self.active()?
            .values
            .get(&node)
            .copied()
            .ok_or_else(|| fatal!("node {node} has no value in the current function"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{
            FunctionSignature, ValueType,
            lir::{LirBuilder, Operand},
        },
        index::Index,
        middle::primitive::IntKind,
    };

    fn function(builder: &mut LirBuilder) -> <LirBuilder as Builder>::Function {
        builder.declare_function(FunctionSignature {
            name: "f".to_owned(),
            parameters: Vec::new(),
            return_type: ValueType::Void,
            is_variadic: false,
            is_external: false,
        })
    }

    #[test]
    fn lookups_require_a_frame() {
        let table = SymbolTable::<LirBuilder>::new();

        assert_eq!(
            table.function_end().unwrap_err().kind,
            FatalErrorKind::NoActiveFunction
        );
        assert_eq!(
            table.return_slot().unwrap_err().kind,
            FatalErrorKind::NoActiveFunction
        );
        assert!(table.lookup(NodeId::new(0)).is_err());
    }

    #[test]
    fn missing_frame_entries_are_fatal() {
        let mut builder = LirBuilder::new();
        let mut table = SymbolTable::<LirBuilder>::new();
        table.push(FunctionFrame::new(function(&mut builder), None, None));

        assert_eq!(
            table.function_end().unwrap_err().kind,
            FatalErrorKind::MissingFunctionEnd
        );
        assert_eq!(
            table.return_slot().unwrap_err().kind,
            FatalErrorKind::MissingReturnSlot
        );
    }

    #[test]
    fn values_are_scoped_to_their_frame() {
        let mut builder = LirBuilder::new();
        let mut table = SymbolTable::<LirBuilder>::new();
        let node = NodeId::new(3);
        let value = builder.int_constant(IntKind::I64, 1);

        table.push(FunctionFrame::new(function(&mut builder), None, None));
        table.insert(node, value).unwrap();
        assert_eq!(table.lookup(node).unwrap(), value);

        table.push(FunctionFrame::new(function(&mut builder), None, None));
        assert!(table.lookup(node).is_err());

        table.pop().unwrap();
        assert!(matches!(table.lookup(node).unwrap(), Operand::Immediate(_)));
        table.pop().unwrap();
        assert!(table.pop().is_err());
    }
}
