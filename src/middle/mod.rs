//! Names and types are resolved here. Class methods are desugared into plain
//! functions taking their receiver as the first parameter, and the order in
//! which nodes must be resolved is tracked in a dependency graph.

pub mod dependency;
pub mod desugar;
pub mod primitive;
pub mod resolve;
pub mod ty;
