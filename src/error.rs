use std::path::PathBuf;

use thiserror::Error;

use crate::frontend::ast::NodeId;

/// A broken compiler invariant. These are never the fault of the program
/// being compiled, so the run is abandoned as soon as one is raised.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct FatalError {
    pub kind: FatalErrorKind,
    /// Where in the compiler the error was raised
    pub origin: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FatalErrorKind {
    #[error("no function-end block found")]
    MissingFunctionEnd,
    #[error("no return slot found for a function returning a value")]
    MissingReturnSlot,
    #[error("symbol lookup outside of any function")]
    NoActiveFunction,
    #[error("class method `{0}` created without an owning class")]
    MethodWithoutClass(String),
    #[error("member `{0}` has no parent class")]
    NoParentClass(String),
    #[error("member `{0}` is not in its own parent class")]
    MemberNotInParent(String),
    #[error("node {0} ({1}) was lowered before it was resolved")]
    Unresolved(NodeId, &'static str),
    #[error("{0}")]
    Internal(String),
}

impl FatalError {
    pub fn new(kind: FatalErrorKind, origin: Option<String>) -> Self {
        Self { kind, origin }
    }
}

/// Builds a [`FatalError`], recording the raise site when the
/// `error-backtrace` feature is enabled. Accepts either a
/// [`FatalErrorKind`] expression or format arguments for an internal error.
#[macro_export]
macro_rules! fatal {
    (kind: $kind:expr) => {{
        #[cfg(feature = "error-backtrace")]
        let origin = Some(format!("{}:{}:{}", file!(), line!(), column!()));
        #[cfg(not(feature = "error-backtrace"))]
        let origin = None;

        $crate::error::FatalError::new($kind, origin)
    }};
    ($($arg:tt)+) => {
        $crate::fatal!(kind: $crate::error::FatalErrorKind::Internal(format!($($arg)+)))
    };
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("a runner for `{}` is already registered", .0.display())]
    DuplicateRegistration(PathBuf),
}
