// Compiler-boundary error type.
// Mirrors lua_vm::LuaError/LuaFullError's split of a cheap Copy tag from a
// message-carrying wrapper, but the compiler only ever needs the wrapper.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    Lex,
    Parse,
    Scope,
    Goto,
    Codegen,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompileErrorKind::Lex => "lexical error",
            CompileErrorKind::Parse => "syntax error",
            CompileErrorKind::Scope => "scope error",
            CompileErrorKind::Goto => "goto error",
            CompileErrorKind::Codegen => "codegen error",
        };
        write!(f, "{s}")
    }
}

/// The one error type that crosses the `compile()` boundary (§7).
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub filename: String,
    pub line: u32,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, filename: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        CompileError {
            kind,
            filename: filename.into(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.filename, self.line, self.message)
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;

/// Runtime-side error for the minimal VM (§1.1). Kept small and separate from
/// `CompileError` the same way the teacher keeps `LuaError` separate from its
/// parser-side errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    TypeError,
    StackOverflow,
    Undefined,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuntimeError::TypeError => "attempt to perform an invalid operation",
            RuntimeError::StackOverflow => "stack overflow",
            RuntimeError::Undefined => "attempt to call a nil value",
        };
        write!(f, "{s}")
    }
}

impl std::error::Error for RuntimeError {}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Unifies `CompileError` and `RuntimeError` for callers that run a chunk
/// start to finish and don't care which stage failed — mirrors the
/// teacher's `execute_string` returning one `LuaResult` across both its
/// compile and execute stages.
#[derive(Debug, Clone)]
pub enum ExecError {
    Compile(CompileError),
    Runtime(RuntimeError),
}

impl From<CompileError> for ExecError {
    fn from(e: CompileError) -> Self {
        ExecError::Compile(e)
    }
}

impl From<RuntimeError> for ExecError {
    fn from(e: RuntimeError) -> Self {
        ExecError::Runtime(e)
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Compile(e) => write!(f, "{e}"),
            ExecError::Runtime(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ExecError {}
