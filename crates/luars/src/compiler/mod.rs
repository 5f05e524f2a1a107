// Top-level compiler pipeline (§6.3 "compile()").
// Grounded on fml/compile/__init__.py's `compile(source, filename)`, which
// chains the same four stages in the same order; the teacher's own
// `compiler/mod.rs` wires an identical lexer -> parser -> scope -> codegen
// pipeline behind one entry point.

pub mod assembler;
pub mod ast;
pub mod codegen;
pub mod config;
pub mod lexer;
pub mod parser;
pub mod scope;

use std::rc::Rc;

use config::CompilerLimits;
use scope::goto_visitor::GotoVisitor;
use scope::scope_visitor::ScopeVisitor;

use crate::error::CompileResult;
use crate::lua_vm::code_object::CodeObject;

/// Compiles one Lua chunk to a top-level `CodeObject` (§6.3). `filename` is
/// threaded through every stage for error messages and ends up embedded in
/// the resulting code object's debug info.
pub fn compile(source: &str, filename: &str, limits: CompilerLimits) -> CompileResult<Rc<CodeObject>> {
    let file = parser::parse(filename, source)?;
    ScopeVisitor::new(filename, limits).resolve_file(&file)?;
    GotoVisitor::new(filename).resolve_file(&file)?;
    codegen::compile_file(&file, Rc::from(filename))
}
