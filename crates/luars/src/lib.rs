//! Lua 5.3 compiler front-end targeting a CPython-style stack bytecode (§1).
//!
//! The compiler pipeline (lexer -> parser -> scope resolver -> assembler /
//! codegen) is the focus of this crate; `lua_vm` and `stdlib` are a minimal
//! runtime realization sufficient to execute what the compiler produces and
//! check it end to end (§1 "Out of scope").

pub mod compiler;
pub mod error;
pub mod lua_state;
pub mod lua_vm;
pub mod stdlib;

#[cfg(test)]
mod test;

use compiler::config::CompilerLimits;
use error::ExecError;
use lua_vm::LuaValue;

/// Compiles and runs one Lua chunk against a fresh `LuaState` with the
/// standard library already loaded, returning the chunk's final return
/// tuple. Convenience wrapper over `compiler::compile` + `LuaState::call`
/// for callers that don't need to reuse a `LuaState` across chunks.
pub fn execute(source: &str, chunkname: &str) -> Result<LuaValue, ExecError> {
    let state = lua_state::LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load(source, chunkname)?;
    Ok(state.call(&chunk, &[])?)
}
