// Minimal runtime (§1.1 "Minimal VM (ambient)").
// This module exists so the compiler's output is checkable end to end; it is
// not a production Lua VM (no metatables, no coroutines, integer fast paths
// only) — see SPEC_FULL §1 Out-of-scope. Shape grounded on the teacher's
// `lua_vm/` split into `value`/`table`/`opcode`/an execute loop, scaled down
// to this crate's own stack opcode set.

pub mod code_object;
pub mod interpreter;
pub mod opcode;
pub mod table;
pub mod value;

pub use code_object::CodeObject;
pub use interpreter::{call_closure, call_value};
pub use table::LuaTable;
pub use value::{LuaClosure, LuaValue, NativeFunction};
