// Host API (§6.3). Grounded on fml/runtime.py's `LuaState`, which holds an
// `_ENV` dict and a `loaded` module cache and exposes `loadlibs`/`load`/
// `loadfile`; the teacher's `LuaVM::new(SafeOption::default())` is the model
// for threading a `CompilerLimits` through construction the same way.

use std::cell::RefCell;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::compiler::config::CompilerLimits;
use crate::compiler::compile;
use crate::error::{CompileError, CompileErrorKind, CompileResult, RuntimeResult};
use crate::lua_vm::{call_closure, call_value, LuaClosure, LuaTable, LuaValue};
use crate::stdlib::basic;

/// Owns the two namespaces every compiled chunk resolves names against
/// (§6.1 "Symbol -> opcode mapping"): `globals` backs `LOAD_GLOBAL`/
/// `STORE_GLOBAL` for the synthetic operator builtins and `_ENV` itself;
/// `env` is the actual `_ENV`/`_G` table ordinary Lua globals live in.
///
/// Unlike `base.py`'s `load`, which lets each call supply its own `env` and
/// so sandbox a chunk into an isolated table, every chunk compiled by one
/// `LuaState` shares its single `globals`/`env` pair — there is no per-call
/// override. See DESIGN.md.
pub struct LuaState {
    limits: CompilerLimits,
    globals: Rc<RefCell<LuaTable>>,
    env: Rc<RefCell<LuaTable>>,
    loaded: RefCell<std::collections::HashMap<SmolStr, LuaValue>>,
}

impl LuaState {
    pub fn new(limits: CompilerLimits) -> Self {
        let env = Rc::new(RefCell::new(LuaTable::new()));
        let globals = Rc::new(RefCell::new(LuaTable::new()));
        globals.borrow_mut().set(LuaValue::Str(SmolStr::new("_ENV")), LuaValue::Table(env.clone()));
        LuaState {
            limits,
            globals,
            env,
            loaded: RefCell::new(std::collections::HashMap::new()),
        }
    }

    /// Registers the base library into both namespaces (§6.3 "loadlibs()"):
    /// operator builtins into `globals`, `tonumber`/`load`/`loadfile`/`_G`
    /// into `env`. Mirrors `runtime.py`'s `loadlibs` calling `base.luaopen`
    /// through `require(b"_G", ...)`.
    pub fn loadlibs(&self) {
        basic::install_builtins(&mut self.globals.borrow_mut());
        basic::install_env(&self.env);
        self.loaded.borrow_mut().insert(SmolStr::new("_G"), LuaValue::Table(self.env.clone()));
    }

    /// The `_ENV`/`_G` table ordinary Lua globals are stored in.
    pub fn env(&self) -> &Rc<RefCell<LuaTable>> {
        &self.env
    }

    /// Compiles `source` and wraps it as a callable chunk (§6.3 "load()").
    /// The returned closure has no free variables — a top-level chunk is
    /// never nested inside another function.
    pub fn load(&self, source: &str, chunkname: &str) -> CompileResult<LuaValue> {
        let code = compile(source, chunkname, self.limits)?;
        Ok(LuaValue::Function(Rc::new(LuaClosure { code, free: Vec::new() })))
    }

    /// Reads `path` and compiles it the same way as `load` (§6.3
    /// "loadfile()"), using the file's own path as the chunk name. An I/O
    /// failure is reported through the same `CompileError` channel as a
    /// syntax error, matching `runtime.py`'s `loadfile` funneling both
    /// failure modes back through `load`'s own error return.
    pub fn loadfile(&self, path: &str) -> CompileResult<LuaValue> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| CompileError::new(CompileErrorKind::Codegen, path, 0, e.to_string()))?;
        self.load(&source, path)
    }

    /// Calls a chunk or function value previously produced by `load`.
    pub fn call(&self, func: &LuaValue, args: &[LuaValue]) -> RuntimeResult<LuaValue> {
        call_value(func, args, &self.globals)
    }

    /// Calls a `LuaClosure` directly, bypassing the generic `LuaValue`
    /// dispatch in `call` — used by callers that already hold the closure
    /// (e.g. re-entering a chunk returned by `load`).
    pub fn call_closure(&self, closure: &Rc<LuaClosure>, args: &[LuaValue]) -> RuntimeResult<LuaValue> {
        call_closure(closure, args, &self.globals)
    }
}

impl Default for LuaState {
    fn default() -> Self {
        LuaState::new(CompilerLimits::default())
    }
}
