// Compiler configuration (§1.1 "Configuration").
// Mirrors lua_vm/safe_option.rs's `SafeOption`: a small Copy/Clone knob
// bundle threaded through the compiler instead of scattered magic numbers.

/// Guards against pathological input rather than modeling real Lua limits
/// precisely (`max_locals_per_function` happens to match Lua's own
/// `LUAI_MAXVARS`, but that's a convenience, not a compatibility promise).
#[derive(Debug, Clone, Copy)]
pub struct CompilerLimits {
    /// Nested `function`/`local function`/lambda depth guard.
    pub max_function_depth: usize,
    /// Upper bound on a single function's constant pool; the assembler's
    /// `EXTENDED_ARG` fixpoint (§4.5 point 2) handles growth beyond a byte,
    /// so this exists to catch runaway generated code rather than to cap a
    /// real program.
    pub max_constants: u32,
    /// Locals declared (cumulatively, across nested blocks) by one function.
    pub max_locals_per_function: usize,
}

impl Default for CompilerLimits {
    fn default() -> Self {
        CompilerLimits {
            max_function_depth: 200,
            max_constants: u32::MAX,
            max_locals_per_function: 200,
        }
    }
}
