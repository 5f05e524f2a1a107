// Compiled function prototype (§3 "Code object").
// Field set mirrors CPython's `types.CodeType`, the shape asm.py's
// `Assembler.build` constructs; field names are kept close to CPython's for
// readers tracing the pipeline, renamed to Rust case.

use std::rc::Rc;

use smol_str::SmolStr;

use super::value::LuaValue;

/// Subset of CPython's `CO_*` flags this crate's codegen actually sets.
/// Plain bit constants over a `u32`, the way the teacher's opcode module
/// favors const tables over a flags crate.
pub mod flags {
    pub const OPTIMIZED: u32 = 0x0001;
    pub const NEWLOCALS: u32 = 0x0002;
    pub const VARARGS: u32 = 0x0004;
    pub const NESTED: u32 = 0x0010;
    pub const NOFREE: u32 = 0x0040;
}

/// Where a declared local's value lives at runtime: a plain fast slot, or a
/// heap-allocated cell slot (because some inner function closes over it).
/// CPython derives this per-call from `co_cell2arg`; this crate's codegen
/// resolves it once at compile time instead and bakes it into the code
/// object, since the interpreter has no separate "frame setup" pass that
/// could re-derive it from names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSlot {
    Fast(u32),
    Cell(u32),
}

/// A fully assembled function: bytecode plus everything needed to execute
/// and disassemble it. Immutable once produced by the assembler.
pub struct CodeObject {
    pub argcount: u32,
    pub nlocals: u32,
    pub stacksize: u32,
    pub flags: u32,
    pub code: Vec<u8>,
    pub consts: Vec<LuaValue>,
    pub names: Vec<SmolStr>,
    pub varnames: Vec<SmolStr>,
    pub filename: Rc<str>,
    pub name: SmolStr,
    pub firstlineno: u32,
    pub lnotab: Vec<u8>,
    pub freevars: Vec<SmolStr>,
    pub cellvars: Vec<SmolStr>,
    /// Slot destination for each of the first `argcount` positional
    /// parameters, in declaration order.
    pub param_slots: Vec<ParamSlot>,
    /// Slot destination for the synthesized `...`/`__...__` local that
    /// collects the call's remaining positional arguments.
    pub vararg_slot: ParamSlot,
}

impl CodeObject {
    /// Maps a code offset to a source line using the lnotab encoding
    /// (§4.5 point 4): byte_incr/line_incr pairs, 0-255 each, relative to
    /// the previous recorded (offset, line).
    pub fn line_for_offset(&self, target_offset: u32) -> u32 {
        let mut offset = 0u32;
        let mut line = self.firstlineno;
        let mut i = 0;
        while i + 1 < self.lnotab.len() {
            let byte_incr = self.lnotab[i] as u32;
            let line_incr = self.lnotab[i + 1] as i32;
            if offset + byte_incr > target_offset {
                break;
            }
            offset += byte_incr;
            line = (line as i32 + signed_line_incr(line_incr)) as u32;
            i += 2;
        }
        line
    }

    pub fn disassemble(&self) -> String {
        crate::compiler::assembler::disassemble(self)
    }
}

fn signed_line_incr(byte: i32) -> i32 {
    if byte > 127 {
        byte - 256
    } else {
        byte
    }
}
