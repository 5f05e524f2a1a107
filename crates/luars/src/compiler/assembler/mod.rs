// Bytecode assembler (§4.5 "Assembler").
// A close translation of fml/compile/asm.py's `Assembler` class: it is
// already close to pseudocode, so the five-pass structure (constants,
// offsets, stack depth, line table, code bytes) is kept pass-for-pass. The
// teacher has no equivalent module (its register VM has no separate
// assembly stage); the surrounding style — `Rc`-shared mutable handles,
// free functions over a flat instruction list — follows this crate's own
// `compiler::scope` module instead.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::lua_vm::code_object::{self, CodeObject, ParamSlot};
use crate::lua_vm::opcode::OpCode;
use crate::lua_vm::value::LuaValue;

/// Shared, as-yet-unresolved jump/label target. Cloned freely; every clone
/// refers to the same placement once `Assembler::place_label` is called.
pub type LabelToken = Rc<LabelInner>;

#[derive(Debug, Default)]
pub struct LabelInner {
    offset: Cell<Option<u32>>,
}

pub fn new_label() -> LabelToken {
    Rc::new(LabelInner::default())
}

#[derive(Clone, Copy)]
enum Arg {
    None,
    Raw(u32),
    Const(usize),
    Jump(usize), // index of the target Item::Label in `items`
}

struct Instruction {
    op: OpCode,
    arg: Arg,
    offset: Cell<u32>,
}

enum Item {
    Inst(Instruction),
    Label(LabelToken),
    Line(u32),
}

/// Accumulates one function body's instruction stream, then assembles it
/// into an immutable [`CodeObject`]. One `Assembler` per compiled function
/// (§4.4 "Function construction": "each function body compiles into its
/// own `Assembler`").
pub struct Assembler {
    items: Vec<Item>,
    consts: Vec<LuaValue>,
}

impl Assembler {
    pub fn new() -> Self {
        Assembler {
            items: Vec::new(),
            consts: Vec::new(),
        }
    }

    pub fn label(&self) -> LabelToken {
        new_label()
    }

    pub fn place_label(&mut self, label: LabelToken) {
        self.items.push(Item::Label(label));
    }

    pub fn line(&mut self, n: u32) {
        self.items.push(Item::Line(n));
    }

    fn push(&mut self, op: OpCode, arg: Arg) {
        self.items.push(Item::Inst(Instruction {
            op,
            arg,
            offset: Cell::new(0),
        }));
    }

    fn const_slot(&mut self, value: LuaValue) -> usize {
        for (i, c) in self.consts.iter().enumerate() {
            if *c == value {
                return i;
            }
        }
        self.consts.push(value);
        self.consts.len() - 1
    }

    // -- no-operand opcodes --------------------------------------------

    pub fn pop_top(&mut self) {
        self.push(OpCode::PopTop, Arg::None);
    }
    pub fn dup_top(&mut self) {
        self.push(OpCode::DupTop, Arg::None);
    }
    pub fn rot_two(&mut self) {
        self.push(OpCode::RotTwo, Arg::None);
    }
    pub fn rot_three(&mut self) {
        self.push(OpCode::RotThree, Arg::None);
    }
    pub fn rot_four(&mut self) {
        self.push(OpCode::RotFour, Arg::None);
    }
    pub fn binary_subscr(&mut self) {
        self.push(OpCode::BinarySubscr, Arg::None);
    }
    pub fn store_subscr(&mut self) {
        self.push(OpCode::StoreSubscr, Arg::None);
    }
    pub fn binary_add(&mut self) {
        self.push(OpCode::BinaryAdd, Arg::None);
    }
    pub fn binary_multiply(&mut self) {
        self.push(OpCode::BinaryMultiply, Arg::None);
    }
    pub fn get_iter(&mut self) {
        self.push(OpCode::GetIter, Arg::None);
    }
    pub fn return_value(&mut self) {
        self.push(OpCode::ReturnValue, Arg::None);
    }

    // -- raw-operand opcodes ---------------------------------------------

    pub fn load_fast(&mut self, slot: u32) {
        self.push(OpCode::LoadFast, Arg::Raw(slot));
    }
    pub fn store_fast(&mut self, slot: u32) {
        self.push(OpCode::StoreFast, Arg::Raw(slot));
    }
    pub fn load_deref(&mut self, slot: u32) {
        self.push(OpCode::LoadDeref, Arg::Raw(slot));
    }
    pub fn store_deref(&mut self, slot: u32) {
        self.push(OpCode::StoreDeref, Arg::Raw(slot));
    }
    pub fn load_global(&mut self, slot: u32) {
        self.push(OpCode::LoadGlobal, Arg::Raw(slot));
    }
    pub fn store_global(&mut self, slot: u32) {
        self.push(OpCode::StoreGlobal, Arg::Raw(slot));
    }
    pub fn load_closure(&mut self, slot: u32) {
        self.push(OpCode::LoadClosure, Arg::Raw(slot));
    }
    pub fn build_tuple(&mut self, n: u32) {
        self.push(OpCode::BuildTuple, Arg::Raw(n));
    }
    pub fn build_tuple_unpack(&mut self, n: u32) {
        self.push(OpCode::BuildTupleUnpack, Arg::Raw(n));
    }
    pub fn unpack_ex(&mut self, before: u32, after: u32) {
        self.push(OpCode::UnpackEx, Arg::Raw((before & 0xFF) | ((after & 0xFF) << 8)));
    }
    pub fn build_map(&mut self, n: u32) {
        self.push(OpCode::BuildMap, Arg::Raw(n));
    }
    pub fn map_add(&mut self, depth: u32) {
        self.push(OpCode::MapAdd, Arg::Raw(depth));
    }
    pub fn make_function(&mut self, flags: u32) {
        self.push(OpCode::MakeFunction, Arg::Raw(flags));
    }
    pub fn call_function(&mut self, argc: u32) {
        self.push(OpCode::CallFunction, Arg::Raw(argc));
    }
    pub fn call_function_ex(&mut self, flags: u32) {
        self.push(OpCode::CallFunctionEx, Arg::Raw(flags));
    }
    pub fn compare_op(&mut self, cmp: u32) {
        self.push(OpCode::CompareOp, Arg::Raw(cmp));
    }

    pub fn load_const(&mut self, value: LuaValue) {
        let slot = self.const_slot(value);
        self.push(OpCode::LoadConst, Arg::Const(slot));
    }

    // -- jumps -------------------------------------------------------------

    fn jump_to(&mut self, op: OpCode, target: &LabelToken) {
        let idx = self.index_of_label(target);
        self.push(op, Arg::Jump(idx));
    }

    pub fn jump_absolute(&mut self, target: &LabelToken) {
        self.jump_to(OpCode::JumpAbsolute, target);
    }
    pub fn pop_jump_if_false(&mut self, target: &LabelToken) {
        self.jump_to(OpCode::PopJumpIfFalse, target);
    }
    pub fn pop_jump_if_true(&mut self, target: &LabelToken) {
        self.jump_to(OpCode::PopJumpIfTrue, target);
    }
    pub fn jump_if_true_or_pop(&mut self, target: &LabelToken) {
        self.jump_to(OpCode::JumpIfTrueOrPop, target);
    }
    pub fn for_iter(&mut self, target: &LabelToken) {
        self.jump_to(OpCode::ForIter, target);
    }

    /// A jump target is resolved to the index of its `Item::Label` the
    /// first time it's referenced; placing the same label later (or having
    /// already placed it) both resolve to the same flat index.
    fn index_of_label(&mut self, target: &LabelToken) -> usize {
        for (i, item) in self.items.iter().enumerate() {
            if let Item::Label(l) = item {
                if Rc::ptr_eq(l, target) {
                    return i;
                }
            }
        }
        // Not placed yet: reserve its slot now so later `place_label` calls
        // for this same token share it. This mirrors the Python Label
        // object, which exists independent of its place in the stream.
        self.items.push(Item::Label(target.clone()));
        self.items.len() - 1
    }

    /// Runs all five passes and produces the immutable code object
    /// (§4.5 point 6, mirroring `asm.py`'s `Assembler.build`).
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        mut self,
        argcount: u32,
        names: Vec<SmolStr>,
        varnames: Vec<SmolStr>,
        filename: Rc<str>,
        name: SmolStr,
        firstlineno: u32,
        freevars: Vec<SmolStr>,
        cellvars: Vec<SmolStr>,
        param_slots: Vec<ParamSlot>,
        vararg_slot: ParamSlot,
    ) -> CodeObject {
        resolve_offsets(&mut self.items);
        let stacksize = resolve_stacksize(&self.items);
        let lnotab = assemble_lnotab(&self.items, firstlineno);
        let code = assemble_code(&self.items, &self.consts);

        let mut flags = code_object::flags::VARARGS | code_object::flags::OPTIMIZED | code_object::flags::NEWLOCALS;
        if freevars.is_empty() && cellvars.is_empty() {
            flags |= code_object::flags::NOFREE;
        } else if !freevars.is_empty() {
            flags |= code_object::flags::NESTED;
        }

        CodeObject {
            argcount,
            nlocals: (varnames.len() + cellvars.len()) as u32,
            stacksize,
            flags,
            code,
            consts: self.consts,
            names,
            varnames,
            filename,
            name,
            firstlineno,
            lnotab,
            freevars,
            cellvars,
            param_slots,
            vararg_slot,
        }
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------
// Pass 2: offset resolution
// ---------------------------------------------------------------------

fn extended_length(mut n: u32) -> u32 {
    let mut count = 0;
    while n > 0 {
        n >>= 8;
        count += 1;
    }
    count
}

fn get_arg(items: &[Item], i: usize, offset: u32) -> u32 {
    match items[i] {
        Item::Inst(ref inst) => match inst.arg {
            Arg::None => 0,
            Arg::Raw(n) => n,
            Arg::Const(slot) => slot as u32,
            Arg::Jump(target_idx) => {
                let op = inst.op;
                let target_offset = match &items[target_idx] {
                    Item::Label(l) => l.offset.get().unwrap_or(0),
                    _ => unreachable!("jump target index must point at a Label item"),
                };
                if op.has_jabs() {
                    target_offset
                } else {
                    debug_assert!(op.has_jrel());
                    let raw = target_offset as i64 - offset as i64;
                    if raw < 0 {
                        return 0;
                    }
                    let length = 2 * (extended_length((raw as u32) >> 8) + 1);
                    let arg = raw as u32;
                    if arg < length {
                        0
                    } else {
                        arg - length
                    }
                }
            }
        },
        _ => 0,
    }
}

fn length_of_inst(items: &[Item], i: usize, offset: u32) -> u32 {
    if !matches!(items[i], Item::Inst(_)) {
        return 0;
    }
    let arg = get_arg(items, i, offset);
    2 * (extended_length(arg >> 8) + 1)
}

fn assign_offsets(items: &[Item]) -> bool {
    let mut offset = 0u32;
    let mut stable = true;
    for i in 0..items.len() {
        match &items[i] {
            Item::Inst(inst) => {
                if inst.offset.get() != offset {
                    stable = false;
                }
                inst.offset.set(offset);
                offset += length_of_inst(items, i, offset);
            }
            Item::Label(l) => {
                if l.offset.get() != Some(offset) {
                    stable = false;
                }
                l.offset.set(Some(offset));
            }
            Item::Line(_) => {}
        }
    }
    stable
}

fn resolve_offsets(items: &mut [Item]) {
    while !assign_offsets(items) {}
}

// ---------------------------------------------------------------------
// Pass 3: stack depth
// ---------------------------------------------------------------------

fn resolve_stacksize(items: &[Item]) -> u32 {
    let mut max_stacksize: i32 = 0;
    let mut pending: Vec<(usize, i32)> = vec![(0, 0)];
    let mut visited_labels: HashMap<usize, i32> = HashMap::new();

    while let Some((start, start_depth)) = pending.pop() {
        let mut i = start;
        let mut depth = start_depth;

        if let Item::Label(_) = items[i] {
            if let Some(&seen) = visited_labels.get(&i) {
                assert_eq!(seen, depth, "inconsistent stack depth at label");
                continue;
            }
            visited_labels.insert(i, depth);
            i += 1;
        }

        loop {
            if i >= items.len() {
                break;
            }
            match &items[i] {
                Item::Label(_) => {
                    if let Some(&seen) = visited_labels.get(&i) {
                        assert_eq!(seen, depth, "inconsistent stack depth at label");
                    } else {
                        visited_labels.insert(i, depth);
                    }
                }
                Item::Line(_) => {}
                Item::Inst(inst) => {
                    if inst.op == OpCode::ReturnValue {
                        assert_eq!(depth, 1, "RETURN_VALUE must see stack depth 1");
                        break;
                    }
                    if inst.op == OpCode::JumpAbsolute {
                        let target_idx = match inst.arg {
                            Arg::Jump(t) => t,
                            _ => unreachable!(),
                        };
                        pending.push((target_idx, depth));
                        break;
                    }
                    if inst.op.is_conditional() {
                        let (not_taken, taken) = inst.op.branch_effect();
                        let target_idx = match inst.arg {
                            Arg::Jump(t) => t,
                            _ => unreachable!(),
                        };
                        let jump_depth = depth + taken;
                        pending.push((target_idx, jump_depth));
                        max_stacksize = max_stacksize.max(jump_depth);
                        depth += not_taken;
                    } else {
                        let arg = get_arg(items, i, inst.offset.get());
                        depth += inst.op.stack_effect(arg);
                    }
                }
            }
            i += 1;
            max_stacksize = max_stacksize.max(depth);
        }
    }

    max_stacksize.max(0) as u32
}

// ---------------------------------------------------------------------
// Pass 4: line table
// ---------------------------------------------------------------------

fn iter_line_incr(line_incr: i32, out: &mut Vec<u8>) {
    if line_incr > 0 {
        let mut remaining = line_incr;
        while remaining > 127 {
            out.push(127);
            remaining -= 127;
        }
        out.push(remaining as u8);
    } else {
        let mut remaining = line_incr;
        while remaining < -128 {
            out.push(128);
            remaining += 128;
        }
        out.push((256 + remaining) as u8);
    }
}

fn assemble_lnotab(items: &[Item], firstlineno: u32) -> Vec<u8> {
    let mut entries: Vec<(u32, u32)> = Vec::new();
    let mut current = firstlineno;
    let mut last = firstlineno;
    for item in items {
        match item {
            Item::Line(n) => current = *n,
            Item::Inst(inst) => {
                if current != last {
                    entries.push((inst.offset.get(), current));
                }
                last = current;
            }
            Item::Label(l) => {
                if current != last {
                    entries.push((l.offset.get().unwrap_or(0), current));
                }
                last = current;
            }
        }
    }

    let mut out = Vec::new();
    let mut last_offset = 0u32;
    let mut last_lineno = firstlineno;
    for (offset, lineno) in entries {
        let line_incr = lineno as i32 - last_lineno as i32;
        if line_incr == 0 {
            continue;
        }
        let mut byte_incr = offset as i32 - last_offset as i32;
        while byte_incr > 255 {
            out.push(255);
            out.push(0);
            byte_incr -= 255;
        }

        let mut incr_bytes = Vec::new();
        iter_line_incr(line_incr, &mut incr_bytes);
        out.push(byte_incr as u8);
        out.push(incr_bytes[0]);
        for b in &incr_bytes[1..] {
            out.push(0);
            out.push(*b);
        }

        last_offset = offset;
        last_lineno = lineno;
    }
    out
}

// ---------------------------------------------------------------------
// Pass 5: code emission
// ---------------------------------------------------------------------

fn assemble_code(items: &[Item], _consts: &[LuaValue]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let Item::Inst(inst) = item else { continue };
        let offset = inst.offset.get();
        let arg = get_arg(items, i, offset);
        let length = length_of_inst(items, i, offset) / 2;
        if length == 0 {
            continue;
        }
        for shift in (1..length).rev() {
            out.push(OpCode::ExtendedArg as u8);
            out.push(((arg >> (8 * shift)) & 0xFF) as u8);
        }
        out.push(inst.op as u8);
        out.push((arg & 0xFF) as u8);
    }
    out
}

/// Human-readable disassembly, used by [`CodeObject::disassemble`] and the
/// test suite; not part of the bytecode format itself.
pub fn disassemble(code: &CodeObject) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    let mut i = 0usize;
    let mut extended: u32 = 0;
    while i + 1 < code.code.len() {
        let byte = code.code[i];
        let arg_byte = code.code[i + 1] as u32;
        let arg = (extended << 8) | arg_byte;
        if byte == OpCode::ExtendedArg as u8 {
            extended = arg;
            i += 2;
            continue;
        }
        let line = code.line_for_offset(i as u32);
        let mnemonic = mnemonic_for(byte);
        let _ = writeln!(out, "{i:>4} {line:>4} {mnemonic} {arg}");
        extended = 0;
        i += 2;
    }
    out
}

fn mnemonic_for(byte: u8) -> &'static str {
    const ALL: &[OpCode] = &[
        OpCode::PopTop,
        OpCode::DupTop,
        OpCode::RotTwo,
        OpCode::RotThree,
        OpCode::RotFour,
        OpCode::LoadConst,
        OpCode::LoadFast,
        OpCode::StoreFast,
        OpCode::LoadDeref,
        OpCode::StoreDeref,
        OpCode::LoadGlobal,
        OpCode::StoreGlobal,
        OpCode::LoadClosure,
        OpCode::BinarySubscr,
        OpCode::StoreSubscr,
        OpCode::BinaryAdd,
        OpCode::BinaryMultiply,
        OpCode::CompareOp,
        OpCode::BuildTuple,
        OpCode::BuildTupleUnpack,
        OpCode::UnpackEx,
        OpCode::BuildMap,
        OpCode::MapAdd,
        OpCode::MakeFunction,
        OpCode::CallFunction,
        OpCode::CallFunctionEx,
        OpCode::GetIter,
        OpCode::ForIter,
        OpCode::JumpAbsolute,
        OpCode::PopJumpIfFalse,
        OpCode::PopJumpIfTrue,
        OpCode::JumpIfTrueOrPop,
        OpCode::ReturnValue,
        OpCode::ExtendedArg,
    ];
    ALL.iter()
        .find(|op| **op as u8 == byte)
        .map(|op| op.mnemonic())
        .unwrap_or("<bad opcode>")
}
