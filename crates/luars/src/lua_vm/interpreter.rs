// Bytecode interpreter (§1.1 "Minimal VM", §6.1 target-VM surface).
// Grounded on the teacher's `lua_vm/execute/mod.rs` dispatch-loop shape (a
// flat `match opcode` over a decoded instruction vector, a `Vec<LuaValue>`
// operand stack per call) but driving this crate's own CPython-style stack
// opcodes instead of the teacher's register set.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::code_object::{CodeObject, ParamSlot};
use super::opcode::OpCode;
use super::table::LuaTable;
use super::value::{LuaClosure, LuaValue, NativeFunction};
use crate::error::{RuntimeError, RuntimeResult};

/// Guards recursive `call_closure` against runaway Lua recursion; the
/// compiler has its own `max_function_depth` for nesting *definitions*, this
/// is the runtime analogue for nesting *calls*.
const MAX_CALL_DEPTH: u32 = 220;

/// One decoded instruction. `offset` is the byte offset of the first byte of
/// this instruction's encoding (including any `EXTENDED_ARG` prefix) — the
/// same value the assembler recorded as a jump target, so `index_of_offset`
/// keyed on it gives O(1) jump resolution.
struct Decoded {
    op: OpCode,
    arg: u32,
    offset: u32,
    len: u32,
}

fn opcode_from_u8(byte: u8) -> OpCode {
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
        .copied()
        .unwrap_or_else(|| panic!("bad opcode byte {byte}"))
}

/// Mirrors the assembler's own `EXTENDED_ARG` folding (`asm.py`/
/// `assembler::disassemble`), but keeps the *starting* offset of each folded
/// instruction rather than discarding it, since that's what jump operands
/// address.
fn decode(code: &[u8]) -> (Vec<Decoded>, HashMap<u32, usize>) {
    let mut out = Vec::new();
    let mut index_of_offset = HashMap::new();
    let mut i = 0usize;
    let mut extended = 0u32;
    let mut logical_start = 0usize;
    let mut at_start = true;
    while i + 1 < code.len() {
        if at_start {
            logical_start = i;
        }
        let byte = code[i];
        let arg_byte = code[i + 1] as u32;
        let arg = (extended << 8) | arg_byte;
        if byte == OpCode::ExtendedArg as u8 {
            extended = arg;
            at_start = false;
            i += 2;
            continue;
        }
        let op = opcode_from_u8(byte);
        let end = i + 2;
        let len = (end - logical_start) as u32;
        index_of_offset.insert(logical_start as u32, out.len());
        out.push(Decoded { op, arg, offset: logical_start as u32, len });
        extended = 0;
        at_start = true;
        i = end;
    }
    (out, index_of_offset)
}

/// One activation: its own operand stack, fast/cell slots, and deref array
/// (§"Frame/deref-array execution model"). `deref`'s first `cellvars.len()`
/// entries are fresh per call; the remainder are this closure's captured
/// free-variable cells, appended in the order `CodeObject::freevars` lists
/// them (matching how `scope_get_slots` numbers free slots after cell
/// slots).
struct Frame<'a> {
    code: &'a CodeObject,
    stack: Vec<LuaValue>,
    fast: Vec<LuaValue>,
    deref: Vec<Rc<RefCell<LuaValue>>>,
}

impl<'a> Frame<'a> {
    fn pop(&mut self) -> LuaValue {
        self.stack.pop().expect("stack underflow: codegen/assembler invariant violated")
    }

    fn push(&mut self, v: LuaValue) {
        self.stack.push(v);
    }
}

/// Runs one call to a compiled closure, returning whatever its `RETURN_VALUE`
/// produced (always a `Tuple`, per codegen's "every body ends in an explist
/// tuple" convention — §4.4 point 9).
pub fn call_closure(
    closure: &Rc<LuaClosure>,
    args: &[LuaValue],
    globals: &Rc<RefCell<LuaTable>>,
) -> RuntimeResult<LuaValue> {
    call_closure_depth(closure, args, globals, 0)
}

fn call_closure_depth(
    closure: &Rc<LuaClosure>,
    args: &[LuaValue],
    globals: &Rc<RefCell<LuaTable>>,
    depth: u32,
) -> RuntimeResult<LuaValue> {
    if depth >= MAX_CALL_DEPTH {
        return Err(RuntimeError::StackOverflow);
    }
    let code = &closure.code;
    let mut fast = vec![LuaValue::Nil; code.varnames.len()];
    let mut deref: Vec<Rc<RefCell<LuaValue>>> = (0..code.cellvars.len())
        .map(|_| Rc::new(RefCell::new(LuaValue::Nil)))
        .collect();
    deref.extend(closure.free.iter().cloned());

    for (i, slot) in code.param_slots.iter().enumerate() {
        let value = args.get(i).cloned().unwrap_or(LuaValue::Nil);
        match *slot {
            ParamSlot::Fast(s) => fast[s as usize] = value,
            ParamSlot::Cell(s) => *deref[s as usize].borrow_mut() = value,
        }
    }
    let extra: Vec<LuaValue> = if args.len() > code.param_slots.len() {
        args[code.param_slots.len()..].to_vec()
    } else {
        Vec::new()
    };
    let varargs = LuaValue::Tuple(Rc::new(extra));
    match code.vararg_slot {
        ParamSlot::Fast(s) => fast[s as usize] = varargs,
        ParamSlot::Cell(s) => *deref[s as usize].borrow_mut() = varargs,
    }

    let mut frame = Frame { code, stack: Vec::new(), fast, deref };
    run(&mut frame, globals, depth)
}

/// Calls either a Lua closure or a native, wrapping a native's scalar result
/// into a one-element tuple so both shapes are interchangeable at a
/// `CALL_FUNCTION_EX` call site (§4.4 point 8 / `CompiledChild` doc).
pub fn call_value(callee: &LuaValue, args: &[LuaValue], globals: &Rc<RefCell<LuaTable>>) -> RuntimeResult<LuaValue> {
    call_value_depth(callee, args, globals, 0)
}

fn call_value_depth(
    callee: &LuaValue,
    args: &[LuaValue],
    globals: &Rc<RefCell<LuaTable>>,
    depth: u32,
) -> RuntimeResult<LuaValue> {
    match callee {
        LuaValue::Function(c) => call_closure_depth(c, args, globals, depth + 1),
        LuaValue::Native(n) => (n.func)(args),
        _ => Err(RuntimeError::Undefined),
    }
}

fn subscript(container: &LuaValue, index: &LuaValue) -> LuaValue {
    match container {
        LuaValue::Table(t) => t.borrow().get(index),
        LuaValue::Tuple(items) => match index {
            LuaValue::Int(i) if *i >= 0 && (*i as usize) < items.len() => items[*i as usize].clone(),
            _ => LuaValue::Nil,
        },
        _ => LuaValue::Nil,
    }
}

fn store_subscript(container: &LuaValue, index: LuaValue, value: LuaValue) -> RuntimeResult<()> {
    match container {
        LuaValue::Table(t) => {
            t.borrow_mut().set(index, value);
            Ok(())
        }
        _ => Err(RuntimeError::TypeError),
    }
}

fn numeric_binop(a: &LuaValue, b: &LuaValue, int_op: fn(i64, i64) -> i64, float_op: fn(f64, f64) -> f64) -> RuntimeResult<LuaValue> {
    match (a, b) {
        (LuaValue::Int(x), LuaValue::Int(y)) => Ok(LuaValue::Int(int_op(*x, *y))),
        (LuaValue::Int(x), LuaValue::Float(y)) => Ok(LuaValue::Float(float_op(*x as f64, *y))),
        (LuaValue::Float(x), LuaValue::Int(y)) => Ok(LuaValue::Float(float_op(*x, *y as f64))),
        (LuaValue::Float(x), LuaValue::Float(y)) => Ok(LuaValue::Float(float_op(*x, *y))),
        _ => Err(RuntimeError::TypeError),
    }
}

fn run(frame: &mut Frame, globals: &Rc<RefCell<LuaTable>>, depth: u32) -> RuntimeResult<LuaValue> {
    let (decoded, index_of_offset) = decode(&frame.code.code);
    let jump_index = |offset: u32| -> usize {
        *index_of_offset
            .get(&offset)
            .unwrap_or_else(|| panic!("jump to unresolved offset {offset}"))
    };

    let mut pc: usize = 0;
    loop {
        let inst = &decoded[pc];
        match inst.op {
            OpCode::PopTop => {
                frame.pop();
            }
            OpCode::DupTop => {
                let top = frame.stack.last().expect("DUP_TOP on empty stack").clone();
                frame.push(top);
            }
            OpCode::RotTwo => {
                let n = frame.stack.len();
                frame.stack.swap(n - 1, n - 2);
            }
            OpCode::RotThree => {
                let n = frame.stack.len();
                frame.stack[n - 3..].rotate_right(1);
            }
            OpCode::RotFour => {
                let n = frame.stack.len();
                frame.stack[n - 4..].rotate_right(1);
            }
            OpCode::LoadConst => frame.push(frame.code.consts[inst.arg as usize].clone()),
            OpCode::LoadFast => frame.push(frame.fast[inst.arg as usize].clone()),
            OpCode::StoreFast => {
                let v = frame.pop();
                frame.fast[inst.arg as usize] = v;
            }
            OpCode::LoadDeref => frame.push(frame.deref[inst.arg as usize].borrow().clone()),
            OpCode::StoreDeref => {
                let v = frame.pop();
                *frame.deref[inst.arg as usize].borrow_mut() = v;
            }
            OpCode::LoadGlobal => {
                let name = &frame.code.names[inst.arg as usize];
                let v = globals.borrow().get(&LuaValue::Str(name.clone()));
                frame.push(v);
            }
            OpCode::StoreGlobal => {
                let name = frame.code.names[inst.arg as usize].clone();
                let v = frame.pop();
                globals.borrow_mut().set(LuaValue::Str(name), v);
            }
            OpCode::LoadClosure => frame.push(LuaValue::Cell(frame.deref[inst.arg as usize].clone())),
            OpCode::BinarySubscr => {
                let index = frame.pop();
                let container = frame.pop();
                frame.push(subscript(&container, &index));
            }
            OpCode::StoreSubscr => {
                let index = frame.pop();
                let container = frame.pop();
                let value = frame.pop();
                store_subscript(&container, index, value)?;
            }
            OpCode::BinaryAdd => {
                let b = frame.pop();
                let a = frame.pop();
                frame.push(numeric_binop(&a, &b, |x, y| x.wrapping_add(y), |x, y| x + y)?);
            }
            OpCode::BinaryMultiply => {
                let b = frame.pop();
                let a = frame.pop();
                frame.push(numeric_binop(&a, &b, |x, y| x.wrapping_mul(y), |x, y| x * y)?);
            }
            OpCode::CompareOp => {
                let b = frame.pop();
                let a = frame.pop();
                frame.push(LuaValue::Bool(a == b));
            }
            OpCode::BuildTuple => {
                let n = inst.arg as usize;
                let mut items = frame.stack.split_off(frame.stack.len() - n);
                items.shrink_to_fit();
                frame.push(LuaValue::Tuple(Rc::new(items)));
            }
            OpCode::BuildTupleUnpack => {
                let n = inst.arg as usize;
                let tuples = frame.stack.split_off(frame.stack.len() - n);
                let mut flat = Vec::new();
                for t in tuples {
                    match t {
                        LuaValue::Tuple(items) => flat.extend(items.iter().cloned()),
                        other => flat.push(other),
                    }
                }
                frame.push(LuaValue::Tuple(Rc::new(flat)));
            }
            OpCode::UnpackEx => {
                let before = (inst.arg & 0xFF) as usize;
                let source = frame.pop();
                let items: &[LuaValue] = source.as_tuple().unwrap_or(&[]);
                for i in (0..before).rev() {
                    frame.push(items.get(i).cloned().unwrap_or(LuaValue::Nil));
                }
            }
            OpCode::BuildMap => {
                let n = inst.arg as usize;
                let mut table = LuaTable::new();
                for _ in 0..n {
                    let value = frame.pop();
                    let key = frame.pop();
                    table.set(key, value);
                }
                frame.push(LuaValue::Table(Rc::new(RefCell::new(table))));
            }
            OpCode::MapAdd => {
                let key = frame.pop();
                let value = frame.pop();
                let idx = frame.stack.len() - inst.arg as usize;
                match &frame.stack[idx] {
                    LuaValue::Table(t) => t.borrow_mut().set(key, value),
                    _ => return Err(RuntimeError::TypeError),
                }
            }
            OpCode::MakeFunction => {
                let _qualname = frame.pop();
                let code_value = frame.pop();
                let code = match code_value {
                    LuaValue::Code(c) => c,
                    _ => return Err(RuntimeError::TypeError),
                };
                let free = if inst.arg == 0 {
                    Vec::new()
                } else {
                    let tuple = frame.pop();
                    match tuple {
                        LuaValue::Tuple(items) => items
                            .iter()
                            .map(|v| match v {
                                LuaValue::Cell(c) => c.clone(),
                                _ => panic!("MAKE_FUNCTION closure tuple held a non-cell value"),
                            })
                            .collect(),
                        _ => return Err(RuntimeError::TypeError),
                    }
                };
                frame.push(LuaValue::Function(Rc::new(LuaClosure { code, free })));
            }
            OpCode::CallFunction => {
                let argc = inst.arg as usize;
                let raw_args = frame.stack.split_off(frame.stack.len() - argc);
                let callee = frame.pop();
                let result = call_value_depth(&callee, &raw_args, globals, depth)?;
                frame.push(result);
            }
            OpCode::CallFunctionEx => {
                let args_tuple = frame.pop();
                let callee = frame.pop();
                let args: Vec<LuaValue> = args_tuple.as_tuple().map(|s| s.to_vec()).unwrap_or_default();
                let result = match &callee {
                    LuaValue::Function(c) => call_closure_depth(c, &args, globals, depth + 1)?,
                    LuaValue::Native(n) => LuaValue::Tuple(Rc::new(vec![(n.func)(&args)?])),
                    _ => return Err(RuntimeError::Undefined),
                };
                frame.push(result);
            }
            OpCode::GetIter => {
                let v = frame.pop();
                match v {
                    LuaValue::Tuple(items) => frame.push(LuaValue::TupleIter(items, Rc::new(Cell::new(0)))),
                    _ => return Err(RuntimeError::TypeError),
                }
            }
            OpCode::ForIter => {
                let (items, cursor) = match frame.stack.last() {
                    Some(LuaValue::TupleIter(items, cursor)) => (items.clone(), cursor.clone()),
                    _ => return Err(RuntimeError::TypeError),
                };
                let i = cursor.get();
                if i < items.len() {
                    cursor.set(i + 1);
                    frame.push(items[i].clone());
                    pc += 1;
                    continue;
                } else {
                    frame.pop();
                    pc = jump_index(inst.offset + inst.len + inst.arg);
                    continue;
                }
            }
            OpCode::JumpAbsolute => {
                pc = jump_index(inst.arg);
                continue;
            }
            OpCode::PopJumpIfFalse => {
                let v = frame.pop();
                if !v.truthy() {
                    pc = jump_index(inst.arg);
                    continue;
                }
            }
            OpCode::PopJumpIfTrue => {
                let v = frame.pop();
                if v.truthy() {
                    pc = jump_index(inst.arg);
                    continue;
                }
            }
            OpCode::JumpIfTrueOrPop => {
                let truthy = frame.stack.last().expect("JUMP_IF_TRUE_OR_POP on empty stack").truthy();
                if truthy {
                    pc = jump_index(inst.arg);
                    continue;
                } else {
                    frame.pop();
                }
            }
            OpCode::ReturnValue => return Ok(frame.pop()),
            OpCode::ExtendedArg => unreachable!("folded away by decode()"),
        }
        pc += 1;
    }
}
