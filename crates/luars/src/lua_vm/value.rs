// Runtime value representation (§3 "Lua value" / §6.1).
// Grounded on the shape of the teacher's lua_value.rs (a closed enum of
// variants, `Rc` for shared heap objects) but stripped down to what this
// crate's stack VM actually needs to execute: no GC object pool, no
// userdata/thread variants, no integer/float subtype tagging beyond the two
// Rust number types.
//
// `Tuple` is specific to this crate: the compiler's multi-value semantics
// (§4.4 "multi-value expression") are represented at runtime as a Lua value
// in their own right, never exposed to Lua source but pervasive in the
// bytecode this crate's codegen emits (BUILD_TUPLE, UNPACK_EX, CALL_FUNCTION
// return values). Nothing in real Lua corresponds to it; see DESIGN.md.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;

use super::table::LuaTable;
use crate::lua_vm::code_object::CodeObject;

#[derive(Clone)]
pub enum LuaValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(SmolStr),
    Tuple(Rc<Vec<LuaValue>>),
    Table(Rc<RefCell<LuaTable>>),
    Function(Rc<LuaClosure>),
    Native(Rc<NativeFunction>),
    /// A nested prototype, loaded via `LOAD_CONST` as the operand to
    /// `MAKE_FUNCTION` (§4.5 point 6). Never a first-class Lua value; the
    /// codegen/interpreter pair is the only producer and consumer.
    Code(Rc<CodeObject>),
    /// The cell `LOAD_CLOSURE` pushes so `BUILD_TUPLE` can bundle it into a
    /// closure's free-variable tuple (§4.4 "Function construction"). Never
    /// observable from Lua source.
    Cell(Rc<RefCell<LuaValue>>),
    /// The cursor `GET_ITER` pushes over a tuple, consumed by `FOR_ITER`
    /// (§4.4 "Table constructors", trailing multi-value field spread). Only
    /// ever produced over a `Tuple` operand; never observable from Lua
    /// source.
    TupleIter(Rc<Vec<LuaValue>>, Rc<Cell<usize>>),
}

/// A compiled function paired with the free-variable cells it closed over,
/// in `cellvars ++ freevars` order (§4.4 "Function construction").
pub struct LuaClosure {
    pub code: Rc<CodeObject>,
    pub free: Vec<Rc<RefCell<LuaValue>>>,
}

pub struct NativeFunction {
    pub name: &'static str,
    pub arity_hint: Option<usize>,
    pub func: Box<dyn Fn(&[LuaValue]) -> Result<LuaValue, crate::error::RuntimeError>>,
}

impl LuaValue {
    pub fn truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LuaValue::Nil => "nil",
            LuaValue::Bool(_) => "boolean",
            LuaValue::Int(_) | LuaValue::Float(_) => "number",
            LuaValue::Str(_) => "string",
            LuaValue::Tuple(_) => "tuple",
            LuaValue::Table(_) => "table",
            LuaValue::Function(_) | LuaValue::Native(_) => "function",
            LuaValue::Code(_) => "code",
            LuaValue::Cell(_) => "cell",
            LuaValue::TupleIter(..) => "iterator",
        }
    }

    pub fn as_tuple(&self) -> Option<&[LuaValue]> {
        match self {
            LuaValue::Tuple(t) => Some(t),
            _ => None,
        }
    }

    /// Adjusts a possibly multi-valued result down to exactly one scalar
    /// (§4.4 "scalar context"): the first element of a tuple, or the value
    /// itself if it isn't one.
    pub fn first(self) -> LuaValue {
        match self {
            LuaValue::Tuple(t) => t.first().cloned().unwrap_or(LuaValue::Nil),
            other => other,
        }
    }
}

impl PartialEq for LuaValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LuaValue::Nil, LuaValue::Nil) => true,
            (LuaValue::Bool(a), LuaValue::Bool(b)) => a == b,
            (LuaValue::Int(a), LuaValue::Int(b)) => a == b,
            (LuaValue::Float(a), LuaValue::Float(b)) => a == b,
            (LuaValue::Int(a), LuaValue::Float(b)) | (LuaValue::Float(b), LuaValue::Int(a)) => {
                *a as f64 == *b
            }
            (LuaValue::Str(a), LuaValue::Str(b)) => a == b,
            (LuaValue::Tuple(a), LuaValue::Tuple(b)) => Rc::ptr_eq(a, b) || a == b,
            (LuaValue::Table(a), LuaValue::Table(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Function(a), LuaValue::Function(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Native(a), LuaValue::Native(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Code(a), LuaValue::Code(b)) => Rc::ptr_eq(a, b),
            (LuaValue::Cell(a), LuaValue::Cell(b)) => Rc::ptr_eq(a, b),
            (LuaValue::TupleIter(a, _), LuaValue::TupleIter(b, _)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Bool(b) => write!(f, "{b}"),
            LuaValue::Int(i) => write!(f, "{i}"),
            LuaValue::Float(n) => write!(f, "{n}"),
            LuaValue::Str(s) => write!(f, "{s:?}"),
            LuaValue::Tuple(t) => f.debug_list().entries(t.iter()).finish(),
            LuaValue::Table(_) => write!(f, "table: 0x{:012x}", self as *const _ as usize),
            LuaValue::Function(_) => write!(f, "function: 0x{:012x}", self as *const _ as usize),
            LuaValue::Native(n) => write!(f, "function: builtin '{}'", n.name),
            LuaValue::Code(c) => write!(f, "code: {}", c.name),
            LuaValue::Cell(_) => write!(f, "cell"),
            LuaValue::TupleIter(..) => write!(f, "iterator"),
        }
    }
}

impl fmt::Display for LuaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LuaValue::Nil => write!(f, "nil"),
            LuaValue::Bool(b) => write!(f, "{b}"),
            LuaValue::Int(i) => write!(f, "{i}"),
            LuaValue::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{n:.1}")
                } else {
                    write!(f, "{n}")
                }
            }
            LuaValue::Str(s) => write!(f, "{s}"),
            other => write!(f, "{other:?}"),
        }
    }
}
