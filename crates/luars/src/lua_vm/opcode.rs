// Stack-machine instruction set (§6.1 "target VM assumption").
// Named after the CPython opcodes the assembler targets rather than the
// teacher's register opcodes (lua_vm/opcode/mod.rs) — the instruction
// *format* (one opcode byte + one arg byte, EXTENDED_ARG-prefixed) and the
// enum-with-repr(u8) shape are kept from there.

/// One stack-machine opcode. Values are stable since `CodeObject::code` is
/// an opaque byte string the assembler controls end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    PopTop = 0,
    DupTop,
    RotTwo,
    RotThree,
    RotFour,

    LoadConst,
    LoadFast,
    StoreFast,
    LoadDeref,
    StoreDeref,
    LoadGlobal,
    StoreGlobal,
    LoadClosure,

    BinarySubscr,
    StoreSubscr,
    BinaryAdd,
    BinaryMultiply,
    CompareOp,

    BuildTuple,
    BuildTupleUnpack,
    UnpackEx,
    BuildMap,
    MapAdd,

    MakeFunction,
    CallFunction,
    CallFunctionEx,

    GetIter,
    ForIter,

    JumpAbsolute,
    PopJumpIfFalse,
    PopJumpIfTrue,
    JumpIfTrueOrPop,

    ReturnValue,

    ExtendedArg,
}

impl OpCode {
    /// Mirrors `dis.HAVE_ARGUMENT`: whether this opcode carries an operand
    /// byte (always emitted, but only meaningful for these).
    pub fn has_arg(self) -> bool {
        !matches!(
            self,
            OpCode::PopTop
                | OpCode::DupTop
                | OpCode::RotTwo
                | OpCode::RotThree
                | OpCode::RotFour
                | OpCode::BinarySubscr
                | OpCode::StoreSubscr
                | OpCode::BinaryAdd
                | OpCode::BinaryMultiply
                | OpCode::GetIter
                | OpCode::ReturnValue
        )
    }

    /// `dis.hasconst`: the operand indexes the constant pool.
    pub fn has_const(self) -> bool {
        matches!(self, OpCode::LoadConst)
    }

    /// `dis.hasjabs`: the operand is an absolute code offset.
    pub fn has_jabs(self) -> bool {
        matches!(
            self,
            OpCode::JumpAbsolute
                | OpCode::PopJumpIfFalse
                | OpCode::PopJumpIfTrue
                | OpCode::JumpIfTrueOrPop
        )
    }

    /// `dis.hasjrel`: the operand is a forward-relative code offset.
    pub fn has_jrel(self) -> bool {
        matches!(self, OpCode::ForIter)
    }

    pub fn is_jump(self) -> bool {
        self.has_jabs() || self.has_jrel()
    }

    /// Whether a branch from this opcode can fall through without jumping.
    /// `JUMP_ABSOLUTE` and `JUMP_IF_TRUE_OR_POP` aside, every conditional
    /// here has two successors; `resolve_stacksize` needs to know which.
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            OpCode::PopJumpIfFalse
                | OpCode::PopJumpIfTrue
                | OpCode::JumpIfTrueOrPop
                | OpCode::ForIter
        )
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::PopTop => "POP_TOP",
            OpCode::DupTop => "DUP_TOP",
            OpCode::RotTwo => "ROT_TWO",
            OpCode::RotThree => "ROT_THREE",
            OpCode::RotFour => "ROT_FOUR",
            OpCode::LoadConst => "LOAD_CONST",
            OpCode::LoadFast => "LOAD_FAST",
            OpCode::StoreFast => "STORE_FAST",
            OpCode::LoadDeref => "LOAD_DEREF",
            OpCode::StoreDeref => "STORE_DEREF",
            OpCode::LoadGlobal => "LOAD_GLOBAL",
            OpCode::StoreGlobal => "STORE_GLOBAL",
            OpCode::LoadClosure => "LOAD_CLOSURE",
            OpCode::BinarySubscr => "BINARY_SUBSCR",
            OpCode::StoreSubscr => "STORE_SUBSCR",
            OpCode::BinaryAdd => "BINARY_ADD",
            OpCode::BinaryMultiply => "BINARY_MULTIPLY",
            OpCode::CompareOp => "COMPARE_OP",
            OpCode::BuildTuple => "BUILD_TUPLE",
            OpCode::BuildTupleUnpack => "BUILD_TUPLE_UNPACK",
            OpCode::UnpackEx => "UNPACK_EX",
            OpCode::BuildMap => "BUILD_MAP",
            OpCode::MapAdd => "MAP_ADD",
            OpCode::MakeFunction => "MAKE_FUNCTION",
            OpCode::CallFunction => "CALL_FUNCTION",
            OpCode::CallFunctionEx => "CALL_FUNCTION_EX",
            OpCode::GetIter => "GET_ITER",
            OpCode::ForIter => "FOR_ITER",
            OpCode::JumpAbsolute => "JUMP_ABSOLUTE",
            OpCode::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            OpCode::PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            OpCode::JumpIfTrueOrPop => "JUMP_IF_TRUE_OR_POP",
            OpCode::ReturnValue => "RETURN_VALUE",
            OpCode::ExtendedArg => "EXTENDED_ARG",
        }
    }

    /// Net stack effect for a non-conditional opcode, given its resolved
    /// argument. `MAKE_FUNCTION`'s effect depends on its flag bits, the rest
    /// on arity encoded directly in the operand.
    ///
    /// Panics if called on a conditional opcode — use [`OpCode::branch_effect`].
    pub fn stack_effect(self, arg: u32) -> i32 {
        match self {
            OpCode::PopTop => -1,
            OpCode::DupTop => 1,
            OpCode::RotTwo | OpCode::RotThree | OpCode::RotFour => 0,
            OpCode::LoadConst => 1,
            OpCode::LoadFast => 1,
            OpCode::StoreFast => -1,
            OpCode::LoadDeref => 1,
            OpCode::StoreDeref => -1,
            OpCode::LoadGlobal => 1,
            OpCode::StoreGlobal => -1,
            OpCode::LoadClosure => 1,
            OpCode::BinarySubscr => -1,
            OpCode::StoreSubscr => -3,
            OpCode::BinaryAdd | OpCode::BinaryMultiply => -1,
            OpCode::CompareOp => -1,
            OpCode::BuildTuple => 1 - arg as i32,
            OpCode::BuildTupleUnpack => 1 - arg as i32,
            // Pops the one source tuple, pushes `before` elements. This
            // crate never uses the `after` (star-target) half CPython's
            // UNPACK_EX supports: every call site passes after=0 and wants
            // a plain fixed-arity destructure, not a middle "rest" list.
            OpCode::UnpackEx => (arg & 0xFF) as i32 - 1,
            OpCode::BuildMap => 1 - 2 * arg as i32,
            OpCode::MapAdd => -2,
            OpCode::MakeFunction => -1 - if arg == 0 { 0 } else { 1 },
            OpCode::CallFunction => -(arg as i32),
            OpCode::CallFunctionEx => {
                if arg & 1 != 0 {
                    -2
                } else {
                    -1
                }
            }
            OpCode::GetIter => 0,
            OpCode::ReturnValue => -1,
            OpCode::ExtendedArg => 0,
            OpCode::ForIter
            | OpCode::JumpAbsolute
            | OpCode::PopJumpIfFalse
            | OpCode::PopJumpIfTrue
            | OpCode::JumpIfTrueOrPop => {
                unreachable!("conditional opcode {:?} has no single stack effect", self)
            }
        }
    }

    /// (not-taken, taken) stack deltas for a conditional branch (§4.5 point 3).
    pub fn branch_effect(self) -> (i32, i32) {
        match self {
            OpCode::JumpIfTrueOrPop => (-1, 0),
            OpCode::PopJumpIfFalse => (-1, -1),
            OpCode::PopJumpIfTrue => (-1, -1),
            OpCode::ForIter => (1, -1),
            other => unreachable!("{:?} is not a conditional opcode", other),
        }
    }
}
