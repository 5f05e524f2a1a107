use std::rc::Rc;

use crate::compiler::assembler::Assembler;
use crate::lua_vm::code_object::ParamSlot;
use crate::lua_vm::value::LuaValue;
use crate::lua_vm::{call_closure, LuaClosure, LuaTable};

fn build(asm: Assembler) -> crate::lua_vm::CodeObject {
    asm.build(
        0,
        Vec::new(),
        Vec::new(),
        Rc::from("<test>"),
        "chunk".into(),
        1,
        Vec::new(),
        Vec::new(),
        Vec::new(),
        ParamSlot::Fast(0),
    )
}

fn run(asm: Assembler) -> LuaValue {
    let code = Rc::new(build(asm));
    let closure = Rc::new(LuaClosure { code, free: Vec::new() });
    let globals = Rc::new(std::cell::RefCell::new(LuaTable::new()));
    call_closure(&closure, &[], &globals).expect("closure should run without error")
}

#[test]
fn load_const_and_return_roundtrips_a_value() {
    let mut asm = Assembler::new();
    asm.load_const(LuaValue::Int(42));
    asm.build_tuple(1);
    asm.return_value();
    let result = run(asm);
    assert_eq!(result.as_tuple().unwrap()[0], LuaValue::Int(42));
}

#[test]
fn forward_jump_over_a_load_is_taken() {
    let mut asm = Assembler::new();
    let skip = asm.label();
    asm.load_const(LuaValue::Bool(false));
    asm.pop_jump_if_true(&skip);
    asm.load_const(LuaValue::Int(1));
    let end = asm.label();
    asm.jump_absolute(&end);
    asm.place_label(skip);
    asm.load_const(LuaValue::Int(2));
    asm.place_label(end);
    asm.build_tuple(1);
    asm.return_value();
    let result = run(asm);
    assert_eq!(result.as_tuple().unwrap()[0], LuaValue::Int(1));
}

#[test]
fn extended_arg_is_emitted_for_large_constant_pool() {
    let mut asm = Assembler::new();
    for i in 0..300 {
        asm.load_const(LuaValue::Int(i));
        asm.pop_top();
    }
    asm.load_const(LuaValue::Int(299));
    asm.build_tuple(1);
    asm.return_value();
    let code = build(asm);
    assert!(code.code.len() > 300 * 2);
    let result = run_code(code);
    assert_eq!(result.as_tuple().unwrap()[0], LuaValue::Int(299));
}

fn run_code(code: crate::lua_vm::CodeObject) -> LuaValue {
    let closure = Rc::new(LuaClosure { code: Rc::new(code), free: Vec::new() });
    let globals = Rc::new(std::cell::RefCell::new(LuaTable::new()));
    call_closure(&closure, &[], &globals).expect("closure should run without error")
}

#[test]
fn disassemble_lists_every_opcode_mnemonic() {
    let mut asm = Assembler::new();
    asm.load_const(LuaValue::Int(1));
    asm.return_value();
    let code = build(asm);
    let text = code.disassemble();
    assert!(text.contains("LOAD_CONST"));
    assert!(text.contains("RETURN_VALUE"));
}
