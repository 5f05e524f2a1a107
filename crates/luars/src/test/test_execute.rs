use crate::compiler::config::CompilerLimits;
use crate::execute;
use crate::lua_state::LuaState;
use crate::lua_vm::LuaValue;

#[test]
fn execute_runs_a_chunk_end_to_end() {
    let result = execute("return 1 + 1", "<test>").unwrap();
    assert_eq!(result.first(), LuaValue::Int(2));
}

#[test]
fn tonumber_parses_decimal_hex_and_rejects_garbage() {
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state
        .load(
            r#"
            return tonumber("123"), tonumber("0x1A"), tonumber("3.5"), tonumber("nope"), tonumber("FF", 16)
        "#,
            "<test>",
        )
        .unwrap();
    let result = state.call(&chunk, &[]).unwrap();
    let values = result.as_tuple().unwrap();
    assert_eq!(values[0], LuaValue::Int(123));
    assert_eq!(values[1], LuaValue::Int(26));
    assert_eq!(values[2], LuaValue::Float(3.5));
    assert_eq!(values[3], LuaValue::Nil);
    assert_eq!(values[4], LuaValue::Int(255));
}

#[test]
fn tonumber_passes_through_an_existing_number() {
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load("return tonumber(42)", "<test>").unwrap();
    let result = state.call(&chunk, &[]).unwrap();
    assert_eq!(result.first(), LuaValue::Int(42));
}

#[test]
fn load_compiles_and_returns_a_callable_chunk() {
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load("return load('return 1 + 2')()", "<test>").unwrap();
    let result = state.call(&chunk, &[]).unwrap();
    assert_eq!(result.first(), LuaValue::Int(3));
}

#[test]
fn load_of_invalid_source_returns_nil() {
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load("return load('local = ')", "<test>").unwrap();
    let result = state.call(&chunk, &[]).unwrap();
    assert_eq!(result.first(), LuaValue::Nil);
}

#[test]
fn env_assignment_is_visible_through_g() {
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load("x = 10\nreturn _G.x", "<test>").unwrap();
    let result = state.call(&chunk, &[]).unwrap();
    assert_eq!(result.first(), LuaValue::Int(10));
}

#[test]
fn recursive_function_computes_factorial() {
    let code = r#"
        local function fact(n)
            if n <= 1 then return 1 end
            return n * fact(n - 1)
        end
        return fact(6)
    "#;
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load(code, "<test>").unwrap();
    let result = state.call(&chunk, &[]).unwrap();
    assert_eq!(result.first(), LuaValue::Int(720));
}
