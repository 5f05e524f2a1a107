use crate::compiler::compile;
use crate::compiler::config::CompilerLimits;
use crate::lua_state::LuaState;
use crate::lua_vm::LuaValue;

fn run(src: &str) -> LuaValue {
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load(src, "<test>").expect("compile should succeed");
    state.call(&chunk, &[]).expect("chunk should run without error")
}

fn first(src: &str) -> LuaValue {
    run(src).first()
}

#[test]
fn hex_float_literal_decodes_mantissa_and_binary_exponent() {
    assert_eq!(first("return 0xFFp-2"), LuaValue::Float(63.75));
}

#[test]
fn empty_chunk_returns_true() {
    assert_eq!(first(""), LuaValue::Bool(true));
}

#[test]
fn multiple_assignment_from_varargs_swaps_via_a_temporary() {
    let code = r#"
        local function f(...)
            a, b = ...
            return b, a
        end
        return f(1, 2)
    "#;
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load(code, "<test>").unwrap();
    let result = state.call(&chunk, &[]).unwrap();
    assert_eq!(result.as_tuple().unwrap(), &[LuaValue::Int(2), LuaValue::Int(1)]);
}

#[test]
fn arithmetic_dispatches_through_operator_builtins() {
    assert_eq!(first("return 1 + 2 * 3"), LuaValue::Int(7));
    assert_eq!(first("return 10 / 4"), LuaValue::Float(2.5));
    assert_eq!(first("return 2 ^ 10"), LuaValue::Float(1024.0));
}

#[test]
fn string_concatenation() {
    assert_eq!(first(r#"return "a" .. "b" .. 1"#), LuaValue::Str("ab1".into()));
}

#[test]
fn if_then_else_takes_the_matching_branch() {
    assert_eq!(first("if 1 < 2 then return 'yes' else return 'no' end"), LuaValue::Str("yes".into()));
    assert_eq!(first("if 1 > 2 then return 'yes' else return 'no' end"), LuaValue::Str("no".into()));
}

#[test]
fn numeric_for_sums_a_range() {
    assert_eq!(first("local s = 0\nfor i = 1, 5 do s = s + i end\nreturn s"), LuaValue::Int(15));
}

#[test]
fn generic_for_follows_the_f_s_v_iterator_protocol() {
    let code = r#"
        local function iter(s, v)
            if v >= s then return end
            return v + 1
        end
        local sum = 0
        for x in iter, 3, 0 do
            sum = sum + x
        end
        return sum
    "#;
    assert_eq!(first(code), LuaValue::Int(6));
}

#[test]
fn table_constructor_spreads_a_trailing_multivalue_field() {
    let code = r#"
        local function two() return 2, 3 end
        local t = {1, two()}
        return t[1] + t[2] + t[3]
    "#;
    assert_eq!(first(code), LuaValue::Int(6));
}

#[test]
fn while_loop_accumulates() {
    assert_eq!(first("local i = 0\nlocal s = 0\nwhile i < 4 do s = s + i\ni = i + 1 end\nreturn s"), LuaValue::Int(6));
}

#[test]
fn repeat_until_runs_body_at_least_once() {
    assert_eq!(first("local i = 0\nrepeat i = i + 1 until i >= 3\nreturn i"), LuaValue::Int(3));
}

#[test]
fn function_closures_capture_outer_locals() {
    let code = r#"
        local function counter()
            local n = 0
            return function()
                n = n + 1
                return n
            end
        end
        local c = counter()
        c()
        c()
        return c()
    "#;
    assert_eq!(first(code), LuaValue::Int(3));
}

#[test]
fn varargs_are_collected_into_a_tuple() {
    let code = r#"
        local function f(...)
            return ...
        end
        return f(1, 2, 3)
    "#;
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load(code, "<test>").unwrap();
    let result = state.call(&chunk, &[]).unwrap();
    assert_eq!(result.as_tuple().unwrap(), &[LuaValue::Int(1), LuaValue::Int(2), LuaValue::Int(3)]);
}

#[test]
fn table_constructor_and_subscript() {
    assert_eq!(first("local t = {x = 1, y = 2}\nreturn t.x + t.y"), LuaValue::Int(3));
    assert_eq!(first("local t = {10, 20, 30}\nreturn t[2]"), LuaValue::Int(20));
}

#[test]
fn method_call_passes_self() {
    let code = r#"
        local t = {n = 5}
        function t:get() return self.n end
        return t:get()
    "#;
    assert_eq!(first(code), LuaValue::Int(5));
}

#[test]
fn compile_produces_a_disassemblable_code_object() {
    let code = compile("return 1", "<test>", CompilerLimits::default()).unwrap();
    assert!(code.disassemble().contains("RETURN_VALUE"));
}

#[test]
fn and_or_short_circuit() {
    assert_eq!(first("return false and (1/0)"), LuaValue::Bool(false));
    assert_eq!(first("return true or (1/0)"), LuaValue::Bool(true));
}
