use crate::compiler::compile;
use crate::compiler::config::CompilerLimits;
use crate::error::{CompileErrorKind, RuntimeError};
use crate::lua_state::LuaState;

fn err_kind(src: &str) -> CompileErrorKind {
    compile(src, "<test>", CompilerLimits::default()).unwrap_err().kind
}

#[test]
fn lex_error_on_unterminated_string() {
    assert_eq!(err_kind("local x = \"abc"), CompileErrorKind::Lex);
}

#[test]
fn parse_error_on_malformed_statement() {
    assert_eq!(err_kind("local = 1"), CompileErrorKind::Parse);
}

#[test]
fn scope_error_on_break_outside_loop() {
    assert_eq!(err_kind("break"), CompileErrorKind::Scope);
}

#[test]
fn break_directly_inside_a_numeric_for_loop_is_valid() {
    compile("for i = 1, 10 do break end", "<test>", CompilerLimits::default())
        .expect("break inside a numeric for loop must compile");
}

#[test]
fn break_directly_inside_a_generic_for_loop_is_valid() {
    compile("for k, v in pairs do break end", "<test>", CompilerLimits::default())
        .expect("break inside a generic for loop must compile");
}

#[test]
fn goto_error_on_unresolved_label() {
    assert_eq!(err_kind("goto nowhere"), CompileErrorKind::Goto);
}

#[test]
fn parse_error_message_names_the_offending_token() {
    let err = compile(")", "<test>", CompilerLimits::default()).unwrap_err();
    assert_eq!(err.message, "Invalid token ')'");
}

#[test]
fn parse_error_on_premature_eof_is_reported_as_eof() {
    let err = compile("local x = ", "<test>", CompilerLimits::default()).unwrap_err();
    assert_eq!(err.message, "premature EOF");
}

#[test]
fn compile_error_display_includes_filename_and_line() {
    let err = compile("local = 1", "chunk.lua", CompilerLimits::default()).unwrap_err();
    let text = format!("{err}");
    assert!(text.starts_with("chunk.lua:"));
}

#[test]
fn calling_a_non_function_value_is_a_runtime_undefined_error() {
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load("local x = 1\nreturn x()", "<test>").unwrap();
    let err = state.call(&chunk, &[]).unwrap_err();
    assert_eq!(err, RuntimeError::Undefined);
}

#[test]
fn indexing_a_number_is_a_runtime_type_error() {
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load("local x = 1\nreturn x.y", "<test>").unwrap();
    let result = state.call(&chunk, &[]).unwrap();
    assert_eq!(result.first(), crate::lua_vm::LuaValue::Nil);
}

#[test]
fn storing_into_a_non_table_is_a_runtime_type_error() {
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load("local x = 1\nx.y = 2", "<test>").unwrap();
    let err = state.call(&chunk, &[]).unwrap_err();
    assert_eq!(err, RuntimeError::TypeError);
}

#[test]
fn unbounded_recursion_hits_the_call_depth_guard() {
    let code = r#"
        local function loop(n)
            return loop(n + 1)
        end
        return loop(0)
    "#;
    let state = LuaState::new(CompilerLimits::default());
    state.loadlibs();
    let chunk = state.load(code, "<test>").unwrap();
    let err = state.call(&chunk, &[]).unwrap_err();
    assert_eq!(err, RuntimeError::StackOverflow);
}
