use crate::compiler::parser;
use crate::compiler::scope::scope_visitor::ScopeVisitor;
use crate::compiler::scope::symbol::Symbol;
use crate::compiler::ast::{Expr, Stat};
use crate::compiler::config::CompilerLimits;

fn resolve(src: &str) -> crate::compiler::ast::File {
    let file = parser::parse("<test>", src).expect("parse should succeed");
    ScopeVisitor::new("<test>", CompilerLimits::default())
        .resolve_file(&file)
        .expect("scope resolution should succeed");
    file
}

#[test]
fn unbound_name_resolves_through_env() {
    let file = resolve("x = 1");
    let Stat::Assign { target, .. } = &file.body[0] else { panic!("expected Assign") };
    let Expr::Name(n) = &target[0] else { panic!("expected Name") };
    assert!(n.env.get());
}

#[test]
fn local_declaration_is_not_env_routed() {
    let file = resolve("local x = 1\nx = 2");
    let Stat::Assign { target, .. } = &file.body[1] else { panic!("expected Assign") };
    let Expr::Name(n) = &target[0] else { panic!("expected Name") };
    assert!(!n.env.get());
    assert!(matches!(n.symbol(), Symbol::Local(_)));
}

#[test]
fn nested_function_captures_outer_local_as_free() {
    let file = resolve("local x = 1\nlocal function f() return x end");
    let Stat::FunctionLocal { body, .. } = &file.body[1] else { panic!("expected FunctionLocal") };
    let Stat::Return { value, .. } = &body.body[0] else { panic!("expected Return") };
    let Expr::Name(n) = &value[0] else { panic!("expected Name") };
    assert!(matches!(n.symbol(), Symbol::Free(_)));
}

#[test]
fn binary_operator_gets_a_synthesized_global_symbol() {
    let file = resolve("return 1 + 2");
    let Stat::Return { value, .. } = &file.body[0] else { panic!("expected Return") };
    let Expr::BinOp(b) = &value[0] else { panic!("expected BinOp") };
    let sym = b.op_symbol.borrow();
    assert!(matches!(&*sym, Some(Symbol::Global(g)) if g.name() == ".b+"));
}

#[test]
fn too_many_locals_is_a_scope_error() {
    let limits = CompilerLimits { max_locals_per_function: 2, ..CompilerLimits::default() };
    let file = parser::parse("<test>", "local a = 1\nlocal b = 2\nlocal c = 3").unwrap();
    let err = ScopeVisitor::new("<test>", limits).resolve_file(&file).unwrap_err();
    assert_eq!(err.kind, crate::error::CompileErrorKind::Scope);
}

#[test]
fn function_nesting_beyond_limit_is_a_scope_error() {
    let limits = CompilerLimits { max_function_depth: 1, ..CompilerLimits::default() };
    let file = parser::parse("<test>", "local function f() local function g() end end").unwrap();
    let err = ScopeVisitor::new("<test>", limits).resolve_file(&file).unwrap_err();
    assert_eq!(err.kind, crate::error::CompileErrorKind::Scope);
}

#[test]
fn duplicate_label_in_the_same_block_is_a_scope_error() {
    let file = parser::parse("<test>", "::a::\n::a::").unwrap();
    let err = ScopeVisitor::new("<test>", CompilerLimits::default()).resolve_file(&file).unwrap_err();
    assert_eq!(err.kind, crate::error::CompileErrorKind::Scope);
    assert!(err.message.contains("already defined"));
}

#[test]
fn ellipsis_outside_a_vararg_function_is_a_scope_error() {
    let file = parser::parse("<test>", "function f() return ... end").unwrap();
    let err = ScopeVisitor::new("<test>", CompilerLimits::default()).resolve_file(&file).unwrap_err();
    assert_eq!(err.kind, crate::error::CompileErrorKind::Scope);
}
