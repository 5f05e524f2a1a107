use crate::compiler::parser;
use crate::compiler::scope::goto_visitor::GotoVisitor;
use crate::compiler::scope::scope_visitor::ScopeVisitor;
use crate::compiler::config::CompilerLimits;
use crate::error::CompileErrorKind;

fn resolve(src: &str) -> crate::error::CompileResult<()> {
    let file = parser::parse("<test>", src).expect("parse should succeed");
    ScopeVisitor::new("<test>", CompilerLimits::default())
        .resolve_file(&file)
        .expect("scope resolution should succeed");
    GotoVisitor::new("<test>").resolve_file(&file)
}

#[test]
fn goto_forward_to_label_in_same_block_succeeds() {
    resolve("goto done\n::done::").expect("forward goto should resolve");
}

#[test]
fn goto_backward_to_label_succeeds() {
    resolve("::top::\ngoto top").expect("backward goto should resolve");
}

#[test]
fn goto_into_a_nested_block_is_invisible() {
    let err = resolve("goto inner\ndo ::inner:: end").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Goto);
}

#[test]
fn goto_to_undeclared_label_is_a_goto_error() {
    let err = resolve("goto nowhere").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Goto);
}

#[test]
fn goto_across_a_local_declaration_is_rejected() {
    let err = resolve("goto skip\nlocal x = 1\n::skip::").unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::Goto);
}
