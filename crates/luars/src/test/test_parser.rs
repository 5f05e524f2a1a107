use crate::compiler::ast::{Expr, Stat};
use crate::compiler::parser;

fn parse_ok(src: &str) -> crate::compiler::ast::File {
    parser::parse("<test>", src).expect("parse should succeed")
}

#[test]
fn local_assignment() {
    let file = parse_ok("local x = 1 + 2");
    assert_eq!(file.body.len(), 1);
    match &file.body[0] {
        Stat::AssignLocal { target, value, .. } => {
            assert_eq!(target.len(), 1);
            assert_eq!(target[0].id, "x");
            assert_eq!(value.len(), 1);
            assert!(matches!(&value[0], Expr::BinOp(_)));
        }
        other => panic!("expected AssignLocal, got {other:?}"),
    }
}

#[test]
fn binop_precedence_addition_over_multiplication() {
    let file = parse_ok("return 1 + 2 * 3");
    let Stat::Return { value, .. } = &file.body[0] else { panic!("expected Return") };
    let Expr::BinOp(top) = &value[0] else { panic!("expected BinOp") };
    assert_eq!(top.op, "+");
    assert!(matches!(&*top.right, Expr::BinOp(inner) if inner.op == "*"));
}

#[test]
fn unary_minus_binds_tighter_than_binary_but_looser_than_power() {
    let file = parse_ok("return -x^2");
    let Stat::Return { value, .. } = &file.body[0] else { panic!("expected Return") };
    let Expr::UnaryOp(u) = &value[0] else { panic!("expected UnaryOp") };
    assert_eq!(u.op, "-");
    assert!(matches!(&*u.operand, Expr::BinOp(inner) if inner.op == "^"));
}

#[test]
fn concat_is_right_associative() {
    let file = parse_ok(r#"return "a" .. "b" .. "c""#);
    let Stat::Return { value, .. } = &file.body[0] else { panic!("expected Return") };
    let Expr::BinOp(top) = &value[0] else { panic!("expected BinOp") };
    assert!(matches!(&*top.right, Expr::BinOp(_)));
    assert!(matches!(&*top.left, Expr::Str(..)));
}

#[test]
fn prefix_expression_chain() {
    let file = parse_ok("a.b[c]:m(1, 2)");
    let Stat::CallStatement(call) = &file.body[0] else { panic!("expected CallStatement") };
    assert_eq!(call.args.len(), 2);
    match &*call.func {
        Expr::Method(m) => {
            assert_eq!(m.method, "m");
            assert!(matches!(&*m.value, Expr::Subscript(_)));
        }
        other => panic!("expected Method, got {other:?}"),
    }
}

#[test]
fn method_definition_gets_implicit_self() {
    let file = parse_ok("function t:m(a) return a end");
    let Stat::Function { body, .. } = &file.body[0] else { panic!("expected Function") };
    assert_eq!(body.pars.names.first().map(String::as_str), Some("self"));
}

#[test]
fn elseif_desugars_to_nested_if() {
    let file = parse_ok("if a then elseif b then else end");
    let Stat::If { orelse, .. } = &file.body[0] else { panic!("expected If") };
    assert_eq!(orelse.len(), 1);
    assert!(matches!(orelse[0], Stat::If { .. }));
}

#[test]
fn return_must_be_last_statement_in_block() {
    let err = parser::parse("<test>", "return 1\nlocal x = 2").unwrap_err();
    assert_eq!(err.kind, crate::error::CompileErrorKind::Parse);
}

#[test]
fn call_as_statement_requires_call_expression() {
    let err = parser::parse("<test>", "a + b").unwrap_err();
    assert_eq!(err.kind, crate::error::CompileErrorKind::Parse);
}

#[test]
fn unexpected_token_is_a_syntax_error() {
    let err = parser::parse("<test>", "local = 1").unwrap_err();
    assert_eq!(err.kind, crate::error::CompileErrorKind::Parse);
}
