use crate::compiler::lexer::{Lexer, TokenKind};

fn kinds(src: &str) -> Vec<TokenKind> {
    let mut lexer = Lexer::new("<test>", src);
    let mut out = Vec::new();
    while let Some(tok) = lexer.next_token().unwrap() {
        if tok.kind == TokenKind::Eof {
            break;
        }
        out.push(tok.kind);
    }
    out
}

#[test]
fn keywords_and_names() {
    assert_eq!(kinds("local x = 1"), vec![TokenKind::Local, TokenKind::Name, TokenKind::Assign, TokenKind::Number]);
}

#[test]
fn multi_char_operators_prefer_longest_match() {
    assert_eq!(kinds("a <= b"), vec![TokenKind::Name, TokenKind::Le, TokenKind::Name]);
    assert_eq!(kinds("a < b"), vec![TokenKind::Name, TokenKind::Lt, TokenKind::Name]);
    assert_eq!(kinds("a ~= b"), vec![TokenKind::Name, TokenKind::Ne, TokenKind::Name]);
    assert_eq!(kinds("a..b"), vec![TokenKind::Name, TokenKind::Concat, TokenKind::Name]);
    assert_eq!(kinds("..."), vec![TokenKind::Ellipsis]);
}

#[test]
fn short_strings_decode_escapes() {
    let mut lexer = Lexer::new("<test>", r#""a\nb\tc""#);
    let tok = lexer.next_token().unwrap().unwrap();
    assert_eq!(tok.kind, TokenKind::String);
    assert_eq!(tok.text, "a\nb\tc");
}

#[test]
fn long_bracket_strings_skip_leading_newline() {
    let mut lexer = Lexer::new("<test>", "[[\nhello]]");
    let tok = lexer.next_token().unwrap().unwrap();
    assert_eq!(tok.kind, TokenKind::LongString);
    assert_eq!(tok.text, "hello");
}

#[test]
fn long_bracket_strings_allow_level_padding() {
    let mut lexer = Lexer::new("<test>", "[==[a]]b]==]");
    let tok = lexer.next_token().unwrap().unwrap();
    assert_eq!(tok.kind, TokenKind::LongString);
    assert_eq!(tok.text, "a]]b");
}

#[test]
fn short_comments_are_skipped() {
    assert_eq!(kinds("-- comment\nlocal x"), vec![TokenKind::Local, TokenKind::Name]);
}

#[test]
fn long_comments_are_skipped() {
    assert_eq!(kinds("--[[ multi\nline ]] local x"), vec![TokenKind::Local, TokenKind::Name]);
}

#[test]
fn shebang_line_is_skipped() {
    assert_eq!(kinds("#!/usr/bin/env lua\nlocal x = 1"), vec![TokenKind::Local, TokenKind::Name, TokenKind::Assign, TokenKind::Number]);
}

#[test]
fn hex_and_decimal_numbers() {
    let mut lexer = Lexer::new("<test>", "0xFF 3.14 1e10");
    let a = lexer.next_token().unwrap().unwrap();
    let b = lexer.next_token().unwrap().unwrap();
    let c = lexer.next_token().unwrap().unwrap();
    assert_eq!((a.kind, a.text.as_str()), (TokenKind::Number, "0xFF"));
    assert_eq!((b.kind, b.text.as_str()), (TokenKind::Number, "3.14"));
    assert_eq!((c.kind, c.text.as_str()), (TokenKind::Number, "1e10"));
}

#[test]
fn unterminated_string_is_a_lex_error() {
    let mut lexer = Lexer::new("<test>", "\"abc");
    assert!(lexer.next_token().is_err());
}
