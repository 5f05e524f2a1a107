// Hand-written recursive-descent + precedence-climbing parser (§4.2).
// Grounded on fml/compile/parse.py's SLY grammar (productions and the
// `precedence` table) but driven by this crate's own `Lexer`/`Token` cursor
// in the style of the teacher's `compiler/parser/mod.rs` (a `Parser` struct
// wrapping a token stream with `peek`/`bump`/`expect` helpers) rather than a
// parser-generator table.
//
// Method-call sugar (`obj:m(...)`), `elseif` desugaring into a nested `If`
// in the `orelse` block, and the implicit `self` parameter prepended to
// `function t:m(...)` declarations all follow `parse.py` exactly.

use crate::compiler::ast::*;
use crate::compiler::lexer::{Lexer, Token, TokenKind};
use crate::error::{CompileError, CompileErrorKind, CompileResult};

pub struct Parser<'a> {
    filename: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

/// Binary operator precedence, low to high, matching `parse.py`'s
/// `precedence` tuple. `..` is right-associative; so is `^`. Everything
/// else is left-associative.
fn binop_precedence(kind: TokenKind) -> Option<(u8, bool)> {
    use TokenKind::*;
    let (level, right_assoc) = match kind {
        Or => (1, false),
        And => (2, false),
        Lt | Gt | Le | Ge | Ne | Eq => (3, false),
        Pipe => (4, false),
        Tilde => (5, false),
        Amp => (6, false),
        Shl | Shr => (7, false),
        Concat => (8, true),
        Plus | Minus => (9, false),
        Star | Slash | Idiv | Percent => (10, false),
        Caret => (12, true),
        _ => return None,
    };
    Some((level, right_assoc))
}

/// `NOT`/`#`/unary `-`/`~` all bind at precedence 11, one above the
/// `+ - * / // %` tier and one below `^` (so `-x^2` parses as `-(x^2)`).
const UNARY_PRECEDENCE: u8 = 11;

fn binop_text(kind: TokenKind) -> &'static str {
    use TokenKind::*;
    match kind {
        Or => "or",
        And => "and",
        Lt => "<",
        Gt => ">",
        Le => "<=",
        Ge => ">=",
        Ne => "~=",
        Eq => "==",
        Pipe => "|",
        Tilde => "~",
        Amp => "&",
        Shl => "<<",
        Shr => ">>",
        Concat => "..",
        Plus => "+",
        Minus => "-",
        Star => "*",
        Slash => "/",
        Idiv => "//",
        Percent => "%",
        Caret => "^",
        _ => unreachable!("not a binary operator token"),
    }
}

impl<'a> Parser<'a> {
    pub fn parse(filename: &'a str, source: &str) -> CompileResult<File> {
        let mut lexer = Lexer::new(filename, source);
        let mut tokens = Vec::new();
        while let Some(tok) = lexer.next_token()? {
            tokens.push(tok);
        }
        let eof_line = tokens.last().map(|t| t.line).unwrap_or(1);
        let eof_index = tokens.last().map(|t| t.index).unwrap_or(0);
        tokens.push(Token::eof(eof_line, eof_index));

        let mut parser = Parser { filename, tokens, pos: 0 };
        let body = parser.block()?;
        parser.expect(TokenKind::Eof)?;
        Ok(File {
            body,
            symtable: std::cell::RefCell::new(None),
        })
    }

    fn cur(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn cur_pos(&self) -> Pos {
        Pos {
            line: self.cur().line,
            index: self.cur().index,
        }
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.cur().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(CompileErrorKind::Parse, self.filename, self.cur().line, message.into())
    }

    fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
        if self.at(kind) {
            Ok(self.bump())
        } else if self.at(TokenKind::Eof) {
            Err(self.error("premature EOF"))
        } else {
            Err(self.error(format!("Invalid token '{}'", self.cur().text_or_kind())))
        }
    }

    fn expect_name(&mut self) -> CompileResult<(String, Pos)> {
        let pos = self.cur_pos();
        let tok = self.expect(TokenKind::Name)?;
        Ok((tok.text, pos))
    }

    // ---- block / stat ---------------------------------------------------

    /// A block ends at a `return` statement, or at whatever follows-set
    /// token terminates the enclosing construct (`end`, `else`, `elseif`,
    /// `until`, `<eof>`).
    fn block_follows(&self) -> bool {
        matches!(
            self.cur().kind,
            TokenKind::Eof | TokenKind::End | TokenKind::Else | TokenKind::Elseif | TokenKind::Until
        )
    }

    fn block(&mut self) -> CompileResult<Block> {
        let mut stats = Vec::new();
        while !self.block_follows() {
            if self.at(TokenKind::Return) {
                stats.push(self.retstat()?);
                break;
            }
            if let Some(stat) = self.stat()? {
                stats.push(stat);
            }
        }
        Ok(stats)
    }

    /// Returns `None` for a bare `;` (an empty statement `parse.py` simply
    /// drops).
    fn stat(&mut self) -> CompileResult<Option<Stat>> {
        let pos = self.cur_pos();
        match self.cur().kind {
            TokenKind::Semi => {
                self.bump();
                Ok(None)
            }
            TokenKind::Label => Ok(Some(self.label_stat()?)),
            TokenKind::Break => {
                self.bump();
                Ok(Some(Stat::Break(pos)))
            }
            TokenKind::Goto => {
                self.bump();
                let (target, _) = self.expect_name()?;
                Ok(Some(Stat::Goto(GotoStat {
                    target,
                    pos,
                    scope: std::cell::RefCell::new(None),
                    nlocals: std::cell::Cell::new(0),
                    resolved: std::cell::RefCell::new(None),
                })))
            }
            TokenKind::Do => {
                self.bump();
                let body = self.block()?;
                self.expect(TokenKind::End)?;
                Ok(Some(Stat::Block(body, pos)))
            }
            TokenKind::While => {
                self.bump();
                let test = self.expr()?;
                self.expect(TokenKind::Do)?;
                let body = self.block()?;
                self.expect(TokenKind::End)?;
                Ok(Some(Stat::While { test, body, pos }))
            }
            TokenKind::Repeat => {
                self.bump();
                let body = self.block()?;
                self.expect(TokenKind::Until)?;
                let test = self.expr()?;
                Ok(Some(Stat::Repeat { body, test, pos }))
            }
            TokenKind::If => Ok(Some(self.if_stat()?)),
            TokenKind::For => Ok(Some(self.for_stat()?)),
            TokenKind::Function => Ok(Some(self.function_stat()?)),
            TokenKind::Local => Ok(Some(self.local_stat()?)),
            _ => Ok(Some(self.expr_stat()?)),
        }
    }

    fn retstat(&mut self) -> CompileResult<Stat> {
        let pos = self.cur_pos();
        self.bump(); // 'return'
        let value = if self.block_follows() || self.at(TokenKind::Semi) {
            Vec::new()
        } else {
            self.explist()?
        };
        self.eat(TokenKind::Semi);
        Ok(Stat::Return { value, pos })
    }

    fn label_stat(&mut self) -> CompileResult<Stat> {
        let pos = self.cur_pos();
        self.bump(); // '::'
        let (name, _) = self.expect_name()?;
        self.expect(TokenKind::Label)?;
        Ok(Stat::Label(LabelStat {
            name,
            pos,
            token: std::cell::RefCell::new(None),
        }))
    }

    /// `if exp then block {elseif exp then block} [else block] end`;
    /// `elseif` is desugared into a nested `If` placed in `orelse`, exactly
    /// as `parse.py`'s grammar does it (each `elseif` production wraps the
    /// remainder in its own `ast.If`).
    fn if_stat(&mut self) -> CompileResult<Stat> {
        let pos = self.cur_pos();
        self.bump(); // 'if'
        let test = self.expr()?;
        self.expect(TokenKind::Then)?;
        let body = self.block()?;
        let orelse = if self.at(TokenKind::Elseif) {
            let inner_pos = self.cur_pos();
            self.bump();
            let inner_test = self.expr()?;
            self.expect(TokenKind::Then)?;
            let inner_body = self.block()?;
            let inner_orelse = self.elseif_tail()?;
            vec![Stat::If {
                test: inner_test,
                body: inner_body,
                orelse: inner_orelse,
                pos: inner_pos,
            }]
        } else if self.eat(TokenKind::Else) {
            self.block()?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::End)?;
        Ok(Stat::If { test, body, orelse, pos })
    }

    fn elseif_tail(&mut self) -> CompileResult<Block> {
        if self.at(TokenKind::Elseif) {
            let pos = self.cur_pos();
            self.bump();
            let test = self.expr()?;
            self.expect(TokenKind::Then)?;
            let body = self.block()?;
            let orelse = self.elseif_tail()?;
            Ok(vec![Stat::If { test, body, orelse, pos }])
        } else if self.eat(TokenKind::Else) {
            self.block()
        } else {
            Ok(Vec::new())
        }
    }

    /// Numeric `for name = e,e[,e] do block end` or generic
    /// `for namelist in explist do block end`.
    fn for_stat(&mut self) -> CompileResult<Stat> {
        let pos = self.cur_pos();
        self.bump(); // 'for'
        let (first_name, first_pos) = self.expect_name()?;
        if self.eat(TokenKind::Assign) {
            let start = self.expr()?;
            self.expect(TokenKind::Comma)?;
            let stop = self.expr()?;
            let step = if self.eat(TokenKind::Comma) {
                self.expr()?
            } else {
                Expr::Number(pos, "1".to_string())
            };
            self.expect(TokenKind::Do)?;
            let body = self.block()?;
            self.expect(TokenKind::End)?;
            Ok(Stat::For(ForStat {
                target: NameExpr::new(first_name, first_pos),
                start,
                stop,
                step,
                body,
                pos,
                forprep_symbol: std::cell::RefCell::new(None),
                loopvar: std::cell::RefCell::new(None),
            }))
        } else {
            let mut target = vec![NameExpr::new(first_name, first_pos)];
            while self.eat(TokenKind::Comma) {
                let (name, name_pos) = self.expect_name()?;
                target.push(NameExpr::new(name, name_pos));
            }
            self.expect(TokenKind::In)?;
            let iter = self.explist()?;
            self.expect(TokenKind::Do)?;
            let body = self.block()?;
            self.expect(TokenKind::End)?;
            Ok(Stat::ForEach(ForEachStat {
                target,
                iter,
                body,
                pos,
                loopvar: std::cell::RefCell::new(None),
            }))
        }
    }

    /// `function funcname funcbody` / `local function Name funcbody`.
    /// `funcname` is `Name{.Name}[:Name]`; a trailing `:Name` prepends an
    /// implicit `self` parameter and the name target becomes a `Method`
    /// node rather than `Attribute`, matching `parse.py`'s `funcname`
    /// production.
    fn function_stat(&mut self) -> CompileResult<Stat> {
        let pos = self.cur_pos();
        self.bump(); // 'function'
        let (first, first_pos) = self.expect_name()?;
        let mut name: Expr = Expr::Name(NameExpr::new(first.clone(), first_pos));
        let mut debug_name = first;
        let mut is_method = false;
        loop {
            if self.eat(TokenKind::Dot) {
                let (attr, attr_pos) = self.expect_name()?;
                debug_name = attr.clone();
                name = Expr::Attribute(AttributeExpr {
                    value: Box::new(name),
                    attr,
                    pos: attr_pos,
                });
            } else if self.eat(TokenKind::Colon) {
                let (method, method_pos) = self.expect_name()?;
                debug_name = method.clone();
                name = Expr::Method(MethodExpr {
                    value: Box::new(name),
                    method,
                    pos: method_pos,
                });
                is_method = true;
                break;
            } else {
                break;
            }
        }
        let body = self.function_body(is_method, pos, debug_name)?;
        Ok(Stat::Function {
            name: Box::new(name),
            body,
            pos,
        })
    }

    /// `( [parlist] ) block end`, with an implicit leading `self` when
    /// `is_method` (method-call-sugar function declarations).
    fn function_body(&mut self, is_method: bool, pos: Pos, debug_name: impl Into<String>) -> CompileResult<FunctionBody> {
        self.expect(TokenKind::LParen)?;
        let mut names = Vec::new();
        if is_method {
            names.push("self".to_string());
        }
        let mut varargs = false;
        if !self.at(TokenKind::RParen) {
            loop {
                if self.eat(TokenKind::Ellipsis) {
                    varargs = true;
                    break;
                }
                let (name, _) = self.expect_name()?;
                names.push(name);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.block()?;
        self.expect(TokenKind::End)?;
        Ok(FunctionBody::new(Parameters { names, varargs }, body, pos, debug_name))
    }

    /// `local namelist [= explist]` or `local function Name funcbody`.
    fn local_stat(&mut self) -> CompileResult<Stat> {
        let pos = self.cur_pos();
        self.bump(); // 'local'
        if self.eat(TokenKind::Function) {
            let (name, name_pos) = self.expect_name()?;
            let body = self.function_body(false, pos, name.clone())?;
            return Ok(Stat::FunctionLocal {
                name: NameExpr::new(name, name_pos),
                body,
                pos,
            });
        }
        let mut target = Vec::new();
        loop {
            let (name, name_pos) = self.expect_name()?;
            self.skip_attrib()?;
            target.push(NameExpr::new(name, name_pos));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let value = if self.eat(TokenKind::Assign) {
            self.explist()?
        } else {
            Vec::new()
        };
        Ok(Stat::AssignLocal { target, value, pos })
    }

    /// Lua 5.4's `<const>`/`<close>` attribute syntax; accepted and
    /// discarded, since nothing downstream distinguishes attributed locals.
    fn skip_attrib(&mut self) -> CompileResult<()> {
        if self.eat(TokenKind::Lt) {
            self.expect(TokenKind::Name)?;
            self.expect(TokenKind::Gt)?;
        }
        Ok(())
    }

    /// A statement that starts with a `prefixexp`: either a bare call
    /// (`functioncall`) or an assignment (`varlist = explist`).
    fn expr_stat(&mut self) -> CompileResult<Stat> {
        let pos = self.cur_pos();
        let first = self.suffixed_expr()?;
        if self.at(TokenKind::Assign) || self.at(TokenKind::Comma) {
            let mut target = vec![first];
            while self.eat(TokenKind::Comma) {
                target.push(self.suffixed_expr()?);
            }
            self.expect(TokenKind::Assign)?;
            let value = self.explist()?;
            for t in &target {
                if !matches!(t, Expr::Name(_) | Expr::Subscript(_) | Expr::Attribute(_)) {
                    return Err(self.error("syntax error (cannot assign to this expression)"));
                }
            }
            Ok(Stat::Assign { target, value, pos })
        } else {
            match first {
                Expr::Call(call) => Ok(Stat::CallStatement(call)),
                _ => Err(self.error("syntax error (expression statement must be a function call)")),
            }
        }
    }

    // ---- expressions ------------------------------------------------------

    fn explist(&mut self) -> CompileResult<Vec<Expr>> {
        let mut list = vec![self.expr()?];
        while self.eat(TokenKind::Comma) {
            list.push(self.expr()?);
        }
        Ok(list)
    }

    fn expr(&mut self) -> CompileResult<Expr> {
        self.binary_expr(0)
    }

    /// Precedence-climbing binary operator parser; `min_prec` is the lowest
    /// precedence level this call is allowed to consume.
    fn binary_expr(&mut self, min_prec: u8) -> CompileResult<Expr> {
        let mut left = self.unary_expr()?;
        loop {
            let Some((prec, right_assoc)) = binop_precedence(self.cur().kind) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            let pos = self.cur_pos();
            let op = binop_text(self.bump().kind).to_string();
            let next_min = if right_assoc { prec } else { prec + 1 };
            let right = self.binary_expr(next_min)?;
            left = Expr::BinOp(BinOpExpr {
                op,
                left: Box::new(left),
                right: Box::new(right),
                pos,
                op_symbol: std::cell::RefCell::new(None),
            });
        }
        Ok(left)
    }

    /// `not exp | # exp | - exp | ~ exp | simpleexp`, unary operators
    /// binding at `UNARY_PRECEDENCE` (below `^`, above every other binop).
    fn unary_expr(&mut self) -> CompileResult<Expr> {
        let pos = self.cur_pos();
        let op = match self.cur().kind {
            TokenKind::Not => "not",
            TokenKind::Hash => "#",
            TokenKind::Minus => "-",
            TokenKind::Tilde => "~",
            _ => return self.pow_expr(),
        };
        self.bump();
        let operand = self.binary_expr(UNARY_PRECEDENCE)?;
        Ok(Expr::UnaryOp(UnaryOpExpr {
            op: op.to_string(),
            operand: Box::new(operand),
            pos,
            op_symbol: std::cell::RefCell::new(None),
        }))
    }

    /// `^` is right-associative and binds tighter than unary operators, so
    /// `simpleexp` feeds straight into the `^` tier before unary wraps it.
    fn pow_expr(&mut self) -> CompileResult<Expr> {
        let base = self.simple_expr()?;
        if self.at(TokenKind::Caret) {
            let pos = self.cur_pos();
            self.bump();
            let exponent = self.binary_expr(UNARY_PRECEDENCE)?;
            Ok(Expr::BinOp(BinOpExpr {
                op: "^".to_string(),
                left: Box::new(base),
                right: Box::new(exponent),
                pos,
                op_symbol: std::cell::RefCell::new(None),
            }))
        } else {
            Ok(base)
        }
    }

    /// `nil | true | false | NUMBER | STRING | ... | functiondef | prefixexp
    /// | tableconstructor`.
    fn simple_expr(&mut self) -> CompileResult<Expr> {
        let pos = self.cur_pos();
        match self.cur().kind {
            TokenKind::Nil => {
                self.bump();
                Ok(Expr::Nil(pos))
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::True(pos))
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::False(pos))
            }
            TokenKind::Number => {
                let text = self.bump().text;
                Ok(Expr::Number(pos, text))
            }
            TokenKind::String | TokenKind::LongString => {
                let text = self.bump().text;
                Ok(Expr::Str(pos, text))
            }
            TokenKind::Ellipsis => {
                self.bump();
                Ok(Expr::Ellipsis(EllipsisExpr {
                    pos,
                    symbol: std::cell::RefCell::new(None),
                }))
            }
            TokenKind::Function => {
                self.bump();
                let body = self.function_body(false, pos, "<anonymous>")?;
                Ok(Expr::Lambda(body))
            }
            TokenKind::LBrace => self.table_constructor(),
            _ => self.suffixed_expr(),
        }
    }

    /// `var | functioncall | '(' exp ')'`, with any trailing `.Name`,
    /// `[exp]`, `:Name args`, or `args` suffixes folded in left to right.
    fn primary_expr(&mut self) -> CompileResult<Expr> {
        let pos = self.cur_pos();
        if self.eat(TokenKind::LParen) {
            let inner = self.expr()?;
            self.expect(TokenKind::RParen)?;
            // A parenthesized multi-value expression is truncated to its
            // first value; §4.4 models this with the same scalar-adjust
            // path used everywhere else, so no extra node is needed here
            // beyond the fact that callers never re-flatten a bare Call.
            Ok(inner)
        } else {
            let (name, _) = self.expect_name()?;
            Ok(Expr::Name(NameExpr::new(name, pos)))
        }
    }

    fn suffixed_expr(&mut self) -> CompileResult<Expr> {
        let mut expr = self.primary_expr()?;
        loop {
            let pos = self.cur_pos();
            match self.cur().kind {
                TokenKind::Dot => {
                    self.bump();
                    let (attr, _) = self.expect_name()?;
                    expr = Expr::Attribute(AttributeExpr {
                        value: Box::new(expr),
                        attr,
                        pos,
                    });
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Subscript(SubscriptExpr {
                        value: Box::new(expr),
                        index: Box::new(index),
                        pos,
                    });
                }
                TokenKind::Colon => {
                    self.bump();
                    let (method, _) = self.expect_name()?;
                    let method_expr = Expr::Method(MethodExpr {
                        value: Box::new(expr),
                        method,
                        pos,
                    });
                    let args = self.call_args()?;
                    expr = Expr::Call(CallExpr {
                        func: Box::new(method_expr),
                        args,
                        pos,
                    });
                }
                TokenKind::LParen | TokenKind::LBrace | TokenKind::String | TokenKind::LongString => {
                    let args = self.call_args()?;
                    expr = Expr::Call(CallExpr {
                        func: Box::new(expr),
                        args,
                        pos,
                    });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// `args ::= '(' [explist] ')' | tableconstructor | STRING`, Lua's
    /// call-sugar for a single table or string literal argument.
    fn call_args(&mut self) -> CompileResult<Vec<Expr>> {
        match self.cur().kind {
            TokenKind::LParen => {
                self.bump();
                let args = if self.at(TokenKind::RParen) {
                    Vec::new()
                } else {
                    self.explist()?
                };
                self.expect(TokenKind::RParen)?;
                Ok(args)
            }
            TokenKind::LBrace => Ok(vec![self.table_constructor()?]),
            TokenKind::String | TokenKind::LongString => {
                let pos = self.cur_pos();
                let text = self.bump().text;
                Ok(vec![Expr::Str(pos, text)])
            }
            _ => Err(self.error("function arguments expected")),
        }
    }

    /// `'{' [fieldlist] '}'`; `fieldlist ::= field {fieldsep field}
    /// [fieldsep]`, `fieldsep ::= ',' | ';'`.
    fn table_constructor(&mut self) -> CompileResult<Expr> {
        let pos = self.cur_pos();
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.at(TokenKind::RBrace) {
            fields.push(self.table_field()?);
            if !self.eat(TokenKind::Comma) && !self.eat(TokenKind::Semi) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Expr::Table(TableExpr {
            fields,
            pos,
            luatable_symbol: std::cell::RefCell::new(None),
        }))
    }

    /// `'[' exp ']' '=' exp | Name '=' exp | exp`.
    fn table_field(&mut self) -> CompileResult<TableField> {
        if self.eat(TokenKind::LBracket) {
            let key = self.expr()?;
            self.expect(TokenKind::RBracket)?;
            self.expect(TokenKind::Assign)?;
            let value = self.expr()?;
            Ok(TableField::Keyed(key, value))
        } else if self.at(TokenKind::Name) && self.tokens[self.pos + 1].kind == TokenKind::Assign {
            let (name, _) = self.expect_name()?;
            self.bump(); // '='
            let value = self.expr()?;
            Ok(TableField::Named(name, value))
        } else {
            Ok(TableField::Positional(self.expr()?))
        }
    }
}

trait TokenTextOrKind {
    fn text_or_kind(&self) -> String;
}

impl TokenTextOrKind for Token {
    fn text_or_kind(&self) -> String {
        if self.text.is_empty() {
            self.kind.describe().to_string()
        } else {
            self.text.clone()
        }
    }
}

pub fn parse(filename: &str, source: &str) -> CompileResult<File> {
    Parser::parse(filename, source)
}
