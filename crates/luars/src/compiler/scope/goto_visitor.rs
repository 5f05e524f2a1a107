// Scope resolution, phase 2 (§4.3 phase 2).
// Translation of fml/compile/scope.py's `GotoVisitor`: walks the already-
// resolved tree looking only at `Goto`/`Label`/block-shaped statements,
// resolving each goto's jump target via `scope_find_label`.
//
// The Python source's GotoVisitor only descends into the body of
// `Function`/`FunctionLocal` statements, never into a `Lambda` expression —
// a goto/label pair inside an anonymous function literal would reach
// codegen with its jump target unset. This crate additionally walks
// expressions looking for embedded `Lambda` bodies so every function body
// gets its gotos resolved, regardless of whether it's named or anonymous.

use crate::compiler::ast::*;
use crate::error::{CompileError, CompileErrorKind, CompileResult};

use super::LabelLookup;

pub struct GotoVisitor<'a> {
    filename: &'a str,
}

impl<'a> GotoVisitor<'a> {
    pub fn new(filename: &'a str) -> Self {
        GotoVisitor { filename }
    }

    fn error(&self, pos: Pos, message: impl Into<String>) -> CompileError {
        CompileError::new(CompileErrorKind::Goto, self.filename, pos.line, message)
    }

    pub fn resolve_file(&self, file: &File) -> CompileResult<()> {
        self.visit_block(&file.body)
    }

    fn visit_function_body(&self, body: &FunctionBody) -> CompileResult<()> {
        self.visit_block(&body.body)
    }

    fn visit_block(&self, block: &Block) -> CompileResult<()> {
        for stat in block {
            self.visit_stat(stat)?;
        }
        Ok(())
    }

    fn visit_stat(&self, stat: &Stat) -> CompileResult<()> {
        match stat {
            Stat::Goto(goto) => self.visit_goto(goto),
            Stat::If { test, body, orelse, .. } => {
                self.visit_expr(test)?;
                self.visit_block(body)?;
                self.visit_block(orelse)
            }
            Stat::Block(body, _) => self.visit_block(body),
            Stat::While { test, body, .. } => {
                self.visit_expr(test)?;
                self.visit_block(body)
            }
            Stat::Repeat { body, test, .. } => {
                self.visit_block(body)?;
                self.visit_expr(test)
            }
            Stat::For(f) => {
                self.visit_expr(&f.start)?;
                self.visit_expr(&f.stop)?;
                self.visit_expr(&f.step)?;
                self.visit_block(&f.body)
            }
            Stat::ForEach(f) => {
                for e in &f.iter {
                    self.visit_expr(e)?;
                }
                self.visit_block(&f.body)
            }
            Stat::Function { name, body, .. } => {
                self.visit_expr(name)?;
                self.visit_function_body(body)
            }
            Stat::FunctionLocal { body, .. } => self.visit_function_body(body),
            Stat::Assign { target, value, .. } => {
                for e in value {
                    self.visit_expr(e)?;
                }
                for e in target {
                    self.visit_expr(e)?;
                }
                Ok(())
            }
            Stat::AssignLocal { value, .. } => {
                for e in value {
                    self.visit_expr(e)?;
                }
                Ok(())
            }
            Stat::CallStatement(call) => self.visit_call(call),
            Stat::Return { value, .. } => {
                for e in value {
                    self.visit_expr(e)?;
                }
                Ok(())
            }
            Stat::Label(_) | Stat::Break(_) => Ok(()),
        }
    }

    fn visit_call(&self, call: &CallExpr) -> CompileResult<()> {
        self.visit_expr(&call.func)?;
        for a in &call.args {
            self.visit_expr(a)?;
        }
        Ok(())
    }

    /// Walks expressions purely to find embedded `Lambda` bodies; nothing
    /// else in an expression can contain a statement.
    fn visit_expr(&self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Nil(_)
            | Expr::True(_)
            | Expr::False(_)
            | Expr::Number(..)
            | Expr::Str(..)
            | Expr::Ellipsis(_)
            | Expr::Name(_) => Ok(()),
            Expr::Subscript(s) => {
                self.visit_expr(&s.value)?;
                self.visit_expr(&s.index)
            }
            Expr::Attribute(a) => self.visit_expr(&a.value),
            Expr::Method(m) => self.visit_expr(&m.value),
            Expr::Call(c) => self.visit_call(c),
            Expr::Lambda(body) => self.visit_function_body(body),
            Expr::Table(t) => {
                for field in &t.fields {
                    match field {
                        TableField::Positional(e) => self.visit_expr(e)?,
                        TableField::Named(_, e) => self.visit_expr(e)?,
                        TableField::Keyed(k, v) => {
                            self.visit_expr(k)?;
                            self.visit_expr(v)?;
                        }
                    }
                }
                Ok(())
            }
            Expr::BinOp(b) => {
                self.visit_expr(&b.left)?;
                self.visit_expr(&b.right)
            }
            Expr::UnaryOp(u) => self.visit_expr(&u.operand),
        }
    }

    /// `GotoVisitor.visit(ast.Goto)`.
    fn visit_goto(&self, goto: &GotoStat) -> CompileResult<()> {
        let scope = goto
            .scope
            .borrow()
            .clone()
            .expect("Goto not visited by scope pass");
        match super::scope_find_label(&scope, &goto.target, goto.nlocals.get()) {
            LabelLookup::Found(token) => {
                *goto.resolved.borrow_mut() = Some(token);
                Ok(())
            }
            LabelLookup::CrossesLocal(name) => {
                Err(self.error(goto.pos, format!("jumps into the scope of local '{name}'")))
            }
            LabelLookup::NotFound => Err(self.error(goto.pos, format!("no visible label '{}'", goto.target))),
        }
    }
}
