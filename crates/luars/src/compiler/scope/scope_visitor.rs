// Scope resolution, phase 1 (§4.3 phase 1).
// A direct translation of fml/compile/scope.py's `ScopeVisitor`, rewired
// onto this crate's unified `Scope`/`Symbol` model. Traversal order and the
// exact point at which each node's symbol table is swapped for a fresh one
// match the Python source line for line — see the docstring on each
// `visit_*` function for the corresponding Python method.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use smol_str::SmolStr;

use super::{scope_add, scope_declare_local, scope_find, scope_get_loopvar, scope_nlocals, LabelDecl, Scope};
use crate::compiler::ast::*;
use crate::compiler::assembler;
use crate::compiler::config::CompilerLimits;
use crate::error::{CompileError, CompileErrorKind, CompileResult};
use symbol::Symbol;

use super::symbol;

pub struct ScopeVisitor<'a> {
    filename: &'a str,
    limits: CompilerLimits,
    depth: Cell<usize>,
}

impl<'a> ScopeVisitor<'a> {
    pub fn new(filename: &'a str, limits: CompilerLimits) -> Self {
        ScopeVisitor {
            filename,
            limits,
            depth: Cell::new(0),
        }
    }

    fn error(&self, pos: Pos, message: impl Into<String>) -> CompileError {
        CompileError::new(CompileErrorKind::Scope, self.filename, pos.line, message)
    }

    /// `ScopeVisitor.visit(ast.File)`.
    pub fn resolve_file(&self, file: &File) -> CompileResult<()> {
        let scope = Scope::new_function(None);
        let env = scope_add(&scope, Symbol::new_global("_ENV"));
        scope.borrow().table.borrow_mut().insert("_ENV".into(), env);
        scope_declare_local(&scope, "...");
        self.visit_block(&file.body, &scope)?;
        self.check_locals(&scope, Pos::default())?;
        *file.symtable.borrow_mut() = Some(scope);
        Ok(())
    }

    fn check_locals(&self, scope: &Rc<RefCell<Scope>>, pos: Pos) -> CompileResult<()> {
        if scope_nlocals(scope) > self.limits.max_locals_per_function {
            return Err(self.error(pos, "too many local variables in function"));
        }
        Ok(())
    }

    /// Shared function-body entry for `Function`/`FunctionLocal`/`Lambda`
    /// (`ScopeVisitor.visit_function`). Depth-guarded per SPEC_FULL §1.1's
    /// `max_function_depth` knob.
    fn visit_function_body(&self, body: &FunctionBody, parent: &Rc<RefCell<Scope>>) -> CompileResult<()> {
        if self.depth.get() >= self.limits.max_function_depth {
            return Err(self.error(body.pos, "function nesting too deep"));
        }
        self.depth.set(self.depth.get() + 1);
        let scope = Scope::new_function(Some(parent.clone()));
        for name in &body.pars.names {
            scope_declare_local(&scope, name);
        }
        scope_declare_local(&scope, if body.pars.varargs { "..." } else { "__...__" });
        let result = self.visit_block(&body.body, &scope);
        self.depth.set(self.depth.get() - 1);
        result?;
        self.check_locals(&scope, body.pos)?;
        *body.symtable.borrow_mut() = Some(scope);
        Ok(())
    }

    fn visit_block(&self, block: &Block, scope: &Rc<RefCell<Scope>>) -> CompileResult<()> {
        for stat in block {
            self.visit_stat(stat, scope)?;
        }
        Ok(())
    }

    fn visit_stat(&self, stat: &Stat, scope: &Rc<RefCell<Scope>>) -> CompileResult<()> {
        match stat {
            Stat::Assign { target, value, .. } => {
                for e in value {
                    self.visit_expr(e, scope)?;
                }
                for e in target {
                    self.visit_expr(e, scope)?;
                }
                Ok(())
            }
            // `ScopeVisitor.visit(ast.AssignLocal)`: value resolved against
            // the *old* bindings before any target is declared, so
            // `local x = x` sees the outer `x`.
            Stat::AssignLocal { target, value, .. } => {
                for e in value {
                    self.visit_expr(e, scope)?;
                }
                for name in target {
                    scope_declare_local(scope, &name.id);
                }
                for name in target {
                    self.visit_name(name, scope);
                }
                Ok(())
            }
            Stat::CallStatement(call) => self.visit_call(call, scope),
            Stat::Label(label) => self.visit_label(label, scope),
            Stat::Goto(goto) => {
                *goto.scope.borrow_mut() = Some(scope.clone());
                goto.nlocals.set(scope_nlocals(scope));
                Ok(())
            }
            Stat::Block(body, _) => {
                let inner = Scope::new_block(scope.clone());
                self.visit_block(body, &inner)
            }
            Stat::While { test, body, .. } => {
                self.visit_expr(test, scope)?;
                let inner = Scope::new_loop_block(scope.clone());
                self.visit_block(body, &inner)
            }
            // `ScopeVisitor.visit(ast.Repeat)`: the test is resolved inside
            // the body's own block, so it can see locals the body declared.
            Stat::Repeat { body, test, .. } => {
                let inner = Scope::new_loop_block(scope.clone());
                self.visit_block(body, &inner)?;
                self.visit_expr(test, &inner)
            }
            Stat::If { test, body, orelse, .. } => {
                self.visit_expr(test, scope)?;
                let then_scope = Scope::new_block(scope.clone());
                self.visit_block(body, &then_scope)?;
                let else_scope = Scope::new_block(scope.clone());
                self.visit_block(orelse, &else_scope)
            }
            Stat::For(f) => self.visit_for(f, scope),
            Stat::ForEach(f) => self.visit_for_each(f, scope),
            Stat::Function { name, body, .. } => {
                self.visit_expr(name, scope)?;
                self.visit_function_body(body, scope)
            }
            // `ScopeVisitor.visit(ast.FunctionLocal)`: the name is declared
            // *before* entering the function body, so the function can
            // recurse through its own local binding.
            Stat::FunctionLocal { name, body, .. } => {
                scope_declare_local(scope, &name.id);
                self.visit_name(name, scope);
                self.visit_function_body(body, scope)
            }
            Stat::Return { value, .. } => {
                for e in value {
                    self.visit_expr(e, scope)?;
                }
                Ok(())
            }
            Stat::Break(pos) => {
                if scope.borrow().loop_depth == 0 {
                    return Err(self.error(*pos, "break outside a loop"));
                }
                Ok(())
            }
        }
    }

    /// `ScopeVisitor.visit(ast.Label)`.
    fn visit_label(&self, label: &LabelStat, scope: &Rc<RefCell<Scope>>) -> CompileResult<()> {
        if let Some(existing) = scope.borrow().labels.borrow().get(label.name.as_str()) {
            return Err(self.error(
                label.pos,
                format!("label '{}' already defined on line {}", label.name, existing.line),
            ));
        }
        let token = assembler::new_label();
        let nlocals = scope_nlocals(scope);
        scope.borrow().labels.borrow_mut().insert(
            SmolStr::new(&label.name),
            LabelDecl {
                nlocals,
                token: token.clone(),
                line: label.pos.line,
            },
        );
        *label.token.borrow_mut() = Some(token);
        Ok(())
    }

    /// `ScopeVisitor.visit(ast.For)`.
    fn visit_for(&self, f: &ForStat, scope: &Rc<RefCell<Scope>>) -> CompileResult<()> {
        let forprep = scope_add(scope, Symbol::new_global("forprep"));
        *f.forprep_symbol.borrow_mut() = Some(forprep);
        self.visit_expr(&f.start, scope)?;
        self.visit_expr(&f.stop, scope)?;
        self.visit_expr(&f.step, scope)?;
        *f.loopvar.borrow_mut() = Some(scope_get_loopvar(scope, 0));

        let inner = Scope::new_for_loop_block(scope.clone());
        scope_declare_local(&inner, &f.target.id);
        self.visit_name(&f.target, &inner);
        self.visit_block(&f.body, &inner)
    }

    /// `ScopeVisitor.visit(ast.ForEach)`.
    fn visit_for_each(&self, f: &ForEachStat, scope: &Rc<RefCell<Scope>>) -> CompileResult<()> {
        for e in &f.iter {
            self.visit_expr(e, scope)?;
        }
        *f.loopvar.borrow_mut() = Some(scope_get_loopvar(scope, 0));

        let inner = Scope::new_for_loop_block(scope.clone());
        for name in &f.target {
            scope_declare_local(&inner, &name.id);
        }
        for name in &f.target {
            self.visit_name(name, &inner);
        }
        self.visit_block(&f.body, &inner)
    }

    /// `ScopeVisitor.visit(ast.Name)`.
    fn visit_name(&self, name: &NameExpr, scope: &Rc<RefCell<Scope>>) {
        match scope_find(scope, &name.id) {
            Some(sym) => {
                name.env.set(false);
                *name.symbol.borrow_mut() = Some(sym);
            }
            None => {
                name.env.set(true);
                let env = scope_find(scope, "_ENV").expect("_ENV always bound by File");
                *name.symbol.borrow_mut() = Some(env);
            }
        }
    }

    fn visit_call(&self, call: &CallExpr, scope: &Rc<RefCell<Scope>>) -> CompileResult<()> {
        self.visit_expr(&call.func, scope)?;
        for a in &call.args {
            self.visit_expr(a, scope)?;
        }
        Ok(())
    }

    fn visit_expr(&self, expr: &Expr, scope: &Rc<RefCell<Scope>>) -> CompileResult<()> {
        match expr {
            Expr::Nil(_) | Expr::True(_) | Expr::False(_) | Expr::Number(..) | Expr::Str(..) => Ok(()),
            // `ScopeVisitor.visit(ast.ELLIPSIS)`: looked up directly in this
            // scope's own table, never inherited from an enclosing block.
            Expr::Ellipsis(e) => {
                let sym = scope.borrow().table.borrow().get("...").cloned();
                match sym {
                    Some(sym) => {
                        *e.symbol.borrow_mut() = Some(sym);
                        Ok(())
                    }
                    None => Err(self.error(e.pos, "cannot use '...' outside a vararg function")),
                }
            }
            Expr::Name(n) => {
                self.visit_name(n, scope);
                Ok(())
            }
            Expr::Subscript(s) => {
                self.visit_expr(&s.value, scope)?;
                self.visit_expr(&s.index, scope)
            }
            Expr::Attribute(a) => self.visit_expr(&a.value, scope),
            Expr::Method(m) => self.visit_expr(&m.value, scope),
            Expr::Call(c) => self.visit_call(c, scope),
            Expr::Lambda(body) => self.visit_function_body(body, scope),
            Expr::Table(t) => {
                let luatable = scope_add(scope, Symbol::new_global("LuaTable"));
                *t.luatable_symbol.borrow_mut() = Some(luatable);
                for field in &t.fields {
                    match field {
                        TableField::Positional(e) => self.visit_expr(e, scope)?,
                        TableField::Named(_, e) => self.visit_expr(e, scope)?,
                        TableField::Keyed(k, v) => {
                            self.visit_expr(k, scope)?;
                            self.visit_expr(v, scope)?;
                        }
                    }
                }
                Ok(())
            }
            Expr::BinOp(b) => {
                let op = scope_add(scope, Symbol::new_global(&format!(".b{}", b.op)));
                *b.op_symbol.borrow_mut() = Some(op);
                self.visit_expr(&b.left, scope)?;
                self.visit_expr(&b.right, scope)
            }
            Expr::UnaryOp(u) => {
                let op = scope_add(scope, Symbol::new_global(&format!(".u{}", u.op)));
                *u.op_symbol.borrow_mut() = Some(op);
                self.visit_expr(&u.operand, scope)
            }
        }
    }
}
