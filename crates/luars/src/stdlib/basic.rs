// Basic library (§6.2 "Library contract (minimum)").
// Grounded on fml/lib/base.py's `BUILTINS` dict and `luaopen` for *which*
// names this crate must provide and where each one lives (the synthetic
// `.b<op>`/`forprep`/`LuaTable` names are process-wide builtins reached via
// `LOAD_GLOBAL`, never through `_ENV`; `tonumber`/`load`/`loadfile` are
// ordinary Lua globals reached through `_ENV` subscript, same split the
// teacher's `stdlib/basic.rs` draws between the interpreter's builtin table
// and `_G`). Arithmetic/comparison semantics follow real Lua 5.3 rather than
// `base.py`'s acknowledged stubs (`eq_event` always returns `None`, `sub`/
// `div`/`..`/bitwise operators are absent entirely) since this crate's own
// test suite needs them to actually work end to end.

use std::cell::RefCell;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::compiler::config::CompilerLimits;
use crate::error::RuntimeError;
use crate::lua_vm::{LuaClosure, LuaTable, LuaValue, NativeFunction};

fn native(name: &'static str, func: impl Fn(&[LuaValue]) -> Result<LuaValue, RuntimeError> + 'static) -> LuaValue {
    LuaValue::Native(Rc::new(NativeFunction { name, arity_hint: None, func: Box::new(func) }))
}

fn arg(args: &[LuaValue], i: usize) -> LuaValue {
    args.get(i).cloned().unwrap_or(LuaValue::Nil)
}

fn as_f64(v: &LuaValue) -> Option<f64> {
    match v {
        LuaValue::Int(i) => Some(*i as f64),
        LuaValue::Float(f) => Some(*f),
        _ => None,
    }
}

fn as_i64(v: &LuaValue) -> Option<i64> {
    match v {
        LuaValue::Int(i) => Some(*i),
        LuaValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        _ => None,
    }
}

fn both_int(a: &LuaValue, b: &LuaValue) -> Option<(i64, i64)> {
    match (a, b) {
        (LuaValue::Int(x), LuaValue::Int(y)) => Some((*x, *y)),
        _ => None,
    }
}

// -- arithmetic ---------------------------------------------------------

fn add_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    let (a, b) = (arg(args, 0), arg(args, 1));
    if let Some((x, y)) = both_int(&a, &b) {
        return Ok(LuaValue::Int(x.wrapping_add(y)));
    }
    match (as_f64(&a), as_f64(&b)) {
        (Some(x), Some(y)) => Ok(LuaValue::Float(x + y)),
        _ => Err(RuntimeError::TypeError),
    }
}

fn sub_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    let (a, b) = (arg(args, 0), arg(args, 1));
    if let Some((x, y)) = both_int(&a, &b) {
        return Ok(LuaValue::Int(x.wrapping_sub(y)));
    }
    match (as_f64(&a), as_f64(&b)) {
        (Some(x), Some(y)) => Ok(LuaValue::Float(x - y)),
        _ => Err(RuntimeError::TypeError),
    }
}

fn mul_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    let (a, b) = (arg(args, 0), arg(args, 1));
    if let Some((x, y)) = both_int(&a, &b) {
        return Ok(LuaValue::Int(x.wrapping_mul(y)));
    }
    match (as_f64(&a), as_f64(&b)) {
        (Some(x), Some(y)) => Ok(LuaValue::Float(x * y)),
        _ => Err(RuntimeError::TypeError),
    }
}

/// Lua's `/` is always float division, even for two integer operands.
fn div_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    match (as_f64(&arg(args, 0)), as_f64(&arg(args, 1))) {
        (Some(x), Some(y)) => Ok(LuaValue::Float(x / y)),
        _ => Err(RuntimeError::TypeError),
    }
}

fn idiv_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    let (a, b) = (arg(args, 0), arg(args, 1));
    if let Some((x, y)) = both_int(&a, &b) {
        if y == 0 {
            return Err(RuntimeError::TypeError);
        }
        return Ok(LuaValue::Int(x.div_euclid(y)));
    }
    match (as_f64(&a), as_f64(&b)) {
        (Some(x), Some(y)) => Ok(LuaValue::Float((x / y).floor())),
        _ => Err(RuntimeError::TypeError),
    }
}

/// Lua's `%` is floored modulo: `a - floor(a/b)*b`.
fn mod_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    let (a, b) = (arg(args, 0), arg(args, 1));
    if let Some((x, y)) = both_int(&a, &b) {
        if y == 0 {
            return Err(RuntimeError::TypeError);
        }
        return Ok(LuaValue::Int(x.rem_euclid(y)));
    }
    match (as_f64(&a), as_f64(&b)) {
        (Some(x), Some(y)) => Ok(LuaValue::Float(x - (x / y).floor() * y)),
        _ => Err(RuntimeError::TypeError),
    }
}

fn pow_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    match (as_f64(&arg(args, 0)), as_f64(&arg(args, 1))) {
        (Some(x), Some(y)) => Ok(LuaValue::Float(x.powf(y))),
        _ => Err(RuntimeError::TypeError),
    }
}

fn concat_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    fn piece(v: &LuaValue) -> Option<String> {
        match v {
            LuaValue::Str(s) => Some(s.to_string()),
            LuaValue::Int(_) | LuaValue::Float(_) => Some(v.to_string()),
            _ => None,
        }
    }
    match (piece(&arg(args, 0)), piece(&arg(args, 1))) {
        (Some(a), Some(b)) => Ok(LuaValue::Str(SmolStr::new(a + &b))),
        _ => Err(RuntimeError::TypeError),
    }
}

// -- comparisons ----------------------------------------------------------

fn lt_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    let (a, b) = (arg(args, 0), arg(args, 1));
    match (&a, &b) {
        (LuaValue::Str(x), LuaValue::Str(y)) => Ok(LuaValue::Bool(x < y)),
        _ => match (as_f64(&a), as_f64(&b)) {
            (Some(x), Some(y)) => Ok(LuaValue::Bool(x < y)),
            _ => Err(RuntimeError::TypeError),
        },
    }
}

fn le_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    let (a, b) = (arg(args, 0), arg(args, 1));
    match (&a, &b) {
        (LuaValue::Str(x), LuaValue::Str(y)) => Ok(LuaValue::Bool(x <= y)),
        _ => match (as_f64(&a), as_f64(&b)) {
            (Some(x), Some(y)) => Ok(LuaValue::Bool(x <= y)),
            _ => Err(RuntimeError::TypeError),
        },
    }
}

fn gt_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    lt_event(&[arg(args, 1), arg(args, 0)])
}

fn ge_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    le_event(&[arg(args, 1), arg(args, 0)])
}

fn eq_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    Ok(LuaValue::Bool(arg(args, 0) == arg(args, 1)))
}

fn ne_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    Ok(LuaValue::Bool(arg(args, 0) != arg(args, 1)))
}

// -- bitwise (integer-only, §"Non-goals" keeps this to the fast path) ------

fn band_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    match (as_i64(&arg(args, 0)), as_i64(&arg(args, 1))) {
        (Some(x), Some(y)) => Ok(LuaValue::Int(x & y)),
        _ => Err(RuntimeError::TypeError),
    }
}

fn bor_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    match (as_i64(&arg(args, 0)), as_i64(&arg(args, 1))) {
        (Some(x), Some(y)) => Ok(LuaValue::Int(x | y)),
        _ => Err(RuntimeError::TypeError),
    }
}

fn bxor_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    match (as_i64(&arg(args, 0)), as_i64(&arg(args, 1))) {
        (Some(x), Some(y)) => Ok(LuaValue::Int(x ^ y)),
        _ => Err(RuntimeError::TypeError),
    }
}

fn shl_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    match (as_i64(&arg(args, 0)), as_i64(&arg(args, 1))) {
        (Some(x), Some(y)) if (0..64).contains(&y) => Ok(LuaValue::Int(x.wrapping_shl(y as u32))),
        (Some(_), Some(_)) => Ok(LuaValue::Int(0)),
        _ => Err(RuntimeError::TypeError),
    }
}

fn shr_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    match (as_i64(&arg(args, 0)), as_i64(&arg(args, 1))) {
        (Some(x), Some(y)) if (0..64).contains(&y) => Ok(LuaValue::Int(((x as u64) >> y) as i64)),
        (Some(_), Some(_)) => Ok(LuaValue::Int(0)),
        _ => Err(RuntimeError::TypeError),
    }
}

// -- unary ------------------------------------------------------------------

fn unm_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    match arg(args, 0) {
        LuaValue::Int(i) => Ok(LuaValue::Int(i.wrapping_neg())),
        LuaValue::Float(f) => Ok(LuaValue::Float(-f)),
        _ => Err(RuntimeError::TypeError),
    }
}

fn len_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    match arg(args, 0) {
        LuaValue::Str(s) => Ok(LuaValue::Int(s.len() as i64)),
        LuaValue::Table(t) => Ok(LuaValue::Int(t.borrow().len() as i64)),
        _ => Err(RuntimeError::TypeError),
    }
}

fn bnot_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    match as_i64(&arg(args, 0)) {
        Some(x) => Ok(LuaValue::Int(!x)),
        None => Err(RuntimeError::TypeError),
    }
}

fn not_event(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    Ok(LuaValue::Bool(!arg(args, 0).truthy()))
}

/// `forprep(counter, limit, step)`: whether the numeric `for` loop should run
/// its body at `counter`'s current value (§4.4 "For (numeric)"). Unlike
/// `base.py`'s `forprep`, which hands back an `(iter_func, state, control)`
/// triple for the generic iteration protocol, this crate's codegen calls it
/// directly as the loop's own termination test and does the increment with
/// a plain `BINARY_ADD` — see DESIGN.md.
fn forprep(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    let counter = as_f64(&arg(args, 0)).ok_or(RuntimeError::TypeError)?;
    let limit = as_f64(&arg(args, 1)).ok_or(RuntimeError::TypeError)?;
    let step = as_f64(&arg(args, 2)).ok_or(RuntimeError::TypeError)?;
    if step == 0.0 {
        return Err(RuntimeError::TypeError);
    }
    Ok(LuaValue::Bool(if step > 0.0 { counter <= limit } else { counter >= limit }))
}

/// Vestigial: the scope pass still registers a `Global("LuaTable")` per
/// table constructor (`ScopeVisitor::visit(ast.Table)`), but this crate's
/// codegen builds tables directly with `BUILD_MAP`/`MAP_ADD` and never loads
/// this symbol — see `codegen::visit_table`. Kept so `LOAD_GLOBAL` for the
/// name would still resolve if ever emitted.
fn luatable_ctor(_args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    Ok(LuaValue::Table(Rc::new(RefCell::new(LuaTable::new()))))
}

/// Registers every name this crate's codegen reaches with `LOAD_GLOBAL`
/// directly (never through `_ENV`): the `.b<op>`/`.u<op>` operator stubs,
/// `forprep`, and the vestigial `LuaTable` constructor.
pub fn install_builtins(globals: &mut LuaTable) {
    let entries: &[(&'static str, fn(&[LuaValue]) -> Result<LuaValue, RuntimeError>)] = &[
        (".b+", add_event),
        (".b-", sub_event),
        (".b*", mul_event),
        (".b/", div_event),
        (".b//", idiv_event),
        (".b%", mod_event),
        (".b^", pow_event),
        (".b..", concat_event),
        (".b<", lt_event),
        (".b<=", le_event),
        (".b>", gt_event),
        (".b>=", ge_event),
        (".b==", eq_event),
        (".b~=", ne_event),
        (".b&", band_event),
        (".b|", bor_event),
        (".b~", bxor_event),
        (".b<<", shl_event),
        (".b>>", shr_event),
        (".u-", unm_event),
        (".u#", len_event),
        (".u~", bnot_event),
        (".unot", not_event),
        ("forprep", forprep),
        ("LuaTable", luatable_ctor),
    ];
    for (name, func) in entries {
        globals.set(LuaValue::Str(SmolStr::new(*name)), native(name, *func));
    }
}

/// `tonumber(e[, base])` (§6.2). Codegen calls the equivalent logic directly
/// at compile time on numeric literals (`codegen::parse_numeral`); this is
/// the runtime-callable counterpart Lua source can invoke explicitly.
fn tonumber(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    let value = arg(args, 0);
    if matches!(value, LuaValue::Int(_) | LuaValue::Float(_)) {
        return Ok(value);
    }
    let LuaValue::Str(s) = &value else {
        return Ok(LuaValue::Nil);
    };
    let text = s.trim();
    if let Some(base) = as_i64(&arg(args, 1)) {
        return Ok(i64::from_str_radix(text, base as u32).map(LuaValue::Int).unwrap_or(LuaValue::Nil));
    }
    let lower = text.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        if let Ok(i) = i64::from_str_radix(hex, 16) {
            return Ok(LuaValue::Int(i));
        }
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(LuaValue::Int(i));
    }
    Ok(text.parse::<f64>().map(LuaValue::Float).unwrap_or(LuaValue::Nil))
}

/// `load(chunk[, chunkname])` (§6.3). This crate's single ambient globals
/// table is shared by every chunk, so unlike `base.py`'s `load`, there is no
/// per-call `env` override — every compiled chunk resolves `_ENV` against
/// the one `LuaState` it was loaded under (see DESIGN.md).
fn load(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    let LuaValue::Str(chunk) = arg(args, 0) else {
        return Ok(LuaValue::Nil);
    };
    let filename = match arg(args, 1) {
        LuaValue::Str(s) => s.to_string(),
        _ => "<string>".to_string(),
    };
    match crate::compiler::compile(&chunk, &filename, CompilerLimits::default()) {
        Ok(code) => Ok(LuaValue::Function(Rc::new(LuaClosure { code, free: Vec::new() }))),
        Err(_) => Ok(LuaValue::Nil),
    }
}

fn loadfile(args: &[LuaValue]) -> Result<LuaValue, RuntimeError> {
    let LuaValue::Str(path) = arg(args, 0) else {
        return Ok(LuaValue::Nil);
    };
    match std::fs::read_to_string(path.as_str()) {
        Ok(source) => load(&[LuaValue::Str(SmolStr::new(source)), LuaValue::Str(path)]),
        Err(_) => Ok(LuaValue::Nil),
    }
}

/// Registers the ordinary Lua globals reached through `_ENV` subscript
/// (§6.2/§6.3): `tonumber`, `load`, `loadfile`, and `_G` bound back to the
/// environment table itself (`base.py`'s `luaopen` does the same).
pub fn install_env(env: &Rc<RefCell<LuaTable>>) {
    let mut table = env.borrow_mut();
    table.set(LuaValue::Str(SmolStr::new("tonumber")), native("tonumber", tonumber));
    table.set(LuaValue::Str(SmolStr::new("load")), native("load", load));
    table.set(LuaValue::Str(SmolStr::new("loadfile")), native("loadfile", loadfile));
    table.set(LuaValue::Str(SmolStr::new("_G")), LuaValue::Table(env.clone()));
}
