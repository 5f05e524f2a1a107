// Symbol model (§3 "Symbol").
// Grounded on fml/compile/symbol.py's Symbol/Local/Free/Global classes.
// Local/Free need shared mutable identity (promotion sets `is_referenced` on
// the *original* Local object, visible through every Free that wraps it), so
// each variant wraps an `Rc<..Data>` the way the teacher shares GC objects
// via `Rc`/`GcObjectPtr` rather than by value.

use smol_str::SmolStr;
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug)]
pub struct LocalData {
    pub name: SmolStr,
    pub is_referenced: Cell<bool>,
    pub slot: Cell<u32>,
}

#[derive(Debug)]
pub struct FreeData {
    pub parent: Symbol,
    pub slot: Cell<u32>,
}

#[derive(Debug)]
pub struct GlobalData {
    pub name: SmolStr,
    pub slot: Cell<u32>,
}

/// A resolved name binding. See SPEC_FULL §3 for the invariants this must
/// satisfy (closed-over names, free-chain integrity, referenced-implies-cell).
#[derive(Debug, Clone)]
pub enum Symbol {
    Local(Rc<LocalData>),
    Free(Rc<FreeData>),
    Global(Rc<GlobalData>),
}

impl Symbol {
    pub fn new_local(name: &str) -> Symbol {
        Symbol::Local(Rc::new(LocalData {
            name: SmolStr::new(name),
            is_referenced: Cell::new(false),
            slot: Cell::new(0),
        }))
    }

    pub fn new_global(name: &str) -> Symbol {
        Symbol::Global(Rc::new(GlobalData {
            name: SmolStr::new(name),
            slot: Cell::new(0),
        }))
    }

    pub fn name(&self) -> SmolStr {
        match self {
            Symbol::Local(l) => l.name.clone(),
            Symbol::Free(f) => f.parent.name(),
            Symbol::Global(g) => g.name.clone(),
        }
    }

    pub fn is_referenced_local(&self) -> bool {
        matches!(self, Symbol::Local(l) if l.is_referenced.get())
    }

    pub fn slot(&self) -> u32 {
        match self {
            Symbol::Local(l) => l.slot.get(),
            Symbol::Free(f) => f.slot.get(),
            Symbol::Global(g) => g.slot.get(),
        }
    }

    /// Identity comparison used when deduplicating global/attribute name
    /// slots and when detecting "the same Local object" while walking a
    /// Free chain (§8 "Free chain integrity").
    pub fn ptr_eq(&self, other: &Symbol) -> bool {
        match (self, other) {
            (Symbol::Local(a), Symbol::Local(b)) => Rc::ptr_eq(a, b),
            (Symbol::Free(a), Symbol::Free(b)) => Rc::ptr_eq(a, b),
            (Symbol::Global(a), Symbol::Global(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
