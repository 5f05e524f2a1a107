// Table representation (§3 "Lua value" -> table).
// The teacher's lua_table/ splits array and hash parts with a hand-rolled
// RawTable for SIMD-friendly hashing (hash_table.rs); this crate's tables
// are built purely by BUILD_MAP/MAP_ADD (§4.4 "Table constructors"), which
// never need the array-part fast path, so a single `ahash` map is enough.

use ahash::AHashMap;

use super::value::LuaValue;

/// Hashable projection of a `LuaValue` used as a table key. Lua 5.3 treats
/// a float with an integral value as equal to the corresponding integer, so
/// both normalize to `Int`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LuaKey {
    Bool(bool),
    Int(i64),
    Str(smol_str::SmolStr),
    Ptr(usize),
}

impl LuaKey {
    fn from_value(value: &LuaValue) -> Option<LuaKey> {
        match value {
            LuaValue::Nil => None,
            LuaValue::Bool(b) => Some(LuaKey::Bool(*b)),
            LuaValue::Int(i) => Some(LuaKey::Int(*i)),
            LuaValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(LuaKey::Int(*f as i64)),
            LuaValue::Float(f) => Some(LuaKey::Ptr(f.to_bits() as usize)),
            LuaValue::Str(s) => Some(LuaKey::Str(s.clone())),
            LuaValue::Table(t) => Some(LuaKey::Ptr(std::rc::Rc::as_ptr(t) as usize)),
            LuaValue::Function(f) => Some(LuaKey::Ptr(std::rc::Rc::as_ptr(f) as usize)),
            LuaValue::Native(f) => Some(LuaKey::Ptr(std::rc::Rc::as_ptr(f) as usize)),
            LuaValue::Tuple(t) => Some(LuaKey::Ptr(std::rc::Rc::as_ptr(t) as usize)),
            LuaValue::Code(c) => Some(LuaKey::Ptr(std::rc::Rc::as_ptr(c) as usize)),
            LuaValue::Cell(c) => Some(LuaKey::Ptr(std::rc::Rc::as_ptr(c) as usize)),
            LuaValue::TupleIter(t, _) => Some(LuaKey::Ptr(std::rc::Rc::as_ptr(t) as usize)),
        }
    }
}

#[derive(Default)]
pub struct LuaTable {
    entries: AHashMap<LuaKey, (LuaValue, LuaValue)>,
}

impl LuaTable {
    pub fn new() -> Self {
        LuaTable {
            entries: AHashMap::default(),
        }
    }

    /// §7 invariant: assigning `nil` to a key removes it rather than storing
    /// `nil`, so `get` on an absent key and an explicitly-nilled key agree.
    pub fn set(&mut self, key: LuaValue, value: LuaValue) {
        let Some(k) = LuaKey::from_value(&key) else {
            return;
        };
        if matches!(value, LuaValue::Nil) {
            self.entries.remove(&k);
        } else {
            self.entries.insert(k, (key, value));
        }
    }

    pub fn get(&self, key: &LuaValue) -> LuaValue {
        match LuaKey::from_value(key) {
            Some(k) => self
                .entries
                .get(&k)
                .map(|(_, v)| v.clone())
                .unwrap_or(LuaValue::Nil),
            None => LuaValue::Nil,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LuaValue, &LuaValue)> {
        self.entries.values().map(|(k, v)| (k, v))
    }
}
