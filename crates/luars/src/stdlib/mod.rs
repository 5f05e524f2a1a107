// Standard library (§6.2 "Library contract (minimum)").
// The teacher's `stdlib/` is a whole directory per Lua library (string, os,
// io, utf8, coroutine, table, math...); this crate only owns the one
// `basic` module §6.2 actually names, since everything else is explicitly
// out of scope (SPEC_FULL §1).

pub mod basic;
