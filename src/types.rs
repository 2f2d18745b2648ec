use indexmap::IndexMap;
use secstr::SecVec;

/// The in-memory key/value mapping. An `IndexMap` is used for the same reason the teacher
/// picked it: strong asymptotic performance, even though the store's contract leaves
/// iteration order unobserved.
pub type Map = IndexMap<String, SecVec<u8>>;
