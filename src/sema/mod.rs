//! Semantic analysis: name resolution, type construction and checking,
//! struct/enum layout, constant folding, and attribute dispatch.
//!
//! Split the way the grammar itself splits: `constexpr` and `builtins` are
//! pure, self-contained helpers with no dependency on the rest of analysis;
//! `attrs` dispatches the small enumerated attribute bag; `resolve` is the
//! stateful walk that ties them together over one translation unit.

pub mod attrs;
pub mod builtins;
pub mod constexpr;
pub mod resolve;

pub use resolve::{analyze, AnalysisResult};
