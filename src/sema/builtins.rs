//! Shared classification for the `__builtin_*` family.
//!
//! `offsetof`, `types_compatible_p`, `choose_expr` and `constant_p` are
//! evaluated entirely at compile time and are handled directly as
//! `ExprKind` variants by `sema::constexpr`. Everything here is the rest:
//! intrinsics that still need an IR representation because they either
//! read runtime state (`va_arg`) or lower to a handful of instructions
//! that depend on an operand's runtime value (`clz`, `ctz`, `popcount`).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Expect,
    Clz,
    Ctz,
    Popcount,
    Abs,
}

/// Classifies a `__builtin_*` call name captured by the parser as
/// `ExprKind::BuiltinCall`. Returns `None` for names the parser already
/// turned into dedicated `ExprKind` variants (`offsetof`, `va_start`, ...)
/// or names that are not builtins at all.
pub fn classify(name: &str) -> Option<BuiltinKind> {
    Some(match name {
        "__builtin_expect" => BuiltinKind::Expect,
        "__builtin_clz" => BuiltinKind::Clz,
        "__builtin_ctz" => BuiltinKind::Ctz,
        "__builtin_popcount" => BuiltinKind::Popcount,
        "__builtin_abs" => BuiltinKind::Abs,
        _ => return None,
    })
}

impl BuiltinKind {
    /// Minimum/maximum argument count, checked by the IR builder before
    /// lowering.
    pub fn arity(self) -> usize {
        match self {
            BuiltinKind::Expect => 2,
            BuiltinKind::Clz | BuiltinKind::Ctz | BuiltinKind::Popcount | BuiltinKind::Abs => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_builtins() {
        assert_eq!(classify("__builtin_clz"), Some(BuiltinKind::Clz));
        assert_eq!(classify("__builtin_expect"), Some(BuiltinKind::Expect));
        assert_eq!(classify("__builtin_nonsense"), None);
    }

    #[test]
    fn arity_matches_signature() {
        assert_eq!(BuiltinKind::Expect.arity(), 2);
        assert_eq!(BuiltinKind::Abs.arity(), 1);
    }
}
