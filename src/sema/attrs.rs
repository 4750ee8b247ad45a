//! `__attribute__` dispatch.
//!
//! Only the named set below changes code generation; anything else parses
//! (the parser accepts arbitrary attribute-list syntax) and is discarded
//! here with a warning, matching how real compilers treat attributes they
//! don't recognize as advisory rather than fatal.

use crate::ast::{Attribute, Expr, ExprKind};
use crate::diag::{DiagnosticBag, SourceLoc};
use crate::sema::constexpr::{self, ConstEvalCtx};
use crate::symbol::AttributeSet;

pub fn apply_attributes(attrs: &[Attribute], ctx: &ConstEvalCtx, diags: &mut DiagnosticBag) -> AttributeSet {
    let mut set = AttributeSet::default();
    for attr in attrs {
        match attr.name.as_str() {
            "always_inline" => set.always_inline = true,
            "noreturn" => set.noreturn = true,
            "weak" => set.weak = true,
            "constructor" => set.constructor = true,
            "destructor" => set.destructor = true,
            "packed" => set.packed = true,
            "section" => match attr.args.first() {
                Some(Expr { kind: ExprKind::StringLiteral(s), .. }) => set.section = Some(s.clone()),
                _ => diags.error(attr.loc, "'section' attribute requires a string literal argument"),
            },
            "aligned" => match attr.args.first() {
                Some(e) => match constexpr::eval(e, ctx, diags) {
                    Some(v) => set.aligned = Some(v.as_i64() as u32),
                    None => diags.error(attr.loc, "'aligned' attribute requires a constant expression"),
                },
                None => set.aligned = Some(16),
            },
            other => diags.warning(
                attr.loc,
                "unknown-attribute",
                format!("unknown attribute '{other}' ignored"),
            ),
        }
    }
    set
}

/// `_Noreturn`/`__attribute__((noreturn))` functions used alongside
/// fallthrough control flow are a semantic, not syntactic, concern; kept
/// here so the IR builder can ask "does this symbol's attribute set forbid
/// a path to the implicit return" without re-parsing attributes.
pub fn implies_no_fallthrough(attrs: &AttributeSet) -> bool {
    attrs.noreturn
}

#[allow(dead_code)]
fn dummy_loc() -> SourceLoc {
    SourceLoc::dummy()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeId, TypeTable};
    use std::collections::HashMap;

    #[test]
    fn unknown_attribute_warns_but_does_not_error() {
        let types = TypeTable::new();
        let enums = HashMap::new();
        let ctx = ConstEvalCtx { types: &types, enum_constants: &enums, resolve_type: &|_| TypeId(0) };
        let mut diags = DiagnosticBag::new();
        let attrs = vec![Attribute { name: "deprecated".into(), args: vec![], loc: SourceLoc::dummy() }];
        let set = apply_attributes(&attrs, &ctx, &mut diags);
        assert!(!set.always_inline);
        assert!(!diags.has_errors());
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn section_and_packed_recognized() {
        let types = TypeTable::new();
        let enums = HashMap::new();
        let ctx = ConstEvalCtx { types: &types, enum_constants: &enums, resolve_type: &|_| TypeId(0) };
        let mut diags = DiagnosticBag::new();
        let attrs = vec![
            Attribute { name: "packed".into(), args: vec![], loc: SourceLoc::dummy() },
            Attribute {
                name: "section".into(),
                args: vec![Expr { kind: ExprKind::StringLiteral(".custom".into()), loc: SourceLoc::dummy() }],
                loc: SourceLoc::dummy(),
            },
        ];
        let set = apply_attributes(&attrs, &ctx, &mut diags);
        assert!(set.packed);
        assert_eq!(set.section.as_deref(), Some(".custom"));
    }
}
