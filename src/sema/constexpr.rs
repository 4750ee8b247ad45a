//! Constant-expression evaluation: array bounds, bit-field widths, enum
//! constant values, `_Static_assert` conditions, case labels, and the
//! compile-time `__builtin_*` family all bottom out here.

use crate::ast::{BinaryOp, Expr, ExprKind, SizeofArg, UnaryOp};
use crate::diag::DiagnosticBag;
use crate::types::TypeTable;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
}

impl ConstValue {
    pub fn as_i64(self) -> i64 {
        match self {
            ConstValue::Int(v) => v,
            ConstValue::Float(v) => v as i64,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            ConstValue::Int(v) => v as f64,
            ConstValue::Float(v) => v,
        }
    }

    fn is_truthy(self) -> bool {
        match self {
            ConstValue::Int(v) => v != 0,
            ConstValue::Float(v) => v != 0.0,
        }
    }
}

/// Everything constant evaluation needs from the rest of the semantic
/// analyzer, gathered so the evaluator itself stays a pure function.
pub struct ConstEvalCtx<'a> {
    pub types: &'a TypeTable,
    pub enum_constants: &'a HashMap<String, i64>,
    /// Resolves a `TypeNode` the evaluator encounters inside `sizeof`/
    /// `_Alignof`/`__builtin_offsetof`/`__builtin_types_compatible_p` into a
    /// `TypeId`, delegating back to `sema::resolve` (which owns the tag and
    /// typedef namespaces this module doesn't need to know about).
    pub resolve_type: &'a dyn Fn(&crate::ast::TypeNode) -> crate::types::TypeId,
}

/// Evaluates `expr` as a constant expression, or returns `None` and leaves
/// diagnosing "not a constant expression" to the caller (the caller knows
/// the right wording: array bound, case label, enum value, ...).
pub fn eval(expr: &Expr, ctx: &ConstEvalCtx, diags: &mut DiagnosticBag) -> Option<ConstValue> {
    match &expr.kind {
        ExprKind::IntLiteral { value, .. } => Some(ConstValue::Int(*value as i64)),
        ExprKind::CharLiteral { value, .. } => Some(ConstValue::Int(*value)),
        ExprKind::FloatLiteral { text, .. } => text.parse::<f64>().ok().map(ConstValue::Float),
        ExprKind::Ident(name) => ctx.enum_constants.get(name).map(|v| ConstValue::Int(*v)),
        ExprKind::Unary { op, expr: inner } => {
            let v = eval(inner, ctx, diags)?;
            Some(match op {
                UnaryOp::Neg => match v {
                    ConstValue::Int(i) => ConstValue::Int(i.wrapping_neg()),
                    ConstValue::Float(f) => ConstValue::Float(-f),
                },
                UnaryOp::Plus => v,
                UnaryOp::Not => ConstValue::Int(!v.is_truthy() as i64),
                UnaryOp::BitNot => ConstValue::Int(!v.as_i64()),
                UnaryOp::PreInc | UnaryOp::PreDec => {
                    diags.error(expr.loc, "increment/decrement is not a constant expression");
                    return None;
                }
            })
        }
        ExprKind::Binary { op, lhs, rhs } => eval_binary(*op, lhs, rhs, ctx, diags, expr),
        ExprKind::Ternary { cond, then_expr, else_expr } => {
            let c = eval(cond, ctx, diags)?;
            if c.is_truthy() {
                match then_expr {
                    Some(t) => eval(t, ctx, diags),
                    None => Some(c),
                }
            } else {
                eval(else_expr, ctx, diags)
            }
        }
        ExprKind::Cast { ty, expr: inner } => {
            let v = eval(inner, ctx, diags)?;
            let tid = (ctx.resolve_type)(ty);
            Some(cast_const(v, tid, ctx.types))
        }
        ExprKind::Sizeof(arg) => {
            let size = match arg {
                SizeofArg::Type(t) => ctx.types.size_of((ctx.resolve_type)(t)),
                SizeofArg::Expr(_) => None,
            };
            size.map(|s| ConstValue::Int(s as i64)).or_else(|| {
                diags.error(expr.loc, "sizeof of incomplete type is not a constant expression");
                None
            })
        }
        ExprKind::Alignof(t) => {
            let tid = (ctx.resolve_type)(t);
            ctx.types.align_of(tid).map(|a| ConstValue::Int(a as i64))
        }
        ExprKind::BuiltinOffsetof { ty, member } => {
            let tid = (ctx.resolve_type)(ty);
            let record_id = match ctx.types.get(ctx.types.unqualified(tid)) {
                crate::types::Type::Record(r) => *r,
                _ => {
                    diags.error(expr.loc, "__builtin_offsetof requires a struct or union type");
                    return None;
                }
            };
            crate::types::offset_of(ctx.types, record_id, member)
                .map(|off| ConstValue::Int(off as i64))
                .or_else(|| {
                    diags.error(expr.loc, format!("no member named '{member}' in offsetof"));
                    None
                })
        }
        ExprKind::BuiltinTypesCompatibleP { a, b } => {
            let ta = (ctx.resolve_type)(a);
            let tb = (ctx.resolve_type)(b);
            Some(ConstValue::Int(ctx.types.types_compatible(ta, tb) as i64))
        }
        ExprKind::BuiltinConstantP(inner) => {
            let mut sink = DiagnosticBag::new();
            Some(ConstValue::Int(eval(inner, ctx, &mut sink).is_some() as i64))
        }
        ExprKind::BuiltinChooseExpr { cond, a, b } => {
            let c = eval(cond, ctx, diags)?;
            if c.is_truthy() { eval(a, ctx, diags) } else { eval(b, ctx, diags) }
        }
        ExprKind::Comma(_, rhs) => eval(rhs, ctx, diags),
        _ => None,
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &ConstEvalCtx,
    diags: &mut DiagnosticBag,
    at: &Expr,
) -> Option<ConstValue> {
    // Short-circuit operators must not force evaluation of the other side.
    if op == BinaryOp::LogAnd {
        let l = eval(lhs, ctx, diags)?;
        if !l.is_truthy() {
            return Some(ConstValue::Int(0));
        }
        return eval(rhs, ctx, diags).map(|r| ConstValue::Int(r.is_truthy() as i64));
    }
    if op == BinaryOp::LogOr {
        let l = eval(lhs, ctx, diags)?;
        if l.is_truthy() {
            return Some(ConstValue::Int(1));
        }
        return eval(rhs, ctx, diags).map(|r| ConstValue::Int(r.is_truthy() as i64));
    }

    let l = eval(lhs, ctx, diags)?;
    let r = eval(rhs, ctx, diags)?;
    let float_mode = matches!(l, ConstValue::Float(_)) || matches!(r, ConstValue::Float(_));

    if float_mode {
        let (a, b) = (l.as_f64(), r.as_f64());
        return Some(match op {
            BinaryOp::Add => ConstValue::Float(a + b),
            BinaryOp::Sub => ConstValue::Float(a - b),
            BinaryOp::Mul => ConstValue::Float(a * b),
            BinaryOp::Div => ConstValue::Float(a / b),
            BinaryOp::Lt => ConstValue::Int((a < b) as i64),
            BinaryOp::Gt => ConstValue::Int((a > b) as i64),
            BinaryOp::Le => ConstValue::Int((a <= b) as i64),
            BinaryOp::Ge => ConstValue::Int((a >= b) as i64),
            BinaryOp::Eq => ConstValue::Int((a == b) as i64),
            BinaryOp::Ne => ConstValue::Int((a != b) as i64),
            _ => {
                diags.error(at.loc, "invalid operator in floating-point constant expression");
                return None;
            }
        });
    }

    let (a, b) = (l.as_i64(), r.as_i64());
    Some(ConstValue::Int(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                diags.error(at.loc, "division by zero in constant expression");
                return None;
            }
            a.wrapping_div(b)
        }
        BinaryOp::Mod => {
            if b == 0 {
                diags.error(at.loc, "division by zero in constant expression");
                return None;
            }
            a.wrapping_rem(b)
        }
        BinaryOp::Shl => a.wrapping_shl(b as u32),
        BinaryOp::Shr => a.wrapping_shr(b as u32),
        BinaryOp::Lt => (a < b) as i64,
        BinaryOp::Gt => (a > b) as i64,
        BinaryOp::Le => (a <= b) as i64,
        BinaryOp::Ge => (a >= b) as i64,
        BinaryOp::Eq => (a == b) as i64,
        BinaryOp::Ne => (a != b) as i64,
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::LogAnd | BinaryOp::LogOr => unreachable!("handled above"),
    }))
}

fn cast_const(v: ConstValue, ty: crate::types::TypeId, types: &TypeTable) -> ConstValue {
    use crate::types::Type;
    match types.get(types.unqualified(ty)) {
        Type::Float(_) => ConstValue::Float(v.as_f64()),
        Type::Int { rank, signed } => {
            let bits = rank.size() * 8;
            let raw = v.as_i64();
            let mask = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
            let truncated = (raw as u64) & mask;
            if *signed && bits < 64 && (truncated & (1 << (bits - 1))) != 0 {
                ConstValue::Int((truncated | !mask) as i64)
            } else {
                ConstValue::Int(truncated as i64)
            }
        }
        _ => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FloatSuffix, IntSuffix};
    use crate::diag::SourceLoc;
    use crate::types::{TypeId, TypeTable};

    fn lit(value: u64) -> Expr {
        Expr { kind: ExprKind::IntLiteral { value, suffix: IntSuffix::empty() }, loc: SourceLoc::dummy() }
    }

    fn binop(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr { kind: ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }, loc: SourceLoc::dummy() }
    }

    fn ctx<'a>(types: &'a TypeTable, enums: &'a HashMap<String, i64>) -> ConstEvalCtx<'a> {
        ConstEvalCtx { types, enum_constants: enums, resolve_type: &|_| TypeId(0) }
    }

    #[test]
    fn folds_arithmetic() {
        let types = TypeTable::new();
        let enums = HashMap::new();
        let mut diags = DiagnosticBag::new();
        let e = binop(BinaryOp::Add, lit(2), binop(BinaryOp::Mul, lit(3), lit(4)));
        assert_eq!(eval(&e, &ctx(&types, &enums), &mut diags), Some(ConstValue::Int(14)));
    }

    #[test]
    fn short_circuits_logical_and() {
        let types = TypeTable::new();
        let enums = HashMap::new();
        let mut diags = DiagnosticBag::new();
        // `0 && (1/0)` must not evaluate the division.
        let divzero = binop(BinaryOp::Div, lit(1), lit(0));
        let e = binop(BinaryOp::LogAnd, lit(0), divzero);
        assert_eq!(eval(&e, &ctx(&types, &enums), &mut diags), Some(ConstValue::Int(0)));
        assert!(!diags.has_errors());
    }

    #[test]
    fn enum_constant_lookup() {
        let types = TypeTable::new();
        let mut enums = HashMap::new();
        enums.insert("RED".to_string(), 0i64);
        enums.insert("GREEN".to_string(), 1i64);
        let mut diags = DiagnosticBag::new();
        let e = binop(BinaryOp::Add, Expr { kind: ExprKind::Ident("GREEN".into()), loc: SourceLoc::dummy() }, lit(1));
        assert_eq!(eval(&e, &ctx(&types, &enums), &mut diags), Some(ConstValue::Int(2)));
        let _ = FloatSuffix::None;
    }

    #[test]
    fn division_by_zero_is_reported() {
        let types = TypeTable::new();
        let enums = HashMap::new();
        let mut diags = DiagnosticBag::new();
        let e = binop(BinaryOp::Div, lit(1), lit(0));
        assert_eq!(eval(&e, &ctx(&types, &enums), &mut diags), None);
        assert!(diags.has_errors());
    }
}
