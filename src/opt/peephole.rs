//! Peephole cleanup: `not(not(x))=x`, a sign/zero-extend that
//! immediately undoes a truncate of the same value collapses to the
//! original value, and a conditional branch on a constant condition
//! becomes an unconditional branch to the taken side.

use std::collections::HashMap;

use crate::ir::{ConvOp, Function, InstrKind, Operand, TermKind, ValueId};

/// `rhs` is a constant equal to all-ones for its own width (the IR's
/// encoding of bitwise "not").
fn is_all_ones(rhs: &Operand) -> bool {
    matches!(rhs, Operand::ConstInt { value, ty } if *value == all_ones(*ty))
}

/// `xor x, -1` applied twice to the same value cancels; the front end
/// never emits a dedicated "not" instruction, so this looks for the
/// `Binary(Xor, _, -1)` shape the IR builder actually produces.
fn redundant_double_xor(func: &Function, kind: &InstrKind) -> Option<Operand> {
    use crate::ir::BinOp;
    let InstrKind::Binary { op: BinOp::Xor, lhs, rhs } = kind else { return None };
    if !is_all_ones(rhs) {
        return None;
    }
    let Operand::Value(inner) = lhs else { return None };
    let inner_instr = func.blocks.iter().flat_map(|b| &b.instrs).find(|i| i.result == Some(*inner))?;
    if let InstrKind::Binary { op: BinOp::Xor, lhs: inner_lhs, rhs: inner_rhs } = &inner_instr.kind {
        if is_all_ones(inner_rhs) {
            return Some(inner_lhs.clone());
        }
    }
    None
}

fn all_ones(ty: crate::ir::IrType) -> i64 {
    match ty.size() {
        1 => -1i64 & 0xff,
        2 => -1i64 & 0xffff,
        4 => -1i64 & 0xffff_ffff,
        _ => -1i64,
    }
}

/// A `trunc` immediately widened back with `sext`/`zext` to its original
/// width and signedness recovers the original value when the truncate's
/// source already fit -- conservatively applied only when the convert
/// chain is a direct trunc-then-widen over the same `ValueId`.
fn redundant_extend_after_truncate(func: &Function, kind: &InstrKind, result_ty: crate::ir::IrType) -> Option<Operand> {
    let InstrKind::Convert { op: ConvOp::Sext | ConvOp::Zext, operand } = kind else { return None };
    let Operand::Value(src) = operand else { return None };
    let src_instr = func.blocks.iter().flat_map(|b| &b.instrs).find(|i| i.result == Some(*src))?;
    let InstrKind::Convert { op: ConvOp::Trunc, operand: original } = &src_instr.kind else { return None };
    let Operand::Value(orig_id) = original else { return None };
    if func.value_ty(*orig_id) != result_ty {
        return None;
    }
    Some(original.clone())
}

/// Runs one peephole pass, returning whether anything changed.
pub fn run(func: &mut Function) -> bool {
    let mut replacements: HashMap<ValueId, Operand> = HashMap::new();
    for block in &func.blocks {
        for instr in &block.instrs {
            let Some(result) = instr.result else { continue };
            if let Some(src) = redundant_double_xor(func, &instr.kind) {
                replacements.insert(result, src);
                continue;
            }
            if let Some(src) = redundant_extend_after_truncate(func, &instr.kind, instr.ty) {
                replacements.insert(result, src);
            }
        }
    }
    let mut changed = !replacements.is_empty();
    if changed {
        super::dce::rewrite_with(func, &replacements);
    }
    changed |= simplify_constant_branches(func);
    changed
}

fn simplify_constant_branches(func: &mut Function) -> bool {
    let mut changed = false;
    for block in &mut func.blocks {
        if let TermKind::Cbr { cond, then_block, else_block } = &block.term.kind {
            if let Some(c) = cond.as_const_int() {
                let target = if c != 0 { *then_block } else { *else_block };
                block.term.kind = TermKind::Br(target);
                changed = true;
            }
        }
    }
    if changed {
        func.link_cfg();
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Function, IrType, Operand, TermKind};

    #[test]
    fn double_xor_with_all_ones_cancels() {
        let mut f = Function::new("f".into(), false);
        let p = f.add_param(IrType::I32);
        let a = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Xor, lhs: Operand::Value(p), rhs: Operand::const_int(-1, IrType::I32) });
        let b = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Xor, lhs: Operand::Value(a), rhs: Operand::const_int(-1, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(b))));
        f.link_cfg();
        run(&mut f);
        assert_eq!(f.block(f.entry).term.kind, TermKind::Ret(Some(Operand::Value(p))));
    }

    #[test]
    fn cbr_on_constant_becomes_unconditional() {
        let mut f = Function::new("f".into(), false);
        let then_b = f.new_block("then");
        let else_b = f.new_block("else");
        f.set_terminator(f.entry, TermKind::Cbr { cond: Operand::const_int(1, IrType::I1), then_block: then_b, else_block: else_b });
        f.set_terminator(then_b, TermKind::Ret(None));
        f.set_terminator(else_b, TermKind::Ret(None));
        f.link_cfg();
        run(&mut f);
        assert_eq!(f.block(f.entry).term.kind, TermKind::Br(then_b));
    }
}
