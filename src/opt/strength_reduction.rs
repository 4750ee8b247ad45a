//! Strength reduction: multiplying by a positive power of two becomes a
//! shift; dividing or remaindering an *unsigned* value by a power of two
//! becomes a shift/mask. Signed division/remainder are deliberately left
//! alone -- rounding toward zero makes the equivalent shift sequence a
//! multi-instruction idiom that would fight the "no machine-specific
//! widening below the back end" boundary this pass observes.

use crate::ir::{BinOp, Function, InstrKind, IrType, Operand};

fn power_of_two(v: i64) -> Option<u32> {
    if v > 0 && (v as u64).is_power_of_two() {
        Some((v as u64).trailing_zeros())
    } else {
        None
    }
}

fn reduce(op: BinOp, lhs: &Operand, rhs: &Operand, ty: IrType) -> Option<InstrKind> {
    let shift = rhs.as_const_int().and_then(power_of_two)?;
    match op {
        BinOp::Mul => Some(InstrKind::Binary { op: BinOp::Shl, lhs: lhs.clone(), rhs: Operand::const_int(shift as i64, ty) }),
        BinOp::UDiv => Some(InstrKind::Binary { op: BinOp::Lshr, lhs: lhs.clone(), rhs: Operand::const_int(shift as i64, ty) }),
        BinOp::URem => {
            let mask = rhs.as_const_int()? - 1;
            Some(InstrKind::Binary { op: BinOp::And, lhs: lhs.clone(), rhs: Operand::const_int(mask, ty) })
        }
        _ => None,
    }
}

/// Rewrites eligible multiplies/unsigned-divides/unsigned-remainders in
/// place (not via `dce::rewrite_with`, since the result keeps the same
/// `ValueId` -- only the instruction's shape changes). Returns whether
/// anything changed.
pub fn run(func: &mut Function) -> bool {
    let mut changed = false;
    for block in &mut func.blocks {
        for instr in &mut block.instrs {
            if let InstrKind::Binary { op, lhs, rhs } = &instr.kind {
                if let Some(new_kind) = reduce(*op, lhs, rhs, instr.ty) {
                    instr.kind = new_kind;
                    changed = true;
                }
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, IrType, TermKind};

    #[test]
    fn multiply_by_power_of_two_becomes_shift() {
        let mut f = Function::new("f".into(), false);
        let p = f.add_param(IrType::I32);
        let r = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Mul, lhs: Operand::Value(p), rhs: Operand::const_int(8, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(r))));
        f.link_cfg();
        run(&mut f);
        assert_eq!(f.block(f.entry).instrs[0].kind, InstrKind::Binary { op: BinOp::Shl, lhs: Operand::Value(p), rhs: Operand::const_int(3, IrType::I32) });
    }

    #[test]
    fn signed_division_is_left_untouched() {
        let mut f = Function::new("f".into(), false);
        let p = f.add_param(IrType::I32);
        let r = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::SDiv, lhs: Operand::Value(p), rhs: Operand::const_int(8, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(r))));
        f.link_cfg();
        assert!(!run(&mut f));
        assert!(matches!(f.block(f.entry).instrs[0].kind, InstrKind::Binary { op: BinOp::SDiv, .. }));
    }

    #[test]
    fn unsigned_remainder_by_power_of_two_becomes_mask() {
        let mut f = Function::new("f".into(), false);
        let p = f.add_param(IrType::I32);
        let r = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::URem, lhs: Operand::Value(p), rhs: Operand::const_int(4, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(r))));
        f.link_cfg();
        run(&mut f);
        assert_eq!(f.block(f.entry).instrs[0].kind, InstrKind::Binary { op: BinOp::And, lhs: Operand::Value(p), rhs: Operand::const_int(3, IrType::I32) });
    }
}
