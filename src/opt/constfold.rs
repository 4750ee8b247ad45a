//! Constant folding: any instruction whose operands are all
//! constants is replaced by the computed constant. Signed overflow wraps
//! two's-complement (the compiler declines to exploit UB here).

use std::collections::HashMap;

use crate::ir::{BinOp, FcmpPred, FloatBinOp, Function, IcmpPred, InstrKind, IrType, Operand};

fn wrap(value: i64, ty: IrType) -> i64 {
    match ty {
        IrType::I1 => value & 1,
        IrType::I8 => value as i8 as i64,
        IrType::I16 => value as i16 as i64,
        IrType::I32 => value as i32 as i64,
        _ => value,
    }
}

fn fold_binary(op: BinOp, lhs: i64, rhs: i64, ty: IrType) -> Option<i64> {
    let result = match op {
        BinOp::Add => lhs.wrapping_add(rhs),
        BinOp::Sub => lhs.wrapping_sub(rhs),
        BinOp::Mul => lhs.wrapping_mul(rhs),
        BinOp::SDiv => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_div(rhs)
        }
        BinOp::UDiv => {
            if rhs == 0 {
                return None;
            }
            ((lhs as u64).wrapping_div(rhs as u64)) as i64
        }
        BinOp::SRem => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_rem(rhs)
        }
        BinOp::URem => {
            if rhs == 0 {
                return None;
            }
            ((lhs as u64).wrapping_rem(rhs as u64)) as i64
        }
        BinOp::And => lhs & rhs,
        BinOp::Or => lhs | rhs,
        BinOp::Xor => lhs ^ rhs,
        BinOp::Shl => lhs.wrapping_shl(rhs as u32),
        BinOp::Ashr => lhs.wrapping_shr(rhs as u32),
        BinOp::Lshr => ((lhs as u64).wrapping_shr(rhs as u32)) as i64,
    };
    Some(wrap(result, ty))
}

fn fold_icmp(pred: IcmpPred, lhs: i64, rhs: i64) -> bool {
    match pred {
        IcmpPred::Eq => lhs == rhs,
        IcmpPred::Ne => lhs != rhs,
        IcmpPred::Slt => lhs < rhs,
        IcmpPred::Sle => lhs <= rhs,
        IcmpPred::Sgt => lhs > rhs,
        IcmpPred::Sge => lhs >= rhs,
        IcmpPred::Ult => (lhs as u64) < (rhs as u64),
        IcmpPred::Ule => (lhs as u64) <= (rhs as u64),
        IcmpPred::Ugt => (lhs as u64) > (rhs as u64),
        IcmpPred::Uge => (lhs as u64) >= (rhs as u64),
    }
}

fn fold_fcmp(pred: FcmpPred, lhs: f64, rhs: f64) -> bool {
    match pred {
        FcmpPred::Eq => lhs == rhs,
        FcmpPred::Ne => lhs != rhs,
        FcmpPred::Lt => lhs < rhs,
        FcmpPred::Le => lhs <= rhs,
        FcmpPred::Gt => lhs > rhs,
        FcmpPred::Ge => lhs >= rhs,
    }
}

/// Folds every instruction in `func` whose operands are already constants,
/// repeatedly until a fixpoint (a single instruction's fold can expose a new
/// all-constant instruction two folds later within the same block). Returns
/// whether anything changed.
pub fn run(func: &mut Function) -> bool {
    let mut any_changed = false;
    loop {
        let mut replacements: HashMap<crate::ir::ValueId, Operand> = HashMap::new();
        for block in &func.blocks {
            for instr in &block.instrs {
                let Some(result) = instr.result else { continue };
                if let Some(folded) = try_fold(&instr.kind, instr.ty) {
                    replacements.insert(result, folded);
                }
            }
        }
        if replacements.is_empty() {
            break;
        }
        any_changed = true;
        super::dce::rewrite_with(func, &replacements);
    }
    any_changed
}

fn try_fold(kind: &InstrKind, ty: IrType) -> Option<Operand> {
    match kind {
        InstrKind::Binary { op, lhs, rhs } => {
            let l = lhs.as_const_int()?;
            let r = rhs.as_const_int()?;
            fold_binary(*op, l, r, ty).map(|v| Operand::const_int(v, ty))
        }
        InstrKind::Icmp { pred, lhs, rhs } => {
            let l = lhs.as_const_int()?;
            let r = rhs.as_const_int()?;
            Some(Operand::const_int(fold_icmp(*pred, l, r) as i64, ty))
        }
        InstrKind::FloatBinary { op, lhs, rhs } => {
            let l = as_const_float(lhs)?;
            let r = as_const_float(rhs)?;
            let v = match op {
                FloatBinOp::Add => l + r,
                FloatBinOp::Sub => l - r,
                FloatBinOp::Mul => l * r,
                FloatBinOp::Div => l / r,
            };
            Some(Operand::ConstFloat { value: v, ty })
        }
        InstrKind::Fcmp { pred, lhs, rhs } => {
            let l = as_const_float(lhs)?;
            let r = as_const_float(rhs)?;
            Some(Operand::const_int(fold_fcmp(*pred, l, r) as i64, ty))
        }
        InstrKind::Convert { op, operand } => fold_convert(*op, operand, ty),
        _ => None,
    }
}

fn as_const_float(op: &Operand) -> Option<f64> {
    match op {
        Operand::ConstFloat { value, .. } => Some(*value),
        Operand::ConstInt { value, .. } => Some(*value as f64),
        _ => None,
    }
}

fn fold_convert(op: crate::ir::ConvOp, operand: &Operand, ty: IrType) -> Option<Operand> {
    use crate::ir::ConvOp::*;
    match op {
        Sext | Zext | Trunc | Bitcast | PtrToInt | IntToPtr => {
            let v = operand.as_const_int()?;
            Some(Operand::const_int(wrap(v, ty), ty))
        }
        SiToFp => Some(Operand::ConstFloat { value: operand.as_const_int()? as f64, ty }),
        FpToSi => Some(Operand::const_int(as_const_float(operand)? as i64, ty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, InstrKind, TermKind};

    #[test]
    fn folds_a_chain_to_a_single_constant() {
        let mut f = Function::new("f".into(), false);
        let a = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Add, lhs: Operand::const_int(2, IrType::I32), rhs: Operand::const_int(3, IrType::I32) });
        let b = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Mul, lhs: Operand::Value(a), rhs: Operand::const_int(10, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(b))));
        f.link_cfg();
        run(&mut f);
        for block in &f.blocks {
            for instr in &block.instrs {
                assert!(!matches!(instr.kind, InstrKind::Binary { .. }));
            }
        }
        assert_eq!(f.block(f.entry).term.kind, TermKind::Ret(Some(Operand::const_int(50, IrType::I32))));
    }

    #[test]
    fn division_by_zero_is_left_unfolded() {
        let mut f = Function::new("f".into(), false);
        let a = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::SDiv, lhs: Operand::const_int(4, IrType::I32), rhs: Operand::const_int(0, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(a))));
        f.link_cfg();
        run(&mut f);
        assert!(matches!(f.block(f.entry).instrs[0].kind, InstrKind::Binary { .. }));
    }
}
