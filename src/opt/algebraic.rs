//! Algebraic simplification: the fixed rewrite-rule set applied
//! regardless of operand order where the operator is commutative.
//!
//! `x+0=x`, `x-0=x`, `x*1=x`, `x*0=0`, `x/1=x`, `x%1=0`, `x|0=x`, `x&-1=x`,
//! `x^0=x`, `x<<0=x`, `x>>0=x`, `x-x=0`, `x^x=0`, `x&0=0`, `x|-1=-1`.

use std::collections::HashMap;

use crate::ir::{BinOp, Function, InstrKind, Operand, ValueId};

fn all_ones(ty: crate::ir::IrType) -> i64 {
    match ty.size() {
        1 => -1i64 & 0xff,
        2 => -1i64 & 0xffff,
        4 => -1i64 & 0xffff_ffff,
        _ => -1i64,
    }
}

fn same_value(a: &Operand, b: &Operand) -> bool {
    matches!((a, b), (Operand::Value(x), Operand::Value(y)) if x == y)
}

/// Returns the operand this instruction simplifies to, if any rule applies.
fn simplify(op: BinOp, lhs: &Operand, rhs: &Operand, ty: crate::ir::IrType) -> Option<Operand> {
    let lhs_zero = lhs.as_const_int() == Some(0);
    let rhs_zero = rhs.as_const_int() == Some(0);
    let lhs_one = lhs.as_const_int() == Some(1);
    let rhs_one = rhs.as_const_int() == Some(1);
    let lhs_all_ones = lhs.as_const_int() == Some(all_ones(ty));
    let rhs_all_ones = rhs.as_const_int() == Some(all_ones(ty));

    match op {
        BinOp::Add => {
            if rhs_zero {
                return Some(lhs.clone());
            }
            if lhs_zero {
                return Some(rhs.clone());
            }
        }
        BinOp::Sub => {
            if rhs_zero {
                return Some(lhs.clone());
            }
            if same_value(lhs, rhs) {
                return Some(Operand::const_int(0, ty));
            }
        }
        BinOp::Mul => {
            if rhs_one {
                return Some(lhs.clone());
            }
            if lhs_one {
                return Some(rhs.clone());
            }
            if lhs_zero || rhs_zero {
                return Some(Operand::const_int(0, ty));
            }
        }
        BinOp::SDiv | BinOp::UDiv => {
            if rhs_one {
                return Some(lhs.clone());
            }
        }
        BinOp::SRem | BinOp::URem => {
            if rhs_one {
                return Some(Operand::const_int(0, ty));
            }
        }
        BinOp::Or => {
            if rhs_zero {
                return Some(lhs.clone());
            }
            if lhs_zero {
                return Some(rhs.clone());
            }
            if lhs_all_ones || rhs_all_ones {
                return Some(Operand::const_int(all_ones(ty), ty));
            }
        }
        BinOp::And => {
            if rhs_all_ones {
                return Some(lhs.clone());
            }
            if lhs_all_ones {
                return Some(rhs.clone());
            }
            if lhs_zero || rhs_zero {
                return Some(Operand::const_int(0, ty));
            }
        }
        BinOp::Xor => {
            if rhs_zero {
                return Some(lhs.clone());
            }
            if lhs_zero {
                return Some(rhs.clone());
            }
            if same_value(lhs, rhs) {
                return Some(Operand::const_int(0, ty));
            }
        }
        BinOp::Shl | BinOp::Ashr | BinOp::Lshr => {
            if rhs_zero {
                return Some(lhs.clone());
            }
        }
    }
    None
}

/// Runs one simplification pass, returning whether anything changed.
pub fn run(func: &mut Function) -> bool {
    let mut replacements: HashMap<ValueId, Operand> = HashMap::new();
    for block in &func.blocks {
        for instr in &block.instrs {
            let Some(result) = instr.result else { continue };
            if let InstrKind::Binary { op, lhs, rhs } = &instr.kind {
                if let Some(simplified) = simplify(*op, lhs, rhs, instr.ty) {
                    replacements.insert(result, simplified);
                }
            }
        }
    }
    if replacements.is_empty() {
        return false;
    }
    super::dce::rewrite_with(func, &replacements);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, IrType, TermKind};

    #[test]
    fn add_zero_is_removed() {
        let mut f = Function::new("f".into(), false);
        let p = f.add_param(IrType::I32);
        let r = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Add, lhs: Operand::Value(p), rhs: Operand::const_int(0, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(r))));
        f.link_cfg();
        run(&mut f);
        assert_eq!(f.block(f.entry).term.kind, TermKind::Ret(Some(Operand::Value(p))));
        assert!(f.block(f.entry).instrs.is_empty());
    }

    #[test]
    fn sub_self_folds_to_zero() {
        let mut f = Function::new("f".into(), false);
        let p = f.add_param(IrType::I32);
        let r = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Sub, lhs: Operand::Value(p), rhs: Operand::Value(p) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(r))));
        f.link_cfg();
        run(&mut f);
        assert_eq!(f.block(f.entry).term.kind, TermKind::Ret(Some(Operand::const_int(0, IrType::I32))));
    }

    #[test]
    fn mul_by_zero_wins_over_other_operand() {
        let mut f = Function::new("f".into(), false);
        let p = f.add_param(IrType::I32);
        let r = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Mul, lhs: Operand::Value(p), rhs: Operand::const_int(0, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(r))));
        f.link_cfg();
        run(&mut f);
        assert_eq!(f.block(f.entry).term.kind, TermKind::Ret(Some(Operand::const_int(0, IrType::I32))));
    }
}
