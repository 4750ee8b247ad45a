//! Common subexpression elimination: a pure instruction
//! computing the same operation over the same operands as one that already
//! dominates it is replaced by that earlier value. Loads are included only
//! when no intervening store could alias the pointer -- conservatively,
//! any store at all kills every load-based CSE candidate, since two
//! pointers not provably derived from distinct `alloca`s are treated as
//! potentially aliasing.

use std::collections::HashMap;

use crate::ir::{BlockId, Function, InstrKind, Operand, ValueId};

use super::dominance::{self, Dominance};

/// A structural key identifying what an instruction computes, independent
/// of its result id -- two instructions with equal keys compute the same
/// value wherever both are defined.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Binary(crate::ir::BinOp, OperandKey, OperandKey),
    FloatBinary(crate::ir::FloatBinOp, OperandKey, OperandKey),
    Icmp(crate::ir::IcmpPred, OperandKey, OperandKey),
    Fcmp(crate::ir::FcmpPred, OperandKey, OperandKey),
    Convert(crate::ir::ConvOp, OperandKey),
    Gep(OperandKey, OperandKey, u32),
    Load(OperandKey, u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum OperandKey {
    Value(ValueId),
    ConstInt(i64, u8),
    ConstFloat(u64, u8),
    Global(String),
}

fn operand_key(op: &Operand) -> OperandKey {
    match op {
        Operand::Value(v) => OperandKey::Value(*v),
        Operand::ConstInt { value, ty } => OperandKey::ConstInt(*value, ty.size() as u8),
        Operand::ConstFloat { value, ty } => OperandKey::ConstFloat(value.to_bits(), ty.size() as u8),
        Operand::GlobalAddr(name) => OperandKey::Global(name.clone()),
        Operand::Undef(ty) => OperandKey::ConstInt(0, ty.size() as u8 | 0x80),
    }
}

fn key_for(kind: &InstrKind, ty_size: u32, loads_killed: bool) -> Option<Key> {
    match kind {
        InstrKind::Binary { op, lhs, rhs } => Some(Key::Binary(*op, operand_key(lhs), operand_key(rhs))),
        InstrKind::FloatBinary { op, lhs, rhs } => Some(Key::FloatBinary(*op, operand_key(lhs), operand_key(rhs))),
        InstrKind::Icmp { pred, lhs, rhs } => Some(Key::Icmp(*pred, operand_key(lhs), operand_key(rhs))),
        InstrKind::Fcmp { pred, lhs, rhs } => Some(Key::Fcmp(*pred, operand_key(lhs), operand_key(rhs))),
        InstrKind::Convert { op, operand } => Some(Key::Convert(*op, operand_key(operand))),
        InstrKind::Gep { base, index, elem_size } => Some(Key::Gep(operand_key(base), operand_key(index), *elem_size)),
        InstrKind::Load { ptr } if !loads_killed => Some(Key::Load(operand_key(ptr), ty_size)),
        _ => None,
    }
}

/// Runs one CSE pass, returning whether anything changed. Walks the
/// dominator tree depth-first so a value is only reused from an entry that
/// genuinely dominates the point of use.
pub fn run(func: &mut Function) -> bool {
    let dom = dominance::compute(func);
    let mut replacements: HashMap<ValueId, Operand> = HashMap::new();
    let mut available: HashMap<Key, ValueId> = HashMap::new();
    walk(func, func.entry, &dom, &mut available, &mut replacements, false);
    if replacements.is_empty() {
        return false;
    }
    super::dce::rewrite_with(func, &replacements);
    true
}

fn children_of(dom: &Dominance, b: BlockId) -> Vec<BlockId> {
    dom.idom.iter().filter(|(child, parent)| **parent == b && **child != b).map(|(c, _)| *c).collect()
}

/// `stores_seen` is true once any store or call has occurred anywhere on
/// the dominator-tree path from the entry to `b` (inclusive of ancestors);
/// once true, no `Load` is looked up or recorded for the rest of this
/// subtree, since a later load could observe a write this pass cannot
/// prove targets a disjoint object.
fn walk(func: &Function, b: BlockId, dom: &Dominance, available: &mut HashMap<Key, ValueId>, replacements: &mut HashMap<ValueId, Operand>, mut stores_seen: bool) {
    let mut introduced = Vec::new();
    for instr in &func.block(b).instrs {
        if matches!(instr.kind, InstrKind::Store { .. } | InstrKind::Call { .. }) {
            stores_seen = true;
        }
        let Some(result) = instr.result else { continue };
        if replacements.contains_key(&result) {
            continue;
        }
        let Some(key) = key_for(&instr.kind, instr.ty.size(), stores_seen) else { continue };
        if let Some(&existing) = available.get(&key) {
            replacements.insert(result, Operand::Value(existing));
        } else {
            available.insert(key.clone(), result);
            introduced.push(key);
        }
    }

    for child in children_of(dom, b) {
        walk(func, child, dom, available, replacements, stores_seen);
    }

    for key in introduced {
        available.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Function, IrType, TermKind};

    #[test]
    fn identical_add_in_same_block_is_coalesced() {
        let mut f = Function::new("f".into(), false);
        let p = f.add_param(IrType::I32);
        let a = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Add, lhs: Operand::Value(p), rhs: Operand::const_int(1, IrType::I32) });
        let b = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Add, lhs: Operand::Value(p), rhs: Operand::const_int(1, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(b))));
        f.link_cfg();
        run(&mut f);
        assert_eq!(f.block(f.entry).term.kind, TermKind::Ret(Some(Operand::Value(a))));
        assert_eq!(f.block(f.entry).instrs.len(), 1);
    }

    #[test]
    fn store_blocks_later_load_coalescing() {
        let mut f = Function::new("f".into(), false);
        let slot = f.push_instr(f.entry, IrType::Ptr, InstrKind::Alloca { size: 4, align: 4, name: "x".into() });
        let _l1 = f.push_instr(f.entry, IrType::I32, InstrKind::Load { ptr: Operand::Value(slot) });
        f.push_void_instr(f.entry, InstrKind::Store { ptr: Operand::Value(slot), value: Operand::const_int(9, IrType::I32) });
        let l2 = f.push_instr(f.entry, IrType::I32, InstrKind::Load { ptr: Operand::Value(slot) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(l2))));
        f.link_cfg();
        run(&mut f);
        let loads = f.block(f.entry).instrs.iter().filter(|i| matches!(i.kind, InstrKind::Load { .. })).count();
        assert_eq!(loads, 2);
    }
}
