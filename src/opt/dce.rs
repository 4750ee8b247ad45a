//! Dead-code and dead-store elimination: instructions with no
//! side effects and no live uses are removed; stores to a non-escaping
//! `alloca` that are overwritten before the next load are removed;
//! unreachable blocks are removed.

use std::collections::{HashMap, HashSet};

use crate::ir::{BlockId, Function, InstrKind, Operand, ValueId};

fn has_side_effects(kind: &InstrKind) -> bool {
    matches!(
        kind,
        InstrKind::Store { .. } | InstrKind::Call { .. } | InstrKind::VaStart { .. } | InstrKind::VaEnd { .. } | InstrKind::InlineAsm { .. }
    )
}

fn used_values(kind: &InstrKind, mut f: impl FnMut(ValueId)) {
    let mut touch = |op: &Operand| {
        if let Operand::Value(v) = op {
            f(*v);
        }
    };
    match kind {
        InstrKind::Binary { lhs, rhs, .. } | InstrKind::FloatBinary { lhs, rhs, .. } | InstrKind::Icmp { lhs, rhs, .. } | InstrKind::Fcmp { lhs, rhs, .. } => {
            touch(lhs);
            touch(rhs);
        }
        InstrKind::Convert { operand, .. } | InstrKind::Intrinsic { operand, .. } => touch(operand),
        InstrKind::Load { ptr } => touch(ptr),
        InstrKind::Store { ptr, value } => {
            touch(ptr);
            touch(value);
        }
        InstrKind::Gep { base, index, .. } => {
            touch(base);
            touch(index);
        }
        InstrKind::Phi { incomings } => {
            for (_, op) in incomings {
                touch(op);
            }
        }
        InstrKind::Call { callee, args } => {
            if let crate::ir::Callee::Indirect(op) = callee {
                touch(op);
            }
            for a in args {
                touch(a);
            }
        }
        InstrKind::VaStart { va_list } | InstrKind::VaEnd { va_list } | InstrKind::VaArg { va_list } => touch(va_list),
        InstrKind::InlineAsm { inputs, .. } => {
            for i in inputs {
                touch(i);
            }
        }
        InstrKind::Alloca { .. } => {}
    }
}

fn term_used_values(kind: &crate::ir::TermKind, mut f: impl FnMut(ValueId)) {
    use crate::ir::TermKind::*;
    match kind {
        Cbr { cond, .. } => {
            if let Operand::Value(v) = cond {
                f(*v);
            }
        }
        Switch { value, .. } => {
            if let Operand::Value(v) = value {
                f(*v);
            }
        }
        Ret(Some(Operand::Value(v))) => f(*v),
        Ret(_) | Br(_) | Unreachable => {}
    }
}

/// Rewrites every operand reference in `replacements`' keys to its value,
/// then strips the now-dead defining instructions for those keys (used by
/// `constfold` once it has computed a constant for a value, and reusable by
/// any pass that needs to both substitute and delete in one step).
pub(crate) fn rewrite_with(func: &mut Function, replacements: &HashMap<ValueId, Operand>) {
    for block in &mut func.blocks {
        for instr in &mut block.instrs {
            substitute(&mut instr.kind, replacements);
        }
        substitute_term(&mut block.term.kind, replacements);
        block.instrs.retain(|i| i.result.map(|r| !replacements.contains_key(&r)).unwrap_or(true));
    }
}

fn substitute(kind: &mut InstrKind, replacements: &HashMap<ValueId, Operand>) {
    let sub = |op: &mut Operand| {
        if let Operand::Value(v) = op {
            if let Some(r) = replacements.get(v) {
                *op = r.clone();
            }
        }
    };
    match kind {
        InstrKind::Binary { lhs, rhs, .. } | InstrKind::FloatBinary { lhs, rhs, .. } | InstrKind::Icmp { lhs, rhs, .. } | InstrKind::Fcmp { lhs, rhs, .. } => {
            sub(lhs);
            sub(rhs);
        }
        InstrKind::Convert { operand, .. } | InstrKind::Intrinsic { operand, .. } => sub(operand),
        InstrKind::Load { ptr } => sub(ptr),
        InstrKind::Store { ptr, value } => {
            sub(ptr);
            sub(value);
        }
        InstrKind::Gep { base, index, .. } => {
            sub(base);
            sub(index);
        }
        InstrKind::Phi { incomings } => {
            for (_, op) in incomings {
                sub(op);
            }
        }
        InstrKind::Call { callee, args } => {
            if let crate::ir::Callee::Indirect(op) = callee {
                sub(op);
            }
            for a in args {
                sub(a);
            }
        }
        InstrKind::VaStart { va_list } | InstrKind::VaEnd { va_list } | InstrKind::VaArg { va_list } => sub(va_list),
        InstrKind::InlineAsm { inputs, .. } => {
            for i in inputs {
                sub(i);
            }
        }
        InstrKind::Alloca { .. } => {}
    }
}

fn substitute_term(kind: &mut crate::ir::TermKind, replacements: &HashMap<ValueId, Operand>) {
    use crate::ir::TermKind::*;
    let sub = |op: &mut Operand| {
        if let Operand::Value(v) = op {
            if let Some(r) = replacements.get(v) {
                *op = r.clone();
            }
        }
    };
    match kind {
        Cbr { cond, .. } => sub(cond),
        Switch { value, .. } => sub(value),
        Ret(Some(v)) => sub(v),
        Ret(None) | Br(_) | Unreachable => {}
    }
}

/// Removes blocks with no predecessors other than the entry block (spec
/// §4.5 "Unreachable blocks ... are removed"), and any phi incoming from a
/// block that no longer exists.
fn remove_unreachable_blocks(func: &mut Function) -> bool {
    let reachable = reachable_from_entry(func);
    let removed: HashSet<BlockId> = func.blocks.iter().map(|b| b.id).filter(|id| !reachable.contains(id)).collect();
    if removed.is_empty() {
        return false;
    }
    func.blocks.retain(|b| reachable.contains(&b.id));
    for block in &mut func.blocks {
        for instr in &mut block.instrs {
            if let InstrKind::Phi { incomings } = &mut instr.kind {
                incomings.retain(|(pred, _)| !removed.contains(pred));
            }
        }
    }
    true
}

fn reachable_from_entry(func: &Function) -> HashSet<BlockId> {
    let mut seen = HashSet::new();
    let mut stack = vec![func.entry];
    while let Some(b) = stack.pop() {
        if seen.insert(b) {
            for succ in func.block(b).term.kind.clone_targets_compat(func) {
                stack.push(succ);
            }
        }
    }
    seen
}

/// A thin shim so `reachable_from_entry` can reuse `Terminator::targets`
/// without importing it under a name that collides with this module's own
/// vocabulary.
trait TargetsCompat {
    fn clone_targets_compat(&self, func: &Function) -> Vec<BlockId>;
}
impl TargetsCompat for crate::ir::TermKind {
    fn clone_targets_compat(&self, _func: &Function) -> Vec<BlockId> {
        crate::ir::Terminator { kind: self.clone() }.targets()
    }
}

/// Runs one DCE pass over `func`: removes side-effect-free dead
/// instructions, dead stores, and unreachable blocks. Returns whether
/// anything changed.
pub fn run(func: &mut Function) -> bool {
    let mut changed = false;

    loop {
        let mut used: HashSet<ValueId> = HashSet::new();
        for block in &func.blocks {
            for instr in &block.instrs {
                used_values(&instr.kind, |v| {
                    used.insert(v);
                });
            }
            term_used_values(&block.term.kind, |v| {
                used.insert(v);
            });
        }

        let mut removed_any = false;
        for block in &mut func.blocks {
            let before = block.instrs.len();
            block.instrs.retain(|instr| match instr.result {
                Some(r) if !has_side_effects(&instr.kind) => used.contains(&r),
                _ => true,
            });
            if block.instrs.len() != before {
                removed_any = true;
            }
        }

        removed_any |= remove_dead_stores(func);
        removed_any |= remove_unreachable_blocks(func);

        if !removed_any {
            break;
        }
        changed = true;
    }

    if changed {
        func.link_cfg();
    }
    changed
}

/// A store to a non-escaping `alloca` is dead if no `load` of that alloca
/// occurs between it and the next store (or the end of its block) -- a
/// conservative, block-local dead-store rule.
fn remove_dead_stores(func: &mut Function) -> bool {
    let mut changed = false;
    for block in &mut func.blocks {
        let mut dead = HashSet::new();
        let mut last_store_index: HashMap<ValueId, usize> = HashMap::new();
        for (i, instr) in block.instrs.iter().enumerate() {
            match &instr.kind {
                InstrKind::Store { ptr: Operand::Value(v), .. } => {
                    if let Some(&prev) = last_store_index.get(v) {
                        dead.insert(prev);
                    }
                    last_store_index.insert(*v, i);
                }
                InstrKind::Load { ptr: Operand::Value(v) } => {
                    last_store_index.remove(v);
                }
                InstrKind::Call { .. } | InstrKind::VaStart { .. } | InstrKind::VaArg { .. } => {
                    // A call may observe any escaped alloca through a
                    // pointer passed earlier; conservatively, clear
                    // tracked stores rather than risk removing one a
                    // callee could read.
                    last_store_index.clear();
                }
                _ => {}
            }
        }
        if !dead.is_empty() {
            changed = true;
            let mut idx = 0;
            block.instrs.retain(|_| {
                let keep = !dead.contains(&idx);
                idx += 1;
                keep
            });
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Function, InstrKind, IrType, TermKind};

    #[test]
    fn removes_unused_pure_instruction() {
        let mut f = Function::new("f".into(), false);
        let _unused = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Add, lhs: Operand::const_int(1, IrType::I32), rhs: Operand::const_int(2, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::const_int(0, IrType::I32))));
        f.link_cfg();
        assert!(run(&mut f));
        assert!(f.block(f.entry).instrs.is_empty());
    }

    #[test]
    fn second_store_to_same_slot_kills_the_first() {
        let mut f = Function::new("f".into(), false);
        let slot = f.push_instr(f.entry, IrType::Ptr, InstrKind::Alloca { size: 4, align: 4, name: "x".into() });
        f.push_void_instr(f.entry, InstrKind::Store { ptr: Operand::Value(slot), value: Operand::const_int(1, IrType::I32) });
        f.push_void_instr(f.entry, InstrKind::Store { ptr: Operand::Value(slot), value: Operand::const_int(2, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(None));
        f.link_cfg();
        run(&mut f);
        let stores = f.block(f.entry).instrs.iter().filter(|i| matches!(i.kind, InstrKind::Store { .. })).count();
        assert_eq!(stores, 1);
    }
}
