//! Mem-to-register promotion: promotes
//! `alloca`s that are never address-taken and whose only uses are direct
//! `load`/`store` to SSA values, inserting phi nodes at dominance frontiers
//! and folding the trivial phis that creates.

use std::collections::{HashMap, HashSet};

use crate::ir::{BlockId, Function, Instr, InstrKind, IrType, Operand, ValueId};
use crate::opt::dominance::{self, Dominance};

/// Runs mem-to-register once over `func`, mutating it in place. Returns
/// whether any `alloca` was promoted.
pub fn run(func: &mut Function) -> bool {
    let promotable = find_promotable(func);
    if promotable.is_empty() {
        return false;
    }

    let dom = dominance::compute(func);
    let alloca_ty = infer_types(func, &promotable);

    let phi_blocks = place_phis(func, &dom, &promotable);
    let phi_values = insert_phi_instrs(func, &phi_blocks, &alloca_ty);

    rename(func, &dom, &promotable, &phi_values, &alloca_ty);
    strip_allocas(func, &promotable);
    fold_trivial_phis(func);

    func.link_cfg();
    true
}

/// An `alloca` is promotable when every use of its result is a `Load{ptr}`
/// or `Store{ptr, ..}` naming it directly -- any other use (passed as a
/// call argument, stored as a `Store`'s *value* operand, fed to `gep`) means
/// its address escapes and the naive alloca/load/store form must stay.
fn find_promotable(func: &Function) -> HashSet<ValueId> {
    let mut escapes: HashSet<ValueId> = HashSet::new();
    let allocas: HashSet<ValueId> = func.allocas.iter().copied().collect();

    for block in &func.blocks {
        for instr in &block.instrs {
            match &instr.kind {
                InstrKind::Load { ptr } => {
                    mark_non_ptr_uses(ptr, &allocas, &mut escapes, true);
                }
                InstrKind::Store { ptr, value } => {
                    mark_non_ptr_uses(ptr, &allocas, &mut escapes, true);
                    mark_non_ptr_uses(value, &allocas, &mut escapes, false);
                }
                other => {
                    for_each_operand(other, |op| mark_non_ptr_uses(op, &allocas, &mut escapes, false));
                }
            }
        }
        for_each_term_operand(&block.term.kind, |op| mark_non_ptr_uses(op, &allocas, &mut escapes, false));
    }

    allocas.difference(&escapes).copied().collect()
}

fn mark_non_ptr_uses(op: &Operand, allocas: &HashSet<ValueId>, escapes: &mut HashSet<ValueId>, is_ptr_position: bool) {
    if let Operand::Value(v) = op {
        if allocas.contains(v) && !is_ptr_position {
            escapes.insert(*v);
        }
    }
}

fn for_each_operand(kind: &InstrKind, mut f: impl FnMut(&Operand)) {
    match kind {
        InstrKind::Binary { lhs, rhs, .. } | InstrKind::FloatBinary { lhs, rhs, .. } | InstrKind::Icmp { lhs, rhs, .. } | InstrKind::Fcmp { lhs, rhs, .. } => {
            f(lhs);
            f(rhs);
        }
        InstrKind::Convert { operand, .. } | InstrKind::Intrinsic { operand, .. } => f(operand),
        InstrKind::Gep { base, index, .. } => {
            f(base);
            f(index);
        }
        InstrKind::Phi { incomings } => {
            for (_, op) in incomings {
                f(op);
            }
        }
        InstrKind::Call { callee, args } => {
            if let crate::ir::Callee::Indirect(op) = callee {
                f(op);
            }
            for a in args {
                f(a);
            }
        }
        InstrKind::VaStart { va_list } | InstrKind::VaEnd { va_list } | InstrKind::VaArg { va_list } => f(va_list),
        InstrKind::InlineAsm { inputs, .. } => {
            for i in inputs {
                f(i);
            }
        }
        InstrKind::Alloca { .. } | InstrKind::Load { .. } | InstrKind::Store { .. } => {}
    }
}

fn for_each_term_operand(kind: &crate::ir::TermKind, mut f: impl FnMut(&Operand)) {
    use crate::ir::TermKind::*;
    match kind {
        Cbr { cond, .. } => f(cond),
        Switch { value, .. } => f(value),
        Ret(Some(v)) => f(v),
        Ret(None) | Br(_) | Unreachable => {}
    }
}

fn infer_types(func: &Function, promotable: &HashSet<ValueId>) -> HashMap<ValueId, IrType> {
    let mut tys = HashMap::new();
    for block in &func.blocks {
        for instr in &block.instrs {
            if let InstrKind::Load { ptr: Operand::Value(v) } = &instr.kind {
                if promotable.contains(v) {
                    tys.insert(*v, instr.ty);
                }
            }
            if let InstrKind::Store { ptr: Operand::Value(v), value } = &instr.kind {
                if promotable.contains(v) {
                    tys.entry(*v).or_insert_with(|| operand_ty(func, value));
                }
            }
        }
    }
    // An alloca that is stored to but never loaded still needs a type for
    // its (dead) phi/value; default to Ptr-sized i64 is wrong in general,
    // but such allocas are removed as dead stores by `dce` regardless.
    for a in promotable {
        tys.entry(*a).or_insert(IrType::I64);
    }
    tys
}

fn operand_ty(func: &Function, op: &Operand) -> IrType {
    match op {
        Operand::Value(v) => func.value_ty(*v),
        Operand::ConstInt { ty, .. } | Operand::ConstFloat { ty, .. } | Operand::Undef(ty) => *ty,
        Operand::GlobalAddr(_) => IrType::Ptr,
    }
}

/// Standard iterative phi placement: for each promotable alloca, add a phi
/// to every block in the dominance frontier of a block that stores to it,
/// iterating until no new blocks are added (a newly phi'd block counts as a
/// definition site too).
fn place_phis(func: &Function, dom: &Dominance, promotable: &HashSet<ValueId>) -> HashMap<BlockId, HashSet<ValueId>> {
    let mut result: HashMap<BlockId, HashSet<ValueId>> = HashMap::new();

    for &alloca in promotable {
        let mut def_blocks: HashSet<BlockId> = HashSet::new();
        for block in &func.blocks {
            for instr in &block.instrs {
                if let InstrKind::Store { ptr: Operand::Value(v), .. } = &instr.kind {
                    if *v == alloca {
                        def_blocks.insert(block.id);
                    }
                }
            }
        }

        let mut worklist: Vec<BlockId> = def_blocks.iter().copied().collect();
        let mut has_phi: HashSet<BlockId> = HashSet::new();
        while let Some(b) = worklist.pop() {
            if let Some(frontier) = dom.frontier.get(&b) {
                for &f in frontier {
                    if has_phi.insert(f) {
                        result.entry(f).or_default().insert(alloca);
                        if def_blocks.insert(f) {
                            worklist.push(f);
                        }
                    }
                }
            }
        }
    }

    result
}

/// Inserts a `Phi` instruction (with an empty incoming list, filled in by
/// `rename`) at the start of each block that needs one, per alloca.
fn insert_phi_instrs(func: &mut Function, phi_blocks: &HashMap<BlockId, HashSet<ValueId>>, alloca_ty: &HashMap<ValueId, IrType>) -> HashMap<(BlockId, ValueId), ValueId> {
    let mut phi_values = HashMap::new();
    for (&block, allocas) in phi_blocks {
        for &alloca in allocas {
            let ty = alloca_ty[&alloca];
            let id = func.push_instr(block, ty, InstrKind::Phi { incomings: Vec::new() });
            // Move the just-pushed phi to the front of the block's
            // instruction list so it precedes any non-phi instruction.
            let instrs = &mut func.block_mut(block).instrs;
            let last = instrs.pop().unwrap();
            instrs.insert(0, last);
            phi_values.insert((block, alloca), id);
        }
    }
    phi_values
}

/// Dominator-tree-order renaming pass: walks blocks in reverse-postorder
/// (a valid dominator-tree preorder for a reducible CFG), threading the
/// current SSA value for each promoted alloca through a scoped stack.
fn rename(func: &mut Function, dom: &Dominance, promotable: &HashSet<ValueId>, phi_values: &HashMap<(BlockId, ValueId), ValueId>, alloca_ty: &HashMap<ValueId, IrType>) {
    let mut current: HashMap<ValueId, Operand> = HashMap::new();
    for &a in promotable {
        current.insert(a, Operand::Undef(alloca_ty[&a]));
    }

    let mut replacements: HashMap<ValueId, Operand> = HashMap::new();
    let children = children_map(dom);

    // preorder DFS over the dominator tree starting at entry
    let mut stack = vec![(func.entry, current.clone())];
    let mut visited = HashSet::new();
    while let Some((block, mut scope)) = stack.pop() {
        if !visited.insert(block) {
            continue;
        }
        for (&a, &v) in phi_values.iter().filter_map(|((b, a), v)| if *b == block { Some((a, v)) } else { None }) {
            scope.insert(a, Operand::Value(v));
        }

        let instrs = func.block(block).instrs.clone();
        for instr in &instrs {
            match &instr.kind {
                InstrKind::Load { ptr: Operand::Value(v) } if promotable.contains(v) => {
                    if let Some(r) = instr.result {
                        replacements.insert(r, scope[v].clone());
                    }
                }
                InstrKind::Store { ptr: Operand::Value(v), value } if promotable.contains(v) => {
                    let resolved = resolve(value, &replacements);
                    scope.insert(*v, resolved);
                }
                _ => {}
            }
        }

        // Fill phi incomings in every CFG successor for this predecessor.
        let succs = func.block(block).succs.clone();
        for succ in succs {
            for (&(b, a), &v) in phi_values.iter() {
                if b == succ {
                    let incoming = scope[&a].clone();
                    if let InstrKind::Phi { incomings } = &mut func.block_mut(succ).instrs.iter_mut().find(|i| i.result == Some(v)).unwrap().kind {
                        if !incomings.iter().any(|(p, _)| *p == block) {
                            incomings.push((block, incoming));
                        }
                    }
                }
            }
        }

        for &child in children.get(&block).into_iter().flatten() {
            stack.push((child, scope.clone()));
        }
    }

    apply_replacements(func, &replacements);
}

fn resolve(op: &Operand, replacements: &HashMap<ValueId, Operand>) -> Operand {
    if let Operand::Value(v) = op {
        if let Some(r) = replacements.get(v) {
            return r.clone();
        }
    }
    op.clone()
}

fn children_map(dom: &Dominance) -> HashMap<BlockId, Vec<BlockId>> {
    let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for (&b, &idom) in &dom.idom {
        if b != idom {
            children.entry(idom).or_default().push(b);
        }
    }
    children
}

/// Rewrites every remaining use of a now-dead `load`'s result to the value
/// the renaming pass resolved it to.
fn apply_replacements(func: &mut Function, replacements: &HashMap<ValueId, Operand>) {
    for block in &mut func.blocks {
        for instr in &mut block.instrs {
            rewrite_operands(&mut instr.kind, replacements);
        }
        rewrite_term_operands(&mut block.term.kind, replacements);
    }
}

fn rewrite_operands(kind: &mut InstrKind, replacements: &HashMap<ValueId, Operand>) {
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
        InstrKind::Store { value, .. } => sub(value),
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
        InstrKind::Alloca { .. } | InstrKind::Load { .. } => {}
    }
}

fn rewrite_term_operands(kind: &mut crate::ir::TermKind, replacements: &HashMap<ValueId, Operand>) {
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

/// Removes the now-dead `alloca`, `load`, and `store` instructions for
/// every promoted value.
fn strip_allocas(func: &mut Function, promotable: &HashSet<ValueId>) {
    for block in &mut func.blocks {
        block.instrs.retain(|instr| match &instr.kind {
            InstrKind::Alloca { .. } => instr.result.map(|r| !promotable.contains(&r)).unwrap_or(true),
            InstrKind::Load { ptr: Operand::Value(v) } => !promotable.contains(v),
            InstrKind::Store { ptr: Operand::Value(v), .. } => !promotable.contains(v),
            _ => true,
        });
    }
    func.allocas.retain(|a| !promotable.contains(a));
}

/// Folds phis whose incoming operands are all identical, or all identical
/// except for a self-reference, replacing every use of the phi's result
/// with that single value: trivial phis are always folded away.
fn fold_trivial_phis(func: &mut Function) {
    loop {
        let mut replacement: Option<(ValueId, Operand)> = None;
        'search: for block in &func.blocks {
            for instr in &block.instrs {
                if let (Some(r), InstrKind::Phi { incomings }) = (instr.result, &instr.kind) {
                    let mut unique: Option<&Operand> = None;
                    let mut trivial = true;
                    for (_, op) in incomings {
                        if *op == Operand::Value(r) {
                            continue;
                        }
                        match unique {
                            None => unique = Some(op),
                            Some(u) if u == op => {}
                            Some(_) => {
                                trivial = false;
                                break;
                            }
                        }
                    }
                    if trivial {
                        let value = unique.cloned().unwrap_or(Operand::Undef(instr.ty));
                        replacement = Some((r, value));
                        break 'search;
                    }
                }
            }
        }
        let Some((dead, value)) = replacement else { break };
        let mut repl = HashMap::new();
        repl.insert(dead, value);
        for block in &mut func.blocks {
            block.instrs.retain(|i| i.result != Some(dead));
            for instr in &mut block.instrs {
                rewrite_operands(&mut instr.kind, &repl);
            }
            rewrite_term_operands(&mut block.term.kind, &repl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, TermKind};

    #[test]
    fn promotes_a_simple_local() {
        let mut f = Function::new("f".into(), false);
        let slot = f.push_instr(f.entry, IrType::Ptr, InstrKind::Alloca { size: 4, align: 4, name: "x".into() });
        f.push_void_instr(f.entry, InstrKind::Store { ptr: Operand::Value(slot), value: Operand::const_int(7, IrType::I32) });
        let loaded = f.push_instr(f.entry, IrType::I32, InstrKind::Load { ptr: Operand::Value(slot) });
        let sum = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Add, lhs: Operand::Value(loaded), rhs: Operand::const_int(1, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(sum))));
        f.link_cfg();

        let changed = run(&mut f);
        assert!(changed);
        assert!(f.allocas.is_empty());
        for block in &f.blocks {
            for instr in &block.instrs {
                assert!(!matches!(instr.kind, InstrKind::Alloca { .. } | InstrKind::Load { .. } | InstrKind::Store { .. }));
            }
        }
    }

    #[test]
    fn address_taken_alloca_is_not_promoted() {
        let mut f = Function::new("f".into(), false);
        let slot = f.push_instr(f.entry, IrType::Ptr, InstrKind::Alloca { size: 4, align: 4, name: "x".into() });
        f.push_void_instr(f.entry, InstrKind::Call { callee: crate::ir::Callee::Direct("use_ptr".into()), args: vec![Operand::Value(slot)] });
        f.set_terminator(f.entry, TermKind::Ret(None));
        f.link_cfg();

        let changed = run(&mut f);
        assert!(!changed);
        assert_eq!(f.allocas.len(), 1);
    }
}
