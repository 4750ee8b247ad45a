//! Dominator tree and dominance-frontier computation over a function's CFG
//! (spec GLOSSARY "Dominance frontier"). Shared by `mem2reg` (phi placement)
//! and `cse` (deciding when a dominating definition's operands are still
//! unchanged at a later use).

use std::collections::{HashMap, HashSet};

use crate::ir::{BlockId, Function};

/// Reverse postorder over the reachable CFG starting at `entry`, the
/// traversal order the iterative dominator algorithm converges fastest in.
fn reverse_postorder(func: &Function) -> Vec<BlockId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    fn visit(func: &Function, b: BlockId, visited: &mut HashSet<BlockId>, order: &mut Vec<BlockId>) {
        if !visited.insert(b) {
            return;
        }
        for succ in &func.block(b).succs {
            visit(func, *succ, visited, order);
        }
        order.push(b);
    }
    visit(func, func.entry, &mut visited, &mut order);
    order.reverse();
    order
}

pub struct Dominance {
    pub idom: HashMap<BlockId, BlockId>,
    pub frontier: HashMap<BlockId, HashSet<BlockId>>,
    pub rpo: Vec<BlockId>,
}

impl Dominance {
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(&idom) = self.idom.get(&cur) {
            if idom == cur {
                break;
            }
            if idom == a {
                return true;
            }
            cur = idom;
        }
        false
    }
}

/// Computes immediate dominators with the standard Cooper/Harvey/Kennedy
/// iterative data-flow algorithm, then derives dominance frontiers from the
/// idom tree.
pub fn compute(func: &Function) -> Dominance {
    let rpo = reverse_postorder(func);
    let rpo_index: HashMap<BlockId, usize> = rpo.iter().enumerate().map(|(i, b)| (*b, i)).collect();

    let mut idom: HashMap<BlockId, BlockId> = HashMap::new();
    idom.insert(func.entry, func.entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter().skip(1) {
            let preds = &func.block(b).preds;
            let mut new_idom: Option<BlockId> = None;
            for &p in preds {
                if idom.contains_key(&p) {
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(cur, p, &idom, &rpo_index),
                    });
                }
            }
            if let Some(ni) = new_idom {
                if idom.get(&b) != Some(&ni) {
                    idom.insert(b, ni);
                    changed = true;
                }
            }
        }
    }

    let mut frontier: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for &b in &rpo {
        frontier.entry(b).or_default();
    }
    for &b in &rpo {
        let preds = &func.block(b).preds;
        if preds.len() >= 2 {
            for &p in preds {
                let mut runner = p;
                while Some(&runner) != idom.get(&b) {
                    frontier.entry(runner).or_default().insert(b);
                    match idom.get(&runner) {
                        Some(&next) if next != runner => runner = next,
                        _ => break,
                    }
                }
            }
        }
    }

    Dominance { idom, frontier, rpo }
}

fn intersect(mut a: BlockId, mut b: BlockId, idom: &HashMap<BlockId, BlockId>, rpo_index: &HashMap<BlockId, usize>) -> BlockId {
    while a != b {
        while rpo_index[&a] > rpo_index[&b] {
            a = idom[&a];
        }
        while rpo_index[&b] > rpo_index[&a] {
            b = idom[&b];
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IrType, Operand, TermKind};

    #[test]
    fn diamond_merge_block_is_dominated_by_entry() {
        let mut f = Function::new("f".into(), false);
        let then_b = f.new_block("then");
        let else_b = f.new_block("else");
        let merge = f.new_block("merge");
        f.set_terminator(f.entry, TermKind::Cbr { cond: Operand::const_int(1, IrType::I1), then_block: then_b, else_block: else_b });
        f.set_terminator(then_b, TermKind::Br(merge));
        f.set_terminator(else_b, TermKind::Br(merge));
        f.set_terminator(merge, TermKind::Ret(None));
        f.link_cfg();

        let dom = compute(&f);
        assert!(dom.dominates(f.entry, merge));
        assert!(!dom.dominates(then_b, merge));
        assert!(dom.frontier[&then_b].contains(&merge));
        assert!(dom.frontier[&else_b].contains(&merge));
    }
}
