//! Copy propagation: a phi with a single distinct incoming
//! value (after ignoring self-references) and a `bitcast`-to-self convert
//! are both trivial copies; every use is rewritten to the copied value and
//! the copy instruction is deleted.

use std::collections::HashMap;

use crate::ir::{ConvOp, Function, InstrKind, Operand, ValueId};

fn trivial_copy_source(kind: &InstrKind, result: ValueId) -> Option<Operand> {
    match kind {
        InstrKind::Phi { incomings } => {
            let mut source: Option<&Operand> = None;
            for (_, op) in incomings {
                if matches!(op, Operand::Value(v) if *v == result) {
                    continue;
                }
                match source {
                    None => source = Some(op),
                    Some(prev) if prev == op => {}
                    Some(_) => return None,
                }
            }
            source.cloned()
        }
        InstrKind::Convert { op: ConvOp::Bitcast, operand } => Some(operand.clone()),
        _ => None,
    }
}

/// Runs one propagation pass, returning whether anything changed.
pub fn run(func: &mut Function) -> bool {
    let mut replacements: HashMap<ValueId, Operand> = HashMap::new();
    for block in &func.blocks {
        for instr in &block.instrs {
            let Some(result) = instr.result else { continue };
            if let Some(source) = trivial_copy_source(&instr.kind, result) {
                replacements.insert(result, source);
            }
        }
    }
    // Chase through chains of trivial copies so a use is rewritten to its
    // ultimate source, not an intermediate copy that is itself replaced.
    let keys: Vec<ValueId> = replacements.keys().copied().collect();
    for k in keys {
        let mut cur = replacements[&k].clone();
        let mut guard = 0;
        while let Operand::Value(v) = cur {
            if let Some(next) = replacements.get(&v) {
                cur = next.clone();
            } else {
                break;
            }
            guard += 1;
            if guard > replacements.len() + 1 {
                break;
            }
        }
        replacements.insert(k, cur);
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
    fn single_predecessor_phi_is_propagated() {
        let mut f = Function::new("f".into(), false);
        let p = f.add_param(IrType::I32);
        let b2 = f.new_block("b2");
        f.set_terminator(f.entry, TermKind::Br(b2));
        let phi = f.push_instr(b2, IrType::I32, InstrKind::Phi { incomings: vec![(f.entry, Operand::Value(p))] });
        f.set_terminator(b2, TermKind::Ret(Some(Operand::Value(phi))));
        f.link_cfg();
        run(&mut f);
        assert_eq!(f.block(b2).term.kind, TermKind::Ret(Some(Operand::Value(p))));
    }

    #[test]
    fn self_referential_incoming_is_ignored() {
        let mut f = Function::new("f".into(), false);
        let p = f.add_param(IrType::I32);
        let loop_b = f.new_block("loop");
        f.set_terminator(f.entry, TermKind::Br(loop_b));
        let phi = f.push_instr(loop_b, IrType::I32, InstrKind::Phi { incomings: vec![(f.entry, Operand::Value(p)), (loop_b, Operand::Value(ValueId(999)))] });
        // Make the self-reference real by overwriting the placeholder id.
        if let InstrKind::Phi { incomings } = &mut f.block_mut(loop_b).instrs[0].kind {
            incomings[1] = (loop_b, Operand::Value(phi));
        }
        f.set_terminator(loop_b, TermKind::Ret(Some(Operand::Value(phi))));
        f.link_cfg();
        run(&mut f);
        assert!(f.block(loop_b).instrs.is_empty());
        assert_eq!(f.block(loop_b).term.kind, TermKind::Ret(Some(Operand::Value(p))));
    }
}
