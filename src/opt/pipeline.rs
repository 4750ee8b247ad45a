//! The fixed optimizer pass pipeline: mem2reg, constfold,
//! algebraic, strength_reduction, copy_prop, cse, dce, peephole, each run
//! once in that order, with a final mem2reg+constfold re-run to clean up
//! simplifications the later passes exposed.

use crate::ir::Module;

use super::{algebraic, constfold, copy_prop, cse, dce, mem2reg, peephole, strength_reduction};

/// Runs the complete pipeline over every function in `module`, in place.
pub fn run(module: &mut Module) {
    for func in &mut module.functions {
        run_function(func);
    }
}

/// Each pass runs exactly once, in this fixed order
/// (`constfold` and `mem2reg` internally iterate to their own fixpoint,
/// since constant folding must reach a fixpoint regardless of how many
/// times the pipeline invokes it). Mem-to-register
/// and constant folding are re-run once at the end to clean up what the
/// later passes exposed.
fn run_function(func: &mut crate::ir::Function) {
    mem2reg::run(func);
    constfold::run(func);
    algebraic::run(func);
    strength_reduction::run(func);
    copy_prop::run(func);
    cse::run(func);
    dce::run(func);
    peephole::run(func);

    mem2reg::run(func);
    constfold::run(func);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Function, InstrKind, IrType, Module, Operand, TermKind};

    #[test]
    fn pipeline_promotes_and_folds_a_trivial_local() {
        let mut f = Function::new("f".into(), false);
        let slot = f.push_instr(f.entry, IrType::Ptr, InstrKind::Alloca { size: 4, align: 4, name: "x".into() });
        f.push_void_instr(f.entry, InstrKind::Store { ptr: Operand::Value(slot), value: Operand::const_int(2, IrType::I32) });
        let loaded = f.push_instr(f.entry, IrType::I32, InstrKind::Load { ptr: Operand::Value(slot) });
        let sum = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Add, lhs: Operand::Value(loaded), rhs: Operand::const_int(3, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(sum))));
        f.link_cfg();

        let mut module = Module::new();
        module.functions.push(f);
        run(&mut module);

        let folded = &module.functions[0];
        assert!(folded.blocks.iter().all(|b| b.instrs.is_empty()));
        assert_eq!(folded.block(folded.entry).term.kind, TermKind::Ret(Some(Operand::const_int(5, IrType::I32))));
    }
}
