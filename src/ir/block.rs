//! Basic blocks.

use crate::ir::instr::{Instr, TermKind, Terminator};
use crate::ir::value::BlockId;

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub instrs: Vec<Instr>,
    /// `Unreachable` until `Function::set_terminator` runs; every block must
    /// carry a real terminator before the function is handed to the
    /// optimizer.
    pub term: Terminator,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(id: BlockId, label: String) -> Self {
        BasicBlock {
            id,
            label,
            instrs: Vec::new(),
            term: Terminator { kind: TermKind::Unreachable },
            preds: Vec::new(),
            succs: Vec::new(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        !matches!(self.term.kind, TermKind::Unreachable)
    }
}
