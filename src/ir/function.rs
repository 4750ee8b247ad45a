//! Function-level IR container.

use crate::ir::block::BasicBlock;
use crate::ir::instr::{Instr, InstrKind, TermKind};
use crate::ir::value::{BlockId, IrType, ValueId};

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<(ValueId, IrType)>,
    pub ret: Option<IrType>,
    pub variadic: bool,
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    /// `ValueId(n).0 as usize` indexes this vector; populated as values are
    /// created, never shrunk (dead-code elimination removes the defining
    /// instruction, not the type-table slot).
    value_types: Vec<IrType>,
    /// Locals materialised as `alloca`s before mem-to-register runs (spec
    /// §4.4 "a deliberately naive lowering").
    pub allocas: Vec<ValueId>,
}

impl Function {
    pub fn new(name: String, variadic: bool) -> Self {
        let mut f = Function {
            name,
            params: Vec::new(),
            ret: None,
            variadic,
            blocks: Vec::new(),
            entry: BlockId(0),
            value_types: Vec::new(),
            allocas: Vec::new(),
        };
        let entry = f.new_block("entry");
        f.entry = entry;
        f
    }

    pub fn new_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id, label.into()));
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    fn new_value(&mut self, ty: IrType) -> ValueId {
        let id = ValueId(self.value_types.len() as u32);
        self.value_types.push(ty);
        id
    }

    pub fn value_ty(&self, id: ValueId) -> IrType {
        self.value_types[id.0 as usize]
    }

    pub fn value_count(&self) -> usize {
        self.value_types.len()
    }

    pub fn add_param(&mut self, ty: IrType) -> ValueId {
        let id = self.new_value(ty);
        self.params.push((id, ty));
        id
    }

    /// Appends a value-producing instruction to `block` and returns its
    /// result id.
    pub fn push_instr(&mut self, block: BlockId, ty: IrType, kind: InstrKind) -> ValueId {
        let id = self.new_value(ty);
        if matches!(kind, InstrKind::Alloca { .. }) {
            self.allocas.push(id);
        }
        self.block_mut(block).instrs.push(Instr { result: Some(id), ty, kind });
        id
    }

    /// Appends an instruction with no result (`store`, a `void`-returning
    /// call, `va_start`/`va_end`). The `ty` field is unused for these and
    /// set to `I1` as a sentinel.
    pub fn push_void_instr(&mut self, block: BlockId, kind: InstrKind) {
        self.block_mut(block).instrs.push(Instr { result: None, ty: IrType::I1, kind });
    }

    pub fn set_terminator(&mut self, block: BlockId, kind: TermKind) {
        self.block_mut(block).term.kind = kind;
    }

    /// Recomputes every block's `preds`/`succs` from its terminator. Called
    /// once lowering for a function completes, and again by any optimizer
    /// pass that changes control flow.
    pub fn link_cfg(&mut self) {
        for b in &mut self.blocks {
            b.preds.clear();
            b.succs.clear();
        }
        let edges: Vec<(BlockId, BlockId)> = self
            .blocks
            .iter()
            .flat_map(|b| b.term.targets().into_iter().map(move |t| (b.id, t)))
            .collect();
        for (from, to) in edges {
            self.block_mut(from).succs.push(to);
            self.block_mut(to).preds.push(from);
        }
    }
}
