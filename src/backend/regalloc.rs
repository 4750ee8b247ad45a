//! Linear-scan register allocation.
//!
//! Live intervals are computed straight off the SSA form's def/use
//! positions (a linear instruction index within the function, assigned in
//! block order) rather than from a separate liveness dataflow pass: because
//! every value has exactly one definition, an interval is just
//! `[def_pos, last_use_pos]`, with uses across a block
//! boundary handled by the CFG linearisation order already matching
//! reverse-postorder on the block list the IR builder produced.

use std::collections::HashMap;

use crate::ir::{Function, IrType, ValueId};

/// A physical x86-64 register under the Windows x64 convention. `Rsp`/`Rbp`
/// are reserved for the frame and never handed out by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysReg {
    Rax, Rcx, Rdx, Rbx, Rsi, Rdi, R8, R9, R10, R11, R12, R13, R14, R15,
    Xmm0, Xmm1, Xmm2, Xmm3, Xmm4, Xmm5, Xmm6, Xmm7,
}

impl PhysReg {
    pub fn is_float(self) -> bool {
        matches!(
            self,
            PhysReg::Xmm0 | PhysReg::Xmm1 | PhysReg::Xmm2 | PhysReg::Xmm3 | PhysReg::Xmm4 | PhysReg::Xmm5 | PhysReg::Xmm6 | PhysReg::Xmm7
        )
    }

    /// Callee-saved under the Windows x64 ABI: preferred for values whose
    /// live range crosses a call.
    pub fn is_callee_saved(self) -> bool {
        matches!(self, PhysReg::Rbx | PhysReg::Rsi | PhysReg::Rdi | PhysReg::R12 | PhysReg::R13 | PhysReg::R14 | PhysReg::R15)
    }

    /// The allocation order: callee-saved integer registers last, so the
    /// allocator reaches for them only once the caller-saved pool is
    /// exhausted: callee-saved registers are preferred for values live
    /// across calls, caller-saved for short-lived values, realised here by
    /// trying caller-saved first and falling back.
    pub fn int_pool() -> &'static [PhysReg] {
        &[
            PhysReg::Rax, PhysReg::Rcx, PhysReg::Rdx, PhysReg::R8, PhysReg::R9, PhysReg::R10, PhysReg::R11,
            PhysReg::Rbx, PhysReg::Rsi, PhysReg::Rdi, PhysReg::R12, PhysReg::R13, PhysReg::R14, PhysReg::R15,
        ]
    }

    pub fn float_pool() -> &'static [PhysReg] {
        &[PhysReg::Xmm0, PhysReg::Xmm1, PhysReg::Xmm2, PhysReg::Xmm3, PhysReg::Xmm4, PhysReg::Xmm5, PhysReg::Xmm6, PhysReg::Xmm7]
    }

    /// Argument-passing integer registers, Windows x64 order.
    pub fn int_arg_regs() -> &'static [PhysReg] {
        &[PhysReg::Rcx, PhysReg::Rdx, PhysReg::R8, PhysReg::R9]
    }

    pub fn float_arg_regs() -> &'static [PhysReg] {
        &[PhysReg::Xmm0, PhysReg::Xmm1, PhysReg::Xmm2, PhysReg::Xmm3]
    }

    /// 64-bit register name, used by `asm_emit` for operand widths below 64
    /// bits too (sub-register aliasing is resolved there).
    pub fn name64(self) -> &'static str {
        match self {
            PhysReg::Rax => "rax", PhysReg::Rcx => "rcx", PhysReg::Rdx => "rdx", PhysReg::Rbx => "rbx",
            PhysReg::Rsi => "rsi", PhysReg::Rdi => "rdi", PhysReg::R8 => "r8", PhysReg::R9 => "r9",
            PhysReg::R10 => "r10", PhysReg::R11 => "r11", PhysReg::R12 => "r12", PhysReg::R13 => "r13",
            PhysReg::R14 => "r14", PhysReg::R15 => "r15",
            PhysReg::Xmm0 => "xmm0", PhysReg::Xmm1 => "xmm1", PhysReg::Xmm2 => "xmm2", PhysReg::Xmm3 => "xmm3",
            PhysReg::Xmm4 => "xmm4", PhysReg::Xmm5 => "xmm5", PhysReg::Xmm6 => "xmm6", PhysReg::Xmm7 => "xmm7",
        }
    }

    pub fn name32(self) -> &'static str {
        match self {
            PhysReg::Rax => "eax", PhysReg::Rcx => "ecx", PhysReg::Rdx => "edx", PhysReg::Rbx => "ebx",
            PhysReg::Rsi => "esi", PhysReg::Rdi => "edi", PhysReg::R8 => "r8d", PhysReg::R9 => "r9d",
            PhysReg::R10 => "r10d", PhysReg::R11 => "r11d", PhysReg::R12 => "r12d", PhysReg::R13 => "r13d",
            PhysReg::R14 => "r14d", PhysReg::R15 => "r15d",
            _ => self.name64(),
        }
    }

    pub fn name8(self) -> &'static str {
        match self {
            PhysReg::Rax => "al", PhysReg::Rcx => "cl", PhysReg::Rdx => "dl", PhysReg::Rbx => "bl",
            PhysReg::Rsi => "sil", PhysReg::Rdi => "dil", PhysReg::R8 => "r8b", PhysReg::R9 => "r9b",
            PhysReg::R10 => "r10b", PhysReg::R11 => "r11b", PhysReg::R12 => "r12b", PhysReg::R13 => "r13b",
            PhysReg::R14 => "r14b", PhysReg::R15 => "r15b",
            _ => self.name64(),
        }
    }

    /// Register name at `ty`'s width, Intel-syntax operand sizing.
    pub fn name_for(self, ty: IrType) -> &'static str {
        if self.is_float() {
            return self.name64();
        }
        match ty.size() {
            1 => self.name8(),
            4 => self.name32(),
            _ => self.name64(),
        }
    }

    /// The low 3 bits of the register's encoding, needed by `encode` for
    /// ModRM/SIB bytes; the REX.B/R/X extension bit is `self.needs_rex_ext()`.
    pub fn encoding(self) -> u8 {
        match self {
            PhysReg::Rax | PhysReg::Xmm0 => 0,
            PhysReg::Rcx | PhysReg::Xmm1 => 1,
            PhysReg::Rdx | PhysReg::Xmm2 => 2,
            PhysReg::Rbx | PhysReg::Xmm3 => 3,
            PhysReg::Rsi | PhysReg::Xmm6 => 6,
            PhysReg::Rdi | PhysReg::Xmm7 => 7,
            PhysReg::R8 | PhysReg::Xmm4 => 4,
            PhysReg::R9 | PhysReg::Xmm5 => 5,
            PhysReg::R10 => 2,
            PhysReg::R11 => 3,
            PhysReg::R12 => 4,
            PhysReg::R13 => 5,
            PhysReg::R14 => 6,
            PhysReg::R15 => 7,
        }
    }

    pub fn needs_rex_ext(self) -> bool {
        matches!(self, PhysReg::R8 | PhysReg::R9 | PhysReg::R10 | PhysReg::R11 | PhysReg::R12 | PhysReg::R13 | PhysReg::R14 | PhysReg::R15)
    }
}

/// `[start, end]` inclusive instruction-index range a value is live across,
/// in the linear order `linearize` assigns.
#[derive(Debug, Clone, Copy)]
pub struct LiveInterval {
    pub value: ValueId,
    pub start: u32,
    pub end: u32,
    pub ty: IrType,
    pub crosses_call: bool,
}

/// Where `regalloc` decided a value lives: a register, or a spill slot
/// (byte offset from the frame's spill area, assigned by `frame`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Reg(PhysReg),
    Spill(u32),
}

pub struct AllocationResult {
    pub locations: HashMap<ValueId, Location>,
    /// Callee-saved registers actually handed out, for prologue/epilogue.
    pub used_callee_saved: Vec<PhysReg>,
    /// Number of spill slots (8 bytes each) the frame must reserve.
    pub spill_slots: u32,
}

/// Assigns a dense instruction index to every value-producing point and
/// every use, walking blocks in their existing (already-reverse-postorder)
/// list order.
fn linearize(func: &Function) -> (HashMap<ValueId, u32>, HashMap<ValueId, u32>) {
    let mut def_pos = HashMap::new();
    let mut last_use = HashMap::new();
    let mut pos = 0u32;

    for (pid, _ty) in &func.params {
        def_pos.insert(*pid, 0);
    }

    let mut use_at = |v: ValueId, at: u32| {
        last_use.entry(v).and_modify(|p| *p = (*p).max(at)).or_insert(at);
    };

    for block in &func.blocks {
        for instr in &block.instrs {
            if let Some(r) = instr.result {
                def_pos.insert(r, pos);
            }
            use_instr_operands(&instr.kind, &mut |v| use_at(v, pos));
            pos += 1;
        }
        use_term_operands(&block.term.kind, &mut |v| use_at(v, pos));
        pos += 1;
    }

    (def_pos, last_use)
}

fn use_instr_operands(kind: &crate::ir::InstrKind, f: &mut dyn FnMut(ValueId)) {
    use crate::ir::InstrKind::*;
    let mut touch = |op: &crate::ir::Operand| {
        if let crate::ir::Operand::Value(v) = op {
            f(*v);
        }
    };
    match kind {
        Binary { lhs, rhs, .. } | FloatBinary { lhs, rhs, .. } | Icmp { lhs, rhs, .. } | Fcmp { lhs, rhs, .. } => {
            touch(lhs);
            touch(rhs);
        }
        Convert { operand, .. } | Intrinsic { operand, .. } => touch(operand),
        Alloca { .. } => {}
        Load { ptr } => touch(ptr),
        Store { ptr, value } => {
            touch(ptr);
            touch(value);
        }
        Gep { base, index, .. } => {
            touch(base);
            touch(index);
        }
        Phi { incomings } => {
            for (_, op) in incomings {
                touch(op);
            }
        }
        Call { callee, args } => {
            if let crate::ir::Callee::Indirect(op) = callee {
                touch(op);
            }
            for a in args {
                touch(a);
            }
        }
        VaStart { va_list } | VaEnd { va_list } | VaArg { va_list } => touch(va_list),
        InlineAsm { inputs, .. } => {
            for i in inputs {
                touch(i);
            }
        }
    }
}

fn use_term_operands(kind: &crate::ir::TermKind, f: &mut dyn FnMut(ValueId)) {
    use crate::ir::TermKind::*;
    match kind {
        Cbr { cond, .. } => {
            if let crate::ir::Operand::Value(v) = cond {
                f(*v);
            }
        }
        Switch { value, .. } => {
            if let crate::ir::Operand::Value(v) = value {
                f(*v);
            }
        }
        Ret(Some(crate::ir::Operand::Value(v))) => f(*v),
        Ret(_) | Br(_) | Unreachable => {}
    }
}

/// Which instruction positions are `call` sites, used to mark intervals
/// that must prefer a callee-saved register.
fn call_positions(func: &Function) -> Vec<u32> {
    let mut out = Vec::new();
    let mut pos = 0u32;
    for block in &func.blocks {
        for instr in &block.instrs {
            if matches!(instr.kind, crate::ir::InstrKind::Call { .. }) {
                out.push(pos);
            }
            pos += 1;
        }
        pos += 1;
    }
    out
}

/// Runs linear-scan allocation over `func`'s SSA values.
pub fn allocate(func: &Function) -> AllocationResult {
    let (def_pos, last_use) = linearize(func);
    let calls = call_positions(func);

    let mut intervals: Vec<LiveInterval> = Vec::new();
    for (value, &start) in &def_pos {
        let end = *last_use.get(value).unwrap_or(&start);
        let crosses_call = calls.iter().any(|&c| c > start && c <= end);
        intervals.push(LiveInterval { value: *value, start, end, ty: func.value_ty(*value), crosses_call });
    }
    intervals.sort_by_key(|i| i.start);

    let mut locations: HashMap<ValueId, Location> = HashMap::new();
    let mut active: Vec<LiveInterval> = Vec::new();
    let mut free_int: Vec<PhysReg> = PhysReg::int_pool().iter().rev().copied().collect();
    let mut free_float: Vec<PhysReg> = PhysReg::float_pool().iter().rev().copied().collect();
    let mut used_callee_saved: Vec<PhysReg> = Vec::new();
    let mut next_spill: u32 = 0;

    for interval in intervals {
        active.retain(|a| {
            if a.end < interval.start {
                if let Some(Location::Reg(r)) = locations.get(&a.value) {
                    if r.is_float() {
                        free_float.push(*r);
                    } else {
                        free_int.push(*r);
                    }
                }
                false
            } else {
                true
            }
        });

        let is_float = interval.ty.is_float();
        let pool = if is_float { &mut free_float } else { &mut free_int };

        let picked = if interval.crosses_call {
            pool.iter().position(|r| r.is_callee_saved()).map(|i| pool.remove(i)).or_else(|| pool.pop())
        } else {
            pool.iter().position(|r| !r.is_callee_saved()).map(|i| pool.remove(i)).or_else(|| pool.pop())
        };

        match picked {
            Some(reg) => {
                if reg.is_callee_saved() && !used_callee_saved.contains(&reg) {
                    used_callee_saved.push(reg);
                }
                locations.insert(interval.value, Location::Reg(reg));
                active.push(interval);
            }
            None => {
                locations.insert(interval.value, Location::Spill(next_spill));
                next_spill += 1;
                active.push(interval);
            }
        }
    }

    AllocationResult { locations, used_callee_saved, spill_slots: next_spill }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, InstrKind, IrType, Operand, TermKind};

    #[test]
    fn disjoint_values_can_share_a_register() {
        let mut f = Function::new("f".into(), false);
        let a = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Add, lhs: Operand::const_int(1, IrType::I32), rhs: Operand::const_int(2, IrType::I32) });
        let _b = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Add, lhs: Operand::Value(a), rhs: Operand::const_int(1, IrType::I32) });
        let c = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Mul, lhs: Operand::const_int(3, IrType::I32), rhs: Operand::const_int(4, IrType::I32) });
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(c))));
        f.link_cfg();
        let result = allocate(&f);
        assert_eq!(result.locations.len(), 3);
    }

    #[test]
    fn spills_when_pool_exhausted() {
        let mut f = Function::new("f".into(), false);
        let mut live = Vec::new();
        for i in 0..20 {
            let v = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Add, lhs: Operand::const_int(i, IrType::I32), rhs: Operand::const_int(1, IrType::I32) });
            live.push(v);
        }
        // Keep every value live until the end by returning their sum via repeated use.
        let mut acc = live[0];
        for v in &live[1..] {
            acc = f.push_instr(f.entry, IrType::I32, InstrKind::Binary { op: BinOp::Add, lhs: Operand::Value(acc), rhs: Operand::Value(*v) });
        }
        f.set_terminator(f.entry, TermKind::Ret(Some(Operand::Value(acc))));
        f.link_cfg();
        let result = allocate(&f);
        assert!(result.spill_slots > 0);
    }
}
