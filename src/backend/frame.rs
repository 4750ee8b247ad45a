//! Stack-frame layout.
//!
//! Computed once register allocation has decided which `alloca`s stay as
//! memory (never promoted by `mem2reg`, or address-taken) and how many
//! spill slots the allocator needs. Layout order, highest address first:
//! return address (implicit, owned by `call`/`ret`), saved callee-saved
//! registers, local `alloca`s, spill slots, then the callee's own
//! shadow-space reservation for functions it calls.

use std::collections::HashMap;

use crate::backend::abi::SHADOW_SPACE;
use crate::backend::regalloc::PhysReg;
use crate::ir::ValueId;

#[derive(Debug, Clone, Default)]
pub struct FrameLayout {
    /// Total frame size in bytes, 16-byte aligned at call sites (spec
    /// §4.6).
    pub size: u32,
    /// Negative-from-`rbp` byte offset for each surviving `alloca`.
    pub locals: HashMap<ValueId, i32>,
    /// Negative-from-`rbp` byte offset for each spill slot index.
    pub spills: HashMap<u32, i32>,
    pub saved_regs: Vec<PhysReg>,
    pub shadow_space: u32,
    /// Bytes of stack space the callee must additionally reserve for
    /// arguments to functions it calls whose argument count exceeds four.
    pub outgoing_args: u32,
}

pub struct FrameRequest<'a> {
    /// `(value, size, align)` for every surviving `alloca`, in the order
    /// `ir_builder` created them.
    pub allocas: &'a [(ValueId, u32, u32)],
    pub spill_slots: u32,
    pub saved_regs: &'a [PhysReg],
    pub outgoing_args: u32,
}

/// Lays out one function's frame. `rbp`-relative offsets are negative,
/// growing downward from the saved-register area.
pub fn layout(req: FrameRequest) -> FrameLayout {
    let mut cursor: i32 = 0;
    let mut locals = HashMap::new();
    let mut spills = HashMap::new();

    // Callee-saved registers are pushed in the prologue before `rbp` is
    // established as the frame base for locals, so they don't consume
    // `cursor` space here -- `asm_emit` emits explicit `push`/`pop` pairs.

    for (value, size, align) in req.allocas {
        let align = (*align).max(1);
        cursor += *size as i32;
        let rem = cursor % align as i32;
        if rem != 0 {
            cursor += align as i32 - rem;
        }
        locals.insert(*value, -cursor);
    }

    for slot in 0..req.spill_slots {
        cursor += 8;
        spills.insert(slot, -cursor);
    }

    let mut size = cursor as u32 + req.outgoing_args + SHADOW_SPACE;
    if size % 16 != 0 {
        size += 16 - (size % 16);
    }

    FrameLayout {
        size,
        locals,
        spills,
        saved_regs: req.saved_regs.to_vec(),
        shadow_space: SHADOW_SPACE,
        outgoing_args: req.outgoing_args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_is_16_byte_aligned() {
        let allocas = [(ValueId(0), 4, 4)];
        let req = FrameRequest { allocas: &allocas, spill_slots: 1, saved_regs: &[], outgoing_args: 0 };
        let layout = layout(req);
        assert_eq!(layout.size % 16, 0);
    }

    #[test]
    fn locals_are_aligned_within_the_frame() {
        let allocas = [(ValueId(0), 1, 1), (ValueId(1), 8, 8)];
        let req = FrameRequest { allocas: &allocas, spill_slots: 0, saved_regs: &[], outgoing_args: 0 };
        let layout = layout(req);
        assert_eq!(layout.locals[&ValueId(1)] % 8, 0);
    }
}
