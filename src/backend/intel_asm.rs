//! Intel-syntax text formatting for machine operands. Inline `asm` blocks
//! are written in Intel syntax, so the emitter follows suit for the rest
//! of the generated assembly.

use crate::backend::machine_ir::{MOperand, MReg};
use crate::backend::regalloc::{Location, PhysReg};
use std::collections::HashMap;

/// Resolves `MReg::Virtual` ids to their allocated physical register or
/// spill-slot memory operand; `asm_emit` calls this once per operand right
/// before printing.
pub fn resolve_reg(reg: MReg, locations: &HashMap<crate::ir::ValueId, Location>) -> ResolvedReg {
    match reg {
        MReg::Phys(p) => ResolvedReg::Phys(p),
        MReg::Virtual(v) => match locations.get(&v) {
            Some(Location::Reg(p)) => ResolvedReg::Phys(*p),
            Some(Location::Spill(slot)) => ResolvedReg::Spill(*slot),
            None => panic!("machine operand references unallocated value {v:?}"),
        },
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ResolvedReg {
    Phys(PhysReg),
    Spill(u32),
}

fn reg_width_name(reg: PhysReg, width: u8) -> &'static str {
    match width {
        1 => reg.name8(),
        4 => reg.name32(),
        _ => reg.name64(),
    }
}

fn ptr_size_keyword(width: u8) -> &'static str {
    match width {
        1 => "byte",
        2 => "word",
        4 => "dword",
        _ => "qword",
    }
}

/// Formats `operand` as Intel-syntax assembly text at the given operand
/// `width` in bytes, resolving any still-virtual register through
/// `spill_offsets` (rbp-relative byte offsets for spilled values, keyed by
/// the slot `Location::Spill` carries).
pub fn format_operand(operand: &MOperand, width: u8, locations: &HashMap<crate::ir::ValueId, Location>, spill_offsets: &HashMap<u32, i32>) -> String {
    match operand {
        MOperand::Imm(v) => v.to_string(),
        MOperand::Label(name) => name.clone(),
        MOperand::Reg(r) => match resolve_reg(*r, locations) {
            ResolvedReg::Phys(p) => reg_width_name(p, width).to_string(),
            ResolvedReg::Spill(slot) => {
                let off = spill_offsets.get(&slot).copied().unwrap_or(0);
                format!("{} [rbp{}]", ptr_size_keyword(width), signed_offset(off))
            }
        },
        MOperand::Mem { base, index, disp } => {
            let mut parts = Vec::new();
            if let Some(b) = base {
                if let ResolvedReg::Phys(p) = resolve_reg(*b, locations) {
                    parts.push(p.name64().to_string());
                } else if let ResolvedReg::Spill(slot) = resolve_reg(*b, locations) {
                    let off = spill_offsets.get(&slot).copied().unwrap_or(0);
                    parts.push(format!("rbp{}", signed_offset(off)));
                }
            }
            if let Some((idx, scale)) = index {
                if let ResolvedReg::Phys(p) = resolve_reg(*idx, locations) {
                    parts.push(format!("{}*{}", p.name64(), scale));
                }
            }
            let mut addr = parts.join(" + ");
            if *disp != 0 || addr.is_empty() {
                if addr.is_empty() {
                    addr = disp.to_string();
                } else {
                    addr.push_str(&signed_offset(*disp));
                }
            }
            format!("{} [{}]", ptr_size_keyword(width), addr)
        }
        MOperand::MemLabel { label, index, disp } => {
            let mut addr = label.clone();
            if let Some((idx, scale)) = index {
                if let ResolvedReg::Phys(p) = resolve_reg(*idx, locations) {
                    addr.push_str(&format!(" + {}*{}", p.name64(), scale));
                }
            }
            if *disp != 0 {
                addr.push_str(&signed_offset(*disp));
            }
            format!("{} [{}]", ptr_size_keyword(width), addr)
        }
    }
}

fn signed_offset(off: i32) -> String {
    if off >= 0 {
        format!(" + {off}")
    } else {
        format!(" - {}", -off)
    }
}
