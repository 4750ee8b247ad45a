//! Windows x64 calling convention argument classification.
//!
//! Unlike the System V convention, Windows x64 assigns argument *positions*
//! to registers, not argument *kinds*: the second argument always lives in
//! `rdx`/`xmm1` depending on its own type, never spilling into a third
//! integer register just because the first two arguments were floats.

use crate::backend::regalloc::PhysReg;
use crate::ir::IrType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLoc {
    Reg(PhysReg),
    /// Offset in bytes from the first stack argument slot (past shadow
    /// space), for the fifth argument onward.
    Stack(u32),
}

/// Bytes of shadow space the caller reserves ahead of the first stack
/// argument, regardless of how many register arguments are actually used.
pub const SHADOW_SPACE: u32 = 32;

/// Classifies `params` per the Windows x64 convention, returning one
/// location per parameter in order.
pub fn classify_args(params: &[IrType]) -> Vec<ArgLoc> {
    let mut out = Vec::with_capacity(params.len());
    let mut stack_offset = 0u32;
    for (i, ty) in params.iter().enumerate() {
        if i < 4 {
            let reg = if ty.is_float() { PhysReg::float_arg_regs()[i] } else { PhysReg::int_arg_regs()[i] };
            out.push(ArgLoc::Reg(reg));
        } else {
            out.push(ArgLoc::Stack(stack_offset));
            stack_offset += 8;
        }
    }
    out
}

/// The register a function's return value is placed in for `ty`, or `None`
/// for `void`.
pub fn return_reg(ty: Option<IrType>) -> Option<PhysReg> {
    ty.map(|t| if t.is_float() { PhysReg::Xmm0 } else { PhysReg::Rax })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_int_float_args_keep_positional_registers() {
        let locs = classify_args(&[IrType::F64, IrType::I32, IrType::F64]);
        assert_eq!(locs[0], ArgLoc::Reg(PhysReg::Xmm0));
        assert_eq!(locs[1], ArgLoc::Reg(PhysReg::Rdx));
        assert_eq!(locs[2], ArgLoc::Reg(PhysReg::Xmm2));
    }

    #[test]
    fn fifth_argument_spills_to_stack() {
        let params = vec![IrType::I32; 5];
        let locs = classify_args(&params);
        assert_eq!(locs[4], ArgLoc::Stack(0));
    }
}
