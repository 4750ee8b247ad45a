//! The x86-64/Windows back end: instruction selection, register allocation,
//! frame layout, and emission to either Intel-syntax assembly or a COFF/ELF
//! object file.

pub mod abi;
pub mod asm_emit;
pub mod coff;
pub mod frame;
pub mod intel_asm;
pub mod isel;
pub mod machine_ir;
pub mod regalloc;

/// The byte-level x86-64 encoder `coff`'s object-emission path drives; kept
/// private because nothing outside the back end needs raw machine code, only
/// the finished object file or assembly text.
mod encode;

pub use machine_ir::MachineFunction;
