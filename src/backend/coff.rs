//! Relocatable object emission: ordinary relocatable COFF or ELF object
//! files with `.text`, `.data`, `.bss` and `.rodata` sections.
//!
//! Built on the `object` crate's writer, the same crate the retrieval
//! corpus's wider ecosystem reaches for when a project needs to produce
//! object files without shelling out to an assembler. No example in this
//! workspace's reference pack uses `object` directly -- this module is
//! written from the crate's published writer API rather than adapted from a
//! grounding source, and that gap is called out in `DESIGN.md`.

use std::collections::HashMap;

use object::write::{Object, Relocation, StandardSection, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, RelocationEncoding, RelocationKind, SectionKind, SymbolFlags, SymbolKind, SymbolScope};

use crate::backend::encode::{self, RelocKind};
use crate::backend::isel;
use crate::backend::regalloc;
use crate::ir::Module;
use crate::symbol::Section as PccSection;

/// Which native object format to target; Windows builds want COFF, a
/// cross-compiled or WSL/Linux-hosted build wants ELF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFormat {
    Coff,
    Elf,
}

pub fn write_object(module: &Module, format: ObjectFormat) -> Result<Vec<u8>, crate::error::CodeGenError> {
    let binary_format = match format {
        ObjectFormat::Coff => BinaryFormat::Coff,
        ObjectFormat::Elf => BinaryFormat::Elf,
    };
    let mut obj = Object::new(binary_format, Architecture::X86_64, Endianness::Little);

    let text = obj.add_section(obj.segment_name(StandardSection::Text).to_vec(), b".text".to_vec(), SectionKind::Text);
    let data = obj.add_section(obj.segment_name(StandardSection::Data).to_vec(), b".data".to_vec(), SectionKind::Data);
    let rodata = obj.add_section(obj.segment_name(StandardSection::ReadOnlyData).to_vec(), b".rodata".to_vec(), SectionKind::ReadOnlyData);
    let bss = obj.add_section(obj.segment_name(StandardSection::UninitializedData).to_vec(), b".bss".to_vec(), SectionKind::UninitializedData);

    let mut symbol_ids = HashMap::new();
    let mut func_offsets = HashMap::new();
    let mut cursor = 0u32;
    let mut encoded_funcs = Vec::new();

    for func in &module.functions {
        let mf = isel::select(func);
        let alloc = regalloc::allocate(func);
        let enc = encode::encode_function(&mf, &alloc)?;
        func_offsets.insert(func.name.clone(), cursor);
        cursor += enc.bytes.len() as u32;
        encoded_funcs.push((func.name.clone(), enc));
    }

    let mut text_bytes = Vec::new();
    for (name, enc) in &encoded_funcs {
        let offset = text_bytes.len() as u64;
        text_bytes.extend_from_slice(&enc.bytes);
        let symbol_id = obj.add_symbol(Symbol {
            name: name.as_bytes().to_vec(),
            value: offset,
            size: enc.bytes.len() as u64,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
        symbol_ids.insert(name.clone(), symbol_id);
    }

    for g in &module.globals {
        let section = match g.section {
            PccSection::Data | PccSection::Custom => data,
            PccSection::Rodata => rodata,
            PccSection::Bss => bss,
            PccSection::Text => text,
        };
        let symbol_id = if let Some(bytes) = &g.init {
            let id = obj.add_symbol(Symbol {
                name: g.name.as_bytes().to_vec(),
                value: 0,
                size: g.size as u64,
                kind: SymbolKind::Data,
                scope: SymbolScope::Linkage,
                weak: g.weak,
                section: SymbolSection::Section(section),
                flags: SymbolFlags::None,
            });
            obj.add_symbol_data(id, section, bytes, g.align.max(1) as u64);
            id
        } else {
            obj.add_symbol_bss(
                obj.add_symbol(Symbol {
                    name: g.name.as_bytes().to_vec(),
                    value: 0,
                    size: g.size as u64,
                    kind: SymbolKind::Data,
                    scope: SymbolScope::Linkage,
                    weak: g.weak,
                    section: SymbolSection::Undefined,
                    flags: SymbolFlags::None,
                }),
                section,
                g.size as u64,
                g.align.max(1) as u64,
            )
        };
        symbol_ids.insert(g.name.clone(), symbol_id);
    }

    obj.set_section_data(text, text_bytes, 16);

    for (name, enc) in &encoded_funcs {
        let base = *func_offsets.get(name).unwrap();
        for reloc in &enc.relocs {
            let Some(&target_symbol) = symbol_ids.get(&reloc.symbol) else { continue };
            let (kind, encoding, size) = match reloc.kind {
                RelocKind::Rel32 => (RelocationKind::Relative, RelocationEncoding::X86Branch, 32),
                RelocKind::Abs32 => (RelocationKind::Absolute, RelocationEncoding::Generic, 32),
            };
            let _ = obj.add_relocation(
                text,
                Relocation { offset: (base + reloc.offset) as u64, symbol: target_symbol, addend: -4, kind, encoding, size },
            );
        }
    }

    obj.write().map_err(|e| crate::error::CodeGenError::Logic(format!("object emission failed: {e}")))
}
