//! The type table.
//!
//! Types are interned structurally after tag deduplication: two pointers to
//! `int`, however constructed, share one `TypeId`. Records and enums are the
//! exception -- two distinct `struct Point { ... }` declarations that happen
//! to be structurally identical remain distinct types, so they get their own
//! arena slot (`RecordId`/`EnumId`) rather than being hash-deduped.
//!
//! This follows an arena-plus-index pattern: every type, record and enum
//! is addressed by a stable integer id into its owning vector on
//! `TypeTable`, never by a raw pointer or `Rc`.

use bitflags::bitflags;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId(pub u32);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Qualifiers: u8 {
        const CONST    = 0b001;
        const VOLATILE = 0b010;
        const RESTRICT = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntRank {
    Bool,
    Char,
    Short,
    Int,
    Long,
    LongLong,
}

impl IntRank {
    /// Size in bytes under the Windows x64 data model (LLP64): `long` is 4
    /// bytes, `long long` is 8, matching the target ABI.
    pub fn size(self) -> u32 {
        match self {
            IntRank::Bool | IntRank::Char => 1,
            IntRank::Short => 2,
            IntRank::Int | IntRank::Long => 4,
            IntRank::LongLong => 8,
        }
    }

    pub fn align(self) -> u32 {
        self.size()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatKind {
    Float,
    Double,
    LongDouble,
}

impl FloatKind {
    pub fn size(self) -> u32 {
        match self {
            FloatKind::Float => 4,
            FloatKind::Double | FloatKind::LongDouble => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayExtent {
    Constant(u64),
    /// Extent determined from an initializer list's element count.
    Inferred,
    /// No extent given and no initializer: a flexible array member, legal
    /// only as the trailing member of a struct with at least one other
    /// named member.
    Flexible,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int { rank: IntRank, signed: bool },
    Float(FloatKind),
    Pointer(TypeId),
    Array { elem: TypeId, extent: ArrayExtent },
    Function { params: Vec<TypeId>, variadic: bool, ret: TypeId },
    Record(RecordId),
    Enum(EnumId),
    Qualified { inner: TypeId, quals: Qualifiers },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub ty: TypeId,
    pub bit_width: Option<u32>,
    /// Byte offset from the start of the record.
    pub offset: u32,
    /// Bit offset within the storage unit at `offset`, for bit-fields.
    pub bit_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Struct,
    Union,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDef {
    pub kind: RecordKind,
    pub name: Option<String>,
    pub members: Vec<Member>,
    pub size: u32,
    pub align: u32,
    pub packed: bool,
    pub has_flexible_array: bool,
    /// `false` until a definition (as opposed to a forward declaration) has
    /// been seen.
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDef {
    pub name: Option<String>,
    pub underlying: TypeId,
    pub constants: Vec<(String, i64)>,
}

/// The per-translation-unit type arena: created by the parser/semantic
/// analyzer, lives until back-end emission completes.
#[derive(Debug)]
pub struct TypeTable {
    types: Vec<Type>,
    by_type: HashMap<Type, TypeId>,
    records: Vec<RecordDef>,
    enums: Vec<EnumDef>,

    pub ty_void: TypeId,
    pub ty_bool: TypeId,
    pub ty_char: TypeId,
    pub ty_schar: TypeId,
    pub ty_uchar: TypeId,
    pub ty_short: TypeId,
    pub ty_ushort: TypeId,
    pub ty_int: TypeId,
    pub ty_uint: TypeId,
    pub ty_long: TypeId,
    pub ty_ulong: TypeId,
    pub ty_longlong: TypeId,
    pub ty_ulonglong: TypeId,
    pub ty_float: TypeId,
    pub ty_double: TypeId,
    pub ty_long_double: TypeId,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut t = TypeTable {
            types: Vec::new(),
            by_type: HashMap::new(),
            records: Vec::new(),
            enums: Vec::new(),
            ty_void: TypeId(0),
            ty_bool: TypeId(0),
            ty_char: TypeId(0),
            ty_schar: TypeId(0),
            ty_uchar: TypeId(0),
            ty_short: TypeId(0),
            ty_ushort: TypeId(0),
            ty_int: TypeId(0),
            ty_uint: TypeId(0),
            ty_long: TypeId(0),
            ty_ulong: TypeId(0),
            ty_longlong: TypeId(0),
            ty_ulonglong: TypeId(0),
            ty_float: TypeId(0),
            ty_double: TypeId(0),
            ty_long_double: TypeId(0),
        };
        t.ty_void = t.intern(Type::Void);
        t.ty_bool = t.intern(Type::Int { rank: IntRank::Bool, signed: false });
        t.ty_char = t.intern(Type::Int { rank: IntRank::Char, signed: true });
        t.ty_schar = t.ty_char;
        t.ty_uchar = t.intern(Type::Int { rank: IntRank::Char, signed: false });
        t.ty_short = t.intern(Type::Int { rank: IntRank::Short, signed: true });
        t.ty_ushort = t.intern(Type::Int { rank: IntRank::Short, signed: false });
        t.ty_int = t.intern(Type::Int { rank: IntRank::Int, signed: true });
        t.ty_uint = t.intern(Type::Int { rank: IntRank::Int, signed: false });
        t.ty_long = t.intern(Type::Int { rank: IntRank::Long, signed: true });
        t.ty_ulong = t.intern(Type::Int { rank: IntRank::Long, signed: false });
        t.ty_longlong = t.intern(Type::Int { rank: IntRank::LongLong, signed: true });
        t.ty_ulonglong = t.intern(Type::Int { rank: IntRank::LongLong, signed: false });
        t.ty_float = t.intern(Type::Float(FloatKind::Float));
        t.ty_double = t.intern(Type::Float(FloatKind::Double));
        t.ty_long_double = t.intern(Type::Float(FloatKind::LongDouble));
        t
    }

    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.by_type.get(&ty) {
            return *id;
        }
        let id = TypeId(self.types.len() as u32);
        self.by_type.insert(ty.clone(), id);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        self.intern(Type::Pointer(pointee))
    }

    pub fn qualified(&mut self, inner: TypeId, quals: Qualifiers) -> TypeId {
        if quals.is_empty() {
            return inner;
        }
        self.intern(Type::Qualified { inner, quals })
    }

    /// A fresh, never-deduplicated record slot: struct/union declarations
    /// are nominally distinct even when structurally identical.
    pub fn new_record(&mut self, kind: RecordKind, name: Option<String>) -> RecordId {
        let id = RecordId(self.records.len() as u32);
        self.records.push(RecordDef {
            kind,
            name,
            members: Vec::new(),
            size: 0,
            align: 1,
            packed: false,
            has_flexible_array: false,
            complete: false,
        });
        id
    }

    pub fn record(&self, id: RecordId) -> &RecordDef {
        &self.records[id.0 as usize]
    }

    pub fn record_mut(&mut self, id: RecordId) -> &mut RecordDef {
        &mut self.records[id.0 as usize]
    }

    pub fn record_type(&mut self, id: RecordId) -> TypeId {
        self.intern(Type::Record(id))
    }

    pub fn new_enum(&mut self, name: Option<String>, underlying: TypeId) -> EnumId {
        let id = EnumId(self.enums.len() as u32);
        self.enums.push(EnumDef { name, underlying, constants: Vec::new() });
        id
    }

    pub fn enum_def(&self, id: EnumId) -> &EnumDef {
        &self.enums[id.0 as usize]
    }

    pub fn enum_def_mut(&mut self, id: EnumId) -> &mut EnumDef {
        &mut self.enums[id.0 as usize]
    }

    pub fn enum_type(&mut self, id: EnumId) -> TypeId {
        self.intern(Type::Enum(id))
    }

    /// Strips `Qualified` wrappers to reach the underlying type.
    pub fn unqualified(&self, id: TypeId) -> TypeId {
        match self.get(id) {
            Type::Qualified { inner, .. } => self.unqualified(*inner),
            _ => id,
        }
    }

    pub fn qualifiers_of(&self, id: TypeId) -> Qualifiers {
        match self.get(id) {
            Type::Qualified { quals, .. } => *quals,
            _ => Qualifiers::empty(),
        }
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(self.get(self.unqualified(id)), Type::Int { .. } | Type::Enum(_))
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        matches!(self.get(self.unqualified(id)), Type::Float(_))
    }

    pub fn is_arithmetic(&self, id: TypeId) -> bool {
        self.is_integer(id) || self.is_float(id)
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(self.unqualified(id)), Type::Pointer(_))
    }

    pub fn is_scalar(&self, id: TypeId) -> bool {
        self.is_arithmetic(id) || self.is_pointer(id)
    }

    /// Byte size, or `None` for incomplete/void/function types.
    pub fn size_of(&self, id: TypeId) -> Option<u32> {
        match self.get(self.unqualified(id)) {
            Type::Void => None,
            Type::Int { rank, .. } => Some(rank.size()),
            Type::Float(k) => Some(k.size()),
            Type::Pointer(_) => Some(8),
            Type::Array { elem, extent } => match extent {
                ArrayExtent::Constant(n) => self.size_of(*elem).map(|s| s * (*n as u32)),
                ArrayExtent::Inferred => None,
                ArrayExtent::Flexible => Some(0),
            },
            Type::Function { .. } => None,
            Type::Record(r) => {
                let rec = self.record(*r);
                if rec.complete { Some(rec.size) } else { None }
            }
            Type::Enum(e) => self.size_of(self.enum_def(*e).underlying),
            Type::Qualified { .. } => unreachable!("unqualified() strips this"),
        }
    }

    pub fn align_of(&self, id: TypeId) -> Option<u32> {
        match self.get(self.unqualified(id)) {
            Type::Array { elem, .. } => self.align_of(*elem),
            Type::Record(r) => {
                let rec = self.record(*r);
                if rec.complete { Some(rec.align) } else { None }
            }
            Type::Enum(e) => self.align_of(self.enum_def(*e).underlying),
            _ => self.size_of(id),
        }
    }

    /// Pointer/array/function decay of an expression's type in rvalue
    /// context.
    pub fn decay(&mut self, id: TypeId) -> TypeId {
        match self.get(self.unqualified(id)).clone() {
            Type::Array { elem, .. } => self.pointer_to(elem),
            Type::Function { .. } => self.pointer_to(id),
            _ => id,
        }
    }

    /// Structural type equality used by `__builtin_types_compatible_p`:
    /// two types are compatible if, after stripping qualifiers, they
    /// intern to the same `TypeId`. Because scalar, pointer, array and
    /// function types are structurally deduplicated, equal `TypeId`s after
    /// unqualification is exactly structural equality; records/enums
    /// compare by declaration identity, so two named but identical structs
    /// from different declarations remain distinct.
    pub fn types_compatible(&self, a: TypeId, b: TypeId) -> bool {
        self.unqualified(a) == self.unqualified(b)
    }

    pub fn display(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Void => "void".to_string(),
            Type::Int { rank, signed } => {
                let base = match rank {
                    IntRank::Bool => "_Bool",
                    IntRank::Char => "char",
                    IntRank::Short => "short",
                    IntRank::Int => "int",
                    IntRank::Long => "long",
                    IntRank::LongLong => "long long",
                };
                if *signed || *rank == IntRank::Bool {
                    base.to_string()
                } else {
                    format!("unsigned {base}")
                }
            }
            Type::Float(FloatKind::Float) => "float".to_string(),
            Type::Float(FloatKind::Double) => "double".to_string(),
            Type::Float(FloatKind::LongDouble) => "long double".to_string(),
            Type::Pointer(inner) => format!("{}*", self.display(*inner)),
            Type::Array { elem, extent } => match extent {
                ArrayExtent::Constant(n) => format!("{}[{}]", self.display(*elem), n),
                ArrayExtent::Inferred => format!("{}[]", self.display(*elem)),
                ArrayExtent::Flexible => format!("{}[]", self.display(*elem)),
            },
            Type::Function { params, variadic, ret } => {
                let mut parts: Vec<String> = params.iter().map(|p| self.display(*p)).collect();
                if *variadic {
                    parts.push("...".to_string());
                }
                format!("{}({})", self.display(*ret), parts.join(", "))
            }
            Type::Record(r) => {
                let rec = self.record(*r);
                let kw = if rec.kind == RecordKind::Struct { "struct" } else { "union" };
                match &rec.name {
                    Some(n) => format!("{kw} {n}"),
                    None => format!("{kw} <anonymous>"),
                }
            }
            Type::Enum(e) => match &self.enum_def(*e).name {
                Some(n) => format!("enum {n}"),
                None => "enum <anonymous>".to_string(),
            },
            Type::Qualified { inner, quals } => {
                let mut prefix = String::new();
                if quals.contains(Qualifiers::CONST) {
                    prefix.push_str("const ");
                }
                if quals.contains(Qualifiers::VOLATILE) {
                    prefix.push_str("volatile ");
                }
                if quals.contains(Qualifiers::RESTRICT) {
                    prefix.push_str("restrict ");
                }
                format!("{prefix}{}", self.display(*inner))
            }
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        TypeTable::new()
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Struct => write!(f, "struct"),
            RecordKind::Union => write!(f, "union"),
        }
    }
}

fn align_to(offset: u32, align: u32) -> u32 {
    if align == 0 {
        return offset;
    }
    (offset + align - 1) / align * align
}

/// Computes byte offsets, the record's alignment and total size: natural
/// alignment unless `packed`; alignment is the max member alignment unless
/// overridden by `aligned(n)`; bit-fields are packed within their declared
/// underlying type's storage unit and may not straddle it.
pub fn layout_record(types: &mut TypeTable, id: RecordId, forced_align: Option<u32>) {
    let kind = types.record(id).kind;
    let packed = types.record(id).packed;
    let member_specs: Vec<(String, TypeId, Option<u32>)> = types
        .record(id)
        .members
        .iter()
        .map(|m| (m.name.clone(), m.ty, m.bit_width))
        .collect();

    let mut members = Vec::with_capacity(member_specs.len());
    let mut offset: u32 = 0;
    let mut max_align: u32 = 1;
    let mut bit_cursor: u32 = 0; // bits used within the current storage unit
    let mut unit_offset: u32 = 0;
    let mut has_flexible = false;

    for (i, (name, ty, bit_width)) in member_specs.into_iter().enumerate() {
        let is_last = i + 1 == types.record(id).members.len();
        let member_align = if packed { 1 } else { types.align_of(ty).unwrap_or(1) };
        max_align = max_align.max(member_align);

        if let Some(width) = bit_width {
            let unit_size = types.size_of(ty).unwrap_or(4);
            let unit_bits = unit_size * 8;
            if bit_cursor == 0 || bit_cursor + width > unit_bits {
                // Start a new storage unit.
                if bit_cursor != 0 {
                    offset = unit_offset + unit_size;
                }
                offset = align_to(offset, member_align);
                unit_offset = offset;
                bit_cursor = 0;
            }
            members.push(Member {
                name,
                ty,
                bit_width: Some(width),
                offset: unit_offset,
                bit_offset: bit_cursor,
            });
            bit_cursor += width;
            if kind == RecordKind::Union {
                offset = offset.max(unit_offset);
                bit_cursor = 0;
            }
            continue;
        }

        bit_cursor = 0;
        let this_offset = match kind {
            RecordKind::Struct => align_to(offset, member_align),
            RecordKind::Union => 0,
        };

        match types.size_of(ty) {
            Some(size) => {
                members.push(Member { name, ty, bit_width: None, offset: this_offset, bit_offset: 0 });
                if kind == RecordKind::Struct {
                    offset = this_offset + size;
                }
            }
            None if is_last && kind == RecordKind::Struct => {
                // Flexible array member: contributes zero to size.
                has_flexible = true;
                members.push(Member { name, ty, bit_width: None, offset: this_offset, bit_offset: 0 });
            }
            None => {
                members.push(Member { name, ty, bit_width: None, offset: this_offset, bit_offset: 0 });
            }
        }
    }

    let align = forced_align.unwrap_or(max_align).max(1);
    let raw_size = match kind {
        RecordKind::Struct => offset,
        RecordKind::Union => members
            .iter()
            .map(|m| types.size_of(m.ty).unwrap_or(0))
            .max()
            .unwrap_or(0),
    };
    let size = align_to(raw_size, align);

    let rec = types.record_mut(id);
    rec.members = members;
    rec.align = align;
    rec.size = size;
    rec.has_flexible_array = has_flexible;
    rec.complete = true;
}

/// `offsetof(T, member)`.
pub fn offset_of(types: &TypeTable, id: RecordId, member: &str) -> Option<u32> {
    types.record(id).members.iter().find(|m| m.name == member).map(|m| m.offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types_are_deduplicated() {
        let mut t = TypeTable::new();
        let p1 = t.pointer_to(t.ty_int);
        let p2 = t.pointer_to(t.ty_int);
        assert_eq!(p1, p2);
    }

    #[test]
    fn distinct_structs_are_never_deduplicated() {
        let mut t = TypeTable::new();
        let r1 = t.new_record(RecordKind::Struct, Some("Point".to_string()));
        let r2 = t.new_record(RecordKind::Struct, Some("Point".to_string()));
        t.record_mut(r1).members.push(Member { name: "x".into(), ty: t.ty_int, bit_width: None, offset: 0, bit_offset: 0 });
        t.record_mut(r2).members.push(Member { name: "x".into(), ty: t.ty_int, bit_width: None, offset: 0, bit_offset: 0 });
        layout_record(&mut t, r1, None);
        layout_record(&mut t, r2, None);
        let ty1 = t.record_type(r1);
        let ty2 = t.record_type(r2);
        assert_ne!(ty1, ty2);
    }

    #[test]
    fn struct_layout_natural_alignment() {
        // struct { char a; int b; char c; int d; }
        let mut t = TypeTable::new();
        let r = t.new_record(RecordKind::Struct, Some("Nested".to_string()));
        for (name, ty) in [("a", t.ty_char), ("b", t.ty_int), ("c", t.ty_char), ("d", t.ty_int)] {
            t.record_mut(r).members.push(Member { name: name.into(), ty, bit_width: None, offset: 0, bit_offset: 0 });
        }
        layout_record(&mut t, r, None);
        assert_eq!(offset_of(&t, r, "a"), Some(0));
        assert_eq!(offset_of(&t, r, "b"), Some(4));
        assert_eq!(offset_of(&t, r, "c"), Some(8));
        assert_eq!(offset_of(&t, r, "d"), Some(12));
        assert_eq!(t.record(r).size, 16);
        assert_eq!(t.record(r).align, 4);
    }

    #[test]
    fn struct_point_offsets() {
        let mut t = TypeTable::new();
        let r = t.new_record(RecordKind::Struct, Some("Point".to_string()));
        for name in ["x", "y", "z"] {
            t.record_mut(r).members.push(Member { name: name.into(), ty: t.ty_int, bit_width: None, offset: 0, bit_offset: 0 });
        }
        layout_record(&mut t, r, None);
        assert_eq!(offset_of(&t, r, "x"), Some(0));
        assert_eq!(offset_of(&t, r, "y"), Some(4));
        assert_eq!(offset_of(&t, r, "z"), Some(8));
    }

    #[test]
    fn packed_struct_has_no_padding() {
        let mut t = TypeTable::new();
        let r = t.new_record(RecordKind::Struct, Some("Packed".to_string()));
        t.record_mut(r).packed = true;
        t.record_mut(r).members.push(Member { name: "a".into(), ty: t.ty_char, bit_width: None, offset: 0, bit_offset: 0 });
        t.record_mut(r).members.push(Member { name: "b".into(), ty: t.ty_int, bit_width: None, offset: 0, bit_offset: 0 });
        layout_record(&mut t, r, None);
        assert_eq!(offset_of(&t, r, "b"), Some(1));
        assert_eq!(t.record(r).align, 1);
    }

    #[test]
    fn union_size_is_largest_member() {
        let mut t = TypeTable::new();
        let r = t.new_record(RecordKind::Union, Some("U".to_string()));
        t.record_mut(r).members.push(Member { name: "i".into(), ty: t.ty_int, bit_width: None, offset: 0, bit_offset: 0 });
        t.record_mut(r).members.push(Member { name: "d".into(), ty: t.ty_double, bit_width: None, offset: 0, bit_offset: 0 });
        layout_record(&mut t, r, None);
        assert_eq!(t.record(r).size, 8);
        assert_eq!(offset_of(&t, r, "i"), Some(0));
        assert_eq!(offset_of(&t, r, "d"), Some(0));
    }

    #[test]
    fn bitfield_sum_fits_one_storage_unit() {
        // struct { unsigned flag1:1; unsigned flag2:3; unsigned flag3:4; }
        let mut t = TypeTable::new();
        let r = t.new_record(RecordKind::Struct, Some("Flags".to_string()));
        for (name, width) in [("flag1", 1u32), ("flag2", 3), ("flag3", 4)] {
            t.record_mut(r).members.push(Member { name: name.into(), ty: t.ty_uint, bit_width: Some(width), offset: 0, bit_offset: 0 });
        }
        layout_record(&mut t, r, None);
        assert_eq!(t.record(r).members[0].bit_offset, 0);
        assert_eq!(t.record(r).members[1].bit_offset, 1);
        assert_eq!(t.record(r).members[2].bit_offset, 4);
        assert_eq!(t.record(r).size, 4);
    }

    #[test]
    fn flexible_array_member_contributes_zero_size() {
        let mut t = TypeTable::new();
        let r = t.new_record(RecordKind::Struct, Some("Vec".to_string()));
        t.record_mut(r).members.push(Member { name: "len".into(), ty: t.ty_int, bit_width: None, offset: 0, bit_offset: 0 });
        let arr = t.intern(Type::Array { elem: t.ty_int, extent: ArrayExtent::Flexible });
        t.record_mut(r).members.push(Member { name: "data".into(), ty: arr, bit_width: None, offset: 0, bit_offset: 0 });
        layout_record(&mut t, r, None);
        assert_eq!(t.record(r).size, 4);
        assert!(t.record(r).has_flexible_array);
    }

    #[test]
    fn offsetof_example_from_corpus() {
        // matches examples/original_source/testing/test_offsetof.c
        let mut t = TypeTable::new();
        let r = t.new_record(RecordKind::Struct, Some("Nested".to_string()));
        for (name, ty) in [("a", t.ty_char), ("b", t.ty_int), ("c", t.ty_char), ("d", t.ty_int)] {
            t.record_mut(r).members.push(Member { name: name.into(), ty, bit_width: None, offset: 0, bit_offset: 0 });
        }
        layout_record(&mut t, r, None);
        assert_eq!(offset_of(&t, r, "d"), Some(12));
    }

    #[test]
    fn types_compatible_structural() {
        let mut t = TypeTable::new();
        let a = t.pointer_to(t.ty_int);
        let b = t.pointer_to(t.ty_int);
        assert!(t.types_compatible(a, b));
        let c = t.pointer_to(t.ty_double);
        assert!(!t.types_compatible(a, c));
    }

    #[test]
    fn array_to_pointer_decay() {
        let mut t = TypeTable::new();
        let arr = t.intern(Type::Array { elem: t.ty_int, extent: ArrayExtent::Constant(10) });
        let decayed = t.decay(arr);
        assert_eq!(t.get(decayed), &Type::Pointer(t.ty_int));
    }
}
