//! IR value identity and machine-level types.
//!
//! Every value produced by an instruction is addressed by a `ValueId`, an
//! arena index into its owning `Function` rather than a pointer -- the same
//! discipline `types::TypeTable` uses for `TypeId`. Values are never
//! reassigned: each `ValueId` has exactly one defining instruction for the
//! lifetime of the function, SSA-style.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// A machine-level type, the vocabulary IR instructions actually compute in:
/// `void`/struct/array distinctions from the front end are gone by this
/// point, collapsed to integer width, float width, or pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrType {
    I1,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Ptr,
}

impl IrType {
    pub fn size(self) -> u32 {
        match self {
            IrType::I1 | IrType::I8 => 1,
            IrType::I16 => 2,
            IrType::I32 | IrType::F32 => 4,
            IrType::I64 | IrType::F64 | IrType::Ptr => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, IrType::F32 | IrType::F64)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, IrType::I1 | IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64)
    }
}

/// An instruction operand: either a previously defined SSA value or an
/// immediate. Folding constants into operands (rather than materialising a
/// defining instruction for every literal) keeps `constfold`/`algebraic`
/// pattern matches simple.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(ValueId),
    ConstInt { value: i64, ty: IrType },
    ConstFloat { value: f64, ty: IrType },
    /// Address of a global or string-pool entry, resolved to a label by the
    /// back end's static-data pass.
    GlobalAddr(String),
    Undef(IrType),
}

impl Operand {
    pub fn const_int(value: i64, ty: IrType) -> Operand {
        Operand::ConstInt { value, ty }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Operand::ConstInt { .. } | Operand::ConstFloat { .. })
    }

    pub fn as_const_int(&self) -> Option<i64> {
        match self {
            Operand::ConstInt { value, .. } => Some(*value),
            _ => None,
        }
    }
}
