//! IR instructions and terminators.

use crate::ir::value::{BlockId, IrType, Operand, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    Ashr,
    Lshr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl IcmpPred {
    /// The predicate obtained by swapping the two operands, used by
    /// `algebraic`/`peephole` when canonicalising comparisons.
    pub fn swapped(self) -> IcmpPred {
        match self {
            IcmpPred::Eq => IcmpPred::Eq,
            IcmpPred::Ne => IcmpPred::Ne,
            IcmpPred::Slt => IcmpPred::Sgt,
            IcmpPred::Sle => IcmpPred::Sge,
            IcmpPred::Sgt => IcmpPred::Slt,
            IcmpPred::Sge => IcmpPred::Sle,
            IcmpPred::Ult => IcmpPred::Ugt,
            IcmpPred::Ule => IcmpPred::Uge,
            IcmpPred::Ugt => IcmpPred::Ult,
            IcmpPred::Uge => IcmpPred::Ule,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvOp {
    Sext,
    Zext,
    Trunc,
    FpToSi,
    SiToFp,
    Bitcast,
    PtrToInt,
    IntToPtr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatBinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FcmpPred {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Direct(String),
    Indirect(Operand),
}

/// Intrinsics whose result depends on a runtime operand value, lowered to a
/// dedicated IR op rather than a regular call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Clz,
    Ctz,
    Popcount,
    Abs,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    Binary { op: BinOp, lhs: Operand, rhs: Operand },
    FloatBinary { op: FloatBinOp, lhs: Operand, rhs: Operand },
    Icmp { pred: IcmpPred, lhs: Operand, rhs: Operand },
    Fcmp { pred: FcmpPred, lhs: Operand, rhs: Operand },
    Convert { op: ConvOp, operand: Operand },
    /// Materialises stack storage for one object; result is a `Ptr` value.
    /// `size`/`align` are already resolved from the front-end type; the IR
    /// carries no back-reference to `TypeTable`.
    Alloca { size: u32, align: u32, name: String },
    Load { ptr: Operand },
    Store { ptr: Operand, value: Operand },
    /// Pointer arithmetic: `base + index*elem_size`.
    Gep { base: Operand, index: Operand, elem_size: u32 },
    Phi { incomings: Vec<(BlockId, Operand)> },
    Call { callee: Callee, args: Vec<Operand> },
    VaStart { va_list: Operand },
    VaArg { va_list: Operand },
    VaEnd { va_list: Operand },
    Intrinsic { op: Intrinsic, operand: Operand },
    /// A GNU `asm` statement lowered verbatim: `template` uses `%0`-style
    /// placeholders, `inputs[n]` fills `%n`, and
    /// the single `"=r"` output (if any) is the instruction's `result`.
    /// Operand constraints were already validated by `sema::resolve::check_asm`.
    InlineAsm { template: String, inputs: Vec<Operand> },
}

/// One instruction. `result` is `None` for instructions with no value (a
/// `store`, a `void` call, `va_start`/`va_end`).
#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub result: Option<ValueId>,
    pub ty: IrType,
    pub kind: InstrKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TermKind {
    Br(BlockId),
    Cbr { cond: Operand, then_block: BlockId, else_block: BlockId },
    Switch { value: Operand, cases: Vec<(i64, BlockId)>, default: BlockId },
    Ret(Option<Operand>),
    Unreachable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Terminator {
    pub kind: TermKind,
}

impl Terminator {
    /// The set of blocks this terminator transfers control to, in no
    /// particular order (used to (re)build `BasicBlock::succs`).
    pub fn targets(&self) -> Vec<BlockId> {
        match &self.kind {
            TermKind::Br(b) => vec![*b],
            TermKind::Cbr { then_block, else_block, .. } => vec![*then_block, *else_block],
            TermKind::Switch { cases, default, .. } => {
                let mut t: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                t.push(*default);
                t
            }
            TermKind::Ret(_) | TermKind::Unreachable => vec![],
        }
    }
}
