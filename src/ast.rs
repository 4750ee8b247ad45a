//! Abstract syntax tree built by the parser.
//!
//! Declarator types are represented as `TypeNode`, an unresolved mirror of
//! `crate::types::Type` that the parser builds directly from declarator
//! grammar; the semantic analyzer (`crate::sema`) resolves each `TypeNode`
//! into a `TypeId` once typedefs, tags and array-extent constant expressions
//! are available. Every node carries the source coordinates of its first
//! token, copied in by the parser.

use crate::diag::SourceLoc;
pub use crate::lexer::token::{FloatSuffix, IntSuffix};
use crate::types::Qualifiers;

#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub decls: Vec<ExternalDecl>,
}

#[derive(Debug, Clone)]
pub enum ExternalDecl {
    Function(FunctionDef),
    Var(VarDecl),
    Typedef(TypedefDecl),
    StaticAssert(StaticAssertDecl),
    /// A bare `struct Foo { ... };` or `enum Bar { ... };` with no declarator.
    Tag(TypeNode),
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub ret: TypeNode,
    pub params: Vec<ParamDecl>,
    pub variadic: bool,
    pub storage: Option<StorageClassSpec>,
    pub attrs: Vec<Attribute>,
    pub body: Option<Vec<BlockItem>>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: Option<String>,
    pub ty: TypeNode,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeNode,
    pub storage: Option<StorageClassSpec>,
    pub attrs: Vec<Attribute>,
    pub init: Option<Initializer>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub struct TypedefDecl {
    pub name: String,
    pub ty: TypeNode,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub struct StaticAssertDecl {
    pub cond: Box<Expr>,
    pub message: Option<String>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClassSpec {
    Auto,
    Static,
    Extern,
    Register,
    Typedef,
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub args: Vec<Expr>,
    pub loc: SourceLoc,
}

// ---------------------------------------------------------------------
// Unresolved declarator types
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum TypeNode {
    Void,
    Char,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    LongDouble,
    Bool,
    /// Reference to a `typedef` name, resolved during semantic analysis.
    Named(String),
    Struct(RecordSpec),
    Union(RecordSpec),
    Enum(EnumSpec),
    Pointer(Box<TypeNode>),
    /// `None` size means either an inferred extent (from an initializer) or
    /// a trailing flexible array member; the semantic analyzer
    /// disambiguates using context.
    Array(Box<TypeNode>, Option<Box<Expr>>),
    Function(Box<TypeNode>, Vec<ParamDecl>, bool),
    Typeof(Box<Expr>),
    Qualified(Box<TypeNode>, Qualifiers),
}

#[derive(Debug, Clone)]
pub struct RecordSpec {
    pub name: Option<String>,
    /// `None` for a forward declaration / use of a previously defined tag.
    pub fields: Option<Vec<FieldDecl>>,
    pub attrs: Vec<Attribute>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: Option<String>,
    pub ty: TypeNode,
    pub bit_width: Option<Box<Expr>>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub struct EnumSpec {
    pub name: Option<String>,
    pub constants: Option<Vec<EnumConstant>>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub struct EnumConstant {
    pub name: String,
    pub value: Option<Box<Expr>>,
    pub loc: SourceLoc,
}

// ---------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum BlockItem {
    Decl(Declaration),
    Stmt(Stmt),
}

#[derive(Debug, Clone)]
pub enum Declaration {
    Var(VarDecl),
    Typedef(TypedefDecl),
    StaticAssert(StaticAssertDecl),
    Tag(TypeNode),
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Compound(Vec<BlockItem>),
    Expr(Option<Box<Expr>>),
    If { cond: Box<Expr>, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>> },
    Switch { cond: Box<Expr>, body: Box<Stmt> },
    Case { value: Box<Expr>, stmt: Box<Stmt> },
    Default { stmt: Box<Stmt> },
    While { cond: Box<Expr>, body: Box<Stmt> },
    DoWhile { body: Box<Stmt>, cond: Box<Expr> },
    For { init: Option<ForInit>, cond: Option<Box<Expr>>, step: Option<Box<Expr>>, body: Box<Stmt> },
    Break,
    Continue,
    Return(Option<Box<Expr>>),
    Labeled { label: String, stmt: Box<Stmt> },
    Goto(String),
    Null,
    Asm(AsmStmt),
}

#[derive(Debug, Clone)]
pub enum ForInit {
    Decl(Vec<VarDecl>),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct AsmStmt {
    pub template: String,
    pub outputs: Vec<AsmOperand>,
    pub inputs: Vec<AsmOperand>,
    pub clobbers: Vec<String>,
    pub volatile: bool,
}

#[derive(Debug, Clone)]
pub struct AsmOperand {
    /// Only `"=r"` (output) and `"r"` (input) are implemented by the back
    /// end; anything else is rejected with a semantic error naming the
    /// constraint.
    pub constraint: String,
    pub expr: Box<Expr>,
}

// ---------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLiteral { value: u64, suffix: IntSuffix },
    FloatLiteral { text: String, suffix: FloatSuffix },
    CharLiteral { value: i64, width: u8 },
    StringLiteral(String),
    Ident(String),
    Unary { op: UnaryOp, expr: Box<Expr> },
    PostInc(Box<Expr>),
    PostDec(Box<Expr>),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// GNU `a ?: b` is represented with `then_expr: None`: the condition is
    /// evaluated exactly once and its value is also the "then" value.
    Ternary { cond: Box<Expr>, then_expr: Option<Box<Expr>>, else_expr: Box<Expr> },
    Assign { op: AssignOp, target: Box<Expr>, value: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Index { base: Box<Expr>, index: Box<Expr> },
    Member { base: Box<Expr>, name: String, arrow: bool },
    AddrOf(Box<Expr>),
    Deref(Box<Expr>),
    Cast { ty: TypeNode, expr: Box<Expr> },
    Sizeof(SizeofArg),
    Alignof(TypeNode),
    CompoundLiteral { ty: TypeNode, init: Initializer },
    /// GNU statement expression `({ ... })`.
    StmtExpr(Vec<BlockItem>),
    Comma(Box<Expr>, Box<Expr>),
    Generic { controlling: Box<Expr>, assocs: Vec<GenericAssoc> },
    BuiltinOffsetof { ty: TypeNode, member: String },
    BuiltinChooseExpr { cond: Box<Expr>, a: Box<Expr>, b: Box<Expr> },
    BuiltinTypesCompatibleP { a: TypeNode, b: TypeNode },
    BuiltinConstantP(Box<Expr>),
    BuiltinVaStart { va_list: Box<Expr>, last_param: String },
    BuiltinVaArg { va_list: Box<Expr>, ty: TypeNode },
    BuiltinVaEnd(Box<Expr>),
    /// Other `__builtin_*` calls given meaning by the semantic analyzer:
    /// `__builtin_expect`, `__builtin_clz`, `__builtin_ctz`,
    /// `__builtin_popcount`, `__builtin_abs`.
    BuiltinCall { name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone)]
pub enum SizeofArg {
    Type(TypeNode),
    Expr(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct GenericAssoc {
    /// `None` marks the `default` association.
    pub ty: Option<TypeNode>,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone)]
pub enum Initializer {
    Expr(Box<Expr>),
    List(Vec<(Vec<Designator>, Initializer)>),
}

#[derive(Debug, Clone)]
pub enum Designator {
    Field(String),
    Index(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    PreInc,
    PreDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add, Sub, Mul, Div, Mod,
    Shl, Shr,
    Lt, Gt, Le, Ge, Eq, Ne,
    BitAnd, BitOr, BitXor,
    LogAnd, LogOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign, SubAssign, MulAssign, DivAssign, ModAssign,
    ShlAssign, ShrAssign, AndAssign, OrAssign, XorAssign,
}

impl AssignOp {
    /// The underlying binary operator for a compound assignment, or `None`
    /// for plain `=`.
    pub fn binary_op(self) -> Option<BinaryOp> {
        use AssignOp::*;
        Some(match self {
            Assign => return None,
            AddAssign => BinaryOp::Add,
            SubAssign => BinaryOp::Sub,
            MulAssign => BinaryOp::Mul,
            DivAssign => BinaryOp::Div,
            ModAssign => BinaryOp::Mod,
            ShlAssign => BinaryOp::Shl,
            ShrAssign => BinaryOp::Shr,
            AndAssign => BinaryOp::BitAnd,
            OrAssign => BinaryOp::BitOr,
            XorAssign => BinaryOp::BitXor,
        })
    }
}
