//! Token kinds and the literal-suffix flags the lexer attaches.

use crate::diag::SourceLoc;
use bitflags::bitflags;

bitflags! {
    /// Integer literal suffix flags (`u`, `l`, `ll`, case-insensitive combinations).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IntSuffix: u8 {
        const UNSIGNED  = 0b0001;
        const LONG      = 0b0010;
        const LONG_LONG = 0b0100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radix {
    Decimal,
    Octal,
    Hex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatSuffix {
    None,
    Float,
    LongDouble,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Reserved word, e.g. `int`, `return`, `_Generic`.
    Keyword(Keyword),
    Identifier(String),
    IntLiteral { value: u64, radix: Radix, suffix: IntSuffix },
    FloatLiteral { text: String, suffix: FloatSuffix },
    /// Character literal, already escape-processed. Multi-character
    /// constants are packed MSB-first into `value`.
    CharLiteral { value: i64, width: u8 },
    StringLiteral(String),
    Punctuator(Punct),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Void, Char, Short, Int, Long, Float, Double, Signed, Unsigned, Bool,
    Struct, Union, Enum, Typedef,
    Const, Volatile, Restrict,
    Auto, Static, Extern, Register,
    If, Else, Switch, Case, Default,
    While, Do, For, Break, Continue, Return, Goto,
    Sizeof, Alignof, StaticAssert, Generic, Typeof, Attribute, Asm,
    Inline, Noreturn,
}

impl Keyword {
    pub fn from_str(s: &str) -> Option<Keyword> {
        use Keyword::*;
        Some(match s {
            "void" => Void, "char" => Char, "short" => Short, "int" => Int,
            "long" => Long, "float" => Float, "double" => Double,
            "signed" => Signed, "unsigned" => Unsigned,
            "_Bool" => Bool,
            "struct" => Struct, "union" => Union, "enum" => Enum, "typedef" => Typedef,
            "const" => Const, "volatile" => Volatile, "restrict" => Restrict,
            "auto" => Auto, "static" => Static, "extern" => Extern, "register" => Register,
            "if" => If, "else" => Else, "switch" => Switch, "case" => Case, "default" => Default,
            "while" => While, "do" => Do, "for" => For, "break" => Break,
            "continue" => Continue, "return" => Return, "goto" => Goto,
            "sizeof" => Sizeof,
            "_Alignof" | "__alignof" | "__alignof__" => Alignof,
            "_Static_assert" | "static_assert" => StaticAssert,
            "_Generic" => Generic,
            "typeof" | "__typeof__" => Typeof,
            "__attribute__" | "__attribute" => Attribute,
            "asm" | "__asm" | "__asm__" => Asm,
            "inline" | "__inline" | "__inline__" => Inline,
            "_Noreturn" => Noreturn,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen, RParen, LBrace, RBrace, LBracket, RBracket,
    Semi, Comma, Colon, Question, Dot, Arrow, Ellipsis,
    Plus, Minus, Star, Slash, Percent,
    Amp, Pipe, Caret, Tilde, Bang,
    Shl, Shr,
    Lt, Gt, Le, Ge, EqEq, Ne,
    AmpAmp, PipePipe,
    Assign,
    PlusEq, MinusEq, StarEq, SlashEq, PercentEq,
    AmpEq, PipeEq, CaretEq, ShlEq, ShrEq,
    PlusPlus, MinusMinus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub loc: SourceLoc,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
