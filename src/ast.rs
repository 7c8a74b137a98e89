//! Resolved forms of the Fortran I/O statements.
//!
//! The front end performs parsing and semantic analysis; what reaches the
//! lowering stage is already name-resolved and typed. Expressions are opaque
//! handles evaluated through [`crate::bridge::Converter`]; this module only
//! records the type facts lowering needs to pick runtime entry points.

use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Type category of an I/O list item or specifier expression.
#[derive(Debug, Clone)]
pub enum TypeCat {
    /// Signed integer; `bits` is the storage width.
    Integer { bits: u16 },
    /// Unsigned integer extension.
    Unsigned { bits: u16 },
    Real { bits: u16 },
    /// `bits` is the width of one part, not of the pair.
    Complex { bits: u16 },
    Logical { bits: u16 },
    /// `kind_bytes` is the storage unit of one character.
    Character { kind_bytes: u8 },
    /// The symbol is the derived type's description object.
    Derived(Rc<Symbol>),
}

#[derive(Debug, Clone)]
pub struct IoType {
    pub cat: TypeCat,
    pub rank: u8,
}

impl IoType {
    pub fn scalar(cat: TypeCat) -> Self {
        IoType { cat, rank: 0 }
    }

    pub fn array(cat: TypeCat, rank: u8) -> Self {
        IoType { cat, rank }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.cat, TypeCat::Derived(_))
    }

    pub fn is_character(&self) -> bool {
        matches!(self.cat, TypeCat::Character { .. })
    }

    /// Storage bytes of one element, as passed for runtime `kind` arguments.
    /// Character and derived elements have no meaningful kind here.
    pub fn kind_bytes(&self) -> Option<u16> {
        match self.cat {
            TypeCat::Integer { bits }
            | TypeCat::Unsigned { bits }
            | TypeCat::Real { bits }
            | TypeCat::Complex { bits }
            | TypeCat::Logical { bits } => Some(bits / 8),
            TypeCat::Character { .. } | TypeCat::Derived(_) => None,
        }
    }
}

/// Opaque handle naming an expression owned by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

/// A typed expression reference.
///
/// `symbol` is populated when the expression is a whole-symbol designator;
/// assigned-format resolution and namelist lowering need it.
#[derive(Debug, Clone)]
pub struct TypedExpr {
    pub id: ExprId,
    pub ty: IoType,
    pub has_vector_subscript: bool,
    pub symbol: Option<Rc<Symbol>>,
}

/// Placement of a symbol inside a common block.
#[derive(Debug, Clone)]
pub struct CommonBinding {
    /// Mangled name of the common block's global.
    pub block: String,
    pub byte_offset: u64,
}

/// The slice of a front-end symbol that lowering consumes.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: IoType,
    /// Byte size of one element, character length included.
    pub elem_bytes: u64,
    /// Constant extents for statically shaped objects; empty for scalars.
    pub shape: Vec<i64>,
    pub is_global: bool,
    pub is_alloc_or_pointer: bool,
    pub common: Option<CommonBinding>,
}

#[derive(Debug, Clone)]
pub struct NamelistGroup {
    pub name: String,
    pub members: Vec<Rc<Symbol>>,
}

/// Which defined-I/O generic a procedure implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinedIoVariant {
    ReadFormatted,
    ReadUnformatted,
    WriteFormatted,
    WriteUnformatted,
}

impl DefinedIoVariant {
    pub fn as_i32(self) -> i32 {
        match self {
            DefinedIoVariant::ReadFormatted => 0,
            DefinedIoVariant::ReadUnformatted => 1,
            DefinedIoVariant::WriteFormatted => 2,
            DefinedIoVariant::WriteUnformatted => 3,
        }
    }
}

/// One non-type-bound defined-I/O binding visible at the statement.
#[derive(Debug, Clone)]
pub struct DefinedIoProc {
    /// Description object of the derived type the generic applies to.
    pub derived: Rc<Symbol>,
    /// `None` defers the binding to the type at run time.
    pub proc: Option<Rc<Symbol>>,
    pub variant: DefinedIoVariant,
    /// The subroutine is a dummy procedure of the enclosing unit.
    pub is_dummy: bool,
    /// The subroutine is reached through a procedure pointer.
    pub is_pointer: bool,
    /// The dtv argument is polymorphic.
    pub is_polymorphic: bool,
}

#[derive(Debug, Clone)]
pub enum IoItem {
    Expr(TypedExpr),
    ImpliedDo(ImpliedDo),
}

#[derive(Debug, Clone)]
pub struct ImpliedDo {
    /// The loop control variable, as a designator.
    pub var: TypedExpr,
    pub lower: TypedExpr,
    pub upper: TypedExpr,
    pub step: Option<TypedExpr>,
    pub items: Vec<IoItem>,
}

#[derive(Debug, Clone)]
pub enum IoUnit {
    /// An external unit number.
    External(TypedExpr),
    /// A character variable acting as the unit.
    Internal(TypedExpr),
}

#[derive(Debug, Clone)]
pub enum FormatSpec {
    /// `*`
    ListDirected,
    /// A FORMAT statement label.
    Label(u32),
    /// A character expression, or an integer variable carrying an
    /// assigned format label.
    Expr(TypedExpr),
}

/// Character-valued OPEN specifiers that map one-to-one onto runtime setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectCharOpt {
    Access,
    Action,
    Asynchronous,
    Blank,
    Carriagecontrol,
    Convert,
    Decimal,
    Delim,
    Dispose,
    Encoding,
    Form,
    Pad,
    Position,
    Round,
    Sign,
}

#[derive(Debug, Clone)]
pub enum ConnectSpec {
    Unit(TypedExpr),
    NewUnit(TypedExpr),
    File(TypedExpr),
    Status(TypedExpr),
    Recl(TypedExpr),
    CharOpt(ConnectCharOpt, TypedExpr),
    Err(u32),
    IoStat(TypedExpr),
    IoMsg(TypedExpr),
}

/// Character-valued data transfer specifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferCharOpt {
    Advance,
    Asynchronous,
    Blank,
    Decimal,
    Delim,
    Pad,
    Round,
    Sign,
}

#[derive(Debug, Clone)]
pub enum IoControlSpec {
    CharOpt(TransferCharOpt, TypedExpr),
    Pos(TypedExpr),
    Rec(TypedExpr),
    /// SIZE= variable, stored after the transfer completes.
    Size(TypedExpr),
    /// ID= variable, stored after the transfer completes.
    Id(TypedExpr),
    Err(u32),
    End(u32),
    Eor(u32),
    IoStat(TypedExpr),
    IoMsg(TypedExpr),
}

/// READ, WRITE, and PRINT. PRINT carries no control list and no unit.
#[derive(Debug, Clone)]
pub struct TransferStmt {
    pub unit: Option<IoUnit>,
    pub format: Option<FormatSpec>,
    pub namelist: Option<Rc<NamelistGroup>>,
    pub controls: Vec<IoControlSpec>,
    pub items: Vec<IoItem>,
}

/// BACKSPACE, ENDFILE, REWIND, and FLUSH.
#[derive(Debug, Clone)]
pub struct PositionStmt {
    pub unit: TypedExpr,
    pub specs: Vec<PositionSpec>,
}

#[derive(Debug, Clone)]
pub enum PositionSpec {
    Err(u32),
    IoStat(TypedExpr),
    IoMsg(TypedExpr),
}

#[derive(Debug, Clone)]
pub struct CloseStmt {
    pub unit: TypedExpr,
    pub specs: Vec<CloseSpec>,
}

#[derive(Debug, Clone)]
pub enum CloseSpec {
    Status(TypedExpr),
    Err(u32),
    IoStat(TypedExpr),
    IoMsg(TypedExpr),
}

#[derive(Debug, Clone)]
pub struct OpenStmt {
    pub specs: Vec<ConnectSpec>,
}

#[derive(Debug, Clone)]
pub struct WaitStmt {
    pub unit: TypedExpr,
    pub specs: Vec<WaitSpec>,
}

#[derive(Debug, Clone)]
pub enum WaitSpec {
    Id(TypedExpr),
    Err(u32),
    End(u32),
    Eor(u32),
    IoStat(TypedExpr),
    IoMsg(TypedExpr),
}

/// Character-valued INQUIRE queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquireCharKind {
    Access,
    Action,
    Asynchronous,
    Blank,
    Carriagecontrol,
    Convert,
    Decimal,
    Delim,
    Direct,
    Dispose,
    Encoding,
    Form,
    Formatted,
    Iomsg,
    Name,
    Pad,
    Position,
    Read,
    Readwrite,
    Round,
    Sequential,
    Sign,
    Stream,
    Unformatted,
    Write,
}

impl InquireCharKind {
    pub fn keyword(self) -> &'static str {
        match self {
            InquireCharKind::Access => "ACCESS",
            InquireCharKind::Action => "ACTION",
            InquireCharKind::Asynchronous => "ASYNCHRONOUS",
            InquireCharKind::Blank => "BLANK",
            InquireCharKind::Carriagecontrol => "CARRIAGECONTROL",
            InquireCharKind::Convert => "CONVERT",
            InquireCharKind::Decimal => "DECIMAL",
            InquireCharKind::Delim => "DELIM",
            InquireCharKind::Direct => "DIRECT",
            InquireCharKind::Dispose => "DISPOSE",
            InquireCharKind::Encoding => "ENCODING",
            InquireCharKind::Form => "FORM",
            InquireCharKind::Formatted => "FORMATTED",
            InquireCharKind::Iomsg => "IOMSG",
            InquireCharKind::Name => "NAME",
            InquireCharKind::Pad => "PAD",
            InquireCharKind::Position => "POSITION",
            InquireCharKind::Read => "READ",
            InquireCharKind::Readwrite => "READWRITE",
            InquireCharKind::Round => "ROUND",
            InquireCharKind::Sequential => "SEQUENTIAL",
            InquireCharKind::Sign => "SIGN",
            InquireCharKind::Stream => "STREAM",
            InquireCharKind::Unformatted => "UNFORMATTED",
            InquireCharKind::Write => "WRITE",
        }
    }
}

/// Integer-valued INQUIRE queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquireIntKind {
    Iostat,
    Nextrec,
    Number,
    Pos,
    Recl,
    Size,
}

impl InquireIntKind {
    pub fn keyword(self) -> &'static str {
        match self {
            InquireIntKind::Iostat => "IOSTAT",
            InquireIntKind::Nextrec => "NEXTREC",
            InquireIntKind::Number => "NUMBER",
            InquireIntKind::Pos => "POS",
            InquireIntKind::Recl => "RECL",
            InquireIntKind::Size => "SIZE",
        }
    }
}

/// Logical-valued INQUIRE queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquireLogKind {
    Exist,
    Named,
    Opened,
    Pending,
}

impl InquireLogKind {
    pub fn keyword(self) -> &'static str {
        match self {
            InquireLogKind::Exist => "EXIST",
            InquireLogKind::Named => "NAMED",
            InquireLogKind::Opened => "OPENED",
            InquireLogKind::Pending => "PENDING",
        }
    }
}

#[derive(Debug, Clone)]
pub enum InquireSpec {
    Unit(TypedExpr),
    File(TypedExpr),
    CharVar(InquireCharKind, TypedExpr),
    IntVar(InquireIntKind, TypedExpr),
    LogVar(InquireLogKind, TypedExpr),
    Id(TypedExpr),
    Err(u32),
}

#[derive(Debug, Clone)]
pub enum InquireStmt {
    /// INQUIRE by unit or by file.
    Specs(Vec<InquireSpec>),
    /// INQUIRE(IOLENGTH=var) output-items.
    IoLength { var: TypedExpr, items: Vec<IoItem> },
}

#[derive(Debug, Clone)]
pub enum IoStmt {
    Backspace(PositionStmt),
    Endfile(PositionStmt),
    Rewind(PositionStmt),
    Flush(PositionStmt),
    Close(CloseStmt),
    Open(OpenStmt),
    Wait(WaitStmt),
    Read(TransferStmt),
    Write(TransferStmt),
    Print(TransferStmt),
    Inquire(InquireStmt),
}
