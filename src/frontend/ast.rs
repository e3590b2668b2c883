// Syntax tree for the analyzed C subset

use std::fmt;

/// Source location information for diagnostics (1-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Inclusive source range; `end` points at the last character of the last token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceRange {
    pub begin: SourceLocation,
    pub end: SourceLocation,
}

impl SourceRange {
    pub const fn new(begin: SourceLocation, end: SourceLocation) -> Self {
        Self { begin, end }
    }

    /// A zero-width range at a single location.
    pub const fn point(location: SourceLocation) -> Self {
        Self {
            begin: location,
            end: location,
        }
    }

    pub fn is_point(&self) -> bool {
        self.begin == self.end
    }
}

/// C types of the analyzed subset
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Char,
    Int,
    Pointer(Box<Type>),
    /// `None` for an unsized dimension (`int a[]` parameters)
    Array(Box<Type>, Option<u64>),
    Struct(String),
}

impl Type {
    pub fn pointer_to(self) -> Type {
        Type::Pointer(Box::new(self))
    }

    pub fn array_of(self, size: Option<u64>) -> Type {
        Type::Array(Box::new(self), size)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int | Type::Char)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(..))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    /// Integers and pointers: the types a branch condition may have.
    pub fn is_scalar(&self) -> bool {
        self.is_integer() || self.is_pointer()
    }

    /// Structs and arrays are bound as aggregates by the store.
    pub fn is_aggregate(&self) -> bool {
        self.is_struct() || self.is_array()
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(inner, _) => Some(inner),
            _ => None,
        }
    }

    /// Array-to-pointer decay; other types are unchanged.
    pub fn decayed(&self) -> Type {
        match self {
            Type::Array(inner, _) => Type::Pointer(inner.clone()),
            other => other.clone(),
        }
    }

    /// Bit width of integer values of this type (pointers are 64-bit).
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            Type::Char => Some(8),
            Type::Int => Some(32),
            Type::Pointer(_) => Some(64),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Char => write!(f, "char"),
            Type::Int => write!(f, "int"),
            Type::Pointer(inner) => write!(f, "{} *", inner),
            Type::Array(inner, Some(n)) => write!(f, "{}[{}]", inner, n),
            Type::Array(inner, None) => write!(f, "{}[]", inner),
            Type::Struct(name) => write!(f, "struct {}", name),
        }
    }
}

/// Binary operators that produce a value from two rvalues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinOp::Add
                | BinOp::Mul
                | BinOp::BitAnd
                | BinOp::BitOr
                | BinOp::BitXor
                | BinOp::Eq
                | BinOp::Ne
        )
    }

    /// The comparison that holds exactly when this one does not.
    pub fn negated(self) -> Option<BinOp> {
        Some(match self {
            BinOp::Eq => BinOp::Ne,
            BinOp::Ne => BinOp::Eq,
            BinOp::Lt => BinOp::Ge,
            BinOp::Le => BinOp::Gt,
            BinOp::Gt => BinOp::Le,
            BinOp::Ge => BinOp::Lt,
            _ => return None,
        })
    }

    /// The comparison with its operands swapped (`a < b` is `b > a`).
    pub fn reversed(self) -> Option<BinOp> {
        Some(match self {
            BinOp::Eq => BinOp::Eq,
            BinOp::Ne => BinOp::Ne,
            BinOp::Lt => BinOp::Gt,
            BinOp::Le => BinOp::Ge,
            BinOp::Gt => BinOp::Lt,
            BinOp::Ge => BinOp::Le,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Short-circuit operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,     // -x
    Not,     // !x
    BitNot,  // ~x
    PreInc,  // ++x
    PreDec,  // --x
    PostInc, // x++
    PostDec, // x--
    Deref,   // *x
    AddrOf,  // &x
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: SourceRange,
}

impl Expr {
    pub fn new(kind: ExprKind, range: SourceRange) -> Self {
        Self { kind, range }
    }

    pub fn location(&self) -> SourceLocation {
        self.range.begin
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLiteral(i64),
    CharLiteral(i8),
    StringLiteral(String),
    Null,
    Ident(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    /// `op` is `Some` for compound assignments (`+=` etc.)
    Assign {
        op: Option<BinOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        field: String,
        arrow: bool,
    },
    Cast {
        ty: Type,
        operand: Box<Expr>,
    },
    SizeofType(Type),
    SizeofExpr(Box<Expr>),
}

/// Variable initializer: a single expression or a (possibly nested) brace list
#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    Expr(Expr),
    List(Vec<Initializer>, SourceLocation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub init: Option<Initializer>,
    pub is_static: bool,
    pub location: SourceLocation,
}

/// One `case` (or `default` when `value` is `None`) of a switch, with the
/// statements up to the next label. Control falls through between cases.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub value: Option<Expr>,
    pub body: Vec<Stmt>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: SourceLocation,
}

impl Stmt {
    pub fn new(kind: StmtKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Decl(Vec<VarDecl>),
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        cond: Expr,
        cases: Vec<SwitchCase>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Goto(String),
    Label(String),
    Empty,
}

/// Function parameter; prototypes may leave it unnamed
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Option<String>,
    pub ty: Type,
    pub location: SourceLocation,
}

/// Function definition, or a prototype when `body` is `None`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub body: Option<Vec<Stmt>>,
    pub location: SourceLocation,
    /// Location of the closing brace
    pub end_location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function(FunctionDef),
    Struct(StructDef),
    Global(VarDecl),
}

/// A use of an object-like macro; every token produced by the expansion
/// carries this location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroExpansion {
    pub name: String,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationUnit {
    pub items: Vec<Item>,
    pub macro_expansions: Vec<MacroExpansion>,
}

impl TranslationUnit {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(f) => Some(f),
            _ => None,
        })
    }
}
