//! Typed program representation consumed by the engine
//!
//! Every expression of every function lives in one arena owned by
//! [`Program`] and is addressed by [`ExprId`]. Expressions are fully typed
//! and carry explicit conversions:
//!
//! - lvalues (`VarRef`, `Deref`, `Member`, `Index`, string literals) evaluate
//!   to locations; `Load` turns them into values
//! - arrays used as values go through `Decay`
//! - integer/pointer conversions are explicit `Cast`s
//!
//! Function bodies are lowered to a [`Cfg`] of [`BasicBlock`]s whose
//! elements are listed in evaluation order.

use crate::frontend::ast::{BinOp, MacroExpansion, SourceLocation, SourceRange, Type};
use rustc_hash::FxHashMap;
use std::fmt;

use super::liveness::LiveVariables;

macro_rules! index_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

index_type!(
    /// Index into [`Program::exprs`]
    ExprId
);
index_type!(
    /// Index into [`Program::vars`]
    VarId
);
index_type!(
    /// Index into [`Program::functions`]
    FunctionId
);
index_type!(
    /// Index into [`Program::structs`]
    StructId
);
index_type!(
    /// Index into [`Cfg::blocks`]
    BlockId
);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// A field of a struct, by position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId {
    pub owner: StructId,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    BitNot,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLiteral(i64),
    /// Array lvalue holding the literal's characters
    StringLiteral(String),
    Null,
    VarRef(VarId),
    Load(ExprId),
    Decay(ExprId),
    AddrOf(ExprId),
    Deref(ExprId),
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Binary {
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    Assign {
        target: ExprId,
        value: ExprId,
    },
    CompoundAssign {
        op: BinOp,
        target: ExprId,
        value: ExprId,
    },
    IncDec {
        target: ExprId,
        increment: bool,
        prefix: bool,
    },
    Call {
        callee: FunctionId,
        args: Vec<ExprId>,
    },
    Member {
        base: ExprId,
        field: FieldId,
    },
    /// `base` is a pointer rvalue (arrays are decayed first)
    Index {
        base: ExprId,
        index: ExprId,
    },
    Cast {
        operand: ExprId,
    },
    /// Value of a short-circuit or conditional expression; bound by the
    /// `Merge` elements of its predecessors.
    Join,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub range: SourceRange,
}

impl Expr {
    pub fn location(&self) -> SourceLocation {
        self.range.begin
    }

    /// Lvalues evaluate to a location rather than a value.
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::VarRef(_)
                | ExprKind::Deref(_)
                | ExprKind::Member { .. }
                | ExprKind::Index { .. }
                | ExprKind::StringLiteral(_)
        )
    }

    /// Direct operands, in evaluation order.
    pub fn children(&self) -> Vec<ExprId> {
        match &self.kind {
            ExprKind::IntLiteral(_)
            | ExprKind::StringLiteral(_)
            | ExprKind::Null
            | ExprKind::VarRef(_)
            | ExprKind::Join => Vec::new(),
            ExprKind::Load(e)
            | ExprKind::Decay(e)
            | ExprKind::AddrOf(e)
            | ExprKind::Deref(e)
            | ExprKind::Unary { operand: e, .. }
            | ExprKind::Cast { operand: e }
            | ExprKind::Member { base: e, .. }
            | ExprKind::IncDec { target: e, .. } => vec![*e],
            ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            ExprKind::Assign { target, value } | ExprKind::CompoundAssign { target, value, .. } => {
                vec![*target, *value]
            }
            ExprKind::Index { base, index } => vec![*base, *index],
            ExprKind::Call { args, .. } => args.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    Local,
    /// Parameter at the given position
    Param(u32),
    Global { is_static: bool },
    StaticLocal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub ty: Type,
    pub kind: VarKind,
    /// Owning function for locals and parameters
    pub function: Option<FunctionId>,
    pub location: SourceLocation,
}

impl VarDecl {
    /// Globals and static locals outlive every stack frame.
    pub fn has_global_storage(&self) -> bool {
        matches!(self.kind, VarKind::Global { .. } | VarKind::StaticLocal)
    }

    pub fn is_param(&self) -> bool {
        matches!(self.kind, VarKind::Param(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructInfo {
    pub name: String,
    pub fields: Vec<FieldInfo>,
    pub location: SourceLocation,
}

/// One step from an aggregate to one of its parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    Element(i64),
    Field(FieldId),
}

/// A scalar initialized by a brace list, addressed from the declared object
#[derive(Debug, Clone, PartialEq)]
pub struct InitEntry {
    pub path: Vec<InitStep>,
    pub value: ExprId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclInit {
    Expr(ExprId),
    /// Brace list; parts not listed are zero
    List(Vec<InitEntry>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeValue {
    Int(i64),
    Expr(ExprId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CfgElement {
    /// Evaluate `expr`; `root` marks the end of a full expression
    Expr { expr: ExprId, root: bool },
    Decl {
        var: VarId,
        init: Option<DeclInit>,
        location: SourceLocation,
    },
    /// Set the value of a `Join` expression on this incoming path
    Merge { target: ExprId, value: MergeValue },
    Return {
        value: Option<ExprId>,
        location: SourceLocation,
    },
}

impl CfgElement {
    /// Full expressions end here; expression values of the frame are dropped
    /// after it.
    pub fn is_root(&self) -> bool {
        match self {
            CfgElement::Expr { root, .. } => *root,
            CfgElement::Decl { .. } | CfgElement::Return { .. } => true,
            CfgElement::Merge { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    While,
    DoWhile,
    For,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    If,
    Loop(LoopKind),
    LogicalAnd,
    LogicalOr,
    Conditional,
    /// Right operand of a short-circuit operator in value context
    Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpKind {
    Fallthrough,
    Goto,
    Break,
    Continue,
    Return,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCaseTarget {
    pub value: i64,
    pub block: BlockId,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Goto {
        target: BlockId,
        kind: JumpKind,
    },
    Branch {
        cond: ExprId,
        then_block: BlockId,
        else_block: BlockId,
        kind: BranchKind,
        location: SourceLocation,
    },
    Switch {
        cond: ExprId,
        cases: Vec<SwitchCaseTarget>,
        default: BlockId,
        /// Location of the `default:` label if the switch has one
        default_location: Option<SourceLocation>,
        location: SourceLocation,
    },
    Exit,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Goto { target, .. } => vec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Switch { cases, default, .. } => cases
                .iter()
                .map(|c| c.block)
                .chain(std::iter::once(*default))
                .collect(),
            Terminator::Exit => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub elements: Vec<CfgElement>,
    pub terminator: Terminator,
    /// Blocks reached by a loop back edge
    pub loop_head: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    pub exit: BlockId,
}

impl Cfg {
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    pub fn predecessors(&self, id: BlockId) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|b| b.terminator.successors().contains(&id))
            .map(|b| b.id)
            .collect()
    }
}

/// Lowered body of a defined function
#[derive(Debug, Clone)]
pub struct FunctionBody {
    pub cfg: Cfg,
    pub locals: Vec<VarId>,
    pub liveness: LiveVariables,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub return_type: Type,
    pub param_types: Vec<Type>,
    /// Parameter variables; empty for prototypes
    pub params: Vec<VarId>,
    pub variadic: bool,
    pub body: Option<FunctionBody>,
    pub location: SourceLocation,
    pub end_location: SourceLocation,
}

impl FunctionDecl {
    pub fn is_defined(&self) -> bool {
        self.body.is_some()
    }
}

/// Constant initializer of a global
#[derive(Debug, Clone, PartialEq)]
pub enum ConstInit {
    Int(i64),
    Null,
    /// String literal expression (detached from any block)
    String(ExprId),
    List(Vec<ConstInit>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalInit {
    pub var: VarId,
    pub value: Option<ConstInit>,
}

/// A type-checked translation unit
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub file_name: String,
    pub exprs: Vec<Expr>,
    pub vars: Vec<VarDecl>,
    pub functions: Vec<FunctionDecl>,
    pub structs: Vec<StructInfo>,
    pub globals: Vec<GlobalInit>,
    pub macro_expansions: Vec<MacroExpansion>,
    pub(crate) struct_index: FxHashMap<String, StructId>,
    pub(crate) function_index: FxHashMap<String, FunctionId>,
}

impl Program {
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn var(&self, id: VarId) -> &VarDecl {
        &self.vars[id.index()]
    }

    pub fn function(&self, id: FunctionId) -> &FunctionDecl {
        &self.functions[id.index()]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.function_index.get(name).copied()
    }

    pub fn struct_by_name(&self, name: &str) -> Option<StructId> {
        self.struct_index.get(name).copied()
    }

    pub fn struct_info(&self, id: StructId) -> &StructInfo {
        &self.structs[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &FieldInfo {
        &self.structs[id.owner.index()].fields[id.index as usize]
    }

    /// Functions with a body, in declaration order.
    pub fn defined_functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_defined())
            .map(|(i, _)| FunctionId(i as u32))
    }

    pub fn global_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.vars
            .iter()
            .enumerate()
            .filter(|(_, v)| v.has_global_storage())
            .map(|(i, _)| VarId(i as u32))
    }

    /// Size of a type in bytes: int 4, char 1, pointers 8, structs the sum
    /// of their fields (no padding).
    pub fn size_of(&self, ty: &Type) -> u64 {
        match ty {
            Type::Void => 1,
            Type::Char => 1,
            Type::Int => 4,
            Type::Pointer(_) => 8,
            Type::Array(inner, n) => self.size_of(inner) * n.unwrap_or(0),
            Type::Struct(name) => match self.struct_by_name(name) {
                Some(id) => self
                    .struct_info(id)
                    .fields
                    .iter()
                    .map(|f| self.size_of(&f.ty))
                    .sum(),
                None => 0,
            },
        }
    }

    /// Byte offset of a field within its struct.
    pub fn field_offset(&self, field: FieldId) -> u64 {
        self.structs[field.owner.index()].fields[..field.index as usize]
            .iter()
            .map(|f| self.size_of(&f.ty))
            .sum()
    }

    /// Source-like spelling of simple expressions (`p`, `s.f`, `*q`), used in
    /// diagnostic messages.
    pub fn describe_expr(&self, id: ExprId) -> Option<String> {
        let expr = self.expr(id);
        match &expr.kind {
            ExprKind::VarRef(v) => Some(self.var(*v).name.clone()),
            ExprKind::Load(e) | ExprKind::Cast { operand: e } | ExprKind::Decay(e) => {
                self.describe_expr(*e)
            }
            ExprKind::Deref(e) => Some(format!("*{}", self.describe_expr(*e)?)),
            ExprKind::Member { base, field } => {
                let name = &self.field(*field).name;
                match &self.expr(*base).kind {
                    ExprKind::Deref(ptr) => Some(format!("{}->{}", self.describe_expr(*ptr)?, name)),
                    _ => Some(format!("{}.{}", self.describe_expr(*base)?, name)),
                }
            }
            ExprKind::Index { base, index } => Some(format!(
                "{}[{}]",
                self.describe_expr(*base)?,
                self.describe_expr(*index)?
            )),
            ExprKind::IntLiteral(n) => Some(n.to_string()),
            ExprKind::Null => Some("NULL".to_string()),
            _ => None,
        }
    }

    /// Source location of an element
    pub fn element_location(&self, element: &CfgElement) -> SourceLocation {
        match element {
            CfgElement::Expr { expr, .. } | CfgElement::Merge { target: expr, .. } => {
                self.expr(*expr).location()
            }
            CfgElement::Decl { location, .. } | CfgElement::Return { location, .. } => *location,
        }
    }

    /// Source range of an element
    pub fn element_range(&self, element: &CfgElement) -> SourceRange {
        match element {
            CfgElement::Expr { expr, .. } | CfgElement::Merge { target: expr, .. } => self.expr(*expr).range,
            CfgElement::Decl { location, .. } => SourceRange::point(*location),
            CfgElement::Return { value, location } => match value {
                Some(v) => SourceRange::new(*location, self.expr(*v).range.end),
                None => SourceRange::point(*location),
            },
        }
    }
}
