//! Lowering of the syntax tree into typed CFGs
//!
//! [`build_program`] resolves names, checks and annotates types, and lowers
//! every function body into basic blocks:
//!
//! - value-context `&&`, `||` and `?:` become diamonds joined by `Merge`
//!   elements
//! - condition-context `&&` and `||` become chains of branches
//! - `sizeof` is folded; its operand is never evaluated
//! - implicit conversions become explicit `Cast`s
//!
//! # Builtin Functions
//!
//! `malloc`, `calloc`, `alloca`, `free`, `exit`, `abort` and `printf` get
//! their C library prototypes when the source does not declare them. Any other
//! undeclared callee is implicitly `int name(...)`.

use super::ir::*;
use super::liveness::LiveVariables;
use crate::frontend::ast::{self, BinOp, LogicalOp, SourceLocation, SourceRange, Type, UnOp};
use crate::frontend::constant_value;
use rustc_hash::{FxHashMap, FxHashSet};

/// Errors found while resolving and type-checking a translation unit
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SemanticError {
    #[error("{location}: use of undeclared identifier '{name}'")]
    UnknownIdentifier { name: String, location: SourceLocation },

    #[error("{location}: unknown struct '{name}'")]
    UnknownStruct { name: String, location: SourceLocation },

    #[error("{location}: no member named '{field}' in 'struct {owner}'")]
    UnknownField {
        owner: String,
        field: String,
        location: SourceLocation,
    },

    #[error("{location}: '{function}' expects {expected} argument(s), got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
        location: SourceLocation,
    },

    #[error("{location}: expression is not assignable")]
    NotAnLvalue { location: SourceLocation },

    #[error("{location}: invalid operands: {message}")]
    InvalidOperands { message: String, location: SourceLocation },

    #[error("{location}: '{statement}' statement not in loop or switch statement")]
    MisplacedJump {
        statement: &'static str,
        location: SourceLocation,
    },

    #[error("{location}: use of undeclared label '{label}'")]
    UndefinedLabel { label: String, location: SourceLocation },

    #[error("{location}: redefinition of '{name}'")]
    Redefinition { name: String, location: SourceLocation },

    #[error("{location}: expression is not an integer constant")]
    NonConstant { location: SourceLocation },

    #[error("{location}: cannot convert '{from}' to '{to}'")]
    IncompatibleTypes {
        from: Type,
        to: Type,
        location: SourceLocation,
    },
}

impl SemanticError {
    pub fn location(&self) -> SourceLocation {
        match self {
            SemanticError::UnknownIdentifier { location, .. }
            | SemanticError::UnknownStruct { location, .. }
            | SemanticError::UnknownField { location, .. }
            | SemanticError::ArgumentCount { location, .. }
            | SemanticError::NotAnLvalue { location }
            | SemanticError::InvalidOperands { location, .. }
            | SemanticError::MisplacedJump { location, .. }
            | SemanticError::UndefinedLabel { location, .. }
            | SemanticError::Redefinition { location, .. }
            | SemanticError::NonConstant { location }
            | SemanticError::IncompatibleTypes { location, .. } => *location,
        }
    }
}

type Result<T> = std::result::Result<T, SemanticError>;

/// C library functions the analyzer knows by name
fn builtin_signature(name: &str) -> Option<(Type, Vec<Type>, bool)> {
    let void_ptr = Type::Void.pointer_to();
    Some(match name {
        "malloc" => (void_ptr, vec![Type::Int], false),
        "calloc" => (void_ptr, vec![Type::Int, Type::Int], false),
        "alloca" => (void_ptr, vec![Type::Int], false),
        "free" => (Type::Void, vec![void_ptr], false),
        "exit" => (Type::Void, vec![Type::Int], false),
        "abort" => (Type::Void, Vec::new(), false),
        "printf" => (Type::Int, vec![Type::Char.pointer_to()], true),
        _ => return None,
    })
}

/// `int a[] = {1, 2}` and `char s[] = "hi"` take their size from the
/// initializer.
fn complete_array_type(ty: &Type, init: Option<&ast::Initializer>) -> Type {
    match (ty, init) {
        (Type::Array(elem, None), Some(ast::Initializer::List(items, _))) => {
            Type::Array(elem.clone(), Some(items.len() as u64))
        }
        (Type::Array(elem, None), Some(ast::Initializer::Expr(e))) => match &e.kind {
            ast::ExprKind::StringLiteral(s) => Type::Array(elem.clone(), Some(s.len() as u64 + 1)),
            _ => ty.clone(),
        },
        _ => ty.clone(),
    }
}

/// Resolve, type-check and lower a translation unit.
pub fn build_program(unit: &ast::TranslationUnit, file_name: &str) -> Result<Program> {
    let mut program = Program {
        file_name: file_name.to_string(),
        macro_expansions: unit.macro_expansions.clone(),
        ..Program::default()
    };
    let mut global_scope: FxHashMap<String, VarId> = FxHashMap::default();
    let mut defined: FxHashSet<String> = FxHashSet::default();

    // Structs first so that any declaration may name them
    for item in &unit.items {
        if let ast::Item::Struct(def) = item {
            if program.struct_index.contains_key(&def.name) {
                return Err(SemanticError::Redefinition {
                    name: def.name.clone(),
                    location: def.location,
                });
            }
            let id = StructId(program.structs.len() as u32);
            program.structs.push(StructInfo {
                name: def.name.clone(),
                fields: def
                    .fields
                    .iter()
                    .map(|f| FieldInfo {
                        name: f.name.clone(),
                        ty: f.ty.clone(),
                    })
                    .collect(),
                location: def.location,
            });
            program.struct_index.insert(def.name.clone(), id);
        }
    }

    for item in &unit.items {
        match item {
            ast::Item::Struct(_) => {}
            ast::Item::Global(decl) => declare_global(&mut program, &mut global_scope, decl)?,
            ast::Item::Function(def) => declare_function(&mut program, &mut defined, def)?,
        }
    }

    for def in unit.functions() {
        let Some(body) = &def.body else { continue };
        let Some(id) = program.function_by_name(&def.name) else { continue };
        let lowered = FunctionBuilder::new(&mut program, &global_scope, id, def)?.build(body)?;
        program.functions[id.index()].body = Some(lowered);
        log::trace!("lowered function '{}'", def.name);
    }

    Ok(program)
}

fn check_complete(program: &Program, ty: &Type, location: SourceLocation) -> Result<()> {
    match ty {
        Type::Struct(name) if program.struct_by_name(name).is_none() => Err(SemanticError::UnknownStruct {
            name: name.clone(),
            location,
        }),
        Type::Array(inner, _) => check_complete(program, inner, location),
        _ => Ok(()),
    }
}

fn declare_global(
    program: &mut Program,
    scope: &mut FxHashMap<String, VarId>,
    decl: &ast::VarDecl,
) -> Result<()> {
    let ty = complete_array_type(&decl.ty, decl.init.as_ref());
    check_complete(program, &ty, decl.location)?;

    // repeated tentative definitions of one global are fine in C
    if let Some(existing) = scope.get(&decl.name) {
        if decl.init.is_none() {
            return Ok(());
        }
        let has_init = program
            .globals
            .iter()
            .any(|g| g.var == *existing && g.value.is_some());
        if has_init {
            return Err(SemanticError::Redefinition {
                name: decl.name.clone(),
                location: decl.location,
            });
        }
    }

    let var = match scope.get(&decl.name) {
        Some(var) => *var,
        None => {
            let var = VarId(program.vars.len() as u32);
            program.vars.push(VarDecl {
                name: decl.name.clone(),
                ty: ty.clone(),
                kind: VarKind::Global {
                    is_static: decl.is_static,
                },
                function: None,
                location: decl.location,
            });
            scope.insert(decl.name.clone(), var);
            var
        }
    };

    let value = match &decl.init {
        Some(init) => Some(const_init(program, init, &ty)?),
        None => None,
    };
    match program.globals.iter_mut().find(|g| g.var == var) {
        Some(global) => global.value = value,
        None => program.globals.push(GlobalInit { var, value }),
    }
    Ok(())
}

fn const_init(program: &mut Program, init: &ast::Initializer, ty: &Type) -> Result<ConstInit> {
    match init {
        ast::Initializer::List(items, location) => {
            let element_types: Vec<Type> = match ty {
                Type::Array(elem, _) => vec![(**elem).clone(); items.len()],
                Type::Struct(name) => {
                    let id = program.struct_by_name(name).ok_or(SemanticError::UnknownStruct {
                        name: name.clone(),
                        location: *location,
                    })?;
                    program.struct_info(id).fields.iter().map(|f| f.ty.clone()).collect()
                }
                scalar => vec![scalar.clone()],
            };
            if !ty.is_aggregate() {
                return match items.first() {
                    Some(first) => const_init(program, first, ty),
                    None => Ok(ConstInit::Int(0)),
                };
            }
            let values = items
                .iter()
                .zip(element_types.iter())
                .map(|(item, elem_ty)| const_init(program, item, elem_ty))
                .collect::<Result<Vec<_>>>()?;
            Ok(ConstInit::List(values))
        }
        ast::Initializer::Expr(e) => match &e.kind {
            ast::ExprKind::StringLiteral(s) if ty.is_array() => Ok(ConstInit::List(
                s.bytes().map(|b| ConstInit::Int(b as i64)).collect(),
            )),
            ast::ExprKind::StringLiteral(s) => {
                let id = ExprId(program.exprs.len() as u32);
                program.exprs.push(Expr {
                    kind: ExprKind::StringLiteral(s.clone()),
                    ty: Type::Char.array_of(Some(s.len() as u64 + 1)),
                    range: e.range,
                });
                Ok(ConstInit::String(id))
            }
            ast::ExprKind::Null => Ok(ConstInit::Null),
            ast::ExprKind::Cast { operand, .. } if ty.is_pointer() => {
                const_init(program, &ast::Initializer::Expr((**operand).clone()), ty)
            }
            _ => match constant_value(e) {
                Some(0) if ty.is_pointer() => Ok(ConstInit::Null),
                Some(n) => Ok(ConstInit::Int(n)),
                None => Err(SemanticError::NonConstant { location: e.location() }),
            },
        },
    }
}

fn declare_function(program: &mut Program, defined: &mut FxHashSet<String>, def: &ast::FunctionDef) -> Result<()> {
    let param_types: Vec<Type> = def.params.iter().map(|p| p.ty.clone()).collect();
    match program.function_by_name(&def.name) {
        Some(id) => {
            let existing = &mut program.functions[id.index()];
            if def.body.is_some() {
                if !defined.insert(def.name.clone()) {
                    return Err(SemanticError::Redefinition {
                        name: def.name.clone(),
                        location: def.location,
                    });
                }
                existing.location = def.location;
                existing.end_location = def.end_location;
            }
            existing.return_type = def.return_type.clone();
            existing.param_types = param_types;
            existing.variadic = def.variadic;
        }
        None => {
            let id = FunctionId(program.functions.len() as u32);
            program.functions.push(FunctionDecl {
                name: def.name.clone(),
                return_type: def.return_type.clone(),
                param_types,
                params: Vec::new(),
                variadic: def.variadic,
                body: None,
                location: def.location,
                end_location: def.end_location,
            });
            program.function_index.insert(def.name.clone(), id);
            if def.body.is_some() {
                defined.insert(def.name.clone());
            }
        }
    }
    Ok(())
}

/// A block under construction
#[derive(Debug, Default)]
struct PendingBlock {
    elements: Vec<CfgElement>,
    terminator: Option<Terminator>,
    loop_head: bool,
}

#[derive(Debug, Clone, Copy)]
struct JumpTargets {
    break_to: BlockId,
    continue_to: Option<BlockId>,
}

#[derive(Debug, Clone, Copy)]
struct LabelInfo {
    block: BlockId,
    defined: bool,
    first_use: SourceLocation,
}

/// Lowers one function body
struct FunctionBuilder<'a> {
    program: &'a mut Program,
    globals: &'a FxHashMap<String, VarId>,
    function: FunctionId,
    return_type: Type,
    blocks: Vec<PendingBlock>,
    current: Option<BlockId>,
    scopes: Vec<FxHashMap<String, VarId>>,
    locals: Vec<VarId>,
    jump_targets: Vec<JumpTargets>,
    labels: FxHashMap<String, LabelInfo>,
    exit: BlockId,
}

impl<'a> FunctionBuilder<'a> {
    fn new(
        program: &'a mut Program,
        globals: &'a FxHashMap<String, VarId>,
        function: FunctionId,
        def: &ast::FunctionDef,
    ) -> Result<Self> {
        let mut builder = Self {
            program,
            globals,
            function,
            return_type: def.return_type.clone(),
            blocks: Vec::new(),
            current: None,
            scopes: vec![FxHashMap::default()],
            locals: Vec::new(),
            jump_targets: Vec::new(),
            labels: FxHashMap::default(),
            exit: BlockId(1),
        };
        let entry = builder.new_block();
        let exit = builder.new_block();
        builder.blocks[exit.index()].terminator = Some(Terminator::Exit);
        builder.exit = exit;
        builder.current = Some(entry);

        let mut params = Vec::new();
        for (position, param) in def.params.iter().enumerate() {
            check_complete(builder.program, &param.ty, param.location)?;
            let name = param.name.clone().unwrap_or_default();
            let var = builder.declare_var(&name, param.ty.clone(), VarKind::Param(position as u32), param.location)?;
            params.push(var);
        }
        builder.program.functions[function.index()].params = params;
        Ok(builder)
    }

    fn build(mut self, body: &[ast::Stmt]) -> Result<FunctionBody> {
        for stmt in body {
            self.lower_stmt(stmt)?;
        }
        if self.current.is_some() {
            self.jump(self.exit, JumpKind::Fallthrough);
        }

        if let Some((label, info)) = self.labels.iter().find(|(_, info)| !info.defined) {
            return Err(SemanticError::UndefinedLabel {
                label: label.clone(),
                location: info.first_use,
            });
        }

        let exit = self.exit;
        let blocks = self
            .blocks
            .into_iter()
            .enumerate()
            .map(|(i, pending)| BasicBlock {
                id: BlockId(i as u32),
                elements: pending.elements,
                terminator: pending.terminator.unwrap_or(Terminator::Goto {
                    target: exit,
                    kind: JumpKind::Fallthrough,
                }),
                loop_head: pending.loop_head,
            })
            .collect();
        let cfg = Cfg {
            blocks,
            entry: BlockId(0),
            exit,
        };
        let liveness = LiveVariables::compute(&cfg, &self.program.exprs, &self.program.vars);
        Ok(FunctionBody {
            cfg,
            locals: self.locals,
            liveness,
        })
    }

    // ===== Blocks and elements =====

    fn new_block(&mut self) -> BlockId {
        self.blocks.push(PendingBlock::default());
        BlockId(self.blocks.len() as u32 - 1)
    }

    /// Code after a jump lands in a fresh block without predecessors.
    fn ensure_current(&mut self) -> BlockId {
        match self.current {
            Some(block) => block,
            None => {
                let block = self.new_block();
                self.current = Some(block);
                block
            }
        }
    }

    fn push_element(&mut self, element: CfgElement) {
        let block = self.ensure_current();
        self.blocks[block.index()].elements.push(element);
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = self.ensure_current();
        self.blocks[block.index()].terminator = Some(terminator);
        self.current = None;
    }

    fn jump(&mut self, target: BlockId, kind: JumpKind) {
        self.terminate(Terminator::Goto { target, kind });
    }

    fn mark_root(&mut self) {
        let Some(block) = self.current else { return };
        if let Some(CfgElement::Expr { root, .. }) = self.blocks[block.index()].elements.last_mut() {
            *root = true;
        }
    }

    /// Allocate an expression without evaluating it anywhere.
    fn add_detached(&mut self, kind: ExprKind, ty: Type, range: SourceRange) -> ExprId {
        let id = ExprId(self.program.exprs.len() as u32);
        self.program.exprs.push(Expr { kind, ty, range });
        id
    }

    /// Allocate an expression and evaluate it in the current block.
    fn add_expr(&mut self, kind: ExprKind, ty: Type, range: SourceRange) -> ExprId {
        let id = self.add_detached(kind, ty, range);
        self.push_element(CfgElement::Expr { expr: id, root: false });
        id
    }

    fn ty(&self, id: ExprId) -> Type {
        self.program.expr(id).ty.clone()
    }

    fn range(&self, id: ExprId) -> SourceRange {
        self.program.expr(id).range
    }

    // ===== Scopes =====

    fn declare_var(&mut self, name: &str, ty: Type, kind: VarKind, location: SourceLocation) -> Result<VarId> {
        let scope_has_name = !name.is_empty()
            && self
                .scopes
                .last()
                .is_some_and(|scope| scope.contains_key(name));
        if scope_has_name {
            return Err(SemanticError::Redefinition {
                name: name.to_string(),
                location,
            });
        }
        let var = VarId(self.program.vars.len() as u32);
        self.program.vars.push(VarDecl {
            name: name.to_string(),
            ty,
            kind,
            function: Some(self.function),
            location,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), var);
        }
        if !matches!(kind, VarKind::Param(_)) {
            self.locals.push(var);
        }
        Ok(var)
    }

    fn lookup(&self, name: &str) -> Option<VarId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
            .copied()
    }

    fn resolve_function(&mut self, name: &str, location: SourceLocation) -> FunctionId {
        if let Some(id) = self.program.function_by_name(name) {
            return id;
        }
        let (return_type, param_types, variadic) =
            builtin_signature(name).unwrap_or((Type::Int, Vec::new(), true));
        let id = FunctionId(self.program.functions.len() as u32);
        self.program.functions.push(FunctionDecl {
            name: name.to_string(),
            return_type,
            param_types,
            params: Vec::new(),
            variadic,
            body: None,
            location,
            end_location: location,
        });
        self.program.function_index.insert(name.to_string(), id);
        id
    }

    fn label_block(&mut self, name: &str, location: SourceLocation) -> BlockId {
        if let Some(info) = self.labels.get(name) {
            return info.block;
        }
        let block = self.new_block();
        self.labels.insert(
            name.to_string(),
            LabelInfo {
                block,
                defined: false,
                first_use: location,
            },
        );
        block
    }

    // ===== Statements =====

    fn lower_stmt(&mut self, stmt: &ast::Stmt) -> Result<()> {
        match &stmt.kind {
            ast::StmtKind::Empty => Ok(()),
            ast::StmtKind::Expr(e) => {
                self.lower_rvalue(e)?;
                self.mark_root();
                Ok(())
            }
            ast::StmtKind::Decl(decls) => {
                for decl in decls {
                    self.lower_decl(decl)?;
                }
                Ok(())
            }
            ast::StmtKind::Block(stmts) => {
                self.scopes.push(FxHashMap::default());
                let result = stmts.iter().try_for_each(|s| self.lower_stmt(s));
                self.scopes.pop();
                result
            }
            ast::StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let then_block = self.new_block();
                let join = self.new_block();
                let else_block = match else_branch {
                    Some(_) => self.new_block(),
                    None => join,
                };
                self.lower_condition(cond, then_block, else_block, BranchKind::If)?;

                self.current = Some(then_block);
                self.lower_stmt(then_branch)?;
                if self.current.is_some() {
                    self.jump(join, JumpKind::Fallthrough);
                }
                if let Some(else_branch) = else_branch {
                    self.current = Some(else_block);
                    self.lower_stmt(else_branch)?;
                    if self.current.is_some() {
                        self.jump(join, JumpKind::Fallthrough);
                    }
                }
                self.current = Some(join);
                Ok(())
            }
            ast::StmtKind::While { cond, body } => {
                let head = self.new_block();
                let body_block = self.new_block();
                let exit = self.new_block();
                self.blocks[head.index()].loop_head = true;
                self.jump(head, JumpKind::Fallthrough);

                self.current = Some(head);
                self.lower_condition(cond, body_block, exit, BranchKind::Loop(LoopKind::While))?;

                self.current = Some(body_block);
                self.lower_loop_body(body, exit, head)?;
                self.current = Some(exit);
                Ok(())
            }
            ast::StmtKind::DoWhile { body, cond } => {
                let body_block = self.new_block();
                let cond_block = self.new_block();
                let exit = self.new_block();
                self.blocks[cond_block.index()].loop_head = true;
                self.jump(body_block, JumpKind::Fallthrough);

                self.current = Some(body_block);
                self.lower_loop_body(body, exit, cond_block)?;

                self.current = Some(cond_block);
                self.lower_condition(cond, body_block, exit, BranchKind::Loop(LoopKind::DoWhile))?;
                self.current = Some(exit);
                Ok(())
            }
            ast::StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.scopes.push(FxHashMap::default());
                let result = self.lower_for(init.as_deref(), cond.as_ref(), step.as_ref(), body, stmt.location);
                self.scopes.pop();
                result
            }
            ast::StmtKind::Switch { cond, cases } => self.lower_switch(cond, cases, stmt.location),
            ast::StmtKind::Break => {
                let target = self
                    .jump_targets
                    .last()
                    .map(|t| t.break_to)
                    .ok_or(SemanticError::MisplacedJump {
                        statement: "break",
                        location: stmt.location,
                    })?;
                self.jump(target, JumpKind::Break);
                Ok(())
            }
            ast::StmtKind::Continue => {
                let target = self
                    .jump_targets
                    .iter()
                    .rev()
                    .find_map(|t| t.continue_to)
                    .ok_or(SemanticError::MisplacedJump {
                        statement: "continue",
                        location: stmt.location,
                    })?;
                self.jump(target, JumpKind::Continue);
                Ok(())
            }
            ast::StmtKind::Return(value) => {
                let value = match value {
                    Some(e) if self.return_type.is_void() => {
                        self.lower_rvalue(e)?;
                        None
                    }
                    Some(e) => {
                        let v = self.lower_rvalue(e)?;
                        let return_type = self.return_type.clone();
                        Some(self.convert(v, &return_type)?)
                    }
                    None => None,
                };
                self.push_element(CfgElement::Return {
                    value,
                    location: stmt.location,
                });
                self.jump(self.exit, JumpKind::Return);
                Ok(())
            }
            ast::StmtKind::Goto(label) => {
                let target = self.label_block(label, stmt.location);
                // a jump back to an earlier label closes a loop
                if self.labels.get(label).is_some_and(|info| info.defined) {
                    self.blocks[target.index()].loop_head = true;
                }
                self.jump(target, JumpKind::Goto);
                Ok(())
            }
            ast::StmtKind::Label(label) => {
                let target = self.label_block(label, stmt.location);
                if let Some(info) = self.labels.get_mut(label) {
                    if info.defined {
                        return Err(SemanticError::Redefinition {
                            name: label.clone(),
                            location: stmt.location,
                        });
                    }
                    info.defined = true;
                }
                if self.current.is_some() {
                    self.jump(target, JumpKind::Fallthrough);
                }
                self.current = Some(target);
                Ok(())
            }
        }
    }

    fn lower_loop_body(&mut self, body: &ast::Stmt, break_to: BlockId, continue_to: BlockId) -> Result<()> {
        self.jump_targets.push(JumpTargets {
            break_to,
            continue_to: Some(continue_to),
        });
        let result = self.lower_stmt(body);
        self.jump_targets.pop();
        result?;
        if self.current.is_some() {
            self.jump(continue_to, JumpKind::Fallthrough);
        }
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: Option<&ast::Stmt>,
        cond: Option<&ast::Expr>,
        step: Option<&ast::Expr>,
        body: &ast::Stmt,
        location: SourceLocation,
    ) -> Result<()> {
        if let Some(init) = init {
            self.lower_stmt(init)?;
        }
        let head = self.new_block();
        let body_block = self.new_block();
        let step_block = self.new_block();
        let exit = self.new_block();
        self.blocks[head.index()].loop_head = true;
        self.jump(head, JumpKind::Fallthrough);

        self.current = Some(head);
        let kind = BranchKind::Loop(LoopKind::For);
        match cond {
            Some(cond) => self.lower_condition(cond, body_block, exit, kind)?,
            None => {
                // `for (;;)` branches on a constant so the loop head still has
                // a condition to widen at
                let always = self.add_expr(ExprKind::IntLiteral(1), Type::Int, SourceRange::point(location));
                self.terminate(Terminator::Branch {
                    cond: always,
                    then_block: body_block,
                    else_block: exit,
                    kind,
                    location,
                });
            }
        }

        self.current = Some(body_block);
        self.lower_loop_body(body, exit, step_block)?;

        self.current = Some(step_block);
        if let Some(step) = step {
            self.lower_rvalue(step)?;
            self.mark_root();
        }
        self.jump(head, JumpKind::Fallthrough);
        self.current = Some(exit);
        Ok(())
    }

    fn lower_switch(&mut self, cond: &ast::Expr, cases: &[ast::SwitchCase], location: SourceLocation) -> Result<()> {
        let value = self.lower_rvalue(cond)?;
        if !self.ty(value).is_integer() {
            return Err(SemanticError::InvalidOperands {
                message: format!("switch on '{}'", self.ty(value)),
                location: cond.location(),
            });
        }
        let value = self.convert(value, &Type::Int)?;

        let exit = self.new_block();
        let mut targets = Vec::new();
        let mut default = None;
        let mut case_blocks = Vec::with_capacity(cases.len());
        for case in cases {
            let block = self.new_block();
            case_blocks.push(block);
            match &case.value {
                Some(label) => {
                    let constant = constant_value(label).ok_or(SemanticError::NonConstant {
                        location: label.location(),
                    })?;
                    targets.push(SwitchCaseTarget {
                        value: constant,
                        block,
                        location: case.location,
                    });
                }
                None => default = Some((block, case.location)),
            }
        }
        self.terminate(Terminator::Switch {
            cond: value,
            cases: targets,
            default: default.map_or(exit, |(block, _)| block),
            default_location: default.map(|(_, loc)| loc),
            location,
        });

        self.jump_targets.push(JumpTargets {
            break_to: exit,
            continue_to: None,
        });
        let mut result = Ok(());
        for (case, block) in cases.iter().zip(case_blocks) {
            // fall through from the previous case
            if self.current.is_some() {
                self.jump(block, JumpKind::Fallthrough);
            }
            self.current = Some(block);
            result = case.body.iter().try_for_each(|s| self.lower_stmt(s));
            if result.is_err() {
                break;
            }
        }
        self.jump_targets.pop();
        result?;

        if self.current.is_some() {
            self.jump(exit, JumpKind::Fallthrough);
        }
        self.current = Some(exit);
        Ok(())
    }

    fn lower_decl(&mut self, decl: &ast::VarDecl) -> Result<()> {
        let ty = complete_array_type(&decl.ty, decl.init.as_ref());
        check_complete(self.program, &ty, decl.location)?;
        let kind = if decl.is_static {
            VarKind::StaticLocal
        } else {
            VarKind::Local
        };
        let var = self.declare_var(&decl.name, ty.clone(), kind, decl.location)?;
        if decl.is_static {
            return Ok(());
        }

        let init = match &decl.init {
            None => None,
            Some(ast::Initializer::Expr(e)) if ty.is_aggregate() && !ty.is_struct() => {
                let mut entries = Vec::new();
                self.lower_init_item(&ty, &ast::Initializer::Expr(e.clone()), &mut Vec::new(), &mut entries)?;
                Some(DeclInit::List(entries))
            }
            Some(ast::Initializer::Expr(e)) => {
                let value = self.lower_rvalue(e)?;
                Some(DeclInit::Expr(self.convert(value, &ty)?))
            }
            Some(ast::Initializer::List(items, _)) => {
                let mut entries = Vec::new();
                self.lower_init_list(&ty, items, &mut Vec::new(), &mut entries)?;
                Some(DeclInit::List(entries))
            }
        };
        self.push_element(CfgElement::Decl {
            var,
            init,
            location: decl.location,
        });
        Ok(())
    }

    fn lower_init_list(
        &mut self,
        ty: &Type,
        items: &[ast::Initializer],
        path: &mut Vec<InitStep>,
        entries: &mut Vec<InitEntry>,
    ) -> Result<()> {
        match ty {
            Type::Array(elem, size) => {
                let limit = size.map_or(items.len(), |n| n as usize);
                for (i, item) in items.iter().take(limit).enumerate() {
                    path.push(InitStep::Element(i as i64));
                    self.lower_init_item(elem, item, path, entries)?;
                    path.pop();
                }
            }
            Type::Struct(name) => {
                let owner = self.program.struct_by_name(name).ok_or_else(|| SemanticError::UnknownStruct {
                    name: name.clone(),
                    location: init_location(items),
                })?;
                let field_types: Vec<Type> = self.program.struct_info(owner).fields.iter().map(|f| f.ty.clone()).collect();
                for (i, (item, field_ty)) in items.iter().zip(field_types.iter()).enumerate() {
                    path.push(InitStep::Field(FieldId {
                        owner,
                        index: i as u32,
                    }));
                    self.lower_init_item(field_ty, item, path, entries)?;
                    path.pop();
                }
            }
            _ => {
                if let Some(first) = items.first() {
                    self.lower_init_item(ty, first, path, entries)?;
                }
            }
        }
        Ok(())
    }

    fn lower_init_item(
        &mut self,
        ty: &Type,
        item: &ast::Initializer,
        path: &mut Vec<InitStep>,
        entries: &mut Vec<InitEntry>,
    ) -> Result<()> {
        match item {
            ast::Initializer::List(items, _) => self.lower_init_list(ty, items, path, entries),
            ast::Initializer::Expr(e) => match (&e.kind, ty.element_type()) {
                (ast::ExprKind::StringLiteral(s), Some(Type::Char)) => {
                    // zero bytes come from the default binding
                    for (i, byte) in s.bytes().enumerate().filter(|(_, b)| *b != 0) {
                        let value = self.add_expr(ExprKind::IntLiteral(byte as i64), Type::Char, e.range);
                        path.push(InitStep::Element(i as i64));
                        entries.push(InitEntry {
                            path: path.clone(),
                            value,
                        });
                        path.pop();
                    }
                    Ok(())
                }
                _ if ty.is_array() => Err(SemanticError::InvalidOperands {
                    message: "array initializer must be an initializer list".to_string(),
                    location: e.location(),
                }),
                _ => {
                    let value = self.lower_rvalue(e)?;
                    let value = self.convert(value, ty)?;
                    entries.push(InitEntry {
                        path: path.clone(),
                        value,
                    });
                    Ok(())
                }
            },
        }
    }

    // ===== Conditions =====

    /// Lower `e` in condition context: control continues at `then_block`
    /// when it is non-zero and at `else_block` otherwise.
    fn lower_condition(
        &mut self,
        e: &ast::Expr,
        then_block: BlockId,
        else_block: BlockId,
        kind: BranchKind,
    ) -> Result<()> {
        match &e.kind {
            ast::ExprKind::Logical {
                op: LogicalOp::And,
                lhs,
                rhs,
            } => {
                let rhs_block = self.new_block();
                self.lower_condition(lhs, rhs_block, else_block, BranchKind::LogicalAnd)?;
                self.current = Some(rhs_block);
                self.lower_condition(rhs, then_block, else_block, kind)
            }
            ast::ExprKind::Logical {
                op: LogicalOp::Or,
                lhs,
                rhs,
            } => {
                let rhs_block = self.new_block();
                self.lower_condition(lhs, then_block, rhs_block, BranchKind::LogicalOr)?;
                self.current = Some(rhs_block);
                self.lower_condition(rhs, then_block, else_block, kind)
            }
            _ => {
                let cond = self.lower_rvalue(e)?;
                self.require_scalar(cond)?;
                self.terminate(Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                    kind,
                    location: e.location(),
                });
                Ok(())
            }
        }
    }

    // ===== Expressions =====

    fn lower_rvalue(&mut self, e: &ast::Expr) -> Result<ExprId> {
        let id = self.lower_expr(e)?;
        Ok(self.to_rvalue(id))
    }

    fn lower_lvalue(&mut self, e: &ast::Expr) -> Result<ExprId> {
        let id = self.lower_expr(e)?;
        if self.program.expr(id).is_lvalue() {
            Ok(id)
        } else {
            Err(SemanticError::NotAnLvalue { location: e.location() })
        }
    }

    fn to_rvalue(&mut self, id: ExprId) -> ExprId {
        let expr = self.program.expr(id);
        if !expr.is_lvalue() {
            return id;
        }
        let (ty, range) = (expr.ty.clone(), expr.range);
        if ty.is_array() {
            self.add_expr(ExprKind::Decay(id), ty.decayed(), range)
        } else {
            self.add_expr(ExprKind::Load(id), ty, range)
        }
    }

    /// Insert the implicit conversion from the type of `id` to `to`.
    fn convert(&mut self, id: ExprId, to: &Type) -> Result<ExprId> {
        let from = self.ty(id);
        if &from == to {
            return Ok(id);
        }
        if to.is_void() || (from.is_scalar() && to.is_scalar()) {
            let range = self.range(id);
            return Ok(self.add_expr(ExprKind::Cast { operand: id }, to.clone(), range));
        }
        Err(SemanticError::IncompatibleTypes {
            from,
            to: to.clone(),
            location: self.range(id).begin,
        })
    }

    fn require_scalar(&self, id: ExprId) -> Result<()> {
        let ty = self.ty(id);
        if ty.is_scalar() {
            Ok(())
        } else {
            Err(SemanticError::InvalidOperands {
                message: format!("'{}' is not a scalar", ty),
                location: self.range(id).begin,
            })
        }
    }

    fn require_integer(&mut self, id: ExprId) -> Result<ExprId> {
        if self.ty(id).is_integer() {
            self.convert(id, &Type::Int)
        } else {
            Err(SemanticError::InvalidOperands {
                message: format!("'{}' is not an integer", self.ty(id)),
                location: self.range(id).begin,
            })
        }
    }

    /// Type of an unevaluated operand (`sizeof expr`); anything lowered
    /// along the way is discarded.
    fn type_of_unevaluated(&mut self, e: &ast::Expr) -> Result<Type> {
        let exprs_len = self.program.exprs.len();
        let blocks_len = self.blocks.len();
        let current = self.current;
        let elements_len = current.map(|b| self.blocks[b.index()].elements.len());

        let result = self.lower_expr(e).map(|id| self.ty(id));

        self.program.exprs.truncate(exprs_len);
        self.blocks.truncate(blocks_len);
        self.current = current;
        if let (Some(block), Some(len)) = (current, elements_len) {
            let pending = &mut self.blocks[block.index()];
            pending.elements.truncate(len);
            pending.terminator = None;
        }
        result
    }

    fn lower_expr(&mut self, e: &ast::Expr) -> Result<ExprId> {
        let range = e.range;
        match &e.kind {
            ast::ExprKind::IntLiteral(n) => Ok(self.add_expr(ExprKind::IntLiteral(*n), Type::Int, range)),
            ast::ExprKind::CharLiteral(c) => Ok(self.add_expr(ExprKind::IntLiteral(*c as i64), Type::Int, range)),
            ast::ExprKind::StringLiteral(s) => {
                let ty = Type::Char.array_of(Some(s.len() as u64 + 1));
                Ok(self.add_expr(ExprKind::StringLiteral(s.clone()), ty, range))
            }
            ast::ExprKind::Null => Ok(self.add_expr(ExprKind::Null, Type::Void.pointer_to(), range)),
            ast::ExprKind::Ident(name) => {
                let var = self.lookup(name).ok_or_else(|| SemanticError::UnknownIdentifier {
                    name: name.clone(),
                    location: e.location(),
                })?;
                let ty = self.program.var(var).ty.clone();
                Ok(self.add_expr(ExprKind::VarRef(var), ty, range))
            }
            ast::ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, range),
            ast::ExprKind::Logical { op, lhs, rhs } => self.lower_logical_value(*op, lhs, rhs, range),
            ast::ExprKind::Unary { op, operand } => self.lower_unary(*op, operand, range),
            ast::ExprKind::Assign { op, target, value } => self.lower_assign(*op, target, value, range),
            ast::ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => self.lower_conditional_value(cond, then_expr, else_expr, range),
            ast::ExprKind::Call { callee, args } => self.lower_call(callee, args, range),
            ast::ExprKind::Index { base, index } => {
                let base = self.lower_rvalue(base)?;
                let index = self.lower_rvalue(index)?;
                // `i[a]` is `a[i]`
                let (base, index) = if self.ty(base).is_integer() && self.ty(index).is_pointer() {
                    (index, base)
                } else {
                    (base, index)
                };
                let element = match self.ty(base).pointee() {
                    Some(ty) if !ty.is_void() => ty.clone(),
                    _ => {
                        return Err(SemanticError::InvalidOperands {
                            message: format!("subscripted value of type '{}'", self.ty(base)),
                            location: e.location(),
                        })
                    }
                };
                let index = self.require_integer(index)?;
                Ok(self.add_expr(ExprKind::Index { base, index }, element, range))
            }
            ast::ExprKind::Member { base, field, arrow } => self.lower_member(base, field, *arrow, range),
            ast::ExprKind::Cast { ty, operand } => {
                check_complete(self.program, ty, e.location())?;
                let value = self.lower_rvalue(operand)?;
                let from = self.ty(value);
                if !(ty.is_void() || (from.is_scalar() && ty.is_scalar())) {
                    return Err(SemanticError::IncompatibleTypes {
                        from,
                        to: ty.clone(),
                        location: e.location(),
                    });
                }
                Ok(self.add_expr(ExprKind::Cast { operand: value }, ty.clone(), range))
            }
            ast::ExprKind::SizeofType(ty) => {
                check_complete(self.program, ty, e.location())?;
                let size = self.program.size_of(ty) as i64;
                Ok(self.add_expr(ExprKind::IntLiteral(size), Type::Int, range))
            }
            ast::ExprKind::SizeofExpr(operand) => {
                let ty = self.type_of_unevaluated(operand)?;
                let size = self.program.size_of(&ty) as i64;
                Ok(self.add_expr(ExprKind::IntLiteral(size), Type::Int, range))
            }
        }
    }

    fn lower_binary(&mut self, op: BinOp, lhs: &ast::Expr, rhs: &ast::Expr, range: SourceRange) -> Result<ExprId> {
        let l = self.lower_rvalue(lhs)?;
        let r = self.lower_rvalue(rhs)?;
        let (lt, rt) = (self.ty(l), self.ty(r));

        if lt.is_integer() && rt.is_integer() {
            let l = self.convert(l, &Type::Int)?;
            let r = self.convert(r, &Type::Int)?;
            return Ok(self.add_expr(ExprKind::Binary { op, lhs: l, rhs: r }, Type::Int, range));
        }

        if op.is_comparison() {
            let (l, r) = match (lt.is_pointer(), rt.is_pointer()) {
                (true, true) => (l, r),
                (true, false) if rt.is_integer() => (l, self.convert(r, &lt)?),
                (false, true) if lt.is_integer() => (self.convert(l, &rt)?, r),
                _ => return Err(invalid_operands(op, &lt, &rt, range)),
            };
            return Ok(self.add_expr(ExprKind::Binary { op, lhs: l, rhs: r }, Type::Int, range));
        }

        match op {
            BinOp::Add | BinOp::Sub if lt.is_pointer() && rt.is_integer() => {
                let r = self.convert(r, &Type::Int)?;
                Ok(self.add_expr(ExprKind::Binary { op, lhs: l, rhs: r }, lt, range))
            }
            BinOp::Add if lt.is_integer() && rt.is_pointer() => {
                let l = self.convert(l, &Type::Int)?;
                Ok(self.add_expr(ExprKind::Binary { op, lhs: l, rhs: r }, rt, range))
            }
            BinOp::Sub if lt.is_pointer() && rt.is_pointer() => {
                Ok(self.add_expr(ExprKind::Binary { op, lhs: l, rhs: r }, Type::Int, range))
            }
            _ => Err(invalid_operands(op, &lt, &rt, range)),
        }
    }

    fn lower_logical_value(
        &mut self,
        op: LogicalOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        range: SourceRange,
    ) -> Result<ExprId> {
        let join = self.add_detached(ExprKind::Join, Type::Int, range);
        let rhs_block = self.new_block();
        let true_block = self.new_block();
        let false_block = self.new_block();
        let join_block = self.new_block();

        match op {
            LogicalOp::And => self.lower_condition(lhs, rhs_block, false_block, BranchKind::LogicalAnd)?,
            LogicalOp::Or => self.lower_condition(lhs, true_block, rhs_block, BranchKind::LogicalOr)?,
        }
        self.current = Some(rhs_block);
        self.lower_condition(rhs, true_block, false_block, BranchKind::Operand)?;

        for (block, value) in [(true_block, 1), (false_block, 0)] {
            self.current = Some(block);
            self.push_element(CfgElement::Merge {
                target: join,
                value: MergeValue::Int(value),
            });
            self.jump(join_block, JumpKind::Fallthrough);
        }

        self.current = Some(join_block);
        self.push_element(CfgElement::Expr { expr: join, root: false });
        Ok(join)
    }

    fn lower_conditional_value(
        &mut self,
        cond: &ast::Expr,
        then_expr: &ast::Expr,
        else_expr: &ast::Expr,
        range: SourceRange,
    ) -> Result<ExprId> {
        let then_block = self.new_block();
        let else_block = self.new_block();
        let join_block = self.new_block();
        self.lower_condition(cond, then_block, else_block, BranchKind::Conditional)?;

        self.current = Some(then_block);
        let then_value = self.lower_rvalue(then_expr)?;
        let then_end = self.current;
        self.current = Some(else_block);
        let else_value = self.lower_rvalue(else_expr)?;
        let else_end = self.current;

        let (tt, et) = (self.ty(then_value), self.ty(else_value));
        let ty = if tt.is_integer() && et.is_integer() {
            Type::Int
        } else if tt.is_pointer() {
            tt
        } else if et.is_pointer() {
            et
        } else if tt == et {
            tt
        } else {
            return Err(SemanticError::IncompatibleTypes {
                from: et,
                to: tt,
                location: range.begin,
            });
        };

        let join = self.add_detached(ExprKind::Join, ty.clone(), range);
        for (end, value) in [(then_end, then_value), (else_end, else_value)] {
            self.current = end;
            let value = self.convert(value, &ty)?;
            self.push_element(CfgElement::Merge {
                target: join,
                value: MergeValue::Expr(value),
            });
            self.jump(join_block, JumpKind::Fallthrough);
        }

        self.current = Some(join_block);
        self.push_element(CfgElement::Expr { expr: join, root: false });
        Ok(join)
    }

    fn lower_unary(&mut self, op: UnOp, operand: &ast::Expr, range: SourceRange) -> Result<ExprId> {
        match op {
            UnOp::Neg | UnOp::BitNot => {
                let value = self.lower_rvalue(operand)?;
                let value = self.require_integer(value)?;
                let op = if op == UnOp::Neg { UnaryOp::Neg } else { UnaryOp::BitNot };
                Ok(self.add_expr(ExprKind::Unary { op, operand: value }, Type::Int, range))
            }
            UnOp::Not => {
                let value = self.lower_rvalue(operand)?;
                self.require_scalar(value)?;
                Ok(self.add_expr(
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: value,
                    },
                    Type::Int,
                    range,
                ))
            }
            UnOp::Deref => {
                let pointer = self.lower_rvalue(operand)?;
                match self.ty(pointer).pointee() {
                    Some(pointee) if !pointee.is_void() => {
                        let pointee = pointee.clone();
                        Ok(self.add_expr(ExprKind::Deref(pointer), pointee, range))
                    }
                    _ => Err(SemanticError::InvalidOperands {
                        message: format!("indirection requires pointer operand ('{}' invalid)", self.ty(pointer)),
                        location: range.begin,
                    }),
                }
            }
            UnOp::AddrOf => {
                let target = self.lower_lvalue(operand)?;
                let ty = self.ty(target).pointer_to();
                Ok(self.add_expr(ExprKind::AddrOf(target), ty, range))
            }
            UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => {
                let target = self.lower_lvalue(operand)?;
                self.require_scalar(target)?;
                let ty = self.ty(target);
                Ok(self.add_expr(
                    ExprKind::IncDec {
                        target,
                        increment: matches!(op, UnOp::PreInc | UnOp::PostInc),
                        prefix: matches!(op, UnOp::PreInc | UnOp::PreDec),
                    },
                    ty,
                    range,
                ))
            }
        }
    }

    fn lower_assign(
        &mut self,
        op: Option<BinOp>,
        target: &ast::Expr,
        value: &ast::Expr,
        range: SourceRange,
    ) -> Result<ExprId> {
        let target = self.lower_lvalue(target)?;
        let target_ty = self.ty(target);
        if target_ty.is_array() {
            return Err(SemanticError::NotAnLvalue { location: range.begin });
        }
        let value = self.lower_rvalue(value)?;
        match op {
            None => {
                let value = self.convert(value, &target_ty)?;
                Ok(self.add_expr(ExprKind::Assign { target, value }, target_ty, range))
            }
            Some(op) => {
                self.require_scalar(target)?;
                if target_ty.is_pointer() && !matches!(op, BinOp::Add | BinOp::Sub) {
                    return Err(invalid_operands(op, &target_ty, &self.ty(value), range));
                }
                let value = self.require_integer(value)?;
                Ok(self.add_expr(ExprKind::CompoundAssign { op, target, value }, target_ty, range))
            }
        }
    }

    fn lower_call(&mut self, callee: &str, args: &[ast::Expr], range: SourceRange) -> Result<ExprId> {
        let function = self.resolve_function(callee, range.begin);
        let decl = self.program.function(function);
        let (param_types, variadic, return_type) =
            (decl.param_types.clone(), decl.variadic, decl.return_type.clone());

        // `int f()` declares a function with unspecified parameters
        let unspecified = param_types.is_empty() && !variadic;
        let count_ok = unspecified
            || args.len() == param_types.len()
            || (variadic && args.len() >= param_types.len());
        if !count_ok {
            return Err(SemanticError::ArgumentCount {
                function: callee.to_string(),
                expected: param_types.len(),
                got: args.len(),
                location: range.begin,
            });
        }

        let mut lowered = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let value = self.lower_rvalue(arg)?;
            let value = match param_types.get(i) {
                Some(ty) => self.convert(value, ty)?,
                None if self.ty(value) == Type::Char => self.convert(value, &Type::Int)?,
                None => value,
            };
            lowered.push(value);
        }
        Ok(self.add_expr(
            ExprKind::Call {
                callee: function,
                args: lowered,
            },
            return_type,
            range,
        ))
    }

    fn lower_member(&mut self, base: &ast::Expr, field: &str, arrow: bool, range: SourceRange) -> Result<ExprId> {
        let object = if arrow {
            let pointer = self.lower_rvalue(base)?;
            let pointee = self.ty(pointer).pointee().cloned();
            match pointee {
                Some(ty @ Type::Struct(_)) => self.add_expr(ExprKind::Deref(pointer), ty, base.range),
                _ => {
                    return Err(SemanticError::InvalidOperands {
                        message: format!("member reference type '{}' is not a pointer to a struct", self.ty(pointer)),
                        location: base.location(),
                    })
                }
            }
        } else {
            self.lower_lvalue(base)?
        };

        let Type::Struct(name) = self.ty(object) else {
            return Err(SemanticError::InvalidOperands {
                message: format!("member reference base type '{}' is not a struct", self.ty(object)),
                location: base.location(),
            });
        };
        let owner = self.program.struct_by_name(&name).ok_or_else(|| SemanticError::UnknownStruct {
            name: name.clone(),
            location: base.location(),
        })?;
        let info = self.program.struct_info(owner);
        let index = info
            .fields
            .iter()
            .position(|f| f.name == field)
            .ok_or_else(|| SemanticError::UnknownField {
                owner: name.clone(),
                field: field.to_string(),
                location: range.end,
            })?;
        let ty = info.fields[index].ty.clone();
        Ok(self.add_expr(
            ExprKind::Member {
                base: object,
                field: FieldId {
                    owner,
                    index: index as u32,
                },
            },
            ty,
            range,
        ))
    }
}

fn invalid_operands(op: BinOp, lhs: &Type, rhs: &Type, range: SourceRange) -> SemanticError {
    SemanticError::InvalidOperands {
        message: format!("'{}' {} '{}'", lhs, op, rhs),
        location: range.begin,
    }
}

fn init_location(items: &[ast::Initializer]) -> SourceLocation {
    match items.first() {
        Some(ast::Initializer::Expr(e)) => e.location(),
        Some(ast::Initializer::List(_, location)) => *location,
        None => SourceLocation::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_source;

    fn build(source: &str) -> Program {
        let unit = parse_source(source).unwrap();
        build_program(&unit, "test.c").unwrap()
    }

    fn build_err(source: &str) -> SemanticError {
        let unit = parse_source(source).unwrap();
        build_program(&unit, "test.c").unwrap_err()
    }

    fn cfg_of<'p>(program: &'p Program, name: &str) -> &'p Cfg {
        let id = program.function_by_name(name).unwrap();
        &program.function(id).body.as_ref().unwrap().cfg
    }

    #[test]
    fn test_null_initializer_is_cast_to_pointer() {
        let program = build("void f() { int *p = 0; }");
        let cfg = cfg_of(&program, "f");
        let entry = cfg.block(cfg.entry).unwrap();
        match entry.elements.last() {
            Some(CfgElement::Decl {
                init: Some(DeclInit::Expr(value)),
                ..
            }) => {
                let expr = program.expr(*value);
                assert!(matches!(expr.kind, ExprKind::Cast { .. }));
                assert_eq!(expr.ty, Type::Int.pointer_to());
            }
            other => panic!("Expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else_makes_diamond() {
        let program = build("int f(int c) { int x; if (c) x = 1; else x = 2; return x; }");
        let cfg = cfg_of(&program, "f");
        let entry = cfg.block(cfg.entry).unwrap();
        let Terminator::Branch {
            then_block,
            else_block,
            kind,
            ..
        } = entry.terminator.clone()
        else {
            panic!("Expected branch, got {:?}", entry.terminator);
        };
        assert_eq!(kind, BranchKind::If);
        let then_succ = cfg.block(then_block).unwrap().terminator.successors();
        let else_succ = cfg.block(else_block).unwrap().terminator.successors();
        assert_eq!(then_succ, else_succ);
        assert_eq!(cfg.predecessors(then_succ[0]).len(), 2);
    }

    #[test]
    fn test_loop_head_is_flagged() {
        let program = build("void f(int n) { while (n > 0) n--; }");
        let cfg = cfg_of(&program, "f");
        let heads: Vec<_> = cfg.blocks.iter().filter(|b| b.loop_head).collect();
        assert_eq!(heads.len(), 1);
        assert!(matches!(
            heads[0].terminator,
            Terminator::Branch {
                kind: BranchKind::Loop(LoopKind::While),
                ..
            }
        ));
    }

    #[test]
    fn test_logical_value_uses_merges() {
        let program = build("int f(int a, int b) { return a && b; }");
        let cfg = cfg_of(&program, "f");
        let merges = cfg
            .blocks
            .iter()
            .flat_map(|b| b.elements.iter())
            .filter(|e| matches!(e, CfgElement::Merge { .. }))
            .count();
        assert_eq!(merges, 2);
    }

    #[test]
    fn test_sizeof_is_folded_without_evaluation() {
        let program = build("struct S { int a; char b; int *c; };\nint f() { int x = 0; return sizeof(struct S) + sizeof x++; }");
        let cfg = cfg_of(&program, "f");
        let has_incdec = cfg
            .blocks
            .iter()
            .flat_map(|b| b.elements.iter())
            .any(|e| matches!(e, CfgElement::Expr { expr, .. } if matches!(program.expr(*expr).kind, ExprKind::IncDec { .. })));
        assert!(!has_incdec);
        let literals: Vec<i64> = program
            .exprs
            .iter()
            .filter_map(|e| match e.kind {
                ExprKind::IntLiteral(n) => Some(n),
                _ => None,
            })
            .collect();
        assert!(literals.contains(&13));
        assert!(literals.contains(&4));
    }

    #[test]
    fn test_builtin_prototypes() {
        let program = build("void f() { int *p = malloc(4); free(p); }");
        let malloc = program.function_by_name("malloc").unwrap();
        assert_eq!(program.function(malloc).return_type, Type::Void.pointer_to());
        assert!(!program.function(malloc).is_defined());
    }

    #[test]
    fn test_string_initializer_for_char_array() {
        let program = build("void f() { char s[] = \"hi\"; }");
        let var = program.vars.iter().find(|v| v.name == "s").unwrap();
        assert_eq!(var.ty, Type::Char.array_of(Some(3)));
    }

    #[test]
    fn test_semantic_errors() {
        assert!(matches!(
            build_err("int f() { return y; }"),
            SemanticError::UnknownIdentifier { ref name, .. } if name == "y"
        ));
        assert!(matches!(build_err("void f() { break; }"), SemanticError::MisplacedJump { .. }));
        assert!(matches!(build_err("void f() { goto out; }"), SemanticError::UndefinedLabel { .. }));
        assert!(matches!(
            build_err("struct S { int a; };\nint f(struct S *s) { return s->b; }"),
            SemanticError::UnknownField { .. }
        ));
        assert!(matches!(
            build_err("int g(int a, int b);\nint f() { return g(1); }"),
            SemanticError::ArgumentCount { expected: 2, got: 1, .. }
        ));
        assert!(matches!(build_err("void f() { 3 = 4; }"), SemanticError::NotAnLvalue { .. }));
    }

    #[test]
    fn test_switch_targets() {
        let program = build("int f(int k) { switch (k) { case 1: return 10; case 2: k++; default: break; } return k; }");
        let cfg = cfg_of(&program, "f");
        let switch = cfg
            .blocks
            .iter()
            .find_map(|b| match &b.terminator {
                Terminator::Switch {
                    cases,
                    default_location,
                    ..
                } => Some((cases.clone(), *default_location)),
                _ => None,
            })
            .unwrap();
        assert_eq!(switch.0.iter().map(|c| c.value).collect::<Vec<_>>(), vec![1, 2]);
        assert!(switch.1.is_some());
    }

    #[test]
    fn test_global_initializers() {
        let program = build("int limit = 4 * 2;\nchar *name = \"x\";\nint table[3] = {1, 2};\nint *cursor = 0;");
        let values: Vec<_> = program.globals.iter().map(|g| g.value.clone()).collect();
        assert_eq!(values[0], Some(ConstInit::Int(8)));
        assert!(matches!(values[1], Some(ConstInit::String(_))));
        assert_eq!(values[2], Some(ConstInit::List(vec![ConstInit::Int(1), ConstInit::Int(2)])));
        assert_eq!(values[3], Some(ConstInit::Null));
    }
}
