//! Region interning
//!
//! [`MemRegionManager`] is the only way to build a [`MemRegion`]. Every
//! factory looks the structural key up in an interning table first, so two
//! requests with equal parameters return the same [`RegionId`] and region
//! equality is a handle comparison.

use super::region::*;
use crate::cfg::{ExprId, ExprKind, FieldId, FrameId, FunctionId, Program, VarId, VarKind};
use crate::frontend::ast::Type;
use crate::svals::SymbolId;
use rustc_hash::FxHashMap;
use std::cell::RefCell;

#[derive(Debug)]
pub struct MemRegionManager<'p> {
    program: &'p Program,
    regions: RefCell<Vec<MemRegion>>,
    index: RefCell<FxHashMap<MemRegion, RegionId>>,
}

impl<'p> MemRegionManager<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            regions: RefCell::new(Vec::new()),
            index: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    fn intern(&self, region: MemRegion) -> RegionId {
        if let Some(id) = self.index.borrow().get(&region) {
            return *id;
        }
        let mut regions = self.regions.borrow_mut();
        let id = RegionId(regions.len() as u32);
        regions.push(region.clone());
        self.index.borrow_mut().insert(region, id);
        id
    }

    pub fn get(&self, id: RegionId) -> MemRegion {
        self.regions.borrow()[id.index()].clone()
    }

    pub fn len(&self) -> usize {
        self.regions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ===== Memory spaces =====

    pub fn stack_locals(&self, frame: FrameId) -> RegionId {
        self.intern(MemRegion::StackLocals { frame })
    }

    pub fn stack_arguments(&self, frame: FrameId) -> RegionId {
        self.intern(MemRegion::StackArguments { frame })
    }

    pub fn heap(&self) -> RegionId {
        self.intern(MemRegion::Heap)
    }

    pub fn unknown_space(&self) -> RegionId {
        self.intern(MemRegion::Unknown)
    }

    pub fn globals(&self, kind: GlobalsKind) -> RegionId {
        self.intern(MemRegion::Globals(kind))
    }

    pub fn code_space(&self) -> RegionId {
        self.intern(MemRegion::CodeSpace)
    }

    // ===== Subregions =====

    /// Region of a variable; globals and static locals ignore `frame`.
    pub fn var_region(&self, var: VarId, frame: FrameId) -> RegionId {
        let super_region = match self.program.var(var).kind {
            VarKind::Local => self.stack_locals(frame),
            VarKind::Param(_) => self.stack_arguments(frame),
            VarKind::Global { is_static: true } | VarKind::StaticLocal => self.globals(GlobalsKind::StaticGlobals),
            VarKind::Global { is_static: false } => self.globals(GlobalsKind::NonStaticGlobals),
        };
        self.intern(MemRegion::Var { var, super_region })
    }

    pub fn field_region(&self, field: FieldId, super_region: RegionId) -> RegionId {
        self.intern(MemRegion::Field { field, super_region })
    }

    pub fn element_region(&self, element_type: Type, index: RegionIndex, super_region: RegionId) -> RegionId {
        self.intern(MemRegion::Element {
            element_type,
            index,
            super_region,
        })
    }

    /// Memory behind a symbolic pointer of unknown origin
    pub fn symbolic_region(&self, symbol: SymbolId) -> RegionId {
        let super_region = self.unknown_space();
        self.intern(MemRegion::Symbolic { symbol, super_region })
    }

    /// Memory returned by an allocator
    pub fn symbolic_heap_region(&self, symbol: SymbolId) -> RegionId {
        let super_region = self.heap();
        self.intern(MemRegion::Symbolic { symbol, super_region })
    }

    pub fn alloca_region(&self, expr: ExprId, count: u32, frame: FrameId) -> RegionId {
        let super_region = self.stack_locals(frame);
        self.intern(MemRegion::Alloca {
            expr,
            count,
            super_region,
        })
    }

    pub fn code_region(&self, function: FunctionId) -> RegionId {
        let super_region = self.code_space();
        self.intern(MemRegion::Code { function, super_region })
    }

    pub fn string_region(&self, expr: ExprId) -> RegionId {
        let super_region = self.globals(GlobalsKind::Immutable);
        self.intern(MemRegion::String { expr, super_region })
    }

    pub fn temporary_region(&self, expr: ExprId, frame: FrameId) -> RegionId {
        let super_region = self.stack_locals(frame);
        self.intern(MemRegion::Temporary { expr, super_region })
    }

    // ===== Queries =====

    pub fn super_region(&self, id: RegionId) -> Option<RegionId> {
        self.regions.borrow()[id.index()].super_region()
    }

    pub fn memory_space(&self, id: RegionId) -> RegionId {
        let mut current = id;
        while let Some(parent) = self.super_region(current) {
            current = parent;
        }
        current
    }

    /// The object a field or element belongs to.
    pub fn base_region(&self, id: RegionId) -> RegionId {
        let mut current = id;
        loop {
            let region = self.get(current);
            match (region.is_sub_object(), region.super_region()) {
                (true, Some(parent)) => current = parent,
                _ => return current,
            }
        }
    }

    /// Drop zero-index element layers that only reinterpret the type.
    pub fn strip_casts(&self, id: RegionId) -> RegionId {
        let mut current = id;
        while let MemRegion::Element {
            index: RegionIndex::Concrete(0),
            super_region,
            ..
        } = self.get(current)
        {
            current = super_region;
        }
        current
    }

    /// Whether `id` lies strictly inside `ancestor`.
    pub fn is_sub_region_of(&self, id: RegionId, ancestor: RegionId) -> bool {
        let mut current = id;
        while let Some(parent) = self.super_region(current) {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Byte offset from the base region, when every index on the way is
    /// concrete.
    pub fn as_offset(&self, id: RegionId) -> Option<RegionOffset> {
        let mut offset = 0i64;
        let mut current = id;
        loop {
            match self.get(current) {
                MemRegion::Field { field, super_region } => {
                    offset += self.program.field_offset(field) as i64;
                    current = super_region;
                }
                MemRegion::Element {
                    element_type,
                    index,
                    super_region,
                } => {
                    let size = self.program.size_of(&element_type) as i64;
                    offset += index.as_concrete()?.checked_mul(size)?;
                    current = super_region;
                }
                _ => return Some(RegionOffset { base: current, offset }),
            }
        }
    }

    fn space_of(&self, id: RegionId) -> MemRegion {
        self.get(self.memory_space(id))
    }

    pub fn has_stack_storage(&self, id: RegionId) -> bool {
        self.space_of(id).is_stack_space()
    }

    pub fn has_stack_parameters_storage(&self, id: RegionId) -> bool {
        matches!(self.space_of(id), MemRegion::StackArguments { .. })
    }

    pub fn has_stack_non_parameters_storage(&self, id: RegionId) -> bool {
        matches!(self.space_of(id), MemRegion::StackLocals { .. })
    }

    pub fn has_globals_or_parameters_storage(&self, id: RegionId) -> bool {
        matches!(
            self.space_of(id),
            MemRegion::Globals(_) | MemRegion::StackArguments { .. }
        )
    }

    pub fn has_global_storage(&self, id: RegionId) -> bool {
        matches!(self.space_of(id), MemRegion::Globals(_))
    }

    /// Frame owning the stack space of `id`, if it lives on the stack.
    pub fn stack_frame(&self, id: RegionId) -> Option<FrameId> {
        match self.space_of(id) {
            MemRegion::StackLocals { frame } | MemRegion::StackArguments { frame } => Some(frame),
            _ => None,
        }
    }

    /// Symbol a symbolic region is based on
    pub fn symbolic_base(&self, id: RegionId) -> Option<SymbolId> {
        match self.get(self.base_region(id)) {
            MemRegion::Symbolic { symbol, .. } => Some(symbol),
            _ => None,
        }
    }

    /// Type of the value stored in the region, when the region has one.
    pub fn value_type(&self, id: RegionId) -> Option<Type> {
        match self.get(id) {
            MemRegion::Var { var, .. } => Some(self.program.var(var).ty.clone()),
            MemRegion::Field { field, .. } => Some(self.program.field(field).ty.clone()),
            MemRegion::Element { element_type, .. } => Some(element_type),
            MemRegion::String { expr, .. } | MemRegion::Temporary { expr, .. } => {
                Some(self.program.expr(expr).ty.clone())
            }
            _ => None,
        }
    }

    /// Source-like spelling (`p`, `s.f`, `a[2]`) for regions the user named.
    pub fn describe(&self, id: RegionId) -> Option<String> {
        match self.get(id) {
            MemRegion::Var { var, .. } => Some(self.program.var(var).name.clone()),
            MemRegion::Field { field, super_region } => {
                let name = &self.program.field(field).name;
                match self.get(super_region) {
                    MemRegion::Symbolic { .. } => None,
                    _ => Some(format!("{}.{}", self.describe(super_region)?, name)),
                }
            }
            MemRegion::Element {
                index: RegionIndex::Concrete(n),
                super_region,
                ..
            } => Some(format!("{}[{}]", self.describe(super_region)?, n)),
            _ => None,
        }
    }

    /// Debug spelling of a region.
    pub fn dump(&self, id: RegionId) -> String {
        match self.get(id) {
            MemRegion::StackLocals { .. } => "StackLocalsSpaceRegion".to_string(),
            MemRegion::StackArguments { .. } => "StackArgumentsSpaceRegion".to_string(),
            MemRegion::Heap => "HeapSpaceRegion".to_string(),
            MemRegion::Unknown => "UnknownSpaceRegion".to_string(),
            MemRegion::Globals(GlobalsKind::StaticGlobals) => "StaticGlobalsMemSpace".to_string(),
            MemRegion::Globals(GlobalsKind::NonStaticGlobals) => "GlobalInternalSpaceRegion".to_string(),
            MemRegion::Globals(GlobalsKind::Immutable) => "GlobalImmutableSpaceRegion".to_string(),
            MemRegion::CodeSpace => "CodeSpaceRegion".to_string(),
            MemRegion::Symbolic { symbol, .. } => format!("SymRegion{{{}}}", symbol),
            MemRegion::Alloca { expr, count, .. } => format!("alloca{{{},{}}}", expr.0, count),
            MemRegion::Code { function, .. } => format!("code{{{}}}", self.program.function(function).name),
            MemRegion::String { expr, .. } => match &self.program.expr(expr).kind {
                ExprKind::StringLiteral(s) => format!("{:?}", s),
                _ => "string".to_string(),
            },
            MemRegion::Temporary { expr, .. } => format!("temp_object{{{}}}", expr.0),
            MemRegion::Var { var, .. } => self.program.var(var).name.clone(),
            MemRegion::Field { field, super_region } => {
                format!("{}->{}", self.dump(super_region), self.program.field(field).name)
            }
            MemRegion::Element {
                element_type,
                index,
                super_region,
            } => format!("element{{{},{} S64b,{}}}", self.dump(super_region), index, element_type),
        }
    }

    /// Debug spelling of a region offset.
    pub fn dump_offset(&self, offset: RegionOffset) -> String {
        format!("raw_offset{{{},{} S64b}}", self.dump(offset.base), offset.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::{build_program, LocationContextManager};
    use crate::frontend::parse_source;

    fn program(source: &str) -> Program {
        build_program(&parse_source(source).unwrap(), "test.c").unwrap()
    }

    fn var(program: &Program, name: &str) -> VarId {
        VarId(program.vars.iter().position(|v| v.name == name).unwrap() as u32)
    }

    #[test]
    fn test_regions_are_canonical() {
        let program = program("struct P { int x; int y; };\nint g;\nint f(int a) { struct P p; int arr[4]; return 0; }");
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let manager = MemRegionManager::new(&program);

        let p = manager.var_region(var(&program, "p"), frame);
        assert_eq!(p, manager.var_region(var(&program, "p"), frame));
        let owner = program.struct_by_name("P").unwrap();
        let x = manager.field_region(FieldId { owner, index: 0 }, p);
        let y = manager.field_region(FieldId { owner, index: 1 }, p);
        assert_ne!(x, y);
        assert_eq!(x, manager.field_region(FieldId { owner, index: 0 }, p));

        let arr = manager.var_region(var(&program, "arr"), frame);
        let e1 = manager.element_region(Type::Int, RegionIndex::Concrete(1), arr);
        assert_eq!(e1, manager.element_region(Type::Int, RegionIndex::Concrete(1), arr));
        assert_ne!(e1, manager.element_region(Type::Char, RegionIndex::Concrete(1), arr));
        assert_ne!(e1, manager.element_region(Type::Int, RegionIndex::Concrete(2), arr));

        let count = manager.len();
        manager.var_region(var(&program, "g"), frame);
        manager.var_region(var(&program, "g"), frame);
        assert_eq!(manager.len(), count + 2); // the space and the var
    }

    #[test]
    fn test_memory_spaces() {
        let program = program("int g;\nint f(int a) { int l; static int s; return 0; }");
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let manager = MemRegionManager::new(&program);

        let a = manager.var_region(var(&program, "a"), frame);
        let l = manager.var_region(var(&program, "l"), frame);
        let s = manager.var_region(var(&program, "s"), frame);
        let g = manager.var_region(var(&program, "g"), frame);

        assert!(manager.has_stack_parameters_storage(a));
        assert!(manager.has_globals_or_parameters_storage(a));
        assert!(manager.has_stack_non_parameters_storage(l));
        assert!(!manager.has_globals_or_parameters_storage(l));
        assert_eq!(manager.memory_space(s), manager.globals(GlobalsKind::StaticGlobals));
        assert_eq!(manager.memory_space(g), manager.globals(GlobalsKind::NonStaticGlobals));
        assert_eq!(manager.stack_frame(l), Some(frame));
        assert_eq!(manager.stack_frame(g), None);
    }

    #[test]
    fn test_offsets_and_bases() {
        let program = program("struct P { int x; char c; int y; };\nvoid f() { struct P ps[3]; }");
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let manager = MemRegionManager::new(&program);
        let owner = program.struct_by_name("P").unwrap();

        let ps = manager.var_region(var(&program, "ps"), frame);
        let second = manager.element_region(Type::Struct("P".to_string()), RegionIndex::Concrete(2), ps);
        let y = manager.field_region(FieldId { owner, index: 2 }, second);

        assert_eq!(manager.base_region(y), ps);
        assert!(manager.is_sub_region_of(y, ps));
        assert!(!manager.is_sub_region_of(ps, y));
        assert_eq!(manager.as_offset(y), Some(RegionOffset { base: ps, offset: 2 * 9 + 5 }));
        assert_eq!(manager.describe(y).as_deref(), Some("ps[2].y"));
        assert_eq!(manager.value_type(y), Some(Type::Int));
    }

    #[test]
    fn test_strip_casts_and_dump() {
        let program = program("void f() { int x; }");
        let frames = LocationContextManager::new();
        let frame = frames.top_frame(program.function_by_name("f").unwrap());
        let manager = MemRegionManager::new(&program);

        let x = manager.var_region(var(&program, "x"), frame);
        let as_char = manager.element_region(Type::Char, RegionIndex::Concrete(0), x);
        assert_eq!(manager.strip_casts(as_char), x);
        assert_eq!(manager.dump(as_char), "element{x,0 S64b,char}");
        assert_eq!(manager.dump(manager.code_region(program.function_by_name("f").unwrap())), "code{f}");
        let offset = manager.as_offset(as_char).unwrap();
        assert_eq!(manager.dump_offset(offset), "raw_offset{x,0 S64b}");
    }
}
