//! Live variable analysis
//!
//! Backward dataflow over a function's CFG. A variable is live at a point
//! when some path from there reads it before writing it. The engine drops
//! bindings of dead variables at block entrances.
//!
//! Variables whose address is taken (`&x`, or an array that decays) may be
//! read through a pointer at any time and are treated as always live.

use super::ir::*;
use rustc_hash::FxHashSet;

#[derive(Debug, Clone, Default)]
pub struct LiveVariables {
    live_in: Vec<FxHashSet<VarId>>,
    address_taken: FxHashSet<VarId>,
}

impl LiveVariables {
    pub fn compute(cfg: &Cfg, exprs: &[Expr], vars: &[VarDecl]) -> Self {
        let tracked = |var: VarId| !vars[var.index()].has_global_storage();

        // targets of plain assignments are writes, not reads
        let mut assigned = FxHashSet::default();
        let mut address_taken = FxHashSet::default();
        for element in cfg.blocks.iter().flat_map(|b| b.elements.iter()) {
            let CfgElement::Expr { expr, .. } = element else { continue };
            match &exprs[expr.index()].kind {
                ExprKind::Assign { target, .. } => {
                    if let ExprKind::VarRef(_) = exprs[target.index()].kind {
                        assigned.insert(*target);
                    }
                }
                ExprKind::AddrOf(inner) | ExprKind::Decay(inner) => {
                    if let ExprKind::VarRef(var) = exprs[inner.index()].kind {
                        address_taken.insert(var);
                    }
                }
                _ => {}
            }
        }

        let mut live_in: Vec<FxHashSet<VarId>> = vec![FxHashSet::default(); cfg.blocks.len()];
        let mut changed = true;
        while changed {
            changed = false;
            for block in cfg.blocks.iter().rev() {
                let mut live: FxHashSet<VarId> = block
                    .terminator
                    .successors()
                    .iter()
                    .flat_map(|s| live_in[s.index()].iter().copied())
                    .collect();

                for element in block.elements.iter().rev() {
                    match element {
                        CfgElement::Expr { expr, .. } => match &exprs[expr.index()].kind {
                            ExprKind::Assign { target, .. } => {
                                if let ExprKind::VarRef(var) = exprs[target.index()].kind {
                                    live.remove(&var);
                                }
                            }
                            ExprKind::VarRef(var) if tracked(*var) && !assigned.contains(expr) => {
                                live.insert(*var);
                            }
                            _ => {}
                        },
                        CfgElement::Decl { var, .. } => {
                            live.remove(var);
                        }
                        CfgElement::Merge { .. } | CfgElement::Return { .. } => {}
                    }
                }

                if live != live_in[block.id.index()] {
                    live_in[block.id.index()] = live;
                    changed = true;
                }
            }
        }

        Self { live_in, address_taken }
    }

    /// Whether `var` may be read on some path starting at the entrance of
    /// `block`.
    pub fn is_live_at_entry(&self, block: BlockId, var: VarId) -> bool {
        self.address_taken.contains(&var)
            || self
                .live_in
                .get(block.index())
                .is_some_and(|live| live.contains(&var))
    }

    pub fn is_address_taken(&self, var: VarId) -> bool {
        self.address_taken.contains(&var)
    }

    pub fn live_at_entry(&self, block: BlockId) -> impl Iterator<Item = VarId> + '_ {
        self.live_in
            .get(block.index())
            .into_iter()
            .flat_map(|live| live.iter().copied())
            .chain(self.address_taken.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_program;
    use crate::frontend::parse_source;

    fn analyze(source: &str) -> (Program, FunctionId) {
        let unit = parse_source(source).unwrap();
        let program = build_program(&unit, "test.c").unwrap();
        let id = program.function_by_name("f").unwrap();
        (program, id)
    }

    fn var_named(program: &Program, name: &str) -> VarId {
        VarId(program.vars.iter().position(|v| v.name == name).unwrap() as u32)
    }

    #[test]
    fn test_variable_dead_after_last_read() {
        let (program, id) = analyze("int f(int c) { int x = 1; int y = x; if (c) { y = 2; } return y; }");
        let body = program.function(id).body.as_ref().unwrap();
        let x = var_named(&program, "x");
        let y = var_named(&program, "y");
        let c = var_named(&program, "c");

        // in the then branch only y's new value matters
        let Terminator::Branch { then_block, .. } = body.cfg.block(body.cfg.entry).unwrap().terminator else {
            panic!("Expected branch");
        };
        assert!(!body.liveness.is_live_at_entry(then_block, x));
        assert!(!body.liveness.is_live_at_entry(then_block, y));
        assert!(!body.liveness.is_live_at_entry(then_block, c));
        assert!(body.liveness.is_live_at_entry(body.cfg.entry, c));
    }

    #[test]
    fn test_value_live_across_join() {
        let (program, id) = analyze("int f(int c) { int y = 0; if (c) { c = 1; } return y; }");
        let body = program.function(id).body.as_ref().unwrap();
        let y = var_named(&program, "y");
        let Terminator::Branch { then_block, .. } = body.cfg.block(body.cfg.entry).unwrap().terminator else {
            panic!("Expected branch");
        };
        assert!(body.liveness.is_live_at_entry(then_block, y));
    }

    #[test]
    fn test_address_taken_always_live() {
        let (program, id) = analyze("void g(int *p);\nint f() { int x = 0; g(&x); return 0; }");
        let body = program.function(id).body.as_ref().unwrap();
        let x = var_named(&program, "x");
        assert!(body.liveness.is_address_taken(x));
        assert!(body.liveness.is_live_at_entry(body.cfg.exit, x));
    }

    #[test]
    fn test_loop_keeps_counter_live() {
        let (program, id) = analyze("int f(int n) { int i = 0; while (i < n) i++; return 0; }");
        let body = program.function(id).body.as_ref().unwrap();
        let i = var_named(&program, "i");
        let head = body.cfg.blocks.iter().find(|b| b.loop_head).unwrap().id;
        assert!(body.liveness.is_live_at_entry(head, i));
    }
}
