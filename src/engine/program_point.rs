// Positions in the analyzed program, as seen by the exploded graph

use crate::cfg::{BasicBlock, BlockId, CallSite, FrameId, FunctionId, LocationContextManager, Program, Terminator};
use crate::frontend::ast::{SourceLocation, SourceRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointKind {
    /// Start of a top-level function
    FunctionEntry,
    /// Transition along a CFG edge
    BlockEdge { src: BlockId, dst: BlockId },
    BlockEntrance { block: BlockId },
    /// Before the element at `index` of `block`
    PreStmt { block: BlockId, index: u32 },
    /// After the element at `index` of `block`
    PostStmt { block: BlockId, index: u32 },
    /// Arguments bound, about to enter `callee` (caller's frame)
    CallEnter { site: CallSite, callee: FunctionId },
    /// Callee finished, about to return to the caller (callee's frame)
    CallExit { site: CallSite },
    /// Evaluating the terminator of `block`
    BlockExit { block: BlockId },
    /// Reached the exit block of the frame
    EndFunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramPoint {
    pub kind: PointKind,
    pub frame: FrameId,
    /// Name of the checker that produced the node, if any
    pub tag: Option<&'static str>,
}

impl ProgramPoint {
    pub fn new(kind: PointKind, frame: FrameId) -> Self {
        Self { kind, frame, tag: None }
    }

    pub fn with_tag(self, tag: &'static str) -> Self {
        Self { tag: Some(tag), ..self }
    }

    pub fn untagged(self) -> Self {
        Self { tag: None, ..self }
    }

    /// Block and element index for statement points.
    pub fn statement(&self) -> Option<(BlockId, u32)> {
        match self.kind {
            PointKind::PreStmt { block, index } | PointKind::PostStmt { block, index } => Some((block, index)),
            _ => None,
        }
    }

    /// Source range the point stands for, if it has one.
    pub fn range(&self, program: &Program, frames: &LocationContextManager) -> Option<SourceRange> {
        let function = program.function(frames.frame(self.frame)?.function);
        let cfg = &function.body.as_ref()?.cfg;
        match self.kind {
            PointKind::FunctionEntry => Some(SourceRange::point(function.location)),
            PointKind::EndFunction => Some(SourceRange::point(function.end_location)),
            PointKind::PreStmt { block, index } | PointKind::PostStmt { block, index } => {
                let element = cfg.block(block)?.elements.get(index as usize)?;
                Some(program.element_range(element))
            }
            PointKind::BlockEntrance { block } => block_start(program, cfg.block(block)?)
                .or_else(|| (block == cfg.exit).then(|| SourceRange::point(function.end_location))),
            PointKind::BlockExit { block } | PointKind::BlockEdge { src: block, .. } => {
                terminator_range(program, cfg.block(block)?)
            }
            PointKind::CallEnter { site, .. } | PointKind::CallExit { site } => Some(program.expr(site.expr).range),
        }
    }

    pub fn location(&self, program: &Program, frames: &LocationContextManager) -> Option<SourceLocation> {
        self.range(program, frames).map(|range| range.begin)
    }
}

/// Range of the first thing evaluated in `block`.
pub fn block_start(program: &Program, block: &BasicBlock) -> Option<SourceRange> {
    match block.elements.first() {
        Some(element) => Some(program.element_range(element)),
        None => terminator_range(program, block),
    }
}

/// Range of the condition (or statement) that ends `block`.
pub fn terminator_range(program: &Program, block: &BasicBlock) -> Option<SourceRange> {
    match &block.terminator {
        Terminator::Branch { cond, .. } | Terminator::Switch { cond, .. } => Some(program.expr(*cond).range),
        Terminator::Goto { .. } | Terminator::Exit => None,
    }
}
