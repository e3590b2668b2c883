//! Stack frames of the analyzed call chain
//!
//! A [`StackFrame`] names a function activation: the function, the frame
//! that called it and the call site. Frames are interned by
//! [`LocationContextManager`] so equal chains share one [`FrameId`], which
//! keys stack memory spaces and environment entries.

use super::ir::{BlockId, ExprId, FunctionId};
use rustc_hash::FxHashMap;
use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

/// Call expression position inside the caller's CFG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub block: BlockId,
    pub index: u32,
    pub expr: ExprId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackFrame {
    pub parent: Option<FrameId>,
    pub function: FunctionId,
    pub call_site: Option<CallSite>,
    /// Number of frames below this one
    pub depth: u32,
}

#[derive(Debug, Default)]
pub struct LocationContextManager {
    frames: RefCell<Vec<StackFrame>>,
    index: RefCell<FxHashMap<StackFrame, FrameId>>,
}

impl LocationContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&self, frame: StackFrame) -> FrameId {
        if let Some(id) = self.index.borrow().get(&frame) {
            return *id;
        }
        let mut frames = self.frames.borrow_mut();
        let id = FrameId(frames.len() as u32);
        frames.push(frame);
        self.index.borrow_mut().insert(frame, id);
        id
    }

    /// Frame of a function analyzed as an entry point.
    pub fn top_frame(&self, function: FunctionId) -> FrameId {
        self.intern(StackFrame {
            parent: None,
            function,
            call_site: None,
            depth: 0,
        })
    }

    /// Frame of `function` called from `parent` at `call_site`.
    pub fn callee_frame(&self, parent: FrameId, function: FunctionId, call_site: CallSite) -> FrameId {
        let depth = self.frame(parent).map_or(0, |p| p.depth + 1);
        self.intern(StackFrame {
            parent: Some(parent),
            function,
            call_site: Some(call_site),
            depth,
        })
    }

    pub fn frame(&self, id: FrameId) -> Option<StackFrame> {
        self.frames.borrow().get(id.0 as usize).copied()
    }

    /// `id` followed by its callers, innermost first.
    pub fn ancestors(&self, id: FrameId) -> Vec<FrameId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.frame(current).and_then(|f| f.parent) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Whether `function` already has an activation in the chain of `id`.
    pub fn is_on_stack(&self, id: FrameId, function: FunctionId) -> bool {
        self.ancestors(id)
            .into_iter()
            .any(|f| self.frame(f).is_some_and(|frame| frame.function == function))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_interned() {
        let manager = LocationContextManager::new();
        let top = manager.top_frame(FunctionId(0));
        assert_eq!(top, manager.top_frame(FunctionId(0)));

        let site = CallSite {
            block: BlockId(0),
            index: 3,
            expr: ExprId(7),
        };
        let callee = manager.callee_frame(top, FunctionId(1), site);
        assert_eq!(callee, manager.callee_frame(top, FunctionId(1), site));
        assert_ne!(callee, top);
        assert_eq!(manager.frame(callee).unwrap().depth, 1);
        assert_eq!(manager.ancestors(callee), vec![callee, top]);
        assert!(manager.is_on_stack(callee, FunctionId(0)));
        assert!(!manager.is_on_stack(top, FunctionId(1)));
    }
}
