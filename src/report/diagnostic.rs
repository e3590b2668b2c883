// Finished path diagnostics, independent of the graph they came from

use crate::frontend::ast::{SourceLocation, SourceRange};

/// A note at one source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPiece {
    pub location: SourceLocation,
    pub ranges: Vec<SourceRange>,
    pub message: String,
}

impl EventPiece {
    pub fn new(location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            ranges: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_range(mut self, range: SourceRange) -> Self {
        self.ranges.push(range);
        self
    }
}

/// One jump between two source ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEdge {
    pub start: SourceRange,
    pub end: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowPiece {
    pub edges: Vec<ControlEdge>,
    /// Explanation of the jump ("Taking true branch"); empty for plain edges
    pub message: String,
}

impl ControlFlowPiece {
    pub fn location(&self) -> SourceLocation {
        self.edges.first().map(|e| e.start.begin).unwrap_or_default()
    }
}

/// The part of a path spent inside an inlined call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallPiece {
    /// "Calling 'f'", in the caller
    pub call_enter: Option<EventPiece>,
    /// "Entered call from 'g'", at the top of the callee
    pub call_enter_within_caller: Option<EventPiece>,
    pub path: Vec<PathPiece>,
    /// "Returning from 'f'", back in the caller
    pub call_exit: Option<EventPiece>,
    pub call_site: SourceLocation,
}

/// Consecutive pieces produced by one macro expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroPiece {
    pub name: String,
    pub location: SourceLocation,
    pub sub_pieces: Vec<PathPiece>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPiece {
    Event(EventPiece),
    ControlFlow(ControlFlowPiece),
    Call(CallPiece),
    Macro(MacroPiece),
}

impl PathPiece {
    pub fn location(&self) -> SourceLocation {
        match self {
            PathPiece::Event(event) => event.location,
            PathPiece::ControlFlow(control) => control.location(),
            PathPiece::Call(call) => call.call_site,
            PathPiece::Macro(group) => group.location,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            PathPiece::Event(event) => Some(&event.message),
            PathPiece::ControlFlow(control) if !control.message.is_empty() => Some(&control.message),
            _ => None,
        }
    }

    /// Number of pieces including everything nested inside this one.
    pub fn full_size(&self) -> usize {
        match self {
            PathPiece::Event(_) | PathPiece::ControlFlow(_) => 1,
            PathPiece::Call(call) => {
                let wrappers = [&call.call_enter, &call.call_enter_within_caller, &call.call_exit]
                    .iter()
                    .filter(|piece| piece.is_some())
                    .count();
                wrappers + call.path.iter().map(PathPiece::full_size).sum::<usize>()
            }
            PathPiece::Macro(group) => group.sub_pieces.iter().map(PathPiece::full_size).sum(),
        }
    }
}

/// Declaration a diagnostic was found in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueContext {
    pub kind: String,
    pub name: String,
}

/// Key under which two diagnostics count as the same issue
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiagnosticProfile {
    pub bug_type: String,
    pub category: String,
    pub description: String,
    pub location: SourceLocation,
}

/// A reported defect and the path leading to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDiagnostic {
    pub file: String,
    pub bug_type: String,
    pub category: String,
    pub description: String,
    pub location: SourceLocation,
    pub issue_context: Option<IssueContext>,
    pub path: Vec<PathPiece>,
}

impl PathDiagnostic {
    pub fn profile(&self) -> DiagnosticProfile {
        DiagnosticProfile {
            bug_type: self.bug_type.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            location: self.location,
        }
    }

    pub fn full_size(&self) -> usize {
        self.path.iter().map(PathPiece::full_size).sum()
    }

    /// Event messages in path order, with their call depth.
    pub fn events(&self) -> Vec<(usize, &EventPiece)> {
        fn walk<'d>(pieces: &'d [PathPiece], depth: usize, out: &mut Vec<(usize, &'d EventPiece)>) {
            for piece in pieces {
                match piece {
                    PathPiece::Event(event) => out.push((depth, event)),
                    PathPiece::ControlFlow(_) => {}
                    PathPiece::Call(call) => {
                        if let Some(enter) = &call.call_enter {
                            out.push((depth, enter));
                        }
                        if let Some(enter) = &call.call_enter_within_caller {
                            out.push((depth + 1, enter));
                        }
                        walk(&call.path, depth + 1, out);
                        if let Some(exit) = &call.call_exit {
                            out.push((depth + 1, exit));
                        }
                    }
                    PathPiece::Macro(group) => walk(&group.sub_pieces, depth, out),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.path, 0, &mut out);
        out
    }

    /// Every message on the path (events and control-flow explanations),
    /// in path order.
    pub fn messages(&self) -> Vec<&str> {
        fn walk<'d>(pieces: &'d [PathPiece], out: &mut Vec<&'d str>) {
            for piece in pieces {
                match piece {
                    PathPiece::Event(_) | PathPiece::ControlFlow(_) => out.extend(piece.message()),
                    PathPiece::Call(call) => {
                        out.extend(call.call_enter.as_ref().map(|e| e.message.as_str()));
                        out.extend(call.call_enter_within_caller.as_ref().map(|e| e.message.as_str()));
                        walk(&call.path, out);
                        out.extend(call.call_exit.as_ref().map(|e| e.message.as_str()));
                    }
                    PathPiece::Macro(group) => walk(&group.sub_pieces, out),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.path, &mut out);
        out
    }

    /// The last piece of the path, looking through calls and macros.
    pub fn last_event(&self) -> Option<&EventPiece> {
        self.events().last().map(|(_, event)| *event)
    }
}
