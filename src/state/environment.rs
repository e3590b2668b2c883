// Values of expressions evaluated in the current statement

use crate::cfg::{ExprId, FrameId};
use crate::store::PersistentMap;
use crate::svals::SVal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EnvKey {
    Expr { frame: FrameId, expr: ExprId },
    /// Value a returning callee hands back to its caller
    ReturnValue(FrameId),
}

/// Expression values, keyed by the frame that evaluated them.
///
/// Entries live until the root element of the statement that produced them
/// has been processed; the engine then clears the frame's expressions so
/// states at statement boundaries compare equal regardless of how they were
/// computed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Environment {
    bindings: PersistentMap<EnvKey, SVal>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, frame: FrameId, expr: ExprId) -> Option<&SVal> {
        self.bindings.get(&EnvKey::Expr { frame, expr })
    }

    pub fn bind(&self, frame: FrameId, expr: ExprId, value: SVal) -> Environment {
        Environment {
            bindings: self.bindings.insert(EnvKey::Expr { frame, expr }, value),
        }
    }

    pub fn return_value(&self, frame: FrameId) -> Option<&SVal> {
        self.bindings.get(&EnvKey::ReturnValue(frame))
    }

    pub fn bind_return_value(&self, frame: FrameId, value: SVal) -> Environment {
        Environment {
            bindings: self.bindings.insert(EnvKey::ReturnValue(frame), value),
        }
    }

    /// Drop the expression values of `frame`.
    pub fn clear_expressions(&self, frame: FrameId) -> Environment {
        Environment {
            bindings: self
                .bindings
                .retain(|key, _| !matches!(key, EnvKey::Expr { frame: f, .. } if *f == frame)),
        }
    }

    /// Drop everything `frame` bound, including its return value.
    pub fn remove_frame(&self, frame: FrameId) -> Environment {
        Environment {
            bindings: self.bindings.retain(|key, _| match key {
                EnvKey::Expr { frame: f, .. } | EnvKey::ReturnValue(f) => *f != frame,
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EnvKey, &SVal)> {
        self.bindings.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clearing_is_per_frame() {
        let caller = FrameId(0);
        let callee = FrameId(1);
        let env = Environment::new()
            .bind(caller, ExprId(3), SVal::int(1))
            .bind(callee, ExprId(4), SVal::int(2))
            .bind_return_value(callee, SVal::int(9));

        let cleared = env.clear_expressions(callee);
        assert_eq!(cleared.get(caller, ExprId(3)), Some(&SVal::int(1)));
        assert_eq!(cleared.get(callee, ExprId(4)), None);
        assert_eq!(cleared.return_value(callee), Some(&SVal::int(9)));

        let popped = env.remove_frame(callee);
        assert_eq!(popped.return_value(callee), None);
        assert_eq!(popped, Environment::new().bind(caller, ExprId(3), SVal::int(1)));
    }
}
