//! Per-operation completion deadlines

use crate::opcode::OpCode;

use std::collections::HashMap;
use std::time::Duration;

/// the deadline applied when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// How long the bridge waits for an application handler
///
/// `init` and `error` are answered by the bridge itself and never time out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// wait forever
    Disabled,
    /// the same deadline for every operation
    Global(Duration),
    /// a default plus per-operation overrides; `None` disables the deadline
    PerOperation {
        default: Option<Duration>,
        overrides: HashMap<OpCode, Option<Duration>>,
    },
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::Global(DEFAULT_TIMEOUT)
    }
}

impl TimeoutPolicy {
    /// A global deadline in milliseconds; zero disables it
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        match millis {
            0 => Self::Disabled,
            _ => Self::Global(Duration::from_millis(millis)),
        }
    }

    /// Per-operation deadlines falling back to [`DEFAULT_TIMEOUT`]
    #[must_use]
    pub fn per_operation() -> Self {
        Self::PerOperation {
            default: Some(DEFAULT_TIMEOUT),
            overrides: HashMap::new(),
        }
    }

    /// Overrides the deadline of one operation
    ///
    /// A global or disabled policy becomes per-operation, keeping its deadline
    /// as the default.
    #[must_use]
    pub fn with(self, op: OpCode, deadline: Option<Duration>) -> Self {
        let (default, mut overrides) = match self {
            Self::Disabled => (None, HashMap::new()),
            Self::Global(d) => (Some(d), HashMap::new()),
            Self::PerOperation { default, overrides } => (default, overrides),
        };
        let _ = overrides.insert(op, deadline);
        Self::PerOperation { default, overrides }
    }

    /// The deadline applied to `op`, if any
    #[must_use]
    pub fn deadline_for(&self, op: OpCode) -> Option<Duration> {
        if let OpCode::Init | OpCode::Error = op {
            return None;
        }
        match *self {
            Self::Disabled => None,
            Self::Global(d) => Some(d),
            Self::PerOperation {
                default,
                ref overrides,
            } => overrides.get(&op).copied().unwrap_or(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_global() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.deadline_for(OpCode::Read), Some(DEFAULT_TIMEOUT));
        assert_eq!(policy.deadline_for(OpCode::Init), None);
        assert_eq!(TimeoutPolicy::from_millis(0), TimeoutPolicy::Disabled);
        assert_eq!(TimeoutPolicy::Disabled.deadline_for(OpCode::Read), None);
    }

    #[test]
    fn overrides() {
        let policy = TimeoutPolicy::from_millis(50)
            .with(OpCode::Read, Some(Duration::from_secs(1)))
            .with(OpCode::Write, None);
        assert_eq!(policy.deadline_for(OpCode::Read), Some(Duration::from_secs(1)));
        assert_eq!(policy.deadline_for(OpCode::Write), None);
        assert_eq!(
            policy.deadline_for(OpCode::GetAttr),
            Some(Duration::from_millis(50))
        );
    }
}
