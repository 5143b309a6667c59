//! Failure classification and recovery.

use std::fmt;

use crate::error::{FlowError, FlowResult};
use crate::events::Prompt;
use crate::session::SessionState;

/// What the controller does with a session after a step fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// Remove the session and stop the flow.
    Discard,
    /// Enter the state and keep driving the flow.
    Resume(SessionState),
    /// Enter the state and stop until the next trigger.
    Park(SessionState),
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => f.write_str("discard"),
            Self::Resume(state) => write!(f, "resume at {state}"),
            Self::Park(state) => write!(f, "park at {state}"),
        }
    }
}

/// A step failure paired with the recovery chosen where it was raised.
#[derive(Debug)]
pub struct Failure {
    /// What went wrong.
    pub error: FlowError,
    /// Where the session goes next.
    pub recovery: Recovery,
}

impl Failure {
    /// Pair an error with a recovery.
    #[must_use]
    pub const fn new(error: FlowError, recovery: Recovery) -> Self {
        Self { error, recovery }
    }
}

/// Result of one step: the next state, or a failure.
pub type StepResult = Result<SessionState, Failure>;

/// Attach a recovery to a fallible step operation.
pub trait Recover<T> {
    /// Convert the error into a [`Failure`] with `recovery`.
    ///
    /// # Errors
    ///
    /// Returns the wrapped failure when `self` is an error.
    fn recover(self, recovery: Recovery) -> Result<T, Failure>;
}

impl<T> Recover<T> for FlowResult<T> {
    fn recover(self, recovery: Recovery) -> Result<T, Failure> {
        self.map_err(|error| Failure::new(error, recovery))
    }
}

/// A user-facing account of a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Machine code.
    pub code: &'static str,
    /// Message shown to the user.
    pub message: String,
}

impl Notice {
    /// Prompt that carries this notice.
    #[must_use]
    pub fn prompt(&self) -> Prompt {
        Prompt::new("Something went wrong", self.message.clone())
    }
}

/// Map an error to its code and user-facing message.
#[must_use]
pub fn classify(error: &FlowError) -> Notice {
    Notice {
        code: error.code(),
        message: error.remediation(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ActionKey;
    use std::time::Duration;

    #[test]
    fn test_classify() {
        let notice = classify(&FlowError::RateLimitExceeded {
            action: ActionKey::History,
            remaining: Duration::from_secs(42),
        });
        assert_eq!(notice.code, "RATE_LIMIT_EXCEEDED");
        assert!(notice.message.contains("42s"));
        assert_eq!(notice.prompt().body, notice.message);
    }

    #[test]
    fn test_recover_attaches_policy() {
        let result: FlowResult<()> = Err(FlowError::timeout("wallet options"));
        let failure = result.recover(Recovery::Discard).unwrap_err();
        assert_eq!(failure.recovery, Recovery::Discard);
        assert_eq!(failure.error.code(), "INTERACTION_TIMEOUT");

        let ok: FlowResult<u8> = Ok(1);
        assert_eq!(ok.recover(Recovery::Discard).unwrap(), 1);
    }
}
