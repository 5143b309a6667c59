//! Conversation flows.
//!
//! The [`SessionController`] owns one flow task per active user. A flow
//! reads the user's [`SessionState`](crate::session::SessionState),
//! runs the matching step from [`steps`] and writes the state the step
//! returns. A failed step carries a [`Recovery`] that decides whether the
//! session is discarded, resumed elsewhere or parked until the next
//! trigger.

mod context;
mod controller;
mod recovery;
pub mod steps;

pub use context::{Conversation, FlowContext};
pub use controller::{RouteOutcome, SessionController};
pub use recovery::{Failure, Notice, Recover, Recovery, StepResult, classify};
