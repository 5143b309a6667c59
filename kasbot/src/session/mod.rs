//! Per-user session state.
//!
//! This module provides the typed conversation states and the registry that
//! maps each user identity to its single live session.

mod registry;
mod state;

pub use registry::SessionRegistry;
pub use state::{SessionState, UserId, UserSession, WalletRef};
