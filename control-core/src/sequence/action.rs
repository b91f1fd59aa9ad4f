//! The abstract action lifecycle a sequence step drives, and the
//! factory that turns a `(action_type, parameters)` pair into one.
//!
//! Concrete robot actions (move, grip, charge, ...) are external
//! collaborators; the sequence engine only ever calls through these
//! traits, the same way the arbiter only ever calls through [`crate::
//! arbiter::task::Task`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SequenceError;
use crate::sequence::dto::ActionStatus;

/// One executable step. Implementations own their own execution; `execute`
/// blocks the calling thread until the action reaches a terminal status
/// or is cancelled.
pub trait Action: Send + Sync {
    fn id(&self) -> &str;
    fn action_type(&self) -> &str;
    fn execute(&self) -> Result<(), String>;
    fn cancel(&self);
    fn status(&self) -> ActionStatus;
    /// Progress in `[0, 1]`.
    fn progress(&self) -> f32;
}

/// Turns a step descriptor's `(action_type, action_id, parameters)` into
/// a concrete [`Action`]. Registered once per sequence engine; the
/// engine never constructs actions itself.
pub trait ActionFactory: Send + Sync {
    fn create_action(
        &self,
        action_type: &str,
        action_id: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<Arc<dyn Action>, SequenceError>;
}

/// Stands in for a factory with no real action types registered, the
/// same role the donor's `DummyActionFactory` plays: satisfies the
/// engine's dependency without creating anything.
pub struct DummyActionFactory;

impl ActionFactory for DummyActionFactory {
    fn create_action(
        &self,
        action_type: &str,
        _action_id: &str,
        _parameters: &HashMap<String, String>,
    ) -> Result<Arc<dyn Action>, SequenceError> {
        Err(SequenceError::UnknownActionType(action_type.to_string()))
    }
}
