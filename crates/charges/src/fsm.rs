//! Status state machines.

use crate::error::Result;

/// A status that moves in response to events of type `E`.
///
/// `transition` is pure: it only decides the next status. Side effects such as
/// timestamps, audit entries, and persistence belong to the caller.
pub trait Transition<E>: Copy + Sized {
    /// The status reached by applying `event` to `self`.
    ///
    /// # Errors
    ///
    /// Returns `ChargeError::InvalidStateTransition` when `event` is not legal
    /// from `self`.
    fn transition(self, event: &E) -> Result<Self>;

    /// Whether `event` is legal from `self`.
    fn accepts(self, event: &E) -> bool {
        self.transition(event).is_ok()
    }
}
