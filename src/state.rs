//! Device lifecycle tracking: standby → enabled → measuring.

use crate::types::DeviceState;
use crate::Tmf882xError;

/// An operation was attempted in a state that does not allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub operation: &'static str,
    pub state: DeviceState,
    pub required: DeviceState,
}

impl<E> From<InvalidTransition> for Tmf882xError<E> {
    fn from(t: InvalidTransition) -> Self {
        Tmf882xError::InvalidState {
            operation: t.operation,
            state: t.state,
            required: t.required,
        }
    }
}

/// Tracks the last confirmed device state and validates transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateMachine {
    state: DeviceState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Whether `from → to` is a legal edge.
    pub fn allows(from: DeviceState, to: DeviceState) -> bool {
        use DeviceState::*;
        matches!(
            (from, to),
            (Standby, Enabled) | (Enabled, Measuring) | (Measuring, Enabled) | (_, Standby)
        )
    }

    /// Gate an operation on the current state.
    pub fn require(
        &self,
        operation: &'static str,
        required: DeviceState,
    ) -> Result<(), InvalidTransition> {
        if self.state == required {
            Ok(())
        } else {
            Err(InvalidTransition {
                operation,
                state: self.state,
                required,
            })
        }
    }

    /// Move to `to`, failing if the edge is illegal.
    pub fn transition(
        &mut self,
        operation: &'static str,
        to: DeviceState,
    ) -> Result<(), InvalidTransition> {
        if !Self::allows(self.state, to) {
            // The only edges into Enabled/Measuring start from the state before them.
            let required = match to {
                DeviceState::Enabled => DeviceState::Standby,
                _ => DeviceState::Enabled,
            };
            return Err(InvalidTransition {
                operation,
                state: self.state,
                required,
            });
        }
        log::debug!("state {:?} -> {:?} ({operation})", self.state, to);
        self.state = to;
        Ok(())
    }

    /// Unconditionally return to standby.
    pub fn reset(&mut self) {
        if self.state != DeviceState::Standby {
            log::debug!("state {:?} -> Standby (reset)", self.state);
        }
        self.state = DeviceState::Standby;
    }
}
