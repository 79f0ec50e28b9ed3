use std::fmt;

use serde::{Deserialize, Serialize};

/// The four phases of a mixing round, in cyclic order.
///
/// Every round walks `InputRegistration → ConnectionConfirmation →
/// OutputRegistration → Signing` and wraps back to `InputRegistration`
/// for the next round. A failed completeness check skips the remaining
/// phases and restarts at `InputRegistration` with the fallback flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    InputRegistration,
    ConnectionConfirmation,
    OutputRegistration,
    Signing,
}

impl Phase {
    /// The phase that follows this one in the cycle.
    pub fn next(self) -> Phase {
        match self {
            Phase::InputRegistration => Phase::ConnectionConfirmation,
            Phase::ConnectionConfirmation => Phase::OutputRegistration,
            Phase::OutputRegistration => Phase::Signing,
            Phase::Signing => Phase::InputRegistration,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::InputRegistration => "InputRegistration",
            Phase::ConnectionConfirmation => "ConnectionConfirmation",
            Phase::OutputRegistration => "OutputRegistration",
            Phase::Signing => "Signing",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Phase::InputRegistration => 0,
            Phase::ConnectionConfirmation => 1,
            Phase::OutputRegistration => 2,
            Phase::Signing => 3,
        }
    }

    pub(crate) fn from_u8(tag: u8) -> Phase {
        match tag {
            0 => Phase::InputRegistration,
            1 => Phase::ConnectionConfirmation,
            2 => Phase::OutputRegistration,
            _ => Phase::Signing,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
