//! Control mode state machine.

use serde::{Deserialize, Serialize};

/// The nine operating modes of the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlMode {
    Boot,
    Init,
    Standby,
    Manual,
    Ready,
    Auto,
    Fault,
    Maint,
    Charging,
}

impl ControlMode {
    /// Whether transitioning from `self` to `to` is legal.
    ///
    /// `Fault` is reachable from any mode; `Boot`/`Init` are only reachable
    /// as part of the startup chain, never re-entered.
    pub fn is_valid_transition(self, to: ControlMode) -> bool {
        use ControlMode::*;

        if to == Fault {
            return true;
        }

        match self {
            Boot => to == Init,
            Init => to == Standby,
            Standby => matches!(to, Manual | Ready | Auto | Maint),
            Manual => to == Standby,
            Ready => matches!(to, Auto | Standby),
            Auto => matches!(to, Ready | Standby | Charging),
            Charging => matches!(to, Standby | Auto),
            Maint => to == Standby,
            Fault => to == Standby,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ControlMode::*;

    #[test]
    fn boot_chain() {
        assert!(Boot.is_valid_transition(Init));
        assert!(Init.is_valid_transition(Standby));
        assert!(!Boot.is_valid_transition(Standby));
    }

    #[test]
    fn standby_to_init_is_illegal() {
        assert!(!Standby.is_valid_transition(Init));
    }

    #[test]
    fn standby_to_auto_is_legal() {
        assert!(Standby.is_valid_transition(Auto));
    }

    #[test]
    fn any_mode_to_fault_is_legal() {
        for m in [Boot, Init, Standby, Manual, Ready, Auto, Fault, Maint, Charging] {
            assert!(m.is_valid_transition(Fault));
        }
    }

    #[test]
    fn fault_returns_to_standby_only() {
        assert!(Fault.is_valid_transition(Standby));
        assert!(!Fault.is_valid_transition(Auto));
    }
}
