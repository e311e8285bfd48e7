/// Whether a background operation currently owns the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationState {
    #[default]
    Idle,
    Running,
}

/// Cached knowledge about the PowerShell update module.
///
/// Starts `Unknown`; a module check or an install attempt moves it to `Available`
/// or `Unavailable`. It is only re-checked after an explicit invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleAvailability {
    #[default]
    Unknown,
    Available,
    Unavailable,
    Installing,
}

impl ModuleAvailability {
    pub fn is_available(self) -> bool {
        matches!(self, ModuleAvailability::Available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_defaults_to_idle() {
        assert_eq!(OperationState::default(), OperationState::Idle);
    }

    #[test]
    fn test_module_defaults_to_unknown() {
        assert_eq!(ModuleAvailability::default(), ModuleAvailability::Unknown);
        assert!(!ModuleAvailability::Installing.is_available());
        assert!(ModuleAvailability::Available.is_available());
    }
}
