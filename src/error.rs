// Kernel error taxonomy for rvos
use core::fmt;

/// Result type used by every kernel-level operation.
pub type KernelResult<T> = Result<T, KernelError>;

/// Kernel errors
///
/// The syscall ABI carries no error codes: every variant collapses into
/// [`KernelError::SENTINEL`] on its way back to user mode. The variant only
/// reaches the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No free process slot, file entry or descriptor
    ResourceExhausted,
    /// Unknown pid or descriptor
    NotFound,
    /// Operation not permitted by how a resource was opened
    ModeMismatch,
    /// fork, exec and unsupported signals
    Unimplemented,
    /// Exception code the trap dispatcher does not recognise
    UnclassifiedTrap,
    /// Null or malformed user pointer, path or argument
    InvalidArgument,
    /// A call that needs a current process arrived without one
    NoCurrentProcess,
}

impl KernelError {
    /// Uniform failure value written into `a0`.
    pub const SENTINEL: i64 = -1;

    /// Register encoding of the failure sentinel.
    pub const fn into_abi(self) -> u64 {
        Self::SENTINEL as u64
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KernelError::ResourceExhausted => write!(f, "Resource exhausted"),
            KernelError::NotFound => write!(f, "Not found"),
            KernelError::ModeMismatch => write!(f, "Operation not permitted by open mode"),
            KernelError::Unimplemented => write!(f, "Not implemented"),
            KernelError::UnclassifiedTrap => write!(f, "Unclassified trap"),
            KernelError::InvalidArgument => write!(f, "Invalid argument"),
            KernelError::NoCurrentProcess => write!(f, "No current process"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn every_error_collapses_to_the_same_register_value() {
        let all = [
            KernelError::ResourceExhausted,
            KernelError::NotFound,
            KernelError::ModeMismatch,
            KernelError::Unimplemented,
            KernelError::UnclassifiedTrap,
            KernelError::InvalidArgument,
            KernelError::NoCurrentProcess,
        ];
        for err in all {
            assert_eq!(err.into_abi(), u64::MAX);
            assert_eq!(err.into_abi() as i64, -1);
        }
    }

    #[test]
    fn display_names_the_failure() {
        assert_eq!(KernelError::NotFound.to_string(), "Not found");
        assert_eq!(KernelError::ModeMismatch.to_string(), "Operation not permitted by open mode");
    }
}
