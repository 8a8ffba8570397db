//! Kernel-wide error kinds.
//!
//! A single enum for every fallible operation at and above the ATA driver
//! layer, matching the five error kinds named by the error-handling design:
//! unrecoverable conditions panic directly and never construct this type.

use core::fmt;

/// The uniform error type returned by fallible kernel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// An I/O operation (ATA, UHCI) timed out or reported a hardware error.
    Io,
    /// A parsed format was malformed (bad FAT signature, bad ELF magic, ELF
    /// entry point outside the PROGBITS span).
    Format,
    /// A requested name was not found (file, shell command).
    NotFound,
    /// A user-space pointer was null, above the canonical user half, or the
    /// requested copy would run off that region.
    InvalidUserPointer,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => f.write_str("I/O error"),
            Self::Format => f.write_str("malformed format"),
            Self::NotFound => f.write_str("not found"),
            Self::InvalidUserPointer => f.write_str("invalid user pointer"),
        }
    }
}

/// Convenience alias used throughout the kernel above the PMM/paging
/// bootstrap layer, where failure is always fatal and panics directly
/// instead of returning a `Result`.
pub type KernelResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_all_variants() {
        assert_eq!(format!("{}", KernelError::Io), "I/O error");
        assert_eq!(format!("{}", KernelError::Format), "malformed format");
        assert_eq!(format!("{}", KernelError::NotFound), "not found");
        assert_eq!(
            format!("{}", KernelError::InvalidUserPointer),
            "invalid user pointer"
        );
    }

    #[test]
    fn error_equality() {
        assert_eq!(KernelError::Io, KernelError::Io);
        assert_ne!(KernelError::Io, KernelError::Format);
    }
}
