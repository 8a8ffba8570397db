//! Pure bounds-checking for the user-pointer trust boundary crossed by the
//! syscall dispatcher (vector 0x80).
//!
//! Grounded on `examples/original_source/src/arch/x64/idt.c`'s
//! `copy_from_user`: reject NULL, reject anything above the canonical user
//! half, reject a copy that would run off that region. The actual memory
//! read stays in `kernel::syscall`, which is the only caller that can
//! dereference a raw pointer; this module only decides whether it may.

use crate::config::USER_SPACE_TOP;
use crate::error::KernelError;

/// Checks that a `len`-byte copy starting at user address `addr` is within
/// bounds: non-null and entirely below [`USER_SPACE_TOP`].
///
/// # Errors
///
/// Returns [`KernelError::InvalidUserPointer`] if `addr` is NULL, if
/// `addr + len` overflows, or if the end of the range exceeds
/// `USER_SPACE_TOP`.
pub fn validate_user_range(addr: u64, len: usize) -> Result<(), KernelError> {
    if addr == 0 {
        return Err(KernelError::InvalidUserPointer);
    }
    let end = addr
        .checked_add(len as u64)
        .ok_or(KernelError::InvalidUserPointer)?;
    if end > USER_SPACE_TOP {
        return Err(KernelError::InvalidUserPointer);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer_rejected() {
        assert_eq!(
            validate_user_range(0, 16),
            Err(KernelError::InvalidUserPointer)
        );
    }

    #[test]
    fn above_user_top_rejected() {
        assert_eq!(
            validate_user_range(USER_SPACE_TOP, 16),
            Err(KernelError::InvalidUserPointer)
        );
    }

    #[test]
    fn overflowing_length_rejected() {
        assert_eq!(
            validate_user_range(u64::MAX - 4, 16),
            Err(KernelError::InvalidUserPointer)
        );
    }

    #[test]
    fn valid_range_accepted() {
        assert_eq!(validate_user_range(0x1000, 256), Ok(()));
    }

    #[test]
    fn range_ending_exactly_at_top_accepted() {
        assert_eq!(
            validate_user_range(USER_SPACE_TOP - 16, 16),
            Ok(())
        );
    }
}
