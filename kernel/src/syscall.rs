//! Syscall dispatch for interrupt vector 0x80.
//!
//! Grounded on `examples/original_source/src/arch/x64/idt.c`'s `syscallISR`:
//! the call number and first argument are read out of `rax`/`rdi` by the
//! handler stub in `handlers.rs` before any Rust code can clobber them, and
//! handed to [`dispatch`]. This is the only place the core crosses the
//! user/kernel trust boundary (§4.3).

use kernel_core::config::MAX_USER_STRING;
use kernel_core::error::{KernelError, KernelResult};
use kernel_core::syscall::validate_user_range;

/// `sys_print`: print a literal kernel-owned message. Takes no user data.
const SYS_PRINT: u64 = 1;
/// `sys_open`: open a file by a user-space filename pointer in `arg1`.
const SYS_OPEN: u64 = 2;

/// Copies at most `MAX_USER_STRING - 1` bytes from a user-space pointer into
/// `dest`, stopping at the first NUL, and returns the number of bytes
/// copied (excluding the terminator).
///
/// # Safety
///
/// `user_ptr` must point at memory that is safe to read byte-by-byte up to
/// `MAX_USER_STRING` bytes, which [`validate_user_range`] only confirms lies
/// in the canonical user half — in this CORE, which never runs ring-3 code,
/// "user space" and "kernel space" share the same mapped memory, so the read
/// itself cannot fault once the range check passes.
unsafe fn copy_from_user(user_ptr: u64, dest: &mut [u8; MAX_USER_STRING]) -> KernelResult<usize> {
    validate_user_range(user_ptr, MAX_USER_STRING)?;

    let src = user_ptr as *const u8;
    let mut i = 0;
    while i < MAX_USER_STRING - 1 {
        // SAFETY: the range check above confirmed `[user_ptr, user_ptr +
        // MAX_USER_STRING)` lies below the canonical user-space ceiling.
        let byte = unsafe { core::ptr::read_volatile(src.add(i)) };
        dest[i] = byte;
        if byte == 0 {
            break;
        }
        i += 1;
    }
    dest[i] = 0;
    Ok(i)
}

fn sys_print() {
    crate::log::info(format_args!("[SYSCALL] sys_print called"));
}

fn sys_open(user_filename_ptr: u64) {
    let mut buf = [0u8; MAX_USER_STRING];
    // SAFETY: `user_filename_ptr` is exactly the raw `rdi` value passed
    // through from the interrupt handler; `copy_from_user` validates its
    // range before dereferencing it.
    match unsafe { copy_from_user(user_filename_ptr, &mut buf) } {
        Ok(len) => {
            let name = core::str::from_utf8(&buf[..len]).unwrap_or("<non-utf8>");
            crate::log::info(format_args!("[SYSCALL] sys_open called for file: {name}"));
        }
        Err(KernelError::InvalidUserPointer) => {
            crate::log::warn(format_args!("[SYSCALL] sys_open: invalid user pointer"));
        }
        Err(_) => unreachable!("copy_from_user only returns InvalidUserPointer"),
    }
}

/// Dispatches on the syscall number in `num`, passing `arg1` (the raw `rdi`
/// value) to handlers that need it. Unknown numbers are logged and ignored.
pub fn dispatch(num: u64, arg1: u64) {
    crate::log::debug(format_args!(
        "[IDT] IRQ 0x80 [syscall] received, id={num}"
    ));
    match num {
        SYS_PRINT => sys_print(),
        SYS_OPEN => sys_open(arg1),
        other => crate::log::warn(format_args!("[SYSCALL] Unknown syscall id: {other}")),
    }
}
