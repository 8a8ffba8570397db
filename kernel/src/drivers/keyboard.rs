//! PS/2 keyboard scancode translation (set 1).
//!
//! IRQ1 hands each scancode byte to [`handle_irq`], which assembles a fixed
//! 100-byte line buffer exactly as wide as the shell's input field, echoing
//! each translated character as it is appended. Shift and caps lock are
//! tracked as make/break state; backspace edits the line in place and
//! erases the echoed character; Enter dispatches the completed line to the
//! shell's command table *from within the ISR itself*.
//!
//! Matches `examples/original_source/src/drivers/keyboard.c`'s `isr_keyboard`:
//! scancodes are ignored until F1 is pressed, which starts the pseudo-shell,
//! and `process_command` is called directly from the handler rather than
//! from a separate polling step. Per spec §4.8/§5/§9, this is the only
//! architecture that keeps the buffer race-free: IRQ1 is entered through an
//! interrupt gate with IF cleared, so no nested keyboard IRQ can race a
//! dispatch in progress, and nothing outside the ISR ever touches the
//! buffer, so the non-IRQ-safe [`SpinLock`](crate::sync::SpinLock) below
//! never has to be held by code that runs with interrupts enabled.

use kernel_core::config::SHELL_BUFFER_CAPACITY;

use crate::arch::x86_64::port::Port;
use crate::sync::SpinLock;

const DATA_PORT: u16 = 0x60;
/// Capacity of the assembled line buffer, matching the shell's input field
/// (§3 Data Model: "a fixed-capacity byte array (≥100 bytes)").
const LINE_CAPACITY: usize = SHELL_BUFFER_CAPACITY;

const SC_BACKSPACE: u8 = 0x0E;
const SC_ENTER: u8 = 0x1C;
const SC_CAPS_LOCK: u8 = 0x3A;
const SC_LEFT_SHIFT: u8 = 0x2A;
const SC_RIGHT_SHIFT: u8 = 0x36;
const SC_LEFT_SHIFT_RELEASE: u8 = SC_LEFT_SHIFT | 0x80;
const SC_RIGHT_SHIFT_RELEASE: u8 = SC_RIGHT_SHIFT | 0x80;
const SC_F1: u8 = 0x3B;
const RELEASE_BIT: u8 = 0x80;

/// Backspace echo sequence: move left, overwrite with a space, move left
/// again. Matches `examples/original_source/src/drivers/keyboard.c`'s
/// `printk("%c%c%c", 0x08, 0x20, 0x08)`.
const BACKSPACE_ERASE: &str = "\u{8} \u{8}";

/// Set-1 scancode to ASCII, unshifted. `0` marks an unmapped key.
#[rustfmt::skip]
const CHARACTER_TABLE: [u8; 0x39] = [
    0,    0,    b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0',
    b'-', b'=', 0,    0,    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i',
    b'o', b'p', b'[', b']', 0,    0,    b'a', b's', b'd', b'f', b'g', b'h',
    b'j', b'k', b'l', b';', b'\'',b'`', 0,    b'\\',b'z', b'x', b'c', b'v',
    b'b', b'n', b'm', b',', b'.', b'/', 0,    b'*', 0,    b' ',
];

/// Set-1 scancode to ASCII, shifted or caps-locked.
#[rustfmt::skip]
const SHIFTED_CHARACTER_TABLE: [u8; 0x39] = [
    0,    0,    b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')',
    b'_', b'+', 0,    0,    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I',
    b'O', b'P', b'{', b'}', 0,    0,    b'A', b'S', b'D', b'F', b'G', b'H',
    b'J', b'K', b'L', b':', b'"', b'~', 0,    b'|', b'Z', b'X', b'C', b'V',
    b'B', b'N', b'M', b'<', b'>', b'?', 0,    b'*', 0,    b' ',
];

struct State {
    shifted: bool,
    capslock: bool,
    /// `true` once F1 has started the pseudo-shell; gates line assembly.
    started: bool,
    line: [u8; LINE_CAPACITY],
    len: usize,
}

impl State {
    const fn new() -> Self {
        Self {
            shifted: false,
            capslock: false,
            started: false,
            line: [0; LINE_CAPACITY],
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        if self.len < LINE_CAPACITY {
            self.line[self.len] = byte;
            self.len += 1;
        }
    }

    fn backspace(&mut self) {
        if self.len > 0 {
            self.len -= 1;
            self.line[self.len] = 0;
        }
    }
}

static STATE: SpinLock<State> = SpinLock::new(State::new());

fn translate(scancode: u8, state: &mut State) -> Option<u8> {
    let index = scancode as usize;
    if index >= CHARACTER_TABLE.len() {
        return None;
    }
    let table = if state.shifted || state.capslock {
        &SHIFTED_CHARACTER_TABLE
    } else {
        &CHARACTER_TABLE
    };
    let ch = table[index];
    if ch == 0 { None } else { Some(ch) }
}

/// Reads one scancode and feeds the line-assembly state machine, echoing
/// printable characters and dispatching completed lines. Called by the IRQ1
/// handler; never blocks.
///
/// Dispatch (the `SC_ENTER` arm) runs inline, inside this handler, per spec
/// §4.8/§5/§9: because IRQ1 is an interrupt gate (IF cleared on entry) and
/// this core never re-enables IF inside a handler, no nested keyboard IRQ
/// can observe the buffer mid-dispatch, so [`STATE`] never needs to be held
/// by anything running with interrupts enabled.
pub fn handle_irq() {
    let port = Port::<u8>::new(DATA_PORT);
    // SAFETY: the PS/2 data port is always safe to read after an IRQ1 fires.
    let scancode = unsafe { port.read() };

    let mut state = STATE.lock();

    match scancode {
        SC_LEFT_SHIFT | SC_RIGHT_SHIFT => {
            state.shifted = true;
            return;
        }
        SC_LEFT_SHIFT_RELEASE | SC_RIGHT_SHIFT_RELEASE => {
            state.shifted = false;
            return;
        }
        SC_CAPS_LOCK => {
            state.capslock = !state.capslock;
            return;
        }
        SC_F1 => {
            if !state.started {
                state.started = true;
                drop(state);
                crate::log::kprintln!();
                crate::log::kprint!("Starting pseudo-shell\n\n# ");
            }
            return;
        }
        _ if !state.started => return,
        SC_BACKSPACE => {
            if state.len > 0 {
                state.backspace();
                drop(state);
                crate::log::kprint!("{BACKSPACE_ERASE}");
            }
            return;
        }
        SC_ENTER => {
            let len = state.len;
            let mut line = [0u8; LINE_CAPACITY];
            line[..len].copy_from_slice(&state.line[..len]);
            state.line = [0; LINE_CAPACITY];
            state.len = 0;
            drop(state);

            crate::log::kprintln!();
            let text = core::str::from_utf8(&line[..len]).unwrap_or("");
            if crate::shell::process_command(text) {
                STATE.lock().started = false;
            } else {
                crate::log::kprint!("# ");
            }
            return;
        }
        _ if scancode & RELEASE_BIT != 0 => return,
        _ => {}
    }

    if let Some(ch) = translate(scancode, &mut state) {
        state.push(ch);
        drop(state);
        crate::log::kprint!("{}", ch as char);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unshifted_letter_lookup() {
        let mut state = State::new();
        assert_eq!(translate(0x1E, &mut state), Some(b'a')); // 'a' key
    }

    #[test]
    fn shifted_letter_is_uppercase() {
        let mut state = State::new();
        state.shifted = true;
        assert_eq!(translate(0x1E, &mut state), Some(b'A'));
    }

    #[test]
    fn capslock_also_uppercases() {
        let mut state = State::new();
        state.capslock = true;
        assert_eq!(translate(0x1E, &mut state), Some(b'A'));
    }

    #[test]
    fn unmapped_scancode_is_none() {
        let mut state = State::new();
        assert_eq!(translate(0x00, &mut state), None);
    }

    #[test]
    fn starts_idle_until_f1() {
        let state = State::new();
        assert!(!state.started);
    }

    #[test]
    fn backspace_shrinks_line() {
        let mut state = State::new();
        state.push(b'h');
        state.push(b'i');
        state.backspace();
        assert_eq!(state.len, 1);
        assert_eq!(&state.line[..1], b"h");
    }
}
