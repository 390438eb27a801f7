//! Keymap lookup
//!
//! The translator consumes a [`Keymap`] as an opaque lookup from raw evdev
//! keycodes to a character and an X11-style keysym. Keymap compilation is
//! somebody else's job; [`UsKeymap`] is a fixed US layout that covers what
//! the demo binary and the tests need.

use super::Modifiers;
use std::fmt;

/// X11 keysym value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Keysym(pub u32);

impl Keysym {
    pub const NO_SYMBOL: Keysym = Keysym(0);
    pub const BACKSPACE: Keysym = Keysym(0xff08);
    pub const TAB: Keysym = Keysym(0xff09);
    pub const RETURN: Keysym = Keysym(0xff0d);
    pub const ESCAPE: Keysym = Keysym(0xff1b);
    pub const HOME: Keysym = Keysym(0xff50);
    pub const LEFT: Keysym = Keysym(0xff51);
    pub const UP: Keysym = Keysym(0xff52);
    pub const RIGHT: Keysym = Keysym(0xff53);
    pub const DOWN: Keysym = Keysym(0xff54);
    pub const PAGE_UP: Keysym = Keysym(0xff55);
    pub const PAGE_DOWN: Keysym = Keysym(0xff56);
    pub const END: Keysym = Keysym(0xff57);
    pub const INSERT: Keysym = Keysym(0xff63);
    pub const NUM_LOCK: Keysym = Keysym(0xff7f);
    pub const F1: Keysym = Keysym(0xffbe);
    pub const SHIFT_L: Keysym = Keysym(0xffe1);
    pub const SHIFT_R: Keysym = Keysym(0xffe2);
    pub const CONTROL_L: Keysym = Keysym(0xffe3);
    pub const CONTROL_R: Keysym = Keysym(0xffe4);
    pub const CAPS_LOCK: Keysym = Keysym(0xffe5);
    pub const ALT_L: Keysym = Keysym(0xffe9);
    pub const ALT_R: Keysym = Keysym(0xffea);
    pub const SUPER_L: Keysym = Keysym(0xffeb);
    pub const SUPER_R: Keysym = Keysym(0xffec);
    pub const DELETE: Keysym = Keysym(0xffff);

    /// Keysym of a printable Latin-1 character
    pub fn from_char(c: char) -> Keysym {
        Keysym(c as u32)
    }

    pub fn is_modifier(self) -> bool {
        (Self::SHIFT_L.0..=Self::SUPER_R.0).contains(&self.0) || self == Self::NUM_LOCK
    }
}

impl fmt::Display for Keysym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Opaque keymap lookup
pub trait Keymap {
    /// Character and keysym produced by `keycode` under `modifiers`
    fn translate(&self, keycode: u32, modifiers: Modifiers) -> (Option<char>, Keysym);

    /// Whether holding the key should auto-repeat
    fn is_repeatable(&self, keycode: u32) -> bool;
}

impl<K: Keymap + ?Sized> Keymap for Box<K> {
    fn translate(&self, keycode: u32, modifiers: Modifiers) -> (Option<char>, Keysym) {
        (**self).translate(keycode, modifiers)
    }

    fn is_repeatable(&self, keycode: u32) -> bool {
        (**self).is_repeatable(keycode)
    }
}

/// evdev keycodes used by [`UsKeymap`]
pub mod keycodes {
    pub const KEY_ESC: u32 = 1;
    pub const KEY_1: u32 = 2;
    pub const KEY_0: u32 = 11;
    pub const KEY_MINUS: u32 = 12;
    pub const KEY_EQUAL: u32 = 13;
    pub const KEY_BACKSPACE: u32 = 14;
    pub const KEY_TAB: u32 = 15;
    pub const KEY_Q: u32 = 16;
    pub const KEY_P: u32 = 25;
    pub const KEY_LEFTBRACE: u32 = 26;
    pub const KEY_RIGHTBRACE: u32 = 27;
    pub const KEY_ENTER: u32 = 28;
    pub const KEY_LEFTCTRL: u32 = 29;
    pub const KEY_A: u32 = 30;
    pub const KEY_L: u32 = 38;
    pub const KEY_SEMICOLON: u32 = 39;
    pub const KEY_APOSTROPHE: u32 = 40;
    pub const KEY_GRAVE: u32 = 41;
    pub const KEY_LEFTSHIFT: u32 = 42;
    pub const KEY_BACKSLASH: u32 = 43;
    pub const KEY_Z: u32 = 44;
    pub const KEY_M: u32 = 50;
    pub const KEY_COMMA: u32 = 51;
    pub const KEY_DOT: u32 = 52;
    pub const KEY_SLASH: u32 = 53;
    pub const KEY_RIGHTSHIFT: u32 = 54;
    pub const KEY_LEFTALT: u32 = 56;
    pub const KEY_SPACE: u32 = 57;
    pub const KEY_CAPSLOCK: u32 = 58;
    pub const KEY_F1: u32 = 59;
    pub const KEY_F10: u32 = 68;
    pub const KEY_NUMLOCK: u32 = 69;
    pub const KEY_F11: u32 = 87;
    pub const KEY_F12: u32 = 88;
    pub const KEY_RIGHTCTRL: u32 = 97;
    pub const KEY_RIGHTALT: u32 = 100;
    pub const KEY_HOME: u32 = 102;
    pub const KEY_UP: u32 = 103;
    pub const KEY_PAGEUP: u32 = 104;
    pub const KEY_LEFT: u32 = 105;
    pub const KEY_RIGHT: u32 = 106;
    pub const KEY_END: u32 = 107;
    pub const KEY_DOWN: u32 = 108;
    pub const KEY_PAGEDOWN: u32 = 109;
    pub const KEY_INSERT: u32 = 110;
    pub const KEY_DELETE: u32 = 111;
    pub const KEY_LEFTMETA: u32 = 125;
    pub const KEY_RIGHTMETA: u32 = 126;
}

use keycodes::*;

const TOP_ROW: &str = "qwertyuiop";
const HOME_ROW: &str = "asdfghjkl";
const BOTTOM_ROW: &str = "zxcvbnm";
const DIGITS: &str = "1234567890";
const SHIFTED_DIGITS: &str = "!@#$%^&*()";

/// Fixed US QWERTY layout on evdev keycodes
#[derive(Debug, Clone, Copy, Default)]
pub struct UsKeymap;

impl UsKeymap {
    fn letter(keycode: u32) -> Option<char> {
        let row = match keycode {
            KEY_Q..=KEY_P => (TOP_ROW, keycode - KEY_Q),
            KEY_A..=KEY_L => (HOME_ROW, keycode - KEY_A),
            KEY_Z..=KEY_M => (BOTTOM_ROW, keycode - KEY_Z),
            _ => return None,
        };
        row.0.chars().nth(row.1 as usize)
    }

    /// Unshifted and shifted character of a non-letter printable key
    fn symbol(keycode: u32) -> Option<(char, char)> {
        if (KEY_1..=KEY_0).contains(&keycode) {
            let index = (keycode - KEY_1) as usize;
            return DIGITS.chars().nth(index).zip(SHIFTED_DIGITS.chars().nth(index));
        }
        Some(match keycode {
            KEY_MINUS => ('-', '_'),
            KEY_EQUAL => ('=', '+'),
            KEY_LEFTBRACE => ('[', '{'),
            KEY_RIGHTBRACE => (']', '}'),
            KEY_SEMICOLON => (';', ':'),
            KEY_APOSTROPHE => ('\'', '"'),
            KEY_GRAVE => ('`', '~'),
            KEY_BACKSLASH => ('\\', '|'),
            KEY_COMMA => (',', '<'),
            KEY_DOT => ('.', '>'),
            KEY_SLASH => ('/', '?'),
            KEY_SPACE => (' ', ' '),
            _ => return None,
        })
    }

    /// Keys with a fixed keysym and optional control character
    fn special(keycode: u32) -> Option<(Keysym, Option<char>)> {
        let entry = match keycode {
            KEY_ESC => (Keysym::ESCAPE, Some('\x1b')),
            KEY_BACKSPACE => (Keysym::BACKSPACE, Some('\x08')),
            KEY_TAB => (Keysym::TAB, Some('\t')),
            KEY_ENTER => (Keysym::RETURN, Some('\r')),
            KEY_DELETE => (Keysym::DELETE, Some('\x7f')),
            KEY_HOME => (Keysym::HOME, None),
            KEY_END => (Keysym::END, None),
            KEY_UP => (Keysym::UP, None),
            KEY_DOWN => (Keysym::DOWN, None),
            KEY_LEFT => (Keysym::LEFT, None),
            KEY_RIGHT => (Keysym::RIGHT, None),
            KEY_PAGEUP => (Keysym::PAGE_UP, None),
            KEY_PAGEDOWN => (Keysym::PAGE_DOWN, None),
            KEY_INSERT => (Keysym::INSERT, None),
            KEY_F1..=KEY_F10 => (Keysym(Keysym::F1.0 + (keycode - KEY_F1)), None),
            KEY_F11 => (Keysym(Keysym::F1.0 + 10), None),
            KEY_F12 => (Keysym(Keysym::F1.0 + 11), None),
            KEY_LEFTSHIFT => (Keysym::SHIFT_L, None),
            KEY_RIGHTSHIFT => (Keysym::SHIFT_R, None),
            KEY_LEFTCTRL => (Keysym::CONTROL_L, None),
            KEY_RIGHTCTRL => (Keysym::CONTROL_R, None),
            KEY_LEFTALT => (Keysym::ALT_L, None),
            KEY_RIGHTALT => (Keysym::ALT_R, None),
            KEY_LEFTMETA => (Keysym::SUPER_L, None),
            KEY_RIGHTMETA => (Keysym::SUPER_R, None),
            KEY_CAPSLOCK => (Keysym::CAPS_LOCK, None),
            KEY_NUMLOCK => (Keysym::NUM_LOCK, None),
            _ => return None,
        };
        Some(entry)
    }
}

impl Keymap for UsKeymap {
    fn translate(&self, keycode: u32, modifiers: Modifiers) -> (Option<char>, Keysym) {
        // Shortcuts carry a keysym but no text
        let text_allowed = !modifiers.ctrl && !modifiers.logo;

        if let Some(lower) = Self::letter(keycode) {
            let c = if modifiers.shift != modifiers.caps_lock {
                lower.to_ascii_uppercase()
            } else {
                lower
            };
            return (text_allowed.then_some(c), Keysym::from_char(c));
        }

        if let Some((plain, shifted)) = Self::symbol(keycode) {
            let c = if modifiers.shift { shifted } else { plain };
            return (text_allowed.then_some(c), Keysym::from_char(c));
        }

        match Self::special(keycode) {
            Some((keysym, text)) => (text.filter(|_| text_allowed), keysym),
            None => (None, Keysym::NO_SYMBOL),
        }
    }

    fn is_repeatable(&self, keycode: u32) -> bool {
        match Self::special(keycode) {
            Some((keysym, _)) => !keysym.is_modifier(),
            None => Self::letter(keycode).is_some() || Self::symbol(keycode).is_some(),
        }
    }
}
