//! Alphabets that decide which bytes may appear in a trie key and which of
//! them collide.
//!
//! The trie never compares characters itself. Every notion of case folding or
//! equivalence lives in an [`Alphabet`] implementation, so two keys are the
//! same entry exactly when their bytes map to the same sequence of positions.

/// Character-to-position mapping for a trie.
///
/// Positions must be dense: every valid byte maps into `0..size()` and every
/// position in that range maps back to an ASCII byte through
/// [`Alphabet::pos_to_char`].
pub trait Alphabet {
    /// Number of child slots per node.
    fn size(&self) -> usize;

    /// Returns true if `c` may appear in a key.
    fn is_valid(&self, c: u8) -> bool;

    /// Position for a valid byte. Only called after `is_valid(c)` returned true.
    fn char_to_pos(&self, c: u8) -> usize;

    /// Canonical byte rendered for a position.
    fn pos_to_char(&self, pos: usize) -> u8;

    /// Canonical form of `c`; bytes outside the alphabet are returned as is.
    fn canonical(&self, c: u8) -> u8 {
        if c.is_ascii() && self.is_valid(c) {
            self.pos_to_char(self.char_to_pos(c))
        } else {
            c
        }
    }

    /// True if `a` and `b` fold to the same key
    fn same_word(&self, a: &str, b: &str) -> bool {
        a.len() == b.len()
            && a.bytes()
                .zip(b.bytes())
                .all(|(x, y)| self.canonical(x) == self.canonical(y))
    }
}

const LETTERS: usize = 26;

/// Special nickname characters in position order, canonical form first.
const NICK_SPECIALS: [u8; 6] = [b'-', b'{', b'}', b'|', b'`', b'^'];

/// Nickname alphabet: `A-Z a-z` plus `- [ ] \ ` ^ { } |`.
///
/// Letters are case-folded, and `[`/`{`, `]`/`}`, `\`/`|` are the same
/// character (RFC 1459 section 2.2), so `Nick[a]` and `nick{A}` name the same
/// user.
#[derive(Debug, Clone, Copy, Default)]
pub struct NickAlphabet;

impl Alphabet for NickAlphabet {
    fn size(&self) -> usize {
        LETTERS + NICK_SPECIALS.len()
    }

    fn is_valid(&self, c: u8) -> bool {
        c.is_ascii_alphabetic()
            || matches!(
                c,
                b'-' | b'[' | b']' | b'\\' | b'`' | b'^' | b'{' | b'}' | b'|'
            )
    }

    fn char_to_pos(&self, c: u8) -> usize {
        match c {
            b'a'..=b'z' => (c - b'a') as usize,
            b'A'..=b'Z' => (c - b'A') as usize,
            b'-' => LETTERS,
            b'[' | b'{' => LETTERS + 1,
            b']' | b'}' => LETTERS + 2,
            b'\\' | b'|' => LETTERS + 3,
            b'`' => LETTERS + 4,
            _ => LETTERS + 5,
        }
    }

    fn pos_to_char(&self, pos: usize) -> u8 {
        if pos < LETTERS {
            b'a' + pos as u8
        } else {
            NICK_SPECIALS[pos - LETTERS]
        }
    }
}

/// Case-insensitive `A-Z`, used for the command table.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandAlphabet;

impl Alphabet for CommandAlphabet {
    fn size(&self) -> usize {
        LETTERS
    }

    fn is_valid(&self, c: u8) -> bool {
        c.is_ascii_alphabetic()
    }

    fn char_to_pos(&self, c: u8) -> usize {
        (c.to_ascii_uppercase() - b'A') as usize
    }

    fn pos_to_char(&self, pos: usize) -> u8 {
        b'A' + pos as u8
    }
}
