use super::MAX_MSG_SIZE;
use crate::error::FramingError;
use memchr::memchr2;
use std::io::{self, Read};
use tracing::warn;

const SEEN_CR: u8 = 0b01;
const SEEN_LF: u8 = 0b10;
const SEEN_BOTH: u8 = SEEN_CR | SEEN_LF;

/// Outcome of pulling bytes from the transport into the framer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// `n` bytes were appended
    Data(usize),
    /// The buffer was full without a terminator; `discarded` bytes were
    /// thrown away before `read` fresh bytes were appended
    Reset { discarded: usize, read: usize },
    /// The peer closed the stream
    Eof,
}

/// Per-connection line framer.
///
/// Bytes accumulate in a fixed 512-byte buffer. `next_message` hands out
/// CRLF-terminated slices of it and compacts leftovers to the front when no
/// complete line is buffered. A line that does not fit is dropped whole.
pub struct Framer {
    buf: Box<[u8; MAX_MSG_SIZE]>,
    // write cursor
    index: usize,
    // scan cursor
    last_stop: usize,
    msg_begin: usize,
    status: u8,
    resets: u64,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            buf: Box::new([0u8; MAX_MSG_SIZE]),
            index: 0,
            last_stop: 0,
            msg_begin: 0,
            status: 0,
            resets: 0,
        }
    }

    /// Read whatever fits into the free tail of the buffer.
    ///
    /// Call [`Framer::next_message`] until it returns `Ok(None)` before
    /// reading again; otherwise buffered lines count against the size cap.
    pub fn on_data<R: Read>(&mut self, src: &mut R) -> io::Result<Fill> {
        let mut discarded = None;
        if self.index >= self.buf.len() {
            warn!(
                "Discarding {} buffered bytes: message exceeds {} bytes without terminator",
                self.index, MAX_MSG_SIZE
            );
            discarded = Some(self.index);
            self.resets += 1;
            self.reset();
        }

        let n = src.read(&mut self.buf[self.index..])?;
        self.index += n;

        Ok(match discarded {
            Some(discarded) => Fill::Reset { discarded, read: n },
            None if n == 0 => Fill::Eof,
            None => Fill::Data(n),
        })
    }

    /// Append bytes from a slice, advancing it past what was consumed.
    pub fn feed(&mut self, data: &mut &[u8]) -> Fill {
        // Reading from a slice cannot fail
        self.on_data(data).unwrap_or(Fill::Data(0))
    }

    /// Next complete message, terminator included.
    ///
    /// `Ok(None)` means more data is needed; the unconsumed bytes have been
    /// moved to the front of the buffer. A CR and LF that do not end the line
    /// as `\r\n` are a framing error and drop everything buffered.
    pub fn next_message(&mut self) -> Result<Option<&[u8]>, FramingError> {
        let mut i = self.last_stop;
        while self.status != SEEN_BOTH && i < self.index {
            match memchr2(b'\r', b'\n', &self.buf[i..self.index]) {
                Some(offset) => {
                    i += offset;
                    self.status |= if self.buf[i] == b'\r' { SEEN_CR } else { SEEN_LF };
                    i += 1;
                }
                None => i = self.index,
            }
        }

        if self.status != SEEN_BOTH {
            self.compact();
            return Ok(None);
        }

        self.status = 0;
        let begin = self.msg_begin;
        self.last_stop = i;
        self.msg_begin = i;
        if i - begin >= 2 && &self.buf[i - 2..i] == b"\r\n" {
            Ok(Some(&self.buf[begin..i]))
        } else {
            self.reset();
            Err(FramingError::MalformedTerminator)
        }
    }

    /// Bytes currently buffered and not yet returned as a message
    pub fn buffered(&self) -> usize {
        self.index - self.msg_begin
    }

    /// How many times an oversized line forced the buffer to be dropped
    pub fn resets(&self) -> u64 {
        self.resets
    }

    fn compact(&mut self) {
        if self.msg_begin > 0 {
            self.buf.copy_within(self.msg_begin..self.index, 0);
            self.index -= self.msg_begin;
            self.msg_begin = 0;
        }
        self.last_stop = self.index;
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_stop = 0;
        self.msg_begin = 0;
        self.status = 0;
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}
