//! Line-oriented terminal output.

use std::io::{Result, Write};

/// Carriage return followed by the ANSI erase-line sequence.
pub const CLEAR_LINE: &str = "\r\x1b[K";

/// WriteLine extends [`std::io::Write`] to write whole lines of text and to redraw a
/// single progress line in place.
pub trait WriteLine: Write {
    /// Writes `line` followed by a newline.
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Replace the current terminal line with `line`, leaving the cursor at
    /// its end.
    fn write_progress(&mut self, line: &str) -> Result<()> {
        write!(self, "{CLEAR_LINE}{line}")?;
        self.flush()
    }

    /// Erase the current terminal line.
    fn clear_line(&mut self) -> Result<()> {
        self.write_all(CLEAR_LINE.as_bytes())?;
        self.flush()
    }
}

/// LineWriter implements WriteLine to write a line of text to an internal
/// [`std::io::Write`] implementation.
pub struct LineWriter<T: Write>(T);

impl<T: Write> LineWriter<T> {
    /// Create a new LineWriter that writes lines of text to `writer`.
    pub fn new(writer: T) -> Self {
        Self(writer)
    }

    /// Consume the LineWriter, returning the underlying writer.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Write> Write for LineWriter<T> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        self.0.flush()
    }
}

impl<T: Write> WriteLine for LineWriter<T> {
    // Write `line` to the underlying writer.
    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.0, "{}", line)
    }
}

impl<W: WriteLine + ?Sized> WriteLine for Box<W> {
    fn write_line(&mut self, line: &str) -> Result<()> {
        (**self).write_line(line)
    }

    fn write_progress(&mut self, line: &str) -> Result<()> {
        (**self).write_progress(line)
    }

    fn clear_line(&mut self) -> Result<()> {
        (**self).clear_line()
    }
}

/// Shorten `line` to at most `width` characters, replacing the tail with an
/// ellipsis when it doesn't fit.
pub fn truncate(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        return line.to_string();
    }
    if width <= 3 {
        return line.chars().take(width).collect();
    }
    let mut out: String = line.chars().take(width - 3).collect();
    out.push_str("...");
    out
}
