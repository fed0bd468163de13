//! Positions in the input stream.

use core_ansi::Astring;
use std::fmt;

/// Logical line index, 0-based.
pub type LineNo = u64;

/// Byte position in the input. 0 is start-of-input.
pub type Offset = u64;

/// A position: logical line number plus byte offset. The line number is
/// `None` while only the offset has been resolved (a jump to the tail, a
/// backward walk past the line map's horizon).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pos {
    pub line: Option<LineNo>,
    pub offset: Offset,
}

impl Pos {
    /// Start-of-input: line 0, offset 0.
    pub const START: Pos = Pos {
        line: Some(0),
        offset: 0,
    };

    pub fn new(line: LineNo, offset: Offset) -> Pos {
        Pos {
            line: Some(line),
            offset,
        }
    }

    /// A position whose line number is not (yet) known.
    pub fn at_offset(offset: Offset) -> Pos {
        Pos { line: None, offset }
    }
}

impl Default for Pos {
    fn default() -> Self {
        Pos::START
    }
}

impl fmt::Display for Pos {
    /// 1-based line number for the status bar, or `b<offset>` while the
    /// line number is unresolved.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}", line + 1),
            None => write!(f, "b{}", self.offset),
        }
    }
}

/// A raw line as produced by the line reader: bytes without the trailing
/// newline, owned until decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PosLine {
    pub bytes: Vec<u8>,
    pub pos: Pos,
}

/// A surfaced line: decoded text, position, and whether the filter pipeline
/// (or a manual toggle) highlighted it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub text: Astring,
    pub pos: Pos,
    pub highlighted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_one_based_or_offset() {
        assert_eq!(Pos::new(0, 0).to_string(), "1");
        assert_eq!(Pos::new(41, 999).to_string(), "42");
        assert_eq!(Pos::at_offset(1024).to_string(), "b1024");
    }

    #[test]
    fn default_is_start() {
        assert_eq!(Pos::default(), Pos::START);
    }
}
