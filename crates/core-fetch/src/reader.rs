//! Buffered line reader with a known logical offset.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};

use core_spool::GrowthHandle;

use crate::pos::Offset;

/// Buffer size for the line reader and the backward step width.
pub(crate) const READ_BUF: usize = 64 * 1024;

/// One read result. `Full` lines carry their bytes without the trailing
/// newline; `Partial` means EOF arrived mid-line.
#[derive(Debug)]
pub(crate) enum RawLine {
    Full { bytes: Vec<u8>, start: Offset },
    Partial { bytes: Vec<u8>, start: Offset },
    Eof,
}

/// A `BufReader` over the byte source plus `offset`, the byte position the
/// next read starts at. Reads after a partial line must not trust the
/// buffered position, so partial reads invalidate the reader and the next
/// [`LineReader::seek`] re-seeks unconditionally.
pub(crate) struct LineReader {
    buf: BufReader<File>,
    offset: Offset,
    valid: bool,
    growth: GrowthHandle,
}

impl LineReader {
    pub fn new(file: File, growth: GrowthHandle) -> LineReader {
        LineReader {
            buf: BufReader::with_capacity(READ_BUF, file),
            offset: 0,
            valid: true,
            growth,
        }
    }

    /// Byte offset at which the next read begins.
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// True while the source is a stream whose producer has not finished:
    /// a partial line at EOF will grow and must be discarded.
    pub fn still_growing(&self) -> bool {
        self.growth.still_growing()
    }

    /// Repositions the reader. No-op when already at `offset` with a valid
    /// buffer; otherwise the buffered bytes are discarded.
    pub fn seek(&mut self, offset: Offset) -> io::Result<()> {
        if self.valid && self.offset == offset {
            return Ok(());
        }
        self.buf.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        self.valid = true;
        Ok(())
    }

    /// Reads one line. Only a `Full` line advances the logical offset; a
    /// `Partial` result invalidates the reader so the next seek starts
    /// clean.
    pub fn read_line(&mut self) -> io::Result<RawLine> {
        let start = self.offset;
        let mut bytes = Vec::new();
        let n = self.buf.read_until(b'\n', &mut bytes)?;
        if n == 0 {
            return Ok(RawLine::Eof);
        }
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
            self.offset += n as Offset;
            Ok(RawLine::Full { bytes, start })
        } else {
            self.valid = false;
            Ok(RawLine::Partial { bytes, start })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn reader_over(content: &[u8]) -> LineReader {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(content).unwrap();
        LineReader::new(tmp.reopen().unwrap(), GrowthHandle::fixed())
    }

    #[test]
    fn reads_lines_and_tracks_offsets() {
        let mut r = reader_over(b"ab\ncdef\n\n");
        match r.read_line().unwrap() {
            RawLine::Full { bytes, start } => {
                assert_eq!(bytes, b"ab");
                assert_eq!(start, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(r.offset(), 3);
        match r.read_line().unwrap() {
            RawLine::Full { bytes, start } => {
                assert_eq!(bytes, b"cdef");
                assert_eq!(start, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        match r.read_line().unwrap() {
            RawLine::Full { bytes, start } => {
                assert_eq!(bytes, b"");
                assert_eq!(start, 8);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(r.read_line().unwrap(), RawLine::Eof));
    }

    #[test]
    fn partial_line_does_not_advance_offset() {
        let mut r = reader_over(b"ab\ncd");
        r.read_line().unwrap();
        match r.read_line().unwrap() {
            RawLine::Partial { bytes, start } => {
                assert_eq!(bytes, b"cd");
                assert_eq!(start, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(r.offset(), 3);
    }

    #[test]
    fn seek_is_a_noop_when_positioned() {
        let mut r = reader_over(b"ab\ncd\n");
        r.read_line().unwrap();
        // Already at offset 3: the buffered bytes survive.
        r.seek(3).unwrap();
        match r.read_line().unwrap() {
            RawLine::Full { bytes, .. } => assert_eq!(bytes, b"cd"),
            other => panic!("unexpected {other:?}"),
        }
        // Re-seek backwards actually moves.
        r.seek(0).unwrap();
        match r.read_line().unwrap() {
            RawLine::Full { bytes, .. } => assert_eq!(bytes, b"ab"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
