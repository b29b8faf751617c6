//! Line buffering for the receiver byte stream.

use super::ReadError;
use std::io;

/// Size of the internal buffer, which is also the default line limit.
pub const IOBUF_SIZE: usize = 4096;

/// Line terminator used by the receiver.
const TERMINATOR: u8 = b'\r';

/// Runs `op` again for as long as it fails with `Interrupted`.
fn retry_interrupted<T, F: FnMut() -> io::Result<T>>(mut op: F) -> io::Result<T> {
    loop {
        match op() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            res => return res,
        }
    }
}

/// Buffer holding what was read from the stream but not yet handed out as
/// part of a line. Valid data (possibly none) is delimited by `start` and
/// `end`.
struct IOBuf {
    buf: [u8; IOBUF_SIZE],
    start: usize,
    end: usize,
}

impl IOBuf {
    fn new() -> IOBuf {
        IOBuf {
            buf: [0; IOBUF_SIZE],
            start: 0,
            end: 0,
        }
    }

    fn empty(&self) -> bool {
        self.start == self.end
    }

    fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    fn consume(&mut self, len: usize) {
        self.start += len;
    }

    fn flush(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Refills an empty buffer with at most one read from `reader`.
    /// Returns the number of bytes read, zero meaning end of stream.
    fn refill<R: io::Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        self.flush();
        let size = retry_interrupted(|| reader.read(&mut self.buf))?;
        self.end = size;
        Ok(size)
    }
}

/// Splits a byte stream into CR-terminated lines.
///
/// The terminator is not part of returned lines. A line that reaches
/// `max_len - 1` bytes without a terminator is returned as is, and the rest
/// of it comes back as the next line. The buffered state belongs to a single
/// connection, so `reset()` must be called whenever the stream is replaced.
pub struct LineReader {
    rxbuf: IOBuf,
    max_len: usize,
}

impl LineReader {
    pub fn new(max_len: usize) -> LineReader {
        LineReader {
            rxbuf: IOBuf::new(),
            max_len: max_len.max(2),
        }
    }

    /// Discards any buffered data.
    pub fn reset(&mut self) {
        self.rxbuf.flush();
    }

    /// Returns the next line, or `None` if the stream ended before any byte
    /// of a new line was read. A partial line at the end of the stream is
    /// still returned; the following call then reports the end.
    pub fn next_line<R: io::Read>(&mut self, reader: &mut R) -> Result<Option<Vec<u8>>, ReadError> {
        let limit = self.max_len - 1;
        let mut line = Vec::new();
        while line.len() < limit {
            if self.rxbuf.empty() && self.rxbuf.refill(reader)? == 0 {
                return Ok(if line.is_empty() { None } else { Some(line) });
            }
            let data = self.rxbuf.data();
            let avail = data.len().min(limit - line.len());
            if let Some(pos) = data[..avail].iter().position(|&b| b == TERMINATOR) {
                line.extend_from_slice(&data[..pos]);
                self.rxbuf.consume(pos + 1);
                return Ok(Some(line));
            }
            line.extend_from_slice(&data[..avail]);
            self.rxbuf.consume(avail);
        }
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avr::testing::ScriptedStream;

    #[test]
    fn splits_lines_across_reads() {
        let mut stream =
            ScriptedStream::new(vec![Ok(b"SITU".to_vec()), Ok(b"NER\rPWON\r".to_vec())]);
        let mut reader = LineReader::new(IOBUF_SIZE);
        assert_eq!(reader.next_line(&mut stream).unwrap(), Some(b"SITUNER".to_vec()));
        assert_eq!(reader.next_line(&mut stream).unwrap(), Some(b"PWON".to_vec()));
        assert_eq!(reader.next_line(&mut stream).unwrap(), None);
    }

    #[test]
    fn retries_interrupted_reads_without_losing_bytes() {
        let mut stream = ScriptedStream::new(vec![
            Ok(b"SIB".to_vec()),
            Err(io::ErrorKind::Interrupted.into()),
            Ok(b"D\r".to_vec()),
        ]);
        let mut reader = LineReader::new(IOBUF_SIZE);
        assert_eq!(reader.next_line(&mut stream).unwrap(), Some(b"SIBD".to_vec()));
    }

    #[test]
    fn delivers_partial_line_at_end_of_stream() {
        let mut stream = ScriptedStream::new(vec![Ok(b"PWON\rSIC".to_vec())]);
        let mut reader = LineReader::new(IOBUF_SIZE);
        assert_eq!(reader.next_line(&mut stream).unwrap(), Some(b"PWON".to_vec()));
        assert_eq!(reader.next_line(&mut stream).unwrap(), Some(b"SIC".to_vec()));
        assert_eq!(reader.next_line(&mut stream).unwrap(), None);
    }

    #[test]
    fn splits_overlong_lines() {
        let mut stream = ScriptedStream::new(vec![Ok(b"ABCDEFG\r".to_vec())]);
        let mut reader = LineReader::new(4);
        assert_eq!(reader.next_line(&mut stream).unwrap(), Some(b"ABC".to_vec()));
        assert_eq!(reader.next_line(&mut stream).unwrap(), Some(b"DEF".to_vec()));
        assert_eq!(reader.next_line(&mut stream).unwrap(), Some(b"G".to_vec()));
    }

    #[test]
    fn reports_timeouts_and_errors() {
        let mut stream = ScriptedStream::new(vec![Err(io::ErrorKind::WouldBlock.into())]);
        let mut reader = LineReader::new(IOBUF_SIZE);
        assert!(matches!(reader.next_line(&mut stream), Err(ReadError::TimedOut)));

        let mut stream = ScriptedStream::new(vec![Err(io::ErrorKind::ConnectionReset.into())]);
        assert!(matches!(reader.next_line(&mut stream), Err(ReadError::IO(_))));
    }

    #[test]
    fn reset_discards_buffered_data() {
        let mut stream = ScriptedStream::new(vec![Ok(b"PWON\rSITV\r".to_vec())]);
        let mut reader = LineReader::new(IOBUF_SIZE);
        assert_eq!(reader.next_line(&mut stream).unwrap(), Some(b"PWON".to_vec()));
        reader.reset();
        assert_eq!(reader.next_line(&mut stream).unwrap(), None);
    }
}
