// src/exec/framer.rs

//! Reassembles newline-terminated lines from arbitrary byte chunks.

/// Stateful line splitter for one process stream.
///
/// Bytes after the last `\n` are kept until a later chunk terminates them or
/// [`LineFramer::flush`] is called at end of stream. Every byte is emitted
/// exactly once, and a line is never split across two emissions.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes, without the trailing
    /// `\n`. Invalid UTF-8 is replaced lossily per line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            if self.buf.is_empty() {
                lines.push(String::from_utf8_lossy(head).into_owned());
            } else {
                self.buf.extend_from_slice(head);
                lines.push(String::from_utf8_lossy(&self.buf).into_owned());
                self.buf.clear();
            }
            rest = &tail[1..];
        }

        self.buf.extend_from_slice(rest);
        lines
    }

    /// Emit the unterminated remainder, if any, and reset the buffer.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(line)
    }

    /// Number of buffered bytes not yet emitted.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
