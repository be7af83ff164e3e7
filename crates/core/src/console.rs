// MemFeed - Memory Reader Feed Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Destination of the progress lines.
///
/// Lines go to stdout unless echo is disabled, and are additionally copied
/// into an in-memory sink and/or an extra writer (e.g. a log file).
pub struct Console {
    sink: Option<Arc<Mutex<Vec<u8>>>>,
    writer: Option<Box<dyn Write + Send>>,
    echo_stdout: bool,
    write_failed: bool,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("sink", &self.sink.is_some())
            .field("writer", &self.writer.is_some())
            .field("echo_stdout", &self.echo_stdout)
            .finish()
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            sink: None,
            writer: None,
            echo_stdout: true,
            write_failed: false,
        }
    }

    /// A console that only captures into the returned buffer.
    pub fn capture() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let mut console = Self::new();
        console.set_sink(Some(sink.clone()), false);
        (console, sink)
    }

    pub fn set_sink(&mut self, sink: Option<Arc<Mutex<Vec<u8>>>>, echo_stdout: bool) {
        self.sink = sink;
        self.echo_stdout = echo_stdout;
    }

    pub fn set_writer(&mut self, writer: Option<Box<dyn Write + Send>>) {
        self.writer = writer;
    }

    pub fn emit(&mut self, line: &str) {
        if let Some(sink) = &self.sink {
            if let Ok(mut buf) = sink.lock() {
                buf.extend_from_slice(line.as_bytes());
            }
        }

        let mut result = Ok(());
        if self.echo_stdout {
            let mut stdout = io::stdout().lock();
            result = stdout.write_all(line.as_bytes()).and_then(|_| stdout.flush());
        }
        if let Some(writer) = self.writer.as_mut() {
            result = result.and(writer.write_all(line.as_bytes()));
        }

        // Console output never stops the loop; report the first failure only.
        if let Err(e) = result {
            if !self.write_failed {
                tracing::warn!("Progress output failed: {}", e);
                self.write_failed = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_capture_collects_lines() {
        let (mut console, sink) = Console::capture();
        console.emit("a\r\n");
        console.emit("b\r\n");
        assert_eq!(sink.lock().unwrap().as_slice(), b"a\r\nb\r\n");
    }

    #[test]
    fn test_extra_writer_receives_copy() {
        let (mut console, sink) = Console::capture();
        let file = SharedWriter::default();
        console.set_writer(Some(Box::new(file.clone())));
        console.emit("line\r\n");
        assert_eq!(file.0.lock().unwrap().as_slice(), b"line\r\n");
        assert_eq!(sink.lock().unwrap().as_slice(), b"line\r\n");
    }
}
