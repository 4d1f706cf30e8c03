//! Captured test output
//!
//! Test bodies never write to the process-wide stdout/stderr directly. They
//! receive an [`OutputStream`] through their [`TestContext`], which either
//! buffers the text (capture enabled) or passes it straight through.
//!
//! [`TestContext`]: crate::models::TestContext

use std::io::{self, Write};

const STDOUT_HEADER: &str = "\nStdout:\n";
const STDERR_HEADER: &str = "\nStderr:\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Output sink owned by a result collector and lent to each running test
#[derive(Debug, Default)]
pub struct CapturedOutput {
    buffering: bool,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl CapturedOutput {
    pub fn new(buffering: bool) -> Self {
        Self {
            buffering,
            ..Self::default()
        }
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn stdout(&mut self) -> OutputStream<'_> {
        OutputStream {
            output: self,
            stream: Stream::Stdout,
        }
    }

    pub fn stderr(&mut self) -> OutputStream<'_> {
        OutputStream {
            output: self,
            stream: Stream::Stderr,
        }
    }

    pub fn captured_stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn captured_stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Drop anything buffered so far.
    pub fn clear(&mut self) {
        self.stdout.clear();
        self.stderr.clear();
    }

    /// Append the buffered text to a formatted exception.
    pub fn merge_into(&self, exception: &mut String) {
        append_section(exception, STDOUT_HEADER, &self.captured_stdout());
        append_section(exception, STDERR_HEADER, &self.captured_stderr());
    }

    fn write_stream(&mut self, stream: Stream, buf: &[u8]) -> io::Result<usize> {
        if self.buffering {
            match stream {
                Stream::Stdout => self.stdout.extend_from_slice(buf),
                Stream::Stderr => self.stderr.extend_from_slice(buf),
            }
            return Ok(buf.len());
        }
        match stream {
            Stream::Stdout => io::stdout().write(buf),
            Stream::Stderr => io::stderr().write(buf),
        }
    }

    fn flush_stream(&mut self, stream: Stream) -> io::Result<()> {
        if self.buffering {
            return Ok(());
        }
        match stream {
            Stream::Stdout => io::stdout().flush(),
            Stream::Stderr => io::stderr().flush(),
        }
    }
}

fn append_section(exception: &mut String, header: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    exception.push_str(header);
    exception.push_str(text);
    if !text.ends_with('\n') {
        exception.push('\n');
    }
}

/// Writer handed to test code for one of the two standard streams
pub struct OutputStream<'a> {
    output: &'a mut CapturedOutput,
    stream: Stream,
}

impl Write for OutputStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.write_stream(self.stream, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush_stream(self.stream)
    }
}
