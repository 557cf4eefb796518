//! Shared progress sink.
//!
//! One lock guards both the writer and the completion counter, so a block of
//! lines from one trial is never interleaved with another trial's output and
//! the `[done k/N]` numbering is gap-free.

use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::Arc;

struct ConsoleInner {
    writer: Box<dyn Write + Send>,
    completed: usize,
    total: usize,
}

/// Cloneable handle to the progress sink; all clones share one lock.
#[derive(Clone)]
pub struct Console {
    inner: Arc<Mutex<ConsoleInner>>,
}

impl Console {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConsoleInner {
                writer: Box::new(writer),
                completed: 0,
                total: 0,
            })),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Discards everything; counters still advance.
    pub fn sink() -> Self {
        Self::new(io::sink())
    }

    pub fn line(&self, line: impl AsRef<str>) {
        self.block(&[line.as_ref()]);
    }

    /// Write several lines as one uninterrupted unit.
    pub fn block<S: AsRef<str>>(&self, lines: &[S]) {
        let mut inner = self.inner.lock();
        for line in lines {
            // Console output is best effort; a closed stdout must not fail a trial.
            let _ = writeln!(inner.writer, "{}", line.as_ref());
        }
        let _ = inner.writer.flush();
    }

    /// Reset the completion counter for a new batch of `total` trials.
    pub fn begin(&self, total: usize) {
        let mut inner = self.inner.lock();
        inner.completed = 0;
        inner.total = total;
    }

    /// Record one finished trial and print `[done k/N] name`. Returns `k`.
    pub fn complete(&self, trial_name: &str, note: Option<&str>) -> usize {
        let mut inner = self.inner.lock();
        inner.completed += 1;
        let (done, total) = (inner.completed, inner.total);
        let _ = match note {
            Some(note) => writeln!(inner.writer, "[done {done}/{total}] {trial_name} - {note}"),
            None => writeln!(inner.writer, "[done {done}/{total}] {trial_name}"),
        };
        let _ = inner.writer.flush();
        done
    }

    pub fn completed(&self) -> usize {
        self.inner.lock().completed
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Console")
            .field("completed", &inner.completed)
            .field("total", &inner.total)
            .finish()
    }
}

/// In-memory writer whose contents can be read back; used by tests and by
/// callers that want to capture progress output.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn completion_counter_numbers_lines() {
        let buf = SharedBuffer::new();
        let console = Console::new(buf.clone());
        console.begin(2);

        assert_eq!(console.complete("a", None), 1);
        assert_eq!(console.complete("b", Some("panicked")), 2);

        assert_eq!(buf.contents(), "[done 1/2] a\n[done 2/2] b - panicked\n");
        assert_eq!(console.completed(), 2);
    }

    #[test]
    fn concurrent_blocks_do_not_interleave() {
        let buf = SharedBuffer::new();
        let console = Console::new(buf.clone());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let console = console.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let lines = [format!("begin {t}"), format!("middle {t}"), format!("end {t}")];
                        console.block(&lines);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let out = buf.contents();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 8 * 50 * 3);
        for chunk in lines.chunks(3) {
            let t = chunk[0].trim_start_matches("begin ");
            assert_eq!(chunk[1], format!("middle {t}"));
            assert_eq!(chunk[2], format!("end {t}"));
        }
    }
}
