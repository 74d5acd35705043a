use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::trace::{ActionRecord, Metadata};

/// Where the per-record diagnostic line goes. Supplied by the caller so the
/// logger never touches process-global logging configuration.
pub type DiagnosticSink = Box<dyn Write + Send>;

/// Buffering action logger. Records accumulate in memory and reach the log
/// file only on [`ActionLogger::flush`]; the [`ActionLogger::scoped`] wrapper
/// guarantees one flush on every exit path, so a strategy that dies mid-run
/// still leaves every completed action on disk.
///
/// Handles are cheap clones of one shared buffer; the session and the
/// strategy both log through the same run's buffer.
#[derive(Clone)]
pub struct ActionLogger {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    log_path: PathBuf,
    buffer: Vec<ActionRecord>,
    sink: DiagnosticSink,
}

impl ActionLogger {
    pub fn new(log_path: PathBuf, sink: DiagnosticSink) -> Self {
        ActionLogger {
            inner: Arc::new(Mutex::new(Inner {
                log_path,
                buffer: Vec::new(),
                sink,
            })),
        }
    }

    /// Logger writing its diagnostic trail to stderr.
    pub fn to_stderr(log_path: PathBuf) -> Self {
        ActionLogger::new(log_path, Box::new(std::io::stderr()))
    }

    /// Append one record to the buffer and emit a diagnostic line. Cannot
    /// fail; a broken diagnostic sink is not a reason to abort the run.
    pub async fn record(&self, action: &str, url: &str, metadata: Metadata) {
        let record = ActionRecord::new(action, url, metadata);
        let mut inner = self.inner.lock().await;
        let meta_json = serde_json::to_string(&record.metadata)
            .unwrap_or_else(|_| "{}".to_string());
        let _ = writeln!(inner.sink, "{} | {} | {}", record.action, record.url, meta_json);
        inner.buffer.push(record);
    }

    /// Write all buffered records to the log file, one JSON object per line,
    /// in buffer order, then clear the buffer. An empty buffer is a no-op and
    /// touches no file, which also makes back-to-back flushes idempotent.
    pub async fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.buffer.is_empty() {
            return Ok(());
        }
        if let Some(parent) = inner.log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = File::options()
            .append(true)
            .create(true)
            .open(&inner.log_path)
            .await?;
        for record in &inner.buffer {
            file.write_all(serde_json::to_string(record)?.as_bytes())
                .await?;
            file.write_u8(b'\n').await?;
        }
        file.flush().await?;
        inner.buffer.clear();
        Ok(())
    }

    /// Run `body` and flush exactly once afterwards, whether it succeeded or
    /// not. The body's error wins over a flush error.
    pub async fn scoped<T>(
        &self,
        body: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let result = body.await;
        let flushed = self.flush().await;
        match (result, flushed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(flush_error)) => {
                log::error!("flush after failed run also failed: {}", flush_error);
                Err(error)
            }
            (Ok(_), Err(flush_error)) => Err(flush_error),
        }
    }

    /// Number of records waiting for the next flush.
    pub async fn pending(&self) -> usize {
        self.inner.lock().await.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use tempfile::TempDir;

    use super::*;
    use crate::error::AgentError;
    use crate::trace::metadata;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<StdMutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logger_in(dir: &TempDir) -> (ActionLogger, PathBuf, SharedSink) {
        let path = dir.path().join("data").join("actions.log");
        let sink = SharedSink::default();
        let logger = ActionLogger::new(path.clone(), Box::new(sink.clone()));
        (logger, path, sink)
    }

    async fn read_lines(path: &PathBuf) -> Vec<serde_json::Value> {
        let contents = tokio::fs::read_to_string(path).await.unwrap();
        contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn flush_writes_records_in_call_order_and_clears_buffer() {
        let dir = TempDir::new().unwrap();
        let (logger, path, _) = logger_in(&dir);

        logger.record("navigate", "http://x/", metadata([("target", "home")])).await;
        logger.record("click", "http://x/", metadata([("text", "Login")])).await;
        logger.record("fill", "http://x/login", metadata([("selector", "#email")])).await;
        assert_eq!(logger.pending().await, 3);

        logger.flush().await.unwrap();
        assert_eq!(logger.pending().await, 0);

        let lines = read_lines(&path).await;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["action"], "navigate");
        assert_eq!(lines[1]["action"], "click");
        assert_eq!(lines[2]["action"], "fill");
    }

    #[tokio::test]
    async fn single_record_round_trips_exactly() {
        let dir = TempDir::new().unwrap();
        let (logger, path, _) = logger_in(&dir);

        logger.record("navigate", "http://x/", metadata([("target", "home")])).await;
        logger.flush().await.unwrap();

        let lines = read_lines(&path).await;
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["action"], "navigate");
        assert_eq!(line["url"], "http://x/");
        assert_eq!(line["metadata"], serde_json::json!({"target": "home"}));
        assert!(
            chrono::DateTime::parse_from_rfc3339(line["timestamp"].as_str().unwrap())
                .is_ok()
        );
    }

    #[tokio::test]
    async fn empty_flush_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let (logger, path, _) = logger_in(&dir);

        logger.flush().await.unwrap();
        assert!(!path.exists(), "no file should be created by an empty flush");
    }

    #[tokio::test]
    async fn double_flush_does_not_duplicate_records() {
        let dir = TempDir::new().unwrap();
        let (logger, path, _) = logger_in(&dir);

        logger.record("click", "http://x/", metadata([("text", "Checkout")])).await;
        logger.flush().await.unwrap();
        logger.flush().await.unwrap();

        assert_eq!(read_lines(&path).await.len(), 1);
    }

    #[tokio::test]
    async fn scoped_flushes_even_when_the_body_fails() {
        let dir = TempDir::new().unwrap();
        let (logger, path, _) = logger_in(&dir);

        let result: Result<()> = logger
            .scoped(async {
                logger.record("navigate", "http://x/", metadata([("target", "home")])).await;
                logger.record("click", "http://x/", metadata([("text", "Login")])).await;
                Err(AgentError::ElementNotFound("Register".to_string()))
            })
            .await;

        assert!(matches!(result, Err(AgentError::ElementNotFound(_))));
        let lines = read_lines(&path).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["action"], "navigate");
        assert_eq!(lines[1]["action"], "click");
    }

    #[tokio::test]
    async fn records_append_across_runs_on_the_same_path() {
        let dir = TempDir::new().unwrap();
        let (logger, path, _) = logger_in(&dir);
        logger.record("navigate", "http://x/", Metadata::new()).await;
        logger.flush().await.unwrap();

        let second = ActionLogger::new(path.clone(), Box::new(std::io::sink()));
        second.record("navigate", "http://y/", Metadata::new()).await;
        second.flush().await.unwrap();

        let lines = read_lines(&path).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["url"], "http://y/");
    }

    #[tokio::test]
    async fn diagnostic_sink_receives_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let (logger, _, sink) = logger_in(&dir);

        logger.record("navigate", "http://x/", Metadata::new()).await;
        logger.record("click", "http://x/", metadata([("text", "Login")])).await;

        let trail = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = trail.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("navigate | http://x/"));
        assert!(lines[1].contains("\"text\":\"Login\""));
    }
}
