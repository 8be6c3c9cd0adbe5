//! Structured output: every log line, error, progress event and the terminal
//! result goes to the host as one JSON object per line.

use std::{
    fmt,
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use time::OffsetDateTime;

use crate::execution::{ExecutionResult, ExecutionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    pub debug: bool,
    pub enabled: bool,
    /// Indent used when an auxiliary object is pretty-printed into a message.
    pub indent: usize,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self { debug: false, enabled: true, indent: 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLevel {
    Error,
    Info,
    Debug,
}

/// A single line on the output channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputRecord {
    Log {
        content: String,
        #[serde(with = "time::serde::rfc3339")]
        time: OffsetDateTime,
    },
    Error {
        content: String,
        #[serde(with = "time::serde::rfc3339")]
        time: OffsetDateTime,
    },
    /// `content` is itself a JSON string: `{"id": .., "event": ..}`.
    Event {
        content: String,
        #[serde(with = "time::serde::rfc3339")]
        time: OffsetDateTime,
    },
    Result { result: ExecutionResult },
}

impl OutputRecord {
    fn message(level: OutputLevel, content: &str) -> Self {
        let time = OffsetDateTime::now_utc();
        let content = content.to_string();
        match level {
            OutputLevel::Error => Self::Error { content, time },
            OutputLevel::Info | OutputLevel::Debug => Self::Log { content, time },
        }
    }
}

#[derive(Serialize)]
struct EventContent<'a, T: ?Sized> {
    id: &'a str,
    event: &'a T,
}

type Channel = Arc<Mutex<Box<dyn Write + Send>>>;

/// Handle to the host output channel. Clones share the same channel, so one
/// line is written at a time no matter which clone (or engine callback) writes.
#[derive(Clone)]
pub struct Output {
    options: OutputOptions,
    channel: Channel,
    result_emitted: Arc<AtomicBool>,
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("options", &self.options)
            .field("result_emitted", &self.result_emitted.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Output {
    pub fn new<W: Write + Send + 'static>(options: OutputOptions, writer: W) -> Self {
        Self {
            options,
            channel: Arc::new(Mutex::new(Box::new(writer))),
            result_emitted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stdout(options: OutputOptions) -> Self {
        Self::new(options, io::stdout())
    }

    /// In-memory channel, for tests and embedding.
    pub fn memory(options: OutputOptions) -> (Self, MemoryWriter) {
        let writer = MemoryWriter::default();
        (Self::new(options, writer.clone()), writer)
    }

    /// Same channel, different options.
    pub fn with_options(&self, options: OutputOptions) -> Self {
        Self {
            options,
            channel: Arc::clone(&self.channel),
            result_emitted: Arc::clone(&self.result_emitted),
        }
    }

    pub fn options(&self) -> OutputOptions {
        self.options
    }

    pub fn debug_enabled(&self) -> bool {
        self.options.debug
    }

    pub fn result_emitted(&self) -> bool {
        self.result_emitted.load(Ordering::SeqCst)
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.out(OutputLevel::Info, message.as_ref(), None);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.out(OutputLevel::Debug, message.as_ref(), None);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.out(OutputLevel::Error, message.as_ref(), None);
    }

    pub fn info_with<T: Serialize + ?Sized>(&self, message: impl AsRef<str>, obj: &T) {
        self.out_with(OutputLevel::Info, message.as_ref(), obj);
    }

    pub fn debug_with<T: Serialize + ?Sized>(&self, message: impl AsRef<str>, obj: &T) {
        self.out_with(OutputLevel::Debug, message.as_ref(), obj);
    }

    pub fn error_with<T: Serialize + ?Sized>(&self, message: impl AsRef<str>, obj: &T) {
        self.out_with(OutputLevel::Error, message.as_ref(), obj);
    }

    /// Writes the message, then the trace as a second record of the same kind.
    pub fn error_trace(&self, message: impl AsRef<str>, trace: &str) {
        self.out(OutputLevel::Error, message.as_ref(), Some(trace));
    }

    /// Error message plus its full cause chain.
    pub fn error_chain(&self, err: &anyhow::Error) {
        self.error_trace(err.to_string(), &format!("{err:?}"));
    }

    pub fn event<T: Serialize + ?Sized>(&self, id: &str, event: &T) {
        if !self.options.enabled {
            return;
        }
        match serde_json::to_string(&EventContent { id, event }) {
            Ok(content) => self.write(&OutputRecord::Event {
                content,
                time: OffsetDateTime::now_utc(),
            }),
            Err(err) => tracing::error!(%err, id, "dropping unserializable event"),
        }
    }

    /// Terminal record. Only the first call per channel is written.
    pub fn result(&self, status: ExecutionStatus, output: &str, message: Option<&str>) {
        if !self.options.enabled {
            return;
        }
        if self.result_emitted.swap(true, Ordering::SeqCst) {
            tracing::warn!(?status, output, "result already emitted; dropping");
            return;
        }
        self.write(&OutputRecord::Result {
            result: ExecutionResult::new(status, output, message),
        });
    }

    fn accepts(&self, level: OutputLevel) -> bool {
        self.options.enabled && (level != OutputLevel::Debug || self.options.debug)
    }

    fn out(&self, level: OutputLevel, message: &str, trace: Option<&str>) {
        if !self.accepts(level) {
            return;
        }
        self.write(&OutputRecord::message(level, message));
        if let Some(trace) = trace {
            self.write(&OutputRecord::message(level, trace));
        }
    }

    fn out_with<T: Serialize + ?Sized>(&self, level: OutputLevel, message: &str, obj: &T) {
        if !self.accepts(level) {
            return;
        }
        match self.pretty(obj) {
            Ok(json) => self.out(level, &format!("{message}: {json}"), None),
            Err(err) => {
                tracing::warn!(%err, "could not render output object");
                self.out(level, message, None);
            }
        }
    }

    fn pretty<T: Serialize + ?Sized>(&self, obj: &T) -> serde_json::Result<String> {
        if self.options.indent == 0 {
            return serde_json::to_string(obj);
        }
        let indent = " ".repeat(self.options.indent);
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(
            &mut buf,
            PrettyFormatter::with_indent(indent.as_bytes()),
        );
        obj.serialize(&mut ser)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn write(&self, record: &OutputRecord) {
        let mut line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(err) => {
                tracing::error!(%err, "dropping unserializable output record");
                return;
            }
        };
        line.push('\n');
        let mut channel = self.channel.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = channel.write_all(line.as_bytes()).and_then(|_| channel.flush()) {
            tracing::warn!(%err, "output channel write failed");
        }
    }
}

/// Shared in-memory byte sink.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter(Arc<Mutex<Vec<u8>>>);

impl MemoryWriter {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn records(&self) -> serde_json::Result<Vec<OutputRecord>> {
        self.contents().lines().map(serde_json::from_str).collect()
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
