//! Asynchronous log pipeline.
//!
//! Producers push records into a FIFO queue guarded by a mutex; a single
//! writer thread drains it in order and appends each formatted line to the
//! log file, flushing after every record. Stopping the writer drains the
//! queue first, so no accepted record is lost on shutdown.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::format::{format_record, with_stack_trace};
use super::record::{LogLevel, LogModule, LogRecord};
use crate::config::LoggerConfig;
use crate::error::{LogError, LoggedError};

const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct QueueState {
    records: VecDeque<LogRecord>,
    /// Asks the current writer to exit once the queue is empty.
    stop: bool,
    /// Cleared by `shutdown`; later records are dropped.
    accepting: bool,
}

/// State shared between producers and the writer thread.
struct Shared {
    queue: Mutex<QueueState>,
    available: Condvar,
    /// Records enqueued but not yet written out.
    unwritten: AtomicUsize,
    console: AtomicBool,
}

struct Writer {
    handle: Option<JoinHandle<()>>,
    path: PathBuf,
}

pub struct LogPipeline {
    shared: Arc<Shared>,
    /// Serializes start/stop of the writer so at most one exists.
    writer: Mutex<Writer>,
    enabled: AtomicBool,
    modules: [AtomicBool; LogModule::COUNT],
}

impl LogPipeline {
    /// Opens `path` for appending and starts the writer thread, with every module enabled.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;

        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                records: VecDeque::new(),
                stop: false,
                accepting: true,
            }),
            available: Condvar::new(),
            unwritten: AtomicUsize::new(0),
            console: AtomicBool::new(false),
        });

        let handle = spawn_writer(shared.clone(), file)?;

        Ok(Self {
            shared,
            writer: Mutex::new(Writer {
                handle: Some(handle),
                path,
            }),
            enabled: AtomicBool::new(true),
            modules: std::array::from_fn(|_| AtomicBool::new(true)),
        })
    }

    /// Builds a pipeline from the logger section of the server config.
    pub fn init(config: &LoggerConfig) -> Result<Self, LogError> {
        let pipeline = Self::open(&config.log_file)?;
        pipeline.set_enabled(config.enabled);
        for module in &config.disabled_modules {
            pipeline.set_module_enabled(*module, false);
        }
        pipeline.set_console_output(config.console_output);
        Ok(pipeline)
    }

    /// Queues a record.
    ///
    /// A no-op when logging or `module` is disabled. `Error` and `Critical`
    /// records get the current stack trace appended before queuing. An
    /// `Error` record is queued first and then returned as `Err` carrying the
    /// original message, so the caller can abort what it was doing.
    pub fn log(
        &self,
        level: LogLevel,
        module: LogModule,
        content: impl Into<String>,
    ) -> Result<(), LoggedError> {
        if !self.is_enabled() || !self.is_module_enabled(module) {
            return Ok(());
        }

        let message = content.into();
        let content = if level.captures_stack() {
            with_stack_trace(&message)
        } else {
            message.clone()
        };

        self.enqueue(LogRecord::new(level, module, content));

        if level == LogLevel::Error {
            return Err(LoggedError { message });
        }
        Ok(())
    }

    /// Like [`log`](Self::log), with the caller's `file:line` prefixed to the content.
    #[track_caller]
    pub fn log_with_source(
        &self,
        level: LogLevel,
        module: LogModule,
        content: impl Into<String>,
    ) -> Result<(), LoggedError> {
        let location = Location::caller();
        let content = format!("{}:{} {}", location.file(), location.line(), content.into());
        self.log(level, module, content)
    }

    pub fn debug(&self, module: LogModule, content: impl Into<String>) {
        let _ = self.log(LogLevel::Debug, module, content);
    }

    pub fn info(&self, module: LogModule, content: impl Into<String>) {
        let _ = self.log(LogLevel::Info, module, content);
    }

    pub fn notice(&self, module: LogModule, content: impl Into<String>) {
        let _ = self.log(LogLevel::Notice, module, content);
    }

    pub fn warning(&self, module: LogModule, content: impl Into<String>) {
        let _ = self.log(LogLevel::Warning, module, content);
    }

    pub fn error(&self, module: LogModule, content: impl Into<String>) -> Result<(), LoggedError> {
        self.log(LogLevel::Error, module, content)
    }

    /// Records with a stack trace but, unlike `error`, does not raise.
    pub fn critical(&self, module: LogModule, content: impl Into<String>) {
        let _ = self.log(LogLevel::Critical, module, content);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_module_enabled(&self, module: LogModule, enabled: bool) {
        self.modules[module.index()].store(enabled, Ordering::SeqCst);
    }

    pub fn is_module_enabled(&self, module: LogModule) -> bool {
        self.modules[module.index()].load(Ordering::SeqCst)
    }

    /// Also forwards every written record to the `log` facade.
    pub fn set_console_output(&self, enabled: bool) {
        self.shared.console.store(enabled, Ordering::SeqCst);
    }

    /// Number of records queued or being written.
    pub fn pending(&self) -> usize {
        self.shared.unwritten.load(Ordering::SeqCst)
    }

    /// Polls until every record queued so far has been written.
    ///
    /// Records queued concurrently by other threads may extend the wait.
    pub fn flush(&self) {
        while self.pending() > 0 {
            if !self.writer_running() {
                return;
            }
            thread::sleep(FLUSH_POLL_INTERVAL);
        }
    }

    pub fn log_file(&self) -> PathBuf {
        self.writer.lock().path.clone()
    }

    /// Switches output to `path`.
    ///
    /// The current writer drains the queue into the old file before the new
    /// one is opened. If opening fails the error is returned and records keep
    /// accumulating until a later call succeeds.
    pub fn set_log_file(&self, path: impl AsRef<Path>) -> Result<(), LogError> {
        let path = path.as_ref().to_path_buf();
        let mut writer = self.writer.lock();

        self.stop_writer(&mut writer);
        let file = open_append(&path)?;

        self.shared.queue.lock().stop = false;
        writer.handle = Some(spawn_writer(self.shared.clone(), file)?);
        writer.path = path;
        Ok(())
    }

    /// Stops accepting records, drains the queue and joins the writer. Idempotent.
    pub fn shutdown(&self) {
        let mut writer = self.writer.lock();
        self.shared.queue.lock().accepting = false;
        self.stop_writer(&mut writer);
    }

    fn enqueue(&self, record: LogRecord) {
        {
            let mut queue = self.shared.queue.lock();
            if !queue.accepting {
                return;
            }
            self.shared.unwritten.fetch_add(1, Ordering::SeqCst);
            queue.records.push_back(record);
        }
        self.shared.available.notify_one();
    }

    fn stop_writer(&self, writer: &mut Writer) {
        let Some(handle) = writer.handle.take() else {
            return;
        };

        self.shared.queue.lock().stop = true;
        self.shared.available.notify_all();

        if handle.join().is_err() {
            log::error!("log writer thread panicked");
        }
    }

    fn writer_running(&self) -> bool {
        self.writer.lock().handle.is_some()
    }
}

impl Drop for LogPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_append(path: &Path) -> Result<File, LogError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LogError::OpenFile {
            path: path.to_path_buf(),
            source,
        })
}

fn spawn_writer(shared: Arc<Shared>, file: File) -> Result<JoinHandle<()>, LogError> {
    thread::Builder::new()
        .name("log-writer".into())
        .spawn(move || run_writer(&shared, file))
        .map_err(LogError::SpawnWriter)
}

fn run_writer(shared: &Shared, mut file: File) {
    loop {
        let record = {
            let mut queue = shared.queue.lock();
            while queue.records.is_empty() && !queue.stop {
                shared.available.wait(&mut queue);
            }
            match queue.records.pop_front() {
                Some(record) => record,
                // stop requested and nothing left
                None => break,
            }
        };

        let line = format_record(&record);
        let written = writeln!(file, "{}", line).and_then(|_| file.flush());
        if let Err(e) = written {
            log::warn!("failed to write log record: {}", e);
        }

        if shared.console.load(Ordering::SeqCst) {
            log::log!(
                target: record.module().as_str(),
                record.level().to_log_level(),
                "{}",
                record.content()
            );
        }

        shared.unwritten.fetch_sub(1, Ordering::SeqCst);
    }
}
