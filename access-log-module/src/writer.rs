// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Handles writing logs on a separate task

use log::{debug, error};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::{stdout, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;

use crate::error::SinkError;

#[derive(Debug)]
#[allow(variant_size_differences)]
pub(crate) enum WriterMessage {
    Reopen,
    Flush(oneshot::Sender<()>),
    Line { log_file: Arc<Path>, line: String },
}

/// Handle of a task writing log lines to files
///
/// Files are opened on first use and kept open. On Unix systems, the process can be sent a `HUP`
/// or `USR1` signal to make all writers re-open their files, e.g. after log rotation.
#[derive(Debug, Clone)]
pub struct LogWriter {
    sender: Sender<WriterMessage>,
}

impl LogWriter {
    const QUEUE_SIZE: usize = 1024;

    /// Starts a new writer task on the current async runtime
    pub fn spawn() -> Result<Self, SinkError> {
        let runtime = Handle::try_current().map_err(|_| SinkError::NoRuntime)?;

        let (sender, receiver) = channel(Self::QUEUE_SIZE);
        runtime.spawn(log_writer(receiver));

        #[cfg(unix)]
        listen_for_reopen(&sender);

        Ok(Self { sender })
    }

    /// Starts a new writer task on a dedicated thread running its own runtime
    ///
    /// Unlike [`LogWriter::spawn`], the writer isn’t tied to the lifetime of the caller’s runtime
    /// and no runtime is required to create it.
    pub fn spawn_dedicated() -> Result<Self, SinkError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                error!("Failed creating log writer runtime: {err}");
                SinkError::WriterStart
            })?;

        let (sender, receiver) = channel(Self::QUEUE_SIZE);

        #[cfg(unix)]
        let signal_sender = sender.clone();

        std::thread::Builder::new()
            .name("access-log-writer".to_owned())
            .spawn(move || {
                runtime.block_on(async move {
                    #[cfg(unix)]
                    listen_for_reopen(&signal_sender);

                    log_writer(receiver).await
                })
            })
            .map_err(|err| {
                error!("Failed starting log writer thread: {err}");
                SinkError::WriterStart
            })?;

        Ok(Self { sender })
    }

    /// The process-wide writer, started on first use
    ///
    /// It runs on its own thread, so it keeps working when the runtimes using it shut down.
    pub fn shared() -> Result<&'static Self, SinkError> {
        static SHARED: OnceCell<LogWriter> = OnceCell::new();
        SHARED.get_or_try_init(Self::spawn_dedicated)
    }

    /// Queues a line to be written to the given file, `-` meaning standard output
    pub fn write_line(&self, log_file: Arc<Path>, line: String) -> Result<(), SinkError> {
        self.send(WriterMessage::Line { log_file, line })
    }

    /// Makes the writer close all files, they will be reopened when written to next time
    pub fn reopen(&self) -> Result<(), SinkError> {
        self.send(WriterMessage::Reopen)
    }

    /// Waits until all previously queued lines have been written out
    pub async fn flush(&self) -> Result<(), SinkError> {
        let (sender, receiver) = oneshot::channel();
        self.sender
            .send(WriterMessage::Flush(sender))
            .await
            .map_err(|_| SinkError::WriterGone)?;
        receiver.await.map_err(|_| SinkError::WriterGone)
    }

    fn send(&self, message: WriterMessage) -> Result<(), SinkError> {
        self.sender.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => SinkError::QueueFull,
            TrySendError::Closed(_) => SinkError::WriterGone,
        })
    }
}

fn open_file(path: &Arc<Path>) -> Box<dyn Write + Send> {
    if path.as_os_str() != "-" {
        match File::options().append(true).create(true).open(path) {
            Ok(file) => return Box::new(file),
            Err(err) => {
                error!(
                    "Failed opening log file {} (cause: {err}), falling back to stdout",
                    path.display()
                );
            }
        }
    }
    Box::new(stdout())
}

async fn log_writer(mut receiver: Receiver<WriterMessage>) {
    let mut files: HashMap<Arc<Path>, Box<dyn Write + Send>> = HashMap::new();

    let mut buf = Vec::<u8>::with_capacity(4096);

    while let Some(message) = receiver.recv().await {
        match message {
            WriterMessage::Reopen => {
                debug!("Reopening {} log file(s)", files.len());
                files = HashMap::new();
            }
            WriterMessage::Flush(done) => {
                for (log_file, writer) in files.iter_mut() {
                    if let Err(err) = Write::flush(writer) {
                        error!("Failed flushing log file {}: {err}", log_file.display());
                    }
                }
                let _ = done.send(());
            }
            WriterMessage::Line { log_file, line } => {
                // Single write per line so that concurrent appenders don't interleave
                buf.clear();
                buf.extend_from_slice(line.as_bytes());
                buf.push(b'\n');

                let writer = files.entry(log_file).or_insert_with_key(open_file);
                if let Err(err) = writer.write_all(&buf) {
                    error!("Failed writing access log line: {err}");
                }
            }
        }
    }
}

#[cfg(unix)]
fn listen_for_reopen(sender: &Sender<WriterMessage>) {
    use log::warn;
    use tokio::signal::unix::{signal, SignalKind};

    for kind in [SignalKind::hangup(), SignalKind::user_defined1()] {
        let mut signals = match signal(kind) {
            Ok(signals) => signals,
            Err(err) => {
                warn!(
                    "Failed registering for signal {}: {err}",
                    kind.as_raw_value()
                );
                continue;
            }
        };

        let sender = sender.clone();
        tokio::spawn(async move {
            while signals.recv().await.is_some() {
                if let Err(err) = sender.send(WriterMessage::Reopen).await {
                    error!("Failed reopening log files, writer crashed? {err}");
                    break;
                }
            }
        });
    }
}
