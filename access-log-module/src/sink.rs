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

//! Destinations for rendered log lines

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ConfigError, SinkError};
use crate::writer::LogWriter;

/// Receives rendered log lines
pub trait AccessLogSink: Debug + Send + Sync {
    /// Writes a single line, without trailing newline. This must not block.
    fn write(&self, line: String) -> Result<(), SinkError>;
}

pub(crate) fn normalize_path(path: PathBuf) -> Result<PathBuf, ConfigError> {
    if path.as_os_str().is_empty() || path.as_os_str() == "-" {
        // Don't change special paths
        return Ok(path);
    }

    if let Some(parent) = path.parent() {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        let mut normalized = parent
            .canonicalize()
            .map_err(|source| ConfigError::LogPath {
                path: path.clone(),
                source,
            })?;
        if let Some(name) = path.file_name() {
            normalized.push(name);
        }
        Ok(normalized)
    } else {
        // Absolute path in the root, leave unchanged
        Ok(path)
    }
}

/// Sink appending lines to a file, `-` being standard output
///
/// Lines are passed on to a [`LogWriter`] task. Unless set explicitly, the process-wide writer is
/// used, it will be started on first write.
#[derive(Debug, Clone)]
pub struct LogFileSink {
    log_file: Arc<Path>,
    writer: Option<LogWriter>,
}

impl LogFileSink {
    /// Creates a sink for the given file
    ///
    /// The file’s parent directory is resolved, so that the same file specified via different
    /// paths will be written by a single file handle.
    pub fn new(log_file: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let log_file = normalize_path(log_file.into())?;
        Ok(Self {
            log_file: log_file.into(),
            writer: None,
        })
    }

    /// Makes this sink use the given writer instead of the process-wide one
    pub fn with_writer(mut self, writer: LogWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Normalized path of the log file
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }
}

impl AccessLogSink for LogFileSink {
    fn write(&self, line: String) -> Result<(), SinkError> {
        let writer = match &self.writer {
            Some(writer) => writer,
            None => LogWriter::shared()?,
        };
        writer.write_line(self.log_file.clone(), line)
    }
}
