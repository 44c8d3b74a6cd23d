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

//! Error types of the access log module

use std::path::PathBuf;
use thiserror::Error;

/// A name that isn’t part of the request info field vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown request info field `{0}`")]
pub struct UnknownFieldError(pub String);

/// A log format template that cannot be compiled
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTemplateError {
    /// A `%` at the given byte offset has no closing `%`
    #[error("unclosed `%` at position {position}")]
    Unclosed {
        /// Byte offset of the opening `%`
        position: usize,
    },

    /// The token is neither a request info field nor a header reference
    #[error(transparent)]
    UnknownField(#[from] UnknownFieldError),

    /// A `%REQ.%` or `%RESP.%` token without header name
    #[error("header name missing in `%{token}%`")]
    EmptyHeaderName {
        /// The token as written in the template
        token: String,
    },

    /// The header name of a `%REQ.…%` or `%RESP.…%` token isn’t a valid HTTP header name
    #[error("invalid header name in `%{token}%`")]
    InvalidHeaderName {
        /// The token as written in the template
        token: String,
    },
}

/// Failure to deliver a log line to a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The writer cannot keep up, the line has been dropped
    #[error("log writer queue is full")]
    QueueFull,

    /// The writer task is no longer running
    #[error("log writer is gone, did it crash?")]
    WriterGone,

    /// The writer could not be started outside of an async runtime
    #[error("no async runtime available to run the log writer")]
    NoRuntime,

    /// The thread or runtime of a dedicated writer could not be created
    #[error("failed starting the log writer")]
    WriterStart,
}

/// Errors loading the configuration or setting up the handler
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be opened
    #[error("failed opening configuration file {}", .path.display())]
    Open {
        /// Configuration file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Configuration data is invalid
    #[error("failed reading configuration")]
    Parse(#[from] serde_yaml::Error),

    /// The log file’s parent directory could not be resolved
    #[error("failed resolving log file's parent directory for {}", .path.display())]
    LogPath {
        /// Log file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}
