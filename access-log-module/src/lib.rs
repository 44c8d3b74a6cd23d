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

//! # Access Log Module
//!
//! This crate produces one access log line per proxied exchange. Lines are rendered from a
//! template that mixes literal text with request info fields and header values, exchanges can be
//! filtered before anything is rendered. A configuration could look like this:
//!
//! ```yaml
//! log_file: access.log
//! log_format: "%StartTime% %REQ.host% %ResponseCode% %Duration% %RESP.content-type%"
//! filter_mode: any
//! filters:
//! - response_code: {op: ge, value: 400}
//! - duration: {op: gt, millis: 1000}
//! - header: {name: x-debug}
//! ```
//!
//! The `log_file` and `log_format` fields are also available as `--access-log-file` and
//! `--access-log-format` command line options.
//!
//! A log format consists of literal text and tokens enclosed in `%` characters. Supported tokens
//! are:
//!
//! * `%StartTime%`: local time the request started, e.g. `2024/05/29 12:53:19.000`
//! * `%RequestReceivedDuration%`: milliseconds until the request was fully received
//! * `%ResponseReceivedDuration%`: milliseconds until the upstream response was received
//! * `%BytesSent%`: number of body bytes sent downstream
//! * `%BytesReceived%`: number of body bytes received from downstream
//! * `%Protocol%`: HTTP protocol, e.g. `HTTP/1.1`
//! * `%ResponseCode%`: status code of the response, e.g. `200`
//! * `%Duration%`: milliseconds from request start to the end of the exchange
//! * `%ResponseFlag%`: comma-separated abnormal conditions like `UF,UT`
//! * `%UpstreamLocalAddress%`, `%DownstreamLocalAddress%`, `%DownstreamRemoteAddress%`: socket
//!   addresses of the connections involved
//! * `%UpstreamHostSelected%`: upstream host the request was sent to
//! * `%REQ.<header>%`: value of an HTTP request header, e.g. `%REQ.user-agent%`
//! * `%RESP.<header>%`: value of an HTTP response header, e.g. `%RESP.content-type%`
//!
//! Values that aren’t available are logged as `-`. If no format is configured,
//! [`DEFAULT_FORMAT`](format::DEFAULT_FORMAT) is used.
//!
//! Setting `log_file` to `-` (the default) writes to standard output, an empty value disables
//! logging. Log files are created if necessary, data in already existing files is kept. On
//! Unix-based systems, the process can be sent a `HUP` or `USR1` signal to make it re-open log
//! files. This is useful after the logs have been rotated for example.
//!
//! ## Code example
//!
//! The proxy provides request data by implementing the [`RequestInfo`] trait and calls
//! [`AccessLog::log`] once the response has been sent.
//!
//! ```rust
//! use access_log_module::{AccessLog, AccessLogConf, AccessLogHandler, RequestInfoRecord};
//! use http::HeaderMap;
//!
//! let conf = AccessLogConf::from_yaml(r#"
//!     log_file: ""
//!     log_format: "%ResponseCode% %REQ.host%"
//! "#).unwrap();
//! let handler = AccessLogHandler::try_from(conf).unwrap();
//!
//! let info = RequestInfoRecord {
//!     response_code: Some(200),
//!     ..Default::default()
//! };
//! handler.log(&HeaderMap::new(), &HeaderMap::new(), &info);
//! ```

pub mod configuration;
pub mod error;
pub mod filter;
pub mod format;
pub mod formatter;
pub mod handler;
pub mod request_info;
pub mod sink;
pub mod writer;

pub use configuration::{AccessLogConf, AccessLogOpt};
pub use error::{ConfigError, InvalidTemplateError, SinkError, UnknownFieldError};
pub use filter::{AccessLogFilter, FilterChain, FilterConf, FilterMode};
pub use format::{CompiledFormat, FormatSegment, DEFAULT_FORMAT};
pub use formatter::AccessLogFormatter;
pub use handler::{AccessLog, AccessLogHandler};
pub use request_info::{RequestInfo, RequestInfoField, RequestInfoRecord, ResponseFlag};
pub use sink::{AccessLogSink, LogFileSink};
pub use writer::LogWriter;
