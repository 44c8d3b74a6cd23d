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

//! Handler producing one access log line per exchange

use http::HeaderMap;
use log::{debug, error, trace};
use std::fmt::Debug;
use std::sync::Arc;

use crate::configuration::AccessLogConf;
use crate::error::ConfigError;
use crate::filter::{AccessLogFilter, FilterChain};
use crate::format::CompiledFormat;
use crate::formatter::AccessLogFormatter;
use crate::request_info::RequestInfo;
use crate::sink::{AccessLogSink, LogFileSink};

/// Records exchanges once they are complete
pub trait AccessLog: Debug + Send + Sync {
    /// Logs an exchange, to be called after the response has been sent
    fn log(
        &self,
        request_headers: &HeaderMap,
        response_headers: &HeaderMap,
        info: &dyn RequestInfo,
    );
}

/// Access log combining a filter, a formatter and a sink
///
/// The filter is consulted first, the formatter and the sink are only invoked for exchanges that
/// pass it. Without a sink, logging is disabled.
#[derive(Debug)]
pub struct AccessLogHandler {
    filter: Box<dyn AccessLogFilter>,
    formatter: Box<dyn AccessLogFormatter>,
    sink: Option<Arc<dyn AccessLogSink>>,
}

impl AccessLogHandler {
    /// Creates a handler from its components
    pub fn new(
        filter: impl AccessLogFilter + 'static,
        formatter: impl AccessLogFormatter + 'static,
        sink: Arc<dyn AccessLogSink>,
    ) -> Self {
        Self {
            filter: Box::new(filter),
            formatter: Box::new(formatter),
            sink: Some(sink),
        }
    }

    /// Creates a handler that doesn’t log anything
    pub fn disabled() -> Self {
        Self {
            filter: Box::<FilterChain>::default(),
            formatter: Box::<CompiledFormat>::default(),
            sink: None,
        }
    }

    /// Checks whether this handler writes log lines
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }
}

impl TryFrom<AccessLogConf> for AccessLogHandler {
    type Error = ConfigError;

    fn try_from(conf: AccessLogConf) -> Result<Self, Self::Error> {
        debug!("Access log configuration received: {conf:#?}");

        if conf.log_file.as_os_str().is_empty() {
            debug!("Access logging disabled");
            return Ok(Self::disabled());
        }

        let sink = LogFileSink::new(conf.log_file)?;
        let filter = FilterChain::from_conf(conf.filter_mode, conf.filters);
        trace!("Access log writing to {}", sink.log_file().display());
        trace!("Access log filters: {filter:#?}");
        trace!("Access log format: {}", conf.log_format);

        Ok(Self::new(filter, conf.log_format, Arc::new(sink)))
    }
}

impl AccessLog for AccessLogHandler {
    fn log(
        &self,
        request_headers: &HeaderMap,
        response_headers: &HeaderMap,
        info: &dyn RequestInfo,
    ) {
        let sink = match &self.sink {
            Some(sink) => sink,
            None => return,
        };

        if !self.filter.decide(request_headers, info) {
            return;
        }

        let line = self.formatter.format(request_headers, response_headers, info);
        if let Err(err) = sink.write(line) {
            error!("Failed writing access log: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use http::HeaderValue;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use test_log::test;

    use crate::error::SinkError;
    use crate::filter::{Comparison, FilterMode, ResponseCodeFilter};
    use crate::request_info::RequestInfoRecord;

    #[derive(Debug)]
    struct StaticFilter {
        result: bool,
        calls: Arc<AtomicUsize>,
    }

    impl AccessLogFilter for StaticFilter {
        fn decide(&self, _request_headers: &HeaderMap, _info: &dyn RequestInfo) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    #[derive(Debug)]
    struct CountingFormatter {
        calls: Arc<AtomicUsize>,
    }

    impl AccessLogFormatter for CountingFormatter {
        fn format(
            &self,
            _request_headers: &HeaderMap,
            _response_headers: &HeaderMap,
            info: &dyn RequestInfo,
        ) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            info.bytes_sent().to_string()
        }
    }

    #[derive(Debug, Default)]
    struct MemorySink {
        lines: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MemorySink {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl AccessLogSink for MemorySink {
        fn write(&self, line: String) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::QueueFull);
            }
            self.lines.lock().unwrap().push(line);
            Ok(())
        }
    }

    fn handler(
        decision: bool,
        sink: Arc<MemorySink>,
    ) -> (AccessLogHandler, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let filter_calls = Arc::new(AtomicUsize::new(0));
        let format_calls = Arc::new(AtomicUsize::new(0));
        let handler = AccessLogHandler::new(
            StaticFilter {
                result: decision,
                calls: filter_calls.clone(),
            },
            CountingFormatter {
                calls: format_calls.clone(),
            },
            sink,
        );
        (handler, filter_calls, format_calls)
    }

    fn info(bytes_sent: u64) -> RequestInfoRecord {
        RequestInfoRecord {
            bytes_sent,
            ..Default::default()
        }
    }

    #[test]
    fn accepted_exchange() {
        let sink = Arc::new(MemorySink::default());
        let (handler, filter_calls, format_calls) = handler(true, sink.clone());
        assert!(handler.is_enabled());

        handler.log(&HeaderMap::new(), &HeaderMap::new(), &info(42));
        assert_eq!(filter_calls.load(Ordering::SeqCst), 1);
        assert_eq!(format_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.lines(), vec!["42".to_owned()]);
    }

    #[test]
    fn rejected_exchange() {
        let sink = Arc::new(MemorySink::default());
        let (handler, filter_calls, format_calls) = handler(false, sink.clone());

        handler.log(&HeaderMap::new(), &HeaderMap::new(), &info(42));
        assert_eq!(filter_calls.load(Ordering::SeqCst), 1);
        assert_eq!(format_calls.load(Ordering::SeqCst), 0);
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn sink_failure() {
        let sink = Arc::new(MemorySink {
            fail: true,
            ..Default::default()
        });
        let (handler, _, format_calls) = handler(true, sink.clone());

        // Errors are logged, not propagated
        handler.log(&HeaderMap::new(), &HeaderMap::new(), &info(1));
        handler.log(&HeaderMap::new(), &HeaderMap::new(), &info(2));
        assert_eq!(format_calls.load(Ordering::SeqCst), 2);
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn disabled() {
        let handler = AccessLogHandler::disabled();
        assert!(!handler.is_enabled());
        handler.log(&HeaderMap::new(), &HeaderMap::new(), &info(1));

        let conf = AccessLogConf {
            log_file: PathBuf::new(),
            ..Default::default()
        };
        assert!(!AccessLogHandler::try_from(conf).unwrap().is_enabled());
    }

    #[test]
    fn from_conf() {
        let conf = AccessLogConf::from_yaml("log_file: \"-\"").unwrap();
        assert!(AccessLogHandler::try_from(conf).unwrap().is_enabled());

        let conf = AccessLogConf {
            log_file: std::env::temp_dir()
                .join("access-log-module-does-not-exist")
                .join("access.log"),
            ..Default::default()
        };
        assert!(matches!(
            AccessLogHandler::try_from(conf),
            Err(ConfigError::LogPath { .. })
        ));
    }

    #[test]
    fn filtering_and_formatting() {
        let sink = Arc::new(MemorySink::default());
        let mut filter = FilterChain::new(FilterMode::All);
        filter.push(ResponseCodeFilter {
            op: Comparison::Ge,
            value: 400,
        });
        let handler = AccessLogHandler::new(
            filter,
            CompiledFormat::compile("%ResponseCode% %REQ.host% %RESP.server%").unwrap(),
            sink.clone(),
        );

        let mut request_headers = HeaderMap::new();
        request_headers.insert("host", HeaderValue::from_static("example.com"));

        for code in [200, 404, 302, 503] {
            let info = RequestInfoRecord {
                response_code: Some(code),
                ..Default::default()
            };
            handler.log(&request_headers, &HeaderMap::new(), &info);
        }

        assert_eq!(
            sink.lines(),
            vec![
                "404 example.com -".to_owned(),
                "503 example.com -".to_owned()
            ]
        );
    }

    #[test]
    fn concurrent_logging() {
        let sink = Arc::new(MemorySink::default());
        let filter_calls = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(AccessLogHandler::new(
            StaticFilter {
                result: true,
                calls: filter_calls.clone(),
            },
            CompiledFormat::compile("%BytesSent% %REQ.x-thread% %ResponseCode%").unwrap(),
            sink.clone(),
        ));

        let threads: Vec<_> = (0..8u64)
            .map(|thread| {
                let handler = handler.clone();
                std::thread::spawn(move || {
                    let mut request_headers = HeaderMap::new();
                    request_headers.insert(
                        "x-thread",
                        HeaderValue::from_str(&format!("t{thread}")).unwrap(),
                    );
                    for i in 0..100 {
                        let info = info(thread * 1000 + i);
                        handler.log(&request_headers, &HeaderMap::new(), &info);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(filter_calls.load(Ordering::SeqCst), 800);

        let mut lines = sink.lines();
        lines.sort_by_key(|line| {
            line.split(' ')
                .next()
                .and_then(|bytes| bytes.parse::<u64>().ok())
                .unwrap()
        });
        let expected: Vec<_> = (0..8u64)
            .flat_map(|thread| {
                (0..100).map(move |i| format!("{} t{thread} -", thread * 1000 + i))
            })
            .collect();
        assert_eq!(lines, expected);
    }
}
