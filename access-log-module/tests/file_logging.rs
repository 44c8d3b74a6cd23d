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

//! Logging exchanges to a file through the process-wide writer

use access_log_module::{
    AccessLog, AccessLogConf, AccessLogHandler, LogWriter, RequestInfo, ResponseFlag,
};
use enumset::EnumSet;
use http::{HeaderMap, HeaderValue};
use std::fs::{read_to_string, remove_file};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};
use test_log::test;

#[derive(Debug)]
struct Exchange {
    start: SystemTime,
    status: u16,
    client: SocketAddr,
    flags: EnumSet<ResponseFlag>,
}

impl RequestInfo for Exchange {
    fn start_time(&self) -> SystemTime {
        self.start
    }

    fn request_received_duration(&self) -> Option<Duration> {
        None
    }

    fn response_received_duration(&self) -> Option<Duration> {
        None
    }

    fn bytes_sent(&self) -> u64 {
        512
    }

    fn bytes_received(&self) -> u64 {
        0
    }

    fn protocol(&self) -> Option<&str> {
        Some("HTTP/2")
    }

    fn response_code(&self) -> Option<u16> {
        Some(self.status)
    }

    fn duration(&self) -> Option<Duration> {
        Some(Duration::from_micros(1250))
    }

    fn response_flags(&self) -> EnumSet<ResponseFlag> {
        self.flags
    }

    fn upstream_local_address(&self) -> Option<SocketAddr> {
        None
    }

    fn downstream_local_address(&self) -> Option<SocketAddr> {
        None
    }

    fn downstream_remote_address(&self) -> Option<SocketAddr> {
        Some(self.client)
    }

    fn upstream_host_selected(&self) -> Option<&str> {
        None
    }
}

#[test(tokio::test)]
async fn configured_file_logging() {
    let path = std::env::temp_dir().join(format!(
        "access-log-module-{}-integration.log",
        std::process::id()
    ));
    let _ = remove_file(&path);

    let mut conf = AccessLogConf::from_yaml(
        r#"
            log_format: "%DownstreamRemoteAddress% \"%REQ.user-agent%\" %ResponseCode% %BytesSent% %Duration% %ResponseFlag% %Protocol%"
            filter_mode: any
            filters:
            - response_code: {op: ge, value: 500}
            - response_flag: [UF, UT]
        "#,
    )
    .unwrap();
    conf.log_file = path.clone();
    let handler = AccessLogHandler::try_from(conf).unwrap();

    let mut request_headers = HeaderMap::new();
    request_headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));
    let response_headers = HeaderMap::new();

    let exchanges: [(u16, EnumSet<ResponseFlag>); 4] = [
        (200, EnumSet::empty()),
        (502, EnumSet::empty()),
        (200, ResponseFlag::UpstreamConnectionFailure.into()),
        (404, ResponseFlag::DownstreamTermination.into()),
    ];
    for (status, flags) in exchanges {
        let exchange = Exchange {
            start: SystemTime::now(),
            status,
            client: "192.0.2.1:4000".parse().unwrap(),
            flags,
        };
        handler.log(&request_headers, &response_headers, &exchange);
    }

    LogWriter::shared().unwrap().flush().await.unwrap();

    assert_eq!(
        read_to_string(&path).unwrap(),
        "192.0.2.1:4000 \"curl/8.0\" 502 512 1.250 - HTTP/2\n\
         192.0.2.1:4000 \"curl/8.0\" 200 512 1.250 UF HTTP/2\n"
    );
    let _ = remove_file(&path);
}

#[test]
fn shared_writer_across_runtimes() {
    let path = std::env::temp_dir().join(format!(
        "access-log-module-{}-runtimes.log",
        std::process::id()
    ));
    let _ = remove_file(&path);

    let mut conf = AccessLogConf::from_yaml("log_format: \"%ResponseCode%\"").unwrap();
    conf.log_file = path.clone();
    let handler = AccessLogHandler::try_from(conf).unwrap();

    for status in [200, 404] {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let exchange = Exchange {
                start: SystemTime::now(),
                status,
                client: "192.0.2.1:4000".parse().unwrap(),
                flags: EnumSet::empty(),
            };
            handler.log(&HeaderMap::new(), &HeaderMap::new(), &exchange);
            LogWriter::shared().unwrap().flush().await.unwrap();
        });
        runtime.shutdown_background();
    }

    assert_eq!(read_to_string(&path).unwrap(), "200\n404\n");
    let _ = remove_file(&path);
}
