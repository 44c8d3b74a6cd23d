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

//! Per-request data exposed to the access log and its textual representation

use chrono::{DateTime, Local};
use enumset::{EnumSet, EnumSetType};
use serde::Deserialize;
use std::fmt::Write;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use crate::error::UnknownFieldError;

/// Placeholder written whenever a value isn’t available
pub const MISSING_VALUE: &str = "-";

/// Reasons for an exchange to end abnormally
#[derive(Debug, EnumSetType, Deserialize)]
pub enum ResponseFlag {
    /// No healthy upstream host was available, `UH`
    #[serde(rename = "UH")]
    NoHealthyUpstream,
    /// Connecting to the upstream host failed, `UF`
    #[serde(rename = "UF")]
    UpstreamConnectionFailure,
    /// Upstream connection limit reached, `UO`
    #[serde(rename = "UO")]
    UpstreamOverflow,
    /// No route matched the request, `NR`
    #[serde(rename = "NR")]
    NoRouteFound,
    /// Upstream didn’t respond in time, `UT`
    #[serde(rename = "UT")]
    UpstreamRequestTimeout,
    /// Upstream connection was reset locally, `LR`
    #[serde(rename = "LR")]
    UpstreamLocalReset,
    /// Upstream connection was reset by the upstream host, `UR`
    #[serde(rename = "UR")]
    UpstreamRemoteReset,
    /// Upstream connection was terminated, `UC`
    #[serde(rename = "UC")]
    UpstreamConnectionTermination,
    /// Client closed the connection, `DC`
    #[serde(rename = "DC")]
    DownstreamTermination,
    /// Request was delayed by fault injection, `DI`
    #[serde(rename = "DI")]
    DelayInjected,
    /// Request was aborted by fault injection, `FI`
    #[serde(rename = "FI")]
    FaultInjected,
    /// Request was rate limited, `RL`
    #[serde(rename = "RL")]
    RateLimited,
}

impl ResponseFlag {
    /// Short code of the flag as written to the log
    pub fn code(self) -> &'static str {
        match self {
            Self::NoHealthyUpstream => "UH",
            Self::UpstreamConnectionFailure => "UF",
            Self::UpstreamOverflow => "UO",
            Self::NoRouteFound => "NR",
            Self::UpstreamRequestTimeout => "UT",
            Self::UpstreamLocalReset => "LR",
            Self::UpstreamRemoteReset => "UR",
            Self::UpstreamConnectionTermination => "UC",
            Self::DownstreamTermination => "DC",
            Self::DelayInjected => "DI",
            Self::FaultInjected => "FI",
            Self::RateLimited => "RL",
        }
    }
}

/// Read-only view of a single request/response exchange
///
/// The proxy implements this for whatever structure it keeps its per-request state in,
/// [`RequestInfoRecord`] is a plain implementation.
pub trait RequestInfo {
    /// Time the request arrived
    fn start_time(&self) -> SystemTime;

    /// Time from request arrival until the request was fully received
    fn request_received_duration(&self) -> Option<Duration>;

    /// Time from request arrival until the response was received
    fn response_received_duration(&self) -> Option<Duration>;

    /// Number of body bytes sent to the client
    fn bytes_sent(&self) -> u64;

    /// Number of body bytes received from the client
    fn bytes_received(&self) -> u64;

    /// Protocol of the request, e.g. `HTTP/1.1`
    fn protocol(&self) -> Option<&str>;

    /// Status code of the response if one was produced
    fn response_code(&self) -> Option<u16>;

    /// Total time since request arrival
    fn duration(&self) -> Option<Duration>;

    /// Flags describing abnormal exchange termination
    fn response_flags(&self) -> EnumSet<ResponseFlag>;

    /// Local address of the connection to the upstream host
    fn upstream_local_address(&self) -> Option<SocketAddr>;

    /// Local address of the client connection
    fn downstream_local_address(&self) -> Option<SocketAddr>;

    /// Client address
    fn downstream_remote_address(&self) -> Option<SocketAddr>;

    /// Upstream host that the request was forwarded to
    fn upstream_host_selected(&self) -> Option<&str>;
}

/// Owned exchange data implementing [`RequestInfo`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfoRecord {
    /// See [`RequestInfo::start_time`]
    pub start_time: SystemTime,
    /// See [`RequestInfo::request_received_duration`]
    pub request_received_duration: Option<Duration>,
    /// See [`RequestInfo::response_received_duration`]
    pub response_received_duration: Option<Duration>,
    /// See [`RequestInfo::bytes_sent`]
    pub bytes_sent: u64,
    /// See [`RequestInfo::bytes_received`]
    pub bytes_received: u64,
    /// See [`RequestInfo::protocol`]
    pub protocol: Option<String>,
    /// See [`RequestInfo::response_code`]
    pub response_code: Option<u16>,
    /// See [`RequestInfo::duration`]
    pub duration: Option<Duration>,
    /// See [`RequestInfo::response_flags`]
    pub response_flags: EnumSet<ResponseFlag>,
    /// See [`RequestInfo::upstream_local_address`]
    pub upstream_local_address: Option<SocketAddr>,
    /// See [`RequestInfo::downstream_local_address`]
    pub downstream_local_address: Option<SocketAddr>,
    /// See [`RequestInfo::downstream_remote_address`]
    pub downstream_remote_address: Option<SocketAddr>,
    /// See [`RequestInfo::upstream_host_selected`]
    pub upstream_host_selected: Option<String>,
}

impl Default for RequestInfoRecord {
    fn default() -> Self {
        Self {
            start_time: SystemTime::UNIX_EPOCH,
            request_received_duration: None,
            response_received_duration: None,
            bytes_sent: 0,
            bytes_received: 0,
            protocol: None,
            response_code: None,
            duration: None,
            response_flags: EnumSet::empty(),
            upstream_local_address: None,
            downstream_local_address: None,
            downstream_remote_address: None,
            upstream_host_selected: None,
        }
    }
}

impl RequestInfo for RequestInfoRecord {
    fn start_time(&self) -> SystemTime {
        self.start_time
    }

    fn request_received_duration(&self) -> Option<Duration> {
        self.request_received_duration
    }

    fn response_received_duration(&self) -> Option<Duration> {
        self.response_received_duration
    }

    fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    fn response_code(&self) -> Option<u16> {
        self.response_code
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn response_flags(&self) -> EnumSet<ResponseFlag> {
        self.response_flags
    }

    fn upstream_local_address(&self) -> Option<SocketAddr> {
        self.upstream_local_address
    }

    fn downstream_local_address(&self) -> Option<SocketAddr> {
        self.downstream_local_address
    }

    fn downstream_remote_address(&self) -> Option<SocketAddr> {
        self.downstream_remote_address
    }

    fn upstream_host_selected(&self) -> Option<&str> {
        self.upstream_host_selected.as_deref()
    }
}

/// A request info field that can be referenced in a log format as `%Name%`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestInfoField {
    /// Time the request arrived, `StartTime`
    StartTime,
    /// Time until the request was received, `RequestReceivedDuration`
    RequestReceivedDuration,
    /// Time until the response was received, `ResponseReceivedDuration`
    ResponseReceivedDuration,
    /// Number of bytes sent, `BytesSent`
    BytesSent,
    /// Number of bytes received, `BytesReceived`
    BytesReceived,
    /// Request protocol, `Protocol`
    Protocol,
    /// Response status code, `ResponseCode`
    ResponseCode,
    /// Total processing time, `Duration`
    Duration,
    /// Response flags, `ResponseFlag`
    ResponseFlag,
    /// Upstream connection’s local address, `UpstreamLocalAddress`
    UpstreamLocalAddress,
    /// Client connection’s local address, `DownstreamLocalAddress`
    DownstreamLocalAddress,
    /// Client address, `DownstreamRemoteAddress`
    DownstreamRemoteAddress,
    /// Selected upstream host, `UpstreamHostSelected`
    UpstreamHostSelected,
}

impl RequestInfoField {
    /// All fields in declaration order
    pub const ALL: [Self; 13] = [
        Self::StartTime,
        Self::RequestReceivedDuration,
        Self::ResponseReceivedDuration,
        Self::BytesSent,
        Self::BytesReceived,
        Self::Protocol,
        Self::ResponseCode,
        Self::Duration,
        Self::ResponseFlag,
        Self::UpstreamLocalAddress,
        Self::DownstreamLocalAddress,
        Self::DownstreamRemoteAddress,
        Self::UpstreamHostSelected,
    ];

    const START_TIME_FORMAT: &'static str = "%Y/%m/%d %H:%M:%S%.3f";

    /// Field name as used in log format templates
    pub fn name(self) -> &'static str {
        match self {
            Self::StartTime => "StartTime",
            Self::RequestReceivedDuration => "RequestReceivedDuration",
            Self::ResponseReceivedDuration => "ResponseReceivedDuration",
            Self::BytesSent => "BytesSent",
            Self::BytesReceived => "BytesReceived",
            Self::Protocol => "Protocol",
            Self::ResponseCode => "ResponseCode",
            Self::Duration => "Duration",
            Self::ResponseFlag => "ResponseFlag",
            Self::UpstreamLocalAddress => "UpstreamLocalAddress",
            Self::DownstreamLocalAddress => "DownstreamLocalAddress",
            Self::DownstreamRemoteAddress => "DownstreamRemoteAddress",
            Self::UpstreamHostSelected => "UpstreamHostSelected",
        }
    }

    /// Appends the textual representation of this field’s value to the buffer
    pub fn render(self, buf: &mut String, info: &dyn RequestInfo) {
        fn write_duration(buf: &mut String, duration: Option<Duration>) {
            if let Some(duration) = duration {
                let _ = write!(buf, "{:.3}", duration.as_secs_f64() * 1000.0);
            } else {
                buf.push_str(MISSING_VALUE);
            }
        }

        fn write_optional(buf: &mut String, value: Option<impl std::fmt::Display>) {
            if let Some(value) = value {
                let _ = write!(buf, "{value}");
            } else {
                buf.push_str(MISSING_VALUE);
            }
        }

        match self {
            Self::StartTime => {
                let time = DateTime::<Local>::from(info.start_time());
                let _ = write!(buf, "{}", time.format(Self::START_TIME_FORMAT));
            }
            Self::RequestReceivedDuration => write_duration(buf, info.request_received_duration()),
            Self::ResponseReceivedDuration => {
                write_duration(buf, info.response_received_duration())
            }
            Self::BytesSent => {
                let _ = write!(buf, "{}", info.bytes_sent());
            }
            Self::BytesReceived => {
                let _ = write!(buf, "{}", info.bytes_received());
            }
            Self::Protocol => write_optional(buf, info.protocol()),
            Self::ResponseCode => write_optional(buf, info.response_code()),
            Self::Duration => write_duration(buf, info.duration()),
            Self::ResponseFlag => {
                let flags = info.response_flags();
                if flags.is_empty() {
                    buf.push_str(MISSING_VALUE);
                }
                for (index, flag) in flags.iter().enumerate() {
                    if index > 0 {
                        buf.push(',');
                    }
                    buf.push_str(flag.code());
                }
            }
            Self::UpstreamLocalAddress => write_optional(buf, info.upstream_local_address()),
            Self::DownstreamLocalAddress => write_optional(buf, info.downstream_local_address()),
            Self::DownstreamRemoteAddress => write_optional(buf, info.downstream_remote_address()),
            Self::UpstreamHostSelected => write_optional(buf, info.upstream_host_selected()),
        }
    }
}

impl FromStr for RequestInfoField {
    type Err = UnknownFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| UnknownFieldError(s.to_owned()))
    }
}
