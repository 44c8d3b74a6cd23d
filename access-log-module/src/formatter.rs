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

//! Rendering log lines from compiled formats

use http::HeaderMap;
use std::fmt::Debug;

use crate::format::{CompiledFormat, FormatSegment, HeaderSide};
use crate::request_info::{RequestInfo, MISSING_VALUE};

/// Produces a log line for an exchange
pub trait AccessLogFormatter: Debug + Send + Sync {
    /// Renders request headers, response headers and request info into a log line
    fn format(
        &self,
        request_headers: &HeaderMap,
        response_headers: &HeaderMap,
        info: &dyn RequestInfo,
    ) -> String;
}

impl FormatSegment {
    /// Appends this segment’s value to the buffer
    pub fn render(
        &self,
        buf: &mut String,
        request_headers: &HeaderMap,
        response_headers: &HeaderMap,
        info: &dyn RequestInfo,
    ) {
        match self {
            Self::Literal(text) => buf.push_str(text),
            Self::Field(field) => field.render(buf, info),
            Self::Header(side, name) => {
                let headers = match side {
                    HeaderSide::Request => request_headers,
                    HeaderSide::Response => response_headers,
                };
                match headers.get(name) {
                    Some(value) => match value.to_str() {
                        Ok(value) => buf.push_str(value),
                        Err(_) => buf.push_str(&String::from_utf8_lossy(value.as_bytes())),
                    },
                    None => buf.push_str(MISSING_VALUE),
                }
            }
        }
    }
}

impl CompiledFormat {
    /// Appends the rendered log line to the buffer, allowing buffer reuse across calls
    pub fn format_into(
        &self,
        buf: &mut String,
        request_headers: &HeaderMap,
        response_headers: &HeaderMap,
        info: &dyn RequestInfo,
    ) {
        for segment in self.segments() {
            segment.render(buf, request_headers, response_headers, info);
        }
    }
}

impl AccessLogFormatter for CompiledFormat {
    fn format(
        &self,
        request_headers: &HeaderMap,
        response_headers: &HeaderMap,
        info: &dyn RequestInfo,
    ) -> String {
        let mut buf = String::new();
        self.format_into(&mut buf, request_headers, response_headers, info);
        buf
    }
}
