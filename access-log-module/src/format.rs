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

//! Compilation of log format templates like `%StartTime% %REQ.host% %ResponseCode%`

use http::HeaderName;
use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::InvalidTemplateError;
use crate::request_info::RequestInfoField;

/// Token prefix selecting a request header, e.g. `%REQ.user-agent%`
pub const REQUEST_HEADER_PREFIX: &str = "REQ.";

/// Token prefix selecting a response header, e.g. `%RESP.content-type%`
pub const RESPONSE_HEADER_PREFIX: &str = "RESP.";

/// Log format used if none is configured
pub const DEFAULT_FORMAT: &str = "%StartTime% %RequestReceivedDuration% \
    %ResponseReceivedDuration% %BytesSent% %BytesReceived% %Protocol% %ResponseCode% \
    %Duration% %ResponseFlag% %ResponseCode% %UpstreamLocalAddress% %DownstreamLocalAddress% \
    %DownstreamRemoteAddress% %UpstreamHostSelected%";

/// Fields of [`DEFAULT_FORMAT`] in order, separated by single spaces
const DEFAULT_FIELDS: [RequestInfoField; 14] = [
    RequestInfoField::StartTime,
    RequestInfoField::RequestReceivedDuration,
    RequestInfoField::ResponseReceivedDuration,
    RequestInfoField::BytesSent,
    RequestInfoField::BytesReceived,
    RequestInfoField::Protocol,
    RequestInfoField::ResponseCode,
    RequestInfoField::Duration,
    RequestInfoField::ResponseFlag,
    RequestInfoField::ResponseCode,
    RequestInfoField::UpstreamLocalAddress,
    RequestInfoField::DownstreamLocalAddress,
    RequestInfoField::DownstreamRemoteAddress,
    RequestInfoField::UpstreamHostSelected,
];

/// Which header map a header token reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderSide {
    /// Request headers, `REQ.` prefix
    Request,
    /// Response headers, `RESP.` prefix
    Response,
}

impl HeaderSide {
    /// Token prefix corresponding to this side
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Request => REQUEST_HEADER_PREFIX,
            Self::Response => RESPONSE_HEADER_PREFIX,
        }
    }
}

/// A compiled unit of a log format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSegment {
    /// Text copied to the log verbatim
    Literal(String),
    /// A request info field
    Field(RequestInfoField),
    /// A header looked up in the request or response headers
    Header(HeaderSide, HeaderName),
}

impl FormatSegment {
    fn from_token(token: &str) -> Result<Self, InvalidTemplateError> {
        let header = [HeaderSide::Request, HeaderSide::Response]
            .into_iter()
            .find_map(|side| token.strip_prefix(side.prefix()).map(|name| (side, name)));

        if let Some((side, name)) = header {
            if name.is_empty() {
                return Err(InvalidTemplateError::EmptyHeaderName {
                    token: token.to_owned(),
                });
            }
            let name = HeaderName::try_from(name).map_err(|_| {
                InvalidTemplateError::InvalidHeaderName {
                    token: token.to_owned(),
                }
            })?;
            Ok(Self::Header(side, name))
        } else {
            Ok(Self::Field(token.parse()?))
        }
    }
}

/// Parsed representation of a log format template
///
/// Literal text is kept as is, `%Field%` tokens refer to request info fields and
/// `%REQ.name%`/`%RESP.name%` tokens to request and response headers. Compilation fails for
/// unknown fields, so a compiled format can always be rendered.
///
/// Cloning is cheap, the segments are shared.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct CompiledFormat {
    segments: Arc<[FormatSegment]>,
}

impl CompiledFormat {
    const DELIMITER: char = '%';

    /// Compiles a template string
    pub fn compile(template: &str) -> Result<Self, InvalidTemplateError> {
        let mut segments = Vec::new();
        let mut rest = template;
        let mut offset = 0;

        while let Some(start) = rest.find(Self::DELIMITER) {
            if start > 0 {
                segments.push(FormatSegment::Literal(rest[..start].to_owned()));
            }

            let token_start = start + Self::DELIMITER.len_utf8();
            let token_end = rest[token_start..]
                .find(Self::DELIMITER)
                .map(|index| index + token_start)
                .ok_or(InvalidTemplateError::Unclosed {
                    position: offset + start,
                })?;
            segments.push(FormatSegment::from_token(&rest[token_start..token_end])?);

            let next = token_end + Self::DELIMITER.len_utf8();
            offset += next;
            rest = &rest[next..];
        }

        if !rest.is_empty() {
            segments.push(FormatSegment::Literal(rest.to_owned()));
        }

        Ok(Self {
            segments: segments.into(),
        })
    }

    /// The compiled segments in template order
    pub fn segments(&self) -> &[FormatSegment] {
        &self.segments
    }

    /// Checks whether this format produces empty lines only
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl Default for CompiledFormat {
    fn default() -> Self {
        let mut segments = Vec::with_capacity(DEFAULT_FIELDS.len() * 2);
        for field in DEFAULT_FIELDS {
            if !segments.is_empty() {
                segments.push(FormatSegment::Literal(" ".to_owned()));
            }
            segments.push(FormatSegment::Field(field));
        }
        Self {
            segments: segments.into(),
        }
    }
}

impl Display for CompiledFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for segment in self.segments.iter() {
            match segment {
                FormatSegment::Literal(text) => f.write_str(text)?,
                FormatSegment::Field(field) => write!(f, "%{}%", field.name())?,
                FormatSegment::Header(side, name) => write!(f, "%{}{name}%", side.prefix())?,
            }
        }
        Ok(())
    }
}

impl FromStr for CompiledFormat {
    type Err = InvalidTemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl TryFrom<&str> for CompiledFormat {
    type Error = InvalidTemplateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::compile(value)
    }
}

impl TryFrom<String> for CompiledFormat {
    type Error = InvalidTemplateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::compile(&value)
    }
}
