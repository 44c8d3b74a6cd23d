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

//! Filters deciding whether an exchange should be logged

use enumset::EnumSet;
use http::{HeaderMap, HeaderName};
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::fmt::Debug;
use std::time::Duration;

use crate::request_info::{RequestInfo, ResponseFlag};

/// Decides whether an exchange should be logged
pub trait AccessLogFilter: Debug + Send + Sync {
    /// Returns `true` if the exchange should be logged
    fn decide(&self, request_headers: &HeaderMap, info: &dyn RequestInfo) -> bool;
}

/// How the results of multiple filters are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Log only if all filters agree, evaluation stops at the first rejection
    #[default]
    All,
    /// Log if any filter agrees, evaluation stops at the first acceptance
    Any,
}

/// Comparison operator of numeric filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
}

impl Comparison {
    /// Compares the actual value to the configured one
    pub fn compare<T: PartialOrd>(self, actual: T, configured: T) -> bool {
        match self {
            Self::Eq => actual == configured,
            Self::Ne => actual != configured,
            Self::Lt => actual < configured,
            Self::Le => actual <= configured,
            Self::Gt => actual > configured,
            Self::Ge => actual >= configured,
        }
    }
}

/// Matches the response status code, e.g. `{op: ge, value: 400}`
///
/// Exchanges without a response never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ResponseCodeFilter {
    /// Comparison operator
    pub op: Comparison,
    /// Status code to compare with
    pub value: u16,
}

impl AccessLogFilter for ResponseCodeFilter {
    fn decide(&self, _request_headers: &HeaderMap, info: &dyn RequestInfo) -> bool {
        info.response_code()
            .is_some_and(|code| self.op.compare(code, self.value))
    }
}

/// Matches the total exchange duration in milliseconds, e.g. `{op: gt, millis: 500}`
///
/// Exchanges without a duration never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DurationFilter {
    /// Comparison operator
    pub op: Comparison,
    /// Duration in milliseconds to compare with
    pub millis: u64,
}

impl AccessLogFilter for DurationFilter {
    fn decide(&self, _request_headers: &HeaderMap, info: &dyn RequestInfo) -> bool {
        info.duration()
            .is_some_and(|duration| self.op.compare(duration, Duration::from_millis(self.millis)))
    }
}

/// A parsed regular expression, a leading `!` negates it
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct RegexMatch {
    /// Regular expression to apply to the value
    pub regex: Regex,
    /// If `true`, the result should be negated
    pub negate: bool,
}

impl RegexMatch {
    /// Checks whether the given value is matched
    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value) != self.negate
    }
}

impl PartialEq for RegexMatch {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str() && self.negate == other.negate
    }
}

impl Eq for RegexMatch {}

impl TryFrom<&str> for RegexMatch {
    type Error = regex::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let (regex, negate) = match value.strip_prefix('!') {
            Some(regex) => (regex, true),
            None => (value, false),
        };
        Ok(Self {
            regex: Regex::new(regex)?,
            negate,
        })
    }
}

impl TryFrom<String> for RegexMatch {
    type Error = regex::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().try_into()
    }
}

/// Matches a request header, e.g. `{name: x-debug}` or `{name: user-agent, value: "!bot"}`
///
/// The header has to be present. If a value expression is given, the header value has to match
/// it as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFilter {
    /// Request header to look at
    pub name: HeaderName,
    /// Expression to match the header value against
    pub value: Option<RegexMatch>,
}

impl<'de> Deserialize<'de> for HeaderFilter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as _;

        #[derive(Deserialize)]
        struct Conf {
            name: String,
            #[serde(default)]
            value: Option<RegexMatch>,
        }

        let conf = Conf::deserialize(deserializer)?;
        Ok(Self {
            name: HeaderName::try_from(conf.name).map_err(D::Error::custom)?,
            value: conf.value,
        })
    }
}

impl AccessLogFilter for HeaderFilter {
    fn decide(&self, request_headers: &HeaderMap, _info: &dyn RequestInfo) -> bool {
        let Some(value) = request_headers.get(&self.name) else {
            return false;
        };
        match &self.value {
            Some(regex) => regex.matches(&String::from_utf8_lossy(value.as_bytes())),
            None => true,
        }
    }
}

/// Matches exchanges with any of the listed response flags, e.g. `[UH, UF]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<ResponseFlag>")]
pub struct ResponseFlagFilter {
    /// Flags to look for
    pub flags: EnumSet<ResponseFlag>,
}

impl From<Vec<ResponseFlag>> for ResponseFlagFilter {
    fn from(flags: Vec<ResponseFlag>) -> Self {
        Self {
            flags: flags.into_iter().collect(),
        }
    }
}

impl AccessLogFilter for ResponseFlagFilter {
    fn decide(&self, _request_headers: &HeaderMap, info: &dyn RequestInfo) -> bool {
        !info.response_flags().is_disjoint(self.flags)
    }
}

/// A filter as configured in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterConf {
    /// See [`ResponseCodeFilter`]
    ResponseCode(ResponseCodeFilter),
    /// See [`DurationFilter`]
    Duration(DurationFilter),
    /// See [`HeaderFilter`]
    Header(Box<HeaderFilter>),
    /// See [`ResponseFlagFilter`]
    ResponseFlag(ResponseFlagFilter),
}

impl AccessLogFilter for FilterConf {
    fn decide(&self, request_headers: &HeaderMap, info: &dyn RequestInfo) -> bool {
        match self {
            Self::ResponseCode(filter) => filter.decide(request_headers, info),
            Self::Duration(filter) => filter.decide(request_headers, info),
            Self::Header(filter) => filter.decide(request_headers, info),
            Self::ResponseFlag(filter) => filter.decide(request_headers, info),
        }
    }
}

/// An ordered list of filters combined according to a [`FilterMode`]
///
/// An empty chain lets everything through.
#[derive(Debug, Default)]
pub struct FilterChain {
    mode: FilterMode,
    filters: Vec<Box<dyn AccessLogFilter>>,
}

impl FilterChain {
    /// Creates an empty chain
    pub fn new(mode: FilterMode) -> Self {
        Self {
            mode,
            filters: Vec::new(),
        }
    }

    /// Creates a chain from configured filters
    pub fn from_conf(mode: FilterMode, filters: Vec<FilterConf>) -> Self {
        let mut chain = Self::new(mode);
        for filter in filters {
            chain.push(filter);
        }
        chain
    }

    /// Appends a filter, it will be evaluated after all existing filters
    pub fn push(&mut self, filter: impl AccessLogFilter + 'static) {
        self.filters.push(Box::new(filter));
    }

    /// The combination mode of this chain
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Number of filters in the chain
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Checks whether the chain has no filters
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl AccessLogFilter for FilterChain {
    fn decide(&self, request_headers: &HeaderMap, info: &dyn RequestInfo) -> bool {
        if self.filters.is_empty() {
            return true;
        }

        let mut filters = self.filters.iter();
        match self.mode {
            FilterMode::All => filters.all(|filter| filter.decide(request_headers, info)),
            FilterMode::Any => filters.any(|filter| filter.decide(request_headers, info)),
        }
    }
}
