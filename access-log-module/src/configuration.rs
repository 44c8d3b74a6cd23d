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

//! Structures handling command line options and YAML deserialization for the Access Log Module

use clap::Parser;
use log::trace;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::filter::{FilterConf, FilterMode};
use crate::format::CompiledFormat;

/// Command line options of the access log module
#[derive(Debug, Default, Parser)]
pub struct AccessLogOpt {
    /// Access log file path
    ///
    /// Special values are an empty string (disable logging) and - (write to standard output).
    #[clap(long)]
    pub access_log_file: Option<PathBuf>,

    /// Access log format template, e.g. "%StartTime% %REQ.host% %ResponseCode%"
    #[clap(long, value_parser = CompiledFormat::compile)]
    pub access_log_format: Option<CompiledFormat>,
}

/// Configuration settings of the access log module
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AccessLogConf {
    /// Access log file path
    ///
    /// Special values are an empty string (disable logging) and - (write to standard output).
    pub log_file: PathBuf,

    /// Template of the log lines, see [`DEFAULT_FORMAT`](crate::format::DEFAULT_FORMAT) for
    /// the format used by default
    pub log_format: CompiledFormat,

    /// Whether all filters or any filter has to accept an exchange for it to be logged
    pub filter_mode: FilterMode,

    /// Filters deciding which exchanges are logged, everything is logged if empty
    pub filters: Vec<FilterConf>,
}

impl Default for AccessLogConf {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("-"),
            log_format: CompiledFormat::default(),
            filter_mode: FilterMode::default(),
            filters: Vec::new(),
        }
    }
}

impl AccessLogConf {
    /// Merges the command line options into the current configuration. Any command line options
    /// present overwrite existing settings.
    pub fn merge_with_opt(&mut self, opt: AccessLogOpt) {
        if let Some(log_file) = opt.access_log_file {
            self.log_file = log_file;
        }

        if let Some(log_format) = opt.access_log_format {
            self.log_format = log_format;
        }
    }

    /// Loads configuration from a YAML file
    pub fn load_from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Open {
            path: path.to_owned(),
            source,
        })?;

        let conf: Self = serde_yaml::from_reader(BufReader::new(file))?;
        trace!("Loaded configuration file {}: {conf:#?}", path.display());
        Ok(conf)
    }

    /// Parses configuration from YAML data
    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        let conf = serde_yaml::from_str(data)?;
        trace!("Parsed configuration: {conf:#?}");
        Ok(conf)
    }
}
