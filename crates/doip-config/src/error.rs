//! Configuration failure taxonomy
//!
//! Every variant carries enough context to point the operator at the
//! offending file and key. Any of these aborts startup.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {path}")]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{path}: {message}")]
    Schema { path: PathBuf, message: String },

    #[error("{path}: ECU '{ecu}' references unknown service '{service}' in {section}")]
    Reference {
        path: PathBuf,
        ecu: String,
        service: String,
        section: &'static str,
    },

    #[error("duplicate target address 0x{address:04X} declared by ECUs '{first}' and '{second}'")]
    DuplicateTarget {
        address: u16,
        first: String,
        second: String,
    },

    #[error(
        "ECU '{ecu}': services '{first}' and '{second}' would shadow each other \
         on request pattern '{pattern}'"
    )]
    DuplicateService {
        ecu: String,
        first: String,
        second: String,
        pattern: String,
    },

    #[error("{path}: service '{service}': invalid hex '{value}'")]
    BadHex {
        path: PathBuf,
        service: String,
        value: String,
    },

    #[error("{path}: service '{service}': invalid regex '{pattern}'")]
    BadRegex {
        path: PathBuf,
        service: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
