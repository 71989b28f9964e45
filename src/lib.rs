//! Turns zgrab / zgrab2 probe output into host inventory service records.

pub mod cert;
pub mod codec;
pub mod exchange;
pub mod http_analyzer;
pub mod http_parser;
pub mod ingest;
pub mod models;
pub mod output;
pub mod parsers;
pub mod service_fingerprints;

pub use http_parser::HttpParser;
pub use models::{HostContext, HostRecord, Hostname, HostnameSource, Script, ScriptData, ServiceRecord};
pub use parsers::{ParserRegistry, ProbeParser};

use thiserror::Error;

/// Why a probe result produced no service record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty zgrab result")]
    Empty,

    #[error("Missing field{} {} in zgrab HTTP result", plural(.0), quoted(.0))]
    MissingFields(Vec<&'static str>),

    #[error("Git index request answered with status {0:?}")]
    GitIndexStatus(Option<u16>),

    #[error("Git index response does not start with DIRC")]
    GitIndexMagic,

    #[error("OWA logon page answered with status {0:?}")]
    OwaStatus(Option<u16>),

    #[error("No OWA version found in logon page")]
    OwaNoVersion,
}

impl ParseError {
    /// Input that does not look like a complete probe result at all
    pub fn is_malformed(&self) -> bool {
        matches!(self, ParseError::MissingFields(_))
    }
}

fn plural(fields: &[&str]) -> &'static str {
    if fields.len() > 1 {
        "s"
    } else {
        ""
    }
}

fn quoted(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| format!("'{}'", f))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_message() {
        assert_eq!(
            ParseError::MissingFields(vec!["status_line"]).to_string(),
            "Missing field 'status_line' in zgrab HTTP result"
        );
        assert_eq!(
            ParseError::MissingFields(vec!["request", "status_code"]).to_string(),
            "Missing fields 'request', 'status_code' in zgrab HTTP result"
        );
    }
}
