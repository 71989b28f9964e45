use std::collections::HashMap;

use log::{debug, warn};
use serde_json::Value;

use crate::http_parser::HttpParser;
use crate::models::{HostContext, ServiceRecord};
use crate::ParseError;

/// Converts one probe module's raw output into a service record
pub trait ProbeParser: Send + Sync {
    /// Parse `data`, reporting why nothing could be extracted
    fn try_parse(&self, data: &Value, host: &mut HostContext<'_>) -> Result<ServiceRecord, ParseError>;

    /// Parse `data`; `None` stands for "nothing could be extracted"
    ///
    /// Malformed results are logged as warnings, expected rejections only
    /// at debug level.
    fn parse(&self, data: &Value, host: &mut HostContext<'_>) -> Option<ServiceRecord> {
        match self.try_parse(data, host) {
            Ok(record) => Some(record),
            Err(e) if e.is_malformed() => {
                warn!("{}", e);
                None
            }
            Err(e) => {
                debug!("No record for {}: {}", host.addr, e);
                None
            }
        }
    }
}

/// Probe name to parser mapping
///
/// Built once, then only read; share it by reference between workers.
pub struct ParserRegistry {
    parsers: HashMap<String, Box<dyn ProbeParser>>,
}

impl ParserRegistry {
    /// Registry with every built-in parser
    pub fn new() -> Self {
        Self::empty().with_parser("http", HttpParser::default())
    }

    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Register `parser` for `probe`, replacing any previous one
    pub fn with_parser(mut self, probe: &str, parser: impl ProbeParser + 'static) -> Self {
        self.parsers.insert(probe.to_string(), Box::new(parser));
        self
    }

    pub fn lookup(&self, probe: &str) -> Option<&dyn ProbeParser> {
        self.parsers.get(probe).map(|parser| parser.as_ref())
    }

    /// Registered probe names, sorted
    pub fn probes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HostRecord;
    use serde_json::json;

    struct Rejecting;

    impl ProbeParser for Rejecting {
        fn try_parse(&self, _: &Value, _: &mut HostContext<'_>) -> Result<ServiceRecord, ParseError> {
            Err(ParseError::Empty)
        }
    }

    #[test]
    fn only_http_is_built_in() {
        let registry = ParserRegistry::new();
        assert_eq!(registry.probes(), vec!["http"]);
        assert!(registry.lookup("http").is_some());
        assert!(registry.lookup("ssh").is_none());
        assert!(registry.lookup("HTTP").is_none());
    }

    #[test]
    fn registered_parser_is_dispatched() {
        let registry = ParserRegistry::new().with_parser("tls", Rejecting);
        assert_eq!(registry.probes(), vec!["http", "tls"]);

        let mut host = HostRecord::new("192.0.2.1");
        let parser = registry.lookup("tls").unwrap();
        assert!(parser.parse(&json!({"anything": 1}), &mut host.context()).is_none());
    }
}
