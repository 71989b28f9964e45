//! Scanner output lines to host records
//!
//! Each input line is one zgrab/zgrab2 JSON document:
//! `{"ip": .., "domain": .., "data": {"<probe>": <result>, ..}}`.

use std::io::BufRead;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde_json::Value;

use crate::models::{HostRecord, Hostname, HostnameSource};
use crate::parsers::ParserRegistry;

/// Settings for an ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    /// Only run these probes; every registered probe when empty
    pub probes: Vec<String>,
    /// Emit host records even when no service was extracted
    pub keep_empty: bool,
}

impl IngestConfig {
    fn wants(&self, probe: &str) -> bool {
        self.probes.is_empty() || self.probes.iter().any(|p| p == probe)
    }
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines: usize,
    pub hosts: usize,
    pub services: usize,
    pub skipped: usize,
}

/// Build the host record for one decoded scanner document
///
/// `None` when the document names no target address.
pub fn host_from_document(doc: &Value, registry: &ParserRegistry, config: &IngestConfig) -> Option<HostRecord> {
    let Some(addr) = doc.get("ip").and_then(Value::as_str) else {
        warn!("Skipping zgrab result without an \"ip\" field");
        return None;
    };
    let mut host = HostRecord::new(addr);
    if let Some(domain) = doc.get("domain").and_then(Value::as_str).filter(|d| !d.is_empty()) {
        host.hostnames.push(Hostname::new(&domain.to_lowercase(), HostnameSource::User));
    }

    let modules = doc.get("data").and_then(Value::as_object);
    for (probe, result) in modules.into_iter().flatten() {
        if !config.wants(probe) {
            continue;
        }
        let Some(parser) = registry.lookup(probe) else {
            debug!("No parser for zgrab module {:?}", probe);
            continue;
        };
        if let Some(record) = parser.parse(result, &mut host.context()) {
            debug!("{}: {}/{} {} ({})", addr, record.port, record.protocol, record.state_state, record.service_name);
            host.ports.push(record);
        }
    }
    Some(host)
}

/// Run every line of `input` through the registry, handing each resulting
/// host record to `emit`
pub fn ingest<R, F>(input: R, registry: &ParserRegistry, config: &IngestConfig, mut emit: F) -> Result<IngestStats>
where
    R: BufRead,
    F: FnMut(&HostRecord) -> Result<()>,
{
    let mut stats = IngestStats::default();
    for (index, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read input line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;

        let doc: Value = match serde_json::from_str(&line) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Skipping line {}: invalid JSON ({})", index + 1, e);
                stats.skipped += 1;
                continue;
            }
        };
        let Some(host) = host_from_document(&doc, registry, config) else {
            stats.skipped += 1;
            continue;
        };
        if host.ports.is_empty() && !config.keep_empty {
            continue;
        }
        stats.hosts += 1;
        stats.services += host.ports.len();
        emit(&host)?;
    }
    info!(
        "Processed {} lines: {} hosts, {} services, {} skipped",
        stats.lines, stats.hosts, stats.services, stats.skipped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn http_result(status_code: u16) -> Value {
        json!({
            "status": "success",
            "protocol": "http",
            "result": {"response": {
                "request": {"method": "GET", "url": {"scheme": "http", "host": "192.0.2.7", "path": "/"}},
                "status_code": status_code,
                "status_line": "200 OK",
                "protocol": {"name": "HTTP/1.1"}
            }}
        })
    }

    #[test]
    fn document_becomes_host_record() {
        let doc = json!({"ip": "192.0.2.7", "domain": "WWW.Example.org", "data": {"http": http_result(200)}});
        let host = host_from_document(&doc, &ParserRegistry::new(), &IngestConfig::default()).unwrap();
        assert_eq!(host.addr, "192.0.2.7");
        assert_eq!(host.hostnames[0].name, "www.example.org");
        assert_eq!(host.hostnames[0].source, HostnameSource::User);
        assert_eq!(host.ports.len(), 1);
        assert_eq!(host.ports[0].port, 80);
    }

    #[test]
    fn unknown_and_filtered_probes_are_skipped() {
        let doc = json!({"ip": "192.0.2.7", "data": {"ssh": {"banner": "SSH-2.0-x"}, "http": http_result(200)}});
        let registry = ParserRegistry::new();
        let config = IngestConfig {
            probes: vec!["ssh".to_string()],
            keep_empty: false,
        };
        let host = host_from_document(&doc, &registry, &config).unwrap();
        assert!(host.ports.is_empty());
    }

    #[test]
    fn document_without_ip_is_rejected() {
        let doc = json!({"data": {"http": http_result(200)}});
        assert!(host_from_document(&doc, &ParserRegistry::new(), &IngestConfig::default()).is_none());
    }

    #[test]
    fn ingest_counts_lines() {
        let good = json!({"ip": "192.0.2.7", "data": {"http": http_result(200)}}).to_string();
        let empty = json!({"ip": "192.0.2.8", "data": {"http": {}}}).to_string();
        let input = format!("{}\n\nnot json\n{}\n{{\"data\": {{}}}}\n", good, empty);

        let mut seen = Vec::new();
        let stats = ingest(input.as_bytes(), &ParserRegistry::new(), &IngestConfig::default(), |host| {
            seen.push(host.addr.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["192.0.2.7"]);
        assert_eq!(
            stats,
            IngestStats {
                lines: 4,
                hosts: 1,
                services: 1,
                skipped: 2
            }
        );
    }
}
