use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Port status as reported in a service record
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "filtered")]
    Filtered,
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortStatus::Open => write!(f, "open"),
            PortStatus::Closed => write!(f, "closed"),
            PortStatus::Filtered => write!(f, "filtered"),
        }
    }
}

/// Where a hostname attached to a host record came from
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostnameSource {
    /// Supplied alongside the scan target
    User,
    /// Subject commonName of a served certificate
    CertSubjectCn,
    /// DNS entry of a certificate's subjectAltName extension
    CertSanDns,
}

/// A hostname known for a host, with its parent domains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hostname {
    #[serde(rename = "type")]
    pub source: HostnameSource,
    pub name: String,
    pub domains: Vec<String>,
}

impl Hostname {
    pub fn new(name: &str, source: HostnameSource) -> Self {
        let labels: Vec<&str> = name.split('.').collect();
        let domains = (1..labels.len()).map(|i| labels[i..].join(".")).collect();
        Self {
            source,
            name: name.to_string(),
            domains,
        }
    }
}

/// The record built for one target host
///
/// Owned by the caller. Parsers only ever see it through a [`HostContext`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostRecord {
    pub addr: String,
    pub hostnames: Vec<Hostname>,
    pub ports: Vec<ServiceRecord>,
}

impl HostRecord {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            ..Default::default()
        }
    }

    /// Borrow the parts of the record a probe parser is allowed to touch
    pub fn context(&mut self) -> HostContext<'_> {
        HostContext {
            addr: &self.addr,
            hostnames: &mut self.hostnames,
        }
    }
}

/// Restricted view of a [`HostRecord`] handed to probe parsers: the address
/// is read-only and the hostname list may only be appended to.
#[derive(Debug)]
pub struct HostContext<'a> {
    pub addr: &'a str,
    pub hostnames: &'a mut Vec<Hostname>,
}

/// Service identification fields produced by banner fingerprinting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceMatch {
    pub service_name: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub extrainfo: Option<String>,
    pub ostype: Option<String>,
}

/// Canonical description of one service detected on one port
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRecord {
    pub service_name: String,
    pub service_method: String,
    pub state_state: PortStatus,
    pub state_reason: String,
    pub protocol: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_tunnel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_extrainfo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_ostype: Option<String>,
    pub scripts: Vec<Script>,
}

impl ServiceRecord {
    /// An open TCP port answering HTTP, as established by a probe response
    pub fn probed_http(port: u16) -> Self {
        Self {
            service_name: "http".to_string(),
            service_method: "probed".to_string(),
            state_state: PortStatus::Open,
            state_reason: "response".to_string(),
            protocol: "tcp".to_string(),
            port,
            service_tunnel: None,
            service_product: None,
            service_version: None,
            service_extrainfo: None,
            service_ostype: None,
            scripts: Vec::new(),
        }
    }

    /// Merge fingerprint results into the record; present fields win.
    pub fn apply_match(&mut self, found: ServiceMatch) {
        if let Some(name) = found.service_name {
            self.service_name = name;
        }
        if found.product.is_some() {
            self.service_product = found.product;
        }
        if found.version.is_some() {
            self.service_version = found.version;
        }
        if found.extrainfo.is_some() {
            self.service_extrainfo = found.extrainfo;
        }
        if found.ostype.is_some() {
            self.service_ostype = found.ostype;
        }
    }

    pub fn script(&self, id: &str) -> Option<&Script> {
        self.scripts.iter().find(|s| s.id == id)
    }
}

/// An auxiliary detection result attached to a service record
///
/// Serialized as `{"id": .., "output": .., "<id>": <data>}`; the data key
/// is left out when the script only carries text.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub id: String,
    pub output: String,
    pub data: Option<ScriptData>,
}

impl Script {
    pub fn new(id: &str, output: impl Into<String>, data: ScriptData) -> Self {
        Self {
            id: id.to_string(),
            output: output.into(),
            data: Some(data),
        }
    }

    pub fn text(id: &str, output: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            output: output.into(),
            data: None,
        }
    }
}

impl Serialize for Script {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("output", &self.output)?;
        if let Some(data) = &self.data {
            map.serialize_entry(&self.id, data)?;
        }
        map.end()
    }
}

/// Structured payload of a script, shape depends on the script id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScriptData {
    SslCert(Vec<CertificateInfo>),
    HttpGit(Vec<GitRepository>),
    HttpApp(Vec<WebApplication>),
    HttpHeaders(Vec<HttpHeader>),
    HttpServerHeader(Vec<String>),
    HttpTitle(HttpTitle),
    HttpLs(DirectoryListing),
}

/// SSL/TLS certificate information
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateInfo {
    pub subject: BTreeMap<String, String>,
    pub subject_text: String,
    pub issuer: BTreeMap<String, String>,
    pub issuer_text: String,
    pub serial_number: String,
    pub signature_algorithm: String,
    pub version: u8,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub sha256: String,
    pub san: Vec<String>,
    pub pubkey: PublicKeyInfo,
    pub pem: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicKeyInfo {
    #[serde(rename = "type")]
    pub key_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitRepository {
    pub repository: String,
    #[serde(rename = "files-found")]
    pub files_found: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebApplication {
    pub path: String,
    pub application: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpTitle {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryListing {
    pub volumes: Vec<ListingVolume>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingVolume {
    pub volume: String,
    pub files: Vec<ListingFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingFile {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}
