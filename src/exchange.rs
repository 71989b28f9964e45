//! Reconciliation of the two zgrab HTTP output layouts
//!
//! zgrab and zgrab2 nest the same HTTP exchange differently: zgrab2 wraps
//! everything in a `result` object and keeps the TLS handshake under
//! `tls_log.handshake_log` instead of `tls_handshake`. [`HttpExchange`]
//! is the single working shape both are mapped to before any analysis.

use serde_json::{Map, Value};

use crate::ParseError;

/// Fields every usable response must carry
const REQUIRED_RESPONSE_FIELDS: [&str; 3] = ["request", "status_code", "status_line"];

/// Output layout a TLS handshake was found in
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchemaVersion {
    /// `request.tls_handshake`
    Zgrab,
    /// `request.tls_log.handshake_log`
    Zgrab2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsHandshake {
    pub schema: SchemaVersion,
    /// Base64 DER of the leaf certificate, when the server sent one
    pub leaf_certificate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestUrl {
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub path: Option<String>,
}

impl RequestUrl {
    /// Port given explicitly in the host component, if it parses
    pub fn explicit_port(&self) -> Option<u16> {
        let (_, port) = self.host.as_deref()?.split_once(':')?;
        port.parse().ok()
    }

    /// Port the request was sent to: explicit, else the scheme default
    pub fn port(&self) -> u16 {
        self.explicit_port().unwrap_or(match self.scheme.as_deref() {
            Some("https") => 443,
            _ => 80,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Option<String>,
    pub url: Option<RequestUrl>,
    pub tls: Option<TlsHandshake>,
    /// `tls_handshake` or `tls_log` carries any content. Only used to pick
    /// the port when the request has no URL; an empty handshake object
    /// still marks the tunnel but does not imply 443.
    pub tls_hint: bool,
}

/// One reconciled HTTP request/response pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpExchange {
    pub request: HttpRequest,
    pub status_code: Option<u16>,
    pub status_line: String,
    pub protocol_name: String,
    /// Header values in response order, `unknown` entries already folded in.
    /// `None` when the response had no headers at all.
    pub headers: Option<Vec<(String, Vec<String>)>>,
    pub body: Option<String>,
}

impl HttpExchange {
    /// Map a raw probe result of either layout onto the working shape
    pub fn reconcile(raw: &Value) -> Result<Self, ParseError> {
        let top = match raw.as_object() {
            Some(obj) if !obj.is_empty() => lift_result(obj),
            _ => return Err(ParseError::Empty),
        };

        let response = match top.get("response").and_then(Value::as_object) {
            Some(response) => response,
            None => return Err(ParseError::MissingFields(vec!["response"])),
        };
        let missing: Vec<&'static str> = REQUIRED_RESPONSE_FIELDS
            .iter()
            .copied()
            .filter(|field| response.get(*field).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            return Err(ParseError::MissingFields(missing));
        }

        let request = response.get("request").map(parse_request).unwrap_or_default();
        let status_code = response
            .get("status_code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok());

        Ok(Self {
            request,
            status_code,
            status_line: string_at(response, "status_line").unwrap_or_default(),
            protocol_name: response
                .get("protocol")
                .and_then(Value::as_object)
                .and_then(|protocol| string_at(protocol, "name"))
                .unwrap_or_default(),
            headers: response
                .get("headers")
                .and_then(Value::as_object)
                .filter(|headers| !headers.is_empty())
                .map(flatten_headers),
            body: string_at(response, "body"),
        })
    }

    /// Values of a header, looked up by its exact output name
    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers
            .as_ref()?
            .iter()
            .find(|(header, _)| header == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn url_path(&self) -> Option<&str> {
        self.request.url.as_ref()?.path.as_deref()
    }
}

/// zgrab2 puts the payload under `result`; its keys win over top-level ones.
fn lift_result(obj: &Map<String, Value>) -> Map<String, Value> {
    let mut top: Map<String, Value> = obj
        .iter()
        .filter(|(key, _)| key.as_str() != "result")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if let Some(result) = obj.get("result").and_then(Value::as_object) {
        for (key, value) in result {
            top.insert(key.clone(), value.clone());
        }
    }
    top
}

fn parse_request(raw: &Value) -> HttpRequest {
    let Some(request) = raw.as_object() else {
        return HttpRequest::default();
    };

    let url = request
        .get("url")
        .and_then(Value::as_object)
        .filter(|url| !url.is_empty())
        .map(|url| RequestUrl {
            scheme: string_at(url, "scheme"),
            host: string_at(url, "host"),
            path: string_at(url, "path"),
        });

    let tls = non_null(request.get("tls_handshake"))
        .map(|handshake| (SchemaVersion::Zgrab, handshake))
        .or_else(|| {
            non_null(request.get("tls_log").and_then(|log| log.get("handshake_log")))
                .map(|handshake| (SchemaVersion::Zgrab2, handshake))
        })
        .map(|(schema, handshake)| TlsHandshake {
            schema,
            leaf_certificate: handshake
                .pointer("/server_certificates/certificate/raw")
                .and_then(Value::as_str)
                .map(str::to_string),
        });

    let tls_hint = ["tls_handshake", "tls_log"]
        .iter()
        .any(|key| request.get(*key).map_or(false, has_content));

    HttpRequest {
        method: string_at(request, "method").filter(|method| !method.is_empty()),
        url,
        tls,
        tls_hint,
    }
}

fn flatten_headers(raw: &Map<String, Value>) -> Vec<(String, Vec<String>)> {
    let mut headers: Vec<(String, Vec<String>)> = raw
        .iter()
        .filter(|(name, _)| name.as_str() != "unknown")
        .map(|(name, values)| (name.clone(), header_values(values)))
        .collect();

    let unknown = raw.get("unknown").and_then(Value::as_array);
    for entry in unknown.into_iter().flatten() {
        let Some(key) = entry.get("key").and_then(Value::as_str) else {
            continue;
        };
        let values = entry.get("value").map(header_values).unwrap_or_default();
        match headers.iter_mut().find(|(name, _)| name == key) {
            Some((_, existing)) => *existing = values,
            None => headers.push((key.to_string(), values)),
        }
    }
    headers
}

fn header_values(raw: &Value) -> Vec<String> {
    match raw {
        Value::String(value) => vec![value.clone()],
        Value::Array(values) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Null, false, zero and empty strings or containers count as absent
fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn string_at(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}
