use log::{debug, trace};
use regex::bytes::{Captures, Regex};

use crate::models::ServiceMatch;

/// Matches a reconstructed banner against service signatures
pub trait BannerMatcher: Send + Sync {
    /// `protocol` and `probe` select which signatures apply, e.g. `("tcp", "GetRequest")`
    fn match_banner(&self, banner: &[u8], protocol: &str, probe: &str) -> Option<ServiceMatch>;
}

/// One signature: a pattern plus templates filled from its capture groups
struct Signature {
    protocol: &'static str,
    probe: &'static str,
    pattern: Regex,
    service: &'static str,
    product: Option<&'static str>,
    version: Option<&'static str>,
    extrainfo: Option<&'static str>,
    ostype: Option<&'static str>,
}

impl Signature {
    fn apply(&self, captures: &Captures<'_>) -> ServiceMatch {
        let fill = |template: Option<&'static str>| {
            template
                .map(|t| expand_template(t, captures))
                .filter(|value| !value.is_empty())
        };
        ServiceMatch {
            service_name: Some(self.service.to_string()),
            product: fill(self.product),
            version: fill(self.version),
            extrainfo: fill(self.extrainfo),
            ostype: self.ostype.map(str::to_string),
        }
    }
}

type SignatureDef = (
    &'static str,
    &'static str,
    &'static str,
    &'static str,
    Option<&'static str>,
    Option<&'static str>,
    Option<&'static str>,
    Option<&'static str>,
);

/// Built-in signature database for HTTP responses to a plain GET
const SIGNATURE_DEFS: &[SignatureDef] = &[
    // (protocol, probe, pattern, service, product, version, extrainfo, ostype)
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: Apache/([\d.]+) \(([^)\r\n]+)\)", "http", Some("Apache httpd"), Some("$1"), Some("$2"), None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: Apache/([\d.]+)", "http", Some("Apache httpd"), Some("$1"), None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: Apache\r\n", "http", Some("Apache httpd"), None, None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: nginx/([\d.]+)", "http", Some("nginx"), Some("$1"), None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: nginx\r\n", "http", Some("nginx"), None, None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: openresty/([\d.]+)", "http", Some("OpenResty web app server"), Some("$1"), None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: Microsoft-IIS/([\d.]+)", "http", Some("Microsoft IIS httpd"), Some("$1"), None, Some("Windows")),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: Microsoft-HTTPAPI/([\d.]+)", "http", Some("Microsoft HTTPAPI httpd"), Some("$1"), Some("SSDP/UPnP"), Some("Windows")),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: lighttpd/([\d.]+)", "http", Some("lighttpd"), Some("$1"), None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: Jetty\(([\w._-]+)\)", "http", Some("Jetty"), Some("$1"), None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: Caddy\r\n", "http", Some("Caddy httpd"), None, None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: gunicorn/([\d.]+)", "http", Some("Gunicorn"), Some("$1"), None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: Werkzeug/([\d.]+) Python/([\d.]+)", "http", Some("Werkzeug httpd"), Some("$1"), Some("Python $2"), None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: lwIP/([\d.]+)", "http", Some("lwIP httpd"), Some("$1"), None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: Boa/([\d.]+)", "http", Some("Boa HTTPd"), Some("$1"), None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: MiniServ/([\d.]+)", "http", Some("MiniServ"), Some("$1"), Some("Webmin httpd"), None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: Kestrel\r\n", "http", Some("Microsoft Kestrel httpd"), None, None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: CouchDB/([\d.]+)", "http", Some("CouchDB httpd"), Some("$1"), None, None),
    ("tcp", "GetRequest", r"(?s-u)^HTTP/1\.[01] \d\d\d .*\r\nServer: squid/([\d.]+)", "http-proxy", Some("Squid http proxy"), Some("$1"), None, None),
];

/// Service fingerprint database for identifying services and versions
pub struct ServiceFingerprints {
    signatures: Vec<Signature>,
}

impl ServiceFingerprints {
    /// Create a fingerprint database with the built-in signatures
    pub fn new() -> Self {
        let mut signatures = Vec::with_capacity(SIGNATURE_DEFS.len());
        for &(protocol, probe, pattern, service, product, version, extrainfo, ostype) in SIGNATURE_DEFS {
            match Regex::new(pattern) {
                Ok(pattern) => signatures.push(Signature {
                    protocol,
                    probe,
                    pattern,
                    service,
                    product,
                    version,
                    extrainfo,
                    ostype,
                }),
                Err(e) => debug!("Failed to compile regex pattern {}: {}", pattern, e),
            }
        }
        Self { signatures }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl Default for ServiceFingerprints {
    fn default() -> Self {
        Self::new()
    }
}

impl BannerMatcher for ServiceFingerprints {
    fn match_banner(&self, banner: &[u8], protocol: &str, probe: &str) -> Option<ServiceMatch> {
        let found = self
            .signatures
            .iter()
            .filter(|sig| sig.protocol == protocol && sig.probe == probe)
            .find_map(|sig| sig.pattern.captures(banner).map(|caps| sig.apply(&caps)));
        match &found {
            Some(m) => debug!(
                "Banner matched {} ({} {})",
                m.service_name.as_deref().unwrap_or("?"),
                m.product.as_deref().unwrap_or(""),
                m.version.as_deref().unwrap_or("")
            ),
            None => trace!("No signature matched {}/{} banner", protocol, probe),
        }
        found
    }
}

/// Replace `$N` references with the matching capture group
fn expand_template(template: &str, captures: &Captures<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek().and_then(|d| d.to_digit(10))) {
            ('$', Some(group)) => {
                chars.next();
                if let Some(m) = captures.get(group as usize) {
                    out.push_str(&String::from_utf8_lossy(m.as_bytes()));
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(banner: &[u8]) -> Option<ServiceMatch> {
        ServiceFingerprints::new().match_banner(banner, "tcp", "GetRequest")
    }

    #[test]
    fn all_signatures_compile() {
        assert_eq!(ServiceFingerprints::new().len(), SIGNATURE_DEFS.len());
    }

    #[test]
    fn apache_with_os_comment() {
        let found = get(b"HTTP/1.1 200 OK\r\nServer: Apache/2.4.41 (Ubuntu)\r\n\r\n").unwrap();
        assert_eq!(found.service_name.as_deref(), Some("http"));
        assert_eq!(found.product.as_deref(), Some("Apache httpd"));
        assert_eq!(found.version.as_deref(), Some("2.4.41"));
        assert_eq!(found.extrainfo.as_deref(), Some("Ubuntu"));
    }

    #[test]
    fn iis_sets_ostype() {
        let found = get(b"HTTP/1.1 302 Found\r\nServer: Microsoft-IIS/10.0\r\n\r\n").unwrap();
        assert_eq!(found.product.as_deref(), Some("Microsoft IIS httpd"));
        assert_eq!(found.version.as_deref(), Some("10.0"));
        assert_eq!(found.ostype.as_deref(), Some("Windows"));
    }

    #[test]
    fn probe_and_protocol_must_agree() {
        let banner = b"HTTP/1.1 200 OK\r\nServer: nginx/1.18.0\r\n\r\n";
        let db = ServiceFingerprints::new();
        assert!(db.match_banner(banner, "udp", "GetRequest").is_none());
        assert!(db.match_banner(banner, "tcp", "NULL").is_none());
        assert_eq!(get(banner).unwrap().version.as_deref(), Some("1.18.0"));
    }

    #[test]
    fn unknown_server_does_not_match() {
        assert!(get(b"HTTP/1.1 200 OK\r\nServer: homegrown\r\n\r\n").is_none());
        assert!(get(b"HTTP/1.1 200 OK\r\n").is_none());
    }
}
