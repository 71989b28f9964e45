use log::{debug, trace};
use serde_json::Value;

use crate::cert::{CertificateExtractor, X509Extractor};
use crate::codec::{nmap_decode_data, nmap_encode_data};
use crate::exchange::{HttpExchange, TlsHandshake};
use crate::http_analyzer::{extract_html_title, owa_versions, HttpListing, ListingExtractor};
use crate::models::{
    GitRepository, HostContext, HttpHeader, HttpTitle, Script, ScriptData, ServiceRecord,
    WebApplication,
};
use crate::parsers::ProbeParser;
use crate::service_fingerprints::{BannerMatcher, ServiceFingerprints};
use crate::ParseError;

const GIT_INDEX_SUFFIX: &str = "/.git/index";
const GIT_INDEX_MAGIC: &str = "DIRC";
const OWA_LOGON_SUFFIX: &str = "/owa/auth/logon.aspx";

/// Parser for zgrab `http` module results
///
/// Two request paths are treated as signature checks rather than plain
/// page fetches: an exposed `/.git/index` and the OWA logon page. When the
/// path matches but the response does not confirm the finding, no record
/// is produced at all, not even the generic HTTP one.
pub struct HttpParser {
    certificates: Box<dyn CertificateExtractor>,
    fingerprints: Box<dyn BannerMatcher>,
    listings: Box<dyn ListingExtractor>,
}

impl Default for HttpParser {
    fn default() -> Self {
        Self {
            certificates: Box::new(X509Extractor),
            fingerprints: Box::new(ServiceFingerprints::new()),
            listings: Box::new(HttpListing),
        }
    }
}

impl HttpParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_certificate_extractor(mut self, extractor: impl CertificateExtractor + 'static) -> Self {
        self.certificates = Box::new(extractor);
        self
    }

    pub fn with_banner_matcher(mut self, matcher: impl BannerMatcher + 'static) -> Self {
        self.fingerprints = Box::new(matcher);
        self
    }

    pub fn with_listing_extractor(mut self, extractor: impl ListingExtractor + 'static) -> Self {
        self.listings = Box::new(extractor);
        self
    }

    fn add_certificate(&self, tls: &TlsHandshake, record: &mut ServiceRecord, host: &mut HostContext<'_>) {
        let Some(raw) = tls.leaf_certificate.as_deref() else {
            trace!("TLS handshake without a leaf certificate");
            return;
        };
        let Some((output, certs)) = self.certificates.extract(raw) else {
            return;
        };
        if certs.is_empty() {
            return;
        }
        for cert in &certs {
            self.certificates.add_hostnames(cert, host.hostnames);
        }
        record
            .scripts
            .push(Script::new("ssl-cert", output, ScriptData::SslCert(certs)));
    }

    fn git_index(
        &self,
        exchange: &HttpExchange,
        path: &str,
        mut record: ServiceRecord,
        host: &HostContext<'_>,
    ) -> Result<ServiceRecord, ParseError> {
        if exchange.status_code != Some(200) {
            return Err(ParseError::GitIndexStatus(exchange.status_code));
        }
        if !exchange.body.as_deref().unwrap_or("").starts_with(GIT_INDEX_MAGIC) {
            return Err(ParseError::GitIndexMagic);
        }
        // the index file itself is not decoded, its presence is the finding
        // drops "index" only, so the repository keeps its trailing slash: "/x/.git/"
        let repository = format!("{}:{}{}", host.addr, record.port, &path[..path.len() - 5]);
        debug!("Exposed git repository at {}", repository);
        record.scripts.push(Script::new(
            "http-git",
            format!("\n  {}\n    Git repository found!\n", repository),
            ScriptData::HttpGit(vec![GitRepository {
                repository,
                files_found: vec![".git/index".to_string()],
            }]),
        ));
        Ok(record)
    }

    fn owa(
        &self,
        exchange: &HttpExchange,
        path: &str,
        mut record: ServiceRecord,
    ) -> Result<ServiceRecord, ParseError> {
        if exchange.status_code != Some(200) {
            return Err(ParseError::OwaStatus(exchange.status_code));
        }
        let versions = owa_versions(exchange.body.as_deref().unwrap_or(""));
        let Some(version) = versions.first().cloned() else {
            return Err(ParseError::OwaNoVersion);
        };
        let path = path[..path.len() - 15].to_string();
        let output = if versions.len() > 1 {
            format!(
                "OWA: path {}, version {} (multiple versions found!)",
                path,
                versions.join(" / ")
            )
        } else {
            format!("OWA: path {}, version {}", path, version)
        };
        debug!("{}", output);
        record.scripts.push(Script::new(
            "http-app",
            output,
            ScriptData::HttpApp(vec![WebApplication {
                path,
                application: "OWA".to_string(),
                version,
            }]),
        ));
        Ok(record)
    }

    /// Header, banner, title and listing analysis for any other page
    fn generic(&self, exchange: &HttpExchange, mut record: ServiceRecord) -> ServiceRecord {
        let status = format!("{} {}", exchange.protocol_name, exchange.status_line);

        // zgrab does not keep the header order, so the banner is rebuilt
        // from the pieces nmap signatures care about
        let mut banner = nmap_decode_data(&exchange.protocol_name);
        banner.push(b' ');
        banner.extend(nmap_decode_data(&exchange.status_line));
        banner.extend_from_slice(b"\r\n");

        if let Some(headers) = &exchange.headers {
            let mut http_hdrs = vec![HttpHeader {
                name: "_status".to_string(),
                value: status.clone(),
            }];
            let mut output = vec![status];
            for (name, values) in headers {
                let name = name.replace('_', "-");
                for value in values {
                    output.push(format!("{}: {}", name, value));
                    http_hdrs.push(HttpHeader {
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
            }
            if let Some(method) = &exchange.request.method {
                output.push(String::new());
                output.push(format!("(Request type: {})", method));
            }
            record.scripts.push(Script::new(
                "http-headers",
                output.join("\n"),
                ScriptData::HttpHeaders(http_hdrs),
            ));

            if let Some(server) = exchange.header("server").filter(|values| !values.is_empty()) {
                record.scripts.push(Script::new(
                    "http-server-header",
                    server[0].clone(),
                    ScriptData::HttpServerHeader(server.to_vec()),
                ));
                banner.extend_from_slice(b"Server: ");
                banner.extend(nmap_decode_data(&server[0]));
                banner.extend_from_slice(b"\r\n\r\n");
            }
        }

        if let Some(found) = self.fingerprints.match_banner(&banner, "tcp", "GetRequest") {
            record.apply_match(found);
        }

        if let Some(body) = exchange.body.as_deref().filter(|body| !body.is_empty()) {
            record
                .scripts
                .push(Script::text("http-content", nmap_encode_data(body.as_bytes())));
            if let Some(title) = extract_html_title(body) {
                record.scripts.push(Script::new(
                    "http-title",
                    title,
                    ScriptData::HttpTitle(HttpTitle {
                        title: title.to_string(),
                    }),
                ));
            }
            if let Some(listing) = self.listings.extract(body, exchange.request.url.as_ref()) {
                record.scripts.push(listing);
            }
        }

        record
    }
}

impl ProbeParser for HttpParser {
    fn try_parse(&self, data: &Value, host: &mut HostContext<'_>) -> Result<ServiceRecord, ParseError> {
        let exchange = HttpExchange::reconcile(data)?;
        let tls = exchange.request.tls.as_ref();

        let port = match &exchange.request.url {
            Some(url) => url.port(),
            None if exchange.request.tls_hint => 443,
            None => 80,
        };
        let mut record = ServiceRecord::probed_http(port);

        if let Some(tls) = tls {
            record.service_tunnel = Some("ssl".to_string());
            self.add_certificate(tls, &mut record, host);
        }

        if let Some(path) = exchange.url_path() {
            if path.ends_with(GIT_INDEX_SUFFIX) {
                return self.git_index(&exchange, path, record, host);
            }
            if path.ends_with(OWA_LOGON_SUFFIX) {
                return self.owa(&exchange, path, record);
            }
        }

        Ok(self.generic(&exchange, record))
    }
}
