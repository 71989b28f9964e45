use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::debug;
use ::oid_registry::Oid;
use regex::Regex;
use sha2::{Digest, Sha256};
use x509_parser::extensions::GeneralName;
use x509_parser::objects::{oid2sn, oid_registry as known_oids};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::models::{CertificateInfo, Hostname, HostnameSource, PublicKeyInfo};

lazy_static! {
    static ref HOSTNAME: Regex = Regex::new(r"^[a-z0-9_.\-]+$").unwrap();
}

/// Turns a served certificate into report text and structured fields, and
/// harvests the hostnames it vouches for.
pub trait CertificateExtractor: Send + Sync {
    /// Decode a base64 DER certificate. `None` when it cannot be parsed.
    fn extract(&self, b64_der: &str) -> Option<(String, Vec<CertificateInfo>)>;

    /// Append the hostnames named by `cert` to `hostnames`
    fn add_hostnames(&self, cert: &CertificateInfo, hostnames: &mut Vec<Hostname>) {
        add_cert_hostnames(cert, hostnames);
    }
}

/// Default extractor backed by `x509-parser`
#[derive(Debug, Default, Clone, Copy)]
pub struct X509Extractor;

impl CertificateExtractor for X509Extractor {
    fn extract(&self, b64_der: &str) -> Option<(String, Vec<CertificateInfo>)> {
        let compact: String = b64_der.split_whitespace().collect();
        let der = match STANDARD.decode(compact.as_bytes()) {
            Ok(der) => der,
            Err(e) => {
                debug!("Certificate is not valid base64: {}", e);
                return None;
            }
        };
        let info = parse_certificate(&der)?;
        let output = format_certificate(&info);
        Some((output, vec![info]))
    }
}

/// Parse an X.509 certificate and extract information
pub fn parse_certificate(cert_der: &[u8]) -> Option<CertificateInfo> {
    let cert = match x509_parser::parse_x509_certificate(cert_der) {
        Ok((_, cert)) => cert,
        Err(e) => {
            debug!("Failed to parse certificate: {}", e);
            return None;
        }
    };

    let (subject, subject_text) = name_fields(cert.subject());
    let (issuer, issuer_text) = name_fields(cert.issuer());

    let version = u8::try_from(cert.version().0 + 1).unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(cert_der);
    let sha256 = format!("{:x}", hasher.finalize());

    let san = match cert.subject_alternative_name() {
        Ok(Some(ext)) => ext
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(format!("DNS:{}", dns)),
                GeneralName::IPAddress(ip) => format_ip(ip).map(|ip| format!("IP:{}", ip)),
                GeneralName::RFC822Name(mail) => Some(format!("email:{}", mail)),
                GeneralName::URI(uri) => Some(format!("URI:{}", uri)),
                _ => None,
            })
            .collect(),
        Ok(None) => Vec::new(),
        Err(e) => {
            debug!("Ignoring malformed subjectAltName: {}", e);
            Vec::new()
        }
    };

    let pubkey = match cert.public_key().parsed() {
        Ok(PublicKey::RSA(rsa)) => key_info("rsa", Some(rsa.key_size())),
        Ok(PublicKey::EC(ec)) => key_info("ec", Some(ec.key_size())),
        Ok(PublicKey::DSA(_)) => key_info("dsa", None),
        Ok(PublicKey::GostR3410(_)) | Ok(PublicKey::GostR3410_2012(_)) => key_info("gost", None),
        _ => key_info("unknown", None),
    };

    Some(CertificateInfo {
        subject,
        subject_text,
        issuer,
        issuer_text,
        serial_number: cert.raw_serial_as_string().replace(':', ""),
        signature_algorithm: short_name(&cert.signature_algorithm.algorithm),
        version,
        not_before: to_utc(cert.validity().not_before),
        not_after: to_utc(cert.validity().not_after),
        sha256,
        san,
        pubkey,
        pem: to_pem(cert_der),
    })
}

/// Render a certificate the way Nmap's ssl-cert script does
pub fn format_certificate(info: &CertificateInfo) -> String {
    let mut lines = vec![format!("Subject: {}", info.subject_text)];
    if !info.san.is_empty() {
        lines.push(format!("Subject Alternative Name: {}", info.san.join(", ")));
    }
    lines.push(format!("Issuer: {}", info.issuer_text));
    lines.push(format!("Public Key type: {}", info.pubkey.key_type));
    if let Some(bits) = info.pubkey.bits {
        lines.push(format!("Public Key bits: {}", bits));
    }
    lines.push(format!("Signature Algorithm: {}", info.signature_algorithm));
    lines.push(format!("Not valid before: {}", info.not_before.format("%Y-%m-%dT%H:%M:%S")));
    lines.push(format!("Not valid after:  {}", info.not_after.format("%Y-%m-%dT%H:%M:%S")));
    lines.push(format!("SHA-256: {}", info.sha256));
    lines.push(info.pem.trim_end().to_string());
    lines.join("\n")
}

/// Append the subject commonName and the DNS subjectAltNames of `cert`
///
/// Duplicates already present in `hostnames` are kept.
pub fn add_cert_hostnames(cert: &CertificateInfo, hostnames: &mut Vec<Hostname>) {
    if let Some(cn) = cert.subject.get("commonName") {
        add_hostname(cn, HostnameSource::CertSubjectCn, hostnames);
    }
    for san in &cert.san {
        if let Some(dns) = san.strip_prefix("DNS:") {
            add_hostname(dns, HostnameSource::CertSanDns, hostnames);
        }
    }
}

fn add_hostname(name: &str, source: HostnameSource, hostnames: &mut Vec<Hostname>) {
    let name = name.trim_end_matches('.').to_lowercase();
    let name = name.strip_prefix("*.").unwrap_or(&name);
    if name.is_empty() || !HOSTNAME.is_match(name) {
        debug!("Skipping certificate name {:?}", name);
        return;
    }
    hostnames.push(Hostname::new(name, source));
}

fn name_fields(name: &X509Name<'_>) -> (BTreeMap<String, String>, String) {
    let mut fields = BTreeMap::new();
    let mut text = Vec::new();
    for attr in name.iter_attributes() {
        let key = short_name(attr.attr_type());
        let value = match attr.as_str() {
            Ok(value) => value.to_string(),
            Err(_) => String::from_utf8_lossy(attr.attr_value().data).into_owned(),
        };
        text.push(format!("{}={}", key, value));
        fields.insert(key, value);
    }
    (fields, text.join("/"))
}

fn short_name(oid: &Oid<'_>) -> String {
    oid2sn(oid, known_oids())
        .map(str::to_string)
        .unwrap_or_else(|_| oid.to_id_string())
}

fn key_info(key_type: &str, bits: Option<usize>) -> PublicKeyInfo {
    PublicKeyInfo {
        key_type: key_type.to_string(),
        bits: bits.filter(|b| *b > 0).and_then(|b| u32::try_from(b).ok()),
    }
}

fn to_utc(time: ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

fn format_ip(raw: &[u8]) -> Option<String> {
    match raw.len() {
        4 => {
            let octets: [u8; 4] = raw.try_into().ok()?;
            Some(std::net::Ipv4Addr::from(octets).to_string())
        }
        16 => {
            let octets: [u8; 16] = raw.try_into().ok()?;
            Some(std::net::Ipv6Addr::from(octets).to_string())
        }
        _ => None,
    }
}

fn to_pem(der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}
