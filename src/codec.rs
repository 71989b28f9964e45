//! Nmap fingerprint escaping
//!
//! Raw probe bytes are stored as text using the escape conventions of Nmap
//! service fingerprints, so that arbitrary binary data survives JSON.

/// Encode raw bytes as fingerprint-escaped text
pub fn nmap_encode_data(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &byte in data {
        match byte {
            b'\\' => out.push_str("\\\\"),
            0 => out.push_str("\\0"),
            7 => out.push_str("\\a"),
            8 => out.push_str("\\b"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            11 => out.push_str("\\v"),
            12 => out.push_str("\\f"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out
}

/// Decode fingerprint-escaped text back to raw bytes
///
/// Unknown escapes and truncated `\x` sequences are kept literally.
pub fn nmap_decode_data(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 == bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let decoded = match bytes[i + 1] {
            b'\\' => Some(b'\\'),
            b'0' => Some(0),
            b'a' => Some(7),
            b'b' => Some(8),
            b't' => Some(b'\t'),
            b'n' => Some(b'\n'),
            b'v' => Some(11),
            b'f' => Some(12),
            b'r' => Some(b'\r'),
            b'x' => {
                let hex = bytes
                    .get(i + 2..i + 4)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok());
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(value) => {
                        out.push(value);
                        i += 4;
                        continue;
                    }
                    None => None,
                }
            }
            _ => None,
        };
        match decoded {
            Some(value) => {
                out.push(value);
                i += 2;
            }
            None => {
                out.push(b'\\');
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_text_is_unchanged() {
        assert_eq!(nmap_encode_data(b"HTTP/1.1 200 OK"), "HTTP/1.1 200 OK");
        assert_eq!(nmap_decode_data("HTTP/1.1 200 OK"), b"HTTP/1.1 200 OK");
    }

    #[test]
    fn control_and_high_bytes_are_escaped() {
        assert_eq!(nmap_encode_data(b"a\r\n\0\\"), "a\\r\\n\\0\\\\");
        assert_eq!(nmap_encode_data("é".as_bytes()), "\\xc3\\xa9");
    }

    #[test]
    fn decode_inverts_encode() {
        let raw: Vec<u8> = (0..=255).collect();
        assert_eq!(nmap_decode_data(&nmap_encode_data(&raw)), raw);
    }

    #[test]
    fn malformed_escapes_stay_literal() {
        assert_eq!(nmap_decode_data("\\q\\x4"), b"\\q\\x4");
        assert_eq!(nmap_decode_data("end\\"), b"end\\");
        assert_eq!(nmap_decode_data("\\x41\\x7E"), b"A~");
    }
}
