use std::cmp::Ordering;
use std::collections::HashSet;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::exchange::RequestUrl;
use crate::models::{DirectoryListing, ListingFile, ListingVolume, Script, ScriptData};

lazy_static! {
    static ref TITLE: Regex = Regex::new(r"(?i)<title[^>]*>([^<]*?)</title>").unwrap();
    static ref OWA_VERSION: Regex = Regex::new(r"/owa/(?:auth/)?((?:[0-9]+\.)+[0-9]+)/").unwrap();
    static ref INDEX_OF: Regex =
        Regex::new(r"(?i)<title[^>]*>\s*(?:index\s+of|directory\s+listing\s+(?:of|for))").unwrap();
    static ref LISTING_ENTRY: Regex = Regex::new(
        r#"(?i)<a\s+href="([^"]+)"[^>]*>[^<]*</a>(?:\s*</td>\s*<td[^>]*>)?\s*([0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}|[0-9]{2}-[a-z]{3}-[0-9]{4} [0-9]{2}:[0-9]{2})?(?:\s*</td>\s*<td[^>]*>)?\s*([0-9.]+[KMGT]?|-)?"#
    )
    .unwrap();
}

/// Extract the HTML title from a response body
///
/// Only the first `<title>` element counts; the text is returned untrimmed.
pub fn extract_html_title(body: &str) -> Option<&str> {
    TITLE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// All distinct Outlook Web Access versions referenced in a page, smallest first
pub fn owa_versions(body: &str) -> Vec<String> {
    let distinct: HashSet<&str> = OWA_VERSION
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();
    let mut versions: Vec<String> = distinct.into_iter().map(str::to_string).collect();
    versions.sort_by(|a, b| compare_versions(a, b));
    versions
}

/// Order dotted versions by their numeric components
fn compare_versions(a: &str, b: &str) -> Ordering {
    let parts = |v: &str| -> Vec<u64> { v.split('.').map(|n| n.parse().unwrap_or(u64::MAX)).collect() };
    parts(a).cmp(&parts(b)).then_with(|| a.cmp(b))
}

/// Recognizes directory listings served in place of an index page
pub trait ListingExtractor: Send + Sync {
    fn extract(&self, body: &str, url: Option<&RequestUrl>) -> Option<Script>;
}

/// Listing extractor for Apache/nginx style auto-index pages
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpListing;

impl ListingExtractor for HttpListing {
    fn extract(&self, body: &str, url: Option<&RequestUrl>) -> Option<Script> {
        if !INDEX_OF.is_match(body) {
            return None;
        }
        let volume = url
            .and_then(|url| url.path.as_deref())
            .filter(|path| !path.is_empty())
            .unwrap_or("/")
            .to_string();

        let files: Vec<ListingFile> = LISTING_ENTRY
            .captures_iter(body)
            .filter_map(|caps| {
                let filename = caps.get(1)?.as_str();
                if is_navigation_link(filename) {
                    return None;
                }
                Some(ListingFile {
                    filename: filename.to_string(),
                    time: caps.get(2).map(|m| m.as_str().to_string()),
                    size: caps.get(3).map(|m| m.as_str().to_string()),
                })
            })
            .collect();
        debug!("Directory listing at {} with {} entries", volume, files.len());

        let mut output = format!("\nVolume {}\n", volume);
        if !files.is_empty() {
            output.push_str("  SIZE  TIME              FILENAME\n");
            for file in &files {
                output.push_str(&format!(
                    "  {:<5} {:<17} {}\n",
                    file.size.as_deref().unwrap_or("-"),
                    file.time.as_deref().unwrap_or("-"),
                    file.filename
                ));
            }
        }

        Some(Script::new(
            "http-ls",
            output,
            ScriptData::HttpLs(DirectoryListing {
                volumes: vec![ListingVolume { volume, files }],
            }),
        ))
    }
}

/// Parent directory, column-sort and off-site links are not listing entries
fn is_navigation_link(href: &str) -> bool {
    href.starts_with('?')
        || href.starts_with('/')
        || href.starts_with("../")
        || href.contains("://")
        || href.starts_with("mailto:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_first_match_case_insensitive() {
        let body = "<html><TITLE lang=en> Example </Title><title>Second</title></html>";
        assert_eq!(extract_html_title(body), Some(" Example "));
        assert_eq!(extract_html_title("<title>a <b>bold</b></title>"), None);
        assert_eq!(extract_html_title("<html></html>"), None);
    }

    #[test]
    fn owa_versions_sort_numerically() {
        let body = r#"<link href="/owa/auth/15.1.2.3/themes/x.css">
            <script src="/owa/2.0.0.0/scripts/a.js"></script>
            <img src="/owa/auth/15.1.2.3/img/logo.png">
            <img src="/owa/auth/9.10.0.1/img/logo.png">"#;
        assert_eq!(owa_versions(body), vec!["2.0.0.0", "9.10.0.1", "15.1.2.3"]);
        assert!(owa_versions("/owa/auth/current/x").is_empty());
    }

    #[test]
    fn owa_markers_need_no_quote() {
        let body = "var root = location.origin + '/owa/auth/15.0.847.32/' + theme;";
        assert_eq!(owa_versions(body), vec!["15.0.847.32"]);
    }

    #[test]
    fn numeric_not_lexicographic() {
        assert_eq!(compare_versions("10.0.1", "9.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("15.1", "15.1.0"), Ordering::Less);
    }

    #[test]
    fn apache_listing() {
        let body = r#"<html><head><title>Index of /backup</title></head><body>
<table>
<tr><th><a href="?C=N;O=D">Name</a></th></tr>
<tr><td><a href="/">Parent Directory</a></td><td>&nbsp;</td></tr>
<tr><td><a href="db.sql.gz">db.sql.gz</a></td><td align="right">2021-03-04 10:22  </td><td align="right">4.2M</td></tr>
<tr><td><a href="old/">old/</a></td><td align="right">2020-11-30 08:00  </td><td align="right">  - </td></tr>
</table></body></html>"#;
        let url = RequestUrl {
            path: Some("/backup/".to_string()),
            ..Default::default()
        };
        let script = HttpListing.extract(body, Some(&url)).unwrap();
        assert_eq!(script.id, "http-ls");
        assert!(script.output.starts_with("\nVolume /backup/\n"));

        let Some(ScriptData::HttpLs(listing)) = script.data else {
            panic!("unexpected payload");
        };
        let volume = &listing.volumes[0];
        assert_eq!(volume.volume, "/backup/");
        let names: Vec<&str> = volume.files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["db.sql.gz", "old/"]);
        assert_eq!(volume.files[0].time.as_deref(), Some("2021-03-04 10:22"));
        assert_eq!(volume.files[0].size.as_deref(), Some("4.2M"));
        assert_eq!(volume.files[1].size.as_deref(), Some("-"));
    }

    #[test]
    fn nginx_listing_without_url() {
        let body = "<html><head><title>Index of /</title></head><body><pre><a href=\"../\">../</a>\n<a href=\"notes.txt\">notes.txt</a>                                          12-Jan-2022 09:15                 512\n</pre></body></html>";
        let script = HttpListing.extract(body, None).unwrap();
        let Some(ScriptData::HttpLs(listing)) = script.data else {
            panic!("unexpected payload");
        };
        assert_eq!(listing.volumes[0].volume, "/");
        assert_eq!(listing.volumes[0].files.len(), 1);
        assert_eq!(listing.volumes[0].files[0].time.as_deref(), Some("12-Jan-2022 09:15"));
        assert_eq!(listing.volumes[0].files[0].size.as_deref(), Some("512"));
    }

    #[test]
    fn ordinary_page_is_not_a_listing() {
        assert!(HttpListing.extract("<title>Welcome</title>", None).is_none());
    }
}
