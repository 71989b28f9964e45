use std::fs::{self, File};
use std::io::{BufReader, Write};

use serde_json::{json, Value};
use tempfile::{tempdir, NamedTempFile};

use zgrab_ingest::ingest::{ingest, IngestConfig};
use zgrab_ingest::output::create_json_output;
use zgrab_ingest::ParserRegistry;

fn zgrab2_line(ip: &str, path: &str, body: &str) -> String {
    json!({
        "ip": ip,
        "data": {"http": {
            "status": "success",
            "protocol": "http",
            "result": {"response": {
                "request": {"method": "GET", "url": {"scheme": "http", "host": ip, "path": path}},
                "status_code": 200,
                "status_line": "200 OK",
                "protocol": {"name": "HTTP/1.1"},
                "headers": {"server": ["nginx/1.18.0"]},
                "body": body
            }}
        }}
    })
    .to_string()
}

#[test]
fn scan_file_to_host_records() {
    let mut input = NamedTempFile::new().unwrap();
    writeln!(input, "{}", zgrab2_line("192.0.2.1", "/", "<title>Welcome</title>")).unwrap();
    writeln!(input, "{}", zgrab2_line("192.0.2.2", "/.git/index", "DIRC")).unwrap();
    writeln!(input, "{}", zgrab2_line("192.0.2.3", "/.git/index", "nope")).unwrap();
    writeln!(input, "{{\"ip\": \"192.0.2.4\", \"data\": {{\"http\": {{\"status\": \"connection-timeout\"}}}}}}").unwrap();
    input.flush().unwrap();

    let dir = tempdir().unwrap();
    let out_path = dir.path().join("hosts.jsonl");
    let mut writer = create_json_output(&out_path, false).unwrap();

    let reader = BufReader::new(File::open(input.path()).unwrap());
    let stats = ingest(reader, &ParserRegistry::new(), &IngestConfig::default(), |host| {
        writer.write(host)
    })
    .unwrap();
    writer.finish().unwrap();

    assert_eq!(stats.lines, 4);
    assert_eq!(stats.hosts, 2);
    assert_eq!(stats.services, 2);

    let text = fs::read_to_string(&out_path).unwrap();
    let hosts: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(hosts.len(), 2);

    let web = &hosts[0]["ports"][0];
    assert_eq!(hosts[0]["addr"], "192.0.2.1");
    assert_eq!(web["service_product"], "nginx");
    assert_eq!(web["service_version"], "1.18.0");
    let ids: Vec<&str> = web["scripts"].as_array().unwrap().iter().map(|s| s["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["http-headers", "http-server-header", "http-content", "http-title"]);

    let git = &hosts[1]["ports"][0];
    assert_eq!(hosts[1]["addr"], "192.0.2.2");
    assert_eq!(git["scripts"][0]["http-git"][0]["repository"], "192.0.2.2:80/.git/");
}

#[test]
fn keep_empty_emits_every_addressed_host() {
    let input = format!(
        "{}\n{}\n",
        zgrab2_line("192.0.2.1", "/", ""),
        json!({"ip": "192.0.2.9", "domain": "Mail.Example.net", "data": {}})
    );
    let config = IngestConfig {
        probes: Vec::new(),
        keep_empty: true,
    };
    let mut hosts = Vec::new();
    let stats = ingest(input.as_bytes(), &ParserRegistry::new(), &config, |host| {
        hosts.push(host.clone());
        Ok(())
    })
    .unwrap();

    assert_eq!(stats.hosts, 2);
    assert_eq!(stats.services, 1);
    assert!(hosts[1].ports.is_empty());
    assert_eq!(hosts[1].hostnames[0].name, "mail.example.net");
    assert_eq!(hosts[1].hostnames[0].domains, vec!["example.net", "net"]);
}
