//! HTTP decoder (spec §4.3).
//!
//! Pairs each client-direction request with the next server-direction
//! response, FIFO, within one flow.

use crate::error::DecodeError;
use crate::flow::FlowReader;
use crate::registry::Decoder;
use crate::sinks::Sinks;
use crate::sniff;
use crate::util::contains_bytes;
use chrono::{DateTime, Utc};
use netcap_protocol::{escape_commas, Cookie, Direction, HttpTransaction, Record};
use std::collections::{BTreeMap, HashMap};

const HTTP_METHODS: &[&str] =
    &["CONNECT", "DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT", "TRACE"];

#[derive(Default)]
pub struct HttpDecoder;

impl Decoder for HttpDecoder {
    fn tag(&self) -> &'static str {
        "http"
    }

    fn name(&self) -> &'static str {
        "HTTP"
    }

    fn description(&self) -> &'static str {
        "Pairs HTTP/1.x requests with responses, extracting headers, cookies, and form parameters"
    }

    fn probe(&self, client_prefix: &[u8], server_prefix: &[u8]) -> bool {
        HTTP_METHODS.iter().any(|m| contains_bytes(client_prefix, m.as_bytes()))
            && contains_bytes(server_prefix, b"HTTP")
    }

    fn decode(&self, mut reader: FlowReader, sinks: &Sinks) -> Result<(), DecodeError> {
        let client_ip = reader.identity.client_ip;
        let server_ip = reader.identity.server_ip;

        let mut requests = Vec::new();
        while let Some(req) = parse_request(&mut reader) {
            requests.push(req);
        }
        let mut responses = Vec::new();
        while let Some(res) = parse_response(&mut reader) {
            responses.push(res);
        }

        for (req, res) in requests.into_iter().zip(responses.into_iter()) {
            let tx = build_transaction(req, res, client_ip, server_ip);
            tracing::debug!(method = %tx.method, url = %tx.url, status = tx.status_code, "http transaction");
            sinks.records.write(Record::Http(tx));
        }
        Ok(())
    }
}

struct ParsedRequest {
    timestamp: DateTime<Utc>,
    method: String,
    url: String,
    proto: String,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

struct ParsedResponse {
    proto: String,
    status: u16,
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

fn parse_start_line(line: &str) -> Option<(String, String, String)> {
    let parts: Vec<&str> = line.trim().splitn(3, ' ').collect();
    if parts.len() != 3 || !HTTP_METHODS.contains(&parts[0]) {
        return None;
    }
    Some((parts[0].to_string(), parts[1].to_string(), parts[2].to_string()))
}

fn parse_status_line(line: &str) -> Option<(String, u16)> {
    let parts: Vec<&str> = line.trim().splitn(3, ' ').collect();
    if parts.len() < 2 || !parts[0].starts_with("HTTP/") {
        return None;
    }
    let status = parts[1].parse::<u16>().ok()?;
    Some((parts[0].to_string(), status))
}

fn parse_request(reader: &mut FlowReader) -> Option<ParsedRequest> {
    loop {
        let (line_bytes, ts) = reader.read_line(Direction::ClientToServer)?;
        let line = String::from_utf8_lossy(&line_bytes).into_owned();
        if line.trim().is_empty() {
            continue;
        }
        let Some((method, url, proto)) = parse_start_line(&line) else {
            tracing::warn!(line = %line, "http: unrecognized request start line, resyncing");
            continue;
        };
        let Some(headers) = read_header_block(reader, Direction::ClientToServer) else {
            tracing::warn!(method = %method, url = %url, "http: malformed request headers, aborting transaction");
            continue;
        };
        let (body, _truncated) = read_body(reader, Direction::ClientToServer, &headers);
        return Some(ParsedRequest { timestamp: ts, method, url, proto, headers, body });
    }
}

fn parse_response(reader: &mut FlowReader) -> Option<ParsedResponse> {
    loop {
        let (line_bytes, _ts) = reader.read_line(Direction::ServerToClient)?;
        let line = String::from_utf8_lossy(&line_bytes).into_owned();
        if line.trim().is_empty() {
            continue;
        }
        let Some((proto, status)) = parse_status_line(&line) else {
            tracing::warn!(line = %line, "http: unrecognized response start line, resyncing");
            continue;
        };
        let Some(headers) = read_header_block(reader, Direction::ServerToClient) else {
            tracing::warn!(status, "http: malformed response headers, aborting transaction");
            continue;
        };
        let (body, _truncated) = read_body(reader, Direction::ServerToClient, &headers);
        return Some(ParsedResponse { proto, status, headers, body });
    }
}

/// Folds a header block into a name→joined-values map, or `None` if a
/// colon-less line is found — the transaction this block belongs to must be
/// aborted rather than built from a partial header set (spec §4.3 Errors).
fn read_header_block(reader: &mut FlowReader, dir: Direction) -> Option<BTreeMap<String, String>> {
    let mut raw: Vec<(String, String)> = Vec::new();
    loop {
        match reader.read_line(dir) {
            None => break,
            Some((bytes, _)) => {
                if bytes.is_empty() {
                    break;
                }
                let line = String::from_utf8_lossy(&bytes).into_owned();
                if (line.starts_with(' ') || line.starts_with('\t')) && !raw.is_empty() {
                    let last = raw.last_mut().unwrap();
                    last.1.push(' ');
                    last.1.push_str(line.trim());
                } else if let Some(idx) = line.find(':') {
                    let name = line[..idx].trim().to_string();
                    let value = line[idx + 1..].trim().to_string();
                    raw.push((name, value));
                } else {
                    tracing::warn!(line = %line, "http: colon-less header line");
                    return None;
                }
            }
        }
    }
    Some(fold_headers(raw))
}

fn fold_headers(raw: Vec<(String, String)>) -> BTreeMap<String, String> {
    let mut canonical: HashMap<String, String> = HashMap::new();
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in raw {
        let lower = name.to_ascii_lowercase();
        let key = canonical.entry(lower).or_insert_with(|| name.clone()).clone();
        map.entry(key).and_modify(|v| {
            v.push(' ');
            v.push_str(&value);
        }).or_insert(value);
    }
    map
}

fn get_header(headers: &BTreeMap<String, String>, name: &str) -> String {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
        .unwrap_or_default()
}

fn declared_content_length(headers: &BTreeMap<String, String>) -> i64 {
    let raw = get_header(headers, "Content-Length");
    raw.trim().parse::<i64>().unwrap_or(-1)
}

fn read_body(reader: &mut FlowReader, dir: Direction, headers: &BTreeMap<String, String>) -> (Vec<u8>, bool) {
    let transfer_encoding = get_header(headers, "Transfer-Encoding").to_ascii_lowercase();
    if transfer_encoding.contains("chunked") {
        return read_chunked(reader, dir);
    }
    let declared = declared_content_length(headers);
    if declared < 0 {
        return (Vec::new(), false);
    }
    let (bytes, complete) = reader.read_upto(dir, declared as usize);
    (bytes, !complete)
}

fn read_chunked(reader: &mut FlowReader, dir: Direction) -> (Vec<u8>, bool) {
    let mut out = Vec::new();
    loop {
        let Some((size_line, _)) = reader.read_line(dir) else {
            return (out, true);
        };
        let size_str = String::from_utf8_lossy(&size_line);
        let size_str = size_str.split(';').next().unwrap_or("").trim();
        let Ok(size) = usize::from_str_radix(size_str, 16) else {
            return (out, true);
        };
        if size == 0 {
            let _ = reader.read_line(dir);
            return (out, false);
        }
        let (chunk, complete) = reader.read_upto(dir, size);
        out.extend_from_slice(&chunk);
        let _ = reader.read_line(dir);
        if !complete {
            return (out, true);
        }
    }
}

fn detect_body_type(body: &[u8], declared_encoding: &str) -> String {
    if body.is_empty() {
        return String::new();
    }
    let lower = declared_encoding.to_ascii_lowercase();
    if matches!(lower.as_str(), "gzip" | "deflate") {
        return match sniff::decode_content_encoding(body, &lower) {
            Ok(decompressed) => sniff::detect(&decompressed).0,
            Err(e) => {
                tracing::warn!(error = %e, "http: decompression failed, detected content type left empty");
                String::new()
            }
        };
    }
    sniff::detect(body).0
}

fn parse_cookies(cookie_header: &str) -> Vec<Cookie> {
    if cookie_header.is_empty() {
        return Vec::new();
    }
    cookie_header
        .split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            match pair.split_once('=') {
                Some((name, value)) => Some(Cookie { name: name.trim().to_string(), value: value.trim().to_string() }),
                None => Some(Cookie { name: pair.to_string(), value: String::new() }),
            }
        })
        .collect()
}

/// Applies the six form-parameter normalization rules, in order, and joins
/// multi-valued parameters with a single space (spec §4.3).
fn normalize_params(raw: Vec<(String, String)>) -> BTreeMap<String, String> {
    let mut ordered: Vec<(String, String)> = Vec::new();
    for (key, value) in raw {
        if key == " " {
            continue;
        }
        let mut key = key;
        if key.is_empty() {
            key = "unknown".to_string();
        }
        let mut value = value;
        if !value.is_empty() && (value.starts_with('.') || value.ends_with('.')) {
            value = format!("'{value}'");
        }
        if key.starts_with('.') || key.ends_with('.') {
            key = format!("'{key}'");
        }
        key = key.replace('.', "[dot]");
        ordered.push((key, value));
    }
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in ordered {
        map.entry(key).and_modify(|v: &mut String| {
            v.push(' ');
            v.push_str(&value);
        }).or_insert(value);
    }
    map
}

fn parse_www_form_pairs(input: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(input.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn form_params(req: &ParsedRequest) -> BTreeMap<String, String> {
    let content_type = get_header(&req.headers, "Content-Type").to_ascii_lowercase();
    let raw = if content_type.contains("application/x-www-form-urlencoded") {
        let body_str = String::from_utf8_lossy(&req.body);
        parse_www_form_pairs(&body_str)
    } else if let Some((_, query)) = req.url.split_once('?') {
        parse_www_form_pairs(query)
    } else {
        Vec::new()
    };
    normalize_params(raw)
}

fn build_transaction(
    req: ParsedRequest,
    res: ParsedResponse,
    src_ip: std::net::IpAddr,
    dst_ip: std::net::IpAddr,
) -> HttpTransaction {
    let req_content_encoding = get_header(&req.headers, "Content-Encoding");
    let req_content_type = get_header(&req.headers, "Content-Type");
    let req_content_type_detected = detect_body_type(&req.body, &req_content_encoding);

    let res_content_encoding = get_header(&res.headers, "Content-Encoding");
    let res_content_type = get_header(&res.headers, "Content-Type");
    let res_content_type_detected = detect_body_type(&res.body, &res_content_encoding);

    let declared_res_length = declared_content_length(&res.headers);
    let res_content_length =
        if declared_res_length >= 0 { declared_res_length } else { res.body.len() as i64 };

    let form_params = form_params(&req);

    HttpTransaction {
        timestamp: req.timestamp,
        method: req.method,
        host: get_header(&req.headers, "Host"),
        url: escape_commas(&req.url),
        proto: req.proto,
        headers: req.headers.clone(),
        cookies: parse_cookies(&get_header(&req.headers, "Cookie")),
        form_params,
        user_agent: escape_commas(&get_header(&req.headers, "User-Agent")),
        referer: escape_commas(&get_header(&req.headers, "Referer")),
        req_content_length: declared_content_length(&req.headers),
        req_content_encoding,
        req_content_type,
        req_content_type_detected,
        res_content_length,
        res_content_encoding,
        res_content_type,
        res_content_type_detected,
        status_code: res.status,
        server_name: get_header(&res.headers, "Server"),
        src_ip,
        dst_ip,
    }
}
