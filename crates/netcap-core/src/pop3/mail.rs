//! RFC-822-ish mail parsing for RETR payloads (spec §4.4).
//!
//! Header/body split prefers the standard "first blank line" rule; the
//! `Envelope-To` heuristic only kicks in when no blank line is present at
//! all. Multipart boundary detection prefers the declared
//! `Content-Type: multipart/*; boundary=...` value; a length-threshold scan
//! over `------=_Part_<id>` / `--<boundary>` lines is the fallback.

use netcap_protocol::{Mail, MailPart};
use std::collections::BTreeMap;

pub fn parse(payload: &str) -> Mail {
    let (header_lines, body_lines) = split_header_body(payload);
    let headers = parse_headers(&header_lines);
    let content_type = get_ci(&headers, "Content-Type");
    let declared_boundary = content_type.as_deref().and_then(parse_boundary_from_content_type);

    let parts = split_parts(&body_lines, declared_boundary.as_deref());
    let has_attachments = parts.iter().any(|p| {
        get_ci(&p.headers, "Content-Disposition")
            .map(|v| v.to_ascii_lowercase().contains("attachment"))
            .unwrap_or(false)
    });

    Mail {
        return_path: get_ci(&headers, "Return-Path"),
        delivery_date: get_ci(&headers, "Delivery-Date"),
        from: get_ci(&headers, "From"),
        to: get_ci(&headers, "To"),
        cc: get_ci(&headers, "Cc"),
        subject: get_ci(&headers, "Subject"),
        date: get_ci(&headers, "Date"),
        message_id: get_ci(&headers, "Message-ID"),
        references: get_ci(&headers, "References"),
        in_reply_to: get_ci(&headers, "In-Reply-To"),
        content_language: get_ci(&headers, "Content-Language"),
        x_originating_ip: get_ci(&headers, "X-Originating-IP"),
        content_type,
        envelope_to: get_ci(&headers, "Envelope-To"),
        parts,
        has_attachments,
    }
}

fn split_header_body(payload: &str) -> (Vec<&str>, Vec<&str>) {
    let lines: Vec<&str> = payload.lines().collect();
    if let Some(blank_idx) = lines.iter().position(|l| l.trim().is_empty()) {
        return (lines[..blank_idx].to_vec(), lines[blank_idx + 1..].to_vec());
    }
    if let Some(idx) = lines.iter().position(|l| l.to_ascii_lowercase().starts_with("envelope-to:")) {
        return (lines[..=idx].to_vec(), lines[idx + 1..].to_vec());
    }
    (lines, Vec::new())
}

fn split_header_line(line: &str) -> Option<(String, String)> {
    let idx = line.find(':')?;
    let name = &line[..idx];
    let first = name.chars().next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    Some((name.trim().to_string(), line[idx + 1..].trim().to_string()))
}

fn parse_headers(lines: &[&str]) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let mut last_key: Option<String> = None;
    for line in lines {
        if let Some((name, value)) = split_header_line(line) {
            map.insert(name.clone(), value);
            last_key = Some(name);
        } else if let Some(key) = &last_key {
            map.entry(key.clone()).and_modify(|v: &mut String| {
                v.push('\n');
                v.push_str(line);
            });
        }
    }
    map
}

fn get_ci(map: &BTreeMap<String, String>, name: &str) -> Option<String> {
    map.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.clone())
}

fn parse_boundary_from_content_type(ct: &str) -> Option<String> {
    let lower = ct.to_ascii_lowercase();
    let idx = lower.find("boundary=")?;
    let rest = &ct[idx + "boundary=".len()..];
    let value = rest.split(';').next().unwrap_or(rest).trim();
    let value = value.trim_matches('"').trim_matches('\'');
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn start_marker(line: &str, declared_boundary: Option<&str>) -> Option<String> {
    let trimmed = line.trim_end();
    if let Some(boundary) = declared_boundary {
        return if trimmed == format!("--{boundary}") { Some(boundary.to_string()) } else { None };
    }
    if let Some(id) = trimmed.strip_prefix("------=_Part_") {
        return Some(id.trim().to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("--") {
        if rest.len() > 25 && !rest.contains('>') && !rest.ends_with("--") {
            return Some(rest.to_string());
        }
    }
    None
}

fn is_end_marker(line: &str, id: &str) -> bool {
    line.trim_end().ends_with(&format!("{id}--"))
}

fn extract_filename(s: &str) -> Option<String> {
    let lower = s.to_ascii_lowercase();
    let idx = lower.find("filename=")?;
    let rest = &s[idx + "filename=".len()..];
    let value = rest.split(';').next().unwrap_or(rest).trim();
    let value = value.trim_matches('"').trim_matches('\'');
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

struct PartBuilder {
    id: String,
    headers: BTreeMap<String, String>,
    filename: Option<String>,
    content: String,
    in_payload: bool,
}

fn split_parts(body_lines: &[&str], declared_boundary: Option<&str>) -> Vec<MailPart> {
    let mut parts = Vec::new();
    let mut current: Option<PartBuilder> = None;
    let mut any_marker = false;

    for line in body_lines {
        if let Some(id) = start_marker(line, declared_boundary) {
            if let Some(p) = current.take() {
                parts.push(MailPart { id: p.id, headers: p.headers, content: p.content, filename: p.filename });
            }
            current = Some(PartBuilder { id, headers: BTreeMap::new(), filename: None, content: String::new(), in_payload: false });
            any_marker = true;
            continue;
        }
        let Some(part) = current.as_mut() else { continue };
        if is_end_marker(line, &part.id) {
            let p = current.take().unwrap();
            parts.push(MailPart { id: p.id, headers: p.headers, content: p.content, filename: p.filename });
            continue;
        }
        if !part.in_payload {
            if line.trim().is_empty() {
                part.in_payload = true;
                continue;
            }
            if let Some((name, value)) = split_header_line(line) {
                if name.eq_ignore_ascii_case("Content-Disposition") {
                    if let Some(fname) = extract_filename(&value) {
                        part.filename = Some(fname);
                    }
                }
                part.headers.insert(name, value);
                continue;
            }
            if let Some(fname) = extract_filename(line) {
                part.filename = Some(fname);
            }
        } else {
            part.content.push_str(line);
            part.content.push('\n');
        }
    }
    if let Some(p) = current.take() {
        parts.push(MailPart { id: p.id, headers: p.headers, content: p.content, filename: p.filename });
    }

    if !any_marker {
        let mut content = String::new();
        for line in body_lines {
            content.push_str(line);
            content.push('\n');
        }
        return vec![MailPart { id: "none".to_string(), headers: BTreeMap::new(), content, filename: None }];
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_splits_header_from_body() {
        let mail = parse("Subject: hi\nFrom: a@b.com\n\nbody text here");
        assert_eq!(mail.subject.as_deref(), Some("hi"));
        assert_eq!(mail.from.as_deref(), Some("a@b.com"));
        assert_eq!(mail.parts.len(), 1);
        assert_eq!(mail.parts[0].id, "none");
        assert!(mail.parts[0].content.contains("body text here"));
    }

    #[test]
    fn envelope_to_fallback_without_blank_line() {
        let mail = parse("Subject: hi\nEnvelope-To: x@y.com\nbody line");
        assert_eq!(mail.envelope_to.as_deref(), Some("x@y.com"));
        assert!(mail.parts[0].content.contains("body line"));
    }

    #[test]
    fn e4_two_part_multipart_message() {
        let payload = "Subject: test\n\n\
------=_Part_A\n\
Content-Type: text/plain\n\
\n\
first part body\n\
------=_Part_A--\n";
        let mail = parse(payload);
        assert_eq!(mail.parts.len(), 1);
        assert_eq!(mail.parts[0].id, "A");
        assert!(mail.parts[0].content.contains("first part body"));
    }

    #[test]
    fn content_type_boundary_takes_precedence_over_heuristic() {
        let payload = "Content-Type: multipart/mixed; boundary=XYZ\n\n\
--XYZ\n\
Content-Disposition: attachment; filename=\"a.txt\"\n\
\n\
payload\n\
--XYZ--\n";
        let mail = parse(payload);
        assert_eq!(mail.parts.len(), 1);
        assert_eq!(mail.parts[0].id, "XYZ");
        assert_eq!(mail.parts[0].filename.as_deref(), Some("a.txt"));
        assert!(mail.has_attachments);
    }

    #[test]
    fn single_part_body_has_id_none() {
        let mail = parse("Subject: s\n\njust text, no markers");
        assert_eq!(mail.parts.len(), 1);
        assert_eq!(mail.parts[0].id, "none");
    }
}
