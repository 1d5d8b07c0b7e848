// netcap-protocol: record and artifact types emitted by the stream decoding core.
//
// Every type here derives `Serialize`/`Deserialize` so an external record
// serialization module can persist them without the core knowing its wire
// format, and `Eq`/`PartialEq` so decoder tests can assert on whole records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

// ---------------------------------------------------------------------------
// Flow identity
// ---------------------------------------------------------------------------

/// Which side of a flow a segment travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// Identity of a TCP flow, stable for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowIdentity {
    /// `src:sport-dst:dport`, matching the reassembly layer's `ident`.
    pub ident: String,
    pub client_ip: IpAddr,
    pub client_port: u16,
    pub server_ip: IpAddr,
    pub server_port: u16,
    pub first_seen: DateTime<Utc>,
}

/// A contiguous, ordered byte range in one direction of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub direction: Direction,
    pub bytes: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// One cookie observed on a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// One paired HTTP request/response within a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransaction {
    /// Timestamp of the request's first byte.
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub host: String,
    /// Comma-escaped per the output contract (see `escape_commas`).
    pub url: String,
    pub proto: String,
    /// Duplicate header names joined by a single space.
    pub headers: BTreeMap<String, String>,
    pub cookies: Vec<Cookie>,
    pub form_params: BTreeMap<String, String>,
    /// Comma-escaped.
    pub user_agent: String,
    /// Comma-escaped.
    pub referer: String,
    /// -1 permitted (unknown/absent).
    pub req_content_length: i64,
    pub req_content_encoding: String,
    pub req_content_type: String,
    pub req_content_type_detected: String,
    /// Falls back to the observed body length when the declared length is -1.
    pub res_content_length: i64,
    pub res_content_encoding: String,
    pub res_content_type: String,
    pub res_content_type_detected: String,
    pub status_code: u16,
    /// From the response `Server` header.
    pub server_name: String,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
}

// ---------------------------------------------------------------------------
// POP3
// ---------------------------------------------------------------------------

/// A client-direction command line, split into command and argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pop3Request {
    pub command: String,
    pub argument: String,
}

/// A server-direction line. `command` is `None` for a bare message line that
/// did not start with a recognized server command token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pop3Response {
    pub command: Option<String>,
    pub message: String,
}

/// One full POP3 conversation on a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pop3Session {
    pub timestamp: DateTime<Utc>,
    pub client_ip: IpAddr,
    pub server_ip: IpAddr,
    pub commands: Vec<Pop3Request>,
    pub replies: Vec<Pop3Response>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Opaque SASL continuation token (AUTH) or APOP digest.
    pub token: Option<String>,
    pub mails: Vec<Mail>,
}

/// One child part of a multipart mail body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailPart {
    /// Unique within the owning mail; `"none"` for a single-part body.
    pub id: String,
    pub headers: BTreeMap<String, String>,
    pub content: String,
    pub filename: Option<String>,
}

/// One RFC-822-ish mail retrieved via RETR.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mail {
    pub return_path: Option<String>,
    pub delivery_date: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub message_id: Option<String>,
    pub references: Option<String>,
    pub in_reply_to: Option<String>,
    pub content_language: Option<String>,
    pub x_originating_ip: Option<String>,
    pub content_type: Option<String>,
    pub envelope_to: Option<String>,
    pub parts: Vec<MailPart>,
    pub has_attachments: bool,
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// A credential observed in an authenticated protocol exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub flow_ident: String,
    pub user: String,
    pub password: String,
}

/// A file extracted from a decoded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileArtifact {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub length: u64,
    pub md5: String,
    pub path: String,
    pub flow_ident: String,
    /// Decoder that produced this file, e.g. "POP3", "SMTP", "HTTP".
    pub source: String,
    pub content_type: String,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
}

// ---------------------------------------------------------------------------
// Record envelope
// ---------------------------------------------------------------------------

/// Every record type a decoder can emit into the record sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    Http(HttpTransaction),
    Pop3(Pop3Session),
    Smtp(SmtpSession),
}

/// SMTP's session record; structurally identical to POP3's in this core
/// (§4.5: same scaffold, same artifact contract) but kept as its own type
/// so the two protocols can diverge without a breaking change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpSession {
    pub timestamp: DateTime<Utc>,
    pub client_ip: Option<IpAddr>,
    pub server_ip: Option<IpAddr>,
    pub commands: Vec<Pop3Request>,
    pub replies: Vec<Pop3Response>,
    pub mail_from: Option<String>,
    pub rcpt_to: Vec<String>,
    pub authenticated_user: Option<String>,
}

// ---------------------------------------------------------------------------
// Shared transforms
// ---------------------------------------------------------------------------

/// Replace every ASCII comma with the literal token `(comma)`.
///
/// Applied to URLs, user-agents, and referers before they land in a record,
/// per the output contract consumed by downstream CSV-ish serialization.
pub fn escape_commas(s: &str) -> String {
    s.replace(',', "(comma)")
}
