//! POP3 decoder (spec §4.4).
//!
//! Phase 1 parses the client/server lines into requests and replies
//! linearly per direction. Phase 2 replays them through a 4-state
//! authentication-and-transfer state machine, pairing each client command
//! with the reply slot(s) it consumes.

mod mail;

use crate::error::DecodeError;
use crate::flow::FlowReader;
use crate::registry::Decoder;
use crate::sinks::Sinks;
use crate::util::contains_bytes;
use netcap_protocol::{Credential, Direction, Pop3Request, Pop3Response, Pop3Session, Record};
use std::time::Duration;

const SERVER_COMMAND_TOKENS: &[&str] =
    &[".", "+", "+OK", "-ERR", "TOP", "USER", "UIDL", "STLS", "SASL", "IMPLEMENTATION"];

/// Single back-off when the reply buffer trails the request buffer
/// (spec §5's one suspension point in this state machine).
const REPLY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Default)]
pub struct Pop3Decoder;

impl Decoder for Pop3Decoder {
    fn tag(&self) -> &'static str {
        "pop3"
    }

    fn name(&self) -> &'static str {
        "POP3"
    }

    fn description(&self) -> &'static str {
        "Replays a POP3 authentication/transfer conversation, extracting credentials and mail"
    }

    fn probe(&self, _client_prefix: &[u8], server_prefix: &[u8]) -> bool {
        contains_bytes(server_prefix, b"+OK") && contains_bytes(server_prefix, b"POP server ready")
    }

    fn decode(&self, mut reader: FlowReader, sinks: &Sinks) -> Result<(), DecodeError> {
        let identity = reader.identity.clone();
        let commands = parse_requests(&mut reader);
        let replies = parse_replies(&mut reader);

        let mut session = Pop3Session {
            timestamp: identity.first_seen,
            client_ip: identity.client_ip,
            server_ip: identity.server_ip,
            commands: commands.clone(),
            replies: replies.clone(),
            user: None,
            password: None,
            token: None,
            mails: Vec::new(),
        };

        if !preconditions_met(&replies) {
            sinks.records.write(Record::Pop3(session));
            return Ok(());
        }

        run_state_machine(&commands, &replies, &mut session, sinks, &identity.ident);
        sinks.records.write(Record::Pop3(session));
        Ok(())
    }
}

fn preconditions_met(replies: &[Pop3Response]) -> bool {
    matches!(replies.first(), Some(r) if r.command.as_deref() == Some("+OK") && r.message.starts_with("POP server ready"))
}

fn parse_requests(reader: &mut FlowReader) -> Vec<Pop3Request> {
    let mut out = Vec::new();
    while let Some((line_bytes, _)) = reader.read_line(Direction::ClientToServer) {
        let line = String::from_utf8_lossy(&line_bytes).into_owned();
        if line.trim().is_empty() {
            continue;
        }
        let mut split = line.trim().splitn(2, ' ');
        let command = split.next().unwrap_or("").to_string();
        let argument = split.next().unwrap_or("").trim().to_string();
        let quit = command.eq_ignore_ascii_case("QUIT");
        out.push(Pop3Request { command, argument });
        if quit {
            break;
        }
    }
    out
}

fn parse_replies(reader: &mut FlowReader) -> Vec<Pop3Response> {
    let mut out = Vec::new();
    while let Some((line_bytes, _)) = reader.read_line(Direction::ServerToClient) {
        let line = String::from_utf8_lossy(&line_bytes).into_owned();
        if line.is_empty() {
            continue;
        }
        let mut split = line.trim_end().splitn(2, ' ');
        let first = split.next().unwrap_or("");
        let rest = split.next().unwrap_or("").to_string();
        let recognized = SERVER_COMMAND_TOKENS.iter().any(|c| c.eq_ignore_ascii_case(first));
        let (command, message) = if recognized { (Some(first.to_string()), rest) } else { (None, line.clone()) };

        let terminate = line.contains("-ERR authentication failed") || line.contains("signing off");
        out.push(Pop3Response { command, message });
        if terminate {
            break;
        }
    }
    out
}

fn reply_at<'a>(replies: &'a [Pop3Response], idx: usize) -> Option<&'a Pop3Response> {
    if idx < replies.len() {
        return replies.get(idx);
    }
    std::thread::sleep(REPLY_BACKOFF);
    replies.get(idx)
}

fn is_ok(reply: Option<&Pop3Response>) -> bool {
    matches!(reply, Some(r) if r.command.as_deref() == Some("+OK"))
}

fn skip_until_dot(replies: &[Pop3Response], mut idx: usize) -> usize {
    while idx < replies.len() {
        let is_dot = replies[idx].command.as_deref() == Some(".");
        idx += 1;
        if is_dot {
            break;
        }
    }
    idx
}

fn collect_retr_payload(replies: &[Pop3Response], mut idx: usize) -> (String, usize, bool) {
    let mut payload = String::new();
    let mut found = false;
    while idx < replies.len() {
        if replies[idx].command.as_deref() == Some(".") {
            idx += 1;
            found = true;
            break;
        }
        payload.push_str(&replies[idx].message);
        payload.push('\n');
        idx += 1;
    }
    (payload, idx, found)
}

#[derive(PartialEq, Eq)]
enum State {
    NotAuthenticated,
    Authenticated,
}

fn run_state_machine(
    commands: &[Pop3Request],
    replies: &[Pop3Response],
    session: &mut Pop3Session,
    sinks: &Sinks,
    flow_ident: &str,
) {
    let mut state = State::NotAuthenticated;
    let mut res_idx = 1; // replies[0] is the server-ready banner, already checked.
    let mut cmd_idx = 0;

    while cmd_idx < commands.len() {
        let cmd = &commands[cmd_idx];
        let upper = cmd.command.to_ascii_uppercase();

        match state {
            State::NotAuthenticated => match upper.as_str() {
                "USER" => {
                    if is_ok(reply_at(replies, res_idx)) {
                        session.user = Some(cmd.argument.clone());
                    }
                    res_idx += 1;
                }
                "PASS" => {
                    if is_ok(reply_at(replies, res_idx)) {
                        session.password = Some(cmd.argument.clone());
                        state = State::Authenticated;
                        emit_credential(session, sinks, flow_ident, session.password.clone().unwrap_or_default());
                    }
                    res_idx += 1;
                }
                "AUTH" => {
                    let ok = is_ok(reply_at(replies, res_idx));
                    res_idx += 1;
                    if ok {
                        state = State::Authenticated;
                        if let Some(next) = commands.get(cmd_idx + 1) {
                            let token = format!("{} {}", next.command, next.argument).trim().to_string();
                            session.token = Some(token.clone());
                            cmd_idx += 1;
                            emit_credential(session, sinks, flow_ident, token);
                        }
                    }
                }
                "APOP" => {
                    if is_ok(reply_at(replies, res_idx)) {
                        if let Some((user, digest)) = cmd.argument.split_once(' ') {
                            session.user = Some(user.to_string());
                            session.token = Some(digest.trim().to_string());
                            state = State::Authenticated;
                            emit_credential(session, sinks, flow_ident, digest.trim().to_string());
                        }
                    }
                    res_idx += 1;
                }
                "CAPA" => {
                    res_idx = skip_until_dot(replies, res_idx);
                }
                "QUIT" => break,
                _ => {
                    res_idx += 1;
                }
            },
            State::Authenticated => match upper.as_str() {
                "STAT" => {
                    res_idx += 1;
                }
                "LIST" | "UIDL" => {
                    res_idx = skip_until_dot(replies, res_idx);
                }
                "RETR" => {
                    let (payload, next_idx, terminated) = collect_retr_payload(replies, res_idx);
                    res_idx = next_idx;
                    if terminated {
                        session.mails.push(mail::parse(&payload));
                    }
                }
                "QUIT" => break,
                _ => {
                    res_idx += 1;
                }
            },
        }
        cmd_idx += 1;
    }
}

fn emit_credential(session: &Pop3Session, sinks: &Sinks, flow_ident: &str, password: String) {
    sinks.credentials.write(Credential {
        timestamp: session.timestamp,
        service: "POP3".to_string(),
        flow_ident: flow_ident.to_string(),
        user: session.user.clone().unwrap_or_default(),
        password,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{CredentialSink, CredentialWriter, FileSink, FileArtifactWriter, RecordSink, RecordWriter};
    use chrono::Utc;
    use netcap_protocol::{FlowIdentity, Segment};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

    fn identity() -> FlowIdentity {
        FlowIdentity {
            ident: "1.1.1.1:1234-2.2.2.2:110".into(),
            client_ip: IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            client_port: 1234,
            server_ip: IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            server_port: 110,
            first_seen: Utc::now(),
        }
    }

    fn seg(dir: Direction, text: &str) -> Segment {
        Segment { direction: dir, bytes: text.as_bytes().to_vec(), timestamp: Utc::now() }
    }

    struct RecordRecorder(Mutex<Vec<Record>>);
    impl RecordWriter for RecordRecorder {
        fn write(&self, record: &Record) -> Result<(), crate::error::SinkError> {
            self.0.lock().unwrap().push(record.clone());
            Ok(())
        }
    }
    struct CredRecorder(Mutex<Vec<Credential>>);
    impl CredentialWriter for CredRecorder {
        fn write(&self, c: &Credential) -> Result<(), crate::error::SinkError> {
            self.0.lock().unwrap().push(c.clone());
            Ok(())
        }
    }
    struct NoopFile;
    impl FileArtifactWriter for NoopFile {
        fn write(&self, _f: &netcap_protocol::FileArtifact) -> Result<(), crate::error::SinkError> {
            Ok(())
        }
    }

    fn test_sinks() -> (Sinks, std::sync::Arc<RecordRecorder>, std::sync::Arc<CredRecorder>) {
        let records_recorder = std::sync::Arc::new(RecordRecorder(Mutex::new(Vec::new())));
        let creds_recorder = std::sync::Arc::new(CredRecorder(Mutex::new(Vec::new())));

        struct RecordProxy(std::sync::Arc<RecordRecorder>);
        impl RecordWriter for RecordProxy {
            fn write(&self, r: &Record) -> Result<(), crate::error::SinkError> {
                self.0.write(r)
            }
        }
        struct CredProxy(std::sync::Arc<CredRecorder>);
        impl CredentialWriter for CredProxy {
            fn write(&self, c: &Credential) -> Result<(), crate::error::SinkError> {
                self.0.write(c)
            }
        }

        let records = std::sync::Arc::new(RecordSink::new(Box::new(RecordProxy(records_recorder.clone()))));
        let credentials = std::sync::Arc::new(CredentialSink::new(Box::new(CredProxy(creds_recorder.clone()))));
        let dir = tempfile::tempdir().unwrap();
        let files = std::sync::Arc::new(FileSink::new(dir.path().to_path_buf(), Box::new(NoopFile)));
        (Sinks { records, credentials, files }, records_recorder, creds_recorder)
    }

    #[test]
    fn e3_user_pass_success() {
        let client = "USER mrose\r\nPASS secret\r\nQUIT\r\n";
        let server = "+OK POP server ready\r\n+OK hoopy\r\n+OK maildrop has 0 messages\r\n+OK signing off\r\n";
        let reader = FlowReader::new(identity(), vec![
            seg(Direction::ClientToServer, client),
            seg(Direction::ServerToClient, server),
        ]);
        let (sinks, records, creds) = test_sinks();
        Pop3Decoder.decode(reader, &sinks).unwrap();

        let records = records.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        let Record::Pop3(session) = &records[0] else { panic!("expected pop3 record") };
        assert_eq!(session.user.as_deref(), Some("mrose"));
        assert_eq!(session.password.as_deref(), Some("secret"));
        assert!(session.mails.is_empty());

        let creds = creds.0.lock().unwrap();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].service, "POP3");
        assert_eq!(creds[0].user, "mrose");
        assert_eq!(creds[0].password, "secret");
    }

    #[test]
    fn e4_retr_two_part_multipart() {
        let client = "USER mrose\r\nPASS secret\r\nRETR 1\r\nQUIT\r\n";
        let mail_body = "Subject: hi\r\n\r\n------=_Part_A\r\nContent-Type: text/plain\r\n\r\nhello\r\n------=_Part_A--\r\n.\r\n";
        let server = format!(
            "+OK POP server ready\r\n+OK hoopy\r\n+OK maildrop has 1 message\r\n+OK {}",
            mail_body
        );
        let reader = FlowReader::new(identity(), vec![
            seg(Direction::ClientToServer, client),
            seg(Direction::ServerToClient, &server),
        ]);
        let (sinks, records, _creds) = test_sinks();
        Pop3Decoder.decode(reader, &sinks).unwrap();

        let records = records.0.lock().unwrap();
        let Record::Pop3(session) = &records[0] else { panic!() };
        assert_eq!(session.mails.len(), 1);
        assert_eq!(session.mails[0].parts.len(), 1);
        assert_eq!(session.mails[0].parts[0].id, "A");
    }

    #[test]
    fn property5_retr_without_dot_terminator_is_not_counted() {
        let client = "USER mrose\r\nPASS secret\r\nRETR 1\r\nQUIT\r\n";
        let server = "+OK POP server ready\r\n+OK hoopy\r\n+OK maildrop has 1 message\r\n+OK partial body with no terminator";
        let reader = FlowReader::new(identity(), vec![
            seg(Direction::ClientToServer, client),
            seg(Direction::ServerToClient, server),
        ]);
        let (sinks, records, _creds) = test_sinks();
        Pop3Decoder.decode(reader, &sinks).unwrap();
        let records = records.0.lock().unwrap();
        let Record::Pop3(session) = &records[0] else { panic!() };
        assert!(session.mails.is_empty());
    }

    #[test]
    fn precondition_failure_yields_empty_session() {
        let client = "USER mrose\r\n";
        let server = "-ERR not ready\r\n";
        let reader = FlowReader::new(identity(), vec![
            seg(Direction::ClientToServer, client),
            seg(Direction::ServerToClient, server),
        ]);
        let (sinks, records, creds) = test_sinks();
        Pop3Decoder.decode(reader, &sinks).unwrap();
        let records = records.0.lock().unwrap();
        let Record::Pop3(session) = &records[0] else { panic!() };
        assert!(session.user.is_none());
        assert!(creds.0.lock().unwrap().is_empty());
    }

    #[test]
    fn probe_requires_both_ok_and_ready_banner() {
        assert!(Pop3Decoder.probe(b"", b"+OK POP server ready"));
        assert!(!Pop3Decoder.probe(b"", b"+OK something else"));
        assert!(!Pop3Decoder.probe(b"", b""));
    }
}
