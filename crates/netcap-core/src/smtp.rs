//! SMTP decoder (spec §4.5): smaller sibling of the POP3 decoder, same
//! line-oriented directional scaffold and artifact contract. Its internal
//! state machine is intentionally lighter than POP3's.

use crate::error::DecodeError;
use crate::flow::FlowReader;
use crate::registry::Decoder;
use crate::sinks::Sinks;
use crate::util::contains_bytes;
use netcap_protocol::{Credential, Direction, Pop3Request, Pop3Response, Record, SmtpSession};

#[derive(Default)]
pub struct SmtpDecoder;

impl Decoder for SmtpDecoder {
    fn tag(&self) -> &'static str {
        "smtp"
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }

    fn description(&self) -> &'static str {
        "Replays an SMTP command/reply exchange, extracting envelope addresses and AUTH credentials"
    }

    fn probe(&self, _client_prefix: &[u8], server_prefix: &[u8]) -> bool {
        server_prefix.starts_with(b"220") && contains_bytes(server_prefix, b"SMTP")
    }

    fn decode(&self, mut reader: FlowReader, sinks: &Sinks) -> Result<(), DecodeError> {
        let identity = reader.identity.clone();
        let commands = parse_requests(&mut reader);
        let replies = parse_replies(&mut reader);

        let mut session = SmtpSession {
            timestamp: identity.first_seen,
            client_ip: Some(identity.client_ip),
            server_ip: Some(identity.server_ip),
            commands: commands.clone(),
            replies: replies.clone(),
            mail_from: None,
            rcpt_to: Vec::new(),
            authenticated_user: None,
        };

        run(&commands, &replies, &mut session, sinks, &identity.ident);
        sinks.records.write(Record::Smtp(session));
        Ok(())
    }
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
        let is_code = first.len() == 3 && first.bytes().all(|b| b.is_ascii_digit());
        let (command, message) = if is_code { (Some(first.to_string()), rest) } else { (None, line.clone()) };
        out.push(Pop3Response { command, message });
    }
    out
}

fn reply_code_is_success(reply: Option<&Pop3Response>) -> bool {
    matches!(reply, Some(r) if r.command.as_deref().is_some_and(|c| c.starts_with('2')))
}

fn extract_addr(argument: &str) -> String {
    let without_verb = match argument.split_once(':') {
        Some((verb, rest)) if verb.eq_ignore_ascii_case("from") || verb.eq_ignore_ascii_case("to") => rest,
        _ => argument,
    };
    without_verb.trim().trim_matches('<').trim_matches('>').to_string()
}

fn run(commands: &[Pop3Request], replies: &[Pop3Response], session: &mut SmtpSession, sinks: &Sinks, flow_ident: &str) {
    let mut res_idx = 0;
    for cmd in commands {
        let upper = cmd.command.to_ascii_uppercase();
        match upper.as_str() {
            "MAIL" => {
                if reply_code_is_success(replies.get(res_idx)) {
                    session.mail_from = Some(extract_addr(&cmd.argument));
                }
                res_idx += 1;
            }
            "RCPT" => {
                if reply_code_is_success(replies.get(res_idx)) {
                    session.rcpt_to.push(extract_addr(&cmd.argument));
                }
                res_idx += 1;
            }
            "AUTH" => {
                let reply_success = matches!(replies.get(res_idx), Some(r) if r.command.as_deref() == Some("235"));
                if reply_success {
                    let user = cmd.argument.split_whitespace().nth(1).unwrap_or(&cmd.argument).to_string();
                    session.authenticated_user = Some(user.clone());
                    sinks.credentials.write(Credential {
                        timestamp: session.timestamp,
                        service: "SMTP".to_string(),
                        flow_ident: flow_ident.to_string(),
                        user,
                        password: String::new(),
                    });
                }
                res_idx += 1;
            }
            "QUIT" => break,
            _ => {
                res_idx += 1;
            }
        }
    }
}
