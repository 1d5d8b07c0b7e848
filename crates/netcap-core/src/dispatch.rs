//! Flow dispatch (spec §4.1, §5): selects a decoder and runs it off the
//! async executor.
//!
//! Decoding is synchronous and CPU/line-parsing bound; running it inline on
//! a `tokio` task would block the runtime the surrounding capture service
//! uses, so each flow's decode call goes through `spawn_blocking` the way
//! `services/forwarder` keeps its SQLite journal access off the executor.

use crate::error::DecodeError;
use crate::flow::FlowReader;
use crate::registry::Registry;
use crate::sinks::Sinks;
use std::sync::Arc;

/// Selects a decoder for `reader` by probing both directions' prefixes and
/// runs it to completion on a blocking thread. Returns `Ok(false)` (no
/// error, no-op) when no decoder claims the flow.
pub async fn dispatch_flow(registry: Arc<Registry>, reader: FlowReader, sinks: Sinks) -> Result<bool, DecodeError> {
    let client_prefix = reader.peek_prefix(netcap_protocol::Direction::ClientToServer, 256);
    let server_prefix = reader.peek_prefix(netcap_protocol::Direction::ServerToClient, 256);

    let Some(decoder) = registry.select(&client_prefix, &server_prefix) else {
        tracing::debug!(flow = %reader.identity.ident, "no decoder claimed this flow");
        return Ok(false);
    };

    let flow_ident = reader.identity.ident.clone();
    let decoder_name = decoder.name();
    let result = tokio::task::spawn_blocking(move || decoder.decode(reader, &sinks))
        .await
        .map_err(|e| DecodeError::TransientIo(e.to_string()))?;

    if let Err(e) = &result {
        tracing::warn!(flow = %flow_ident, decoder = decoder_name, error = %e, "decoder returned an error");
    }
    result.map(|()| true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::{CredentialSink, FileSink, RecordSink};
    use netcap_protocol::{Direction, FlowIdentity, Record, Segment};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Mutex;

    struct NoopRecordWriter;
    impl crate::sinks::RecordWriter for NoopRecordWriter {
        fn write(&self, _r: &Record) -> Result<(), crate::error::SinkError> {
            Ok(())
        }
    }
    struct NoopCredWriter;
    impl crate::sinks::CredentialWriter for NoopCredWriter {
        fn write(&self, _c: &netcap_protocol::Credential) -> Result<(), crate::error::SinkError> {
            Ok(())
        }
    }
    struct NoopFileWriter;
    impl crate::sinks::FileArtifactWriter for NoopFileWriter {
        fn write(&self, _f: &netcap_protocol::FileArtifact) -> Result<(), crate::error::SinkError> {
            Ok(())
        }
    }

    fn test_sinks() -> Sinks {
        let dir = tempfile::tempdir().unwrap();
        Sinks {
            records: Arc::new(RecordSink::new(Box::new(NoopRecordWriter))),
            credentials: Arc::new(CredentialSink::new(Box::new(NoopCredWriter))),
            files: Arc::new(FileSink::new(dir.path().to_path_buf(), Box::new(NoopFileWriter))),
        }
    }

    fn identity() -> FlowIdentity {
        FlowIdentity {
            ident: "1.1.1.1:1-2.2.2.2:80".into(),
            client_ip: IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            client_port: 1,
            server_ip: IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
            server_port: 80,
            first_seen: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn unclaimed_flow_returns_false_without_error() {
        let registry = Arc::new(Registry::with_builtins());
        let reader = FlowReader::new(
            identity(),
            vec![Segment { direction: Direction::ClientToServer, bytes: b"not a known protocol".to_vec(), timestamp: chrono::Utc::now() }],
        );
        let claimed = dispatch_flow(registry, reader, test_sinks()).await.unwrap();
        assert!(!claimed);
    }

    #[tokio::test]
    async fn http_flow_is_claimed_and_decoded() {
        let registry = Arc::new(Registry::with_builtins());
        let client = b"GET / HTTP/1.1\r\nHost: a\r\n\r\n".to_vec();
        let server = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n".to_vec();
        let reader = FlowReader::new(
            identity(),
            vec![
                Segment { direction: Direction::ClientToServer, bytes: client, timestamp: chrono::Utc::now() },
                Segment { direction: Direction::ServerToClient, bytes: server, timestamp: chrono::Utc::now() },
            ],
        );
        let _recorder = Mutex::new(Vec::<Record>::new());
        let claimed = dispatch_flow(registry, reader, test_sinks()).await.unwrap();
        assert!(claimed);
    }
}
