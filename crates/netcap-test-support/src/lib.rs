// netcap-test-support: Shared fixture builders for the stream decoding core's
// own unit tests and cross-crate integration suites.
//
// Depends only on netcap-protocol, never netcap-core, so netcap-core can
// depend on this crate as a dev-dependency without a cycle.

use chrono::{DateTime, TimeZone, Utc};
use netcap_protocol::{Direction, FlowIdentity, Segment};
use std::net::{IpAddr, Ipv4Addr};

/// A fixed, deterministic timestamp offset from a base instant, so fixtures
/// built in different tests still compare equal.
pub fn ts(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap()
}

/// A `FlowIdentity` for `client_ip:client_port` talking to `server_ip:server_port`.
pub fn make_flow(client_port: u16, server_port: u16) -> FlowIdentity {
    FlowIdentity {
        ident: format!("10.0.0.1:{client_port}-10.0.0.2:{server_port}"),
        client_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        client_port,
        server_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        server_port,
        first_seen: ts(0),
    }
}

/// Builds one directional segment at a given offset from the flow's start.
pub fn seg(direction: Direction, offset_secs: i64, bytes: &[u8]) -> Segment {
    Segment { direction, bytes: bytes.to_vec(), timestamp: ts(offset_secs) }
}

/// Gzip-compresses `data`, for building fixtures that exercise transparent
/// decompression.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("in-memory gzip write cannot fail");
    encoder.finish().expect("in-memory gzip finish cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_is_deterministic_across_calls() {
        assert_eq!(ts(5), ts(5));
        assert_ne!(ts(5), ts(6));
    }

    #[test]
    fn gzip_round_trips() {
        use std::io::Read;
        let compressed = gzip(b"fixture payload");
        let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"fixture payload");
    }
}
