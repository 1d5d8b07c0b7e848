//! Per-flow reader (spec §4.2).
//!
//! Buffers the directional segments handed over by the (external) reassembly
//! layer and exposes a line/record reader to decoders. Implements the
//! two-queue redesign from spec §9: each direction is its own queue of
//! chunks, drained independently, instead of repeatedly rescanning one
//! merged list (which was O(n^2) on long flows).

use chrono::{DateTime, Utc};
use netcap_protocol::{Direction, FlowIdentity, Segment};
use std::collections::VecDeque;

/// One direction's remaining, not-yet-consumed chunks.
#[derive(Debug, Default)]
struct DirectionBuffer {
    chunks: VecDeque<(DateTime<Utc>, Vec<u8>)>,
    /// Bytes already consumed from the front chunk.
    offset: usize,
}

impl DirectionBuffer {
    fn push(&mut self, timestamp: DateTime<Utc>, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.chunks.push_back((timestamp, bytes));
        }
    }

    fn remaining_len(&self) -> usize {
        self.chunks
            .iter()
            .enumerate()
            .map(|(i, (_, b))| if i == 0 { b.len() - self.offset } else { b.len() })
            .sum()
    }

    /// First bytes available in this direction, used by decoder probes.
    fn peek_prefix(&self, max: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(max.min(256));
        for (i, (_, buf)) in self.chunks.iter().enumerate() {
            let start = if i == 0 { self.offset } else { 0 };
            out.extend_from_slice(&buf[start..]);
            if out.len() >= max {
                out.truncate(max);
                break;
            }
        }
        out
    }

    /// Reads one LF-terminated line (CRLF-tolerant), dropping the terminator.
    ///
    /// Returns `None` only when the direction is fully drained with nothing
    /// left to return. A trailing, unterminated tail (capture gap or
    /// mid-connection truncation) is returned once as a final "line" — EOF
    /// and an unterminated tail are treated as equivalent terminators.
    fn read_line(&mut self) -> Option<(Vec<u8>, DateTime<Utc>)> {
        if self.chunks.is_empty() {
            return None;
        }
        let start_ts = self.chunks[0].0;
        let mut out = Vec::new();
        loop {
            let Some((_, buf)) = self.chunks.front() else {
                return if out.is_empty() { None } else { Some((out, start_ts)) };
            };
            let buf_len = buf.len();
            if self.offset >= buf_len {
                self.chunks.pop_front();
                self.offset = 0;
                continue;
            }
            let buf = &self.chunks[0].1;
            if let Some(rel) = buf[self.offset..].iter().position(|&b| b == b'\n') {
                out.extend_from_slice(&buf[self.offset..self.offset + rel]);
                self.offset += rel + 1;
                if out.last() == Some(&b'\r') {
                    out.pop();
                }
                return Some((out, start_ts));
            }
            out.extend_from_slice(&buf[self.offset..]);
            self.offset = buf_len;
            self.chunks.pop_front();
            self.offset = 0;
        }
    }

    /// Reads up to `n` bytes, returning whatever is available and whether
    /// the full count was satisfied. A short read signals a truncated body.
    fn read_upto(&mut self, n: usize) -> (Vec<u8>, bool) {
        let mut out = Vec::with_capacity(n.min(64 * 1024));
        while out.len() < n {
            let Some((_, buf)) = self.chunks.front() else {
                return (out, false);
            };
            let buf_len = buf.len();
            if self.offset >= buf_len {
                self.chunks.pop_front();
                self.offset = 0;
                continue;
            }
            let need = n - out.len();
            let avail = buf_len - self.offset;
            let take = need.min(avail);
            out.extend_from_slice(&self.chunks[0].1[self.offset..self.offset + take]);
            self.offset += take;
            if self.offset >= buf_len {
                self.chunks.pop_front();
                self.offset = 0;
            }
        }
        (out, true)
    }
}

/// Scaffold handed to a decoder once a flow is selected.
///
/// Owns the per-flow mutable buffers; decoders across distinct flows run
/// concurrently (the caller is expected to invoke `Decoder::decode` from a
/// dedicated task per flow), but a single `FlowReader` is never shared
/// across threads.
pub struct FlowReader {
    pub identity: FlowIdentity,
    client: DirectionBuffer,
    server: DirectionBuffer,
}

impl FlowReader {
    pub fn new(identity: FlowIdentity, segments: Vec<Segment>) -> Self {
        let mut client = DirectionBuffer::default();
        let mut server = DirectionBuffer::default();
        for seg in segments {
            match seg.direction {
                Direction::ClientToServer => client.push(seg.timestamp, seg.bytes),
                Direction::ServerToClient => server.push(seg.timestamp, seg.bytes),
            }
        }
        FlowReader { identity, client, server }
    }

    fn buf(&mut self, dir: Direction) -> &mut DirectionBuffer {
        match dir {
            Direction::ClientToServer => &mut self.client,
            Direction::ServerToClient => &mut self.server,
        }
    }

    pub fn read_line(&mut self, dir: Direction) -> Option<(Vec<u8>, DateTime<Utc>)> {
        self.buf(dir).read_line()
    }

    pub fn read_upto(&mut self, dir: Direction, n: usize) -> (Vec<u8>, bool) {
        self.buf(dir).read_upto(n)
    }

    pub fn remaining_len(&self, dir: Direction) -> usize {
        match dir {
            Direction::ClientToServer => self.client.remaining_len(),
            Direction::ServerToClient => self.server.remaining_len(),
        }
    }

    pub fn peek_prefix(&self, dir: Direction, max: usize) -> Vec<u8> {
        match dir {
            Direction::ClientToServer => self.client.peek_prefix(max),
            Direction::ServerToClient => self.server.peek_prefix(max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::net::{IpAddr, Ipv4Addr};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn identity() -> FlowIdentity {
        FlowIdentity {
            ident: "1.2.3.4:1111-5.6.7.8:80".into(),
            client_ip: IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)),
            client_port: 1111,
            server_ip: IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8)),
            server_port: 80,
            first_seen: ts(0),
        }
    }

    #[test]
    fn reads_lines_split_across_chunks() {
        let segments = vec![
            Segment { direction: Direction::ClientToServer, bytes: b"GET / HT".to_vec(), timestamp: ts(0) },
            Segment { direction: Direction::ClientToServer, bytes: b"TP/1.1\r\n".to_vec(), timestamp: ts(1) },
        ];
        let mut reader = FlowReader::new(identity(), segments);
        let (line, when) = reader.read_line(Direction::ClientToServer).unwrap();
        assert_eq!(line, b"GET / HTTP/1.1");
        assert_eq!(when, ts(0));
        assert!(reader.read_line(Direction::ClientToServer).is_none());
    }

    #[test]
    fn unterminated_tail_counts_as_one_final_line() {
        let segments = vec![Segment {
            direction: Direction::ServerToClient,
            bytes: b"no newline here".to_vec(),
            timestamp: ts(0),
        }];
        let mut reader = FlowReader::new(identity(), segments);
        let (line, _) = reader.read_line(Direction::ServerToClient).unwrap();
        assert_eq!(line, b"no newline here");
        assert!(reader.read_line(Direction::ServerToClient).is_none());
    }

    #[test]
    fn read_upto_reports_truncation_on_short_buffer() {
        let segments = vec![Segment {
            direction: Direction::ClientToServer,
            bytes: b"12345".to_vec(),
            timestamp: ts(0),
        }];
        let mut reader = FlowReader::new(identity(), segments);
        let (bytes, complete) = reader.read_upto(Direction::ClientToServer, 10);
        assert_eq!(bytes, b"12345");
        assert!(!complete);
    }

    #[test]
    fn directions_are_independent_queues() {
        let segments = vec![
            Segment { direction: Direction::ClientToServer, bytes: b"c1\n".to_vec(), timestamp: ts(0) },
            Segment { direction: Direction::ServerToClient, bytes: b"s1\n".to_vec(), timestamp: ts(1) },
            Segment { direction: Direction::ClientToServer, bytes: b"c2\n".to_vec(), timestamp: ts(2) },
        ];
        let mut reader = FlowReader::new(identity(), segments);
        assert_eq!(reader.read_line(Direction::ClientToServer).unwrap().0, b"c1");
        assert_eq!(reader.read_line(Direction::ServerToClient).unwrap().0, b"s1");
        assert_eq!(reader.read_line(Direction::ClientToServer).unwrap().0, b"c2");
    }
}
