//! Record sink (spec §4.6): append-only writer for typed decoder records.

use crate::error::SinkError;
use netcap_protocol::Record;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Persists one record at a time to whatever external serialization module
/// is plugged in. The core only depends on this trait, never a concrete
/// container format.
pub trait RecordWriter: Send + Sync {
    fn write(&self, record: &Record) -> Result<(), SinkError>;
}

/// Append-only record sink shared process-wide across all decoders.
pub struct RecordSink {
    writer: Box<dyn RecordWriter>,
    http_count: AtomicU64,
    pop3_count: AtomicU64,
    smtp_count: AtomicU64,
    error_map: RwLock<HashMap<String, u64>>,
}

impl RecordSink {
    pub fn new(writer: Box<dyn RecordWriter>) -> Self {
        RecordSink {
            writer,
            http_count: AtomicU64::new(0),
            pop3_count: AtomicU64::new(0),
            smtp_count: AtomicU64::new(0),
            error_map: RwLock::new(HashMap::new()),
        }
    }

    pub fn write(&self, record: Record) {
        let counter = match &record {
            Record::Http(_) => &self.http_count,
            Record::Pop3(_) => &self.pop3_count,
            Record::Smtp(_) => &self.smtp_count,
        };
        match self.writer.write(&record) {
            Ok(()) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(error = %e, "record sink write failed");
                *self.error_map.write().unwrap().entry(e.to_string()).or_insert(0) += 1;
            }
        }
    }

    pub fn counts(&self) -> (u64, u64, u64) {
        (
            self.http_count.load(Ordering::Relaxed),
            self.pop3_count.load(Ordering::Relaxed),
            self.smtp_count.load(Ordering::Relaxed),
        )
    }

    pub fn error_count(&self) -> u64 {
        self.error_map.read().unwrap().values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use netcap_protocol::{HttpTransaction, SmtpSession};
    use std::net::{IpAddr, Ipv4Addr};

    struct FailingWriter;
    impl RecordWriter for FailingWriter {
        fn write(&self, _record: &Record) -> Result<(), SinkError> {
            Err(SinkError::Closed)
        }
    }

    struct OkWriter;
    impl RecordWriter for OkWriter {
        fn write(&self, _record: &Record) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn http_tx() -> HttpTransaction {
        HttpTransaction {
            timestamp: Utc::now(),
            method: "GET".into(),
            host: "a".into(),
            url: "/".into(),
            proto: "HTTP/1.1".into(),
            headers: Default::default(),
            cookies: vec![],
            form_params: Default::default(),
            user_agent: String::new(),
            referer: String::new(),
            req_content_length: -1,
            req_content_encoding: String::new(),
            req_content_type: String::new(),
            req_content_type_detected: String::new(),
            res_content_length: -1,
            res_content_encoding: String::new(),
            res_content_type: String::new(),
            res_content_type_detected: String::new(),
            status_code: 200,
            server_name: String::new(),
            src_ip: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
        }
    }

    #[test]
    fn successful_write_increments_type_counter() {
        let sink = RecordSink::new(Box::new(OkWriter));
        sink.write(Record::Http(http_tx()));
        assert_eq!(sink.counts(), (1, 0, 0));
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn failed_write_increments_error_map_not_type_counter() {
        let sink = RecordSink::new(Box::new(FailingWriter));
        sink.write(Record::Smtp(SmtpSession::default()));
        assert_eq!(sink.counts(), (0, 0, 0));
        assert_eq!(sink.error_count(), 1);
    }
}
