//! Credential sink (spec §4.6): append-only writer, no deduplication.

use crate::error::SinkError;
use netcap_protocol::Credential;
use std::sync::atomic::{AtomicU64, Ordering};

pub trait CredentialWriter: Send + Sync {
    fn write(&self, credential: &Credential) -> Result<(), SinkError>;
}

pub struct CredentialSink {
    writer: Box<dyn CredentialWriter>,
    count: AtomicU64,
    error_count: AtomicU64,
}

impl CredentialSink {
    pub fn new(writer: Box<dyn CredentialWriter>) -> Self {
        CredentialSink { writer, count: AtomicU64::new(0), error_count: AtomicU64::new(0) }
    }

    pub fn write(&self, credential: Credential) {
        match self.writer.write(&credential) {
            Ok(()) => {
                self.count.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(error = %e, service = %credential.service, "credential sink write failed");
                self.error_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
