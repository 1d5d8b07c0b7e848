//! Artifact sinks (spec §4.6): process-wide, internally-serializing writers
//! for records, credentials, and files.

pub mod credential;
pub mod file;
pub mod record;

pub use credential::{CredentialSink, CredentialWriter};
pub use file::{ExtractedFile, FileSink, FileArtifactWriter};
pub use record::{RecordSink, RecordWriter};

use std::sync::Arc;

/// Bundles the three sinks a decoder needs; handed to `Decoder::decode`
/// alongside the `FlowReader` (spec §4.2: "access to the sinks by name").
#[derive(Clone)]
pub struct Sinks {
    pub records: Arc<RecordSink>,
    pub credentials: Arc<CredentialSink>,
    pub files: Arc<FileSink>,
}
