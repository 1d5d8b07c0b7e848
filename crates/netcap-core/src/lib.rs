//! Application-layer stream decoding core.
//!
//! Consumes reassembled, directional TCP byte streams per flow and produces
//! typed records (HTTP, POP3, SMTP) plus extracted artifacts (credentials,
//! files). Packet capture, transport reassembly, record serialization
//! containers, and configuration loading are external collaborators; this
//! crate only specifies the interfaces it consumes from and exposes to them.

pub mod dispatch;
pub mod error;
pub mod flow;
pub mod http;
pub mod pop3;
pub mod registry;
pub mod sinks;
pub mod smtp;
pub mod sniff;
mod util;

pub use dispatch::dispatch_flow;
pub use error::{DecodeError, SinkError};
pub use flow::FlowReader;
pub use registry::{Decoder, Registry};
pub use sinks::{CredentialSink, CredentialWriter, ExtractedFile, FileArtifactWriter, FileSink, RecordSink, RecordWriter, Sinks};
