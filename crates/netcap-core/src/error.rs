//! Error kinds for the decoding core (spec §7).
//!
//! Decoders never panic on malformed input. `DecodeError` enumerates the
//! recoverable kinds a decoder can report to its per-flow entry point, which
//! counts them and continues; only `Configuration` is fatal, and only at
//! startup, outside this crate.

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("transient I/O: {0}")]
    TransientIo(String),
    #[error("protocol parse error: {0}")]
    ProtocolParse(String),
    #[error("truncated: {0}")]
    Truncated(String),
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink is closed")]
    Closed,
}
