//! File sink (spec §4.6): content-addressed-by-type storage tree on disk.
//!
//! Grounded on `services/forwarder/src/storage/journal.rs`'s open/retry
//! approach to a small single-writer-per-key persistence layer, applied here
//! to filesystem paths instead of SQLite rows: existence-check-then-rename
//! is racy across flows, and correctness is preserved the same way — the
//! loop retries until a name is free, so at most one flow wins each name.

use crate::error::SinkError;
use crate::sniff;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use netcap_protocol::FileArtifact;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const MAX_PATH_BYTES: usize = 250;

pub trait FileArtifactWriter: Send + Sync {
    fn write(&self, artifact: &FileArtifact) -> Result<(), SinkError>;
}

pub struct FileSink {
    storage_root: PathBuf,
    writer: Box<dyn FileArtifactWriter>,
    count: AtomicU64,
    error_count: AtomicU64,
}

/// Everything the caller knows about one extracted body.
pub struct ExtractedFile<'a> {
    pub timestamp: DateTime<Utc>,
    pub logical_name: &'a str,
    pub body: Vec<u8>,
    /// Declared `Content-Encoding`/`Transfer-Encoding`, if any.
    pub content_encoding: Option<&'a str>,
    /// True if the source decoder hit a `Truncated`/`ProtocolParse` error
    /// while producing `body`.
    pub decode_error: bool,
    pub flow_ident: &'a str,
    pub source: &'a str,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
}

impl FileSink {
    pub fn new(storage_root: PathBuf, writer: Box<dyn FileArtifactWriter>) -> Self {
        FileSink { storage_root, writer, count: AtomicU64::new(0), error_count: AtomicU64::new(0) }
    }

    /// Writes `file.body` under the content-addressed tree and records a
    /// `FileArtifact`. Returns `None` for a zero-length body, which is
    /// dropped before any path computation (spec §4.6).
    pub fn save(&self, file: ExtractedFile) -> Option<FileArtifact> {
        if file.body.is_empty() {
            return None;
        }

        let (detected_type, ext) = sniff::detect(&file.body);
        let type_dir = self.storage_root.join(sanitize_type_dir(&detected_type));

        let mut base = clean_filename(&format!("{}-{}", file.logical_name, flow_id_base(file.flow_ident)));
        if type_dir.join(&base) == self.storage_root {
            base = "noname".to_string();
        }
        if file.decode_error {
            base = format!("incomplete-{}", base);
        }

        let path = unique_path(&type_dir, &base, &ext);
        let path = truncate_path(path);

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, path = %parent.display(), "failed to create file storage directory");
                return None;
            }
        }
        if let Err(e) = std::fs::write(&path, &file.body) {
            self.error_count.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, path = %path.display(), "failed to write extracted file");
            return None;
        }

        let mut stored_len = file.body.len();
        if let Some(enc) = file.content_encoding {
            if matches!(enc.trim().to_ascii_lowercase().as_str(), "gzip" | "deflate") {
                match sniff::decode_content_encoding(&file.body, enc) {
                    Ok(decompressed) => {
                        stored_len = decompressed.len();
                        if let Err(e) = std::fs::write(&path, &decompressed) {
                            tracing::warn!(error = %e, path = %path.display(), "failed to write decompressed file");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "file sink decompression failed, keeping compressed bytes"),
                }
            }
        }

        let stored_bytes = std::fs::read(&path).unwrap_or_default();
        let md5_hex = hex_md5(&stored_bytes);

        let artifact = FileArtifact {
            timestamp: file.timestamp,
            name: file.logical_name.to_string(),
            length: stored_len as u64,
            md5: md5_hex,
            path: path.to_string_lossy().to_string(),
            flow_ident: file.flow_ident.to_string(),
            source: file.source.to_string(),
            content_type: detected_type,
            src_ip: file.src_ip,
            dst_ip: file.dst_ip,
        };

        match self.writer.write(&artifact) {
            Ok(()) => {
                self.count.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "file artifact record write failed");
            }
        }
        Some(artifact)
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

fn sanitize_type_dir(content_type: &str) -> String {
    clean_filename(content_type)
}

/// Mimics `path.Base`: the last `/`-separated component.
fn flow_id_base(flow_ident: &str) -> &str {
    flow_ident.rsplit('/').next().unwrap_or(flow_ident)
}

/// Replaces anything not safe on a filesystem with `_`.
fn clean_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

fn unique_path(dir: &Path, base: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{base}{ext}"));
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 1u64;
    loop {
        let candidate = dir.join(format!("{base}-{n}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn truncate_path(path: PathBuf) -> PathBuf {
    let s = path.to_string_lossy().to_string();
    if s.len() <= MAX_PATH_BYTES {
        return path;
    }
    let mut cut = MAX_PATH_BYTES.saturating_sub(3);
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    PathBuf::from(format!("{}...", &s[..cut]))
}

fn hex_md5(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
