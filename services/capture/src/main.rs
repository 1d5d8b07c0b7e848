// capture: wires a configuration file, the artifact sinks, and the decoder
// registry together. It does not capture packets or reassemble TCP streams
// itself — those stay external collaborators — but it is the one place they
// plug into netcap-core.

mod config;

use clap::{Arg, ArgAction, Command};
use netcap_core::sinks::{CredentialSink, CredentialWriter, FileArtifactWriter, FileSink, RecordSink, RecordWriter};
use netcap_core::{Registry, Sinks};
use netcap_protocol::{Credential, FileArtifact, Record};
use std::path::PathBuf;
use tracing::{info, warn};

/// Writes each record as one JSON line to stdout. A real deployment hands
/// these off to the external record serialization module (spec §6); this is
/// the minimal stand-in that keeps the binary runnable on its own.
struct StdoutRecordWriter;
impl RecordWriter for StdoutRecordWriter {
    fn write(&self, record: &Record) -> Result<(), netcap_core::SinkError> {
        let line = serde_json::to_string(record).map_err(|e| netcap_core::SinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        println!("{line}");
        Ok(())
    }
}

struct StdoutCredentialWriter;
impl CredentialWriter for StdoutCredentialWriter {
    fn write(&self, credential: &Credential) -> Result<(), netcap_core::SinkError> {
        let line =
            serde_json::to_string(credential).map_err(|e| netcap_core::SinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        eprintln!("credential: {line}");
        Ok(())
    }
}

struct LoggingFileWriter;
impl FileArtifactWriter for LoggingFileWriter {
    fn write(&self, artifact: &FileArtifact) -> Result<(), netcap_core::SinkError> {
        info!(path = %artifact.path, length = artifact.length, "file artifact written");
        Ok(())
    }
}

fn build_registry(enabled: &[String]) -> Registry {
    let mut registry = Registry::new();
    for tag in enabled {
        match tag.as_str() {
            "http" => registry.register(std::sync::Arc::new(netcap_core::http::HttpDecoder::default())),
            "pop3" => registry.register(std::sync::Arc::new(netcap_core::pop3::Pop3Decoder::default())),
            "smtp" => registry.register(std::sync::Arc::new(netcap_core::smtp::SmtpDecoder::default())),
            other => warn!(tag = other, "unknown decoder tag ignored"),
        }
    }
    registry
}

#[tokio::main]
async fn main() {
    let matches = Command::new("netcap-capture")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Application-layer stream decoding front-end")
        .arg(
            Arg::new("iface")
                .long("iface")
                .value_name("IFACE")
                .help("Network interface to capture from (stub: capture is an external collaborator)"),
        )
        .arg(
            Arg::new("out")
                .long("out")
                .value_name("PATH")
                .help("Record output path (stub: record serialization is an external collaborator)"),
        )
        .arg(
            Arg::new("file_storage")
                .long("fileStorage")
                .value_name("DIR")
                .help("Artifact storage root; overrides the config file's file_storage"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Path to the capture TOML config file"),
        )
        .arg(
            Arg::new("bpf")
                .long("bpf")
                .value_name("FILTER")
                .help("BPF capture filter (stub: capture is an external collaborator)"),
        )
        .arg(Arg::new("quiet").long("quiet").action(ArgAction::SetTrue).help("Suppress info-level logging"))
        .get_matches();

    let quiet = matches.get_flag("quiet");
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(if quiet { "warn" } else { "info" })
        }))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "capture starting");

    let cfg = match matches.get_one::<String>("config") {
        Some(path) => config::load_config_from_path(std::path::Path::new(path)),
        None => config::load_config(),
    };
    let mut cfg = match cfg {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };
    if let Some(override_dir) = matches.get_one::<String>("file_storage") {
        cfg.file_storage = override_dir.clone();
    }

    info!(
        file_storage = %cfg.file_storage,
        decoders = ?cfg.enabled_decoders,
        bind = %cfg.bind,
        "config loaded"
    );
    if let Some(iface) = matches.get_one::<String>("iface") {
        info!(iface, "interface requested (capture itself is external)");
    }
    if let Some(bpf) = matches.get_one::<String>("bpf") {
        info!(bpf, "BPF filter requested (capture itself is external)");
    }

    std::fs::create_dir_all(&cfg.file_storage).unwrap_or_else(|e| {
        eprintln!("FATAL: failed to create file storage root '{}': {e}", cfg.file_storage);
        std::process::exit(1);
    });

    let sinks = Sinks {
        records: std::sync::Arc::new(RecordSink::new(Box::new(StdoutRecordWriter))),
        credentials: std::sync::Arc::new(CredentialSink::new(Box::new(StdoutCredentialWriter))),
        files: std::sync::Arc::new(FileSink::new(PathBuf::from(&cfg.file_storage), Box::new(LoggingFileWriter))),
    };
    let registry = std::sync::Arc::new(build_registry(&cfg.enabled_decoders));

    info!("capture initialized; awaiting flows from the external reassembly source");
    let _ = (sinks, registry);
    // The reassembly/capture source is external (§6 Non-goals); wiring it in
    // is a single hook: for each completed flow, call
    // `netcap_core::dispatch_flow(registry.clone(), reader, sinks.clone())`.
}
