//! Content-type detection ("sniffing") shared by the HTTP decoder and the
//! file sink (spec §4.3, §4.6).
//!
//! Magic-byte sniffing via `infer`, falling back to a small text heuristic
//! for bodies that have no binary signature (plain text, HTML, JSON).

/// Detects a MIME type and filename extension from raw bytes.
pub fn detect(bytes: &[u8]) -> (String, String) {
    if let Some(kind) = infer::get(bytes) {
        return (kind.mime_type().to_string(), format!(".{}", kind.extension()));
    }
    text_heuristic(bytes)
}

fn text_heuristic(bytes: &[u8]) -> (String, String) {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return ("application/octet-stream".to_string(), ".bin".to_string());
    };
    let trimmed = text.trim_start();
    let lower_prefix: String = trimmed.chars().take(15).collect::<String>().to_lowercase();
    if lower_prefix.starts_with("<!doctype html") || lower_prefix.starts_with("<html") {
        return ("text/html".to_string(), ".html".to_string());
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return ("application/json".to_string(), ".json".to_string());
    }
    ("text/plain".to_string(), ".txt".to_string())
}

/// Transparently gzip/deflate-decompresses `body` when `encoding` says so.
///
/// Returns the original bytes unchanged for any other (or absent) encoding.
/// A decompression failure is reported via the returned `Result`'s `Err`
/// side; callers treat it as `DecompressionFailed` and fall back to the
/// compressed bytes with an empty detected content type (spec §4.3).
pub fn decode_content_encoding(body: &[u8], encoding: &str) -> Result<Vec<u8>, String> {
    use std::io::Read;
    match encoding.trim().to_ascii_lowercase().as_str() {
        "gzip" => {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(|e| e.to_string())?;
            Ok(out)
        }
        "deflate" => {
            let mut out = Vec::new();
            flate2::read::DeflateDecoder::new(body)
                .read_to_end(&mut out)
                .map_err(|e| e.to_string())?;
            Ok(out)
        }
        _ => Ok(body.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_json_by_heuristic() {
        let (mime, ext) = detect(br#"{"a":1}"#);
        assert_eq!(mime, "application/json");
        assert_eq!(ext, ".json");
    }

    #[test]
    fn detects_html_by_heuristic() {
        let (mime, _) = detect(b"<!DOCTYPE html><html></html>");
        assert_eq!(mime, "text/html");
    }

    #[test]
    fn plain_text_falls_back() {
        let (mime, ext) = detect(b"just some text, nothing special");
        assert_eq!(mime, "text/plain");
        assert_eq!(ext, ".txt");
    }

    #[test]
    fn gzip_round_trips_through_decode() {
        use std::io::Write;
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"hello").unwrap();
        let compressed = enc.finish().unwrap();
        let decoded = decode_content_encoding(&compressed, "gzip").unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn unsupported_encoding_passes_through() {
        let decoded = decode_content_encoding(b"raw", "identity").unwrap();
        assert_eq!(decoded, b"raw");
    }
}
