//! Input resolution and staging.
//!
//! Callers hand the pipeline raw bytes; the CLI and the convenience entry
//! points start from a path or URL. [`load_input`] turns either into bytes
//! plus a file name. pdfium needs a file-system path, so the Parse stage
//! writes the bytes to a [`NamedTempFile`] via [`stage_temp_file`]; the file
//! is deleted when the handle is dropped, even on panic.

use crate::error::ExtractError;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Every PDF starts with this signature.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Bytes read from a path or URL, with a display name.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub bytes: Vec<u8>,
    /// Last path segment of the file or URL.
    pub filename: String,
    /// The path or URL as given.
    pub source: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download a URL, then check the PDF signature.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedInput, ExtractError> {
    let loaded = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    validate_pdf_bytes(&loaded.bytes)?;
    Ok(loaded)
}

/// Reject byte buffers that do not start with `%PDF`.
pub fn validate_pdf_bytes(bytes: &[u8]) -> Result<(), ExtractError> {
    if bytes.starts_with(PDF_MAGIC) {
        Ok(())
    } else {
        Err(ExtractError::NotAPdf {
            head: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
        })
    }
}

/// Write `bytes` to a fresh `.pdf` temporary file.
pub fn stage_temp_file(bytes: &[u8]) -> Result<NamedTempFile, ExtractError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("opsbot-")
        .suffix(".pdf")
        .tempfile()
        .map_err(ExtractError::TempFile)?;
    tmp.write_all(bytes).map_err(ExtractError::TempFile)?;
    tmp.flush().map_err(ExtractError::TempFile)?;
    debug!("Staged {} bytes at {}", bytes.len(), tmp.path().display());
    Ok(tmp)
}

async fn read_local(path_str: &str) -> Result<LoadedInput, ExtractError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExtractError::PermissionDenied { path: path.clone() },
        std::io::ErrorKind::NotFound => ExtractError::FileNotFound { path: path.clone() },
        _ => ExtractError::InvalidInput {
            input: format!("{}: {}", path_str, e),
        },
    })?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(LoadedInput {
        bytes,
        filename,
        source: path_str.to_string(),
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedInput, ExtractError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(LoadedInput {
        bytes: bytes.to_vec(),
        filename: filename_from_url(url),
        source: url.to_string(),
    })
}

/// Last non-empty path segment containing a dot, else `downloaded.pdf`.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://x.org/files/bl-42.pdf"), "bl-42.pdf");
        assert_eq!(filename_from_url("https://x.org/download?id=3"), "downloaded.pdf");
        assert_eq!(filename_from_url("not a url"), "downloaded.pdf");
    }

    #[test]
    fn test_validate_pdf_bytes() {
        assert!(validate_pdf_bytes(b"%PDF-1.7\n...").is_ok());
        match validate_pdf_bytes(b"GIF89a") {
            Err(ExtractError::NotAPdf { head }) => assert_eq!(head, b"GIF8"),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
        assert!(matches!(
            validate_pdf_bytes(b""),
            Err(ExtractError::NotAPdf { head }) if head.is_empty()
        ));
    }

    #[test]
    fn test_stage_temp_file_removed_on_drop() {
        let tmp = stage_temp_file(b"%PDF-1.4").unwrap();
        let path = tmp.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("pdf"));
        drop(tmp);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = load_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.pdf");
        std::fs::write(&path, b"%PDF-1.5 body").unwrap();

        let loaded = load_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(loaded.filename, "manifest.pdf");
        assert_eq!(loaded.bytes, b"%PDF-1.5 body");
    }

    #[tokio::test]
    async fn test_load_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.pdf");
        std::fs::write(&path, b"\x89PNG....").unwrap();

        let err = load_input(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::NotAPdf { .. }));
    }
}
