//! `DocumentExtractor` (§6 document upload): the seam between the HTTP
//! boundary and file-format parsing. Text extraction from PDF/DOCX/XLSX
//! is explicitly out of scope for the core (§1 "Out of scope") - this
//! crate only validates extension/size and hands raw bytes to whichever
//! extractor a deployment injects into [`crate::state::AppState`].
//!
//! Plain-text formats (`.txt`, `.csv`, `.tsv`) need no external model, so
//! [`PlainTextExtractor`] handles them directly: `.txt` is decoded as
//! UTF-8 with lossy replacement of invalid sequences, `.csv`/`.tsv` are
//! reflowed into the pipe-delimited (`" | "`) row format the chunker and
//! tabular query engine expect, using the `csv` crate as the
//! delimiter-aware reader.

use blinder_core::{BlinderError, BlinderResult, ValidationError};

/// Extracts plain text from an uploaded file's raw bytes, given its
/// declared content type / filename extension. Implementations for
/// PDF/DOCX/XLSX are injected by the deployment (not provided here, per
/// §1); [`PlainTextExtractor`] covers everything this crate can do
/// without an external parser.
pub trait DocumentExtractor: Send + Sync {
    /// Returns `Ok(None)` when this extractor does not handle the given
    /// extension, so [`extract`] can fall through to the next one.
    fn try_extract(&self, extension: &str, bytes: &[u8]) -> BlinderResult<Option<String>>;
}

/// Handles `.txt`, `.csv`, `.tsv` without any external dependency.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl DocumentExtractor for PlainTextExtractor {
    fn try_extract(&self, extension: &str, bytes: &[u8]) -> BlinderResult<Option<String>> {
        match extension {
            "txt" => Ok(Some(String::from_utf8_lossy(bytes).into_owned())),
            "csv" => Ok(Some(reflow_delimited(bytes, b','))),
            "tsv" => Ok(Some(reflow_delimited(bytes, b'\t'))),
            _ => Ok(None),
        }
    }
}

/// Re-reads delimiter-separated bytes and rejoins every row with the
/// `" | "` separator the chunker (§4.9) and tabular query engine (§4.11)
/// expect, regardless of the original delimiter. Malformed rows are kept
/// as best-effort single-field rows rather than failing the whole
/// upload - one bad line should not block blinding the rest of the file.
fn reflow_delimited(bytes: &[u8], delimiter: u8) -> String {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut lines = Vec::new();
    for record in reader.records().flatten() {
        let row: Vec<&str> = record.iter().collect();
        if row.iter().any(|cell| !cell.trim().is_empty()) {
            lines.push(row.join(" | "));
        }
    }
    lines.join("\n")
}

/// Runs every configured extractor in order, falling back to the plain
/// one last. `extension` is the lowercased filename suffix without the
/// dot (§6 accepted extensions list).
pub fn extract_text(
    extension: &str,
    bytes: &[u8],
    extra: Option<&dyn DocumentExtractor>,
) -> BlinderResult<String> {
    if let Some(extractor) = extra {
        if let Some(text) = extractor.try_extract(extension, bytes)? {
            return Ok(text);
        }
    }
    if let Some(text) = PlainTextExtractor.try_extract(extension, bytes)? {
        return Ok(text);
    }
    Err(BlinderError::Validation(ValidationError(format!(
        "no extractor is configured for .{extension} files; this deployment only parses .txt/.csv/.tsv without an injected extractor"
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_reads_utf8_lossily() {
        let text = extract_text("txt", b"hello world", None).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn csv_reflows_to_pipe_delimited_rows() {
        let text = extract_text("csv", b"name,age\nJane,30\nJohn,40", None).unwrap();
        assert_eq!(text, "name | age\nJane | 30\nJohn | 40");
    }

    #[test]
    fn tsv_reflows_to_pipe_delimited_rows() {
        let text = extract_text("tsv", b"name\tage\nJane\t30", None).unwrap();
        assert_eq!(text, "name | age\nJane | 30");
    }

    #[test]
    fn unsupported_extension_without_injected_extractor_fails() {
        let err = extract_text("pdf", b"%PDF-1.4", None).unwrap_err();
        assert!(matches!(err, BlinderError::Validation(_)));
    }

    #[test]
    fn injected_extractor_takes_priority() {
        struct FakePdf;
        impl DocumentExtractor for FakePdf {
            fn try_extract(&self, extension: &str, _bytes: &[u8]) -> BlinderResult<Option<String>> {
                if extension == "pdf" {
                    Ok(Some("extracted pdf text".to_string()))
                } else {
                    Ok(None)
                }
            }
        }
        let text = extract_text("pdf", b"%PDF-1.4", Some(&FakePdf)).unwrap();
        assert_eq!(text, "extracted pdf text");
    }
}
