//! services/api/src/adapters/extract.rs
//!
//! Document text extraction adapter: file bytes in, plain text out. The
//! contract is a black box to the core; this implementation accepts UTF-8
//! text uploads.

use async_trait::async_trait;
use cognify_core::ports::{DocumentExtractionService, PortError, PortResult};
use tracing::info;

/// Extracts plain text from UTF-8 document uploads.
pub struct Utf8TextExtractor;

#[async_trait]
impl DocumentExtractionService for Utf8TextExtractor {
    async fn extract(&self, file_name: &str, file_bytes: &[u8]) -> PortResult<String> {
        let text = std::str::from_utf8(file_bytes)
            .map_err(|e| PortError::ExtractionFailed(format!("'{file_name}' is not UTF-8 text: {e}")))?;

        // Strip a BOM if the upload carries one.
        let text = text.strip_prefix('\u{FEFF}').unwrap_or(text).trim();
        if text.is_empty() {
            return Err(PortError::ExtractionFailed(format!(
                "'{file_name}' contained no extractable text"
            )));
        }

        info!("Extracted {} characters from '{}'", text.len(), file_name);
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_utf8_and_strips_bom() {
        let extractor = Utf8TextExtractor;
        let text = extractor
            .extract("notes.txt", "\u{FEFF}Cells are small.".as_bytes())
            .await
            .unwrap();
        assert_eq!(text, "Cells are small.");
    }

    #[tokio::test]
    async fn non_utf8_and_empty_uploads_fail_extraction() {
        let extractor = Utf8TextExtractor;

        let err = extractor.extract("blob.bin", &[0xFF, 0xFE, 0x00]).await.unwrap_err();
        assert!(matches!(err, PortError::ExtractionFailed(_)));

        let err = extractor.extract("empty.txt", b"   ").await.unwrap_err();
        assert!(matches!(err, PortError::ExtractionFailed(_)));
    }
}
