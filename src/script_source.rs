//! ICL script text for the command line.
//!
//! The `icl` subcommand accepts either a path to a script file or the script
//! text itself. Anything that names an existing filesystem entry is read; a
//! directory or unreadable file is reported as [`DaqError::Io`] rather than
//! being treated as script text.

use daq_core::error::DaqError;
use daq_core::limits::{validate_script_size, MAX_SCRIPT_SIZE};
use std::path::Path;

/// Resolve `source` to script text.
///
/// Files larger than [`MAX_SCRIPT_SIZE`] are rejected before they are read.
pub async fn read_script_source(source: &str) -> Result<String, DaqError> {
    let path = Path::new(source);
    let text = if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let bytes = tokio::fs::metadata(path).await?.len();
        if bytes > MAX_SCRIPT_SIZE as u64 {
            return Err(DaqError::ScriptTooLarge {
                bytes: usize::try_from(bytes).unwrap_or(usize::MAX),
                max_bytes: MAX_SCRIPT_SIZE,
            });
        }
        let text = tokio::fs::read_to_string(path).await?;
        tracing::debug!(path = %path.display(), bytes = text.len(), "Script file read");
        text
    } else {
        source.to_string()
    };

    if text.is_empty() {
        return Err(DaqError::usage("SCRIPT cannot be empty"));
    }
    validate_script_size(&text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn existing_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "SCRIPT_BEGIN(1);\nPIXEL_DISPLAY(4,2);\nSCRIPT_END(1);").unwrap();

        let text = read_script_source(file.path().to_str().unwrap())
            .await
            .unwrap();

        assert!(text.contains("PIXEL_DISPLAY(4,2)"));
    }

    #[tokio::test]
    async fn other_text_is_the_script_itself() {
        let text = read_script_source("PIXEL_DISPLAY(0,0);").await.unwrap();
        assert_eq!(text, "PIXEL_DISPLAY(0,0);");
    }

    #[tokio::test]
    async fn directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = read_script_source(dir.path().to_str().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, DaqError::Io(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn empty_script_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();

        for source in ["", file.path().to_str().unwrap()] {
            let err = read_script_source(source).await.unwrap_err();
            assert!(
                matches!(&err, DaqError::Usage(m) if m == "SCRIPT cannot be empty"),
                "{:?}",
                err
            );
        }
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_before_reading() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![b'x'; MAX_SCRIPT_SIZE + 1]).unwrap();

        let err = read_script_source(file.path().to_str().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DaqError::ScriptTooLarge { bytes, max_bytes: MAX_SCRIPT_SIZE } if bytes == MAX_SCRIPT_SIZE + 1
        ));
    }
}
