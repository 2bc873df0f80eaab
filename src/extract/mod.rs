//! Text surrogate extraction for uploaded blobs.
//!
//! Every recognized category has one strategy turning raw bytes into a
//! best-effort UTF-8 surrogate used only as embedding input:
//!
//! - `pdf`: page-ordered raw text
//! - `office`: docx body / pptx slide text runs from the zip container
//! - `archive`: member-name manifest, nothing decompressed
//! - `media`: multimodal model description of image/audio/video bytes
//!
//! No strategy error escapes [`extract_surrogate`]: any failure falls
//! back to the display name, which keeps the file findable by name
//! similarity.

pub mod archive;
pub mod media;
pub mod office;
pub mod pdf;

use crate::files::FileCategory;
use crate::genai::MediaDescriber;

/// Ephemeral extraction output; never persisted.
#[derive(Debug, Clone)]
pub struct Surrogate {
    pub text: String,
    /// True when the text is the display-name fallback after a failed
    /// extraction. Informational only; callers never branch on it.
    pub fallback: bool,
}

/// Extract a bounded text surrogate for a blob of the given category.
///
/// The result is trimmed and truncated to `max_chars`. It may be empty
/// (e.g. a blank document with a blank name); the orchestrator treats an
/// empty surrogate as a no-op.
pub fn extract_surrogate(
    category: FileCategory,
    name: &str,
    bytes: &[u8],
    describer: &dyn MediaDescriber,
    max_chars: usize,
) -> Surrogate {
    let attempt: anyhow::Result<String> = match category {
        FileCategory::Pdf => pdf::extract_text(bytes),
        FileCategory::Word => office::extract_document_text(bytes),
        FileCategory::Presentation => office::extract_slide_text(bytes),
        FileCategory::Archive => archive::describe_members(bytes),
        FileCategory::Image | FileCategory::Audio | FileCategory::Video => {
            media::describe(bytes, category, describer)
        }
        FileCategory::Csv | FileCategory::Spreadsheet | FileCategory::Other => {
            Ok(name.to_string())
        }
    };

    let (text, fallback) = match attempt {
        Ok(text) => (text, false),
        Err(err) => {
            log::warn!(
                "extraction failed for {name:?} ({}), falling back to name: {err:#}",
                category.as_str()
            );
            (name.to_string(), true)
        }
    };

    Surrogate {
        text: clamp(&text, max_chars),
        fallback,
    }
}

/// Trim whitespace and truncate to `max_chars` on a char boundary.
fn clamp(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        trimmed.chars().take(max_chars).collect()
    }
}
