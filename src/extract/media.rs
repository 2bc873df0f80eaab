//! Multimodal description of image/audio/video blobs.
//!
//! The only extraction strategy with a network round-trip: the raw bytes
//! go to the multimodal model as an opaque inline payload together with a
//! fixed analysis prompt, and the model's reply is the surrogate.

use crate::files::FileCategory;
use crate::genai::MediaDescriber;

/// Bytes are sent unlabeled; the model sorts out the actual container.
const MIME_HINT: &str = "application/octet-stream";

pub fn describe(
    bytes: &[u8],
    category: FileCategory,
    describer: &dyn MediaDescriber,
) -> anyhow::Result<String> {
    let prompt = analysis_prompt(category);
    Ok(describer.describe(bytes, MIME_HINT, &prompt)?)
}

fn analysis_prompt(category: FileCategory) -> String {
    format!(
        "Analyze this {} file. \
         If it's an image, describe it in detail. \
         If it's audio or video, transcribe the spoken content and describe the visual actions. \
         Focus on extracting information useful for searching.",
        category.as_str()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genai::GenAiError;
    use std::sync::Mutex;

    /// Records the call so the prompt/mime contract can be asserted.
    struct Recorder {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl MediaDescriber for Recorder {
        fn describe(
            &self,
            _bytes: &[u8],
            mime_hint: &str,
            prompt: &str,
        ) -> Result<String, GenAiError> {
            self.calls
                .lock()
                .unwrap()
                .push((mime_hint.to_string(), prompt.to_string()));
            Ok("a description".to_string())
        }
    }

    #[test]
    fn sends_octet_stream_hint_and_category_prompt() {
        let recorder = Recorder {
            calls: Mutex::new(vec![]),
        };

        let text = describe(&[1, 2, 3], FileCategory::Audio, &recorder).unwrap();
        assert_eq!(text, "a description");

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "application/octet-stream");
        assert!(calls[0].1.starts_with("Analyze this audio file."));
        assert!(calls[0].1.contains("transcribe the spoken content"));
    }
}
