//! Vision extraction: book listings from shelf photos via the Gemini
//! `generateContent` REST endpoint.
//!
//! The model is treated as an opaque oracle: one request per image, no
//! retries, no streaming, and whatever text comes back is returned
//! verbatim for the parser to defend against. An empty response is not
//! an error; it means zero items were detected.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::Client;
use serde_json::Value;

use crate::config::Config;
use crate::error::InventoryError;

const HTTP_TIMEOUT_SECS: u64 = 60;
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Instruction for the interactive per-shelf mode: two fields per line,
/// reading order top to bottom.
pub const SHELF_PROMPT: &str = "Analyze the attached photo of a stack of books.\n\
    Identify ALL books you can read, from top to bottom.\n\
    Return each book as a separate line in this format: \"Title\";\"Author\".\n\
    Use \"N/A\" when a field is unknown.\n\
    Return only these lines.";

/// Instruction for the batch-catalog mode: three fields per line.
pub const CATALOG_PROMPT: &str = "Analyze the attached photo of book spines.\n\
    For every recognizable book, extract the title, the author(s), and the publisher.\n\
    Return the result as plain CSV text, one line per book, with fields separated\n\
    by a semicolon (;), in this format: \"Title\";\"Author(s)\";\"Publisher\".\n\
    Use \"N/A\" for any field you cannot read.\n\
    Return only the CSV lines, without any extra commentary.";

/// Blocking client for the vision endpoint. Owns its API key and HTTP
/// connection pool; construct one per process and pass it around.
pub struct VisionClient {
    api_key: String,
    model: String,
    client: Client,
}

impl VisionClient {
    pub fn new(config: &Config) -> Result<VisionClient, InventoryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|err| InventoryError::Config(err.to_string()))?;
        Ok(VisionClient {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
        })
    }

    /// Send one image with the given instruction and return the raw
    /// text of the response, which may be empty.
    pub fn extract(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
        instruction: &str,
    ) -> Result<String, InventoryError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_BASE_URL,
            self.model,
            urlencoding::encode(&self.api_key)
        );
        let body = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": instruction },
                    { "inlineData": {
                        "mimeType": mime_type,
                        "data": STANDARD.encode(image_bytes)
                    }}
                ]
            }]
        });

        log::debug!("vision request model={} mime={}", self.model, mime_type);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|err| InventoryError::Extraction(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            log::warn!("vision endpoint returned {}: {}", status, detail);
            return Err(InventoryError::Extraction(format!(
                "vision endpoint returned {}",
                status
            )));
        }

        let data: Value = response
            .json()
            .map_err(|err| InventoryError::Extraction(err.to_string()))?;
        Ok(response_text(&data).trim().to_string())
    }
}

/// Pull the first candidate's text part out of the response envelope.
/// A missing part means the model detected nothing, not a failure.
fn response_text(data: &Value) -> &str {
    data.get("candidates")
        .and_then(|value| value.as_array())
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|value| value.as_array())
        .and_then(|parts| parts.first())
        .and_then(|part| part.get("text"))
        .and_then(|text| text.as_str())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::{response_text, VisionClient, SHELF_PROMPT};
    use crate::config::Config;

    #[test]
    fn reads_text_from_a_wellformed_envelope() {
        let data = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "\"Dune\";\"Frank Herbert\"" }] }
            }]
        });
        assert_eq!(response_text(&data), "\"Dune\";\"Frank Herbert\"");
    }

    #[test]
    fn missing_candidates_or_parts_read_as_empty() {
        for data in [
            serde_json::json!({}),
            serde_json::json!({ "candidates": [] }),
            serde_json::json!({ "candidates": [{ "content": { "parts": [] } }] }),
            serde_json::json!({ "candidates": [{ "content": { "parts": [{}] } }] }),
        ] {
            assert_eq!(response_text(&data), "");
        }
    }

    #[test]
    #[ignore = "network probe for manual debugging"]
    fn live_extract_probe() {
        let config = Config::from_env().expect("GOOGLE_API_KEY must be set for the probe");
        let client = VisionClient::new(&config).unwrap();
        let image = std::env::var("SPINES_PROBE_IMAGE").expect("SPINES_PROBE_IMAGE must be set");
        let bytes = std::fs::read(&image).unwrap();
        let mime = crate::intake::sniff_image(&bytes).unwrap();
        let text = client.extract(&bytes, mime, SHELF_PROMPT).unwrap();
        println!("probe image={} response:\n{}", image, text);
    }
}
