//! Enrichment client: derive product copy from an image or a prompt.
//!
//! | Call | Retries | Failure |
//! |---|---|---|
//! | [`describe_image`](EnrichmentClient::describe_image) | none | logged, `None` |
//! | [`describe_and_title`](EnrichmentClient::describe_and_title) | none | `Ok(None)` on unparseable text, `Err` on transport |
//! | [`generate_text`](EnrichmentClient::generate_text) | [`RetryPolicy`] | [`EnrichError::NoValidResponse`] |
//!
//! The image paths are opportunistic conveniences, so they make one attempt
//! and never hold up ingestion. Only explicit text generation retries.
//!
//! Without a transport every call is a no-op: the image paths return
//! nothing, and `generate_text` reports [`EnrichError::NotConfigured`]
//! without touching the network.

use super::extract::extract_structured_block;
use super::retry::{RetryPolicy, Sleeper, ThreadSleeper, run_with_retry};
use super::transport::{GenerateRequest, Transport, TransportError};
use crate::textual::to_raw_base64;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub const DEFAULT_BRAND: &str = "Our Brand";

/// Drafts shorter than this are not worth rewriting.
pub const MIN_DRAFT_CHARS: usize = 10;

#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("enrichment endpoint not configured")]
    NotConfigured,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("service returned empty text")]
    EmptyResponse,
    #[error("service did not respond (gave up after {attempts} attempts)")]
    NoValidResponse { attempts: u32 },
    #[error("draft must be at least {min} characters")]
    DraftTooShort { min: usize },
}

/// Title and description parsed from a combined response.
///
/// Either key may be missing, null or not a string in what the model
/// returns; such keys come back empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TitledDescription {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        _ => Ok(String::new()),
    }
}

pub struct EnrichmentClient {
    transport: Option<Box<dyn Transport>>,
    brand: String,
    retry: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl EnrichmentClient {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Some(transport),
            ..Self::disabled()
        }
    }

    /// A client with no endpoint.
    pub fn disabled() -> Self {
        Self {
            transport: None,
            brand: DEFAULT_BRAND.to_string(),
            retry: RetryPolicy::default(),
            sleeper: Box::new(ThreadSleeper),
        }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    /// Single-attempt marketing description of an image.
    pub fn describe_image(&self, data: &[u8], mime_type: &str) -> Option<String> {
        let transport = self.transport.as_deref()?;
        let request =
            GenerateRequest::with_image(description_prompt(&self.brand), to_raw_base64(data), mime_type);
        match transport.post(&request) {
            Ok(response) => {
                let text = response.text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "image description failed");
                None
            }
        }
    }

    /// Single-attempt title and description of an image.
    ///
    /// `Ok(None)` when the reply holds no parseable `{...}` block; callers
    /// should fall back to [`describe_image`](Self::describe_image).
    pub fn describe_and_title(
        &self,
        data: &[u8],
        mime_type: &str,
    ) -> Result<Option<TitledDescription>, EnrichError> {
        let Some(transport) = self.transport.as_deref() else {
            return Ok(None);
        };
        let request =
            GenerateRequest::with_image(title_prompt(&self.brand), to_raw_base64(data), mime_type);
        let response = transport.post(&request)?;
        Ok(parse_titled_description(&response.text))
    }

    /// Text for an arbitrary prompt, retried per the client's [`RetryPolicy`].
    pub fn generate_text(&self, prompt: &str) -> Result<String, EnrichError> {
        let transport = self.transport.as_deref().ok_or(EnrichError::NotConfigured)?;
        let request = GenerateRequest::text(prompt);

        run_with_retry(&self.retry, self.sleeper.as_ref(), |_| -> Result<String, EnrichError> {
            let response = transport.post(&request)?;
            let text = response.text.trim();
            if text.is_empty() {
                return Err(EnrichError::EmptyResponse);
            }
            Ok(text.to_string())
        })
        .map_err(|exhausted| EnrichError::NoValidResponse {
            attempts: exhausted.attempts,
        })
    }

    /// Rewrite a rough product draft into short marketing copy.
    pub fn rewrite_description(&self, draft: &str) -> Result<String, EnrichError> {
        let draft = draft.trim();
        if draft.chars().count() < MIN_DRAFT_CHARS {
            return Err(EnrichError::DraftTooShort {
                min: MIN_DRAFT_CHARS,
            });
        }
        self.generate_text(&rewrite_prompt(&self.brand, draft))
    }
}

/// Parse the structured block of a combined reply, if there is one.
pub fn parse_titled_description(text: &str) -> Option<TitledDescription> {
    let Some(block) = extract_structured_block(text) else {
        tracing::warn!(response = %text, "no structured block in title/description reply");
        return None;
    };
    match serde_json::from_str(block) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(error = %e, response = %text, "unparseable title/description reply");
            None
        }
    }
}

fn description_prompt(brand: &str) -> String {
    format!(
        "Look at this photo of a handcrafted piece by '{brand}' and write a short, evocative \
         marketing description.\n\
         Rules:\n\
         - 2 sentences (230 characters max).\n\
         - Sensory, poetic tone.\n\
         - Highlight beauty, natural materials and the connection with nature.\n\
         - No technical or process details.\n\
         - No quotes, lists or alternatives.\n\
         Return only the description."
    )
}

fn title_prompt(brand: &str) -> String {
    format!(
        "Look at this photo of a handcrafted piece by '{brand}'. Return minified JSON with the \
         keys: {{\"title\":\"<short evocative name, 2-4 words, no brand, no extra quotes>\",\
         \"description\":\"<1-2 evocative marketing sentences, no quotes>\"}}. Only the JSON."
    )
}

fn rewrite_prompt(brand: &str, draft: &str) -> String {
    format!(
        "Rewrite the following description of a handmade piece by '{brand}'. Make it short \
         (2 sentences), appealing and focused on selling it. Original description: \"{draft}\"\n\
         Rules:\n\
         - Poetic, evocative tone.\n\
         - Keep it brief (2 sentences).\n\
         - Highlight its beauty and connection with nature.\n\
         - No technical or manufacturing details.\n\
         - Do not offer options. Return only the final text without quotes."
    )
}
