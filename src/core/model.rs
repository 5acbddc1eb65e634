/// The language-model seam. The bridge only ever sees this trait, so any
/// backend (HTTP client, local runtime, scripted test double) plugs in here.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::prompt::PromptRequest;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("model refused: {0}")]
    Refused(String),
    #[error("model timed out")]
    Timeout,
}

/// Sampling parameters forwarded with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 300,
        }
    }
}

/// Something that turns a prompt into prose.
pub trait LanguageModel {
    fn complete(&mut self, request: &PromptRequest) -> Result<String, ModelError>;
}

impl<F> LanguageModel for F
where
    F: FnMut(&PromptRequest) -> Result<String, ModelError>,
{
    fn complete(&mut self, request: &PromptRequest) -> Result<String, ModelError> {
        self(request)
    }
}
