//! Validation of generation requests before they reach the provider.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::job::JobKind;

/// Longest prompt the provider accepts.
pub const MAX_PROMPT_LEN: u64 = 1024;

/// A generation request as submitted by the client.
///
/// Exactly one of `prompt` and `image_token` must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(length(max = MAX_PROMPT_LEN, message = "prompt must be at most 1024 characters"))]
    pub prompt: Option<String>,
    #[validate(length(min = 1, max = 512, message = "image_token must be 1-512 characters"))]
    pub image_token: Option<String>,
    /// `jpg`, `png`, `webp`, or the matching `image/*` MIME type.
    pub image_type: Option<String>,
}

/// Image encodings the provider accepts for image-to-model tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Jpg,
    Png,
    Webp,
}

impl ImageType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "image/jpg" | "image/jpeg" => Some(Self::Jpg),
            "png" | "image/png" => Some(Self::Png),
            "webp" | "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedSubmission {
    Text { prompt: String },
    Image { token: String, image_type: ImageType },
}

impl ValidatedSubmission {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Text { .. } => JobKind::TextToModel,
            Self::Image { .. } => JobKind::ImageToModel,
        }
    }
}

/// Submission failed; no job was created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("A prompt or an image token is required")]
    MissingInput,

    #[error("Provide either a prompt or an image token, not both")]
    ConflictingInput,

    #[error("Invalid submission: {0}")]
    Invalid(String),

    /// The provider refused the task.
    #[error("Provider rejected the task: {0}")]
    Rejected(String),

    /// The provider could not be reached or answered with garbage.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl SubmitRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    pub fn image(token: impl Into<String>, image_type: impl Into<String>) -> Self {
        Self {
            prompt: None,
            image_token: Some(token.into()),
            image_type: Some(image_type.into()),
        }
    }

    /// Check the request and decide which kind of job it creates.
    pub fn into_submission(self) -> Result<ValidatedSubmission, SubmissionError> {
        self.validate()
            .map_err(|e| SubmissionError::Invalid(e.to_string()))?;

        let prompt = non_blank(self.prompt);
        let token = non_blank(self.image_token);

        match (prompt, token) {
            (Some(prompt), None) => Ok(ValidatedSubmission::Text { prompt }),
            (None, Some(token)) => {
                let image_type = match self.image_type.as_deref() {
                    None => ImageType::Jpg,
                    Some(raw) => ImageType::parse(raw).ok_or_else(|| {
                        SubmissionError::Invalid(format!(
                            "Unsupported image type '{raw}'. Must be one of: jpg, png, webp"
                        ))
                    })?,
                };
                Ok(ValidatedSubmission::Image { token, image_type })
            }
            (Some(_), Some(_)) => Err(SubmissionError::ConflictingInput),
            (None, None) => Err(SubmissionError::MissingInput),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
