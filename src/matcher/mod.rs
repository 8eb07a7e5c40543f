mod rekognition;

pub use rekognition::RekognitionMatcher;

use crate::model::{Enrollment, ImageEvent, MatchCandidate};
use async_trait::async_trait;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MatcherError {
    /// Transport or service failure, worth redelivering
    #[error("matcher unavailable: {0}")]
    Unavailable(String),
    /// The referenced object cannot be used as a face image
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

impl MatcherError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, MatcherError::Unavailable(_))
    }
}

/// Face identification against a named collection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatcherClient: Send + Sync {
    /// Best candidate above the configured threshold, if any.
    async fn resolve(&self, event: &ImageEvent) -> Result<Option<MatchCandidate>, MatcherError>;

    /// Adds the face in `event` to the collection under `identity_id`.
    /// `None` when no face could be indexed.
    async fn enroll(
        &self,
        event: &ImageEvent,
        identity_id: &str,
    ) -> Result<Option<Enrollment>, MatcherError>;

    /// Removes a face previously added by [`MatcherClient::enroll`].
    async fn discard(&self, face_record_id: &str) -> Result<(), MatcherError>;
}

pub fn best_candidate(
    candidates: impl IntoIterator<Item = MatchCandidate>,
) -> Option<MatchCandidate> {
    candidates.into_iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(Ordering::Equal)
    })
}
