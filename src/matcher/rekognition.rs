use crate::matcher::{best_candidate, MatcherClient, MatcherError};
use crate::model::{BoundingBox, Enrollment, ImageEvent, MatchCandidate};
use async_trait::async_trait;
use aws_sdk_rekognition::error::{DisplayErrorContext, SdkError};
use aws_sdk_rekognition::operation::delete_faces::DeleteFacesError;
use aws_sdk_rekognition::operation::index_faces::IndexFacesError;
use aws_sdk_rekognition::operation::search_faces_by_image::SearchFacesByImageError;
use aws_sdk_rekognition::types::{FaceMatch, Image, QualityFilter, S3Object};
use tracing::{info, instrument, warn};

/// [`MatcherClient`] backed by an Amazon Rekognition face collection.
#[derive(Debug, Clone)]
pub struct RekognitionMatcher {
    client: aws_sdk_rekognition::Client,
    collection_id: String,
    match_threshold: f32,
    max_candidates: u32,
}

impl RekognitionMatcher {
    pub fn new(
        client: aws_sdk_rekognition::Client,
        collection_id: impl Into<String>,
        match_threshold: f32,
        max_candidates: u32,
    ) -> Self {
        Self {
            client,
            collection_id: collection_id.into(),
            match_threshold,
            max_candidates,
        }
    }
}

#[async_trait]
impl MatcherClient for RekognitionMatcher {
    #[instrument(skip_all, fields(collection_id = %self.collection_id, key = %event.object_key))]
    async fn resolve(&self, event: &ImageEvent) -> Result<Option<MatchCandidate>, MatcherError> {
        let output = self
            .client
            .search_faces_by_image()
            .collection_id(&self.collection_id)
            .image(image_ref(event))
            .face_match_threshold(self.match_threshold)
            .max_faces(i32::try_from(self.max_candidates).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|err| classify(err, is_invalid_search_image))?;

        info!("face matches returned: {}", output.face_matches().len());

        Ok(best_candidate(
            output.face_matches().iter().filter_map(candidate_from_match),
        ))
    }

    #[instrument(skip_all, fields(collection_id = %self.collection_id, key = %event.object_key))]
    async fn enroll(
        &self,
        event: &ImageEvent,
        identity_id: &str,
    ) -> Result<Option<Enrollment>, MatcherError> {
        let output = self
            .client
            .index_faces()
            .collection_id(&self.collection_id)
            .image(image_ref(event))
            .external_image_id(identity_id)
            .max_faces(1)
            .quality_filter(QualityFilter::Auto)
            .send()
            .await
            .map_err(|err| classify(err, is_invalid_index_image))?;

        if !output.unindexed_faces().is_empty() {
            warn!("faces left unindexed: {}", output.unindexed_faces().len());
        }

        let enrollment = output
            .face_records()
            .iter()
            .filter_map(|record| record.face())
            .find_map(|face| {
                Some(Enrollment {
                    face_record_id: face.face_id()?.to_string(),
                    confidence: face.confidence().unwrap_or_default(),
                    bounding_box: face.bounding_box().map(bounding_box),
                })
            });

        Ok(enrollment)
    }

    #[instrument(skip(self), fields(collection_id = %self.collection_id))]
    async fn discard(&self, face_record_id: &str) -> Result<(), MatcherError> {
        let output = self
            .client
            .delete_faces()
            .collection_id(&self.collection_id)
            .face_ids(face_record_id)
            .send()
            .await
            .map_err(|err| classify(err, |_: &DeleteFacesError| false))?;

        info!("faces deleted: {}", output.deleted_faces().len());
        Ok(())
    }
}

fn image_ref(event: &ImageEvent) -> Image {
    Image::builder()
        .s3_object(
            S3Object::builder()
                .bucket(&event.source_bucket)
                .name(&event.object_key)
                .build(),
        )
        .build()
}

fn candidate_from_match(face_match: &FaceMatch) -> Option<MatchCandidate> {
    let face = face_match.face()?;
    let Some(identity_id) = face.external_image_id() else {
        warn!(face_id = ?face.face_id(), "matched face has no external image id");
        return None;
    };

    Some(MatchCandidate {
        identity_id: identity_id.to_string(),
        confidence: face_match.similarity().unwrap_or_default(),
        bounding_box: face.bounding_box().map(bounding_box),
    })
}

fn bounding_box(value: &aws_sdk_rekognition::types::BoundingBox) -> BoundingBox {
    BoundingBox {
        width: value.width().unwrap_or_default(),
        height: value.height().unwrap_or_default(),
        left: value.left().unwrap_or_default(),
        top: value.top().unwrap_or_default(),
    }
}

// InvalidParameter is also what Rekognition answers when no face is detected.
fn is_invalid_search_image(err: &SearchFacesByImageError) -> bool {
    err.is_invalid_image_format_exception()
        || err.is_invalid_s3_object_exception()
        || err.is_image_too_large_exception()
        || err.is_invalid_parameter_exception()
}

fn is_invalid_index_image(err: &IndexFacesError) -> bool {
    err.is_invalid_image_format_exception()
        || err.is_invalid_s3_object_exception()
        || err.is_image_too_large_exception()
        || err.is_invalid_parameter_exception()
}

fn classify<E, R>(err: SdkError<E, R>, invalid_image: impl Fn(&E) -> bool) -> MatcherError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let detail = DisplayErrorContext(&err).to_string();
    match err.as_service_error() {
        Some(service_error) if invalid_image(service_error) => MatcherError::InvalidImage(detail),
        _ => MatcherError::Unavailable(detail),
    }
}
