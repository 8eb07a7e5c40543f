//! Turns inbound "object created" notifications into [`ImageEvent`]s.
//!
//! Three payload shapes are accepted:
//! - S3 notifications (`Records[].s3.bucket.name` / `Records[].s3.object.key`),
//!   delivered directly or through SQS,
//! - EventBridge "Object Created" events (`detail.bucket.name` / `detail.object.key`),
//! - the flat `{bucketName, objectKey, eventId?}` shape.

use crate::model::ImageEvent;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed event: {0}")]
pub struct MalformedEventError(pub String);

impl MalformedEventError {
    fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotification {
    #[serde(rename = "Records")]
    records: Option<Vec<RawS3Record>>,
    detail: Option<RawS3Entity>,
    id: Option<String>,
    time: Option<String>,
    bucket_name: Option<String>,
    object_key: Option<String>,
    event_id: Option<String>,
    event_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawS3Record {
    event_time: Option<String>,
    response_elements: Option<HashMap<String, Value>>,
    s3: Option<RawS3Entity>,
}

#[derive(Debug, Default, Deserialize)]
struct RawS3Entity {
    bucket: Option<RawBucket>,
    object: Option<RawObject>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBucket {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawObject {
    key: Option<String>,
    sequencer: Option<String>,
}

/// Parses a notification body, e.g. an SQS message body.
pub fn parse(body: &str, received_at: DateTime<Utc>) -> Result<Vec<ImageEvent>, MalformedEventError> {
    let raw: Value = serde_json::from_str(body)
        .map_err(|err| MalformedEventError::new(format!("invalid json: {err}")))?;

    normalize(&raw, received_at)
}

/// Produces one [`ImageEvent`] per record of the notification.
///
/// `received_at` is used when the notification carries no event time. A
/// record without a bucket or key fails the whole notification, as does a
/// notification with zero records.
pub fn normalize(
    raw: &Value,
    received_at: DateTime<Utc>,
) -> Result<Vec<ImageEvent>, MalformedEventError> {
    let notification = RawNotification::deserialize(raw)
        .map_err(|err| MalformedEventError::new(format!("unrecognized notification: {err}")))?;

    if let Some(records) = notification.records {
        if records.is_empty() {
            return Err(MalformedEventError::new("notification contains no records"));
        }

        return records
            .into_iter()
            .enumerate()
            .map(|(index, record)| from_s3_record(index, record, received_at))
            .collect();
    }

    if let Some(detail) = notification.detail {
        let (bucket, key, sequencer) = entity_parts(detail, 0)?;
        let event_id = notification.id.or(sequencer);
        let at = event_time(notification.time.as_deref(), received_at);
        return Ok(vec![build(bucket, decode_key(&key)?, event_id.as_deref(), at)]);
    }

    if notification.bucket_name.is_some() || notification.object_key.is_some() {
        let bucket = non_empty(notification.bucket_name)
            .ok_or_else(|| MalformedEventError::new("missing bucketName"))?;
        let key = non_empty(notification.object_key)
            .ok_or_else(|| MalformedEventError::new("missing objectKey"))?;
        let at = event_time(notification.event_time.as_deref(), received_at);
        return Ok(vec![build(bucket, key, notification.event_id.as_deref(), at)]);
    }

    Err(MalformedEventError::new("notification contains no records"))
}

fn from_s3_record(
    index: usize,
    record: RawS3Record,
    received_at: DateTime<Utc>,
) -> Result<ImageEvent, MalformedEventError> {
    let entity = record
        .s3
        .ok_or_else(|| MalformedEventError::new(format!("record {index}: missing s3 entity")))?;
    let (bucket, key, sequencer) = entity_parts(entity, index)?;

    let event_id = sequencer.or_else(|| {
        record
            .response_elements
            .as_ref()?
            .get("x-amz-request-id")
            .and_then(Value::as_str)
            .map(String::from)
    });
    let at = event_time(record.event_time.as_deref(), received_at);

    Ok(build(bucket, decode_key(&key)?, event_id.as_deref(), at))
}

fn entity_parts(
    entity: RawS3Entity,
    index: usize,
) -> Result<(String, String, Option<String>), MalformedEventError> {
    let bucket = non_empty(entity.bucket.and_then(|bucket| bucket.name))
        .ok_or_else(|| MalformedEventError::new(format!("record {index}: missing bucket name")))?;
    let object = entity.object.unwrap_or_default();
    let key = non_empty(object.key)
        .ok_or_else(|| MalformedEventError::new(format!("record {index}: missing object key")))?;

    Ok((bucket, key, non_empty(object.sequencer)))
}

fn build(bucket: String, key: String, event_id: Option<&str>, received_at: DateTime<Utc>) -> ImageEvent {
    let dedup_key = dedup_key(&bucket, &key, event_id);
    ImageEvent {
        source_bucket: bucket,
        object_key: key,
        received_at,
        dedup_key,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|val| !val.trim().is_empty())
}

fn event_time(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(|val| DateTime::parse_from_rfc3339(val).ok())
        .map(|val| val.with_timezone(&Utc))
        .unwrap_or(fallback)
}

/// S3 notification keys are form-encoded: `+` is a space.
pub fn decode_key(key: &str) -> Result<String, MalformedEventError> {
    urlencoding::decode(&key.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|err| MalformedEventError::new(format!("undecodable object key {key}: {err}")))
}

/// Deterministic key for a (bucket, key, event id) triple.
pub fn dedup_key(bucket: &str, key: &str, event_id: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bucket.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    if let Some(event_id) = event_id {
        hasher.update([0u8]);
        hasher.update(event_id.as_bytes());
    }

    hex::encode(hasher.finalize())
}

/// First path segment of an object key: `emp42/photo.jpg` -> `emp42`.
pub fn identity_from_key(key: &str) -> Result<String, MalformedEventError> {
    match key.split_once('/') {
        Some((prefix, rest)) if !prefix.is_empty() && !rest.is_empty() => Ok(prefix.to_string()),
        _ => Err(MalformedEventError::new(format!(
            "object key {key} has no identity folder"
        ))),
    }
}
