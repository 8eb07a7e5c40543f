use crate::ledger::{LedgerError, LedgerStore, Recorded};
use crate::model::{format_timestamp, AttendanceRecord, EmployeeProfile, OutcomeKind};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValuesOnConditionCheckFailure};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{info, instrument};

const DEDUP_KEY: &str = "DedupKey";
const EMPLOYEE_ID: &str = "EmployeeID";
const OBSERVED_AT: &str = "ObservedAt";
const OUTCOME_KIND: &str = "OutcomeKind";
const IMAGE_KEY: &str = "ImageKey";
const CONFIDENCE: &str = "Confidence";
const REGISTERED_AT: &str = "RegisteredAt";
const FACE_RECORD_ID: &str = "FaceRecordID";

type Item = HashMap<String, AttributeValue>;

/// [`LedgerStore`] over two DynamoDB tables.
///
/// The attendance table is keyed by `DedupKey`; the per-day lookup goes
/// through a global secondary index on (`EmployeeID`, `ObservedAt`). The
/// profile table is keyed by `EmployeeID`.
#[derive(Debug, Clone)]
pub struct DynamoLedger {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
    profile_table_name: String,
    identity_index: String,
}

impl DynamoLedger {
    pub fn new(
        client: aws_sdk_dynamodb::Client,
        table_name: impl Into<String>,
        profile_table_name: impl Into<String>,
        identity_index: impl Into<String>,
    ) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            profile_table_name: profile_table_name.into(),
            identity_index: identity_index.into(),
        }
    }

    /// Reads the whole attendance table, following pagination.
    #[instrument(skip(self), fields(table = %self.table_name))]
    pub async fn scan_records(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|err| classify(err, ScanError::is_resource_not_found_exception))?;

            for item in output.items() {
                records.push(AttendanceRecord::try_from(item)?);
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        info!("scanned {} records", records.len());
        Ok(records)
    }
}

// ValidationException is not modeled per operation, only its code is known.
fn classify<E, R>(err: SdkError<E, R>, missing_resource: impl Fn(&E) -> bool) -> LedgerError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let detail = DisplayErrorContext(&err).to_string();
    match err.as_service_error() {
        Some(service_error)
            if missing_resource(service_error)
                || service_error.code() == Some("ValidationException") =>
        {
            LedgerError::Rejected(detail)
        }
        _ => LedgerError::Unavailable(detail),
    }
}

#[async_trait]
impl LedgerStore for DynamoLedger {
    #[instrument(skip_all, fields(dedup_key = %record.dedup_key, identity_id = %record.identity_id))]
    async fn record_if_absent(&self, record: &AttendanceRecord) -> Result<Recorded, LedgerError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(record.into()))
            .condition_expression("attribute_not_exists(DedupKey)")
            .return_values_on_condition_check_failure(ReturnValuesOnConditionCheckFailure::AllOld)
            .send()
            .await;

        let stored = match result {
            Ok(_) => return Ok(Recorded::Inserted),
            Err(SdkError::ServiceError(val)) => match val.err() {
                PutItemError::ConditionalCheckFailedException(conflict) => conflict
                    .item()
                    .map(|item| AttendanceRecord::try_from(item))
                    .transpose()?,
                _ => {
                    return Err(classify(
                        SdkError::ServiceError(val),
                        PutItemError::is_resource_not_found_exception,
                    ))
                }
            },
            Err(err) => return Err(classify(err, PutItemError::is_resource_not_found_exception)),
        };

        info!("record already present");
        let stored = match stored {
            Some(stored) => stored,
            None => self.find_record(&record.dedup_key).await?.ok_or_else(|| {
                LedgerError::Unavailable("conflicting record is not readable yet".into())
            })?,
        };

        Ok(Recorded::Existing(stored))
    }

    #[instrument(skip(self))]
    async fn find_record(&self, dedup_key: &str) -> Result<Option<AttendanceRecord>, LedgerError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(DEDUP_KEY, AttributeValue::S(dedup_key.into()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|err| classify(err, GetItemError::is_resource_not_found_exception))?;

        output
            .item()
            .map(|item| AttendanceRecord::try_from(item))
            .transpose()
    }

    #[instrument(skip_all, fields(identity_id = %profile.identity_id))]
    async fn put_profile(&self, profile: &EmployeeProfile) -> Result<(), LedgerError> {
        self.client
            .put_item()
            .table_name(&self.profile_table_name)
            .set_item(Some(profile.into()))
            .send()
            .await
            .map_err(|err| classify(err, PutItemError::is_resource_not_found_exception))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn records_for_day(
        &self,
        identity_id: &str,
        day: &str,
    ) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .index_name(&self.identity_index)
                .key_condition_expression("#id = :id AND begins_with(#ts, :day)")
                .expression_attribute_names("#id", EMPLOYEE_ID)
                .expression_attribute_names("#ts", OBSERVED_AT)
                .expression_attribute_values(":id", AttributeValue::S(identity_id.into()))
                .expression_attribute_values(":day", AttributeValue::S(day.into()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|err| classify(err, QueryError::is_resource_not_found_exception))?;

            for item in output.items() {
                records.push(AttendanceRecord::try_from(item)?);
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(records)
    }
}

impl From<&AttendanceRecord> for Item {
    fn from(record: &AttendanceRecord) -> Self {
        let mut item = HashMap::from([
            (DEDUP_KEY.to_string(), AttributeValue::S(record.dedup_key.clone())),
            (EMPLOYEE_ID.to_string(), AttributeValue::S(record.identity_id.clone())),
            (
                OBSERVED_AT.to_string(),
                AttributeValue::S(format_timestamp(&record.observed_at)),
            ),
            (
                OUTCOME_KIND.to_string(),
                AttributeValue::S(record.outcome_kind.as_str().into()),
            ),
            (IMAGE_KEY.to_string(), AttributeValue::S(record.image_key.clone())),
        ]);
        if let Some(confidence) = record.confidence {
            item.insert(CONFIDENCE.into(), AttributeValue::N(confidence.to_string()));
        }

        item
    }
}

impl From<&EmployeeProfile> for Item {
    fn from(profile: &EmployeeProfile) -> Self {
        let mut item = HashMap::from([
            (EMPLOYEE_ID.to_string(), AttributeValue::S(profile.identity_id.clone())),
            (IMAGE_KEY.to_string(), AttributeValue::S(profile.image_key.clone())),
            (
                REGISTERED_AT.to_string(),
                AttributeValue::S(format_timestamp(&profile.registered_at)),
            ),
        ]);
        if let Some(face_record_id) = &profile.face_record_id {
            item.insert(FACE_RECORD_ID.into(), AttributeValue::S(face_record_id.clone()));
        }

        item
    }
}

impl TryFrom<&Item> for AttendanceRecord {
    type Error = LedgerError;

    fn try_from(item: &Item) -> Result<Self, Self::Error> {
        let observed_at = string_attr(item, OBSERVED_AT)?;
        let observed_at = DateTime::parse_from_rfc3339(observed_at)
            .map_err(|err| LedgerError::InvalidItem(format!("{OBSERVED_AT}: {err}")))?
            .with_timezone(&Utc);
        let outcome_kind = string_attr(item, OUTCOME_KIND)?
            .parse::<OutcomeKind>()
            .map_err(LedgerError::InvalidItem)?;
        let confidence = match item.get(CONFIDENCE) {
            Some(AttributeValue::N(val)) => Some(val.parse::<f32>().map_err(|err| {
                LedgerError::InvalidItem(format!("{CONFIDENCE}: {err}"))
            })?),
            _ => None,
        };

        Ok(Self {
            identity_id: string_attr(item, EMPLOYEE_ID)?.to_string(),
            observed_at,
            dedup_key: string_attr(item, DEDUP_KEY)?.to_string(),
            outcome_kind,
            image_key: string_attr(item, IMAGE_KEY)?.to_string(),
            confidence,
        })
    }
}

fn string_attr<'a>(item: &'a Item, name: &str) -> Result<&'a str, LedgerError> {
    match item.get(name) {
        Some(AttributeValue::S(val)) => Ok(val),
        Some(_) => Err(LedgerError::InvalidItem(format!("{name} is not a string"))),
        None => Err(LedgerError::InvalidItem(format!("{name} is missing"))),
    }
}
