use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use face_attendance::analytics::{summarize, AttendanceSummary, DAILY_REPORT_KEY, WEEKLY_REPORT_KEY};
use face_attendance::common::init_tracing;
use face_attendance::config::{Mode, PipelineConfig};
use face_attendance::ledger::DynamoLedger;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

const ANALYTICS_BUCKET_DEFAULT: &str = "attendance-system-backend-prod";

async fn put_json<T: Serialize>(
    s3_client: &aws_sdk_s3::Client,
    bucket_name: &str,
    key: &str,
    value: &T,
) -> Result<(), Error> {
    s3_client
        .put_object()
        .bucket(bucket_name)
        .key(key)
        .content_type("application/json")
        .body(ByteStream::from(serde_json::to_vec_pretty(value)?))
        .send()
        .await
        .map_err(Box::new)?;

    info!("Wrote s3://{}/{}", bucket_name, key);
    Ok(())
}

async fn process_event(
    ledger: &DynamoLedger,
    s3_client: &aws_sdk_s3::Client,
    bucket_name: &str,
) -> Result<AttendanceSummary, Error> {
    let records = ledger.scan_records().await?;
    let summary = summarize(&records, Utc::now());

    put_json(s3_client, bucket_name, DAILY_REPORT_KEY, &summary.daily_counts).await?;
    put_json(s3_client, bucket_name, WEEKLY_REPORT_KEY, &summary.weekly_counts).await?;

    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let bucket_name =
        std::env::var("ANALYTICS_BUCKET").unwrap_or(ANALYTICS_BUCKET_DEFAULT.into());
    let config = PipelineConfig::from_env(Mode::Attendance)?;

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let ledger = DynamoLedger::new(
        aws_sdk_dynamodb::Client::new(&aws_config),
        config.table_name,
        config.profile_table_name,
        config.identity_index,
    );

    lambda_runtime::run(service_fn(|_event: LambdaEvent<Value>| async {
        process_event(&ledger, &s3_client, &bucket_name).await
    }))
    .await
}
