use aws_config::BehaviorVersion;
use chrono::Utc;
use face_attendance::common::errors::{into_lambda_result, Error};
use face_attendance::common::utils::{extract_request, json_response};
use face_attendance::common::{init_tracing, BUCKET_NAME_DEFAULT};
use face_attendance::config::{Mode, PipelineConfig};
use face_attendance::pipeline::Pipeline;
use face_attendance::reporter::{attendance_body, status_code, AttendanceBody};
use face_attendance::trigger::build_pipeline;
use lambda_http::http::StatusCode;
use lambda_http::{
    run, service_fn, Error as LambdaError, Request as LambdaRequest, Response as LambdaResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

const MISSING_IMAGE_KEY_ERROR: &str = "Missing required parameter: imageKey";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Request {
    pub image_key: Option<String>,
}

fn bad_request(message: &str) -> Result<Error, Error> {
    let body = AttendanceBody {
        message: message.into(),
        employee_id: None,
        date: None,
        time: None,
        error: None,
    };

    Ok(Error::HttpError(json_response(StatusCode::BAD_REQUEST, &body)?))
}

#[tracing::instrument(skip(pipeline))]
async fn process_request(
    request: LambdaRequest,
    bucket_name: &str,
    pipeline: &Pipeline,
) -> Result<LambdaResponse<String>, Error> {
    let image_key = match extract_request::<Request>(&request) {
        Ok(Request {
            image_key: Some(key),
        }) if !key.trim().is_empty() => key,
        Ok(_) | Err(Error::HttpError(_)) => return Err(bad_request(MISSING_IMAGE_KEY_ERROR)?),
        Err(err) => return Err(err),
    };

    info!("Processing imageKey: {} from bucket: {}", image_key, bucket_name);
    let notification = json!({ "bucketName": bucket_name, "objectKey": image_key });
    let outcomes = pipeline.process_notification(&notification, Utc::now()).await;

    // a flat notification always normalizes to exactly one record
    let Some(outcome) = outcomes.first() else {
        return Err(bad_request(MISSING_IMAGE_KEY_ERROR)?);
    };

    let status = StatusCode::from_u16(status_code(outcome.status))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    json_response(status, &attendance_body(outcome))
}

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    init_tracing();

    let bucket_name = std::env::var("BUCKET_NAME").unwrap_or(BUCKET_NAME_DEFAULT.into());
    let config = PipelineConfig::from_env(Mode::Attendance)?;

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let pipeline = build_pipeline(config, &aws_config);

    run(service_fn(|request: LambdaRequest| async {
        into_lambda_result(process_request(request, &bucket_name, &pipeline).await)
    }))
    .await
}
