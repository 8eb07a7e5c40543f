use aws_config::BehaviorVersion;
use aws_sdk_s3::presigning::PresigningConfig;
use chrono::Utc;
use face_attendance::common::errors::{into_lambda_result, Error};
use face_attendance::common::utils::json_response;
use face_attendance::common::{init_tracing, BUCKET_NAME_DEFAULT};
use face_attendance::upload::{
    UploadRequest, UploadResponse, UPLOAD_PREFIX_DEFAULT, UPLOAD_URL_EXPIRATION,
};
use lambda_http::http::StatusCode;
use lambda_http::{
    run, service_fn, Error as LambdaError, Request as LambdaRequest, RequestExt,
    Response as LambdaResponse,
};
use serde_json::json;
use tracing::{info, warn};

async fn generate_presigned_url(
    request: &UploadRequest,
    key: &str,
    bucket_name: &str,
    s3_client: &aws_sdk_s3::Client,
) -> Result<String, Error> {
    let presigned = s3_client
        .put_object()
        .bucket(bucket_name)
        .key(key)
        .content_type(&request.filetype)
        .presigned(PresigningConfig::expires_in(UPLOAD_URL_EXPIRATION).map_err(Error::lambda)?)
        .await
        .map_err(Error::lambda)?;

    Ok(presigned.uri().into())
}

#[tracing::instrument]
async fn process_request(
    request: LambdaRequest,
    bucket_name: &str,
    upload_prefix: &str,
    s3_client: &aws_sdk_s3::Client,
) -> Result<LambdaResponse<String>, Error> {
    let params = request.query_string_parameters();
    let upload = match UploadRequest::new(params.first("filename"), params.first("filetype")) {
        Ok(val) => val,
        Err(err) => {
            warn!("Rejected upload request: {}", err);
            let response =
                json_response(StatusCode::BAD_REQUEST, &json!({ "message": err.to_string() }))?;
            return Err(Error::HttpError(response));
        }
    };

    let key = upload.object_key(upload_prefix, Utc::now());
    let upload_url = generate_presigned_url(&upload, &key, bucket_name, s3_client).await?;
    info!("Presigned upload url for key: {}", key);

    json_response(StatusCode::OK, &UploadResponse { upload_url, key })
}

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    init_tracing();

    let bucket_name = std::env::var("BUCKET_NAME").unwrap_or(BUCKET_NAME_DEFAULT.into());
    let upload_prefix = std::env::var("UPLOAD_PREFIX").unwrap_or(UPLOAD_PREFIX_DEFAULT.into());
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);

    run(service_fn(|request: LambdaRequest| async {
        into_lambda_result(process_request(request, &bucket_name, &upload_prefix, &s3_client).await)
    }))
    .await
}
