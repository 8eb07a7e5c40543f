use lambda_http::http::StatusCode;
use lambda_http::{Request, RequestPayloadExt, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::errors::Error;

const EMPTY_PAYLOAD_ERROR: &str = "Request payload is empty";

pub fn extract_request<T: DeserializeOwned>(request: &Request) -> Result<T, Error> {
    match request.payload::<T>() {
        Ok(Some(val)) => Ok(val),
        Ok(None) => Err(Error::HttpError(text_response(
            StatusCode::BAD_REQUEST,
            EMPTY_PAYLOAD_ERROR,
        )?)),
        Err(err) => Err(Error::HttpError(text_response(
            StatusCode::BAD_REQUEST,
            err.to_string(),
        )?)),
    }
}

pub fn text_response(
    status: StatusCode,
    body: impl Into<String>,
) -> Result<Response<String>, Error> {
    let response = Response::builder()
        .status(status)
        .header("content-type", "text/html")
        .body(body.into())?;

    Ok(response)
}

pub fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<Response<String>, Error> {
    let response = Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(body)?)?;

    Ok(response)
}
