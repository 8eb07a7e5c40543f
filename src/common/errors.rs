use lambda_http::Response;
use thiserror::Error;

/// Error type of the HTTP lambdas.
///
/// `HttpError` carries a response that should be handed back to the client
/// verbatim, `LambdaError` fails the invocation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("http error response: {}", .0.status())]
    HttpError(Response<String>),
    #[error("{0}")]
    LambdaError(lambda_http::Error),
}

impl Error {
    pub fn lambda(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::LambdaError(Box::new(err))
    }
}

impl From<lambda_http::Error> for Error {
    fn from(value: lambda_http::Error) -> Self {
        Self::LambdaError(value)
    }
}

impl From<lambda_http::http::Error> for Error {
    fn from(value: lambda_http::http::Error) -> Self {
        Self::lambda(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::lambda(value)
    }
}

/// Collapses a handler result into what `lambda_http::run` expects.
pub fn into_lambda_result(
    result: Result<Response<String>, Error>,
) -> Result<Response<String>, lambda_http::Error> {
    match result {
        Ok(val) => Ok(val),
        Err(Error::HttpError(val)) => Ok(val),
        Err(Error::LambdaError(err)) => Err(err),
    }
}
