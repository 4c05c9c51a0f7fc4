/// API 错误响应

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::Error;
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    message: String,
}

#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Compute(err) if err.is_transport() => StatusCode::SERVICE_UNAVAILABLE,
            // 后端返回的状态码原样透传
            Error::Compute(err) => err
                .status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            Error::Compute(err) => err.message.clone(),
            other => other.to_string(),
        };
        if status.is_server_error() {
            error!("请求失败 ({}): {}", status.as_u16(), message);
        }

        let body = Json(ErrorResponse {
            status: status.as_u16(),
            message,
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ComputeError;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (Error::validation("x"), StatusCode::BAD_REQUEST),
            (Error::not_found("x"), StatusCode::NOT_FOUND),
            (Error::conflict("x"), StatusCode::CONFLICT),
            (ComputeError::backend(404, "no such node").into(), StatusCode::NOT_FOUND),
            (ComputeError::backend(500, "boom").into(), StatusCode::INTERNAL_SERVER_ERROR),
            (ComputeError::timeout("slow").into(), StatusCode::SERVICE_UNAVAILABLE),
            (Error::Internal("x".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).into_response().status(), expected);
        }
    }
}
