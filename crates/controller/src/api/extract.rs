/// 请求体提取

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    Json,
};
use common::Error;
use serde::de::DeserializeOwned;

use super::ApiError;

/// JSON 请求体，格式或字段错误统一返回 400
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| Error::validation(format!("无效的请求体: {}", rejection.body_text())))?;
        Ok(ApiJson(value))
    }
}

/// 可省略的 JSON 请求体：空请求体取默认值，非空时必须能解析
pub fn optional_json<T>(body: &Bytes) -> Result<T, ApiError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError(Error::validation(format!("无效的请求体: {}", e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::link::StartCaptureDto;

    #[test]
    fn test_optional_json() {
        let empty: StartCaptureDto = optional_json(&Bytes::new()).unwrap();
        assert!(empty.capture_file_name.is_none());

        let dto: StartCaptureDto =
            optional_json(&Bytes::from_static(br#"{"capture_file_name": "a.pcap"}"#)).unwrap();
        assert_eq!(dto.capture_file_name.as_deref(), Some("a.pcap"));

        let err = optional_json::<StartCaptureDto>(&Bytes::from_static(b"{not json")).unwrap_err();
        assert!(matches!(err.0, Error::Validation(_)));
    }
}
