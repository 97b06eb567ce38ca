use reqwest::Method;
use serde_json::{json, Value};

use super::error::ClientResult;
use super::upstream::{ApiClient, ApiResponse};

pub const PREDICT_PATH: &str = "/api/v1/predict";
pub const CONTACT_PATH: &str = "/api/v1/contact";
pub const ORDER_PATH: &str = "/api/v1/order";

/// Public site endpoints: model prediction, contact form and order form.
///
/// Bodies go out as-is and replies come back negotiated by content type, since the
/// form endpoints may answer with plain text.
#[derive(Clone)]
pub struct SiteClient {
    api: ApiClient,
}

impl SiteClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn predict(&self, input: Value) -> ClientResult<ApiResponse> {
        self.post(PREDICT_PATH, &json!({ "input": input })).await
    }

    pub async fn contact(&self, payload: &Value) -> ClientResult<ApiResponse> {
        self.post(CONTACT_PATH, payload).await
    }

    pub async fn order(&self, payload: &Value) -> ClientResult<ApiResponse> {
        self.post(ORDER_PATH, payload).await
    }

    async fn post(&self, path: &str, body: &Value) -> ClientResult<ApiResponse> {
        let out = self.api.request(path, Method::POST, Some(body), None).await?;
        log::info!("posted {path}");
        Ok(out)
    }
}
