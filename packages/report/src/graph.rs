//! HTTP implementation of [`InsightsApi`] over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::ReportError;
use crate::api::{
    AccountsCursor, AccountsPage, ApiError, InsightsApi, ObjectsRequest, ObjectsResponse,
};
use crate::config::ReportConfig;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Fields read for each managed page.
const ACCOUNT_FIELDS: &str = "id,name,access_token";

/// Graph-style API client.
#[derive(Debug, Clone)]
pub struct GraphClient {
    client: reqwest::Client,
    api_root: String,
}

impl GraphClient {
    /// Builds a client for the API root named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ReportConfig) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_root: config.api_root(),
        })
    }

    fn objects_request(&self, request: &ObjectsRequest) -> reqwest::RequestBuilder {
        self.client.get(format!("{}/", self.api_root)).query(&[
            ("ids", request.ids.join(",").as_str()),
            ("fields", request.fields.as_str()),
            ("access_token", request.access_token.as_str()),
        ])
    }

    fn accounts_request(&self, cursor: &AccountsCursor) -> reqwest::RequestBuilder {
        match cursor {
            AccountsCursor::Start { access_token } => self
                .client
                .get(format!("{}/me/accounts", self.api_root))
                .query(&[("fields", ACCOUNT_FIELDS), ("access_token", access_token.as_str())]),
            AccountsCursor::Next(url) => self.client.get(url),
        }
    }
}

/// Sends `request` and decodes a JSON body, racing `cancel`.
async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
) -> Result<T, ApiError> {
    let exchange = async {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_body(status.as_u16(), &body));
        }
        Ok(serde_json::from_str(&body)?)
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ApiError::Cancelled),
        result = exchange => result,
    }
}

#[async_trait]
impl InsightsApi for GraphClient {
    async fn fetch_objects(
        &self,
        request: &ObjectsRequest,
        cancel: &CancellationToken,
    ) -> Result<ObjectsResponse, ApiError> {
        log::debug!("GET objects: {} ids, fields={}", request.ids.len(), request.fields);
        send_json(self.objects_request(request), cancel).await
    }

    async fn fetch_accounts_page(
        &self,
        cursor: &AccountsCursor,
        cancel: &CancellationToken,
    ) -> Result<AccountsPage, ApiError> {
        send_json(self.accounts_request(cursor), cancel).await
    }
}
