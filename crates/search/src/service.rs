use serde_json::Value;
use tracing::debug;

use nl2sql_core::config::SearchConfig;

use crate::error::SearchError;

/// Authenticated REST access to an Azure AI Search service.
#[derive(Clone)]
pub struct SearchService {
    client: reqwest::Client,
    endpoint: String,
    key: String,
    api_version: String,
}

impl SearchService {
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            key: key.into(),
            api_version: api_version.into(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or(SearchError::NotConfigured("AIService__AzureSearchOptions__Endpoint"))?;
        let key = config
            .key
            .as_deref()
            .ok_or(SearchError::NotConfigured("AIService__AzureSearchOptions__Key"))?;
        Ok(Self::new(endpoint, key, config.api_version.clone()))
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}?api-version={}",
            self.endpoint,
            path.trim_start_matches('/'),
            self.api_version
        )
    }

    /// `PUT {path}` with a JSON body (create-or-update).
    pub async fn put(&self, path: &str, body: &Value) -> Result<(), SearchError> {
        let url = self.url(path);
        debug!("PUT {}", url);
        let response = self
            .client
            .put(&url)
            .header("api-key", &self.key)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    /// `POST {path}` and return the JSON response.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, SearchError> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("api-key", &self.key)
            .json(body)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// `DELETE {path}`. A missing resource counts as deleted.
    pub async fn delete(&self, path: &str) -> Result<(), SearchError> {
        let url = self.url(path);
        debug!("DELETE {}", url);
        let response = self
            .client
            .delete(&url)
            .header("api-key", &self.key)
            .send()
            .await?;
        match check(response).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, SearchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SearchError::from_status(status.as_u16(), body))
}
