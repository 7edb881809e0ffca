use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use mailbrief_core::config::StoreConfig;

use crate::postgrest::SelectRequest;
use crate::repositories::RepositoryError;

#[derive(Debug, Error)]
pub enum StoreConnectError {
    #[error("store api key is not a valid header value")]
    InvalidApiKey,
    #[error("could not build store http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Shared handle to the PostgREST endpoint. Cheap to clone.
#[derive(Clone, Debug)]
pub struct StoreClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

pub fn connect(config: &StoreConfig) -> Result<StoreClient, StoreConnectError> {
    StoreClient::new(&config.url, config.api_key.clone(), config.timeout())
}

impl StoreClient {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        timeout: std::time::Duration,
    ) -> Result<Self, StoreConnectError> {
        let mut key_header = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|_| StoreConnectError::InvalidApiKey)?;
        key_header.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
            .map_err(|_| StoreConnectError::InvalidApiKey)?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key_header);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder().default_headers(headers).timeout(timeout).build()?;

        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), api_key })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    /// Websocket endpoint of the realtime service on the same project.
    pub fn realtime_url(&self) -> String {
        let socket_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!(
            "{socket_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.api_key.expose_secret()
        )
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    /// Runs a select and decodes each row on its own. Rows that fail to
    /// decode are logged and skipped so one bad row does not hide the rest.
    pub async fn select<T>(&self, request: &SelectRequest) -> Result<Vec<T>, RepositoryError>
    where
        T: DeserializeOwned,
    {
        let url = self.rest_url(request.table());
        let query = request.query_pairs();
        debug!(
            event_name = "store.rest.select",
            table = request.table(),
            query = ?query,
            "querying store"
        );

        let response = self.http.get(&url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::Status { status: status.as_u16(), body });
        }

        let rows: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        Ok(decode_rows(request.table(), rows))
    }
}

pub(crate) fn decode_rows<T>(table: &str, rows: Vec<serde_json::Value>) -> Vec<T>
where
    T: DeserializeOwned,
{
    rows.into_iter()
        .filter_map(|row| {
            let id = row.get("id").cloned();
            match serde_json::from_value::<T>(row) {
                Ok(decoded) => Some(decoded),
                Err(error) => {
                    warn!(
                        event_name = "store.rest.row_skipped",
                        table,
                        row_id = ?id,
                        error = %error,
                        "skipping row that does not decode"
                    );
                    None
                }
            }
        })
        .collect()
}
