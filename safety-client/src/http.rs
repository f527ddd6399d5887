//! REST client for the remote structured store
//!
//! Speaks the PostgREST dialect: tables under `/rest/v1/<table>`, query
//! parameters for `select` / `order`, and `Prefer` / `Accept` headers to get
//! the inserted row back as a single object.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::{DataAccessError, DataResult};

/// Media type asking PostgREST for one object instead of an array
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Error body returned by the REST layer
#[derive(serde::Deserialize)]
struct StoreErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// HTTP client for the store's REST endpoint
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    /// Create a new REST client from configuration
    pub fn new(config: &ClientConfig) -> DataResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .default_headers(default_headers(config)?)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a table endpoint
    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Read rows from a table
    ///
    /// `query` carries PostgREST parameters such as `select` and `order`.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> DataResult<Vec<T>> {
        let response = self
            .client
            .get(self.table_url(table))
            .query(query)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Insert one row and return it as stored (with server-assigned columns)
    pub async fn insert_one<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        table: &str,
        row: &B,
    ) -> DataResult<T> {
        let response = self
            .client
            .post(self.table_url(table))
            .header("prefer", "return=representation")
            .header(ACCEPT, SINGLE_OBJECT)
            .json(&[row])
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Handle the HTTP response
    async fn handle_response<T: DeserializeOwned>(response: Response) -> DataResult<T> {
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await?;
            return Err(store_error(status.as_u16(), &text));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            DataAccessError::InvalidResponse(format!("Unexpected response body: {e}"))
        })
    }
}

fn default_headers(config: &ClientConfig) -> DataResult<HeaderMap> {
    let value = |raw: &str| {
        HeaderValue::from_str(raw)
            .map_err(|e| DataAccessError::Config(format!("Invalid header value: {e}")))
    };

    let mut headers = HeaderMap::new();
    headers.insert("apikey", value(&config.anon_key)?);
    headers.insert(
        AUTHORIZATION,
        value(&format!("Bearer {}", config.bearer_token()))?,
    );
    headers.insert("accept-profile", value(&config.schema)?);
    headers.insert("content-profile", value(&config.schema)?);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

/// Map a non-2xx response to a [`DataAccessError::Store`]
fn store_error(status: u16, body: &str) -> DataAccessError {
    match serde_json::from_str::<StoreErrorBody>(body) {
        Ok(err) => {
            let mut message = err.message;
            if let Some(details) = err.details.filter(|d| !d.is_empty()) {
                message = format!("{message} ({details})");
            }
            if let Some(hint) = err.hint.filter(|h| !h.is_empty()) {
                message = format!("{message}; hint: {hint}");
            }
            DataAccessError::Store {
                status,
                code: err.code,
                message,
            }
        }
        Err(_) => DataAccessError::Store {
            status,
            code: None,
            message: if body.is_empty() {
                format!("HTTP {status}")
            } else {
                body.to_string()
            },
        },
    }
}
