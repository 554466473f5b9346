use anyhow::Context;
use futures::TryFutureExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// A JSON-RPC client over HTTP.
///
/// Request ids come from a counter owned by the client. Clones share the
/// counter.
#[derive(Clone, Debug)]
pub struct Client {
    inner: reqwest::Client,
    url: url::Url,
    credentials: Option<Credentials>,
    next_id: Arc<AtomicU64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Client {
    pub fn new(url: url::Url) -> Self {
        Self {
            inner: reqwest::Client::new(),
            url,
            credentials: None,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn with_credentials(self, credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..self
        }
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }

    pub async fn send<Req, Res>(&self, method: &str, params: Req) -> anyhow::Result<Res>
    where
        Req: Debug + Serialize,
        Res: Debug + DeserializeOwned,
    {
        let request = Request {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            jsonrpc: "1.0",
            method,
            params,
        };

        let mut builder = self.inner.post(self.url.clone()).json(&request);
        if let Some(credentials) = &self.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = builder
            .send()
            .map_err(ConnectionFailed)
            .await?
            .json::<Response>()
            .await
            .context("failed to deserialize JSON response as JSON-RPC response")?;

        if let Some(error) = response.error {
            return Err(anyhow::Error::new(error))
                .with_context(|| format!("JSON-RPC request {} failed", method));
        }

        serde_json::from_value(response.result)
            .with_context(|| format!("unexpected result of JSON-RPC request {}", method))
    }
}

#[derive(Serialize, Debug)]
struct Request<'a, T> {
    id: u64,
    jsonrpc: &'a str,
    method: &'a str,
    params: T,
}

#[derive(Deserialize, Debug, PartialEq)]
struct Response {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Clone, Debug, Deserialize, thiserror::Error, PartialEq)]
#[error("JSON-RPC request failed with code {code}: {message}")]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
#[error("connection error: {0}")]
pub struct ConnectionFailed(#[from] reqwest::Error);
