//! JSON-over-HTTP access to the coordinator and data services.

use fleetload_types::{Endpoint, ErrorBody};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

pub use fleetload_types::WORKER_ID_HEADER;

/// Errors talking to a remote service.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with HTTP {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },
}

impl RemoteError {
    /// The service answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Status { status: 404, .. })
    }
}

/// Client of one remote service, identified by an optional worker id.
#[derive(Clone, Debug)]
pub struct RemoteService {
    base: Endpoint,
    id: Option<String>,
    http: reqwest::Client,
}

impl RemoteService {
    /// Create a client with a per-request timeout.
    pub fn new(
        base: Endpoint,
        id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| RemoteError::Http {
                url: base.to_string(),
                source,
            })?;
        Ok(Self { base, id, http })
    }

    /// Base URL of the service.
    pub fn base(&self) -> &Endpoint {
        &self.base
    }

    /// Worker id sent with every request.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> (String, RequestBuilder) {
        let url = self.base.join(path);
        let mut builder = self
            .http
            .request(method, &url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(id) = &self.id {
            builder = builder.header(WORKER_ID_HEADER, id);
        }
        (url, builder)
    }

    async fn execute(url: String, builder: RequestBuilder) -> Result<Response, RemoteError> {
        trace!(%url, "remote request");
        let response = builder
            .send()
            .await
            .map_err(|source| RemoteError::Http {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        Err(RemoteError::Status {
            url,
            status: status.as_u16(),
            message,
        })
    }

    /// `GET` a JSON document.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let (url, builder) = self.request(Method::GET, path);
        let response = Self::execute(url.clone(), builder).await?;
        response
            .json()
            .await
            .map_err(|source| RemoteError::Http { url, source })
    }

    /// `GET` a JSON document with URL query parameters.
    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let (url, builder) = self.request(Method::GET, path);
        let response = Self::execute(url.clone(), builder.query(query)).await?;
        response
            .json()
            .await
            .map_err(|source| RemoteError::Http { url, source })
    }

    /// `POST` a JSON document, ignoring the response body.
    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), RemoteError> {
        let (url, builder) = self.request(Method::POST, path);
        Self::execute(url, builder.json(body)).await?;
        Ok(())
    }

    /// `HEAD` a resource: `true` when present, `false` on 404.
    pub async fn head(&self, path: &str) -> Result<bool, RemoteError> {
        let (url, builder) = self.request(Method::HEAD, path);
        match Self::execute(url, builder).await {
            Ok(_) => Ok(true),
            Err(RemoteError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}
