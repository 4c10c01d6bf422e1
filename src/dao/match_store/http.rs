//! HTTP implementation of [`RemoteStore`] against the tournament backend.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

use crate::dao::{
    match_store::RemoteStore,
    models::{PresenceEntity, RemoteMatchRecord},
    storage::{StorageError, StorageResult},
};
use crate::state::session::MatchResult;

/// Convenient result alias returning [`RemoteHttpError`] failures.
pub type RemoteHttpResult<T> = Result<T, RemoteHttpError>;

/// Failures that can occur while talking to the tournament backend.
#[derive(Debug, Error)]
pub enum RemoteHttpError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build remote client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent.
    #[error("failed to send remote request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The backend returned an unexpected status code.
    #[error("unexpected remote response status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode remote response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

impl From<RemoteHttpError> for StorageError {
    fn from(error: RemoteHttpError) -> Self {
        StorageError::unavailable(error.to_string(), error)
    }
}

/// Talks to the tournament backend over its match endpoints:
/// `matches/{id}/record`, `matches/{id}/result`, `matches/{id}/live`, and
/// `health`.
#[derive(Clone)]
pub struct RemoteHttpStore {
    client: Client,
    base_url: Arc<str>,
    token: Option<Arc<str>>,
}

impl RemoteHttpStore {
    /// Build a store against `base_url`, verifying the backend answers its
    /// health endpoint before handing the store out.
    pub async fn connect(base_url: &str, token: Option<&str>) -> RemoteHttpResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| RemoteHttpError::ClientBuilder { source })?;

        let store = Self {
            client,
            base_url: Arc::<str>::from(base_url.trim_end_matches('/')),
            token: token.map(Arc::<str>::from),
        };

        store.check_health().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.client.request(method, url);
        if let Some(ref token) = self.token {
            builder.bearer_auth(token.as_ref())
        } else {
            builder
        }
    }

    async fn send_json<T>(&self, method: Method, path: &str, body: &T) -> RemoteHttpResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .map_err(|source| RemoteHttpError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RemoteHttpError::RequestStatus {
                path: path.to_string(),
                status: response.status(),
            })
        }
    }

    async fn send_empty(&self, method: Method, path: &str) -> RemoteHttpResult<()> {
        let response =
            self.request(method, path)
                .send()
                .await
                .map_err(|source| RemoteHttpError::RequestSend {
                    path: path.to_string(),
                    source,
                })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RemoteHttpError::RequestStatus {
                path: path.to_string(),
                status: response.status(),
            })
        }
    }

    async fn get_json<T>(&self, path: &str) -> RemoteHttpResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(|source| RemoteHttpError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    RemoteHttpError::DecodeResponse {
                        path: path.to_string(),
                        source,
                    }
                })
            }
            other => Err(RemoteHttpError::RequestStatus {
                path: path.to_string(),
                status: other,
            }),
        }
    }

    async fn check_health(&self) -> RemoteHttpResult<()> {
        self.send_empty(Method::GET, "health").await
    }
}

impl RemoteStore for RemoteHttpStore {
    fn push_record(&self, record: RemoteMatchRecord) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let path = format!("matches/{}/record", record.match_id);
            store
                .send_json(Method::PUT, &path, &record)
                .await
                .map_err(Into::into)
        })
    }

    fn fetch_record(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RemoteMatchRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let path = format!("matches/{id}/record");
            store.get_json(&path).await.map_err(Into::into)
        })
    }

    fn submit_result(&self, result: MatchResult) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let path = format!("matches/{}/result", result.match_id);
            store
                .send_json(Method::POST, &path, &result)
                .await
                .map_err(Into::into)
        })
    }

    fn set_live(&self, presence: PresenceEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let path = format!("matches/{}/live", presence.match_id);
            store
                .send_json(Method::PUT, &path, &presence)
                .await
                .map_err(Into::into)
        })
    }

    fn clear_live(&self, id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let path = format!("matches/{id}/live");
            store
                .send_empty(Method::DELETE, &path)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_health().await.map_err(Into::into) })
    }
}
