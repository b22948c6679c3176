//! HTTP storage client.
//!
//! Async client for the storage service using `reqwest`. Every response is a
//! JSON [`Envelope`]; a `code` other than
//! [`SUCCESS_CODE`](capystore_protocol::SUCCESS_CODE) is surfaced as
//! [`ClientError::Server`].

use std::time::Duration;

use bytes::Bytes;
use capystore_protocol::{
    ChunkAck, CompleteSessionRequest, CompleteSessionResponse, Envelope, InitSessionRequest,
    InitSessionResponse, StatusQuery, StatusResponse, UploadChunkQuery,
};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::connection::{ClientError, ConnFuture, StorageConnection};

const USER_AGENT: &str = concat!("capystore/", env!("CARGO_PKG_VERSION"));

/// HTTP implementation of [`StorageConnection`].
pub struct HttpStorageClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStorageClient {
    /// Creates a client for the API rooted at `base_url`.
    ///
    /// `request_timeout` bounds each individual request.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self.http.post(&url).json(body).send().await?;
        decode(resp).await
    }

    async fn post_chunk(&self, query: UploadChunkQuery, data: Bytes) -> Result<ChunkAck, ClientError> {
        let url = format!("{}/chunk/upload", self.base_url);
        let resp = self
            .http
            .post(&url)
            .query(&query)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;
        decode(resp).await
    }

    async fn get_status(&self, query: StatusQuery) -> Result<StatusResponse, ClientError> {
        let url = format!("{}/chunk/status", self.base_url);
        let resp = self.http.get(&url).query(&query).send().await?;
        decode(resp).await
    }
}

/// Checks the HTTP status, then unwraps the envelope.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = resp.bytes().await?;
    let envelope: Envelope = serde_json::from_slice(&bytes)?;
    if !envelope.is_success() {
        debug!(code = envelope.code, msg = %envelope.msg, "service rejected request");
        return Err(ClientError::Server {
            code: envelope.code,
            msg: envelope.msg,
        });
    }
    envelope.parse_data()?.ok_or(ClientError::EmptyData)
}

impl StorageConnection for HttpStorageClient {
    fn init_session(&self, req: &InitSessionRequest) -> ConnFuture<'_, InitSessionResponse> {
        let req = req.clone();
        Box::pin(async move { self.post_json("/chunk/init", &req).await })
    }

    fn upload_chunk(&self, query: &UploadChunkQuery, data: Bytes) -> ConnFuture<'_, ChunkAck> {
        let query = query.clone();
        Box::pin(self.post_chunk(query, data))
    }

    fn complete_session(
        &self,
        req: &CompleteSessionRequest,
    ) -> ConnFuture<'_, CompleteSessionResponse> {
        let req = req.clone();
        Box::pin(async move { self.post_json("/chunk/complete", &req).await })
    }

    fn session_status(&self, query: &StatusQuery) -> ConnFuture<'_, StatusResponse> {
        Box::pin(self.get_status(query.clone()))
    }
}
