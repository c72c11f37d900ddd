use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{Envelope, ErrorEnvelope, MediaFile, UploadFile};
use crate::query::Query;
use crate::storage::{LocalStorage, TOKEN_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// Multipart form, one `files` part per entry.
    Files(Vec<UploadFile>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub bearer: Option<String>,
    pub body: RequestBody,
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut url = format!("{}{}", self.base_url, request.path);
        if !request.query.is_empty() {
            url.push('?');
            url.push_str(&request.query);
        }

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = self.client.request(method, &url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Files(files) => {
                let mut form = Form::new();
                for file in files {
                    let mime = file.mime_type();
                    let part = Part::bytes(file.bytes)
                        .file_name(file.name)
                        .mime_str(&mime)?;
                    form = form.part("files", part);
                }
                builder.multipart(form)
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(ApiResponse { status, body })
    }
}

/// Entry point for every backend call. Reads the bearer token from local
/// storage on each request.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    storage: LocalStorage,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, storage: LocalStorage) -> Self {
        Self { transport, storage }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            Arc::new(HttpTransport::new(&config.backend.url)),
            LocalStorage::new(&config.storage.path),
        )
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    pub fn bearer(&self) -> Option<String> {
        self.storage
            .get::<String>(TOKEN_KEY)
            .map(|token| token.into_string())
            .filter(|token| !token.is_empty())
    }

    /// Sends one request and decodes the reply. Every failure, including a
    /// reply of the wrong shape, is logged here before it is returned.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: RequestBody,
        authenticated: bool,
        shape: Shape,
    ) -> Result<T> {
        let request = ApiRequest {
            method,
            path: path.to_string(),
            query: query.to_query_string(),
            bearer: if authenticated { self.bearer() } else { None },
            body,
        };
        debug!("{} {}?{}", method, path, request.query);

        let result = self
            .transport
            .send(request)
            .await
            .and_then(|response| parse_response(&response))
            .and_then(|value| match shape {
                Shape::Enveloped => unwrap_envelope(path, value),
                Shape::Plain => decode(path, value),
            });

        if let Err(e) = &result {
            error!("{} {} failed: {}", method, path, e);
        }
        result
    }

    pub async fn get_data<T: DeserializeOwned>(&self, path: &str, query: &Query) -> Result<T> {
        self.execute(Method::Get, path, query, RequestBody::Empty, true, Shape::Enveloped)
            .await
    }

    /// Creates an entry. `payload` is wrapped as `{ "data": payload }`.
    pub async fn post_data<T: DeserializeOwned>(&self, path: &str, payload: Value) -> Result<T> {
        let body = RequestBody::Json(serde_json::json!({ "data": payload }));
        self.execute(Method::Post, path, &Query::new(), body, true, Shape::Enveloped)
            .await
    }

    /// Plain JSON endpoint without the `data` wrapper, sent with no token.
    pub async fn post_public<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        self.execute(
            Method::Post,
            path,
            &Query::new(),
            RequestBody::Json(body),
            false,
            Shape::Plain,
        )
        .await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &Query) -> Result<T> {
        self.execute(Method::Get, path, query, RequestBody::Empty, true, Shape::Plain)
            .await
    }

    pub async fn put_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &Query,
        body: Value,
    ) -> Result<T> {
        self.execute(Method::Put, path, query, RequestBody::Json(body), true, Shape::Plain)
            .await
    }

    pub async fn upload(&self, files: Vec<UploadFile>) -> Result<Vec<MediaFile>> {
        self.execute(
            Method::Post,
            "/api/upload",
            &Query::new(),
            RequestBody::Files(files),
            true,
            Shape::Plain,
        )
        .await
    }
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    /// `{ "data": ..., "meta": ... }`
    Enveloped,
    Plain,
}

fn parse_response(response: &ApiResponse) -> Result<Value> {
    if !response.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&response.body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| {
                let text = response.body.trim();
                if text.is_empty() {
                    "Unknown error".to_string()
                } else {
                    text.chars().take(200).collect()
                }
            });
        return Err(ClientError::Api {
            status: response.status,
            message,
        });
    }

    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&response.body)
        .map_err(|e| ClientError::Decode(format!("response is not JSON: {}", e)))
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ClientError::Decode(format!("{}: {}", path, e)))
}

fn unwrap_envelope<T: DeserializeOwned>(path: &str, value: Value) -> Result<T> {
    let envelope: Envelope<T> = decode(path, value)?;
    Ok(envelope.data)
}


#[cfg(test)]
mod tests {
    use super::testing::{count_events, RecordingTransport};
    use super::*;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use tracing::Level;
    use tempfile::TempDir;

    #[derive(Debug, serde::Deserialize)]
    struct Item {
        id: i64,
    }

    #[tokio::test]
    async fn bearer_comes_from_stored_token() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("kv.db").to_str().unwrap());
        storage.set_raw(TOKEN_KEY, "tok-123");

        let transport = RecordingTransport::new();
        transport.respond(200, json!({ "data": [{ "id": 1 }], "meta": {} }));
        let api = ApiClient::new(transport.clone(), storage);

        let items: Vec<Item> = api.get_data("/api/things", &Query::new()).await.unwrap();
        assert_eq!(items[0].id, 1);
        assert_eq!(transport.requests()[0].bearer.as_deref(), Some("tok-123"));
    }

    #[tokio::test]
    async fn missing_token_sends_no_authorization() {
        let transport = RecordingTransport::new();
        transport.respond(200, json!({ "data": [] }));
        let api = ApiClient::new(transport.clone(), LocalStorage::unavailable());

        let items: Vec<Item> = api.get_data("/api/things", &Query::new()).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(transport.requests()[0].bearer, None);
    }

    #[tokio::test]
    async fn error_envelope_becomes_api_error() {
        let transport = RecordingTransport::new();
        transport.respond(
            403,
            json!({ "data": null, "error": { "status": 403, "name": "ForbiddenError", "message": "Forbidden" } }),
        );
        let api = ApiClient::new(transport, LocalStorage::unavailable());

        let err = api
            .get_data::<Vec<Item>>("/api/things", &Query::new())
            .await
            .unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Forbidden");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn shape_mismatch_fails_closed() {
        let transport = RecordingTransport::new();
        transport.respond(200, json!({ "items": [] }));
        transport.respond(200, json!({ "data": [{ "name": "no id" }] }));
        let api = ApiClient::new(transport, LocalStorage::unavailable());

        for _ in 0..2 {
            let err = api
                .get_data::<Vec<Item>>("/api/things", &Query::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ClientError::Decode(_)));
        }
    }

    #[tokio::test]
    async fn public_post_skips_token_and_envelope() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("kv.db").to_str().unwrap());
        storage.set_raw(TOKEN_KEY, "stale");

        let transport = RecordingTransport::new();
        transport.respond(200, json!({ "id": 5 }));
        let api = ApiClient::new(transport.clone(), storage);

        let item: Item = api.post_public("/api/auth/local", json!({})).await.unwrap();
        assert_eq!(item.id, 5);
        assert_eq!(transport.requests()[0].bearer, None);
    }

    #[tokio::test]
    async fn decode_failure_is_logged_once() {
        let (_guard, errors) = count_events(Level::ERROR);
        let transport = RecordingTransport::new();
        transport.respond(200, json!({ "items": [] }));
        let api = ApiClient::new(transport, LocalStorage::unavailable());

        let err = api
            .get_data::<Vec<Item>>("/api/things", &Query::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Decode(_)));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn every_helper_logs_its_decode_failure() {
        let (_guard, errors) = count_events(Level::ERROR);
        let transport = RecordingTransport::new();
        for _ in 0..4 {
            transport.respond(200, json!({ "unexpected": true }));
        }
        let api = ApiClient::new(transport, LocalStorage::unavailable());

        assert!(api.get_json::<Item>("/api/users/me", &Query::new()).await.is_err());
        assert!(api.post_public::<Item>("/api/auth/local", json!({})).await.is_err());
        assert!(api
            .put_json::<Item>("/api/users/7", &Query::new(), json!({}))
            .await
            .is_err());
        assert!(api.upload(vec![UploadFile::new("a.txt", vec![1])]).await.is_err());

        assert_eq!(errors.load(Ordering::SeqCst), 4);
    }
}
