// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP gateway: authenticated REST calls with a one-shot 401 retry.
//!
//! Every call carries `Authorization: Bearer <access>` when a token is
//! stored. A 401 hands the call to the [`RefreshCoordinator`]; the call is
//! then re-issued once with whatever token the coordinator produced. A
//! second 401 is returned to the caller as-is.

use std::sync::Arc;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::config::ClientConfig;
use crate::error::{ApiError, ErrorCode};
use crate::model::{RefreshRequest, RefreshResponse};
use crate::refresh::RefreshCoordinator;
use crate::token::TokenStore;

pub const REFRESH_PATH: &str = "/api/token/refresh/";

/// One replayable request.
struct Call<'a> {
    method: Method,
    path: &'a str,
    query: &'a [(&'a str, String)],
    body: Option<serde_json::Value>,
}

/// REST client shared by every API wrapper.
pub struct ApiClient {
    base_url: String,
    http: Client,
    tokens: Arc<TokenStore>,
    refresh: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, tokens: Arc<TokenStore>, bus: EventBus) -> Self {
        let http = Client::builder().timeout(config.request_timeout()).build().unwrap_or_default();
        let refresh = RefreshCoordinator::new(Arc::clone(&tokens), bus);
        Self { base_url: config.api_base().to_owned(), http, tokens, refresh }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` and decode the JSON response.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let call = Call { method: Method::GET, path, query, body: None };
        self.send(&call).await
    }

    /// POST a JSON body to `path` and decode the JSON response.
    ///
    /// An empty response body decodes as JSON `null`.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::new(ErrorCode::Internal, format!("encode body: {e}")))?;
        let call = Call { method: Method::POST, path, query: &[], body: Some(body) };
        self.send(&call).await
    }

    /// Like [`post_json`](Self::post_json) but without the auth/refresh
    /// layer. Used for login and registration.
    pub async fn post_anonymous<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(method = "POST", path, "api request");
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| log_network(path, &e))?;
        let resp = check_status(path, resp).await?;
        decode(path, resp).await
    }

    async fn send<T: DeserializeOwned>(&self, call: &Call<'_>) -> Result<T, ApiError> {
        let resp = self.execute(call).await?;
        decode(call.path, resp).await
    }

    async fn execute(&self, call: &Call<'_>) -> Result<reqwest::Response, ApiError> {
        let mut token = self.tokens.access_token();
        let mut retried = false;

        loop {
            let resp = self.dispatch(call, token.as_deref()).await?;
            if resp.status() != StatusCode::UNAUTHORIZED || retried {
                return check_status(call.path, resp).await;
            }

            retried = true;
            warn!(path = call.path, "api call unauthorized, refreshing token");
            let fresh = self
                .refresh
                .refresh(token.as_deref(), |refresh| self.refresh_access(refresh))
                .await
                .map_err(|e| ApiError {
                    code: ErrorCode::Unauthorized,
                    status: Some(401),
                    message: e.to_string(),
                })?;
            token = Some(fresh);
        }
    }

    async fn dispatch(
        &self,
        call: &Call<'_>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        debug!(method = %call.method, path = call.path, auth = token.is_some(), "api request");
        let mut req = self.http.request(call.method.clone(), self.url(call.path));
        if !call.query.is_empty() {
            req = req.query(call.query);
        }
        if let Some(ref body) = call.body {
            req = req.json(body);
        }
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(|e| log_network(call.path, &e))?;
        debug!(status = resp.status().as_u16(), path = call.path, "api response");
        Ok(resp)
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Goes straight to the transport: a 401 here means the refresh token is
    /// dead, not that another refresh is needed.
    async fn refresh_access(&self, refresh: String) -> anyhow::Result<String> {
        let resp = self
            .http
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest { refresh })
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("refresh failed ({status}): {text}");
        }
        let body: RefreshResponse = resp.json().await?;
        Ok(body.access)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base_url", &self.base_url).finish()
    }
}

fn log_network(path: &str, err: &reqwest::Error) -> ApiError {
    warn!(path, err = %err, "api request failed");
    ApiError::network(err)
}

async fn check_status(path: &str, resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let err = ApiError::from_response(status.as_u16(), &body);
    warn!(path, status = status.as_u16(), err = %err.message, "api error");
    Err(err)
}

async fn decode<T: DeserializeOwned>(path: &str, resp: reqwest::Response) -> Result<T, ApiError> {
    let bytes = resp.bytes().await.map_err(|e| log_network(path, &e))?;
    let slice: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
    serde_json::from_slice(slice).map_err(|e| {
        warn!(path, err = %e, "undecodable api response");
        ApiError::new(ErrorCode::Internal, format!("invalid response from {path}: {e}"))
    })
}
