//! A request-decorating wrapper around [`reqwest::Client`].

use crate::error::{ClientError, ClientResult};
use reqwest::header::{HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, Request, Response};
use serde::Serialize;
use url::Url;

/// Wraps an HTTP client, injecting `Authorization` (when a token is
/// configured) and a default `User-Agent` into outbound requests that don't
/// already carry them.
#[derive(Clone)]
pub struct DecoratedTransport {
    http: reqwest::Client,
    token: Option<String>,
}

impl DecoratedTransport {
    /// Create a transport over `http`. An empty token means anonymous
    /// access.
    pub fn new(http: reqwest::Client, token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            http,
            token: (!token.is_empty()).then_some(token),
        }
    }

    /// An anonymous transport over a fresh client.
    pub fn anonymous() -> Self {
        Self::new(reqwest::Client::new(), "")
    }

    /// GET `url`, failing on transport errors and non-2xx statuses.
    pub async fn get(&self, url: Url) -> ClientResult<Response> {
        let request = Request::new(Method::GET, url);
        self.execute(request).await
    }

    /// POST `body` as JSON to `url`, failing on transport errors and non-2xx
    /// statuses.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> ClientResult<Response> {
        let request = self
            .http
            .post(url.clone())
            .json(body)
            .build()
            .map_err(|source| ClientError::Request {
                url: url.to_string(),
                source,
            })?;
        self.execute(request).await
    }

    /// Send a decorated request.
    pub async fn execute(&self, mut request: Request) -> ClientResult<Response> {
        self.decorate(&mut request)?;

        let url = request.url().to_string();
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|source| ClientError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status { status, url });
        }
        Ok(response)
    }

    fn decorate(&self, request: &mut Request) -> ClientResult<()> {
        let headers = request.headers_mut();

        if !headers.contains_key(AUTHORIZATION) {
            if let Some(token) = &self.token {
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|_| ClientError::InvalidToken)?;
                headers.insert(AUTHORIZATION, value);
            }
        }

        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, HeaderValue::from_static(granary_core::USER_AGENT));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_means_anonymous() {
        let transport = DecoratedTransport::new(reqwest::Client::new(), "");
        assert!(transport.token.is_none());

        let transport = DecoratedTransport::new(reqwest::Client::new(), "secret");
        assert_eq!(transport.token.as_deref(), Some("secret"));
    }

    #[test]
    fn decoration_fills_missing_headers_only() {
        let transport = DecoratedTransport::new(reqwest::Client::new(), "secret");

        let mut request = Request::new(Method::GET, "https://registry.example/graphql".parse().unwrap());
        transport.decorate(&mut request).unwrap();
        assert_eq!(
            request.headers().get(AUTHORIZATION).unwrap(),
            "Bearer secret"
        );
        assert_eq!(
            request.headers().get(USER_AGENT).unwrap(),
            granary_core::USER_AGENT
        );

        // Caller-provided headers win.
        let mut request = Request::new(Method::GET, "https://registry.example/graphql".parse().unwrap());
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer other"));
        transport.decorate(&mut request).unwrap();
        assert_eq!(request.headers().get(AUTHORIZATION).unwrap(), "Bearer other");
    }
}
