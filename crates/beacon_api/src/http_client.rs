use std::time::Duration;

use reqwest::{
    Client, IntoUrl, Request, RequestBuilder, Response, Url,
    header::{ACCEPT, HeaderMap, HeaderValue},
};

use crate::error::ClientError;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Thin reqwest wrapper that joins paths onto the configured beacon-node
/// endpoint and applies the per-request timeout.
#[derive(Debug, Clone)]
pub struct ClientWithBaseUrl {
    client: Client,
    base_url: Url,
}

impl ClientWithBaseUrl {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            base_url: url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> Result<RequestBuilder, ClientError> {
        let url = self.base_url.join(url.as_str())?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));

        Ok(self.client.get(url).headers(headers))
    }

    pub async fn execute(&self, request: Request) -> Result<Response, reqwest::Error> {
        self.client.execute(request).await
    }
}
