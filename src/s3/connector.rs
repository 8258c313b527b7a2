//! HTTP client for the AWS SDK
//!
//! The SDK's default client reads proxy settings from the environment. This
//! one wraps a [`reqwest::Client`] built from configuration only, so the
//! outbound proxy and its bypass list are exactly what the gateway was
//! given.

use crate::network::ProxyBypass;
use aws_smithy_runtime_api::client::http::{
    HttpClient, HttpConnector, HttpConnectorFuture, HttpConnectorSettings, SharedHttpConnector,
};
use aws_smithy_runtime_api::client::orchestrator::{HttpRequest, HttpResponse};
use aws_smithy_runtime_api::client::result::ConnectorError;
use aws_smithy_runtime_api::client::runtime_components::RuntimeComponents;
use aws_smithy_runtime_api::http::StatusCode;
use aws_smithy_types::body::SdkBody;
use bytes::Bytes;
use std::time::Duration;

/// reqwest-backed [`HttpClient`] handed to the S3 SDK config
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client that never reads proxy settings from the environment
    ///
    /// When `proxy` is set, hosts in `no_proxy` are reached directly.
    pub fn new(
        proxy: Option<&str>,
        no_proxy: &ProxyBypass,
        connect_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .no_proxy()
            .connect_timeout(connect_timeout);

        if let Some(proxy_url) = proxy.filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy_url)?.no_proxy(no_proxy.to_no_proxy());
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl HttpClient for ReqwestHttpClient {
    fn http_connector(
        &self,
        _settings: &HttpConnectorSettings,
        _components: &RuntimeComponents,
    ) -> SharedHttpConnector {
        SharedHttpConnector::new(self.clone())
    }
}

impl HttpConnector for ReqwestHttpClient {
    fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
        let client = self.client.clone();
        HttpConnectorFuture::new(async move { dispatch(&client, request).await })
    }
}

async fn dispatch(
    client: &reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, ConnectorError> {
    let method = reqwest::Method::from_bytes(request.method().as_bytes())
        .map_err(|e| ConnectorError::user(e.into()))?;

    // Part bodies are always buffered before they reach the SDK
    let body = request
        .body()
        .bytes()
        .map(Bytes::copy_from_slice)
        .ok_or_else(|| ConnectorError::user("streaming request bodies are unsupported".into()))?;

    let mut outgoing = client.request(method, request.uri());
    for (name, value) in request.headers().iter() {
        // reqwest sends the body without waiting for 100 Continue
        if name.eq_ignore_ascii_case("expect") {
            continue;
        }
        outgoing = outgoing.header(name, value);
    }

    let response = outgoing.body(body).send().await.map_err(connector_error)?;

    let status = StatusCode::try_from(response.status().as_u16())
        .map_err(|e| ConnectorError::other(e.into(), None))?;
    let headers = response.headers().clone();
    let bytes = response.bytes().await.map_err(connector_error)?;

    let mut translated = HttpResponse::new(status, SdkBody::from(bytes));
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            translated
                .headers_mut()
                .try_insert(name.as_str().to_string(), value.to_string())
                .map_err(|e| ConnectorError::other(e.into(), None))?;
        }
    }
    Ok(translated)
}

fn connector_error(error: reqwest::Error) -> ConnectorError {
    if error.is_timeout() {
        ConnectorError::timeout(error.into())
    } else if error.is_connect() || error.is_request() || error.is_body() {
        ConnectorError::io(error.into())
    } else {
        ConnectorError::other(error.into(), None)
    }
}
