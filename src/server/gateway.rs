//! Gateway HTTP server
//!
//! Accepts connections with `hyper` on `tokio`, one task per connection, and
//! dispatches requests to the endpoint handlers:
//!
//! * `POST /api/upload-url` - issue a presigned PUT grant
//! * `POST /api/upload` - stream a multipart form file to storage
//! * `POST /api/preview-notify` - email a preview visit alert
//! * `GET /health` - liveness check (returns "ok")
//!
//! Every error response is JSON: `{"statusCode": N, "statusMessage": "..."}`.
//!
//! # Example
//!
//! ```no_run
//! use video_upload_gateway::config::ConfigLoader;
//! use video_upload_gateway::server::gateway::{AppState, GatewayServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load("config.yaml")?;
//! let server = GatewayServer::bind(AppState::from_config(config)).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::metrics;
use crate::notify::{client_ip, parse_video_url, PreviewNotifier, VisitDetails};
use crate::router::{ApiRoute, RouterError};
use crate::s3::{S3Client, StorageClientFactory};
use crate::server::ServerError;
use crate::upload::{
    MultipartUploadExecutor, PresignedUrlIssuer, UploadError, UploadOutcome, UploadRequest,
};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Largest JSON request body accepted
pub const MAX_JSON_BODY_BYTES: usize = 64 * 1024;

/// Allowance for multipart framing on top of `max_upload_bytes`
pub const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Shared, read-only state for every request
pub struct AppState {
    config: Arc<Config>,
    storage: Result<Arc<S3Client>, String>,
    notifier: PreviewNotifier,
}

impl AppState {
    /// Build the storage client and notifier once
    ///
    /// Incomplete storage configuration does not prevent startup; the upload
    /// endpoints answer 500 with the reason instead.
    pub fn from_config(config: Config) -> Self {
        let storage = match StorageClientFactory::build(&config.storage) {
            Ok(client) => {
                info!(
                    endpoint = %client.endpoint(),
                    bucket = %client.bucket(),
                    "Storage client ready"
                );
                Ok(Arc::new(client))
            }
            Err(e) => {
                warn!(error = %e, "Storage client unavailable, upload endpoints will fail");
                Err(e.to_string())
            }
        };
        let notifier = PreviewNotifier::from_config(&config.notify);

        Self {
            config: Arc::new(config),
            storage,
            notifier,
        }
    }

    /// Replace the notifier (e.g. with a custom transport)
    pub fn with_notifier(mut self, notifier: PreviewNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn storage(&self) -> Result<Arc<S3Client>, UploadError> {
        self.storage
            .as_ref()
            .map(Arc::clone)
            .map_err(|e| UploadError::Configuration(e.clone()))
    }
}

/// Gateway HTTP server
pub struct GatewayServer {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl GatewayServer {
    /// Bind to `server.address`; port 0 picks a free port
    pub async fn bind(state: AppState) -> Result<Self, ServerError> {
        let addr: SocketAddr = state
            .config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!(address = %local_addr, "Gateway bound");

        Ok(Self {
            state: Arc::new(state),
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the process exits
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves
    ///
    /// In-flight connections keep running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!(address = %self.local_addr, "Starting gateway server");
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("Gateway stopped accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move {
                        Ok::<_, Infallible>(handle_request(req, state, Some(peer_addr)).await)
                    }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    warn!(peer = %peer_addr, error = %e, "Error serving connection");
                }
            });
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    status_code: u16,
    status_message: &'a str,
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response.headers_mut().insert(
                CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn error_response(status_code: u16, message: &str) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(
        status,
        &ErrorBody {
            status_code: status.as_u16(),
            status_message: message,
        },
    )
}

fn upload_error_response(route: ApiRoute, error: &UploadError) -> Response<Full<Bytes>> {
    metrics::record_error(error.kind());
    if error.status_code() >= 500 {
        error!(route = route.name(), kind = error.kind(), error = %error, "Request failed");
    } else {
        warn!(route = route.name(), kind = error.kind(), error = %error, "Request rejected");
    }
    error_response(error.status_code(), &error.to_string())
}

fn header<'a>(req: &'a Request<Incoming>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Route and handle one request
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
    peer_addr: Option<SocketAddr>,
) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    info!(method = %method, path = %path, "Handling request");

    let route = match ApiRoute::parse(method.as_str(), &path) {
        Ok(route) => route,
        Err(e) => {
            let message = match e {
                RouterError::NotFound(_) => "Not Found".to_string(),
                RouterError::MethodNotAllowed { .. } => "Method Not Allowed".to_string(),
            };
            return error_response(e.status_code(), &message);
        }
    };

    match route {
        ApiRoute::Health => {
            let mut response = Response::new(Full::new(Bytes::from_static(b"ok")));
            response.headers_mut().insert(
                CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain"),
            );
            response
        }
        ApiRoute::UploadUrl => {
            let started = Instant::now();
            let result = handle_upload_url(req, &state).await;
            metrics::record_upload_duration("presigned", started.elapsed().as_secs_f64());
            match result {
                Ok(grant) => {
                    metrics::record_upload_success("presigned", 0);
                    json_response(StatusCode::OK, &grant)
                }
                Err(e) => {
                    metrics::record_upload_failure("presigned");
                    upload_error_response(route, &e)
                }
            }
        }
        ApiRoute::Upload => {
            let started = Instant::now();
            let result = handle_upload(req, &state).await;
            metrics::record_upload_duration("multipart", started.elapsed().as_secs_f64());
            match result {
                Ok(outcome) => {
                    metrics::record_upload_success("multipart", outcome.bytes_written);
                    json_response(StatusCode::OK, &outcome)
                }
                Err(e) => {
                    metrics::record_upload_failure("multipart");
                    upload_error_response(route, &e)
                }
            }
        }
        ApiRoute::PreviewNotify => match handle_preview_notify(req, &state, peer_addr).await {
            Ok(response) => response,
            Err(e) => upload_error_response(route, &e),
        },
    }
}

/// Read a JSON body of at most [`MAX_JSON_BODY_BYTES`]; an empty body yields `None`
async fn read_json<T: for<'de> Deserialize<'de>>(
    req: Request<Incoming>,
    invalid_message: &str,
) -> Result<Option<T>, UploadError> {
    let collected = Limited::new(req.into_body(), MAX_JSON_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<http_body_util::LengthLimitError>() {
                UploadError::TooLarge(format!(
                    "Request body exceeds {} bytes.",
                    MAX_JSON_BODY_BYTES
                ))
            } else {
                UploadError::Validation(format!("Failed to read request body: {}", e))
            }
        })?
        .to_bytes();

    if collected.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice::<Option<T>>(&collected)
        .map_err(|_| UploadError::Validation(invalid_message.to_string()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadUrlBody {
    file_name: Option<String>,
    content_type: Option<String>,
}

async fn handle_upload_url(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<crate::upload::PresignedUrlGrant, UploadError> {
    let client = state.storage()?;

    let body: UploadUrlBody = read_json(req, "Invalid JSON body.")
        .await?
        .unwrap_or_default();
    let request = UploadRequest::new(body.file_name.as_deref(), body.content_type.as_deref());

    let issuer = PresignedUrlIssuer::new(
        client,
        &state.config.storage.public_base_url,
        state.config.storage.upload_url_expires,
    );
    issuer.issue(&request).await
}

async fn handle_upload(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<UploadOutcome, UploadError> {
    let client = state.storage()?;
    let max_bytes = state.config.server.max_upload_bytes;

    let declared = header(&req, CONTENT_LENGTH.as_str()).and_then(|v| v.parse::<u64>().ok());
    if let Some(length) = declared {
        if length > max_bytes.saturating_add(FORM_OVERHEAD_BYTES) {
            return Err(UploadError::TooLarge(format!(
                "File exceeds the maximum upload size of {} bytes.",
                max_bytes
            )));
        }
    }

    let boundary = header(&req, CONTENT_TYPE.as_str())
        .and_then(|ct| multer::parse_boundary(ct).ok())
        .ok_or_else(|| UploadError::Validation("Expected a multipart/form-data body.".into()))?;

    let mut multipart = multer::Multipart::new(req.into_body().into_data_stream(), boundary);

    let mut field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => break field,
            Ok(Some(_)) => continue,
            Ok(None) => return Err(UploadError::Validation("File is required.".into())),
            Err(e) => {
                return Err(UploadError::Validation(format!(
                    "Malformed multipart body: {}",
                    e
                )))
            }
        }
    };

    let content_type = field.content_type().map(|mime| mime.to_string());
    let request = UploadRequest::new(field.file_name(), content_type.as_deref());

    // An empty file is reported before its declared type is checked
    let first = loop {
        match field.chunk().await {
            Ok(Some(chunk)) if chunk.is_empty() => continue,
            Ok(Some(chunk)) => break chunk,
            Ok(None) => return Err(UploadError::Validation("File is required.".into())),
            Err(e) => {
                return Err(UploadError::Validation(format!(
                    "Failed to read upload body: {}",
                    e
                )))
            }
        }
    };
    request.validate()?;

    let key = request.object_key();
    let executor = MultipartUploadExecutor::from_config(
        client,
        &state.config.storage.public_base_url,
        &state.config.upload,
        max_bytes,
    );

    let body = stream::iter([Ok::<Bytes, multer::Error>(first)]).chain(field);
    executor.upload(body, &key, request.content_type()).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviewNotifyBody {
    video_url: Option<serde_json::Value>,
}

async fn handle_preview_notify(
    req: Request<Incoming>,
    state: &AppState,
    peer_addr: Option<SocketAddr>,
) -> Result<Response<Full<Bytes>>, UploadError> {
    const INVALID: &str = "Invalid video url.";

    let ip = client_ip(
        header(&req, "x-forwarded-for"),
        peer_addr.map(|addr| addr.ip()),
    );
    let user_agent = header(&req, "user-agent").map(str::to_string);
    let referer = header(&req, "referer").map(str::to_string);

    let body: PreviewNotifyBody = read_json(req, INVALID).await?.unwrap_or_default();
    let video_url = body
        .video_url
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(parse_video_url)
        .ok_or_else(|| UploadError::Validation(INVALID.into()))?;

    let visit = VisitDetails::new(video_url, ip, user_agent.as_deref(), referer.as_deref());
    let outcome = state.notifier.notify(&visit).await;

    Ok(json_response(StatusCode::OK, &outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn config() -> Config {
        Config {
            server: ServerConfig {
                address: "127.0.0.1:0".into(),
                max_upload_bytes: 1024,
            },
            storage: Default::default(),
            upload: Default::default(),
            notify: Default::default(),
            metrics: Default::default(),
        }
    }

    #[test]
    fn test_state_without_storage_reports_configuration_error() {
        let state = AppState::from_config(config());
        let err = state.storage().unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("Storage config is incomplete"));
    }

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_string(&ErrorBody {
            status_code: 400,
            status_message: "File is required.",
        })
        .unwrap();
        assert_eq!(body, r#"{"statusCode":400,"statusMessage":"File is required."}"#);
    }

    #[tokio::test]
    async fn test_bind_port_zero() {
        let server = GatewayServer::bind(AppState::from_config(config()))
            .await
            .unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_invalid_address() {
        let mut config = config();
        config.server.address = "invalid".into();
        let result = GatewayServer::bind(AppState::from_config(config)).await;
        assert!(matches!(result, Err(ServerError::BindError(_))));
    }
}
