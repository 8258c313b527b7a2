//! Gateway Server Integration Tests
//!
//! Starts the gateway on an ephemeral port, backed by a mock S3 server, and
//! drives every endpoint over real HTTP.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use regex_lite::Regex;
    use reqwest::multipart::{Form, Part};
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use video_upload_gateway::config::{
        Config, MetricsConfig, NotifyConfig, ServerConfig, StorageConfig, UploadConfig,
    };
    use video_upload_gateway::notify::{
        MailTransport, NotificationEmail, PreviewNotifier, SendFailure,
    };
    use video_upload_gateway::server::{AppState, GatewayServer};
    use wiremock::matchers::{method, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY_PATTERN: &str = r"^/test-bucket/videos/\d+-[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}-";

    fn storage_config(endpoint: &str) -> StorageConfig {
        StorageConfig {
            endpoint: endpoint.to_string(),
            access_key: "test-access".into(),
            secret_key: "test-secret".into(),
            bucket: "test-bucket".into(),
            ..StorageConfig::default()
        }
    }

    fn config(storage: StorageConfig) -> Config {
        Config {
            server: ServerConfig {
                address: "127.0.0.1:0".into(),
                max_upload_bytes: 64 * 1024 * 1024,
            },
            storage,
            upload: UploadConfig::default(),
            notify: NotifyConfig::default(),
            metrics: MetricsConfig {
                enabled: false,
                port: 0,
            },
        }
    }

    async fn start(state: AppState) -> SocketAddr {
        let server = GatewayServer::bind(state).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.run());
        addr
    }

    fn http() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    async fn mount_multipart_backend(mock_server: &MockServer, file_pattern: &str) {
        let key = format!("{}{}$", KEY_PATTERN, file_pattern);

        Mock::given(method("POST"))
            .and(path_regex(key.as_str()))
            .and(query_param("uploads", ""))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<InitiateMultipartUploadResult><UploadId>gw-upload</UploadId></InitiateMultipartUploadResult>",
            ))
            .expect(1)
            .mount(mock_server)
            .await;

        Mock::given(method("PUT"))
            .and(path_regex(key.as_str()))
            .and(query_param("uploadId", "gw-upload"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"part\""))
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path_regex(key.as_str()))
            .and(query_param("uploadId", "gw-upload"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<CompleteMultipartUploadResult><ETag>\"done\"</ETag></CompleteMultipartUploadResult>",
            ))
            .expect(1)
            .mount(mock_server)
            .await;
    }

    /// Write a raw request head and read back whatever the server answers
    async fn raw_request(addr: SocketAddr, head: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(head.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        let mut buf = [0u8; 4096];
        let read = async {
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        response.extend_from_slice(&buf[..n]);
                        if String::from_utf8_lossy(&response).contains("statusMessage") {
                            break;
                        }
                    }
                }
            }
        };
        let _ = tokio::time::timeout(Duration::from_secs(5), read).await;
        String::from_utf8_lossy(&response).into_owned()
    }

    // ========================================================================
    // Routing
    // ========================================================================

    #[tokio::test]
    async fn test_health() {
        let addr = start(AppState::from_config(config(StorageConfig::default()))).await;

        let response = http()
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_unknown_path_and_wrong_method() {
        let addr = start(AppState::from_config(config(StorageConfig::default()))).await;
        let client = http();

        let response = client
            .get(format!("http://{}/nope", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"statusCode": 404, "statusMessage": "Not Found"}));

        let response = client
            .get(format!("http://{}/api/upload-url", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 405);
    }

    // ========================================================================
    // POST /api/upload-url
    // ========================================================================

    #[tokio::test]
    async fn test_upload_url_issues_grant() {
        let mut storage = storage_config("http://127.0.0.1:9000");
        storage.public_base_url = "https://cdn.example.com/".into();
        let addr = start(AppState::from_config(config(storage))).await;

        let response = http()
            .post(format!("http://{}/api/upload-url", addr))
            .json(&json!({"fileName": "clip one.mp4", "contentType": "video/mp4"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();

        assert_eq!(body["expiresIn"], 3600);
        let object_url = body["objectUrl"].as_str().unwrap();
        let pattern = Regex::new(
            r"^https://cdn\.example\.com/test-bucket/videos/\d+-[0-9a-f-]{36}-clip_one\.mp4$",
        )
        .unwrap();
        assert!(pattern.is_match(object_url), "unexpected objectUrl {}", object_url);

        let signed_url = body["signedUrl"].as_str().unwrap();
        assert!(signed_url.starts_with("http://127.0.0.1:9000/test-bucket/videos/"));
        assert!(signed_url.contains("X-Amz-Expires=3600"));
        assert!(signed_url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn test_upload_url_defaults_for_empty_body() {
        let addr = start(AppState::from_config(config(storage_config(
            "http://127.0.0.1:9000",
        ))))
        .await;

        let response = http()
            .post(format!("http://{}/api/upload-url", addr))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert!(body["objectUrl"]
            .as_str()
            .unwrap()
            .ends_with("-video.mp4"));
    }

    #[tokio::test]
    async fn test_upload_url_rejects_non_video() {
        let addr = start(AppState::from_config(config(storage_config(
            "http://127.0.0.1:9000",
        ))))
        .await;

        let response = http()
            .post(format!("http://{}/api/upload-url", addr))
            .json(&json!({"fileName": "a.png", "contentType": "image/png"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(
            body,
            json!({"statusCode": 400, "statusMessage": "Only video files are allowed."})
        );
    }

    #[tokio::test]
    async fn test_upload_url_rejects_invalid_json() {
        let addr = start(AppState::from_config(config(storage_config(
            "http://127.0.0.1:9000",
        ))))
        .await;

        let response = http()
            .post(format!("http://{}/api/upload-url", addr))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_incomplete_storage_config_is_500() {
        let mut storage = storage_config("http://127.0.0.1:9000");
        storage.secret_key.clear();
        storage.bucket.clear();
        let addr = start(AppState::from_config(config(storage))).await;

        let response = http()
            .post(format!("http://{}/api/upload-url", addr))
            .json(&json!({"fileName": "a.mp4", "contentType": "video/mp4"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        let body: Value = response.json().await.unwrap();
        let message = body["statusMessage"].as_str().unwrap();
        assert!(message.starts_with("Storage config is incomplete"));
        assert!(message.contains("secret_key"));
        assert!(message.contains("bucket"));
    }

    // ========================================================================
    // POST /api/upload
    // ========================================================================

    #[tokio::test]
    async fn test_upload_streams_file_to_storage() {
        let mock_server = MockServer::start().await;
        mount_multipart_backend(&mock_server, r"clip_one\.mp4").await;
        let addr = start(AppState::from_config(config(storage_config(
            &mock_server.uri(),
        ))))
        .await;

        let form = Form::new().part(
            "file",
            Part::bytes(vec![1u8; 4096])
                .file_name("clip one.mp4")
                .mime_str("video/mp4")
                .unwrap(),
        );
        let response = http()
            .post(format!("http://{}/api/upload", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        let object_url = body["objectUrl"].as_str().unwrap();
        assert!(object_url.starts_with(&format!("{}/test-bucket/videos/", mock_server.uri())));
        assert!(object_url.ends_with("-clip_one.mp4"));
        assert_eq!(body.as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_skips_other_fields() {
        let mock_server = MockServer::start().await;
        mount_multipart_backend(&mock_server, r"video\.mp4").await;
        let addr = start(AppState::from_config(config(storage_config(
            &mock_server.uri(),
        ))))
        .await;

        let form = Form::new().text("title", "holiday").part(
            "file",
            Part::bytes(vec![2u8; 100]).mime_str("video/quicktime").unwrap(),
        );
        let response = http()
            .post(format!("http://{}/api/upload", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_upload_without_file_is_400() {
        let mock_server = MockServer::start().await;
        let addr = start(AppState::from_config(config(storage_config(
            &mock_server.uri(),
        ))))
        .await;

        let form = Form::new().text("title", "no file");
        let response = http()
            .post(format!("http://{}/api/upload", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["statusMessage"], "File is required.");
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    async fn upload_empty_file(mock_server: &MockServer, file_name: &str, mime: &str) -> Value {
        let addr = start(AppState::from_config(config(storage_config(
            &mock_server.uri(),
        ))))
        .await;

        let form = Form::new().part(
            "file",
            Part::bytes(Vec::new())
                .file_name(file_name.to_string())
                .mime_str(mime)
                .unwrap(),
        );
        let response = http()
            .post(format!("http://{}/api/upload", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        response.json().await.unwrap()
    }

    #[tokio::test]
    async fn test_upload_zero_byte_file_is_400() {
        let mock_server = MockServer::start().await;

        let body = upload_empty_file(&mock_server, "empty.mp4", "video/mp4").await;

        assert_eq!(body["statusMessage"], "File is required.");
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_zero_byte_file_reported_before_type() {
        let mock_server = MockServer::start().await;

        let body = upload_empty_file(&mock_server, "empty.png", "image/png").await;

        assert_eq!(body["statusMessage"], "File is required.");
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_rejects_non_video_file() {
        let mock_server = MockServer::start().await;
        let addr = start(AppState::from_config(config(storage_config(
            &mock_server.uri(),
        ))))
        .await;

        let form = Form::new().part(
            "file",
            Part::bytes(vec![0u8; 10])
                .file_name("a.png")
                .mime_str("image/png")
                .unwrap(),
        );
        let response = http()
            .post(format!("http://{}/api/upload", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["statusMessage"], "Only video files are allowed.");
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_declared_length_over_limit_is_413() {
        let mock_server = MockServer::start().await;
        let mut config = config(storage_config(&mock_server.uri()));
        config.server.max_upload_bytes = 1000;
        let addr = start(AppState::from_config(config)).await;

        let response = raw_request(
            addr,
            "POST /api/upload HTTP/1.1\r\n\
             Host: localhost\r\n\
             Content-Type: multipart/form-data; boundary=XYZ\r\n\
             Content-Length: 10737418240\r\n\
             \r\n",
        )
        .await;

        assert!(response.starts_with("HTTP/1.1 413"), "got {}", response);
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_streamed_over_limit_is_413_without_storage_calls() {
        let mock_server = MockServer::start().await;
        let mut config = config(storage_config(&mock_server.uri()));
        config.server.max_upload_bytes = 1000;
        let addr = start(AppState::from_config(config)).await;

        let form = Form::new().part(
            "file",
            Part::bytes(vec![3u8; 1500])
                .file_name("big.mp4")
                .mime_str("video/mp4")
                .unwrap(),
        );
        let response = http()
            .post(format!("http://{}/api/upload", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 413);
        assert!(mock_server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_storage_failure_is_translated() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("uploads", ""))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-amz-request-id", "RID-1")
                    .set_body_string(
                        "<Error><Code>AccessDenied</Code><Message>Access Denied.</Message></Error>",
                    ),
            )
            .mount(&mock_server)
            .await;
        let addr = start(AppState::from_config(config(storage_config(
            &mock_server.uri(),
        ))))
        .await;

        let form = Form::new().part(
            "file",
            Part::bytes(vec![0u8; 10])
                .file_name("a.mp4")
                .mime_str("video/mp4")
                .unwrap(),
        );
        let response = http()
            .post(format!("http://{}/api/upload", addr))
            .multipart(form)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        let body: Value = response.json().await.unwrap();
        assert_eq!(
            body["statusMessage"],
            "Upload to storage failed: Access Denied. (status=403, code=AccessDenied, requestId=RID-1)"
        );
    }

    // ========================================================================
    // POST /api/preview-notify
    // ========================================================================

    #[derive(Default)]
    struct CapturingTransport {
        sent: Mutex<Vec<(String, String, NotificationEmail)>>,
    }

    #[async_trait]
    impl MailTransport for CapturingTransport {
        async fn send(
            &self,
            from: &str,
            to: &str,
            email: &NotificationEmail,
        ) -> Result<(), SendFailure> {
            self.sent
                .lock()
                .unwrap()
                .push((from.to_string(), to.to_string(), email.clone()));
            Ok(())
        }
    }

    fn notify_config() -> NotifyConfig {
        NotifyConfig {
            smtp_host: "smtp.example.com".into(),
            smtp_user: "bot@example.com".into(),
            smtp_pass: "secret".into(),
            to: "owner@example.com".into(),
            app_base_url: "https://app.example.com".into(),
            ..NotifyConfig::default()
        }
    }

    #[tokio::test]
    async fn test_preview_notify_rejects_invalid_url() {
        let addr = start(AppState::from_config(config(StorageConfig::default()))).await;
        let client = http();

        for body in [
            json!({"videoUrl": "ftp://example.com/a.mp4"}),
            json!({"videoUrl": 42}),
            json!({}),
        ] {
            let response = client
                .post(format!("http://{}/api/preview-notify", addr))
                .json(&body)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 400);
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["statusMessage"], "Invalid video url.");
        }
    }

    #[tokio::test]
    async fn test_preview_notify_unconfigured_is_skipped() {
        let addr = start(AppState::from_config(config(StorageConfig::default()))).await;

        let response = http()
            .post(format!("http://{}/api/preview-notify", addr))
            .json(&json!({"videoUrl": "https://cdn.example.com/v.mp4"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(
            body,
            json!({"sent": false, "reason": "PREVIEW_NOTIFY_TO is not configured."})
        );
    }

    #[tokio::test]
    async fn test_preview_notify_sends_visit_details() {
        let transport = Arc::new(CapturingTransport::default());
        let mut config = config(StorageConfig::default());
        config.notify = notify_config();
        let notifier = PreviewNotifier::with_transport(&config.notify, transport.clone());
        let addr = start(AppState::from_config(config).with_notifier(notifier)).await;

        let response = http()
            .post(format!("http://{}/api/preview-notify", addr))
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("user-agent", "TestAgent/1.0")
            .json(&json!({"videoUrl": "https://cdn.example.com/v.mp4"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"sent": true}));

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (from, to, email) = &sent[0];
        assert_eq!(from, "bot@example.com");
        assert_eq!(to, "owner@example.com");
        assert!(email.text.contains("203.0.113.7"));
        assert!(email.text.contains("TestAgent/1.0"));
        assert!(email.text.contains("https://cdn.example.com/v.mp4"));
    }
}
