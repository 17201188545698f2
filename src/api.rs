use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::RequestError;
use crate::models::{AuthResponse, Credentials, JobApplication, JobId, NewJobApplication};

// --- Backend trait ---

/// The REST surface the tracker consumes. Every call either succeeds fully
/// or fails with a `RequestError`.
#[async_trait]
pub trait JobBackend: Send + Sync {
    async fn check_auth(&self) -> Result<(), RequestError>;
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, RequestError>;
    async fn register(&self, credentials: &Credentials) -> Result<AuthResponse, RequestError>;
    async fn logout(&self) -> Result<(), RequestError>;

    async fn list(&self) -> Result<Vec<JobApplication>, RequestError>;
    async fn create(&self, job: &NewJobApplication) -> Result<(), RequestError>;
    /// Replaces the whole record; there is no partial update.
    async fn update(&self, id: &JobId, job: &JobApplication) -> Result<(), RequestError>;
    async fn delete(&self, id: &JobId) -> Result<(), RequestError>;
}

// --- HTTP implementation ---

const LOGIN: &[&str] = &["api", "auth", "login"];
const REGISTER: &[&str] = &["api", "auth", "register"];
const CHECK_AUTH: &[&str] = &["api", "auth", "check-auth"];
const LOGOUT: &[&str] = &["api", "auth", "logout"];
const JOBS: &[&str] = &["api", "jobs"];

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base: Url,
    jar: Arc<Jar>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .with_context(|| format!("Invalid backend URL: {}", base_url))?;
        if base.cannot_be_a_base() {
            return Err(anyhow::anyhow!("Invalid backend URL: {}", base_url));
        }
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { base, jar, client })
    }

    /// Current session cookies as a `Cookie` header value.
    pub fn cookie_header(&self) -> Option<String> {
        self.jar
            .cookies(&self.base)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    pub fn restore_cookies(&self, header: &str) {
        for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            self.jar.add_cookie_str(pair, &self.base);
        }
    }

    /// Base URL with `segments` appended, each percent-encoded as a single
    /// path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn job_url(&self, id: &JobId) -> Result<Url, RequestError> {
        // `.` and `..` would be dropped as segments and address the collection
        if matches!(id.as_str(), "" | "." | "..") {
            return Err(RequestError::InvalidId(id.to_string()));
        }
        Ok(self.endpoint(&["api", "jobs", id.as_str()]))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<reqwest::Response, RequestError> {
        let path = url.path().to_string();
        debug!(%method, %url, "sending request");

        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            // .json() also sets Content-Type: application/json
            request = request.json(body);
        }

        let response = request.send().await.map_err(|source| RequestError::Transport {
            path: path.clone(),
            source,
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!(%method, %path, %status, "backend rejected request");
            return Err(RequestError::Status {
                method,
                path,
                status,
                message: payload_message(&error_text),
            });
        }

        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RequestError> {
        let path = response.url().path().to_string();
        let text = response.text().await.map_err(|source| RequestError::Transport {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| RequestError::Decode {
            path,
            reason: e.to_string(),
        })
    }

    async fn authenticate(
        &self,
        segments: &[&str],
        credentials: &Credentials,
    ) -> Result<AuthResponse, RequestError> {
        let response = self
            .send(Method::POST, self.endpoint(segments), Some(credentials))
            .await?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    async fn check_auth(&self) -> Result<(), RequestError> {
        self.send::<()>(Method::GET, self.endpoint(CHECK_AUTH), None).await?;
        Ok(())
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, RequestError> {
        self.authenticate(LOGIN, credentials).await
    }

    async fn register(&self, credentials: &Credentials) -> Result<AuthResponse, RequestError> {
        self.authenticate(REGISTER, credentials).await
    }

    async fn logout(&self) -> Result<(), RequestError> {
        self.send::<()>(Method::POST, self.endpoint(LOGOUT), None).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<JobApplication>, RequestError> {
        let response = self.send::<()>(Method::GET, self.endpoint(JOBS), None).await?;
        Self::read_json(response).await
    }

    async fn create(&self, job: &NewJobApplication) -> Result<(), RequestError> {
        self.send(Method::POST, self.endpoint(JOBS), Some(job)).await?;
        Ok(())
    }

    async fn update(&self, id: &JobId, job: &JobApplication) -> Result<(), RequestError> {
        self.send(Method::PUT, self.job_url(id)?, Some(job)).await?;
        Ok(())
    }

    async fn delete(&self, id: &JobId) -> Result<(), RequestError> {
        self.send::<()>(Method::DELETE, self.job_url(id)?, None).await?;
        Ok(())
    }
}

/// Pull `message` out of an error payload like `{"message": "..."}`.
fn payload_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use chrono::NaiveDate;
    use reqwest::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answers one request on a loopback port with `status` and `body`, and
    /// hands back the raw request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 4096];
            while !request_complete(&raw) {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8(raw).unwrap()
        });
        (base, handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..head_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        raw.len() >= head_end + 4 + length
    }

    fn request_body(request: &str) -> serde_json::Value {
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    fn creds() -> Credentials {
        Credentials {
            email: "ada@example.com".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[tokio::test]
    async fn test_rejected_login_carries_payload_message() {
        let (base, server) = serve_once("401 Unauthorized", r#"{"message":"Invalid credentials"}"#).await;
        let backend = HttpBackend::new(&base).unwrap();

        let err = backend.login(&creds()).await.unwrap_err();
        match &err {
            RequestError::Status {
                method,
                path,
                status,
                message,
            } => {
                assert_eq!(*method, Method::POST);
                assert_eq!(path, "/api/auth/login");
                assert_eq!(*status, StatusCode::UNAUTHORIZED);
                assert_eq!(message.as_deref(), Some("Invalid credentials"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
        assert_eq!(err.server_message(), Some("Invalid credentials"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/auth/login HTTP/1.1\r\n"));
        assert!(request.to_lowercase().contains("\r\ncontent-type: application/json\r\n"));
        let body = request_body(&request);
        assert_eq!(body["email"], "ada@example.com");
        assert_eq!(body["password"], "hunter2");
    }

    #[tokio::test]
    async fn test_list_sends_session_cookie() {
        let (base, server) = serve_once(
            "200 OK",
            r#"[{"_id":"1","company":"Acme","role":"SRE","status":"Offer","applicationDate":"2024-01-10T00:00:00.000Z","link":"https://acme.example"}]"#,
        )
        .await;
        let backend = HttpBackend::new(&base).unwrap();
        backend.restore_cookies("token=abc");

        let jobs = backend.list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, Status::Offer);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/jobs HTTP/1.1\r\n"));
        assert!(request.to_lowercase().contains("\r\ncookie: token=abc\r\n"));
    }

    #[tokio::test]
    async fn test_delete_sends_session_cookie_and_encoded_id() {
        let (base, server) = serve_once("200 OK", r#"{"message":"Job deleted"}"#).await;
        let backend = HttpBackend::new(&base).unwrap();
        backend.restore_cookies("token=abc");

        backend.delete(&JobId::from("../auth/logout")).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("DELETE /api/jobs/..%2Fauth%2Flogout HTTP/1.1\r\n"));
        assert!(request.to_lowercase().contains("\r\ncookie: token=abc\r\n"));
    }

    #[tokio::test]
    async fn test_update_sends_full_record_as_json() {
        let (base, server) = serve_once("200 OK", "{}").await;
        let backend = HttpBackend::new(&base).unwrap();
        let record = JobApplication {
            id: JobId::from("65a1f"),
            company: "Acme".to_string(),
            role: "Engineer".to_string(),
            status: Status::Interview,
            application_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            link: "https://acme.example/jobs/1".to_string(),
        };

        backend.update(&record.id, &record).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /api/jobs/65a1f HTTP/1.1\r\n"));
        assert!(request.to_lowercase().contains("\r\ncontent-type: application/json\r\n"));
        let body = request_body(&request);
        assert_eq!(body["_id"], "65a1f");
        assert_eq!(body["status"], "Interview");
        assert_eq!(body["applicationDate"], "2024-01-05");
        assert_eq!(body["link"], "https://acme.example/jobs/1");
    }

    #[tokio::test]
    async fn test_unexpected_list_body_is_decode_error() {
        let (base, server) = serve_once("200 OK", r#"{"jobs":[]}"#).await;
        let backend = HttpBackend::new(&base).unwrap();

        let err = backend.list().await.unwrap_err();
        assert!(matches!(&err, RequestError::Decode { path, .. } if path == "/api/jobs"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_error_without_payload_has_no_message() {
        let (base, server) = serve_once("500 Internal Server Error", "oops").await;
        let backend = HttpBackend::new(&base).unwrap();

        let err = backend.check_auth().await.unwrap_err();
        assert!(matches!(
            &err,
            RequestError::Status { status, message: None, .. } if *status == StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert!(server.await.unwrap().starts_with("GET /api/auth/check-auth HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let backend = HttpBackend::new("http://127.0.0.1:1").unwrap();
        let err = backend.check_auth().await.unwrap_err();
        assert!(matches!(err, RequestError::Transport { .. }));
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let backend = HttpBackend::new("http://localhost:5000/").unwrap();
        assert_eq!(backend.endpoint(JOBS).as_str(), "http://localhost:5000/api/jobs");

        let backend = HttpBackend::new("https://tracker.example/app/").unwrap();
        assert_eq!(
            backend.endpoint(CHECK_AUTH).as_str(),
            "https://tracker.example/app/api/auth/check-auth"
        );
    }

    #[test]
    fn test_job_url_encodes_id_as_one_segment() {
        let backend = HttpBackend::new("http://localhost:5000").unwrap();
        assert_eq!(
            backend.job_url(&JobId::from("65a1f")).unwrap().path(),
            "/api/jobs/65a1f"
        );
        assert_eq!(
            backend.job_url(&JobId::from("../auth/logout")).unwrap().path(),
            "/api/jobs/..%2Fauth%2Flogout"
        );
        assert_eq!(
            backend.job_url(&JobId::from("a b?c")).unwrap().path(),
            "/api/jobs/a%20b%3Fc"
        );
        for id in ["", ".", ".."] {
            assert!(matches!(
                backend.job_url(&JobId::from(id)),
                Err(RequestError::InvalidId(_))
            ));
        }
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let result = HttpBackend::new("not a url");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid backend URL"));
    }

    #[test]
    fn test_payload_message() {
        assert_eq!(
            payload_message(r#"{"message":"User already exists"}"#),
            Some("User already exists".to_string())
        );
        assert_eq!(payload_message(r#"{"message":"  "}"#), None);
        assert_eq!(payload_message(r#"{"error":"nope"}"#), None);
        assert_eq!(payload_message("<html>502</html>"), None);
        assert_eq!(payload_message(""), None);
    }

    #[test]
    fn test_cookies_survive_restore() {
        let backend = HttpBackend::new("http://localhost:5000").unwrap();
        assert_eq!(backend.cookie_header(), None);

        backend.restore_cookies("token=abc; theme=dark");
        let header = backend.cookie_header().unwrap();
        assert!(header.contains("token=abc"));
        assert!(header.contains("theme=dark"));

        let fresh = HttpBackend::new("http://localhost:5000").unwrap();
        fresh.restore_cookies(&header);
        assert_eq!(fresh.cookie_header().unwrap().len(), header.len());
    }
}
