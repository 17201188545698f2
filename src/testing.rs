//! In-memory backend for driving the tracker in tests.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::JobBackend;
use crate::error::RequestError;
use crate::models::{AuthData, AuthResponse, Credentials, JobApplication, JobId, NewJobApplication, User};

#[derive(Debug, Default)]
pub struct FakeState {
    pub authenticated: bool,
    pub users: Vec<(String, String)>,
    pub jobs: Vec<JobApplication>,
    pub next_id: u64,
    /// Operation names ("list", "create", ...) that should fail with a 500.
    pub failing: HashSet<&'static str>,
    pub calls: Vec<&'static str>,
    pub updates: Vec<(JobId, JobApplication)>,
    pub creates: Vec<NewJobApplication>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(email: &str, password: &str) -> Self {
        let backend = Self::new();
        backend
            .state()
            .users
            .push((email.to_string(), password.to_string()));
        backend
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn fail(&self, op: &'static str) {
        self.state().failing.insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.state().failing.remove(op);
    }

    pub fn seed(&self, jobs: Vec<JobApplication>) {
        self.state().jobs = jobs;
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    fn enter(
        &self,
        op: &'static str,
        method: Method,
        path: &str,
        needs_auth: bool,
    ) -> Result<MutexGuard<'_, FakeState>, RequestError> {
        let mut state = self.state();
        state.calls.push(op);
        if state.failing.contains(op) {
            return Err(status_error(method, path, StatusCode::INTERNAL_SERVER_ERROR, None));
        }
        if needs_auth && !state.authenticated {
            return Err(status_error(
                method,
                path,
                StatusCode::UNAUTHORIZED,
                Some("Not authenticated"),
            ));
        }
        Ok(state)
    }
}

fn status_error(method: Method, path: &str, status: StatusCode, message: Option<&str>) -> RequestError {
    RequestError::Status {
        method,
        path: path.to_string(),
        status,
        message: message.map(str::to_string),
    }
}

#[async_trait]
impl JobBackend for FakeBackend {
    async fn check_auth(&self) -> Result<(), RequestError> {
        self.enter("check_auth", Method::GET, "/api/auth/check-auth", true)?;
        Ok(())
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, RequestError> {
        let path = "/api/auth/login";
        let mut state = self.enter("login", Method::POST, path, false)?;
        let known = state
            .users
            .iter()
            .any(|(e, p)| *e == credentials.email && *p == credentials.password);
        if !known {
            return Err(status_error(
                Method::POST,
                path,
                StatusCode::UNAUTHORIZED,
                Some("Invalid credentials"),
            ));
        }
        state.authenticated = true;
        Ok(AuthResponse {
            message: Some("Login successful".to_string()),
            data: Some(AuthData {
                user: User {
                    email: credentials.email.clone(),
                },
            }),
        })
    }

    async fn register(&self, credentials: &Credentials) -> Result<AuthResponse, RequestError> {
        let path = "/api/auth/register";
        let mut state = self.enter("register", Method::POST, path, false)?;
        if state.users.iter().any(|(e, _)| *e == credentials.email) {
            return Err(status_error(
                Method::POST,
                path,
                StatusCode::BAD_REQUEST,
                Some("User already exists"),
            ));
        }
        state
            .users
            .push((credentials.email.clone(), credentials.password.clone()));
        Ok(AuthResponse {
            message: Some("Registration successful".to_string()),
            data: None,
        })
    }

    async fn logout(&self) -> Result<(), RequestError> {
        let mut state = self.enter("logout", Method::POST, "/api/auth/logout", false)?;
        state.authenticated = false;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<JobApplication>, RequestError> {
        let state = self.enter("list", Method::GET, "/api/jobs", true)?;
        Ok(state.jobs.clone())
    }

    async fn create(&self, job: &NewJobApplication) -> Result<(), RequestError> {
        let mut state = self.enter("create", Method::POST, "/api/jobs", true)?;
        state.next_id += 1;
        let id = JobId(format!("job-{}", state.next_id));
        state.creates.push(job.clone());
        state.jobs.push(job.clone().into_record(id));
        Ok(())
    }

    async fn update(&self, id: &JobId, job: &JobApplication) -> Result<(), RequestError> {
        let path = format!("/api/jobs/{}", id);
        let mut state = self.enter("update", Method::PUT, &path, true)?;
        state.updates.push((id.clone(), job.clone()));
        match state.jobs.iter_mut().find(|j| &j.id == id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(status_error(Method::PUT, &path, StatusCode::NOT_FOUND, Some("Job not found"))),
        }
    }

    async fn delete(&self, id: &JobId) -> Result<(), RequestError> {
        let path = format!("/api/jobs/{}", id);
        let mut state = self.enter("delete", Method::DELETE, &path, true)?;
        let before = state.jobs.len();
        state.jobs.retain(|j| &j.id != id);
        if state.jobs.len() == before {
            return Err(status_error(Method::DELETE, &path, StatusCode::NOT_FOUND, Some("Job not found")));
        }
        Ok(())
    }
}
