use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;

use crate::assessment::{ApplicationId, SubmissionResult, SubmitPayload, Test};
use crate::error::ApiError;

pub type Result<T> = std::result::Result<T, ApiError>;

pub const LOAD_FALLBACK: &str =
    "Could not load test. You may not have access or test is not available.";
pub const SUBMIT_FALLBACK: &str = "Could not submit test.";
pub const ALREADY_SUBMITTED: &str = "You have already completed this test.";

/// The remote assessment service: owns question content and scoring
pub trait AssessmentApi: Send + Sync {
    /// `GET applications/{id}/test/`
    fn fetch_test(&self, application_id: &ApplicationId) -> Result<Test>;

    /// `POST applications/{id}/submit-test/`; the service does not deduplicate
    fn submit_test(&self, application_id: &ApplicationId, payload: &SubmitPayload) -> Result<SubmissionResult>;
}

/// HTTP client for the job-board API
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5).min(timeout))
            .timeout(timeout)
            .build()?;

        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder, fallback: &str) -> Result<T> {
        let response = self.authorize(request).send()?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<T>()?);
        }

        let body = response.text().unwrap_or_default();
        Err(error_from_status(status.as_u16(), &body, fallback))
    }
}

impl AssessmentApi for HttpApi {
    fn fetch_test(&self, application_id: &ApplicationId) -> Result<Test> {
        let url = self.url(&format!("applications/{application_id}/test/"));
        tracing::debug!(%url, "fetching test");
        self.send(self.client.get(url), LOAD_FALLBACK)
    }

    fn submit_test(&self, application_id: &ApplicationId, payload: &SubmitPayload) -> Result<SubmissionResult> {
        let url = self.url(&format!("applications/{application_id}/submit-test/"));
        tracing::debug!(%url, reason = %payload.reason, answers = payload.answers.len(), "submitting test");
        self.send(self.client.post(url).json(payload), SUBMIT_FALLBACK)
    }
}

/// Pull a human-readable message out of an error body (`detail` or `error`)
pub fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["detail", "error"]
        .iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// Map a non-success status to the client's error taxonomy
pub fn error_from_status(status: u16, body: &str, fallback: &str) -> ApiError {
    let detail = error_detail(body);
    let message = || detail.clone().unwrap_or_else(|| fallback.to_string());

    match status {
        401 => ApiError::Unauthorized,
        403 => ApiError::Forbidden(message()),
        404 => ApiError::NotFound(message()),
        409 => ApiError::Conflict(detail.clone().unwrap_or_else(|| ALREADY_SUBMITTED.to_string())),
        // the service reports a finished test as a plain bad request
        400 if detail
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains("already completed")) =>
        {
            ApiError::Conflict(message())
        }
        _ => ApiError::Server {
            status,
            detail: message(),
        },
    }
}

/// In-memory service with canned responses, counting every call
#[derive(Debug, Default)]
pub struct ScriptedApi {
    test: Option<Test>,
    submit_responses: Mutex<VecDeque<Result<SubmissionResult>>>,
    submitted: Mutex<Vec<SubmitPayload>>,
    fetch_calls: AtomicUsize,
    submit_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new(test: Option<Test>) -> Self {
        Self {
            test,
            ..Self::default()
        }
    }

    /// Queue the response for the next submit call
    pub fn respond_with(self, response: Result<SubmissionResult>) -> Self {
        if let Ok(mut queue) = self.submit_responses.lock() {
            queue.push_back(response);
        }
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<SubmitPayload> {
        self.submitted.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl AssessmentApi for ScriptedApi {
    fn fetch_test(&self, _application_id: &ApplicationId) -> Result<Test> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.test
            .clone()
            .ok_or_else(|| ApiError::NotFound("Test not available for this application.".to_string()))
    }

    fn submit_test(&self, _application_id: &ApplicationId, payload: &SubmitPayload) -> Result<SubmissionResult> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(payload.clone());
        }

        let scored = payload.answers.len() as i64 * 2;
        self.submit_responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| {
                let total = self.test.as_ref().map(|t| t.total_marks).unwrap_or(0);
                Ok(SubmissionResult {
                    score: scored.min(total),
                    total,
                    passed: false,
                    application_status: None,
                })
            })
    }
}
