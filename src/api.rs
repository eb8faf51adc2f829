//! Backend collaborator: the REST endpoints the engine reads from and publishes to.
//!
//! Endpoints disagree on how they report success, so each call names its
//! [`Envelope`] instead of inspecting the body inline:
//!
//! | call | endpoint | envelope |
//! |---|---|---|
//! | list results | `GET /results` | `status == "success"` |
//! | publish | `POST /results/publish` | `status == "success"` |
//! | submit exam results | `POST /exams/{id}/results` | `success == true` |
//! | students by class | `GET /students/class/{id}` | 2xx with `data` |
//! | teacher exams | `GET /exams/teacher` | 2xx with `data` |

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::drafts::SubmissionEntry;
use crate::model::{Exam, ResultRecord, Student};
use crate::view::ResultQuery;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error(
        "server returned HTTP {code}{}",
        .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
    )]
    Status { code: u16, message: Option<String> },
    #[error("server rejected the request: {message}")]
    Rejected { message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        "transport_error"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    StatusField,
    SuccessFlag,
    DataOnly,
}

impl Envelope {
    pub fn is_success(self, body: &Value) -> bool {
        match self {
            Envelope::StatusField => body.get("status").and_then(|v| v.as_str()) == Some("success"),
            Envelope::SuccessFlag => body.get("success").and_then(|v| v.as_bool()) == Some(true),
            Envelope::DataOnly => body.get("data").map(|v| !v.is_null()).unwrap_or(false),
        }
    }

    fn check(self, body: Value) -> Result<Value, ApiError> {
        if self.is_success(&body) {
            return Ok(body);
        }
        Err(ApiError::Rejected {
            message: body_message(&body).unwrap_or_else(|| "request was not successful".to_string()),
        })
    }
}

fn body_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn decode_at<T: DeserializeOwned>(body: &Value, pointer: &str) -> Result<T, ApiError> {
    let Some(v) = body.pointer(pointer) else {
        return Err(ApiError::Decode(format!("missing {pointer}")));
    };
    serde_json::from_value(v.clone()).map_err(|e| ApiError::Decode(format!("{pointer}: {e}")))
}

/// A listed row that failed to decode. The rest of the listing is kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    pub index: usize,
    pub id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultListing {
    pub records: Vec<ResultRecord>,
    pub skipped: Vec<SkippedRow>,
}

/// Decodes each row under `pointer` on its own, so one bad row (missing
/// `studentId`, unknown status) does not sink the listing.
fn decode_rows(body: &Value, pointer: &str) -> Result<ResultListing, ApiError> {
    let rows: Vec<Value> = decode_at(body, pointer)?;
    let mut listing = ResultListing::default();
    for (index, row) in rows.into_iter().enumerate() {
        let id = row
            .get("_id")
            .or_else(|| row.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        match serde_json::from_value::<ResultRecord>(row) {
            Ok(record) => listing.records.push(record),
            Err(e) => {
                warn!(index, id = ?id, error = %e, "skipping malformed result row");
                listing.skipped.push(SkippedRow {
                    index,
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(listing)
}

pub trait ResultsApi: Send + Sync {
    fn list_results(&self, query: &ResultQuery) -> Result<ResultListing, ApiError>;
    fn publish_results(&self, ids: &[String]) -> Result<(), ApiError>;
    /// Returns the server's message, if any.
    fn submit_exam_results(
        &self,
        exam_id: &str,
        entries: &[SubmissionEntry],
    ) -> Result<Option<String>, ApiError>;
    fn list_students_by_class(&self, class_id: &str) -> Result<Vec<Student>, ApiError>;
    fn list_teacher_exams(&self) -> Result<Vec<Exam>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

pub struct HttpApi {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
    user_agent: String,
}

impl HttpApi {
    pub fn new(cfg: HttpApiConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(cfg.timeout).build();
        Self {
            agent,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token: cfg.token.filter(|t| !t.trim().is_empty()),
            user_agent: format!("resultsd/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .agent
            .request(method, &url)
            .set("Accept", "application/json")
            .set("User-Agent", &self.user_agent);
        if let Some(token) = &self.token {
            req = req.set("Authorization", &format!("Bearer {token}"));
        }
        req
    }

    fn send(&self, req: ureq::Request, body: Option<&Value>) -> Result<Value, ApiError> {
        let method = req.method().to_string();
        let url = req.url().to_string();
        debug!(%method, %url, "backend request");

        let response = match body {
            Some(b) => req
                .set("Content-Type", "application/json")
                .send_string(&b.to_string()),
            None => req.call(),
        };

        match response {
            Ok(res) => {
                let text = res
                    .into_string()
                    .map_err(|e| ApiError::Transport(format!("reading response: {e}")))?;
                serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
            }
            Err(ureq::Error::Status(code, res)) => {
                let message = res
                    .into_string()
                    .ok()
                    .and_then(|t| serde_json::from_str::<Value>(&t).ok())
                    .and_then(|v| body_message(&v));
                warn!(%method, %url, code, "backend returned error status");
                Err(ApiError::Status { code, message })
            }
            Err(ureq::Error::Transport(e)) => {
                warn!(%method, %url, error = %e, "backend unreachable");
                Err(ApiError::Transport(e.to_string()))
            }
        }
    }
}

impl ResultsApi for HttpApi {
    fn list_results(&self, query: &ResultQuery) -> Result<ResultListing, ApiError> {
        let mut req = self.request("GET", "/results");
        for (k, v) in query.to_pairs() {
            req = req.query(k, &v);
        }
        let body = Envelope::StatusField.check(self.send(req, None)?)?;
        decode_rows(&body, "/data/results")
    }

    fn publish_results(&self, ids: &[String]) -> Result<(), ApiError> {
        let body = json!({ "resultIds": ids });
        Envelope::StatusField.check(self.send(self.request("POST", "/results/publish"), Some(&body))?)?;
        info!(count = ids.len(), "results published");
        Ok(())
    }

    fn submit_exam_results(
        &self,
        exam_id: &str,
        entries: &[SubmissionEntry],
    ) -> Result<Option<String>, ApiError> {
        let body = json!({ "results": entries });
        let path = format!("/exams/{exam_id}/results");
        let resp = Envelope::SuccessFlag.check(self.send(self.request("POST", &path), Some(&body))?)?;
        Ok(body_message(&resp))
    }

    fn list_students_by_class(&self, class_id: &str) -> Result<Vec<Student>, ApiError> {
        let path = format!("/students/class/{class_id}");
        let body = Envelope::DataOnly.check(self.send(self.request("GET", &path), None)?)?;
        decode_at(&body, "/data")
    }

    fn list_teacher_exams(&self) -> Result<Vec<Exam>, ApiError> {
        let body = Envelope::DataOnly.check(self.send(self.request("GET", "/exams/teacher"), None)?)?;
        decode_at(&body, "/data")
    }
}

/// Runs two independent fetches as overlapping calls and joins them. The join
/// fails if either side fails; the left error wins when both do.
pub fn join2<A, B, FA, FB>(fa: FA, fb: FB) -> Result<(A, B), ApiError>
where
    A: Send,
    B: Send,
    FA: FnOnce() -> Result<A, ApiError> + Send,
    FB: FnOnce() -> Result<B, ApiError> + Send,
{
    std::thread::scope(|s| {
        let right = s.spawn(fb);
        let a = fa();
        let b = right
            .join()
            .unwrap_or_else(|_| Err(ApiError::Transport("fetch worker panicked".to_string())));
        Ok((a?, b?))
    })
}

pub fn load_batch_context(
    api: &dyn ResultsApi,
    class_id: &str,
) -> Result<(Vec<Student>, Vec<Exam>), ApiError> {
    join2(
        || api.list_students_by_class(class_id),
        || api.list_teacher_exams(),
    )
}
