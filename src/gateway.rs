use crate::assignment::{AnswerSheet, AssignmentRecord, SubmissionStatus};
use crate::runtime::Event;
use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;

static SAMPLE_DIR: Dir = include_dir!("src/samples");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("the server said no ({status}): {detail}")]
    Http { status: u16, detail: String },
    #[error("could not reach the server: {0}")]
    Transport(String),
    #[error("unreadable server response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RosterQuery {
    pub class_id: Option<i64>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub assignment_id: i64,
    pub kind: String,
    pub sheet: AnswerSheet,
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    assignment_id: i64,
    #[serde(rename = "type")]
    kind: &'a str,
    content: &'a AnswerSheet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub assignment_id: i64,
    pub status: SubmissionStatus,
}

/// Whatever shape the submit endpoint answers with; only the status is
/// interesting and even that is optional.
#[derive(Deserialize, Default)]
struct WireReceipt {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    submission: Option<WireReceiptInner>,
}

#[derive(Deserialize)]
struct WireReceiptInner {
    #[serde(default)]
    status: Option<String>,
}

impl WireReceipt {
    fn into_receipt(self, assignment_id: i64) -> SubmitReceipt {
        let raw = self
            .status
            .or(self.submission.and_then(|s| s.status))
            .unwrap_or_else(|| "submitted".to_string());
        SubmitReceipt {
            assignment_id,
            status: SubmissionStatus::from_wire(Some(&raw)),
        }
    }
}

/// Roster rows come back as a bare array or wrapped in an object,
/// depending on the backend revision.
#[derive(Deserialize)]
#[serde(untagged)]
enum RosterPayload {
    Rows(Vec<AssignmentRecord>),
    Wrapped { assignments: Vec<AssignmentRecord> },
}

impl RosterPayload {
    fn into_rows(self) -> Vec<AssignmentRecord> {
        match self {
            RosterPayload::Rows(rows) => rows,
            RosterPayload::Wrapped { assignments } => assignments,
        }
    }
}

pub trait AssignmentGateway: Send + Sync {
    fn fetch_roster(&self, query: &RosterQuery) -> Result<Vec<AssignmentRecord>, GatewayError>;
    fn submit(&self, request: &SubmitRequest) -> Result<SubmitReceipt, GatewayError>;
}

pub struct HttpGateway {
    client: reqwest::blocking::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: &str, api_token: Option<String>) -> Result<Self, GatewayError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn authorize(&self, request: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.api_token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }
}

impl AssignmentGateway for HttpGateway {
    fn fetch_roster(&self, query: &RosterQuery) -> Result<Vec<AssignmentRecord>, GatewayError> {
        let url = format!("{}/assignments", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(class_id) = query.class_id {
            request = request.query(&[("class_id", class_id.to_string())]);
        }
        if let Some(kind) = &query.kind {
            request = request.query(&[("type", kind.as_str())]);
        }

        let response = self.authorize(request).send().map_err(|e| {
            log::warn!("roster fetch failed: {}", e);
            GatewayError::Transport(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().unwrap_or_default();
            return Err(GatewayError::Http { status, detail });
        }

        let body = response
            .text()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        serde_json::from_str::<RosterPayload>(&body)
            .map(RosterPayload::into_rows)
            .map_err(|e| {
                log::error!("unreadable roster payload: {}", e);
                GatewayError::Decode(e.to_string())
            })
    }

    fn submit(&self, request: &SubmitRequest) -> Result<SubmitReceipt, GatewayError> {
        let url = format!("{}/assignments/submit", self.base_url);
        let body = SubmitBody {
            assignment_id: request.assignment_id,
            kind: &request.kind,
            content: &request.sheet,
        };

        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .map_err(|e| {
                log::warn!("submission for assignment {} failed: {}", request.assignment_id, e);
                GatewayError::Transport(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = response.text().unwrap_or_default();
            return Err(GatewayError::Http { status, detail });
        }

        let text = response.text().unwrap_or_default();
        let receipt = serde_json::from_str::<WireReceipt>(&text).unwrap_or_default();
        Ok(receipt.into_receipt(request.assignment_id))
    }
}

/// Offline practice roster baked into the binary. Submissions are held in
/// memory so the session behaves like the real thing until the process
/// exits.
pub struct SampleGateway {
    submitted: Mutex<HashMap<i64, AnswerSheet>>,
}

impl SampleGateway {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            submitted: Mutex::new(HashMap::new()),
        }
    }

    fn rows(&self) -> Result<Vec<AssignmentRecord>, GatewayError> {
        let file = SAMPLE_DIR
            .get_file("assignments.json")
            .expect("Sample roster not found");
        let raw = file
            .contents_utf8()
            .expect("Unable to interpret sample roster as a string");
        serde_json::from_str(raw).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

impl AssignmentGateway for SampleGateway {
    fn fetch_roster(&self, query: &RosterQuery) -> Result<Vec<AssignmentRecord>, GatewayError> {
        let mut rows = self.rows()?;

        if let Some(kind) = &query.kind {
            rows.retain(|row| &row.kind == kind);
        }

        let submitted = self
            .submitted
            .lock()
            .map_err(|_| GatewayError::Transport("sample store poisoned".to_string()))?;
        for row in &mut rows {
            if let Some(sheet) = submitted.get(&row.id) {
                row.submission_status = Some("submitted".to_string());
                row.student_content = serde_json::to_value(sheet).ok();
            }
        }

        Ok(rows)
    }

    fn submit(&self, request: &SubmitRequest) -> Result<SubmitReceipt, GatewayError> {
        let mut submitted = self
            .submitted
            .lock()
            .map_err(|_| GatewayError::Transport("sample store poisoned".to_string()))?;
        submitted.insert(request.assignment_id, request.sheet.clone());
        Ok(SubmitReceipt {
            assignment_id: request.assignment_id,
            status: SubmissionStatus::Submitted,
        })
    }
}

/// Results of background gateway work, delivered over the app channel.
#[derive(Debug)]
pub enum GatewayEvent {
    RosterFetched(Result<Vec<AssignmentRecord>, GatewayError>),
    SubmitFinished {
        assignment_id: i64,
        auto: bool,
        result: Result<SubmitReceipt, GatewayError>,
    },
}

/// Fetch the roster off the UI thread; the result arrives as an event.
pub fn spawn_fetch(gateway: Arc<dyn AssignmentGateway>, query: RosterQuery, tx: Sender<Event>) {
    thread::spawn(move || {
        let result = gateway.fetch_roster(&query);
        let _ = tx.send(Event::Gateway(GatewayEvent::RosterFetched(result)));
    });
}

/// Post a submission off the UI thread. Exactly one SubmitFinished event
/// comes back; there are no automatic retries.
pub fn spawn_submit(
    gateway: Arc<dyn AssignmentGateway>,
    request: SubmitRequest,
    auto: bool,
    tx: Sender<Event>,
) {
    thread::spawn(move || {
        let assignment_id = request.assignment_id;
        let result = gateway.submit(&request);
        let _ = tx.send(Event::Gateway(GatewayEvent::SubmitFinished {
            assignment_id,
            auto,
            result,
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_sample_roster_loads() {
        let gateway = SampleGateway::new();
        let rows = gateway.fetch_roster(&RosterQuery::default()).unwrap();

        assert!(rows.len() >= 4);
        assert!(rows.iter().any(|r| r.kind == "essay"));
        assert!(rows.iter().any(|r| r.kind == "quiz"));
    }

    #[test]
    fn test_sample_roster_kind_filter() {
        let gateway = SampleGateway::new();
        let query = RosterQuery {
            class_id: None,
            kind: Some("quiz".to_string()),
        };

        let rows = gateway.fetch_roster(&query).unwrap();
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| r.kind == "quiz"));
    }

    #[test]
    fn test_sample_submit_shows_up_in_next_fetch() {
        let gateway = SampleGateway::new();
        let rows = gateway.fetch_roster(&RosterQuery::default()).unwrap();
        let pending = rows
            .iter()
            .find(|r| r.submission_status.as_deref() == Some("pending"))
            .expect("sample data should have pending work");

        let receipt = gateway
            .submit(&SubmitRequest {
                assignment_id: pending.id,
                kind: pending.kind.clone(),
                sheet: AnswerSheet::Essay("done in the sample world".to_string()),
            })
            .unwrap();
        assert_eq!(receipt.status, SubmissionStatus::Submitted);

        let rows = gateway.fetch_roster(&RosterQuery::default()).unwrap();
        let row = rows.iter().find(|r| r.id == receipt.assignment_id).unwrap();
        assert_eq!(row.submission_status.as_deref(), Some("submitted"));
        assert_eq!(
            row.student_content,
            Some(json!("done in the sample world"))
        );
    }

    #[test]
    fn test_submit_body_wire_shape() {
        let essay_body = SubmitBody {
            assignment_id: 7,
            kind: "essay",
            content: &AnswerSheet::Essay("my answer".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&essay_body).unwrap(),
            json!({"assignment_id": 7, "type": "essay", "content": "my answer"})
        );

        let quiz_body = SubmitBody {
            assignment_id: 8,
            kind: "quiz",
            content: &AnswerSheet::Choices(BTreeMap::from([
                (0, "goes".to_string()),
                (2, "on".to_string()),
            ])),
        };
        assert_eq!(
            serde_json::to_value(&quiz_body).unwrap(),
            json!({"assignment_id": 8, "type": "quiz", "content": {"0": "goes", "2": "on"}})
        );
    }

    #[test]
    fn test_receipt_decoding_is_tolerant() {
        let direct: WireReceipt = serde_json::from_str(r#"{"status":"graded"}"#).unwrap();
        assert_eq!(direct.into_receipt(1).status, SubmissionStatus::Graded);

        let nested: WireReceipt =
            serde_json::from_str(r#"{"message":"ok","submission":{"status":"submitted"}}"#)
                .unwrap();
        assert_eq!(nested.into_receipt(2).status, SubmissionStatus::Submitted);

        let bare: WireReceipt = serde_json::from_str(r#"{"message":"ok"}"#).unwrap();
        let receipt = bare.into_receipt(3);
        assert_eq!(receipt.assignment_id, 3);
        assert_eq!(receipt.status, SubmissionStatus::Submitted);
    }

    #[test]
    fn test_roster_payload_accepts_both_shapes() {
        let bare = r#"[{"id": 1, "title": "T", "type": "essay"}]"#;
        let rows = serde_json::from_str::<RosterPayload>(bare).unwrap().into_rows();
        assert_eq!(rows.len(), 1);

        let wrapped = r#"{"assignments": [{"id": 2, "title": "U", "type": "quiz"}]}"#;
        let rows = serde_json::from_str::<RosterPayload>(wrapped)
            .unwrap()
            .into_rows();
        assert_eq!(rows[0].id, 2);
    }

    #[test]
    fn test_error_messages_read_like_toasts() {
        let http = GatewayError::Http {
            status: 500,
            detail: "boom".to_string(),
        };
        assert_eq!(http.to_string(), "the server said no (500): boom");

        let transport = GatewayError::Transport("connection refused".to_string());
        assert!(transport.to_string().contains("could not reach the server"));
    }
}
