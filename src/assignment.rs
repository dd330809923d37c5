use crate::util::word_count;
use chrono::prelude::*;
use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration as StdDuration;
use time_humanize::{Accuracy, HumanTime, Tense};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Submitted,
    Graded,
}

impl SubmissionStatus {
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("submitted") => SubmissionStatus::Submitted,
            Some("graded") => SubmissionStatus::Graded,
            _ => SubmissionStatus::Pending,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "Pending",
            SubmissionStatus::Submitted => "Submitted",
            SubmissionStatus::Graded => "Graded",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "questionText", alias = "question_text")]
    pub prompt: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub points: u32,
}

/// What kind of work an assignment asks for. Replaces wire-level `type`
/// strings everywhere past the gateway boundary; dispatch is exhaustive.
#[derive(Clone, Debug, PartialEq)]
pub enum AssignmentKind {
    Essay { word_target: Option<u32> },
    Quiz { questions: Vec<Question> },
    CourseWork,
}

impl AssignmentKind {
    pub fn label(&self) -> &'static str {
        match self {
            AssignmentKind::Essay { .. } => "Essay",
            AssignmentKind::Quiz { .. } => "Quiz",
            AssignmentKind::CourseWork => "Course work",
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            AssignmentKind::Essay { .. } => "essay",
            AssignmentKind::Quiz { .. } => "quiz",
            AssignmentKind::CourseWork => "course_work",
        }
    }
}

/// The student's answer payload. Serializes the way the backend stores it:
/// free text as a bare string, quiz picks as an object keyed by question
/// index.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnswerSheet {
    Essay(String),
    Choices(BTreeMap<usize, String>),
}

// Hand-rolled: an untagged derive buffers object keys as strings and can
// never land them in the usize-keyed map, so stored quiz sheets would fail
// to read back.
impl<'de> Deserialize<'de> for AnswerSheet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        match Value::deserialize(deserializer)? {
            Value::String(text) => Ok(AnswerSheet::Essay(text)),
            Value::Object(map) => {
                let mut picks = BTreeMap::new();
                for (key, value) in map {
                    let index = key
                        .parse::<usize>()
                        .map_err(|_| D::Error::custom(format!("bad question index {:?}", key)))?;
                    match value {
                        Value::String(option) => picks.insert(index, option),
                        other => {
                            return Err(D::Error::custom(format!("bad option pick: {}", other)))
                        }
                    };
                }
                Ok(AnswerSheet::Choices(picks))
            }
            other => Err(D::Error::custom(format!("not an answer sheet: {}", other))),
        }
    }
}

impl AnswerSheet {
    pub fn blank_for(kind: &AssignmentKind) -> Self {
        match kind {
            AssignmentKind::Quiz { .. } => AnswerSheet::Choices(BTreeMap::new()),
            AssignmentKind::Essay { .. } | AssignmentKind::CourseWork => {
                AnswerSheet::Essay(String::new())
            }
        }
    }

    /// Decodes server-held content. The backend returns quiz sheets either
    /// as an object or as that object JSON-encoded inside a string; both
    /// forms are accepted.
    pub fn from_wire(value: &Value, kind: &AssignmentKind) -> Option<Self> {
        match kind {
            AssignmentKind::Quiz { .. } => match value {
                Value::Object(map) => Some(AnswerSheet::Choices(
                    map.iter()
                        .filter_map(|(k, v)| {
                            Some((k.parse::<usize>().ok()?, v.as_str()?.to_string()))
                        })
                        .collect(),
                )),
                Value::String(raw) => serde_json::from_str::<BTreeMap<String, String>>(raw)
                    .ok()
                    .map(|map| {
                        AnswerSheet::Choices(
                            map.into_iter()
                                .filter_map(|(k, v)| Some((k.parse::<usize>().ok()?, v)))
                                .collect(),
                        )
                    }),
                _ => None,
            },
            AssignmentKind::Essay { .. } | AssignmentKind::CourseWork => match value {
                Value::String(text) => Some(AnswerSheet::Essay(text.clone())),
                _ => None,
            },
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            AnswerSheet::Essay(text) => text.trim().is_empty(),
            AnswerSheet::Choices(picks) => picks.is_empty(),
        }
    }

    pub fn word_count(&self) -> usize {
        match self {
            AnswerSheet::Essay(text) => word_count(text),
            AnswerSheet::Choices(_) => 0,
        }
    }

    pub fn answered_count(&self) -> usize {
        match self {
            AnswerSheet::Essay(_) => 0,
            AnswerSheet::Choices(picks) => picks.len(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct SubmissionState {
    pub status: SubmissionStatus,
    pub sheet: Option<AnswerSheet>,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub feedback_url: Option<String>,
}

impl SubmissionState {
    pub fn locked(&self) -> bool {
        matches!(
            self.status,
            SubmissionStatus::Submitted | SubmissionStatus::Graded
        )
    }
}

/// One roster entry, as merged by the backend: the assignment itself plus
/// this student's submission state.
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub id: i64,
    pub title: String,
    pub kind: AssignmentKind,
    pub brief: String,
    pub total_points: u32,
    pub due_date: Option<DateTime<Utc>>,
    pub duration_minutes: Option<u32>,
    pub extra_minutes: u32,
    pub active: bool,
    pub submission: SubmissionState,
}

impl Assignment {
    pub fn is_timed(&self) -> bool {
        self.duration_minutes.is_some_and(|mins| mins > 0)
    }

    /// Full session allowance in seconds, staff-granted extensions included.
    pub fn allowance_secs(&self) -> Option<u64> {
        let mins = self.duration_minutes.filter(|m| *m > 0)?;
        Some((u64::from(mins) + u64::from(self.extra_minutes)) * 60)
    }

    pub fn due_label(&self, now: DateTime<Utc>) -> Option<String> {
        let due = self.due_date?;
        let delta = due.signed_duration_since(now);
        let human = HumanTime::from(StdDuration::from_secs(
            delta.num_seconds().unsigned_abs(),
        ));
        let tense = if delta.num_seconds() < 0 {
            Tense::Past
        } else {
            Tense::Future
        };
        Some(format!("due {}", human.to_text_en(Accuracy::Rough, tense)))
    }
}

/// Raw roster row off the wire, before any normalization.
#[derive(Clone, Debug, Deserialize)]
pub struct AssignmentRecord {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requirements: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default, alias = "extra_time")]
    pub extra_minutes: Option<u32>,
    #[serde(default)]
    pub total_points: Option<u32>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub word_count: Option<u32>,
    #[serde(default)]
    pub questions: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub submission_status: Option<String>,
    #[serde(default)]
    pub student_content: Option<Value>,
    #[serde(default)]
    pub score: Option<Value>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default, alias = "feedback_file_url")]
    pub feedback_url: Option<String>,
}

/// `questions` arrives either as a JSON array or as that array encoded
/// inside a string, depending on which backend path produced the row.
fn parse_questions(raw: Option<&Value>) -> Vec<Question> {
    match raw {
        Some(Value::Array(_)) => {
            serde_json::from_value(raw.cloned().unwrap_or(Value::Null)).unwrap_or_default()
        }
        Some(Value::String(text)) => serde_json::from_str(text).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates; a bare date
/// means end of that day.
fn parse_due_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

/// Decimal columns come back as JSON numbers or as strings like "87.50".
fn parse_score(raw: Option<&Value>) -> Option<f64> {
    match raw? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl From<AssignmentRecord> for Assignment {
    fn from(record: AssignmentRecord) -> Self {
        let kind = match record.kind.as_str() {
            "quiz" | "test" | "exam" => AssignmentKind::Quiz {
                questions: parse_questions(record.questions.as_ref()),
            },
            "essay" | "writing_task" => AssignmentKind::Essay {
                word_target: record.word_count,
            },
            _ => AssignmentKind::CourseWork,
        };

        let status = SubmissionStatus::from_wire(record.submission_status.as_deref());
        let sheet = record
            .student_content
            .as_ref()
            .and_then(|content| AnswerSheet::from_wire(content, &kind));

        Assignment {
            id: record.id,
            title: record.title,
            brief: record
                .description
                .or(record.requirements)
                .unwrap_or_default(),
            total_points: record.total_points.unwrap_or(0),
            due_date: parse_due_date(record.due_date.as_deref()),
            duration_minutes: record.duration,
            extra_minutes: record.extra_minutes.unwrap_or(0),
            active: !matches!(record.status.as_deref(), Some("closed") | Some("inactive")),
            submission: SubmissionState {
                status,
                sheet,
                score: parse_score(record.score.as_ref()),
                feedback: record.feedback.filter(|f| !f.trim().is_empty()),
                feedback_url: record.feedback_url,
            },
            kind,
        }
    }
}

/// The assignment list as shown to the student: active rows only, nearest
/// deadline first, undated work at the bottom.
#[derive(Debug, Default)]
pub struct Roster {
    pub assignments: Vec<Assignment>,
    pub selected: usize,
}

impl Roster {
    pub fn from_records(records: Vec<AssignmentRecord>) -> Self {
        let assignments = records
            .into_iter()
            .map(Assignment::from)
            .filter(|a| a.active)
            .sorted_by_key(|a| (a.due_date.is_none(), a.due_date, a.id))
            .collect();
        Self {
            assignments,
            selected: 0,
        }
    }

    /// Swaps in a fresh fetch, keeping the cursor on the same assignment
    /// when it is still present.
    pub fn replace(&mut self, records: Vec<AssignmentRecord>) {
        let keep = self.selected().map(|a| a.id);
        *self = Roster::from_records(records);
        if let Some(id) = keep {
            if let Some(pos) = self.assignments.iter().position(|a| a.id == id) {
                self.selected = pos;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn selected(&self) -> Option<&Assignment> {
        self.assignments.get(self.selected)
    }

    pub fn selected_mut(&mut self) -> Option<&mut Assignment> {
        self.assignments.get_mut(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.assignments.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn find_mut(&mut self, id: i64) -> Option<&mut Assignment> {
        self.assignments.iter_mut().find(|a| a.id == id)
    }

    /// Applies an accepted submission locally so the roster reflects it
    /// without waiting for a refetch.
    pub fn mark_submitted(&mut self, id: i64, sheet: AnswerSheet) {
        if let Some(assignment) = self.find_mut(id) {
            assignment.submission.status = SubmissionStatus::Submitted;
            assignment.submission.sheet = Some(sheet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn essay_record() -> AssignmentRecord {
        serde_json::from_value(json!({
            "id": 7,
            "title": "Describe your hometown",
            "type": "essay",
            "description": "Write a descriptive essay.",
            "duration": 20,
            "total_points": 100,
            "due_date": "2026-09-01T12:00:00Z",
            "word_count": 250,
            "submission_status": "pending"
        }))
        .unwrap()
    }

    fn quiz_record() -> AssignmentRecord {
        serde_json::from_value(json!({
            "id": 8,
            "title": "Grammar check",
            "type": "quiz",
            "duration": 10,
            "total_points": 30,
            "questions": [
                { "questionText": "Pick the verb", "options": ["run", "blue"], "points": 10 },
                { "questionText": "Pick the noun", "options": ["cat", "softly"], "points": 10 },
                { "questionText": "Pick the adverb", "options": ["softly", "dog"], "points": 10 }
            ],
            "submission_status": "pending"
        }))
        .unwrap()
    }

    #[test]
    fn test_essay_record_maps_to_essay_kind() {
        let assignment = Assignment::from(essay_record());

        assert_eq!(
            assignment.kind,
            AssignmentKind::Essay {
                word_target: Some(250)
            }
        );
        assert_eq!(assignment.brief, "Write a descriptive essay.");
        assert!(assignment.is_timed());
        assert_eq!(assignment.allowance_secs(), Some(1200));
        assert_eq!(assignment.submission.status, SubmissionStatus::Pending);
    }

    #[test]
    fn test_quiz_record_parses_inline_questions() {
        let assignment = Assignment::from(quiz_record());

        match &assignment.kind {
            AssignmentKind::Quiz { questions } => {
                assert_eq!(questions.len(), 3);
                assert_eq!(questions[0].prompt, "Pick the verb");
                assert_eq!(questions[0].options, vec!["run", "blue"]);
                assert_eq!(questions[2].points, 10);
            }
            other => panic!("expected quiz, got {:?}", other),
        }
    }

    #[test]
    fn test_questions_encoded_as_string_still_parse() {
        let mut record = quiz_record();
        record.questions = Some(Value::String(
            r#"[{"questionText":"Only one","options":["a","b"],"points":5}]"#.to_string(),
        ));

        let assignment = Assignment::from(record);
        match &assignment.kind {
            AssignmentKind::Quiz { questions } => {
                assert_eq!(questions.len(), 1);
                assert_eq!(questions[0].prompt, "Only one");
            }
            other => panic!("expected quiz, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_falls_back_to_course_work() {
        let mut record = essay_record();
        record.kind = "oral_assignment".to_string();

        assert_eq!(Assignment::from(record).kind, AssignmentKind::CourseWork);
    }

    #[test]
    fn test_untimed_when_duration_missing_or_zero() {
        let mut record = essay_record();
        record.duration = None;
        let assignment = Assignment::from(record);
        assert!(!assignment.is_timed());
        assert_eq!(assignment.allowance_secs(), None);

        let mut record = essay_record();
        record.duration = Some(0);
        assert!(!Assignment::from(record).is_timed());
    }

    #[test]
    fn test_extension_joins_the_allowance() {
        let mut record = essay_record();
        record.extra_minutes = Some(5);

        assert_eq!(Assignment::from(record).allowance_secs(), Some(1500));
    }

    #[test]
    fn test_huge_allowances_do_not_wrap() {
        let mut record = essay_record();
        record.duration = Some(u32::MAX);
        record.extra_minutes = Some(u32::MAX);

        let expected = (u64::from(u32::MAX) + u64::from(u32::MAX)) * 60;
        assert_eq!(Assignment::from(record).allowance_secs(), Some(expected));
    }

    #[test]
    fn test_due_date_accepts_bare_dates() {
        let mut record = essay_record();
        record.due_date = Some("2026-09-01".to_string());

        let due = Assignment::from(record).due_date.unwrap();
        assert_eq!(due.date_naive(), NaiveDate::from_ymd_opt(2026, 9, 1).unwrap());
        assert_eq!(due.hour(), 23);
    }

    #[test]
    fn test_score_parses_numbers_and_strings() {
        let mut record = essay_record();
        record.score = Some(json!(87.5));
        assert_eq!(Assignment::from(record).submission.score, Some(87.5));

        let mut record = essay_record();
        record.score = Some(json!("91.25"));
        assert_eq!(Assignment::from(record).submission.score, Some(91.25));
    }

    #[test]
    fn test_submission_status_from_wire() {
        assert_eq!(
            SubmissionStatus::from_wire(Some("submitted")),
            SubmissionStatus::Submitted
        );
        assert_eq!(
            SubmissionStatus::from_wire(Some("graded")),
            SubmissionStatus::Graded
        );
        assert_eq!(
            SubmissionStatus::from_wire(Some("something_else")),
            SubmissionStatus::Pending
        );
        assert_eq!(SubmissionStatus::from_wire(None), SubmissionStatus::Pending);
    }

    #[test]
    fn test_student_content_object_form() {
        let mut record = quiz_record();
        record.student_content = Some(json!({"0": "run", "2": "softly"}));
        record.submission_status = Some("submitted".to_string());

        let assignment = Assignment::from(record);
        let sheet = assignment.submission.sheet.clone().unwrap();
        assert_eq!(
            sheet,
            AnswerSheet::Choices(BTreeMap::from([
                (0, "run".to_string()),
                (2, "softly".to_string())
            ]))
        );
        assert!(assignment.submission.locked());
    }

    #[test]
    fn test_student_content_string_encoded_object_form() {
        let mut record = quiz_record();
        record.student_content = Some(Value::String(r#"{"1":"cat"}"#.to_string()));

        let sheet = Assignment::from(record).submission.sheet.unwrap();
        assert_eq!(
            sheet,
            AnswerSheet::Choices(BTreeMap::from([(1, "cat".to_string())]))
        );
    }

    #[test]
    fn test_student_content_essay_form() {
        let mut record = essay_record();
        record.student_content = Some(Value::String("My hometown is quiet.".to_string()));

        let sheet = Assignment::from(record).submission.sheet.unwrap();
        assert_eq!(sheet, AnswerSheet::Essay("My hometown is quiet.".to_string()));
        assert_eq!(sheet.word_count(), 4);
    }

    #[test]
    fn test_answer_sheet_blankness() {
        assert!(AnswerSheet::Essay(String::new()).is_blank());
        assert!(AnswerSheet::Essay("   \n ".to_string()).is_blank());
        assert!(!AnswerSheet::Essay("words".to_string()).is_blank());
        assert!(AnswerSheet::Choices(BTreeMap::new()).is_blank());
        assert!(!AnswerSheet::Choices(BTreeMap::from([(0, "a".to_string())])).is_blank());
    }

    #[test]
    fn test_answer_sheet_wire_shape() {
        let essay = AnswerSheet::Essay("hello there".to_string());
        assert_eq!(serde_json::to_value(&essay).unwrap(), json!("hello there"));

        let picks = AnswerSheet::Choices(BTreeMap::from([
            (0, "Option A".to_string()),
            (1, "Option B".to_string()),
        ]));
        assert_eq!(
            serde_json::to_value(&picks).unwrap(),
            json!({"0": "Option A", "1": "Option B"})
        );
    }

    #[test]
    fn test_answer_sheet_decodes_both_shapes() {
        let essay: AnswerSheet = serde_json::from_value(json!("hello there")).unwrap();
        assert_eq!(essay, AnswerSheet::Essay("hello there".to_string()));

        // String object keys land back in the usize-keyed map.
        let picks: AnswerSheet =
            serde_json::from_value(json!({"0": "Option A", "2": "Option C"})).unwrap();
        assert_eq!(
            picks,
            AnswerSheet::Choices(BTreeMap::from([
                (0, "Option A".to_string()),
                (2, "Option C".to_string())
            ]))
        );

        assert!(serde_json::from_value::<AnswerSheet>(json!({"first": "A"})).is_err());
        assert!(serde_json::from_value::<AnswerSheet>(json!(42)).is_err());
    }

    #[test]
    fn test_roster_drops_inactive_rows() {
        let mut closed = essay_record();
        closed.id = 99;
        closed.status = Some("closed".to_string());

        let roster = Roster::from_records(vec![essay_record(), closed]);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.assignments[0].id, 7);
    }

    #[test]
    fn test_roster_orders_by_due_date_with_undated_last() {
        let mut early = essay_record();
        early.id = 1;
        early.due_date = Some("2026-08-28T00:00:00Z".to_string());
        let mut late = essay_record();
        late.id = 2;
        late.due_date = Some("2026-09-20T00:00:00Z".to_string());
        let mut undated = essay_record();
        undated.id = 3;
        undated.due_date = None;

        let roster = Roster::from_records(vec![undated, late, early]);
        let ids: Vec<i64> = roster.assignments.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_roster_selection_moves_and_clamps() {
        let mut a = essay_record();
        a.id = 1;
        let mut b = essay_record();
        b.id = 2;
        let mut roster = Roster::from_records(vec![a, b]);

        assert_eq!(roster.selected().unwrap().id, 1);
        roster.select_next();
        assert_eq!(roster.selected().unwrap().id, 2);
        roster.select_next();
        assert_eq!(roster.selected().unwrap().id, 2);
        roster.select_prev();
        roster.select_prev();
        assert_eq!(roster.selected().unwrap().id, 1);
    }

    #[test]
    fn test_roster_replace_keeps_cursor_by_id() {
        let mut a = essay_record();
        a.id = 1;
        let mut b = essay_record();
        b.id = 2;
        let mut roster = Roster::from_records(vec![a.clone(), b.clone()]);
        roster.select_next();

        // refreshed fetch returns the rows in a new order
        let mut b2 = b;
        b2.due_date = Some("2026-08-26T00:00:00Z".to_string());
        roster.replace(vec![a, b2]);

        assert_eq!(roster.selected().unwrap().id, 2);
    }

    #[test]
    fn test_mark_submitted_locks_the_row() {
        let mut roster = Roster::from_records(vec![essay_record()]);
        roster.mark_submitted(7, AnswerSheet::Essay("done".to_string()));

        let assignment = roster.selected().unwrap();
        assert_eq!(assignment.submission.status, SubmissionStatus::Submitted);
        assert!(assignment.submission.locked());
        assert_eq!(
            assignment.submission.sheet,
            Some(AnswerSheet::Essay("done".to_string()))
        );
    }

    #[test]
    fn test_due_label_tense() {
        let now = Utc.with_ymd_and_hms(2026, 8, 25, 12, 0, 0).unwrap();
        let mut assignment = Assignment::from(essay_record());

        assignment.due_date = Some(now + chrono::Duration::days(3));
        let label = assignment.due_label(now).unwrap();
        assert!(label.starts_with("due in"), "got {label}");

        assignment.due_date = Some(now - chrono::Duration::hours(2));
        let label = assignment.due_label(now).unwrap();
        assert!(label.ends_with("ago"), "got {label}");

        assignment.due_date = None;
        assert_eq!(assignment.due_label(now), None);
    }
}
