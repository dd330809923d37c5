use crate::assignment::{AnswerSheet, Assignment, AssignmentKind, SubmissionStatus};
use crate::countdown::Countdown;
use chrono::{DateTime, Utc};

pub use crate::countdown::Tick;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Briefing shown, clock not yet running. Timed work only.
    NotStarted,
    InProgress,
    Submitted,
    Graded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitBlock {
    /// Free-text sheet is empty after trimming.
    EmptyEssay,
    /// A submission is already on the wire.
    InFlight,
    /// The work is locked; nothing left to submit.
    AlreadyClosed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirm {
    IncompleteQuiz { answered: usize, total: usize },
    Final,
}

impl Confirm {
    pub fn message(&self) -> &'static str {
        match self {
            Confirm::IncompleteQuiz { .. } => "You haven't answered all questions. Submit anyway?",
            Confirm::Final => {
                "Are you sure you want to submit your work? You won't be able to edit it after submission."
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitDecision {
    Blocked(SubmitBlock),
    NeedsConfirm(Confirm),
}

/// Draft state carried over from a previous session.
#[derive(Clone, Debug, PartialEq)]
pub struct ResumePoint {
    pub sheet: AnswerSheet,
    pub started_at: Option<DateTime<Utc>>,
}

/// One assignment being worked on: the sheet under edit, the submission
/// stage, and the countdown for timed work. Every assignment kind runs
/// through this same workflow; only the sheet shape differs.
#[derive(Debug)]
pub struct Workspace {
    pub assignment: Assignment,
    pub sheet: AnswerSheet,
    pub stage: Stage,
    pub countdown: Option<Countdown>,
    pub submitting: bool,
    pub focused_question: usize,
    pub started_at: Option<DateTime<Utc>>,
    dirty: bool,
}

impl Workspace {
    pub fn open(assignment: Assignment, resume: Option<ResumePoint>, now: DateTime<Utc>) -> Self {
        let stage = match assignment.submission.status {
            SubmissionStatus::Graded => Stage::Graded,
            SubmissionStatus::Submitted => Stage::Submitted,
            SubmissionStatus::Pending => Stage::NotStarted,
        };

        let server_sheet = assignment.submission.sheet.clone();
        let kind_blank = AnswerSheet::blank_for(&assignment.kind);

        let mut workspace = Self {
            sheet: server_sheet.unwrap_or(kind_blank),
            stage,
            countdown: None,
            submitting: false,
            focused_question: 0,
            started_at: None,
            dirty: false,
            assignment,
        };

        if workspace.stage != Stage::NotStarted {
            return workspace;
        }

        // Local draft wins over server-held content.
        let resumed_start = match resume {
            Some(point) => {
                workspace.sheet = point.sheet;
                point.started_at
            }
            None => None,
        };

        match workspace.assignment.allowance_secs() {
            Some(allowance) => {
                if let Some(started_at) = resumed_start {
                    // Time away still counts; an overdrawn session expires
                    // on its first tick instead of minting a fresh clock.
                    let elapsed = now
                        .signed_duration_since(started_at)
                        .num_seconds()
                        .max(0) as u64;
                    workspace.countdown = Some(Countdown::resume_from(allowance, elapsed));
                    workspace.started_at = Some(started_at);
                    workspace.stage = Stage::InProgress;
                }
                // else: stay in NotStarted until the student begins.
            }
            None => {
                workspace.stage = Stage::InProgress;
                workspace.started_at = resumed_start;
            }
        }

        workspace
    }

    /// "Begin Assessment": starts the clock on the full allowance.
    pub fn begin(&mut self, now: DateTime<Utc>) {
        if self.stage != Stage::NotStarted {
            return;
        }
        self.stage = Stage::InProgress;
        self.started_at = Some(now);
        if let Some(allowance) = self.assignment.allowance_secs() {
            self.countdown = Some(Countdown::start(allowance));
        }
        self.dirty = true;
    }

    /// Advances the clock by one second. Locked and not-yet-started work
    /// never ticks.
    pub fn tick(&mut self) -> Tick {
        if self.stage != Stage::InProgress {
            return Tick::Idle;
        }
        match &mut self.countdown {
            Some(countdown) => countdown.tick(),
            None => Tick::Idle,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.stage, Stage::Submitted | Stage::Graded)
    }

    fn can_edit(&self) -> bool {
        self.stage == Stage::InProgress && !self.submitting
    }

    pub fn type_char(&mut self, c: char) {
        if !self.can_edit() {
            return;
        }
        if let AnswerSheet::Essay(text) = &mut self.sheet {
            text.push(c);
            self.dirty = true;
        }
    }

    pub fn newline(&mut self) {
        self.type_char('\n');
    }

    pub fn backspace(&mut self) {
        if !self.can_edit() {
            return;
        }
        if let AnswerSheet::Essay(text) = &mut self.sheet {
            if text.pop().is_some() {
                self.dirty = true;
            }
        }
    }

    /// Records a pick for a question. Only indices of actual questions are
    /// valid keys; anything else is refused.
    pub fn record_answer(&mut self, question_idx: usize, option_idx: usize) -> bool {
        if !self.can_edit() {
            return false;
        }
        let option = match &self.assignment.kind {
            AssignmentKind::Quiz { questions } => questions
                .get(question_idx)
                .and_then(|q| q.options.get(option_idx))
                .cloned(),
            _ => None,
        };
        match option {
            Some(option) => {
                if let AnswerSheet::Choices(picks) = &mut self.sheet {
                    picks.insert(question_idx, option);
                    self.dirty = true;
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Pick an option on the focused question.
    pub fn select_option(&mut self, option_idx: usize) -> bool {
        self.record_answer(self.focused_question, option_idx)
    }

    pub fn clear_answer(&mut self) {
        if !self.can_edit() {
            return;
        }
        if let AnswerSheet::Choices(picks) = &mut self.sheet {
            if picks.remove(&self.focused_question).is_some() {
                self.dirty = true;
            }
        }
    }

    pub fn focus_next(&mut self) {
        if self.focused_question + 1 < self.total_questions() {
            self.focused_question += 1;
        }
    }

    pub fn focus_prev(&mut self) {
        if self.focused_question > 0 {
            self.focused_question -= 1;
        }
    }

    pub fn total_questions(&self) -> usize {
        match &self.assignment.kind {
            AssignmentKind::Quiz { questions } => questions.len(),
            _ => 0,
        }
    }

    pub fn answered_count(&self) -> usize {
        self.sheet.answered_count()
    }

    pub fn word_count(&self) -> usize {
        self.sheet.word_count()
    }

    /// Whether the essay has reached its suggested length. Advisory only;
    /// submission is never blocked on it.
    pub fn word_target_met(&self) -> Option<bool> {
        if let AssignmentKind::Essay {
            word_target: Some(target),
        } = self.assignment.kind
        {
            Some(self.word_count() >= target as usize)
        } else {
            None
        }
    }

    pub fn clock(&self) -> Option<String> {
        self.countdown.as_ref().map(Countdown::clock)
    }

    pub fn low_time(&self) -> bool {
        self.stage == Stage::InProgress
            && self.countdown.as_ref().is_some_and(Countdown::low_time)
    }

    pub fn expired(&self) -> bool {
        self.countdown.as_ref().is_some_and(Countdown::is_expired)
    }

    /// What a manual submit attempt should do. A valid sheet still goes
    /// through a final confirmation; automatic submission at expiry skips
    /// this entirely and sends the sheet as-is.
    pub fn submit_decision(&self) -> SubmitDecision {
        if self.is_locked() || self.stage == Stage::NotStarted {
            return SubmitDecision::Blocked(SubmitBlock::AlreadyClosed);
        }
        if self.submitting {
            return SubmitDecision::Blocked(SubmitBlock::InFlight);
        }
        match (&self.assignment.kind, &self.sheet) {
            (AssignmentKind::Quiz { questions }, AnswerSheet::Choices(picks)) => {
                if picks.len() < questions.len() {
                    SubmitDecision::NeedsConfirm(Confirm::IncompleteQuiz {
                        answered: picks.len(),
                        total: questions.len(),
                    })
                } else {
                    SubmitDecision::NeedsConfirm(Confirm::Final)
                }
            }
            _ => {
                if self.sheet.is_blank() {
                    SubmitDecision::Blocked(SubmitBlock::EmptyEssay)
                } else {
                    SubmitDecision::NeedsConfirm(Confirm::Final)
                }
            }
        }
    }

    pub fn submission_started(&mut self) {
        self.submitting = true;
        if let Some(countdown) = &mut self.countdown {
            countdown.pause();
        }
    }

    /// A failed POST leaves everything editable. The clock resumes unless
    /// it had already expired; an expired clock stays dead.
    pub fn submission_failed(&mut self) {
        self.submitting = false;
        if let Some(countdown) = &mut self.countdown {
            countdown.resume();
        }
    }

    pub fn submission_succeeded(&mut self) {
        self.submitting = false;
        self.stage = Stage::Submitted;
        if let Some(countdown) = &mut self.countdown {
            countdown.stop();
        }
        self.dirty = false;
    }

    pub fn grant_extension(&mut self, extra_mins: u32) -> bool {
        match &mut self.countdown {
            Some(countdown) => countdown.extend(u64::from(extra_mins) * 60),
            None => false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }
}
