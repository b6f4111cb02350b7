use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of the application under test (one per candidate/job pair)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApplicationId {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

impl From<String> for ApplicationId {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<u64> for ApplicationId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

pub type QuestionId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
pub enum AnswerOption {
    A,
    B,
    C,
    D,
}

impl AnswerOption {
    pub const ALL: [AnswerOption; 4] = [AnswerOption::A, AnswerOption::B, AnswerOption::C, AnswerOption::D];

    /// Map a key press (`a`-`d` or `1`-`4`) to an option
    pub fn from_key(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'a' | '1' => Some(AnswerOption::A),
            'b' | '2' => Some(AnswerOption::B),
            'c' | '3' => Some(AnswerOption::C),
            'd' | '4' => Some(AnswerOption::D),
            _ => None,
        }
    }
}

/// A multiple-choice question as served to candidates (no answer key)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub option_a: String,
    pub option_b: String,
    pub option_c: String,
    pub option_d: String,
}

impl Question {
    pub fn option_text(&self, option: AnswerOption) -> &str {
        match option {
            AnswerOption::A => &self.option_a,
            AnswerOption::B => &self.option_b,
            AnswerOption::C => &self.option_c,
            AnswerOption::D => &self.option_d,
        }
    }
}

/// Test content owned by the remote service; read-only on the client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Test {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub application: Option<i64>,
    pub total_marks: i64,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub passed: bool,
    /// Set by the service once a result exists
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Test {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Candidate selections keyed by the full question set; unset until chosen
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnswerSheet {
    selections: BTreeMap<QuestionId, Option<AnswerOption>>,
}

impl AnswerSheet {
    pub fn for_test(test: &Test) -> Self {
        Self {
            selections: test.questions.iter().map(|q| (q.id, None)).collect(),
        }
    }

    /// Record a selection. Unknown question ids are ignored.
    pub fn select(&mut self, question_id: QuestionId, option: AnswerOption) -> bool {
        match self.selections.get_mut(&question_id) {
            Some(slot) => {
                *slot = Some(option);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self, question_id: QuestionId) {
        if let Some(slot) = self.selections.get_mut(&question_id) {
            *slot = None;
        }
    }

    pub fn selected(&self, question_id: QuestionId) -> Option<AnswerOption> {
        self.selections.get(&question_id).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn answered_count(&self) -> usize {
        self.selections.values().filter(|s| s.is_some()).count()
    }

    /// Only questions with a selection go on the wire
    pub fn to_entries(&self) -> Vec<AnswerEntry> {
        self.selections
            .iter()
            .filter_map(|(&question_id, selected)| {
                selected.map(|selected_option| AnswerEntry {
                    question_id,
                    selected_option,
                })
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum SubmitReason {
    #[serde(rename = "manual")]
    #[strum(serialize = "manual")]
    Manual,
    #[serde(rename = "time-over")]
    #[strum(serialize = "time-over")]
    TimeOver,
    #[serde(rename = "tab-switch")]
    #[strum(serialize = "tab-switch")]
    TabSwitch,
}

impl SubmitReason {
    pub fn is_auto(&self) -> bool {
        !matches!(self, SubmitReason::Manual)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question_id: QuestionId,
    pub selected_option: AnswerOption,
}

/// Body of the one submission call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmitPayload {
    pub answers: Vec<AnswerEntry>,
    pub auto_submitted: bool,
    pub reason: SubmitReason,
}

impl SubmitPayload {
    pub fn new(sheet: &AnswerSheet, reason: SubmitReason) -> Self {
        Self {
            answers: sheet.to_entries(),
            auto_submitted: reason.is_auto(),
            reason,
        }
    }
}

/// Score produced once by the remote scoring service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub score: i64,
    pub total: i64,
    pub passed: bool,
    #[serde(default)]
    pub application_status: Option<String>,
}
