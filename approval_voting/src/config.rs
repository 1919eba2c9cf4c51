// ********* Input data structures ***********

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::Display;

/// One of the possible answers of a question.
///
/// The value is what is displayed to the voters and what is written in the
/// ballot file. It must be unique within a question.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Answer {
    pub value: String,
}

/// A question of a multi-seat approval election.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Question {
    pub question: String,
    pub answers: Vec<Answer>,
    pub min_selections: usize,
    pub max_selections: usize,
    pub num_seats: u32,
}

impl Question {
    /// Checks that `0 <= min <= max <= number of answers` and that the
    /// answers are distinct.
    pub fn check(&self) -> Result<(), TallyErrors> {
        if self.min_selections > self.max_selections || self.max_selections > self.answers.len() {
            return Err(TallyErrors::InvalidQuestion {
                min_selections: self.min_selections,
                max_selections: self.max_selections,
                num_answers: self.answers.len(),
            });
        }
        let mut seen: HashSet<&str> = HashSet::new();
        for a in self.answers.iter() {
            if !seen.insert(a.value.as_str()) {
                return Err(TallyErrors::DuplicateAnswer {
                    value: a.value.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn answer_values(&self) -> Vec<String> {
        self.answers.iter().map(|a| a.value.clone()).collect()
    }
}

/// The 1-based identifier of an answer, as written in the ballot file.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct AnswerId(pub u32);

/// Why an encoded vote was dropped from the tally.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum RejectReason {
    /// Empty text or a character that is not a decimal digit.
    Malformed,
    /// One field points before the first answer or after the last one.
    /// This is also how blank votes are encoded.
    InvalidChoice,
    TooFewSelections,
    TooManySelections,
    DuplicateSelection,
    /// A selected value is not an answer of the question.
    UnknownAnswer,
}

/// Outcome of decoding one encoded vote.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum VoteDecoding {
    /// The selected answer values, in the order of the encoding.
    Decoded(Vec<String>),
    Rejected(RejectReason),
}

/// A distinct set of selected answers and the number of voters who cast it.
///
/// The ids are kept sorted: two ballots are the same if they select the same
/// answers, regardless of the order of selection.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Ballot {
    pub answers: Vec<AnswerId>,
    pub count: u64,
}

// ******** Output data structures *********

/// The report returned by a tally engine.
#[derive(PartialEq, Debug, Clone)]
pub struct RawTallyReport {
    /// The number of clean ballots that were counted.
    pub ballots_count: u64,
    /// The number of ballots read, before discarding the invalid ones.
    pub dirty_ballots_count: u64,
    /// The elected answers, in order of election.
    pub winners: Vec<String>,
    /// The number of votes received by each answer.
    pub answers: HashMap<String, u64>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct AnswerResult {
    pub value: String,
    pub total_count: u64,
    pub total_count_percentage: f64,
}

/// The result of a question, as merged from the report of the engine.
#[derive(PartialEq, Debug, Clone)]
pub struct QuestionResult {
    pub total_votes: u64,
    pub dirty_votes: u64,
    pub winners: Vec<String>,
    pub answers: Vec<AnswerResult>,
}

/// Errors that prevent the tally of a question from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TallyErrors {
    InvalidQuestion {
        min_selections: usize,
        max_selections: usize,
        num_answers: usize,
    },
    DuplicateAnswer { value: String },
    /// The ballot file could not be understood.
    MalformedBallotFile { lineno: usize, message: String },
    /// The engine did not report a count for this answer.
    MissingAnswerCount { value: String },
    /// The engine reported fewer dirty ballots than clean ballots.
    InconsistentReport {
        ballots_count: u64,
        dirty_ballots_count: u64,
    },
}

impl Error for TallyErrors {}

impl Display for TallyErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TallyErrors::InvalidQuestion {
                min_selections,
                max_selections,
                num_answers,
            } => write!(
                f,
                "invalid question: min {} max {} with {} answers",
                min_selections, max_selections, num_answers
            ),
            TallyErrors::DuplicateAnswer { value } => {
                write!(f, "invalid question: answer {:?} appears twice", value)
            }
            TallyErrors::MalformedBallotFile { lineno, message } => {
                write!(f, "malformed ballot file at line {}: {}", lineno, message)
            }
            TallyErrors::MissingAnswerCount { value } => {
                write!(f, "no count reported for answer {:?}", value)
            }
            TallyErrors::InconsistentReport {
                ballots_count,
                dirty_ballots_count,
            } => write!(
                f,
                "inconsistent report: {} ballots but {} dirty ballots",
                ballots_count, dirty_ballots_count
            ),
        }
    }
}

// ********* Configuration **********

/// How to order answers that received the same number of votes.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum TieBreakMode {
    /// The answer that comes first in the question wins the tie.
    UseCandidateOrder,
    /// Hard to guess in advance, but reproducible for a given seed: the tied
    /// answers are sorted by a SHA-256 digest of the seed and their value.
    Random(u32),
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TallyRules {
    pub tiebreak_mode: TieBreakMode,
}

impl TallyRules {
    pub const DEFAULT_RULES: TallyRules = TallyRules {
        tiebreak_mode: TieBreakMode::UseCandidateOrder,
    };
}
