mod config;
use log::{debug, info};

use std::{
    cmp::Reverse,
    collections::{HashMap, HashSet},
};

pub use crate::config::*;

pub mod blt;
pub mod builder;
pub mod manual;

// **** Vote decoding ****

/// The number of digits used to encode one selection.
///
/// Positions start at 1, so `0` and `num_answers + 1` must fit in the same
/// field as the valid positions.
pub fn field_width(num_answers: usize) -> usize {
    (num_answers + 2).to_string().len()
}

/// Decodes a vote into the values of the selected answers.
///
/// The vote is the decimal text of a non-negative integer, made of fixed-width
/// fields: each field is the 1-based position of a selected answer. The text
/// is left-padded with zeros to a multiple of the field width.
///
/// A field that does not point to an answer rejects the whole vote: this is how
/// blank votes are cast. The number of selections must be within the bounds of
/// the question and the selections must be distinct.
pub fn decode_vote(encoded: &str, question: &Question) -> VoteDecoding {
    if encoded.is_empty() || !encoded.bytes().all(|b| b.is_ascii_digit()) {
        return VoteDecoding::Rejected(RejectReason::Malformed);
    }
    // The vote is an integer: leading zeros are not part of its text.
    let digits = match encoded.trim_start_matches('0') {
        "" => "0",
        s => s,
    };

    let num_answers = question.answers.len();
    let width = field_width(num_answers);
    let num_zeros = (width - digits.len() % width) % width;
    let padded = format!("{}{}", "0".repeat(num_zeros), digits);

    let mut selections: Vec<String> = Vec::new();
    for field in padded.as_bytes().chunks(width) {
        let position = field
            .iter()
            .fold(0usize, |acc, b| acc * 10 + (b - b'0') as usize);
        if position == 0 || position > num_answers {
            return VoteDecoding::Rejected(RejectReason::InvalidChoice);
        }
        selections.push(question.answers[position - 1].value.clone());
    }

    if selections.len() < question.min_selections {
        return VoteDecoding::Rejected(RejectReason::TooFewSelections);
    }
    if selections.len() > question.max_selections {
        return VoteDecoding::Rejected(RejectReason::TooManySelections);
    }
    let distinct: HashSet<&String> = selections.iter().collect();
    if distinct.len() != selections.len() {
        return VoteDecoding::Rejected(RejectReason::DuplicateSelection);
    }
    VoteDecoding::Decoded(selections)
}

/// Encodes the selected answer values the way `decode_vote` reads them.
///
/// Returns `None` if one of the values is not an answer of the question.
pub fn encode_vote(values: &[String], question: &Question) -> Option<String> {
    let width = field_width(question.answers.len());
    let mut encoded = String::new();
    for v in values {
        let position = question.answers.iter().position(|a| a.value == *v)? + 1;
        encoded.push_str(&format!("{:0width$}", position, width = width));
    }
    match encoded.trim_start_matches('0') {
        "" => Some("0".to_string()),
        s => Some(s.to_string()),
    }
}

// **** Answer index ****

/// Maps the value of each answer to its identifier in the ballot file.
///
/// Built once per question. The identifiers are assigned `1..=N` in the order
/// of the answers.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AnswerIndex {
    ids: HashMap<String, AnswerId>,
}

impl AnswerIndex {
    pub fn new(question: &Question) -> AnswerIndex {
        let ids = question
            .answers
            .iter()
            .enumerate()
            .map(|(idx, a)| (a.value.clone(), AnswerId((idx + 1) as u32)))
            .collect();
        AnswerIndex { ids }
    }

    pub fn lookup(&self, value: &str) -> Option<AnswerId> {
        self.ids.get(value).cloned()
    }

    /// Resolves all the values of a vote, or nothing if one of them is unknown.
    pub fn resolve(&self, values: &[String]) -> Option<Vec<AnswerId>> {
        values.iter().map(|v| self.lookup(v)).collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// **** Ballot aggregation ****

/// Groups the votes that select the same set of answers.
///
/// Ballots are keyed by their sorted identifiers, so adding a vote is a single
/// hash lookup. Ballots are enumerated in the order in which they were first
/// seen.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct BallotAggregator {
    positions: HashMap<Vec<AnswerId>, usize>,
    ballots: Vec<Ballot>,
}

impl BallotAggregator {
    pub fn new() -> BallotAggregator {
        BallotAggregator::default()
    }

    pub fn add_vote(&mut self, ids: &[AnswerId]) {
        let mut key = ids.to_vec();
        key.sort();
        key.dedup();
        if let Some(&idx) = self.positions.get(&key) {
            self.ballots[idx].count += 1;
        } else {
            self.positions.insert(key.clone(), self.ballots.len());
            self.ballots.push(Ballot {
                answers: key,
                count: 1,
            });
        }
    }

    /// The number of distinct ballots.
    pub fn len(&self) -> usize {
        self.ballots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ballots.is_empty()
    }

    /// The number of votes added so far.
    pub fn total_ballots(&self) -> u64 {
        self.ballots.iter().map(|b| b.count).sum()
    }

    pub fn ballots(&self) -> &[Ballot] {
        &self.ballots
    }

    pub fn finish(self) -> Vec<Ballot> {
        self.ballots
    }
}

// **** Approval count ****

/// Counts a ballot file with approval voting.
///
/// Every clean ballot gives its weight to each of the answers it selects. The
/// `num_seats` answers with the most votes are elected, in decreasing order of
/// votes.
///
/// Cleaning removes the identifiers that do not point to an answer and the
/// repeated identifiers within a ballot. Ballots left empty are not counted:
/// they only appear in the count of dirty ballots.
pub fn run_approval_tally(ballot_file: &blt::BallotFile, rules: &TallyRules) -> RawTallyReport {
    info!(
        "run_approval_tally: processing {:?} distinct ballots, {:?} answers, {:?} seats, rules: {:?}",
        ballot_file.ballots.len(),
        ballot_file.candidates.len(),
        ballot_file.num_seats,
        rules
    );
    let num_answers = ballot_file.candidates.len();
    let mut dirty_ballots_count: u64 = 0;
    let mut ballots_count: u64 = 0;
    let mut tally: Vec<u64> = vec![0; num_answers];

    for b in ballot_file.ballots.iter() {
        dirty_ballots_count += b.count;
        let mut seen: HashSet<AnswerId> = HashSet::new();
        let clean: Vec<AnswerId> = b
            .answers
            .iter()
            .filter(|aid| aid.0 >= 1 && (aid.0 as usize) <= num_answers)
            .filter(|aid| seen.insert(**aid))
            .cloned()
            .collect();
        if clean.is_empty() {
            debug!("run_approval_tally: dropping empty ballot {:?}", b);
            continue;
        }
        ballots_count += b.count;
        for aid in clean {
            tally[(aid.0 - 1) as usize] += b.count;
        }
    }

    for (name, count) in ballot_file.candidates.iter().zip(tally.iter()) {
        info!("Answer: {}: {}", name, count);
    }

    let tiebreak_keys: Vec<String> = ballot_file
        .candidates
        .iter()
        .enumerate()
        .map(|(idx, name)| match rules.tiebreak_mode {
            TieBreakMode::UseCandidateOrder => format!("{:08}", idx),
            TieBreakMode::Random(seed) => sha256::digest(format!("{:08}{}", seed, name)),
        })
        .collect();
    let mut order: Vec<usize> = (0..num_answers).collect();
    order.sort_by_key(|&idx| (Reverse(tally[idx]), tiebreak_keys[idx].clone()));
    debug!("run_approval_tally: answer order: {:?}", order);

    let winners: Vec<String> = order
        .iter()
        .take(ballot_file.num_seats as usize)
        .map(|&idx| ballot_file.candidates[idx].clone())
        .collect();

    RawTallyReport {
        ballots_count,
        dirty_ballots_count,
        winners,
        answers: ballot_file
            .candidates
            .iter()
            .cloned()
            .zip(tally.iter().cloned())
            .collect(),
    }
}

// **** Result composition ****

/// Merges the report of a tally engine into the result of the question.
///
/// The percentages are relative to the sum of the votes of all the answers:
/// one ballot counts for each answer it selects.
pub fn compose_result(
    report: &RawTallyReport,
    question: &Question,
) -> Result<QuestionResult, TallyErrors> {
    let dirty_votes = report
        .dirty_ballots_count
        .checked_sub(report.ballots_count)
        .ok_or(TallyErrors::InconsistentReport {
            ballots_count: report.ballots_count,
            dirty_ballots_count: report.dirty_ballots_count,
        })?;

    let total_vote_weight: u64 = report.answers.values().sum();
    debug!("compose_result: total vote weight: {:?}", total_vote_weight);

    let mut answers: Vec<AnswerResult> = Vec::new();
    for a in question.answers.iter() {
        let total_count = *report
            .answers
            .get(&a.value)
            .ok_or_else(|| TallyErrors::MissingAnswerCount {
                value: a.value.clone(),
            })?;
        let total_count_percentage = if total_vote_weight > 0 {
            (total_count as f64 * 100.0) / total_vote_weight as f64
        } else {
            0.0
        };
        answers.push(AnswerResult {
            value: a.value.clone(),
            total_count,
            total_count_percentage,
        });
    }

    Ok(QuestionResult {
        total_votes: report.ballots_count,
        dirty_votes,
        winners: report.winners.clone(),
        answers,
    })
}
