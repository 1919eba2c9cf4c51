use std::collections::{HashMap, HashSet};

use log::debug;

pub use crate::config::*;
use crate::{decode_vote, AnswerIndex, BallotAggregator};

/// A builder for adding the votes of one question.
///
/// Votes that cannot be decoded are dropped and counted by reason. They are not
/// part of the ballots and they are not reported as dirty.
///
/// ```
/// pub use approval_voting::builder::Builder;
/// pub use approval_voting::{Answer, Question};
/// # use approval_voting::TallyErrors;
///
/// let question = Question {
///     question: "Board members".to_string(),
///     answers: vec![
///         Answer { value: "Anna".to_string() },
///         Answer { value: "Bob".to_string() },
///     ],
///     min_selections: 1,
///     max_selections: 2,
///     num_seats: 1,
/// };
/// let mut builder = Builder::new(&question)?;
///
/// builder.add_encoded_vote("12");
/// builder.add_encoded_vote("21");
/// builder.add_vote(&["Clara".to_string()]);
///
/// assert_eq!(builder.total_ballots(), 2);
/// assert_eq!(builder.build().len(), 1);
///
/// # Ok::<(), TallyErrors>(())
/// ```
pub struct Builder {
    question: Question,
    index: AnswerIndex,
    aggregator: BallotAggregator,
    rejected: HashMap<RejectReason, u64>,
}

impl Builder {
    pub fn new(question: &Question) -> Result<Builder, TallyErrors> {
        question.check()?;
        Ok(Builder {
            question: question.clone(),
            index: AnswerIndex::new(question),
            aggregator: BallotAggregator::new(),
            rejected: HashMap::new(),
        })
    }

    /// Decodes a vote and adds it.
    ///
    /// This is the simplest use case: the vote is the text of the number cast by
    /// the voter.
    pub fn add_encoded_vote(&mut self, encoded: &str) -> VoteDecoding {
        match decode_vote(encoded, &self.question) {
            VoteDecoding::Decoded(values) => self.add_vote(&values),
            VoteDecoding::Rejected(reason) => self.reject(encoded, reason),
        }
    }

    /// Adds a vote given by the values of the selected answers.
    ///
    /// If one of the values is not an answer of the question, or if a value is
    /// repeated, none of them is counted.
    pub fn add_vote(&mut self, values: &[String]) -> VoteDecoding {
        match self.index.resolve(values) {
            Some(ids) if ids.iter().collect::<HashSet<_>>().len() != ids.len() => self.reject(
                &format!("{:?}", values),
                RejectReason::DuplicateSelection,
            ),
            Some(ids) => {
                self.aggregator.add_vote(&ids);
                VoteDecoding::Decoded(values.to_vec())
            }
            None => self.reject(&format!("{:?}", values), RejectReason::UnknownAnswer),
        }
    }

    fn reject(&mut self, vote: &str, reason: RejectReason) -> VoteDecoding {
        debug!("dropping vote {:?}: {:?}", vote, reason);
        *self.rejected.entry(reason).or_insert(0) += 1;
        VoteDecoding::Rejected(reason)
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    /// The number of dropped votes, by reason.
    pub fn rejected(&self) -> &HashMap<RejectReason, u64> {
        &self.rejected
    }

    /// The number of votes that made it into a ballot.
    pub fn total_ballots(&self) -> u64 {
        self.aggregator.total_ballots()
    }

    pub fn build(self) -> Vec<Ballot> {
        self.aggregator.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> Question {
        Question {
            question: "Q".to_string(),
            answers: ["A", "B", "C"]
                .iter()
                .map(|v| Answer {
                    value: v.to_string(),
                })
                .collect(),
            min_selections: 1,
            max_selections: 2,
            num_seats: 1,
        }
    }

    #[test]
    fn builds_the_ballots_of_the_example() {
        let mut builder = Builder::new(&question()).unwrap();
        builder.add_encoded_vote("12");
        builder.add_encoded_vote("21");
        builder.add_encoded_vote("1");
        assert_eq!(
            builder.add_encoded_vote("44"),
            VoteDecoding::Rejected(RejectReason::InvalidChoice)
        );
        assert_eq!(builder.total_ballots(), 3);
        assert_eq!(
            builder.rejected().get(&RejectReason::InvalidChoice),
            Some(&1)
        );
        assert_eq!(
            builder.build(),
            vec![
                Ballot {
                    answers: vec![AnswerId(1), AnswerId(2)],
                    count: 2
                },
                Ballot {
                    answers: vec![AnswerId(1)],
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn unknown_values_drop_the_whole_vote() {
        let mut builder = Builder::new(&question()).unwrap();
        assert_eq!(
            builder.add_vote(&["A".to_string(), "Z".to_string()]),
            VoteDecoding::Rejected(RejectReason::UnknownAnswer)
        );
        assert_eq!(builder.total_ballots(), 0);
        assert!(builder.build().is_empty());
    }

    #[test]
    fn repeated_values_are_rejected() {
        let mut builder = Builder::new(&question()).unwrap();
        assert_eq!(
            builder.add_vote(&["A".to_string(), "A".to_string()]),
            VoteDecoding::Rejected(RejectReason::DuplicateSelection)
        );
        builder.add_vote(&["A".to_string()]);
        assert_eq!(
            builder.rejected().get(&RejectReason::DuplicateSelection),
            Some(&1)
        );
        assert_eq!(
            builder.build(),
            vec![Ballot {
                answers: vec![AnswerId(1)],
                count: 1
            }]
        );
    }

    #[test]
    fn rejects_invalid_questions() {
        let mut q = question();
        q.max_selections = 4;
        assert!(matches!(
            Builder::new(&q),
            Err(TallyErrors::InvalidQuestion { .. })
        ));
        let mut q = question();
        q.min_selections = 3;
        assert!(Builder::new(&q).is_err());
        let mut q = question();
        q.answers[2].value = "A".to_string();
        assert_eq!(
            Builder::new(&q).err(),
            Some(TallyErrors::DuplicateAnswer {
                value: "A".to_string()
            })
        );
    }
}
