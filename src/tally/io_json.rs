// Votes in JSON files: an array of voters, each an array with one vote per
// question.

use crate::tally::io_common::{make_default_id, normalize_vote};
use crate::tally::*;

pub fn read_json_votes(path: &str) -> TallyResult<Vec<ParsedVoter>> {
    let default_id = make_default_id(path);
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let js: Vec<Vec<JSValue>> =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;

    let mut res: Vec<ParsedVoter> = Vec::new();
    for (idx, row) in js.iter().enumerate() {
        let lineno = idx + 1;
        let mut votes: Vec<String> = Vec::new();
        for cell in row.iter() {
            let vote = match cell {
                // The text of the number, as written. Negative or fractional
                // numbers end up as malformed votes.
                JSValue::Number(n) => n.to_string(),
                JSValue::String(s) => normalize_vote(s),
                JSValue::Null => "".to_string(),
                x => {
                    return WrongVoteTypeSnafu {
                        lineno,
                        content: x.to_string(),
                    }
                    .fail()
                }
            };
            votes.push(vote);
        }
        res.push(ParsedVoter {
            id: default_id(lineno),
            votes,
        });
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn votes_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn reads_numbers_and_strings() {
        let f = votes_file(r#"[[12, "1"], ["00000000000000000000000000000012", null], [-1]]"#);
        let voters = read_json_votes(&f.path().display().to_string()).unwrap();
        assert_eq!(voters.len(), 3);
        assert_eq!(voters[0].votes, vec!["12".to_string(), "1".to_string()]);
        assert_eq!(
            voters[1].votes,
            vec![
                "00000000000000000000000000000012".to_string(),
                "".to_string()
            ]
        );
        assert_eq!(voters[2].votes, vec!["-1".to_string()]);
    }

    #[test]
    fn long_numbers_keep_all_their_digits() {
        let f = votes_file("[[2019181716151413121110]]");
        let voters = read_json_votes(&f.path().display().to_string()).unwrap();
        assert_eq!(voters[0].votes, vec!["2019181716151413121110".to_string()]);

        let question = Question {
            question: "Committee".to_string(),
            answers: (1..=20)
                .map(|i| Answer {
                    value: format!("C{}", i),
                })
                .collect(),
            min_selections: 0,
            max_selections: 20,
            num_seats: 5,
        };
        let expected: Vec<String> = (10..=20).rev().map(|i| format!("C{}", i)).collect();
        assert_eq!(
            decode_vote(&voters[0].votes[0], &question),
            VoteDecoding::Decoded(expected)
        );
    }

    #[test]
    fn rejects_other_types() {
        let f = votes_file(r#"[[12], [[1, 2]]]"#);
        match read_json_votes(&f.path().display().to_string()) {
            Err(TallyError::WrongVoteType { lineno, .. }) => assert_eq!(lineno, 2),
            x => panic!("unexpected result {:?}", x),
        }
    }
}
