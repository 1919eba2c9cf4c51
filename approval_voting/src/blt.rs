//! Ballot files in the BLT format.
//!
//! The file is read by the tally engines, so it is written exactly as follows:
//!
//! ```text
//! 3 2
//! 2 1 2 0
//! 1 1 0
//! 0
//! "A"
//! "B"
//! "C"
//! "Who should sit on the board?"
//! ```
//!
//! The header holds the number of answers and the number of seats. Each ballot
//! line holds the number of voters who cast it, the identifiers of the selected
//! answers and a `0` marking the end of the selection. A line with a single `0`
//! ends the ballots. Then come the quoted answers, in order, and the quoted
//! question.

use std::io::{BufRead, Write};

use log::debug;

use crate::config::*;

/// The content of a ballot file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct BallotFile {
    pub num_seats: u32,
    /// The ballots, with the identifiers in the order they were written.
    pub ballots: Vec<Ballot>,
    /// The names of the answers. The name of identifier `i` is at `i - 1`.
    pub candidates: Vec<String>,
    pub title: String,
}

/// Writes the ballots of a question.
///
/// The newlines of the question text are removed so that it fits on one line.
pub fn write_ballot_file<W: Write>(
    out: &mut W,
    question: &Question,
    ballots: &[Ballot],
) -> std::io::Result<()> {
    writeln!(out, "{} {}", question.answers.len(), question.num_seats)?;
    for b in ballots {
        let ids: Vec<String> = b.answers.iter().map(|aid| aid.0.to_string()).collect();
        writeln!(out, "{} {} 0", b.count, ids.join(" "))?;
    }
    writeln!(out, "0")?;

    for a in question.answers.iter() {
        writeln!(out, "\"{}\"", a.value)?;
    }
    writeln!(out, "\"{}\"", question.question.replace('\n', ""))?;
    Ok(())
}

fn malformed(lineno: usize, message: impl Into<String>) -> TallyErrors {
    TallyErrors::MalformedBallotFile {
        lineno,
        message: message.into(),
    }
}

fn parse_number<T: std::str::FromStr>(token: &str, lineno: usize) -> Result<T, TallyErrors> {
    token
        .parse::<T>()
        .map_err(|_| malformed(lineno, format!("expected a number, found {:?}", token)))
}

fn parse_quoted(line: &str, lineno: usize) -> Result<String, TallyErrors> {
    match line
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(s) => Ok(s.to_string()),
        None => Err(malformed(
            lineno,
            format!("expected a quoted string, found {:?}", line),
        )),
    }
}

/// Reads a ballot file written by `write_ballot_file` or by another tool
/// producing the same format.
pub fn read_ballot_file<R: BufRead>(input: R) -> Result<BallotFile, TallyErrors> {
    let mut lines = input.lines().enumerate().map(|(idx, line)| {
        let lineno = idx + 1;
        line.map(|l| (lineno, l))
            .map_err(|e| malformed(lineno, e.to_string()))
    });

    let (lineno, header) = lines
        .next()
        .ok_or_else(|| malformed(1, "empty ballot file"))??;
    // The last line read: a missing line is reported as the one after it.
    let mut last_lineno = lineno;
    let header_tokens: Vec<&str> = header.split_whitespace().collect();
    let (num_candidates, num_seats): (usize, u32) = match header_tokens.as_slice() {
        [n, s] => (parse_number(n, lineno)?, parse_number(s, lineno)?),
        _ => {
            return Err(malformed(
                lineno,
                "the header must hold the number of answers and the number of seats",
            ))
        }
    };
    debug!(
        "read_ballot_file: {:?} answers, {:?} seats",
        num_candidates, num_seats
    );

    let mut ballots: Vec<Ballot> = Vec::new();
    loop {
        let (lineno, line) = lines
            .next()
            .ok_or_else(|| malformed(last_lineno + 1, "missing the end of the ballots"))??;
        last_lineno = lineno;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["0"] => break,
            [count, ids @ .., "0"] => {
                let count: u64 = parse_number(count, lineno)?;
                if count == 0 {
                    return Err(malformed(lineno, "a ballot must be cast at least once"));
                }
                let mut answers: Vec<AnswerId> = Vec::new();
                for token in ids {
                    let aid: u32 = parse_number(token, lineno)?;
                    if aid == 0 {
                        return Err(malformed(lineno, "the selection ends before the line"));
                    }
                    answers.push(AnswerId(aid));
                }
                ballots.push(Ballot { answers, count });
            }
            _ => {
                return Err(malformed(
                    lineno,
                    format!("a ballot must end with 0, found {:?}", line),
                ))
            }
        }
    }

    let mut candidates: Vec<String> = Vec::new();
    for _ in 0..num_candidates {
        let (lineno, line) = lines
            .next()
            .ok_or_else(|| malformed(last_lineno + 1, "missing answer names"))??;
        last_lineno = lineno;
        candidates.push(parse_quoted(&line, lineno)?);
    }
    let (lineno, line) = lines
        .next()
        .ok_or_else(|| malformed(last_lineno + 1, "missing the title"))??;
    let title = parse_quoted(&line, lineno)?;

    Ok(BallotFile {
        num_seats,
        ballots,
        candidates,
        title,
    })
}
