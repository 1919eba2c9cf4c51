// Votes in CSV files: one row per voter, one column per question.

use std::fs::File;

use crate::tally::io_common::{make_default_id, normalize_vote};
use crate::tally::*;

pub fn read_csv_votes(path: &str, vf: &VotesFile) -> TallyResult<Vec<ParsedVoter>> {
    let default_id = make_default_id(path);
    let (records, row_offset) = get_records(path, vf)?;

    let mut res: Vec<ParsedVoter> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        let lineno = idx + row_offset;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        let votes: Vec<String> = line.iter().map(normalize_vote).collect();
        debug!("read_csv_votes: lineno: {:?} votes: {:?}", lineno, &votes);
        res.push(ParsedVoter {
            id: default_id(lineno),
            votes,
        });
    }
    Ok(res)
}

fn get_records(path: &str, vf: &VotesFile) -> TallyResult<(csv::StringRecordsIntoIter<File>, usize)> {
    let first_row = vf.first_vote_row_index()?;
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut records = rdr.into_records();
    // The index starts at 1 to respect most conventions in the excel world
    for _ in 1..first_row {
        _ = records.next();
    }
    Ok((records, first_row))
}
