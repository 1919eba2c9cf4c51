use log::{debug, info, warn};

use approval_voting::blt::write_ballot_file;
use approval_voting::builder::Builder;
use approval_voting::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::tally::config_reader::*;
use crate::tally::engine::*;

mod config_reader;
mod engine;
mod io_common;
mod io_csv;
mod io_json;

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

#[derive(Debug, Snafu)]
pub enum TallyError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Expected a positive number"))]
    ParsingJsonNumber {},
    #[snafu(display("Error writing the summary"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening the CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of the CSV file"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Vote of line {lineno} is neither a number nor a string: {content}"))]
    WrongVoteType { lineno: usize, content: String },
    #[snafu(display(""))]
    MissingParentDir {},
    #[snafu(display("Question {question_num} does not exist, the election has {num_questions} questions"))]
    MissingQuestion {
        question_num: usize,
        num_questions: usize,
    },
    #[snafu(display("Question {question_num} cannot be counted"))]
    InvalidQuestion {
        source: TallyErrors,
        question_num: usize,
    },
    #[snafu(display("Error writing the ballot file of question {question_num}"))]
    WritingBallots {
        source: std::io::Error,
        question_num: usize,
    },
    #[snafu(display("The tally of question {question_num} failed"))]
    Engine {
        source: EngineError,
        question_num: usize,
    },
    #[snafu(display("The report of question {question_num} cannot be used"))]
    ComposingResult {
        source: TallyErrors,
        question_num: usize,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type TallyResult<T> = Result<T, TallyError>;

/// The votes of one voter: one encoded vote per question, in the order of the
/// questions. An empty string means that the voter did not answer.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ParsedVoter {
    pub id: String,
    pub votes: Vec<String>,
}

/// How the questions are counted, once the configuration and the command line
/// are merged.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TallySettings {
    pub method: String,
    pub timeout: Option<Duration>,
    pub ballots_directory: PathBuf,
}

/// Counts one question.
///
/// The ballots are written to a ballot file that only lives for the duration of
/// the tally: it is removed when this function returns, whatever the outcome.
pub fn tally_question<'a>(
    question_num: usize,
    question: &Question,
    votes: impl Iterator<Item = &'a str>,
    settings: &TallySettings,
    registry: &EngineRegistry,
) -> TallyResult<(QuestionResult, RawTallyReport)> {
    let mut builder = Builder::new(question).context(InvalidQuestionSnafu { question_num })?;
    for vote in votes {
        builder.add_encoded_vote(vote);
    }
    for (reason, count) in builder.rejected().iter() {
        info!(
            "tally_question: question {}: dropped {} votes: {:?}",
            question_num, count, reason
        );
    }
    info!(
        "tally_question: question {}: {} votes counted",
        question_num,
        builder.total_ballots()
    );
    let ballots = builder.build();
    let engine = registry
        .get(&settings.method)
        .context(EngineSnafu { question_num })?;

    fs::create_dir_all(&settings.ballots_directory)
        .context(WritingBallotsSnafu { question_num })?;
    let mut ballot_file = tempfile::Builder::new()
        .prefix(&format!("ballots_{}_", question_num))
        .suffix(".blt")
        .tempfile_in(&settings.ballots_directory)
        .context(WritingBallotsSnafu { question_num })?;
    {
        let mut out = BufWriter::new(ballot_file.as_file_mut());
        write_ballot_file(&mut out, question, &ballots)
            .context(WritingBallotsSnafu { question_num })?;
        out.flush().context(WritingBallotsSnafu { question_num })?;
    }
    debug!(
        "tally_question: {} distinct ballots written to {}",
        ballots.len(),
        ballot_file.path().display()
    );

    let report = run_tally(
        engine,
        ballot_file.path(),
        question.num_seats,
        settings.timeout,
    )
    .context(EngineSnafu { question_num })?;
    debug!("tally_question: report: {:?}", report);

    let result =
        compose_result(&report, question).context(ComposingResultSnafu { question_num })?;
    Ok((result, report))
}

fn result_to_json(question: &Question, result: &QuestionResult, report: &RawTallyReport) -> JSValue {
    let answers: Vec<JSValue> = result
        .answers
        .iter()
        .map(|a| {
            json!({
                "value": a.value,
                "total_count": a.total_count,
                "total_count_percentage": a.total_count_percentage
            })
        })
        .collect();
    json!({
        "question": question.question,
        "num_seats": question.num_seats,
        "total_votes": result.total_votes,
        "dirty_votes": result.dirty_votes,
        "winners": result.winners,
        "answers": answers,
        "tally_log": JsonReport::from(report)
    })
}

fn build_summary_js(config: &TallyConfig, settings: &TallySettings, results: Vec<JSValue>) -> JSValue {
    let c = OutputConfig {
        contest: config.output_settings.contest_name.clone(),
        method: settings.method.clone(),
    };
    json!({
        "config": c,
        "results": results })
}

fn build_settings(args: &Args, config: &TallyConfig, root_p: &Path) -> TallySettings {
    let engine_settings = config.engine.clone().unwrap_or_default();
    let method = args
        .method
        .clone()
        .or(engine_settings.method)
        .unwrap_or_else(|| APPROVAL_METHOD.to_string());
    let timeout = match args
        .timeout
        .or(engine_settings.timeout_seconds)
        .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
    {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let ballots_directory = match &config.output_settings.ballots_directory {
        Some(dir) => root_p.join(dir),
        None => std::env::temp_dir(),
    };
    TallySettings {
        method,
        timeout,
        ballots_directory,
    }
}

fn build_registry(
    config: &TallyConfig,
    rules: &TallyRules,
    timeout: Option<Duration>,
) -> EngineRegistry {
    let mut registry = EngineRegistry::with_builtin(rules);
    for ec in config.external_engines.iter().flatten() {
        info!("Registering engine {:?}: {}", ec.name, ec.program);
        registry.register(Arc::new(ExternalCommandEngine::new(
            &ec.name,
            &ec.program,
            ec.args.as_deref().unwrap_or(&[]),
            timeout,
        )));
    }
    registry
}

fn read_votes(args: &Args, config: &TallyConfig, root_p: &Path) -> TallyResult<Vec<ParsedVoter>> {
    let vf = config
        .votes_file
        .clone()
        .unwrap_or_else(|| VotesFile::new("csv", ""));
    let path = match &args.input {
        Some(input) => input.clone(),
        None if vf.file_path.is_empty() => {
            whatever!("No votes file: use --input or set votesFile in the configuration")
        }
        None => root_p.join(&vf.file_path).display().to_string(),
    };
    let provider = args.input_type.clone().unwrap_or_else(|| vf.provider.clone());
    info!("Attempting to read votes file {:?} ({})", path, provider);
    match provider.as_str() {
        "csv" => io_csv::read_csv_votes(&path, &vf),
        "json" => io_json::read_json_votes(&path),
        x => whatever!("Provider not implemented {:?}", x),
    }
}

pub fn run_election(args: &Args) -> TallyResult<()> {
    let config_path = match &args.config {
        Some(p) => p.clone(),
        None => whatever!("A configuration file must be provided with --config"),
    };
    let config_p = Path::new(config_path.as_str());
    let config = read_config(&config_path)?;
    info!("config: {:?}", config);
    let root_p = config_p.parent().context(MissingParentDirSnafu {})?;

    let rules = config.engine.clone().unwrap_or_default().rules()?;
    let settings = build_settings(args, &config, root_p);
    info!("settings: {:?} rules: {:?}", settings, rules);
    let registry = build_registry(&config, &rules, settings.timeout);

    let voters = read_votes(args, &config, root_p)?;
    info!("Read {} voters", voters.len());

    let num_questions = config.questions.len();
    for v in voters.iter().filter(|v| v.votes.len() > num_questions) {
        warn!(
            "Voter {} has {} votes for {} questions, ignoring the extra votes",
            v.id,
            v.votes.len(),
            num_questions
        );
    }
    let question_nums: Vec<usize> = match args.question {
        Some(question_num) => {
            ensure!(
                question_num < num_questions,
                MissingQuestionSnafu {
                    question_num,
                    num_questions
                }
            );
            vec![question_num]
        }
        None => (0..num_questions).collect(),
    };

    let mut results: Vec<JSValue> = Vec::new();
    for question_num in question_nums {
        let question = config.questions[question_num].to_question();
        let votes = voters
            .iter()
            .map(|v| v.votes.get(question_num).map(|s| s.as_str()).unwrap_or(""));
        let (result, report) =
            tally_question(question_num, &question, votes, &settings, &registry)?;
        info!(
            "Question {}: winners: {:?}",
            question_num, result.winners
        );
        results.push(result_to_json(&question, &result, &report));
    }

    // Assemble the final json
    let result_js = build_summary_js(&config, &settings, results);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(WritingJsonSnafu {})?;

    let out_path: Option<String> = args.out.clone().or_else(|| {
        config
            .output_settings
            .output_path
            .as_ref()
            .map(|p| match p.as_str() {
                "stdout" => p.clone(),
                _ => root_p.join(p).display().to_string(),
            })
    });
    match out_path.as_deref() {
        None | Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => {
            info!("Writing the summary to {}", path);
            fs::write(path, &pretty_js_stats).context(WritingOutputSnafu { path })?;
        }
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &args.reference {
        let summary_ref = read_summary(summary_p)?;
        info!("summary: {:?}", summary_ref);
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(WritingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference string");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn test_args(test_name: &str) -> Args {
        let test_dir = format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), test_name);
        Args {
            config: Some(format!("{}/{}_config.json", test_dir, test_name)),
            reference: Some(format!("{}/{}_expected_summary.json", test_dir, test_name)),
            out: None,
            input: None,
            input_type: None,
            method: None,
            timeout: None,
            question: None,
            verbose: false,
        }
    }

    fn run_election_test(args: &Args) -> TallyResult<()> {
        let out_dir = tempfile::tempdir().unwrap();
        let mut args = args.clone();
        args.out = Some(out_dir.path().join("summary.json").display().to_string());
        let res = run_election(&args);
        if let Err(e) = &res {
            warn!("Error occured {:?}", e);
            eprintln!("An error occured {}", e);
        }
        res
    }

    fn test_wrapper(test_name: &str) {
        assert!(run_election_test(&test_args(test_name)).is_ok());
    }

    #[test]
    fn board_election() {
        test_wrapper("board_election");
    }

    #[test]
    fn board_election_json_random_tiebreak() {
        test_wrapper("board_election_json_random_tiebreak");
    }

    #[test]
    fn board_election_single_question() {
        let mut args = test_args("board_election");
        args.question = Some(1);
        args.reference = Some(format!(
            "{}/tests/data/board_election/board_election_treasurer_expected_summary.json",
            env!("CARGO_MANIFEST_DIR")
        ));
        assert!(run_election_test(&args).is_ok());
    }

    #[test]
    fn board_election_wrong_reference() {
        let mut args = test_args("board_election");
        args.question = Some(0);
        assert!(run_election_test(&args).is_err());
    }

    #[test]
    fn board_election_missing_question() {
        let mut args = test_args("board_election");
        args.question = Some(2);
        assert!(matches!(
            run_election_test(&args),
            Err(TallyError::MissingQuestion { .. })
        ));
    }

    #[test]
    fn board_election_unknown_method() {
        let mut args = test_args("board_election");
        args.method = Some("Droop".to_string());
        assert!(matches!(
            run_election_test(&args),
            Err(TallyError::Engine { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn external_engine() {
        test_wrapper("external_engine");
    }

    struct RecordingEngine {
        fail: bool,
        seen: Mutex<Vec<(PathBuf, String)>>,
    }

    impl RecordingEngine {
        fn new(fail: bool) -> Arc<RecordingEngine> {
            Arc::new(RecordingEngine {
                fail,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl TallyEngine for RecordingEngine {
        fn name(&self) -> &str {
            "recording"
        }

        fn run_tally(&self, ballot_file: &Path, _num_seats: u32) -> EngineResult<RawTallyReport> {
            let content = fs::read_to_string(ballot_file).unwrap();
            self.seen
                .lock()
                .unwrap()
                .push((ballot_file.to_path_buf(), content));
            if self.fail {
                return Err(EngineError::Disconnected {});
            }
            let answers: HashMap<String, u64> = [("A", 3), ("B", 2), ("C", 0)]
                .iter()
                .map(|(name, count)| (name.to_string(), *count))
                .collect();
            Ok(RawTallyReport {
                ballots_count: 3,
                dirty_ballots_count: 3,
                winners: vec!["A".to_string()],
                answers,
            })
        }
    }

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

    fn settings(dir: &Path) -> TallySettings {
        TallySettings {
            method: "recording".to_string(),
            timeout: None,
            ballots_directory: dir.to_path_buf(),
        }
    }

    #[test]
    fn ballot_file_lives_only_during_the_tally() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RecordingEngine::new(false);
        let mut registry = EngineRegistry::new();
        registry.register(engine.clone());

        let votes = ["12", "21", "1", "44", ""];
        let (result, report) = tally_question(
            0,
            &question(),
            votes.iter().cloned(),
            &settings(dir.path()),
            &registry,
        )
        .unwrap();

        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (path, content) = &seen[0];
        assert_eq!(
            content,
            "3 1\n2 1 2 0\n1 1 0\n0\n\"A\"\n\"B\"\n\"C\"\n\"Q\"\n"
        );
        assert!(path.starts_with(dir.path()));
        assert!(!path.exists());

        assert_eq!(report.ballots_count, 3);
        assert_eq!(result.total_votes, 3);
        assert_eq!(result.dirty_votes, 0);
        assert_eq!(result.winners, vec!["A".to_string()]);
        let percentages: Vec<f64> = result
            .answers
            .iter()
            .map(|a| a.total_count_percentage)
            .collect();
        assert_eq!(percentages, vec![60.0, 40.0, 0.0]);
    }

    #[test]
    fn ballot_file_is_removed_when_the_tally_fails() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RecordingEngine::new(true);
        let mut registry = EngineRegistry::new();
        registry.register(engine.clone());

        let res = tally_question(
            3,
            &question(),
            ["12"].iter().cloned(),
            &settings(dir.path()),
            &registry,
        );
        match res {
            Err(TallyError::Engine { question_num, .. }) => assert_eq!(question_num, 3),
            x => panic!("unexpected result {:?}", x),
        }
        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].0.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn invalid_questions_are_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RecordingEngine::new(false);
        let mut registry = EngineRegistry::new();
        registry.register(engine.clone());
        let mut q = question();
        q.min_selections = 3;
        q.max_selections = 2;

        let res = tally_question(0, &q, ["12"].iter().cloned(), &settings(dir.path()), &registry);
        assert!(matches!(res, Err(TallyError::InvalidQuestion { .. })));
        assert!(engine.seen.lock().unwrap().is_empty());
    }
}
