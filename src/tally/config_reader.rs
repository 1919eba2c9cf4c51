use crate::tally::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "contestName")]
    pub contest_name: String,
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
    /// Where the ballot files are written while a question is counted.
    /// Defaults to the temporary directory of the system.
    #[serde(rename = "ballotsDirectory")]
    pub ballots_directory: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub contest: String,
    pub method: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct VotesFile {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "firstVoteRowIndex")]
    _first_vote_row_index: Option<JSValue>,
}

impl VotesFile {
    pub fn new(provider: &str, file_path: &str) -> VotesFile {
        VotesFile {
            provider: provider.to_string(),
            file_path: file_path.to_string(),
            _first_vote_row_index: None,
        }
    }

    /// The 1-based index of the first row holding votes.
    pub fn first_vote_row_index(&self) -> TallyResult<usize> {
        if self._first_vote_row_index.is_none() {
            return Ok(1);
        }
        match read_js_int(&self._first_vote_row_index)? {
            0 => whatever!("firstVoteRowIndex starts at 1"),
            x => Ok(x),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    pub method: Option<String>,
    /// 0 lets the engine run without time limit.
    #[serde(rename = "timeoutSeconds")]
    pub timeout_seconds: Option<u64>,
    #[serde(rename = "tiebreakMode")]
    pub tiebreak_mode: Option<String>,
    #[serde(rename = "randomSeed")]
    pub random_seed: Option<String>,
}

impl EngineSettings {
    pub fn rules(&self) -> TallyResult<TallyRules> {
        let tiebreak_mode = match self.tiebreak_mode.as_deref() {
            None | Some("useCandidateOrder") => TieBreakMode::UseCandidateOrder,
            Some("random") => match self.random_seed.as_ref().map(|s| s.parse::<u32>()) {
                Some(Ok(seed)) => TieBreakMode::Random(seed),
                x => whatever!("Cannot use tiebreak mode random with seed {:?}", x),
            },
            Some(x) => whatever!("Unknown tiebreak mode {:?}", x),
        };
        Ok(TallyRules { tiebreak_mode })
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEngineConfig {
    pub name: String,
    pub program: String,
    pub args: Option<Vec<String>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    pub value: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuestionConfig {
    pub question: String,
    pub min: usize,
    pub max: usize,
    pub num_seats: u32,
    pub answers: Vec<AnswerConfig>,
}

impl QuestionConfig {
    pub fn to_question(&self) -> Question {
        Question {
            question: self.question.clone(),
            answers: self
                .answers
                .iter()
                .map(|a| Answer {
                    value: a.value.clone(),
                })
                .collect(),
            min_selections: self.min,
            max_selections: self.max,
            num_seats: self.num_seats,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "votesFile")]
    pub votes_file: Option<VotesFile>,
    pub engine: Option<EngineSettings>,
    #[serde(rename = "externalEngines")]
    pub external_engines: Option<Vec<ExternalEngineConfig>>,
    pub questions: Vec<QuestionConfig>,
}

pub fn read_config(path: &str) -> TallyResult<TallyConfig> {
    let config_str = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let config: TallyConfig =
        serde_json::from_str(&config_str).context(ParsingJsonSnafu { path })?;
    Ok(config)
}

pub fn read_summary(path: &str) -> TallyResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

fn read_js_int(x: &Option<JSValue>) -> TallyResult<usize> {
    match x {
        Some(JSValue::Number(n)) => n
            .as_u64()
            .map(|x| x as usize)
            .context(ParsingJsonNumberSnafu {}),
        Some(JSValue::String(s)) => s
            .trim()
            .parse::<usize>()
            .ok()
            .context(ParsingJsonNumberSnafu {}),
        _ => None.context(ParsingJsonNumberSnafu {}),
    }
}
