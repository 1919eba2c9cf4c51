// The tally engines: they read a ballot file and return the winners and the
// count of each answer.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use approval_voting::blt::read_ballot_file;
use approval_voting::*;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// The name of the built-in approval count.
pub const APPROVAL_METHOD: &str = "Approval";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Snafu)]
pub enum EngineError {
    #[snafu(display("Unknown tally method {method:?}, available methods: {available:?}"))]
    UnknownMethod {
        method: String,
        available: Vec<String>,
    },
    #[snafu(display("Error reading the ballot file {path}"))]
    ReadingBallots {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The ballot file is malformed"))]
    MalformedBallots { source: TallyErrors },
    #[snafu(display("Error creating a scratch file in {dir}"))]
    ScratchFile {
        source: std::io::Error,
        dir: String,
    },
    #[snafu(display("Error running {program}"))]
    Spawning {
        source: std::io::Error,
        program: String,
    },
    #[snafu(display("{program} failed ({status}): {diagnostic}"))]
    EngineFailed {
        program: String,
        status: ExitStatus,
        diagnostic: String,
    },
    #[snafu(display("Error reading the report of {program}"))]
    ReadingReport {
        source: std::io::Error,
        program: String,
    },
    #[snafu(display("Error parsing the report of {program}"))]
    ParsingReport {
        source: serde_json::Error,
        program: String,
    },
    #[snafu(display("The tally did not finish within {timeout:?}"))]
    Timeout { timeout: Duration },
    #[snafu(display("The tally engine stopped without returning a report"))]
    Disconnected {},
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A tally method, found by name in the `EngineRegistry`.
pub trait TallyEngine: Send + Sync {
    fn name(&self) -> &str;

    fn run_tally(&self, ballot_file: &Path, num_seats: u32) -> EngineResult<RawTallyReport>;

    /// True if the engine stops by itself after the timeout. Other engines are
    /// run on a separate thread that is abandoned on timeout.
    fn enforces_timeout(&self) -> bool {
        false
    }
}

/// The report as written by the external engines.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    pub ballots_count: u64,
    pub dirty_ballots_count: u64,
    pub winners: Vec<String>,
    pub answers: BTreeMap<String, u64>,
}

impl From<JsonReport> for RawTallyReport {
    fn from(js: JsonReport) -> RawTallyReport {
        RawTallyReport {
            ballots_count: js.ballots_count,
            dirty_ballots_count: js.dirty_ballots_count,
            winners: js.winners,
            answers: js.answers.into_iter().collect(),
        }
    }
}

impl From<&RawTallyReport> for JsonReport {
    fn from(report: &RawTallyReport) -> JsonReport {
        JsonReport {
            ballots_count: report.ballots_count,
            dirty_ballots_count: report.dirty_ballots_count,
            winners: report.winners.clone(),
            answers: report
                .answers
                .iter()
                .map(|(name, count)| (name.clone(), *count))
                .collect(),
        }
    }
}

/// The approval count of the `approval_voting` library.
pub struct ApprovalEngine {
    rules: TallyRules,
}

impl ApprovalEngine {
    pub fn new(rules: &TallyRules) -> ApprovalEngine {
        ApprovalEngine {
            rules: rules.clone(),
        }
    }
}

impl TallyEngine for ApprovalEngine {
    fn name(&self) -> &str {
        APPROVAL_METHOD
    }

    fn run_tally(&self, ballot_file: &Path, num_seats: u32) -> EngineResult<RawTallyReport> {
        let path = ballot_file.display().to_string();
        let f = File::open(ballot_file).context(ReadingBallotsSnafu { path })?;
        let mut bf = read_ballot_file(BufReader::new(f)).context(MalformedBallotsSnafu {})?;
        if bf.num_seats != num_seats {
            warn!(
                "ApprovalEngine: the ballot file declares {} seats, counting for {}",
                bf.num_seats, num_seats
            );
            bf.num_seats = num_seats;
        }
        Ok(run_approval_tally(&bf, &self.rules))
    }
}

/// An engine provided by another program.
///
/// The program is called with its arguments followed by the path of the ballot
/// file, the number of seats and the path where it must write its report in
/// JSON. A non-zero exit status is a failure: what the program wrote to its
/// standard error is returned as the diagnostic.
pub struct ExternalCommandEngine {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ExternalCommandEngine {
    pub fn new(
        name: &str,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> ExternalCommandEngine {
        ExternalCommandEngine {
            name: name.to_string(),
            program: program.to_string(),
            args: args.to_vec(),
            timeout,
        }
    }
}

impl TallyEngine for ExternalCommandEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_tally(&self, ballot_file: &Path, num_seats: u32) -> EngineResult<RawTallyReport> {
        let program = self.program.clone();
        // The report and the diagnostic are kept next to the ballot file.
        let scratch_dir = match ballot_file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => std::env::temp_dir(),
        };
        let report_file = tempfile::Builder::new()
            .prefix("report_")
            .suffix(".json")
            .tempfile_in(&scratch_dir)
            .context(ScratchFileSnafu {
                dir: scratch_dir.display().to_string(),
            })?;
        let mut stderr_file = tempfile::tempfile_in(&scratch_dir).context(ScratchFileSnafu {
            dir: scratch_dir.display().to_string(),
        })?;
        let stderr_handle = stderr_file.try_clone().context(ScratchFileSnafu {
            dir: scratch_dir.display().to_string(),
        })?;

        debug!(
            "ExternalCommandEngine: {} {:?} {} {} {}",
            program,
            self.args,
            ballot_file.display(),
            num_seats,
            report_file.path().display()
        );
        let mut child = Command::new(&program)
            .args(&self.args)
            .arg(ballot_file)
            .arg(num_seats.to_string())
            .arg(report_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_handle))
            .spawn()
            .context(SpawningSnafu {
                program: program.clone(),
            })?;

        let status = wait_with_timeout(&mut child, self.timeout, &program)?;
        if !status.success() {
            let mut diagnostic = String::new();
            _ = stderr_file.seek(SeekFrom::Start(0));
            _ = stderr_file.read_to_string(&mut diagnostic);
            return EngineFailedSnafu {
                program,
                status,
                diagnostic: diagnostic.trim().to_string(),
            }
            .fail();
        }

        let contents = fs::read_to_string(report_file.path()).context(ReadingReportSnafu {
            program: program.clone(),
        })?;
        let js: JsonReport =
            serde_json::from_str(contents.as_str()).context(ParsingReportSnafu { program })?;
        Ok(js.into())
    }

    fn enforces_timeout(&self) -> bool {
        true
    }
}

fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
    program: &str,
) -> EngineResult<ExitStatus> {
    let timeout = match timeout {
        Some(t) => t,
        None => return child.wait().context(SpawningSnafu { program }),
    };
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().context(SpawningSnafu { program })? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            warn!("{} is still running after {:?}, killing it", program, timeout);
            _ = child.kill();
            _ = child.wait();
            return TimeoutSnafu { timeout }.fail();
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// The tally engines that can be selected by name.
#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn TallyEngine>>,
}

impl EngineRegistry {
    pub fn new() -> EngineRegistry {
        EngineRegistry::default()
    }

    /// A registry with the built-in approval count.
    pub fn with_builtin(rules: &TallyRules) -> EngineRegistry {
        let mut registry = EngineRegistry::new();
        registry.register(Arc::new(ApprovalEngine::new(rules)));
        registry
    }

    /// Adds an engine. An engine registered under the same name is replaced.
    pub fn register(&mut self, engine: Arc<dyn TallyEngine>) {
        let name = engine.name().to_string();
        if self.engines.insert(name.clone(), engine).is_some() {
            warn!("EngineRegistry: replacing the engine {:?}", name);
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, method: &str) -> EngineResult<Arc<dyn TallyEngine>> {
        self.engines
            .get(method)
            .cloned()
            .context(UnknownMethodSnafu {
                method,
                available: self.names(),
            })
    }
}

/// Runs the engine on the ballot file, waiting at most `timeout` for the
/// report.
///
/// Errors are not retried: the ballot file was produced by this program, a
/// failure is not expected to go away.
pub fn run_tally(
    engine: Arc<dyn TallyEngine>,
    ballot_file: &Path,
    num_seats: u32,
    timeout: Option<Duration>,
) -> EngineResult<RawTallyReport> {
    info!(
        "run_tally: method {} on {} for {} seats",
        engine.name(),
        ballot_file.display(),
        num_seats
    );
    let timeout = match timeout {
        Some(t) if !engine.enforces_timeout() => t,
        _ => return engine.run_tally(ballot_file, num_seats),
    };

    let (tx, rx) = mpsc::channel();
    let path = ballot_file.to_path_buf();
    thread::spawn(move || {
        _ = tx.send(engine.run_tally(&path, num_seats));
    });
    match rx.recv_timeout(timeout) {
        Ok(res) => res,
        Err(mpsc::RecvTimeoutError::Timeout) => TimeoutSnafu { timeout }.fail(),
        Err(mpsc::RecvTimeoutError::Disconnected) => DisconnectedSnafu {}.fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BALLOTS: &str = "3 2\n2 1 2 0\n1 1 0\n1 3 0\n0\n\"A\"\n\"B\"\n\"C\"\n\"Board\"\n";

    fn ballot_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    struct SlowEngine;

    impl TallyEngine for SlowEngine {
        fn name(&self) -> &str {
            "slow"
        }

        fn run_tally(&self, _ballot_file: &Path, _num_seats: u32) -> EngineResult<RawTallyReport> {
            thread::sleep(Duration::from_secs(2));
            DisconnectedSnafu {}.fail()
        }
    }

    #[test]
    fn approval_engine_reads_the_ballot_file() {
        let f = ballot_file(BALLOTS);
        let registry = EngineRegistry::with_builtin(&TallyRules::DEFAULT_RULES);
        let engine = registry.get(APPROVAL_METHOD).unwrap();
        let report = run_tally(engine, f.path(), 2, Some(Duration::from_secs(10))).unwrap();
        assert_eq!(report.ballots_count, 4);
        assert_eq!(report.dirty_ballots_count, 4);
        assert_eq!(report.winners, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(report.answers.get("A"), Some(&3));
        assert_eq!(report.answers.get("C"), Some(&1));
    }

    #[test]
    fn approval_engine_rejects_malformed_ballots() {
        let f = ballot_file("3 2\n2 1 2\n0\n");
        let engine = ApprovalEngine::new(&TallyRules::DEFAULT_RULES);
        let res = engine.run_tally(f.path(), 2);
        assert!(matches!(res, Err(EngineError::MalformedBallots { .. })));
    }

    #[test]
    fn unknown_methods_are_errors() {
        let registry = EngineRegistry::with_builtin(&TallyRules::DEFAULT_RULES);
        match registry.get("Droop") {
            Err(EngineError::UnknownMethod { method, available }) => {
                assert_eq!(method, "Droop");
                assert_eq!(available, vec![APPROVAL_METHOD.to_string()]);
            }
            _ => panic!("expected an unknown method"),
        }
    }

    #[test]
    fn slow_engines_time_out() {
        let f = ballot_file(BALLOTS);
        let res = run_tally(
            Arc::new(SlowEngine),
            f.path(),
            2,
            Some(Duration::from_millis(100)),
        );
        assert!(matches!(res, Err(EngineError::Timeout { .. })));
    }

    #[cfg(unix)]
    fn shell_engine(script: &str, timeout: Option<Duration>) -> ExternalCommandEngine {
        ExternalCommandEngine::new(
            "shell",
            "sh",
            &[
                "-c".to_string(),
                script.to_string(),
                "shell-engine".to_string(),
            ],
            timeout,
        )
    }

    #[cfg(unix)]
    #[test]
    fn external_engine_returns_its_report() {
        let f = ballot_file(BALLOTS);
        let script = r#"test "$2" = 2 || exit 9
printf '{"ballots_count": 3, "dirty_ballots_count": 4, "winners": ["B", "A"], "answers": {"A": 3, "B": 2, "C": 1}}' > "$3""#;
        let report = shell_engine(script, Some(Duration::from_secs(10)))
            .run_tally(f.path(), 2)
            .unwrap();
        assert_eq!(report.ballots_count, 3);
        assert_eq!(report.dirty_ballots_count, 4);
        assert_eq!(report.winners, vec!["B".to_string(), "A".to_string()]);
        assert_eq!(report.answers.get("B"), Some(&2));
    }

    #[cfg(unix)]
    #[test]
    fn external_engine_failures_carry_the_diagnostic() {
        let f = ballot_file(BALLOTS);
        let res = shell_engine("echo 'no convergence' >&2; exit 3", None).run_tally(f.path(), 2);
        match res {
            Err(EngineError::EngineFailed { diagnostic, .. }) => {
                assert_eq!(diagnostic, "no convergence")
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[cfg(unix)]
    #[test]
    fn external_engine_is_killed_on_timeout() {
        let f = ballot_file(BALLOTS);
        let engine = Arc::new(shell_engine("sleep 5", Some(Duration::from_millis(200))));
        let start = Instant::now();
        let res = run_tally(engine, f.path(), 2, Some(Duration::from_millis(200)));
        assert!(matches!(res, Err(EngineError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn external_engine_without_scratch_space() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let engine = ExternalCommandEngine::new("missing", "true", &[], None);
        match engine.run_tally(&missing.join("ballots.blt"), 2) {
            Err(EngineError::ScratchFile { dir, .. }) => {
                assert_eq!(dir, missing.display().to_string())
            }
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[cfg(unix)]
    #[test]
    fn external_engine_with_a_bad_report() {
        let f = ballot_file(BALLOTS);
        let res = shell_engine("echo 'not json' > \"$3\"", None).run_tally(f.path(), 2);
        assert!(matches!(res, Err(EngineError::ParsingReport { .. })));
    }
}
