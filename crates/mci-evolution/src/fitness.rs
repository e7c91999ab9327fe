//! Fitness evaluation through an external simulator.
//!
//! The optimizer only knows [`FitnessEvaluator`]: a policy set goes in, one scalar
//! score comes out. [`SimulatorEvaluator`] implements it with file-based job
//! submission:
//!
//! 1. the set is encoded as JSON policy records and written to
//!    `<candidates_dir>/<generation>_cand_poli_set<index>.json`;
//! 2. the simulator command is run with that path as its last argument;
//! 3. the score is the last non-empty line of the result file.
//!
//! The result file may contain `{generation}` and `{index}` placeholders, which lets
//! a simulator that writes per-job results be evaluated in parallel. Without an
//! `{index}` placeholder every job shares one result file and jobs run one at a
//! time.
//!
//! The simulator runs in `working_dir` when one is set. It receives the candidate
//! as an absolute path, and a relative result file is looked up in `working_dir`.

use std::{
    fmt, fs, io,
    num::ParseFloatError,
    path::{self, Path, PathBuf},
    process::{Command, ExitStatus},
};

use mci_policy::{DomainError, PolicySet, codec};
use serde::{Deserialize, Serialize};

/// Identifies one candidate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvaluationJob {
    pub generation: usize,
    /// Position of the individual within its population.
    pub index: usize,
}

impl EvaluationJob {
    #[must_use]
    pub fn candidate_file_name(self) -> String {
        format!("{}_cand_poli_set{}.json", self.generation, self.index)
    }
}

/// Scores a policy set. Higher is better.
pub trait FitnessEvaluator: fmt::Debug + Send + Sync {
    fn evaluate(&self, job: EvaluationJob, policies: &PolicySet) -> Result<f64, EvaluationError>;

    /// Whether jobs of one generation may be evaluated concurrently.
    fn supports_parallel(&self) -> bool {
        true
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum EvaluationError {
    #[display("failed to encode candidate policy set")]
    Encode { source: DomainError },
    #[display("failed to serialize candidate policy set")]
    Serialize { source: serde_json::Error },
    #[display("I/O error on {}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[display("simulator command is empty")]
    EmptyCommand,
    #[display("failed to launch simulator `{program}`")]
    Spawn { program: String, source: io::Error },
    #[display("simulator exited with {status}")]
    Exit { status: ExitStatus },
    #[display("simulator wrote no score to {}", path.display())]
    MissingScore { path: PathBuf },
    #[display("invalid score `{text}` in {}", path.display())]
    InvalidScore {
        path: PathBuf,
        text: String,
        source: ParseFloatError,
    },
}

/// Where and how the external simulator is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Program and leading arguments; the candidate path is appended.
    pub command: Vec<String>,
    /// Directory receiving candidate policy files.
    pub candidates_dir: PathBuf,
    /// File holding the score after the simulator exits.
    pub result_file: String,
    /// Working directory of the simulator, the current one if unset.
    pub working_dir: Option<PathBuf>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            command: ["java", "-jar", "SIMVASoS-MCI.jar"]
                .map(str::to_owned)
                .to_vec(),
            candidates_dir: PathBuf::from("json/candidates"),
            result_file: "Sim_Result.txt".to_owned(),
            working_dir: None,
        }
    }
}

impl SimulatorConfig {
    /// Whether every job of a generation gets its own result file.
    #[must_use]
    pub fn separates_jobs(&self) -> bool {
        self.result_file.contains("{index}")
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorEvaluator {
    config: SimulatorConfig,
}

impl SimulatorEvaluator {
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    #[must_use]
    pub fn candidate_path(&self, job: EvaluationJob) -> PathBuf {
        self.config.candidates_dir.join(job.candidate_file_name())
    }

    /// Result file of `job`, relative to `working_dir` unless absolute.
    #[must_use]
    pub fn result_path(&self, job: EvaluationJob) -> PathBuf {
        let path = PathBuf::from(
            self.config
                .result_file
                .replace("{generation}", &job.generation.to_string())
                .replace("{index}", &job.index.to_string()),
        );
        match &self.config.working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        }
    }

    fn write_candidate(&self, path: &Path, policies: &PolicySet) -> Result<(), EvaluationError> {
        let records =
            codec::encode_set(policies).map_err(|source| EvaluationError::Encode { source })?;
        let json = serde_json::to_string_pretty(&records)
            .map_err(|source| EvaluationError::Serialize { source })?;
        fs::create_dir_all(&self.config.candidates_dir).map_err(|source| EvaluationError::Io {
            path: self.config.candidates_dir.clone(),
            source,
        })?;
        fs::write(path, json).map_err(|source| EvaluationError::Io {
            path: path.to_owned(),
            source,
        })
    }

    fn run_simulator(&self, candidate: &Path) -> Result<(), EvaluationError> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or(EvaluationError::EmptyCommand)?;
        let mut command = Command::new(program);
        command.args(args).arg(candidate);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        tracing::debug!(?command, "running simulator");
        let output = command.output().map_err(|source| EvaluationError::Spawn {
            program: program.clone(),
            source,
        })?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!(target: "simulator", "{line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            tracing::debug!(target: "simulator", stream = "stderr", "{line}");
        }
        if !output.status.success() {
            return Err(EvaluationError::Exit {
                status: output.status,
            });
        }
        Ok(())
    }
}

impl FitnessEvaluator for SimulatorEvaluator {
    fn evaluate(&self, job: EvaluationJob, policies: &PolicySet) -> Result<f64, EvaluationError> {
        let candidate = self.candidate_path(job);
        self.write_candidate(&candidate, policies)?;
        let candidate = path::absolute(&candidate).map_err(|source| EvaluationError::Io {
            path: candidate.clone(),
            source,
        })?;

        let result = self.result_path(job);
        match fs::remove_file(&result) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(EvaluationError::Io { path: result, source }),
        }

        self.run_simulator(&candidate)?;

        let text = match fs::read_to_string(&result) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EvaluationError::MissingScore { path: result });
            }
            Err(source) => return Err(EvaluationError::Io { path: result, source }),
        };
        let score = parse_score(&result, &text)?;
        tracing::debug!(
            generation = job.generation,
            index = job.index,
            score,
            "simulator finished"
        );
        Ok(score)
    }

    fn supports_parallel(&self) -> bool {
        self.config.separates_jobs()
    }
}

fn parse_score(path: &Path, text: &str) -> Result<f64, EvaluationError> {
    let line = text
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .ok_or_else(|| EvaluationError::MissingScore {
            path: path.to_owned(),
        })?;
    line.parse().map_err(|source| EvaluationError::InvalidScore {
        path: path.to_owned(),
        text: line.to_owned(),
        source,
    })
}
