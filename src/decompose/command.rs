//! Decomposer backed by an external program.
//!
//! The program receives the batch units as a JSON array on stdin and the
//! fixed settings as arguments. It answers on stdout with `null` when the
//! batch is invalid, or with `{"indices": [..], "pom": {..}}`.

use super::{DecomposeRequest, Decomposer, Decomposition, LadderResult, LadderpathSettings};
use crate::error::{helpers::write_failed, ErrorCode, ErrorExt, PipelineError, Result};
use crate::subprocess::{ProcessCommandBuilder, StderrMode, SubprocessManager};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// How to reach the decomposition program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposerConfig {
    pub program: String,
    /// Arguments placed before the fixed settings
    pub args: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            program: "ladderpath".to_string(),
            args: Vec::new(),
            timeout: None,
        }
    }
}

pub struct CommandDecomposer {
    config: DecomposerConfig,
    subprocess: SubprocessManager,
}

impl CommandDecomposer {
    pub fn new(config: DecomposerConfig, subprocess: SubprocessManager) -> Self {
        Self { config, subprocess }
    }

    fn settings_args(settings: &LadderpathSettings, save_file: &Path) -> Vec<String> {
        vec![
            "--info".to_string(),
            settings.info.clone(),
            "--estimate-eta".to_string(),
            settings.estimate_eta.to_string(),
            "--estimate-eta-para".to_string(),
            settings.eta_samples.to_string(),
            settings.eta_scope.clone(),
            "--save-file".to_string(),
            save_file.display().to_string(),
        ]
    }
}

/// Parse the program's answer from its last non-empty stdout line; a
/// version banner or other preamble before it is ignored
pub fn parse_decomposition(stdout: &str) -> Result<Decomposition> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or_default();
    let answer: Option<LadderResult> = serde_json::from_str(line.trim()).map_err(|e| {
        PipelineError::execution_with_code(
            ErrorCode::EXEC_DECOMPOSER_FAULT,
            "decomposer output is not a ladderpath result",
            None,
        )
        .with_source(e)
    })?;

    Ok(match answer {
        Some(result) => Decomposition::Ladder(result),
        None => Decomposition::Invalid,
    })
}

#[async_trait]
impl Decomposer for CommandDecomposer {
    async fn decompose(&self, request: DecomposeRequest<'_>) -> Result<Decomposition> {
        if let Some(parent) = request.save_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_failed(parent, e))?;
        }

        let units = serde_json::to_string(request.units)
            .to_execution_error("Failed to encode batch units")?;

        let command = ProcessCommandBuilder::new(&self.config.program)
            .args(&self.config.args)
            .args(Self::settings_args(request.settings, &request.save_file))
            .stdin(units)
            .maybe_timeout(self.config.timeout)
            .stderr(StderrMode::Inherit)
            .build();
        let command_line = command.display();

        debug!("Decomposing batch {} with {}", request.batch_index, command_line);

        let output = self
            .subprocess
            .runner()
            .run(command)
            .await
            .map_err(|e| {
                PipelineError::from(e).with_context(format!("batch {}", request.batch_index))
            })?;

        if !output.status.success() {
            let mut err = PipelineError::execution_with_code(
                ErrorCode::EXEC_DECOMPOSER_FAULT,
                format!(
                    "decomposer failed on batch {} ({:?})",
                    request.batch_index, output.status
                ),
                Some(command_line),
            );
            if let Some(code) = output.status.code() {
                err = err.with_exit_code(code);
            }
            return Err(err);
        }

        parse_decomposition(&output.stdout)
            .map_err(|e| e.with_context(format!("batch {}", request.batch_index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::PosetMultiset;
    use crate::subprocess::MockProcessRunner;
    use tempfile::TempDir;

    fn decomposer() -> (CommandDecomposer, MockProcessRunner) {
        let (subprocess, mock) = SubprocessManager::mock();
        let config = DecomposerConfig {
            program: "ladderpath-decompose".to_string(),
            ..DecomposerConfig::default()
        };
        (CommandDecomposer::new(config, subprocess), mock)
    }

    fn request<'a>(
        units: &'a [String],
        settings: &'a LadderpathSettings,
        ladder_folder: &Path,
    ) -> DecomposeRequest<'a> {
        DecomposeRequest {
            batch_index: 3,
            units,
            settings,
            save_file: ladder_folder.join("ladders").join("ladder_3.json"),
        }
    }

    #[tokio::test]
    async fn test_ladder_result_is_parsed() {
        let dir = TempDir::new().unwrap();
        let (decomposer, mut mock) = decomposer();
        mock.expect_command("ladderpath-decompose")
            .returns_stdout(
                r#"{"indices": [7.0, 3.0, 0.5], "pom": {"0": {"A": 2}, "1": {"AC": 1}}}"#,
            )
            .finish();

        let units = vec!["ACGT".to_string(), "AC".to_string()];
        let settings = LadderpathSettings::default();
        let result = decomposer
            .decompose(request(&units, &settings, dir.path()))
            .await
            .unwrap();

        let expected = PosetMultiset::new()
            .with_layer("0", [("A", 2)])
            .with_layer("1", [("AC", 1)]);
        match result {
            Decomposition::Ladder(ladder) => {
                assert_eq!(ladder.indices.ladderpath, 7.0);
                assert_eq!(ladder.pom, expected);
            }
            Decomposition::Invalid => panic!("expected a ladder result"),
        }
        assert!(dir.path().join("ladders").is_dir());
    }

    #[tokio::test]
    async fn test_command_line_and_stdin() {
        let dir = TempDir::new().unwrap();
        let (decomposer, mut mock) = decomposer();
        mock.expect_command("ladderpath-decompose")
            .returns_stdout("null")
            .finish();

        let units = vec!["ACGT".to_string()];
        let settings = LadderpathSettings::default();
        decomposer
            .decompose(request(&units, &settings, dir.path()))
            .await
            .unwrap();

        let history = mock.get_call_history();
        assert_eq!(history.len(), 1);
        let call = &history[0];
        assert_eq!(call.stdin.as_deref(), Some(r#"["ACGT"]"#));
        assert_eq!(
            &call.args[..7],
            &[
                "--info",
                "V1.0.0.20240910_Alpha",
                "--estimate-eta",
                "false",
                "--estimate-eta-para",
                "10",
                "global",
            ]
        );
        assert_eq!(call.args[7], "--save-file");
        assert!(call.args[8].ends_with("ladder_3.json"));
    }

    #[tokio::test]
    async fn test_null_answer_is_invalid_batch() {
        let dir = TempDir::new().unwrap();
        let (decomposer, mut mock) = decomposer();
        mock.expect_command("ladderpath-decompose")
            .returns_stdout("null\n")
            .finish();

        let units = vec!["AC".to_string()];
        let settings = LadderpathSettings::default();
        let result = decomposer
            .decompose(request(&units, &settings, dir.path()))
            .await
            .unwrap();
        assert_eq!(result, Decomposition::Invalid);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_fault() {
        let dir = TempDir::new().unwrap();
        let (decomposer, mut mock) = decomposer();
        mock.expect_command("ladderpath-decompose")
            .returns_exit_code(1)
            .returns_stderr("Traceback (most recent call last)")
            .finish();

        let units = vec!["AC".to_string()];
        let settings = LadderpathSettings::default();
        let err = decomposer
            .decompose(request(&units, &settings, dir.path()))
            .await
            .unwrap_err();

        match err {
            PipelineError::Execution {
                code, exit_code, ..
            } => {
                assert_eq!(code, ErrorCode::EXEC_DECOMPOSER_FAULT);
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_fault() {
        let dir = TempDir::new().unwrap();
        let (decomposer, mut mock) = decomposer();
        mock.expect_command("ladderpath-decompose")
            .times_out_after(Duration::from_secs(5))
            .finish();

        let units = vec!["AC".to_string()];
        let settings = LadderpathSettings::default();
        let err = decomposer
            .decompose(request(&units, &settings, dir.path()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::EXEC_TIMEOUT);
    }

    #[test]
    fn test_garbage_answer_is_fault() {
        let err = parse_decomposition("computing ladderpath...").unwrap_err();
        assert_eq!(err.code(), ErrorCode::EXEC_DECOMPOSER_FAULT);
        assert!(parse_decomposition("").is_err());
    }

    #[test]
    fn test_version_banner_before_answer_is_ignored() {
        let stdout = "Ladderpath V1.0.0.20240910_Alpha\n\
                      {\"indices\": [4.0, 2.0, 0.5], \"pom\": {\"0\": {\"GG\": 3}}}\n\n";
        match parse_decomposition(stdout).unwrap() {
            Decomposition::Ladder(ladder) => {
                assert_eq!(ladder.indices.order, 2.0);
                assert_eq!(ladder.pom.entries().collect::<Vec<_>>(), vec![("GG", 3)]);
            }
            Decomposition::Invalid => panic!("expected a ladder result"),
        }

        let stdout = "Ladderpath V1.0.0.20240910_Alpha\nnull\n";
        assert_eq!(parse_decomposition(stdout).unwrap(), Decomposition::Invalid);
    }
}
