//! # Process Analytics
//!
//! Runs graph algorithms in an external program.
//!
//! For each algorithm the program is started once with the configured
//! arguments. It receives an [`AnalyticsRequest`] as JSON on stdin and must
//! print an [`AlgorithmOutcome`] as JSON on stdout, then exit with status 0.

use graphetl_core::{Algorithm, AlgorithmOutcome, Analytics, EtlError, SimilarityProjection};
use serde::Serialize;
use std::io::Write;
use std::process::{Command, Stdio};

/// What the external program is asked to compute.
#[derive(Debug, Serialize)]
pub struct AnalyticsRequest<'a> {
    pub algorithm: Algorithm,
    /// Property the result will be written under.
    pub write_property: &'a str,
    pub projection: &'a SimilarityProjection,
}

/// Analytics collaborator backed by an external command.
#[derive(Debug, Clone)]
pub struct ProcessAnalytics {
    program: String,
    args: Vec<String>,
}

impl ProcessAnalytics {
    /// Build from a `[program, args...]` list. Returns `None` if empty.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn failure(&self, algorithm: Algorithm, message: impl Into<String>) -> EtlError {
        EtlError::Analytics {
            algorithm,
            message: message.into(),
        }
    }
}

impl Analytics for ProcessAnalytics {
    fn run(
        &mut self,
        algorithm: Algorithm,
        projection: &SimilarityProjection,
    ) -> Result<AlgorithmOutcome, EtlError> {
        let request = serde_json::to_vec(&AnalyticsRequest {
            algorithm,
            write_property: algorithm.write_property(),
            projection,
        })
        .map_err(|e| EtlError::SerializationError(e.to_string()))?;

        tracing::debug!(%algorithm, program = %self.program, "starting analytics process");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(algorithm, format!("cannot start '{}': {}", self.program, e)))?;

        let stdin = child.stdin.take();
        // stdin is written while stdout is drained.
        let output = std::thread::scope(|scope| {
            scope.spawn(move || {
                if let Some(mut stdin) = stdin {
                    // Broken pipe: the exit status below reports it.
                    let _ = stdin.write_all(&request);
                }
            });
            child.wait_with_output()
        })
        .map_err(|e| self.failure(algorithm, format!("wait for '{}': {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(
                algorithm,
                format!("'{}' exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }

        let outcome: AlgorithmOutcome = serde_json::from_slice(&output.stdout)
            .map_err(|e| self.failure(algorithm, format!("invalid response: {}", e)))?;
        if outcome.algorithm != algorithm {
            return Err(self.failure(
                algorithm,
                format!("response is for {}", outcome.algorithm),
            ));
        }
        Ok(outcome)
    }
}

// =============================================================================
// TESTS
// =============================================================================
