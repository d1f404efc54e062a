// `aws` CLI subprocesses: region and static credentials applied, bounded by a timeout

use crate::config::{AwsConfig, AwsCredentials};
use crate::error::ProviderError;
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AwsCli {
    /// Program and leading arguments, `["aws"]` outside tests.
    program: Vec<String>,
    region: String,
    credentials: Option<AwsCredentials>,
    timeout: Duration,
}

impl AwsCli {
    pub fn new(
        region: impl Into<String>,
        credentials: Option<AwsCredentials>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: vec!["aws".into()],
            region: region.into(),
            credentials,
            timeout,
        }
    }

    pub fn from_config(config: &AwsConfig, timeout: Duration) -> Self {
        Self::new(config.region.clone(), config.credentials.clone(), timeout)
    }

    /// Replace the `aws` executable, e.g. with `["sh", "fake-aws.sh"]`.
    pub fn with_program(mut self, program: Vec<String>) -> Self {
        self.program = program;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Full command line: program, `args`, then `--region`.
    pub fn command(&self, args: &[&str]) -> Vec<String> {
        let mut command = self.program.clone();
        command.extend(args.iter().map(|a| a.to_string()));
        command.push("--region".into());
        command.push(self.region.clone());
        command
    }

    /// Run `command` and return its stdout. Non-zero exits carry stderr in the error;
    /// a command still running after the timeout is killed.
    pub async fn run(&self, command: &[String]) -> Result<Vec<u8>, ProviderError> {
        let Some((program, args)) = command.split_first() else {
            return Err(ProviderError::Command {
                program: String::new(),
                message: "empty command".into(),
            });
        };
        let mut child = tokio::process::Command::new(program);
        child
            .args(args)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(credentials) = &self.credentials {
            child.envs(credentials.env_vars());
        }

        debug!(%program, ?args, "running command");
        let output = tokio::time::timeout(self.timeout, child.output())
            .await
            .map_err(|_| ProviderError::CommandTimeout {
                program: program.clone(),
                timeout: self.timeout,
            })?
            .map_err(|e| ProviderError::Command {
                program: program.clone(),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(ProviderError::Command {
                program: program.clone(),
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output.stdout)
    }
}
