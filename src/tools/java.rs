//! JDK tools run as subprocesses

use crate::config::schema::JavaConfig;
use crate::error::{GristError, GristResult};
use crate::tools::{join_classpath, Compiler, ProgramRunner, ToolStatus};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// `java` and `javac` from the configured JDK
#[derive(Debug, Clone)]
pub struct JavaToolchain {
    java: String,
    javac: String,
}

impl JavaToolchain {
    pub fn new(java: impl Into<String>, javac: impl Into<String>) -> Self {
        Self {
            java: java.into(),
            javac: javac.into(),
        }
    }

    pub fn from_config(config: &JavaConfig) -> Self {
        Self::new(config.java.clone(), config.javac.clone())
    }

    /// Run a prepared command, capturing its status and stderr
    async fn exec(&self, mut command: Command, name: &str) -> GristResult<ToolStatus> {
        debug!("Executing: {:?}", command.as_std());

        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GristError::command_failed(name, e))?;

        Ok(ToolStatus {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl ProgramRunner for JavaToolchain {
    async fn run(
        &self,
        working_dir: &Path,
        classpath: &[PathBuf],
        main_class: &str,
        args: &[String],
    ) -> GristResult<ToolStatus> {
        let mut command = Command::new(&self.java);
        command
            .arg("-cp")
            .arg(join_classpath(classpath))
            .arg(main_class)
            .args(args)
            .current_dir(working_dir);

        self.exec(command, &format!("{} {}", self.java, main_class))
            .await
    }
}

#[async_trait]
impl Compiler for JavaToolchain {
    async fn compile(
        &self,
        sources: &[PathBuf],
        classpath: &[PathBuf],
        source_roots: &[PathBuf],
        output_dir: &Path,
    ) -> GristResult<ToolStatus> {
        let mut command = Command::new(&self.javac);
        command
            .arg("-cp")
            .arg(join_classpath(classpath))
            .arg("-sourcepath")
            .arg(join_classpath(source_roots))
            .arg("-d")
            .arg(output_dir)
            .args(sources);

        self.exec(command, &self.javac).await
    }
}
