//! Compiler invocation. Every source format is turned into a standard-JSON
//! input and fed to `zksolc --standard-json` on stdin.

use super::types::{CodeFormat, CompilationArtifacts, SourceCodeData, VerificationRequest};
use alloy_primitives::Bytes;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

const VERSION_PATTERN: &str = r"^v?\d+\.\d+\.\d+$";

/// File name single-file sources are compiled under.
const SINGLE_FILE_NAME: &str = "contract";

#[derive(Debug, Error)]
pub enum CompilationError {
    #[error("unsupported compiler version: {0}")]
    UnsupportedVersion(String),
    #[error("compiler not installed: {0}")]
    MissingCompiler(String),
    #[error("compilation timed out after {0:?}")]
    Timeout(Duration),
    #[error("compiler failed: {0}")]
    Failed(String),
    #[error("contract {0} not found in compiler output")]
    ContractNotFound(String),
    #[error("invalid compiler output: {0}")]
    InvalidOutput(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(
        &self,
        request: &VerificationRequest,
    ) -> Result<CompilationArtifacts, CompilationError>;
}

/// Runs `zksolc` binaries installed as `{dir}/zksolc-bin/{version}/zksolc`
/// with matching `solc` binaries under `{dir}/solc-bin/{version}/solc`.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    compilers_dir: PathBuf,
    compilation_timeout: Duration,
    version_pattern: Regex,
}

impl SolcCompiler {
    pub fn new(
        compilers_dir: impl Into<PathBuf>,
        compilation_timeout: Duration,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            compilers_dir: compilers_dir.into(),
            compilation_timeout,
            version_pattern: Regex::new(VERSION_PATTERN)?,
        })
    }

    fn binary(&self, kind: &str, version: &str) -> Result<PathBuf, CompilationError> {
        // Versions become path components
        if !self.version_pattern.is_match(version) {
            return Err(CompilationError::UnsupportedVersion(version.to_string()));
        }
        let path = self
            .compilers_dir
            .join(format!("{kind}-bin"))
            .join(version)
            .join(kind);
        if !path.exists() {
            return Err(CompilationError::MissingCompiler(format!("{kind} {version}")));
        }
        Ok(path)
    }
}

#[async_trait]
impl Compiler for SolcCompiler {
    async fn compile(
        &self,
        request: &VerificationRequest,
    ) -> Result<CompilationArtifacts, CompilationError> {
        let zksolc = self.binary("zksolc", &request.compiler_zksolc_version)?;
        let solc = self.binary("solc", &request.compiler_solc_version)?;
        let input = standard_json_input(request);

        let mut command = Command::new(&zksolc);
        command
            .arg("--standard-json")
            .arg("--solc")
            .arg(&solc)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if request.is_system {
            command.arg("--system-mode");
        }

        debug!(
            "Compiling {} with zksolc {} / solc {}",
            request.contract_name, request.compiler_zksolc_version, request.compiler_solc_version
        );
        let mut child = command.spawn()?;
        let stdin = child.stdin.take();
        let input = input.to_string();
        // The child is killed if the deadline drops this future
        let run = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes()).await?;
                drop(stdin);
            }
            child.wait_with_output().await
        };

        let output = timeout(self.compilation_timeout, run)
            .await
            .map_err(|_| CompilationError::Timeout(self.compilation_timeout))??;
        if !output.status.success() {
            return Err(CompilationError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let output: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| CompilationError::InvalidOutput(e.to_string()))?;
        parse_standard_json_output(&output, request)
    }
}

pub fn standard_json_input(request: &VerificationRequest) -> Value {
    let optimizer = json!({ "enabled": request.optimization_used });
    match (&request.source_code, request.code_format) {
        (SourceCodeData::StandardJsonInput(input), _) => Value::Object(input.clone()),
        (SourceCodeData::SingleFile(source), CodeFormat::YulSingleFile) => json!({
            "language": "Yul",
            "sources": { SINGLE_FILE_NAME: { "content": source } },
            "settings": {
                "optimizer": optimizer,
                "outputSelection": { "*": { "*": ["abi", "evm.bytecode"] } },
            },
        }),
        (SourceCodeData::SingleFile(source), _) => json!({
            "language": "Solidity",
            "sources": { SINGLE_FILE_NAME: { "content": source } },
            "settings": {
                "optimizer": optimizer,
                "outputSelection": { "*": { "*": ["abi", "evm.bytecode"] } },
            },
        }),
    }
}

/// Picks the requested contract out of a standard-JSON output.
/// `contract_name` is either `Name` or `path/File.sol:Name`.
pub fn parse_standard_json_output(
    output: &Value,
    request: &VerificationRequest,
) -> Result<CompilationArtifacts, CompilationError> {
    if let Some(errors) = output.get("errors").and_then(Value::as_array) {
        let messages: Vec<&str> = errors
            .iter()
            .filter(|error| error.get("severity").and_then(Value::as_str) == Some("error"))
            .filter_map(|error| {
                error
                    .get("formattedMessage")
                    .or_else(|| error.get("message"))
                    .and_then(Value::as_str)
            })
            .collect();
        if !messages.is_empty() {
            return Err(CompilationError::Failed(messages.join("\n")));
        }
    }

    let contracts = output
        .get("contracts")
        .and_then(Value::as_object)
        .ok_or_else(|| CompilationError::InvalidOutput("missing contracts".to_string()))?;

    let (file, name) = match request.contract_name.rsplit_once(':') {
        Some((file, name)) => (Some(file), name),
        None => (None, request.contract_name.as_str()),
    };
    let contract = find_contract(contracts, file, name)
        .ok_or_else(|| CompilationError::ContractNotFound(request.contract_name.clone()))?;

    let bytecode = contract
        .pointer("/evm/bytecode/object")
        .and_then(Value::as_str)
        .ok_or_else(|| CompilationError::InvalidOutput("missing bytecode".to_string()))?;
    let bytecode: Bytes = bytecode
        .parse()
        .map_err(|_| CompilationError::InvalidOutput("bytecode is not hex".to_string()))?;

    Ok(CompilationArtifacts {
        bytecode,
        abi: contract.get("abi").cloned().unwrap_or(Value::Array(Vec::new())),
    })
}

fn find_contract<'v>(
    contracts: &'v Map<String, Value>,
    file: Option<&str>,
    name: &str,
) -> Option<&'v Value> {
    match file {
        Some(file) => contracts.get(file)?.get(name),
        None => contracts.values().find_map(|by_name| by_name.get(name)),
    }
}
