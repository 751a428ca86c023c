use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeFormat {
    #[serde(rename = "solidity-single-file")]
    SoliditySingleFile,
    #[serde(rename = "solidity-standard-json-input")]
    SolidityStandardJsonInput,
    #[serde(rename = "yul-single-file")]
    YulSingleFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceCodeData {
    SingleFile(String),
    StandardJsonInput(serde_json::Map<String, serde_json::Value>),
}

/// A source verification request as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VerificationRequest {
    pub contract_address: Address,
    pub contract_name: String,
    pub source_code: SourceCodeData,
    pub code_format: CodeFormat,
    pub compiler_zksolc_version: String,
    pub compiler_solc_version: String,
    pub optimization_used: bool,
    #[serde(default)]
    pub constructor_arguments: Bytes,
    #[serde(default)]
    pub is_system: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Queued,
    InProgress,
    Successful,
    Failed,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Queued => "queued",
            VerificationStatus::InProgress => "in_progress",
            VerificationStatus::Successful => "successful",
            VerificationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Successful | VerificationStatus::Failed
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown verification status: {0}")]
pub struct UnknownVerificationStatus(pub String);

impl FromStr for VerificationStatus {
    type Err = UnknownVerificationStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "queued" => Ok(VerificationStatus::Queued),
            "in_progress" => Ok(VerificationStatus::InProgress),
            "successful" => Ok(VerificationStatus::Successful),
            "failed" => Ok(VerificationStatus::Failed),
            other => Err(UnknownVerificationStatus(other.to_string())),
        }
    }
}

/// Status as reported to clients. A job being compiled is still `queued`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStatusInfo {
    pub status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationStatusInfo {
    pub fn new(status: VerificationStatus, error: Option<String>) -> Self {
        let status = match status {
            VerificationStatus::InProgress => VerificationStatus::Queued,
            other => other,
        };
        Self { status, error }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerificationJob {
    pub id: u64,
    pub request: VerificationRequest,
}

/// Output of a successful compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationArtifacts {
    pub bytecode: Bytes,
    pub abi: serde_json::Value,
}
