//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use hashguard_core::{Digest, StoreConfig};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Check if JSON mode is enabled.
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Write output using the configured format.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput::new(error, result_code);
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    pub retryable: bool,
    pub error: String,
}

impl ErrorOutput {
    pub fn new(error: &anyhow::Error, result_code: u8) -> Self {
        let store_error = error.downcast_ref::<hashguard_core::Error>();
        Self {
            success: false,
            result_code,
            kind: store_error.map(|e| e.kind().as_str()),
            retryable: store_error.is_some_and(|e| e.is_retryable()),
            error: format!("{:#}", error),
        }
    }
}

/// Output for `save` command.
#[derive(Debug, Serialize)]
pub struct SaveOutput {
    pub success: bool,
    pub result_code: u8,
    pub digest: Digest,
    pub source: String,
}

/// Output for `lookup` command.
#[derive(Debug, Serialize)]
pub struct LookupOutput {
    pub success: bool,
    pub result_code: u8,
    pub digest: String,
    pub file_name: String,
    pub path: String,
    pub size: u64,
}

/// Output for `get` command.
#[derive(Debug, Serialize)]
pub struct GetOutput {
    pub success: bool,
    pub result_code: u8,
    pub digest: String,
    pub destination: String,
    pub size: u64,
}

/// Output for `delete` command.
#[derive(Debug, Serialize)]
pub struct DeleteOutput {
    pub success: bool,
    pub result_code: u8,
    pub digest: String,
}

/// Output for `digest` command.
#[derive(Debug, Serialize)]
pub struct DigestOutput {
    pub success: bool,
    pub result_code: u8,
    pub digest: Digest,
    pub algorithm: String,
    pub source: String,
}

/// Output for `check` command.
#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub success: bool,
    pub result_code: u8,
    pub candidate: String,
    pub well_formed: bool,
    pub expected_length: usize,
}

/// Output for `config` command.
#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub config: StoreConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashguard_core::{Algorithm, Error};

    #[test]
    fn test_save_output_json() {
        let digest = Digest::of_bytes(Algorithm::Sha256, b"hello world");
        let output = SaveOutput {
            success: true,
            result_code: 0,
            digest,
            source: "hello.txt".to_string(),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(
            json["digest"],
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_error_output_carries_kind() {
        let err = anyhow::Error::new(Error::resource_busy("/data/ab/abc.txt"))
            .context("Failed to delete abc");
        let output = ErrorOutput::new(&err, 6);
        assert_eq!(output.kind, Some("resource_busy"));
        assert!(output.retryable);
        assert!(output.error.starts_with("Failed to delete abc"));

        let plain = ErrorOutput::new(&anyhow::anyhow!("boom"), 1);
        assert_eq!(plain.kind, None);
        assert!(!plain.retryable);
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_config_output_flattens() {
        let output = ConfigOutput {
            success: true,
            result_code: 0,
            config: StoreConfig::new("/data"),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["root"], "/data");
        assert_eq!(json["algorithm"], "sha256");
        assert_eq!(json["buffer_size"], 65536);
    }
}
