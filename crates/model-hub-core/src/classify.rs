//! Path-based classification of repository files
//!
//! Everything here is a pure function of the file path. Format and precision are
//! advisory: they are recorded on the artifact but nothing branches on them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HubError;
use crate::types::ArtifactType;

const MODEL_EXTENSIONS: &[&str] = &[
    ".safetensors",
    ".bin",
    ".pt",
    ".pth",
    ".gguf",
    ".onnx",
    ".pb",
];

/// Serialization format of a weights file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Safetensors,
    Gguf,
    Onnx,
    PyTorch,
    TensorFlow,
}

impl ModelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::Safetensors => "safetensors",
            ModelFormat::Gguf => "gguf",
            ModelFormat::Onnx => "onnx",
            ModelFormat::PyTorch => "pytorch",
            ModelFormat::TensorFlow => "tensorflow",
        }
    }

    fn from_path(lower: &str) -> Option<Self> {
        const TABLE: &[(&str, ModelFormat)] = &[
            (".safetensors", ModelFormat::Safetensors),
            (".gguf", ModelFormat::Gguf),
            (".onnx", ModelFormat::Onnx),
            (".bin", ModelFormat::PyTorch),
            (".pt", ModelFormat::PyTorch),
            (".pth", ModelFormat::PyTorch),
            (".pb", ModelFormat::TensorFlow),
        ];
        TABLE
            .iter()
            .find(|(ext, _)| lower.ends_with(ext))
            .map(|(_, format)| *format)
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFormat {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safetensors" => Ok(ModelFormat::Safetensors),
            "gguf" => Ok(ModelFormat::Gguf),
            "onnx" => Ok(ModelFormat::Onnx),
            "pytorch" => Ok(ModelFormat::PyTorch),
            "tensorflow" => Ok(ModelFormat::TensorFlow),
            other => Err(HubError::invalid_value("model format", other)),
        }
    }
}

/// Numeric precision hinted by a file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Fp16,
    Fp32,
    Bf16,
    Int8,
    Q4,
    Q5,
    Q6,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Fp16 => "fp16",
            Precision::Fp32 => "fp32",
            Precision::Bf16 => "bf16",
            Precision::Int8 => "int8",
            Precision::Q4 => "q4",
            Precision::Q5 => "q5",
            Precision::Q6 => "q6",
        }
    }

    /// First token wins, in table order. "bf16" contains "f16", so it reports Fp16.
    fn from_path(lower: &str) -> Option<Self> {
        const TABLE: &[(&[&str], Precision)] = &[
            (&["fp16", "f16"], Precision::Fp16),
            (&["fp32", "f32"], Precision::Fp32),
            (&["bf16"], Precision::Bf16),
            (&["int8", "q8"], Precision::Int8),
            (&["q4"], Precision::Q4),
            (&["q5"], Precision::Q5),
            (&["q6"], Precision::Q6),
        ];
        TABLE
            .iter()
            .find(|(tokens, _)| tokens.iter().any(|t| lower.contains(t)))
            .map(|(_, precision)| *precision)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fp16" => Ok(Precision::Fp16),
            "fp32" => Ok(Precision::Fp32),
            "bf16" => Ok(Precision::Bf16),
            "int8" => Ok(Precision::Int8),
            "q4" => Ok(Precision::Q4),
            "q5" => Ok(Precision::Q5),
            "q6" => Ok(Precision::Q6),
            other => Err(HubError::invalid_value("precision", other)),
        }
    }
}

/// Classify a repository file by its path
pub fn classify(path: &str) -> ArtifactType {
    let lower = path.to_lowercase();

    if MODEL_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return ArtifactType::Model;
    }
    let tokenizer = lower.contains("tokenizer") || lower.contains("vocab");
    // tokenizer_config.json is tokenizer metadata, not model config
    if lower.ends_with(".json") && lower.contains("config") && !tokenizer {
        return ArtifactType::Config;
    }
    if tokenizer {
        return ArtifactType::Tokenizer;
    }
    ArtifactType::Other
}

/// Infer the serialization format and precision of a file from its path
pub fn infer_format_and_precision(path: &str) -> (Option<ModelFormat>, Option<Precision>) {
    let lower = path.to_lowercase();
    (ModelFormat::from_path(&lower), Precision::from_path(&lower))
}

/// Whether files of this type are small metadata eligible for inline fetch during sync
pub fn is_metadata(artifact_type: ArtifactType) -> bool {
    matches!(artifact_type, ArtifactType::Config | ArtifactType::Tokenizer)
}
