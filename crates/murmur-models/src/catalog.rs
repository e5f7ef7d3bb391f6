//! Catalog of known model artifacts

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Artifact kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Speech recognition weights (Whisper)
    SpeechModel,
    /// Text generation weights (GGUF)
    LanguageModel,
}

impl ArtifactKind {
    /// Get the subdirectory name for this kind
    pub fn subdirectory(&self) -> &'static str {
        match self {
            ArtifactKind::SpeechModel => "speech",
            ArtifactKind::LanguageModel => "language",
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            ArtifactKind::SpeechModel => "Speech",
            ArtifactKind::LanguageModel => "Language",
        }
    }
}

/// Static description of a downloadable artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Stable identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Artifact kind
    pub kind: ArtifactKind,
    /// File name of the installed artifact
    pub filename: String,
    /// Download URL
    pub url: String,
    /// Declared size in bytes (estimate)
    pub size_bytes: u64,
    /// Expected SHA256 hex digest, `None` when not pinned
    #[serde(default)]
    pub sha256: Option<String>,
    /// Description
    #[serde(default)]
    pub description: String,
}

impl ArtifactDescriptor {
    /// Get human-readable size string
    pub fn size_string(&self) -> String {
        format_size(self.size_bytes)
    }

    /// Pinned digest, lowercased
    pub fn expected_digest(&self) -> Option<String> {
        self.sha256
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_lowercase)
    }

    fn validate(&self) -> Result<(), String> {
        if !is_path_component(&self.id) {
            return Err(format!("invalid artifact id {:?}", self.id));
        }
        if !is_path_component(&self.filename) {
            return Err(format!("{}: invalid filename {:?}", self.id, self.filename));
        }
        if !(self.url.starts_with("https://") || self.url.starts_with("http://")) {
            return Err(format!("{}: unsupported url {:?}", self.id, self.url));
        }
        if let Some(digest) = self.expected_digest() {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(format!("{}: sha256 must be 64 hex characters", self.id));
            }
        }
        Ok(())
    }
}

/// Human-readable byte count
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.0} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.0} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn is_path_component(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Built-in artifacts
pub static BUILTIN_ARTIFACTS: LazyLock<Vec<ArtifactDescriptor>> = LazyLock::new(|| {
    vec![
        ArtifactDescriptor {
            id: "whisper-small-en".to_string(),
            name: "Whisper Small (English)".to_string(),
            kind: ArtifactKind::SpeechModel,
            filename: "model.safetensors".to_string(),
            url: "https://huggingface.co/openai/whisper-small.en/resolve/main/model.safetensors".to_string(),
            size_bytes: 466_000_000,
            sha256: None,
            description: "English-only, balanced speed/accuracy (~466MB)".to_string(),
        },
        ArtifactDescriptor {
            id: "whisper-base-en".to_string(),
            name: "Whisper Base (English)".to_string(),
            kind: ArtifactKind::SpeechModel,
            filename: "model.safetensors".to_string(),
            url: "https://huggingface.co/openai/whisper-base.en/resolve/main/model.safetensors".to_string(),
            size_bytes: 142_000_000,
            sha256: None,
            description: "English-only, fast (~142MB)".to_string(),
        },
        ArtifactDescriptor {
            id: "whisper-small".to_string(),
            name: "Whisper Small (Multilingual)".to_string(),
            kind: ArtifactKind::SpeechModel,
            filename: "model.safetensors".to_string(),
            url: "https://huggingface.co/openai/whisper-small/resolve/main/model.safetensors".to_string(),
            size_bytes: 466_000_000,
            sha256: None,
            description: "Multilingual, balanced speed/accuracy (~466MB)".to_string(),
        },
        ArtifactDescriptor {
            id: "gemma-2-2b-instruct".to_string(),
            name: "Gemma 2 2B Instruct".to_string(),
            kind: ArtifactKind::LanguageModel,
            filename: "gemma-2-2b-it-Q4_K_M.gguf".to_string(),
            url: "https://huggingface.co/bartowski/gemma-2-2b-it-GGUF/resolve/main/gemma-2-2b-it-Q4_K_M.gguf".to_string(),
            size_bytes: 1_710_000_000,
            sha256: None,
            description: "Transcript formatting, Q4_K_M quantization (~1.7GB)".to_string(),
        },
        ArtifactDescriptor {
            id: "qwen2-1.5b-instruct".to_string(),
            name: "Qwen2 1.5B Instruct".to_string(),
            kind: ArtifactKind::LanguageModel,
            filename: "qwen2-1_5b-instruct-q4_k_m.gguf".to_string(),
            url: "https://huggingface.co/Qwen/Qwen2-1.5B-Instruct-GGUF/resolve/main/qwen2-1_5b-instruct-q4_k_m.gguf".to_string(),
            size_bytes: 986_000_000,
            sha256: None,
            description: "Lightweight transcript formatting (~986MB)".to_string(),
        },
    ]
});

/// Read-only, validated list of artifacts
#[derive(Debug, Clone)]
pub struct Catalog {
    artifacts: Vec<ArtifactDescriptor>,
}

impl Catalog {
    /// Validate and build a catalog
    pub fn new(artifacts: Vec<ArtifactDescriptor>) -> Result<Self, ModelError> {
        let mut seen = HashSet::new();
        for artifact in &artifacts {
            artifact.validate().map_err(ModelError::InvalidCatalog)?;
            if !seen.insert(artifact.id.as_str()) {
                return Err(ModelError::InvalidCatalog(format!(
                    "duplicate artifact id {:?}",
                    artifact.id
                )));
            }
        }

        Ok(Self { artifacts })
    }

    /// The catalog compiled into the application
    pub fn builtin() -> Result<Self, ModelError> {
        Self::new(BUILTIN_ARTIFACTS.clone())
    }

    /// Load a catalog from a JSON array of descriptors
    pub fn from_json_file(path: &Path) -> Result<Self, ModelError> {
        let data = std::fs::read(path)?;
        let artifacts: Vec<ArtifactDescriptor> = serde_json::from_slice(&data).map_err(|e| {
            ModelError::InvalidCatalog(format!("{}: {}", path.display(), e))
        })?;
        Self::new(artifacts)
    }

    /// All artifacts, in catalog order
    pub fn list(&self) -> &[ArtifactDescriptor] {
        &self.artifacts
    }

    /// Get artifact by ID
    pub fn get(&self, id: &str) -> Option<&ArtifactDescriptor> {
        self.artifacts.iter().find(|a| a.id == id)
    }

    /// Get all artifacts of a specific kind
    pub fn by_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &ArtifactDescriptor> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }
}
