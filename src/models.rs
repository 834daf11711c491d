use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use std::{fmt, str::FromStr};

/// Number of future horizons rendered per run.
pub const HORIZON_COUNT: usize = 6;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
    Ja,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
            Language::Ja => "ja",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Language::En),
            "zh" => Ok(Language::Zh),
            "ja" => Ok(Language::Ja),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// The six fixed time horizons, in render order.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    OneYear,
    HundredYears,
    ThousandYears,
    TenThousandYears,
    HundredThousandYears,
    MillionYears,
}

impl Horizon {
    pub const ALL: [Horizon; HORIZON_COUNT] = [
        Horizon::OneYear,
        Horizon::HundredYears,
        Horizon::ThousandYears,
        Horizon::TenThousandYears,
        Horizon::HundredThousandYears,
        Horizon::MillionYears,
    ];

    /// Zero-based position in `ALL`.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn years(self) -> u64 {
        match self {
            Horizon::OneYear => 1,
            Horizon::HundredYears => 100,
            Horizon::ThousandYears => 1_000,
            Horizon::TenThousandYears => 10_000,
            Horizon::HundredThousandYears => 100_000,
            Horizon::MillionYears => 1_000_000,
        }
    }
}

/// Photo (or street view frame) that every horizon is rendered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub mime_type: String,
    pub bytes: Bytes,
}

impl SourceImage {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self { mime_type: mime_type.into(), bytes: bytes.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub horizon: Horizon,
    pub prompt: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    /// 1-based position in the horizon sequence.
    pub index: usize,
    pub horizon: Horizon,
    pub label: String,
    pub image: Bytes,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A synthesis call failed; the script was never requested.
    Images,
    /// All six images exist but the narration script could not be written.
    ScriptOnly,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    GeneratingImages,
    GeneratingScript,
    Ready,
    Failed(FailureKind),
}

impl RunPhase {
    pub fn is_running(self) -> bool {
        matches!(self, RunPhase::GeneratingImages | RunPhase::GeneratingScript)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub label: String,
}

#[serde_as]
#[derive(Debug, Serialize, Clone)]
pub struct ArtifactView {
    pub index: usize,
    pub horizon: Horizon,
    pub label: String,
    pub created_at: DateTime<Utc>,
    #[serde_as(as = "Base64")]
    pub image_base64: Bytes,
}

impl From<&GeneratedArtifact> for ArtifactView {
    fn from(a: &GeneratedArtifact) -> Self {
        Self {
            index: a.index,
            horizon: a.horizon,
            label: a.label.clone(),
            created_at: a.created_at,
            image_base64: a.image.clone(),
        }
    }
}

/// Read-only view of a pipeline for the presentation layer.
#[derive(Debug, Serialize, Clone)]
pub struct RunSnapshot {
    pub phase: RunPhase,
    pub language: Language,
    pub source_mime_type: Option<String>,
    pub progress: Option<Progress>,
    pub artifacts: Vec<ArtifactView>,
    pub scene_description: Option<String>,
    pub script: Option<String>,
    pub error: Option<String>,
    pub exporting: bool,
}

// --- HTTP request/response bodies ---

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct SourceUpload {
    pub mime_type: String,
    #[serde_as(as = "Base64")]
    pub data: Vec<u8>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GenerateBody {
    #[serde(default)]
    pub language: Option<Language>,
}

#[derive(Debug, Serialize, Clone)]
pub struct SessionView {
    pub id: uuid::Uuid,
    #[serde(flatten)]
    pub run: RunSnapshot,
}

#[derive(Debug, Serialize, Clone)]
pub struct HorizonView {
    pub index: usize,
    pub horizon: Horizon,
    pub years: u64,
    pub label: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LocaleQuery {
    #[serde(default)]
    pub lang: Option<Language>,
    #[serde(default)]
    pub section: Option<String>,
}
