// User-facing transcode settings and their resolution into encoder parameters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::SettingsError;

/// Raw override value meaning "use the quality preset"
pub const UNSET_OVERRIDE: i64 = -1;

/// Upper bound for the partition-count knob
pub const MAX_PARTITIONS: u32 = 64;

/// Upper bound for the compression-effort (uber) level
pub const MAX_EFFORT: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Fast,
    #[default]
    Balanced,
    High,
}

/// Concrete encoder knobs supplied by a quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub partitions: u32,
    pub effort: u32,
}

// Indexed by Quality::tier()
const PRESETS: [Preset; 3] = [
    Preset {
        partitions: 16,
        effort: 0,
    },
    Preset {
        partitions: 32,
        effort: 1,
    },
    Preset {
        partitions: 64,
        effort: 4,
    },
];

impl Quality {
    pub const ALL: [Quality; 3] = [Quality::Fast, Quality::Balanced, Quality::High];

    /// Ordinal tier (0 = fast, 1 = balanced, 2 = high)
    pub fn tier(self) -> u8 {
        match self {
            Quality::Fast => 0,
            Quality::Balanced => 1,
            Quality::High => 2,
        }
    }

    pub fn from_tier(tier: u8) -> Option<Self> {
        Self::ALL.get(tier as usize).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Quality::Fast => "fast",
            Quality::Balanced => "balanced",
            Quality::High => "high",
        }
    }

    pub fn preset(self) -> Preset {
        PRESETS[self.tier() as usize]
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Quality {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "0" => Ok(Quality::Fast),
            "balanced" | "1" => Ok(Quality::Balanced),
            "high" | "2" => Ok(Quality::High),
            _ => Err(SettingsError::UnknownQuality(s.to_string())),
        }
    }
}

/// Parse a raw override where -1 defers to the preset.
///
/// Any other negative value is rejected rather than treated as unset.
pub fn parse_override(
    field: &'static str,
    raw: i64,
    max: u32,
) -> Result<Option<u32>, SettingsError> {
    if raw == UNSET_OVERRIDE {
        return Ok(None);
    }
    if raw < 0 {
        return Err(SettingsError::InvalidOverride { field, value: raw });
    }
    if raw > max as i64 {
        return Err(SettingsError::OutOfRange {
            field,
            value: raw,
            max,
        });
    }
    Ok(Some(raw as u32))
}

/// Pick partitions/effort for a tier, letting explicit overrides win
pub fn resolve_preset(quality: Quality, partitions: Option<u32>, effort: Option<u32>) -> Preset {
    let preset = quality.preset();
    Preset {
        partitions: partitions.unwrap_or(preset.partitions),
        effort: effort.unwrap_or(preset.effort),
    }
}

/// Settings for one transcode job, captured at `begin()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub input: PathBuf,
    pub output: PathBuf,
    pub quality: Quality,
    /// Partition-count override (None = use preset)
    pub partitions: Option<u32>,
    /// Compression-effort override (None = use preset)
    pub effort: Option<u32>,
    /// Encoder worker threads (0 = auto)
    pub threads: u32,
    pub force_all_key_frames: bool,
    pub enable_skip_blocks: bool,
    pub enable_solid_color_blocks: bool,
    pub enable_quarter_resolution: bool,
}

impl Settings {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            quality: Quality::default(),
            partitions: None,
            effort: None,
            threads: 0,
            force_all_key_frames: false,
            enable_skip_blocks: true,
            enable_solid_color_blocks: true,
            enable_quarter_resolution: false,
        }
    }

    /// Translate into the encoder's full configuration surface
    pub fn resolve(&self) -> EncoderParams {
        let preset = resolve_preset(self.quality, self.partitions, self.effort);
        EncoderParams {
            quality: self.quality,
            partitions: preset.partitions,
            effort: preset.effort,
            threads: self.threads,
            force_all_key_frames: self.force_all_key_frames,
            enable_skip_blocks: self.enable_skip_blocks,
            enable_solid_color_blocks: self.enable_solid_color_blocks,
            enable_quarter_resolution: self.enable_quarter_resolution,
        }
    }
}

/// Fully resolved encoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderParams {
    pub quality: Quality,
    pub partitions: u32,
    pub effort: u32,
    pub threads: u32,
    pub force_all_key_frames: bool,
    pub enable_skip_blocks: bool,
    pub enable_solid_color_blocks: bool,
    pub enable_quarter_resolution: bool,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Settings::new("", "").resolve()
    }
}

/// Default output path: the input path with its extension replaced
pub fn derive_output_path(input: &Path, extension: &str) -> PathBuf {
    let extension = extension.trim_start_matches('.');
    let mut output = input.to_path_buf();
    if input.extension().and_then(|e| e.to_str()) == Some(extension) {
        // Never overwrite the source
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        output.set_file_name(format!("{}.encoded.{}", stem, extension));
    } else {
        output.set_extension(extension);
    }
    output
}
