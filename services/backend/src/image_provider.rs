use crate::config::{normalize_env_value, EnvSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while reading image settings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageProviderError {
    #[error("unknown image provider '{0}'")]
    UnknownImageProvider(String),
}

/// Source of generated or stock images
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ImageProvider {
    #[serde(rename = "pexels")]
    Pexels,
    #[serde(rename = "pixabay")]
    Pixabay,
    #[serde(rename = "gemini_flash")]
    GeminiFlash,
    #[serde(rename = "nanobanana_pro")]
    NanobananaPro,
    #[serde(rename = "dall-e-3")]
    Dalle3,
    #[serde(rename = "gpt-image-1.5")]
    GptImage15,
    #[serde(rename = "comfyui")]
    Comfyui,
}

impl ImageProvider {
    pub const ALL: [ImageProvider; 7] = [
        Self::Pexels,
        Self::Pixabay,
        Self::GeminiFlash,
        Self::NanobananaPro,
        Self::Dalle3,
        Self::GptImage15,
        Self::Comfyui,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pexels => "pexels",
            Self::Pixabay => "pixabay",
            Self::GeminiFlash => "gemini_flash",
            Self::NanobananaPro => "nanobanana_pro",
            Self::Dalle3 => "dall-e-3",
            Self::GptImage15 => "gpt-image-1.5",
            Self::Comfyui => "comfyui",
        }
    }

    /// Stock photo libraries, as opposed to generative models
    pub fn is_stock(&self) -> bool {
        matches!(self, Self::Pexels | Self::Pixabay)
    }
}

impl FromStr for ImageProvider {
    type Err = ImageProviderError;

    /// Values match exactly, as they are written in the environment.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == value)
            .ok_or_else(|| ImageProviderError::UnknownImageProvider(value.to_string()))
    }
}

impl fmt::Display for ImageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider named by `IMAGE_PROVIDER`, if any
pub fn selected_image_provider(
    env: &EnvSnapshot,
) -> Result<Option<ImageProvider>, ImageProviderError> {
    normalize_env_value(env.image_provider.as_deref())
        .map(|value| value.parse())
        .transpose()
}

/// Whether `DISABLE_IMAGE_GENERATION` is set to a true value
pub fn is_image_generation_disabled(env: &EnvSnapshot) -> bool {
    normalize_env_value(env.disable_image_generation.as_deref())
        .and_then(|value| parse_bool_or_none(&value))
        .unwrap_or(false)
}

/// `true/1/yes/on` and `false/0/no/off` in any case; anything else is `None`
pub fn parse_bool_or_none(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
