use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{FluxError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 4] = [
        AspectRatio::Square,
        AspectRatio::Landscape4x3,
        AspectRatio::Widescreen,
        AspectRatio::Portrait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = FluxError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == trimmed)
            .ok_or_else(|| {
                FluxError::Validation(format!(
                    "unsupported aspect ratio '{}' (expected one of 1:1, 4:3, 16:9, 9:16)",
                    trimmed
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    Standard,
    High,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Standard => "standard",
            Quality::High => "high",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = FluxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Quality::Standard),
            "high" => Ok(Quality::High),
            other => Err(FluxError::Validation(format!(
                "unsupported quality '{}' (expected standard or high)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageFormat {
    type Err = FluxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "webp" => Ok(ImageFormat::Webp),
            other => Err(FluxError::Validation(format!(
                "unsupported image format '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<image::ImageFormat> for ImageFormat {
    type Error = FluxError;

    fn try_from(format: image::ImageFormat) -> Result<Self> {
        match format {
            image::ImageFormat::Jpeg => Ok(ImageFormat::Jpeg),
            image::ImageFormat::Png => Ok(ImageFormat::Png),
            image::ImageFormat::WebP => Ok(ImageFormat::Webp),
            other => Err(FluxError::Decode(format!(
                "unexpected image format {:?}",
                other
            ))),
        }
    }
}

/// A validated prompt plus its generation options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    prompt: String,
    aspect_ratio: AspectRatio,
    quality: Quality,
}

impl GenerationRequest {
    /// Builds a request, trimming the prompt. An empty prompt is rejected.
    pub fn new(prompt: impl AsRef<str>, aspect_ratio: AspectRatio, quality: Quality) -> Result<Self> {
        let prompt = prompt.as_ref().trim();
        if prompt.is_empty() {
            return Err(FluxError::Validation("prompt cannot be empty".into()));
        }

        Ok(Self {
            prompt: prompt.to_string(),
            aspect_ratio,
            quality,
        })
    }

    /// Same as [`GenerationRequest::new`] but parses the options from their
    /// textual form, as a presenter's drop-downs would hand them over.
    pub fn parse(prompt: impl AsRef<str>, aspect_ratio: &str, quality: &str) -> Result<Self> {
        Self::new(prompt, aspect_ratio.parse()?, quality.parse()?)
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedImage {
    #[serde(skip)]
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GeneratedImage {
    /// Inspects an encoded payload and records its format and dimensions.
    pub fn decode(data: Vec<u8>, source_url: Option<String>) -> Result<Self> {
        if data.is_empty() {
            return Err(FluxError::Decode("image payload is empty".into()));
        }

        let reader = image::ImageReader::new(std::io::Cursor::new(data.as_slice()))
            .with_guessed_format()
            .map_err(|e| FluxError::Decode(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| FluxError::Decode("unrecognised image payload".into()))
            .and_then(ImageFormat::try_from)?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| FluxError::Decode(e.to_string()))?;

        Ok(Self {
            data,
            format,
            width,
            height,
            source_url,
            created_at: Utc::now(),
        })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// `flux_<timestamp>_<index>.<ext>`
    pub fn file_name(&self, index: usize) -> String {
        format!(
            "flux_{}_{}.{}",
            self.created_at.format("%Y%m%d_%H%M%S"),
            index,
            self.format.extension()
        )
    }

    pub async fn save_to_dir(&self, dir: impl AsRef<Path>, index: usize) -> Result<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name(index));
        tokio::fs::write(&path, &self.data).await?;
        log::info!("Image saved as: {}", path.display());
        Ok(path)
    }
}

/// Outcome of one submission: an image or a human-readable reason.
#[derive(Debug, Clone)]
pub enum GenerationResult {
    Success(GeneratedImage),
    Failure { reason: String },
}

impl GenerationResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            "unknown failure".to_string()
        } else {
            reason
        };
        GenerationResult::Failure { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResult::Success(_))
    }

    pub fn image(&self) -> Option<&GeneratedImage> {
        match self {
            GenerationResult::Success(image) => Some(image),
            GenerationResult::Failure { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            GenerationResult::Success(_) => None,
            GenerationResult::Failure { reason } => Some(reason),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}
