//! Filter selection.

use serde::{Deserialize, Serialize};

/// The pixel transform applied to every frame of the job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Identity; the transform stage is skipped entirely
    #[default]
    None,
    /// Per-pixel luma replicated into all channels
    Grayscale,
    /// 3x3 box average per channel
    Blur,
    /// Per-byte `255 - b`
    Invert,
    /// Luma Sobel magnitude
    EdgeDetect,
}

impl FilterKind {
    /// Map a task name from a job descriptor to a filter.
    ///
    /// Returns `Option::None` for unknown names so the caller can log a
    /// warning and fall back to [`FilterKind::None`] instead of failing the
    /// job.
    pub fn parse(task: &str) -> Option<Self> {
        match task {
            "none" => Some(Self::None),
            "invert" => Some(Self::Invert),
            "grayscale" => Some(Self::Grayscale),
            "blur" => Some(Self::Blur),
            "edge" | "edge_detect" => Some(Self::EdgeDetect),
            _ => None,
        }
    }

    /// Stable name for logging and paths.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Grayscale => "grayscale",
            Self::Blur => "blur",
            Self::Invert => "invert",
            Self::EdgeDetect => "edge",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tasks() {
        assert_eq!(FilterKind::parse("invert"), Some(FilterKind::Invert));
        assert_eq!(FilterKind::parse("grayscale"), Some(FilterKind::Grayscale));
        assert_eq!(FilterKind::parse("blur"), Some(FilterKind::Blur));
        assert_eq!(FilterKind::parse("edge"), Some(FilterKind::EdgeDetect));
        assert_eq!(FilterKind::parse("none"), Some(FilterKind::None));
    }

    #[test]
    fn test_parse_unknown_task() {
        // Unknown names are a warning at the call site, never an error here.
        assert_eq!(FilterKind::parse("sepia"), None);
        assert_eq!(FilterKind::parse(""), None);
    }
}
