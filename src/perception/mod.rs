//! Perceiving a target's screen and acting on it.
//!
//! - [`Transport`] is the command channel to the targets (capture + tap)
//! - [`PerceptionActuator`] binds a transport to one target and implements find / click
//! - [`matcher`] holds the template matching kernel

pub mod actuator;
#[cfg(feature = "adb")]
pub mod adb;
pub mod matcher;
pub mod replay;

pub use actuator::PerceptionActuator;

use crate::error::TransportError;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default score a template match has to reach.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// The command channel to the targets.
///
/// Every call is fallible and blocks the calling worker only.
pub trait Transport: Send + Sync {
    /// Raw encoded screenshot bytes of `target`.
    fn capture(&self, target: &str) -> Result<Vec<u8>, TransportError>;

    /// Taps the screen of `target` at `(x, y)`.
    fn tap(&self, target: &str, x: u32, y: u32) -> Result<(), TransportError>;

    /// Whether `target` is currently running and addressable.
    fn is_reachable(&self, _target: &str) -> bool {
        true
    }
}

/// Result of a perception call: the center of the match and whether it cleared the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub x: u32,
    pub y: u32,
    pub found: bool,
    /// Best score seen, useful in logs even on a miss.
    pub score: f64,
}

impl MatchResult {
    pub fn hit(x: u32, y: u32, score: f64) -> Self {
        MatchResult {
            x,
            y,
            found: true,
            score,
        }
    }

    pub fn miss(score: f64) -> Self {
        MatchResult {
            x: 0,
            y: 0,
            found: false,
            score,
        }
    }

    pub fn position(&self) -> Option<(u32, u32)> {
        self.found.then_some((self.x, self.y))
    }
}

/// Sub-rectangle `(x1, y1)..(x2, y2)` of the screen, end-exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct Region {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Region {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Region { x1, y1, x2, y2 }
    }

    /// Clamps to an image of `width` x `height`. `None` if nothing is left.
    pub fn clamp(&self, width: u32, height: u32) -> Option<Region> {
        let x2 = self.x2.min(width);
        let y2 = self.y2.min(height);
        (self.x1 < x2 && self.y1 < y2).then_some(Region::new(self.x1, self.y1, x2, y2))
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }
}

impl From<[u32; 4]> for Region {
    fn from([x1, y1, x2, y2]: [u32; 4]) -> Self {
        Region::new(x1, y1, x2, y2)
    }
}

impl From<Region> for [u32; 4] {
    fn from(r: Region) -> Self {
        [r.x1, r.y1, r.x2, r.y2]
    }
}

/// A reference image of a UI control.
#[derive(Clone)]
pub enum Template {
    /// Loaded from disk on first use, then cached by the actuator.
    Path(PathBuf),
    /// Already decoded.
    Image { name: String, image: Arc<GrayImage> },
}

impl Template {
    pub fn image(name: impl Into<String>, image: GrayImage) -> Self {
        Template::Image {
            name: name.into(),
            image: Arc::new(image),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Template::Path(path) => path.display().to_string(),
            Template::Image { name, .. } => name.clone(),
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template({})", self.name())
    }
}

impl From<&str> for Template {
    fn from(path: &str) -> Self {
        Template::Path(PathBuf::from(path))
    }
}

impl From<String> for Template {
    fn from(path: String) -> Self {
        Template::Path(PathBuf::from(path))
    }
}

impl From<&Path> for Template {
    fn from(path: &Path) -> Self {
        Template::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for Template {
    fn from(path: PathBuf) -> Self {
        Template::Path(path)
    }
}
