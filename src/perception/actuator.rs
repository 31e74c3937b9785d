use crate::error::{CaptureError, PerceptionError, TemplateError};
use crate::perception::matcher;
use crate::perception::{DEFAULT_THRESHOLD, MatchResult, Region, Template, Transport};
use image::{DynamicImage, GrayImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Capture and input capability of one target.
///
/// Every perception call takes a fresh screenshot through the transport. Templates
/// given by path are decoded once and cached for the lifetime of the actuator.
pub struct PerceptionActuator {
    target: String,
    transport: Arc<dyn Transport>,
    default_threshold: f64,
    templates: Mutex<HashMap<PathBuf, Arc<GrayImage>>>,
}

impl PerceptionActuator {
    pub fn new(target: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        PerceptionActuator {
            target: target.into(),
            transport,
            default_threshold: DEFAULT_THRESHOLD,
            templates: Mutex::new(HashMap::new()),
        }
    }

    /// Threshold used by the `*_img` helpers when the caller gives none.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.default_threshold = threshold;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn default_threshold(&self) -> f64 {
        self.default_threshold
    }

    pub fn is_reachable(&self) -> bool {
        self.transport.is_reachable(&self.target)
    }

    /// Captures and decodes the current screen.
    pub fn screenshot(&self) -> Result<DynamicImage, CaptureError> {
        let bytes = self
            .transport
            .capture(&self.target)
            .map_err(|source| CaptureError::Transport {
                target: self.target.clone(),
                source,
            })?;
        image::load_from_memory(&bytes).map_err(|source| CaptureError::Decode {
            target: self.target.clone(),
            source,
        })
    }

    /// Looks for the templates, in the given order, on a fresh screenshot.
    ///
    /// The first template whose best score reaches `threshold` wins, even if a later
    /// template would score higher. The returned coordinate is the center of the
    /// match in full-screen coordinates. A miss is `Ok` with `found == false`.
    pub fn find(
        &self,
        templates: &[Template],
        threshold: f64,
        region: Option<Region>,
    ) -> Result<MatchResult, PerceptionError> {
        let screen = self.screenshot()?.to_luma8();

        let cropped;
        let (area, origin) = match region {
            None => (&screen, (0, 0)),
            Some(region) => match region.clamp(screen.width(), screen.height()) {
                Some(r) => {
                    cropped =
                        image::imageops::crop_imm(&screen, r.x1, r.y1, r.width(), r.height())
                            .to_image();
                    (&cropped, (r.x1, r.y1))
                }
                None => {
                    log::warn!(
                        "[{}] region {:?} lies outside the {}x{} screen",
                        self.target,
                        region,
                        screen.width(),
                        screen.height()
                    );
                    return Ok(MatchResult::miss(0.0));
                }
            },
        };

        let mut best_score: Option<f64> = None;
        for template in templates {
            let image = self.load_template(template)?;
            match matcher::best_match(area, &image) {
                Some(m) if m.score >= threshold => {
                    let x = origin.0 + m.x + image.width() / 2;
                    let y = origin.1 + m.y + image.height() / 2;
                    log::debug!(
                        "[{}] found {} at ({}, {}) score {:.3}",
                        self.target,
                        template.name(),
                        x,
                        y,
                        m.score
                    );
                    return Ok(MatchResult::hit(x, y, m.score));
                }
                Some(m) => {
                    log::debug!(
                        "[{}] {} best score {:.3} below {:.2}",
                        self.target,
                        template.name(),
                        m.score,
                        threshold
                    );
                    best_score = Some(best_score.map_or(m.score, |b| b.max(m.score)));
                }
                None => log::debug!(
                    "[{}] {} does not fit in the search area",
                    self.target,
                    template.name()
                ),
            }
        }
        Ok(MatchResult::miss(best_score.unwrap_or(0.0)))
    }

    /// `find` for a single template over the whole screen with the default threshold.
    pub fn find_img(&self, template: impl Into<Template>) -> Result<MatchResult, PerceptionError> {
        self.find(&[template.into()], self.default_threshold, None)
    }

    /// Issues a tap. Fire-and-forget: a transport failure is logged, not returned.
    pub fn click(&self, x: u32, y: u32) {
        match self.transport.tap(&self.target, x, y) {
            Ok(()) => log::info!("[{}] tap ({}, {})", self.target, x, y),
            Err(e) => log::warn!("[{}] tap ({}, {}) failed: {}", self.target, x, y, e),
        }
    }

    /// `find` followed by `click` on a hit. Returns whether a click was issued.
    pub fn find_and_click(
        &self,
        templates: &[Template],
        threshold: f64,
    ) -> Result<bool, PerceptionError> {
        let result = self.find(templates, threshold, None)?;
        if let Some((x, y)) = result.position() {
            self.click(x, y);
        }
        Ok(result.found)
    }

    fn load_template(&self, template: &Template) -> Result<Arc<GrayImage>, TemplateError> {
        let path = match template {
            Template::Image { image, .. } => return Ok(Arc::clone(image)),
            Template::Path(path) => path,
        };

        if let Some(cached) = self.cache().get(path) {
            return Ok(Arc::clone(cached));
        }
        let image = Arc::new(decode_template(path)?);
        self.cache().insert(path.clone(), Arc::clone(&image));
        Ok(image)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<GrayImage>>> {
        self.templates.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode_template(path: &Path) -> Result<GrayImage, TemplateError> {
    image::open(path)
        .map(|image| image.to_luma8())
        .map_err(|source| TemplateError::Load {
            path: path.to_path_buf(),
            source,
        })
}
