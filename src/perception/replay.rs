use crate::error::TransportError;
use crate::perception::Transport;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// A transport that plays back a scripted sequence of screens and records taps.
///
/// Each capture returns the next frame; the last frame repeats forever. Useful for
/// dry runs of a task configuration without a device attached.
pub struct ReplayTransport {
    frames: Vec<DynamicImage>,
    cursor: AtomicUsize,
    captures: AtomicUsize,
    taps: Mutex<Vec<(u32, u32)>>,
    reachable: AtomicBool,
}

impl ReplayTransport {
    pub fn new<I>(frames: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<DynamicImage>,
    {
        ReplayTransport {
            frames: frames.into_iter().map(Into::into).collect(),
            cursor: AtomicUsize::new(0),
            captures: AtomicUsize::new(0),
            taps: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Taps recorded so far, in order.
    pub fn taps(&self) -> Vec<(u32, u32)> {
        self.taps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    fn next_frame(&self) -> Option<&DynamicImage> {
        let last = self.frames.len().checked_sub(1)?;
        let index = self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| Some((i + 1).min(last)))
            .unwrap_or(last);
        self.frames.get(index.min(last))
    }
}

impl Transport for ReplayTransport {
    fn capture(&self, target: &str) -> Result<Vec<u8>, TransportError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let frame = self
            .next_frame()
            .ok_or_else(|| TransportError::Unavailable(target.to_string()))?;

        let mut bytes = Cursor::new(Vec::new());
        frame
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|e| TransportError::Frame(e.to_string()))?;
        Ok(bytes.into_inner())
    }

    fn tap(&self, target: &str, x: u32, y: u32) -> Result<(), TransportError> {
        if !self.is_reachable(target) {
            return Err(TransportError::Unavailable(target.to_string()));
        }
        self.taps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((x, y));
        Ok(())
    }

    fn is_reachable(&self, _target: &str) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
