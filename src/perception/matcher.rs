//! Normalized cross-correlation template matching on single-channel images.
//!
//! The score at each position is the correlation coefficient between the template
//! and the window under it (the same measure as OpenCV's `TM_CCOEFF_NORMED`), in `[-1, 1]`.
//! Window sums come from integral images, the cross term is computed directly.

use image::GrayImage;

/// Best placement of a template: top-left corner and score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub x: u32,
    pub y: u32,
    pub score: f64,
}

const FLAT: f64 = 1e-9;

/// Finds the highest-scoring placement of `template` inside `haystack`.
///
/// Ties keep the first maximum in row-major order. Returns `None` when the template
/// is empty or does not fit inside the haystack.
pub fn best_match(haystack: &GrayImage, template: &GrayImage) -> Option<Match> {
    let (iw, ih) = haystack.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }

    let n = f64::from(tw) * f64::from(th);
    let t_mean = template.as_raw().iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let t_dev: Vec<f64> = template
        .as_raw()
        .iter()
        .map(|&v| f64::from(v) - t_mean)
        .collect();
    let t_norm: f64 = t_dev.iter().map(|d| d * d).sum();

    let integral = Integral::new(haystack);
    let raw = haystack.as_raw();
    let (iw_u, tw_u) = (iw as usize, tw as usize);

    let mut best: Option<Match> = None;
    for y in 0..=(ih - th) {
        for x in 0..=(iw - tw) {
            let (sum, sq) = integral.window(x, y, tw, th);
            let variance = (sq - sum * sum / n).max(0.0);

            let mut cross = 0.0;
            for ty in 0..th as usize {
                let row = (y as usize + ty) * iw_u + x as usize;
                let window = &raw[row..row + tw_u];
                let devs = &t_dev[ty * tw_u..(ty + 1) * tw_u];
                cross += window
                    .iter()
                    .zip(devs)
                    .map(|(&v, d)| f64::from(v) * d)
                    .sum::<f64>();
            }

            let score = correlation(cross, variance, t_norm);
            if best.is_none_or(|b| score > b.score) {
                best = Some(Match { x, y, score });
            }
        }
    }
    best
}

fn correlation(cross: f64, variance: f64, t_norm: f64) -> f64 {
    match (t_norm <= FLAT, variance <= FLAT) {
        // two flat patches are indistinguishable
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => (cross / (t_norm * variance).sqrt()).clamp(-1.0, 1.0),
    }
}

/// Summed-area tables of pixel values and squared pixel values.
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = image.dimensions();
        let (w, h) = (w as usize, h as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq = vec![0.0; stride * (h + 1)];
        let raw = image.as_raw();

        for y in 0..h {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = f64::from(raw[y * w + x]);
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }
        Integral { stride, sum, sq }
    }

    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (x, y, w, h) = (x as usize, y as usize, w as usize, h as usize);
        let s = self.stride;
        let area = |t: &[f64]| t[(y + h) * s + x + w] - t[y * s + x + w] - t[(y + h) * s + x] + t[y * s + x];
        (area(&self.sum), area(&self.sq))
    }
}
