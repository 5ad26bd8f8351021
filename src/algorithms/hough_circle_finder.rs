//! Circle detection by gradient voting.
//!
//! Every pixel with a strong gradient votes along its gradient direction at
//! each candidate radius. Circle centres collect votes from all around their
//! rim and show up as peaks in the (smoothed) accumulator. Peaks closer than
//! `min_distance` to a stronger one are dropped, then each survivor gets a
//! radius from the strongest ring of radial gradient around it.

use anyhow::{bail, Result};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_scharr, vertical_scharr};

use crate::pipeline::Algorithm;
use crate::settings::{Setting, Settings};
use crate::types::{Auxiliary, Frame, Keypoint};

/// Fraction of the strongest gradient a pixel needs to cast votes.
const GRADIENT_FRACTION: f32 = 0.1;
const ACCUMULATOR_SIGMA: f32 = 2.0;
/// Upper bound on the number of radii voted per pixel.
const MAX_RADII: f32 = 64.0;
const RIM_SAMPLES: usize = 48;

pub struct HoughCircleFinder {
    settings: Settings,
}

#[derive(Debug, Clone, Copy)]
struct CircleParams {
    r_min: f32,
    r_max: f32,
    min_distance: f32,
    vote_fraction: f32,
    max_circles: usize,
}

impl HoughCircleFinder {
    pub const NAME: &'static str = "hough_circle_finder";

    pub fn new() -> Self {
        Self {
            settings: Settings::new(vec![
                Setting::slider("min_radius", 8, 1, 200),
                Setting::slider("max_radius", 80, 1, 400),
                Setting::slider("min_distance", 100, 1, 500),
                Setting::slider("vote_threshold", 30, 1, 100),
                Setting::slider("max_circles", 5, 1, 20),
            ]),
        }
    }

    fn params(&self) -> Result<CircleParams> {
        let s = &self.settings;
        let r_min = s.raw_or("min_radius", 8);
        let r_max = s.raw_or("max_radius", 80);
        if r_max < r_min {
            bail!("max_radius {r_max} is below min_radius {r_min}");
        }
        Ok(CircleParams {
            r_min: r_min as f32,
            r_max: r_max as f32,
            min_distance: s.raw_or("min_distance", 100) as f32,
            vote_fraction: s.raw_or("vote_threshold", 30) as f32 / 100.0,
            max_circles: s.raw_or("max_circles", 5).max(1) as usize,
        })
    }
}

impl Default for HoughCircleFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl Algorithm for HoughCircleFinder {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn process(&self, frame: &Frame, _input: &Auxiliary) -> Result<(Frame, Auxiliary)> {
        let DynamicImage::ImageLuma8(gray) = frame else {
            bail!(
                "circle finder needs a single-channel frame, got {:?}",
                frame.color()
            );
        };
        let params = self.params()?;
        let circles = find_circles(gray, &params);
        Ok((frame.clone(), Auxiliary::with_keypoints(circles)))
    }
}

struct Gradients {
    gx: Vec<f32>,
    gy: Vec<f32>,
    width: usize,
    height: usize,
}

impl Gradients {
    fn new(gray: &GrayImage) -> Self {
        let gx = horizontal_scharr(gray);
        let gy = vertical_scharr(gray);
        Self {
            gx: gx.as_raw().iter().map(|&v| v as f32).collect(),
            gy: gy.as_raw().iter().map(|&v| v as f32).collect(),
            width: gray.width() as usize,
            height: gray.height() as usize,
        }
    }

    fn at(&self, x: i32, y: i32) -> Option<(f32, f32)> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        let idx = y as usize * self.width + x as usize;
        Some((self.gx[idx], self.gy[idx]))
    }
}

fn candidate_radii(params: &CircleParams) -> Vec<f32> {
    let step = ((params.r_max - params.r_min) / MAX_RADII).max(1.0);
    let mut radii = Vec::new();
    let mut r = params.r_min;
    while r <= params.r_max {
        radii.push(r);
        r += step;
    }
    radii
}

#[inline]
fn bilinear_vote(accum: &mut [f32], stride: usize, x: f32, y: f32, weight: f32) {
    let x0 = x as usize;
    let y0 = y as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let base = y0 * stride + x0;
    accum[base] += weight * (1.0 - fx) * (1.0 - fy);
    accum[base + 1] += weight * fx * (1.0 - fy);
    accum[base + stride] += weight * (1.0 - fx) * fy;
    accum[base + stride + 1] += weight * fx * fy;
}

fn find_circles(gray: &GrayImage, params: &CircleParams) -> Vec<Keypoint> {
    let (w, h) = gray.dimensions();
    if w < 4 || h < 4 {
        return Vec::new();
    }

    let grads = Gradients::new(gray);
    let max_mag = grads
        .gx
        .iter()
        .zip(&grads.gy)
        .map(|(gx, gy)| gx * gx + gy * gy)
        .fold(0.0f32, f32::max)
        .sqrt();
    if max_mag < 1e-6 {
        return Vec::new();
    }
    let threshold_sq = (GRADIENT_FRACTION * max_mag).powi(2);

    let radii = candidate_radii(params);
    let stride = w as usize;
    let x_limit = (w - 1) as f32;
    let y_limit = (h - 1) as f32;
    let mut accum = vec![0.0f32; stride * h as usize];

    for y in 0..h as usize {
        for x in 0..stride {
            let idx = y * stride + x;
            let (gx, gy) = (grads.gx[idx], grads.gy[idx]);
            let mag_sq = gx * gx + gy * gy;
            if mag_sq < threshold_sq {
                continue;
            }
            let mag = mag_sq.sqrt();
            let (dx, dy) = (gx / mag, gy / mag);
            let (xf, yf) = (x as f32, y as f32);

            for &r in &radii {
                for sign in [1.0f32, -1.0] {
                    let vx = xf + sign * dx * r;
                    let vy = yf + sign * dy * r;
                    if vx >= 0.0 && vx < x_limit && vy >= 0.0 && vy < y_limit {
                        bilinear_vote(&mut accum, stride, vx, vy, mag);
                    }
                }
            }
        }
    }

    let Some(accum) = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(w, h, accum) else {
        return Vec::new();
    };
    let smoothed = gaussian_blur_f32(&accum, ACCUMULATOR_SIGMA);
    let votes = smoothed.as_raw();
    let max_vote = votes.iter().cloned().fold(0.0f32, f32::max);
    if max_vote < 1e-6 {
        return Vec::new();
    }
    let vote_threshold = params.vote_fraction * max_vote;

    let mut peaks = Vec::new();
    for y in 1..h as usize - 1 {
        for x in 1..stride - 1 {
            let idx = y * stride + x;
            let v = votes[idx];
            if v < vote_threshold {
                continue;
            }
            let is_peak = [
                idx - stride - 1,
                idx - stride,
                idx - stride + 1,
                idx - 1,
                idx + 1,
                idx + stride - 1,
                idx + stride,
                idx + stride + 1,
            ]
            .iter()
            .all(|&n| votes[n] < v || (votes[n] == v && n > idx));
            if is_peak {
                peaks.push((x as f32, y as f32, v));
            }
        }
    }
    peaks.sort_by(|a, b| b.2.total_cmp(&a.2));

    let min_dist_sq = params.min_distance * params.min_distance;
    let mut centres: Vec<(f32, f32)> = Vec::new();
    for (x, y, _) in peaks {
        if centres.len() >= params.max_circles {
            break;
        }
        let separated = centres
            .iter()
            .all(|&(cx, cy)| (cx - x).powi(2) + (cy - y).powi(2) >= min_dist_sq);
        if separated {
            centres.push((x, y));
        }
    }

    centres
        .into_iter()
        .map(|(x, y)| {
            let r = estimate_radius(&grads, x, y, &radii);
            Keypoint::new(x, y, 2.0 * r)
        })
        .collect()
}

/// Radius whose rim carries the most gradient pointing along the radial direction.
fn estimate_radius(grads: &Gradients, cx: f32, cy: f32, radii: &[f32]) -> f32 {
    let mut best = (0.0f32, radii.first().copied().unwrap_or(0.0));
    for &r in radii {
        let mut total = 0.0;
        let mut samples = 0;
        for i in 0..RIM_SAMPLES {
            let theta = i as f32 * std::f32::consts::TAU / RIM_SAMPLES as f32;
            let (ux, uy) = (theta.cos(), theta.sin());
            let px = (cx + ux * r).round() as i32;
            let py = (cy + uy * r).round() as i32;
            if let Some((gx, gy)) = grads.at(px, py) {
                total += (gx * ux + gy * uy).abs();
                samples += 1;
            }
        }
        if samples > 0 {
            let score = total / samples as f32;
            if score > best.0 {
                best = (score, r);
            }
        }
    }
    best.1
}
