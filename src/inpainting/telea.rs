//! Fast-marching inpainting (Telea)
//!
//! Pixels are filled in order of increasing distance from the mask boundary.
//! Each newly reached pixel takes a weighted average of already known pixels
//! within the radius; the weight favours neighbours along the marching
//! direction, nearby neighbours and neighbours on a similar level set.

use image::{GrayImage, RgbImage};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;

/// Arrival time for pixels the front hasn't reached
const FAR: f32 = 1.0e6;

#[derive(Debug, Clone, Copy)]
struct FrontPixel {
    time: f32,
    index: usize,
}

impl PartialEq for FrontPixel {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontPixel {}

impl PartialOrd for FrontPixel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontPixel {
    // Reversed so the max-heap pops the smallest arrival time
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.index.cmp(&self.index))
    }
}

struct FastMarch {
    width: usize,
    height: usize,
    flags: Vec<u8>,
    time: Vec<f32>,
    pixels: Vec<[f32; 3]>,
}

impl FastMarch {
    fn new(image: &RgbImage, mask: &GrayImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let mut flags = vec![KNOWN; width * height];
        let mut time = vec![0.0; width * height];
        let pixels = image
            .pixels()
            .map(|p| [f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
            .collect();

        for (i, m) in mask.pixels().enumerate() {
            if m.0[0] > 0 {
                flags[i] = INSIDE;
                time[i] = FAR;
            }
        }

        Self {
            width,
            height,
            flags,
            time,
            pixels,
        }
    }

    fn neighbours4(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let (x, y) = (index % self.width, index / self.width);
        let w = self.width;
        [
            (x > 0).then(|| index - 1),
            (x + 1 < w).then(|| index + 1),
            (y > 0).then(|| index - w),
            (y + 1 < self.height).then(|| index + w),
        ]
        .into_iter()
        .flatten()
    }

    /// Seed the narrow band with known pixels touching the mask
    fn seed(&mut self, heap: &mut BinaryHeap<FrontPixel>) {
        for index in 0..self.flags.len() {
            if self.flags[index] != KNOWN {
                continue;
            }
            let touches_mask = self
                .neighbours4(index)
                .any(|n| self.flags[n] == INSIDE);
            if touches_mask {
                self.flags[index] = BAND;
                heap.push(FrontPixel { time: 0.0, index });
            }
        }
    }

    fn flag_at(&self, x: isize, y: isize) -> Option<(u8, f32)> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        let i = y as usize * self.width + x as usize;
        Some((self.flags[i], self.time[i]))
    }

    /// Solve the eikonal update from two orthogonal neighbours
    fn solve(&self, a: Option<(u8, f32)>, b: Option<(u8, f32)>) -> f32 {
        let known = |n: Option<(u8, f32)>| n.filter(|(flag, _)| *flag == KNOWN).map(|(_, t)| t);
        match (known(a), known(b)) {
            (Some(t1), Some(t2)) => {
                let discriminant = 2.0 - (t1 - t2) * (t1 - t2);
                if discriminant < 0.0 {
                    return 1.0 + t1.min(t2);
                }
                let r = discriminant.sqrt();
                let s = (t1 + t2 - r) / 2.0;
                if s >= t1 && s >= t2 {
                    s
                } else {
                    let s = s + r;
                    if s >= t1 && s >= t2 {
                        s
                    } else {
                        1.0 + t1.min(t2)
                    }
                }
            },
            (Some(t), None) | (None, Some(t)) => 1.0 + t,
            (None, None) => FAR,
        }
    }

    fn arrival_time(&self, index: usize) -> f32 {
        let (x, y) = ((index % self.width) as isize, (index / self.width) as isize);
        let up = self.flag_at(x, y - 1);
        let down = self.flag_at(x, y + 1);
        let left = self.flag_at(x - 1, y);
        let right = self.flag_at(x + 1, y);
        self.solve(up, left)
            .min(self.solve(down, left))
            .min(self.solve(up, right))
            .min(self.solve(down, right))
    }

    /// Gradient of the arrival time at `(x, y)` using non-inside neighbours
    fn time_gradient(&self, x: isize, y: isize) -> (f32, f32) {
        let here = self.flag_at(x, y).map_or(0.0, |(_, t)| t);
        let usable = |n: Option<(u8, f32)>| n.filter(|(flag, _)| *flag != INSIDE).map(|(_, t)| t);
        let axis = |prev: Option<f32>, next: Option<f32>| match (prev, next) {
            (Some(p), Some(n)) => (n - p) * 0.5,
            (Some(p), None) => here - p,
            (None, Some(n)) => n - here,
            (None, None) => 0.0,
        };
        let gx = axis(usable(self.flag_at(x - 1, y)), usable(self.flag_at(x + 1, y)));
        let gy = axis(usable(self.flag_at(x, y - 1)), usable(self.flag_at(x, y + 1)));
        (gx, gy)
    }

    fn fill(&mut self, index: usize, radius: isize) {
        let (x, y) = ((index % self.width) as isize, (index / self.width) as isize);
        let (gx, gy) = self.time_gradient(x, y);
        let t_here = self.time[index];
        let radius_sq = radius * radius;

        let mut sum = [0.0f32; 3];
        let mut total_weight = 0.0f32;

        for ny in (y - radius).max(0)..=(y + radius).min(self.height as isize - 1) {
            for nx in (x - radius).max(0)..=(x + radius).min(self.width as isize - 1) {
                let (dx, dy) = (x - nx, y - ny);
                let dist_sq = dx * dx + dy * dy;
                if dist_sq == 0 || dist_sq > radius_sq {
                    continue;
                }
                let n = ny as usize * self.width + nx as usize;
                if self.flags[n] == INSIDE {
                    continue;
                }

                let len_sq = dist_sq as f32;
                let mut direction = (dx as f32 * gx + dy as f32 * gy).abs();
                if direction <= 0.01 {
                    direction = 1.0e-6;
                }
                let geometric = 1.0 / (len_sq * len_sq.sqrt());
                let level = 1.0 / (1.0 + (self.time[n] - t_here).abs());
                let weight = direction * geometric * level;

                let value = self.pixels[n];
                for c in 0..3 {
                    sum[c] += weight * value[c];
                }
                total_weight += weight;
            }
        }

        if total_weight > 0.0 {
            self.pixels[index] = [
                sum[0] / total_weight,
                sum[1] / total_weight,
                sum[2] / total_weight,
            ];
        }
    }

    fn run(&mut self, radius: isize) {
        let mut heap = BinaryHeap::new();
        self.seed(&mut heap);

        while let Some(FrontPixel { index, .. }) = heap.pop() {
            if self.flags[index] == KNOWN {
                continue;
            }
            self.flags[index] = KNOWN;

            let neighbours: Vec<usize> = self.neighbours4(index).collect();
            for n in neighbours {
                if self.flags[n] != INSIDE {
                    continue;
                }
                let t = self.arrival_time(n);
                self.time[n] = t;
                self.fill(n, radius);
                self.flags[n] = BAND;
                heap.push(FrontPixel { time: t, index: n });
            }
        }
    }

    fn into_image(self, original: &RgbImage) -> RgbImage {
        let mut output = original.clone();
        for (pixel, value) in output.pixels_mut().zip(self.pixels) {
            for c in 0..3 {
                pixel[c] = value[c].round().clamp(0.0, 255.0) as u8;
            }
        }
        output
    }
}

/// Inpaint masked pixels by fast marching from the mask boundary
///
/// Pixels unreachable from any known pixel (a mask covering the whole image)
/// keep their original values. A mask whose size differs from the image
/// leaves the image unchanged.
#[must_use]
pub fn inpaint_telea(image: &RgbImage, mask: &GrayImage, radius: u32) -> RgbImage {
    if image.dimensions() != mask.dimensions() || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    if !mask.pixels().any(|p| p.0[0] > 0) {
        return image.clone();
    }

    let mut march = FastMarch::new(image, mask);
    march.run(radius.max(1) as isize);
    march.into_image(image)
}
