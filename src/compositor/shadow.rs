//! Shadow generation
//!
//! A drop shadow is a solid rectangle convolved with a Gaussian kernel. The
//! kernel is built once per radius together with a 2D prefix-sum table, so
//! the coverage of any kernel sub-rectangle is an O(1) lookup.
//!
//! The rendered image only has four kinds of pixels, which is what keeps
//! large shadows cheap:
//!
//! ```text
//!          -r     r      width-r  width+r
//!        -r +-----+---------+-----+
//!           |  1  |    2    |  1  |
//!         r +-----+---------+-----+
//!           |  2  |    3    |  2  |
//!  height-r +-----+---------+-----+
//!           |  1  |    2    |  1  |
//!  height+r +-----+---------+-----+
//! ```
//!
//! Corners (1) are one tile mirrored four times, edges (2) are constant along
//! their length and the interior (3) is fully covered.

use tracing::trace;

/// Normalised Gaussian kernel of odd size `2 * radius + 1`
#[derive(Debug, Clone)]
pub struct GaussianKernel {
    size: usize,
    #[cfg(test)]
    data: Vec<f64>,
    /// `rsum[y * size + x]` is the sum of all weights in `[0..=x] x [0..=y]`
    rsum: Vec<f64>,
}

impl GaussianKernel {
    /// Build the kernel for `radius`; a non-positive radius has no kernel.
    pub fn build(radius: i32) -> Option<Self> {
        if radius <= 0 {
            return None;
        }
        let r = radius as f64;
        let size = radius as usize * 2 + 1;
        let center = (size / 2) as f64;
        let sigma = r / 3.0;

        let mut data = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                data.push(gaussian(sigma, x as f64 - center, y as f64 - center));
            }
        }
        let total: f64 = data.iter().sum();
        for v in &mut data {
            *v /= total;
        }

        let mut rsum = vec![0.0; size * size];
        for y in 0..size {
            let mut row = 0.0;
            for x in 0..size {
                row += data[y * size + x];
                let above = if y > 0 { rsum[(y - 1) * size + x] } else { 0.0 };
                rsum[y * size + x] = row + above;
            }
        }

        Some(Self {
            size,
            #[cfg(test)]
            data,
            rsum,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn radius(&self) -> usize {
        self.size / 2
    }

    #[cfg(test)]
    pub fn weight(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.size + x]
    }

    #[cfg(test)]
    pub fn total(&self) -> f64 {
        self.rsum[self.size * self.size - 1]
    }

    fn prefix(&self, x: i64, y: i64) -> f64 {
        if x < 0 || y < 0 {
            return 0.0;
        }
        self.rsum[y as usize * self.size + x as usize]
    }

    /// Sum of the weights inside `[x, x + width) x [y, y + height)`,
    /// clipped to the kernel.
    pub fn sum_rect(&self, x: i64, y: i64, width: i64, height: i64) -> f64 {
        let d = self.size as i64;
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + width).min(d) - 1;
        let y1 = (y + height).min(d) - 1;
        if x0 > x1 || y0 > y1 {
            return 0.0;
        }
        self.prefix(x1, y1) - self.prefix(x0 - 1, y1) - self.prefix(x1, y0 - 1)
            + self.prefix(x0 - 1, y0 - 1)
    }
}

fn gaussian(sigma: f64, x: f64, y: f64) -> f64 {
    (-(x * x + y * y) / (2.0 * sigma * sigma)).exp() / (2.0 * std::f64::consts::PI * sigma * sigma)
}

/// 8-bit alpha image, rows packed without padding
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShadowImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ShadowImage {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }
}

/// Renders shadow masks for a fixed radius
#[derive(Debug, Clone)]
pub struct ShadowGenerator {
    kernel: Option<GaussianKernel>,
}

impl ShadowGenerator {
    pub fn new(radius: i32) -> Self {
        Self {
            kernel: GaussianKernel::build(radius),
        }
    }

    #[cfg(test)]
    pub fn kernel(&self) -> Option<&GaussianKernel> {
        self.kernel.as_ref()
    }

    /// Extra pixels the shadow adds on each side of the window
    pub fn radius(&self) -> i32 {
        self.kernel.as_ref().map_or(0, |k| k.radius() as i32)
    }

    /// Output size of a shadow for a `width x height` window
    pub fn shadow_size(&self, width: u32, height: u32) -> (u32, u32) {
        if self.kernel.is_none() || width == 0 || height == 0 {
            return (0, 0);
        }
        let r = self.radius() as u32;
        (width + r * 2, height + r * 2)
    }

    /// Render the soft shadow of a `width x height` rectangle at `opacity`.
    ///
    /// Returns an empty image when there is no kernel or nothing to shade.
    pub fn render_shadow(&self, opacity: f64, width: u32, height: u32) -> ShadowImage {
        let Some(kernel) = self.kernel.as_ref() else {
            return ShadowImage::default();
        };
        if width == 0 || height == 0 {
            return ShadowImage::default();
        }

        let opacity = opacity.clamp(0.0, 1.0);
        let d = kernel.size() as i64;
        let r = d / 2;
        let (width, height) = (width as i64, height as i64);
        let swidth = width + r * 2;
        let sheight = height + r * 2;
        let stride = swidth as usize;
        let mut data = vec![0u8; stride * sheight as usize];
        let alpha = |sum: f64| (sum * opacity * 255.0).clamp(0.0, 255.0) as u8;
        let idx = |x: i64, y: i64| y as usize * stride + x as usize;

        trace!("rendering {}x{} shadow (radius {})", swidth, sheight, r);

        if width < r * 2 && height < r * 2 {
            // Window smaller than the kernel in both directions
            for y in 0..sheight {
                for x in 0..swidth {
                    data[idx(x, y)] = alpha(kernel.sum_rect(d - x - 1, d - y - 1, width, height));
                }
            }
        } else if height < r * 2 {
            for y in 0..sheight {
                for x in 0..r * 2 {
                    let v = alpha(kernel.sum_rect(d - x - 1, d - y - 1, d, height));
                    data[idx(x, y)] = v;
                    data[idx(swidth - x - 1, y)] = v;
                }
                let v = alpha(kernel.sum_rect(0, d - y - 1, d, height));
                data[idx(r * 2, y)..idx(swidth - r * 2, y)].fill(v);
            }
        } else if width < r * 2 {
            for y in 0..r * 2 {
                for x in 0..swidth {
                    let v = alpha(kernel.sum_rect(d - x - 1, d - y - 1, width, d));
                    data[idx(x, y)] = v;
                    data[idx(x, sheight - y - 1)] = v;
                }
            }
            for x in 0..swidth {
                let v = alpha(kernel.sum_rect(d - x - 1, 0, width, d));
                for y in r * 2..height {
                    data[idx(x, y)] = v;
                }
            }
        } else {
            // Interior
            let full = alpha(1.0);
            for y in r * 2..height {
                data[idx(r * 2, y)..idx(width, y)].fill(full);
            }

            // Corner tile, mirrored
            for y in 0..r * 2 {
                for x in 0..r * 2 {
                    let v = alpha(kernel.prefix(x, y));
                    data[idx(x, y)] = v;
                    data[idx(x, sheight - y - 1)] = v;
                    data[idx(swidth - x - 1, sheight - y - 1)] = v;
                    data[idx(swidth - x - 1, y)] = v;
                }
            }

            // Top and bottom edges
            for y in 0..r * 2 {
                let v = alpha(kernel.prefix(d - 1, y));
                data[idx(r * 2, y)..idx(swidth - r * 2, y)].fill(v);
                let by = sheight - y - 1;
                data[idx(r * 2, by)..idx(swidth - r * 2, by)].fill(v);
            }

            // Left and right edges
            for x in 0..r * 2 {
                let v = alpha(kernel.prefix(x, d - 1));
                for y in r * 2..height {
                    data[idx(x, y)] = v;
                    data[idx(swidth - x - 1, y)] = v;
                }
            }
        }

        ShadowImage {
            width: swidth as u32,
            height: sheight as u32,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plain O(r^2) convolution of the padded solid rectangle
    fn brute_force(shadows: &ShadowGenerator, opacity: f64, width: i64, height: i64) -> Vec<u8> {
        let k = shadows.kernel().unwrap();
        let d = k.size() as i64;
        let r = d / 2;
        let (sw, sh) = (width + 2 * r, height + 2 * r);
        let mut out = Vec::new();
        for y in 0..sh {
            for x in 0..sw {
                let mut sum = 0.0;
                for j in 0..d {
                    for i in 0..d {
                        let px = x + i - 2 * r;
                        let py = y + j - 2 * r;
                        if px >= 0 && px < width && py >= 0 && py < height {
                            sum += k.weight(i as usize, j as usize);
                        }
                    }
                }
                out.push((sum * opacity * 255.0).clamp(0.0, 255.0) as u8);
            }
        }
        out
    }

    fn assert_close(fast: &[u8], slow: &[u8]) {
        assert_eq!(fast.len(), slow.len());
        for (i, (a, b)) in fast.iter().zip(slow).enumerate() {
            assert!((*a as i32 - *b as i32).abs() <= 1, "pixel {} differs: {} vs {}", i, a, b);
        }
    }

    #[test]
    fn kernel_is_normalised() {
        for radius in [1, 3, 12, 40] {
            let k = GaussianKernel::build(radius).unwrap();
            let sum: f64 = (0..k.size())
                .flat_map(|y| (0..k.size()).map(move |x| (x, y)))
                .map(|(x, y)| k.weight(x, y))
                .sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert!((k.total() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn non_positive_radius_is_a_noop() {
        assert!(GaussianKernel::build(0).is_none());
        assert!(GaussianKernel::build(-4).is_none());
        let shadows = ShadowGenerator::new(0);
        assert!(shadows.render_shadow(1.0, 100, 100).is_empty());
        assert_eq!(shadows.shadow_size(100, 100), (0, 0));
    }

    #[test]
    fn output_grows_by_twice_the_radius() {
        let shadows = ShadowGenerator::new(12);
        let img = shadows.render_shadow(0.75, 200, 100);
        assert_eq!((img.width, img.height), (224, 124));
        assert_eq!(img.data.len(), 224 * 124);
        assert_eq!(shadows.shadow_size(200, 100), (224, 124));
    }

    #[test]
    fn rendering_is_deterministic() {
        let shadows = ShadowGenerator::new(7);
        let a = shadows.render_shadow(0.6, 90, 45);
        let b = ShadowGenerator::new(7).render_shadow(0.6, 90, 45);
        assert_eq!(a, b);
    }

    #[test]
    fn tiled_rendering_matches_direct_convolution() {
        let shadows = ShadowGenerator::new(4);
        for (w, h) in [(40, 30), (5, 30), (40, 5), (3, 4)] {
            let img = shadows.render_shadow(0.8, w, h);
            assert_close(&img.data, &brute_force(&shadows, 0.8, w as i64, h as i64));
        }
    }

    #[test]
    fn interior_is_fully_covered_and_corners_are_symmetric() {
        let shadows = ShadowGenerator::new(6);
        let img = shadows.render_shadow(1.0, 60, 40);
        assert_eq!(img.pixel(img.width / 2, img.height / 2), 255);
        let (w, h) = (img.width, img.height);
        for (x, y) in [(0, 0), (3, 5), (11, 2)] {
            let v = img.pixel(x, y);
            assert_eq!(v, img.pixel(w - 1 - x, y));
            assert_eq!(v, img.pixel(x, h - 1 - y));
            assert_eq!(v, img.pixel(w - 1 - x, h - 1 - y));
        }
        assert!(img.pixel(0, 0) < img.pixel(12, 12));
    }
}
