//! Gaussian-tapered checkerboard kernel

/// Checkerboard kernel of half-width K
///
/// Offsets run over `[-K, K)` on both axes. Offsets `< 0` lie before the
/// candidate boundary, offsets `>= 0` after it. Same-side pairs carry a
/// positive sign, cross pairs a negative one; the magnitude is a separable
/// Gaussian taper with σ = K / 2 centred on the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckerboardKernel {
    half_width: usize,
    taper: Vec<f32>,
}

impl CheckerboardKernel {
    /// Build a kernel; `half_width` is clamped to at least 1
    pub fn new(half_width: usize) -> Self {
        let k = half_width.max(1);
        let sigma = k as f32 / 2.0;
        let denom = 2.0 * sigma * sigma;
        // Taper over one axis; offsets are measured from the gap between
        // index -1 and index 0, hence the half-step.
        let taper = (0..2 * k)
            .map(|idx| {
                let x = idx as f32 - k as f32 + 0.5;
                (-(x * x) / denom).exp()
            })
            .collect();
        Self {
            half_width: k,
            taper,
        }
    }

    /// Half-width K in matrix indices
    pub fn half_width(&self) -> usize {
        self.half_width
    }

    /// Signed kernel weight at offsets `(u, v)`, both in `[-K, K)`
    pub fn weight(&self, u: isize, v: isize) -> f32 {
        let k = self.half_width as isize;
        if u < -k || u >= k || v < -k || v >= k {
            return 0.0;
        }
        let magnitude = self.taper[(u + k) as usize] * self.taper[(v + k) as usize];
        if (u < 0) == (v < 0) {
            magnitude
        } else {
            -magnitude
        }
    }

    /// Novelty at matrix position `center` (boundary just before index `center`)
    ///
    /// Computed over the part of the kernel that falls inside the matrix: the
    /// taper-weighted mean of same-side similarities minus the taper-weighted
    /// mean of cross-side similarities. Zero when either side is empty, so the
    /// first index never reports novelty.
    pub(crate) fn response(&self, data: impl Fn(usize, usize) -> f32, size: usize, center: usize) -> f32 {
        let k = self.half_width as isize;
        let c = center as isize;
        let lo = (-k).max(-c);
        let hi = k.min(size as isize - c);
        if lo >= 0 || hi <= 0 {
            return 0.0;
        }

        let mut same_sum = 0.0f64;
        let mut same_w = 0.0f64;
        let mut cross_sum = 0.0f64;
        let mut cross_w = 0.0f64;
        for u in lo..hi {
            let row = (c + u) as usize;
            for v in lo..hi {
                let w = self.weight(u, v) as f64;
                let s = data(row, (c + v) as usize) as f64;
                if w > 0.0 {
                    same_sum += w * s;
                    same_w += w;
                } else {
                    cross_sum -= w * s;
                    cross_w -= w;
                }
            }
        }
        if same_w <= 0.0 || cross_w <= 0.0 {
            return 0.0;
        }
        (same_sum / same_w - cross_sum / cross_w) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_pattern() {
        let kernel = CheckerboardKernel::new(3);
        assert!(kernel.weight(-1, -2) > 0.0);
        assert!(kernel.weight(0, 2) > 0.0);
        assert!(kernel.weight(-1, 0) < 0.0);
        assert!(kernel.weight(1, -3) < 0.0);
        assert_eq!(kernel.weight(3, 0), 0.0);
    }

    #[test]
    fn test_taper_peaks_at_center() {
        let kernel = CheckerboardKernel::new(4);
        assert!(kernel.weight(0, 0) > kernel.weight(3, 3));
        assert!((kernel.weight(-1, -1) - kernel.weight(0, 0)).abs() < 1e-6);
    }

    #[test]
    fn test_zero_half_width_is_clamped() {
        assert_eq!(CheckerboardKernel::new(0).half_width(), 1);
    }

    #[test]
    fn test_response_on_two_blocks() {
        // 6x6 block diagonal: indices 0..3 and 3..6
        let sim = |i: usize, j: usize| if (i < 3) == (j < 3) { 1.0 } else { 0.0 };
        let kernel = CheckerboardKernel::new(2);
        assert!((kernel.response(sim, 6, 3) - 1.0).abs() < 1e-6);
        assert!(kernel.response(sim, 6, 1).abs() < 1e-6);
        assert_eq!(kernel.response(sim, 6, 0), 0.0);
    }

    #[test]
    fn test_response_matches_signed_weights() {
        // Full support: the response is the weighted same-side mean minus the
        // weighted cross-side mean, read straight off `weight`
        let sim = |i: usize, j: usize| 1.0 / (1.0 + (i as f32 - j as f32).abs());
        let kernel = CheckerboardKernel::new(3);
        let (size, center) = (12usize, 6isize);
        let (mut same, mut same_w, mut cross, mut cross_w) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
        for u in -3..3isize {
            for v in -3..3isize {
                let w = kernel.weight(u, v) as f64;
                let s = sim((center + u) as usize, (center + v) as usize) as f64;
                if w > 0.0 {
                    same += w * s;
                    same_w += w;
                } else {
                    cross += -w * s;
                    cross_w += -w;
                }
            }
        }
        let expected = (same / same_w - cross / cross_w) as f32;
        assert!((kernel.response(sim, size, center as usize) - expected).abs() < 1e-6);
        assert!(expected > 0.0);
    }
}
