//! Butterworth band-pass filtering
//!
//! Filters are designed as cascaded second-order sections (biquads) via the
//! bilinear transform and applied forward-backward for zero phase.

use num_complex::Complex64;
use std::f64::consts::PI;

/// One second-order section, `a0` normalized to 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    /// `[a1, a2]`
    pub a: [f64; 2],
}

impl Biquad {
    /// Response at `z`
    fn response(&self, z: Complex64) -> Complex64 {
        let z1 = z.inv();
        let z2 = z1 * z1;
        let num = self.b[0] + z1 * self.b[1] + z2 * self.b[2];
        let den = Complex64::new(1.0, 0.0) + z1 * self.a[0] + z2 * self.a[1];
        num / den
    }

    fn dc_gain(&self) -> f64 {
        let den = 1.0 + self.a[0] + self.a[1];
        if den.abs() < f64::EPSILON {
            0.0
        } else {
            (self.b[0] + self.b[1] + self.b[2]) / den
        }
    }

    /// Steady-state delay line for a unit step input
    fn step_state(&self) -> [f64; 2] {
        let g = self.dc_gain();
        let z2 = self.b[2] - self.a[1] * g;
        let z1 = self.b[1] - self.a[0] * g + z2;
        [z1, z2]
    }
}

/// Cascade of second-order sections
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<Biquad>,
}

impl SosFilter {
    /// Butterworth band-pass of the given prototype order.
    ///
    /// Returns `None` when the band does not fit strictly between 0 and Nyquist.
    pub fn butter_bandpass(order: usize, low: f64, high: f64, sampling_rate: f64) -> Option<Self> {
        let nyquist = sampling_rate / 2.0;
        if order == 0 || !(low > 0.0 && low < high && high < nyquist) {
            return None;
        }

        // Pre-warped analog band edges
        let k = 2.0 * sampling_rate;
        let w1 = k * (PI * low / sampling_rate).tan();
        let w2 = k * (PI * high / sampling_rate).tan();
        let bw = w2 - w1;
        let w0_sq = w1 * w2;

        let mut upper = Vec::new();
        let mut real = Vec::new();
        for i in 0..order {
            let theta = PI * (2 * i + 1 + order) as f64 / (2 * order) as f64;
            let p = Complex64::from_polar(1.0, theta);
            let half = p * (bw / 2.0);
            let disc = (half * half - w0_sq).sqrt();
            for s in [half + disc, half - disc] {
                let z = (k + s) / (k - s);
                if z.im > 1e-12 {
                    upper.push(z);
                } else if z.im.abs() <= 1e-12 {
                    real.push(z.re);
                }
            }
        }

        let mut sections: Vec<Biquad> = upper
            .iter()
            .map(|z| Biquad {
                b: [1.0, 0.0, -1.0],
                a: [-2.0 * z.re, z.norm_sqr()],
            })
            .collect();
        for pair in real.chunks(2) {
            let (r1, r2) = (pair[0], pair.get(1).copied().unwrap_or(0.0));
            sections.push(Biquad {
                b: [1.0, 0.0, -1.0],
                a: [-(r1 + r2), r1 * r2],
            });
        }

        // Unit gain at the band centre
        let center = 2.0 * (w0_sq.sqrt() / k).atan();
        let z = Complex64::from_polar(1.0, center);
        let gain = sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z))
            .norm();
        if !gain.is_finite() || gain <= 0.0 {
            return None;
        }
        if let Some(first) = sections.first_mut() {
            for coeff in first.b.iter_mut() {
                *coeff /= gain;
            }
        }

        Some(Self { sections })
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Magnitude response at `freq` Hz
    pub fn magnitude(&self, freq: f64, sampling_rate: f64) -> f64 {
        let z = Complex64::from_polar(1.0, 2.0 * PI * freq / sampling_rate);
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z))
            .norm()
    }

    /// Edge padding used by [`SosFilter::filtfilt`]
    pub fn pad_len(&self) -> usize {
        3 * (2 * self.sections.len() + 1)
    }

    /// Causal filtering, starting from `state` scaled per section
    fn run(&self, signal: &[f64], initial: f64) -> Vec<f64> {
        let mut out = signal.to_vec();
        let mut scale = initial;
        for section in &self.sections {
            let [mut z1, mut z2] = section.step_state();
            z1 *= scale;
            z2 *= scale;
            for sample in out.iter_mut() {
                let x = *sample;
                let y = section.b[0] * x + z1;
                z1 = section.b[1] * x - section.a[0] * y + z2;
                z2 = section.b[2] * x - section.a[1] * y;
                *sample = y;
            }
            scale *= section.dc_gain();
        }
        out
    }

    /// Zero-phase forward-backward filtering with odd-extension padding.
    ///
    /// Returns `None` if the signal is not longer than the padding.
    pub fn filtfilt(&self, signal: &[f64]) -> Option<Vec<f64>> {
        let pad = self.pad_len();
        let n = signal.len();
        if n <= pad {
            return None;
        }

        let first = signal[0];
        let last = signal[n - 1];
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        ext.extend_from_slice(signal);
        ext.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));

        let forward = self.run(&ext, ext[0]);
        let mut reversed: Vec<f64> = forward.into_iter().rev().collect();
        let start = reversed[0];
        reversed = self.run(&reversed, start);
        reversed.reverse();

        Some(reversed[pad..pad + n].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, fs: f64, secs: f64) -> Vec<f64> {
        (0..(fs * secs) as usize)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn test_invalid_band_rejected() {
        assert!(SosFilter::butter_bandpass(3, 5.0, 35.0, 50.0).is_none());
        assert!(SosFilter::butter_bandpass(3, 10.0, 5.0, 256.0).is_none());
        assert!(SosFilter::butter_bandpass(0, 5.0, 35.0, 256.0).is_none());
    }

    #[test]
    fn test_section_count_matches_order() {
        for order in 1..=5 {
            let filter = SosFilter::butter_bandpass(order, 5.0, 35.0, 256.0).unwrap();
            assert_eq!(filter.sections().len(), order);
        }
    }

    #[test]
    fn test_magnitude_response_shape() {
        let fs = 256.0;
        let filter = SosFilter::butter_bandpass(3, 5.0, 35.0, fs).unwrap();
        let center = (5.0f64 * 35.0).sqrt();
        // bilinear mapping keeps the geometric centre of the warped band
        assert!((filter.magnitude(center, fs) - 1.0).abs() < 0.05);
        assert!(filter.magnitude(0.5, fs) < 0.01);
        assert!(filter.magnitude(100.0, fs) < 0.1);
        // -3 dB at the band edges
        assert!((filter.magnitude(5.0, fs) - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.02);
        assert!((filter.magnitude(35.0, fs) - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.02);
    }

    #[test]
    fn test_filtfilt_passes_in_band_and_removes_dc() {
        let fs = 256.0;
        let filter = SosFilter::butter_bandpass(3, 5.0, 35.0, fs).unwrap();
        let signal: Vec<f64> = sine(15.0, fs, 4.0).iter().map(|v| v + 10.0).collect();
        let out = filter.filtfilt(&signal).unwrap();
        assert_eq!(out.len(), signal.len());

        // Steady-state middle section: DC gone, sine preserved in phase
        for i in 256..768 {
            let expected = signal[i] - 10.0;
            assert!((out[i] - expected).abs() < 0.1, "sample {i}: {} vs {}", out[i], expected);
        }
    }

    #[test]
    fn test_filtfilt_too_short() {
        let filter = SosFilter::butter_bandpass(3, 5.0, 35.0, 256.0).unwrap();
        assert!(filter.filtfilt(&[0.0; 21]).is_none());
        assert!(filter.filtfilt(&[0.0; 22]).is_some());
    }
}
