//! Peak detection with height, distance, prominence and width constraints
//!
//! Semantics follow the widely used `find_peaks` definition: local maxima
//! (flat tops resolve to their midpoint) filtered by height, then by minimum
//! distance keeping the highest peaks, then by prominence and width.

/// Constraints applied to candidate peaks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeakOptions {
    /// Minimum peak value
    pub height: Option<f64>,
    /// Minimum spacing in samples
    pub distance: Option<usize>,
    /// Minimum prominence
    pub prominence: Option<f64>,
    /// Minimum width in samples, measured at half prominence
    pub width: Option<f64>,
    /// Window length in samples bounding the prominence search
    pub wlen: Option<usize>,
}

/// Prominence and its bases for one peak
#[derive(Debug, Clone, Copy, PartialEq)]
struct Prominence {
    value: f64,
    left_base: usize,
    right_base: usize,
}

/// Indices of peaks in `signal` satisfying `options`, ascending
pub fn find_peaks(signal: &[f64], options: &PeakOptions) -> Vec<usize> {
    let mut peaks = local_maxima(signal);

    if let Some(height) = options.height {
        peaks.retain(|&p| signal[p] >= height);
    }

    if let Some(distance) = options.distance {
        if distance > 1 {
            peaks = select_by_distance(signal, &peaks, distance);
        }
    }

    if options.prominence.is_some() || options.width.is_some() {
        let prominences: Vec<Prominence> = peaks
            .iter()
            .map(|&p| prominence(signal, p, options.wlen))
            .collect();

        let keep: Vec<bool> = peaks
            .iter()
            .zip(&prominences)
            .map(|(&p, prom)| {
                let prominent = options.prominence.map_or(true, |min| prom.value >= min);
                let wide = options
                    .width
                    .map_or(true, |min| width(signal, p, prom) >= min);
                prominent && wide
            })
            .collect();

        peaks = peaks
            .into_iter()
            .zip(keep)
            .filter_map(|(p, k)| k.then_some(p))
            .collect();
    }

    peaks
}

/// Local maxima; plateaus report their (left-biased) midpoint
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;

    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                let right = ahead - 1;
                peaks.push((i + right) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }

    peaks
}

/// Drop peaks closer than `distance` to a higher one, highest first.
///
/// `peaks` must be ascending.
pub(crate) fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let n = peaks.len();
    let mut keep = vec![true; n];

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < n && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

fn prominence(x: &[f64], peak: usize, wlen: Option<usize>) -> Prominence {
    let mut i_min = 0usize;
    let mut i_max = x.len() - 1;
    if let Some(wlen) = wlen.filter(|w| *w >= 2) {
        let half = wlen / 2;
        i_min = peak.saturating_sub(half);
        i_max = (peak + half).min(i_max);
    }

    let height = x[peak];

    let mut left_base = peak;
    let mut left_min = height;
    let mut i = peak as isize;
    while i >= i_min as isize && x[i as usize] <= height {
        if x[i as usize] < left_min {
            left_min = x[i as usize];
            left_base = i as usize;
        }
        i -= 1;
    }

    let mut right_base = peak;
    let mut right_min = height;
    let mut i = peak;
    while i <= i_max && x[i] <= height {
        if x[i] < right_min {
            right_min = x[i];
            right_base = i;
        }
        i += 1;
    }

    Prominence {
        value: height - left_min.max(right_min),
        left_base,
        right_base,
    }
}

/// Width at half prominence with linear interpolation of the crossings
fn width(x: &[f64], peak: usize, prom: &Prominence) -> f64 {
    let height = x[peak] - prom.value * 0.5;

    let mut i = peak;
    while prom.left_base < i && height < x[i] {
        i -= 1;
    }
    let mut left = i as f64;
    if x[i] < height && i + 1 < x.len() {
        left += (height - x[i]) / (x[i + 1] - x[i]);
    }

    let mut i = peak;
    while i < prom.right_base && height < x[i] {
        i += 1;
    }
    let mut right = i as f64;
    if x[i] < height && i > 0 {
        right -= (height - x[i]) / (x[i - 1] - x[i]);
    }

    right - left
}
