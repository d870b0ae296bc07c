//! Signal processing primitives
//!
//! Band-pass filtering, peak detection and robust statistics shared by the
//! cardiac, respiratory and oximetry analyzers.

pub mod filter;
pub mod peaks;
pub mod stats;

pub use filter::{Biquad, SosFilter};
pub use peaks::{find_peaks, PeakOptions};
pub use stats::{
    iqr_bounds, iqr_trim, mean, median, median_filter, percentile, sample_std_dev, std_dev,
};
