mod buckets;
mod fill;
mod interval;

pub use buckets::{bucket_labels, format_label};
pub use fill::{CountValue, SeriesPoint, fill, fill_cumulative};
pub use interval::{IntervalError, IntervalSpec, IntervalUnit};
