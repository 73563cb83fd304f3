mod aggregate;
mod bucket;

pub use aggregate::{aggregate_daily, filter_range, range_bounds, DailyAggregate};
pub use bucket::{bucket, bucket_key, Granularity};
