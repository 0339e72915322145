//! Partition date math.
//!
//! Yearly partitions span `[Jan 1 year, Jan 1 year+1)`. The latest
//! partition spans from the last successful full update to the start of
//! the current run and is computed by the update service, not here.

use chrono::{Datelike, NaiveDate, Utc};

/// Inclusive start date of a yearly partition.
pub fn partition_start(year: i32) -> NaiveDate {
    // Jan 1 exists for every year
    NaiveDate::from_ymd_opt(year, 1, 1).expect("valid partition start date")
}

/// Exclusive end date of a yearly partition.
pub fn partition_end(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year + 1, 1, 1).expect("valid partition end date")
}

/// Restrict a sorted list of data years to the last N years counting
/// backwards from the current year. `None` keeps all years.
pub fn restrict_years(mut years: Vec<i32>, last_years: Option<u32>) -> Vec<i32> {
    years.sort_unstable();
    years.dedup();

    let Some(last_years) = last_years else {
        return years;
    };

    let current_year = Utc::now().year();
    let earliest = current_year - last_years as i32 + 1;
    years.into_iter().filter(|y| *y >= earliest).collect()
}
