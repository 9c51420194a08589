//! Timezone-aware "start of day" boundary used for daily buyer quotas
//! (§4.2, §8 "Daily counter boundary").

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// `00:00:00` in `tz`, inclusive, for the day containing `now`, expressed
/// back in UTC for comparison against `Transaction.createdAt`.
pub fn start_of_day(now: DateTime<Utc>, tz_name: &str) -> DateTime<Utc> {
    let tz = Tz::from_str(tz_name).unwrap_or(Tz::UTC);
    let local = now.with_timezone(&tz);
    let midnight = local.date_naive().and_hms_opt(0, 0, 0).expect("valid midnight");
    tz.from_local_datetime(&midnight).earliest().unwrap_or(local).with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn boundary_separates_adjacent_seconds_across_midnight() {
        // 2024-03-01 23:59:59 and 2024-03-02 00:00:01 in America/New_York.
        let before = Utc.with_ymd_and_hms(2024, 3, 2, 4, 59, 59).unwrap(); // 23:59:59 EST
        let after = Utc.with_ymd_and_hms(2024, 3, 2, 5, 0, 1).unwrap(); // 00:00:01 EST
        let tz = "America/New_York";
        assert_ne!(start_of_day(before, tz), start_of_day(after, tz));
    }

    #[test]
    fn unknown_timezone_falls_back_to_utc() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        let start = start_of_day(now, "Not/ARealZone");
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());
    }
}
