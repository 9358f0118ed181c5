//! Club season derivation.
//!
//! A club season is a label like `"23/24"` computed from a start date and a
//! user-configured season window. Dates on or after the window start belong
//! to the season that begins that year; earlier dates belong to the season
//! that began the year before.

use chrono::{Datelike, NaiveDate};

/// Default season window start (`MM-DD`) when the user has not configured one.
pub const DEFAULT_CLUB_SEASON_START: &str = "10-01";

fn parse_month_day(value: &str) -> Option<(u32, u32)> {
    let (month, day) = value.split_once('-')?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    if (1..=12).contains(&month) && (1..=31).contains(&day) {
        Some((month, day))
    } else {
        None
    }
}

/// Derive the club-season label for a `YYYY-MM-DD` start date.
///
/// Returns `None` when the date does not parse; an unparseable window start
/// falls back to [`DEFAULT_CLUB_SEASON_START`].
pub fn club_season_label(start_date: &str, window_start: Option<&str>) -> Option<String> {
    let date = NaiveDate::parse_from_str(start_date.trim(), "%Y-%m-%d").ok()?;
    let (boundary_month, boundary_day) = window_start
        .and_then(parse_month_day)
        .or_else(|| parse_month_day(DEFAULT_CLUB_SEASON_START))?;

    let year = date.year();
    let opening_year = if (date.month(), date.day()) >= (boundary_month, boundary_day) {
        year
    } else {
        year - 1
    };
    Some(format!(
        "{:02}/{:02}",
        opening_year.rem_euclid(100),
        (opening_year + 1).rem_euclid(100)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_after_window_start_opens_the_season() {
        assert_eq!(
            club_season_label("2023-10-15", None).as_deref(),
            Some("23/24")
        );
    }

    #[test]
    fn date_before_window_start_belongs_to_previous_season() {
        assert_eq!(
            club_season_label("2024-03-02", None).as_deref(),
            Some("23/24")
        );
    }

    #[test]
    fn custom_window_start_is_honored() {
        assert_eq!(
            club_season_label("2024-03-02", Some("01-01")).as_deref(),
            Some("24/25")
        );
    }

    #[test]
    fn century_wraparound() {
        assert_eq!(
            club_season_label("2099-11-01", None).as_deref(),
            Some("99/00")
        );
    }

    #[test]
    fn unparseable_date_yields_none() {
        assert_eq!(club_season_label("not-a-date", None), None);
        assert_eq!(club_season_label("", None), None);
    }
}
