use chrono::{DateTime, Datelike, Utc};

/// NBA season label for a tip-off time. Seasons start in October, so
/// anything from September on belongs to the season that starts that year.
pub fn season_for(date: DateTime<Utc>) -> String {
    let start_year = if date.month() >= 9 { date.year() } else { date.year() - 1 };
    format!("{}-{:02}", start_year, (start_year + 1) % 100)
}

/// American price with an explicit plus sign for underdogs.
pub fn format_american(price: i64) -> String {
    if price > 0 {
        format!("+{}", price)
    } else {
        price.to_string()
    }
}

/// Signed percentage, e.g. "+4.25%"
pub fn format_signed_pct(pct: f64) -> String {
    format!("{:+.2}%", pct)
}

pub fn format_money(amount: f64) -> String {
    format!("${:.2}", amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_season_for() {
        assert_eq!(season_for(Utc.with_ymd_and_hms(2025, 10, 22, 0, 0, 0).unwrap()), "2025-26");
        assert_eq!(season_for(Utc.with_ymd_and_hms(2026, 4, 10, 0, 0, 0).unwrap()), "2025-26");
        assert_eq!(season_for(Utc.with_ymd_and_hms(2099, 12, 1, 0, 0, 0).unwrap()), "2099-00");
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_american(150), "+150");
        assert_eq!(format_american(-110), "-110");
        assert_eq!(format_signed_pct(4.25), "+4.25%");
        assert_eq!(format_signed_pct(-1.5), "-1.50%");
        assert_eq!(format_money(25.0), "$25.00");
    }
}
