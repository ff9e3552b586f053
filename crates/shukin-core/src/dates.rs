use anyhow::{Context, anyhow};
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;

pub const DEFAULT_TIMEZONE: &str = "Asia/Tokyo";

const WEEKDAY_LABELS: [&str; 7] = ["日", "月", "火", "水", "木", "金", "土"];

pub fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        tracing::warn!(source, "timezone source was empty");
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(err) => {
            tracing::error!(
                source,
                timezone = %trimmed,
                error = %err,
                "failed to parse timezone id"
            );
            None
        }
    }
}

pub fn resolve_timezone(raw: Option<&str>) -> Tz {
    if let Some(raw) = raw
        && let Some(tz) = parse_timezone(raw, "config")
    {
        return tz;
    }
    parse_timezone(DEFAULT_TIMEZONE, "default").unwrap_or(chrono_tz::UTC)
}

pub fn today(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_expr(input: &str, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();

    match lower.as_str() {
        "today" => return Ok(today),
        "tomorrow" => return Ok(add_days(today, 1)),
        "yesterday" => return Ok(add_days(today, -1)),
        _ => {}
    }

    let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d{1,4})(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
    if let Some(caps) = rel_re.captures(&lower) {
        let amount: i64 = caps["num"].parse().context("invalid relative amount")?;
        let days = if &caps["unit"] == "w" { amount * 7 } else { amount };
        let signed = if &caps["sign"] == "-" { -days } else { days };
        return Ok(add_days(today, signed));
    }

    let slash_re = Regex::new(r"^(?P<year>\d{4})/(?P<month>\d{1,2})/(?P<day>\d{1,2})$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
    if let Some(caps) = slash_re.captures(token) {
        let year: i32 = caps["year"].parse().context("invalid year")?;
        let month: u32 = caps["month"].parse().context("invalid month")?;
        let day: u32 = caps["day"].parse().context("invalid day")?;
        return NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| anyhow!("invalid calendar date: {token}"));
    }

    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .with_context(|| format!("unrecognized date expression: {token}"))
}

pub fn format_creation_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.year(), date.month(), date.day())
}

pub fn month_label(date: NaiveDate) -> String {
    date.format("%Y年%m月").to_string()
}

pub fn week_label(start: NaiveDate, end: NaiveDate) -> String {
    format!("{}〜{}", start.format("%m月%d日"), end.format("%m月%d日"))
}

pub fn day_label(date: NaiveDate) -> String {
    format!(
        "{}({})",
        date.format("%Y年%m月%d日"),
        weekday_label(date.weekday())
    )
}

pub fn weekday_label(day: Weekday) -> &'static str {
    WEEKDAY_LABELS[day.num_days_from_sunday() as usize]
}

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days)).unwrap_or(date)
}

/// Shifts by whole calendar months, clamping the day to the target month's
/// length (Jan 31 + 1 month is Feb 28/29).
pub fn shift_months(date: NaiveDate, months: i32) -> NaiveDate {
    let mut year = date.year();
    let mut month = date.month() as i32 + months;

    while month < 1 {
        month += 12;
        year = year.saturating_sub(1);
    }
    while month > 12 {
        month -= 12;
        year = year.saturating_add(1);
    }

    let month = month as u32;
    let day = date.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(date)
}

pub fn first_day_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month >= 12 {
        (year.saturating_add(1), 1_u32)
    } else {
        (year, month + 1)
    };
    add_days(first_day_of_month(next_year, next_month), -1)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    last_day_of_month(year, month).day()
}

/// Sunday-anchored week start.
pub fn start_of_week(day: NaiveDate) -> NaiveDate {
    add_days(day, -i64::from(day.weekday().num_days_from_sunday()))
}

pub fn end_of_week(day: NaiveDate) -> NaiveDate {
    add_days(start_of_week(day), 6)
}

pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{
        day_label, days_in_month, end_of_week, format_creation_date, month_label,
        parse_date_expr, shift_months, start_of_week, week_label,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn parses_keywords_and_relative_offsets() {
        let today = date(2025, 3, 25);
        assert_eq!(parse_date_expr("today", today).expect("today"), today);
        assert_eq!(
            parse_date_expr("Tomorrow", today).expect("tomorrow"),
            date(2025, 3, 26)
        );
        assert_eq!(parse_date_expr("+2w", today).expect("+2w"), date(2025, 4, 8));
        assert_eq!(parse_date_expr("-3d", today).expect("-3d"), date(2025, 3, 22));
    }

    #[test]
    fn parses_iso_and_slash_dates() {
        let today = date(2025, 3, 25);
        assert_eq!(
            parse_date_expr("2025-04-03", today).expect("iso"),
            date(2025, 4, 3)
        );
        assert_eq!(
            parse_date_expr("2025/4/3", today).expect("slash"),
            date(2025, 4, 3)
        );
        assert!(parse_date_expr("2025/2/30", today).is_err());
        assert!(parse_date_expr("next blue moon", today).is_err());
    }

    #[test]
    fn month_shift_clamps_and_carries_year() {
        assert_eq!(shift_months(date(2025, 1, 31), 1), date(2025, 2, 28));
        assert_eq!(shift_months(date(2024, 12, 15), 1), date(2025, 1, 15));
        assert_eq!(shift_months(date(2025, 1, 15), -1), date(2024, 12, 15));
        assert_eq!(days_in_month(2024, 2), 29);
    }

    #[test]
    fn weeks_are_sunday_anchored() {
        // 2025-03-25 is a Tuesday.
        assert_eq!(start_of_week(date(2025, 3, 25)), date(2025, 3, 23));
        assert_eq!(end_of_week(date(2025, 3, 25)), date(2025, 3, 29));
        assert_eq!(start_of_week(date(2025, 3, 23)), date(2025, 3, 23));
    }

    #[test]
    fn labels_use_japanese_layout() {
        let day = date(2025, 3, 25);
        assert_eq!(month_label(day), "2025年03月");
        assert_eq!(week_label(date(2025, 3, 23), date(2025, 3, 29)), "03月23日〜03月29日");
        assert_eq!(day_label(day), "2025年03月25日(火)");
        assert_eq!(format_creation_date(day), "2025/3/25");
    }
}
