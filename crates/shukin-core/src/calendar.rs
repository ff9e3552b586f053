use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};

use crate::dates::{
    add_days, day_label, days_in_month, end_of_week, first_day_of_month, last_day_of_month,
    month_label, shift_months, start_of_week, week_label,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Month,
    Week,
    Day,
}

impl ViewMode {
    pub fn as_key(self) -> &'static str {
        match self {
            ViewMode::Month => "month",
            ViewMode::Week => "week",
            ViewMode::Day => "day",
        }
    }
}

impl FromStr for ViewMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "month" | "m" => Ok(ViewMode::Month),
            "week" | "w" => Ok(ViewMode::Week),
            "day" | "d" => Ok(ViewMode::Day),
            other => Err(anyhow!("unknown calendar view: {other}")),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
    pub days_in_month: u32,
    /// Weekday of the 1st, 0 = Sunday.
    pub start_day_index: u32,
    pub end_empty_cells: u32,
    pub label: String,
}

impl MonthGrid {
    pub fn for_date(reference: NaiveDate) -> Self {
        let year = reference.year();
        let month = reference.month();
        let first_day = first_day_of_month(year, month);
        let days_in_month = days_in_month(year, month);
        let start_day_index = first_day.weekday().num_days_from_sunday();

        Self {
            year,
            month,
            first_day,
            last_day: last_day_of_month(year, month),
            days_in_month,
            start_day_index,
            end_empty_cells: (7 - (start_day_index + days_in_month) % 7) % 7,
            label: month_label(reference),
        }
    }

    pub fn total_cells(&self) -> u32 {
        self.start_day_index + self.days_in_month + self.end_empty_cells
    }

    pub fn week_rows(&self) -> u32 {
        self.total_cells() / 7
    }

    /// Cell contents row by row; `None` marks a leading or trailing blank.
    pub fn cells(&self) -> Vec<Option<NaiveDate>> {
        let mut cells = Vec::with_capacity(self.total_cells() as usize);
        cells.extend((0..self.start_day_index).map(|_| None));
        cells.extend((0..self.days_in_month).map(|i| Some(add_days(self.first_day, i64::from(i)))));
        cells.extend((0..self.end_empty_cells).map(|_| None));
        cells
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCell {
    pub date: NaiveDate,
    pub is_today: bool,
    pub is_current_month: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekGrid {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub days: [DayCell; 7],
    pub label: String,
}

impl WeekGrid {
    pub fn for_date(reference: NaiveDate, today: NaiveDate) -> Self {
        let week_start = start_of_week(reference);
        let days = std::array::from_fn(|i| {
            let date = add_days(week_start, i as i64);
            DayCell {
                date,
                is_today: date == today,
                is_current_month: date.month() == reference.month(),
            }
        });

        Self {
            week_start,
            week_end: end_of_week(reference),
            days,
            label: week_label(week_start, end_of_week(reference)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGrid {
    pub date: NaiveDate,
    pub is_today: bool,
    pub label: String,
}

impl DayGrid {
    pub fn for_date(reference: NaiveDate, today: NaiveDate) -> Self {
        Self {
            date: reference,
            is_today: reference == today,
            label: day_label(reference),
        }
    }
}

/// The visible calendar: a reference date plus view mode. Navigation replaces
/// the reference date and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarCursor {
    reference: NaiveDate,
    view: ViewMode,
}

impl CalendarCursor {
    pub fn new(reference: NaiveDate, view: ViewMode) -> Self {
        Self { reference, view }
    }

    pub fn reference(&self) -> NaiveDate {
        self.reference
    }

    pub fn view(&self) -> ViewMode {
        self.view
    }

    pub fn set_view(&mut self, view: ViewMode) {
        self.view = view;
    }

    pub fn go_to(&mut self, date: NaiveDate) {
        self.reference = date;
    }

    pub fn prev_month(&mut self) {
        self.reference = shift_months(self.reference, -1);
    }

    pub fn next_month(&mut self) {
        self.reference = shift_months(self.reference, 1);
    }

    pub fn prev_week(&mut self) {
        self.reference = add_days(self.reference, -7);
    }

    pub fn next_week(&mut self) {
        self.reference = add_days(self.reference, 7);
    }

    pub fn prev_day(&mut self) {
        self.reference = add_days(self.reference, -1);
    }

    pub fn next_day(&mut self) {
        self.reference = add_days(self.reference, 1);
    }

    /// Moves `steps` periods of the current view (negative goes back).
    pub fn shift(&mut self, steps: i32) {
        self.reference = match self.view {
            ViewMode::Month => shift_months(self.reference, steps),
            ViewMode::Week => add_days(self.reference, i64::from(steps) * 7),
            ViewMode::Day => add_days(self.reference, i64::from(steps)),
        };
    }

    pub fn month_grid(&self) -> MonthGrid {
        MonthGrid::for_date(self.reference)
    }

    pub fn week_grid(&self, today: NaiveDate) -> WeekGrid {
        WeekGrid::for_date(self.reference, today)
    }

    pub fn day_grid(&self, today: NaiveDate) -> DayGrid {
        DayGrid::for_date(self.reference, today)
    }

    /// Inclusive date range the current view displays.
    pub fn visible_range(&self) -> (NaiveDate, NaiveDate) {
        match self.view {
            ViewMode::Month => {
                let grid = self.month_grid();
                (grid.first_day, grid.last_day)
            }
            ViewMode::Week => (start_of_week(self.reference), end_of_week(self.reference)),
            ViewMode::Day => (self.reference, self.reference),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{CalendarCursor, MonthGrid, ViewMode, WeekGrid};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn month_grid_shape_is_whole_weeks_for_every_month() {
        for year in [2023, 2024, 2025, 2026] {
            for month in 1..=12 {
                let grid = MonthGrid::for_date(date(year, month, 1));
                assert!(grid.start_day_index <= 6);
                assert!(grid.end_empty_cells <= 6);
                assert_eq!(grid.total_cells() % 7, 0, "{year}-{month}");
                assert_eq!(grid.cells().len() as u32, grid.total_cells());
            }
        }
    }

    #[test]
    fn month_ending_on_saturday_has_no_trailing_cells() {
        // May 2025 starts on Thursday and its 31st is a Saturday.
        let grid = MonthGrid::for_date(date(2025, 5, 10));
        assert_eq!(grid.start_day_index, 4);
        assert_eq!(grid.days_in_month, 31);
        assert_eq!(grid.end_empty_cells, 0);
        assert_eq!(grid.week_rows(), 5);
    }

    #[test]
    fn march_2025_matches_reference_layout() {
        let grid = MonthGrid::for_date(date(2025, 3, 25));
        assert_eq!(grid.start_day_index, 6);
        assert_eq!(grid.days_in_month, 31);
        assert_eq!(grid.end_empty_cells, 5);
        assert_eq!(grid.label, "2025年03月");
    }

    #[test]
    fn week_grid_flags_today_and_other_months() {
        let week = WeekGrid::for_date(date(2025, 4, 1), date(2025, 3, 31));
        assert_eq!(week.week_start, date(2025, 3, 30));
        assert_eq!(week.week_end, date(2025, 4, 5));
        assert!(!week.days[0].is_current_month);
        assert!(week.days[1].is_today);
        assert!(week.days[2].is_current_month);
    }

    #[test]
    fn navigation_crosses_year_boundaries() {
        let mut cursor = CalendarCursor::new(date(2025, 12, 31), ViewMode::Month);
        cursor.next_month();
        assert_eq!(cursor.reference(), date(2026, 1, 31));
        cursor.prev_month();
        cursor.prev_month();
        assert_eq!(cursor.reference(), date(2025, 11, 30));

        cursor.go_to(date(2025, 12, 29));
        cursor.next_week();
        assert_eq!(cursor.reference(), date(2026, 1, 5));
        cursor.prev_day();
        assert_eq!(cursor.reference(), date(2026, 1, 4));
    }

    #[test]
    fn shift_follows_view_mode() {
        let mut cursor = CalendarCursor::new(date(2025, 3, 25), ViewMode::Week);
        cursor.shift(-2);
        assert_eq!(cursor.reference(), date(2025, 3, 11));
        cursor.set_view(ViewMode::Day);
        cursor.shift(3);
        assert_eq!(cursor.reference(), date(2025, 3, 14));
        assert_eq!(cursor.visible_range(), (date(2025, 3, 14), date(2025, 3, 14)));
    }

    #[test]
    fn parses_view_names() {
        assert_eq!("Week".parse::<ViewMode>().expect("week"), ViewMode::Week);
        assert!("year".parse::<ViewMode>().is_err());
    }
}
