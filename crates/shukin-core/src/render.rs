use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::ads::PlaceholderAds;
use crate::calendar::{CalendarCursor, ViewMode};
use crate::config::Config;
use crate::dates::weekday_label;
use crate::finance::Totals;
use crate::layout::PlacedBar;
use crate::model::Event;
use crate::plan::{FREE_LIMITS, Plan, PlanLimits, SubscriptionState};
use crate::routes::Route;
use crate::theme::Theme;

const MONTH_CELL: usize = 6;
const WEEK_CELL: usize = 11;
const SHORT_ID: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    theme: Theme,
}

impl Renderer {
    pub fn new(cfg: &Config, theme: Theme) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color, theme })
    }

    pub fn plain() -> Self {
        Self {
            color: false,
            theme: Theme::Light,
        }
    }

    #[tracing::instrument(skip(self, out, events), fields(count = events.len()))]
    pub fn write_event_table<W: Write>(&self, out: &mut W, events: &[Event]) -> anyhow::Result<()> {
        if events.is_empty() {
            writeln!(out, "No events yet. Create one with `shukin add <name>`.")?;
            return Ok(());
        }

        let headers = ["#", "ID", "Name", "Date", "Collection", "Paid", "Collected", "Balance"]
            .map(String::from)
            .to_vec();

        let rows = events
            .iter()
            .enumerate()
            .map(|(idx, event)| {
                let totals = Totals::for_event(event);
                let paid_count = event.participants.iter().filter(|p| p.is_paid).count();
                let balance = format_amount(totals.balance);
                let balance = if totals.balance < 0.0 {
                    self.paint(&balance, "31")
                } else {
                    balance
                };
                vec![
                    idx.to_string(),
                    self.accent(short_id(&event.id)),
                    event.name.clone(),
                    event.creation_date.clone(),
                    format_period(event.collection_start_date, event.collection_end_date),
                    format!("{paid_count}/{}", event.participants.len()),
                    format!(
                        "{} / {}",
                        format_amount(totals.total_paid),
                        format_amount(totals.total_owed)
                    ),
                    balance,
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, out, event), fields(event_id = %event.id))]
    pub fn write_event_detail<W: Write>(&self, out: &mut W, event: &Event) -> anyhow::Result<()> {
        let totals = Totals::for_event(event);

        writeln!(out, "{}", self.accent(&event.name))?;
        writeln!(out, "id          {}", event.id)?;
        writeln!(out, "date        {}", event.creation_date)?;
        if !event.description.is_empty() {
            writeln!(out, "description {}", event.description)?;
        }
        writeln!(
            out,
            "collection  {}",
            format_period(event.collection_start_date, event.collection_end_date)
        )?;
        writeln!(out)?;

        writeln!(out, "Participants ({})", event.participants.len())?;
        if event.participants.is_empty() {
            writeln!(out, "  none")?;
        } else {
            let rows = event
                .participants
                .iter()
                .map(|p| {
                    vec![
                        short_id(&p.id).to_string(),
                        p.name.clone(),
                        p.contact.clone().unwrap_or_default(),
                        format_amount(p.amount_owed),
                        format_amount(p.amount_paid),
                        p.payment_due_date
                            .map(|d| d.format("%Y-%m-%d").to_string())
                            .unwrap_or_default(),
                        self.status(p.is_paid),
                    ]
                })
                .collect();
            write_table(
                &mut *out,
                ["ID", "Name", "Contact", "Owed", "Paid", "Due", "Status"]
                    .map(String::from)
                    .to_vec(),
                rows,
            )?;
        }
        writeln!(out)?;

        writeln!(out, "Expenses ({})", event.expenses.len())?;
        if event.expenses.is_empty() {
            writeln!(out, "  none")?;
        } else {
            let rows = event
                .expenses
                .iter()
                .map(|e| {
                    vec![
                        short_id(&e.id).to_string(),
                        e.description.clone(),
                        format_amount(e.amount),
                        e.remarks.clone().unwrap_or_default(),
                        self.status(e.is_paid),
                    ]
                })
                .collect();
            write_table(
                &mut *out,
                ["ID", "Description", "Amount", "Remarks", "Status"]
                    .map(String::from)
                    .to_vec(),
                rows,
            )?;
        }
        writeln!(out)?;

        writeln!(out, "total owed      {}", format_amount(totals.total_owed))?;
        writeln!(out, "total paid      {}", format_amount(totals.total_paid))?;
        writeln!(out, "outstanding     {}", format_amount(totals.outstanding()))?;
        writeln!(out, "expenses (paid) {}", format_amount(totals.total_expenses))?;
        let balance = format_amount(totals.balance);
        if totals.balance < 0.0 {
            writeln!(out, "balance         {}", self.paint(&balance, "31"))?;
        } else {
            writeln!(out, "balance         {balance}")?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, out, cursor, bars), fields(view = %cursor.view(), bars = bars.len()))]
    pub fn write_calendar<W: Write>(
        &self,
        out: &mut W,
        cursor: &CalendarCursor,
        bars: &[PlacedBar],
        today: NaiveDate,
        slots: usize,
    ) -> anyhow::Result<()> {
        match cursor.view() {
            ViewMode::Month => self.write_month(out, cursor, bars, today, slots)?,
            ViewMode::Week => self.write_week(out, cursor, bars, today, slots)?,
            ViewMode::Day => self.write_day(out, cursor, bars, today)?,
        }
        self.write_legend(out, bars)
    }

    fn write_month<W: Write>(
        &self,
        out: &mut W,
        cursor: &CalendarCursor,
        bars: &[PlacedBar],
        today: NaiveDate,
        slots: usize,
    ) -> anyhow::Result<()> {
        let grid = cursor.month_grid();
        writeln!(out, "{}", self.accent(&grid.label))?;
        writeln!(out, "{}", weekday_header(MONTH_CELL))?;

        let cells = grid.cells();
        for (row, week) in cells.chunks(7).enumerate() {
            let mut line = String::new();
            for cell in week {
                let text = match cell {
                    Some(day) if *day == today => format!("{:>2}*", day.day()),
                    Some(day) => format!("{:>2}", day.day()),
                    None => String::new(),
                };
                line.push_str(&pad(&text, MONTH_CELL));
            }
            writeln!(out, "{}", line.trim_end())?;

            let row_bars: Vec<&PlacedBar> = bars.iter().filter(|b| b.bar.row as usize == row).collect();
            for slot_line in self.bar_lines(&row_bars, slots, MONTH_CELL) {
                writeln!(out, "{slot_line}")?;
            }
        }
        Ok(())
    }

    fn write_week<W: Write>(
        &self,
        out: &mut W,
        cursor: &CalendarCursor,
        bars: &[PlacedBar],
        today: NaiveDate,
        slots: usize,
    ) -> anyhow::Result<()> {
        let grid = cursor.week_grid(today);
        writeln!(out, "{}", self.accent(&grid.label))?;

        let mut header = String::new();
        for day in &grid.days {
            let mut text = format!(
                "{}({})",
                day.date.format("%m/%d"),
                weekday_label(day.date.weekday())
            );
            if day.is_today {
                text.push('*');
            }
            header.push_str(&pad(&text, WEEK_CELL));
        }
        writeln!(out, "{}", header.trim_end())?;

        let row_bars: Vec<&PlacedBar> = bars.iter().collect();
        for slot_line in self.bar_lines(&row_bars, slots, WEEK_CELL) {
            writeln!(out, "{slot_line}")?;
        }
        Ok(())
    }

    fn write_day<W: Write>(
        &self,
        out: &mut W,
        cursor: &CalendarCursor,
        bars: &[PlacedBar],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let grid = cursor.day_grid(today);
        let label = if grid.is_today {
            format!("{} (today)", grid.label)
        } else {
            grid.label
        };
        writeln!(out, "{}", self.accent(&label))?;
        if bars.is_empty() {
            writeln!(out, "  no collections on this day")?;
        }
        Ok(())
    }

    fn write_legend<W: Write>(&self, out: &mut W, bars: &[PlacedBar]) -> anyhow::Result<()> {
        let mut seen: Vec<&str> = Vec::new();
        for placed in bars {
            if seen.contains(&placed.event_id.as_str()) {
                continue;
            }
            seen.push(&placed.event_id);
            writeln!(
                out,
                "  {} {} {}",
                self.paint("■", bar_color(placed.color_seed)),
                short_id(&placed.event_id),
                placed.title
            )?;
        }
        Ok(())
    }

    /// One text line per stacking slot. Each bar segment carries its title;
    /// where a wrapped slot draws over part of a bar, the remainder is a rule.
    fn bar_lines(&self, bars: &[&PlacedBar], slots: usize, cell: usize) -> Vec<String> {
        let mut lines = Vec::new();
        for slot in 0..slots {
            let mut owner: [Option<usize>; 7] = [None; 7];
            for (idx, placed) in bars.iter().enumerate() {
                if placed.bar.slot != slot {
                    continue;
                }
                let from = placed.bar.start_col as usize;
                let to = (from + placed.bar.span as usize).min(7);
                for col in owner.iter_mut().take(to).skip(from) {
                    *col = Some(idx);
                }
            }
            if owner.iter().all(Option::is_none) {
                continue;
            }

            let mut line = String::new();
            let mut col = 0;
            while col < 7 {
                let Some(idx) = owner[col] else {
                    line.push_str(&" ".repeat(cell));
                    col += 1;
                    continue;
                };
                let run_start = col;
                while col < 7 && owner[col] == Some(idx) {
                    col += 1;
                }
                let placed = bars[idx];
                let width = (col - run_start) * cell - 1;
                let label = if run_start == placed.bar.start_col as usize {
                    fit_bar(&placed.title, width)
                } else {
                    "─".repeat(width)
                };
                line.push_str(&self.paint(&label, bar_color(placed.color_seed)));
                line.push(' ');
            }
            lines.push(line.trim_end().to_string());
        }
        lines
    }

    pub fn write_plans<W: Write>(&self, out: &mut W, subscription: &SubscriptionState) -> anyhow::Result<()> {
        let free = FREE_LIMITS;
        let premium = PlanLimits::for_plan(Plan::Premium);
        let cap = |value: Option<usize>| value.map_or_else(|| "unlimited".to_string(), |v| v.to_string());

        let rows = vec![
            vec!["Events".to_string(), cap(free.max_events), cap(premium.max_events)],
            vec![
                "Participants per event".to_string(),
                cap(free.max_participants),
                cap(premium.max_participants),
            ],
            vec![
                "Expense items per event".to_string(),
                cap(free.max_expense_items),
                cap(premium.max_expense_items),
            ],
            vec!["Calendar view".to_string(), "no".to_string(), "yes".to_string()],
            vec!["Ads".to_string(), "yes".to_string(), "no".to_string()],
        ];
        write_table(
            &mut *out,
            ["", "Free", "Premium"].map(String::from).to_vec(),
            rows,
        )?;
        writeln!(out)?;

        match (subscription.is_premium(), subscription.expiry_date) {
            (true, Some(expiry)) => writeln!(
                out,
                "Current plan: {} (renews {})",
                self.accent("premium"),
                expiry.format("%Y-%m-%d")
            )?,
            (true, None) => writeln!(out, "Current plan: {}", self.accent("premium"))?,
            (false, _) => writeln!(
                out,
                "Current plan: free. Run `shukin plan upgrade` for unlimited events and the calendar."
            )?,
        }
        Ok(())
    }

    pub fn write_how_to<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        let steps = [
            ("Create an event", "shukin add \"Year-end party\" --start 2025-12-01 --end 2025-12-20"),
            ("Add participants", "shukin participant add <event> Hanako --owed 5000"),
            ("Record payments", "shukin participant paid <event> <participant>"),
            ("Track expenses", "shukin expense add <event> Venue --amount 30000"),
            ("Check the balance", "shukin show <event>"),
            ("See collection periods", "shukin calendar --view month"),
        ];
        writeln!(out, "{}", self.accent("How to use shukin"))?;
        for (idx, (title, example)) in steps.iter().enumerate() {
            writeln!(out, "{}. {title}", idx + 1)?;
            writeln!(out, "   {example}")?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "Events, participants and expenses can be referred to by the first 4+ characters of their id."
        )?;
        Ok(())
    }

    pub fn write_ad_banner<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        writeln!(out)?;
        writeln!(out, "{}", self.paint(&format!("[ {} ]", PlaceholderAds::BANNER_TEXT), "2"))?;
        Ok(())
    }

    pub fn write_notice<W: Write>(&self, out: &mut W, message: &str) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(message, "33"))?;
        Ok(())
    }

    pub fn write_not_found<W: Write>(&self, out: &mut W, path: &str, back: &Route) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&format!("Not found: {path}"), "31"))?;
        writeln!(out, "Back to {back}")?;
        Ok(())
    }

    fn status(&self, paid: bool) -> String {
        if paid {
            self.paint("paid", "32")
        } else {
            "unpaid".to_string()
        }
    }

    fn accent(&self, text: &str) -> String {
        let code = match self.theme {
            Theme::Light => "1;34",
            Theme::Dark => "1;36",
        };
        self.paint(text, code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Nearest of the six basic ANSI hues.
fn bar_color(hue: u16) -> &'static str {
    const CODES: [&str; 6] = ["31", "33", "32", "36", "34", "35"];
    CODES[usize::from(hue % 360) / 60]
}

fn weekday_header(cell: usize) -> String {
    let mut line = String::new();
    for idx in 0..7u8 {
        let label = chrono::Weekday::try_from((idx + 6) % 7)
            .map(weekday_label)
            .unwrap_or_default();
        line.push_str(&pad(label, cell));
    }
    line.trim_end().to_string()
}

fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID).unwrap_or(id)
}

pub fn format_amount(value: f64) -> String {
    let cents_total = (value.abs() * 100.0).round() as u64;
    let negative = value < 0.0 && cents_total > 0;
    let whole = cents_total / 100;
    let cents = cents_total % 100;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if negative { "-" } else { "" };
    if cents == 0 {
        format!("{sign}¥{grouped}")
    } else {
        format!("{sign}¥{grouped}.{cents:02}")
    }
}

fn format_period(start: Option<NaiveDate>, end: Option<NaiveDate>) -> String {
    match (start, end) {
        (Some(s), Some(e)) => format!("{}〜{}", s.format("%Y-%m-%d"), e.format("%Y-%m-%d")),
        (Some(s), None) => format!("{}〜", s.format("%Y-%m-%d")),
        (None, Some(e)) => format!("〜{}", e.format("%Y-%m-%d")),
        (None, None) => "-".to_string(),
    }
}

fn pad(text: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(text);
    format!("{text}{}", " ".repeat(width.saturating_sub(visible)))
}

/// `title` cut to fit `width` display columns, the rest filled with a rule.
fn fit_bar(title: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in title.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push_str(&"─".repeat(width.saturating_sub(used)));
    out
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{} ", pad(&headers[idx], widths[idx]))?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
