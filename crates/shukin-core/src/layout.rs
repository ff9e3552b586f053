//! Geometry for drawing event intervals on the calendar grid.
//!
//! Month view splits an interval into one bar per week row it crosses,
//! clipped to the displayed month. Week view draws a single bar clamped to
//! the seven columns. Bars of concurrently visible events are stacked into
//! `stack_slots` vertical slots; once more events share a row than there are
//! slots, the slot index wraps and those bars overlap.

use chrono::{Datelike, NaiveDate};
use tracing::{debug, instrument};

use crate::calendar::{CalendarCursor, MonthGrid, ViewMode};
use crate::dates::{add_days, days_between, end_of_week, start_of_week};
use crate::model::CalendarEvent;

pub const DEFAULT_STACK_SLOTS: usize = 3;
pub const MAX_STACK_SLOTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutConfig {
    stack_slots: usize,
}

impl LayoutConfig {
    pub fn new(stack_slots: usize) -> Self {
        Self {
            stack_slots: stack_slots.clamp(1, MAX_STACK_SLOTS),
        }
    }

    pub fn stack_slots(&self) -> usize {
        self.stack_slots
    }

    fn slot_for(&self, stack_index: usize) -> usize {
        stack_index % self.stack_slots
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_SLOTS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    pub row: u32,
    pub start_col: u32,
    pub span: u32,
    pub slot: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedBar {
    pub calendar_id: String,
    pub event_id: String,
    pub title: String,
    pub color_seed: u16,
    pub bar: Bar,
}

pub fn overlaps(
    start: NaiveDate,
    end: NaiveDate,
    view_start: NaiveDate,
    view_end: NaiveDate,
) -> bool {
    start <= view_end && end >= view_start
}

pub fn month_bars(
    start: NaiveDate,
    end: NaiveDate,
    grid: &MonthGrid,
    stack_index: usize,
    cfg: &LayoutConfig,
) -> Vec<Bar> {
    let range_start = start.max(grid.first_day);
    let range_end = end.min(grid.last_day);
    let mut bars = Vec::new();
    if range_start > range_end {
        return bars;
    }

    let slot = cfg.slot_for(stack_index);
    let mut seg_start = range_start;
    while seg_start <= range_end {
        let seg_end = end_of_week(seg_start).min(range_end);
        let span = days_between(seg_start, seg_end) + 1;
        if span > 0 {
            bars.push(Bar {
                row: (grid.start_day_index + seg_start.day() - 1) / 7,
                start_col: seg_start.weekday().num_days_from_sunday(),
                span: span as u32,
                slot,
                start: seg_start,
                end: seg_end,
            });
        }

        let next = add_days(seg_end, 1);
        if next <= seg_end {
            break;
        }
        seg_start = next;
    }
    bars
}

pub fn week_bar(
    start: NaiveDate,
    end: NaiveDate,
    week_start: NaiveDate,
    stack_index: usize,
    cfg: &LayoutConfig,
) -> Option<Bar> {
    let start_col = days_between(week_start, start).clamp(0, 6);
    let end_col = days_between(week_start, end).clamp(0, 6);
    let span = end_col - start_col + 1;
    if span <= 0 || !overlaps(start, end, week_start, add_days(week_start, 6)) {
        return None;
    }

    Some(Bar {
        row: 0,
        start_col: start_col as u32,
        span: span as u32,
        slot: cfg.slot_for(stack_index),
        start: add_days(week_start, start_col),
        end: add_days(week_start, end_col),
    })
}

fn day_bar(start: NaiveDate, end: NaiveDate, day: NaiveDate, stack_index: usize, cfg: &LayoutConfig) -> Option<Bar> {
    overlaps(start, end, day, day).then(|| Bar {
        row: 0,
        start_col: 0,
        span: 1,
        slot: cfg.slot_for(stack_index),
        start: day,
        end: day,
    })
}

/// Events overlapping the visible range, in stacking order: earlier start
/// first, then the longer interval, then id.
pub fn visible_events<'a>(
    events: &'a [CalendarEvent],
    cursor: &CalendarCursor,
) -> Vec<&'a CalendarEvent> {
    let (view_start, view_end) = cursor.visible_range();
    let mut visible: Vec<&CalendarEvent> = events
        .iter()
        .filter(|ev| ev.start <= ev.end && overlaps(ev.start, ev.end, view_start, view_end))
        .collect();
    visible.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| b.end.cmp(&a.end))
            .then_with(|| a.id.cmp(&b.id))
    });
    visible
}

#[instrument(skip(events, cursor, cfg), fields(view = %cursor.view(), count = events.len()))]
pub fn layout(events: &[CalendarEvent], cursor: &CalendarCursor, cfg: &LayoutConfig) -> Vec<PlacedBar> {
    let visible = visible_events(events, cursor);
    let mut placed = Vec::new();

    for (stack_index, ev) in visible.iter().enumerate() {
        let bars = match cursor.view() {
            ViewMode::Month => month_bars(ev.start, ev.end, &cursor.month_grid(), stack_index, cfg),
            ViewMode::Week => week_bar(ev.start, ev.end, start_of_week(cursor.reference()), stack_index, cfg)
                .into_iter()
                .collect(),
            ViewMode::Day => day_bar(ev.start, ev.end, cursor.reference(), stack_index, cfg)
                .into_iter()
                .collect(),
        };

        placed.extend(bars.into_iter().map(|bar| PlacedBar {
            calendar_id: ev.id.clone(),
            event_id: ev.event_id.clone(),
            title: ev.title.clone(),
            color_seed: ev.color_seed,
            bar,
        }));
    }

    debug!(visible = visible.len(), bars = placed.len(), "laid out calendar bars");
    placed
}
