use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,

    pub name: String,

    #[serde(default, alias = "email", skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,

    #[serde(default)]
    pub amount_owed: f64,

    #[serde(default)]
    pub amount_paid: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_due_date: Option<NaiveDate>,

    #[serde(default)]
    pub is_paid: bool,
}

impl Participant {
    pub fn new(name: String, amount_owed: f64) -> Self {
        Self {
            id: new_id(),
            name,
            contact: None,
            amount_owed,
            amount_paid: 0.0,
            payment_due_date: None,
            is_paid: false,
        }
    }

    /// Toggling to paid copies the owed amount into `amount_paid`; toggling
    /// back resets it. The two fields stay independent afterwards.
    pub fn mark_paid(&mut self, paid: bool) {
        self.is_paid = paid;
        self.amount_paid = if paid { self.amount_owed } else { 0.0 };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseItem {
    pub id: String,

    #[serde(alias = "name")]
    pub description: String,

    pub amount: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,

    #[serde(default)]
    pub is_paid: bool,
}

impl ExpenseItem {
    pub fn new(description: String, amount: f64) -> Self {
        Self {
            id: new_id(),
            description,
            amount,
            remarks: None,
            is_paid: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,

    pub name: String,

    #[serde(alias = "date")]
    pub creation_date: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_start_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_end_date: Option<NaiveDate>,

    #[serde(default)]
    pub participants: Vec<Participant>,

    #[serde(default)]
    pub expenses: Vec<ExpenseItem>,
}

impl Event {
    pub fn new(name: String, description: String, creation_date: String) -> Self {
        Self {
            id: new_id(),
            name,
            creation_date,
            description,
            collection_start_date: None,
            collection_end_date: None,
            participants: vec![],
            expenses: vec![],
        }
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn expense(&self, id: &str) -> Option<&ExpenseItem> {
        self.expenses.iter().find(|e| e.id == id)
    }
}

/// Display projection of an [`Event`] onto the calendar. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub event_id: String,
    pub title: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub color_seed: u16,
}

impl CalendarEvent {
    /// Events without any collection date have nothing to draw and yield
    /// `None`. A single known date stands in for the missing one.
    pub fn from_event(event: &Event) -> Option<Self> {
        let (start, end) = match (event.collection_start_date, event.collection_end_date) {
            (Some(start), Some(end)) => (start, end),
            (Some(day), None) | (None, Some(day)) => (day, day),
            (None, None) => return None,
        };

        Some(Self {
            id: format!("cal-{}", event.id),
            event_id: event.id.clone(),
            title: event.name.clone(),
            start,
            end,
            color_seed: color_hue(&event.id),
        })
    }

    pub fn css_color(&self) -> String {
        format!("hsl({}, 70%, 50%)", self.color_seed)
    }
}

pub fn calendar_events(events: &[Event]) -> Vec<CalendarEvent> {
    events.iter().filter_map(CalendarEvent::from_event).collect()
}

/// Golden-angle hue derived from an FNV-1a hash of the id, stable across runs.
pub fn color_hue(id: &str) -> u16 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in id.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    ((f64::from(hash) * 137.5) % 360.0) as u16
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{CalendarEvent, Event, Participant, calendar_events, color_hue};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn event_without_collection_dates_is_not_projected() {
        let event = Event::new("Summer Party".into(), String::new(), "2025/7/1".into());
        assert!(CalendarEvent::from_event(&event).is_none());
        assert!(calendar_events(&[event]).is_empty());
    }

    #[test]
    fn single_collection_date_becomes_one_day_interval() {
        let mut event = Event::new("Drinks".into(), String::new(), "2025/3/25".into());
        event.collection_end_date = Some(date(2025, 4, 3));

        let cal = CalendarEvent::from_event(&event).expect("projected");
        assert_eq!(cal.start, date(2025, 4, 3));
        assert_eq!(cal.end, date(2025, 4, 3));
        assert_eq!(cal.id, format!("cal-{}", event.id));
    }

    #[test]
    fn color_is_stable_for_an_id() {
        assert_eq!(color_hue("abc"), color_hue("abc"));
        assert!(color_hue("abc") < 360);
        assert!(color_hue("") < 360);
    }

    #[test]
    fn marking_paid_copies_owed_amount() {
        let mut p = Participant::new("Aki".into(), 5000.0);
        p.mark_paid(true);
        assert_eq!(p.amount_paid, 5000.0);
        p.mark_paid(false);
        assert_eq!(p.amount_paid, 0.0);
        assert!(!p.is_paid);
    }

    #[test]
    fn legacy_field_names_are_accepted() {
        let raw = r#"{
            "id": "1",
            "name": "Welcome party",
            "date": "2025/3/25",
            "description": "",
            "collectionStartDate": "2025-03-25",
            "participants": [{"id": "p1", "name": "Ren", "email": "ren@example.com"}],
            "expenses": [{"id": "e1", "name": "Venue", "amount": 12000}]
        }"#;
        let event: Event = serde_json::from_str(raw).expect("parse legacy event");
        assert_eq!(event.creation_date, "2025/3/25");
        assert_eq!(event.participants[0].contact.as_deref(), Some("ren@example.com"));
        assert_eq!(event.expenses[0].description, "Venue");
        assert!(!event.expenses[0].is_paid);
    }
}
