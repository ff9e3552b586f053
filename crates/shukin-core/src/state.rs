//! Application state and the commands that mutate it.
//!
//! Every command validates first, consults the plan gate for creations, applies
//! the change to a copy of the event list, writes that copy through to the
//! datastore, and only then swaps it in. A rejected or failed command leaves
//! both memory and disk untouched.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::dates::format_creation_date;
use crate::datastore::DataStore;
use crate::error::{ShukinError, ShukinResult};
use crate::finance::Totals;
use crate::model::{Event, ExpenseItem, Participant};
use crate::plan::{LimitKind, SubscriptionState};
use crate::theme::Theme;

const MIN_PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub name: String,
    pub description: String,
    pub creation_date: Option<String>,
    pub collection_start_date: Option<NaiveDate>,
    pub collection_end_date: Option<NaiveDate>,
}

/// Partial update. For the nested options, `Some(None)` clears the field.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub creation_date: Option<String>,
    pub collection_start_date: Option<Option<NaiveDate>>,
    pub collection_end_date: Option<Option<NaiveDate>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewParticipant {
    pub name: String,
    pub contact: Option<String>,
    pub amount_owed: Option<f64>,
    pub payment_due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct ParticipantPatch {
    pub name: Option<String>,
    pub contact: Option<Option<String>>,
    pub amount_owed: Option<f64>,
    pub amount_paid: Option<f64>,
    pub payment_due_date: Option<Option<NaiveDate>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewExpense {
    pub description: String,
    pub amount: f64,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExpensePatch {
    pub description: Option<String>,
    pub amount: Option<f64>,
    pub remarks: Option<Option<String>>,
}

#[derive(Debug)]
pub struct AppState {
    store: DataStore,
    events: Vec<Event>,
    subscription: SubscriptionState,
    theme: Theme,
}

impl AppState {
    #[instrument(skip(store, now))]
    pub fn load(store: DataStore, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let events = store.load_events()?;
        let subscription = store.load_subscription(now)?;
        let theme = store.load_theme()?;
        info!(
            events = events.len(),
            plan = %subscription.plan,
            theme = theme.as_key(),
            "loaded application state"
        );
        Ok(Self {
            store,
            events,
            subscription,
            theme,
        })
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn subscription(&self) -> &SubscriptionState {
        &self.subscription
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Looks an event up by full id or by a unique id prefix.
    pub fn event(&self, key: &str) -> ShukinResult<&Event> {
        let idx = position_by_key(&self.events, key, |e| e.id.as_str())
            .ok_or_else(|| ShukinError::not_found("event", key))?;
        Ok(&self.events[idx])
    }

    pub fn totals(&self, key: &str) -> ShukinResult<Totals> {
        self.event(key).map(Totals::for_event)
    }

    #[instrument(skip(self, input, today), fields(name = %input.name))]
    pub fn create_event(&mut self, input: NewEvent, today: NaiveDate) -> ShukinResult<Event> {
        let name = required(&input.name, "event name")?;
        check_period(input.collection_start_date, input.collection_end_date)?;
        self.gate(LimitKind::Events, self.events.len())?;

        let creation_date = input
            .creation_date
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format_creation_date(today));
        let mut event = Event::new(name, input.description.trim().to_string(), creation_date);
        event.collection_start_date = input.collection_start_date;
        event.collection_end_date = input.collection_end_date;

        let mut next = self.events.clone();
        next.push(event.clone());
        self.commit(next)?;

        info!(event_id = %event.id, "created event");
        Ok(event)
    }

    #[instrument(skip(self, patch))]
    pub fn update_event(&mut self, key: &str, patch: EventPatch) -> ShukinResult<Event> {
        let name = patch
            .name
            .as_deref()
            .map(|n| required(n, "event name"))
            .transpose()?;

        self.with_event(key, |event| {
            let start = patch
                .collection_start_date
                .unwrap_or(event.collection_start_date);
            let end = patch.collection_end_date.unwrap_or(event.collection_end_date);
            check_period(start, end)?;

            if let Some(name) = name {
                event.name = name;
            }
            if let Some(description) = patch.description {
                event.description = description.trim().to_string();
            }
            if let Some(creation_date) = patch.creation_date {
                event.creation_date = required(&creation_date, "creation date")?;
            }
            event.collection_start_date = start;
            event.collection_end_date = end;
            Ok(event.clone())
        })
    }

    #[instrument(skip(self))]
    pub fn delete_event(&mut self, key: &str) -> ShukinResult<Event> {
        let idx = self.event_index(key)?;
        let mut next = self.events.clone();
        let removed = next.remove(idx);
        self.commit(next)?;
        info!(event_id = %removed.id, "deleted event");
        Ok(removed)
    }

    /// Moves an event to `to_index`, clamped to the end of the list.
    #[instrument(skip(self))]
    pub fn move_event(&mut self, key: &str, to_index: usize) -> ShukinResult<()> {
        let idx = self.event_index(key)?;
        let mut next = self.events.clone();
        let event = next.remove(idx);
        let to_index = to_index.min(next.len());
        next.insert(to_index, event);
        self.commit(next)?;
        debug!(from = idx, to = to_index, "reordered events");
        Ok(())
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub fn add_participant(
        &mut self,
        event_key: &str,
        input: NewParticipant,
    ) -> ShukinResult<Participant> {
        let name = required(&input.name, "participant name")?;
        let amount_owed = input.amount_owed.ok_or(ShukinError::MissingField {
            field: "amount owed",
        })?;
        let amount_owed = amount(amount_owed, "amount owed")?;
        let count = self.event(event_key)?.participants.len();
        self.gate(LimitKind::Participants, count)?;

        self.with_event(event_key, |event| {
            let mut participant = Participant::new(name, amount_owed);
            participant.contact = optional_text(input.contact);
            participant.payment_due_date = input.payment_due_date;
            event.participants.push(participant.clone());
            info!(event_id = %event.id, participant_id = %participant.id, "added participant");
            Ok(participant)
        })
    }

    #[instrument(skip(self, patch))]
    pub fn update_participant(
        &mut self,
        event_key: &str,
        participant_key: &str,
        patch: ParticipantPatch,
    ) -> ShukinResult<Participant> {
        let name = patch
            .name
            .as_deref()
            .map(|n| required(n, "participant name"))
            .transpose()?;
        let amount_owed = patch
            .amount_owed
            .map(|a| amount(a, "amount owed"))
            .transpose()?;
        let amount_paid = patch
            .amount_paid
            .map(|a| amount(a, "amount paid"))
            .transpose()?;

        self.with_participant(event_key, participant_key, |p| {
            if let Some(name) = name {
                p.name = name;
            }
            if let Some(contact) = patch.contact {
                p.contact = optional_text(contact);
            }
            if let Some(owed) = amount_owed {
                p.amount_owed = owed;
            }
            if let Some(paid) = amount_paid {
                p.amount_paid = paid;
            }
            if let Some(due) = patch.payment_due_date {
                p.payment_due_date = due;
            }
        })
    }

    #[instrument(skip(self))]
    pub fn set_participant_paid(
        &mut self,
        event_key: &str,
        participant_key: &str,
        paid: bool,
    ) -> ShukinResult<Participant> {
        self.with_participant(event_key, participant_key, |p| p.mark_paid(paid))
    }

    /// Edits the paid amount directly; the `is_paid` flag is left alone.
    #[instrument(skip(self))]
    pub fn set_amount_paid(
        &mut self,
        event_key: &str,
        participant_key: &str,
        amount_paid: f64,
    ) -> ShukinResult<Participant> {
        let amount_paid = amount(amount_paid, "amount paid")?;
        self.with_participant(event_key, participant_key, |p| p.amount_paid = amount_paid)
    }

    #[instrument(skip(self))]
    pub fn remove_participant(
        &mut self,
        event_key: &str,
        participant_key: &str,
    ) -> ShukinResult<Participant> {
        self.with_event(event_key, |event| {
            let idx = position_by_key(&event.participants, participant_key, |p| p.id.as_str())
                .ok_or_else(|| ShukinError::not_found("participant", participant_key))?;
            Ok(event.participants.remove(idx))
        })
    }

    #[instrument(skip(self, input), fields(description = %input.description))]
    pub fn add_expense(&mut self, event_key: &str, input: NewExpense) -> ShukinResult<ExpenseItem> {
        let description = required(&input.description, "expense description")?;
        let value = amount(input.amount, "expense amount")?;
        let count = self.event(event_key)?.expenses.len();
        self.gate(LimitKind::ExpenseItems, count)?;

        self.with_event(event_key, |event| {
            let mut expense = ExpenseItem::new(description, value);
            expense.remarks = optional_text(input.remarks);
            event.expenses.push(expense.clone());
            info!(event_id = %event.id, expense_id = %expense.id, "added expense");
            Ok(expense)
        })
    }

    #[instrument(skip(self, patch))]
    pub fn update_expense(
        &mut self,
        event_key: &str,
        expense_key: &str,
        patch: ExpensePatch,
    ) -> ShukinResult<ExpenseItem> {
        let description = patch
            .description
            .as_deref()
            .map(|d| required(d, "expense description"))
            .transpose()?;
        let value = patch
            .amount
            .map(|a| amount(a, "expense amount"))
            .transpose()?;

        self.with_expense(event_key, expense_key, |e| {
            if let Some(description) = description {
                e.description = description;
            }
            if let Some(value) = value {
                e.amount = value;
            }
            if let Some(remarks) = patch.remarks {
                e.remarks = optional_text(remarks);
            }
        })
    }

    #[instrument(skip(self))]
    pub fn set_expense_paid(
        &mut self,
        event_key: &str,
        expense_key: &str,
        paid: bool,
    ) -> ShukinResult<ExpenseItem> {
        self.with_expense(event_key, expense_key, |e| e.is_paid = paid)
    }

    #[instrument(skip(self))]
    pub fn remove_expense(&mut self, event_key: &str, expense_key: &str) -> ShukinResult<ExpenseItem> {
        self.with_event(event_key, |event| {
            let idx = position_by_key(&event.expenses, expense_key, |e| e.id.as_str())
                .ok_or_else(|| ShukinError::not_found("expense", expense_key))?;
            Ok(event.expenses.remove(idx))
        })
    }

    /// Replaces the subscription as a whole; nothing changes if the write fails.
    #[instrument(skip(self))]
    pub fn set_subscription(&mut self, state: SubscriptionState) -> ShukinResult<()> {
        self.store.save_subscription(&state)?;
        info!(from = %self.subscription.plan, to = %state.plan, "subscription changed");
        self.subscription = state;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn toggle_theme(&mut self) -> ShukinResult<Theme> {
        let next = self.theme.toggled();
        self.store.save_theme(next)?;
        self.theme = next;
        Ok(next)
    }

    fn gate(&self, kind: LimitKind, count: usize) -> ShukinResult<()> {
        let limits = self.subscription.limits();
        if limits.allows(kind, count) {
            return Ok(());
        }
        let max = limits.cap(kind).unwrap_or(count);
        warn!(%kind, count, max, plan = %self.subscription.plan, "plan limit reached");
        Err(ShukinError::LimitExceeded {
            kind,
            plan: self.subscription.plan,
            max,
        })
    }

    fn event_index(&self, key: &str) -> ShukinResult<usize> {
        position_by_key(&self.events, key, |e| e.id.as_str()).ok_or_else(|| ShukinError::not_found("event", key))
    }

    fn commit(&mut self, next: Vec<Event>) -> ShukinResult<()> {
        self.store.save_events(&next)?;
        self.events = next;
        Ok(())
    }

    fn with_event<T, F>(&mut self, key: &str, f: F) -> ShukinResult<T>
    where
        F: FnOnce(&mut Event) -> ShukinResult<T>,
    {
        let idx = self.event_index(key)?;
        let mut next = self.events.clone();
        let out = f(&mut next[idx])?;
        self.commit(next)?;
        Ok(out)
    }

    fn with_participant<F>(&mut self, event_key: &str, key: &str, f: F) -> ShukinResult<Participant>
    where
        F: FnOnce(&mut Participant),
    {
        self.with_event(event_key, |event| {
            let p = position_by_key(&event.participants, key, |p| p.id.as_str())
                .and_then(|idx| event.participants.get_mut(idx))
                .ok_or_else(|| ShukinError::not_found("participant", key))?;
            f(p);
            Ok(p.clone())
        })
    }

    fn with_expense<F>(&mut self, event_key: &str, key: &str, f: F) -> ShukinResult<ExpenseItem>
    where
        F: FnOnce(&mut ExpenseItem),
    {
        self.with_event(event_key, |event| {
            let e = position_by_key(&event.expenses, key, |e| e.id.as_str())
                .and_then(|idx| event.expenses.get_mut(idx))
                .ok_or_else(|| ShukinError::not_found("expense", key))?;
            f(e);
            Ok(e.clone())
        })
    }
}

/// Exact id match, else a unique prefix of at least four characters.
fn position_by_key<T>(items: &[T], key: &str, id: impl Fn(&T) -> &str) -> Option<usize> {
    let key = key.trim();
    if let Some(idx) = items.iter().position(|item| id(item) == key) {
        return Some(idx);
    }
    if key.len() < MIN_PREFIX_LEN {
        return None;
    }

    let mut matches = items
        .iter()
        .enumerate()
        .filter(|(_, item)| id(item).starts_with(key));
    let (first, _) = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

fn required(value: &str, field: &'static str) -> ShukinResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ShukinError::MissingField { field });
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn amount(value: f64, field: &'static str) -> ShukinResult<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(ShukinError::InvalidField {
            field,
            reason: format!("expected a non-negative amount, got {value}"),
        });
    }
    Ok(value)
}

fn check_period(start: Option<NaiveDate>, end: Option<NaiveDate>) -> ShukinResult<()> {
    if let (Some(start), Some(end)) = (start, end)
        && end < start
    {
        return Err(ShukinError::InvalidField {
            field: "collection period",
            reason: format!("end {end} is before start {start}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use tempfile::{TempDir, tempdir};

    use super::{AppState, EventPatch, NewEvent, NewExpense, NewParticipant, position_by_key};
    use crate::datastore::DataStore;
    use crate::error::ShukinError;
    use crate::plan::SubscriptionState;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn fresh() -> (TempDir, AppState) {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let state = AppState::load(store, Utc::now()).expect("load state");
        (temp, state)
    }

    fn named(name: &str) -> NewEvent {
        NewEvent {
            name: name.to_string(),
            ..NewEvent::default()
        }
    }

    #[test]
    fn create_assigns_id_and_default_creation_date() {
        let (_temp, mut state) = fresh();
        let event = state
            .create_event(named("  Summer Party "), date(2025, 7, 1))
            .expect("create");
        assert_eq!(event.name, "Summer Party");
        assert_eq!(event.creation_date, "2025/7/1");
        assert!(event.collection_start_date.is_none());
        assert!(!event.id.is_empty());
    }

    #[test]
    fn blank_name_is_rejected_without_mutation() {
        let (_temp, mut state) = fresh();
        let err = state
            .create_event(named("   "), date(2025, 7, 1))
            .expect_err("blank name");
        assert!(err.is_validation());
        assert!(state.events().is_empty());
        assert!(!state.store().events_path.exists());
    }

    #[test]
    fn free_plan_stops_at_three_events() {
        let (_temp, mut state) = fresh();
        for i in 0..3 {
            state
                .create_event(named(&format!("event {i}")), date(2025, 7, 1))
                .expect("within limit");
        }
        let err = state
            .create_event(named("fourth"), date(2025, 7, 1))
            .expect_err("over limit");
        assert!(matches!(err, ShukinError::LimitExceeded { max: 3, .. }));
        assert_eq!(state.events().len(), 3);

        state
            .set_subscription(SubscriptionState::premium(None))
            .expect("upgrade");
        state
            .create_event(named("fourth"), date(2025, 7, 1))
            .expect("premium is unbounded");
        assert_eq!(state.events().len(), 4);
    }

    #[test]
    fn reversed_collection_period_is_rejected() {
        let (_temp, mut state) = fresh();
        let event = state
            .create_event(named("Trip"), date(2025, 7, 1))
            .expect("create");
        let err = state
            .update_event(
                &event.id,
                EventPatch {
                    collection_start_date: Some(Some(date(2025, 7, 10))),
                    collection_end_date: Some(Some(date(2025, 7, 1))),
                    ..EventPatch::default()
                },
            )
            .expect_err("reversed");
        assert!(err.is_validation());
        assert_eq!(state.event(&event.id).expect("event").collection_start_date, None);
    }

    #[test]
    fn paid_toggle_then_manual_amount() {
        let (_temp, mut state) = fresh();
        let event = state
            .create_event(named("Party"), date(2025, 7, 1))
            .expect("create");
        let p = state
            .add_participant(
                &event.id,
                NewParticipant {
                    name: "Aki".into(),
                    amount_owed: Some(5000.0),
                    ..NewParticipant::default()
                },
            )
            .expect("add participant");

        let p = state
            .set_participant_paid(&event.id, &p.id, true)
            .expect("mark paid");
        assert_eq!(p.amount_paid, 5000.0);

        let p = state
            .set_amount_paid(&event.id, &p.id, 3000.0)
            .expect("edit paid");
        assert!(p.is_paid);
        assert_eq!(state.totals(&event.id).expect("totals").total_paid, 3000.0);
    }

    #[test]
    fn negative_expense_is_rejected() {
        let (_temp, mut state) = fresh();
        let event = state
            .create_event(named("Party"), date(2025, 7, 1))
            .expect("create");
        let err = state
            .add_expense(
                &event.id,
                NewExpense {
                    description: "Refund".into(),
                    amount: -1.0,
                    remarks: None,
                },
            )
            .expect_err("negative");
        assert!(err.is_validation());
        assert!(state.event(&event.id).expect("event").expenses.is_empty());
    }

    #[test]
    fn participant_without_amount_is_rejected() {
        let (_temp, mut state) = fresh();
        let event = state
            .create_event(named("Party"), date(2025, 7, 1))
            .expect("create");
        let err = state
            .add_participant(
                &event.id,
                NewParticipant {
                    name: "Hanako".into(),
                    ..NewParticipant::default()
                },
            )
            .expect_err("amount is required");
        assert!(err.is_validation());
        assert!(state.event(&event.id).expect("event").participants.is_empty());
    }

    #[test]
    fn move_and_delete_events() {
        let (_temp, mut state) = fresh();
        let a = state.create_event(named("a"), date(2025, 7, 1)).expect("a");
        let b = state.create_event(named("b"), date(2025, 7, 1)).expect("b");
        state.move_event(&b.id, 0).expect("move");
        assert_eq!(state.events()[0].id, b.id);

        state.delete_event(&a.id).expect("delete");
        assert_eq!(state.events().len(), 1);
        assert!(matches!(
            state.event(&a.id),
            Err(ShukinError::NotFound { kind: "event", .. })
        ));
    }

    #[test]
    fn prefix_lookup_requires_unique_match() {
        let ids = vec!["abcd1234".to_string(), "abcd9999".to_string(), "ffff0000".to_string()];
        assert_eq!(position_by_key(&ids, "ffff", |s| s.as_str()), Some(2));
        assert_eq!(position_by_key(&ids, "abcd", |s| s.as_str()), None);
        assert_eq!(position_by_key(&ids, "abcd9", |s| s.as_str()), Some(1));
        assert_eq!(position_by_key(&ids, "ff", |s| s.as_str()), None);
    }

    #[test]
    fn theme_toggle_persists() {
        let temp = tempdir().expect("tempdir");
        let mut state =
            AppState::load(DataStore::open(temp.path()).expect("open"), Utc::now()).expect("load");
        state.toggle_theme().expect("toggle");

        let reloaded =
            AppState::load(DataStore::open(temp.path()).expect("open"), Utc::now()).expect("load");
        assert_eq!(reloaded.theme().as_key(), "dark");
    }
}
