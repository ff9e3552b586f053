use std::fmt;

use tracing::{debug, info};

use crate::model::Event;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    EventDetail(String),
    Calendar,
    Plans,
    HowTo,
}

impl Route {
    /// `None` for paths no screen answers to.
    pub fn parse(path: &str) -> Option<Self> {
        let trimmed = path.trim();
        let trimmed = trimmed.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Some(Route::Home),
            ["events", id] => Some(Route::EventDetail((*id).to_string())),
            ["calendar"] => Some(Route::Calendar),
            ["plans"] => Some(Route::Plans),
            ["how-to"] => Some(Route::HowTo),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::EventDetail(id) => format!("/events/{id}"),
            Route::Calendar => "/calendar".to_string(),
            Route::Plans => "/plans".to_string(),
            Route::HowTo => "/how-to".to_string(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Screen<'a> {
    Home,
    EventDetail(&'a Event),
    Calendar,
    Plans,
    HowTo,
    Redirect { to: Route, reason: &'static str },
    NotFound { path: String, back: Route },
}

#[tracing::instrument(skip(state))]
pub fn resolve<'a>(path: &str, state: &'a AppState) -> Screen<'a> {
    let Some(route) = Route::parse(path) else {
        debug!("no route matches");
        return Screen::NotFound {
            path: path.to_string(),
            back: Route::Home,
        };
    };

    match route {
        Route::Home => Screen::Home,
        Route::EventDetail(id) => match state.event(&id) {
            Ok(event) => Screen::EventDetail(event),
            Err(_) => {
                debug!(event_id = %id, "event missing");
                Screen::NotFound {
                    path: path.to_string(),
                    back: Route::Home,
                }
            }
        },
        Route::Calendar if !state.subscription().is_premium() => {
            info!("calendar requires premium; redirecting");
            Screen::Redirect {
                to: Route::Home,
                reason: "the calendar is available on the premium plan",
            }
        }
        Route::Calendar => Screen::Calendar,
        Route::Plans => Screen::Plans,
        Route::HowTo => Screen::HowTo,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use tempfile::tempdir;

    use super::{Route, Screen, resolve};
    use crate::datastore::DataStore;
    use crate::plan::SubscriptionState;
    use crate::state::{AppState, NewEvent};

    #[test]
    fn parses_known_paths() {
        assert_eq!(Route::parse("/"), Some(Route::Home));
        assert_eq!(Route::parse(""), Some(Route::Home));
        assert_eq!(
            Route::parse("/events/abc-123/"),
            Some(Route::EventDetail("abc-123".into()))
        );
        assert_eq!(Route::parse("/how-to?tab=2"), Some(Route::HowTo));
        assert_eq!(Route::parse("/events"), None);
        assert_eq!(Route::parse("/settings"), None);
        assert_eq!(Route::EventDetail("x".into()).to_string(), "/events/x");
    }

    #[test]
    fn resolves_screens_against_state() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let mut state = AppState::load(store, Utc::now()).expect("load state");
        let today = NaiveDate::from_ymd_opt(2025, 3, 25).expect("valid date");
        let event = state
            .create_event(
                NewEvent {
                    name: "Drinks".into(),
                    ..NewEvent::default()
                },
                today,
            )
            .expect("create");

        let path = format!("/events/{}", event.id);
        assert!(matches!(resolve(&path, &state), Screen::EventDetail(e) if e.id == event.id));
        assert_eq!(
            resolve("/events/missing", &state),
            Screen::NotFound {
                path: "/events/missing".into(),
                back: Route::Home,
            }
        );
        assert!(matches!(
            resolve("/calendar", &state),
            Screen::Redirect { to: Route::Home, .. }
        ));

        state
            .set_subscription(SubscriptionState::premium(None))
            .expect("upgrade");
        assert_eq!(resolve("/calendar", &state), Screen::Calendar);
    }
}
