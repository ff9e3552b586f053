use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::model::Event;
use crate::plan::SubscriptionState;
use crate::theme::Theme;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub events_path: PathBuf,
    pub subscription_path: PathBuf,
    pub theme_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventsSnapshot {
    version: u32,
    events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubscriptionRecord {
    version: u32,
    #[serde(flatten)]
    state: SubscriptionState,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let events_path = data_dir.join("events.json");
        let subscription_path = data_dir.join("subscription.json");
        let theme_path = data_dir.join("theme.data");

        info!(
            data_dir = %data_dir.display(),
            events = %events_path.display(),
            subscription = %subscription_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            events_path,
            subscription_path,
            theme_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_events(&self) -> anyhow::Result<Vec<Event>> {
        let Some(raw) = read_optional(&self.events_path)? else {
            return Ok(vec![]);
        };

        let value: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.events_path.display()))?;
        let events = if value.get("version").is_some() {
            let snapshot: EventsSnapshot = serde_json::from_value(value)
                .with_context(|| format!("failed parsing {}", self.events_path.display()))?;
            check_version(&self.events_path, snapshot.version)?;
            snapshot.events
        } else {
            let events: Vec<Event> = serde_json::from_value(value).with_context(|| {
                format!("failed parsing unversioned {}", self.events_path.display())
            })?;
            info!(count = events.len(), "read unversioned events snapshot");
            events
        };

        debug!(count = events.len(), "loaded events");
        Ok(events)
    }

    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    pub fn save_events(&self, events: &[Event]) -> anyhow::Result<()> {
        let snapshot = EventsSnapshot {
            version: SCHEMA_VERSION,
            events: events.to_vec(),
        };
        save_json_atomic(&self.events_path, &snapshot).context("failed to save events.json")
    }

    /// Reads the stored plan. A premium record past its expiry is cleared and
    /// reported as free.
    #[tracing::instrument(skip(self, now))]
    pub fn load_subscription(&self, now: DateTime<Utc>) -> anyhow::Result<SubscriptionState> {
        let Some(raw) = read_optional(&self.subscription_path)? else {
            return Ok(SubscriptionState::free());
        };

        let record: SubscriptionRecord = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.subscription_path.display()))?;
        check_version(&self.subscription_path, record.version)?;
        if record.state.is_expired(now) {
            warn!(expiry = ?record.state.expiry_date, "stored premium plan expired; reverting to free");
            self.clear_subscription()?;
            return Ok(SubscriptionState::free());
        }

        Ok(record.state)
    }

    #[tracing::instrument(skip(self))]
    pub fn save_subscription(&self, state: &SubscriptionState) -> anyhow::Result<()> {
        if !state.is_premium() {
            return self.clear_subscription();
        }
        let record = SubscriptionRecord {
            version: SCHEMA_VERSION,
            state: state.clone(),
        };
        save_json_atomic(&self.subscription_path, &record)
            .context("failed to save subscription.json")
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_subscription(&self) -> anyhow::Result<()> {
        if self.subscription_path.exists() {
            fs::remove_file(&self.subscription_path).with_context(|| {
                format!("failed removing {}", self.subscription_path.display())
            })?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn load_theme(&self) -> anyhow::Result<Theme> {
        let raw = read_optional(&self.theme_path)?.unwrap_or_default();
        Ok(Theme::from_key(raw.trim()).unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    pub fn save_theme(&self, theme: Theme) -> anyhow::Result<()> {
        save_atomic(&self.theme_path, |file| {
            writeln!(file, "{}", theme.as_key())?;
            Ok(())
        })
        .context("failed to save theme.data")
    }
}

fn read_optional(path: &Path) -> anyhow::Result<Option<String>> {
    if !path.exists() {
        debug!(file = %path.display(), "file absent; using defaults");
        return Ok(None);
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(raw))
}

fn check_version(path: &Path, version: u32) -> anyhow::Result<()> {
    if version > SCHEMA_VERSION {
        return Err(anyhow!(
            "{} has schema version {}, newer than supported {}",
            path.display(),
            version,
            SCHEMA_VERSION
        ));
    }
    Ok(())
}

#[tracing::instrument(skip(path, value))]
fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving json atomically");
    save_atomic(path, |file| {
        serde_json::to_writer_pretty(&mut *file, value)?;
        writeln!(file)?;
        Ok(())
    })
}

fn save_atomic(
    path: &Path,
    write: impl FnOnce(&mut NamedTempFile) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    write(&mut temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use super::DataStore;
    use crate::model::Event;
    use crate::plan::SubscriptionState;
    use crate::theme::Theme;

    #[test]
    fn missing_files_load_as_defaults() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        assert!(store.load_events().expect("load events").is_empty());
        assert_eq!(store.load_theme().expect("load theme"), Theme::Light);
        assert_eq!(
            store.load_subscription(Utc::now()).expect("load subscription"),
            SubscriptionState::free()
        );
    }

    #[test]
    fn legacy_array_snapshot_is_read() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        fs::write(
            &store.events_path,
            r#"[{"id":"1","name":"Drinks","date":"2025/3/25","description":"","collectionStartDate":"2025-03-25","collectionEndDate":"2025-04-03"}]"#,
        )
        .expect("write legacy");

        let events = store.load_events().expect("load legacy events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].creation_date, "2025/3/25");

        store.save_events(&events).expect("save");
        let raw = fs::read_to_string(&store.events_path).expect("read back");
        assert!(raw.contains("\"version\": 1"));
        assert!(raw.contains("\"creationDate\""));
    }

    #[test]
    fn newer_schema_version_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        fs::write(&store.events_path, r#"{"version": 99, "events": []}"#).expect("write");
        assert!(store.load_events().is_err());
    }

    #[test]
    fn bad_field_in_versioned_snapshot_is_reported() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        fs::write(
            &store.events_path,
            r#"{"version": 1, "events": [{"id": 7, "name": "Drinks"}]}"#,
        )
        .expect("write");
        let err = store.load_events().expect_err("bad id type");
        let message = format!("{err:#}");
        assert!(message.contains("invalid type"), "{message}");
        assert!(!message.contains("did not match any variant"), "{message}");
    }

    #[test]
    fn newer_subscription_version_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        store
            .save_subscription(&SubscriptionState::premium(None))
            .expect("save");
        let raw = fs::read_to_string(&store.subscription_path).expect("read");
        fs::write(
            &store.subscription_path,
            raw.replace("\"version\": 1", "\"version\": 99"),
        )
        .expect("rewrite");
        assert!(store.load_subscription(Utc::now()).is_err());
    }

    #[test]
    fn theme_is_saved_without_leftover_temp_files() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        store.save_theme(Theme::Dark).expect("save dark");
        store.save_theme(Theme::Light).expect("save light");
        store.save_theme(Theme::Dark).expect("save dark again");
        assert_eq!(store.load_theme().expect("load"), Theme::Dark);
        let entries = fs::read_dir(temp.path()).expect("read dir").count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn expired_subscription_record_is_cleared() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let now = Utc
            .with_ymd_and_hms(2025, 6, 1, 0, 0, 0)
            .single()
            .expect("valid now");

        store
            .save_subscription(&SubscriptionState::premium(Some(now - Duration::days(2))))
            .expect("save");
        assert!(store.subscription_path.exists());

        let loaded = store.load_subscription(now).expect("load");
        assert_eq!(loaded, SubscriptionState::free());
        assert!(!store.subscription_path.exists());
    }

    #[test]
    fn events_round_trip() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let event = Event::new("Camp".into(), "fees".into(), "2025/8/1".into());
        store.save_events(std::slice::from_ref(&event)).expect("save");
        assert_eq!(store.load_events().expect("load"), vec![event]);
    }
}
