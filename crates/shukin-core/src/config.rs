use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono_tz::Tz;
use tracing::{debug, info, trace, warn};

use crate::calendar::ViewMode;
use crate::dates::{self, DEFAULT_TIMEZONE};
use crate::layout::{DEFAULT_STACK_SLOTS, LayoutConfig};
use crate::purchases::{DEFAULT_ENTITLEMENT, DEFAULT_PACKAGE, Platform, PurchaseSettings};
use crate::retry::RetryPolicy;

const DEFAULTS: &[(&str, &str)] = &[
    ("data.location", "~/.shukin"),
    ("timezone", DEFAULT_TIMEZONE),
    ("color", "on"),
    ("calendar.view", "month"),
    ("ads.enabled", "on"),
    ("ads.retry.attempts", "3"),
    ("ads.retry.delay_ms", "5000"),
    ("purchases.platform", "web"),
    ("purchases.entitlement", DEFAULT_ENTITLEMENT),
    ("purchases.package", DEFAULT_PACKAGE),
];

#[derive(Debug, Clone)]
pub struct Config {
    map: HashMap<String, String>,
    pub loaded_files: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let mut map: HashMap<String, String> = DEFAULTS
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        map.insert(
            "calendar.stack_slots".to_string(),
            DEFAULT_STACK_SLOTS.to_string(),
        );
        Self {
            map,
            loaded_files: vec![],
        }
    }
}

impl Config {
    #[tracing::instrument(skip(rc_override))]
    pub fn load(rc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config::default();

        let rc = resolve_rc_path(rc_override)?;
        if let Some(path) = rc {
            info!(rc = %path.display(), "loading shukinrc");
            cfg.load_file(&path)?;
        } else {
            debug!("no shukinrc found; using defaults");
        }

        Ok(cfg)
    }

    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in overrides {
            let key = k.strip_prefix("rc.").unwrap_or(&k).to_string();
            debug!(key = %key, value = %v, "applying override");
            self.map.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.map.get(key).map(|v| parse_bool(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.map.iter()
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        match self.map.get(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(key, value = %raw, "unparseable config value; using default");
                default
            }),
        }
    }

    pub fn timezone(&self) -> Tz {
        dates::resolve_timezone(self.map.get("timezone").map(String::as_str))
    }

    pub fn color(&self) -> bool {
        self.get_bool("color").unwrap_or(true)
    }

    pub fn layout(&self) -> LayoutConfig {
        LayoutConfig::new(self.get_parsed("calendar.stack_slots", DEFAULT_STACK_SLOTS))
    }

    pub fn calendar_view(&self) -> ViewMode {
        self.get_parsed("calendar.view", ViewMode::Month)
    }

    pub fn ads_enabled(&self) -> bool {
        self.get_bool("ads.enabled").unwrap_or(true)
    }

    pub fn ad_retry(&self) -> RetryPolicy {
        let attempts = self.get_parsed("ads.retry.attempts", 3u32);
        let delay_ms = self.get_parsed("ads.retry.delay_ms", 5000u64);
        RetryPolicy::fixed(attempts, Duration::from_millis(delay_ms))
    }

    pub fn purchase_settings(&self) -> PurchaseSettings {
        let platform = self.get_parsed("purchases.platform", Platform::Web);
        let api_key = match platform {
            Platform::Web => None,
            native => self
                .get(&format!("purchases.api_key.{}", native.as_key()))
                .filter(|key| !key.trim().is_empty()),
        };
        PurchaseSettings {
            platform,
            api_key,
            entitlement: self
                .get("purchases.entitlement")
                .unwrap_or_else(|| DEFAULT_ENTITLEMENT.to_string()),
            package: self
                .get("purchases.package")
                .unwrap_or_else(|| DEFAULT_PACKAGE.to_string()),
        }
    }

    #[tracing::instrument(skip(self))]
    fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        self.loaded_files.push(path.clone());

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        for (line_num, raw_line) in text.lines().enumerate() {
            let mut line = raw_line.trim();
            if let Some((before, _)) = line.split_once('#') {
                line = before.trim();
            }
            if line.is_empty() {
                continue;
            }

            if let Some(include_rest) = line.strip_prefix("include ") {
                let include_path = resolve_include_path(&base_dir, include_rest.trim())?;
                debug!(
                    file = %path.display(),
                    include = %include_path.display(),
                    line = line_num + 1,
                    "processing include"
                );

                if self.loaded_files.contains(&include_path) {
                    warn!(include = %include_path.display(), "include cycle; skipping");
                } else if include_path.exists() {
                    self.load_file(&include_path)?;
                } else {
                    warn!(include = %include_path.display(), "include file does not exist; skipping");
                }
                continue;
            }

            let (k, v) = line.split_once('=').ok_or_else(|| {
                anyhow!(
                    "invalid config line {}:{}: {}",
                    path.display(),
                    line_num + 1,
                    raw_line
                )
            })?;

            let key = k.trim().to_string();
            let value = v.trim().to_string();
            trace!(key = %key, value = %value, "loaded config key");
            self.map.insert(key, value);
        }

        Ok(())
    }
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(cfg_value) = cfg.get("data.location") {
        expand_tilde(Path::new(&cfg_value))
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

#[tracing::instrument(skip(override_path))]
fn resolve_rc_path(override_path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = override_path {
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(rc_env) = std::env::var("SHUKINRC") {
        if rc_env == "/dev/null" {
            return Ok(None);
        }
        return Ok(Some(PathBuf::from(rc_env)));
    }

    let Some(home) = dirs::home_dir() else {
        warn!("cannot determine home directory; skipping ~/.shukinrc");
        return Ok(None);
    };
    let candidate = home.join(".shukinrc");
    if candidate.exists() {
        return Ok(Some(candidate));
    }

    Ok(None)
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".shukin"))
}

fn resolve_include_path(base_dir: &Path, include: &str) -> anyhow::Result<PathBuf> {
    if include.trim().is_empty() {
        return Err(anyhow!("include path cannot be empty"));
    }

    let raw = PathBuf::from(include);
    let expanded = expand_tilde(&raw);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "y" | "yes" | "on" | "true"
    )
}
