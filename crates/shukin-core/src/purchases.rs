//! Purchase SDK wrapper and the plan transitions built on it.
//!
//! [`SubscriptionManager`] never touches storage. Each operation yields a
//! complete [`SubscriptionState`]; the caller swaps it into
//! [`crate::state::AppState`] in one step.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Months, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::plan::SubscriptionState;

pub const DEFAULT_ENTITLEMENT: &str = "premium";
pub const DEFAULT_PACKAGE: &str = "com.app0410.budgetshukin.premium.monthly";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    Ios,
    Android,
    #[default]
    Web,
}

impl Platform {
    pub fn as_key(self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Web => "web",
        }
    }

    pub fn is_native(self) -> bool {
        !matches!(self, Platform::Web)
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            "web" => Ok(Platform::Web),
            other => Err(anyhow!("unknown platform: {other}")),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    #[error("purchase service is not configured")]
    NotConfigured,
    #[error("purchase was cancelled")]
    Cancelled,
    #[error("purchase failed: {0}")]
    Failed(String),
    #[error("unknown package: {0}")]
    UnknownPackage(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    pub identifier: String,
    pub is_active: bool,
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomerInfo {
    pub entitlements: Vec<Entitlement>,
}

impl CustomerInfo {
    pub fn active(&self, identifier: &str) -> Option<&Entitlement> {
        self.entitlements
            .iter()
            .find(|e| e.identifier == identifier && e.is_active)
    }

    /// The configured entitlement being active means premium, carrying its
    /// expiration when the SDK reports one.
    pub fn subscription(&self, entitlement: &str) -> SubscriptionState {
        match self.active(entitlement) {
            Some(e) => SubscriptionState::premium(e.expiration),
            None => SubscriptionState::free(),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait PurchaseService {
    async fn configure(&self, api_key: &str, platform: Platform) -> Result<(), PurchaseError>;
    async fn customer_info(&self) -> Result<CustomerInfo, PurchaseError>;
    async fn purchase_package(&self, package_id: &str) -> Result<CustomerInfo, PurchaseError>;
    async fn restore_purchases(&self) -> Result<CustomerInfo, PurchaseError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseSettings {
    pub platform: Platform,
    pub api_key: Option<String>,
    pub entitlement: String,
    pub package: String,
}

impl Default for PurchaseSettings {
    fn default() -> Self {
        Self {
            platform: Platform::Web,
            api_key: None,
            entitlement: DEFAULT_ENTITLEMENT.to_string(),
            package: DEFAULT_PACKAGE.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct SubscriptionManager<P> {
    service: P,
    settings: PurchaseSettings,
    configured: bool,
}

impl<P: PurchaseService> SubscriptionManager<P> {
    pub fn new(service: P, settings: PurchaseSettings) -> Self {
        Self {
            service,
            settings,
            configured: false,
        }
    }

    pub fn settings(&self) -> &PurchaseSettings {
        &self.settings
    }

    pub fn service(&self) -> &P {
        &self.service
    }

    /// Native platforms need an API key; the web build runs keyless.
    #[instrument(skip(self), fields(platform = %self.settings.platform))]
    pub async fn configure(&mut self) -> Result<(), PurchaseError> {
        if self.configured {
            return Ok(());
        }
        let key = match (&self.settings.api_key, self.settings.platform.is_native()) {
            (Some(key), _) => key.as_str(),
            (None, false) => "",
            (None, true) => {
                warn!("no API key configured for native platform");
                return Err(PurchaseError::NotConfigured);
            }
        };
        self.service.configure(key, self.settings.platform).await?;
        self.configured = true;
        debug!("purchase service configured");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> Result<SubscriptionState, PurchaseError> {
        self.configure().await?;
        let info = self.service.customer_info().await?;
        Ok(info.subscription(&self.settings.entitlement))
    }

    #[instrument(skip(self), fields(package = %self.settings.package))]
    pub async fn upgrade(&mut self) -> Result<SubscriptionState, PurchaseError> {
        self.configure().await?;
        let info = self
            .service
            .purchase_package(&self.settings.package)
            .await
            .inspect_err(|err| warn!(error = %err, "purchase did not complete"))?;
        let state = info.subscription(&self.settings.entitlement);
        if !state.is_premium() {
            return Err(PurchaseError::Failed(format!(
                "entitlement {} not active after purchase",
                self.settings.entitlement
            )));
        }
        info!(expiry = ?state.expiry_date, "upgraded to premium");
        Ok(state)
    }

    /// Store subscriptions are cancelled from the platform's own settings;
    /// locally the plan simply reverts to free.
    #[instrument(skip(self))]
    pub async fn downgrade(&mut self) -> Result<SubscriptionState, PurchaseError> {
        info!("downgraded to free");
        Ok(SubscriptionState::free())
    }

    /// Free when nothing restorable exists.
    #[instrument(skip(self))]
    pub async fn restore(&mut self) -> Result<SubscriptionState, PurchaseError> {
        self.configure().await?;
        let info = self.service.restore_purchases().await?;
        let state = info.subscription(&self.settings.entitlement);
        if state.is_premium() {
            info!(expiry = ?state.expiry_date, "restored premium");
        } else {
            info!("no purchases to restore");
        }
        Ok(state)
    }
}

/// Development stand-in for the store SDK. A purchase grants the entitlement
/// for one calendar month from `now`.
#[derive(Debug)]
pub struct LocalPurchaseService {
    now: DateTime<Utc>,
    entitlement: String,
    package: String,
    configured: Cell<bool>,
    granted: RefCell<Option<DateTime<Utc>>>,
}

impl LocalPurchaseService {
    pub fn new(now: DateTime<Utc>, settings: &PurchaseSettings) -> Self {
        Self {
            now,
            entitlement: settings.entitlement.clone(),
            package: settings.package.clone(),
            configured: Cell::new(false),
            granted: RefCell::new(None),
        }
    }

    /// Seeds a previously granted expiry, e.g. the one read from disk.
    pub fn with_grant(self, expiry: Option<DateTime<Utc>>) -> Self {
        *self.granted.borrow_mut() = expiry;
        self
    }

    fn ensure_configured(&self) -> Result<(), PurchaseError> {
        if self.configured.get() {
            Ok(())
        } else {
            Err(PurchaseError::NotConfigured)
        }
    }

    fn info(&self) -> CustomerInfo {
        let granted = *self.granted.borrow();
        let entitlements = granted
            .filter(|expiry| *expiry > self.now)
            .map(|expiry| Entitlement {
                identifier: self.entitlement.clone(),
                is_active: true,
                expiration: Some(expiry),
            })
            .into_iter()
            .collect();
        CustomerInfo { entitlements }
    }
}

impl PurchaseService for LocalPurchaseService {
    async fn configure(&self, _api_key: &str, platform: Platform) -> Result<(), PurchaseError> {
        debug!(%platform, "local purchase service configured");
        self.configured.set(true);
        Ok(())
    }

    async fn customer_info(&self) -> Result<CustomerInfo, PurchaseError> {
        self.ensure_configured()?;
        Ok(self.info())
    }

    async fn purchase_package(&self, package_id: &str) -> Result<CustomerInfo, PurchaseError> {
        self.ensure_configured()?;
        if package_id != self.package {
            return Err(PurchaseError::UnknownPackage(package_id.to_string()));
        }
        let expiry = self
            .now
            .checked_add_months(Months::new(1))
            .ok_or_else(|| PurchaseError::Failed("expiry out of range".to_string()))?;
        *self.granted.borrow_mut() = Some(expiry);
        Ok(self.info())
    }

    async fn restore_purchases(&self) -> Result<CustomerInfo, PurchaseError> {
        self.ensure_configured()?;
        Ok(self.info())
    }
}
