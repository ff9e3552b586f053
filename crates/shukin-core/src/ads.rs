//! Ad display behind a plan gate.
//!
//! [`AdManager`] owns the bookkeeping the SDK does not: whether the SDK came
//! up, whether a banner is on screen, and whether an interstitial is loading.
//! Every public call resolves to a `bool`; SDK failures are logged and kept
//! as `last_error`, never propagated to the caller.

use std::cell::Cell;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::retry::RetryPolicy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdError {
    #[error("ad SDK is not initialized")]
    NotInitialized,
    #[error("ad SDK unavailable: {0}")]
    Unavailable(String),
    #[error("ad failed to load: {0}")]
    LoadFailed(String),
    #[error("ad failed to show: {0}")]
    ShowFailed(String),
}

/// Native ad SDK surface. Implementations use interior mutability so calls
/// can be retried through a shared reference.
#[allow(async_fn_in_trait)]
pub trait AdService {
    async fn initialize(&self) -> Result<(), AdError>;
    async fn show_banner(&self) -> Result<(), AdError>;
    async fn hide_banner(&self) -> Result<(), AdError>;
    async fn resume_banner(&self) -> Result<(), AdError>;
    async fn prepare_interstitial(&self) -> Result<(), AdError>;
    async fn show_interstitial(&self) -> Result<(), AdError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdStatus {
    pub available: bool,
    pub banner_visible: bool,
    pub interstitial_loading: bool,
    pub interstitial_ready: bool,
    pub reload_pending: bool,
    pub last_error: Option<AdError>,
}

#[derive(Debug)]
pub struct AdManager<S> {
    service: S,
    retry: RetryPolicy,
    enabled: bool,
    premium: bool,
    status: AdStatus,
}

impl<S: AdService> AdManager<S> {
    pub fn new(service: S, retry: RetryPolicy) -> Self {
        Self {
            service,
            retry,
            enabled: true,
            premium: false,
            status: AdStatus::default(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn set_premium(&mut self, premium: bool) {
        self.premium = premium;
    }

    pub fn status(&self) -> &AdStatus {
        &self.status
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    fn record(&mut self, op: &str, err: AdError) {
        warn!(op, error = %err, "ad SDK call failed");
        self.status.last_error = Some(err);
    }

    fn skip_reason(&self) -> Option<&'static str> {
        if !self.enabled {
            Some("disabled")
        } else if self.premium {
            Some("premium user")
        } else if !self.status.available {
            Some("not available")
        } else {
            None
        }
    }

    #[instrument(skip(self))]
    pub async fn initialize(&mut self) -> bool {
        if !self.enabled {
            debug!("ads disabled; skipping initialization");
            return false;
        }
        match self.service.initialize().await {
            Ok(()) => {
                info!("ad SDK initialized");
                self.status.available = true;
                self.status.last_error = None;
                true
            }
            Err(err) => {
                self.status.available = false;
                self.record("initialize", err);
                false
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn show_banner(&mut self) -> bool {
        if let Some(reason) = self.skip_reason() {
            debug!(reason, "banner skipped");
            return false;
        }
        match self.service.show_banner().await {
            Ok(()) => {
                self.status.banner_visible = true;
                true
            }
            Err(err) => {
                self.status.banner_visible = false;
                self.record("show_banner", err);
                false
            }
        }
    }

    /// Hiding is allowed on any plan so an upgrade can take the banner down.
    #[instrument(skip(self))]
    pub async fn hide_banner(&mut self) -> bool {
        if !self.status.available {
            return false;
        }
        match self.service.hide_banner().await {
            Ok(()) => {
                self.status.banner_visible = false;
                true
            }
            Err(err) => {
                self.record("hide_banner", err);
                false
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn resume_banner(&mut self) -> bool {
        if let Some(reason) = self.skip_reason() {
            debug!(reason, "banner resume skipped");
            return false;
        }
        match self.service.resume_banner().await {
            Ok(()) => {
                self.status.banner_visible = true;
                true
            }
            Err(err) => {
                self.record("resume_banner", err);
                false
            }
        }
    }

    /// Loads the next interstitial through the retry policy. A second call
    /// while one is loading is refused.
    #[instrument(skip(self))]
    pub async fn prepare_interstitial(&mut self) -> bool {
        if let Some(reason) = self.skip_reason() {
            debug!(reason, "interstitial preparation skipped");
            return false;
        }
        if self.status.interstitial_loading {
            debug!("interstitial preparation skipped (already loading)");
            return false;
        }

        self.status.interstitial_loading = true;
        let service = &self.service;
        let result = self
            .retry
            .run("prepare_interstitial", move |_| service.prepare_interstitial())
            .await;
        self.status.interstitial_loading = false;

        match result {
            Ok(()) => {
                self.status.interstitial_ready = true;
                self.status.reload_pending = false;
                true
            }
            Err(err) => {
                self.status.interstitial_ready = false;
                self.record("prepare_interstitial", err);
                false
            }
        }
    }

    /// Shows the loaded interstitial; resolves once it is dismissed, after
    /// which the next one is preloaded. A failed show leaves
    /// `reload_pending` set for [`AdManager::recover_interstitial`].
    #[instrument(skip(self))]
    pub async fn show_interstitial(&mut self) -> bool {
        if let Some(reason) = self.skip_reason() {
            debug!(reason, "interstitial skipped");
            return false;
        }
        if self.status.interstitial_loading {
            debug!("interstitial show skipped (still loading)");
            return false;
        }

        match self.service.show_interstitial().await {
            Ok(()) => {
                self.status.interstitial_ready = false;
                info!("interstitial dismissed; preloading next");
                self.prepare_interstitial().await;
                true
            }
            Err(err) => {
                self.status.interstitial_ready = false;
                self.status.reload_pending = true;
                self.record("show_interstitial", err);
                false
            }
        }
    }

    /// Waits one backoff step, then re-prepares after a failed show.
    #[instrument(skip(self))]
    pub async fn recover_interstitial(&mut self) -> bool {
        if !self.status.reload_pending {
            return false;
        }
        tokio::time::sleep(self.retry.backoff.delay_for(1)).await;
        self.prepare_interstitial().await
    }
}

/// Stand-in for contexts without the native SDK: nothing is fetched, the
/// front end draws a local placeholder instead.
#[derive(Debug, Default)]
pub struct PlaceholderAds {
    banner_visible: Cell<bool>,
    impressions: Cell<u32>,
}

impl PlaceholderAds {
    pub const BANNER_TEXT: &'static str = "Ad banner (placeholder)";

    pub fn banner_visible(&self) -> bool {
        self.banner_visible.get()
    }

    pub fn impressions(&self) -> u32 {
        self.impressions.get()
    }
}

impl AdService for PlaceholderAds {
    async fn initialize(&self) -> Result<(), AdError> {
        debug!("placeholder ads ready");
        Ok(())
    }

    async fn show_banner(&self) -> Result<(), AdError> {
        self.banner_visible.set(true);
        self.impressions.set(self.impressions.get() + 1);
        Ok(())
    }

    async fn hide_banner(&self) -> Result<(), AdError> {
        self.banner_visible.set(false);
        Ok(())
    }

    async fn resume_banner(&self) -> Result<(), AdError> {
        self.show_banner().await
    }

    async fn prepare_interstitial(&self) -> Result<(), AdError> {
        Ok(())
    }

    async fn show_interstitial(&self) -> Result<(), AdError> {
        self.impressions.set(self.impressions.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::{AdError, AdManager, AdService, PlaceholderAds};
    use crate::retry::RetryPolicy;

    #[derive(Default)]
    struct ScriptedAds {
        prepare_results: RefCell<VecDeque<Result<(), AdError>>>,
        show_results: RefCell<VecDeque<Result<(), AdError>>>,
        prepare_calls: Cell<u32>,
        banner_calls: Cell<u32>,
    }

    impl AdService for ScriptedAds {
        async fn initialize(&self) -> Result<(), AdError> {
            Ok(())
        }

        async fn show_banner(&self) -> Result<(), AdError> {
            self.banner_calls.set(self.banner_calls.get() + 1);
            Ok(())
        }

        async fn hide_banner(&self) -> Result<(), AdError> {
            Ok(())
        }

        async fn resume_banner(&self) -> Result<(), AdError> {
            Ok(())
        }

        async fn prepare_interstitial(&self) -> Result<(), AdError> {
            self.prepare_calls.set(self.prepare_calls.get() + 1);
            self.prepare_results.borrow_mut().pop_front().unwrap_or(Ok(()))
        }

        async fn show_interstitial(&self) -> Result<(), AdError> {
            self.show_results.borrow_mut().pop_front().unwrap_or(Ok(()))
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn premium_users_see_no_ads() {
        let mut ads = AdManager::new(ScriptedAds::default(), policy());
        assert!(ads.initialize().await);
        ads.set_premium(true);
        assert!(!ads.show_banner().await);
        assert!(!ads.prepare_interstitial().await);
        assert!(!ads.show_interstitial().await);
        assert_eq!(ads.service().banner_calls.get(), 0);
        assert_eq!(ads.service().prepare_calls.get(), 0);
    }

    #[tokio::test]
    async fn nothing_runs_before_initialization() {
        let mut ads = AdManager::new(PlaceholderAds::default(), policy());
        assert!(!ads.show_banner().await);
        assert!(!ads.service().banner_visible());
    }

    #[tokio::test]
    async fn disabled_manager_never_initializes() {
        let mut ads = AdManager::new(PlaceholderAds::default(), policy()).with_enabled(false);
        assert!(!ads.initialize().await);
        assert!(!ads.status().available);
    }

    #[tokio::test(start_paused = true)]
    async fn prepare_retries_failed_loads() {
        let service = ScriptedAds::default();
        service
            .prepare_results
            .borrow_mut()
            .extend([Err(AdError::LoadFailed("no fill".into())), Ok(())]);
        let mut ads = AdManager::new(service, policy());
        ads.initialize().await;

        assert!(ads.prepare_interstitial().await);
        assert_eq!(ads.service().prepare_calls.get(), 2);
        assert!(ads.status().interstitial_ready);
        assert!(!ads.status().interstitial_loading);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_show_is_recovered_later() {
        let service = ScriptedAds::default();
        service
            .show_results
            .borrow_mut()
            .push_back(Err(AdError::ShowFailed("activity gone".into())));
        let mut ads = AdManager::new(service, policy());
        ads.initialize().await;
        assert!(ads.prepare_interstitial().await);

        assert!(!ads.show_interstitial().await);
        assert!(ads.status().reload_pending);
        assert_eq!(
            ads.status().last_error,
            Some(AdError::ShowFailed("activity gone".into()))
        );

        assert!(ads.recover_interstitial().await);
        assert!(!ads.status().reload_pending);
        assert!(ads.status().interstitial_ready);
    }

    #[tokio::test]
    async fn successful_show_preloads_next() {
        let mut ads = AdManager::new(ScriptedAds::default(), policy());
        ads.initialize().await;
        assert!(ads.show_interstitial().await);
        assert_eq!(ads.service().prepare_calls.get(), 1);
        assert!(ads.status().interstitial_ready);
    }

    #[tokio::test]
    async fn placeholder_banner_toggles() {
        let mut ads = AdManager::new(PlaceholderAds::default(), RetryPolicy::none());
        ads.initialize().await;
        assert!(ads.show_banner().await);
        assert!(ads.service().banner_visible());
        assert!(ads.hide_banner().await);
        assert!(!ads.status().banner_visible);
        assert_eq!(ads.service().impressions(), 1);
    }
}
