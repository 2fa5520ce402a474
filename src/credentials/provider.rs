//! Credential provider: the run's owner of profile state.
//!
//! The provider is constructed by the caller and passed into the pipeline.
//! Each profile sits behind its own async mutex, and `ensure_fresh` holds that
//! lock for the whole refresh, so at most one refresh per profile is ever in
//! flight even when requests are dispatched concurrently.

use super::{refresh::refresh_profile, CredentialError, CredentialProfile};
use chrono::Utc;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Timeout for credential refresh requests.
const REFRESH_TIMEOUT_SECS: u64 = 30;

/// Holds named credential profiles and refreshes them on demand.
#[derive(Debug)]
pub struct CredentialProvider {
    profiles: HashMap<String, Arc<Mutex<CredentialProfile>>>,
    /// Labels in load order.
    order: Vec<String>,
    active: Option<String>,
    client: reqwest::Client,
}

impl CredentialProvider {
    /// Creates a provider with its own refresh client.
    ///
    /// Refresh requests go straight to the auth endpoint, never through the
    /// interception proxy.
    pub fn new(profiles: Vec<CredentialProfile>) -> Result<Self, CredentialError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(REFRESH_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(profiles, client))
    }

    /// Creates a provider that refreshes through the given client.
    pub fn with_client(profiles: Vec<CredentialProfile>, client: reqwest::Client) -> Self {
        let mut map = HashMap::new();
        let mut order = Vec::new();

        for profile in profiles {
            if map.contains_key(&profile.label) {
                warn!("Duplicate credential profile '{}' ignored", profile.label);
                continue;
            }
            order.push(profile.label.clone());
            map.insert(profile.label.clone(), Arc::new(Mutex::new(profile)));
        }

        Self {
            profiles: map,
            order,
            active: None,
            client,
        }
    }

    /// Selects the profile applied to every request of the run.
    pub fn set_active(&mut self, label: &str) -> Result<(), CredentialError> {
        if !self.profiles.contains_key(label) {
            return Err(CredentialError::UnknownProfile(label.to_string()));
        }
        self.active = Some(label.to_string());
        Ok(())
    }

    pub fn active_label(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Profile labels in load order.
    pub fn labels(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Makes sure the profile holds a usable value.
    ///
    /// No-op for static profiles and valid dynamic ones; otherwise performs
    /// exactly one refresh. Callers waiting on a refresh already in flight
    /// observe its outcome instead of starting another.
    ///
    /// # Returns
    ///
    /// `Err` with the refresh failure; the profile is then `Unfetched` and the
    /// error is kept as its `last_error`.
    pub async fn ensure_fresh(&self, label: &str) -> Result<(), CredentialError> {
        let slot = self
            .profiles
            .get(label)
            .ok_or_else(|| CredentialError::UnknownProfile(label.to_string()))?;

        let mut profile = slot.lock().await;
        if !profile.needs_refresh(Utc::now()) {
            debug!("Credential '{}' is fresh", label);
            return Ok(());
        }

        refresh_profile(&self.client, &mut profile).await
    }

    /// Current state of one profile.
    pub async fn snapshot(&self, label: &str) -> Option<CredentialProfile> {
        let slot = self.profiles.get(label)?;
        let profile = slot.lock().await;
        Some(profile.clone())
    }

    /// Current state of every profile, in load order.
    ///
    /// Used to persist refreshed tokens at the end of a run.
    pub async fn snapshot_all(&self) -> Vec<CredentialProfile> {
        let mut profiles = Vec::with_capacity(self.order.len());
        for label in &self.order {
            if let Some(profile) = self.snapshot(label).await {
                profiles.push(profile);
            }
        }
        profiles
    }
}
