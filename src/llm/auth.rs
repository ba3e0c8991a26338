//! Credential profile rotation for API providers.

use crate::env;
use crate::llm::config::AuthProfileConfig;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone)]
pub struct AuthProfile {
    api_key: String,
    label: Option<String>,
    cooldown: Duration,
    cooldown_until: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
}

impl AuthProfile {
    pub fn from_config(config: &AuthProfileConfig) -> Self {
        let minutes = config
            .cooldown_minutes
            .unwrap_or(env::api::DEFAULT_COOLDOWN_MINUTES);
        Self {
            api_key: config.api_key.clone(),
            label: config.label.clone(),
            cooldown: Duration::minutes(i64::from(minutes)),
            cooldown_until: None,
            last_used_at: None,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_until
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }
}

/// Ordered credential profiles plus the index of the one last handed out.
///
/// Resolution scans forward from that index and skips profiles in cooldown.
/// When every profile is cooling down the current one is used anyway, so a
/// call never fails just because all keys were recently rejected.
#[derive(Debug, Clone, Default)]
pub struct AuthProfileRing {
    profiles: Vec<AuthProfile>,
    cursor: usize,
}

impl AuthProfileRing {
    pub fn new(configs: &[AuthProfileConfig]) -> Self {
        Self {
            profiles: configs.iter().map(AuthProfile::from_config).collect(),
            cursor: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn profiles(&self) -> &[AuthProfile] {
        &self.profiles
    }

    /// Resolve the profile to use for a call at `now` and stamp it as used.
    pub fn active_profile(&mut self, now: DateTime<Utc>) -> Option<&AuthProfile> {
        let count = self.profiles.len();
        if count == 0 {
            return None;
        }

        let start = self.cursor % count;
        let index = (0..count)
            .map(|offset| (start + offset) % count)
            .find(|&i| !self.profiles[i].is_cooling_down(now))
            .unwrap_or(start);

        self.cursor = index;
        let profile = &mut self.profiles[index];
        profile.last_used_at = Some(now);
        Some(&*profile)
    }

    /// Put the current profile in cooldown and advance to the next one.
    pub fn mark_failure(&mut self, now: DateTime<Utc>) {
        let count = self.profiles.len();
        if count == 0 {
            return;
        }

        let index = self.cursor % count;
        let profile = &mut self.profiles[index];
        profile.cooldown_until = Some(now + profile.cooldown);
        self.cursor = (index + 1) % count;
    }
}
