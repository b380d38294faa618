//! Preference resolution
//!
//! Loads the stored preferences matching each requested scope, merges them as
//! priority-tagged snapshots, and evaluates opt-out, per-channel overrides,
//! provider preferences, quiet hours, and subscription filters in that order.
//! The first denying step fixes the reason; later steps never overwrite it.

pub mod merge;
pub mod quiet_hours;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::data::repos::{PreferenceRepo, RepoError};
use crate::data::types::{Metadata, Preference, QuietHours};

use merge::{MergedView, Snapshot, merge};

/// Scope layer priorities; higher wins.
pub const PRIORITY_USER: i32 = 300;
pub const PRIORITY_TENANT: i32 = 200;
pub const PRIORITY_SYSTEM: i32 = 100;
const PRIORITY_DEFAULTS: i32 = 0;

/// A scope to load preferences for, with its merge priority.
#[derive(Debug, Clone)]
pub struct ScopeRef {
    pub subject_type: String,
    pub subject_id: String,
    pub priority: i32,
}

impl ScopeRef {
    pub fn user(subject_id: impl Into<String>) -> Self {
        Self {
            subject_type: "user".into(),
            subject_id: subject_id.into(),
            priority: PRIORITY_USER,
        }
    }

    pub fn tenant(subject_id: impl Into<String>) -> Self {
        Self {
            subject_type: "tenant".into(),
            subject_id: subject_id.into(),
            priority: PRIORITY_TENANT,
        }
    }

    pub fn system() -> Self {
        Self {
            subject_type: "system".into(),
            subject_id: "default".into(),
            priority: PRIORITY_SYSTEM,
        }
    }

    fn layer(&self) -> String {
        format!("{}:{}", self.subject_type, self.subject_id)
    }
}

/// Why an evaluation allowed or denied delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Default,
    OptOut,
    QuietHours,
    ChannelOverride,
    SubscriptionFilter,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::OptOut => "opt-out",
            Self::QuietHours => "quiet-hours",
            Self::ChannelOverride => "channel-override",
            Self::SubscriptionFilter => "subscription-filter",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct EvaluateRequest {
    pub definition_code: String,
    /// Base channel under evaluation
    pub channel: String,
    /// Scopes to load, typically user, tenant, system
    pub scopes: Vec<ScopeRef>,
    /// Normalized (lowercase) subscription codes from the request context
    pub subscriptions: Vec<String>,
    /// Evaluation instant; `None` means now
    pub timestamp: Option<DateTime<Utc>>,
    /// Enabled value of the synthetic defaults layer; `None` means allowed
    pub default_enabled: Option<bool>,
}

/// One resolved path and the layer that supplied it.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub path: String,
    pub layer: String,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub allowed: bool,
    pub reason: Reason,
    pub quiet_hours_active: bool,
    /// Provider override for the channel, when a layer sets one
    pub provider: Option<String>,
    pub trace: Vec<TraceEntry>,
}

impl Evaluation {
    fn deny(&mut self, reason: Reason) {
        // The first denial fixes the reason
        if self.allowed {
            self.allowed = false;
            self.reason = reason;
        }
    }
}

pub struct PreferenceResolver {
    repo: Arc<dyn PreferenceRepo>,
}

impl PreferenceResolver {
    pub fn new(repo: Arc<dyn PreferenceRepo>) -> Self {
        Self { repo }
    }

    pub async fn evaluate(&self, request: &EvaluateRequest) -> Result<Evaluation, RepoError> {
        let mut snapshots = Vec::with_capacity(request.scopes.len() + 1);
        for scope in &request.scopes {
            let preference = self
                .repo
                .get_by_subject(
                    &scope.subject_type,
                    &scope.subject_id,
                    &request.definition_code,
                    &request.channel,
                )
                .await?;
            if let Some(preference) = preference {
                snapshots.push(Snapshot::new(
                    scope.layer(),
                    scope.priority,
                    snapshot_values(&preference),
                ));
            }
        }

        let mut defaults = Metadata::new();
        defaults.insert("enabled".into(), request.default_enabled.unwrap_or(true).into());
        snapshots.push(Snapshot::new("defaults", PRIORITY_DEFAULTS, defaults));

        let view = merge(snapshots);
        Ok(self.evaluate_view(request, &view))
    }

    fn evaluate_view(&self, request: &EvaluateRequest, view: &MergedView) -> Evaluation {
        let mut evaluation = Evaluation {
            allowed: true,
            reason: Reason::Default,
            quiet_hours_active: false,
            provider: None,
            trace: Vec::new(),
        };

        // 1. Opt-out
        record_trace(&mut evaluation.trace, view, "enabled");
        if view.get_bool("enabled") == Some(false) {
            evaluation.deny(Reason::OptOut);
        }

        // 2. Per-channel enable override
        let channel_enabled_path = format!("rules.channels.{}.enabled", request.channel);
        record_trace(&mut evaluation.trace, view, &channel_enabled_path);
        if view.get_bool(&channel_enabled_path) == Some(false) {
            evaluation.deny(Reason::ChannelOverride);
        }

        // 3. Provider override: channel-specific beats the general rule
        let channel_provider_path = format!("rules.channels.{}.provider", request.channel);
        let provider = if let Some(p) = view.get_str(&channel_provider_path) {
            record_trace(&mut evaluation.trace, view, &channel_provider_path);
            Some(p)
        } else if let Some(p) = view.get_str("rules.provider") {
            record_trace(&mut evaluation.trace, view, "rules.provider");
            Some(p)
        } else {
            None
        };
        evaluation.provider = provider.map(|p| p.to_ascii_lowercase());

        // 4. Quiet hours
        if let Some(raw) = view.get("quiet_hours")
            && let Ok(quiet) = serde_json::from_value::<QuietHours>(raw.clone())
        {
            record_trace(&mut evaluation.trace, view, "quiet_hours");
            let at = request.timestamp.unwrap_or_else(Utc::now);
            if quiet_hours::is_active(&quiet, at) {
                evaluation.quiet_hours_active = true;
                evaluation.deny(Reason::QuietHours);
            }
        }

        // 5. Subscription filter
        if let Some(raw) = view.get("rules.subscriptions") {
            let allowed_codes = crate::utils::strings::normalize_string_list(raw);
            if !allowed_codes.is_empty() {
                record_trace(&mut evaluation.trace, view, "rules.subscriptions");
                let intersects = request
                    .subscriptions
                    .iter()
                    .any(|s| allowed_codes.contains(&s.to_ascii_lowercase()));
                if !intersects {
                    evaluation.deny(Reason::SubscriptionFilter);
                }
            }
        }

        evaluation
    }
}

fn record_trace(trace: &mut Vec<TraceEntry>, view: &MergedView, path: &str) {
    if let (Some(value), Some(layer)) = (view.get(path), view.source_of(path)) {
        trace.push(TraceEntry {
            path: path.to_string(),
            layer: layer.to_string(),
            value: value.clone(),
        });
    }
}

fn snapshot_values(preference: &Preference) -> Metadata {
    let mut values = Metadata::new();
    if let Some(enabled) = preference.enabled {
        values.insert("enabled".into(), enabled.into());
    }
    if let Some(locale) = &preference.locale {
        values.insert("locale".into(), locale.clone().into());
    }
    if let Some(quiet) = &preference.quiet_hours
        && let Ok(raw) = serde_json::to_value(quiet)
    {
        values.insert("quiet_hours".into(), raw);
    }
    if !preference.additional_rules.is_empty() {
        values.insert("rules".into(), Value::Object(preference.additional_rules.clone()));
    }
    values
}
