// SPDX-License-Identifier: MIT

//! Webhook appliers.
//!
//! Webhooks are at-least-once and lossy by nature: re-deliveries are
//! idempotent, unknown job ids are swallowed (with a diagnostic event),
//! and CI parse trouble never fails the caller.

use dg_core::{Clock, JobStatus};
use dg_storage::{JobUpdate, Store, StoreError};
use std::sync::Arc;
use tracing::{info, warn};

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// State moved.
    Updated,
    /// Delivery acknowledged but nothing changed; `reason` says why.
    Ignored { reason: String },
}

impl WebhookOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            WebhookOutcome::Updated => "updated",
            WebhookOutcome::Ignored { .. } => "ignored",
        }
    }
}

/// Apply a Windmill job status delivery.
///
/// Status map: `queued→queued, running→running, success|completed→
/// succeeded, failure|failed→failed, cancelled|canceled→cancelled`.
/// Unknown statuses and unknown job ids are ignored (the latter with a
/// `webhook_orphan_job` event for diagnostics).
pub fn apply_windmill_webhook<C: Clock>(
    store: &Arc<Store<C>>,
    windmill_job_id: &str,
    status: &str,
    result: Option<serde_json::Value>,
    error: Option<String>,
) -> Result<WebhookOutcome, StoreError> {
    let Some(new_status) = JobStatus::from_webhook(status) else {
        warn!(windmill_job_id, status, "unknown webhook status, ignoring");
        return Ok(WebhookOutcome::Ignored {
            reason: format!("unknown status '{status}'"),
        });
    };

    let Some(job) = store.job_by_windmill_id(windmill_job_id) else {
        // Unknown job id: swallowed for delivery safety, recorded so an
        // operator can see the drop.
        store.record_webhook_orphan(windmill_job_id.to_string(), status.to_string())?;
        return Ok(WebhookOutcome::Ignored {
            reason: "unknown windmill_job_id".into(),
        });
    };

    let (_, changed) = store.set_job_status(
        &job.run_id,
        new_status,
        JobUpdate {
            windmill_job_id: None,
            result,
            error,
        },
    )?;

    if changed {
        info!(
            windmill_job_id,
            run_id = %job.run_id,
            status = %new_status,
            "webhook applied"
        );
        Ok(WebhookOutcome::Updated)
    } else {
        Ok(WebhookOutcome::Ignored {
            reason: "status unchanged".into(),
        })
    }
}

/// Normalize a repository URL for matching: lowercase, no scheme, no
/// credentials, no trailing `.git` or slash.
pub fn normalize_repo_url(url: &str) -> String {
    let mut s = url.trim().to_lowercase();
    for prefix in ["https://", "http://", "ssh://", "git://"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.to_string();
            break;
        }
    }
    // git@host:org/repo form
    if let Some(rest) = s.strip_prefix("git@") {
        s = rest.replacen(':', "/", 1);
    }
    // user:pass@host
    if let Some(at) = s.find('@') {
        s = s[at + 1..].to_string();
    }
    s = s.trim_end_matches('/').to_string();
    s.trim_end_matches(".git").to_string()
}

/// Apply a CI webhook (GitHub/GitLab push, pipeline, etc).
///
/// Resolves the project by normalized repo URL and appends a `ci_event`.
/// Missing fields or unmatched projects never fail the webhook; the
/// caller always gets an acknowledgement.
pub fn apply_ci_webhook<C: Clock>(
    store: &Arc<Store<C>>,
    provider: &str,
    repo_url: Option<&str>,
    summary: Option<&str>,
) -> Result<WebhookOutcome, StoreError> {
    let Some(repo_url) = repo_url else {
        return Ok(WebhookOutcome::Ignored {
            reason: "no repository url in payload".into(),
        });
    };

    let normalized = normalize_repo_url(repo_url);
    let project_id = store
        .list_projects(None)
        .into_iter()
        .find(|p| {
            p.git_url
                .as_deref()
                .map(|u| normalize_repo_url(u) == normalized)
                .unwrap_or(false)
        })
        .map(|p| p.id);

    store.record_ci_event(
        provider.to_string(),
        project_id,
        normalized,
        summary.unwrap_or("ci event").to_string(),
    )?;

    Ok(WebhookOutcome::Updated)
}

#[cfg(test)]
#[path = "webhooks_tests.rs"]
mod tests;
