#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// A single server-sourced event attached to a session, such as a tool call
/// or a progress note. Activities are only returned by single-session
/// fetches, never by the list endpoint.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub kind: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Queued,
    Planning,
    InProgress,
    AwaitingPlanApproval,
    AwaitingUserFeedback,
    Completed,
    /// The remote stopped reporting the session while it was still active
    /// locally. Only reconciliation against the remote may set this, never a
    /// normal poll.
    CompletedUnknown,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        return matches!(
            self,
            SessionState::Completed | SessionState::CompletedUnknown
        );
    }

    pub fn is_active(&self) -> bool {
        return !self.is_terminal();
    }

    /// How long a session may sit in this state without an observed update
    /// before reconciliation treats it as stale.
    pub fn staleness_threshold(&self) -> Duration {
        match self {
            SessionState::Queued => return Duration::minutes(10),
            SessionState::Planning
            | SessionState::AwaitingPlanApproval
            | SessionState::AwaitingUserFeedback => return Duration::minutes(30),
            SessionState::InProgress => return Duration::hours(2),
            SessionState::Completed | SessionState::CompletedUnknown => return Duration::zero(),
        }
    }
}

/// A unit of remote work. `id` is the merge key; the remote owns every field
/// except the client-only set, which the list endpoint never carries and must
/// survive merges (see [`Session::merge_remote`]).
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub state: SessionState,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    /// `None` means "not yet fetched", which is different from an empty list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activities: Option<Vec<Activity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_poll_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewed_post_completion_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_locally_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_git_stats_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_latest_diffs: Option<String>,
}

impl Session {
    /// Merges an incoming remote record over this local one. The incoming
    /// record wins for every remote-owned field. Client-only fields are
    /// carried over from the local copy only when the incoming payload left
    /// them unset, so a push payload that embeds activities directly still
    /// takes precedence. Merging the same record twice yields the same
    /// result as merging it once.
    pub fn merge_remote(&self, incoming: &Session) -> Session {
        let mut merged = incoming.clone();

        if merged.activities.is_none() {
            merged.activities = self.activities.clone();
        }
        if merged.last_activity_poll_time.is_none() {
            merged.last_activity_poll_time = self.last_activity_poll_time;
        }
        if merged.viewed_post_completion_at.is_none() {
            merged.viewed_post_completion_at = self.viewed_post_completion_at;
        }
        if merged.merged_locally_at.is_none() {
            merged.merged_locally_at = self.merged_locally_at;
        }
        if merged.cached_git_stats_summary.is_none() {
            merged.cached_git_stats_summary = self.cached_git_stats_summary.clone();
        }
        if merged.cached_latest_diffs.is_none() {
            merged.cached_latest_diffs = self.cached_latest_diffs.clone();
        }

        return merged;
    }

    /// A locally-active session whose last observed update is older than its
    /// state's threshold has likely missed poll or push updates.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        if !self.state.is_active() {
            return false;
        }

        let last_seen = match self.update_time.or(self.create_time) {
            Some(time) => time,
            // No timestamps at all. Let reconciliation repair it.
            None => return true,
        };

        return now - last_seen > self.state.staleness_threshold();
    }
}
