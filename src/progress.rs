// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Progress document layout.
//!
//! Specify the layout of the __progress document__, the single JSON file that
//! describes a fixed batch of work items, to simplify serialization and
//! deserialization. File I/O is left to [`ProgressStore`].
//!
//! # Work Item Lifecycle
//!
//! Work items start out `pending`. A claim moves an item to `in-progress`
//! and attaches a [`ClaimInfo`]. From there an item either goes back to
//! `pending` through a release or a stale reclamation, or moves on to
//! `completed`, which is terminal.
//!
//! # Counters
//!
//! The `completed` and `inProgress` counters are projections of the item
//! list. They are recomputed through [`ProgressDocument::recompute_counters`]
//! after every mutation and are never edited by hand.
//!
//! [`ProgressStore`]: crate::store::ProgressStore

use crate::session::SessionId;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    str::FromStr,
    time::Duration,
};

/// Default staleness threshold for claims, ten minutes.
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Progress document layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDocument {
    /// Format identifier, informational only.
    pub version: String,

    /// Number of work items in the batch.
    pub total_commands: usize,

    /// Number of completed work items.
    pub completed: usize,

    /// Number of in-progress work items.
    pub in_progress: usize,

    /// Time of last mutation.
    pub last_updated: DateTime<Utc>,

    /// Work items in claim priority order.
    pub commands: Vec<WorkItem>,

    /// Top-level fields not modeled above, kept verbatim across saves.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressDocument {
    /// Construct new document over `commands` with counters already derived.
    pub fn new(commands: Vec<WorkItem>, now: DateTime<Utc>) -> Self {
        let mut document = Self {
            version: "1.0".into(),
            total_commands: commands.len(),
            completed: 0,
            in_progress: 0,
            last_updated: now,
            commands,
            extra: Map::new(),
        };
        document.recompute_counters(now);
        document
    }

    /// Recompute derived counters and touch the update time.
    pub fn recompute_counters(&mut self, now: DateTime<Utc>) {
        self.completed = self.count(TaskStatus::Completed);
        self.in_progress = self.count(TaskStatus::InProgress);
        self.last_updated = now;
    }

    /// Count work items with given status.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.commands.iter().filter(|item| item.status == status).count()
    }

    /// Count in-progress work items whose claim has gone stale.
    pub fn count_stale(&self, now: DateTime<Utc>, timeout: Duration) -> usize {
        self.commands
            .iter()
            .filter(|item| item.is_stale(now, timeout))
            .count()
    }

    /// Find first work item that may be claimed.
    ///
    /// Pending items and stale in-progress items are claimable. Items are
    /// scanned in order, so the first match always wins.
    pub fn find_claimable_mut(
        &mut self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Option<&mut WorkItem> {
        self.commands.iter_mut().find(|item| {
            item.status == TaskStatus::Pending || item.is_stale(now, timeout)
        })
    }

    /// Find work item by identifier.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut WorkItem> {
        self.commands.iter_mut().find(|item| item.id == id)
    }

    /// Find work item by identifier.
    pub fn find(&self, id: &str) -> Option<&WorkItem> {
        self.commands.iter().find(|item| item.id == id)
    }
}

impl FromStr for ProgressDocument {
    type Err = ProgressError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(data).map_err(ProgressError::InvalidFormat)?;

        // INVARIANT: Structural checks run before typed deserialization.
        let object = value
            .as_object()
            .ok_or_else(|| ProgressError::InvalidSchema("not an object".into()))?;
        if !object.get("commands").is_some_and(Value::is_array) {
            return Err(ProgressError::InvalidSchema("commands is not an array".into()));
        }
        for counter in ["totalCommands", "completed", "inProgress"] {
            if !object.get(counter).is_some_and(Value::is_u64) {
                return Err(ProgressError::InvalidSchema(
                    "missing or invalid counters".into(),
                ));
            }
        }

        serde_json::from_value(value).map_err(|err| ProgressError::InvalidSchema(err.to_string()))
    }
}

impl Display for ProgressDocument {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            serde_json::to_string_pretty(self)
                .map_err(ProgressError::Serialize)?
                .as_str(),
        )
    }
}

/// One unit of work.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Unique identifier within the document.
    pub id: String,

    /// Human readable name.
    pub name: String,

    /// Path of the file this item is about.
    #[serde(default)]
    pub filepath: String,

    /// Grouping namespace.
    #[serde(default)]
    pub namespace: String,

    /// Current lifecycle state.
    pub status: TaskStatus,

    /// Time of last status transition.
    #[serde(default)]
    pub last_modified: DateTime<Utc>,

    /// Present if and only if the item is in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<ClaimInfo>,

    /// Improvement labels recorded on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvements: Option<Vec<String>>,

    /// Quality metrics gathered while working on the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<CommandMetrics>,

    /// Item fields not modeled above, kept verbatim across saves.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkItem {
    /// Construct new pending work item.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        filepath: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            filepath: filepath.into(),
            namespace: namespace.into(),
            status: TaskStatus::Pending,
            last_modified: Utc::now(),
            claimed_by: None,
            improvements: None,
            metrics: None,
            extra: Map::new(),
        }
    }

    /// Check if item is in progress under a claim older than `timeout`.
    ///
    /// Staleness is a view computed at read time. A stale item stays in
    /// progress until a claim, cleanup, or release actually runs.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.status == TaskStatus::InProgress
            && self
                .claimed_by
                .as_ref()
                .is_some_and(|claim| claim.is_older_than(now, timeout))
    }

    /// Check if item is currently claimed by `session_id`.
    pub fn is_claimed_by(&self, session_id: &str) -> bool {
        self.claimed_by
            .as_ref()
            .is_some_and(|claim| claim.session_id == *session_id)
    }

    /// Move item into progress under a fresh claim.
    pub fn claim(&mut self, session_id: SessionId, now: DateTime<Utc>) {
        self.status = TaskStatus::InProgress;
        self.claimed_by = Some(ClaimInfo {
            session_id,
            timestamp: now.timestamp(),
        });
        self.last_modified = now;
    }

    /// Mark item as completed with given improvement labels.
    pub fn complete(&mut self, improvements: Vec<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.claimed_by = None;
        self.improvements = Some(improvements);
        self.last_modified = now;
    }

    /// Return item to pending state.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Pending;
        self.claimed_by = None;
        self.last_modified = now;
    }
}

/// Lifecycle state of a work item.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl Display for TaskStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Pending => fmt.write_str("pending"),
            Self::InProgress => fmt.write_str("in-progress"),
            Self::Completed => fmt.write_str("completed"),
        }
    }
}

/// Ownership token of an in-progress work item.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimInfo {
    /// Session that holds the claim.
    pub session_id: SessionId,

    /// Claim time in seconds since the Unix epoch.
    pub timestamp: i64,
}

impl ClaimInfo {
    /// Check if claim was made more than `timeout` before `now`.
    pub fn is_older_than(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let threshold = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
        now.timestamp().saturating_sub(self.timestamp) > threshold
    }
}

/// Quality metrics of a work item.
#[derive(Debug, Default, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMetrics {
    pub had_front_matter: bool,
    pub had_dynamic_context: bool,
    pub had_programmatic_structure: bool,
    pub had_state_management: bool,
}

/// Progress document error types.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// Content is not valid JSON.
    #[error("progress file contains invalid JSON: {0}")]
    InvalidFormat(#[source] serde_json::Error),

    /// Content is valid JSON with the wrong structure.
    #[error("invalid progress file format: {0}")]
    InvalidSchema(String),

    /// Document cannot be serialized.
    #[error(transparent)]
    Serialize(serde_json::Error),
}

impl From<ProgressError> for FmtError {
    fn from(_: ProgressError) -> Self {
        FmtError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use simple_test_case::test_case;

    const DOCUMENT: &str = indoc! {r#"
        {
          "version": "1.0",
          "totalCommands": 3,
          "completed": 1,
          "inProgress": 1,
          "lastUpdated": "2025-06-01T12:00:00.000Z",
          "commands": [
            {
              "id": "001",
              "name": "alpha",
              "filepath": "claude/commands/test/alpha.md",
              "namespace": "test",
              "status": "completed",
              "lastModified": "2025-06-01T12:00:00.000Z",
              "improvements": ["frontMatterAdded"],
              "metrics": {
                "hadFrontMatter": true,
                "hadDynamicContext": false,
                "hadProgrammaticStructure": false,
                "hadStateManagement": true
              }
            },
            {
              "id": "002",
              "name": "beta",
              "filepath": "claude/commands/test/beta.md",
              "namespace": "test",
              "status": "in-progress",
              "lastModified": "2025-06-01T12:00:00.000Z",
              "claimedBy": { "sessionId": "abc", "timestamp": 1748779200 }
            },
            {
              "id": "003",
              "name": "gamma",
              "filepath": "claude/commands/test/gamma.md",
              "namespace": "test",
              "status": "pending",
              "lastModified": "2025-06-01T12:00:00.000Z"
            }
          ]
        }
    "#};

    #[test]
    fn deserialize_progress_document() -> anyhow::Result<()> {
        let result: ProgressDocument = DOCUMENT.parse()?;

        assert_eq!(result.total_commands, 3);
        assert_eq!(result.commands[0].status, TaskStatus::Completed);
        assert_eq!(
            result.commands[0].improvements,
            Some(vec!["frontMatterAdded".to_string()])
        );
        assert_eq!(
            result.commands[0].metrics,
            Some(CommandMetrics {
                had_front_matter: true,
                had_state_management: true,
                ..Default::default()
            })
        );
        assert_eq!(
            result.commands[1].claimed_by,
            Some(ClaimInfo {
                session_id: "abc".into(),
                timestamp: 1_748_779_200,
            })
        );
        assert_eq!(result.commands[2].claimed_by, None);

        Ok(())
    }

    #[test]
    fn serialize_omits_absent_optionals() -> anyhow::Result<()> {
        let document: ProgressDocument = DOCUMENT.parse()?;
        let result = document.to_string();

        assert!(result.contains(r#""claimedBy""#));
        assert!(result.contains(r#""status": "in-progress""#));
        assert_eq!(result.matches(r#""claimedBy""#).count(), 1);
        assert_eq!(result.matches(r#""improvements""#).count(), 1);
        assert_eq!(result.parse::<ProgressDocument>()?, document);

        Ok(())
    }

    #[test_case(r#"{"invalid": json syntax}"#; "broken syntax")]
    #[test_case(""; "empty file")]
    #[test_case(r#"{"commands": ["#; "truncated")]
    #[test]
    fn reject_invalid_format(data: &str) {
        let result = data.parse::<ProgressDocument>();
        assert!(matches!(result, Err(ProgressError::InvalidFormat(_))));
    }

    #[test_case(r#"[]"#; "not an object")]
    #[test_case(r#"{"totalCommands": 1, "completed": 0, "inProgress": 0}"#; "missing commands")]
    #[test_case(r#"{"commands": {}, "totalCommands": 1, "completed": 0, "inProgress": 0}"#; "commands not array")]
    #[test_case(r#"{"commands": [], "totalCommands": "1", "completed": 0, "inProgress": 0}"#; "string counter")]
    #[test_case(r#"{"commands": [], "totalCommands": 1, "inProgress": 0}"#; "missing counter")]
    #[test_case(r#"{"commands": [], "totalCommands": 1.5, "completed": 0, "inProgress": 0}"#; "fractional counter")]
    #[test_case(r#"{"version": "1.0", "lastUpdated": "2025-06-01T12:00:00Z", "commands": [{"id": "1"}], "totalCommands": 1, "completed": 0, "inProgress": 0}"#; "incomplete item")]
    #[test]
    fn reject_invalid_schema(data: &str) {
        let result = data.parse::<ProgressDocument>();
        assert!(matches!(result, Err(ProgressError::InvalidSchema(_))));
    }

    #[test]
    fn unknown_fields_survive_round_trip() -> anyhow::Result<()> {
        let data = indoc! {r#"
            {
              "version": "1.0",
              "description": "batch A",
              "totalCommands": 1,
              "completed": 0,
              "inProgress": 0,
              "lastUpdated": "2025-06-01T12:00:00.000Z",
              "commands": [
                {
                  "id": "001",
                  "name": "alpha",
                  "filepath": "alpha.md",
                  "namespace": "test",
                  "status": "pending",
                  "lastModified": "2025-06-01T12:00:00.000Z",
                  "priority": 3
                }
              ]
            }
        "#};
        let document: ProgressDocument = data.parse()?;
        assert_eq!(document.extra.get("description"), Some(&Value::from("batch A")));
        assert_eq!(document.commands[0].extra.get("priority"), Some(&Value::from(3)));

        let result: Value = serde_json::from_str(&document.to_string())?;
        assert_eq!(result["description"], "batch A");
        assert_eq!(result["commands"][0]["priority"], 3);
        assert!(result["commands"][0].get("extra").is_none());

        Ok(())
    }

    #[test]
    fn descriptive_item_fields_are_optional() -> anyhow::Result<()> {
        let data = indoc! {r#"
            {
              "totalCommands": 1,
              "completed": 0,
              "inProgress": 0,
              "version": "1.0",
              "lastUpdated": "2025-06-01T12:00:00.000Z",
              "commands": [{ "id": "001", "name": "alpha", "status": "pending" }]
            }
        "#};
        let document: ProgressDocument = data.parse()?;
        let item = &document.commands[0];

        assert_eq!(item.namespace, "");
        assert_eq!(item.filepath, "");
        assert_eq!(item.last_modified, DateTime::<Utc>::default());

        Ok(())
    }

    #[test]
    fn recompute_counters_projects_item_statuses() -> anyhow::Result<()> {
        let mut document: ProgressDocument = DOCUMENT.parse()?;
        document.completed = 42;
        document.in_progress = 42;

        let now = Utc::now();
        document.recompute_counters(now);

        assert_eq!(document.completed, 1);
        assert_eq!(document.in_progress, 1);
        assert_eq!(document.count(TaskStatus::Pending), 1);
        assert_eq!(document.last_updated, now);

        Ok(())
    }

    #[test_case(599, 600, false; "fresh claim")]
    #[test_case(600, 600, false; "exactly at threshold")]
    #[test_case(601, 600, true; "just past threshold")]
    #[test_case(700, 600, true; "long abandoned")]
    #[test_case(0, u64::MAX, false; "just claimed under maximum timeout")]
    #[test_case(1_000_000_000, u64::MAX, false; "ancient claim under maximum timeout")]
    #[test]
    fn claim_staleness(age_secs: i64, timeout_secs: u64, expect: bool) {
        let now = Utc::now();
        let claim = ClaimInfo {
            session_id: "abc".into(),
            timestamp: now.timestamp() - age_secs,
        };
        assert_eq!(claim.is_older_than(now, Duration::from_secs(timeout_secs)), expect);
    }

    #[test]
    fn find_claimable_prefers_first_match() -> anyhow::Result<()> {
        let mut document: ProgressDocument = DOCUMENT.parse()?;
        let now = Utc::now();

        // The claim on "002" dates from 2025, so it is long stale.
        let found = document.find_claimable_mut(now, DEFAULT_STALE_TIMEOUT).map(|item| item.id.clone());
        assert_eq!(found.as_deref(), Some("002"));

        document.commands[1].claimed_by = Some(ClaimInfo {
            session_id: "abc".into(),
            timestamp: now.timestamp(),
        });
        let found = document.find_claimable_mut(now, DEFAULT_STALE_TIMEOUT).map(|item| item.id.clone());
        assert_eq!(found.as_deref(), Some("003"));

        Ok(())
    }

    #[test]
    fn work_item_transitions_keep_claim_invariant() {
        let now = Utc::now();
        let mut item = WorkItem::new("001", "alpha", "alpha.md", "test");
        assert_eq!(item.status, TaskStatus::Pending);

        item.claim("abc".into(), now);
        assert_eq!(item.status, TaskStatus::InProgress);
        assert!(item.is_claimed_by("abc"));
        assert!(!item.is_claimed_by("xyz"));

        item.reset(now);
        assert_eq!(item.status, TaskStatus::Pending);
        assert_eq!(item.claimed_by, None);

        item.claim("def".into(), now);
        item.complete(vec!["a".into(), "b".into()], now);
        assert_eq!(item.status, TaskStatus::Completed);
        assert_eq!(item.claimed_by, None);
        assert_eq!(item.improvements, Some(vec!["a".to_string(), "b".to_string()]));
    }
}
