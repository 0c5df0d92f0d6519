// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Diagnosis requests produced by failing experiment steps.

use std::fmt;

use autotriage_core::{Result, TriageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backends::TimeWindow;

/// Well-known keys of [`DiagnosisRequest::context`].
pub mod context_keys {
    /// Subscription the experiment's resources live in.
    pub const SUBSCRIPTION_ID: &str = "subscriptionId";
    /// Resource group of the experiment's resources.
    pub const RESOURCE_GROUP_NAME: &str = "resourceGroupName";
    /// Node under test.
    pub const TIP_NODE_ID: &str = "tipNodeId";
    /// Infrastructure session holding the node.
    pub const TIP_SESSION_ID: &str = "tipSessionId";
    /// Change applied within the infrastructure session.
    pub const TIP_SESSION_CHANGE_ID: &str = "tipSessionChangeId";
}

/// Kind of failure a request asks to triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    /// A microcode update on the node under test failed.
    MicrocodeUpdateFailure,
    /// Deploying an infrastructure session change failed.
    InfrastructureSessionDeploymentFailure,
    /// A virtual machine could not be created.
    VmCreationFailure,
    /// Anything else.
    #[default]
    #[serde(other)]
    Undefined,
}

impl IssueType {
    /// Wire name of the issue type.
    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::MicrocodeUpdateFailure => "microcode-update-failure",
            IssueType::InfrastructureSessionDeploymentFailure => {
                "infrastructure-session-deployment-failure"
            }
            IssueType::VmCreationFailure => "vm-creation-failure",
            IssueType::Undefined => "undefined",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One triage task for a failed experiment step.
///
/// Immutable once built: the time window is ordered and every context value
/// is a scalar. Context keys keep the order the failing step supplied them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawDiagnosisRequest")]
pub struct DiagnosisRequest {
    id: String,
    experiment_id: String,
    issue_type: IssueType,
    time_range_begin: DateTime<Utc>,
    time_range_end: DateTime<Utc>,
    #[serde(default)]
    context: Map<String, Value>,
}

/// Unvalidated wire form of [`DiagnosisRequest`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDiagnosisRequest {
    id: String,
    experiment_id: String,
    #[serde(default)]
    issue_type: IssueType,
    time_range_begin: DateTime<Utc>,
    time_range_end: DateTime<Utc>,
    #[serde(default)]
    context: Map<String, Value>,
}

impl TryFrom<RawDiagnosisRequest> for DiagnosisRequest {
    type Error = TriageError;

    fn try_from(raw: RawDiagnosisRequest) -> Result<Self> {
        DiagnosisRequest::new(
            raw.id,
            raw.experiment_id,
            raw.issue_type,
            raw.time_range_begin,
            raw.time_range_end,
            raw.context,
        )
    }
}

impl DiagnosisRequest {
    /// Create a validated request.
    pub fn new(
        id: impl Into<String>,
        experiment_id: impl Into<String>,
        issue_type: IssueType,
        time_range_begin: DateTime<Utc>,
        time_range_end: DateTime<Utc>,
        context: Map<String, Value>,
    ) -> Result<Self> {
        let id = id.into();
        let experiment_id = experiment_id.into();

        if id.trim().is_empty() {
            return Err(TriageError::invalid_argument("id", "must not be empty"));
        }
        if experiment_id.trim().is_empty() {
            return Err(TriageError::invalid_argument(
                "experimentId",
                "must not be empty",
            ));
        }
        if time_range_begin > time_range_end {
            return Err(TriageError::invalid_argument(
                "timeRangeBegin",
                format!(
                    "{} is after timeRangeEnd {}",
                    time_range_begin.to_rfc3339(),
                    time_range_end.to_rfc3339()
                ),
            ));
        }
        if let Some((key, _)) = context
            .iter()
            .find(|(_, value)| matches!(value, Value::Array(_) | Value::Object(_)))
        {
            return Err(TriageError::invalid_argument(
                format!("context.{}", key),
                "context values must be scalars",
            ));
        }

        Ok(Self {
            id,
            experiment_id,
            issue_type,
            time_range_begin,
            time_range_end,
            context,
        })
    }

    /// Start building a request with a generated id.
    pub fn builder(experiment_id: impl Into<String>, issue_type: IssueType) -> DiagnosisRequestBuilder {
        DiagnosisRequestBuilder {
            id: uuid::Uuid::new_v4().to_string(),
            experiment_id: experiment_id.into(),
            issue_type,
            window: None,
            context: Map::new(),
        }
    }

    /// Request identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Experiment the failing step belongs to.
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Kind of failure.
    pub fn issue_type(&self) -> IssueType {
        self.issue_type
    }

    /// Start of the window to query.
    pub fn time_range_begin(&self) -> DateTime<Utc> {
        self.time_range_begin
    }

    /// End of the window to query.
    pub fn time_range_end(&self) -> DateTime<Utc> {
        self.time_range_end
    }

    /// The window to query.
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            begin: self.time_range_begin,
            end: self.time_range_end,
        }
    }

    /// Context supplied by the failing step.
    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Whether `key` is present with a non-null, non-blank value.
    pub fn has_context(&self, key: &str) -> bool {
        self.context_str(key).is_some()
    }

    /// Context value rendered as text. Null and blank values count as absent.
    pub fn context_str(&self, key: &str) -> Option<String> {
        match self.context.get(key)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Context value that a handler's predicate guarantees to be present.
    pub fn require_context(&self, key: &str) -> Result<String> {
        self.context_str(key)
            .ok_or_else(|| TriageError::MissingContext {
                request_id: self.id.clone(),
                key: key.to_string(),
            })
    }

    /// Fail unless every key in `keys` is present.
    pub fn ensure_context(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.require_context(key)?;
        }
        Ok(())
    }

    /// Correlation fields attached to telemetry events about this request.
    pub fn correlation(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("experimentId".to_string(), Value::from(self.experiment_id.clone()));
        map.insert("requestId".to_string(), Value::from(self.id.clone()));
        map.insert("issueType".to_string(), Value::from(self.issue_type.as_str()));
        map.insert(
            "timeRangeBegin".to_string(),
            Value::from(self.time_range_begin.to_rfc3339()),
        );
        map.insert(
            "timeRangeEnd".to_string(),
            Value::from(self.time_range_end.to_rfc3339()),
        );
        for (key, value) in &self.context {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
        map
    }
}

/// Builder for [`DiagnosisRequest`].
#[derive(Debug, Clone)]
pub struct DiagnosisRequestBuilder {
    id: String,
    experiment_id: String,
    issue_type: IssueType,
    window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    context: Map<String, Value>,
}

impl DiagnosisRequestBuilder {
    /// Use a caller-supplied id instead of a generated one.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the window to query.
    pub fn time_range(mut self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.window = Some((begin, end));
        self
    }

    /// Add a context value.
    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<DiagnosisRequest> {
        let (begin, end) = self
            .window
            .ok_or_else(|| TriageError::invalid_argument("timeRange", "must be set"))?;
        DiagnosisRequest::new(
            self.id,
            self.experiment_id,
            self.issue_type,
            begin,
            end,
            self.context,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let begin = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        (begin, begin + Duration::hours(2))
    }

    #[test]
    fn test_builder_and_accessors() {
        let (begin, end) = window();
        let request = DiagnosisRequest::builder("exp-1", IssueType::VmCreationFailure)
            .id("req-1")
            .time_range(begin, end)
            .context(context_keys::SUBSCRIPTION_ID, "sub-1")
            .context(context_keys::RESOURCE_GROUP_NAME, "rg-1")
            .context("attempt", 2)
            .build()
            .unwrap();

        assert_eq!(request.id(), "req-1");
        assert_eq!(request.experiment_id(), "exp-1");
        assert_eq!(request.issue_type(), IssueType::VmCreationFailure);
        assert_eq!(request.window().duration(), Duration::hours(2));
        assert_eq!(
            request.context_str(context_keys::SUBSCRIPTION_ID).as_deref(),
            Some("sub-1")
        );
        assert_eq!(request.context_str("attempt").as_deref(), Some("2"));
        assert!(!request.has_context(context_keys::TIP_NODE_ID));

        // insertion order, not alphabetical
        let keys: Vec<&str> = request.context().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                context_keys::SUBSCRIPTION_ID,
                context_keys::RESOURCE_GROUP_NAME,
                "attempt"
            ]
        );
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let (begin, end) = window();
        let a = DiagnosisRequest::builder("exp-1", IssueType::Undefined)
            .time_range(begin, end)
            .build()
            .unwrap();
        let b = DiagnosisRequest::builder("exp-1", IssueType::Undefined)
            .time_range(begin, end)
            .build()
            .unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_rejects_inverted_window() {
        let (begin, end) = window();
        let err = DiagnosisRequest::builder("exp-1", IssueType::VmCreationFailure)
            .time_range(end, begin)
            .build()
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_rejects_non_scalar_context_and_missing_window() {
        let (begin, end) = window();
        let err = DiagnosisRequest::builder("exp-1", IssueType::VmCreationFailure)
            .time_range(begin, end)
            .context("nodes", json!(["a", "b"]))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("context.nodes"));

        assert!(
            DiagnosisRequest::builder("exp-1", IssueType::VmCreationFailure)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_blank_and_null_context_count_as_missing() {
        let (begin, end) = window();
        let request = DiagnosisRequest::builder("exp-1", IssueType::MicrocodeUpdateFailure)
            .id("req-9")
            .time_range(begin, end)
            .context(context_keys::TIP_NODE_ID, "  ")
            .context(context_keys::TIP_SESSION_ID, Value::Null)
            .build()
            .unwrap();

        assert!(!request.has_context(context_keys::TIP_NODE_ID));
        assert!(!request.has_context(context_keys::TIP_SESSION_ID));

        let err = request
            .ensure_context(&[context_keys::TIP_NODE_ID])
            .unwrap_err();
        assert!(matches!(
            err,
            TriageError::MissingContext { ref request_id, ref key }
                if request_id == "req-9" && key == "tipNodeId"
        ));
    }

    #[test]
    fn test_wire_format() {
        let raw = json!({
            "id": "req-1",
            "experimentId": "exp-1",
            "issueType": "infrastructure-session-deployment-failure",
            "timeRangeBegin": "2025-06-01T08:00:00Z",
            "timeRangeEnd": "2025-06-01T10:00:00Z",
            "context": { "tipSessionId": "s-1", "tipSessionChangeId": "c-1" }
        });

        let request: DiagnosisRequest = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(
            request.issue_type(),
            IssueType::InfrastructureSessionDeploymentFailure
        );
        assert_eq!(serde_json::to_value(&request).unwrap(), raw);
    }

    #[test]
    fn test_wire_format_validates_and_tolerates_unknown_issue_types() {
        let inverted = json!({
            "id": "req-1",
            "experimentId": "exp-1",
            "issueType": "vm-creation-failure",
            "timeRangeBegin": "2025-06-01T10:00:00Z",
            "timeRangeEnd": "2025-06-01T08:00:00Z"
        });
        assert!(serde_json::from_value::<DiagnosisRequest>(inverted).is_err());

        let unknown = json!({
            "id": "req-2",
            "experimentId": "exp-1",
            "issueType": "disk-failure",
            "timeRangeBegin": "2025-06-01T08:00:00Z",
            "timeRangeEnd": "2025-06-01T08:00:00Z"
        });
        let request: DiagnosisRequest = serde_json::from_value(unknown).unwrap();
        assert_eq!(request.issue_type(), IssueType::Undefined);
    }

    #[test]
    fn test_correlation_fields() {
        let (begin, end) = window();
        let request = DiagnosisRequest::builder("exp-1", IssueType::MicrocodeUpdateFailure)
            .id("req-3")
            .time_range(begin, end)
            .context(context_keys::TIP_NODE_ID, "node-42")
            .build()
            .unwrap();

        let correlation = request.correlation();
        assert_eq!(correlation["experimentId"], "exp-1");
        assert_eq!(correlation["requestId"], "req-3");
        assert_eq!(correlation["issueType"], "microcode-update-failure");
        assert_eq!(correlation["tipNodeId"], "node-42");
    }
}
