//! Wire shapes exchanged with the host runtime and the browser.
//!
//! Everything arriving from outside is parsed into these types at the
//! boundary; the tracker only ever sees validated values.

use serde::{Deserialize, Serialize};

use crate::core::error::TimingError;

/// A message from the host's live-update channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UpdateNotification {
    /// Incremental update of the listed modules.
    Update {
        #[serde(default)]
        updates: Vec<UpdateTarget>,
    },
    /// The client is told to reload the page.
    FullReload {
        #[serde(default)]
        updates: Vec<UpdateTarget>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    /// `connected`, `prune`, `custom`, `error` and anything newer.
    #[serde(other)]
    Other,
}

/// One module named by an update notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl UpdateTarget {
    pub fn location(&self) -> Option<&str> {
        self.path.as_deref().or(self.file.as_deref())
    }
}

impl UpdateNotification {
    pub fn parse(raw: &str) -> Result<Self, TimingError> {
        serde_json::from_str(raw).map_err(|e| TimingError::InvalidNotification(e.to_string()))
    }

    /// Paths of every module this notification names.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            UpdateNotification::Update { updates } => {
                updates.iter().filter_map(UpdateTarget::location).collect()
            }
            UpdateNotification::FullReload { updates, path } => updates
                .iter()
                .filter_map(UpdateTarget::location)
                .chain(path.as_deref().filter(|p| *p != "*"))
                .collect(),
            UpdateNotification::Other => Vec::new(),
        }
    }

    pub fn is_full_reload(&self) -> bool {
        matches!(self, UpdateNotification::FullReload { .. })
    }
}

/// Body of the browser's completion callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    pub file: String,
    pub client_timestamp: f64,
}

impl CompletionPayload {
    pub fn parse(body: &[u8]) -> Result<Self, TimingError> {
        let payload: CompletionPayload = serde_json::from_slice(body)
            .map_err(|e| TimingError::InvalidCompletion(e.to_string()))?;

        if payload.file.trim().is_empty() {
            return Err(TimingError::InvalidCompletion("empty file".to_string()));
        }
        if !payload.client_timestamp.is_finite() || payload.client_timestamp < 0.0 {
            return Err(TimingError::InvalidCompletion(format!(
                "bad clientTimestamp {}",
                payload.client_timestamp
            )));
        }
        Ok(payload)
    }
}

/// Answer written back for every completion callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl CompletionResponse {
    pub fn completed() -> Self {
        Self {
            success: true,
            reason: None,
            file: None,
        }
    }

    pub fn no_entry(file: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some("no entry found".to_string()),
            file: Some(file.into()),
        }
    }

    pub fn invalid(error: &TimingError) -> Self {
        Self {
            success: false,
            reason: Some(format!("invalid payload: {}", error)),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_update() {
        let raw = json!({
            "type": "update",
            "updates": [
                { "type": "js-update", "path": "/src/a.ts", "acceptedPath": "/src/a.ts", "timestamp": 1 },
                { "file": "/src/b.ts" },
                {}
            ]
        })
        .to_string();
        let notification = UpdateNotification::parse(&raw).unwrap();
        assert!(!notification.is_full_reload());
        assert_eq!(notification.paths(), vec!["/src/a.ts", "/src/b.ts"]);
    }

    #[test]
    fn test_parse_full_reload() {
        let notification =
            UpdateNotification::parse(r#"{"type":"full-reload","path":"/index.html"}"#).unwrap();
        assert!(notification.is_full_reload());
        assert_eq!(notification.paths(), vec!["/index.html"]);

        let wildcard = UpdateNotification::parse(r#"{"type":"full-reload","path":"*"}"#).unwrap();
        assert!(wildcard.paths().is_empty());
    }

    #[test]
    fn test_unrelated_message_types_are_tolerated() {
        let notification = UpdateNotification::parse(r#"{"type":"connected"}"#).unwrap();
        assert_eq!(notification, UpdateNotification::Other);
        assert!(notification.paths().is_empty());
    }

    #[test]
    fn test_malformed_notification() {
        let err = UpdateNotification::parse("invalid json").unwrap_err();
        assert!(matches!(err, TimingError::InvalidNotification(_)));

        let err = UpdateNotification::parse(r#"{"updates":[]}"#).unwrap_err();
        assert!(matches!(err, TimingError::InvalidNotification(_)));
    }

    #[test]
    fn test_parse_completion() {
        let payload =
            CompletionPayload::parse(br#"{"file":"/src/a.ts","clientTimestamp":1200}"#).unwrap();
        assert_eq!(payload.file, "/src/a.ts");
        assert_eq!(payload.client_timestamp, 1200.0);

        assert!(CompletionPayload::parse(br#"{"file":"","clientTimestamp":1}"#).is_err());
        assert!(CompletionPayload::parse(br#"{"file":"a.ts"}"#).is_err());
        assert!(CompletionPayload::parse(b"not json").is_err());
    }

    #[test]
    fn test_response_shapes() {
        assert_eq!(
            serde_json::to_value(CompletionResponse::completed()).unwrap(),
            json!({ "success": true })
        );
        assert_eq!(
            serde_json::to_value(CompletionResponse::no_entry("src/a.ts")).unwrap(),
            json!({ "success": false, "reason": "no entry found", "file": "src/a.ts" })
        );
    }
}
