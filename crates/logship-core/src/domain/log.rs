//! Log model
//!
//! Every ingestible record is a [`Log`]: the shared base fields (timestamp,
//! session id, device context) plus a [`LogKind`] describing what kind of
//! record it is. The kinds form a closed set and serialize with a `type` tag:
//!
//! | Kind              | Carries                                              |
//! |-------------------|------------------------------------------------------|
//! | `plain`           | base fields only                                     |
//! | `properties`      | string property bag                                  |
//! | `event`           | property bag, event id, name, typed properties       |
//! | `crash`           | property bag, incident id and crash details          |
//! | `errorAttachment` | property bag, parent incident id and attachment data |
//!
//! The model performs no I/O. [`Log::validate`] is the only check the core
//! applies before persisting a record.

use std::collections::HashMap;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::device::DeviceContext;
use super::errors::IngestionError;
use super::newtypes::{EventId, IncidentId, SessionId};

/// Flat string property bag
pub type Properties = HashMap<String, String>;

// ============================================================================
// Log
// ============================================================================

/// A single record submitted to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Creation time of the record
    pub timestamp: DateTime<Utc>,
    /// Session the record belongs to; stamped by the runtime when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<SessionId>,
    /// Attached by the channel right before sending
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceContext>,
    /// Kind-specific payload
    #[serde(flatten)]
    pub kind: LogKind,
}

/// Kind-specific payload of a [`Log`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LogKind {
    /// Base fields only
    Plain,
    /// A log with a string property bag
    Properties(PropertiesLog),
    /// A named event
    Event(EventLog),
    /// A crash report from a previous session
    Crash(CrashLog),
    /// An attachment to a crash report
    ErrorAttachment(ErrorAttachmentLog),
}

impl Log {
    fn with_kind(kind: LogKind) -> Self {
        Self {
            timestamp: Utc::now(),
            sid: None,
            device: None,
            kind,
        }
    }

    /// A log without properties
    pub fn plain() -> Self {
        Self::with_kind(LogKind::Plain)
    }

    /// A log carrying a property bag
    pub fn with_properties(properties: Properties) -> Self {
        Self::with_kind(LogKind::Properties(PropertiesLog { properties }))
    }

    /// A named event with a freshly generated event id
    pub fn event(name: impl Into<String>) -> Self {
        Self::with_kind(LogKind::Event(EventLog {
            properties: Properties::new(),
            event_id: Some(EventId::new()),
            name: name.into(),
            typed_properties: Vec::new(),
        }))
    }

    /// Wraps an already-built event payload
    pub fn from_event(event: EventLog) -> Self {
        Self::with_kind(LogKind::Event(event))
    }

    /// A crash log; the timestamp is the crash time
    pub fn crash(crash: CrashLog) -> Self {
        let mut log = Self::with_kind(LogKind::Crash(crash));
        if let LogKind::Crash(c) = &log.kind {
            log.timestamp = c.crash_time;
        }
        log
    }

    /// An attachment log
    pub fn attachment(attachment: ErrorAttachmentLog) -> Self {
        Self::with_kind(LogKind::ErrorAttachment(attachment))
    }

    /// Sets the session id
    pub fn with_sid(mut self, sid: SessionId) -> Self {
        self.sid = Some(sid);
        self
    }

    /// Overrides the creation time
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds a string property; no-op for [`LogKind::Plain`]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(props) = self.properties_mut() {
            props.insert(key.into(), value.into());
        }
        self
    }

    /// Adds or replaces a typed property; no-op unless this is an event
    pub fn with_typed_property(mut self, name: impl Into<String>, value: TypedValue) -> Self {
        if let LogKind::Event(event) = &mut self.kind {
            event.set_typed_property(name, value);
        }
        self
    }

    /// Short name of the kind, as used in the `type` tag
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            LogKind::Plain => "plain",
            LogKind::Properties(_) => "properties",
            LogKind::Event(_) => "event",
            LogKind::Crash(_) => "crash",
            LogKind::ErrorAttachment(_) => "errorAttachment",
        }
    }

    /// The property bag, if this kind carries one
    pub fn properties(&self) -> Option<&Properties> {
        match &self.kind {
            LogKind::Plain => None,
            LogKind::Properties(l) => Some(&l.properties),
            LogKind::Event(l) => Some(&l.properties),
            LogKind::Crash(l) => Some(&l.properties),
            LogKind::ErrorAttachment(l) => Some(&l.properties),
        }
    }

    fn properties_mut(&mut self) -> Option<&mut Properties> {
        match &mut self.kind {
            LogKind::Plain => None,
            LogKind::Properties(l) => Some(&mut l.properties),
            LogKind::Event(l) => Some(&mut l.properties),
            LogKind::Crash(l) => Some(&mut l.properties),
            LogKind::ErrorAttachment(l) => Some(&mut l.properties),
        }
    }

    /// The crash incident this log belongs to (crash and attachment logs)
    pub fn incident_id(&self) -> Option<IncidentId> {
        match &self.kind {
            LogKind::Crash(c) => Some(c.incident_id),
            LogKind::ErrorAttachment(a) => Some(a.incident_id),
            _ => None,
        }
    }

    /// Checks the record before it is accepted.
    ///
    /// # Errors
    ///
    /// Returns `IngestionError::InvalidContainer` for events without an event id
    /// or name, and for attachments without a content type.
    pub fn validate(&self) -> Result<(), IngestionError> {
        match &self.kind {
            LogKind::Event(event) => {
                if event.event_id.is_none() {
                    return Err(IngestionError::InvalidContainer(format!(
                        "event '{}' has no event id",
                        event.name
                    )));
                }
                if event.name.trim().is_empty() {
                    return Err(IngestionError::InvalidContainer(
                        "event name is empty".to_string(),
                    ));
                }
                Ok(())
            }
            LogKind::ErrorAttachment(attachment) if attachment.content_type.is_empty() => {
                Err(IngestionError::InvalidContainer(format!(
                    "attachment {} has no content type",
                    attachment.attachment_id
                )))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Kind payloads
// ============================================================================

/// Payload of a log with properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertiesLog {
    #[serde(default)]
    pub properties: Properties,
}

/// Payload of an event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLog {
    #[serde(default)]
    pub properties: Properties,
    /// Required; a missing id is rejected with `InvalidContainer`
    #[serde(default, rename = "id")]
    pub event_id: Option<EventId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub typed_properties: Vec<TypedProperty>,
}

impl EventLog {
    /// Adds a typed property, replacing any property with the same name
    pub fn set_typed_property(&mut self, name: impl Into<String>, value: TypedValue) {
        let name = name.into();
        match self.typed_properties.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.typed_properties.push(TypedProperty { name, value }),
        }
    }
}

/// A named, typed event property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedProperty {
    pub name: String,
    pub value: TypedValue,
}

/// Value of a [`TypedProperty`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum TypedValue {
    String(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
}

/// Payload of a crash log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashLog {
    #[serde(default)]
    pub properties: Properties,
    pub incident_id: IncidentId,
    pub crash_time: DateTime<Utc>,
    pub process: String,
    pub message: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub backtrace: String,
}

/// Payload of an error attachment log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAttachmentLog {
    #[serde(default)]
    pub properties: Properties,
    pub attachment_id: Uuid,
    /// Parent crash report
    pub incident_id: IncidentId,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Base64 of the attachment bytes
    pub data: String,
}

impl ErrorAttachmentLog {
    /// A UTF-8 text attachment
    pub fn text(incident_id: IncidentId, text: &str, file_name: Option<String>) -> Self {
        Self::binary(incident_id, text.as_bytes(), "text/plain", file_name)
    }

    /// A binary attachment with the given content type
    pub fn binary(
        incident_id: IncidentId,
        bytes: &[u8],
        content_type: impl Into<String>,
        file_name: Option<String>,
    ) -> Self {
        Self {
            properties: Properties::new(),
            attachment_id: Uuid::new_v4(),
            incident_id,
            content_type: content_type.into(),
            file_name,
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    /// Decodes the attachment bytes
    pub fn bytes(&self) -> Result<Vec<u8>, IngestionError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| IngestionError::InvalidContainer(format!("attachment data: {e}")))
    }

    /// Re-parents the attachment to another incident
    pub fn for_incident(mut self, incident_id: IncidentId) -> Self {
        self.incident_id = incident_id;
        self
    }
}
