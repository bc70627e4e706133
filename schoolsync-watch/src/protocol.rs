//! Phoenix channel frames spoken by Supabase Realtime.
//!
//! Everything here is pure: frames in, [`FeedSignal`]s out. The socket pump
//! in [`crate::transport`] owns the I/O.

use chrono::{DateTime, Utc};
use schoolsync_core::ChangeKind;
use schoolsync_realtime::{ChangeEvent, FeedSignal, ListenerSpec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const PHOENIX_TOPIC: &str = "phoenix";
pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const POSTGRES_CHANGES: &str = "postgres_changes";
pub const SYSTEM: &str = "system";

/// One frame of the Phoenix v1 JSON serializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    fn new(topic: impl Into<String>, event: &str, payload: Value, msg_ref: String) -> Self {
        Self {
            topic: topic.into(),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref),
            join_ref: None,
        }
    }
}

pub fn topic_for(channel_name: &str) -> String {
    format!("realtime:{}", channel_name)
}

pub fn join_message(
    channel_name: &str,
    schema: &str,
    listeners: &[ListenerSpec],
    access_token: Option<&str>,
    join_ref: &str,
) -> PhoenixMessage {
    let postgres_changes: Vec<Value> = listeners
        .iter()
        .map(|listener| {
            let mut binding = Map::new();
            binding.insert("event".to_string(), json!(listener.event.as_str()));
            binding.insert("schema".to_string(), json!(schema));
            binding.insert("table".to_string(), json!(listener.table));
            if let Some(filter) = &listener.filter {
                binding.insert("filter".to_string(), json!(filter.to_string()));
            }
            Value::Object(binding)
        })
        .collect();

    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": postgres_changes,
        }
    });
    if let (Some(token), Some(object)) = (access_token, payload.as_object_mut()) {
        object.insert("access_token".to_string(), json!(token));
    }

    let mut message = PhoenixMessage::new(topic_for(channel_name), PHX_JOIN, payload, join_ref.to_string());
    message.join_ref = Some(join_ref.to_string());
    message
}

pub fn heartbeat_message(msg_ref: String) -> PhoenixMessage {
    PhoenixMessage::new(PHOENIX_TOPIC, HEARTBEAT, json!({}), msg_ref)
}

pub fn leave_message(channel_name: &str, join_ref: &str, msg_ref: String) -> PhoenixMessage {
    let mut message = PhoenixMessage::new(topic_for(channel_name), PHX_LEAVE, json!({}), msg_ref);
    message.join_ref = Some(join_ref.to_string());
    message
}

/// Per-channel protocol state: join status and server binding ids.
#[derive(Debug, Clone)]
pub struct ChannelProtocol {
    topic: String,
    join_ref: String,
    listeners: Vec<ListenerSpec>,
    /// Server-assigned id per listener, in listener order.
    binding_ids: Vec<Option<u64>>,
    joined: bool,
}

impl ChannelProtocol {
    pub fn new(channel_name: &str, join_ref: &str, listeners: &[ListenerSpec]) -> Self {
        Self {
            topic: topic_for(channel_name),
            join_ref: join_ref.to_string(),
            listeners: listeners.to_vec(),
            binding_ids: vec![None; listeners.len()],
            joined: false,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn join_ref(&self) -> &str {
        &self.join_ref
    }

    /// Translate one inbound frame. Frames for other topics yield nothing.
    pub fn interpret(&mut self, message: PhoenixMessage) -> Vec<FeedSignal> {
        if message.topic == PHOENIX_TOPIC {
            return heartbeat_reply_error(&message).into_iter().collect();
        }
        if message.topic != self.topic {
            return Vec::new();
        }

        match message.event.as_str() {
            PHX_REPLY if message.msg_ref.as_deref() == Some(self.join_ref.as_str()) => {
                self.on_join_reply(&message.payload)
            }
            POSTGRES_CHANGES => self.on_change(&message.payload),
            SYSTEM => system_error(&message.payload).into_iter().collect(),
            PHX_ERROR => vec![
                FeedSignal::Error("server reported channel error".to_string()),
                FeedSignal::Closed {
                    reason: "channel errored".to_string(),
                },
            ],
            PHX_CLOSE => vec![FeedSignal::Closed {
                reason: "server closed channel".to_string(),
            }],
            _ => Vec::new(),
        }
    }

    fn on_join_reply(&mut self, payload: &Value) -> Vec<FeedSignal> {
        let status = payload.get("status").and_then(Value::as_str).unwrap_or("error");
        let response = payload.get("response").cloned().unwrap_or(Value::Null);
        if status != "ok" {
            let reason = response
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| response.to_string());
            return vec![
                FeedSignal::Error(format!("join rejected: {}", reason)),
                FeedSignal::Closed { reason },
            ];
        }

        let bindings = response
            .get(POSTGRES_CHANGES)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if bindings.len() == self.listeners.len() {
            self.binding_ids = bindings
                .iter()
                .map(|b| b.get("id").and_then(Value::as_u64))
                .collect();
        }
        self.joined = true;
        vec![FeedSignal::Subscribed]
    }

    fn on_change(&self, payload: &Value) -> Vec<FeedSignal> {
        let Some(event) = decode_change(payload) else {
            return vec![FeedSignal::Error("undecodable change payload".to_string())];
        };
        let ids: Vec<u64> = payload
            .get("ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_u64).collect())
            .unwrap_or_default();

        let by_id: Vec<usize> = self
            .binding_ids
            .iter()
            .enumerate()
            .filter_map(|(index, id)| id.filter(|id| ids.contains(id)).map(|_| index))
            .collect();
        let matched: Vec<usize> = if by_id.is_empty() {
            self.listeners
                .iter()
                .enumerate()
                .filter(|(_, l)| l.table == event.table && l.event.accepts(event.kind))
                .map(|(index, _)| index)
                .collect()
        } else {
            by_id
        };

        matched
            .into_iter()
            .map(|listener| FeedSignal::Change {
                listener,
                event: event.clone(),
            })
            .collect()
    }
}

/// Decode `payload.data` of a `postgres_changes` frame.
pub fn decode_change(payload: &Value) -> Option<ChangeEvent> {
    let data = payload.get("data")?;
    let table = data.get("table")?.as_str()?;
    let kind = ChangeKind::parse(data.get("type")?.as_str()?)?;
    let record_id = ["record", "old_record"]
        .iter()
        .filter_map(|field| data.get(*field)?.get("id"))
        .find_map(id_to_string);

    let mut event = ChangeEvent::new(table, kind, record_id).with_payload(data.clone());
    if let Some(at) = data
        .get("commit_timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    {
        event = event.with_commit_timestamp(at.with_timezone(&Utc));
    }
    Some(event)
}

fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn heartbeat_reply_error(message: &PhoenixMessage) -> Option<FeedSignal> {
    if message.event != PHX_REPLY {
        return None;
    }
    match message.payload.get("status").and_then(Value::as_str) {
        Some("ok") | None => None,
        Some(status) => Some(FeedSignal::Error(format!("heartbeat rejected: {}", status))),
    }
}

fn system_error(payload: &Value) -> Option<FeedSignal> {
    if payload.get("status").and_then(Value::as_str) != Some("error") {
        return None;
    }
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown system error");
    Some(FeedSignal::Error(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use schoolsync_core::RowFilter;

    fn listeners() -> Vec<ListenerSpec> {
        vec![
            ListenerSpec {
                table: "homework".to_string(),
                event: ChangeKind::Any,
                filter: Some(RowFilter::eq("student_id", "s-1")),
            },
            ListenerSpec {
                table: "students".to_string(),
                event: ChangeKind::Update,
                filter: None,
            },
        ]
    }

    fn frame(topic: &str, event: &str, payload: Value, msg_ref: Option<&str>) -> PhoenixMessage {
        PhoenixMessage {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: msg_ref.map(str::to_string),
            join_ref: None,
        }
    }

    fn joined() -> ChannelProtocol {
        let mut protocol = ChannelProtocol::new("student-s-1", "1", &listeners());
        let reply = frame(
            "realtime:student-s-1",
            PHX_REPLY,
            json!({"status": "ok", "response": {"postgres_changes": [{"id": 11}, {"id": 22}]}}),
            Some("1"),
        );
        assert_eq!(protocol.interpret(reply), vec![FeedSignal::Subscribed]);
        protocol
    }

    #[test]
    fn test_join_payload_shape() {
        let message = join_message("student-s-1", "public", &listeners(), Some("jwt"), "1");
        assert_eq!(message.topic, "realtime:student-s-1");
        assert_eq!(message.event, PHX_JOIN);
        assert_eq!(message.join_ref.as_deref(), Some("1"));

        let changes = &message.payload["config"]["postgres_changes"];
        assert_eq!(changes[0]["filter"], "student_id=eq.s-1");
        assert_eq!(changes[0]["event"], "*");
        assert_eq!(changes[1]["event"], "UPDATE");
        assert!(changes[1].get("filter").is_none());
        assert_eq!(message.payload["access_token"], "jwt");
        assert_eq!(message.payload["config"]["broadcast"]["self"], false);
    }

    #[test]
    fn test_wire_encoding_uses_ref_field() {
        let encoded = serde_json::to_value(heartbeat_message("7".to_string())).unwrap();
        assert_eq!(encoded["topic"], "phoenix");
        assert_eq!(encoded["ref"], "7");
        assert!(encoded.get("join_ref").is_none());
    }

    #[test]
    fn test_change_routed_by_binding_id() {
        let mut protocol = joined();
        let change = frame(
            "realtime:student-s-1",
            POSTGRES_CHANGES,
            json!({
                "ids": [22],
                "data": {
                    "table": "students",
                    "type": "UPDATE",
                    "record": {"id": "s-1", "points": 40},
                    "old_record": {"id": "s-1"},
                    "commit_timestamp": "2026-03-01T08:15:00Z"
                }
            }),
            None,
        );
        let signals = protocol.interpret(change);
        assert_eq!(signals.len(), 1);
        match &signals[0] {
            FeedSignal::Change { listener, event } => {
                assert_eq!(*listener, 1);
                assert_eq!(event.record_id.as_deref(), Some("s-1"));
                assert!(event.commit_timestamp.is_some());
            }
            other => panic!("unexpected signal: {:?}", other),
        }
    }

    #[test]
    fn test_change_without_ids_matches_by_table() {
        let mut protocol = ChannelProtocol::new("student-s-1", "1", &listeners());
        let change = frame(
            "realtime:student-s-1",
            POSTGRES_CHANGES,
            json!({"data": {"table": "homework", "type": "DELETE", "record": {}, "old_record": {"id": 9}}}),
            None,
        );
        match protocol.interpret(change).as_slice() {
            [FeedSignal::Change { listener: 0, event }] => {
                assert_eq!(event.kind, ChangeKind::Delete);
                assert_eq!(event.record_id.as_deref(), Some("9"));
            }
            other => panic!("unexpected signals: {:?}", other),
        }
    }

    #[test]
    fn test_rejected_join_closes() {
        let mut protocol = ChannelProtocol::new("admin-adm-1", "4", &listeners());
        let reply = frame(
            "realtime:admin-adm-1",
            PHX_REPLY,
            json!({"status": "error", "response": {"reason": "unauthorized"}}),
            Some("4"),
        );
        let signals = protocol.interpret(reply);
        assert_eq!(signals.len(), 2);
        assert!(matches!(&signals[1], FeedSignal::Closed { reason } if reason == "unauthorized"));
        assert!(!protocol.is_joined());
    }

    #[test]
    fn test_server_close_and_foreign_topics() {
        let mut protocol = joined();
        assert!(protocol
            .interpret(frame("realtime:other", PHX_CLOSE, json!({}), None))
            .is_empty());
        assert!(matches!(
            protocol
                .interpret(frame("realtime:student-s-1", PHX_CLOSE, json!({}), None))
                .as_slice(),
            [FeedSignal::Closed { .. }]
        ));
    }

    #[test]
    fn test_heartbeat_reply_ok_is_silent() {
        let mut protocol = joined();
        let reply = frame(PHOENIX_TOPIC, PHX_REPLY, json!({"status": "ok", "response": {}}), Some("9"));
        assert!(protocol.interpret(reply).is_empty());
    }

    #[test]
    fn test_system_error_surfaces() {
        let mut protocol = joined();
        let system = frame(
            "realtime:student-s-1",
            SYSTEM,
            json!({"status": "error", "message": "replication slot lagging", "extension": "postgres_changes"}),
            None,
        );
        assert_eq!(
            protocol.interpret(system),
            vec![FeedSignal::Error("replication slot lagging".to_string())]
        );
    }

    #[test]
    fn test_undecodable_change_is_an_error() {
        assert!(decode_change(&json!({"data": {"table": "homework", "type": "TRUNCATE"}})).is_none());
        let mut protocol = joined();
        let signals = protocol.interpret(frame(
            "realtime:student-s-1",
            POSTGRES_CHANGES,
            json!({"data": {}}),
            None,
        ));
        assert!(matches!(signals.as_slice(), [FeedSignal::Error(_)]));
    }
}
