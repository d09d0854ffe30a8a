//! 스트리밍 와이어 메시지.
//!
//! 단일 전송 채널 위에서 오가는 JSON 메시지 (`type` 태그, camelCase).
//! 요청형 메시지는 `requestId`를 포함하며, 서버는 `completion`으로 응답한다.

use serde::{Deserialize, Serialize};

use crate::models::metric::MetricEvent;
use crate::models::subscription::{SubscriptionId, SubscriptionSpec};

/// 클라이언트 → 서버 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Subscribe {
        request_id: u64,
        subscription_id: SubscriptionId,
        subscription: SubscriptionSpec,
    },
    #[serde(rename_all = "camelCase")]
    Unsubscribe {
        request_id: u64,
        subscription_id: SubscriptionId,
    },
    #[serde(rename_all = "camelCase")]
    GetMetricHistory {
        request_id: u64,
        metric: String,
        duration_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    SendMetric { request_id: u64, event: MetricEvent },
    #[serde(rename_all = "camelCase")]
    QueryMetrics { request_id: u64, expression: String },
}

impl ClientMessage {
    /// 요청 ID
    pub fn request_id(&self) -> u64 {
        match self {
            ClientMessage::Subscribe { request_id, .. }
            | ClientMessage::Unsubscribe { request_id, .. }
            | ClientMessage::GetMetricHistory { request_id, .. }
            | ClientMessage::SendMetric { request_id, .. }
            | ClientMessage::QueryMetrics { request_id, .. } => *request_id,
        }
    }
}

/// 서버가 보내는 에러 본문
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// 서버 → 클라이언트 메시지
///
/// 메트릭 이벤트는 개별 검증을 위해 원본 JSON으로 유지한다
/// (배치 내 잘못된 이벤트 하나가 프레임 전체를 무효화하지 않도록).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    MetricUpdate {
        event: serde_json::Value,
    },
    MetricBatchUpdate {
        events: Vec<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    Completion {
        request_id: u64,
        #[serde(default)]
        result: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<WireError>,
    },
    Error {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscribe_wire_format() {
        let msg = ClientMessage::Subscribe {
            request_id: 3,
            subscription_id: SubscriptionId(9),
            subscription: SubscriptionSpec::new(["orders"]),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "subscribe");
        assert_eq!(value["requestId"], 3);
        assert_eq!(value["subscriptionId"], 9);
        assert_eq!(value["subscription"]["metricNames"], json!(["orders"]));
        assert_eq!(msg.request_id(), 3);
    }

    #[test]
    fn history_wire_format() {
        let msg = ClientMessage::GetMetricHistory {
            request_id: 1,
            metric: "gmv.total".to_string(),
            duration_ms: 60_000,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "getMetricHistory");
        assert_eq!(value["durationMs"], 60_000);
    }

    #[test]
    fn parses_batch_update() {
        let text = r#"{"type":"metricBatchUpdate","events":[{"metricName":"a","value":1},{"bogus":true}]}"#;
        let msg: ServerMessage = serde_json::from_str(text).unwrap();
        match msg {
            ServerMessage::MetricBatchUpdate { events } => assert_eq!(events.len(), 2),
            other => panic!("예상과 다른 메시지: {other:?}"),
        }
    }

    #[test]
    fn parses_completion_without_optional_fields() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"completion","requestId":5}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Completion {
                request_id: 5,
                result: None,
                error: None
            }
        );
    }

    #[test]
    fn parses_completion_error() {
        let text = r#"{"type":"completion","requestId":2,"error":{"message":"forbidden","code":"403"}}"#;
        let msg: ServerMessage = serde_json::from_str(text).unwrap();
        assert!(matches!(
            msg,
            ServerMessage::Completion { error: Some(WireError { ref message, .. }), .. } if message == "forbidden"
        ));
    }

    #[test]
    fn parses_ping() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Ping);
    }

    #[test]
    fn rejects_unknown_type() {
        let result: Result<ServerMessage, _> = serde_json::from_str(r#"{"type":"bogus"}"#);
        assert!(result.is_err());
    }
}
