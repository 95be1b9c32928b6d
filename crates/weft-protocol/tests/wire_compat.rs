// Verifies the wire format matches what clients expect.

use weft_core::error::WeftError;
use weft_protocol::frames::{EventFrame, InboundFrame, ResFrame};
use weft_protocol::methods;

#[test]
fn req_frame_round_trip() {
    let json = r#"{"type":"req","id":"abc-123","method":"chat:sendMessage","params":{"text":"hello"}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert_eq!(frame.frame_type, "req");

    let req = frame.as_req().unwrap();
    assert_eq!(req.method, methods::CHAT_SEND_MESSAGE);
    assert_eq!(req.id, "abc-123");
}

#[test]
fn res_ok_serialization() {
    let res = ResFrame::ok("req-1", serde_json::json!({"pong": true}));
    let json = serde_json::to_string(&res).unwrap();

    assert!(json.contains(r#""type":"res""#));
    assert!(json.contains(r#""ok":true"#));
    assert!(json.contains(r#""pong":true"#));
    assert!(!json.contains(r#""error""#));
}

#[test]
fn res_err_serialization() {
    let res = ResFrame::err("req-2", "NOT_FOUND", "topic not found");
    let json = serde_json::to_string(&res).unwrap();

    assert!(json.contains(r#""ok":false"#));
    assert!(json.contains(r#""NOT_FOUND""#));
    assert!(!json.contains(r#""payload""#));
}

#[test]
fn res_from_error_uses_stable_code() {
    let err = WeftError::GenerationCancelled;
    let res = ResFrame::from_error("req-3", &err);
    assert!(!res.ok);
    assert_eq!(res.error.unwrap().code, "GENERATION_CANCELLED");
}

#[test]
fn event_frame_with_seq() {
    let ev = EventFrame::new(
        methods::EVENT_MESSAGE_STREAM,
        serde_json::json!({"topicId": "t1", "messageId": "m1", "chunk": "hi"}),
    )
    .with_seq(42);
    let json = serde_json::to_string(&ev).unwrap();

    assert!(json.contains(r#""type":"event""#));
    assert!(json.contains(r#""event":"message:stream""#));
    assert!(json.contains(r#""seq":42"#));
}

#[test]
fn inbound_frame_rejects_non_req() {
    let json = r#"{"type":"event","event":"keywords:updated","payload":{}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert!(frame.as_req().is_none(), "event frame must not parse as req");
}

#[test]
fn method_constants_match_spec_names() {
    assert_eq!(methods::TOPIC_ANALYSIS_GET_KEYWORDS, "topicAnalysis:getKeywords");
    assert_eq!(methods::TOPIC_ANALYSIS_GET_SUBJECTS, "topicAnalysis:getSubjects");
    assert_eq!(methods::TOPIC_ANALYSIS_GET_SUMMARIES, "topicAnalysis:getSummaries");
    assert_eq!(
        methods::TOPIC_ANALYSIS_EXTRACT_REALTIME_KEYWORDS,
        "topicAnalysis:extractRealtimeKeywords"
    );
    assert_eq!(methods::PROPOSALS_GET_FOR_TOPIC, "proposals:getForTopic");
    assert_eq!(methods::PROPOSALS_DISMISS, "proposals:dismiss");
    assert_eq!(methods::PROPOSALS_SHARE, "proposals:share");
    assert_eq!(methods::CHAT_SEND_MESSAGE, "chat:sendMessage");
    assert_eq!(methods::CHAT_STOP_STREAMING, "chat:stopStreaming");
}
