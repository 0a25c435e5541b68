#![allow(clippy::float_cmp)]

use super::*;

#[test]
fn endpoint_joins_without_double_slash() {
    assert_eq!(endpoint("http://gw:8700/", "/v1/extract"), "http://gw:8700/v1/extract");
    assert_eq!(endpoint("http://gw:8700", "v1/align"), "http://gw:8700/v1/align");
}

#[test]
fn extract_response_returns_raw_text() {
    let raw = parse_extract_response(r#"{"text": "```json\n{\"annotations\": []}\n```", "model": "m"}"#).unwrap();
    assert!(raw.starts_with("```json"));
}

#[test]
fn extract_response_empty_text_is_error() {
    let err = parse_extract_response(r#"{"text": "  "}"#).unwrap_err();
    assert_eq!(err.error_code(), "E_GATEWAY_PARSE");
}

#[test]
fn extract_response_wrong_shape_is_error() {
    assert!(matches!(parse_extract_response(r#"{"draft": {}}"#), Err(ServiceError::Parse(_))));
    assert!(matches!(parse_extract_response("not json"), Err(ServiceError::Parse(_))));
}

#[test]
fn align_response_with_optional_fields() {
    let a = parse_align_response(r#"{"x": 10, "y": 20.5, "w": 30, "h": 40, "pen_width": 3}"#).unwrap();
    assert_eq!(a.x, 10.0);
    assert_eq!(a.y, 20.5);
    assert_eq!(a.pen_width, Some(3.0));
    assert!(a.adjust1.is_none());
    assert!(a.pen_color.is_none());
}

#[test]
fn align_response_rejects_empty_box() {
    assert!(parse_align_response(r#"{"x": 0, "y": 0, "w": 0, "h": 10}"#).is_err());
    assert!(parse_align_response(r#"{"x": 0, "y": 0}"#).is_err());
}

#[test]
fn retryable_statuses() {
    assert!(ServiceError::Request("reset".into()).retryable());
    assert!(ServiceError::Response { status: 503, body: String::new() }.retryable());
    assert!(ServiceError::Response { status: 429, body: String::new() }.retryable());
    assert!(!ServiceError::Response { status: 400, body: String::new() }.retryable());
    assert!(!ServiceError::Parse("x".into()).retryable());
}

#[tokio::test]
async fn align_refuses_record_without_geometry() {
    let config = ServiceConfig {
        base_url: "http://127.0.0.1:9".into(),
        api_key: "k".into(),
        model: "m".into(),
        timeouts: crate::config::ServiceTimeouts { request_secs: 1, connect_secs: 1 },
    };
    let client = HttpAssist::new(&config).unwrap();
    let record = AnnotationRecord::from_value(serde_json::json!({"id": "a000001", "kind": "rect"})).unwrap();
    let err = client.align(Path::new("shot.png"), &record).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotAlignable(ref id) if id == "a000001"));
}
