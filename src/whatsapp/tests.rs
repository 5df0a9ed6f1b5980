use super::*;
use serde_json::json;

fn flow_message(from: &str, response_json: &str) -> Value {
    json!({
        "from": from,
        "id": "wamid.HBgM",
        "timestamp": "1717171717",
        "type": "interactive",
        "interactive": {
            "type": "nfm_reply",
            "nfm_reply": {
                "name": "flow",
                "body": "Sent",
                "response_json": response_json
            }
        }
    })
}

fn envelope(changes: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "object": "whatsapp_business_account",
        "entry": [{ "id": "WABA-1", "changes": changes }]
    }))
    .unwrap()
}

#[test]
fn test_decode_rejects_invalid_json() {
    let err = decode_envelope(b"{not json").unwrap_err();
    assert!(matches!(err, BookhookError::MalformedPayload(_)));
}

#[test]
fn test_decode_missing_object_is_validation_error() {
    let err = decode_envelope(br#"{"entry": []}"#).unwrap_err();
    assert!(matches!(err, BookhookError::Validation(_)));
}

#[test]
fn test_decode_empty_object_is_validation_error() {
    let err = decode_envelope(br#"{"object": ""}"#).unwrap_err();
    assert!(matches!(err, BookhookError::Validation(_)));
}

#[test]
fn test_decode_non_object_body_is_validation_error() {
    let err = decode_envelope(b"[1, 2, 3]").unwrap_err();
    assert!(matches!(err, BookhookError::Validation(_)));
}

#[test]
fn test_decode_wrong_shape_is_internal() {
    let err = decode_envelope(br#"{"object": "page", "entry": "nope"}"#).unwrap_err();
    assert!(matches!(err, BookhookError::Internal(_)));

    let err = decode_envelope(br#"{"object": "page", "entry": {}}"#).unwrap_err();
    assert!(matches!(err, BookhookError::Internal(_)));
}

#[test]
fn test_envelope_without_entries_yields_no_events() {
    let env = decode_envelope(br#"{"object": "whatsapp_business_account"}"#).unwrap();
    assert!(normalize(&env).is_empty());

    let env = decode_envelope(br#"{"object": "x", "entry": [{"id": "1"}]}"#).unwrap();
    assert!(normalize(&env).is_empty());

    let env = decode_envelope(br#"{"object": "x", "entry": null}"#).unwrap();
    assert!(normalize(&env).is_empty());
}

#[test]
fn test_only_first_message_per_change() {
    let body = envelope(json!([{
        "field": "messages",
        "value": {
            "messages": [
                {"from": "111", "type": "text", "text": {"body": "hi"}},
                {"from": "222", "type": "text", "text": {"body": "ignored"}}
            ]
        }
    }]));
    let events = normalize(&decode_envelope(&body).unwrap());
    assert_eq!(events.len(), 1);
    match &events[0] {
        DomainEvent::MessageReceived {
            account_id,
            message,
        } => {
            assert_eq!(account_id, "WABA-1");
            assert_eq!(message.from, "111");
            assert_eq!(message.kind, MessageKind::Text);
            assert_eq!(message.text.as_ref().unwrap().body, "hi");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_one_event_per_delivery_status() {
    let body = envelope(json!([{
        "field": "messages",
        "value": {
            "statuses": [
                {"id": "wamid.1", "recipient_id": "111", "status": "sent"},
                {"id": "wamid.2", "recipient_id": "222", "status": "read"},
                {"id": "wamid.3", "recipient_id": "333", "status": "deleted"}
            ]
        }
    }]));
    let events = normalize(&decode_envelope(&body).unwrap());
    let statuses: Vec<(String, StatusKind)> = events
        .iter()
        .map(|e| match e {
            DomainEvent::DeliveryStatusUpdate { status, .. } => {
                (status.recipient_id.clone(), status.status)
            }
            other => panic!("unexpected event: {:?}", other),
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("111".to_string(), StatusKind::Sent),
            ("222".to_string(), StatusKind::Read),
            ("333".to_string(), StatusKind::Unknown),
        ]
    );
}

#[test]
fn test_template_status_update() {
    let body = envelope(json!([{
        "field": "message_template_status_update",
        "value": {
            "event": "APPROVED",
            "message_template_id": 12345678,
            "message_template_name": "booking_confirmation",
            "message_template_language": "en_US",
            "reason": null
        }
    }]));
    let events = normalize(&decode_envelope(&body).unwrap());
    assert_eq!(events.len(), 1);
    match &events[0] {
        DomainEvent::TemplateStatusUpdate { update, .. } => {
            assert_eq!(update.event.as_deref(), Some("APPROVED"));
            assert_eq!(update.template_id.as_deref(), Some("12345678"));
            assert_eq!(update.template_name.as_deref(), Some("booking_confirmation"));
            assert_eq!(update.language.as_deref(), Some("en_US"));
            assert!(update.reason.is_none());
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_single_change_can_yield_several_events() {
    let body = envelope(json!([{
        "field": "messages",
        "value": {
            "messages": [{"from": "111", "type": "text", "text": {"body": "hi"}}],
            "statuses": [{"recipient_id": "111", "status": "delivered"}]
        }
    }]));
    let events = normalize(&decode_envelope(&body).unwrap());
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], DomainEvent::MessageReceived { .. }));
    assert!(matches!(events[1], DomainEvent::DeliveryStatusUpdate { .. }));
}

#[test]
fn test_events_follow_entry_and_change_order() {
    let body = serde_json::to_vec(&json!({
        "object": "whatsapp_business_account",
        "entry": [
            {"id": "A", "changes": [
                {"field": "messages", "value": {"messages": [{"from": "1", "type": "text"}]}},
                {"field": "messages", "value": {"messages": [{"from": "2", "type": "text"}]}}
            ]},
            {"id": "B", "changes": [
                {"field": "messages", "value": {"messages": [{"from": "3", "type": "text"}]}}
            ]}
        ]
    }))
    .unwrap();
    let senders: Vec<(String, String)> = normalize(&decode_envelope(&body).unwrap())
        .into_iter()
        .map(|e| match e {
            DomainEvent::MessageReceived {
                account_id,
                message,
            } => (account_id, message.from),
            other => panic!("unexpected event: {:?}", other),
        })
        .collect();
    assert_eq!(
        senders,
        vec![
            ("A".to_string(), "1".to_string()),
            ("A".to_string(), "2".to_string()),
            ("B".to_string(), "3".to_string()),
        ]
    );
}

#[test]
fn test_form_reply_detected() {
    let body = envelope(json!([{
        "field": "messages",
        "value": {"messages": [flow_message("15551234567", r#"{"services":["Facial"]}"#)]}
    }]));
    let events = normalize(&decode_envelope(&body).unwrap());
    let DomainEvent::MessageReceived { message, .. } = &events[0] else {
        panic!("expected message event");
    };
    let reply = message.form_reply().expect("form reply");
    assert_eq!(
        reply.response_json,
        Some(Value::String(r#"{"services":["Facial"]}"#.to_string()))
    );
}

#[test]
fn test_form_reply_without_payload_is_still_a_form_reply() {
    let message: IncomingMessage = serde_json::from_value(json!({
        "from": "111",
        "type": "interactive",
        "interactive": {"type": "nfm_reply"}
    }))
    .unwrap();
    let reply = message.form_reply().expect("form reply");
    assert!(reply.response_json.is_none());
}

#[test]
fn test_button_reply_is_not_a_form_reply() {
    let message: IncomingMessage = serde_json::from_value(json!({
        "from": "111",
        "type": "interactive",
        "interactive": {
            "type": "button_reply",
            "button_reply": {"id": "yes", "title": "Yes"}
        }
    }))
    .unwrap();
    assert!(matches!(message.interactive, Some(Interactive::Other)));
    assert!(message.form_reply().is_none());
}

#[test]
fn test_interactive_without_type_is_other() {
    let message: IncomingMessage = serde_json::from_value(json!({
        "from": "111",
        "type": "interactive",
        "interactive": {"nfm_reply": {}}
    }))
    .unwrap();
    assert!(matches!(message.interactive, Some(Interactive::Other)));
    assert!(message.form_reply().is_none());
}

#[test]
fn test_interactive_with_non_string_type_is_other() {
    let message: IncomingMessage = serde_json::from_value(json!({
        "from": "111",
        "type": "interactive",
        "interactive": {"type": 7}
    }))
    .unwrap();
    assert!(matches!(message.interactive, Some(Interactive::Other)));
}

#[test]
fn test_undecodable_nfm_reply_body_is_empty_form() {
    let message: IncomingMessage = serde_json::from_value(json!({
        "from": "111",
        "type": "interactive",
        "interactive": {"type": "nfm_reply", "nfm_reply": "oops"}
    }))
    .unwrap();
    let reply = message.form_reply().expect("form reply");
    assert!(reply.response_json.is_none());
}

#[test]
fn test_odd_message_does_not_hide_sibling_changes() {
    let body = envelope(json!([
        {
            "field": "messages",
            "value": {"messages": [flow_message("111", r#"{"services":["Facial"]}"#)]}
        },
        {
            "field": "messages",
            "value": {"messages": [{
                "from": "222",
                "type": "interactive",
                "interactive": {"nfm_reply": {}}
            }]}
        }
    ]));
    let events = normalize(&decode_envelope(&body).unwrap());
    assert_eq!(events.len(), 2);
    let DomainEvent::MessageReceived { message, .. } = &events[0] else {
        panic!("expected message event");
    };
    assert_eq!(message.from, "111");
    assert!(message.form_reply().is_some());
}

#[test]
fn test_undecodable_items_are_skipped() {
    let body = envelope(json!([{
        "field": "messages",
        "value": {
            "messages": [{"from": ["not", "a", "phone"]}, flow_message("333", "{}")],
            "statuses": [42, {"id": "wamid.1", "recipient_id": "333", "status": "sent"}]
        }
    }]));
    let events = normalize(&decode_envelope(&body).unwrap());
    assert_eq!(events.len(), 2);
    let DomainEvent::MessageReceived { message, .. } = &events[0] else {
        panic!("expected message event");
    };
    assert_eq!(message.from, "333");
    let DomainEvent::DeliveryStatusUpdate { status, .. } = &events[1] else {
        panic!("expected status event");
    };
    assert_eq!(status.status, StatusKind::Sent);
}

#[test]
fn test_unknown_message_type_decodes_as_other() {
    let message: IncomingMessage =
        serde_json::from_value(json!({"from": "111", "type": "sticker"})).unwrap();
    assert_eq!(message.kind, MessageKind::Other);
    assert!(message.form_reply().is_none());
}

#[test]
fn test_status_kind_display() {
    assert_eq!(StatusKind::Delivered.to_string(), "delivered");
    assert_eq!(StatusKind::Unknown.to_string(), "unknown");
}
