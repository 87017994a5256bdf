use super::presence::{self, PresenceKind};
use super::*;

#[test]
fn test_presence_status_decodes_array() {
	let payload = br#"{"req":7,"time":1589626821,"event":"status","channel":"retain-demo/","who":[{"id":"B"},{"id":"C","username":"carol"}]}"#;

	let event = presence::decode(payload).unwrap();
	assert_eq!(event.event, PresenceKind::Status);
	assert_eq!(event.request_id(), 7);
	assert_eq!(event.who.len(), 2);
	assert_eq!(event.who[1].username.as_deref(), Some("carol"));
}

#[test]
fn test_presence_notifications_decode_single_object() {
	for kind in ["subscribe", "unsubscribe"] {
		let payload = format!(
			r#"{{"time":1589626821,"event":"{kind}","channel":"retain-demo/","who":{{"id":"A"}}}}"#
		);

		let event = presence::decode(payload.as_bytes()).unwrap();
		assert_eq!(event.who.len(), 1);
		assert_eq!(event.who[0].id, "A");
		assert_eq!(event.who[0].username, None);
		assert_eq!(event.request_id(), 0);
		assert_eq!(event.time, 1_589_626_821);
	}
}

#[test]
fn test_presence_shape_mismatch_keeps_envelope() {
	let payload = br#"{"event":"unsubscribe","channel":"demo/","who":[{"id":"B"},{"id":"C"}]}"#;

	let event = presence::decode(payload).unwrap();
	assert_eq!(event.event, PresenceKind::Unsubscribe);
	assert_eq!(event.channel, "demo/");
	assert!(event.who.is_empty());
}

#[test]
fn test_presence_unknown_kind_is_tolerated() {
	let payload = br#"{"event":"teleport","channel":"demo/","who":{"id":"A"}}"#;

	let event = presence::decode(payload).unwrap();
	assert_eq!(event.event, PresenceKind::Unknown);
	assert_eq!(event.who.len(), 1);
}

#[test]
fn test_presence_without_event_is_single_subject_notification() {
	let payload = br#"{"channel":"demo/","time":1589626821,"who":{"id":"A","username":"ann"}}"#;

	let event = presence::decode(payload).unwrap();
	assert_eq!(event.event, PresenceKind::Unknown);
	assert_eq!(event.who, vec![presence::PresenceInfo {
		id: "A".to_owned(),
		username: Some("ann".to_owned()),
	}]);
}

#[test]
fn test_decode_reply_presence_and_error_topics() {
	let presence = decode_reply(
		ControlKind::Presence,
		br#"{"req":3,"event":"status","channel":"a/","who":[]}"#,
	)
	.unwrap();
	assert!(matches!(presence, Response::Presence(event) if event.request_id() == 3));

	let error =
		decode_reply(ControlKind::Error, br#"{"req":4,"status":500}"#).unwrap();
	assert!(matches!(error, Response::Error(e) if e.status == 500 && e.request_id() == 4));
}

#[test]
fn test_decode_reply_prefers_error_envelope() {
	let payload = br#"{"req":3,"status":401,"message":"the security key provided is not authorized"}"#;

	let response = decode_reply(ControlKind::KeyGen, payload).unwrap();
	assert_eq!(response.request_id(), 3);
	match response {
		| Response::Error(error) => {
			assert_eq!(error.status, 401);
			assert_eq!(
				error.to_string(),
				"the security key provided is not authorized"
			);
		}
		| other => panic!("expected an error, got {other:?}"),
	}
}

#[test]
fn test_decode_reply_keygen() {
	let payload = br#"{"req":12,"status":200,"key":"generated","channel":"a/b/"}"#;

	let response = decode_reply(ControlKind::KeyGen, payload).unwrap();
	assert_eq!(
		response,
		Response::KeyGen(KeyGenResponse {
			request: 12,
			status: 200,
			key: "generated".to_string(),
			channel: "a/b/".to_string(),
			message: String::new(),
		})
	);
}

#[test]
fn test_decode_reply_other_kinds() {
	let keyban = decode_reply(ControlKind::KeyBan, br#"{"req":1,"status":200,"banned":true}"#).unwrap();
	assert!(matches!(keyban, Response::KeyBan(KeyBanResponse { banned: true, .. })));

	let link = decode_reply(ControlKind::Link, br#"{"req":2,"name":"a0","channel":"key/a/b/"}"#).unwrap();
	assert_eq!(link.kind(), "link");
	assert_eq!(link.request_id(), 2);

	let me = decode_reply(ControlKind::Me, br#"{"req":4,"id":"conn-id","links":{"a0":"a/b/"}}"#).unwrap();
	match me {
		| Response::Me(me) => {
			assert_eq!(me.id, "conn-id");
			assert_eq!(me.links.get("a0").map(String::as_str), Some("a/b/"));
		}
		| other => panic!("expected me response, got {other:?}"),
	}
}

#[test]
fn test_decode_reply_rejects_malformed_payload() {
	assert!(decode_reply(ControlKind::KeyGen, b"not json").is_err());
	assert!(decode_reply(ControlKind::Me, br#"{"id":12}"#).is_err());
}

#[test]
fn test_requests_use_wire_field_names() {
	let keygen = KeyGenRequest {
		key: "master".to_string(),
		channel: "a/".to_string(),
		permissions: "rw".to_string(),
		ttl: 60,
	};
	let json = serde_json::to_value(&keygen).unwrap();
	assert_eq!(
		json,
		serde_json::json!({"key": "master", "channel": "a/", "type": "rw", "ttl": 60})
	);

	let link = LinkRequest {
		name: "a0".to_string(),
		key: "key".to_string(),
		channel: "a/b/".to_string(),
		subscribe: true,
	};
	let json = serde_json::to_value(&link).unwrap();
	assert_eq!(json["subscribe"], serde_json::json!(true));
}

#[test]
fn test_control_kind_round_trips_names() {
	for kind in [
		ControlKind::Presence,
		ControlKind::Error,
		ControlKind::KeyGen,
		ControlKind::KeyBan,
		ControlKind::Link,
		ControlKind::Me,
	] {
		assert_eq!(ControlKind::from_segment(kind.as_str()), Some(kind));
	}
	assert_eq!(ControlKind::from_segment("history"), None);
}
