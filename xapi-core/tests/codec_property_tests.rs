//! Property tests for wire frame classification and request encoding.

use proptest::prelude::*;
use serde_json::json;

use xapi_core::{InboundFrame, Request};

fn tag_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9-]{1,36}"
}

fn command_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z]{1,20}"
}

proptest! {
    /// Any object with a `status` field and a non-empty tag is a reply, and
    /// classification preserves its fields.
    #[test]
    fn tagged_status_frames_classify_as_replies(
        tag in tag_strategy(),
        status in any::<bool>(),
    ) {
        let text = serde_json::to_string(&json!({
            "status": status,
            "customTag": tag,
        }))
        .unwrap();

        match InboundFrame::classify(&text).unwrap() {
            InboundFrame::Reply(reply) => {
                prop_assert_eq!(reply.status, status);
                prop_assert_eq!(reply.custom_tag.as_deref(), Some(tag.as_str()));
            }
            InboundFrame::Push(push) => {
                prop_assert!(false, "classified as push: {:?}", push);
            }
        }
    }

    /// Any object carrying a `command` and no status is a push, and
    /// classification preserves the command.
    #[test]
    fn command_frames_classify_as_pushes(command in command_strategy()) {
        let text = serde_json::to_string(&json!({
            "command": command,
            "data": {"x": 1},
        }))
        .unwrap();

        match InboundFrame::classify(&text).unwrap() {
            InboundFrame::Push(push) => {
                prop_assert_eq!(push.command, command);
                prop_assert_eq!(push.data, Some(json!({"x": 1})));
            }
            InboundFrame::Reply(reply) => {
                prop_assert!(false, "classified as reply: {:?}", reply);
            }
        }
    }

    /// Encoding a request and decoding the result reproduces it.
    #[test]
    fn request_encoding_round_trips(
        command in command_strategy(),
        tag in tag_strategy(),
        argument in any::<i64>(),
    ) {
        let request = Request::new(command)
            .with_arguments(&json!({"value": argument}))
            .unwrap()
            .with_tag(tag);

        let encoded = serde_json::to_string(&request).unwrap();
        let decoded: Request = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(request, decoded);
    }

    /// Distinct generated tags never collide in practice; classification of a
    /// reply carrying one routes it back unchanged.
    #[test]
    fn generated_tags_are_unique_across_requests(_seed in any::<u8>()) {
        let first = Request::new("ping").with_random_tag();
        let second = Request::new("ping").with_random_tag();
        prop_assert_ne!(first.custom_tag, second.custom_tag);
    }
}
