mod common;

use common::ark_config;
use douyin_resolver::ark::{ArkClient, Error};
use httpmock::prelude::*;
use serde_json::{json, Value};

fn reply(content: &str, finish_reason: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": finish_reason
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20 }
    })
}

#[test]
fn corrects_then_summarizes_then_titles() {
    let server = MockServer::start();
    let correct = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .header("Authorization", "Bearer ark-key")
            .body_contains("doubao-seed-2-0-mini-260215")
            .body_contains("校对助手")
            .body_contains("大家好今天聊聊大模形");
        then.status(200).json_body(reply("大家好，今天聊聊大模型。", "stop"));
    });
    let summary = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_contains("摘要助手")
            .body_contains("大家好，今天聊聊大模型。");
        then.status(200).json_body(reply(" 介绍了大模型的新进展。\n", "stop"));
    });
    let title = server.mock(|when, then| {
        when.method(POST).path("/chat/completions").body_contains("标题生成助手");
        then.status(200).json_body(reply("《大模型新进展》", "stop"));
    });

    let processed = ArkClient::new(ark_config(server.base_url()))
        .process("大家好今天聊聊大模形")
        .expect("processed");

    assert_eq!(processed.corrected_text, "大家好，今天聊聊大模型。");
    assert_eq!(processed.summary, "介绍了大模型的新进展。");
    assert_eq!(processed.title, "大模型新进展");
    correct.assert();
    summary.assert();
    title.assert();
}

#[test]
fn truncated_reply_is_continued() {
    let server = MockServer::start();
    // defined first so it wins over the opening turn for follow-up requests
    let follow_up = server.mock(|when, then| {
        when.method(POST).path("/chat/completions").body_contains("从中断处接着输出");
        then.status(200).json_body(reply("第二段", "stop"));
    });
    let opening = server.mock(|when, then| {
        when.method(POST).path("/chat/completions").body_contains("校对助手");
        then.status(200).json_body(reply("第一段", "length"));
    });

    let text = ArkClient::new(ark_config(server.base_url())).correct("原文").expect("corrected");

    assert_eq!(text, "第一段第二段");
    opening.assert_hits(1);
    follow_up.assert_hits(1);
}

#[test]
fn continuation_turns_are_capped() {
    let server = MockServer::start();
    let chat = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(reply("段", "length"));
    });

    let text = ArkClient::new(ark_config(server.base_url())).summarize("原文").expect("summarized");

    assert_eq!(text, "段段段");
    chat.assert_hits(3);
}

#[test]
fn http_error_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(401).body("{\"error\":{\"code\":\"AuthenticationError\"}}");
    });

    let err = ArkClient::new(ark_config(server.base_url())).correct("原文").unwrap_err();
    assert!(matches!(err, Error::StatusNotOk { status: 401, .. }));
}

#[test]
fn error_payload_without_choices() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(json!({ "error": { "code": "InvalidParameter", "message": "bad model" } }));
    });

    let err = ArkClient::new(ark_config(server.base_url())).correct("原文").unwrap_err();
    assert!(matches!(err, Error::Api(ref m) if m.contains("bad model")));
}

#[test]
fn failed_title_keeps_the_rest() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions").body_contains("标题生成助手");
        then.status(500).body("overloaded");
    });
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(reply("正文", "stop"));
    });

    let processed = ArkClient::new(ark_config(server.base_url())).process("原文").expect("processed");

    assert_eq!(processed.corrected_text, "正文");
    assert_eq!(processed.summary, "正文");
    assert_eq!(processed.title, "");
}
