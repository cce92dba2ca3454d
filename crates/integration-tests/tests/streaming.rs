mod harness;

use std::time::Duration;

use futures_util::StreamExt;
use harness::config::ConfigBuilder;
use harness::mock_duck::{ChatScript, MockDuck};
use harness::server::{TestServer, sse_data};

fn streaming_body(include_usage: bool) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "Hello!"}],
        "stream": true
    });
    if include_usage {
        body["stream_options"] = serde_json::json!({"include_usage": true});
    }
    body
}

#[tokio::test]
async fn streaming_hello_ends_with_done() {
    let mock = MockDuck::start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new(&mock).build()).await.unwrap();

    let resp = server.chat(&streaming_body(false)).await;
    assert_eq!(resp.status(), 200);
    assert!(
        resp.headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let data = sse_data(&resp.text().await.unwrap());
    assert_eq!(data.last().unwrap(), "[DONE]");

    let chunks: Vec<serde_json::Value> = data[..data.len() - 1]
        .iter()
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();

    assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
    assert!(chunks[1..].iter().all(|c| c["choices"][0]["delta"].get("role").is_none()));
    assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));

    let id = chunks[0]["id"].as_str().unwrap();
    assert!(chunks.iter().all(|c| c["id"] == id));

    let text: String = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert_eq!(text, "Hi! How can I help?");

    let finishes: Vec<&serde_json::Value> = chunks
        .iter()
        .map(|c| &c["choices"][0]["finish_reason"])
        .filter(|f| !f.is_null())
        .collect();
    assert_eq!(finishes, vec![&serde_json::json!("stop")]);
    assert_eq!(chunks.last().unwrap()["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn usage_chunk_when_requested() {
    let mock = MockDuck::start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new(&mock).build()).await.unwrap();

    let data = sse_data(&server.chat(&streaming_body(true)).await.text().await.unwrap());
    assert_eq!(data.last().unwrap(), "[DONE]");

    let usage_chunk: serde_json::Value = serde_json::from_str(&data[data.len() - 2]).unwrap();
    assert!(usage_chunk["choices"].as_array().unwrap().is_empty());
    let usage = &usage_chunk["usage"];
    assert_eq!(
        usage["total_tokens"].as_u64().unwrap(),
        usage["prompt_tokens"].as_u64().unwrap() + usage["completion_tokens"].as_u64().unwrap()
    );
}

#[tokio::test]
async fn no_usage_chunk_by_default() {
    let mock = MockDuck::start().await.unwrap();
    let server = TestServer::start(ConfigBuilder::new(&mock).build()).await.unwrap();

    let data = sse_data(&server.chat(&streaming_body(false)).await.text().await.unwrap());
    assert!(!data.iter().any(|d| d.contains("\"usage\"")));
}

#[tokio::test]
async fn error_before_first_chunk_is_plain_json() {
    let mock = MockDuck::builder()
        .script(ChatScript::InBandError {
            status: 429,
            code: "ERR_CONVERSATION_LIMIT".to_owned(),
        })
        .start()
        .await
        .unwrap();
    let server = TestServer::start(ConfigBuilder::new(&mock).build()).await.unwrap();

    let resp = server.chat(&streaming_body(false)).await;
    assert_eq!(resp.status(), 429);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert!(json["error"]["message"].as_str().unwrap().contains("ERR_CONVERSATION_LIMIT"));
}

#[tokio::test]
async fn truncated_stream_ends_with_error_event() {
    let mock = MockDuck::builder()
        .script(ChatScript::Truncated(vec!["Hel".to_owned(), "lo".to_owned()]))
        .start()
        .await
        .unwrap();
    let server = TestServer::start(ConfigBuilder::new(&mock).build()).await.unwrap();

    let resp = server.chat(&streaming_body(false)).await;
    assert_eq!(resp.status(), 200);

    let data = sse_data(&resp.text().await.unwrap());
    assert!(!data.iter().any(|d| d == "[DONE]"));

    let last: serde_json::Value = serde_json::from_str(data.last().unwrap()).unwrap();
    assert_eq!(last["error"]["type"], "internal_server_error");

    let first: serde_json::Value = serde_json::from_str(&data[0]).unwrap();
    assert_eq!(first["choices"][0]["delta"]["content"], "Hel");
}

#[tokio::test]
async fn tool_call_streams_as_one_delta() {
    let mock = MockDuck::builder()
        .script(ChatScript::ToolCall {
            name: "get_weather".to_owned(),
            arguments: vec!["{\"city\"".to_owned(), ":\"Paris\"".to_owned(), "}".to_owned()],
        })
        .start()
        .await
        .unwrap();
    let server = TestServer::start(ConfigBuilder::new(&mock).build()).await.unwrap();

    let body = serde_json::json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "Weather in Paris?"}],
        "stream": true,
        "tools": [{"type": "function", "function": {"name": "get_weather"}}]
    });
    let data = sse_data(&server.chat(&body).await.text().await.unwrap());
    assert_eq!(data.last().unwrap(), "[DONE]");

    let chunks: Vec<serde_json::Value> = data[..data.len() - 1]
        .iter()
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();

    let calls: Vec<&serde_json::Value> = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"].get("tool_calls"))
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0]["id"], "call_mock");
    assert_eq!(calls[0][0]["function"]["name"], "get_weather");
    assert_eq!(calls[0][0]["function"]["arguments"], r#"{"city":"Paris"}"#);
    assert_eq!(chunks.last().unwrap()["choices"][0]["finish_reason"], "tool_calls");
}

#[tokio::test]
async fn client_disconnect_stops_upstream_stream() {
    let mock = MockDuck::builder()
        .script(ChatScript::Endless {
            interval: Duration::from_millis(20),
        })
        .start()
        .await
        .unwrap();
    let server = TestServer::start(ConfigBuilder::new(&mock).build()).await.unwrap();

    let resp = server.chat(&streaming_body(false)).await;
    assert_eq!(resp.status(), 200);

    let mut body = resp.bytes_stream();
    let mut seen = Vec::new();
    while !String::from_utf8_lossy(&seen).contains("data: ") {
        seen.extend_from_slice(&body.next().await.unwrap().unwrap());
    }
    drop(body);

    for _ in 0..100 {
        if mock.chat_stream_dropped() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(mock.chat_stream_dropped());

    let served = mock.chat_events_served();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(mock.chat_events_served(), served);
}
