use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use synaxis_core::cost::CostService;
use synaxis_core::models::{ChatRequest, Message};
use synaxis_core::providers::ProviderConfig;
use synaxis_core::routing_score::{score, ScoringInputs};
use synaxis_core::snapshot::{ModelCost, RoutingScorePolicy};
use synaxis_core::translation::{translate_chunk, StreamState, ToolCallAccumulator};

fn bench_routing_score(c: &mut Criterion) {
    let provider = ProviderConfig::new("openai", "test-key");
    let policy = RoutingScorePolicy::default();
    let inputs = ScoringInputs {
        observed_utilisation: 0.4,
    };

    c.bench_function("routing_score_single_candidate", |b| {
        b.iter(|| score(black_box(&provider), black_box(&policy), inputs));
    });
}

fn bench_cost_resolution(c: &mut Criterion) {
    let mut costs = HashMap::new();
    costs.insert(
        ("openai".to_string(), "gpt-4o".to_string()),
        ModelCost {
            input_cost_per_token: 0.000_005,
            output_cost_per_token: 0.000_015,
            free_tier: false,
        },
    );

    c.bench_function("cost_service_resolve", |b| {
        b.iter(|| CostService::resolve(black_box(&costs), "openai", "gpt-4o", false));
    });
}

fn bench_chat_request_roundtrip(c: &mut Criterion) {
    let request = ChatRequest {
        model: "gpt-4o".to_string(),
        messages: vec![
            Message::system("You are a helpful assistant."),
            Message::user("Hello, how are you?"),
        ],
        temperature: Some(0.7),
        max_tokens: Some(100),
        stream: Some(false),
        ..Default::default()
    };

    c.bench_function("chat_request_serialization", |b| {
        b.iter(|| serde_json::to_string(black_box(&request)));
    });

    let json = serde_json::to_string(&request).unwrap();
    c.bench_function("chat_request_deserialization", |b| {
        b.iter(|| {
            let _request: ChatRequest = serde_json::from_str(black_box(&json)).unwrap();
        });
    });
}

fn bench_stream_translation(c: &mut Criterion) {
    let chunk_json = r#"{
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "created": 1,
        "model": "gpt-4o",
        "choices": [{"index": 0, "delta": {"content": "hello"}, "finish_reason": null}]
    }"#;
    let chunk: synaxis_core::models::StreamChunk = serde_json::from_str(chunk_json).unwrap();

    c.bench_function("stream_chunk_translation", |b| {
        b.iter(|| {
            let mut state = StreamState::Initial;
            let mut accumulator = ToolCallAccumulator::new();
            translate_chunk(black_box(&chunk), &mut state, &mut accumulator)
        });
    });
}

criterion_group!(
    benches,
    bench_routing_score,
    bench_cost_resolution,
    bench_chat_request_roundtrip,
    bench_stream_translation
);
criterion_main!(benches);
