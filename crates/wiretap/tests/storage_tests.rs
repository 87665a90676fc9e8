//! Integration tests for the SQLite interaction store.

use chrono::Utc;
use tempfile::TempDir;

use wiretap::model::{Interaction, Provider, StreamChunk, TokenUsage};
use wiretap::storage::{InteractionFilter, InteractionStore};

fn open_store(dir: &TempDir) -> InteractionStore {
    InteractionStore::open(&dir.path().join("test.db"), true).expect("open store")
}

fn sample_interaction(provider: Provider, path: &str) -> Interaction {
    let mut interaction = Interaction::begin(provider, "POST", path);
    interaction.request.model = Some("gpt-4o".to_string());
    interaction
        .request
        .headers
        .insert("content-type".to_string(), "application/json".to_string());
    interaction
}

fn sample_chunk(interaction_id: &str, seq: u32, text: &str) -> StreamChunk {
    StreamChunk {
        id: format!("{interaction_id}-{seq}"),
        interaction_id: interaction_id.to_string(),
        seq,
        received_at: Utc::now(),
        raw: format!("data: {{\"text\":\"{text}\"}}"),
        decoded: Some(serde_json::json!({"text": text})),
        event_type: "chunk".to_string(),
        delta_text: Some(text.to_string()),
    }
}

#[tokio::test]
async fn test_insert_and_get_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut interaction = sample_interaction(Provider::OpenAI, "/v1/chat/completions");
    interaction.session_id = Some("agent-a".to_string());
    interaction.request.body_raw = Some("{\"model\":\"gpt-4o\"}".to_string());

    store.insert_started(&interaction).await;
    store.flush().await;

    let loaded = store.get_interaction(&interaction.id).unwrap().unwrap();
    assert_eq!(loaded.id, interaction.id);
    assert_eq!(loaded.session_id.as_deref(), Some("agent-a"));
    assert_eq!(loaded.provider, Provider::OpenAI);
    assert_eq!(loaded.request.model.as_deref(), Some("gpt-4o"));
    assert_eq!(
        loaded.request.body_raw.as_deref(),
        Some("{\"model\":\"gpt-4o\"}")
    );
    // Not yet completed
    assert!(loaded.completed_at.is_none());
    assert!(loaded.response.status_code.is_none());
}

#[tokio::test]
async fn test_complete_updates_row_in_place() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut interaction = sample_interaction(Provider::Anthropic, "/v1/messages");
    store.insert_started(&interaction).await;

    interaction.completed_at = Some(Utc::now());
    interaction.response.status_code = Some(200);
    interaction.response.reconstructed_text = Some("Hello".to_string());
    interaction.metrics.token_usage = Some(TokenUsage {
        prompt_tokens: Some(12),
        completion_tokens: Some(2),
        ..Default::default()
    });
    interaction.metrics.total_latency_ms = Some(41.5);
    store.complete(&interaction).await;
    store.flush().await;

    let loaded = store.get_interaction(&interaction.id).unwrap().unwrap();
    assert_eq!(loaded.response.status_code, Some(200));
    assert_eq!(loaded.response.reconstructed_text.as_deref(), Some("Hello"));
    assert!(loaded.completed_at.is_some());
    let usage = loaded.metrics.token_usage.unwrap();
    assert_eq!(usage.prompt_tokens, Some(12));
    assert_eq!(usage.completion_tokens, Some(2));
    assert_eq!(loaded.metrics.total_latency_ms, Some(41.5));

    // Still exactly one row
    let all = store
        .list_interactions(10, 0, &InteractionFilter::default())
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn test_chunks_come_back_ordered_by_seq() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let interaction = sample_interaction(Provider::Ollama, "/api/generate");
    store.insert_started(&interaction).await;
    for seq in 0..5 {
        store
            .append_chunk(sample_chunk(&interaction.id, seq, &format!("t{seq}")))
            .await;
    }
    store.flush().await;

    let loaded = store.get_interaction(&interaction.id).unwrap().unwrap();
    assert_eq!(loaded.chunks.len(), 5);
    let seqs: Vec<u32> = loaded.chunks.iter().map(|c| c.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    assert_eq!(loaded.chunks[3].delta_text.as_deref(), Some("t3"));
    assert_eq!(
        loaded.chunks[0].decoded.as_ref().unwrap()["text"],
        serde_json::json!("t0")
    );
}

#[tokio::test]
async fn test_chunk_storage_disabled_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let store = InteractionStore::open(&dir.path().join("nochunks.db"), false).expect("open");

    let interaction = sample_interaction(Provider::Ollama, "/api/generate");
    store.insert_started(&interaction).await;
    store
        .append_chunk(sample_chunk(&interaction.id, 0, "t"))
        .await;
    store.flush().await;

    let loaded = store.get_interaction(&interaction.id).unwrap().unwrap();
    assert!(loaded.chunks.is_empty());
}

#[tokio::test]
async fn test_list_filters() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut a = sample_interaction(Provider::OpenAI, "/v1/chat/completions");
    a.session_id = Some("s1".to_string());
    let mut b = sample_interaction(Provider::Anthropic, "/v1/messages");
    b.request.model = Some("claude-sonnet-4-20250514".to_string());
    b.session_id = Some("s2".to_string());
    let c = sample_interaction(Provider::Ollama, "/api/generate");

    for interaction in [&a, &b, &c] {
        store.insert_started(interaction).await;
    }
    store.flush().await;

    let all = store
        .list_interactions(10, 0, &InteractionFilter::default())
        .unwrap();
    assert_eq!(all.len(), 3);

    let openai_only = store
        .list_interactions(
            10,
            0,
            &InteractionFilter {
                provider: Some("openai".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(openai_only.len(), 1);
    assert_eq!(openai_only[0].id, a.id);

    let by_model = store
        .list_interactions(
            10,
            0,
            &InteractionFilter {
                model: Some("claude-sonnet-4-20250514".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(by_model.len(), 1);
    assert_eq!(by_model[0].id, b.id);

    let by_session = store
        .list_interactions(
            10,
            0,
            &InteractionFilter {
                session_id: Some("s2".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(by_session.len(), 1);
    assert_eq!(by_session[0].id, b.id);
}

#[tokio::test]
async fn test_list_sessions_groups_by_session_id() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    for (session, provider) in [
        (Some("s1"), Provider::OpenAI),
        (Some("s1"), Provider::Anthropic),
        (Some("s2"), Provider::Ollama),
        (None, Provider::OpenAI),
    ] {
        let mut interaction = sample_interaction(provider, "/v1/chat/completions");
        interaction.session_id = session.map(str::to_string);
        store.insert_started(&interaction).await;
    }
    store.flush().await;

    let sessions = store.list_sessions().unwrap();
    assert_eq!(sessions.len(), 2);

    let s1 = sessions.iter().find(|s| s.session_id == "s1").unwrap();
    assert_eq!(s1.interaction_count, 2);
    assert_eq!(s1.providers.len(), 2);
    assert!(s1.first_interaction.is_some());

    let s2 = sessions.iter().find(|s| s.session_id == "s2").unwrap();
    assert_eq!(s2.interaction_count, 1);
}

#[tokio::test]
async fn test_stats_aggregates() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let mut ok = sample_interaction(Provider::OpenAI, "/v1/chat/completions");
    ok.metrics.total_latency_ms = Some(100.0);
    ok.metrics.token_usage = Some(TokenUsage {
        total_tokens: Some(40),
        ..Default::default()
    });
    let mut failed = sample_interaction(Provider::Anthropic, "/v1/messages");
    failed.error = Some("upstream_connect: refused".to_string());
    failed.metrics.total_latency_ms = Some(300.0);

    store.insert_started(&ok).await;
    store.complete(&ok).await;
    store.insert_started(&failed).await;
    store.complete(&failed).await;
    store.flush().await;

    let stats = store.stats().unwrap();
    assert_eq!(stats.total_interactions, 2);
    assert_eq!(stats.error_count, 1);
    assert!((stats.error_rate - 0.5).abs() < 1e-9);
    assert_eq!(stats.by_provider.get("openai"), Some(&1));
    assert_eq!(stats.by_provider.get("anthropic"), Some(&1));
    assert_eq!(stats.by_model.get("gpt-4o"), Some(&2));
    assert_eq!(stats.avg_latency_ms, Some(200.0));
    assert_eq!(stats.total_tokens, 40);
}

#[tokio::test]
async fn test_delete_all_clears_interactions_and_chunks() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let interaction = sample_interaction(Provider::Ollama, "/api/generate");
    store.insert_started(&interaction).await;
    store
        .append_chunk(sample_chunk(&interaction.id, 0, "x"))
        .await;

    let deleted = store.delete_all().await.unwrap();
    assert_eq!(deleted, 1);

    assert!(store.get_interaction(&interaction.id).unwrap().is_none());
    assert_eq!(
        store
            .list_interactions(10, 0, &InteractionFilter::default())
            .unwrap()
            .len(),
        0
    );
    assert_eq!(store.stats().unwrap().total_interactions, 0);
}

#[tokio::test]
async fn test_reopen_preserves_data() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("persist.db");

    let interaction = {
        let store = InteractionStore::open(&db_path, true).unwrap();
        let interaction = sample_interaction(Provider::OpenAI, "/v1/chat/completions");
        store.insert_started(&interaction).await;
        store.flush().await;
        interaction
    };

    let store = InteractionStore::open(&db_path, true).unwrap();
    let loaded = store.get_interaction(&interaction.id).unwrap();
    assert!(loaded.is_some());
}
