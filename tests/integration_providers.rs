#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// HTTP contract tests for the Gemini and OpenAI clients against mock servers

mod common;

use std::time::Duration;

use common::{
    GEMINI_BATCH_PATH, GEMINI_EMBED_PATH, GEMINI_GENERATE_PATH, GeminiEmbeddingResponder,
    OpenAiEmbeddingResponder, embed_words, gemini_answer, init_test_tracing, mock_config,
    openai_answer, request_bodies,
};
use pdf_rag_chat::embeddings::Embedder;
use pdf_rag_chat::providers::http::HttpClient;
use pdf_rag_chat::providers::{
    ChatTurn, GeminiChat, GeminiEmbeddings, Generator, OpenAiChat, OpenAiEmbeddings,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry_client(attempts: u32) -> HttpClient {
    let config = mock_config(None, None, &[]);
    HttpClient::new(&config.http)
        .with_retry_attempts(attempts)
        .with_initial_backoff(Duration::from_millis(10))
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

#[tokio::test]
async fn gemini_embeds_documents_in_batches() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GEMINI_BATCH_PATH))
        .and(header("x-goog-api-key", common::GEMINI_KEY))
        .respond_with(GeminiEmbeddingResponder)
        .expect(3)
        .mount(&server)
        .await;

    let config = mock_config(Some(&server), None, &[]);
    let embeddings = GeminiEmbeddings::new(&config.gemini, &config.http, 2)
        .expect("client should build");
    let inputs = texts(&[
        "invoices are due monthly",
        "the office closes at six",
        "parking is free on weekends",
        "holidays follow the regional calendar",
        "laptops are replaced every three years",
    ]);

    let vectors = embeddings
        .embed_documents(&inputs)
        .await
        .expect("embedding should succeed");

    assert_eq!(vectors.len(), inputs.len());
    for (input, vector) in inputs.iter().zip(&vectors) {
        assert_eq!(vector, &embed_words(input));
    }

    let bodies = request_bodies(&server, GEMINI_BATCH_PATH).await;
    assert_eq!(bodies.len(), 3);
    assert_eq!(bodies[0]["requests"][0]["model"], "models/embedding-001");
    assert_eq!(bodies[0]["requests"][0]["taskType"], "RETRIEVAL_DOCUMENT");
    assert_eq!(
        bodies[2]["requests"][0]["content"]["parts"][0]["text"],
        "laptops are replaced every three years"
    );
}

#[tokio::test]
async fn gemini_query_uses_query_task_type() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GEMINI_EMBED_PATH))
        .respond_with(GeminiEmbeddingResponder)
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(Some(&server), None, &[]);
    let embeddings = GeminiEmbeddings::new(&config.gemini, &config.http, 8)
        .expect("client should build");

    let vector = embeddings
        .embed_query("when are invoices due")
        .await
        .expect("query embedding should succeed");

    assert_eq!(vector, embed_words("when are invoices due"));

    let bodies = request_bodies(&server, GEMINI_EMBED_PATH).await;
    assert_eq!(bodies[0]["taskType"], "RETRIEVAL_QUERY");
}

#[tokio::test]
async fn gemini_chat_sends_system_instruction_and_user_turn() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GEMINI_GENERATE_PATH))
        .respond_with(gemini_answer("Invoices are due monthly."))
        .mount(&server)
        .await;

    let config = mock_config(Some(&server), None, &[]);
    let chat = GeminiChat::new(&config.gemini, &config.http).expect("client should build");

    let answer = chat
        .generate(&[
            ChatTurn::system("Answer briefly."),
            ChatTurn::user("When are invoices due?"),
        ])
        .await
        .expect("generation should succeed");

    assert_eq!(answer, "Invoices are due monthly.");

    let bodies = request_bodies(&server, GEMINI_GENERATE_PATH).await;
    assert_eq!(
        bodies[0]["systemInstruction"]["parts"][0]["text"],
        "Answer briefly."
    );
    assert_eq!(bodies[0]["contents"][0]["role"], "user");
    assert_eq!(
        bodies[0]["contents"][0]["parts"][0]["text"],
        "When are invoices due?"
    );
}

#[tokio::test]
async fn gemini_blocked_prompt_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GEMINI_GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        })))
        .mount(&server)
        .await;

    let config = mock_config(Some(&server), None, &[]);
    let chat = GeminiChat::new(&config.gemini, &config.http).expect("client should build");

    let error = chat
        .generate(&[ChatTurn::user("Anything")])
        .await
        .expect_err("blocked prompt should fail");

    assert!(format!("{:#}", error).contains("SAFETY"), "{:#}", error);
}

#[tokio::test]
async fn openai_embeddings_follow_input_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("authorization", "Bearer test-openai-key"))
        .respond_with(OpenAiEmbeddingResponder)
        .expect(2)
        .mount(&server)
        .await;

    let config = mock_config(None, Some(&server), &[]);
    let embeddings = OpenAiEmbeddings::new(&config.openai, &config.http, 3)
        .expect("client should build");
    let inputs = texts(&[
        "alpha release notes",
        "beta testing schedule",
        "gamma deployment checklist",
        "delta rollback procedure",
    ]);

    let vectors = embeddings
        .embed_documents(&inputs)
        .await
        .expect("embedding should succeed");

    for (input, vector) in inputs.iter().zip(&vectors) {
        assert_eq!(vector, &embed_words(input));
    }

    let bodies = request_bodies(&server, "/embeddings").await;
    assert_eq!(bodies[0]["model"], "text-embedding-3-small");
    assert_eq!(bodies[0]["input"].as_array().map(Vec::len), Some(3));
    assert_eq!(bodies[1]["input"][0], "delta rollback procedure");
}

#[tokio::test]
async fn openai_chat_returns_message_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(openai_answer("The office closes at six."))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(None, Some(&server), &[]);
    let chat = OpenAiChat::new(&config.openai, &config.http).expect("client should build");

    let answer = chat
        .generate(&[ChatTurn::user("When does the office close?")])
        .await
        .expect("generation should succeed");

    assert_eq!(answer, "The office closes at six.");

    let bodies = request_bodies(&server, "/chat/completions").await;
    assert_eq!(bodies[0]["model"], "gpt-4o-mini");
    assert_eq!(bodies[0]["messages"][0]["role"], "user");
    assert_eq!(
        bodies[0]["messages"][0]["content"],
        "When does the office close?"
    );
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(openai_answer("Recovered"))
        .mount(&server)
        .await;

    let config = mock_config(None, Some(&server), &[]);
    let chat = OpenAiChat::new(&config.openai, &config.http)
        .expect("client should build")
        .with_http_client(fast_retry_client(3));

    let answer = chat
        .generate(&[ChatTurn::user("Are you there?")])
        .await
        .expect("third attempt should succeed");

    assert_eq!(answer, "Recovered");
    assert_eq!(request_bodies(&server, "/chat/completions").await.len(), 3);
}

#[tokio::test]
async fn rate_limits_exhaust_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GEMINI_EMBED_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    let config = mock_config(Some(&server), None, &[]);
    let embeddings = GeminiEmbeddings::new(&config.gemini, &config.http, 8)
        .expect("client should build")
        .with_http_client(fast_retry_client(2));

    let result = embeddings.embed_query("anything").await;

    assert!(result.is_err());
}

#[tokio::test]
async fn rejected_key_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let config = mock_config(None, Some(&server), &[]);
    let embeddings = OpenAiEmbeddings::new(&config.openai, &config.http, 8)
        .expect("client should build")
        .with_http_client(fast_retry_client(3));

    let error = embeddings
        .embed_documents(&texts(&["some text"]))
        .await
        .expect_err("401 should fail");

    let message = format!("{:#}", error);
    assert!(message.contains("Authentication failed"), "{}", message);
}
