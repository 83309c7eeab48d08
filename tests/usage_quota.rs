//! Monthly quota and AI endpoints against a real database and a mocked
//! completion server. Run with `cargo test -- --ignored`.

use actix_web::test;
use chrono::{Duration, Local, Utc};
use prompt_manager_server::db::NewPrompt;
use prompt_manager_server::proxy::TokenUsage;
use prompt_manager_server::usage::MonthWindow;
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[macro_use]
mod common;

async fn mock_model(content: &str, prompt_tokens: i64, completion_tokens: i64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::chat_reply(content, prompt_tokens, completion_tokens)),
        )
        .mount(&server)
        .await;
    server
}

#[actix_web::test]
#[ignore = "requires DATABASE_URL"]
async fn test_free_user_crosses_limit_then_is_blocked() {
    let server = mock_model("Hello there", 200, 100).await;
    let state = common::db_state(&server.uri()).await;
    let app = test_app!(state);

    let email = common::unique_email("quota");
    let token = register_user!(app, email.clone());
    let user = state.db.get_user_by_email(&email).await.unwrap().unwrap();

    // 49,900 tokens already spent this month.
    state
        .usage
        .record(user.id, None, TokenUsage::new(49_000, 900), &Local::now())
        .await
        .unwrap();

    let resp = test::TestRequest::post()
        .uri("/api/ai/run-prompt")
        .insert_header(bearer!(token))
        .set_json(json!({ "promptContent": "Say hello" }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["response"], "Hello there");
    assert_eq!(body["tokens_used"], 300);
    assert_eq!(body["tokens_used_this_month"], 50_200);
    assert_eq!(body["usage_remaining"], 0);
    assert_eq!(body["monthly_limit"], 50_000);
    assert_eq!(body["usageRecord"]["total_tokens"], 300);

    let stored = state.db.get_user_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(stored.usage_tokens, 50_200);

    for (uri, payload) in [
        ("/api/ai/run-prompt", json!({ "promptContent": "Again" })),
        ("/api/ai/generate-prompt", json!({ "task": "Write an email" })),
        ("/api/ai/optimize-prompt", json!({ "promptContent": "Improve me" })),
    ] {
        let resp = test::TestRequest::post()
            .uri(uri)
            .insert_header(bearer!(token))
            .set_json(payload)
            .send_request(&app)
            .await;
        assert_eq!(resp.status(), 429, "{}", uri);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["tokensUsed"], 50_200);
        assert_eq!(body["error"]["limit"], 50_000);
    }

    let check: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/usage/limit-check")
            .insert_header(bearer!(token))
            .to_request(),
    )
    .await;
    assert_eq!(check["exceeded"], true);
    assert_eq!(check["message"], "Free usage limit reached");
}

#[actix_web::test]
#[ignore = "requires DATABASE_URL"]
async fn test_paid_user_is_never_blocked() {
    let server = mock_model("Done", 10, 5).await;
    let state = common::db_state(&server.uri()).await;
    let app = test_app!(state);

    let email = common::unique_email("paid");
    let token = register_user!(app, email.clone());
    let user = state.db.get_user_by_email(&email).await.unwrap().unwrap();
    state.db.set_user_paid(user.id, true).await.unwrap();
    state
        .usage
        .record(user.id, None, TokenUsage::new(90_000, 0), &Local::now())
        .await
        .unwrap();

    let resp = test::TestRequest::post()
        .uri("/api/ai/run-prompt")
        .insert_header(bearer!(token))
        .set_json(json!({ "promptContent": "Keep going" }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);

    let current: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/usage/current")
            .insert_header(bearer!(token))
            .to_request(),
    )
    .await;
    assert_eq!(current["usage"]["tokens_used_this_month"], 90_015);
    assert_eq!(current["usage"]["monthly_limit"], "unlimited");
    assert_eq!(current["usage"]["limit_exceeded"], false);
    assert_eq!(current["usage"]["isPaid"], true);
}

#[test_log::test(tokio::test)]
#[ignore = "requires DATABASE_URL"]
async fn test_usage_outside_the_month_is_excluded() {
    let state = common::db_state("http://127.0.0.1:9").await;
    let email = common::unique_email("window");
    let (user, _) = state
        .auth_service
        .register(&email, common::PASSWORD, None)
        .await
        .unwrap();

    let now = Local::now();
    let window = MonthWindow::containing(&now);
    let last_month = window.start - Duration::seconds(1);
    let next_month = window.end + Duration::seconds(1);

    assert_ok!(state.usage.record(user.id, None, TokenUsage::new(700, 0), &last_month).await);
    assert_ok!(state.usage.record(user.id, None, TokenUsage::new(900, 0), &next_month).await);
    assert_ok!(state.usage.record(user.id, None, TokenUsage::new(120, 30), &now).await);
    assert_ok!(state.usage.record(user.id, None, TokenUsage::new(40, 10), &window.start).await);
    assert_ok!(state.usage.record(user.id, None, TokenUsage::new(1, 1), &window.end).await);

    let monthly = state.usage.monthly_usage(&user, &now).await.unwrap();
    assert_eq!(monthly.totals.total_tokens, 150 + 50 + 2);
    assert_eq!(monthly.totals.input_tokens, 161);
    assert_eq!(monthly.totals.request_count, 3);
    assert!(!monthly.status.exceeded);

    let totals = state
        .db
        .sum_usage_between(user.id, window.start, Utc::now() + Duration::days(62))
        .await
        .unwrap();
    assert_eq!(totals.total_tokens, 202 + 900);
}

#[test_log::test(tokio::test)]
#[ignore = "requires DATABASE_URL"]
async fn test_check_fails_at_the_limit() {
    let state = common::db_state("http://127.0.0.1:9").await;
    let (user, _) = state
        .auth_service
        .register(&common::unique_email("limit"), common::PASSWORD, None)
        .await
        .unwrap();

    let now = Local::now();
    assert_ok!(state.usage.check(&user, &now).await);
    assert_ok!(state.usage.record(user.id, None, TokenUsage::new(50_000, 0), &now).await);
    assert_err!(state.usage.check(&user, &now).await);
}

#[actix_web::test]
#[ignore = "requires DATABASE_URL"]
async fn test_generate_stores_ai_prompt() {
    let reply = r#"{"title":"Cold outreach email","prompt":"You are an email marketer. Write to {insert_company_name}.","tags":["email","sales"]}"#;
    let server = mock_model(reply, 250, 80).await;
    let state = common::db_state(&server.uri()).await;
    let app = test_app!(state);
    let token = register_user!(app, common::unique_email("generate"));

    let resp = test::TestRequest::post()
        .uri("/api/ai/generate-prompt")
        .insert_header(bearer!(token))
        .set_json(json!({}))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 400);

    let resp = test::TestRequest::post()
        .uri("/api/ai/generate-prompt")
        .insert_header(bearer!(token))
        .set_json(json!({ "task": "cold outreach email", "context": "B2B" }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["prompt"]["title"], "Cold outreach email");
    assert_eq!(body["prompt"]["source"], "AI");
    assert_eq!(body["prompt"]["summary"], "Generated from task: cold outreach email");
    assert_eq!(body["prompt"]["tags"], json!(["email", "sales"]));
    assert_eq!(body["tokens_used"], 330);
    assert_eq!(body["usage_remaining"], 50_000 - 330);
}

#[actix_web::test]
#[ignore = "requires DATABASE_URL"]
async fn test_optimize_saves_sequential_versions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Optimize this prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::chat_reply(
            "OPTIMIZED PROMPT:\nYou are a senior editor. Tighten {draft}.\n\nKEY IMPROVEMENTS:\n- Added an expert role\n- Added a placeholder",
            100,
            40,
        )))
        .mount(&server)
        .await;

    let state = common::db_state(&server.uri()).await;
    let app = test_app!(state);
    let token = register_user!(app, common::unique_email("optimize"));
    let stranger = register_user!(app, common::unique_email("stranger"));

    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/prompts")
            .insert_header(bearer!(token))
            .set_json(json!({ "title": "Editor", "content": "Fix my draft" }))
            .to_request(),
    )
    .await;
    let id = created["prompt"]["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let resp = test::TestRequest::post()
            .uri("/api/ai/optimize-prompt")
            .insert_header(bearer!(token))
            .set_json(json!({ "promptId": id }))
            .send_request(&app)
            .await;
        assert_eq!(resp.status(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["improved_prompt"], "You are a senior editor. Tighten {draft}.");
        assert_eq!(body["improvement_notes"], json!(["Added an expert role", "Added a placeholder"]));
    }

    let versions: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/prompts/{}/versions", id))
            .insert_header(bearer!(token))
            .to_request(),
    )
    .await;
    let numbers: Vec<i64> = versions["versions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["version"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![2, 1]);

    let listed: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/prompts")
            .insert_header(bearer!(token))
            .to_request(),
    )
    .await;
    assert_eq!(listed["prompts"][0]["totalTokensUsed"], 280);

    let resp = test::TestRequest::post()
        .uri("/api/ai/optimize-prompt")
        .insert_header(bearer!(stranger))
        .set_json(json!({ "promptId": id }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[ignore = "requires DATABASE_URL"]
async fn test_run_prompt_rejects_missing_and_foreign_prompts() {
    let server = mock_model("Ran", 5, 5).await;
    let state = common::db_state(&server.uri()).await;
    let app = test_app!(state);
    let token = register_user!(app, common::unique_email("runner"));
    let stranger = register_user!(app, common::unique_email("run-stranger"));

    let resp = test::TestRequest::post()
        .uri("/api/ai/run-prompt")
        .insert_header(bearer!(token))
        .set_json(json!({}))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["message"], "Either promptId or promptContent is required");

    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/prompts")
            .insert_header(bearer!(token))
            .set_json(json!({ "title": "Private", "content": "Only mine" }))
            .to_request(),
    )
    .await;
    let id = created["prompt"]["id"].as_str().unwrap().to_string();

    for payload in [json!({ "promptId": id }), json!({ "promptId": id, "promptContent": "Sneaky" })] {
        let resp = test::TestRequest::post()
            .uri("/api/ai/run-prompt")
            .insert_header(bearer!(stranger))
            .set_json(payload)
            .send_request(&app)
            .await;
        assert_eq!(resp.status(), 404);
    }

    let resp = test::TestRequest::post()
        .uri("/api/ai/run-prompt")
        .insert_header(bearer!(token))
        .set_json(json!({ "promptId": id }))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);
}

#[test_log::test(tokio::test)]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_versions_get_distinct_numbers() {
    let state = common::db_state("http://127.0.0.1:9").await;
    let (user, _) = state
        .auth_service
        .register(&common::unique_email("versions"), common::PASSWORD, None)
        .await
        .unwrap();
    let prompt = state
        .db
        .create_prompt(
            user.id,
            &NewPrompt::authored("Draft".into(), "v0".into(), None, vec![]),
        )
        .await
        .unwrap();

    let snapshots = (0..6).map(|i| {
        let db = state.db.clone();
        async move { db.create_prompt_version(prompt.id, &format!("v{}", i + 1)).await }
    });
    for result in futures::future::join_all(snapshots).await {
        assert_ok!(result);
    }

    let mut numbers: Vec<i32> = state
        .db
        .list_prompt_versions(prompt.id)
        .await
        .unwrap()
        .iter()
        .map(|v| v.version)
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=6).collect::<Vec<i32>>());
}
