// tests/attempt_tests.rs

use backend::{config::Config, routes, state::AppState};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

async fn spawn_app() -> (String, PgPool) {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "attempt_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };
    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

async fn seed_question(
    pool: &PgPool,
    subject: &str,
    chapter: &str,
    correct: serde_json::Value,
) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO questions (subject, chapter, content, options, correct_answer, difficulty, level)
        VALUES ($1, $2, 'Seeded question', '["A","B","C","D"]', $3, 'medium', 'NEET')
        RETURNING id
        "#,
    )
    .bind(subject)
    .bind(chapter)
    .bind(correct)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn seed_test(pool: &PgPool, title: &str, section_id: Option<i64>, ids: &[i64]) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO tests (title, level, section_id, question_ids)
        VALUES ($1, 'NEET', $2, $3)
        RETURNING id
        "#,
    )
    .bind(title)
    .bind(section_id)
    .bind(serde_json::json!(ids))
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn register_and_login(address: &str, client: &reqwest::Client) -> String {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let password = "password123";

    client
        .post(&format!("{}/api/auth/register", address))
        .json(&serde_json::json!({"username": username, "password": password}))
        .send()
        .await
        .expect("Register failed");

    let login: serde_json::Value = client
        .post(&format!("{}/api/auth/login", address))
        .json(&serde_json::json!({"username": username, "password": password}))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .unwrap();

    login["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn full_attempt_flow_with_scoring_and_double_submit() {
    // Arrange
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let q1 = seed_question(&pool, "Biology", "Cells", serde_json::json!("A")).await;
    let q2 = seed_question(&pool, "Biology", "Genetics", serde_json::json!("B")).await;
    let q3 = seed_question(&pool, "Chemistry", "Bonding", serde_json::json!(["A", "C"])).await;
    let q4 = seed_question(&pool, "Chemistry", "Bonding", serde_json::json!(["B", "D"])).await;
    let test_id = seed_test(&pool, "Mock Test 1", None, &[q1, q2, q3, q4]).await;

    let token = register_and_login(&address, &client).await;

    // Act: start
    let start: serde_json::Value = client
        .post(&format!("{}/api/attempts/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"test_id": test_id}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let attempt_id = start["attempt_id"].as_i64().unwrap();
    assert_eq!(start["total_questions"], 4);

    // Act: submit. q1 correct, q2 wrong, q3 correct (exact order),
    // q4 wrong (permuted array must not count).
    let submit_body = serde_json::json!({
        "attempt_id": attempt_id,
        "responses": [
            {"question_id": q1, "selected_answer": "A"},
            {"question_id": q2, "selected_answer": "C"},
            {"question_id": q3, "selected_answer": ["A", "C"]},
            {"question_id": q4, "selected_answer": ["D", "B"]},
        ],
        "time_taken_sec": 321
    });

    let submit_resp = client
        .post(&format!("{}/api/attempts/submit", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&submit_body)
        .send()
        .await
        .unwrap();
    assert_eq!(submit_resp.status().as_u16(), 200);

    let result: serde_json::Value = submit_resp.json().await.unwrap();
    assert_eq!(result["score"], 2);
    assert_eq!(result["total_questions"], 4);
    assert_eq!(result["score_percentage"], 50.0);
    assert_eq!(result["subject_scores"]["Biology"]["correct"], 1);
    assert_eq!(result["subject_scores"]["Biology"]["total"], 2);
    assert_eq!(result["subject_scores"]["Biology"]["percentage"], 50.0);
    assert_eq!(result["chapter_scores"]["Chemistry"]["Bonding"]["correct"], 1);
    assert_eq!(result["chapter_scores"]["Chemistry"]["Bonding"]["total"], 2);

    // Act: second submit of the same attempt must 404 and change nothing.
    let second = client
        .post(&format!("{}/api/attempts/submit", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "attempt_id": attempt_id,
            "responses": [{"question_id": q1, "selected_answer": "B"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 404);

    let (stored_score, stored_status): (i64, String) =
        sqlx::query_as("SELECT score, status FROM attempts WHERE id = $1")
            .bind(attempt_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(stored_score, 2);
    assert_eq!(stored_status, "completed");
}

#[tokio::test]
async fn empty_responses_are_rejected() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let q1 = seed_question(&pool, "Physics", "Optics", serde_json::json!("A")).await;
    let test_id = seed_test(&pool, "Physics Mini", None, &[q1]).await;
    let token = register_and_login(&address, &client).await;

    let start: serde_json::Value = client
        .post(&format!("{}/api/attempts/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"test_id": test_id}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = client
        .post(&format!("{}/api/attempts/submit", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "attempt_id": start["attempt_id"],
            "responses": []
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn section_restricted_test_is_invisible_to_outsiders() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let section_name = format!("s_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let section_id: i64 =
        sqlx::query_scalar("INSERT INTO sections (name) VALUES ($1) RETURNING id")
            .bind(&section_name)
            .fetch_one(&pool)
            .await
            .unwrap();

    let q1 = seed_question(&pool, "Math", "Algebra", serde_json::json!("A")).await;
    let test_id = seed_test(&pool, "Section Only", Some(section_id), &[q1]).await;

    // User not in the section
    let token = register_and_login(&address, &client).await;

    let response = client
        .post(&format!("{}/api/attempts/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"test_id": test_id}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn analytics_sums_counts_across_attempts() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // One 1-question test and one 9-question test, all in the same subject.
    let small_q = seed_question(&pool, "Math", "Algebra", serde_json::json!("A")).await;
    let small_test = seed_test(&pool, "Small", None, &[small_q]).await;

    let mut big_ids = Vec::new();
    for _ in 0..9 {
        big_ids.push(seed_question(&pool, "Math", "Algebra", serde_json::json!("A")).await);
    }
    let big_test = seed_test(&pool, "Big", None, &big_ids).await;

    let token = register_and_login(&address, &client).await;

    // Attempt 1: 1/1 correct (100%).
    let start: serde_json::Value = client
        .post(&format!("{}/api/attempts/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"test_id": small_test}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    client
        .post(&format!("{}/api/attempts/submit", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "attempt_id": start["attempt_id"],
            "responses": [{"question_id": small_q, "selected_answer": "A"}]
        }))
        .send()
        .await
        .unwrap();

    // Attempt 2: 0/9 correct (0%).
    let start: serde_json::Value = client
        .post(&format!("{}/api/attempts/start", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"test_id": big_test}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let responses: Vec<serde_json::Value> = big_ids
        .iter()
        .map(|id| serde_json::json!({"question_id": id, "selected_answer": "B"}))
        .collect();
    client
        .post(&format!("{}/api/attempts/submit", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "attempt_id": start["attempt_id"],
            "responses": responses
        }))
        .send()
        .await
        .unwrap();

    // Act
    let summary: serde_json::Value = client
        .get(&format!("{}/api/attempts/me/analytics", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Assert: count-based rollup (1/10 = 10%), not an average of percentages.
    assert_eq!(summary["tests_taken"], 2);
    assert_eq!(summary["average_score"], 50.0);
    assert_eq!(summary["subject_performance"]["Math"]["correct"], 1);
    assert_eq!(summary["subject_performance"]["Math"]["total"], 10);
    assert_eq!(summary["subject_performance"]["Math"]["percentage"], 10.0);

    // Progression is oldest -> newest.
    let progression = summary["score_progression"].as_array().unwrap();
    assert_eq!(progression.len(), 2);
    assert_eq!(progression[0]["test_name"], "Small");
    assert_eq!(progression[0]["score"], 100.0);
    assert_eq!(progression[1]["test_name"], "Big");
    assert_eq!(progression[1]["score"], 0.0);

    // History listing is newest first.
    let history: serde_json::Value = client
        .get(&format!("{}/api/attempts/me", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["test_title"], "Big");
    assert_eq!(history[1]["test_title"], "Small");
}
