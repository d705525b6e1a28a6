use axum::http::StatusCode;
use serde_json::json;

mod common;

use common::{create_test_app, ADDITION_PROBLEM, MULTIPLICATION_PROBLEM};

#[tokio::test]
async fn test_correct_first_answer_solves_and_offers_mastery_check() {
    let app = create_test_app();
    app.model.push("correct_final", "none", "Great job, that's right!");
    let attempt_id = app.start("session-a", ADDITION_PROBLEM).await;

    let (status, outcome) = app.answer(&attempt_id, "12").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["phase"]["state"], "solved");
    assert_eq!(outcome["terminal"], "solved");
    assert_eq!(outcome["final_status"], "mastered");
    assert_eq!(outcome["hint_count"], 0);
    assert_eq!(outcome["tutor_turn"]["response_type"], "correct_final");
    assert!(outcome["tutor_turn"].get("badge").is_none());

    let mastery = &outcome["mastery_check"];
    assert!(mastery["attempt_id"].is_string());
    assert_eq!(mastery["problem"]["chapter"], "addition");
    assert!(mastery["problem"].get("expected_answer").is_none());
}

#[tokio::test]
async fn test_three_hints_open_the_solution_gate() {
    let app = create_test_app();
    for _ in 0..3 {
        app.model
            .push("needs_hint", "hint_given", "Try counting on from 8.");
    }
    app.model
        .push("arithmetic_error", "corrective_feedback", "Close! Check your counting.");
    let attempt_id = app.start("session-b", ADDITION_PROBLEM).await;

    for expected in 1..=3u64 {
        let (status, outcome) = app.answer(&attempt_id, "I don't know").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["hint_count"], expected);
        assert_eq!(outcome["hints_remaining"], 3 - expected);
        assert_eq!(outcome["tutor_turn"]["badge"], "hint_given");
        assert_eq!(outcome["show_solution_button"], expected == 3);
    }

    let (status, outcome) = app.answer(&attempt_id, "11").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["hint_count"], 3);
    assert_eq!(outcome["show_solution_button"], true);
    assert_eq!(outcome["phase"]["last_response"], "arithmetic_error");
}

#[tokio::test]
async fn test_needs_hint_past_ceiling_carries_no_hint_badge() {
    let app = create_test_app();
    for _ in 0..4 {
        app.model
            .push("needs_hint", "hint_given", "Think about groups of ten.");
    }
    let attempt_id = app.start("session-b2", ADDITION_PROBLEM).await;

    for _ in 0..3 {
        app.answer(&attempt_id, "stuck").await;
    }
    let (_, outcome) = app.answer(&attempt_id, "still stuck").await;

    assert_eq!(outcome["hint_count"], 3);
    assert!(outcome["tutor_turn"].get("badge").is_none());
    assert_eq!(outcome["show_solution_button"], true);
}

#[tokio::test]
async fn test_solution_reveal_finalizes_as_struggling() {
    let app = create_test_app();
    for _ in 0..3 {
        app.model.push("needs_hint", "hint_given", "Start with 8.");
    }
    let attempt_id = app.start("session-d", ADDITION_PROBLEM).await;
    for _ in 0..3 {
        app.answer(&attempt_id, "no idea").await;
    }

    let (status, outcome) = app
        .post_empty(&format!("/api/v1/attempts/{attempt_id}/solution"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["terminal"], "solution_revealed");
    assert_eq!(outcome["final_status"], "struggling");
    assert!(outcome["mastery_check"].is_null());
    assert_eq!(outcome["show_solution_button"], false);
    assert!(outcome["tutor_turn"]["text"]
        .as_str()
        .unwrap()
        .contains("step by step"));

    let (status, _) = app.answer(&attempt_id, "12").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_solution_is_refused_before_the_ceiling() {
    let app = create_test_app();
    app.model.push("needs_hint", "hint_given", "Start with 8.");
    let attempt_id = app.start("session-e", ADDITION_PROBLEM).await;
    app.answer(&attempt_id, "hmm").await;

    let (status, body) = app
        .post_empty(&format!("/api/v1/attempts/{attempt_id}/solution"))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);

    let (_, view) = app.get(&format!("/api/v1/attempts/{attempt_id}")).await;
    assert_eq!(view["hint_count"], 1);
    assert_eq!(view["phase"]["state"], "evaluated");
}

#[tokio::test]
async fn test_blank_answer_is_rejected_without_a_turn() {
    let app = create_test_app();
    let attempt_id = app.start("session-f", ADDITION_PROBLEM).await;

    let (status, _) = app.answer(&attempt_id, "   ").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, view) = app.get(&format!("/api/v1/attempts/{attempt_id}")).await;
    assert_eq!(view["conversation"].as_array().unwrap().len(), 0);
    assert_eq!(view["phase"]["state"], "presented");
}

#[tokio::test]
async fn test_malformed_evaluation_becomes_a_hint_turn() {
    let app = create_test_app();
    app.model.push_raw(Default::default());
    let attempt_id = app.start("session-g", ADDITION_PROBLEM).await;

    let (status, outcome) = app.answer(&attempt_id, "twelve-ish").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["tutor_turn"]["response_type"], "needs_hint");
    assert_eq!(outcome["tutor_turn"]["badge"], "hint_given");
    assert_eq!(outcome["hint_count"], 1);
    assert!(outcome["tutor_turn"]["text"]
        .as_str()
        .unwrap()
        .contains("rephrase"));
}

#[tokio::test]
async fn test_leaked_answer_is_replaced_by_fallback() {
    let app = create_test_app();
    app.model
        .push("partial_progress", "partial_progress", "Yes, 8 + 4 gives 12.");
    let attempt_id = app.start("session-h", ADDITION_PROBLEM).await;

    let (_, outcome) = app.answer(&attempt_id, "8 + 4").await;

    let text = outcome["tutor_turn"]["text"].as_str().unwrap();
    assert!(!text.contains("12"));
    assert_eq!(outcome["tutor_turn"]["response_type"], "needs_hint");
}

#[tokio::test]
async fn test_history_excludes_new_answer_and_count_is_server_owned() {
    let app = create_test_app();
    app.model.push("needs_hint", "hint_given", "Count on from 8.");
    app.model
        .push("partial_progress", "partial_progress", "Good, keep going.");
    let attempt_id = app.start("session-i", ADDITION_PROBLEM).await;

    app.answer(&attempt_id, "first").await;
    app.answer(&attempt_id, "second").await;

    let requests = app.model.evaluation_requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].history.is_empty());
    assert_eq!(requests[0].hint_count, 0);
    assert_eq!(requests[1].history.len(), 2);
    assert_eq!(requests[1].learner_answer, "second");
    assert_eq!(requests[1].hint_count, 1);
}

#[tokio::test]
async fn test_unknown_problem_and_attempt_are_not_found() {
    let app = create_test_app();

    let (status, _) = app
        .post(
            "/api/v1/attempts",
            json!({ "session_id": "s", "problem_id": "missing" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .get(&format!("/api/v1/attempts/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_start_request_is_validated() {
    let app = create_test_app();

    let (status, _) = app
        .post(
            "/api/v1/attempts",
            json!({ "session_id": "s", "problem_id": ADDITION_PROBLEM, "learner_age": 40 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .post("/api/v1/attempts", json!({ "session_id": "s" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_switching_problem_abandons_open_attempt() {
    let app = create_test_app();
    app.model
        .push("partial_progress", "partial_progress", "Nice start.");
    let first = app.start("session-j", ADDITION_PROBLEM).await;
    app.answer(&first, "8 plus").await;

    let second = app.start("session-j", MULTIPLICATION_PROBLEM).await;

    let (status, attempts) = app.get("/api/v1/sessions/session-j/attempts").await;
    assert_eq!(status, StatusCode::OK);
    let attempts = attempts.as_array().unwrap();
    assert_eq!(attempts.len(), 2);

    let first_record = attempts.iter().find(|a| a["_id"] == first.as_str()).unwrap();
    assert_eq!(first_record["final_status"], "incomplete");
    let second_record = attempts.iter().find(|a| a["_id"] == second.as_str()).unwrap();
    assert!(second_record["final_status"].is_null());
}

#[tokio::test]
async fn test_abandon_marks_attempt_incomplete() {
    let app = create_test_app();
    let attempt_id = app.start("session-k", ADDITION_PROBLEM).await;

    let (status, outcome) = app
        .post_empty(&format!("/api/v1/attempts/{attempt_id}/abandon"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["terminal"], "abandoned");
    assert_eq!(outcome["final_status"], "incomplete");

    let (status, _) = app
        .post_empty(&format!("/api/v1/attempts/{attempt_id}/abandon"))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_turns_are_persisted_in_order() {
    let app = create_test_app();
    app.model.push("needs_hint", "hint_given", "Count on from 8.");
    app.model.push("correct_final", "none", "Well done!");
    let attempt_id = app.start("session-l", ADDITION_PROBLEM).await;
    app.answer(&attempt_id, "stuck").await;
    app.answer(&attempt_id, "12").await;

    let (status, turns) = app
        .get(&format!("/api/v1/attempts/{attempt_id}/turns"))
        .await;

    assert_eq!(status, StatusCode::OK);
    let turns = turns.as_array().unwrap();
    let sequences: Vec<u64> = turns.iter().map(|t| t["sequence"].as_u64().unwrap()).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
    assert_eq!(turns[0]["role"], "learner");
    assert_eq!(turns[1]["badge"], "hint_given");
    assert_eq!(turns[3]["response_type"], "correct_final");
}
