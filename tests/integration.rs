use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use freight_exchange::api::rest::router;
use freight_exchange::config::Config;
use freight_exchange::engine::rewards::run_reward_engine;
use freight_exchange::models::deal::Deal;
use freight_exchange::state::AppState;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

struct User {
    id: Uuid,
    role: &'static str,
}

impl User {
    fn new(role: &'static str) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
        }
    }
}

fn setup() -> (axum::Router, mpsc::Receiver<Deal>) {
    let (state, rx) = AppState::new(Config::default());
    (router(Arc::new(state)), rx)
}

fn json_request(method: &str, uri: &str, user: &User, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", user.id.to_string())
        .header("x-user-role", user.role)
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, user: &User) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-user-id", user.id.to_string())
        .header("x-user-role", user.role)
        .body(Body::empty())
        .unwrap()
}

fn anonymous_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

fn order_body(desired_price: u64) -> Value {
    json!({
        "cargo_description": "20 pallets of tiles",
        "pickup_address": "Tashkent, Chilonzor 12",
        "delivery_address": "Samarkand, Registan 3",
        "weight_kg": 8500.0,
        "desired_price": desired_price
    })
}

/// Client order with one carrier response and a pending deal on it.
async fn order_with_deal(app: &axum::Router, client: &User, carrier: &User) -> (String, String, String) {
    let (status, order) = send(app, json_request("POST", "/orders", client, order_body(150_000))).await;
    assert_eq!(status, StatusCode::OK);
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, bid) = send(
        app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/responses"),
            carrier,
            json!({ "price": 150_000, "delivery_days": 2, "comment": "tented truck" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let bid_id = bid["id"].as_str().unwrap().to_string();

    let (status, deal) = send(
        app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/deals"),
            client,
            json!({ "response_id": bid_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deal["status"], "pending");
    let deal_id = deal["id"].as_str().unwrap().to_string();

    (order_id, bid_id, deal_id)
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _rx) = setup();
    let response = app.oneshot(anonymous_get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["orders"], 0);
    assert_eq!(body["deals"], 0);
    assert_eq!(body["tracking_sessions"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _rx) = setup();
    let response = app.oneshot(anonymous_get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("tracking_sessions_active"));
}

#[tokio::test]
async fn missing_identity_returns_401() {
    let (app, _rx) = setup();
    let request = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from(order_body(1000).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn carriers_cannot_create_orders() {
    let (app, _rx) = setup();
    let carrier = User::new("carrier");

    let (status, _) = send(&app, json_request("POST", "/orders", &carrier, order_body(1000))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_and_list_orders() {
    let (app, _rx) = setup();
    let client = User::new("client");

    let (status, order) = send(&app, json_request("POST", "/orders", &client, order_body(150_000))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "open");
    assert_eq!(order["client_id"], client.id.to_string());

    let (status, _) = send(&app, json_request("POST", "/orders", &client, order_body(0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, open) = send(&app, get_request("/orders?status=open", &client)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(open.as_array().unwrap().len(), 1);

    let (_, completed) = send(&app, get_request("/orders?status=completed", &client)).await;
    assert!(completed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn get_nonexistent_order_returns_404() {
    let (app, _rx) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(anonymous_get(&format!("/orders/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn accepted_counter_offer_updates_response_and_deal() {
    let (app, _rx) = setup();
    let client = User::new("client");
    let carrier = User::new("carrier");
    let (order_id, bid_id, deal_id) = order_with_deal(&app, &client, &carrier).await;

    let (status, proposal) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/negotiations"),
            &carrier,
            json!({ "response_id": bid_id, "price": 130_000, "message": "return load available" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(proposal["status"], "pending");
    let negotiation_id = proposal["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        json_request("POST", &format!("/negotiations/{negotiation_id}/accept"), &carrier, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, acceptance) = send(
        &app,
        json_request("POST", &format!("/negotiations/{negotiation_id}/accept"), &client, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acceptance["negotiation"]["status"], "accepted");
    assert_eq!(acceptance["bid"]["price"], 130_000);
    assert_eq!(acceptance["deals"][0]["agreed_price"], 130_000);

    let (_, responses) = send(&app, get_request(&format!("/orders/{order_id}/responses"), &client)).await;
    assert_eq!(responses[0]["price"], 130_000);

    let (_, deal) = send(&app, get_request(&format!("/deals/{deal_id}"), &carrier)).await;
    assert_eq!(deal["agreed_price"], 130_000);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/negotiations"),
            &carrier,
            json!({ "response_id": bid_id, "price": 120_000 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        json_request("POST", &format!("/negotiations/{negotiation_id}/reject"), &client, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn rejected_proposal_keeps_prices() {
    let (app, _rx) = setup();
    let client = User::new("client");
    let carrier = User::new("carrier");
    let (order_id, bid_id, deal_id) = order_with_deal(&app, &client, &carrier).await;

    let (_, proposal) = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{order_id}/negotiations"),
            &client,
            json!({ "response_id": bid_id, "price": 110_000 }),
        ),
    )
    .await;
    let negotiation_id = proposal["id"].as_str().unwrap().to_string();

    let (status, rejected) = send(
        &app,
        json_request("POST", &format!("/negotiations/{negotiation_id}/reject"), &carrier, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");

    let (_, deal) = send(&app, get_request(&format!("/deals/{deal_id}"), &client)).await;
    assert_eq!(deal["agreed_price"], 150_000);

    let (status, board) = send(
        &app,
        get_request(&format!("/orders/{order_id}/negotiations"), &carrier),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["negotiations"].as_array().unwrap().len(), 1);
    assert_eq!(board["active"]["status"], "rejected");
    assert_eq!(board["can_propose"], true);
}

#[tokio::test]
async fn delivered_deal_awards_points_to_both_parties() {
    let (state, rx) = AppState::new(Config::default());
    let shared = Arc::new(state);
    tokio::spawn(run_reward_engine(shared.clone(), rx));
    let app = router(shared.clone());

    let client = User::new("client");
    let carrier = User::new("carrier");
    let (order_id, _bid_id, deal_id) = order_with_deal(&app, &client, &carrier).await;

    let (status, _) = send(
        &app,
        json_request("PATCH", &format!("/deals/{deal_id}/status"), &client, json!({ "status": "in_transit" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for next in ["accepted", "in_transit", "delivered"] {
        let (status, deal) = send(
            &app,
            json_request("PATCH", &format!("/deals/{deal_id}/status"), &carrier, json!({ "status": next })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deal["status"], next);
    }

    let (_, order) = send(&app, get_request(&format!("/orders/{order_id}"), &client)).await;
    assert_eq!(order["status"], "completed");

    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    let (_, client_account) = send(&app, get_request("/loyalty/me", &client)).await;
    assert_eq!(client_account["balance"], 150);
    let (_, carrier_account) = send(&app, get_request("/loyalty/me", &carrier)).await;
    assert_eq!(carrier_account["balance"], 150);

    let (_, history) = send(&app, get_request("/loyalty/me/transactions", &client)).await;
    assert_eq!(history[0]["reason"], "deal_completed");
    assert_eq!(history[0]["reference_id"], deal_id);

    let (status, rating) = send(
        &app,
        json_request("POST", &format!("/deals/{deal_id}/ratings"), &client, json!({ "score": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rating["ratee_id"], carrier.id.to_string());

    let (_, summary) = send(
        &app,
        anonymous_get(&format!("/users/{}/ratings", carrier.id)),
    )
    .await;
    assert_eq!(summary["count"], 1);
    assert_eq!(summary["average"], 5.0);
}

#[tokio::test]
async fn redeeming_without_enough_points_returns_422() {
    let (app, _rx) = setup();
    let admin = User::new("admin");
    let client = User::new("client");

    let (status, reward) = send(
        &app,
        json_request(
            "POST",
            "/loyalty/rewards",
            &admin,
            json!({ "name": "Free insurance", "description": "Cargo insurance for one trip", "points_cost": 500 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reward_id = reward["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/loyalty/rewards/{reward_id}/redeem"), &client, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().is_some());

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/loyalty/grants/{}", client.id),
            &admin,
            json!({ "amount": 600, "reason": "welcome bonus" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        json_request("POST", &format!("/loyalty/rewards/{reward_id}/redeem"), &client, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, account) = send(&app, get_request("/loyalty/me", &client)).await;
    assert_eq!(account["balance"], 100);
}

#[tokio::test]
async fn kyc_submission_fails_closed_on_chatty_reply() {
    let (app, _rx) = setup();
    let carrier = User::new("carrier");
    let admin = User::new("admin");

    let (status, record) = send(
        &app,
        json_request(
            "POST",
            "/kyc/submissions",
            &carrier,
            json!({
                "document_kind": "driver_license",
                "face_match_reply": "{\"is_match\": true, \"confidence\": 0.91}",
                "liveness_reply": "Looks fine to me!"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "manual_review");

    let (status, reviewed) = send(
        &app,
        json_request(
            "POST",
            &format!("/kyc/reviews/{}", carrier.id),
            &admin,
            json!({ "approve": true, "note": "checked by hand" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["status"], "verified");

    let (_, mine) = send(&app, get_request("/kyc/me", &carrier)).await;
    assert_eq!(mine["reviewed_by"], admin.id.to_string());
}
