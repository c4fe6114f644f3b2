//! Black-box tests against the real router bound to an ephemeral port.
//!
//! Projections are applied synchronously on the command path, so reads issued
//! right after a write already see the new state; no polling needed.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Value, json};

use shopforge_core::UserId;

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, ephemeral port.
        let app = shopforge_api::app::build_app(SECRET.to_string());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}/api");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn root_url(&self) -> String {
        self.base_url.trim_end_matches("/api").to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Serialize)]
struct Claims {
    sub: String,
    roles: Vec<String>,
    iat: i64,
    exp: i64,
}

fn mint_jwt(user: UserId, roles: &[&str]) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        iat: now,
        exp: now + 600,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn shipping(postal_code: &str) -> Value {
    json!({
        "full_name": "Asha Kulkarni",
        "line1": "14 Hill Road",
        "line2": null,
        "city": "Pune",
        "state": "MH",
        "postal_code": postal_code,
        "phone": "9999911111",
    })
}

fn payment() -> Value {
    json!({
        "method": "cod",
        "is_paid": false,
        "paid_at": null,
        "transaction_ref": null,
    })
}

/// Seed the allow-list and one product with stock 6.
async fn seed(client: &reqwest::Client, base: &str, admin: &str) {
    let res = client
        .post(format!("{base}/pincodes"))
        .bearer_auth(admin)
        .json(&json!({"code": "411001", "delivery_time": 2, "unit": "days"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .post(format!("{base}/products"))
        .bearer_auth(admin)
        .json(&json!({
            "catalog_number": 9001,
            "name": "Trail Jacket",
            "image": "jacket.png",
            "unit_price": 4999,
            "stock": 6,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

async fn place_order(client: &reqwest::Client, base: &str, token: &str, qty: u32) -> Value {
    let res = client
        .post(format!("{base}/orders"))
        .bearer_auth(token)
        .json(&json!({
            "customer_name": "Asha Kulkarni",
            "items": [{"catalog_number": 9001, "qty": qty}],
            "shipping": shipping("411001"),
            "payment": payment(),
            "shipping_fee": 49,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/health", server.root_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn serviceability_check_is_public() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(UserId::new(), &["admin"]);
    seed(&client, &server.base_url, &admin).await;

    let res = client
        .get(format!("{}/pincodes/check/411001", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["serviceable"], json!(true));
    assert_eq!(body["delivery_time"], json!(2));
    assert_eq!(body["unit"], json!("days"));

    let res = client
        .get(format!("{}/pincodes/check/999999", server.base_url))
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["serviceable"], json!(false));
}

#[tokio::test]
async fn protected_routes_reject_missing_or_garbage_tokens() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/orders/myorders", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/orders/myorders", server.base_url))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customer_cannot_reach_admin_surface() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let customer = mint_jwt(UserId::new(), &["customer"]);

    let res = client
        .get(format!("{}/notifications", server.base_url))
        .bearer_auth(&customer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn placing_an_order_decrements_stock_and_notifies() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(UserId::new(), &["admin"]);
    let customer = mint_jwt(UserId::new(), &["customer"]);
    seed(&client, &server.base_url, &admin).await;

    let placed = place_order(&client, &server.base_url, &customer, 2).await;
    assert_eq!(placed["reports"][0]["outcome"], json!("applied"));
    assert_eq!(placed["reports"][0]["qty"], json!(2));
    assert_eq!(placed["reports"][0]["line_no"], json!(1));

    let res = client
        .get(format!("{}/products/9001", server.base_url))
        .send()
        .await
        .unwrap();
    let product: Value = res.json().await.unwrap();
    assert_eq!(product["stock"], json!(4));

    let res = client
        .get(format!("{}/orders/myorders", server.base_url))
        .bearer_auth(&customer)
        .send()
        .await
        .unwrap();
    let orders: Value = res.json().await.unwrap();
    assert_eq!(orders["items"].as_array().unwrap().len(), 1);
    assert_eq!(orders["items"][0]["grand_total"], json!(2 * 4999 + 49));

    let res = client
        .get(format!("{}/notifications", server.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let notifications: Value = res.json().await.unwrap();
    assert!(!notifications["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unserviceable_postal_code_rejects_the_order() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(UserId::new(), &["admin"]);
    let customer = mint_jwt(UserId::new(), &["customer"]);
    seed(&client, &server.base_url, &admin).await;

    let res = client
        .post(format!("{}/orders", server.base_url))
        .bearer_auth(&customer)
        .json(&json!({
            "customer_name": "Asha Kulkarni",
            "items": [{"catalog_number": 9001, "qty": 1}],
            "shipping": shipping("999999"),
            "payment": payment(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert!(body["message"].is_string());

    // Nothing was written: stock untouched, no order visible.
    let res = client
        .get(format!("{}/products/9001", server.base_url))
        .send()
        .await
        .unwrap();
    let product: Value = res.json().await.unwrap();
    assert_eq!(product["stock"], json!(6));
}

#[tokio::test]
async fn order_detail_enforces_ownership() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(UserId::new(), &["admin"]);
    let owner = mint_jwt(UserId::new(), &["customer"]);
    let stranger = mint_jwt(UserId::new(), &["customer"]);
    seed(&client, &server.base_url, &admin).await;

    let placed = place_order(&client, &server.base_url, &owner, 1).await;
    let order_id = placed["order_id"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/orders/{order_id}", server.base_url))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/orders/{order_id}", server.base_url))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(format!("{}/orders/{order_id}", server.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_statuses_are_rejected() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(UserId::new(), &["admin"]);
    let customer = mint_jwt(UserId::new(), &["customer"]);
    seed(&client, &server.base_url, &admin).await;

    let placed = place_order(&client, &server.base_url, &customer, 1).await;
    let order_id = placed["order_id"].as_str().unwrap().to_string();

    let res = client
        .put(format!("{}/orders/{order_id}/status", server.base_url))
        .bearer_auth(&admin)
        .json(&json!({"status": "teleported"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_order_list_filters_by_status() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(UserId::new(), &["admin"]);
    let customer = mint_jwt(UserId::new(), &["customer"]);
    seed(&client, &server.base_url, &admin).await;

    place_order(&client, &server.base_url, &customer, 1).await;

    let res = client
        .get(format!("{}/orders?status=pending", server.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let res = client
        .get(format!("{}/orders?status=delivered", server.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn full_return_flow_over_http() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = mint_jwt(UserId::new(), &["admin"]);
    let customer = mint_jwt(UserId::new(), &["customer"]);
    seed(&client, &server.base_url, &admin).await;

    let placed = place_order(&client, &server.base_url, &customer, 1).await;
    let order_id = placed["order_id"].as_str().unwrap().to_string();

    // Returns require a delivered line.
    let res = client
        .post(format!("{}/returns", server.base_url))
        .bearer_auth(&customer)
        .json(&json!({
            "order_id": order_id,
            "line_no": 1,
            "kind": "return",
            "qty": 1,
            "reason": "defective",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    for step in ["confirmed", "shipped"] {
        let res = client
            .put(format!("{}/orders/{order_id}/status", server.base_url))
            .bearer_auth(&admin)
            .json(&json!({"status": step}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    let res = client
        .put(format!("{}/orders/{order_id}/deliver", server.base_url))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/returns", server.base_url))
        .bearer_auth(&customer)
        .json(&json!({
            "order_id": order_id,
            "line_no": 1,
            "kind": "return",
            "qty": 1,
            "reason": "defective",
            "comment": "zipper broke on first use",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let opened: Value = res.json().await.unwrap();
    let return_id = opened["return_id"].as_str().unwrap().to_string();
    assert_eq!(opened["mirrored"], json!(true));

    for step in [
        "approved",
        "pickup_scheduled",
        "received_at_warehouse",
        "refund_initiated",
        "completed",
    ] {
        let res = client
            .put(format!("{}/returns/{return_id}", server.base_url))
            .bearer_auth(&admin)
            .json(&json!({"status": step}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "advancing to {step}");
    }

    let res = client
        .get(format!("{}/returns/{return_id}", server.base_url))
        .bearer_auth(&customer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let request: Value = res.json().await.unwrap();
    assert_eq!(request["status"], json!("completed"));
    assert_eq!(request["timeline"].as_array().unwrap().len(), 6);

    // The originating line mirrors the completed return.
    let res = client
        .get(format!("{}/orders/{order_id}", server.base_url))
        .bearer_auth(&customer)
        .send()
        .await
        .unwrap();
    let order: Value = res.json().await.unwrap();
    assert_eq!(order["lines"][0]["status"], json!("returned"));

    // Terminal requests stay terminal.
    let res = client
        .put(format!("{}/returns/{return_id}", server.base_url))
        .bearer_auth(&admin)
        .json(&json!({"status": "rejected"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn whoami_reflects_the_token() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let user = UserId::new();
    let token = mint_jwt(user, &["customer"]);

    let res = client
        .get(format!("{}/whoami", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user_id"], json!(user.to_string()));
    assert_eq!(body["is_admin"], json!(false));
}
