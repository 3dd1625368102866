//! End-to-end flows against a real PostgreSQL.
//!
//! Point `DATABASE_URL` at a disposable database to run these; without it
//! every test returns early.

mod common;

use axum::{Router, http::StatusCode};
use common::{json_body, request};
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use pharmacy_pos::{app_state::AppState, auth::UserRole, db};
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tower::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static MIGRATED: OnceCell<()> = OnceCell::const_new();

const BRANCH: &str = "Downtown";

/// A fresh pharmacy with one branch and one manufacturer.
struct Shop {
    app: Router,
    token: String,
    manufacturer_id: String,
}

impl Shop {
    async fn open() -> Option<Shop> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL is not set, skipping");
            return None;
        };
        MIGRATED
            .get_or_init(|| async {
                db::run_migrations_blocking(MIGRATIONS, &url).await.unwrap();
            })
            .await;

        let state = AppState::new(&common::config(&url), common::api_urls("http://127.0.0.1:1")).unwrap();
        let admin_uid = format!("admin-{}", Uuid::new_v4());
        let mut shop = Shop {
            app: pharmacy_pos::app(state),
            token: common::token(&admin_uid, UserRole::PharmacyAdmin, None),
            manufacturer_id: String::new(),
        };

        let (status, _) = shop
            .admin(
                "POST",
                "/branches",
                Some(json!({ "name": BRANCH, "city": "Lahore", "state": "Punjab" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = shop
            .admin(
                "POST",
                "/manufacturers",
                Some(json!({ "name": format!("Acme {admin_uid}") })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        shop.manufacturer_id = body["data"]["id"].as_str().unwrap().to_string();

        Some(shop)
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>, in_branch: bool) -> (StatusCode, Value) {
        let mut req = request(method, uri, Some(&self.token), body);
        if in_branch {
            req.headers_mut().insert("x-branch", BRANCH.parse().unwrap());
        }
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        (status, json_body(response).await)
    }

    async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, body, false).await
    }

    async fn branch(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, body, true).await
    }

    async fn add_tablets(&self, name: &str, quantity: i32) -> String {
        let (status, body) = self
            .branch(
                "POST",
                "/medicines",
                Some(json!({
                    "name": name,
                    "manufacturer_id": self.manufacturer_id,
                    "chemicals": "Paracetamol",
                    "description": "Pain relief",
                    "medicine_type": "tablets",
                    "quantity": quantity,
                    "price_per_unit": 0.25,
                    "tablets_per_box": 20
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn stock(&self, medicine_id: &str) -> i64 {
        let (status, body) = self.branch("GET", &format!("/medicines/{medicine_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["quantity"].as_i64().unwrap()
    }

    async fn cart_with(&self, items: Value) -> i64 {
        let (status, body) = self.branch("POST", "/carts", Some(json!({ "items": items }))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"]["cart"]["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn checkout_takes_stock_and_removes_the_cart() {
    let Some(shop) = Shop::open().await else { return };
    let panadol = shop.add_tablets("Panadol", 50).await;
    let cart = shop
        .cart_with(json!([
            { "medicine_id": panadol, "quantity": 4 },
            { "medicine_id": panadol, "quantity": 2, "unit": "box" }
        ]))
        .await;

    let (status, body) = shop.branch("POST", &format!("/carts/{cart}/checkout"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["sale"]["total"], 1.5);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

    assert_eq!(shop.stock(&panadol).await, 6);

    let (status, _) = shop.branch("GET", &format!("/carts/{cart}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = shop.branch("POST", &format!("/carts/{cart}/checkout"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_cart_is_a_bad_request() {
    let Some(shop) = Shop::open().await else { return };
    let cart = shop.cart_with(json!([])).await;

    let (status, body) = shop.branch("POST", &format!("/carts/{cart}/checkout"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cart is empty");
}

#[tokio::test]
async fn insufficient_stock_leaves_everything_untouched() {
    let Some(shop) = Shop::open().await else { return };
    let panadol = shop.add_tablets("Panadol", 30).await;
    let brufen = shop.add_tablets("Brufen", 100).await;
    let cart = shop
        .cart_with(json!([
            { "medicine_id": brufen, "quantity": 10 },
            { "medicine_id": panadol, "quantity": 2, "unit": "box" }
        ]))
        .await;

    let (status, body) = shop.branch("POST", &format!("/carts/{cart}/checkout"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Insufficient stock for Panadol");

    assert_eq!(shop.stock(&panadol).await, 30);
    assert_eq!(shop.stock(&brufen).await, 100);

    let (status, body) = shop.branch("GET", &format!("/carts/{cart}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cart_items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn adding_an_item_adds_one_line() {
    let Some(shop) = Shop::open().await else { return };
    let panadol = shop.add_tablets("Panadol", 30).await;
    let cart = shop.cart_with(json!([])).await;

    for expected in 1..=2 {
        let (status, body) = shop
            .branch(
                "POST",
                &format!("/carts/{cart}/items"),
                Some(json!({ "medicine_id": panadol, "quantity": 1 })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["cart_items"].as_array().unwrap().len(), expected);
    }
}

#[tokio::test]
async fn approving_a_stock_request_restocks_the_medicine() {
    let Some(shop) = Shop::open().await else { return };
    let panadol = shop.add_tablets("Panadol", 5).await;

    let (status, body) = shop
        .branch(
            "POST",
            "/stock-requests",
            Some(json!({ "medicine_id": panadol, "quantity": 40 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let request_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = shop
        .admin("PATCH", &format!("/stock-requests/{request_id}/approve"), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "APPROVED");
    assert_eq!(shop.stock(&panadol).await, 45);

    let (status, _) = shop
        .admin("PATCH", &format!("/stock-requests/{request_id}/approve"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(shop.stock(&panadol).await, 45);
}

#[tokio::test]
async fn manufacturer_names_stay_unique() {
    let Some(shop) = Shop::open().await else { return };
    let name = format!("Zenith {}", Uuid::new_v4());

    let (status, _) = shop.admin("POST", "/manufacturers", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = shop.admin("POST", "/manufacturers", Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "A manufacturer with this name already exists");

    let (status, body) = shop
        .admin(
            "PATCH",
            &format!("/manufacturers/{}", shop.manufacturer_id),
            Some(json!({ "name": name })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "A manufacturer with this name already exists");
}
