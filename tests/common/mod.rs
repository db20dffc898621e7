#![allow(dead_code)]

use std::str::FromStr;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use perfume_store_api::{
    auth::{Claims, ADMIN_ROLE},
    build_router,
    config::AppConfig,
    db,
    entities::commerce::{Concentration, FragranceFamily, PerfumeCategory, PerfumeModel},
    events::{self, EventSender},
    services::commerce::CreatePerfumeInput,
    AppState,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

const TEST_JWT_SECRET: &str =
    "integration_test_secret_that_is_long_enough_for_hs256_signing_keys_0123456789";

/// Application harness backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub user_id: Uuid,
    user_token: String,
    admin_token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Fresh database, migrated, with one customer and one admin token.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            0,
            "development".to_string(),
        );
        // One connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("connect to in-memory sqlite");
        db::run_migrations(&pool).await.expect("run migrations");

        let (tx, rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(rx));

        let user_id = Uuid::new_v4();
        let user_token = mint_token(&cfg, user_id, vec![]);
        let admin_token = mint_token(&cfg, Uuid::new_v4(), vec![ADMIN_ROLE.to_string()]);

        let state = AppState::new(std::sync::Arc::new(pool), cfg, EventSender::new(tx));
        let router = build_router(state.clone()).expect("build router");

        Self {
            router,
            state,
            user_id,
            user_token,
            admin_token,
            _event_task: event_task,
        }
    }

    pub fn user_token(&self) -> &str {
        &self.user_token
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Token for a different customer, used for ownership checks.
    pub fn other_user_token(&self) -> String {
        mint_token(&self.state.config, Uuid::new_v4(), vec![])
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        self.request_with_headers(method, uri, body, token, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Seeds an active perfume straight through the catalog service.
    pub async fn seed_perfume(&self, name: &str, price: Decimal, stock: i32) -> PerfumeModel {
        self.state
            .services
            .catalog
            .create_product(perfume_input(name, price, stock))
            .await
            .expect("seed perfume for tests")
    }

    /// Places an order for the default customer and returns the response.
    pub async fn place_order(&self, lines: &[(Uuid, i32)]) -> Response {
        self.place_order_as(self.user_token(), lines).await
    }

    pub async fn place_order_as(&self, token: &str, lines: &[(Uuid, i32)]) -> Response {
        let items: Vec<Value> = lines
            .iter()
            .map(|(id, qty)| json!({ "perfumeId": id, "quantity": qty }))
            .collect();
        self.request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": items,
                "shippingAddress": shipping_address_json(),
                "paymentMethod": "credit_card"
            })),
            Some(token),
        )
        .await
    }

    /// Current stock straight from the database, ignoring `is_active`.
    pub async fn stock_of(&self, perfume_id: Uuid) -> i32 {
        use perfume_store_api::entities::commerce::Perfume;
        use sea_orm::EntityTrait;

        Perfume::find_by_id(perfume_id)
            .one(&*self.state.db)
            .await
            .expect("load perfume")
            .expect("perfume exists")
            .stock
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

fn mint_token(cfg: &AppConfig, user_id: Uuid, roles: Vec<String>) -> String {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        roles,
        iss: cfg.jwt_issuer.clone(),
        aud: cfg.jwt_audience.clone(),
        exp: (now + chrono::Duration::hours(1)).timestamp(),
        iat: Some(now.timestamp()),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    )
    .expect("encode access token")
}

pub fn perfume_input(name: &str, price: Decimal, stock: i32) -> CreatePerfumeInput {
    CreatePerfumeInput {
        name: name.to_string(),
        brand: "Maison Test".to_string(),
        description: format!("{} seeded for integration tests", name),
        price,
        original_price: None,
        category: PerfumeCategory::Unisex,
        fragrance_family: FragranceFamily::Woody,
        top_notes: vec!["bergamot".to_string()],
        middle_notes: vec!["iris".to_string()],
        base_notes: vec!["cedar".to_string()],
        size_ml: 100,
        stock,
        image_url: None,
        rating: None,
        review_count: None,
        is_featured: false,
        launch_year: Some(2020),
        concentration: Some(Concentration::EauDeParfum),
    }
}

pub fn shipping_address_json() -> Value {
    json!({
        "street": "12 Rue de la Paix",
        "city": "Paris",
        "postalCode": "75002",
        "country": "France"
    })
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a decimal that the API serialized as a JSON string.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {}", other),
    }
}
