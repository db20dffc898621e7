mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, perfume_input, response_json, TestApp};
use perfume_store_api::entities::commerce::{FragranceFamily, PerfumeCategory};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn seed_catalog(app: &TestApp) {
    let catalog = &app.state.services.catalog;

    let mut sauvage = perfume_input("Sauvage", dec!(95.00), 20);
    sauvage.brand = "Dior".to_string();
    sauvage.category = PerfumeCategory::Men;
    sauvage.fragrance_family = FragranceFamily::Fresh;
    sauvage.is_featured = true;
    catalog.create_product(sauvage).await.unwrap();

    let mut jadore = perfume_input("J'adore", dec!(120.00), 3);
    jadore.brand = "Dior".to_string();
    jadore.category = PerfumeCategory::Women;
    jadore.fragrance_family = FragranceFamily::Floral;
    catalog.create_product(jadore).await.unwrap();

    let mut ck_one = perfume_input("CK One", dec!(45.00), 50);
    ck_one.brand = "Calvin Klein".to_string();
    ck_one.category = PerfumeCategory::Unisex;
    ck_one.fragrance_family = FragranceFamily::Citrus;
    ck_one.description = "A clean citrus classic".to_string();
    catalog.create_product(ck_one).await.unwrap();
}

async fn list(app: &TestApp, query: &str) -> Value {
    let response = app
        .request(Method::GET, &format!("/api/v1/perfumes{}", query), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK, "query {}", query);
    response_json(response).await["data"].clone()
}

fn names(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn listing_filters_and_sorts() {
    let app = TestApp::new().await;
    seed_catalog(&app).await;

    let all = list(&app, "").await;
    assert_eq!(all["pagination"]["total"], 3);

    let women = list(&app, "?category=women").await;
    assert_eq!(names(&women), vec!["J'adore"]);

    let every_category = list(&app, "?category=all").await;
    assert_eq!(every_category["pagination"]["total"], 3);

    let dior = list(&app, "?brand=dior&sortBy=price&sortOrder=asc").await;
    assert_eq!(names(&dior), vec!["Sauvage", "J'adore"]);

    let priced = list(&app, "?minPrice=50&maxPrice=100").await;
    assert_eq!(names(&priced), vec!["Sauvage"]);

    let searched = list(&app, "?search=CITRUS").await;
    assert_eq!(names(&searched), vec!["CK One"]);

    let fresh = list(&app, "?fragranceFamily=fresh").await;
    assert_eq!(names(&fresh), vec!["Sauvage"]);

    let by_name = list(&app, "?sortBy=name&sortOrder=asc").await;
    assert_eq!(names(&by_name), vec!["CK One", "J'adore", "Sauvage"]);

    let paged = list(&app, "?sortBy=price&sortOrder=desc&page=2&limit=2").await;
    assert_eq!(names(&paged), vec!["CK One"]);
    assert_eq!(paged["pagination"]["totalPages"], 2);
    assert_eq!(paged["pagination"]["page"], 2);
}

#[tokio::test]
async fn listing_rejects_bad_parameters() {
    let app = TestApp::new().await;

    for query in [
        "?category=kids",
        "?page=0",
        "?limit=101",
        "?minPrice=cheap",
        "?page=18446744073709551615",
    ] {
        let response = app
            .request(Method::GET, &format!("/api/v1/perfumes{}", query), None, None)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "query {}", query);
        let body = response_json(response).await;
        assert_eq!(body["error"], "Bad Request");
        assert!(body["timestamp"].is_string());
    }
}

#[tokio::test]
async fn featured_lists_only_flagged_perfumes() {
    let app = TestApp::new().await;
    seed_catalog(&app).await;

    let response = app
        .request(Method::GET, "/api/v1/perfumes/featured", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let featured = body["data"].as_array().unwrap();
    assert_eq!(featured.len(), 1);
    assert_eq!(featured[0]["name"], "Sauvage");
    assert_eq!(featured[0]["isFeatured"], true);
}

#[tokio::test]
async fn admin_manages_catalog() {
    let app = TestApp::new().await;

    let payload = json!({
        "name": "Baccarat Rouge 540",
        "brand": "Maison Francis Kurkdjian",
        "description": "Amber and saffron",
        "price": "325.00",
        "originalPrice": "350.00",
        "category": "unisex",
        "fragranceFamily": "oriental",
        "topNotes": ["saffron", "jasmine"],
        "baseNotes": ["ambergris", "cedar"],
        "sizeMl": 70,
        "stock": 12,
        "launchYear": 2015,
        "concentration": "eau_de_parfum"
    });

    let forbidden = app
        .request(
            Method::POST,
            "/api/v1/perfumes",
            Some(payload.clone()),
            Some(app.user_token()),
        )
        .await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let anonymous = app
        .request(Method::POST, "/api/v1/perfumes", Some(payload.clone()), None)
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let created = app
        .request(
            Method::POST,
            "/api/v1/perfumes",
            Some(payload),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = response_json(created).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["isActive"], true);
    assert_eq!(created["data"]["reviewCount"], 0);
    assert_eq!(created["data"]["topNotes"], json!(["saffron", "jasmine"]));
    assert_eq!(created["data"]["middleNotes"], json!([]));

    let updated = app
        .request(
            Method::PUT,
            &format!("/api/v1/perfumes/{}", id),
            Some(json!({ "price": "299.00", "isFeatured": true })),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let updated = response_json(updated).await;
    assert_eq!(decimal(&updated["data"]["price"]), dec!(299.00));
    assert_eq!(updated["data"]["isFeatured"], true);
    assert_eq!(updated["data"]["name"], "Baccarat Rouge 540");

    let deleted = app
        .request(
            Method::DELETE,
            &format!("/api/v1/perfumes/{}", id),
            None,
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(deleted.status(), StatusCode::OK);

    let hidden = app
        .request(Method::GET, &format!("/api/v1/perfumes/{}", id), None, None)
        .await;
    assert_eq!(hidden.status(), StatusCode::NOT_FOUND);
    assert_eq!(list(&app, "").await["pagination"]["total"], 0);
}

#[tokio::test]
async fn invalid_perfumes_are_rejected() {
    let app = TestApp::new().await;

    let cases = [
        json!({
            "name": "X", "brand": "Dior", "description": "short name",
            "price": "10.00", "category": "men", "fragranceFamily": "woody",
            "sizeMl": 50, "stock": 1
        }),
        json!({
            "name": "Negative", "brand": "Dior", "description": "negative stock",
            "price": "10.00", "category": "men", "fragranceFamily": "woody",
            "sizeMl": 50, "stock": -1
        }),
        json!({
            "name": "Future", "brand": "Dior", "description": "launch year ahead",
            "price": "10.00", "category": "men", "fragranceFamily": "woody",
            "sizeMl": 50, "stock": 1, "launchYear": 9999
        }),
        json!({
            "name": "Unknown Family", "brand": "Dior", "description": "bad enum",
            "price": "10.00", "category": "men", "fragranceFamily": "smoky",
            "sizeMl": 50, "stock": 1
        }),
        json!({
            "name": "Sub Cent", "brand": "Dior", "description": "fractional cents",
            "price": "10.005", "category": "men", "fragranceFamily": "woody",
            "sizeMl": 50, "stock": 1
        }),
    ];

    for payload in cases {
        let response = app
            .request(
                Method::POST,
                "/api/v1/perfumes",
                Some(payload.clone()),
                Some(app.admin_token()),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "payload {}", payload);
    }
}

#[tokio::test]
async fn stock_adjustments_never_go_negative() {
    let app = TestApp::new().await;
    let perfume = app.seed_perfume("Angel", dec!(85.00), 5).await;
    let uri = format!("/api/v1/perfumes/{}/stock", perfume.id);

    let restock = app
        .request(
            Method::PATCH,
            &uri,
            Some(json!({ "delta": 10 })),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(restock.status(), StatusCode::OK);
    assert_eq!(response_json(restock).await["data"]["stock"], 15);

    let overdraw = app
        .request(
            Method::PATCH,
            &uri,
            Some(json!({ "delta": -16 })),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(overdraw.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_of(perfume.id).await, 15);

    let zero = app
        .request(
            Method::PATCH,
            &uri,
            Some(json!({ "delta": 0 })),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    let drain = app
        .request(
            Method::PATCH,
            &uri,
            Some(json!({ "delta": -15 })),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(drain.status(), StatusCode::OK);
    assert_eq!(app.stock_of(perfume.id).await, 0);

    let low = app
        .request(
            Method::GET,
            "/api/v1/perfumes/low-stock?threshold=0",
            None,
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(low.status(), StatusCode::OK);
    let low = response_json(low).await;
    assert_eq!(low["data"][0]["name"], "Angel");

    let customer = app
        .request(
            Method::GET,
            "/api/v1/perfumes/low-stock",
            None,
            Some(app.user_token()),
        )
        .await;
    assert_eq!(customer.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_and_request_ids_are_served() {
    let app = TestApp::new().await;

    let health = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert!(health.headers().contains_key("x-request-id"));

    let ready = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(ready.status(), StatusCode::OK);

    let missing = app
        .request_with_headers(
            Method::GET,
            &format!("/api/v1/perfumes/{}", uuid::Uuid::new_v4()),
            None,
            None,
            &[("x-request-id", "trace-me-42")],
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        missing
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("trace-me-42")
    );
    let body = response_json(missing).await;
    assert_eq!(body["request_id"], "trace-me-42");
    assert_eq!(body["error"], "Not Found");
}
