use aahaar_setu::auth::{issue_token, Role, UserProfile};
use aahaar_setu::{db, router, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    _dir: tempfile::TempDir,
    app: Router,
}

async fn test_app() -> TestApp {
    test_app_with_geocoder("http://127.0.0.1:9").await
}

async fn test_app_with_geocoder(geocoder_url: &str) -> TestApp {
    std::env::set_var("JWT_SECRET", "api-test-secret");
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("api.db");
    let pool = db::init_pool(path.to_str().expect("utf8 path")).await.expect("init pool");
    TestApp {
        _dir: dir,
        app: router(AppState::new(pool, geocoder_url)),
    }
}

fn token(id: &str, name: &str, role: Option<Role>) -> String {
    issue_token(&UserProfile {
        id: id.to_string(),
        email: format!("{}@example.org", id),
        name: name.to_string(),
        provider: "local".to_string(),
        role,
    })
    .expect("issue token")
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn bread() -> Value {
    json!({
        "food_type": "Bread",
        "description": "Twenty loaves from the morning bake",
        "pickup_location": "Indiranagar, Bengaluru",
        "quantity": 20,
        "quantity_unit": "loaves",
        "nutrition_tags": ["vegetarian"],
        "expiration_date": "2099-01-01",
        "expiration_time": "20:00"
    })
}

#[tokio::test]
async fn api_requires_a_session() {
    let t = test_app().await;
    let (status, _) = send(&t.app, Method::GET, "/api/donations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.app, Method::GET, "/api/donations", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&t.app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn donating_awards_points_and_filters_apply() {
    let t = test_app().await;
    let donor = token("donor-1", "Annapurna Kitchen", Some(Role::Donor));

    let (status, body) = send(&t.app, Method::POST, "/api/donations", Some(&donor), Some(bread())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["points"], 10);
    assert_eq!(body["donation"]["donor_name"], "Annapurna Kitchen");
    assert_eq!(body["donation"]["status"], "available");

    let mut rice = bread();
    rice["food_type"] = json!("Rice");
    rice["nutrition_tags"] = json!(["gluten-free"]);
    let (status, _) = send(&t.app, Method::POST, "/api/donations", Some(&donor), Some(rice)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, points) = send(&t.app, Method::GET, "/api/points", Some(&donor), None).await;
    assert_eq!(points["points"], 20);
    assert_eq!(points["successful_donations"], 2);

    let (status, body) = send(&t.app, Method::GET, "/api/donations?food_type=bread", Some(&donor), None).await;
    assert_eq!(status, StatusCode::OK);
    let list = body["donations"].as_array().expect("array");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["food_type"], "Bread");

    let (_, body) = send(&t.app, Method::GET, "/api/donations", Some(&donor), None).await;
    let types: Vec<_> = body["donations"].as_array().expect("array").iter().map(|d| d["food_type"].clone()).collect();
    assert_eq!(types, vec![json!("Rice"), json!("Bread")]);

    let (_, body) = send(&t.app, Method::GET, "/api/donations?tags=gluten-free,dairy", Some(&donor), None).await;
    assert_eq!(body["donations"].as_array().expect("array").len(), 1);

    let (status, _) = send(&t.app, Method::GET, "/api/donations?status=bogus", Some(&donor), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut invalid = bread();
    invalid["pickup_location"] = json!("  ");
    let (status, body) = send(&t.app, Method::POST, "/api/donations", Some(&donor), Some(invalid)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().expect("message").contains("pickup_location"));
}

#[tokio::test]
async fn a_listing_can_only_be_claimed_once() {
    let t = test_app().await;
    let donor = token("donor-1", "Annapurna Kitchen", Some(Role::Donor));
    let hope = token("partner-1", "Hope NGO", Some(Role::Partner));
    let shelter = token("partner-2", "Shelter Home", Some(Role::Partner));

    let (_, created) = send(&t.app, Method::POST, "/api/donations", Some(&donor), Some(bread())).await;
    let id = created["donation"]["id"].as_str().expect("id").to_string();
    let claim_uri = format!("/api/donations/{}/claim", id);
    let claim = json!({ "pickup_date": "2026-10-20", "pickup_time": "17:30" });

    let (status, body) = send(&t.app, Method::POST, &claim_uri, Some(&hope), Some(claim.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "claimed");
    assert_eq!(body["claim"]["claimed_by"], "Hope NGO");

    let (status, body) = send(&t.app, Method::POST, &claim_uri, Some(&shelter), Some(claim)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Donation is claimed");

    let (_, body) = send(&t.app, Method::GET, &format!("/api/donations/{}", id), Some(&donor), None).await;
    assert_eq!(body["claim"]["claimer_id"], "partner-1");

    let deliver_uri = format!("/api/donations/{}/deliver", id);
    let (status, _) = send(&t.app, Method::POST, &deliver_uri, Some(&shelter), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(&t.app, Method::POST, &deliver_uri, Some(&hope), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "delivered");

    let (_, body) = send(&t.app, Method::GET, "/api/activities", Some(&hope), None).await;
    let kinds: Vec<_> = body["activities"].as_array().expect("array").iter().map(|a| a["type"].clone()).collect();
    assert_eq!(kinds, vec![json!("delivery"), json!("claim")]);

    let (status, _) = send(&t.app, Method::POST, "/api/donations/missing/claim", Some(&hope), Some(json!({
        "pickup_date": "2026-10-20",
        "pickup_time": "17:30"
    })))
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dashboards_follow_the_chosen_role() {
    let t = test_app().await;
    let donor = token("donor-1", "Annapurna Kitchen", Some(Role::Donor));
    let unset = token("user-9", "Newcomer", None);

    let (status, _) = send(&t.app, Method::GET, "/api/dashboard/partner", Some(&donor), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&t.app, Method::GET, "/api/dashboard/donor", Some(&unset), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    send(&t.app, Method::POST, "/api/donations", Some(&donor), Some(bread())).await;
    let (status, body) = send(&t.app, Method::GET, "/api/dashboard/donor", Some(&donor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_donations"], 1);
    assert_eq!(body["points_earned"], 10);
    assert_eq!(body["by_status"]["available"], 1);
    assert_eq!(body["total_quantity"], 20.0);
    assert_eq!(body["meals_provided"], 20);
    assert_eq!(body["food_saved_kg"], 20.0);
    assert_eq!(body["co2_reduced_kg"], 10);

    let (status, body) = send(&t.app, Method::PUT, "/api/me/role", Some(&unset), Some(json!({ "role": "partner" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "partner");
}

#[tokio::test]
async fn rewards_need_enough_points() {
    let t = test_app().await;
    let donor = token("donor-1", "Annapurna Kitchen", Some(Role::Donor));

    let (_, body) = send(&t.app, Method::GET, "/api/rewards", Some(&donor), None).await;
    let rewards = body["rewards"].as_array().expect("array");
    assert_eq!(rewards.len(), 8);
    assert!(rewards.iter().all(|r| r["affordable"] == false));

    let (status, body) = send(&t.app, Method::POST, "/api/rewards/1/redeem", Some(&donor), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().expect("message").contains("insufficient points"));

    let (status, _) = send(&t.app, Method::POST, "/api/rewards/99/redeem", Some(&donor), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn partner_dashboard_counts_claims_and_urgent_listings() {
    let t = test_app().await;
    let donor = token("donor-1", "Annapurna Kitchen", Some(Role::Donor));
    let hope = token("partner-1", "Hope NGO", Some(Role::Partner));
    let claim = json!({ "pickup_date": "2026-10-20", "pickup_time": "17:30" });

    let mut ids = Vec::new();
    for _ in 0..2 {
        let (_, created) = send(&t.app, Method::POST, "/api/donations", Some(&donor), Some(bread())).await;
        ids.push(created["donation"]["id"].as_str().expect("id").to_string());
    }
    let soon = chrono::Local::now().naive_local() + chrono::Duration::hours(3);
    let mut curry = bread();
    curry["food_type"] = json!("Dal Curry");
    curry["expiration_date"] = json!(soon.format("%Y-%m-%d").to_string());
    curry["expiration_time"] = json!(soon.format("%H:%M").to_string());
    let (status, _) = send(&t.app, Method::POST, "/api/donations", Some(&donor), Some(curry)).await;
    assert_eq!(status, StatusCode::CREATED);

    for id in &ids {
        let uri = format!("/api/donations/{}/claim", id);
        let (status, _) = send(&t.app, Method::POST, &uri, Some(&hope), Some(claim.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = send(&t.app, Method::POST, &format!("/api/donations/{}/deliver", ids[1]), Some(&hope), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&t.app, Method::GET, "/api/dashboard/partner", Some(&hope), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_claims"], 1);
    assert_eq!(body["delivered"], 1);
    assert_eq!(body["urgent_available"], 1);
    assert_eq!(body["claims"].as_array().expect("array").len(), 2);
}

#[tokio::test]
async fn redeeming_spends_the_balance() {
    let t = test_app().await;
    let donor = token("donor-1", "Annapurna Kitchen", Some(Role::Donor));
    for _ in 0..10 {
        let (status, _) = send(&t.app, Method::POST, "/api/donations", Some(&donor), Some(bread())).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = send(&t.app, Method::GET, "/api/rewards", Some(&donor), None).await;
    assert_eq!(body["points"], 100);
    let affordable: Vec<_> = body["rewards"]
        .as_array()
        .expect("array")
        .iter()
        .filter(|r| r["affordable"] == true)
        .map(|r| r["id"].clone())
        .collect();
    assert_eq!(affordable, vec![json!("1")]);

    let (status, body) = send(&t.app, Method::POST, "/api/rewards/1/redeem", Some(&donor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "redeemed");
    assert_eq!(body["points"], 0);
    assert_eq!(body["reward"]["title"], "Bronze Donor Badge");

    let (_, body) = send(&t.app, Method::GET, "/api/rewards", Some(&donor), None).await;
    assert_eq!(body["points"], 0);
    assert!(body["rewards"].as_array().expect("array").iter().all(|r| r["affordable"] == false));

    let (_, points) = send(&t.app, Method::GET, "/api/points", Some(&donor), None).await;
    assert_eq!(points["points"], 0);
}

/// Stand-in geocoder: `/search` answers with an HTML throttling page,
/// `/reverse` with a well-formed place.
async fn fake_geocoder() -> String {
    let upstream = Router::new()
        .route("/search", get(|| async { "<html>rate limited</html>" }))
        .route(
            "/reverse",
            get(|| async { axum::Json(json!({ "display_name": "MG Road, Bengaluru" })) }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, upstream).await.expect("fake geocoder");
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn geocoder_garbage_is_a_bad_gateway() {
    let base = fake_geocoder().await;
    let t = test_app_with_geocoder(&base).await;
    let donor = token("donor-1", "Annapurna Kitchen", Some(Role::Donor));

    let (status, body) = send(&t.app, Method::GET, "/api/geocode/search?q=delhi", Some(&donor), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Upstream API error");

    let (status, body) = send(&t.app, Method::GET, "/api/geocode/search?q=%20", Some(&donor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], json!([]));

    let (status, body) =
        send(&t.app, Method::GET, "/api/geocode/reverse?lat=12.97&lon=77.6", Some(&donor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], "MG Road, Bengaluru");
}
