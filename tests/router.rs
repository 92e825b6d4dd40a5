use axum::body::{to_bytes, Body};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, SET_COOKIE};
use axum::http::{Request, Response};
use axum::Router;
use serde_json::{json, Value};
use time::Duration;
use tower::ServiceExt;

use research_fusion::auth::TokenIssuer;
use research_fusion::db::Db;
use research_fusion::models::researcher::{NewResearcher, Researcher};
use research_fusion::models::RecordId;
use research_fusion::routes::{build_router, AppState};

const SECRET: &str = "integration-test-secret";
const PASSWORD: &str = "hunter22";

fn issuer() -> TokenIssuer {
    TokenIssuer::new(SECRET, Duration::hours(1))
}

fn app(db: &Db) -> Router {
    build_router(AppState::new(db.clone(), issuer()))
}

fn make_request(method: &str, path: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }

    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn read_body(response: Response<Body>) -> (u16, Value) {
    let status = response.status().as_u16();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, body)
}

async fn send(db: &Db, request: Request<Body>) -> (u16, Value) {
    let response = app(db).oneshot(request).await.unwrap();
    read_body(response).await
}

async fn register(username: &str, db: &Db) -> (Researcher, String) {
    let researcher = Researcher::register(
        NewResearcher {
            first_name: String::from("Test"),
            last_name: String::from("Researcher"),
            email: format!("{}@uni.edu", username),
            username: username.to_owned(),
            password: PASSWORD.to_owned(),
        },
        db,
    )
    .await
    .unwrap();
    let token = issuer().issue(researcher.id).unwrap();

    (researcher, token)
}

async fn create_study(creator: &Researcher, token: &str, db: &Db) -> String {
    let (status, body) = send(
        db,
        make_request(
            "POST",
            &format!("/study/{}", creator.id),
            Some(token),
            Some(json!({ "studyCode": "S-1", "studyName": "Sleep and memory" })),
        ),
    )
    .await;
    assert_eq!(status, 201);

    body["study"]["_id"].as_str().unwrap().to_owned()
}

async fn add_participants(emails: &[&str], token: &str, db: &Db) -> (u16, Value) {
    let participants: Vec<Value> = emails.iter().map(|email| json!({ "email": email })).collect();

    send(
        db,
        make_request(
            "POST",
            "/participant/add",
            Some(token),
            Some(json!({ "participants": participants })),
        ),
    )
    .await
}

#[tokio::test]
async fn login_checks_credentials_and_issues_a_token() {
    let db = Db::in_memory();
    let (researcher, _) = register("ada", &db).await;

    let (status, body) = send(
        &db,
        make_request(
            "POST",
            "/researcher/login",
            None,
            Some(json!({ "username": "ada", "password": "wrong" })),
        ),
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(body["statusCode"], 401);

    let response = app(&db)
        .oneshot(make_request(
            "POST",
            "/researcher/login",
            None,
            Some(json!({ "username": "ada", "password": PASSWORD })),
        ))
        .await
        .unwrap();
    let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_owned();
    assert!(cookie.starts_with("access_token="));
    assert!(cookie.contains("HttpOnly"));

    let (status, body) = read_body(response).await;
    assert_eq!(status, 200);
    assert_eq!(body["id"], researcher.id.to_string());
    let token = body["token"].as_str().unwrap();

    let (status, body) = send(
        &db,
        make_request("GET", &format!("/researcher/info/{}", researcher.id), Some(token), None),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["result"]["username"], "ada");
    assert!(body["result"].get("passHash").is_none());
}

#[tokio::test]
async fn routes_other_than_login_need_a_valid_token() {
    let db = Db::in_memory();

    let (status, _) = send(&db, make_request("GET", "/tag/all", None, None)).await;
    assert_eq!(status, 401);

    let (status, _) = send(&db, make_request("GET", "/tag/all", Some("not.a.token"), None)).await;
    assert_eq!(status, 401);

    let other_issuer = TokenIssuer::new("some-other-secret", Duration::hours(1));
    let forged = other_issuer.issue(RecordId::new()).unwrap();
    let (status, _) = send(&db, make_request("GET", "/tag/all", Some(&forged), None)).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn bulk_participant_creation_reports_existing_emails() {
    let db = Db::in_memory();
    let (_, token) = register("ada", &db).await;

    let (status, _) = add_participants(&["a@x.com"], &token, &db).await;
    assert_eq!(status, 201);

    let (status, body) = add_participants(&["a@x.com", "b@x.com"], &token, &db).await;
    assert_eq!(status, 201);
    assert_eq!(body["success"].as_array().unwrap().len(), 1);
    assert_eq!(body["success"][0]["email"], "b@x.com");
    assert_eq!(body["existing"].as_array().unwrap().len(), 1);
    assert_eq!(body["existing"][0]["email"], "a@x.com");

    let (_, all) = send(&db, make_request("GET", "/participant/all", Some(&token), None)).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_emails_in_one_batch_are_reported_as_failures() {
    let db = Db::in_memory();
    let (_, token) = register("ada", &db).await;

    let (status, body) = add_participants(&["a@x.com", "a@x.com"], &token, &db).await;

    assert_eq!(status, 400);
    assert_eq!(body["success"].as_array().unwrap().len(), 1);
    assert_eq!(body["failedDetails"][0]["index"], 1);
    assert_eq!(body["failedDetails"][0]["field"], "email");
}

#[tokio::test]
async fn blank_emails_are_reported_as_failures() {
    let db = Db::in_memory();
    let (_, token) = register("ada", &db).await;

    let (status, body) = add_participants(&["", "a@x.com"], &token, &db).await;

    assert_eq!(status, 400);
    assert_eq!(body["success"].as_array().unwrap().len(), 1);
    assert_eq!(body["failedDetails"][0]["index"], 0);
    assert_eq!(body["failedDetails"][0]["field"], "email");
}

#[tokio::test]
async fn enrolments_of_deleted_participants_are_listed_without_info() {
    let db = Db::in_memory();
    let (researcher, token) = register("ada", &db).await;
    let study_id = create_study(&researcher, &token, &db).await;

    let (status, _) = send(
        &db,
        make_request("GET", &format!("/study-participants/{}", study_id), Some(&token), None),
    )
    .await;
    assert_eq!(status, 204);

    let (_, created) = add_participants(&["a@x.com", "b@x.com"], &token, &db).await;
    let ids: Vec<&str> = created["success"]
        .as_array()
        .unwrap()
        .iter()
        .map(|participant| participant["_id"].as_str().unwrap())
        .collect();

    let (status, enrolled) = send(
        &db,
        make_request(
            "POST",
            &format!("/study-participants/{}", study_id),
            Some(&token),
            Some(json!({ "participantIds": ids })),
        ),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(enrolled[0]["serialNum"], 1);
    assert_eq!(enrolled[1]["serialNum"], 2);

    let (status, _) = send(
        &db,
        make_request("DELETE", &format!("/participant/{}", ids[1]), Some(&token), None),
    )
    .await;
    assert_eq!(status, 204);

    let (status, listed) = send(
        &db,
        make_request("GET", &format!("/study-participants/{}", study_id), Some(&token), None),
    )
    .await;
    assert_eq!(status, 200);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["participantInfo"]["email"], "a@x.com");
    assert!(listed[1]["participantInfo"].is_null());

    let (_, count) = send(
        &db,
        make_request("GET", &format!("/study-participants/count/{}", study_id), Some(&token), None),
    )
    .await;
    assert_eq!(count["count"], 2);
}

#[tokio::test]
async fn toggling_checks_property_names_and_ids() {
    let db = Db::in_memory();
    let (_, token) = register("ada", &db).await;

    let (status, _) = send(
        &db,
        make_request(
            "PUT",
            "/study-participants/toggle-property",
            Some(&token),
            Some(json!({ "ids": [RecordId::new()], "propertyName": "isGift" })),
        ),
    )
    .await;
    assert_eq!(status, 404);

    let (status, body) = send(
        &db,
        make_request(
            "PUT",
            "/study-participants/toggle-property",
            Some(&token),
            Some(json!({ "ids": [RecordId::new()], "propertyName": "serialNum" })),
        ),
    )
    .await;
    assert_eq!(status, 400);
    assert!(body["reason"].as_str().unwrap().contains("serialNum"));

    let (_, created) = add_participants(&["a@x.com"], &token, &db).await;
    let id = created["success"][0]["_id"].clone();
    let (status, body) = send(
        &db,
        make_request(
            "PUT",
            "/participant/toggle-property",
            Some(&token),
            Some(json!({ "ids": [id], "propertyName": "isWillContact" })),
        ),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "1 documents updated successfully.");
}

#[tokio::test]
async fn malformed_ids_are_bad_requests() {
    let db = Db::in_memory();
    let (_, token) = register("ada", &db).await;

    let (status, body) = send(&db, make_request("GET", "/study/not-an-id", Some(&token), None)).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "bad request");

    let (status, _) = send(
        &db,
        make_request("GET", &format!("/study/{}", RecordId::new()), Some(&token), None),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn creators_stay_on_their_study() {
    let db = Db::in_memory();
    let (creator, token) = register("ada", &db).await;
    let (other, _) = register("grace", &db).await;
    let study_id = create_study(&creator, &token, &db).await;

    let (status, _) = send(
        &db,
        make_request(
            "PUT",
            &format!("/study/associateResearcher/{}/{}", study_id, other.id),
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, 200);

    let (status, body) = send(
        &db,
        make_request(
            "PUT",
            &format!("/study/removeResearcher/{}/{}", study_id, creator.id),
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "policy violation");

    let (_, researchers) = send(
        &db,
        make_request("GET", &format!("/study/researcher/list/{}", study_id), Some(&token), None),
    )
    .await;
    assert_eq!(researchers.as_array().unwrap().len(), 2);

    let (status, _) = send(
        &db,
        make_request(
            "PUT",
            &format!("/study/removeResearcher/{}/{}", study_id, other.id),
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, 200);

    let (_, reports) = send(
        &db,
        make_request("GET", &format!("/researcher/studyList/{}", other.id), Some(&token), None),
    )
    .await;
    assert!(reports.as_array().unwrap().is_empty());
}
