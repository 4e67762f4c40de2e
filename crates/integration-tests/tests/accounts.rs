//! Registration, verification, login and user administration.

use axum::http::{Method, StatusCode};
use serde_json::json;

use merkato_integration_tests::{ADMIN_EMAIL, PASSWORD, TestContext};

#[tokio::test]
async fn test_register_does_not_issue_a_session() {
    let ctx = TestContext::new();
    let response = ctx.register("Abebe", "abebe@example.com").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert!(response.body.get("token").is_none());
    assert!(
        ctx.mailer
            .link_for("abebe@example.com")
            .unwrap()
            .starts_with("https://shop.merkato.test/verify-email/")
    );
}

#[tokio::test]
async fn test_duplicate_email_is_rejected() {
    let ctx = TestContext::new();
    ctx.register("Abebe", "abebe@example.com").await;

    let response = ctx.register("Other", "ABEBE@example.com").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
}

#[tokio::test]
async fn test_short_password_is_rejected() {
    let ctx = TestContext::new();
    let response = ctx
        .post(
            "/api/user/register",
            None,
            json!({ "name": "Abebe", "email": "abebe@example.com", "password": "short" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_requires_verified_email() {
    let ctx = TestContext::new();
    ctx.register("Abebe", "abebe@example.com").await;

    assert_eq!(
        ctx.login("abebe@example.com").await.status,
        StatusCode::UNAUTHORIZED
    );

    assert_eq!(ctx.verify("abebe@example.com").await.status, StatusCode::OK);
    let login = ctx.login("abebe@example.com").await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["user"]["name"], "Abebe");
    assert_eq!(login.body["user"]["isSeller"], false);
}

#[tokio::test]
async fn test_verification_link_works_once() {
    let ctx = TestContext::new();
    ctx.register("Abebe", "abebe@example.com").await;

    assert_eq!(ctx.verify("abebe@example.com").await.status, StatusCode::OK);
    assert_eq!(
        ctx.verify("abebe@example.com").await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let ctx = TestContext::new();
    ctx.buyer("Abebe", "abebe@example.com").await;

    let response = ctx
        .post(
            "/api/user/login",
            None,
            json!({ "email": "abebe@example.com", "password": format!("{PASSWORD}!") }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_guards_reject_missing_and_mismatched_tokens() {
    let ctx = TestContext::new();
    let (_, buyer) = ctx.buyer("Abebe", "abebe@example.com").await;
    let admin = ctx.admin_token().await;

    assert_eq!(
        ctx.get("/api/user/profile", None).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        ctx.get("/api/user/profile", Some("garbage")).await.status,
        StatusCode::UNAUTHORIZED
    );
    // operator tokens carry no user
    assert_eq!(
        ctx.get("/api/user/profile", Some(&admin)).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        ctx.get("/api/user/all", Some(&buyer)).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        ctx.get("/api/product/user/list", Some(&buyer)).await.status,
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn test_admin_login_checks_credentials() {
    let ctx = TestContext::new();
    let response = ctx
        .post(
            "/api/user/admin",
            None,
            json!({ "email": ADMIN_EMAIL, "password": "not-it" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_update_round_trips_payout_details() {
    let ctx = TestContext::new();
    let (_, token) = ctx.buyer("Abebe", "abebe@example.com").await;

    let response = ctx
        .send(
            Method::PUT,
            "/api/user/profile",
            Some(&token),
            Some(json!({ "telebirrPhone": "0911223344" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);

    let profile = ctx.get("/api/user/profile", Some(&token)).await;
    assert_eq!(profile.body["user"]["telebirrPhone"], "0911223344");
}

#[tokio::test]
async fn test_admin_promotes_and_deletes_seller_with_products() {
    let ctx = TestContext::new();
    let (seller_id, seller) = ctx.buyer("Selam", "selam@example.com").await;
    let admin = ctx.admin_token().await;

    let promoted = ctx
        .send(
            Method::PUT,
            &format!("/api/user/{seller_id}/seller"),
            Some(&admin),
            Some(json!({ "isSeller": true })),
        )
        .await;
    assert_eq!(promoted.status, StatusCode::OK, "{:?}", promoted.body);

    ctx.list_product(&seller, "Kemis", "100", "").await;
    ctx.list_product(&seller, "Netela", "40", "").await;

    let users = ctx.get("/api/user/all", Some(&admin)).await;
    assert_eq!(users.body["users"].as_array().unwrap().len(), 1);

    let deleted = ctx
        .send(
            Method::DELETE,
            &format!("/api/user/{seller_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(deleted.status, StatusCode::OK, "{:?}", deleted.body);
    assert_eq!(deleted.body["productsRemoved"], 2);

    let products = ctx.get("/api/product/list", None).await;
    assert!(products.body["products"].as_array().unwrap().is_empty());

    // the deleted account's token no longer resolves
    assert_eq!(
        ctx.get("/api/user/profile", Some(&seller)).await.status,
        StatusCode::UNAUTHORIZED
    );

    let again = ctx
        .send(
            Method::DELETE,
            &format!("/api/user/{seller_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
}
