//! Product listing, ownership and the on-sale rule.

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};

use merkato_integration_tests::{TestContext, multipart_request};

async fn update(ctx: &TestContext, token: &str, product: i64, patch: Value) -> (StatusCode, Value) {
    let response = ctx
        .send(
            Method::PUT,
            &format!("/api/product/user/update/{product}"),
            Some(token),
            Some(patch),
        )
        .await;
    (response.status, response.body)
}

async fn single(ctx: &TestContext, product: i64) -> Value {
    ctx.post("/api/product/single", None, json!({ "productId": product }))
        .await
        .body["product"]
        .clone()
}

#[tokio::test]
async fn test_seller_listing_is_public() {
    let ctx = TestContext::new();
    let (seller_id, token) = ctx.seller("Selam", "selam@example.com").await;
    let id = ctx.list_product(&token, "Kemis", "100", "").await;

    let single = ctx
        .post("/api/product/single", None, json!({ "productId": id }))
        .await;
    assert_eq!(single.status, StatusCode::OK);
    let product = &single.body["product"];
    assert_eq!(product["name"], "Kemis");
    assert_eq!(product["sellerId"], seller_id.as_i32());
    assert_eq!(product["sizes"], json!(["S", "M", "L"]));
    assert_eq!(product["image"], json!(["https://img.merkato.test/dress.jpg"]));
    assert_eq!(product["rating"], 0.0);

    let list = ctx.get("/api/product/list", None).await;
    assert_eq!(list.body["products"].as_array().unwrap().len(), 1);

    let mine = ctx.get("/api/product/user/list", Some(&token)).await;
    assert_eq!(mine.body["products"][0]["_id"], id);
}

#[tokio::test]
async fn test_listing_requires_an_image() {
    let ctx = TestContext::new();
    let (_, token) = ctx.seller("Selam", "selam@example.com").await;

    let fields = [
        ("name", "Kemis"),
        ("description", "Handwoven"),
        ("price", "100"),
        ("department", "Women"),
        ("category", "Clothing"),
        ("subCategory", "Dresses"),
    ];
    let request = multipart_request("/api/product/user/add", &token, &fields, None);
    assert_eq!(ctx.dispatch(request).await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_listing_needs_a_multipart_body() {
    let ctx = TestContext::new();
    let (_, token) = ctx.seller("Selam", "selam@example.com").await;

    let response = ctx
        .post("/api/product/user/add", Some(&token), json!({ "name": "Kemis" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
}

#[tokio::test]
async fn test_listing_price_must_fit_storage() {
    let ctx = TestContext::new();
    let (_, token) = ctx.seller("Selam", "selam@example.com").await;

    let fields = [
        ("name", "Kemis"),
        ("description", "Handwoven"),
        ("price", "10000000000"),
        ("department", "Women"),
        ("category", "Clothing"),
        ("subCategory", "Dresses"),
    ];
    let request = multipart_request("/api/product/user/add", &token, &fields, Some("dress.jpg"));
    assert_eq!(ctx.dispatch(request).await.status, StatusCode::BAD_REQUEST);
    assert!(ctx.get("/api/product/list", None).await.body["products"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_buyers_cannot_list_products() {
    let ctx = TestContext::new();
    let (_, token) = ctx.buyer("Abebe", "abebe@example.com").await;
    let request = multipart_request(
        "/api/product/user/add",
        &token,
        &[("name", "Kemis"), ("price", "100")],
        Some("x.jpg"),
    );
    assert_eq!(ctx.dispatch(request).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_original_price_kept_only_when_on_sale() {
    let ctx = TestContext::new();
    let (_, token) = ctx.seller("Selam", "selam@example.com").await;

    let on_sale = ctx.list_product(&token, "Kemis", "80", "100").await;
    let not_on_sale = ctx.list_product(&token, "Netela", "100", "100").await;

    assert_eq!(single(&ctx, on_sale).await["original_price"], 100.0);
    assert!(single(&ctx, not_on_sale).await["original_price"].is_null());

    // a price raise without a new original price ends the sale
    let (status, body) = update(&ctx, &token, on_sale, json!({ "price": 90 })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["product"]["original_price"].is_null());

    let (_, body) = update(
        &ctx,
        &token,
        on_sale,
        json!({ "price": 90, "original_price": 120 }),
    )
    .await;
    assert_eq!(body["product"]["original_price"], 120.0);

    let (_, body) = update(
        &ctx,
        &token,
        on_sale,
        json!({ "price": 130, "original_price": 120 }),
    )
    .await;
    assert_eq!(body["product"]["price"], 130.0);
    assert!(body["product"]["original_price"].is_null());
}

#[tokio::test]
async fn test_sellers_only_touch_their_own_products() {
    let ctx = TestContext::new();
    let (_, owner) = ctx.seller("Selam", "selam@example.com").await;
    let (_, rival) = ctx.seller("Hana", "hana@example.com").await;
    let id = ctx.list_product(&owner, "Kemis", "100", "").await;

    let (status, _) = update(&ctx, &rival, id, json!({ "name": "Stolen" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let delete = ctx
        .send(
            Method::DELETE,
            &format!("/api/product/user/delete/{id}"),
            Some(&rival),
            None,
        )
        .await;
    assert_eq!(delete.status, StatusCode::FORBIDDEN);

    let (status, body) = update(&ctx, &owner, id, json!({ "name": "Kemis Deluxe" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["product"]["name"], "Kemis Deluxe");

    let delete = ctx
        .send(
            Method::DELETE,
            &format!("/api/product/user/delete/{id}"),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(delete.status, StatusCode::OK);

    let single = ctx
        .post("/api/product/single", None, json!({ "productId": id }))
        .await;
    assert_eq!(single.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_removes_any_product() {
    let ctx = TestContext::new();
    let (seller_id, token) = ctx.seller("Selam", "selam@example.com").await;
    let admin = ctx.admin_token().await;
    let id = ctx.list_product(&token, "Kemis", "100", "").await;

    let by_user = ctx
        .get(
            &format!("/api/product/list-by-user/{seller_id}"),
            Some(&admin),
        )
        .await;
    assert_eq!(by_user.body["products"].as_array().unwrap().len(), 1);

    let removed = ctx
        .post("/api/product/remove", Some(&admin), json!({ "id": id }))
        .await;
    assert_eq!(removed.status, StatusCode::OK);
    assert!(
        ctx.get("/api/product/list", None).await.body["products"]
            .as_array()
            .unwrap()
            .is_empty()
    );
}
