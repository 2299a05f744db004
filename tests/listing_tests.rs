// tests/listing_tests.rs

mod common;

use common::{TestApp, listing_body, spawn_app, unique_email};
use serde_json::{Value, json};

async fn search(app: &TestApp, query: &str, campus: Option<&str>) -> Vec<Value> {
    let mut request = app.client.get(app.url(&format!("/listings{query}")));
    if let Some(campus) = campus {
        request = request.header("X-Campus", campus);
    }
    let response = request.send().await.expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    body["items"].as_array().unwrap().clone()
}

fn ids(items: &[Value]) -> Vec<i64> {
    items.iter().map(|l| l["id"].as_i64().unwrap()).collect()
}

#[tokio::test]
async fn creating_a_listing_requires_login_and_sets_the_seller() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/listings"))
        .json(&listing_body("Desk", "Furniture", "40.00"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let (seller_id, token) = app.signed_in_user(&unique_email()).await;

    let mut body = listing_body("Desk", "Furniture", "40.00");
    body["seller_id"] = json!(seller_id + 100);
    body["type"] = json!("rent");
    body["description"] = json!("Sturdy <script>alert(1)</script><b>oak</b>");
    body["image_urls"] = json!([
        "https://cdn.campus.test/desk-1.jpg",
        "https://cdn.campus.test/desk-2.jpg"
    ]);

    let response = app
        .client
        .post(app.url("/listings"))
        .bearer_auth(&token)
        .header("X-Campus", "North Campus")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let listing: Value = response.json().await.unwrap();

    assert_eq!(listing["seller_id"], seller_id);
    assert_eq!(listing["status"], "available");
    assert_eq!(listing["type"], "rent");
    assert_eq!(listing["campus"], "North Campus");
    assert_eq!(listing["price"], "40.00");
    assert_eq!(listing["description"], "Sturdy <b>oak</b>");
    assert_eq!(listing["images"][0]["is_primary"], true);
    assert_eq!(listing["images"][1]["is_primary"], false);

    let response = app
        .client
        .get(app.url(&format!("/listings/{}", listing["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn invalid_listing_payloads_are_rejected() {
    let app = spawn_app().await;
    let (_, token) = app.signed_in_user(&unique_email()).await;

    let cases = [
        listing_body("", "Books", "10.00"),
        listing_body("   ", "Books", "10.00"),
        listing_body("Book", " \t ", "10.00"),
        listing_body("Book", "Books", "-1.00"),
        listing_body("Book", "Books", "100000000000"),
        json!({ "title": "Book", "description": "x", "price": "1.00", "category": "Books", "condition": "mint" }),
    ];
    for body in cases {
        let response = app
            .client
            .post(app.url("/listings"))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400, "payload {body}");
    }

    let response = app
        .client
        .post(app.url("/listings"))
        .bearer_auth(&token)
        .header("X-Campus", "x".repeat(101))
        .json(&listing_body("Book", "Books", "10.00"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let listing = app.create_listing(&token, listing_body("Lamp", "Furniture", "9999999999.99")).await;
    assert_eq!(listing["price"], "9999999999.99");

    let response = app
        .client
        .patch(app.url(&format!("/listings/{}", listing["id"])))
        .bearer_auth(&token)
        .json(&json!({ "title": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn sellers_cannot_order_their_own_listing() {
    let app = spawn_app().await;
    let (_, seller) = app.signed_in_user(&unique_email()).await;
    let listing = app.create_listing(&seller, listing_body("Kettle", "Kitchen", "12.00")).await;
    let id = listing["id"].as_i64().unwrap();

    let response = app
        .client
        .post(app.url(&format!("/listings/{id}/order")))
        .bearer_auth(&seller)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let stored = app.state.listings.find_listing(id).await.unwrap().unwrap();
    assert_eq!(stored.status.as_str(), "available");
}

#[tokio::test]
async fn search_filters_combine() {
    let app = spawn_app().await;
    let (_, token) = app.signed_in_user(&unique_email()).await;

    let calculus = app.create_listing(&token, listing_body("Calculus Textbook", "Books", "25.00")).await;
    let novel = app.create_listing(&token, listing_body("Mystery Novel", "Books", "8.00")).await;
    let mut lamp_body = listing_body("Desk Lamp", "Furniture", "15.00");
    lamp_body["condition"] = json!("like_new");
    let lamp = app.create_listing(&token, lamp_body).await;

    // Newest first
    assert_eq!(
        ids(&search(&app, "", None).await),
        vec![lamp["id"].as_i64().unwrap(), novel["id"].as_i64().unwrap(), calculus["id"].as_i64().unwrap()]
    );

    let books = search(&app, "?category=Books", None).await;
    assert_eq!(books.len(), 2);

    let found = search(&app, "?search=CALCULUS", None).await;
    assert_eq!(ids(&found), vec![calculus["id"].as_i64().unwrap()]);

    let priced = search(&app, "?category=Books&min_price=10&max_price=25", None).await;
    assert_eq!(ids(&priced), vec![calculus["id"].as_i64().unwrap()]);

    let like_new = search(&app, "?condition=like_new", None).await;
    assert_eq!(ids(&like_new), vec![lamp["id"].as_i64().unwrap()]);

    assert!(search(&app, "?type=rent", None).await.is_empty());

    let page = search(&app, "?limit=1&offset=1", None).await;
    assert_eq!(ids(&page), vec![novel["id"].as_i64().unwrap()]);
}

#[tokio::test]
async fn campus_header_scopes_search() {
    let app = spawn_app().await;
    let (_, token) = app.signed_in_user(&unique_email()).await;

    for campus in ["North", "South"] {
        let response = app
            .client
            .post(app.url("/listings"))
            .bearer_auth(&token)
            .header("X-Campus", campus)
            .json(&listing_body("Bike", "Sports", "60.00"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
    }

    let north = search(&app, "", Some("North")).await;
    assert_eq!(north.len(), 1);
    assert_eq!(north[0]["campus"], "North");
    assert_eq!(search(&app, "", None).await.len(), 2);
}

#[tokio::test]
async fn only_the_owner_may_change_a_listing() {
    let app = spawn_app().await;
    let (_, owner) = app.signed_in_user(&unique_email()).await;
    let (_, stranger) = app.signed_in_user(&unique_email()).await;

    let listing = app.create_listing(&owner, listing_body("Chair", "Furniture", "12.00")).await;
    let path = format!("/listings/{}", listing["id"]);

    let response = app
        .client
        .patch(app.url(&path))
        .bearer_auth(&stranger)
        .json(&json!({ "price": "1.00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .client
        .delete(app.url(&path))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .client
        .patch(app.url(&format!("{path}/status")))
        .bearer_auth(&stranger)
        .json(&json!({ "status": "sold" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .client
        .patch(app.url(&path))
        .bearer_auth(&owner)
        .json(&json!({ "price": "10.50", "title": "Office Chair" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["price"], "10.50");
    assert_eq!(updated["title"], "Office Chair");
    assert_eq!(updated["category"], "Furniture");
}

#[tokio::test]
async fn status_changes_accept_only_known_values() {
    let app = spawn_app().await;
    let (_, owner) = app.signed_in_user(&unique_email()).await;
    let listing = app.create_listing(&owner, listing_body("Kettle", "Kitchen", "9.00")).await;
    let path = format!("/listings/{}/status", listing["id"]);

    let response = app
        .client
        .patch(app.url(&path))
        .bearer_auth(&owner)
        .json(&json!({ "status": "broken" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    for status in ["sold", "available", "reserved", "reserved"] {
        let response = app
            .client
            .patch(app.url(&path))
            .bearer_auth(&owner)
            .json(&json!({ "status": status }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], status);
    }

    // Reserved listings drop out of search
    assert!(search(&app, "", None).await.is_empty());
}

#[tokio::test]
async fn soft_deleted_listings_disappear_but_orders_survive() {
    let app = spawn_app().await;
    let (seller_id, seller) = app.signed_in_user(&unique_email()).await;
    let (buyer_id, buyer) = app.signed_in_user(&unique_email()).await;

    let listing = app.create_listing(&seller, listing_body("Monitor", "Electronics", "80.00")).await;
    let id = listing["id"].as_i64().unwrap();

    let response = app
        .client
        .post(app.url(&format!("/listings/{id}/order")))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let response = app
        .client
        .delete(app.url(&format!("/listings/{id}")))
        .bearer_auth(&seller)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    assert!(search(&app, "", None).await.is_empty());
    let response = app
        .client
        .get(app.url(&format!("/listings/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // The row is still there for the order to point at
    let stored = app.state.listings.find_listing(id).await.unwrap().unwrap();
    assert!(!stored.is_active);

    let response = app
        .client
        .get(app.url("/profile/transactions"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["listing_id"], id);
    assert_eq!(items[0]["buyer_id"], buyer_id);
    assert_eq!(items[0]["seller_id"], seller_id);
    assert_eq!(items[0]["amount"], "80.00");
    assert_eq!(items[0]["role"], "buyer");

    let response = app
        .client
        .get(app.url("/profile/transactions"))
        .bearer_auth(&seller)
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["items"][0]["role"], "seller");
}

#[tokio::test]
async fn related_listings_share_a_category() {
    let app = spawn_app().await;
    let (_, token) = app.signed_in_user(&unique_email()).await;

    let base = app.create_listing(&token, listing_body("Guitar", "Music", "100.00")).await;
    let mut same = Vec::new();
    for title in ["Drum", "Piano", "Violin", "Flute"] {
        let l = app.create_listing(&token, listing_body(title, "Music", "50.00")).await;
        same.push(l["id"].as_i64().unwrap());
    }
    app.create_listing(&token, listing_body("Tent", "Outdoors", "30.00")).await;

    let response = app
        .client
        .get(app.url(&format!("/listings/{}/related", base["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    let related = ids(body["items"].as_array().unwrap());

    assert_eq!(related, same[..3].to_vec());
    assert!(!related.contains(&base["id"].as_i64().unwrap()));
}

#[tokio::test]
async fn wishlist_toggle_is_an_involution() {
    let app = spawn_app().await;
    let (_, token) = app.signed_in_user(&unique_email()).await;
    let listing = app.create_listing(&token, listing_body("Backpack", "Bags", "20.00")).await;
    let path = format!("/listings/{}/wishlist", listing["id"]);

    let mut flags = Vec::new();
    for _ in 0..3 {
        let response = app
            .client
            .post(app.url(&path))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        flags.push(body["wishlisted"].as_bool().unwrap());

        let saved: Value = app
            .client
            .get(app.url("/wishlist"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(saved["items"].as_array().unwrap().len(), usize::from(*flags.last().unwrap()));
    }
    assert_eq!(flags, vec![true, false, true]);
}

#[tokio::test]
async fn a_listing_can_only_be_ordered_once() {
    let app = spawn_app().await;
    let (_, seller) = app.signed_in_user(&unique_email()).await;
    let (_, buyer) = app.signed_in_user(&unique_email()).await;
    let listing = app.create_listing(&seller, listing_body("Bike", "Sports", "60.00")).await;
    let path = format!("/listings/{}/order", listing["id"]);

    let requests = (0..5).map(|_| {
        app.client
            .post(app.url(&path))
            .bearer_auth(&buyer)
            .send()
    });
    let responses = run_concurrently(requests).await;

    let statuses: Vec<u16> = responses
        .into_iter()
        .map(|r| r.expect("Failed to execute request").status().as_u16())
        .collect();
    assert_eq!(statuses.iter().filter(|s| **s == 201).count(), 1);
    assert_eq!(statuses.iter().filter(|s| **s == 409).count(), 4);

    let stored = app
        .state
        .listings
        .find_listing(listing["id"].as_i64().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status.as_str(), "reserved");

    let response = app
        .client
        .post(app.url("/listings/999999/order"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

/// Runs the requests concurrently on the test runtime.
async fn run_concurrently<F>(requests: impl Iterator<Item = F>) -> Vec<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handles: Vec<_> = requests.map(tokio::spawn).collect();
    let mut outputs = Vec::with_capacity(handles.len());
    for handle in handles {
        outputs.push(handle.await.expect("request task panicked"));
    }
    outputs
}

#[tokio::test]
async fn reviews_reports_and_offers_are_recorded() {
    let app = spawn_app().await;
    let (_, seller) = app.signed_in_user(&unique_email()).await;
    let (_, buyer) = app.signed_in_user(&unique_email()).await;
    let listing = app.create_listing(&seller, listing_body("Camera", "Electronics", "150.00")).await;
    let id = listing["id"].as_i64().unwrap();

    let post = |path: String, body: Value| {
        app.client
            .post(app.url(&path))
            .bearer_auth(&buyer)
            .json(&body)
            .send()
    };

    let response = post(format!("/listings/{id}/review"), json!({ "rating": 6 })).await.unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["errors"]["rating"].is_array());

    let response = post(
        format!("/listings/{id}/review"),
        json!({ "rating": 5, "comment": "Great seller" }),
    )
    .await
    .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);

    for reason in ["", "   "] {
        let response = post(format!("/listings/{id}/report"), json!({ "reason": reason }))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    let response = post(
        format!("/listings/{id}/report"),
        json!({ "reason": "spam", "details": "Posted five times" }),
    )
    .await
    .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    for amount in ["0", "100000000000"] {
        let response = post(format!("/listings/{id}/offer"), json!({ "amount": amount }))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400, "amount {amount}");
    }

    let response = post(
        format!("/listings/{id}/offer"),
        json!({ "amount": "120.00", "message": "Cash today?" }),
    )
    .await
    .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Offer sent to seller");

    // An offer does not reserve anything
    let stored = app.state.listings.find_listing(id).await.unwrap().unwrap();
    assert_eq!(stored.status.as_str(), "available");

    let response = post("/listings/999999/review".to_string(), json!({ "rating": 3 })).await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
}
