use reqwest::{StatusCode, header::COOKIE};
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

use crate::common::{
    Gateway, browser, id_token, location, query_param, set_cookies, spawn_gateway, start_idp,
};

/// Runs login and then the callback with `code`, returning the callback response.
async fn login_then_callback(gateway: &Gateway) -> reqwest::Response {
    let client = browser();
    let resp = client.get(gateway.url("/auth/login")).send().await.unwrap();
    let state = query_param(&location(&resp), "state").unwrap();
    let state_cookie = format!("statecookie={}", set_cookies(&resp)["statecookie"]);
    client
        .get(gateway.url(&format!("/auth/callback?code=c0de&state={state}")))
        .header(COOKIE, state_cookie)
        .send()
        .await
        .unwrap()
}

async fn token_endpoint(idp: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(response)
        .mount(idp)
        .await;
}

#[tokio::test]
async fn foreign_return_url_is_rejected() {
    let idp = start_idp().await;
    let gateway = spawn_gateway(&idp, "").await;
    let resp = browser()
        .get(gateway.url("/auth/login"))
        .query(&[("return_url", "https://evil.example/")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(set_cookies(&resp).is_empty());
}

#[tokio::test]
async fn state_mismatch_is_rejected_without_exchange() {
    let idp = start_idp().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&idp)
        .await;
    let gateway = spawn_gateway(&idp, "").await;
    let client = browser();
    let resp = client.get(gateway.url("/auth/login")).send().await.unwrap();
    let state_cookie = format!("statecookie={}", set_cookies(&resp)["statecookie"]);
    let resp = client
        .get(gateway.url("/auth/callback?code=c0de&state=forged"))
        .header(COOKIE, state_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.unwrap(), "illegal state value");
}

#[tokio::test]
async fn token_endpoint_failure_is_bad_gateway() {
    let idp = start_idp().await;
    token_endpoint(
        &idp,
        ResponseTemplate::new(403).set_body_json(json!({"error": "invalid_grant"})),
    )
    .await;
    let gateway = spawn_gateway(&idp, "").await;
    let resp = login_then_callback(&gateway).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert!(!set_cookies(&resp).contains_key("session"));
}

#[tokio::test]
async fn token_from_another_issuer_is_not_accepted() {
    let idp = start_idp().await;
    token_endpoint(
        &idp,
        ResponseTemplate::new(200).set_body_json(json!({
            "id_token": id_token(&idp, &json!({"iss": "https://other.example/"})),
        })),
    )
    .await;
    let gateway = spawn_gateway(&idp, "").await;
    let resp = login_then_callback(&gateway).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.text().await.unwrap(), "token verification failed");
}

#[tokio::test]
async fn unlisted_user_is_not_recognized() {
    let idp = start_idp().await;
    token_endpoint(
        &idp,
        ResponseTemplate::new(200).set_body_json(json!({
            "id_token": id_token(&idp, &json!({})),
        })),
    )
    .await;
    let gateway = spawn_gateway(&idp, "[users]\nallow = [\"bob@example.com\"]").await;
    let resp = login_then_callback(&gateway).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.text().await.unwrap(), "user not recognized");
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let idp = start_idp().await;
    let gateway = spawn_gateway(&idp, "").await;
    let client = browser();
    let resp = client.get(gateway.url("/api/me")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.text().await.unwrap(), "session cookie not found");

    let resp = client.post(gateway.url("/auth/logout")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
