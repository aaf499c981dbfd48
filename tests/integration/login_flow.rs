use reqwest::{StatusCode, header::COOKIE};
use serde_json::{Value, json};
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

use crate::common::{
    CLIENT_ID, browser, id_token, location, query_param, set_cookies, spawn_gateway, start_idp,
};

#[tokio::test]
async fn login_callback_api_and_logout() {
    let idp = start_idp().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_partial_json(json!({
            "grant_type": "authorization_code",
            "client_id": CLIENT_ID,
            "client_secret": "it-secret",
            "code": "the-code",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "opaque-access",
            "id_token": id_token(&idp, &json!({})),
            "token_type": "Bearer",
            "expires_in": 86400,
        })))
        .expect(1)
        .mount(&idp)
        .await;
    let gateway = spawn_gateway(&idp, "").await;
    let client = browser();

    // login: redirect to the provider with a fresh state and a state cookie
    let return_url = gateway.url("/dashboard?tab=2");
    let resp = client
        .get(gateway.url("/auth/login"))
        .query(&[("return_url", return_url.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let authorize = location(&resp);
    assert!(authorize.starts_with(&format!("{}/authorize?", idp.uri())));
    assert_eq!(query_param(&authorize, "response_type").as_deref(), Some("code"));
    assert_eq!(query_param(&authorize, "client_id").as_deref(), Some(CLIENT_ID));
    assert_eq!(
        query_param(&authorize, "scope").as_deref(),
        Some("openid profile email")
    );
    assert_eq!(
        query_param(&authorize, "redirect_uri"),
        Some(gateway.url("/auth/callback"))
    );
    let state = query_param(&authorize, "state").unwrap();
    assert_eq!(state.len(), 32, "16 random bytes, hex encoded");
    let state_cookie = format!("statecookie={}", set_cookies(&resp)["statecookie"]);

    // callback: session established, browser sent back to the return url
    let callback = gateway.url(&format!("/auth/callback?code=the-code&state={state}"));
    let resp = client
        .get(&callback)
        .header(COOKIE, &state_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), return_url);
    let cookies = set_cookies(&resp);
    assert_eq!(cookies["statecookie"], "", "state cookie is cleared");
    let session_cookie = format!("session={}", cookies["session"]);
    let xsrf_token = cookies["xsrf-token"].clone();
    assert_eq!(xsrf_token.len(), 64, "32 random bytes, hex encoded");

    // the session resolves to the verified principal
    let resp = client
        .get(gateway.url("/api/me"))
        .header(COOKIE, &session_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let me: Value = resp.json().await.unwrap();
    assert_eq!(me["user"]["subject"], "auth0|alice");
    assert_eq!(me["user"]["email"], "alice@example.com");
    assert!(me["user"]["profile"].get("nonce").is_none(), "protocol claims dropped");

    // the same state cannot be used twice
    let resp = client
        .get(&callback)
        .header(COOKIE, &state_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // logout needs the xsrf header matching the cookie
    let both = format!("{session_cookie}; xsrf-token={xsrf_token}");
    let resp = client
        .post(gateway.url("/auth/logout"))
        .header(COOKIE, &both)
        .header("x-xsrf-token", "not-the-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .post(gateway.url("/auth/logout"))
        .header(COOKIE, &both)
        .header("x-xsrf-token", &xsrf_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), gateway.url("/"));

    let resp = client
        .get(gateway.url("/api/me"))
        .header(COOKIE, &session_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.text().await.unwrap(), "session timed out or not found");
}

#[tokio::test]
async fn health_check_needs_no_session() {
    let idp = start_idp().await;
    let gateway = spawn_gateway(&idp, "").await;
    let resp = browser().get(gateway.url("/healthz")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(resp.text().await.unwrap(), "ok");
}
