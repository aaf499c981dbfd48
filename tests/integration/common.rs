use core::time::Duration;
use std::{collections::HashMap, path::Path};

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::{Client, Response, header::SET_COOKIE, redirect::Policy};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle, time::Instant};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

use sessiongate_server::{app, config::GatewayConfig};

pub const CLIENT_ID: &str = "it-client";
pub const KID: &str = "test-key";
const JWKS: &str = include_str!("../../server/fixtures/test-keys/jwks.json");
const PRIVATE_PEM: &str = include_str!("../../server/fixtures/test-keys/rsa-private.pem");

pub fn get_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("failed to bind to address")
        .local_addr()
        .unwrap()
        .port()
}

/// Block until a TCP listener is accepting on `127.0.0.1:port` or timeout.
pub async fn wait_for_listening(port: u16, timeout_secs: u64) {
    let start = Instant::now();
    while tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err() {
        assert!(
            start.elapsed() <= Duration::from_secs(timeout_secs),
            "server did not start within timeout"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Mock identity provider serving the fixture key set.
pub async fn start_idp() -> MockServer {
    let idp = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("cache-control", "public, max-age=600")
                .set_body_raw(JWKS, "application/json"),
        )
        .mount(&idp)
        .await;
    idp
}

/// The `iss` the gateway expects for tokens from `idp`.
pub fn issuer(idp: &MockServer) -> String {
    format!("{}/", idp.uri())
}

/// A signed identity token for `auth0|alice`, with `overrides` merged into the claims.
pub fn id_token(idp: &MockServer, overrides: &Value) -> String {
    let now = Utc::now().timestamp();
    let mut claims = json!({
        "sub": "auth0|alice",
        "iss": issuer(idp),
        "aud": CLIENT_ID,
        "iat": now,
        "exp": now + 3600,
        "email": "alice@example.com",
        "name": "Alice",
        "nonce": "ignored",
    });
    if let (Some(base), Some(extra)) = (claims.as_object_mut(), overrides.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    let header = Header {
        kid: Some(KID.to_string()),
        ..Header::new(Algorithm::RS256)
    };
    encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(PRIVATE_PEM.as_bytes()).unwrap(),
    )
    .unwrap()
}

/// A gateway running in-process against `idp`. Shuts down when dropped.
pub struct Gateway {
    pub port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<eyre::Result<()>>,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            drop(tx.send(()));
        }
        self.handle.abort();
    }
}

pub fn gateway_config(idp: &MockServer, port: u16, extra: &str) -> String {
    format!(
        r#"
        [server]
        port = {port}
        bind = "127.0.0.1"

        [idp]
        domain = "{domain}"
        client_id = "{CLIENT_ID}"
        client_secret = "it-secret"
        callback_url = "http://127.0.0.1:{port}/auth/callback"

        [login]
        return_hosts = ["127.0.0.1"]
        default_return_url = "http://127.0.0.1:{port}/"

        {extra}
        "#,
        domain = idp.uri(),
    )
}

/// Starts the gateway on a free port with the given config.
pub async fn spawn_gateway(idp: &MockServer, extra: &str) -> Gateway {
    sessiongate_server::init_rustls();
    let port = get_free_port();
    let config: GatewayConfig = toml::from_str(&gateway_config(idp, port, extra)).unwrap();
    let state = app::AppState::from_config(&config, Path::new("/tmp/sessiongate-it.toml"))
        .await
        .unwrap();
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(app::serve(listener, state, async move {
        drop(rx.await);
    }));
    wait_for_listening(port, 10).await;
    Gateway {
        port,
        shutdown: Some(tx),
        handle,
    }
}

/// HTTP client that leaves redirects and cookies to the test.
pub fn browser() -> Client {
    sessiongate_server::init_rustls();
    Client::builder().redirect(Policy::none()).build().unwrap()
}

/// `name -> value` of every cookie set by `resp`.
pub fn set_cookies(resp: &Response) -> HashMap<String, String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|c| c.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn location(resp: &Response) -> String {
    resp.headers()[reqwest::header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

/// Query parameter `name` of the absolute URL `url`.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
