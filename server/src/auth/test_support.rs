//! Fixtures and deterministic fakes for the auth tests.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, encode};
use serde_json::{Value, json};

use crate::auth::{
    AuthEvent, AuthObserver, ClientMeta, ExchangeError, KeySetError, KeySource, TokenExchange,
    TokenResponse,
};

pub(crate) const ISSUER: &str = "https://tenant.example/";
pub(crate) const CLIENT_ID: &str = "client-123";
pub(crate) const KID: &str = "test-key";
pub(crate) const JWKS: &str = include_str!("../../fixtures/test-keys/jwks.json");

/// A plain client with the process-wide TLS provider installed.
pub(crate) fn http_client() -> reqwest::Client {
    crate::init_rustls();
    reqwest::Client::new()
}

const PRIVATE_PEM: &str = include_str!("../../fixtures/test-keys/rsa-private.pem");
const WRONG_PEM: &str = include_str!("../../fixtures/test-keys/wrong-key-private.pem");

/// Claims for `auth0|alice`, expiring `exp_offset` seconds from now.
pub(crate) fn claims(exp_offset: i64) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "sub": "auth0|alice",
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "iat": now,
        "exp": now + exp_offset,
        "email": "alice@example.com",
        "name": "Alice"
    })
}

fn sign_with(pem: &str, claims: &Value, kid: Option<&str>) -> String {
    let header = Header {
        kid: kid.map(str::to_string),
        ..Header::new(Algorithm::RS256)
    };
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
    )
    .unwrap()
}

/// Signs with the key published in the fixture key set.
pub(crate) fn sign(claims: &Value, kid: Option<&str>) -> String {
    sign_with(PRIVATE_PEM, claims, kid)
}

/// Signs with a key the provider never published.
pub(crate) fn sign_with_wrong_key(claims: &Value, kid: Option<&str>) -> String {
    sign_with(WRONG_PEM, claims, kid)
}

/// Public half of the fixture signing key.
pub(crate) fn decoding_key() -> DecodingKey {
    let jwks: Value = serde_json::from_str(JWKS).unwrap();
    let key = jwks["keys"]
        .as_array()
        .unwrap()
        .iter()
        .find(|k| k["kid"] == KID)
        .unwrap();
    DecodingKey::from_rsa_components(key["n"].as_str().unwrap(), key["e"].as_str().unwrap())
        .unwrap()
}

/// Key source backed by a fixed map.
pub(crate) struct StaticKeys(HashMap<String, DecodingKey>);

impl StaticKeys {
    pub(crate) fn fixture() -> Self {
        Self(HashMap::from([(KID.to_string(), decoding_key())]))
    }
}

#[async_trait]
impl KeySource for StaticKeys {
    async fn key_for(&self, kid: &str) -> Result<Option<DecodingKey>, KeySetError> {
        Ok(self.0.get(kid).cloned())
    }
}

enum Outcome {
    Token(String),
    Fail(fn() -> ExchangeError),
}

/// Token exchange that answers every code the same way and counts calls.
pub(crate) struct FakeExchange {
    outcome: Outcome,
    calls: AtomicUsize,
    last_code: Mutex<Option<String>>,
}

impl FakeExchange {
    pub(crate) fn token(id_token: String) -> Self {
        Self::with(Outcome::Token(id_token))
    }

    pub(crate) fn failing(error: fn() -> ExchangeError) -> Self {
        Self::with(Outcome::Fail(error))
    }

    fn with(outcome: Outcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
            last_code: Mutex::new(None),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_code(&self) -> Option<String> {
        self.last_code.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenExchange for FakeExchange {
    async fn exchange(&self, code: &str) -> Result<TokenResponse, ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_code.lock().unwrap() = Some(code.to_string());
        match self.outcome {
            Outcome::Token(ref id_token) => Ok(TokenResponse {
                access_token: "access".to_string(),
                expires_in: Some(86_400),
                id_token: id_token.clone(),
                token_type: "Bearer".to_string(),
            }),
            Outcome::Fail(make) => Err(make()),
        }
    }
}

/// Remembers the names of observed events.
#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<&'static str>>,
}

impl RecordingObserver {
    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl AuthObserver for RecordingObserver {
    fn observe(&self, event: &AuthEvent<'_>, _client: &ClientMeta) {
        self.events.lock().unwrap().push(event.name());
    }
}
