// tests/common/mod.rs
//
// Shared harness: the real router on a random port, backed by the in-memory
// stores and a mailer that records every message instead of sending it.

#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use campus_market::{
    config::Config,
    routes,
    state::AppState,
    utils::email::{EmailClient, EmailError},
};
use serde_json::{Value, json};

pub const BASE_URL: &str = "http://campus.test";
pub const PASSWORD: &str = "Secret123";

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub recipient: String,
    pub subject: String,
    pub content: String,
}

#[derive(Default)]
pub struct RecordingEmailClient {
    sent: Mutex<Vec<SentEmail>>,
    delay: Mutex<Duration>,
}

impl RecordingEmailClient {
    /// Makes every later send take this long, like a slow mail API.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Waits up to two seconds for a message sent in the background.
    pub async fn wait_for(&self, recipient: &str, subject: &str) -> SentEmail {
        for _ in 0..40 {
            if let Some(mail) = self
                .sent_to(recipient)
                .into_iter()
                .rev()
                .find(|m| m.subject == subject)
            {
                return mail;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("no '{subject}' email sent to {recipient}")
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<SentEmail> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.recipient == recipient)
            .cloned()
            .collect()
    }

    /// Most recent message to `recipient` with the given subject.
    pub fn last(&self, recipient: &str, subject: &str) -> SentEmail {
        self.sent_to(recipient)
            .into_iter()
            .rev()
            .find(|m| m.subject == subject)
            .unwrap_or_else(|| panic!("no '{subject}' email sent to {recipient}"))
    }
}

#[async_trait]
impl EmailClient for RecordingEmailClient {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        content: &str,
    ) -> Result<(), EmailError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push(SentEmail {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }
}

pub struct TestApp {
    pub address: String,
    pub state: AppState,
    pub mailer: Arc<RecordingEmailClient>,
    pub client: reqwest::Client,
}

pub fn test_config() -> Config {
    Config {
        database_url: None,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        refresh_expiration: 3600,
        verification_token_ttl: 3600,
        public_base_url: BASE_URL.to_string(),
        mail: None,
        app_addr: "127.0.0.1:0".to_string(),
        rust_log: "error".to_string(),
    }
}

/// Spawns the app on a random port and returns a handle to it.
pub async fn spawn_app() -> TestApp {
    let mailer = Arc::new(RecordingEmailClient::default());
    let state = AppState::in_memory(test_config(), mailer.clone());

    let app = routes::create_router(state.clone());

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    // Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        state,
        mailer,
        client: reqwest::Client::new(),
    }
}

/// Turns an emailed link into a URL on the test server.
pub fn link_path(content: &str) -> String {
    let start = content
        .find(BASE_URL)
        .expect("email does not contain a link");
    content[start + BASE_URL.len()..]
        .split_whitespace()
        .next()
        .unwrap()
        .to_string()
}

/// The trailing 6-digit code of a login-code email.
pub fn code_from(content: &str) -> String {
    let code = content.trim().rsplit(' ').next().unwrap().to_string();
    assert_eq!(code.len(), 6, "unexpected code email: {content}");
    code
}

pub fn unique_email() -> String {
    format!("student-{}@campus.edu", &uuid::Uuid::new_v4().to_string()[..8])
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn register(&self, email: &str) -> reqwest::Response {
        self.post_json(
            "/register",
            &json!({
                "email": email,
                "password": PASSWORD,
                "confirm_password": PASSWORD,
            }),
        )
        .await
    }

    /// Follows the verification link from the most recent registration email.
    pub async fn verify(&self, email: &str) -> reqwest::Response {
        let mail = self.mailer.last(email, "Verify your email");
        self.client
            .get(self.url(&link_path(&mail.content)))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Login step 1. Returns the two-factor token.
    pub async fn start_login(&self, email: &str, password: &str) -> String {
        let response = self
            .post_json("/login", &json!({ "email": email, "password": password }))
            .await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        body["two_factor_token"].as_str().unwrap().to_string()
    }

    pub fn last_code(&self, email: &str) -> String {
        code_from(&self.mailer.last(email, "Your login code").content)
    }

    pub async fn submit_code(&self, two_factor_token: &str, code: &str) -> reqwest::Response {
        self.client
            .post(self.url("/2fa"))
            .bearer_auth(two_factor_token)
            .json(&json!({ "code": code }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Register, verify and complete both login steps. Returns (user id, access token).
    pub async fn signed_in_user(&self, email: &str) -> (i64, String) {
        assert_eq!(self.register(email).await.status().as_u16(), 201);
        assert_eq!(self.verify(email).await.status().as_u16(), 200);

        let two_factor_token = self.start_login(email, PASSWORD).await;
        let code = self.last_code(email);
        let response = self.submit_code(&two_factor_token, &code).await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        let access_token = body["access_token"].as_str().unwrap().to_string();

        let user = self
            .state
            .users
            .find_by_email(email)
            .await
            .unwrap()
            .expect("user exists");
        (user.id, access_token)
    }

    /// Creates a listing as `token` and returns its JSON.
    pub async fn create_listing(&self, token: &str, body: Value) -> Value {
        let response = self
            .client
            .post(self.url("/listings"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }
}

pub fn listing_body(title: &str, category: &str, price: &str) -> Value {
    json!({
        "title": title,
        "description": format!("{title} in great shape"),
        "price": price,
        "category": category,
        "condition": "good",
    })
}
