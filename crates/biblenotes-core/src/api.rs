//! HTTP client for the notes backend.
//!
//! Plain request/response JSON with a bearer token; no retry or backoff.
//! Callers catch errors and degrade to an empty-state render.

use anyhow::{anyhow, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::model::{
    ChapterData, ConcordanceResponse, ManuscriptChapter, ManuscriptEditionsResponse, Note,
    NoteCreate, NotesResponse, NoteUpdate, SubscriptionsResponse, Token, UserProfile, Version,
};

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.detail)
                .map(|detail| match detail {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_else(|| status.to_string());
            return Err(anyhow!("{}: {}", status.as_u16(), message));
        }
        Ok(response.json().await?)
    }

    async fn send_no_body(&self, builder: RequestBuilder) -> Result<()> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("request failed with status {}", status));
        }
        Ok(())
    }

    fn encode(segment: &str) -> String {
        // Book names carry spaces ("1 Corinthians"); everything else in our
        // path segments is already URL-safe
        segment.replace(' ', "%20")
    }

    pub async fn fetch_versions(&self) -> Result<Vec<Version>> {
        self.send(self.request(Method::GET, "/bible/versions")).await
    }

    pub async fn fetch_chapter(
        &self,
        version: &str,
        book: &str,
        chapter: u32,
    ) -> Result<ChapterData> {
        let path = format!(
            "/bible/{}/{}/{}",
            Self::encode(version),
            Self::encode(book),
            chapter
        );
        self.send(self.request(Method::GET, &path)).await
    }

    pub async fn signup(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<Token> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "display_name": display_name,
        });
        self.send(self.request(Method::POST, "/auth/signup").json(&body))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Token> {
        let body = serde_json::json!({ "email": email, "password": password });
        self.send(self.request(Method::POST, "/auth/login").json(&body))
            .await
    }

    pub async fn fetch_my_profile(&self) -> Result<UserProfile> {
        self.send(self.request(Method::GET, "/users/me/profile")).await
    }

    pub async fn fetch_my_notes(&self) -> Result<NotesResponse> {
        self.send(self.request(Method::GET, "/notes/me")).await
    }

    pub async fn create_note(&self, note: &NoteCreate) -> Result<Note> {
        self.send(self.request(Method::POST, "/notes").json(note))
            .await
    }

    pub async fn update_note(&self, note_id: i64, update: &NoteUpdate) -> Result<Note> {
        let path = format!("/notes/{note_id}");
        self.send(self.request(Method::PUT, &path).json(update)).await
    }

    pub async fn fetch_author_notes(&self, author_id: i64) -> Result<NotesResponse> {
        let path = format!("/notes/authors/{author_id}");
        self.send(self.request(Method::GET, &path)).await
    }

    pub async fn fetch_note_subscriptions(&self) -> Result<SubscriptionsResponse> {
        self.send(self.request(Method::GET, "/notes/subscriptions"))
            .await
    }

    pub async fn subscribe_author(&self, author_id: i64) -> Result<()> {
        let path = format!("/notes/subscriptions/{author_id}");
        self.send_no_body(self.request(Method::POST, &path)).await
    }

    pub async fn unsubscribe_author(&self, author_id: i64) -> Result<()> {
        let path = format!("/notes/subscriptions/{author_id}");
        self.send_no_body(self.request(Method::DELETE, &path)).await
    }

    pub async fn fetch_concordance(
        &self,
        version: &str,
        query: &str,
        limit: u32,
    ) -> Result<ConcordanceResponse> {
        let path = format!("/bible/{}/concordance", Self::encode(version));
        self.send(
            self.request(Method::GET, &path)
                .query(&[("query", query), ("limit", &limit.to_string()), ("offset", "0")]),
        )
        .await
    }

    pub async fn fetch_manuscripts_available(
        &self,
        book: &str,
        chapter: u32,
    ) -> Result<ManuscriptEditionsResponse> {
        let path = format!("/manuscripts/available/{}/{}", Self::encode(book), chapter);
        self.send(self.request(Method::GET, &path)).await
    }

    pub async fn fetch_manuscript_chapter(
        &self,
        edition: &str,
        book: &str,
        chapter: u32,
    ) -> Result<ManuscriptChapter> {
        let path = format!(
            "/manuscripts/{}/{}/{}",
            Self::encode(edition),
            Self::encode(book),
            chapter
        );
        self.send(self.request(Method::GET, &path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = ApiClient::new("http://localhost:8000/api/");
        assert_eq!(client.base_url, "http://localhost:8000/api");
    }

    #[test]
    fn path_segments_encode_spaces() {
        assert_eq!(ApiClient::encode("1 Corinthians"), "1%20Corinthians");
        assert_eq!(ApiClient::encode("KJV"), "KJV");
    }

    #[test]
    fn token_toggles() {
        let mut client = ApiClient::new("http://localhost:8000/api");
        assert!(!client.has_token());
        client.set_token(Some("abc".to_string()));
        assert!(client.has_token());
        client.set_token(None);
        assert!(!client.has_token());
    }
}
