// Discussion forum service client: user, thread and comment username updates.

use std::collections::VecDeque;

use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{base_url, check, decode, join, transport, ClientError};
use crate::config::ForumConfig;

const API_KEY_HEADER: &str = "X-Edx-Api-Key";
/// Upper bound on thread search pages fetched for one course.
const MAX_SEARCH_PAGES: u32 = 200;

/// Something a user wrote: a thread or a comment/response.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuthoredItem {
    Thread(String),
    Comment(String),
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    collection: Vec<Value>,
    #[serde(default)]
    num_pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct UsernameEcho {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ForumClient {
    http: reqwest::Client,
    base: Url,
    api_key: Option<String>,
}

impl ForumClient {
    pub fn new(http: reqwest::Client, base: Url, api_key: Option<String>) -> Self {
        Self { http, base, api_key }
    }

    pub fn from_config(http: reqwest::Client, config: &ForumConfig) -> Result<Self, ClientError> {
        let base = base_url(config.base_url.as_deref(), "forum.base_url")?;
        Ok(Self::new(http, base, config.api_key.clone()))
    }

    pub async fn update_user_username(&self, user_id: i64, new_username: &str) -> Result<(), ClientError> {
        let url = join(&self.base, &format!("api/v1/users/{user_id}"))?;
        self.put_username(url, new_username).await
    }

    pub async fn update_thread_username(&self, thread_id: &str, new_username: &str) -> Result<(), ClientError> {
        let url = join(&self.base, &format!("api/v1/threads/{thread_id}"))?;
        self.put_username(url, new_username).await
    }

    pub async fn update_comment_username(&self, comment_id: &str, new_username: &str) -> Result<(), ClientError> {
        let url = join(&self.base, &format!("api/v1/comments/{comment_id}"))?;
        self.put_username(url, new_username).await
    }

    /// Threads and comments written by `user_id` in one course.
    ///
    /// Threads come from the paged search; each is then fetched with its
    /// responses and walked breadth first.
    pub async fn authored_items(&self, course_id: &str, user_id: i64) -> Result<Vec<AuthoredItem>, ClientError> {
        let author = user_id.to_string();
        let mut items = Vec::new();

        for thread_id in self.involved_thread_ids(course_id, &author).await? {
            let thread = self.thread_with_responses(&thread_id).await?;
            if author_of(&thread).as_deref() == Some(author.as_str()) {
                items.push(AuthoredItem::Thread(thread_id.clone()));
            }

            let mut to_scan: VecDeque<Value> = ["children", "endorsed_responses", "non_endorsed_responses"]
                .iter()
                .flat_map(|field| children_of(&thread, field))
                .collect();
            while let Some(child) = to_scan.pop_front() {
                to_scan.extend(children_of(&child, "children"));
                if author_of(&child).as_deref() == Some(author.as_str()) {
                    if let Some(id) = id_of(&child) {
                        items.push(AuthoredItem::Comment(id));
                    }
                }
            }
        }
        Ok(items)
    }

    async fn involved_thread_ids(&self, course_id: &str, author: &str) -> Result<Vec<String>, ClientError> {
        let mut ids = Vec::new();
        let mut page = 1u32;
        loop {
            let mut url = join(&self.base, "api/v1/search/threads")?;
            url.query_pairs_mut()
                .append_pair("course_id", course_id)
                .append_pair("user_id", author)
                .append_pair("page", &page.to_string());
            let response = self.request(Method::GET, url.clone()).send().await.map_err(transport(&url))?;
            let body: SearchPage = decode(check(Method::GET, response).await?).await?;

            if body.collection.is_empty() {
                break;
            }
            ids.extend(body.collection.iter().filter_map(id_of));
            // A response without `num_pages` is the only page.
            let last_page = body.num_pages.unwrap_or(1).min(MAX_SEARCH_PAGES);
            if page >= last_page {
                break;
            }
            page += 1;
        }
        debug!(course_id, author, threads = ids.len(), "forum threads found");
        Ok(ids)
    }

    async fn thread_with_responses(&self, thread_id: &str) -> Result<Value, ClientError> {
        let mut url = join(&self.base, &format!("api/v1/threads/{thread_id}"))?;
        url.query_pairs_mut()
            .append_pair("with_responses", "true")
            .append_pair("recursive", "true")
            .append_pair("mark_as_read", "false");
        let response = self.request(Method::GET, url.clone()).send().await.map_err(transport(&url))?;
        decode(check(Method::GET, response).await?).await
    }

    async fn put_username(&self, url: Url, new_username: &str) -> Result<(), ClientError> {
        let response = self
            .request(Method::PUT, url.clone())
            .json(&json!({ "username": new_username }))
            .send()
            .await
            .map_err(transport(&url))?;
        let echo: UsernameEcho = decode(check(Method::PUT, response).await?).await?;
        if echo.username.as_deref() != Some(new_username) {
            return Err(ClientError::UpdateFailed {
                url: url.to_string(),
                new_username: new_username.to_string(),
            });
        }
        Ok(())
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }
}

fn children_of(value: &Value, field: &str) -> Vec<Value> {
    value.get(field).and_then(Value::as_array).cloned().unwrap_or_default()
}

fn id_of(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn author_of(value: &Value) -> Option<String> {
    match value.get("user_id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
