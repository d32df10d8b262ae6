// GitHub organization client: repository creation for new exports.

use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{base_url, decode, join, transport, ClientError};
use crate::config::GithubConfig;

const GITHUB_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub private: bool,
    pub has_issues: bool,
    pub has_projects: bool,
    pub has_wiki: bool,
    pub auto_init: bool,
}

impl NewRepository {
    /// Private repository with issues, projects and wiki turned off,
    /// initialized with a first commit so it can be cloned right away.
    pub fn private(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            private: true,
            has_issues: false,
            has_projects: false,
            has_wiki: false,
            auto_init: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedRepository {
    #[serde(default)]
    pub ssh_url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    org_api: Url,
    token: String,
    api_version: String,
}

impl GithubClient {
    pub fn new(http: reqwest::Client, org_api: Url, token: impl Into<String>, api_version: &str) -> Self {
        Self { http, org_api, token: token.into(), api_version: api_version.to_string() }
    }

    pub fn from_config(http: reqwest::Client, config: &GithubConfig) -> Result<Self, ClientError> {
        let org_api = base_url(config.org_api_url.as_deref(), "github.org_api_url")?;
        let token = config
            .access_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .ok_or(ClientError::NotConfigured { setting: "github.access_token" })?;
        Ok(Self::new(http, org_api, token, &config.api_version))
    }

    /// `POST {org}/repos`. Anything but 201 Created is an error.
    pub async fn create_repository(&self, repo: &NewRepository) -> Result<CreatedRepository, ClientError> {
        let url = join(&self.org_api, "repos")?;
        let response = self
            .http
            .post(url.clone())
            .header(ACCEPT, GITHUB_JSON)
            .header(API_VERSION_HEADER, &self.api_version)
            .bearer_auth(&self.token)
            .json(repo)
            .send()
            .await
            .map_err(transport(&url))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { method: Method::POST, url: url.to_string(), status, body });
        }
        decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GithubClient {
        let org = Url::parse(&format!("{}/orgs/mitodl/", server.uri())).unwrap();
        GithubClient::new(reqwest::Client::new(), org, "gh-token", "2022-11-28")
    }

    #[tokio::test]
    async fn creates_private_repository() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orgs/mitodl/repos"))
            .and(header("authorization", "Bearer gh-token"))
            .and(header("accept", "application/vnd.github+json"))
            .and(header("x-github-api-version", "2022-11-28"))
            .and(body_json(json!({
                "name": "course-v1-mitx-6-00x-2024",
                "description": "Intro",
                "private": true,
                "has_issues": false,
                "has_projects": false,
                "has_wiki": false,
                "auto_init": true
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "ssh_url": "git@github.com:mitodl/course-v1-mitx-6-00x-2024.git"
            })))
            .mount(&server)
            .await;

        let created = client(&server)
            .create_repository(&NewRepository::private("course-v1-mitx-6-00x-2024", "Intro"))
            .await
            .unwrap();

        assert_eq!(created.ssh_url.as_deref(), Some("git@github.com:mitodl/course-v1-mitx-6-00x-2024.git"));
    }

    #[tokio::test]
    async fn non_created_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"message": "name already exists"})))
            .mount(&server)
            .await;

        let error = client(&server)
            .create_repository(&NewRepository::private("dup", "dup"))
            .await
            .unwrap_err();
        assert_eq!(error.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
        assert!(error.to_string().contains("name already exists"));
    }
}
