// Canvas LMS REST client, scoped to one Canvas course.
//
// List endpoints are paginated through the `Link` response header; every
// listing asks for 100 items per page instead of Canvas's default of 10.

use std::collections::BTreeMap;

use reqwest::header::LINK;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{base_url, check, decode, join, transport, ClientError};
use crate::config::CanvasConfig;

const PER_PAGE: &str = "100";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasAssignment {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub integration_id: Option<String>,
}

/// Body of an assignment create or update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentPayload {
    pub assignment: AssignmentFields,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentFields {
    pub name: String,
    pub integration_id: String,
    pub grading_type: &'static str,
    pub points_possible: f64,
    pub due_at: Option<String>,
    pub submission_types: Vec<&'static str>,
    pub published: bool,
}

impl AssignmentPayload {
    pub fn new(name: &str, integration_id: &str, points_possible: f64, due_at: Option<String>) -> Self {
        Self {
            assignment: AssignmentFields {
                name: name.to_string(),
                integration_id: integration_id.to_string(),
                grading_type: "percent",
                points_possible,
                due_at,
                submission_types: vec!["none"],
                published: false,
            },
        }
    }

    pub fn integration_id(&self) -> &str {
        &self.assignment.integration_id
    }
}

/// Form field for one learner in a bulk grade update. `percent` is 0..=1.
pub fn grade_form_field(canvas_user_id: i64, percent: f64) -> (String, String) {
    (format!("grade_data[{canvas_user_id}][posted_grade]"), format!("{}%", percent * 100.0))
}

#[derive(Debug, Deserialize)]
struct Enrollment {
    user: EnrolledUser,
}

#[derive(Debug, Deserialize)]
struct EnrolledUser {
    id: i64,
    #[serde(default)]
    login_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchUser {
    id: i64,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CanvasClient {
    http: reqwest::Client,
    base: Url,
    token: String,
    canvas_course_id: String,
}

impl CanvasClient {
    pub fn new(http: reqwest::Client, base: Url, token: impl Into<String>, canvas_course_id: &str) -> Self {
        Self { http, base, token: token.into(), canvas_course_id: canvas_course_id.to_string() }
    }

    pub fn from_config(
        http: reqwest::Client,
        config: &CanvasConfig,
        canvas_course_id: &str,
    ) -> Result<Self, ClientError> {
        let base = base_url(config.base_url.as_deref(), "canvas.base_url")?;
        let token = config
            .access_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .ok_or(ClientError::NotConfigured { setting: "canvas.access_token" })?;
        Ok(Self::new(http, base, token, canvas_course_id))
    }

    pub fn canvas_course_id(&self) -> &str {
        &self.canvas_course_id
    }

    // ── Reads ──

    /// Lowercased login id → Canvas user id for everyone enrolled.
    pub async fn list_enrollments(&self) -> Result<BTreeMap<String, i64>, ClientError> {
        let url = self.course_url("enrollments")?;
        let enrollments: Vec<Enrollment> = self.paginate(url, &[]).await?;
        Ok(enrollments
            .into_iter()
            .map(|enrollment| (enrollment.user.login_id.to_lowercase(), enrollment.user.id))
            .collect())
    }

    pub async fn list_assignments(&self) -> Result<Vec<CanvasAssignment>, ClientError> {
        let url = self.course_url("assignments")?;
        self.paginate(url, &[]).await
    }

    /// Integration id → Canvas assignment id. Assignments without an
    /// integration id are not ours and are left out.
    pub async fn assignments_by_integration_id(&self) -> Result<BTreeMap<String, i64>, ClientError> {
        let assignments = self.list_assignments().await?;
        let mut unlinked: Vec<i64> = assignments
            .iter()
            .filter(|assignment| assignment.integration_id.is_none())
            .map(|assignment| assignment.id)
            .collect();
        if !unlinked.is_empty() {
            unlinked.sort_unstable();
            warn!(
                canvas_course_id = %self.canvas_course_id,
                assignment_ids = ?unlinked,
                "canvas assignments without an integration_id"
            );
        }
        Ok(assignments
            .into_iter()
            .filter_map(|assignment| assignment.integration_id.map(|id| (id, assignment.id)))
            .collect())
    }

    /// Canvas id of the enrolled student with this email, if any.
    pub async fn student_id_by_email(&self, email: &str) -> Result<Option<i64>, ClientError> {
        let url = self.course_url("search_users")?;
        let users: Vec<SearchUser> = self
            .paginate(url, &[("search_term", email), ("enrollment_type[]", "student")])
            .await?;
        Ok(users
            .into_iter()
            .find(|user| user.email.as_deref().is_some_and(|found| found.eq_ignore_ascii_case(email)))
            .map(|user| user.id))
    }

    pub async fn list_grades(&self, assignment_id: i64) -> Result<Vec<Value>, ClientError> {
        let url = self.course_url(&format!("assignments/{assignment_id}/submissions"))?;
        self.paginate(url, &[]).await
    }

    // ── Writes ──

    pub async fn create_assignment(&self, payload: &AssignmentPayload) -> Result<(), ClientError> {
        let url = self.course_url("assignments")?;
        self.send_json(Method::POST, url, payload).await
    }

    pub async fn update_assignment(
        &self,
        assignment_id: i64,
        payload: &AssignmentPayload,
    ) -> Result<(), ClientError> {
        let url = self.course_url(&format!("assignments/{assignment_id}"))?;
        self.send_json(Method::PUT, url, payload).await
    }

    pub async fn delete_assignment(&self, assignment_id: i64) -> Result<(), ClientError> {
        let url = self.course_url(&format!("assignments/{assignment_id}"))?;
        let response =
            self.http.delete(url.clone()).bearer_auth(&self.token).send().await.map_err(transport(&url))?;
        check(Method::DELETE, response).await?;
        Ok(())
    }

    /// Bulk grade update, form encoded.
    pub async fn update_grades(
        &self,
        assignment_id: i64,
        grades: &[(String, String)],
    ) -> Result<(), ClientError> {
        let url = self.course_url(&format!("assignments/{assignment_id}/submissions/update_grades"))?;
        let response = self
            .http
            .post(url.clone())
            .bearer_auth(&self.token)
            .form(grades)
            .send()
            .await
            .map_err(transport(&url))?;
        check(Method::POST, response).await?;
        Ok(())
    }

    // ── Plumbing ──

    fn course_url(&self, tail: &str) -> Result<Url, ClientError> {
        join(&self.base, &format!("api/v1/courses/{}/{tail}", self.canvas_course_id))
    }

    async fn send_json<T: Serialize>(&self, method: Method, url: Url, body: &T) -> Result<(), ClientError> {
        let response = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(transport(&url))?;
        check(method, response).await?;
        Ok(())
    }

    async fn paginate<T: serde::de::DeserializeOwned>(
        &self,
        mut url: Url,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, ClientError> {
        let retained: Vec<(String, String)> =
            url.query_pairs().filter(|(key, _)| key != "per_page").map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .extend_pairs(params.iter().copied())
            .append_pair("per_page", PER_PAGE);

        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(page_url) = next.take() {
            let response = self
                .http
                .get(page_url.clone())
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(transport(&page_url))?;
            let response = check(Method::GET, response).await?;
            next = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(next_link)
                .and_then(|link| Url::parse(&link).ok());
            let page: Vec<T> = decode(response).await?;
            debug!(url = %page_url, items = page.len(), "canvas page fetched");
            items.extend(page);
        }
        Ok(items)
    }
}

/// Target of the `rel="next"` entry of an RFC 8288 `Link` header.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        is_next.then(|| target.trim_start_matches('<').trim_end_matches('>').to_string())
    })
}
