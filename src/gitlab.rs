use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use urlencoding::encode;

use crate::http::ApiClient;
use crate::pagination::{Page, PageCursor};

/// A group selector: either the numeric id or the full path (`parent/child`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupRef {
    Id(u64),
    Path(String),
}

impl GroupRef {
    /// The form GitLab accepts in `/groups/:id/...` URLs.
    pub fn api_selector(&self) -> String {
        match self {
            GroupRef::Id(id) => id.to_string(),
            GroupRef::Path(path) => encode(path).into_owned(),
        }
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupRef::Id(id) => write!(f, "{id}"),
            GroupRef::Path(path) => f.write_str(path),
        }
    }
}

impl FromStr for GroupRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_matches('/');
        if s.is_empty() {
            bail!("group must not be empty");
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            return Ok(GroupRef::Id(s.parse()?));
        }
        Ok(GroupRef::Path(s.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Namespace {
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSummary {
    pub path_with_namespace: String,
    pub namespace: Namespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Scheduled,
    WaitingForResource,
    Preparing,
    #[serde(other)]
    Other,
}

impl JobStatus {
    /// A job is still worth polling while it is created, pending or running.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            JobStatus::Created | JobStatus::Pending | JobStatus::Running
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Skipped => "skipped",
            JobStatus::Manual => "manual",
            JobStatus::Scheduled => "scheduled",
            JobStatus::WaitingForResource => "waiting_for_resource",
            JobStatus::Preparing => "preparing",
            JobStatus::Other => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub stage: String,
    pub status: JobStatus,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub status: String,
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

/// The slice of the GitLab API the crawler and the trace streamer rely on.
#[async_trait]
pub trait ForgeApi: Send + Sync {
    async fn list_group_projects(&self, group: &GroupRef, cursor: PageCursor)
        -> Result<Page<String>>;

    async fn list_descendant_groups(
        &self,
        group: &GroupRef,
        cursor: PageCursor,
    ) -> Result<Page<GroupRef>>;

    async fn list_projects(
        &self,
        membership: bool,
        cursor: PageCursor,
    ) -> Result<Page<ProjectSummary>>;

    async fn get_job(&self, project: &str, job_id: u64) -> Result<Job>;

    /// The whole log so far; GitLab has no delta endpoint.
    async fn get_trace(&self, project: &str, job_id: u64) -> Result<String>;

    async fn latest_pipeline(&self, project: &str, git_ref: Option<&str>)
        -> Result<Option<Pipeline>>;

    async fn list_pipeline_jobs(
        &self,
        project: &str,
        pipeline_id: u64,
        cursor: PageCursor,
    ) -> Result<Page<Job>>;
}

#[derive(Debug, Deserialize)]
struct GroupProject {
    path_with_namespace: String,
}

#[async_trait]
impl ForgeApi for ApiClient {
    async fn list_group_projects(
        &self,
        group: &GroupRef,
        cursor: PageCursor,
    ) -> Result<Page<String>> {
        let path = format!("/groups/{}/projects", group.api_selector());
        let page: Page<GroupProject> = self
            .get_page(&path, &[("simple", "true".to_string())], cursor)
            .await?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|p| p.path_with_namespace)
                .collect(),
            next_page: page.next_page,
        })
    }

    async fn list_descendant_groups(
        &self,
        group: &GroupRef,
        cursor: PageCursor,
    ) -> Result<Page<GroupRef>> {
        let path = format!("/groups/{}/descendant_groups", group.api_selector());
        let page: Page<Group> = self.get_page(&path, &[], cursor).await?;
        Ok(Page {
            items: page.items.into_iter().map(|g| GroupRef::Id(g.id)).collect(),
            next_page: page.next_page,
        })
    }

    async fn list_projects(
        &self,
        membership: bool,
        cursor: PageCursor,
    ) -> Result<Page<ProjectSummary>> {
        self.get_page(
            "/projects",
            &[
                ("simple", "true".to_string()),
                ("membership", membership.to_string()),
            ],
            cursor,
        )
        .await
    }

    async fn get_job(&self, project: &str, job_id: u64) -> Result<Job> {
        self.get(&format!("/projects/{}/jobs/{job_id}", encode(project)), &[])
            .await
    }

    async fn get_trace(&self, project: &str, job_id: u64) -> Result<String> {
        self.get_text(&format!("/projects/{}/jobs/{job_id}/trace", encode(project)))
            .await
    }

    async fn latest_pipeline(
        &self,
        project: &str,
        git_ref: Option<&str>,
    ) -> Result<Option<Pipeline>> {
        let mut query = vec![("per_page", "1".to_string())];
        if let Some(git_ref) = git_ref {
            query.push(("ref", git_ref.to_string()));
        }
        let pipelines: Vec<Pipeline> = self
            .get(&format!("/projects/{}/pipelines", encode(project)), &query)
            .await?;
        Ok(pipelines.into_iter().next())
    }

    async fn list_pipeline_jobs(
        &self,
        project: &str,
        pipeline_id: u64,
        cursor: PageCursor,
    ) -> Result<Page<Job>> {
        let path = format!(
            "/projects/{}/pipelines/{pipeline_id}/jobs",
            encode(project)
        );
        self.get_page(&path, &[], cursor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_ref_parses_ids_and_paths() {
        assert_eq!("42".parse::<GroupRef>().unwrap(), GroupRef::Id(42));
        assert_eq!(
            "/infra/k8s/".parse::<GroupRef>().unwrap(),
            GroupRef::Path("infra/k8s".into())
        );
        assert!("  ".parse::<GroupRef>().is_err());
    }

    #[test]
    fn group_path_selector_is_percent_encoded() {
        assert_eq!(GroupRef::Path("infra/k8s".into()).api_selector(), "infra%2Fk8s");
        assert_eq!(GroupRef::Id(7).api_selector(), "7");
    }

    #[test]
    fn job_status_running_set() {
        assert!(JobStatus::Created.is_running());
        assert!(JobStatus::Pending.is_running());
        assert!(JobStatus::Running.is_running());
        assert!(!JobStatus::Success.is_running());
        assert!(!JobStatus::Manual.is_running());
    }

    #[test]
    fn unknown_job_status_deserializes() {
        let job: Job = serde_json::from_str(
            r#"{"id": 9, "name": "build", "stage": "build", "status": "something_new"}"#,
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Other);

        let job: Job = serde_json::from_str(
            r#"{"id": 9, "name": "build", "status": "waiting_for_resource"}"#,
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::WaitingForResource);
    }
}
