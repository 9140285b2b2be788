//! Scripted in-memory `ForgeApi` used by the crawler and trace streamer tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::gitlab::{ForgeApi, GroupRef, Job, JobStatus, Namespace, Pipeline, ProjectSummary};
use crate::pagination::{Page, PageCursor};

/// Pages are 1-based; a `None` page means "fail when this page is requested".
type Pages<T> = Vec<Option<Vec<T>>>;

#[derive(Default)]
pub struct FakeForge {
    group_projects: HashMap<GroupRef, Pages<String>>,
    descendants: HashMap<GroupRef, Pages<GroupRef>>,
    projects: Vec<ProjectSummary>,
    pipeline: Option<Pipeline>,
    pipeline_jobs: Mutex<VecDeque<Vec<Job>>>,
    traces: Mutex<HashMap<u64, VecDeque<Option<String>>>>,
    statuses: Mutex<HashMap<u64, VecDeque<JobStatus>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeForge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group_projects(mut self, group: GroupRef, pages: Pages<&str>) -> Self {
        let pages = pages
            .into_iter()
            .map(|page| page.map(|items| items.into_iter().map(String::from).collect()))
            .collect();
        self.group_projects.insert(group, pages);
        self
    }

    pub fn with_descendants(mut self, group: GroupRef, pages: Pages<GroupRef>) -> Self {
        self.descendants.insert(group, pages);
        self
    }

    pub fn with_project(mut self, path: &str, kind: &str) -> Self {
        self.projects.push(ProjectSummary {
            path_with_namespace: path.to_string(),
            namespace: Namespace {
                kind: kind.to_string(),
            },
        });
        self
    }

    pub fn with_pipeline(mut self, id: u64) -> Self {
        self.pipeline = Some(Pipeline {
            id,
            status: "running".to_string(),
            git_ref: Some("main".to_string()),
            web_url: None,
        });
        self
    }

    /// Successive listings of the pipeline's jobs; the last one repeats.
    pub fn with_pipeline_jobs(self, listing: Vec<Job>) -> Self {
        self.pipeline_jobs.lock().unwrap().push_back(listing);
        self
    }

    /// Successive trace snapshots for a job; `None` is a failed fetch. The last one repeats.
    pub fn with_traces(self, job_id: u64, traces: Vec<Option<String>>) -> Self {
        self.traces
            .lock()
            .unwrap()
            .insert(job_id, traces.into_iter().collect());
        self
    }

    /// Successive statuses returned by `get_job`; the last one repeats.
    pub fn with_statuses(self, job_id: u64, statuses: Vec<JobStatus>) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id, statuses.into_iter().collect());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn job(id: u64, name: &str, status: JobStatus) -> Job {
    Job {
        id,
        name: name.to_string(),
        stage: "test".to_string(),
        status,
        web_url: None,
    }
}

fn serve_page<T: Clone>(pages: Option<&Pages<T>>, cursor: PageCursor, what: &str) -> Result<Page<T>> {
    let Some(pages) = pages else {
        return Ok(Page {
            items: Vec::new(),
            next_page: None,
        });
    };
    let index = cursor.page as usize - 1;
    match pages.get(index) {
        Some(Some(items)) => Ok(Page {
            items: items.clone(),
            next_page: (index + 1 < pages.len()).then_some(cursor.page + 1),
        }),
        Some(None) => Err(anyhow!("500 Internal Server Error for {what} page {}", cursor.page)),
        None => Err(anyhow!("page {} of {what} requested past the end", cursor.page)),
    }
}

fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl ForgeApi for FakeForge {
    async fn list_group_projects(
        &self,
        group: &GroupRef,
        cursor: PageCursor,
    ) -> Result<Page<String>> {
        self.record(format!("group_projects:{group}:{}", cursor.page));
        serve_page(self.group_projects.get(group), cursor, "group projects")
    }

    async fn list_descendant_groups(
        &self,
        group: &GroupRef,
        cursor: PageCursor,
    ) -> Result<Page<GroupRef>> {
        self.record(format!("descendants:{group}:{}", cursor.page));
        serve_page(self.descendants.get(group), cursor, "descendant groups")
    }

    async fn list_projects(
        &self,
        membership: bool,
        cursor: PageCursor,
    ) -> Result<Page<ProjectSummary>> {
        self.record(format!("projects:{membership}:{}", cursor.page));
        let pages = vec![Some(self.projects.clone())];
        serve_page(Some(&pages), cursor, "projects")
    }

    async fn get_job(&self, project: &str, job_id: u64) -> Result<Job> {
        self.record(format!("job:{project}:{job_id}"));
        let status = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(&job_id)
            .and_then(next_scripted)
            .ok_or_else(|| anyhow!("404 job {job_id} not found"))?;
        Ok(job(job_id, &format!("job-{job_id}"), status))
    }

    async fn get_trace(&self, project: &str, job_id: u64) -> Result<String> {
        self.record(format!("trace:{project}:{job_id}"));
        self.traces
            .lock()
            .unwrap()
            .get_mut(&job_id)
            .and_then(next_scripted)
            .flatten()
            .ok_or_else(|| anyhow!("502 Bad Gateway fetching trace of {job_id}"))
    }

    async fn latest_pipeline(
        &self,
        project: &str,
        _git_ref: Option<&str>,
    ) -> Result<Option<Pipeline>> {
        self.record(format!("latest_pipeline:{project}"));
        Ok(self.pipeline.clone())
    }

    async fn list_pipeline_jobs(
        &self,
        project: &str,
        pipeline_id: u64,
        cursor: PageCursor,
    ) -> Result<Page<Job>> {
        self.record(format!("pipeline_jobs:{project}:{pipeline_id}:{}", cursor.page));
        let listing = next_scripted(&mut self.pipeline_jobs.lock().unwrap()).unwrap_or_default();
        Ok(Page {
            items: listing,
            next_page: None,
        })
    }
}
