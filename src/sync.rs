use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde_json::json;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::args::BaseArgs;
use crate::config::Settings;
use crate::gitlab::{ForgeApi, GroupRef};
use crate::http::ApiClient;
use crate::pagination::{paginate, Paginated};
use crate::projects::write_projects;
use crate::ui::{new_spinner, print_command_status, CommandStatus};
use crate::utils::pluralize;

/// Pause each group worker takes after its last page, to go easy on the server.
pub const WORKER_THROTTLE: Duration = Duration::from_micros(50);

#[derive(Debug, Clone, Args)]
pub struct SyncArgs {
    /// Root groups to crawl, by numeric id or full path. Every subgroup is included.
    /// Without groups, every project visible to the token is synced.
    #[arg(value_name = "GROUP")]
    groups: Vec<GroupRef>,

    /// Sync all visible projects instead of only those you are a member of
    #[arg(long)]
    all: bool,

    /// Maximum number of groups queried at the same time
    #[arg(long)]
    concurrency: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub concurrency: usize,
    pub throttle: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: crate::config::DEFAULT_CONCURRENCY,
            throttle: WORKER_THROTTLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlError {
    /// `None` when a worker died before it could say which group it had.
    pub group: Option<GroupRef>,
    pub message: String,
}

impl CrawlError {
    fn describe(&self) -> String {
        match &self.group {
            Some(group) => format!("group {group}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

/// The projects found plus every group that could not be fully listed.
#[derive(Debug, Default)]
pub struct CrawlReport {
    pub projects: Vec<String>,
    pub errors: Vec<CrawlError>,
}

impl CrawlReport {
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub type ErrorCallback<'a> = dyn Fn(&CrawlError) + Send + Sync + 'a;

pub async fn run(base: BaseArgs, args: SyncArgs) -> Result<()> {
    let settings = Settings::load(&base)?;
    let client = Arc::new(ApiClient::new(&settings)?);

    let spinner = new_spinner("Syncing projects...");
    let report_error = |err: &CrawlError| {
        spinner.suspend(|| {
            print_command_status(CommandStatus::Warning, &format!("Skipped {}", err.describe()))
        })
    };

    let report = if args.groups.is_empty() {
        let membership = !(args.all || settings.sync_all);
        visible_group_projects(&*client, membership, Some(&report_error)).await
    } else {
        let options = CrawlOptions {
            concurrency: args
                .concurrency
                .filter(|n| *n > 0)
                .unwrap_or(settings.concurrency),
            ..Default::default()
        };
        crawl(client, &args.groups, &options, Some(&report_error)).await
    };
    spinner.finish_and_clear();

    write_projects(&settings.projects_file, &report.projects)?;

    if base.json {
        let errors: Vec<String> = report.errors.iter().map(CrawlError::describe).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "projects": report.projects.len(),
                "path": settings.projects_file,
                "partial": report.is_partial(),
                "errors": errors,
            }))?
        );
    } else if report.is_partial() {
        print_command_status(
            CommandStatus::Warning,
            &format!(
                "Synced {} to {} ({} skipped)",
                pluralize(report.projects.len(), "project", None),
                settings.projects_file.display(),
                pluralize(report.errors.len(), "group", None),
            ),
        );
    } else {
        print_command_status(
            CommandStatus::Success,
            &format!(
                "Synced {} to {}",
                pluralize(report.projects.len(), "project", None),
                settings.projects_file.display()
            ),
        );
    }

    Ok(())
}

/// Every descendant of `group`, however deeply nested. The server flattens the
/// tree, so one paginated listing is enough.
pub async fn descendant_groups<A>(api: &A, group: &GroupRef) -> Paginated<GroupRef>
where
    A: ForgeApi + ?Sized,
{
    paginate(move |cursor| api.list_descendant_groups(group, cursor)).await
}

/// Full paths of the projects that live directly in `group`.
pub async fn group_projects<A>(api: &A, group: &GroupRef) -> Paginated<String>
where
    A: ForgeApi + ?Sized,
{
    paginate(move |cursor| api.list_group_projects(group, cursor)).await
}

/// Collect the project paths of every root group and all of its subgroups.
///
/// Descendants are resolved root by root, then one task per group lists that
/// group's own projects, at most `options.concurrency` at a time. A failing
/// group is reported through `on_error` and recorded in the report; the pages
/// it did return are kept and the other groups carry on. A project shared with
/// several crawled groups is listed once per group.
pub async fn crawl<A>(
    api: Arc<A>,
    roots: &[GroupRef],
    options: &CrawlOptions,
    on_error: Option<&ErrorCallback<'_>>,
) -> CrawlReport
where
    A: ForgeApi + ?Sized + 'static,
{
    let mut errors = Vec::new();
    let mut record = |err: CrawlError| {
        tracing::warn!(error = %err.describe(), "group skipped during crawl");
        if let Some(cb) = on_error {
            cb(&err);
        }
        errors.push(err);
    };

    let mut all_groups = Vec::new();
    for root in roots {
        all_groups.push(root.clone());
        let resolved = descendant_groups(&*api, root).await;
        tracing::debug!(root = %root, descendants = resolved.items.len(), "resolved subgroups");
        if let Some(err) = resolved.error {
            record(CrawlError {
                group: Some(root.clone()),
                message: format!("failed to list subgroups: {err:#}"),
            });
        }
        all_groups.extend(resolved.items);
    }

    let projects = Arc::new(Mutex::new(Vec::new()));
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut join_set = JoinSet::new();

    for group in all_groups {
        let api = Arc::clone(&api);
        let projects = Arc::clone(&projects);
        let semaphore = Arc::clone(&semaphore);
        let throttle = options.throttle;

        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (group, Some("crawl semaphore closed unexpectedly".to_string()));
            };

            let listed = group_projects(&*api, &group).await;
            tokio::time::sleep(throttle).await;

            if !listed.items.is_empty() {
                projects.lock().await.extend(listed.items);
            }
            let error = listed
                .error
                .map(|err| format!("failed to list projects: {err:#}"));
            (group, error)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((_, None)) => {}
            Ok((group, Some(message))) => record(CrawlError {
                group: Some(group),
                message,
            }),
            Err(join_err) => record(CrawlError {
                group: None,
                message: format!("group worker failed: {join_err}"),
            }),
        }
    }

    let projects = std::mem::take(&mut *projects.lock().await);
    CrawlReport { projects, errors }
}

/// Projects visible to the token that belong to a group namespace (personal
/// projects are left out).
pub async fn visible_group_projects<A>(
    api: &A,
    membership: bool,
    on_error: Option<&ErrorCallback<'_>>,
) -> CrawlReport
where
    A: ForgeApi + ?Sized,
{
    let listed = paginate(move |cursor| api.list_projects(membership, cursor)).await;
    let projects = listed
        .items
        .into_iter()
        .filter(|p| p.namespace.kind == "group")
        .map(|p| p.path_with_namespace)
        .collect();

    let errors = listed
        .error
        .map(|err| {
            let err = CrawlError {
                group: None,
                message: format!("failed to list projects: {err:#}"),
            };
            tracing::warn!(error = %err.describe(), "project listing stopped early");
            if let Some(cb) = on_error {
                cb(&err);
            }
            err
        })
        .into_iter()
        .collect();

    CrawlReport { projects, errors }
}
