use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Args, Subcommand};
use dialoguer::console;

use crate::args::BaseArgs;
use crate::config::Settings;
use crate::git;
use crate::gitlab::{ForgeApi, Job, JobStatus};
use crate::http::ApiClient;
use crate::pagination::paginate;
use crate::ui::{
    apply_column_padding, header, print_command_status, print_with_pager, styled_table,
    with_spinner, CommandStatus,
};
use crate::utils::pluralize;

mod trace;

pub use trace::{stream_running_jobs, stream_trace, TraceOptions};

#[derive(Debug, Clone, Args)]
pub struct JobsArgs {
    #[command(subcommand)]
    command: JobsCommands,
}

#[derive(Debug, Clone, Subcommand)]
enum JobsCommands {
    /// List the jobs of a pipeline
    List(PipelineArgs),
    /// Follow the logs of every running job in a pipeline until all of them finish
    Watch(WatchArgs),
    /// Follow the log of a single job until it finishes
    Trace(TraceArgs),
}

#[derive(Debug, Clone, Args)]
struct ProjectArg {
    /// Project path or id (default: derived from the `origin` remote)
    #[arg(long, short = 'P')]
    project: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct PipelineArgs {
    #[command(flatten)]
    project: ProjectArg,

    /// Pipeline id (default: latest pipeline of --ref)
    #[arg(long)]
    pipeline: Option<u64>,

    /// Branch or tag used to pick the latest pipeline (default: current branch)
    #[arg(long = "ref", value_name = "REF")]
    git_ref: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct WatchArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Lines of history to show when attaching to a job
    #[arg(long, short = 'n')]
    tail: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct TraceArgs {
    /// Job id
    job_id: u64,

    #[command(flatten)]
    project: ProjectArg,

    /// Lines of history to show when attaching to the job
    #[arg(long, short = 'n')]
    tail: Option<usize>,
}

pub async fn run(base: BaseArgs, args: JobsArgs) -> Result<()> {
    let settings = Settings::load(&base)?;
    let client = Arc::new(ApiClient::new(&settings)?);

    match args.command {
        JobsCommands::List(pipeline) => {
            let project = resolve_project(&settings, &pipeline.project).await?;
            let pipeline_id = resolve_pipeline(&*client, &project, &pipeline).await?;
            let jobs = with_spinner(
                "Loading jobs...",
                pipeline_jobs(&*client, &project, pipeline_id),
            )
            .await?;
            print_jobs(&project, pipeline_id, &jobs, base.json)
        }
        JobsCommands::Watch(watch) => {
            let project = resolve_project(&settings, &watch.pipeline.project).await?;
            let pipeline_id = resolve_pipeline(&*client, &project, &watch.pipeline).await?;
            let options = TraceOptions::new(watch.tail.unwrap_or(settings.tail_lines));
            watch_pipeline(client, &project, pipeline_id, &options, std::io::stdout).await
        }
        JobsCommands::Trace(trace) => {
            let project = resolve_project(&settings, &trace.project).await?;
            let options = TraceOptions::new(trace.tail.unwrap_or(settings.tail_lines));
            let job = client.get_job(&project, trace.job_id).await?;
            stream_trace(&*client, &project, job, &options, &mut std::io::stdout()).await
        }
    }
}

async fn resolve_project(settings: &Settings, arg: &ProjectArg) -> Result<String> {
    match arg.project.as_deref().map(str::trim) {
        Some(project) if !project.is_empty() => Ok(project.trim_matches('/').to_string()),
        _ => git::origin_project(&settings.base_url).await,
    }
}

async fn resolve_pipeline<A>(api: &A, project: &str, args: &PipelineArgs) -> Result<u64>
where
    A: ForgeApi + ?Sized,
{
    if let Some(id) = args.pipeline {
        return Ok(id);
    }
    let git_ref = match &args.git_ref {
        Some(git_ref) => Some(git_ref.clone()),
        None => git::current_branch().await,
    };
    let pipeline = api
        .latest_pipeline(project, git_ref.as_deref())
        .await?
        .ok_or_else(|| match &git_ref {
            Some(git_ref) => anyhow!("no pipeline found for {project} on {git_ref}"),
            None => anyhow!("no pipeline found for {project}"),
        })?;
    tracing::debug!(pipeline = pipeline.id, status = %pipeline.status, "resolved pipeline");
    Ok(pipeline.id)
}

async fn pipeline_jobs<A>(api: &A, project: &str, pipeline_id: u64) -> Result<Vec<Job>>
where
    A: ForgeApi + ?Sized,
{
    let mut jobs = paginate(move |cursor| api.list_pipeline_jobs(project, pipeline_id, cursor))
        .await
        .into_result()?;
    jobs.sort_by_key(|j| j.id);
    Ok(jobs)
}

/// Keep attaching to the pipeline's running jobs until a listing has none left.
/// Later stages only start once earlier ones finish, so one pass is not enough.
async fn watch_pipeline<A, W, F>(
    api: Arc<A>,
    project: &str,
    pipeline_id: u64,
    options: &TraceOptions,
    make_writer: F,
) -> Result<()>
where
    A: ForgeApi + ?Sized + 'static,
    W: std::io::Write + Send + 'static,
    F: Fn() -> W,
{
    let jobs = loop {
        let jobs = pipeline_jobs(&*api, project, pipeline_id).await?;
        let listing = jobs.clone();
        if stream_running_jobs(Arc::clone(&api), project, listing, options, &make_writer).await {
            break jobs;
        }
    };

    let failed = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Failed)
        .count();
    if failed == 0 {
        print_command_status(
            CommandStatus::Success,
            &format!("Pipeline {pipeline_id} has no running jobs left"),
        );
    } else {
        print_command_status(
            CommandStatus::Error,
            &format!(
                "Pipeline {pipeline_id} finished with {}",
                pluralize(failed, "failed job", None)
            ),
        );
    }
    Ok(())
}

fn print_jobs(project: &str, pipeline_id: u64, jobs: &[Job], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(jobs)?);
        return Ok(());
    }
    if jobs.is_empty() {
        bail!("pipeline {pipeline_id} of {project} has no jobs");
    }

    let mut output = String::new();
    writeln!(
        output,
        "{} in {} {}\n",
        pluralize(jobs.len(), "job", None),
        console::style(project).bold(),
        console::style(format!("#{pipeline_id}")).dim()
    )?;

    let mut table = styled_table();
    table.set_header(vec![
        header("ID"),
        header("Stage"),
        header("Name"),
        header("Status"),
    ]);
    apply_column_padding(&mut table, (0, 4));

    for job in jobs {
        table.add_row(vec![
            job.id.to_string(),
            job.stage.clone(),
            job.name.clone(),
            styled_status(job.status),
        ]);
    }

    write!(output, "{table}")?;
    print_with_pager(&output)?;
    Ok(())
}

fn styled_status(status: JobStatus) -> String {
    let styled = console::style(status.as_str());
    match status {
        JobStatus::Success => styled.green(),
        JobStatus::Failed => styled.red(),
        JobStatus::Running => styled.cyan(),
        JobStatus::Created | JobStatus::Pending => styled.yellow(),
        _ => styled.dim(),
    }
    .to_string()
}
