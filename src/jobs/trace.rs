use std::io::Write;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::gitlab::{ForgeApi, Job, JobStatus};
use crate::ui::{job_label, print_command_status, CommandStatus};

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

// GitLab traces carry hidden sequences such as `\x1b[0m\x1b[0K` and section
// markers (`section_start:<ts>:<name>\r\x1b[0K`) that break line prefixes.
static HIDDEN_SEQUENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[0m.*?\[0K|section_(?:start|end):\d+:[^\r\n]*\r\x1b\[0K").unwrap()
});

#[derive(Debug, Clone)]
pub struct TraceOptions {
    /// Lines of history shown when first attaching to a job.
    pub tail_lines: usize,
    pub interval: Duration,
}

impl TraceOptions {
    pub fn new(tail_lines: usize) -> Self {
        Self {
            tail_lines,
            interval: POLL_INTERVAL,
        }
    }
}

pub fn strip_hidden_sequences(line: &str) -> String {
    HIDDEN_SEQUENCE_RE.replace_all(line, "").into_owned()
}

/// How far into a job's log we have printed.
#[derive(Debug)]
struct TraceCursor {
    /// Complete lines already emitted (or skipped by the initial tail window).
    offset: usize,
    first_poll: bool,
}

impl TraceCursor {
    fn new() -> Self {
        Self {
            offset: 0,
            first_poll: true,
        }
    }

    /// Lines of `trace` that have not been printed yet.
    ///
    /// Only newline-terminated lines count; a trailing fragment may still be
    /// growing and is held back unless `flush_partial` is set.
    fn advance<'a>(&mut self, trace: &'a str, tail_lines: usize, flush_partial: bool) -> Vec<&'a str> {
        let (complete, partial) = split_complete_lines(trace);
        let total = complete.len();

        let mut start = self.offset.min(total);
        if self.first_poll {
            self.first_poll = false;
            start = start.max(total.saturating_sub(tail_lines));
        }

        let mut fresh = complete[start..].to_vec();
        self.offset = self.offset.max(total);

        if flush_partial {
            if let Some(partial) = partial {
                fresh.push(partial);
                self.offset += 1;
            }
        }
        fresh
    }
}

fn split_complete_lines(trace: &str) -> (Vec<&str>, Option<&str>) {
    let mut complete: Vec<&str> = trace.split('\n').collect();
    // split always yields one piece after the last '\n'
    let partial = complete.pop().filter(|rest| !rest.is_empty());
    (complete, partial)
}

fn write_lines<W: Write>(out: &mut W, label: &str, lines: &[&str]) -> std::io::Result<()> {
    for line in lines {
        writeln!(out, "{label}{}", strip_hidden_sequences(line))?;
    }
    out.flush()
}

/// Follow one job's log until the job leaves the created/pending/running states.
///
/// Every tick fetches the whole trace, prints the lines appended since the last
/// tick and then checks the status known before that fetch: a job that had
/// already finished has its complete log on screen, so the loop ends there.
/// Otherwise the job is re-fetched for the next round. Failed requests are
/// reported and retried on the next tick; only a failing writer ends the
/// stream with an error.
pub async fn stream_trace<A, W>(
    api: &A,
    project: &str,
    mut job: Job,
    options: &TraceOptions,
    out: &mut W,
) -> Result<()>
where
    A: ForgeApi + ?Sized,
    W: Write,
{
    let label = job_label(&job.name);
    let mut cursor = TraceCursor::new();
    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let finished = !job.status.is_running();

        match api.get_trace(project, job.id).await {
            Ok(trace) => {
                let fresh = cursor.advance(&trace, options.tail_lines, finished);
                write_lines(out, &label, &fresh)
                    .with_context(|| format!("failed to print trace of job {}", job.name))?;
            }
            Err(err) => {
                tracing::warn!(job = job.id, error = %err, "trace fetch failed");
                print_command_status(
                    CommandStatus::Warning,
                    &format!("{}: could not fetch trace: {err:#}", job.name),
                );
                if !finished {
                    continue;
                }
            }
        }

        if finished {
            report_finished(&job);
            return Ok(());
        }

        match api.get_job(project, job.id).await {
            Ok(latest) => {
                tracing::debug!(job = job.id, status = %latest.status, "job polled");
                job.status = latest.status;
            }
            Err(err) => {
                tracing::warn!(job = job.id, error = %err, "job status fetch failed");
                print_command_status(
                    CommandStatus::Warning,
                    &format!("{}: could not refresh status: {err:#}", job.name),
                );
            }
        }
    }
}

fn report_finished(job: &Job) {
    let status = if job.status == JobStatus::Success {
        CommandStatus::Success
    } else {
        CommandStatus::Error
    };
    print_command_status(status, &format!("{} {}", job.name, job.status));
}

/// Stream every job that is still created/pending/running, each in its own
/// task with its own writer, and wait for all of them.
///
/// Returns `true` when none of `jobs` was running, i.e. there was nothing to follow.
pub async fn stream_running_jobs<A, W, F>(
    api: Arc<A>,
    project: &str,
    jobs: Vec<Job>,
    options: &TraceOptions,
    make_writer: F,
) -> bool
where
    A: ForgeApi + ?Sized + 'static,
    W: Write + Send + 'static,
    F: Fn() -> W,
{
    let mut join_set = JoinSet::new();

    for job in jobs.into_iter().filter(|j| j.status.is_running()) {
        let api = Arc::clone(&api);
        let project = project.to_string();
        let options = options.clone();
        let mut out = make_writer();

        join_set.spawn(async move {
            let name = job.name.clone();
            if let Err(err) = stream_trace(&*api, &project, job, &options, &mut out).await {
                print_command_status(CommandStatus::Error, &format!("{name}: {err:#}"));
            }
        });
    }

    let all_done = join_set.is_empty();
    while let Some(joined) = join_set.join_next().await {
        if let Err(err) = joined {
            tracing::warn!(error = %err, "trace task failed");
        }
    }
    all_done
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{job, FakeForge};
    use std::sync::Mutex;

    fn fast(tail_lines: usize) -> TraceOptions {
        TraceOptions {
            tail_lines,
            interval: Duration::from_millis(1),
        }
    }

    fn numbered(range: std::ops::Range<usize>) -> String {
        range.map(|n| format!("line {n}\n")).collect()
    }

    /// Printed lines without the colored `[name] ` prefix.
    fn printed(out: &[u8]) -> Vec<String> {
        let text = String::from_utf8(out.to_vec()).unwrap();
        let text = dialoguer::console::strip_ansi_codes(&text).into_owned();
        text.lines()
            .map(|l| l.split_once("] ").map(|(_, rest)| rest).unwrap_or(l).to_string())
            .collect()
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn strips_reset_then_clear_line() {
        assert_eq!(
            strip_hidden_sequences("\x1b[0m\x1b[0K\x1b[36;1mStart\x1b[0;m"),
            "\x1b[36;1mStart\x1b[0;m"
        );
        assert_eq!(strip_hidden_sequences("build \x1b[0m\x1b[0Kdone"), "build done");
        assert_eq!(strip_hidden_sequences("plain text"), "plain text");
    }

    #[test]
    fn strips_section_markers() {
        assert_eq!(
            strip_hidden_sequences("section_start:1700000000:get_sources\r\x1b[0KGetting source"),
            "Getting source"
        );
    }

    #[test]
    fn cursor_prints_only_appended_lines() {
        let mut cursor = TraceCursor::new();
        let first = numbered(0..5);
        assert_eq!(cursor.advance(&first, 20, false).len(), 5);

        let second = numbered(0..8);
        assert_eq!(
            cursor.advance(&second, 20, false),
            vec!["line 5", "line 6", "line 7"]
        );
        assert!(cursor.advance(&second, 20, false).is_empty());
        assert_eq!(cursor.offset, 8);
    }

    #[test]
    fn cursor_tails_long_history_on_first_poll() {
        let mut cursor = TraceCursor::new();
        let history = numbered(0..1000);
        let shown = cursor.advance(&history, 20, false);
        assert_eq!(shown.len(), 20);
        assert_eq!(shown[0], "line 980");
        assert_eq!(shown[19], "line 999");

        let grown = numbered(0..1002);
        assert_eq!(cursor.advance(&grown, 20, false), vec!["line 1000", "line 1001"]);
    }

    #[test]
    fn cursor_holds_partial_line_until_complete_or_flushed() {
        let mut cursor = TraceCursor::new();
        assert_eq!(cursor.advance("a\nb", 20, false), vec!["a"]);
        assert_eq!(cursor.advance("a\nbc\nd", 20, false), vec!["bc"]);
        assert_eq!(cursor.advance("a\nbc\nde", 20, true), vec!["de"]);
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let mut cursor = TraceCursor::new();
        cursor.advance(&numbered(0..10), 20, false);
        assert!(cursor.advance(&numbered(0..3), 20, false).is_empty());
        assert_eq!(cursor.offset, 10);
        assert_eq!(cursor.advance(&numbered(0..11), 20, false), vec!["line 10"]);
    }

    #[tokio::test]
    async fn stream_prints_each_line_once_and_stops_after_success() {
        let api = FakeForge::new()
            .with_traces(
                7,
                vec![
                    Some(numbered(0..5)),
                    Some(numbered(0..8)),
                    Some(numbered(0..9)),
                ],
            )
            .with_statuses(7, vec![JobStatus::Running, JobStatus::Success]);
        let mut out = Vec::new();

        stream_trace(&api, "grp/app", job(7, "rspec", JobStatus::Running), &fast(20), &mut out)
            .await
            .unwrap();

        assert_eq!(printed(&out), (0..9).map(|n| format!("line {n}")).collect::<Vec<_>>());
        // poll 1 (running) -> status running, poll 2 -> status success, poll 3 flushes and stops
        assert_eq!(api.count_calls("trace:"), 3);
        assert_eq!(api.count_calls("job:"), 2);
    }

    #[tokio::test]
    async fn finished_job_is_printed_once_without_status_polls() {
        let api = FakeForge::new().with_traces(3, vec![Some("done\nno newline".to_string())]);
        let mut out = Vec::new();

        stream_trace(&api, "p", job(3, "lint", JobStatus::Failed), &fast(20), &mut out)
            .await
            .unwrap();

        assert_eq!(printed(&out), vec!["done", "no newline"]);
        assert_eq!(api.count_calls("trace:"), 1);
        assert_eq!(api.count_calls("job:"), 0);
    }

    #[tokio::test]
    async fn failed_trace_fetch_is_skipped() {
        let api = FakeForge::new()
            .with_traces(4, vec![Some(numbered(0..2)), None, Some(numbered(0..4))])
            .with_statuses(4, vec![JobStatus::Running, JobStatus::Running, JobStatus::Success]);
        let mut out = Vec::new();

        stream_trace(&api, "p", job(4, "deploy", JobStatus::Pending), &fast(20), &mut out)
            .await
            .unwrap();

        assert_eq!(printed(&out), vec!["line 0", "line 1", "line 2", "line 3"]);
    }

    #[tokio::test]
    async fn prefix_is_the_job_name() {
        let api = FakeForge::new().with_traces(1, vec![Some("hello\n".to_string())]);
        let mut out = Vec::new();

        stream_trace(&api, "p", job(1, "build", JobStatus::Success), &fast(20), &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let plain = dialoguer::console::strip_ansi_codes(&text).into_owned();
        assert_eq!(plain, "[build] hello\n");
    }

    #[tokio::test]
    async fn running_jobs_are_streamed_independently() {
        let api = Arc::new(
            FakeForge::new()
                .with_traces(1, vec![Some("a1\n".into()), Some("a1\na2\n".into())])
                .with_statuses(1, vec![JobStatus::Success])
                .with_traces(2, vec![Some("b1\n".into())])
                .with_statuses(2, vec![JobStatus::Failed]),
        );
        let buffers: Arc<Mutex<Vec<SharedBuf>>> = Arc::default();
        let make_writer = {
            let buffers = Arc::clone(&buffers);
            move || {
                let buf = SharedBuf::default();
                buffers.lock().unwrap().push(buf.clone());
                buf
            }
        };

        let jobs = vec![
            job(1, "unit", JobStatus::Running),
            job(2, "e2e", JobStatus::Pending),
            job(3, "docs", JobStatus::Success),
        ];
        let all_done = stream_running_jobs(Arc::clone(&api), "p", jobs, &fast(20), make_writer).await;

        assert!(!all_done);
        assert_eq!(api.count_calls("trace:p:3"), 0);

        let mut outputs: Vec<Vec<String>> = buffers
            .lock()
            .unwrap()
            .iter()
            .map(|b| printed(&b.0.lock().unwrap()))
            .collect();
        outputs.sort();
        assert_eq!(outputs, vec![vec!["a1", "a2"], vec!["b1"]]);
    }

    #[tokio::test]
    async fn nothing_running_means_all_done() {
        let api = Arc::new(FakeForge::new());
        let jobs = vec![job(1, "unit", JobStatus::Success), job(2, "e2e", JobStatus::Manual)];
        assert!(stream_running_jobs(api, "p", jobs, &fast(20), Vec::<u8>::new).await);
    }
}
