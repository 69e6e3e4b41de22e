//! Console client for the SDM download manager
//!
//! Talks to a running sdm-engine instance over its REST API. Mirrors the
//! daemon's task lifecycle: add, start, pause, resume, stop, plus segment
//! inspection, speed limiting, settings, statistics, and a live event
//! stream.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use reqwest::StatusCode;
use sdm_common::api::{
    CreateTaskRequest, SegmentListResponse, SettingsInfo, SettingsUpdate, SpeedLimit,
    StatsResponse, StatusResponse, TaskListResponse,
};
use sdm_common::model::DownloadTask;
use serde::de::DeserializeOwned;

#[derive(Parser, Debug)]
#[command(name = "sdm-ctl")]
#[command(about = "Console client for the SDM download manager")]
#[command(version)]
struct Cli {
    /// Base URL of the sdm-engine API
    #[arg(long, default_value = "http://127.0.0.1:5780", env = "SDM_URL")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new download task
    Add {
        url: String,
        file_name: String,
        /// Additional source URLs serving the same content (repeatable)
        #[arg(long = "mirror")]
        mirrors: Vec<String>,
    },
    /// List all tasks
    List,
    /// Show one task
    Show { id: i64 },
    /// Show the segments of a task
    Seg { id: i64 },
    /// Start a task
    Start { id: i64 },
    /// Pause a running task
    Pause { id: i64 },
    /// Resume a paused task
    Resume { id: i64 },
    /// Stop a task
    Stop { id: i64 },
    /// Set the global speed limit in bytes per second (0 = unlimited)
    Speed { bytes_per_sec: i64 },
    /// Show completed/failed counters
    Stats,
    /// Show or change the download directories
    Settings {
        #[arg(long)]
        download_dir: Option<String>,
        #[arg(long)]
        incomplete_dir: Option<String>,
    },
    /// Follow the live event stream, optionally for a single task
    Watch { id: Option<i64> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    match cli.command {
        Command::Add {
            url,
            file_name,
            mirrors,
        } => {
            let task: DownloadTask = expect_json(
                client
                    .post(format!("{}/api/tasks", base))
                    .json(&CreateTaskRequest {
                        url,
                        file_name,
                        mirrors,
                    })
                    .send()
                    .await?,
            )
            .await?;
            println!("added task id={}", task.id);
        }
        Command::List => {
            let list: TaskListResponse =
                expect_json(client.get(format!("{}/api/tasks", base)).send().await?).await?;
            if list.tasks.is_empty() {
                println!("no tasks");
            }
            for task in list.tasks {
                print_task(&task);
            }
        }
        Command::Show { id } => {
            let task: DownloadTask = expect_json(
                client
                    .get(format!("{}/api/tasks/{}", base, id))
                    .send()
                    .await?,
            )
            .await?;
            print_task(&task);
        }
        Command::Seg { id } => {
            let list: SegmentListResponse = expect_json(
                client
                    .get(format!("{}/api/tasks/{}/segments", base, id))
                    .send()
                    .await?,
            )
            .await?;
            if list.segments.is_empty() {
                println!("no segments (single-stream task or not started yet)");
            }
            for seg in list.segments {
                println!(
                    "segment {:>3}  range={}-{}  {:>10}/{:<10}  {:>6.2}%  {}",
                    seg.index,
                    seg.start_byte,
                    seg.end_byte,
                    seg.downloaded_bytes,
                    seg.len(),
                    seg.progress() * 100.0,
                    seg.status
                );
            }
        }
        Command::Start { id } => control(&client, &base, id, "start").await?,
        Command::Pause { id } => control(&client, &base, id, "pause").await?,
        Command::Resume { id } => control(&client, &base, id, "resume").await?,
        Command::Stop { id } => control(&client, &base, id, "stop").await?,
        Command::Speed { bytes_per_sec } => {
            let limit: SpeedLimit = expect_json(
                client
                    .put(format!("{}/api/speed", base))
                    .json(&SpeedLimit { bytes_per_sec })
                    .send()
                    .await?,
            )
            .await?;
            if limit.bytes_per_sec == 0 {
                println!("speed limit: unlimited");
            } else {
                println!("speed limit: {} B/s", limit.bytes_per_sec);
            }
        }
        Command::Stats => {
            let stats: StatsResponse =
                expect_json(client.get(format!("{}/api/stats", base)).send().await?).await?;
            println!("completed: {}", stats.completed);
            println!("failed:    {}", stats.failed);
        }
        Command::Settings {
            download_dir,
            incomplete_dir,
        } => {
            let settings: SettingsInfo =
                if download_dir.is_none() && incomplete_dir.is_none() {
                    expect_json(client.get(format!("{}/api/settings", base)).send().await?)
                        .await?
                } else {
                    expect_json(
                        client
                            .put(format!("{}/api/settings", base))
                            .json(&SettingsUpdate {
                                download_dir,
                                incomplete_dir,
                            })
                            .send()
                            .await?,
                    )
                    .await?
                };
            println!("download dir:   {}", settings.download_dir);
            println!("incomplete dir: {}", settings.incomplete_dir);
        }
        Command::Watch { id } => watch(&client, &base, id).await?,
    }

    Ok(())
}

async fn control(client: &reqwest::Client, base: &str, id: i64, action: &str) -> Result<()> {
    let status: StatusResponse = expect_json(
        client
            .post(format!("{}/api/tasks/{}/{}", base, id, action))
            .send()
            .await?,
    )
    .await?;
    println!("task {}: {}", id, status.status);
    Ok(())
}

/// Decode a JSON response, surfacing the server's error message on non-2xx
async fn expect_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.context("invalid response body");
    }

    let message = match resp.json::<StatusResponse>().await {
        Ok(body) => body.status,
        Err(_) => format!("HTTP {}", status),
    };

    if status == StatusCode::NOT_FOUND {
        bail!("not found: {}", message);
    }
    bail!("{}", message);
}

fn print_task(task: &DownloadTask) {
    let total = task
        .total_bytes
        .map(|t| t.to_string())
        .unwrap_or_else(|| "?".to_string());
    println!(
        "task {:>4}  {:<10}  {:>10}/{:<10}  {:>6.2}%  {}  -> {}",
        task.id,
        task.status.to_string(),
        task.downloaded_bytes,
        total,
        task.progress() * 100.0,
        task.url,
        task.file_name
    );
}

/// Print SSE data lines from the daemon's event stream until interrupted
async fn watch(client: &reqwest::Client, base: &str, task_id: Option<i64>) -> Result<()> {
    let resp = client
        .get(format!("{}/api/events", base))
        .send()
        .await
        .context("failed to connect to event stream")?;
    if !resp.status().is_success() {
        bail!("event stream answered HTTP {}", resp.status());
    }

    println!("watching events (ctrl-c to quit)");
    let mut stream = resp.bytes_stream();
    let mut buf = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buf.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buf.find('\n') {
            let line: String = buf.drain(..=pos).collect();
            let line = line.trim_end();
            if let Some(data) = line.strip_prefix("data: ") {
                if let Some(wanted) = task_id {
                    let matches = serde_json::from_str::<serde_json::Value>(data)
                        .ok()
                        .and_then(|v| v.get("task_id").and_then(|id| id.as_i64()))
                        .map(|id| id == wanted)
                        .unwrap_or(false);
                    if !matches {
                        continue;
                    }
                }
                println!("{}", data);
            }
        }
    }

    Ok(())
}
