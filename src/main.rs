//! Classroom Pulse CLI
//!
//! Runs the session server, drives sessions as faculty, joins as a student
//! and watches a group's live dashboard.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use classroom_pulse::{
    capture::{CaptureConfig, CaptureController, CapturePhase, StopReason, SyntheticCamera},
    client::{device_id, ClientConfig, SessionClient},
    config::Config,
    core::{EmotionLabel, GroupId, HintClassifier, ProfileUpdate, SessionHub, SessionId, StudentId},
    dashboard::{format_elapsed, Dashboard, FollowEnd, PollEvent},
    protocol::ScheduleRequest,
    server::{self, ServerConfig},
    AggregateSnapshot, PRIVACY_DECLARATION, VERSION,
};
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "classroom-pulse")]
#[command(version = VERSION)]
#[command(about = "Live classroom engagement sessions", long_about = None)]
struct Cli {
    /// Session server URL (overrides the configured one)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Schedule a session for a group
    Schedule {
        group_id: GroupId,
        topic: String,
        /// Planned start, RFC 3339 or "YYYY-MM-DD HH:MM:SS" (UTC)
        #[arg(long)]
        start: String,
        /// Planned end, same formats as --start
        #[arg(long)]
        end: String,
    },

    /// Start a session for a group right now
    Start { group_id: GroupId, topic: String },

    /// Start a previously scheduled session
    StartScheduled { session_id: SessionId },

    /// End a live session and print its attendance summary
    End { session_id: SessionId },

    /// Join a live session as a student and stream frames until it ends
    Join {
        session_id: SessionId,
        student_id: StudentId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        roll_no: Option<String>,
        /// Comma-separated raw emotions for the synthetic camera to cycle
        #[arg(long)]
        hints: Option<String>,
        /// Simulate the camera permission being refused
        #[arg(long)]
        deny_camera: bool,
    },

    /// Attach to a group's live session and follow its snapshot
    Watch { group_id: GroupId },

    /// Show the live and scheduled sessions of a group
    Status { group_id: GroupId },

    /// Print the attendance summary of an ended session
    Summary { session_id: SessionId },

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: could not load config, using defaults: {e}");
        Config::default()
    });
    if let Some(server) = cli.server {
        config.server_url = server;
    }

    match cli.command {
        Commands::Serve { host, port } => cmd_serve(config, host, port).await,
        Commands::Schedule {
            group_id,
            topic,
            start,
            end,
        } => cmd_schedule(&config, group_id, topic, start, end).await,
        Commands::Start { group_id, topic } => cmd_start(&config, group_id, &topic).await,
        Commands::StartScheduled { session_id } => cmd_start_scheduled(&config, session_id).await,
        Commands::End { session_id } => cmd_end(&config, session_id).await,
        Commands::Join {
            session_id,
            student_id,
            name,
            roll_no,
            hints,
            deny_camera,
        } => {
            let profile = ProfileUpdate { name, roll_no };
            cmd_join(&config, session_id, student_id, profile, hints, deny_camera).await
        }
        Commands::Watch { group_id } => cmd_watch(&config, group_id).await,
        Commands::Status { group_id } => cmd_status(&config, group_id).await,
        Commands::Summary { session_id } => cmd_summary(&config, session_id).await,
        Commands::Privacy => {
            println!("{PRIVACY_DECLARATION}");
            Ok(())
        }
        Commands::Config => cmd_config(&config),
    }
}

fn client(config: &Config) -> Result<SessionClient> {
    let client_config = ClientConfig::new(config.server_url.clone()).with_timeout(config.request_timeout);
    SessionClient::new(client_config).context("failed to build HTTP client")
}

/// Cancellation token tripped by Ctrl+C.
fn interrupt_token() -> Result<CancellationToken> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("error setting Ctrl-C handler")?;
    Ok(token)
}

async fn cmd_serve(config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or(config.host.clone());
    let host: IpAddr = host
        .parse()
        .with_context(|| format!("invalid bind address '{host}'"))?;

    let server_config = ServerConfig {
        host,
        port: port.unwrap_or(config.port),
        hub: config.hub_config(),
    };
    let hub = Arc::new(SessionHub::new(
        Arc::new(HintClassifier),
        server_config.hub.clone(),
    ));

    println!("Classroom Pulse v{VERSION}");
    let (addr, shutdown) = server::run(server_config, hub).await?;
    println!("Serving on http://{addr}");
    println!("Press Ctrl+C to stop");

    interrupt_token()?.cancelled().await;
    println!();
    println!("Shutting down...");
    let _ = shutdown.send(());
    Ok(())
}

async fn cmd_schedule(
    config: &Config,
    group_id: GroupId,
    topic: String,
    start: String,
    end: String,
) -> Result<()> {
    let request = ScheduleRequest {
        group_id,
        topic,
        scheduled_start: start,
        scheduled_end: end,
    };
    let session_id = client(config)?.schedule(&request).await?;
    println!("Scheduled session {session_id} for group {group_id}");
    Ok(())
}

async fn cmd_start(config: &Config, group_id: GroupId, topic: &str) -> Result<()> {
    let started = client(config)?.start_instant(group_id, topic).await?;
    println!(
        "Session {} is live (started {})",
        started.session_id,
        started.start_time.format("%H:%M:%S")
    );
    Ok(())
}

async fn cmd_start_scheduled(config: &Config, session_id: SessionId) -> Result<()> {
    let started = client(config)?.start_scheduled(session_id).await?;
    println!(
        "Session {} is live (started {})",
        started.session_id,
        started.start_time.format("%H:%M:%S")
    );
    Ok(())
}

async fn cmd_end(config: &Config, session_id: SessionId) -> Result<()> {
    let ended = client(config)?.end_session(session_id).await?;
    println!(
        "Session {} ended at {}",
        ended.session_id,
        ended.end_time.format("%H:%M:%S")
    );
    match ended.summary {
        Some(summary) => print_summary(&summary),
        None => println!("No telemetry was recorded."),
    }
    Ok(())
}

async fn cmd_join(
    config: &Config,
    session_id: SessionId,
    student_id: StudentId,
    profile: ProfileUpdate,
    hints: Option<String>,
    deny_camera: bool,
) -> Result<()> {
    println!("{PRIVACY_DECLARATION}");

    let camera = if deny_camera {
        SyntheticCamera::denied()
    } else {
        match hints {
            Some(hints) => SyntheticCamera::with_hints(
                hints
                    .split(',')
                    .map(|h| h.trim().to_string())
                    .filter(|h| !h.is_empty())
                    .collect(),
            ),
            None => SyntheticCamera::new(),
        }
    };

    let mut capture_config = CaptureConfig::new(session_id, student_id);
    capture_config.profile = profile;
    capture_config.interval = config.capture_interval;
    capture_config.submit_timeout = config.submit_timeout;

    let sink = client(config)?;
    println!("Device ID: {}", device_id());

    let mut controller = CaptureController::new(capture_config);
    let mut updates = controller.subscribe();
    if let Err(e) = controller.join(camera, sink) {
        if let Some(notice) = controller.status().notice {
            eprintln!("{notice}");
        }
        return Err(e.into());
    }

    println!("Joined session {session_id}. Press Ctrl+C to leave.");
    let interrupt = interrupt_token()?;
    let mut last_label: Option<EmotionLabel> = None;

    let reason = loop {
        tokio::select! {
            biased;
            _ = interrupt.cancelled() => break StopReason::Left,
            changed = updates.changed() => {
                if changed.is_err() {
                    break StopReason::Left;
                }
                let status = updates.borrow_and_update().clone();
                if status.last_label != last_label {
                    if let Some(label) = status.last_label {
                        println!("[{}] {label}", status.sample_count);
                    }
                    last_label = status.last_label;
                }
                if let CapturePhase::Stopped(reason) = status.phase {
                    break reason;
                }
            }
        }
    };

    if reason == StopReason::Left {
        controller.leave().await;
        println!();
        println!("Left session {session_id}.");
    } else if let Some(notice) = controller.status().notice {
        println!();
        println!("{notice}");
    }

    println!();
    println!("{}", controller.stats().summary());
    Ok(())
}

async fn cmd_watch(config: &Config, group_id: GroupId) -> Result<()> {
    let dashboard = Dashboard::new(client(config)?, config.poll_interval);
    let Some(view) = dashboard.recover(group_id).await? else {
        println!("No live session for group {group_id}.");
        return Ok(());
    };

    println!(
        "Following session {} \"{}\" (live for {})",
        view.session_id,
        view.topic,
        format_elapsed(view.elapsed(Utc::now()))
    );
    println!("Press Ctrl+C to stop");

    let interrupt = interrupt_token()?;
    let end = dashboard
        .follow(view.session_id, &interrupt, |event| match event {
            PollEvent::Snapshot(snapshot) => {
                print_snapshot(&format_elapsed(view.elapsed(Utc::now())), &snapshot)
            }
            PollEvent::Disconnected(reason) => eprintln!("[dashboard] disconnected: {reason}"),
        })
        .await?;

    if end == FollowEnd::SessionEnded {
        println!("Session {} has ended.", view.session_id);
    }
    Ok(())
}

async fn cmd_status(config: &Config, group_id: GroupId) -> Result<()> {
    let client = client(config)?;

    println!("Classroom Pulse Status");
    println!("======================");
    println!();

    match client.health().await {
        Ok(health) => println!("Server: {} ({}, v{})", client.base_url(), health.status, health.version),
        Err(e) => {
            println!("Server: {} (unreachable: {e})", client.base_url());
            return Ok(());
        }
    }
    println!();

    let current = client.current_live(group_id).await?;
    match (current.session_id, current.start_time) {
        (Some(session_id), Some(start)) if current.active => println!(
            "Live: session {session_id} \"{}\" for {}",
            current.topic.unwrap_or_default(),
            format_elapsed(Utc::now() - start)
        ),
        _ => println!("Live: none"),
    }

    let scheduled = client.scheduled_sessions(group_id).await?;
    if scheduled.is_empty() {
        println!("Scheduled: none");
    } else {
        println!("Scheduled:");
        for session in scheduled {
            let window = match (session.scheduled_start, session.scheduled_end) {
                (Some(start), Some(end)) => format!(
                    "{} - {}",
                    start.format("%Y-%m-%d %H:%M"),
                    end.format("%H:%M")
                ),
                _ => "unscheduled".to_string(),
            };
            println!("  {} {} ({window})", session.session_id, session.topic);
        }
    }
    Ok(())
}

async fn cmd_summary(config: &Config, session_id: SessionId) -> Result<()> {
    let summary = client(config)?.summary(session_id).await?;
    print_summary(&summary);
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    println!("Configuration file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn print_snapshot(elapsed: &str, snapshot: &AggregateSnapshot) {
    let moods: Vec<String> = snapshot
        .mood_distribution
        .iter()
        .filter(|&(_, &count)| count > 0)
        .map(|(label, count)| format!("{label}={count}"))
        .collect();
    println!(
        "[{elapsed}] active: {} | engagement: {}% | {}",
        snapshot.total_active,
        snapshot.engagement_score,
        moods.join(" ")
    );
}

fn print_summary(summary: &classroom_pulse::AttendanceSummary) {
    println!();
    println!("Attendance: {} ({} min)", summary.topic, summary.duration_minutes);
    println!("  Average attendance: {:.2}%", summary.avg_attendance_percentage);
    if let Some(mood) = summary.dominant_class_mood {
        println!("  Class mood: {mood}");
    }
    for student in &summary.students {
        println!(
            "  {:>6} {:<24} {:>6.2} min {:>6.2}% {}",
            student.student_id,
            student.name,
            student.minutes_detected,
            student.attendance_percentage,
            student
                .dominant_mood
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
}
