// SPDX-License-Identifier: MIT

//! dg: the DevGodzilla CLI.
//!
//! Thin client over the daemon socket. Exit codes: 0 ok, 1 runtime
//! error, 2 invalid usage/config (clap uses 2 for parse errors).

mod client;

use clap::{Parser, Subcommand};
use dg_daemon::protocol::{ProtocolAction, Request, Response, StepAction};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "dg", version, about = "DevGodzilla pipeline orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check daemon liveness
    Ping,
    /// Readiness with component breakdown
    Ready,
    /// Ask the daemon to shut down
    Shutdown,

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Manage protocol runs
    #[command(subcommand)]
    Protocol(ProtocolCommand),
    /// Act on steps
    #[command(subcommand)]
    Step(StepCommand),
    /// Inspect job runs
    #[command(subcommand)]
    Run(RunCommand),
    /// Recent events
    Events {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        protocol_id: Option<u64>,
        #[arg(long)]
        project_id: Option<u64>,
        #[arg(long)]
        event_type: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Reconcile with the external executor
    Reconcile {
        #[arg(long)]
        protocol_id: Option<u64>,
        #[arg(long)]
        dry_run: bool,
        /// Show the last report instead of running
        #[arg(long)]
        status: bool,
    },
    /// Recover stuck protocols
    Recover,
}

#[derive(Subcommand)]
enum ProjectCommand {
    Create {
        name: String,
        #[arg(long)]
        git_url: Option<String>,
        #[arg(long)]
        base_branch: Option<String>,
        #[arg(long)]
        local_path: Option<String>,
    },
    List {
        #[arg(long)]
        archived: bool,
    },
    Show {
        id: u64,
    },
    Archive {
        id: u64,
    },
    Unarchive {
        id: u64,
    },
    Delete {
        id: u64,
    },
}

#[derive(Subcommand)]
enum ProtocolCommand {
    Create {
        project_id: u64,
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// JSON template config ({"steps": [...]})
        #[arg(long)]
        template: Option<String>,
    },
    List {
        #[arg(long)]
        project_id: Option<u64>,
    },
    Show {
        id: u64,
    },
    Start {
        id: u64,
    },
    Pause {
        id: u64,
    },
    Resume {
        id: u64,
    },
    Cancel {
        id: u64,
    },
    /// Check completion and settle the protocol if every step is done
    Complete {
        id: u64,
    },
}

#[derive(Subcommand)]
enum StepCommand {
    Run {
        id: u64,
        #[arg(long)]
        engine: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    Retry {
        id: u64,
        #[arg(long)]
        engine: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    Qa {
        id: u64,
    },
}

#[derive(Subcommand)]
enum RunCommand {
    List {
        #[arg(long)]
        protocol_id: Option<u64>,
        #[arg(long)]
        step_id: Option<u64>,
    },
    Show {
        run_id: String,
    },
    Logs {
        run_id: String,
        #[arg(long, default_value_t = 200_000)]
        max_bytes: usize,
    },
}

fn to_request(command: Command) -> Request {
    match command {
        Command::Ping => Request::Ping,
        Command::Ready => Request::Ready,
        Command::Shutdown => Request::Shutdown,
        Command::Project(command) => match command {
            ProjectCommand::Create {
                name,
                git_url,
                base_branch,
                local_path,
            } => Request::CreateProject {
                name,
                git_url,
                base_branch,
                local_path,
                policy_overrides: None,
            },
            ProjectCommand::List { archived } => Request::ListProjects {
                status: archived.then_some(dg_core::ProjectStatus::Archived),
            },
            ProjectCommand::Show { id } => Request::GetProject { id },
            ProjectCommand::Archive { id } => Request::ArchiveProject { id },
            ProjectCommand::Unarchive { id } => Request::UnarchiveProject { id },
            ProjectCommand::Delete { id } => Request::DeleteProject { id },
        },
        Command::Protocol(command) => match command {
            ProtocolCommand::Create {
                project_id,
                name,
                description,
                template,
            } => Request::CreateProtocol {
                project_id,
                protocol_name: name,
                base_branch: None,
                description: description.unwrap_or_default(),
                template_config: template
                    .and_then(|t| serde_json::from_str(&t).ok()),
            },
            ProtocolCommand::List { project_id } => Request::ListProtocols {
                project_id,
                limit: 0,
            },
            ProtocolCommand::Show { id } => Request::GetProtocol { id },
            ProtocolCommand::Start { id } => Request::ProtocolAction {
                id,
                action: ProtocolAction::Start,
            },
            ProtocolCommand::Pause { id } => Request::ProtocolAction {
                id,
                action: ProtocolAction::Pause,
            },
            ProtocolCommand::Resume { id } => Request::ProtocolAction {
                id,
                action: ProtocolAction::Resume,
            },
            ProtocolCommand::Cancel { id } => Request::ProtocolAction {
                id,
                action: ProtocolAction::Cancel,
            },
            ProtocolCommand::Complete { id } => Request::CheckCompleteProtocol { id },
        },
        Command::Step(command) => match command {
            StepCommand::Run { id, engine, model } => Request::StepAction {
                id,
                action: StepAction::Run,
                engine_id: engine,
                model,
            },
            StepCommand::Retry { id, engine, model } => Request::StepAction {
                id,
                action: StepAction::Retry,
                engine_id: engine,
                model,
            },
            StepCommand::Qa { id } => Request::StepAction {
                id,
                action: StepAction::Qa,
                engine_id: None,
                model: None,
            },
        },
        Command::Run(command) => match command {
            RunCommand::List {
                protocol_id,
                step_id,
            } => Request::ListRuns {
                project_id: None,
                protocol_run_id: protocol_id,
                step_run_id: step_id,
                status: None,
                job_type: None,
                limit: 0,
            },
            RunCommand::Show { run_id } => Request::GetRun { run_id },
            RunCommand::Logs { run_id, max_bytes } => Request::GetRunLogs { run_id, max_bytes },
        },
        Command::Events {
            limit,
            protocol_id,
            project_id,
            event_type,
            category,
        } => Request::RecentEvents {
            limit,
            project_id,
            protocol_id,
            event_type,
            category,
        },
        Command::Reconcile {
            protocol_id,
            dry_run,
            status,
        } => {
            if status {
                Request::ReconciliationStatus
            } else {
                Request::Reconcile {
                    protocol_run_id: protocol_id,
                    dry_run,
                }
            }
        }
        Command::Recover => Request::RecoverStuck,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let socket = match client::socket_path() {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("dg: configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let request = to_request(cli.command);
    match client::roundtrip(&socket, &request).await {
        Ok(Response::Error { kind, message }) => {
            eprintln!("dg: {kind:?}: {message}");
            ExitCode::from(1)
        }
        Ok(response) => {
            match serde_json::to_string_pretty(&response) {
                Ok(json) => println!("{json}"),
                Err(_) => println!("{response:?}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("dg: {e}");
            ExitCode::from(1)
        }
    }
}
