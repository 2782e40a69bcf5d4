use clap::{Parser, Subcommand};

use crew::commands::{self, RunOptions};

#[derive(Parser)]
#[command(
    name = "crew",
    version,
    about = "Orchestrate a crew of terminal-hosted AI coding agents through multi-stage workflows"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scaffold the .crew/ directory in the current project.
    Init {
        /// Overwrite an existing .crew/ directory.
        #[arg(long)]
        force: bool,
    },
    /// Start a workflow with a goal and run it to completion.
    Start {
        /// Workflow definition name, e.g. dev-cycle.
        workflow: String,
        /// What the crew should accomplish.
        goal: String,
        /// Approve all human gates automatically.
        #[arg(long)]
        auto_approve: bool,
        /// Seconds of agent idleness before a nudge is sent.
        #[arg(long)]
        nudge_interval: Option<u64>,
        /// Leave the tmux session running after the workflow ends.
        #[arg(long)]
        keep_session: bool,
    },
    /// Resume a stopped workflow with fresh agents.
    Continue {
        /// Approve all human gates automatically.
        #[arg(long)]
        auto_approve: bool,
        /// Seconds of agent idleness before a nudge is sent.
        #[arg(long)]
        nudge_interval: Option<u64>,
        /// Leave the tmux session running after the workflow ends.
        #[arg(long)]
        keep_session: bool,
    },
    /// Stop the running workflow and tear down the tmux session.
    Stop,
    /// Relaunch one agent of the running session by name.
    Restart {
        /// Agent name as shown by `crew status`.
        agent: String,
    },
    /// List the workflow definitions available to `crew start`.
    List,
    /// Show workflow and agent status.
    Status,
    /// Approve the pending human gate.
    Approve,
    /// Reject the pending human gate and end the workflow.
    Reject,
    /// Check that tmux and the provider CLIs are installed.
    Doctor,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("Error: cannot determine working directory: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init { force } => commands::init(&cwd, force),
        Commands::Start {
            workflow,
            goal,
            auto_approve,
            nudge_interval,
            keep_session,
        } => {
            let options = RunOptions {
                auto_approve,
                nudge_interval,
                keep_session,
                debug: cli.debug,
            };
            commands::start(&cwd, &workflow, &goal, &options).await
        }
        Commands::Continue {
            auto_approve,
            nudge_interval,
            keep_session,
        } => {
            let options = RunOptions {
                auto_approve,
                nudge_interval,
                keep_session,
                debug: cli.debug,
            };
            commands::continue_run(&cwd, &options).await
        }
        Commands::Stop => commands::stop(&cwd),
        Commands::Restart { agent } => commands::restart(&cwd, &agent).await,
        Commands::List => commands::list(&cwd),
        Commands::Status => commands::status(&cwd),
        Commands::Approve => commands::approve(&cwd),
        Commands::Reject => commands::reject(&cwd),
        Commands::Doctor => commands::doctor(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
