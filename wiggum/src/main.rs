//! Builder/verifier agent loop harness.
//!
//! Without a subcommand, runs the loop against the repository named by
//! `--repo-root` / `WIGGUM_REPO_ROOT` (default: the current directory).

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use wiggum::core::policy::{CommandPolicy, PolicyConfig};
use wiggum::core::types::{CommandDecision, LoopStatus};
use wiggum::exit_codes;
use wiggum::io::claude::ClaudeCliExecutor;
use wiggum::io::config::{
    CliOverrides, ENV_HARNESS_DIR, ENV_REPO_ROOT, Settings, default_config_path, load_config,
};
use wiggum::io::console;
use wiggum::io::executor::QueryOptions;
use wiggum::io::hook::{VerifierHook, answer_hook};
use wiggum::io::prompt::{PromptSource, SanityPrompts, TemplatePrompts};
use wiggum::io::summary_log::SummaryLog;
use wiggum::logging;
use wiggum::looping::{IterationRecord, LoopConfig, LoopEvent, run_loop};
use wiggum::session::SessionRunner;
use wiggum::startup;

#[derive(Parser)]
#[command(
    name = "wiggum",
    version,
    about = "Builder/verifier agent loop harness"
)]
struct Cli {
    /// Run fixed trivial prompts to prove the loop works (1 loop, no cooldown).
    #[arg(long)]
    sanity_check: bool,

    /// Config file (default: <repo-root>/harness/wiggum.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Repository the agents work in.
    #[arg(long, global = true, value_name = "DIR")]
    repo_root: Option<PathBuf>,

    /// Iteration budget.
    #[arg(long, value_name = "N")]
    max_loops: Option<u32>,

    /// Pause between iterations.
    #[arg(long, value_name = "SECS")]
    cooldown_secs: Option<u64>,

    /// Suppress progress output.
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one pre-tool-use hook call from the executor (stdin -> stdout).
    #[command(hide = true)]
    Hook {
        /// Path the verifier may not delete or move (repeatable).
        #[arg(long = "protect", value_name = "PATH")]
        protect: Vec<String>,

        /// Command prefix the verifier may not run (repeatable).
        #[arg(long = "deny-command", value_name = "CMD")]
        deny_command: Vec<String>,
    },
    /// Evaluate a shell command against the verifier policy (exit 0 allow, 1 deny).
    Check {
        /// The full command line, quoted as one argument.
        command: String,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::FAILURE
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Some(Command::Hook {
            protect,
            deny_command,
        }) => cmd_hook(protect, deny_command),
        Some(Command::Check { command }) => cmd_check(&cli, command),
        None => cmd_run(&cli),
    }
}

fn cmd_hook(protect: &[String], deny_command: &[String]) -> Result<i32> {
    let hook = VerifierHook::new(PolicyConfig {
        protected_paths: protect.to_vec(),
        denied_commands: deny_command.to_vec(),
    })?;
    match answer_hook(&hook, io::stdin().lock(), io::stdout().lock()) {
        Ok(_) => Ok(exit_codes::OK),
        Err(err) => {
            // The executor treats this exit code as "block the tool call".
            eprintln!("wiggum hook: {:#}", err);
            Ok(exit_codes::HOOK_BLOCK)
        }
    }
}

fn cmd_check(cli: &Cli, command: &str) -> Result<i32> {
    let settings = load_settings(cli)?;
    let policy = CommandPolicy::new(&settings.policy)?;
    match policy.evaluate(command) {
        CommandDecision::Allow => {
            println!("allow");
            Ok(exit_codes::OK)
        }
        CommandDecision::Deny { reason } => {
            println!("deny: {reason}");
            Ok(exit_codes::FAILURE)
        }
    }
}

fn cmd_run(cli: &Cli) -> Result<i32> {
    let settings = load_settings(cli)?;
    startup::prepare(&settings)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    runtime.block_on(run_harness(&settings, cli.quiet))
}

async fn run_harness(settings: &Settings, quiet: bool) -> Result<i32> {
    let hook = Arc::new(VerifierHook::new(settings.policy.clone())?);
    let hook_exe = std::env::current_exe().context("locate the wiggum executable")?;
    let executor = ClaudeCliExecutor::new(&settings.executor, hook_exe);
    let options = QueryOptions {
        cwd: settings.repo_root.clone(),
        setting_sources: settings.executor.setting_sources.clone(),
        permission_mode: settings.executor.permission_mode.clone(),
        model: settings.executor.model.clone(),
        hook: None,
    };
    let sessions = SessionRunner::new(&executor, settings.log_dir.clone(), options, hook)
        .with_console(!quiet);
    let summary = SummaryLog::new(&settings.log_dir);
    let prompts: Box<dyn PromptSource> = if settings.sanity_check {
        Box::new(SanityPrompts)
    } else {
        Box::new(TemplatePrompts::from_settings(settings)?)
    };

    if !quiet {
        console::banner(settings, summary.path());
    }
    let config = LoopConfig {
        max_iterations: settings.max_loops,
        cooldown: settings.cooldown,
    };
    let outcome = run_loop(&sessions, prompts.as_ref(), &summary, &config, |event| {
        if quiet {
            return;
        }
        match event {
            LoopEvent::IterationStarted {
                iteration,
                max_iterations,
            } => console::iteration_start(iteration, max_iterations),
            LoopEvent::IterationFinished(record) => report_iteration(record, &config),
        }
    })
    .await?;

    match outcome.status {
        LoopStatus::Success => {
            console::verified(outcome.builder_sessions() as u32);
            Ok(exit_codes::OK)
        }
        LoopStatus::Exhausted | LoopStatus::Pending => {
            console::exhausted(config.max_iterations, &outcome.summary_log);
            Ok(exit_codes::FAILURE)
        }
    }
}

fn report_iteration(record: &IterationRecord, config: &LoopConfig) {
    if record.verified() || record.iteration >= config.max_iterations {
        return;
    }
    let cooldown_secs = config.cooldown.as_secs();
    match &record.verifier {
        Some(verifier) => {
            console::verifier_rejected(verifier.verifier_report.is_some(), cooldown_secs);
        }
        None => console::builder_incomplete(cooldown_secs),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let repo_root = resolve_repo_root(cli.repo_root.as_deref())?;
    load_dotenv(&repo_root)?;

    let config_path = match &cli.config {
        Some(path) => {
            if !path.is_file() {
                bail!("config file not found: {}", path.display());
            }
            path.clone()
        }
        None => default_config_path(&repo_root, env_var(ENV_HARNESS_DIR).as_deref()),
    };
    let mut cfg = load_config(&config_path)?;
    cfg.apply_env(env_var)
        .with_context(|| format!("apply environment overrides to {}", config_path.display()))?;

    Settings::resolve(
        &repo_root,
        &cfg,
        &CliOverrides {
            max_loops: cli.max_loops,
            cooldown_secs: cli.cooldown_secs,
            sanity_check: cli.sanity_check,
        },
    )
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn resolve_repo_root(flag: Option<&Path>) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("read current directory")?;
    let root = match flag {
        Some(path) => path.to_path_buf(),
        None => env_var(ENV_REPO_ROOT)
            .filter(|value| !value.trim().is_empty())
            .map_or_else(|| cwd.clone(), PathBuf::from),
    };
    let root = if root.is_absolute() {
        root
    } else {
        cwd.join(root)
    };
    if !root.is_dir() {
        bail!("repo root is not a directory: {}", root.display());
    }
    Ok(root)
}

/// Load `<repo_root>/.env` without overriding variables already set.
fn load_dotenv(repo_root: &Path) -> Result<()> {
    let path = repo_root.join(".env");
    match dotenvy::from_path(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(err).with_context(|| format!("load {}", path.display())),
    }
}
