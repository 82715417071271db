//! `steward chat`: Interactive or single-message chat mode.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, bail};
use steward_agent::{AgentLoop, ProviderFactory, ProviderHandle};
use steward_config::AppConfig;
use steward_core::tool::ToolRegistry;
use steward_core::{CancelFlag, ExecutionMode, SessionStore};
use steward_providers::{KeyDiagnostics, ResolvedProvider, profiles};
use steward_security::{ApprovalGate, AuditLogger, RiskPolicy};
use steward_session::FileSessionStore;
use steward_telemetry::{EventLog, PricingTable, RuntimeBus};
use tracing::info;

use super::prompt::{TerminalDecider, read_line};
use super::slash::{self, HELP, SlashCommand};
use super::{env_lookup, load_config, render};

pub struct ChatOptions {
    pub message: Option<String>,
    pub mode: Option<ExecutionMode>,
    pub auto_approve: bool,
    pub session: Option<String>,
    pub resume: bool,
}

enum Flow {
    Continue,
    Exit,
}

/// Builds providers by name from the loaded config.
fn provider_factory(config: &AppConfig) -> ProviderFactory {
    let config = config.clone();
    Arc::new(move |name: &str| {
        let resolved = ResolvedProvider::resolve(&config, Some(name), &env_lookup);
        let provider = resolved.build()?;
        Ok(ProviderHandle {
            name: resolved.provider,
            model: resolved.model,
            provider,
        })
    })
}

pub async fn run(opts: ChatOptions) -> anyhow::Result<()> {
    let mut config = load_config()?;
    if let Some(mode) = opts.mode {
        config.agent.mode = mode;
    }
    if opts.auto_approve {
        config.agent.auto_approve = true;
    }

    let resolved = ResolvedProvider::resolve(&config, None, &env_lookup);
    let provider = match resolved.build() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("\n  ERROR: {e}\n");
            for line in KeyDiagnostics::collect(&config, None, &env_lookup).lines() {
                eprintln!("    {line}");
            }
            eprintln!("\n  Set AI_API_KEY or the provider's key variable, or add it to");
            eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
            bail!("no usable provider");
        }
    };

    let bus = Arc::new(
        RuntimeBus::builder(&resolved.provider, &resolved.model)
            .mode(config.agent.mode)
            .log(EventLog::from_config(&config.storage))
            .build(),
    );
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(&config.storage.history_dir));
    let tools: Arc<ToolRegistry> =
        Arc::new(steward_tools::default_registry(&config.storage.workspace_dir));
    let gate = ApprovalGate::new(Arc::new(RiskPolicy::from_config(&config)))
        .with_audit(Arc::new(AuditLogger::traced()))
        .with_actor("cli")
        .with_auto_approve(config.agent.auto_approve)
        .with_decider(Arc::new(TerminalDecider));
    let cancel = CancelFlag::new();

    let mut agent = AgentLoop::builder(provider, tools, bus.clone(), store)
        .gate(Arc::new(gate))
        .settings(config.agent.clone())
        .pricing(Arc::new(PricingTable::from_config(&config.pricing)))
        .cancel_flag(cancel.clone())
        .provider_factory(provider_factory(&config))
        .build();

    let renderer = tokio::spawn(render::print_events(bus.subscribe()));

    if let Some(id) = &opts.session {
        if !agent.switch_session(id).await? {
            bail!("session {id} not found");
        }
    } else if opts.resume && !agent.resume_latest().await? {
        eprintln!("  · nothing to resume, starting a new session");
    }

    if let Some(message) = opts.message {
        agent.run_turn(&message).await?;
        agent.shutdown("stop").await?;
        drop(agent);
        drop(bus);
        let _ = renderer.await;
        return Ok(());
    }

    let busy = Arc::new(AtomicBool::new(false));
    spawn_interrupt_handler(cancel, busy.clone(), bus.clone());

    println!();
    println!("  Steward · provider {} · model {}", resolved.provider, resolved.model);
    println!("  session {} · mode {}", agent.session().id, bus.mode());
    println!("  Type a message, /help for commands, /exit to quit.");

    loop {
        let Some(line) = read_line("\nyou> ").await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(parsed) = slash::parse(line) {
            match parsed {
                Ok(cmd) => {
                    if let Flow::Exit = handle(cmd, &mut agent, &config).await? {
                        break;
                    }
                }
                Err(usage) => eprintln!("  {usage}"),
            }
            continue;
        }

        busy.store(true, Ordering::SeqCst);
        let report = agent.run_turn(line).await;
        busy.store(false, Ordering::SeqCst);
        let report = report.context("Failed to save session")?;
        info!(outcome = report.outcome.reason(), steps = report.steps, "Turn finished");
    }

    agent.shutdown("exit").await?;
    println!("\n  Goodbye!");
    Ok(())
}

/// Ctrl-C cancels a running turn; when idle it ends the process.
fn spawn_interrupt_handler(cancel: CancelFlag, busy: Arc<AtomicBool>, bus: Arc<RuntimeBus>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if busy.load(Ordering::SeqCst) {
                cancel.cancel();
                eprintln!("\n  · cancelling...");
            } else {
                bus.finish("interrupted");
                eprintln!();
                std::process::exit(130);
            }
        }
    });
}

async fn handle(cmd: SlashCommand, agent: &mut AgentLoop, config: &AppConfig) -> anyhow::Result<Flow> {
    let bus = agent.bus().clone();
    match cmd {
        SlashCommand::Help => println!("{HELP}"),
        SlashCommand::Provider(None) => {
            println!("  provider: {} · model: {}", bus.provider(), bus.model());
        }
        SlashCommand::Provider(Some(name)) => match agent.switch_provider(&name).await {
            Ok(name) => println!("  switched to {name} · model {}", bus.model()),
            Err(e) => eprintln!("  cannot switch provider: {e}"),
        },
        SlashCommand::Providers => {
            let current = bus.provider();
            for name in profiles::list_providers() {
                let marker = if name == current { "*" } else { " " };
                let (label, compatible) = profiles::profile(name)
                    .map(|p| (p.label, p.openai_compatible))
                    .unwrap_or((name, false));
                let note = if compatible { "" } else { " (not available)" };
                println!("  {marker} {name:<12} {label}{note}");
            }
        }
        SlashCommand::Model(None) => {
            let model = bus.model();
            let snap = agent.pricing().snapshot(&model);
            println!(
                "  model: {model} · ${}/1M prompt · ${}/1M completion",
                snap.prompt_usd_per_1m, snap.completion_usd_per_1m
            );
        }
        SlashCommand::Model(Some(model)) => agent.set_model(&model).await?,
        SlashCommand::Build(None) => {
            let mode = bus.mode();
            println!("  build mode: {mode} (max {} steps)", mode.max_steps());
        }
        SlashCommand::Build(Some(mode)) => agent.set_mode(mode).await?,
        SlashCommand::Approve(None) => {
            let state = if agent.gate().auto_approve() { "on" } else { "off" };
            println!("  auto-approve: {state}");
        }
        SlashCommand::Approve(Some(on)) => {
            agent.gate().set_auto_approve(on);
            println!("  auto-approve: {}", if on { "on" } else { "off" });
        }
        SlashCommand::Sessions => {
            let sessions = agent.store().list(20).await?;
            if sessions.is_empty() {
                println!("  no saved sessions");
            }
            let active = agent.session().id.clone();
            for s in sessions {
                let marker = if s.session_id == active { "*" } else { " " };
                println!(
                    "  {marker} {}  {}  {:>3} msgs  {}",
                    s.session_id,
                    s.updated_at.format("%Y-%m-%d %H:%M"),
                    s.message_count,
                    s.title
                );
            }
        }
        SlashCommand::Session(id) => {
            agent.switch_session(&id).await?;
        }
        SlashCommand::New => {
            agent.new_session().await?;
        }
        SlashCommand::Doctor(name) => {
            for line in KeyDiagnostics::collect(config, name.as_deref(), &env_lookup).lines() {
                println!("  {line}");
            }
        }
        SlashCommand::Stats => {
            let s = bus.stats();
            println!("  session {} · {} / {}", s.session_id, s.provider, s.model);
            println!(
                "  turns {} · steps {} · tools {} ({} failed)",
                s.turns, s.steps, s.tool_calls, s.tool_failures
            );
            println!(
                "  tokens {} prompt + {} completion = {} · ${:.6}",
                s.prompt_tokens, s.completion_tokens, s.total_tokens, s.total_cost_usd
            );
            println!("  uptime {:.0}s", s.uptime_s);
        }
        SlashCommand::Exit => return Ok(Flow::Exit),
    }
    Ok(Flow::Continue)
}
