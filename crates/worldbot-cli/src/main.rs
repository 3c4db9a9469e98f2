//! `worldbot-cli` – worldbot Command Line Interface
//!
//! This binary runs the VRChat world assistant.  It:
//!
//! 1. Checks for `~/.worldbot/config.toml` (or the file given with
//!    `--config`); runs a **First-Run Wizard** when the file is absent.
//! 2. Loads the knowledge base and binds the OSC bridge, falling back to the
//!    simulated transport when the UDP socket cannot be bound.
//! 3. Starts the bridge service and the status panel.
//! 4. Drops the operator into an **interactive console** with slash-commands
//!    (`/send`, `/interact`, `/history`, `/status`, `/schema`, `/help`).
//! 5. Intercepts **Ctrl-C** and shuts every task down before exiting.

mod args;
mod config;
mod repl;

use colored::Colorize;
use rustyline::DefaultEditor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

use worldbot_bridge::{BridgeAdapter, EventBus, ListenerHandle, SimulatedTransport, UdpTransport};
use worldbot_knowledge::KnowledgeStore;
use worldbot_panel::PanelServer;
use worldbot_runtime::{BridgeService, DisplaySink, InteractionNotifier, KnowledgeEngine};
use worldbot_types::{BotError, BridgeMessage};

const INBOUND_QUEUE_DEPTH: usize = 256;

fn main() {
    let cli = match args::parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}: {}\n\n{}", "error".red().bold(), e, args::USAGE);
            std::process::exit(2);
        }
    };
    if cli.help {
        println!("{}", args::USAGE);
        return;
    }

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let config_path = cli.config_path();
    let mut cfg = match config::load_from(&config_path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config_path.display().to_string().bold());
            cfg
        }
        Ok(None) => run_first_run_wizard(&config_path),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    cli.apply(&mut cfg);
    if let Err(e) = cfg.validate() {
        println!("{}: {}", "Invalid configuration".red().bold(), e);
        std::process::exit(2);
    }

    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG wins; otherwise `verbose` (or `--debug`) picks debug over info.
    let _tracing = worldbot_runtime::init_tracing(
        "worldbot",
        if cfg.verbose { "debug" } else { "info" },
    );

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Knowledge base ────────────────────────────────────────────────────
    let store = match KnowledgeStore::load(&cfg.knowledge_base_file) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            error!(path = %cfg.knowledge_base_file.display(), error = %e, "knowledge base unavailable");
            None
        }
    };
    let engine = KnowledgeEngine::from_parts(store, Some(cfg.response_config()))
        .with_small_talk(cfg.small_talk);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("worldbot")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    // ── Bridge, service and panel ─────────────────────────────────────────
    let bus = EventBus::default();
    let (handle, service_task, listener) = rt.block_on(async {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        let (adapter, listener) = start_transport(&cfg, inbound_tx).await;

        let service = BridgeService::new(engine, adapter, bus.clone(), cfg.service_config())
            .with_display(Arc::new(ConsoleDisplay))
            .with_notifier(InteractionNotifier::new(
                &cfg.discord_webhook_url,
                &cfg.owner_discord_ids,
            ));
        let (handle, task) = service.spawn(inbound_rx);

        if cfg.panel_port != 0 {
            let mut panel =
                PanelServer::new(bus.clone(), handle.status_handle()).with_port(cfg.panel_port);
            if let Ok(addr) = cfg.panel_addr() {
                panel = panel.with_host(addr.ip());
            }
            match panel.bind().await {
                Ok(tcp) => {
                    tokio::spawn(panel.serve(tcp));
                }
                Err(e) => warn!(error = %e, "status panel disabled"),
            }
        }
        (handle, task, listener)
    });

    let status = handle.status();
    println!();
    println!("  Listening on {}", status.listening_on.bold());
    println!("  Sending to   {}", status.sending_to.bold());
    if status.simulated {
        println!("  {}", "Simulation mode: chat requests get a canned reply.".yellow());
    }
    if let (true, Ok(addr)) = (cfg.panel_port != 0, cfg.panel_addr()) {
        println!("  Status panel at {}", format!("http://{addr}").dimmed());
    }
    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive console ───────────────────────────────────────────────
    repl::run(handle.clone(), rt.handle().clone(), shutdown);

    // ── Graceful shutdown ─────────────────────────────────────────────────
    handle.shutdown();
    rt.block_on(async {
        if let Err(e) = service_task.await {
            warn!(error = %e, "bridge service task ended abnormally");
        }
        listener.shutdown().await;
    });
    // The panel accept loop never returns on its own.
    rt.shutdown_timeout(Duration::from_secs(1));
    println!("{}", "  ✓ Exiting worldbot.".green());
}

/// Bind the configured transport, or the simulated one when `simulate` is
/// set or the UDP socket is unavailable.
async fn start_transport(
    cfg: &config::Config,
    inbound: mpsc::Sender<BridgeMessage>,
) -> (Arc<dyn BridgeAdapter>, ListenerHandle) {
    if !cfg.simulate {
        let bound = match cfg.udp_config().map_err(BotError::InvalidConfig) {
            Ok(udp) => UdpTransport::bind(udp, inbound.clone()).await,
            Err(e) => Err(e),
        };
        match bound {
            Ok((transport, listener)) => return (Arc::new(transport), listener),
            Err(e) => warn!(error = %e, "OSC bridge unavailable; falling back to simulation"),
        }
    }
    let (transport, listener) = SimulatedTransport::spawn(inbound);
    (Arc::new(transport), listener)
}

/// Prints every bot message to the terminal.
struct ConsoleDisplay;

impl DisplaySink for ConsoleDisplay {
    fn display_bot_message(&self, text: &str) {
        println!("  {} {}", "bot:".bold().green(), text);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard(path: &Path) -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║      worldbot First-Run Wizard       ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up worldbot.\n");

    let mut cfg = config::Config::default();
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            println!("{}: {}", "Console unavailable; using defaults".yellow(), e);
            return cfg;
        }
    };

    let kb_file = prompt_line(
        &mut editor,
        &format!("  Knowledge base file [{}]: ", cfg.knowledge_base_file.display()),
        &cfg.knowledge_base_file.display().to_string(),
    );
    cfg.knowledge_base_file = kb_file.into();

    let answer = prompt_line(
        &mut editor,
        &format!("  OSC listen port [{}]: ", cfg.osc_listen_port),
        &cfg.osc_listen_port.to_string(),
    );
    match answer.parse::<u16>() {
        Ok(port) => cfg.osc_listen_port = port,
        Err(_) => println!("  {} keeping {}", "Not a port;".yellow(), cfg.osc_listen_port),
    }

    let answer = prompt_line(
        &mut editor,
        &format!("  OSC remote port [{}]: ", cfg.remote_port),
        &cfg.remote_port.to_string(),
    );
    match answer.parse::<u16>() {
        Ok(port) => cfg.remote_port = port,
        Err(_) => println!("  {} keeping {}", "Not a port;".yellow(), cfg.remote_port),
    }

    let simulate = prompt_line(&mut editor, "  Start in simulation mode? [y/N]: ", "n");
    cfg.simulate = matches!(simulate.trim().to_ascii_lowercase().as_str(), "y" | "yes");

    cfg.discord_webhook_url =
        prompt_line(&mut editor, "  Discord webhook URL for item alerts (optional): ", "");

    match config::save_to(&cfg, path) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            path.display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"                    __    ____        __ "#.bold().cyan());
    println!("{}", r#" _      ______  _____/ /___/ / /_  ____  / /_"#.bold().cyan());
    println!("{}", r#"| | /| / / __ \/ ___/ / __  / __ \/ __ \/ __/"#.bold().cyan());
    println!("{}", r#"| |/ |/ / /_/ / /  / / /_/ / /_/ / /_/ / /_  "#.bold().cyan());
    println!("{}", r#"|__/|__/\____/_/  /_/\__,_/_.___/\____/\__/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "worldbot".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  VRChat world assistant over OSC");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Read one answer; blank input or a read failure keeps `default`.
fn prompt_line(editor: &mut DefaultEditor, msg: &str, default: &str) -> String {
    match editor.readline(msg) {
        Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
        _ => default.to_string(),
    }
}
