// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossterm::event::{
    self, DisableBracketedPaste, DisableFocusChange, DisableMouseCapture, EnableBracketedPaste,
    EnableFocusChange, EnableMouseCapture, Event as TermEvent, KeyCode, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::{execute, terminal};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

use idlegate::audit::global_audit_logger;
use idlegate::dialog::{clear_warning_dialog, render_status_line, render_warning_dialog};
use idlegate::error::FailureReport;
use idlegate::monitor::{
    ActivityKind, InactivityMonitor, MonitorConfig, MonitorState, MonitorStatus,
};
use idlegate::nav::{LoginRedirect, DEFAULT_LOGIN_PATH};
use idlegate::{audit_event, failure, init_audit_logger, AuthSession, DialogStyle};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BRIGHT_CYAN: &str = "\x1b[96m";
}

use colors::*;

/// Exit codes following BSD sysexits.h conventions
mod exit_codes {
    /// General error
    pub const ERROR: i32 = 1;
    /// Command line usage error
    pub const USAGE: i32 = 64;
    /// Input/output error
    pub const IO_ERR: i32 = 74;
    /// Configuration error
    pub const CONFIG: i32 = 78;
}

/// Spinner utilities for long-running operations
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    /// Create a spinner with a message
    pub fn create(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.cyan} {msg}")
                .expect("Invalid progress template"),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Stop spinner and print success message
    pub fn finish_success(pb: &ProgressBar, message: &str) {
        pb.finish_and_clear();
        eprintln!("\x1b[32m[OK]\x1b[0m {}", message);
    }

    /// Stop spinner and print warning message
    pub fn finish_warning(pb: &ProgressBar, message: &str) {
        pb.finish_and_clear();
        eprintln!("\x1b[33m[WARN]\x1b[0m {}", message);
    }
}

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(
    name = "idlegate",
    version,
    about = "Session inactivity guard: warn first, then sign out",
    long_about = "idlegate guards a signed-in terminal session. It watches input, raises a \
countdown warning after a configurable idle window, signs the session out when the countdown \
ends, and leaves behind a login URL that returns the user to the route they were on.\n\n\
Running idlegate with no subcommand starts watch mode with the configured defaults."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Guard the current terminal session
    ///
    /// Examples:
    ///   idlegate watch                         # Defaults from config
    ///   idlegate watch --timeout 10 --warning 5
    ///   idlegate watch --route /matters/42 --dialog overlay
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Show the session audit log
    ///
    /// Examples:
    ///   idlegate audit                # Last 20 entries
    ///   idlegate audit --limit 50
    ///   idlegate audit --export trail.json
    ///   idlegate audit --clear
    Audit {
        /// Number of entries to show
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Delete the audit log
        #[arg(long)]
        clear: bool,

        /// Export entries from this run as JSON
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// View or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Clone, Debug)]
struct WatchArgs {
    /// Total inactivity window in seconds (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Warning countdown in seconds (overrides config)
    #[arg(long)]
    warning: Option<u64>,

    /// User the session belongs to (defaults to $USER)
    #[arg(long)]
    user: Option<String>,

    /// Bearer token to revoke at sign-out
    #[arg(long)]
    token: Option<String>,

    /// Remote sign-out endpoint (overrides config)
    #[arg(long)]
    endpoint: Option<String>,

    /// Route to return to after the next login
    #[arg(long, default_value = "/dashboard")]
    route: String,

    /// Warning style: overlay, inline, off (overrides config)
    #[arg(long)]
    dialog: Option<String>,
}

impl Default for WatchArgs {
    fn default() -> Self {
        Self {
            timeout: None,
            warning: None,
            user: None,
            token: None,
            endpoint: None,
            route: "/dashboard".to_string(),
            dialog: None,
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    ///
    /// Keys: timeout_secs, warning_secs, login_path, sign_out_endpoint,
    /// audit_log, dialog_style
    Set { key: String, value: String },

    /// Interactive setup
    Init,
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_warning_secs")]
    pub warning_secs: u64,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default)]
    pub sign_out_endpoint: Option<String>,
    #[serde(default = "default_audit_log_enabled")]
    pub audit_log_enabled: bool,
    #[serde(default)]
    pub dialog_style: DialogStyle,
}

fn default_timeout_secs() -> u64 {
    idlegate::monitor::DEFAULT_TIMEOUT_SECS
}

fn default_warning_secs() -> u64 {
    idlegate::monitor::DEFAULT_WARNING_SECS
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_audit_log_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            warning_secs: default_warning_secs(),
            login_path: default_login_path(),
            sign_out_endpoint: None,
            audit_log_enabled: default_audit_log_enabled(),
            dialog_style: DialogStyle::default(),
        }
    }
}

/// Directory holding idlegate state (`~/.idlegate`), created on first use.
fn get_config_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Could not determine home directory");
    let config_dir = home.join(".idlegate");
    if !config_dir.exists() {
        let _ = fs::create_dir_all(&config_dir);
    }
    config_dir
}

fn config_file_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Load config, falling back to defaults when the file is absent or broken.
fn load_config() -> Config {
    let path = config_file_path();
    if !path.exists() {
        return Config::default();
    }
    match fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "{YELLOW}Warning: {} is not valid config ({}); using defaults{RESET}",
                    path.display(),
                    e
                );
                Config::default()
            }
        },
        Err(e) => {
            eprintln!(
                "{YELLOW}Warning: could not read {} ({}); using defaults{RESET}",
                path.display(),
                e
            );
            Config::default()
        }
    }
}

fn save_config(config: &Config) -> Result<()> {
    let path = config_file_path();
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(&path, json)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;
    Ok(())
}

// ============================================================================
// Logging
// ============================================================================

/// Set up tracing output on stderr.
///
/// Watch mode keeps the default filter at error level so log lines do not
/// fight the interactive screen; `RUST_LOG` always overrides.
fn init_tracing(verbose: bool, interactive: bool) {
    let default_filter = if verbose {
        "idlegate=debug"
    } else if interactive {
        "idlegate=error"
    } else {
        "idlegate=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .compact()
        .init();
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();
    let interactive = matches!(cli.command, Some(Commands::Watch(_)) | None);
    init_tracing(cli.verbose, interactive);

    let config = load_config();

    // Audit first so every command below can leave a trail
    if let Err(e) = init_audit_logger(config.audit_log_enabled) {
        eprintln!("{YELLOW}Warning: audit logging unavailable: {}{RESET}", e);
    }

    match cli.command {
        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => {
                handle_config_show(&config);
                Ok(())
            }
            ConfigAction::Set { key, value } => {
                if let Err(e) = handle_config_set(config, &key, &value) {
                    eprintln!("{}", e);
                    std::process::exit(exit_codes::CONFIG);
                }
                Ok(())
            }
            ConfigAction::Init => {
                if let Err(e) = handle_config_init(config) {
                    FailureReport::new("Interactive setup failed")
                        .cause(e.to_string())
                        .fix("Set values directly: idlegate config set <key> <value>")
                        .exit_code(exit_codes::CONFIG)
                        .exit();
                }
                Ok(())
            }
        },
        Some(Commands::Audit {
            limit,
            clear,
            export,
        }) => {
            if let Err(e) = handle_audit(limit, clear, export) {
                FailureReport::new("Audit log operation failed")
                    .cause(e.to_string())
                    .fix("Check permissions on ~/.idlegate")
                    .exit_code(exit_codes::IO_ERR)
                    .exit();
            }
            Ok(())
        }
        Some(Commands::Watch(args)) => run_watch_blocking(args, config),
        None => run_watch_blocking(WatchArgs::default(), config),
    }
}

fn run_watch_blocking(args: WatchArgs, config: Config) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().expect("Failed to create async runtime");
    if let Err(e) = rt.block_on(run_watch(args, config)) {
        restore_terminal();
        FailureReport::new("Watch mode failed")
            .cause(e.to_string())
            .fix("Re-run with --verbose for details")
            .exit_code(exit_codes::ERROR)
            .exit();
    }
    Ok(())
}

// ============================================================================
// Config Handlers
// ============================================================================

fn handle_config_show(config: &Config) {
    println!("{BRIGHT_CYAN}{BOLD}=== idlegate Configuration ==={RESET}");
    println!();
    println!("  Inactivity window:  {BOLD}{}s{RESET}", config.timeout_secs);
    println!("  Warning countdown:  {BOLD}{}s{RESET}", config.warning_secs);
    println!("  Login path:         {}", config.login_path);
    match &config.sign_out_endpoint {
        Some(url) => println!("  Sign-out endpoint:  {}", url),
        None => println!("  Sign-out endpoint:  {DIM}(not set){RESET}"),
    }
    println!("  Warning style:      {}", config.dialog_style);
    if config.audit_log_enabled {
        println!("  Audit log:          {GREEN}enabled{RESET}");
    } else {
        println!("  Audit log:          {YELLOW}disabled{RESET}");
    }
    println!();
    println!("  Config file: {}", config_file_path().display());
}

fn handle_config_set(mut config: Config, key: &str, value: &str) -> Result<()> {
    match key {
        "timeout_secs" | "timeout" => {
            config.timeout_secs = value
                .parse()
                .map_err(|_| anyhow!(failure!(
                    "Timeout must be a whole number of seconds",
                    fixes: ["Example: idlegate config set timeout_secs 3600"]
                )))?;
        }
        "warning_secs" | "warning" => {
            config.warning_secs = value
                .parse()
                .map_err(|_| anyhow!(failure!(
                    "Warning countdown must be a whole number of seconds",
                    fixes: ["Example: idlegate config set warning_secs 30"]
                )))?;
        }
        "login_path" => {
            if !value.starts_with('/') {
                return Err(anyhow!(failure!(
                    "Login path must start with '/'",
                    fixes: ["Example: idlegate config set login_path /login"]
                )));
            }
            config.login_path = value.to_string();
        }
        "sign_out_endpoint" | "endpoint" => {
            config.sign_out_endpoint = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        "audit_log" | "audit" => {
            config.audit_log_enabled = value.parse().map_err(|_| {
                anyhow!(failure!(
                    "Audit log setting must be true or false",
                    fixes: ["Example: idlegate config set audit_log true"]
                ))
            })?;
        }
        "dialog_style" | "dialog" => {
            config.dialog_style = DialogStyle::from_str(value).ok_or_else(|| {
                anyhow!(failure!(
                    "Unknown dialog style",
                    fixes: ["Use one of: overlay, inline, off"]
                ))
            })?;
        }
        other => {
            return Err(anyhow!(failure!(
                format!("Unknown config key '{}'", other),
                fixes: [
                    "Valid keys: timeout_secs, warning_secs, login_path, sign_out_endpoint, audit_log, dialog_style",
                    "See current values: idlegate config show",
                ]
            )));
        }
    }

    save_config(&config)?;
    println!("{GREEN}[OK]{RESET} {} = {}", key, value);

    // Show the effective timings when clamping will kick in
    let effective = MonitorConfig::custom(config.timeout_secs, config.warning_secs);
    if effective.timeout_secs != config.timeout_secs || effective.warning_secs != config.warning_secs
    {
        println!(
            "{YELLOW}Note: effective timings will be timeout={}s warning={}s{RESET}",
            effective.timeout_secs, effective.warning_secs
        );
    }
    Ok(())
}

fn handle_config_init(mut config: Config) -> Result<()> {
    println!("{BRIGHT_CYAN}{BOLD}=== idlegate Setup ==={RESET}");
    println!();

    let timeout: u64 = inquire::Text::new("Inactivity window in seconds:")
        .with_default(&config.timeout_secs.to_string())
        .prompt()?
        .trim()
        .parse()
        .context("Timeout must be a whole number of seconds")?;

    let warning: u64 = inquire::Text::new("Warning countdown in seconds:")
        .with_default(&config.warning_secs.to_string())
        .prompt()?
        .trim()
        .parse()
        .context("Warning countdown must be a whole number of seconds")?;

    let login_path = inquire::Text::new("Login screen path:")
        .with_default(&config.login_path)
        .prompt()?;

    let endpoint = inquire::Text::new("Remote sign-out endpoint (empty for none):")
        .with_default(config.sign_out_endpoint.as_deref().unwrap_or(""))
        .prompt()?;

    let style = inquire::Select::new("Warning style:", vec!["inline", "overlay", "off"]).prompt()?;

    let audit = inquire::Confirm::new("Keep a session audit log?")
        .with_default(config.audit_log_enabled)
        .prompt()?;

    // Store sanitized timings so the file and the runtime agree
    let effective = MonitorConfig::custom(timeout, warning);
    config.timeout_secs = effective.timeout_secs;
    config.warning_secs = effective.warning_secs;
    config.login_path = if login_path.starts_with('/') {
        login_path
    } else {
        format!("/{}", login_path)
    };
    let endpoint = endpoint.trim();
    config.sign_out_endpoint = if endpoint.is_empty() {
        None
    } else {
        Some(endpoint.to_string())
    };
    config.dialog_style = DialogStyle::from_str(style).unwrap_or_default();
    config.audit_log_enabled = audit;

    save_config(&config)?;
    println!();
    println!(
        "{GREEN}[OK]{RESET} Config written to {}",
        config_file_path().display()
    );
    Ok(())
}

// ============================================================================
// Audit Handler
// ============================================================================

fn handle_audit(limit: usize, clear: bool, export: Option<PathBuf>) -> Result<()> {
    let logger = global_audit_logger()
        .read()
        .map_err(|_| anyhow!("Audit logger lock poisoned"))?;

    if clear {
        let confirmed = inquire::Confirm::new("Delete the session audit log?")
            .with_default(false)
            .prompt()
            .unwrap_or(false);
        if confirmed {
            logger.clear()?;
            println!("{GREEN}[OK]{RESET} Audit log cleared");
        } else {
            println!("{DIM}Cancelled{RESET}");
        }
        return Ok(());
    }

    if let Some(path) = export {
        let count = logger.export_to_json(&path)?;
        println!(
            "{GREEN}[OK]{RESET} Exported {} entries to {}",
            count,
            path.display()
        );
        return Ok(());
    }

    let lines = logger.read_all_lines()?;
    println!("{BRIGHT_CYAN}{BOLD}=== Session Audit Log ==={RESET}");
    println!(
        "{DIM}{} | {} entries | {} bytes{RESET}",
        logger.log_file().display(),
        lines.len(),
        logger.log_size_bytes()
    );
    println!();

    if lines.is_empty() {
        println!("{DIM}(no entries yet){RESET}");
        return Ok(());
    }

    let start = lines.len().saturating_sub(limit);
    for line in &lines[start..] {
        println!("{}", line);
    }
    Ok(())
}

// ============================================================================
// Watch Mode
// ============================================================================

/// Input distilled from terminal events.
#[derive(Debug)]
enum UiInput {
    /// Enter: dismiss the warning, stay signed in
    Stay,
    /// q: sign out right now
    SignOut,
    /// Esc / Ctrl-C: stop watching, leave the session signed in
    Quit,
    /// Anything else that counts as user activity
    Activity(ActivityKind),
}

/// Map a terminal event to monitor input. Resizes and focus loss are not
/// activity; they happen with nobody at the keyboard.
fn classify_event(event: TermEvent) -> Option<UiInput> {
    match event {
        TermEvent::Key(key) => {
            if key.kind != KeyEventKind::Press {
                return None;
            }
            match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    Some(UiInput::Quit)
                }
                KeyCode::Esc => Some(UiInput::Quit),
                KeyCode::Enter => Some(UiInput::Stay),
                KeyCode::Char('q') | KeyCode::Char('Q')
                    if !key.modifiers.contains(KeyModifiers::CONTROL) =>
                {
                    Some(UiInput::SignOut)
                }
                _ => Some(UiInput::Activity(ActivityKind::Key)),
            }
        }
        TermEvent::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp | MouseEventKind::ScrollDown => {
                Some(UiInput::Activity(ActivityKind::Wheel))
            }
            MouseEventKind::Down(_) => Some(UiInput::Activity(ActivityKind::Mouse)),
            _ => None,
        },
        TermEvent::Paste(_) => Some(UiInput::Activity(ActivityKind::Paste)),
        TermEvent::FocusGained => Some(UiInput::Activity(ActivityKind::Focus)),
        TermEvent::FocusLost => None,
        TermEvent::Resize(_, _) => None,
    }
}

/// Read terminal events on a dedicated thread, stopping once the receiver
/// goes away.
fn spawn_input_reader(tx: mpsc::UnboundedSender<UiInput>) {
    std::thread::spawn(move || loop {
        match event::poll(Duration::from_millis(100)) {
            Ok(true) => {
                if let Ok(ev) = event::read() {
                    if let Some(input) = classify_event(ev) {
                        if tx.send(input).is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(false) => {
                if tx.is_closed() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

fn restore_terminal() {
    let _ = execute!(
        io::stderr(),
        DisableBracketedPaste,
        DisableFocusChange,
        DisableMouseCapture
    );
    let _ = terminal::disable_raw_mode();
}

async fn run_watch(args: WatchArgs, config: Config) -> Result<()> {
    if !atty::is(atty::Stream::Stdin) {
        failure!(
            "Watch mode needs an interactive terminal",
            causes: ["stdin is a pipe or a file"],
            fixes: ["Run idlegate from a terminal", "Script against the library instead of the CLI"]
        )
        .exit_code(exit_codes::USAGE)
        .exit();
    }

    let monitor_config = MonitorConfig::custom(
        args.timeout.unwrap_or(config.timeout_secs),
        args.warning.unwrap_or(config.warning_secs),
    );

    let style = match args.dialog.as_deref() {
        Some(s) => DialogStyle::from_str(s).unwrap_or_else(|| {
            failure!("Unknown dialog style", fixes: ["Use one of: overlay, inline, off"])
                .exit_code(exit_codes::USAGE)
                .exit()
        }),
        None => config.dialog_style,
    };

    let user = args
        .user
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "local-user".to_string());
    let endpoint = args.endpoint.clone().or_else(|| config.sign_out_endpoint.clone());
    let has_endpoint = endpoint.is_some();

    let mut auth = AuthSession::new(user.clone(), args.token.clone());
    if let Some(url) = endpoint {
        auth = auth.with_sign_out_endpoint(url);
    }
    let auth = Arc::new(auth);

    eprintln!(
        "{BOLD}idlegate{RESET} guarding session for {BOLD}{}{RESET} (window {}s, warning {}s)",
        user, monitor_config.timeout_secs, monitor_config.warning_secs
    );
    eprintln!("{DIM}Enter: stay signed in | q: sign out | Esc or Ctrl-C: quit{RESET}");

    if has_endpoint {
        let pb = spinner::create("Checking sign-out endpoint...");
        match auth.probe().await {
            Ok(()) => spinner::finish_success(&pb, "Sign-out endpoint reachable"),
            Err(e) => spinner::finish_warning(
                &pb,
                &format!("{} (sign-out will still clear this client)", e),
            ),
        }
    }

    audit_event(
        "SESSION_STARTED",
        &format!(
            "user={} timeout={}s warning={}s route={}",
            user, monitor_config.timeout_secs, monitor_config.warning_secs, args.route
        ),
    );

    let nav = LoginRedirect::new().with_login_path(config.login_path.clone());
    let monitor = InactivityMonitor::spawn(monitor_config, Arc::clone(&auth), nav);
    monitor.set_route(args.route.clone()).await?;

    terminal::enable_raw_mode().context("Failed to enable raw terminal mode")?;
    // Mouse, focus and paste reporting are best effort; plain keys still work
    let _ = execute!(
        io::stderr(),
        EnableMouseCapture,
        EnableFocusChange,
        EnableBracketedPaste
    );

    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    spawn_input_reader(input_tx);

    let mut status_rx = monitor.subscribe();
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut ui = WatchUi {
        style,
        dialog_on_screen: false,
        last_activity: Instant::now(),
        window_secs: monitor_config.timeout_secs,
    };
    let mut prev_state = monitor.status().state;
    let mut final_status: Option<MonitorStatus> = None;
    let mut user_quit = false;

    loop {
        tokio::select! {
            maybe_input = input_rx.recv() => {
                match maybe_input {
                    Some(UiInput::Stay) => {
                        if monitor.status().warning_visible() {
                            monitor.stay_signed_in().await?;
                        } else {
                            monitor.record_activity(ActivityKind::Key);
                        }
                        ui.last_activity = Instant::now();
                    }
                    Some(UiInput::SignOut) => {
                        monitor.sign_out_now().await?;
                    }
                    Some(UiInput::Activity(kind)) => {
                        monitor.record_activity(kind);
                        ui.last_activity = Instant::now();
                    }
                    Some(UiInput::Quit) | None => {
                        user_quit = true;
                        break;
                    }
                }
            }

            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                if status.state != prev_state {
                    audit_transition(prev_state, &status, &user);
                    prev_state = status.state;
                }
                ui.redraw(&status);
                if status.is_signed_out() {
                    final_status = Some(status);
                    break;
                }
            }

            _ = ticker.tick() => {
                ui.redraw(&monitor.status());
            }
        }
    }

    restore_terminal();
    eprintln!();

    monitor.stop().await;

    if let Some(status) = final_status {
        let url = status.redirect.unwrap_or_default();
        eprintln!("{RED}{BOLD}✗ Signed out after inactivity{RESET}");
        eprintln!("Continue at: {BOLD}{}{RESET}", url);
        // Machine-readable copy on stdout so scripts can pick it up
        println!("{}", url);
    } else if user_quit {
        audit_event("WATCH_STOPPED", &format!("user={} (session left signed in)", user));
        eprintln!("{DIM}idlegate stopped; session left signed in{RESET}");
    }

    Ok(())
}

/// Write a file-audit entry for a state transition observed in watch mode.
fn audit_transition(prev: MonitorState, status: &MonitorStatus, user: &str) {
    match status.state {
        MonitorState::Warning => audit_event(
            "MONITOR_WARNING",
            &format!("countdown={}s user={}", status.seconds_remaining, user),
        ),
        MonitorState::Armed if prev == MonitorState::Warning => {
            audit_event("MONITOR_WARNING_DISMISSED", &format!("user={}", user))
        }
        MonitorState::SignedOut => audit_event(
            "MONITOR_SIGNED_OUT",
            &format!(
                "redirect={} user={}",
                status.redirect.as_deref().unwrap_or("-"),
                user
            ),
        ),
        MonitorState::Disarmed => audit_event("MONITOR_DISARMED", &format!("user={}", user)),
        _ => {}
    }
}

/// Screen state for watch mode.
struct WatchUi {
    style: DialogStyle,
    dialog_on_screen: bool,
    last_activity: Instant,
    window_secs: u64,
}

const CLEAR_LINE: &str = "\x1b[2K";

impl WatchUi {
    /// Redraw the status line and, while warning, the dialog.
    ///
    /// The armed status line counts down from this process's own view of the
    /// last activity; the monitor stays canonical for the warning and the
    /// sign-out.
    fn redraw(&mut self, status: &MonitorStatus) {
        let mut err = io::stderr();

        if status.warning_visible() {
            match self.style {
                DialogStyle::Overlay => {
                    // Overlay re-renders in place every tick
                    if let Some(dialog) =
                        render_warning_dialog(status.seconds_remaining, self.style)
                    {
                        let _ = write!(err, "{}", dialog);
                    }
                    self.dialog_on_screen = true;
                }
                DialogStyle::Inline => {
                    if !self.dialog_on_screen {
                        if let Some(dialog) =
                            render_warning_dialog(status.seconds_remaining, self.style)
                        {
                            // Raw mode: line feeds alone do not return the cursor
                            let _ = write!(err, "\r{CLEAR_LINE}\r\n");
                            let _ = write!(err, "{}\r\n", dialog.replace('\n', "\r\n"));
                        }
                        self.dialog_on_screen = true;
                    }
                }
                DialogStyle::Off => {}
            }
            let _ = write!(
                err,
                "\r{CLEAR_LINE}{}",
                render_status_line(status.state, status.seconds_remaining)
            );
        } else {
            if self.dialog_on_screen {
                if let Some(clear) = clear_warning_dialog(self.style) {
                    let _ = write!(err, "{}", clear);
                }
                self.dialog_on_screen = false;
            }
            let window_remaining = self
                .window_secs
                .saturating_sub(self.last_activity.elapsed().as_secs());
            let _ = write!(
                err,
                "\r{CLEAR_LINE}{}",
                render_status_line(status.state, window_remaining)
            );
        }

        let _ = err.flush();
    }
}
