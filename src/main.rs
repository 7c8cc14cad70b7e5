//! src/main.rs – cohort workbench launcher with bracketed-paste and batch mode support
mod editor;
mod palette;
mod results;
mod syntax;
mod workspace;

use std::path::PathBuf;
use std::process;
use std::{
    fs,
    io::{self, Write},
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossterm::event::Event;
use log::{error, info};
use tui::{backend::CrosstermBackend, Terminal};

use cohort_workbench::batch_mode::{self, BatchConfig, BatchOutcome, OutputFormat};
use cohort_workbench::config::Config;
use cohort_workbench::gateway::CohortClient;
use cohort_workbench::logging;
use cohort_workbench::verification::VerificationOutcome;

use crate::editor::normalize_text_for_terminal;
use crate::workspace::Workspace;

/*──────────────────────── CLI structures ──────────────────────*/
#[derive(Parser)]
#[command(name = "cohort-workbench")]
#[command(about = "Draft, verify and preview patient cohort queries", long_about = None)]
struct Cli {
    /// DSL file to open (interactive mode)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a cohort query and write the preview records (non-interactive)
    Run {
        /// DSL file to execute
        #[arg(short, long, value_name = "FILE")]
        dsl_file: PathBuf,

        /// Output directory for results
        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,

        /// Output format (csv, json, txt, xlsx)
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Row limit; values below 1 are clamped to 1
        #[arg(short, long, allow_hyphen_values = true)]
        limit: Option<String>,

        /// Field to include; repeat for more
        #[arg(long = "field", value_name = "KEY")]
        fields: Vec<String>,

        /// Free-text note sent with the run
        #[arg(long)]
        description: Option<String>,

        /// Verify first and stop if the DSL is rejected
        #[arg(long)]
        verify: bool,
    },
    /// Ask the backend whether a DSL file is valid
    Verify {
        #[arg(short, long, value_name = "FILE")]
        dsl_file: PathBuf,
    },
}

fn parse_format(format: &str) -> OutputFormat {
    match format {
        "json" => OutputFormat::Json,
        "txt" | "text" => OutputFormat::Text,
        "xlsx" | "excel" => OutputFormat::Xlsx,
        _ => OutputFormat::Csv,
    }
}

/*──────────────────────── main ────────────────────────────────*/
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_result = Config::load(cli.config.as_deref());

    match cli.command {
        Some(command) => {
            logging::init(None, cli.verbose)?;
            let config = config_result?; // batch mode needs a valid config
            run_batch_command(config, command, cli.verbose)
        }
        None => {
            if let Some(log_path) = Config::log_path() {
                // a TUI must never log to the terminal it draws on
                if let Err(e) = logging::init(Some(&log_path), cli.verbose) {
                    eprintln!("Warning: logging disabled ({e})");
                }
            }
            // Interactive mode - handle config error gracefully
            let (config, config_error) = match config_result {
                Ok(cfg) => (cfg, None),
                Err(e) => {
                    error!("config: {e}");
                    (Config::default(), Some(e.to_string()))
                }
            };
            run_interactive_mode(config, cli.file, config_error)
        }
    }
}

fn run_batch_command(config: Config, command: Commands, verbose: bool) -> anyhow::Result<()> {
    let client = CohortClient::new(&config.api)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building async runtime")?;

    match command {
        Commands::Verify { dsl_file } => {
            match runtime.block_on(batch_mode::run_batch_verify(&client, &dsl_file))? {
                VerificationOutcome::Valid => println!("✅ DSL is valid"),
                VerificationOutcome::Invalid { reason } => {
                    eprintln!("❌ {reason}");
                    process::exit(2);
                }
                other => anyhow::bail!("verification did not settle: {other:?}"),
            }
        }
        Commands::Run { dsl_file, output_dir, format, limit, fields, description, verify } => {
            let batch_config = BatchConfig {
                dsl_file,
                output_dir,
                output_format: parse_format(&format),
                limit,
                fields,
                description,
                verify_first: verify,
                verbose,
            };
            match runtime.block_on(batch_mode::run_batch_mode(&client, &config.workbench, &batch_config))? {
                BatchOutcome::Written { path, rows } => info!("wrote {rows} row(s) to {}", path.display()),
                BatchOutcome::NoRecords { cohort_id } => info!("cohort {cohort_id} returned no records"),
            }
        }
    }
    Ok(())
}

fn run_interactive_mode(config: Config, file_arg: Option<PathBuf>, config_error: Option<String>) -> anyhow::Result<()> {
    /* ①  colors */
    palette::install(config.colors.clone());

    /* ②  Workspace + optional file load */
    let client = CohortClient::new(&config.api)?;
    info!("interactive session against {}", client.base_url());
    let mut workspace = Workspace::new(&config, client)?;
    if let Some(error_msg) = config_error {
        workspace.status_message = Some(error_msg);
        workspace.status_message_time = Some(Instant::now());
    }

    if let Some(path) = file_arg {
        match fs::read_to_string(&path) {
            Ok(text) => {
                workspace.load_text(&normalize_text_for_terminal(&text));
                workspace.status_message = Some(format!("Loaded {}", path.display()));
            }
            Err(e) => {
                workspace.status_message = Some(format!("Cannot open {}: {e}", path.display()));
            }
        }
        workspace.status_message_time = Some(Instant::now());
    }

    /* ③  Crossterm / TUI init */
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    crossterm::execute!(
        stdout,
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableBracketedPaste
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut term = Terminal::new(backend)?;

    /* ④  event/render loop */
    let result = event_loop(&mut workspace, &mut term);

    /* ─── graceful quit: stop the worker and restore the terminal ─── */
    workspace.shutdown();

    let mut out = io::stdout();
    crossterm::queue!(
        out,
        crossterm::event::DisableBracketedPaste,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    out.flush()?;
    crossterm::terminal::disable_raw_mode()?;
    result
}

fn event_loop<B: tui::backend::Backend>(workspace: &mut Workspace, term: &mut Terminal<B>) -> anyhow::Result<()> {
    let idle_tick = Duration::from_millis(250);
    let busy_tick = Duration::from_millis(100);
    let mut last_draw = Instant::now();
    let mut dirty = true;

    loop {
        if workspace.poll_gateway() {
            dirty = true;
        }

        let timeout = if workspace.is_busy() { busy_tick } else { idle_tick };
        if crossterm::event::poll(timeout)? {
            match crossterm::event::read()? {
                Event::Key(k) if workspace.handle_key(k)? => break, // Ctrl-Q
                Event::Key(_) => dirty = true,
                Event::Paste(s) => {
                    workspace.handle_paste(&s);
                    dirty = true;
                }
                Event::Resize(_, _) => dirty = true,
                _ => {}
            }
        }

        let had_status = workspace.status_message.is_some();
        workspace.update();
        // the running timer in the status bar
        if workspace.is_busy() || had_status != workspace.status_message.is_some() {
            dirty = true;
        }

        if dirty && last_draw.elapsed() >= Duration::from_millis(15) {
            workspace.render(term)?;
            last_draw = Instant::now();
            dirty = false;
        }
    }
    Ok(())
}
