use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use brandscout_contracts::design::{BrandQuery, PipelinePhase, DEFAULT_BRAND_VIBE};
use brandscout_contracts::events::EventWriter;
use brandscout_contracts::session::{parse_command, SessionCommand, SESSION_HELP_COMMANDS};
use brandscout_engine::{
    AppContext, BrandScoutConfig, DesignOutcome, DesignRun, GenerationBackend, Orchestrator,
    ProgressSink, UserLogo,
};
use clap::{Args, Parser, Subcommand};
use image::ImageFormat;
use tracing_subscriber::EnvFilter;

const EXIT_NO_IMAGE: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "brandscout-rs",
    version,
    about = "Scout brand references and stamp a logo onto a generated mockup"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one auto-design and write the branded mockup.
    Design(DesignArgs),
    /// Interactive form: set the vibe and logo, then /design.
    Session(SessionArgs),
}

#[derive(Debug, Args)]
struct ContextArgs {
    /// TOML secrets file (defaults to $BRANDSCOUT_SECRETS or .brandscout/secrets.toml).
    #[arg(long)]
    secrets: Option<PathBuf>,
    #[arg(long)]
    backend: Option<GenerationBackend>,
    #[arg(long)]
    model: Option<String>,
}

#[derive(Debug, Parser)]
struct DesignArgs {
    #[arg(long, default_value = DEFAULT_BRAND_VIBE)]
    vibe: String,
    #[arg(long)]
    logo: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    context: ContextArgs,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    context: ContextArgs,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("brandscout-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Design(args) => run_design(args),
        Command::Session(args) => {
            run_session(args)?;
            Ok(0)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BRANDSCOUT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn build_context(args: &ContextArgs) -> Result<AppContext> {
    let mut config = BrandScoutConfig::load(args.secrets.as_deref())?;
    if let Some(backend) = args.backend {
        config = config.with_backend(backend);
    }
    if let Some(model) = args.model.as_deref() {
        config = config.with_model(model);
    }
    tracing::debug!(backend = %config.backend, model = %config.model, "configuration loaded");
    let context = AppContext::initialize(&config)?;
    for warning in context.init_warnings() {
        println!("Warning: image generation disabled: {warning}");
    }
    Ok(context)
}

/// Writes progress the way the form shows it and nothing more.
struct ConsoleProgress<'w> {
    out: &'w mut dyn Write,
}

impl ProgressSink for ConsoleProgress<'_> {
    fn phase(&mut self, phase: PipelinePhase) {
        writeln!(self.out, "{}", phase.label()).ok();
    }

    fn references(&mut self, urls: &[String]) {
        writeln!(self.out, "Inspiration found:").ok();
        for url in urls {
            writeln!(self.out, "  {url}").ok();
        }
    }

    fn warning(&mut self, _stage: PipelinePhase, message: &str) {
        writeln!(self.out, "Warning: {message}").ok();
    }
}

fn run_design(args: DesignArgs) -> Result<i32> {
    let query = BrandQuery::parse(&args.vibe).context("--vibe must not be empty")?;
    let logo = UserLogo::load(&args.logo)?;
    let context = build_context(&args.context)?;

    let mut orchestrator = Orchestrator::new(&context);
    if let Some(events_path) = args.events.as_ref() {
        orchestrator = orchestrator.with_events(EventWriter::new(events_path, "design"));
    }
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut progress = ConsoleProgress { out: &mut out };
    let Some(run) = orchestrator.auto_design(&query, Some(&logo), &mut progress) else {
        bail!("design run did not start");
    };
    report_run(&run, &args.out, &mut out)
}

fn run_session(args: SessionArgs) -> Result<()> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed creating {}", args.out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let context = build_context(&args.context)?;
    let orchestrator =
        Orchestrator::new(&context).with_events(EventWriter::new(events_path, "session"));

    let mut session = Session::new(&context, orchestrator, args.out.clone());
    let stdin = io::stdin();
    let stdout = io::stdout();
    session.run(&mut stdin.lock(), &mut stdout.lock())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionFlow {
    Continue,
    Quit,
}

/// Form state for the interactive loop: the current vibe and logo.
struct Session<'a> {
    context: &'a AppContext,
    orchestrator: Orchestrator<'a>,
    out_dir: PathBuf,
    vibe: BrandQuery,
    logo: Option<UserLogo>,
}

impl<'a> Session<'a> {
    fn new(context: &'a AppContext, orchestrator: Orchestrator<'a>, out_dir: PathBuf) -> Self {
        Self {
            context,
            orchestrator,
            out_dir,
            vibe: BrandQuery::default(),
            logo: None,
        }
    }

    /// Reads commands until `/quit` or end of input.
    fn run(&mut self, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<()> {
        writeln!(
            out,
            "BrandScout session started. Brand vibe: {}. Type /help for commands.",
            self.vibe
        )?;
        let mut line = String::new();
        loop {
            write!(out, "> ")?;
            out.flush()?;

            line.clear();
            let read = match input.read_line(&mut line) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if read == 0 {
                break;
            }
            if self.handle_line(line.trim_end_matches(['\n', '\r']), out)? == SessionFlow::Quit {
                break;
            }
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str, out: &mut dyn Write) -> Result<SessionFlow> {
        match parse_command(line) {
            SessionCommand::Noop => {}
            SessionCommand::SetVibe(text) => {
                self.vibe = BrandQuery::parse(&text).unwrap_or_default();
                writeln!(out, "Brand vibe: {}", self.vibe)?;
            }
            SessionCommand::SetLogo(path) => match UserLogo::load(&path) {
                Ok(loaded) => {
                    let (width, height) = loaded.dimensions();
                    writeln!(out, "Logo loaded: {} ({width}x{height})", path.display())?;
                    self.logo = Some(loaded);
                }
                Err(err) => writeln!(out, "Logo rejected: {err:#}")?,
            },
            SessionCommand::Design => {
                let mut progress = ConsoleProgress { out: &mut *out };
                let run =
                    self.orchestrator
                        .auto_design(&self.vibe, self.logo.as_ref(), &mut progress);
                let Some(run) = run else {
                    writeln!(out, "Upload a logo first: /logo <path.png>")?;
                    return Ok(SessionFlow::Continue);
                };
                let out_path = self.out_dir.join(format!("{}.png", run.run_id));
                if let Err(err) = report_run(&run, &out_path, out) {
                    writeln!(out, "Save failed: {err:#}")?;
                }
            }
            SessionCommand::Status => {
                writeln!(out, "Brand vibe: {}", self.vibe)?;
                match self.logo.as_ref() {
                    Some(logo) => {
                        let (width, height) = logo.dimensions();
                        let source = logo
                            .source()
                            .map(|path| path.display().to_string())
                            .unwrap_or_else(|| "in memory".to_string());
                        writeln!(out, "Logo: {source} ({width}x{height})")?;
                    }
                    None => writeln!(out, "Logo: none")?,
                }
                match self.context.generator_name() {
                    Some(name) => writeln!(out, "Generator: {name}")?,
                    None => writeln!(out, "Generator: disabled")?,
                }
            }
            SessionCommand::Help => {
                writeln!(out, "Commands: {}", SESSION_HELP_COMMANDS.join(" "))?;
                writeln!(out, "Any other text sets the brand vibe.")?;
            }
            SessionCommand::Quit => return Ok(SessionFlow::Quit),
            SessionCommand::Unknown { command, .. } => {
                writeln!(out, "Unknown command: /{command}. Type /help for commands.")?;
            }
        }
        Ok(SessionFlow::Continue)
    }
}

/// Saves the final image when there is one. Returns the process exit code.
fn report_run(run: &DesignRun, out_path: &Path, out: &mut dyn Write) -> Result<i32> {
    match &run.outcome {
        DesignOutcome::Composited { image, placement } => {
            if let Some(parent) = out_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed creating {}", parent.display()))?;
            }
            image
                .save_with_format(out_path, ImageFormat::Png)
                .with_context(|| format!("failed writing {}", out_path.display()))?;
            writeln!(
                out,
                "Saved {} (logo {}x{} at {},{})",
                out_path.display(),
                placement.width,
                placement.height,
                placement.x,
                placement.y
            )?;
            Ok(0)
        }
        DesignOutcome::NoBackground(err) => {
            writeln!(out, "No mockup generated: {err}")?;
            Ok(EXIT_NO_IMAGE)
        }
        DesignOutcome::Rejected(err) => {
            writeln!(out, "Logo could not be applied: {err}")?;
            Ok(EXIT_NO_IMAGE)
        }
    }
}
