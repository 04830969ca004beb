use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use harmony_core::{HostConfig, MediaKind};
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

mod app;
mod commands;

use app::App;

/// Drive a media facade session over simulated backends.
#[derive(Parser, Debug)]
#[command(name = "harmony-player", version, about)]
struct Cli {
    /// Media URL, or a video id / URL for the youtube kind
    source: Option<String>,

    /// Backend to use
    #[arg(short, long, value_enum)]
    kind: Option<MediaKind>,

    /// Start playing as soon as the backend is ready
    #[arg(long)]
    autoplay: bool,

    /// Initial volume
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: Option<u8>,

    /// JSON host configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Commands to run instead of reading stdin, separated by ';'
    #[arg(short = 'e', long)]
    script: Option<String>,

    /// Simulated clock step in interactive mode, in milliseconds
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Leave the embedded API unloaded until the `api` command
    #[arg(long)]
    hold_api: bool,

    /// Print status as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn host_config(&self) -> Result<HostConfig> {
        let mut config = match &self.config {
            Some(path) => HostConfig::load(path)?,
            None => HostConfig::default(),
        };
        if let Some(kind) = self.kind {
            config.kind = kind;
        }
        if let Some(source) = &self.source {
            if config.kind == MediaKind::Embedded {
                config.video_id = Some(source.clone());
            } else {
                config.src = Some(source.clone());
            }
        }
        if self.autoplay {
            config.autoplay = true;
        }
        if let Some(volume) = self.volume {
            config.volume = volume;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logger
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.host_config().context("Failed to build host configuration")?;
    debug!("Host configuration: {:?}", config);

    let mut app = App::new(config, cli.json);
    app.attach()?;
    if app.is_embedded() && !cli.hold_api {
        app.api_ready();
    }
    app.print_events();

    match &cli.script {
        Some(script) => run_script(&mut app, script),
        None => run_interactive(&mut app, Duration::from_millis(cli.tick_ms.max(1))).await?,
    }

    info!("Shutting down player");
    app.detach();
    app.print_events();
    Ok(())
}

fn run_script(app: &mut App, script: &str) {
    for command in script.split(';') {
        if let Err(e) = commands::handle_command(app, command) {
            app.set_status(format!("Error: {}", e));
        }
        app.print_events();
        if app.should_quit {
            break;
        }
    }
    app.show_status();
}

async fn run_interactive(app: &mut App, step: Duration) -> Result<()> {
    app.show_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut clock = tokio::time::interval(step);
    clock.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !app.should_quit {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read command")? {
                    Some(line) => {
                        if let Err(e) = commands::handle_command(app, &line) {
                            app.set_status(format!("Error: {}", e));
                        }
                    }
                    None => break,
                }
            }
            _ = clock.tick() => app.advance_clock(step.as_secs_f64()),
        }
        app.print_events();
    }
    Ok(())
}
