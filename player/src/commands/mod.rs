use anyhow::{Result, anyhow, bail};

use crate::app::App;

/// Command handler for the application
pub struct CommandHandler;

impl CommandHandler {
    /// Parse and execute a command
    pub fn execute(app: &mut App, command_str: &str) -> Result<()> {
        let parts: Vec<&str> = command_str.trim().splitn(2, ' ').collect();
        let cmd = parts[0].to_lowercase();
        let args = parts.get(1).map(|s| s.trim()).filter(|s| !s.is_empty());

        match cmd.as_str() {
            "seek" | "s" => {
                let args = args.ok_or_else(|| anyhow!("Seek command requires a position argument"))?;
                let fraction = parse_fraction(args)?;
                app.session("seek")?.seek(fraction)?;
            }
            "play" | "p" => app.session("play")?.play()?,
            "pause" => app.session("pause")?.pause()?,
            "toggle" | "t" => app.session("toggle_playback")?.toggle_playback()?,
            "volume" | "vol" | "v" => {
                let args = args.ok_or_else(|| anyhow!("Volume command requires a level argument (0-100)"))?;
                let level = args
                    .parse::<i32>()
                    .map_err(|_| anyhow!("Invalid volume: {}", args))?;
                app.session("set_volume")?.set_volume(level)?;
            }
            "restart" => {
                let session = app.session("restart")?;
                session.seek(0.0)?;
                if !session.is_playing() {
                    session.play()?;
                }
            }
            "tick" | "advance" => {
                let seconds = match args {
                    Some(args) => args
                        .parse::<f64>()
                        .map_err(|_| anyhow!("Invalid duration: {}", args))?,
                    None => 1.0,
                };
                if !seconds.is_finite() || seconds < 0.0 {
                    bail!("Invalid duration: {}", seconds);
                }
                app.tick(seconds);
            }
            "src" | "open" | "o" => {
                let url = args.ok_or_else(|| anyhow!("Source command requires a URL"))?;
                app.set_attribute("src", url)?;
            }
            "set" => {
                let args = args.ok_or_else(|| anyhow!("Set command requires a name and a value"))?;
                let (name, value) = args.split_once(' ').unwrap_or((args, ""));
                app.set_attribute(name, value.trim())?;
            }
            "api" => match args {
                None | Some("ready") => app.api_ready(),
                Some(rest) => match rest.strip_prefix("fail") {
                    Some(reason) => {
                        let reason = reason.trim();
                        app.api_fail(if reason.is_empty() { "script failed to load" } else { reason });
                    }
                    None => bail!("Unknown api action: {}", rest),
                },
            },
            "attach" => app.attach()?,
            "detach" => app.detach(),
            "status" | "st" => app.show_status(),
            "help" | "h" | "?" => app.show_help(),
            "quit" | "exit" | "q" => app.should_quit = true,
            "" => {
                // Empty command, do nothing
            }
            _ => {
                return Err(anyhow!("Unknown command: {}", cmd));
            }
        }

        Ok(())
    }
}

/// Accept either a fraction (`0.25`) or a percentage (`25%`).
fn parse_fraction(arg: &str) -> Result<f64> {
    let (number, scale) = match arg.strip_suffix('%') {
        Some(percent) => (percent, 100.0),
        None => (arg, 1.0),
    };
    number
        .trim()
        .parse::<f64>()
        .map(|value| value / scale)
        .map_err(|_| anyhow!("Invalid position: {}", arg))
}

/// Handle a command string entered by the user, then let the page answer
pub fn handle_command(app: &mut App, command: &str) -> Result<()> {
    let result = CommandHandler::execute(app, command);
    if result.is_ok() {
        app.pump();
    }
    result
}
