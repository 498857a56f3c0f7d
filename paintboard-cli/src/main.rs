//! Paintboard CLI: paint one pixel.
//!
//! ```text
//! paintboard --uid 1234 --access-key KEY 10 20 '#ff8800'
//! paintboard --config <path> ...     Load a custom config TOML
//! paintboard --gen-config            Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use paintboard_core::{ClientConfig, PaintClient, Point, Rgb};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "paintboard", about = "Paint a pixel on the shared paintboard")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "paintboard.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Owner id to paint as.
    #[arg(long, required_unless_present = "gen_config")]
    uid: Option<u32>,

    /// Long-lived access key for `uid`.
    #[arg(long, env = "PAINTBOARD_ACCESS_KEY", required_unless_present = "gen_config")]
    access_key: Option<String>,

    /// Column.
    #[arg(required_unless_present = "gen_config")]
    x: Option<u16>,

    /// Row.
    #[arg(required_unless_present = "gen_config")]
    y: Option<u16>,

    /// Color as `#rrggbb` or `rrggbb`.
    #[arg(value_parser = parse_color, required_unless_present = "gen_config")]
    color: Option<Rgb>,
}

fn parse_color(text: &str) -> Result<Rgb, String> {
    let hex = text.strip_prefix('#').unwrap_or(text);
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(format!("expected six hex digits, got {text:?}"));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| format!("bad color {text:?}: {e}"))
    };
    Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let (Some(uid), Some(access_key), Some(x), Some(y), Some(color)) =
        (cli.uid, cli.access_key, cli.x, cli.y, cli.color)
    else {
        return Err("uid, access key, x, y and color are required".into());
    };

    // Load config.
    let config = ClientConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("paintboard v{}", env!("CARGO_PKG_VERSION"));
    info!("socket: {}", config.endpoint.socket_url);

    let client = PaintClient::new(&config)?;
    let at = Point::new(x, y);

    let result = tokio::select! {
        r = client.paint(uid, &access_key, color, at) => r,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received; shutting down");
            client.shutdown();
            return Ok(());
        }
    };
    client.shutdown();

    match result {
        Ok(receipt) => {
            println!(
                "painted {at} as {uid} (request {}, {} attempt(s))",
                receipt.request_id, receipt.attempts
            );
            Ok(())
        }
        Err(e) => {
            error!("paint failed: {e}");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_with_and_without_hash() {
        assert_eq!(parse_color("#ff8800").unwrap(), Rgb::new(0xff, 0x88, 0x00));
        assert_eq!(parse_color("0A0b0C").unwrap(), Rgb::new(0x0a, 0x0b, 0x0c));
    }

    #[test]
    fn color_rejects_bad_input() {
        assert!(parse_color("#fff").is_err());
        assert!(parse_color("gg0000").is_err());
        assert!(parse_color("ééé").is_err());
    }

    #[test]
    fn cli_parses_paint_arguments() {
        let cli = Cli::try_parse_from([
            "paintboard", "--uid", "7", "--access-key", "k", "3", "4", "#010203",
        ])
        .unwrap();
        assert_eq!(cli.uid, Some(7));
        assert_eq!((cli.x, cli.y), (Some(3), Some(4)));
        assert_eq!(cli.color, Some(Rgb::new(1, 2, 3)));
    }

    #[test]
    fn gen_config_needs_no_paint_arguments() {
        let cli = Cli::try_parse_from(["paintboard", "--gen-config"]).unwrap();
        assert!(cli.gen_config);
    }
}
