//! Audio Host Controller
//!
//! Sends a single command to a running host and prints the response.
//!
//! Usage: socket-audio-ctl [--addr <host:port>] <command> [args]

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use socket_audio_host::{
    audio::decoder::encode_wav,
    client::Client,
    constants::{DEFAULT_HOST, DEFAULT_PORT},
    protocol::Response,
};

const USAGE: &str = "\
Usage: socket-audio-ctl [--addr <host:port>] <command>

Commands:
  ping                     check the host is alive
  stop                     stop playback
  play <path> [level]      play a file from the host's filesystem
  send <file> [level]      upload a local file and play it
  tone [hz] [secs] [level] upload a generated sine tone and play it
  set-device <id>          select the output device
  devices                  list output devices";

fn parse_level(arg: Option<&String>) -> Result<Option<f64>> {
    arg.map(|s| s.parse::<f64>().with_context(|| format!("invalid level '{}'", s)))
        .transpose()
}

const TONE_SAMPLE_RATE: u32 = 48000;

/// Mono sine tone as a WAV file
fn tone_wav(freq: f64, secs: f64) -> Vec<u8> {
    let frames = (secs * TONE_SAMPLE_RATE as f64) as usize;
    let samples: Vec<f32> = (0..frames)
        .map(|n| {
            let t = n as f64 / TONE_SAMPLE_RATE as f64;
            (0.5 * (2.0 * std::f64::consts::PI * freq * t).sin()) as f32
        })
        .collect();
    encode_wav(&samples, TONE_SAMPLE_RATE, 1)
}

fn parse_or<T: std::str::FromStr>(arg: Option<&String>, default: T, what: &str) -> Result<T> {
    match arg {
        Some(s) => s.parse().map_err(|_| anyhow::anyhow!("invalid {} '{}'", what, s)),
        None => Ok(default),
    }
}

fn print_response(response: &Response) {
    let message = response.message.as_deref().unwrap_or("");
    println!("{:?} {}", response.result, message);
    if let Some(data) = &response.data {
        println!("{}", data);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut addr = format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT);
    if args.first().map(String::as_str) == Some("--addr") {
        if args.len() < 2 {
            bail!("--addr needs host:port");
        }
        addr = args.remove(1);
        args.remove(0);
    }

    let Some(command) = args.first().cloned() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let mut client = Client::connect(addr.as_str())
        .await
        .with_context(|| format!("cannot connect to {}", addr))?;

    let response = match command.as_str() {
        "ping" => client.ping().await?,
        "stop" => client.stop().await?,
        "play" => {
            let path = args.get(1).context("play needs a path")?;
            client.play_path(path, parse_level(args.get(2))?).await?
        }
        "send" => {
            let path = args.get(1).context("send needs a file")?;
            let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path))?;
            client.play_bytes(bytes, parse_level(args.get(2))?).await?
        }
        "tone" => {
            let freq = parse_or(args.get(1), 440.0, "frequency")?;
            let secs = parse_or(args.get(2), 1.0, "duration")?;
            client.play_bytes(tone_wav(freq, secs), parse_level(args.get(3))?).await?
        }
        "set-device" => {
            let id = args.get(1).context("set-device needs an id")?;
            client
                .set_device(id.parse().with_context(|| format!("invalid device id '{}'", id))?)
                .await?
        }
        "devices" => {
            let devices = client.list_devices().await?;
            println!("\n=== Host Output Devices ===");
            for device in &devices {
                let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                println!("  {}{}:", device.name, default_marker);
                println!("    ID: {}", device.id);
                println!("    Channels: {}", device.max_output_channels);
            }
            return Ok(());
        }
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            return Ok(());
        }
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    };

    print_response(&response);
    if !response.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
