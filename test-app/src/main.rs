// Route B test application -- joins a smart meter's PAN through an SKSTACK
// Wi-SUN module and reads instantaneous power.
//
// Usage:
//   routeb-test-app --config config.json scan --output pandesc.json
//   routeb-test-app --config config.json join --pandesc pandesc.json
//   routeb-test-app --tty /dev/ttyUSB0 --id ... --password ... poll --interval 30
//
// Logging goes through `RUST_LOG` (default `info`).

mod config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use routeb_core::{Deadline, Error, PanDescriptor};
use routeb_skstack::{RouteBSession, SkStackBuilder};

use crate::config::{FileConfig, Overrides, Settings};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Route B test application -- scan, join and poll a smart meter.
#[derive(Parser)]
#[command(name = "routeb-test-app", version, about)]
struct Cli {
    /// JSON config file with `id`, `password` and `tty`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the Wi-SUN module (e.g. /dev/ttyUSB0).
    #[arg(long, env = "ROUTEB_TTY")]
    tty: Option<String>,

    /// Route B authentication ID (32 characters).
    #[arg(long, env = "ROUTEB_ID")]
    id: Option<String>,

    /// Route B password.
    #[arg(long, env = "ROUTEB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Override the module's baud rate (default: 115200).
    #[arg(long)]
    baud: Option<u32>,

    /// Seconds allowed for authentication, scan and join together.
    #[arg(long, default_value_t = 120)]
    join_timeout: u64,

    /// Scan duration exponent (0-14).
    #[arg(long, default_value_t = 6)]
    scan_duration: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate and scan, then save the PAN descriptor.
    Scan {
        #[arg(long, default_value = "pandesc.json")]
        output: PathBuf,
    },
    /// Join the meter's PAN.
    Join {
        /// Use a saved PAN descriptor instead of scanning.
        #[arg(long)]
        pandesc: Option<PathBuf>,
    },
    /// Join, then read instantaneous power periodically.
    Poll {
        /// Use a saved PAN descriptor instead of scanning.
        #[arg(long)]
        pandesc: Option<PathBuf>,

        /// Seconds between readings.
        #[arg(long, default_value_t = 15)]
        interval: u64,

        /// Number of readings (0 = until interrupted).
        #[arg(long, default_value_t = 0)]
        count: u32,

        /// Seconds allowed for one reading.
        #[arg(long, default_value_t = 15)]
        query_timeout: u64,
    },
}

// ---------------------------------------------------------------------------
// Join sequence
// ---------------------------------------------------------------------------

async fn open_session(cli: &Cli, settings: &Settings) -> Result<RouteBSession> {
    let mut builder = SkStackBuilder::new().serial_port(&settings.tty);
    if let Some(baud) = cli.baud {
        builder = builder.baud_rate(baud);
    }
    let session = builder
        .build()
        .await
        .with_context(|| format!("opening {}", settings.tty))?;
    info!(tty = %settings.tty, "serial port open");
    Ok(session)
}

/// Authenticate and find the PAN, scanning unless a saved descriptor is given.
async fn discover(
    session: &mut RouteBSession,
    settings: &Settings,
    saved: Option<&Path>,
    scan_duration: u8,
    deadline: &Deadline,
) -> Result<PanDescriptor> {
    session
        .authenticate(&settings.id, &settings.password, deadline)
        .await
        .context("setting Route B credentials")?;

    match saved {
        Some(path) => {
            let pan = config::load_descriptor(path)?;
            info!(path = %path.display(), mac = %pan.mac_address, "using saved PAN descriptor");
            Ok(pan)
        }
        None => {
            info!(duration = scan_duration, "scanning");
            session
                .scan(scan_duration, deadline)
                .await
                .context("active scan")
        }
    }
}

async fn join_network(
    session: &mut RouteBSession,
    settings: &Settings,
    saved: Option<&Path>,
    scan_duration: u8,
    deadline: &Deadline,
) -> Result<PanDescriptor> {
    let pan = discover(session, settings, saved, scan_duration, deadline).await?;
    session
        .join(&pan, deadline)
        .await
        .context("joining the meter's PAN")?;
    Ok(pan)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn join_deadline(cli: &Cli, cancel: &CancellationToken) -> Deadline {
    Deadline::after(Duration::from_secs(cli.join_timeout)).with_cancel(cancel.clone())
}

async fn cmd_scan(
    session: &mut RouteBSession,
    settings: &Settings,
    cli: &Cli,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let deadline = join_deadline(cli, cancel);
    let pan = discover(session, settings, None, cli.scan_duration, &deadline).await?;
    config::save_descriptor(output, &pan)?;

    println!("PAN descriptor");
    println!("  MAC address:    {}", pan.mac_address);
    println!("  Link-local:     {}", pan.link_local_address);
    println!("  Channel:        {} (page {})", pan.channel, pan.channel_page);
    println!("  PAN ID:         {:04X}", pan.pan_id);
    println!("  LQI:            {}", pan.lqi);
    println!("Saved to {}", output.display());
    Ok(())
}

async fn cmd_join(
    session: &mut RouteBSession,
    settings: &Settings,
    cli: &Cli,
    saved: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let deadline = join_deadline(cli, cancel);
    let pan = join_network(session, settings, saved, cli.scan_duration, &deadline).await?;
    println!("Joined PAN {:04X} via {}", pan.pan_id, pan.link_local_address);
    Ok(())
}

struct PollOptions {
    interval: Duration,
    count: u32,
    query_timeout: Duration,
}

/// Read power until `count` readings are taken or `cancel` fires.
///
/// A failed reading is logged and the loop goes on; only a broken link
/// ends it early.
async fn poll_power(
    session: &mut RouteBSession,
    address: &str,
    options: &PollOptions,
    cancel: &CancellationToken,
) -> Result<u32> {
    let mut taken = 0u32;
    loop {
        let deadline = Deadline::after(options.query_timeout).with_cancel(cancel.clone());
        match session.get_instant_power(address, &deadline).await {
            Ok(reading) => {
                taken += 1;
                info!(watts = reading.watts, "instant power");
                println!("{}  {} W", reading.captured_at.to_rfc3339(), reading.watts);
            }
            Err(Error::Cancelled) => break,
            Err(e) if e.is_fatal() => return Err(e).context("reading instant power"),
            Err(e) => warn!(error = %e, "instant power query failed"),
        }

        if options.count > 0 && taken >= options.count {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(options.interval) => {}
        }
    }
    Ok(taken)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(
        file,
        Overrides {
            tty: cli.tty.clone(),
            id: cli.id.clone(),
            password: cli.password.clone(),
        },
    )?;
    if cli.scan_duration > 14 {
        bail!("--scan-duration must be between 0 and 14");
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted");
                cancel.cancel();
            }
        });
    }

    let mut session = open_session(&cli, &settings).await?;

    let result = match &cli.command {
        Command::Scan { output } => cmd_scan(&mut session, &settings, &cli, output, &cancel).await,
        Command::Join { pandesc } => {
            cmd_join(&mut session, &settings, &cli, pandesc.as_deref(), &cancel).await
        }
        Command::Poll {
            pandesc,
            interval,
            count,
            query_timeout,
        } => {
            let deadline = join_deadline(&cli, &cancel);
            let joined = join_network(
                &mut session,
                &settings,
                pandesc.as_deref(),
                cli.scan_duration,
                &deadline,
            )
            .await;
            match joined {
                Ok(pan) => {
                    info!("polling instant power");
                    let options = PollOptions {
                        interval: Duration::from_secs(*interval),
                        count: *count,
                        query_timeout: Duration::from_secs(*query_timeout),
                    };
                    poll_power(&mut session, &pan.link_local_address, &options, &cancel)
                        .await
                        .map(|taken| info!(readings = taken, "polling stopped"))
                }
                Err(e) => Err(e),
            }
        }
    };

    session.close().await.ok();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use routeb_core::JoinStatus;
    use routeb_skstack::FramerConfig;
    use routeb_test_harness::{MockHandle, MockTransport, scripts};

    const METER: &str = "FE80:0000:0000:0000:021D:1290:1234:5678";

    fn settings() -> Settings {
        Settings {
            tty: "/dev/null".into(),
            id: "0123456789ABCDEF0123456789ABCDEF".into(),
            password: "0123456789AB".into(),
        }
    }

    fn session() -> (RouteBSession, MockHandle) {
        let mock = MockTransport::new();
        let handle = mock.handle();
        (RouteBSession::new(Box::new(mock), FramerConfig::default()), handle)
    }

    fn pan() -> PanDescriptor {
        PanDescriptor {
            mac_address: "001D129012345678".into(),
            link_local_address: METER.into(),
            channel: 0x21,
            channel_page: 0x09,
            pan_id: 0x8888,
            pair_id: 0x00AABBCC,
            side: 0,
            lqi: 0xE1,
        }
    }

    fn expect_join_from_saved(handle: &MockHandle) {
        let s = settings();
        handle.expect(format!("SKSETPWD C {}\r\n", s.password).as_bytes(), &scripts::ok());
        handle.expect(format!("SKSETRBID {}\r\n", s.id).as_bytes(), &scripts::ok());
        handle.expect(b"SKSREG S2 21\r\n", &scripts::ok());
        handle.expect(b"SKSREG S3 8888\r\n", &scripts::ok());
        let mut joined = scripts::ok();
        joined.extend_from_slice(&scripts::event(0x25, METER));
        handle.expect(format!("SKJOIN {METER}\r\n").as_bytes(), &joined);
    }

    #[tokio::test]
    async fn joins_from_saved_descriptor() {
        let path = std::env::temp_dir().join(format!("routeb-main-{}-pandesc.json", std::process::id()));
        config::save_descriptor(&path, &pan()).unwrap();

        let (mut session, handle) = session();
        expect_join_from_saved(&handle);
        let deadline = Deadline::after(Duration::from_secs(2));
        let joined = join_network(&mut session, &settings(), Some(&path), 6, &deadline)
            .await
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(joined, pan());
        assert_eq!(session.status(), JoinStatus::Joined);
        assert_eq!(handle.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn poll_takes_requested_readings() {
        let (mut session, handle) = session();
        expect_join_from_saved(&handle);
        let deadline = Deadline::after(Duration::from_secs(2));
        session.authenticate(&settings().id, &settings().password, &deadline).await.unwrap();
        session.join(&pan(), &deadline).await.unwrap();

        let query = routeb_skstack::commands::send_udp(
            METER,
            routeb_skstack::commands::ECHONET_PORT,
            true,
            &routeb_skstack::echonet::INSTANT_POWER_REQUEST,
        )
        .unwrap();
        let frame = routeb_skstack::echonet::decode_hex("1081000102880105FF017201E70400000378").unwrap();
        for _ in 0..2 {
            handle.expect(&query, &scripts::erxudp(METER, "001D129012345678", &frame));
        }

        let options = PollOptions {
            interval: Duration::from_millis(1),
            count: 2,
            query_timeout: Duration::from_secs(1),
        };
        let taken = poll_power(&mut session, METER, &options, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(taken, 2);
    }

    #[tokio::test]
    async fn poll_stops_when_cancelled() {
        let (mut session, handle) = session();
        expect_join_from_saved(&handle);
        let deadline = Deadline::after(Duration::from_secs(2));
        session.authenticate(&settings().id, &settings().password, &deadline).await.unwrap();
        session.join(&pan(), &deadline).await.unwrap();

        let query = routeb_skstack::commands::send_udp(
            METER,
            routeb_skstack::commands::ECHONET_PORT,
            true,
            &routeb_skstack::echonet::INSTANT_POWER_REQUEST,
        )
        .unwrap();
        handle.expect_silent(&query);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = PollOptions {
            interval: Duration::from_secs(60),
            count: 0,
            query_timeout: Duration::from_secs(60),
        };
        let taken = poll_power(&mut session, METER, &options, &cancel).await.unwrap();
        assert_eq!(taken, 0);
    }

    #[test]
    fn cli_parses_poll() {
        let cli = Cli::try_parse_from([
            "routeb-test-app",
            "--tty",
            "/dev/ttyUSB0",
            "poll",
            "--interval",
            "30",
            "--count",
            "4",
        ])
        .unwrap();
        match cli.command {
            Command::Poll { interval, count, query_timeout, pandesc } => {
                assert_eq!(interval, 30);
                assert_eq!(count, 4);
                assert_eq!(query_timeout, 15);
                assert!(pandesc.is_none());
            }
            _ => panic!("expected poll"),
        }
        assert_eq!(cli.join_timeout, 120);
        assert_eq!(cli.scan_duration, 6);
    }
}
