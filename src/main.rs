use anyhow::Context;
use tokio_util::sync::CancellationToken;

use mailsweep::config::Config;

const USAGE: &str = "Usage: mailsweep [--dry-run] [--debug]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut dry_run = false;
    let mut debug = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            "--debug" => debug = true,
            "-h" | "--help" => {
                eprintln!("{USAGE}");
                return Ok(());
            }
            other => anyhow::bail!("unknown argument {other:?}\n{USAGE}"),
        }
    }

    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let default_filter = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    eprintln!("📬 mailsweep v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Server: {}", config.imap.server());
    eprintln!("   Watching: {} → {}", config.mailbox, config.move_to);
    if dry_run {
        eprintln!("   Dry run: nothing will be moved");
    }
    eprintln!("   Press Ctrl+C to stop.\n");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, shutting down...");
            on_signal.cancel();
        }
    });

    mailsweep::sweep(&config, dry_run, cancel)
        .await
        .context("sweep failed")?;

    Ok(())
}
