//! `viewdeck-viewer` — join a stream from the terminal and print who else is
//! watching. Ctrl-C leaves.

use std::time::Duration;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use viewdeck_agent::{
    HttpTransport, PresenceAgent, PresenceContext, PresenceView, DEFAULT_HEARTBEAT_PERIOD,
};

#[derive(Debug, Parser)]
#[command(name = "viewdeck-viewer", version, about = "Watch a stream's live viewers")]
struct Args {
    /// Server base URL
    #[arg(long, env = "VIEWDECK_SERVER", default_value = "http://127.0.0.1:4000")]
    server: String,

    /// Stream to join
    #[arg(long)]
    stream: String,

    /// Your user id
    #[arg(long)]
    user: String,

    /// Your email address
    #[arg(long)]
    email: String,

    /// Seconds between heartbeats
    #[arg(long, default_value_t = DEFAULT_HEARTBEAT_PERIOD.as_secs())]
    heartbeat_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("VIEWDECK_LOG_FILTER")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let transport = HttpTransport::new(&args.server)?;
    let context = PresenceContext::new(&args.stream, &args.user, &args.email);
    let mut agent = PresenceAgent::new(transport, context)
        .with_heartbeat_period(Duration::from_secs(args.heartbeat_secs.max(1)));

    let mut updates = agent.subscribe();
    agent.mount().await?;
    print_view(&args.stream, &updates.borrow_and_update());

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                print_view(&args.stream, &updates.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Err(err) = agent.unmount().await {
        warn!(error = %err, "Leave did not reach the server");
    }
    Ok(())
}

fn print_view(stream: &str, view: &PresenceView) {
    if !view.connected {
        println!("[{stream}] disconnected");
        return;
    }

    println!("[{stream}] {} watching", view.viewer_count());
    for count in &view.window_counts {
        let tabs = if count.window_count == 1 { "tab" } else { "tabs" };
        println!("  {} ({} {tabs})", count.user_email, count.window_count);
    }
}
