//! Bridge Probe
//!
//! Drives the platform bridge against the in-process simulated platform:
//!
//! 1. **Configuration**: loads `BridgeConfig` from TOML, then applies flag
//!    and environment overrides.
//!
//! 2. **Traffic**: dispatches a fixed set of asynchronous calls and
//!    synchronous getters with scripted native replies.
//!
//! 3. **Poll loop**: ticks on an interval, routing every popped message to
//!    its callback, until nothing is pending or the tick budget runs out.
//!
//! Exits non-zero if any request is still pending at the end.

mod config;
mod scenario;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::{bail, Result};
use platform_bridge::sim::SimulatedPlatform;
use platform_bridge::{CallbackRouter, PlatformBridge, TextPolicy};

use config::ProbeConfig;

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "bridge-probe", version, about = "Platform bridge poll-loop probe")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of poll ticks
    #[arg(long, env = "BRIDGE_TICKS")]
    ticks: Option<u64>,

    /// Milliseconds between poll ticks
    #[arg(long, env = "BRIDGE_TICK_MS")]
    tick_ms: Option<u64>,

    /// Symbol namespace of the native library
    #[arg(long, env = "BRIDGE_NAMESPACE")]
    namespace: Option<String>,

    /// Polls after which an unanswered request is reported as stale
    #[arg(long, env = "BRIDGE_STALE_AFTER_POLLS")]
    stale_after_polls: Option<u64>,

    /// Replace invalid UTF-8 in native strings instead of failing
    #[arg(long)]
    lossy_text: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "BRIDGE_LOG_FORMAT")]
    log_format: LogFormat,
}

impl Args {
    fn apply(&self, config: &mut ProbeConfig) {
        if let Some(ticks) = self.ticks {
            config.probe.ticks = ticks;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.probe.tick_ms = tick_ms;
        }
        if let Some(namespace) = &self.namespace {
            config.bridge.namespace = namespace.clone();
        }
        if let Some(polls) = self.stale_after_polls {
            config.bridge.stale_after_polls = polls;
        }
        if self.lossy_text {
            config.bridge.text_policy = TextPolicy::Replace;
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "platform_bridge=info,bridge_probe=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(args.log_format);

    let mut config = ProbeConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let sim = Arc::new(SimulatedPlatform::new());
    scenario::install_handlers(&sim, &config.bridge.namespace);
    let bridge = PlatformBridge::new(sim.clone(), config.bridge.clone())?;
    tracing::info!(
        version = platform_bridge::version(),
        namespace = %bridge.config().namespace,
        "Bridge probe starting"
    );

    let mut router = CallbackRouter::new();
    let outcomes = scenario::start(&bridge, &mut router)?;

    // ── Poll Loop ─────────────────────────────────────────────────────────

    let mut interval = tokio::time::interval(Duration::from_millis(config.probe.tick_ms.max(1)));
    for _ in 0..config.probe.ticks {
        interval.tick().await;
        let popped = router.run_once(&bridge);
        if popped > 0 {
            tracing::debug!(tick = bridge.poll_tick(), popped, "messages routed");
        }
        if bridge.pending_count() == 0 && router.waiting() == 0 && sim.queued() == 0 {
            break;
        }
    }

    for outcome in outcomes.borrow().iter() {
        match args.log_format {
            LogFormat::Json => println!("{}", serde_json::to_string(outcome)?),
            LogFormat::Text => {
                let handle = outcome
                    .handle
                    .map(|h| format!("#{}", h))
                    .unwrap_or_else(|| "notify".to_string());
                println!("{:<8} {:<40} {}", handle, outcome.message_type, outcome.summary);
            }
        }
    }

    let stale = bridge.stale_requests();
    for request in &stale {
        tracing::warn!(handle = request.handle.get(), entry = %request.symbol, "stale request");
    }

    let pending = bridge.pending_count();
    tracing::info!(
        polls = bridge.poll_tick(),
        pending,
        live_messages = sim.live_messages(),
        live_allocations = sim.live_allocations(),
        "Bridge probe finished"
    );
    if pending > 0 {
        bail!("{} request(s) still pending after {} polls", pending, bridge.poll_tick());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let args = Args::parse_from([
            "bridge-probe",
            "--ticks",
            "3",
            "--namespace",
            "ovr",
            "--lossy-text",
        ]);
        let mut config =
            ProbeConfig::from_toml("[bridge]\nnamespace = \"plat\"\n[probe]\ntick_ms = 5").unwrap();
        args.apply(&mut config);
        assert_eq!(config.bridge.namespace, "ovr");
        assert_eq!(config.bridge.text_policy, TextPolicy::Replace);
        assert_eq!(config.probe.ticks, 3);
        assert_eq!(config.probe.tick_ms, 5);
    }

    #[test]
    fn test_default_log_format() {
        let args = Args::parse_from(["bridge-probe"]);
        assert_eq!(args.log_format, LogFormat::Text);
        assert!(args.config.is_none());
    }
}
