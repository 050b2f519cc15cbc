use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use updagent::config::{load_settings, resolve_config_path};
use updagent::orchestration::StateReport;
use updagent::runtime::AgentContext;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(600);

fn usage() -> &'static str {
    "usage: updagent [config.yaml]\n\nReads one update notification (JSON) per stdin line and prints state reports to stdout.\nConfig path falls back to $UPDAGENT_CONFIG, then /etc/updagent/config.yaml."
}

fn print_report(report: &StateReport) -> Result<(), String> {
    let line = serde_json::to_string(report).map_err(|err| err.to_string())?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}").map_err(|err| err.to_string())?;
    stdout.flush().map_err(|err| err.to_string())
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        println!("{}", usage());
        return Ok(());
    }
    if args.len() > 1 {
        return Err(usage().to_string());
    }

    let explicit = args.first().map(PathBuf::from);
    let path = resolve_config_path(explicit.as_deref());
    let settings = load_settings(&path).map_err(|err| err.to_string())?;

    let mut agent = AgentContext::init(settings).map_err(|err| err.to_string())?;
    agent
        .start(Box::new(print_report))
        .map_err(|err| err.to_string())?;

    let notifier = agent.notifier();
    for line in std::io::stdin().lock().lines() {
        let line = line.map_err(|err| format!("failed to read stdin: {err}"))?;
        let payload = line.trim();
        if payload.is_empty() {
            continue;
        }
        if !notifier.send(payload) {
            agent
                .log()
                .error("agent.enqueue_failed", "update queue rejected a notification");
        }
    }

    if !agent.wait_for_idle(DRAIN_TIMEOUT) {
        agent
            .log()
            .warn("agent.drain_timeout", "shutting down with pending work");
    }
    agent.shutdown().map_err(|err| err.to_string())?;
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
