// pulselink — desktop driver for the PulseLink peer-sync core
//
// Stands in for the mobile shell: joins the local mesh, runs a simulated
// wearable through the companion bridge, and exposes the protocol actions
// (ping, work-order requests, reset) as interactive commands.

mod config;
mod sampler;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use pulselink_core::session::SessionState;
use pulselink_core::transport::SERVICE_NAME;
use pulselink_core::{OrderBook, PulseLinkNode, WorkOrder};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "pulselink")]
#[command(about = "PulseLink — live vitals and work orders over the local mesh", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the display name other technicians see
    Name {
        #[command(subcommand)]
        action: NameAction,
    },
    /// Join the mesh and run interactively
    Start {
        /// Skip the simulated wearable (no local vitals broadcast)
        #[arg(long)]
        no_wearable: bool,
        /// Start with an empty work-order list instead of the demo seed
        #[arg(long)]
        no_seed: bool,
    },
    /// Show configuration and identity paths
    Status,
}

#[derive(Subcommand)]
enum NameAction {
    Show,
    Set { name: String },
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Name { action } => cmd_name(action).await,
        Commands::Start {
            no_wearable,
            no_seed,
        } => cmd_start(no_wearable, no_seed).await,
        Commands::Status => cmd_status().await,
    }
}

async fn cmd_name(action: NameAction) -> Result<()> {
    let config = config::Config::load()?;
    let node = PulseLinkNode::with_storage(&config.storage_path()?);

    match action {
        NameAction::Show => match node.display_name() {
            Some(name) => println!("Display name: {}", name.bold()),
            None => println!("{}", "No display name set. Run: pulselink name set <NAME>".yellow()),
        },
        NameAction::Set { name } => {
            let identity = node
                .set_display_name(&name)
                .await
                .context("Failed to set display name")?;
            println!("  {} Display name set to {}", "✓".green(), identity.name.bold());
        }
        NameAction::Clear => {
            node.clear_display_name()
                .await
                .context("Failed to clear display name")?;
            println!("  {} Name cleared. Use `pulselink name set <NAME>` before starting", "✓".green());
        }
    }
    Ok(())
}

async fn cmd_status() -> Result<()> {
    let config = config::Config::load()?;
    let node = PulseLinkNode::with_storage(&config.storage_path()?);

    println!("{}", "PulseLink".bold());
    println!("  Service token:  {}", SERVICE_NAME);
    println!(
        "  Display name:   {}",
        node.display_name().unwrap_or_else(|| "(unset)".into())
    );
    println!("  Config dir:     {}", config::Config::config_dir()?.display());
    println!("  Identity store: {}", config.storage_path()?);
    println!(
        "  Wearable:       {}",
        if config.simulate_wearable {
            format!("simulated, every {}s", config.sample_interval_secs)
        } else {
            "off".into()
        }
    );
    Ok(())
}

async fn cmd_start(no_wearable: bool, no_seed: bool) -> Result<()> {
    let config = config::Config::load()?;
    let node = PulseLinkNode::with_storage(&config.storage_path()?);

    let Some(name) = node.display_name() else {
        bail!("No display name set. Run: pulselink name set <NAME>");
    };

    let seed = if no_seed {
        OrderBook::new()
    } else {
        OrderBook::with_orders(WorkOrder::seed_orders())
    };
    node.start(seed).await.context("Failed to join the mesh")?;

    let session = node.session().expect("session after start");
    let sync = node.sync().expect("sync after start");

    if !no_wearable && config.simulate_wearable {
        let wearable = node.take_wearable().expect("wearable after start");
        tokio::spawn(sampler::run(
            wearable,
            Duration::from_secs(config.sample_interval_secs),
        ));
    }

    println!(
        "{} {} {}",
        "Joined mesh as".bold(),
        name.bold().cyan(),
        format!("(service: {SERVICE_NAME})").dimmed()
    );
    println!("{}", "Commands: peers, vitals, orders <peer>, ping <peer>, background, foreground, reset, quit".dimmed());

    // Announce membership changes as they happen
    let mut watcher = session.subscribe();
    tokio::spawn(async move {
        let mut known: Vec<String> = Vec::new();
        let mut last_ping: Option<String> = None;
        while watcher.changed().await.is_ok() {
            let (current, ping) = {
                let state = watcher.borrow();
                (
                    state
                        .connected_peers
                        .iter()
                        .map(|p| p.name.clone())
                        .collect::<Vec<_>>(),
                    state.last_ping_from.clone(),
                )
            };
            for name in current.iter().filter(|n| !known.contains(n)) {
                println!("  {} {} joined", "+".green(), name.bold());
            }
            for name in known.iter().filter(|n| !current.contains(n)) {
                println!("  {} {} left", "-".red(), name.bold());
            }
            if ping != last_ping {
                if let Some(from) = &ping {
                    println!("  {} ping from {}", "◉".yellow(), from.bold());
                }
                last_ping = ping;
            }
            known = current;
        }
    });

    // Interactive command loop
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("peers"), _) => print_peers(&session.snapshot()),
            (Some("vitals"), _) => print_vitals(&session.snapshot()),
            (Some("orders"), Some(peer)) => {
                if let Err(e) = sync.request_work_orders(peer).await {
                    println!("  {} {}", "✗".red(), e);
                } else {
                    // Give the reply a beat, then show what we have
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    print_orders(&session.snapshot(), peer);
                }
            }
            (Some("ping"), Some(peer)) => match sync.send_ping(peer).await {
                Ok(()) => println!("  {} ping sent to {}", "✓".green(), peer.bold()),
                Err(e) => println!("  {} {}", "✗".red(), e),
            },
            (Some("background"), _) => {
                sync.set_foregrounded(false);
                println!("  app backgrounded; pings relay to the wearable");
            }
            (Some("foreground"), _) => {
                sync.set_foregrounded(true);
                println!("  app foregrounded");
            }
            (Some("reset"), _) => match node.reset().await {
                Ok(()) => println!("  {} connection state reset", "✓".green()),
                Err(e) => println!("  {} reset failed: {}", "✗".red(), e),
            },
            (Some("quit"), _) | (Some("exit"), _) => break,
            (Some(other), _) => println!("  unknown command: {other}"),
            (None, _) => {}
        }
    }

    node.stop().await;
    Ok(())
}

fn print_peers(state: &SessionState) {
    if state.connected_peers.is_empty() {
        println!("  {}", "No team members online".dimmed());
        return;
    }
    for peer in &state.connected_peers {
        let vitals = state
            .peer_vitals
            .get(&peer.name)
            .map(|v| format!("♥ {:.0}  SpO₂ {:.0}%  {:.0} kcal", v.heart_rate, v.oxygen, v.energy))
            .unwrap_or_else(|| "no vitals yet".into());
        println!("  {} {} — {}", "●".green(), peer.name.bold(), vitals.dimmed());
    }
}

fn print_vitals(state: &SessionState) {
    match &state.local_vitals {
        Some(v) => println!(
            "  me: ♥ {:.0}  SpO₂ {:.0}%  {:.0} kcal",
            v.heart_rate, v.oxygen, v.energy
        ),
        None => println!("  {}", "No local sample yet".dimmed()),
    }
    for (name, v) in &state.peer_vitals {
        let stale = if state.is_connected(name) { "" } else { " (stale)" };
        println!(
            "  {name}: ♥ {:.0}  SpO₂ {:.0}%  {:.0} kcal{}",
            v.heart_rate, v.oxygen, v.energy, stale
        );
    }
}

fn print_orders(state: &SessionState, peer: &str) {
    match state.peer_work_orders.get(peer) {
        None => println!("  {}", format!("Waiting for {peer}'s work orders…").dimmed()),
        Some(orders) if orders.is_empty() => {
            println!("  {} has no work orders", peer.bold());
        }
        Some(orders) => {
            for order in orders {
                let done = order.checklist.iter().filter(|i| i.is_done).count();
                println!(
                    "  {} [{:?}/{:?}] {} — {} ({}/{} checked)",
                    order.id.bold(),
                    order.status,
                    order.priority,
                    order.title,
                    order.location.dimmed(),
                    done,
                    order.checklist.len()
                );
            }
        }
    }
}
