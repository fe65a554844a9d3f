use std::{sync::Arc, time::Duration, time::Instant};

use kdmlookup::{Bytes, Config, Id, Testnet};

use clap::Parser;
use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Key of the file to look for
    key: String,
    /// Number of nodes in the simulated network
    #[arg(long, default_value_t = 500)]
    nodes: usize,
    /// Number of concurrent requests
    #[arg(long, default_value_t = 3)]
    alpha: usize,
    /// Simulated latency of each request in milliseconds
    #[arg(long, default_value_t = 20)]
    latency: u64,
    /// Store the file at the closest nodes before looking it up
    #[arg(long)]
    store: bool,
    /// Print debug logs
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_thread_names(true)
        .init();

    let mut testnet =
        Testnet::new(cli.nodes).with_latency(Duration::from_millis(cli.latency));

    let target = Id::from_key(&cli.key);

    if cli.store {
        for contact in testnet.closest(&target, 3) {
            testnet.store(contact.id(), target, Bytes::from(cli.key.clone().into_bytes()));
        }
    }

    let testnet = Arc::new(testnet);

    let config = Config {
        alpha: cli.alpha,
        ..Default::default()
    };

    let node = match testnet.outsider(cli.nodes, config) {
        Ok(node) => node,
        Err(error) => {
            println!("Error: {}", error);
            return;
        }
    };

    println!("\nLooking up key: {} ({}) ...\n", cli.key, target);

    let start = Instant::now();

    match node.get_data(&cli.key) {
        Ok(Some(value)) => println!(
            "Got {} bytes in {:?} seconds",
            value.len(),
            start.elapsed().as_secs_f32()
        ),
        Ok(None) => println!(
            "Not found, query exhausted in {:?} seconds",
            start.elapsed().as_secs_f32()
        ),
        Err(error) => println!("Error: {}", error),
    }

    let start = Instant::now();

    match node.store_advertise(&cli.key) {
        Ok(contacts) => {
            println!(
                "\nFound {} closest nodes in {:?} seconds:",
                contacts.len(),
                start.elapsed().as_secs_f32()
            );

            for contact in contacts {
                println!(
                    "  {} {} (distance {})",
                    contact.id(),
                    contact.address(),
                    contact.id().distance(&target)
                );
            }
        }
        Err(error) => println!("Error: {}", error),
    }

    println!("\nRequests sent: {}", testnet.requests());
}
