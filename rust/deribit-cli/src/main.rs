//! Gathers multicast feed data for a while and dumps it to JSON files.

use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use deribit::events::{OrderBookRawNotification, TickerNotification, TradesNotification};
use deribit::multicast;
use deribit::websocket;
use deribit::{Catalog, Emitter, ListenerId};

#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(long, action = clap::ArgAction::SetTrue, help = "Enable debug logs")]
    debug: bool,
    #[clap(
        long,
        default_value = "ws://193.58.254.1:8022/ws/api/v2",
        help = "WebSocket API endpoint"
    )]
    websocket: String,
    #[clap(long, default_value = "", help = "API client ID")]
    api_key: String,
    #[clap(long, default_value = "", help = "API secret key")]
    secret_key: String,
    #[clap(
        long,
        default_value = "",
        help = "IPv4 address of the interface to listen for multicast events on; empty joins on all interfaces"
    )]
    ifname: String,
    #[clap(
        long,
        default_value = "239.111.111.1:6100,239.111.111.2:6100,239.111.111.3:6100",
        help = "Comma-separated ip:port multicast groups"
    )]
    addrs: String,
    #[clap(
        long,
        default_value = "3m",
        value_parser = humantime::parse_duration,
        help = "How long to gather data before writing the dumps"
    )]
    gather_data_duration: Duration,
    #[clap(long, default_value = "libs/data/", help = "Directory the JSON dumps are written to")]
    storage_path: PathBuf,
}

fn save_data<T: Serialize>(storage_path: &PathBuf, filename: &str, data: &T) -> anyhow::Result<()> {
    std::fs::create_dir_all(storage_path)
        .with_context(|| format!("creating {}", storage_path.display()))?;
    let path = storage_path.join(filename);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(file, data).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "dump written");
    Ok(())
}

struct Gatherer<T> {
    channels: Vec<String>,
    data: Arc<Mutex<Vec<T>>>,
    listeners: Vec<ListenerId>,
}

impl<T: Clone + Send + Sync + 'static> Gatherer<T> {
    fn subscribe(emitter: &Emitter, channels: &[&str]) -> Self {
        let data = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Vec::new();
        for channel in channels {
            let sink = Arc::clone(&data);
            listeners.push(emitter.on::<T, _>(channel, move |event| {
                sink.lock().expect("gather lock poisoned").push(event.clone());
            }));
        }
        Self {
            channels: channels.iter().map(|c| (*c).to_owned()).collect(),
            data,
            listeners,
        }
    }

    fn finish(self, emitter: &Emitter) -> Vec<T> {
        for (channel, listener) in self.channels.iter().zip(self.listeners) {
            emitter.off(channel, listener);
        }
        std::mem::take(&mut *self.data.lock().expect("gather lock poisoned"))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let emitter = Arc::new(Emitter::new());

    let ws_client = Arc::new(websocket::Client::new(
        Arc::clone(&emitter),
        websocket::Configuration {
            addr: args.websocket.clone(),
            api_key: args.api_key.clone(),
            secret_key: args.secret_key.clone(),
            auto_reconnect: true,
            debug_mode: args.debug,
            connect: None,
        },
    ));
    ws_client
        .start()
        .with_context(|| format!("connecting to {}", args.websocket))?;

    let multicast_client = Arc::new(
        multicast::Client::new(
            multicast::Config {
                ifaddr: args.ifname.clone(),
                addrs: args.addrs.split(',').map(str::to_owned).collect(),
                currencies: vec!["BTC".to_owned()],
            },
            Arc::clone(&ws_client) as _,
            Arc::new(Catalog::new()),
            Arc::clone(&emitter),
        )
        .context("initiating multicast client")?,
    );
    multicast_client
        .start()
        .context("starting multicast client")?;

    let books = Gatherer::<OrderBookRawNotification>::subscribe(
        &emitter,
        &["book.BTC-PERPETUAL", "book.BTC-1AUG22-29000-P"],
    );
    let trades = Gatherer::<TradesNotification>::subscribe(
        &emitter,
        &["trades.option.BTC", "trades.future.BTC"],
    );
    let tickers = Gatherer::<TickerNotification>::subscribe(
        &emitter,
        &["ticker.BTC-PERPETUAL", "ticker.BTC-1AUG22-29000-P"],
    );

    info!(
        duration = %humantime::format_duration(args.gather_data_duration),
        "gathering feed data"
    );
    std::thread::sleep(args.gather_data_duration);

    save_data(&args.storage_path, "orderbook.json", &books.finish(&emitter))?;
    save_data(&args.storage_path, "trades.json", &trades.finish(&emitter))?;
    save_data(&args.storage_path, "ticker.json", &tickers.finish(&emitter))?;

    multicast_client.stop();
    ws_client.stop();
    Ok(())
}
