//! Background feed engine.
//!
//! Runs a tokio runtime on a dedicated thread.  The thread owns the
//! [`FeedEngine`] and one feed over every configured source, takes
//! [`Command`]s from the UI and sends every snapshot back over an [`mpsc`]
//! channel.
//!
//! ## For contributors
//!
//! The UI thread never touches the engine directly.  To expose a new engine
//! operation to the front end, add a [`Command`] variant and a match arm in
//! `run`.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use log::{error, info};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use livescroll::source::RssProvider;
use livescroll::{
    EngineConfig, FeedEngine, FeedResult, FeedSnapshot, FeedSpec, MemoryStore, SortType,
    SourceAddress,
};

/// The single feed the front end shows.
const FEED: &str = "timeline";

/// Requests from the UI thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    LoadMore,
    Reset,
    SetSort(SortType),
}

/// Messages sent from the engine thread to the UI thread.
pub enum DriverMsg {
    Snapshot(FeedSnapshot),
    /// Something the engine could not recover from.
    Error(String),
}

pub struct Driver {
    commands: UnboundedSender<Command>,
    pub updates: mpsc::Receiver<DriverMsg>,
}

impl Driver {
    /// Forward a command.  Silently dropped if the engine thread is gone;
    /// the UI learns about that from the last [`DriverMsg::Error`].
    pub fn send(&self, command: Command) {
        let _ = self.commands.send(command);
    }
}

/// Spawn the engine thread.
///
/// The thread runs until the [`Driver`] is dropped.
pub fn spawn(config: EngineConfig, sources: Vec<SourceAddress>, sort: SortType) -> Driver {
    let (command_tx, command_rx) = unbounded_channel();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("could not start the async runtime: {e}");
                let _ = tx.send(DriverMsg::Error(format!("runtime: {e}")));
                return;
            }
        };
        runtime.block_on(run(config, sources, sort, command_rx, tx));
    });

    Driver {
        commands: command_tx,
        updates: rx,
    }
}

async fn run(
    config: EngineConfig,
    sources: Vec<SourceAddress>,
    mut sort: SortType,
    mut commands: UnboundedReceiver<Command>,
    tx: mpsc::Sender<DriverMsg>,
) {
    let provider = Arc::new(RssProvider::new(config.account.clone()));
    let store = Arc::new(MemoryStore::new(config.store_capacity));
    let page_size = config.page_size;
    let engine = FeedEngine::new(config, provider, store);

    let mut updates = match register(&engine, &sources, sort, page_size) {
        Ok(updates) => updates,
        Err(e) => {
            let _ = tx.send(DriverMsg::Error(e.to_string()));
            return;
        }
    };

    loop {
        tokio::select! {
            Some(snapshot) = updates.recv() => {
                // If the receiver is gone the UI has exited.
                if tx.send(DriverMsg::Snapshot(snapshot)).is_err() {
                    return;
                }
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    info!("front end closed, stopping engine");
                    return;
                };
                let result = match command {
                    Command::LoadMore => engine.load_more(FEED).map(|_| ()),
                    Command::Reset => engine.reset(FEED),
                    Command::SetSort(next) => {
                        sort = next;
                        register(&engine, &sources, sort, page_size).map(|rx| updates = rx)
                    }
                };
                if let Err(e) = result {
                    let _ = tx.send(DriverMsg::Error(e.to_string()));
                }
            }
        }
    }
}

/// (Re)register the timeline with `sort` and subscribe to it.
fn register(
    engine: &FeedEngine,
    sources: &[SourceAddress],
    sort: SortType,
    page_size: usize,
) -> FeedResult<UnboundedReceiver<FeedSnapshot>> {
    info!("showing {} source(s) sorted by {sort}", sources.len());
    engine.add_feed(FEED, FeedSpec::new(sources.to_vec(), sort, page_size))?;
    engine.subscribe(FEED)
}
