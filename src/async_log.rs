//! Non-blocking logging for the submission path.
//!
//! Messages go through a bounded channel to a background task so the trade
//! pipeline never stalls on a slow logger. When the channel is full the
//! message is dropped.

use log::{log, Level};
use std::sync::OnceLock;
use tokio::sync::mpsc::{self, Sender};

const QUEUE_CAPACITY: usize = 512;

static QUEUE: OnceLock<Sender<(Level, String)>> = OnceLock::new();

/// Spawn the background logging task. Call once at startup.
pub fn init_async_logger() -> tokio::task::JoinHandle<()> {
    let (tx, mut rx) = mpsc::channel::<(Level, String)>(QUEUE_CAPACITY);
    QUEUE.set(tx).expect("async logger already initialized");

    tokio::spawn(async move {
        while let Some((level, msg)) = rx.recv().await {
            log!(level, "{}", msg);
        }
    })
}

#[inline]
pub fn log_async(level: Level, msg: String) {
    if let Some(queue) = QUEUE.get() {
        let _ = queue.try_send((level, msg));
    }
}

#[macro_export]
macro_rules! info_async {
    ($($arg:tt)*) => {
        $crate::async_log::log_async(log::Level::Info, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! warn_async {
    ($($arg:tt)*) => {
        $crate::async_log::log_async(log::Level::Warn, format!($($arg)*))
    };
}
