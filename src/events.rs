use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global `fmt` subscriber. `RUST_LOG` wins over `log_level`.
/// Logs go to stderr so stdout stays reserved for collaborator frames.
pub fn init_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct EventRecord<'a, T> {
    seq: u64,
    at: DateTime<Utc>,
    event: &'a str,
    payload: T,
}

/// Bridge lifecycle records (launches, stale drops, switches, injections)
/// written as JSON lines to stderr when enabled. Clones share one sequence.
#[derive(Clone, Debug, Default)]
pub struct EventEmitter {
    enabled: bool,
    seq: Arc<AtomicU64>,
}

impl EventEmitter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn emit<T: Serialize>(&self, event: &str, payload: T) {
        let Some(line) = self.render(event, payload) else {
            return;
        };
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
    }

    fn render<T: Serialize>(&self, event: &str, payload: T) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let record = EventRecord {
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            at: Utc::now(),
            event,
            payload,
        };
        match serde_json::to_string(&record) {
            Ok(line) => Some(line),
            Err(error) => {
                tracing::warn!(target = "window_bridge::events", event, error = %error, "event not serializable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::EventEmitter;
    use serde_json::{json, Value};

    #[test]
    fn disabled_renders_nothing() {
        let emitter = EventEmitter::new(false);
        assert!(emitter.render("sender_launched", json!({"pid": 1})).is_none());
        emitter.emit("sender_launched", json!({"pid": 1}));
    }

    #[test]
    fn records_carry_shared_sequence() {
        let emitter = EventEmitter::new(true);
        let clone = emitter.clone();
        let first: Value = serde_json::from_str(
            &emitter.render("workspace_switched", json!({"index": 1})).unwrap(),
        )
        .unwrap();
        let second: Value =
            serde_json::from_str(&clone.render("sender_stale", "gone").unwrap()).unwrap();

        assert_eq!(first["seq"], 1);
        assert_eq!(first["event"], "workspace_switched");
        assert_eq!(first["payload"]["index"], 1);
        assert!(first["at"].is_string());
        assert_eq!(second["seq"], 2);
        assert_eq!(second["payload"], "gone");
    }
}
