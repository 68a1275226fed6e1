use crate::models::Event;
use tracing::info;

/// Receives decoded events in delivery order.
///
/// Runs on the session's delivery sequence; a slow handler delays
/// consumption of batches already buffered.
pub trait EventHandler: Send {
    fn handle(&mut self, event: Event);
}

impl<F> EventHandler for F
where
    F: FnMut(Event) + Send,
{
    fn handle(&mut self, event: Event) {
        self(event)
    }
}

/// Logs a summary line per event and keeps a count
#[derive(Debug, Default)]
pub struct LoggingHandler {
    handled: u64,
}

impl LoggingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handled(&self) -> u64 {
        self.handled
    }
}

impl EventHandler for LoggingHandler {
    fn handle(&mut self, event: Event) {
        self.handled += 1;
        let header = event.header();
        info!("Event replay ID: {}", event.replay_id());
        info!(
            "{} operation on {} with record ID {}",
            header.change_type,
            header.entity_name,
            header.record_ids.join(",")
        );
        info!("Changed fields: {}", header.changed_fields.join(", "));
        if !header.nulled_fields.is_empty() {
            info!("Nulled fields: {}", header.nulled_fields.join(", "));
        }
    }
}
