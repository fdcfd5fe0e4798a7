//! Per-key in-flight computations for single-flight `get_or_compute`.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

type Flight = Arc<OnceCell<Bytes>>;

#[derive(Debug, Default)]
pub(super) struct InFlight {
    flights: Mutex<HashMap<String, Flight>>,
}

impl InFlight {
    /// Join the flight for `key`, starting one if none is running.
    pub(super) fn join(&self, key: &str) -> Flight {
        self.flights
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Drop the flight for `key` if it is still `flight`. A newer flight
    /// started after this one completed is left alone.
    pub(super) fn leave(&self, key: &str, flight: &Flight) {
        let mut flights = self.flights.lock();
        if flights.get(key).is_some_and(|current| Arc::ptr_eq(current, flight)) {
            flights.remove(key);
        }
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.flights.lock().len()
    }
}
