//! Instrument metadata keyed by numeric id.
//!
//! The catalog is loaded once at startup through an [`InstrumentsGetter`]
//! and then kept current by instrument events from the multicast receiver.
//! Readers get stable snapshots: lookups clone the entry out rather than
//! borrowing into the map.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Deserialize;

use crate::events::Instrument;
use crate::{Error, Result};

/// The wildcard accepted by `public/get_instruments` in place of a currency.
pub const CURRENCY_ANY: &str = "any";

/// A source of instrument definitions. Implemented by the WebSocket client,
/// the REST getter, and test mocks.
pub trait InstrumentsGetter: Send + Sync {
    /// Fetches all instruments quoted in `currency`.
    ///
    /// # Errors
    /// This function returns an error if the venue rejects the request or the
    /// transport fails.
    fn get_instruments(&self, currency: &str) -> Result<Vec<Instrument>>;
}

/// Fetches every instrument for each of `currencies` through `getter`.
///
/// # Errors
/// This function returns the first getter error encountered.
pub fn get_all_instruments(
    getter: &dyn InstrumentsGetter,
    currencies: &[String],
) -> Result<Vec<Instrument>> {
    let mut all = Vec::new();
    for currency in currencies {
        all.extend(getter.get_instruments(currency)?);
    }
    Ok(all)
}

/// The `id → instrument` mapping shared by the multicast receiver and its
/// consumers.
#[derive(Default)]
pub struct Catalog {
    instruments: Mutex<HashMap<u32, Instrument>>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the mapping with every instrument `getter` returns for
    /// `currencies`.
    ///
    /// # Errors
    /// This function returns the first getter error encountered; the mapping
    /// is left unchanged on error.
    pub fn load(&self, getter: &dyn InstrumentsGetter, currencies: &[String]) -> Result<()> {
        let instruments = get_all_instruments(getter, currencies)?;
        let mut map = self.instruments.lock().expect("catalog lock poisoned");
        map.clear();
        for instrument in instruments {
            map.insert(instrument.instrument_id, instrument);
        }
        Ok(())
    }

    /// Returns a copy of the instrument with `instrument_id`, or `None` when
    /// the id is unknown.
    pub fn resolve(&self, instrument_id: u32) -> Option<Instrument> {
        self.instruments
            .lock()
            .expect("catalog lock poisoned")
            .get(&instrument_id)
            .cloned()
    }

    /// Inserts or replaces `instrument`, driven by instrument add and
    /// state-change events.
    pub fn upsert(&self, instrument: Instrument) {
        self.instruments
            .lock()
            .expect("catalog lock poisoned")
            .insert(instrument.instrument_id, instrument);
    }

    /// Removes the instrument with `instrument_id` after a removal event.
    pub fn remove(&self, instrument_id: u32) -> Option<Instrument> {
        self.instruments
            .lock()
            .expect("catalog lock poisoned")
            .remove(&instrument_id)
    }

    /// The number of instruments currently mapped.
    pub fn len(&self) -> usize {
        self.instruments.lock().expect("catalog lock poisoned").len()
    }

    /// Whether the catalog holds no instruments.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Deserialize)]
struct RestEnvelope<T> {
    result: T,
}

/// Fetches instruments over the venue's REST API.
pub struct HttpInstrumentsGetter {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpInstrumentsGetter {
    /// Creates a getter against `base_url`, e.g. `https://www.deribit.com`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl InstrumentsGetter for HttpInstrumentsGetter {
    fn get_instruments(&self, currency: &str) -> Result<Vec<Instrument>> {
        let url = format!(
            "{}/api/v2/public/get_instruments",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .query(&[("currency", currency), ("expired", "false")])
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| Error::bad_argument("currency", format!("get_instruments failed: {e}")))?;
        let envelope: RestEnvelope<Vec<Instrument>> = response
            .json()
            .map_err(|e| Error::bad_argument("currency", format!("malformed response: {e}")))?;
        Ok(envelope.result)
    }
}
