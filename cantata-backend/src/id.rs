use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// Two-letter entity-type code carried by every generated identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Study,
    Donor,
    Specimen,
    Sample,
    File,
    Analysis,
    Upload,
}

impl IdPrefix {
    #[must_use]
    pub fn code(self) -> &'static str {
        use IdPrefix::{Analysis, Donor, File, Sample, Specimen, Study, Upload};

        match self {
            Study => "ST",
            Donor => "DO",
            Specimen => "SP",
            Sample => "SA",
            File => "FI",
            Analysis => "AN",
            Upload => "UP",
        }
    }
}

/// Process-wide identifier source. Constructed once per process and shared by
/// reference; the counter is the only globally mutable state in the core.
///
/// Identifiers are the raw counter value rendered in upper-cased base 36
/// behind a two-letter prefix. The counter is seeded from the epoch
/// millisecond clock shifted 20 bits, which keeps identifiers monotonic
/// across restarts without coordination.
#[derive(Debug)]
pub struct IdGenerator {
    counter: AtomicU64,
}

impl IdGenerator {
    #[must_use]
    pub fn new() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(0));

        Self::with_seed(millis << 20)
    }

    /// Deterministic construction for tests.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            counter: AtomicU64::new(seed),
        }
    }

    /// Issues the next identifier for `prefix`.
    ///
    /// # Panics
    /// Aborts the process when the counter is exhausted; identifiers can no
    /// longer be issued safely at that point.
    pub fn next(&self, prefix: IdPrefix) -> String {
        let raw = self.counter.fetch_add(1, Ordering::Relaxed);
        assert!(raw != u64::MAX, "identifier counter exhausted");

        format!("{}{}", prefix.code(), base36(raw))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    if value == 0 {
        return "0".to_string();
    }

    let mut buf = Vec::with_capacity(13);
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();

    String::from_utf8(buf).unwrap_or_default()
}
