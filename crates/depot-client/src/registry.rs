//! Process-wide tracking of open writers.
//!
//! Every [`crate::Writer`] registers its URL when it is built and
//! deregisters when it is closed (or dropped). The primary discipline for
//! not losing data is still scoped use with an explicit `close()` on every
//! exit path; this registry is the defense-in-depth fallback that lets a
//! process check for forgotten writers at orderly shutdown:
//!
//! ```ignore
//! // end of main, after all work is done
//! if depot_client::registry::warn_unclosed() > 0 {
//!     // warnings were logged naming each still-open writer
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use tracing::warn;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn writers() -> &'static Mutex<HashMap<u64, String>> {
    static WRITERS: OnceLock<Mutex<HashMap<u64, String>>> = OnceLock::new();
    WRITERS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Record a newly built writer; returns the token used to deregister it.
pub(crate) fn register(url: &str) -> u64 {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    writers()
        .lock()
        .expect("writer registry poisoned")
        .insert(id, url.to_owned());
    id
}

/// Remove a writer from the registry. Safe to call more than once.
pub(crate) fn deregister(id: u64) {
    writers()
        .lock()
        .expect("writer registry poisoned")
        .remove(&id);
}

/// URLs of all writers that are currently open (built but not yet closed).
pub fn open_writers() -> Vec<String> {
    writers()
        .lock()
        .expect("writer registry poisoned")
        .values()
        .cloned()
        .collect()
}

/// Log one warning per still-open writer and return how many there were.
///
/// Intended to be called at orderly process shutdown; a non-zero return
/// means some writer was never closed and its queued items may be lost.
pub fn warn_unclosed() -> usize {
    let open = open_writers();
    for url in &open {
        warn!(
            url = %url,
            "writer still open at shutdown, call close() to flush queued items"
        );
    }
    open.len()
}
