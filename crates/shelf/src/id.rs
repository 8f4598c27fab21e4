//! Record identity generation.

use std::sync::{LazyLock, Mutex};

use ulid::Generator;

static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Generate a new record id.
///
/// Ids are ULIDs from a process-wide monotonic generator: unique within the
/// process and lexicographically ordered by creation time.
pub fn generate_record_id() -> String {
    let mut generator = GENERATOR.lock().unwrap_or_else(|e| e.into_inner());
    loop {
        match generator.generate() {
            Ok(id) => return id.to_string(),
            // Random component exhausted for this millisecond; wait for the next.
            Err(_) => std::thread::yield_now(),
        }
    }
}
