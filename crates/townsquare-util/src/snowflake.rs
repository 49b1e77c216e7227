//! Time-ordered 63-bit identifiers.
//!
//! Layout, most significant first: 41 bits of milliseconds since
//! [`EPOCH_MS`], 10 bits of worker id, 12 bits of per-millisecond sequence.
//! Ids from the same worker are strictly increasing.

use std::sync::{Mutex, OnceLock};

/// 2024-01-01T00:00:00Z in unix milliseconds.
pub const EPOCH_MS: i64 = 1_704_067_200_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_WORKER: u16 = (1 << WORKER_BITS) - 1;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Default)]
struct GeneratorState {
    last_ms: i64,
    sequence: i64,
}

static STATE: OnceLock<Mutex<GeneratorState>> = OnceLock::new();

fn lock_state() -> std::sync::MutexGuard<'static, GeneratorState> {
    let state = STATE.get_or_init(|| Mutex::new(GeneratorState::default()));
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis() - EPOCH_MS
}

/// Generate the next id for `worker_id` (masked to 10 bits).
pub fn generate(worker_id: u16) -> i64 {
    let worker = i64::from(worker_id & MAX_WORKER);
    let mut state = lock_state();

    // Never step backwards if the wall clock does.
    let mut ms = now_ms().max(state.last_ms);
    if ms == state.last_ms {
        state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
        if state.sequence == 0 {
            // Sequence exhausted for this millisecond; borrow the next one.
            ms += 1;
        }
    } else {
        state.sequence = 0;
    }
    state.last_ms = ms;

    (ms << (WORKER_BITS + SEQUENCE_BITS)) | (worker << SEQUENCE_BITS) | state.sequence
}
