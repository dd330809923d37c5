// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod assignment;
pub mod config;
pub mod countdown;
pub mod draft;
pub mod gateway;
pub mod runtime;
pub mod util;
pub mod workspace;

/// Interval between clock ticks. The countdown burns one second per tick,
/// so this stays at 1000 outside of tests.
pub const TICK_RATE_MS: u64 = 1000;
