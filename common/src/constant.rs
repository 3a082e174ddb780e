/// Base URL for Binance spot REST endpoints.
pub const BINANCE_SPOT_API_BASE: &str = "https://api.binance.com";

/// How often each exchange adapter refreshes its open-orders cache.
pub const DEFAULT_CONNECTOR_POLL_INTERVAL_SECS: u64 = 4;

/// Supervisor reconciliation interval when `INTERVAL_MS` is not set.
pub const DEFAULT_SUPERVISOR_INTERVAL_MS: u64 = 10_000;
/// Anything faster than this would hammer the ledger for no benefit.
pub const MIN_SUPERVISOR_INTERVAL_MS: u64 = 100;

/// Exchange name that routes to the in-memory mock adapter.
pub const FAKE_EXCHANGE: &str = "FAKE";
/// Exchange name that routes to the Binance adapter.
pub const BINANCE_EXCHANGE: &str = "BINANCE";

/// Steps generator kind accepted in `apps.steps_type`.
pub const STEPS_TYPE_FIX_INTERVAL: &str = "FIX_INTERVAL";

/// Compounder kinds accepted in `apps.compound_type`.
pub const COMPOUND_TYPE_NONE: &str = "NONE";
pub const COMPOUND_TYPE_PROFIT_PERCENT: &str = "PROFIT_PERCENT";
