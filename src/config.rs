use once_cell::sync::Lazy;

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// Currency assigned to ledger rows when the caller does not supply one.
pub static DEFAULT_CURRENCY: Lazy<String> = Lazy::new(|| {
    std::env::var("DEFAULT_CURRENCY")
        .ok()
        .map(|value| value.trim().to_ascii_uppercase())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "PHP".to_string())
});

/// key: billing-config -> subscription expiry scan cadence
pub static BILLING_EXPIRY_SCAN_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("BILLING_EXPIRY_SCAN_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(300)
});

/// key: billing-config -> grace window before an overdue subscription is expired
pub static BILLING_EXPIRY_GRACE_DAYS: Lazy<i64> = Lazy::new(|| {
    std::env::var("BILLING_EXPIRY_GRACE_DAYS")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value >= 0)
        .unwrap_or(3)
});

/// key: ledger-config -> row bound for in-process stats aggregation
pub static LEDGER_STATS_SCAN_LIMIT: Lazy<i64> = Lazy::new(|| {
    std::env::var("LEDGER_STATS_SCAN_LIMIT")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(1000)
});

/// key: ledger-config -> default page size for transaction listings
pub static LEDGER_DEFAULT_PAGE_SIZE: Lazy<i64> = Lazy::new(|| {
    std::env::var("LEDGER_DEFAULT_PAGE_SIZE")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0 && *value <= 500)
        .unwrap_or(50)
});
