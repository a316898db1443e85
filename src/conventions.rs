//! Moneyness conventions shared by the smile models.

/// Convert a strike to log-moneyness: x = ln(K / F).
pub fn log_moneyness(strike: f64, forward: f64) -> f64 {
    (strike / forward).ln()
}
