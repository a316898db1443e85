//! Frozen sample market data and per-variant default parameters.
//!
//! The composition root builds one [`SampleData`] value and threads it
//! through calls ("compute once, freeze"). There is no module-level
//! state and no lock: after construction the value is immutable and can
//! be shared freely across workers.

use crate::error::Result;
use crate::quotes::MarketQuote;
use crate::smile::{AsvParams, MixtureParams, SabrPdeParams, ZabrParams};

/// The sample markets: a rates smile of seven quotes around a 2% forward
/// (ZABR and SABR PDE variants) and an equity-style two-sided smile
/// around a unit reference (ASV), plus the default parameter records each
/// variant starts calibration from.
#[derive(Debug, Clone)]
pub struct SampleData {
    /// Rates market quotes, ascending in strike. Raw records; the
    /// orchestrator validates them on every calibration call.
    pub quotes: Vec<MarketQuote>,
    /// Equity-style market for the ASV variant, with bid/ask sides.
    pub asv_quotes: Vec<MarketQuote>,
    /// Default ASV (equity-style) parameters.
    pub asv: AsvParams,
    /// Default ZABR classical initial guess.
    pub zabr_classical: ZabrParams,
    /// Default ZABR mixture initial guess (negative-rates setup).
    pub zabr_mixture: MixtureParams,
    /// Default SABR PDE initial guess.
    pub sabr_pde: SabrPdeParams,
}

impl SampleData {
    /// Build the sample data set.
    ///
    /// # Errors
    /// Only if a default parameter record fails validation, which would
    /// be a programming error caught by the test suite.
    pub fn new() -> Result<Self> {
        let strikes = [0.005, 0.01, 0.015, 0.02, 0.03, 0.04, 0.1];
        let vols = [
            0.004653372,
            0.00462834,
            0.004641966,
            0.004701461,
            0.004958582,
            0.005357513,
            0.008505604,
        ];
        let quotes = strikes
            .iter()
            .zip(vols.iter())
            .map(|(&k, &v)| MarketQuote::new(k, v))
            .collect();

        // (strike, mid, half-spread) in moneyness terms; wider markets in
        // the wings.
        let asv_market = [
            (0.60, 0.1921, 0.0040),
            (0.70, 0.1899, 0.0030),
            (0.80, 0.1897, 0.0025),
            (0.90, 0.1909, 0.0020),
            (1.00, 0.1929, 0.0015),
            (1.10, 0.1952, 0.0020),
            (1.20, 0.1973, 0.0025),
            (1.35, 0.2001, 0.0030),
            (1.50, 0.2027, 0.0035),
            (1.60, 0.2043, 0.0040),
        ];
        let asv_quotes = asv_market
            .iter()
            .map(|&(k, mid, half)| MarketQuote::with_sides(k, mid, mid - half, mid + half))
            .collect();

        Ok(Self {
            quotes,
            asv_quotes,
            asv: AsvParams::new(1.0, 0.333, 0.2, 0.2, 0.1929, 0.02268, 0.003, 0.0384, 0.0001)?,
            zabr_classical: ZabrParams::new(30.0, 0.02, 0.956, 0.0, 0.00955, 0.373, -0.749, 1.0, true)?,
            zabr_mixture: MixtureParams::new(
                30.0, -0.0007, 0.0132, 0.2, 1.25, 0.2, 0.0001, 0.1978, -0.444, 1.0, true, 0.1,
                0.02, 0.02, 0.001,
            )?,
            sabr_pde: SabrPdeParams::new(30.0, 0.02, 0.035, 0.25, 1.0, -0.1, 0.0, 101, 5.0, 5.0)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_data_constructs() {
        let sample = SampleData::new().unwrap();
        assert_eq!(sample.quotes.len(), 7);
        assert_eq!(sample.quotes[0].strike, 0.005);
        assert_eq!(sample.quotes[6].strike, 0.1);
        assert_eq!(sample.asv_quotes.len(), 10);
    }

    #[test]
    fn sample_quotes_pass_orchestrator_validation() {
        let sample = SampleData::new().unwrap();
        assert!(crate::quotes::QuoteSet::new(sample.quotes).is_ok());
        assert!(crate::quotes::QuoteSet::new(sample.asv_quotes).is_ok());
    }

    #[test]
    fn asv_sample_market_is_two_sided() {
        let sample = SampleData::new().unwrap();
        for q in &sample.asv_quotes {
            let (bid, ask) = (q.bid.unwrap(), q.ask.unwrap());
            assert!(bid < q.mid && q.mid < ask);
        }
    }
}
