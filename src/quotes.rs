//! Market quote inputs for calibration.
//!
//! A [`QuoteSet`] is the validated, read-only quote sequence every
//! calibration consumes: strikes strictly increasing and unique, mid vols
//! positive. Validation happens once at construction so downstream code
//! never re-checks.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SmileError};
use crate::validate::validate_positive;

/// A single market observation: strike and mid implied vol, with optional
/// bid/ask sides for spread-based weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    /// Strike of the quoted option.
    pub strike: f64,
    /// Mid implied volatility.
    pub mid: f64,
    /// Bid implied volatility, if observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<f64>,
    /// Ask implied volatility, if observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<f64>,
}

impl MarketQuote {
    /// Quote from (strike, mid) with no bid/ask sides.
    pub fn new(strike: f64, mid: f64) -> Self {
        Self {
            strike,
            mid,
            bid: None,
            ask: None,
        }
    }

    /// Quote carrying both sides of the market.
    pub fn with_sides(strike: f64, mid: f64, bid: f64, ask: f64) -> Self {
        Self {
            strike,
            mid,
            bid: Some(bid),
            ask: Some(ask),
        }
    }
}

/// How calibration residuals are weighted across quotes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteWeighting {
    /// Every quote counts equally (default).
    #[default]
    Unweighted,
    /// Weight each quote by the inverse of its bid/ask spread, normalized
    /// so the weights average to one. Requires both sides on every quote.
    InverseSpread,
}

/// A validated, strike-ordered sequence of market quotes.
///
/// Immutable after construction; calibration and the orchestrator only
/// read from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<MarketQuote>", into = "Vec<MarketQuote>")]
pub struct QuoteSet {
    quotes: Vec<MarketQuote>,
}

impl TryFrom<Vec<MarketQuote>> for QuoteSet {
    type Error = SmileError;
    fn try_from(quotes: Vec<MarketQuote>) -> Result<Self> {
        Self::new(quotes)
    }
}

impl From<QuoteSet> for Vec<MarketQuote> {
    fn from(set: QuoteSet) -> Self {
        set.quotes
    }
}

impl QuoteSet {
    /// Build a quote set, sorting by strike and validating.
    ///
    /// Quoted strikes must be strictly positive; evaluation *grids* may
    /// still span zero and negative strikes for displaced models.
    ///
    /// # Errors
    /// Returns [`SmileError::InvalidInput`] if the set is empty, a strike
    /// or mid vol is non-positive, or two quotes share a strike.
    /// Duplicate strikes are an error, never a silent dedup.
    pub fn new(mut quotes: Vec<MarketQuote>) -> Result<Self> {
        if quotes.is_empty() {
            return Err(SmileError::InvalidInput {
                message: "quote set must contain at least one quote".into(),
            });
        }
        for q in &quotes {
            validate_positive(q.strike, "quote strike")?;
            validate_positive(q.mid, "quote mid vol")?;
            if let (Some(bid), Some(ask)) = (q.bid, q.ask) {
                validate_positive(bid, "quote bid vol")?;
                validate_positive(ask, "quote ask vol")?;
                if ask < bid {
                    return Err(SmileError::InvalidInput {
                        message: format!(
                            "quote at strike {} has ask {} below bid {}",
                            q.strike, ask, bid
                        ),
                    });
                }
            }
        }
        quotes.sort_by(|a, b| {
            a.strike
                .partial_cmp(&b.strike)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for pair in quotes.windows(2) {
            if pair[1].strike <= pair[0].strike {
                return Err(SmileError::InvalidInput {
                    message: format!(
                        "strikes must be strictly increasing and unique: {} repeated",
                        pair[0].strike
                    ),
                });
            }
        }
        Ok(Self { quotes })
    }

    /// Build from parallel (strike, mid) pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self> {
        Self::new(
            pairs
                .iter()
                .map(|&(strike, mid)| MarketQuote::new(strike, mid))
                .collect(),
        )
    }

    /// Number of quotes.
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// Whether the set is empty (never true for a constructed set).
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Quotes in ascending strike order.
    pub fn quotes(&self) -> &[MarketQuote] {
        &self.quotes
    }

    /// Strikes in ascending order.
    pub fn strikes(&self) -> Vec<f64> {
        self.quotes.iter().map(|q| q.strike).collect()
    }

    /// Mid vols aligned with [`strikes`](Self::strikes).
    pub fn mids(&self) -> Vec<f64> {
        self.quotes.iter().map(|q| q.mid).collect()
    }

    /// Per-quote calibration weights under the given scheme, normalized to
    /// average one.
    ///
    /// # Errors
    /// [`SmileError::InvalidInput`] if `InverseSpread` is requested and any
    /// quote lacks a bid or ask, or has a zero-width spread. Partial
    /// weighting is never applied silently.
    pub fn weights(&self, weighting: QuoteWeighting) -> Result<Vec<f64>> {
        match weighting {
            QuoteWeighting::Unweighted => Ok(vec![1.0; self.quotes.len()]),
            QuoteWeighting::InverseSpread => {
                let mut raw = Vec::with_capacity(self.quotes.len());
                for q in &self.quotes {
                    let (bid, ask) = match (q.bid, q.ask) {
                        (Some(b), Some(a)) => (b, a),
                        _ => {
                            return Err(SmileError::InvalidInput {
                                message: format!(
                                    "inverse-spread weighting requires bid and ask on every \
                                     quote; missing at strike {}",
                                    q.strike
                                ),
                            });
                        }
                    };
                    let spread = ask - bid;
                    if spread <= 0.0 {
                        return Err(SmileError::InvalidInput {
                            message: format!(
                                "inverse-spread weighting requires a positive spread; got \
                                 {spread} at strike {}",
                                q.strike
                            ),
                        });
                    }
                    raw.push(1.0 / spread);
                }
                let mean = raw.iter().sum::<f64>() / raw.len() as f64;
                Ok(raw.into_iter().map(|w| w / mean).collect())
            }
        }
    }
}
