//! Commodity module providing currency and commodity definitions
//!
//! A commodity is identified by its symbol. Besides its display settings it
//! carries a price history, the time of the last price lookup and a default
//! conversion amount. Price data lives behind a lock, and precision and flags
//! are atomics, so that commodities can be shared as `Arc<Commodity>` while
//! amounts parsed later still widen their display settings.
//!
//! Price times are kept to whole seconds, which is all a cache image stores.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use chrono::{DateTime, Timelike, Utc};
use parking_lot::RwLock;

use crate::amount::{Amount, AmountError, AmountResult, Precision};

/// Reference-counted commodity for safe sharing
pub type CommodityRef = Arc<Commodity>;

/// Timestamp type used for price history and lookups
pub type PriceTime = DateTime<Utc>;

/// Drop the sub-second part of a price time
pub fn whole_seconds(when: PriceTime) -> PriceTime {
    when.with_nanosecond(0).unwrap_or(when)
}

bitflags! {
    /// Commodity style and behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommodityFlags: u32 {
        const STYLE_DEFAULTS = 0x000;
        const STYLE_SUFFIXED = 0x001;
        const STYLE_SEPARATED = 0x002;
        const STYLE_DECIMAL_COMMA = 0x004;
        const STYLE_THOUSANDS = 0x008;
        const NOMARKET = 0x010;
        const BUILTIN = 0x020;
        const KNOWN = 0x080;
        const PRIMARY = 0x100;
    }
}

/// Price information attached to a commodity
#[derive(Debug, Clone, Default)]
pub struct PriceData {
    /// Historical prices keyed by the moment they were recorded
    pub history: BTreeMap<PriceTime, Amount>,
    /// When a price was last looked up for this commodity
    pub last_lookup: PriceTime,
    /// Default conversion amount
    pub conversion: Amount,
}

/// Represents a commodity (currency or other tradeable item)
#[derive(Debug)]
pub struct Commodity {
    symbol: String,
    name: String,
    note: String,
    precision: AtomicU16,
    flags: AtomicU32,
    prices: RwLock<PriceData>,
}

impl Commodity {
    /// Create a new commodity with the given symbol
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: String::new(),
            note: String::new(),
            precision: AtomicU16::new(0),
            flags: AtomicU32::new(CommodityFlags::STYLE_DEFAULTS.bits()),
            prices: RwLock::new(PriceData::default()),
        }
    }

    /// Create a new commodity with symbol and precision
    pub fn with_precision(symbol: impl Into<String>, precision: Precision) -> Self {
        let mut commodity = Self::new(symbol);
        commodity.set_precision(precision);
        commodity
    }

    /// Get the symbol of this commodity
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the descriptive name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the descriptive name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Get the free-text note
    pub fn note(&self) -> &str {
        &self.note
    }

    /// Set the free-text note
    pub fn set_note(&mut self, note: impl Into<String>) {
        self.note = note.into();
    }

    /// Get the display precision of this commodity
    pub fn precision(&self) -> Precision {
        self.precision.load(Ordering::Relaxed)
    }

    /// Set the display precision of this commodity
    pub fn set_precision(&mut self, precision: Precision) {
        *self.precision.get_mut() = precision;
    }

    /// Raise the display precision to at least `precision`
    pub fn widen_precision(&self, precision: Precision) {
        self.precision.fetch_max(precision, Ordering::Relaxed);
    }

    /// Get the flags of this commodity
    pub fn flags(&self) -> CommodityFlags {
        CommodityFlags::from_bits_retain(self.flags.load(Ordering::Relaxed))
    }

    /// Check if this commodity has specific flags set
    pub fn has_flags(&self, flags: CommodityFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Add flags to this commodity
    pub fn add_flags(&self, flags: CommodityFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::Relaxed);
    }

    /// Replace all flags
    pub fn set_flags(&mut self, flags: CommodityFlags) {
        *self.flags.get_mut() = flags.bits();
    }

    /// Record a historical price. Prices within the same second replace
    /// each other.
    pub fn add_price(&self, when: PriceTime, price: Amount) {
        self.prices.write().history.insert(whole_seconds(when), price);
    }

    /// Snapshot of the price history in time order
    pub fn history(&self) -> Vec<(PriceTime, Amount)> {
        self.prices.read().history.iter().map(|(when, amt)| (*when, amt.clone())).collect()
    }

    /// Number of recorded historical prices
    pub fn history_len(&self) -> usize {
        self.prices.read().history.len()
    }

    /// Price recorded at exactly `when`
    pub fn price_at(&self, when: &PriceTime) -> Option<Amount> {
        self.prices.read().history.get(&whole_seconds(*when)).cloned()
    }

    /// When a price was last looked up
    pub fn last_lookup(&self) -> PriceTime {
        self.prices.read().last_lookup
    }

    /// Update the last lookup time
    pub fn set_last_lookup(&self, when: PriceTime) {
        self.prices.write().last_lookup = whole_seconds(when);
    }

    /// Default conversion amount
    pub fn conversion(&self) -> Amount {
        self.prices.read().conversion.clone()
    }

    /// Set the default conversion amount
    pub fn set_conversion(&self, conversion: Amount) {
        self.prices.write().conversion = conversion;
    }

    /// Replace all price data at once
    pub fn replace_prices(&self, mut prices: PriceData) {
        prices.last_lookup = whole_seconds(prices.last_lookup);
        prices.history =
            prices.history.into_iter().map(|(when, price)| (whole_seconds(when), price)).collect();
        *self.prices.write() = prices;
    }

    /// Drop price data, releasing any amounts that point back at commodities
    pub fn clear_prices(&self) {
        *self.prices.write() = PriceData::default();
    }
}

impl PartialEq for Commodity {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.name == other.name
            && self.note == other.note
            && self.precision() == other.precision()
            && self.flags() == other.flags()
    }
}

impl Eq for Commodity {}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// Symbol-keyed table of every commodity known to a journal
///
/// The empty symbol is reserved to mean "no commodity" and is never stored.
/// Iteration is in symbol order.
#[derive(Debug, Default)]
pub struct CommodityPool {
    commodities: BTreeMap<String, CommodityRef>,
}

impl CommodityPool {
    /// Create a new commodity pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create a commodity by symbol
    pub fn find_or_create(&mut self, symbol: &str) -> AmountResult<CommodityRef> {
        if symbol.is_empty() {
            return Err(AmountError::ParseError("empty commodity symbol".to_string()));
        }
        let commodity = self
            .commodities
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Commodity::new(symbol)));
        Ok(commodity.clone())
    }

    /// Find an existing commodity by symbol
    pub fn find(&self, symbol: &str) -> Option<CommodityRef> {
        self.commodities.get(symbol).cloned()
    }

    /// Register a fully built commodity.
    ///
    /// Returns `false` and leaves the table untouched if the symbol is empty
    /// or already registered.
    pub fn insert(&mut self, commodity: CommodityRef) -> bool {
        if commodity.symbol().is_empty() || self.commodities.contains_key(commodity.symbol()) {
            return false;
        }
        self.commodities.insert(commodity.symbol().to_string(), commodity);
        true
    }

    /// All commodities in symbol order
    pub fn iter(&self) -> impl Iterator<Item = &CommodityRef> {
        self.commodities.values()
    }

    /// Get commodity count
    pub fn len(&self) -> usize {
        self.commodities.len()
    }

    /// Whether no commodity is registered
    pub fn is_empty(&self) -> bool {
        self.commodities.is_empty()
    }

    /// Parse an amount such as `-3.50 USD` or `$12`, registering its commodity.
    ///
    /// A symbol written after the number marks the commodity as suffixed; a
    /// space between number and symbol marks it as separated. Precision is
    /// widened to the largest number of decimals seen.
    pub fn parse_amount(&mut self, text: &str) -> AmountResult<Amount> {
        let text = text.trim();
        let is_numeric = |c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.');

        let (number, symbol, style) = match text.find(|c: char| !is_numeric(c)) {
            None => (text, "", CommodityFlags::STYLE_DEFAULTS),
            Some(0) => {
                let split = text.find(is_numeric).unwrap_or(text.len());
                let symbol = text[..split].trim_end();
                let style = if split > symbol.len() {
                    CommodityFlags::STYLE_SEPARATED
                } else {
                    CommodityFlags::STYLE_DEFAULTS
                };
                (text[split..].trim(), symbol, style)
            }
            Some(split) => {
                let symbol = text[split..].trim_start();
                let style = if text.len() - split > symbol.len() {
                    CommodityFlags::STYLE_SUFFIXED | CommodityFlags::STYLE_SEPARATED
                } else {
                    CommodityFlags::STYLE_SUFFIXED
                };
                (&text[..split], symbol, style)
            }
        };

        let mut amount = Amount::parse(number)?;
        if symbol.is_empty() {
            return Ok(amount);
        }

        let commodity = match self.commodities.get(symbol) {
            Some(existing) => {
                existing.add_flags(style);
                existing.widen_precision(amount.precision());
                existing.clone()
            }
            None => {
                let commodity = Commodity::with_precision(symbol, amount.precision());
                commodity.add_flags(style);
                let commodity = Arc::new(commodity);
                self.commodities.insert(symbol.to_string(), commodity.clone());
                commodity
            }
        };
        amount.set_commodity(commodity);
        Ok(amount)
    }

    /// Remove every commodity from the pool
    pub fn clear(&mut self) {
        for commodity in self.commodities.values() {
            commodity.clear_prices();
        }
        self.commodities.clear();
    }
}

impl Drop for CommodityPool {
    fn drop(&mut self) {
        // price amounts may point back at their own commodity
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_commodity_creation() {
        let usd = Commodity::new("USD");
        assert_eq!(usd.symbol(), "USD");
        assert_eq!(usd.precision(), 0);
        assert_eq!(usd.history_len(), 0);
    }

    #[test]
    fn test_commodity_flags() {
        let usd = Commodity::new("$");
        assert!(!usd.has_flags(CommodityFlags::STYLE_THOUSANDS));

        usd.add_flags(CommodityFlags::STYLE_THOUSANDS);
        assert!(usd.has_flags(CommodityFlags::STYLE_THOUSANDS));
    }

    #[test]
    fn test_price_history_is_time_ordered() {
        let usd = Arc::new(Commodity::with_precision("USD", 2));
        let later = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        usd.add_price(later, Amount::from_i64(2));
        usd.add_price(earlier, Amount::from_i64(1));

        let history = usd.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].0, earlier);
        assert_eq!(history[1].0, later);
        assert_eq!(usd.price_at(&earlier), Some(Amount::from_i64(1)));
    }

    #[test]
    fn test_price_times_are_whole_seconds() {
        let usd = Arc::new(Commodity::with_precision("USD", 2));
        let noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        usd.add_price(noon + Duration::milliseconds(100), Amount::from_i64(1));
        usd.add_price(noon + Duration::milliseconds(700), Amount::from_i64(2));
        usd.add_price(noon + Duration::seconds(1), Amount::from_i64(3));
        usd.set_last_lookup(noon + Duration::milliseconds(250));

        let history = usd.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], (noon, Amount::from_i64(2)));
        assert_eq!(usd.price_at(&(noon + Duration::milliseconds(900))), Some(Amount::from_i64(2)));
        assert_eq!(usd.last_lookup(), noon);
    }

    #[test]
    fn test_precision_widens_while_shared() {
        let mut pool = CommodityPool::new();
        let whole = pool.parse_amount("1 USD").unwrap();
        let cents = pool.parse_amount("$2.50").unwrap();
        pool.parse_amount("2.50 USD").unwrap();

        assert_eq!(pool.find("USD").unwrap().precision(), 2);
        assert_eq!(whole.to_string(), "1.00 USD");
        assert_eq!(cents.to_string(), "$2.50");
    }

    #[test]
    fn test_pool_rejects_duplicates_and_empty_symbol() {
        let mut pool = CommodityPool::new();
        assert!(pool.insert(Arc::new(Commodity::new("EUR"))));
        assert!(!pool.insert(Arc::new(Commodity::new("EUR"))));
        assert!(!pool.insert(Arc::new(Commodity::new(""))));
        assert!(pool.find_or_create("").is_err());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_pool_find_or_create_shares_instances() {
        let mut pool = CommodityPool::new();
        let a = pool.find_or_create("USD").unwrap();
        let b = pool.find_or_create("USD").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_parse_suffixed_amount() {
        let mut pool = CommodityPool::new();
        let amount = pool.parse_amount("-3.50 USD").unwrap();

        let usd = pool.find("USD").unwrap();
        assert!(Arc::ptr_eq(amount.commodity().unwrap(), &usd));
        assert_eq!(usd.precision(), 2);
        assert!(usd.has_flags(CommodityFlags::STYLE_SUFFIXED | CommodityFlags::STYLE_SEPARATED));
        assert_eq!(amount.to_string(), "-3.50 USD");
    }

    #[test]
    fn test_parse_prefixed_amount() {
        let mut pool = CommodityPool::new();
        let amount = pool.parse_amount("$12").unwrap();
        assert_eq!(amount.commodity().unwrap().symbol(), "$");
        assert_eq!(amount.to_string(), "$12");
        assert_eq!(pool.parse_amount("7").unwrap().commodity(), None);
    }

    #[test]
    fn test_self_priced_commodity_is_released_with_pool() {
        let mut pool = CommodityPool::new();
        let one = pool.parse_amount("1.00 USD").unwrap();
        let usd = pool.find("USD").unwrap();
        usd.add_price(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), one);

        let weak = Arc::downgrade(&usd);
        drop(usd);
        drop(pool);
        assert!(weak.upgrade().is_none());
    }
}
