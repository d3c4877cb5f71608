//! Option instrument identity
//!
//! Deribit-style option names encode the full contract identity:
//! `UNDERLYING-EXPIRY-STRIKE-TYPE`, e.g. `BTC-27JUN25-100000-C`.
//!
//! Parsing is permissive. A name that does not decompose still yields an
//! `OptionInstrument` (empty underlying and expiry, zero strike, no kind),
//! but wrapped in `InstrumentParse::Unparseable` so callers can see that
//! the identity is a placeholder.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::ParseError;

/// Call or put
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

/// Decomposed option instrument name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OptionInstrument {
    /// Underlying asset, e.g. "BTC".
    pub underlying: String,
    /// Expiry exactly as written in the name, e.g. "27JUN25".
    pub expiry: String,
    /// Strike price.
    pub strike: f64,
    /// Contract type; `None` only for unparseable names.
    pub kind: Option<OptionKind>,
}

impl OptionInstrument {
    /// Calendar date of the expiry, if the expiry string is a known format.
    pub fn expiry_date(&self) -> Option<NaiveDate> {
        parse_expiry_date(&self.expiry).ok()
    }

    pub fn is_call(&self) -> bool {
        self.kind == Some(OptionKind::Call)
    }

    pub fn is_put(&self) -> bool {
        self.kind == Some(OptionKind::Put)
    }
}

/// Outcome of parsing an instrument name as an option.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentParse {
    /// All four segments were understood.
    Parsed(OptionInstrument),
    /// The name did not decompose; carries the empty/zero placeholder.
    Unparseable(OptionInstrument),
}

impl InstrumentParse {
    /// The instrument identity, placeholder or not.
    pub fn instrument(&self) -> &OptionInstrument {
        match self {
            InstrumentParse::Parsed(inst) | InstrumentParse::Unparseable(inst) => inst,
        }
    }

    pub fn into_instrument(self) -> OptionInstrument {
        match self {
            InstrumentParse::Parsed(inst) | InstrumentParse::Unparseable(inst) => inst,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, InstrumentParse::Parsed(_))
    }
}

/// Parse an option name, never failing.
///
/// Any type segment starting with `C` (case-insensitive) is a call;
/// every other type segment is read as a put.
pub fn parse_option_instrument(name: &str) -> InstrumentParse {
    match try_parse_option_instrument(name) {
        Ok(inst) => InstrumentParse::Parsed(inst),
        Err(_) => InstrumentParse::Unparseable(OptionInstrument::default()),
    }
}

/// Strict variant of [`parse_option_instrument`] that reports why a name
/// was rejected.
pub fn try_parse_option_instrument(name: &str) -> Result<OptionInstrument, ParseError> {
    let parts: Vec<&str> = name.split('-').collect();
    let [underlying, expiry, strike, kind] = parts.as_slice() else {
        return Err(ParseError::NotAnOption {
            name: name.to_string(),
        });
    };

    let strike: f64 = strike.trim().parse().map_err(|_| ParseError::InvalidStrike {
        name: name.to_string(),
        strike: strike.to_string(),
    })?;

    let kind = if kind.to_ascii_uppercase().starts_with('C') {
        OptionKind::Call
    } else {
        OptionKind::Put
    };

    Ok(OptionInstrument {
        underlying: underlying.to_string(),
        expiry: expiry.to_string(),
        strike,
        kind: Some(kind),
    })
}

/// Parse an expiry string into a calendar date.
///
/// Understands the Deribit form (`27JUN25`, `5JUL25`) as well as ISO
/// (`2025-06-27`) and compact (`20250627`) dates.
pub fn parse_expiry_date(expiry: &str) -> Result<NaiveDate, ParseError> {
    const FORMATS: [&str; 3] = ["%d%b%y", "%Y-%m-%d", "%Y%m%d"];

    let trimmed = expiry.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| ParseError::InvalidExpiry {
            expiry: expiry.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call() {
        let parsed = parse_option_instrument("BTC-27JUN25-100000-C");
        assert!(parsed.is_parsed());

        let inst = parsed.instrument();
        assert_eq!(inst.underlying, "BTC");
        assert_eq!(inst.expiry, "27JUN25");
        assert_eq!(inst.strike, 100000.0);
        assert!(inst.is_call());
    }

    #[test]
    fn test_parse_put() {
        let inst = parse_option_instrument("ETH-28MAR25-3000-P").into_instrument();
        assert_eq!(inst.kind, Some(OptionKind::Put));
        assert_eq!(inst.strike, 3000.0);
    }

    #[test]
    fn test_lowercase_call_marker() {
        let inst = parse_option_instrument("BTC-27JUN25-90000-call").into_instrument();
        assert!(inst.is_call());
    }

    #[test]
    fn test_perpetual_is_unparseable() {
        let parsed = parse_option_instrument("BTC-PERPETUAL");
        assert!(!parsed.is_parsed());

        let inst = parsed.instrument();
        assert_eq!(inst.underlying, "");
        assert_eq!(inst.expiry, "");
        assert_eq!(inst.strike, 0.0);
        assert_eq!(inst.kind, None);
    }

    #[test]
    fn test_bad_strike_is_unparseable() {
        let parsed = parse_option_instrument("BTC-27JUN25-abc-C");
        assert!(matches!(parsed, InstrumentParse::Unparseable(_)));

        let err = try_parse_option_instrument("BTC-27JUN25-abc-C").unwrap_err();
        assert!(matches!(err, ParseError::InvalidStrike { .. }));
    }

    #[test]
    fn test_parse_expiry_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 27).unwrap();
        assert_eq!(parse_expiry_date("27JUN25").unwrap(), expected);
        assert_eq!(parse_expiry_date("2025-06-27").unwrap(), expected);
        assert_eq!(parse_expiry_date("20250627").unwrap(), expected);
        assert_eq!(
            parse_expiry_date("5JUL25").unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 5).unwrap()
        );
    }

    #[test]
    fn test_parse_expiry_rejects_garbage() {
        assert!(parse_expiry_date("SOON").is_err());
        assert!(parse_expiry_date("").is_err());
    }

    #[test]
    fn test_expiry_date_accessor() {
        let inst = parse_option_instrument("BTC-26DEC25-80000-P").into_instrument();
        assert_eq!(
            inst.expiry_date(),
            NaiveDate::from_ymd_opt(2025, 12, 26)
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_parse_never_panics(name in ".{0,40}") {
                let parsed = parse_option_instrument(&name);
                if !parsed.is_parsed() {
                    prop_assert_eq!(parsed.instrument(), &OptionInstrument::default());
                }
            }

            #[test]
            fn prop_well_formed_names_parse(
                underlying in "[A-Z]{2,5}",
                day in 1u32..28,
                strike in 1u32..500_000,
                is_call in any::<bool>(),
            ) {
                let kind = if is_call { "C" } else { "P" };
                let name = format!("{underlying}-{day}JUN25-{strike}-{kind}");
                let inst = try_parse_option_instrument(&name).unwrap();

                prop_assert_eq!(&inst.underlying, &underlying);
                prop_assert_eq!(inst.strike, f64::from(strike));
                prop_assert_eq!(inst.is_call(), is_call);
                prop_assert_eq!(inst.expiry_date(), NaiveDate::from_ymd_opt(2025, 6, day));
            }
        }
    }
}
