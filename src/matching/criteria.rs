// src/matching/criteria.rs - The single property/buyer evaluation used by both matching directions
use log::{debug, warn};
use thiserror::Error;

use crate::geometry::GeoPoint;
use crate::matching::geography::{evaluate_area, GeoVerdict};
use crate::matching::property_type::normalize_property_type;
use crate::models::{BuyerProfile, MatchOutcome, Property, SharedProperty};
use crate::utils::constants::{
    BAND_EPSILON, BASE_MATCH_SCORE, MAX_MATCH_SCORE, MIN_MATCH_SCORE, PRICE_OVERAGE_MAX_PENALTY,
    PRICE_SAVINGS_BONUS_RATE, PRICE_SAVINGS_MAX_BONUS, PRICE_TOLERANCE_FACTOR, ROOMS_EXACT_BONUS,
    ROOMS_FEWER_PENALTY, ROOMS_MAX_EXTRA, SIZE_MAX_FACTOR, SIZE_SHORTFALL_MAX_PENALTY,
    SIZE_TOLERANCE_FACTOR,
};

/// Anything that can be scored against a buyer profile: portal listings,
/// agency listings and consolidated shared properties.
pub trait MatchSubject {
    fn price(&self) -> Option<f64>;
    fn size(&self) -> Option<f64>;
    fn property_type(&self) -> Option<&str>;
    fn rooms(&self) -> Option<i32>;
    fn location(&self) -> Option<GeoPoint>;
    /// Short identifier used in log lines.
    fn label(&self) -> String;
}

impl MatchSubject for Property {
    fn price(&self) -> Option<f64> {
        self.price
    }
    fn size(&self) -> Option<f64> {
        self.size
    }
    fn property_type(&self) -> Option<&str> {
        self.property_type.as_deref()
    }
    fn rooms(&self) -> Option<i32> {
        self.room_count()
    }
    fn location(&self) -> Option<GeoPoint> {
        self.location
    }
    fn label(&self) -> String {
        format!("property #{}", self.id)
    }
}

impl MatchSubject for SharedProperty {
    fn price(&self) -> Option<f64> {
        self.price
    }
    fn size(&self) -> Option<f64> {
        self.size
    }
    fn property_type(&self) -> Option<&str> {
        self.property_type.as_deref()
    }
    fn rooms(&self) -> Option<i32> {
        self.rooms
    }
    fn location(&self) -> Option<GeoPoint> {
        self.location
    }
    fn label(&self) -> String {
        format!("shared property #{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("property type {found:?} is not {wanted}")]
    TypeMismatch { wanted: String, found: Option<String> },
    #[error("{found} rooms, buyer wants at most {max}")]
    TooManyRooms { found: i32, max: i32 },
    #[error("size unknown")]
    SizeUnknown,
    #[error("size {size} below {min_accepted:.1}")]
    SizeTooSmall { size: f64, min_accepted: f64 },
    #[error("size {size} above {max_accepted:.1}")]
    SizeTooLarge { size: f64, max_accepted: f64 },
    #[error("price unknown")]
    PriceUnknown,
    #[error("price {price} above {max_accepted:.0}")]
    PriceTooHigh { price: f64, max_accepted: f64 },
    #[error("property has no location")]
    MissingLocation,
    #[error("outside search area")]
    OutsideArea,
    #[error("search area unusable: {0}")]
    MalformedArea(String),
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Scores `subject` for `profile`, or says why the pair does not match.
///
/// Checks run in a fixed order (type, rooms, size, price, geography) and the
/// first failing check decides the reason. A matching pair always scores in
/// `[1, 100]`.
pub fn explain_match<P: MatchSubject + ?Sized>(
    subject: &P,
    profile: &BuyerProfile,
) -> Result<u8, RejectReason> {
    let mut score = BASE_MATCH_SCORE;

    if let Some(wanted) = profile.property_type.as_deref().filter(|t| !t.trim().is_empty()) {
        let wanted = normalize_property_type(wanted);
        let found = subject.property_type().map(normalize_property_type);
        if found.as_deref() != Some(wanted.as_str()) {
            return Err(RejectReason::TypeMismatch { wanted, found });
        }
    }

    if let (Some(wanted), Some(found)) = (profile.rooms.filter(|r| *r > 0), subject.rooms()) {
        let max = wanted + ROOMS_MAX_EXTRA;
        if found > max {
            return Err(RejectReason::TooManyRooms { found, max });
        }
        if found == wanted {
            score += ROOMS_EXACT_BONUS;
        } else if found < wanted {
            score -= ROOMS_FEWER_PENALTY;
        }
    }

    if let Some(min_size) = positive(profile.min_size) {
        let size = positive(subject.size()).ok_or(RejectReason::SizeUnknown)?;
        // Band edges compare in square metres; the epsilon only absorbs rounding.
        if size < min_size * SIZE_TOLERANCE_FACTOR - BAND_EPSILON {
            return Err(RejectReason::SizeTooSmall {
                size,
                min_accepted: min_size * SIZE_TOLERANCE_FACTOR,
            });
        }
        if size > min_size * SIZE_MAX_FACTOR + BAND_EPSILON {
            return Err(RejectReason::SizeTooLarge {
                size,
                max_accepted: min_size * SIZE_MAX_FACTOR,
            });
        }
        let ratio = size / min_size;
        if ratio < 1.0 {
            let shortfall = (1.0 - ratio) / (1.0 - SIZE_TOLERANCE_FACTOR);
            score -= (shortfall * SIZE_SHORTFALL_MAX_PENALTY).min(SIZE_SHORTFALL_MAX_PENALTY);
        }
    }

    if let Some(max_price) = positive(profile.max_price) {
        let price = positive(subject.price()).ok_or(RejectReason::PriceUnknown)?;
        if price > max_price * PRICE_TOLERANCE_FACTOR + BAND_EPSILON {
            return Err(RejectReason::PriceTooHigh {
                price,
                max_accepted: max_price * PRICE_TOLERANCE_FACTOR,
            });
        }
        let ratio = price / max_price;
        if ratio <= 1.0 {
            score += ((1.0 - ratio) * PRICE_SAVINGS_BONUS_RATE).min(PRICE_SAVINGS_MAX_BONUS);
        } else {
            let overage = (ratio - 1.0) / (PRICE_TOLERANCE_FACTOR - 1.0);
            score -= (overage * PRICE_OVERAGE_MAX_PENALTY).min(PRICE_OVERAGE_MAX_PENALTY);
        }
    }

    if let Some(area) = profile.search_area.as_ref() {
        let location = subject.location().ok_or(RejectReason::MissingLocation)?;
        match evaluate_area(area, &location) {
            Ok(GeoVerdict::Inside { penalty }) | Ok(GeoVerdict::Tolerance { penalty }) => {
                score -= penalty;
            }
            Ok(GeoVerdict::Outside) => return Err(RejectReason::OutsideArea),
            Err(e) => {
                warn!(
                    "Search area of client {} unusable for {}: {}. Treating as not in area.",
                    profile.client_id,
                    subject.label(),
                    e
                );
                return Err(RejectReason::MalformedArea(e.to_string()));
            }
        }
    }

    Ok(score.round().clamp(MIN_MATCH_SCORE, MAX_MATCH_SCORE) as u8)
}

/// `{is_match, score}` form of [`explain_match`].
pub fn evaluate_match<P: MatchSubject + ?Sized>(subject: &P, profile: &BuyerProfile) -> MatchOutcome {
    match explain_match(subject, profile) {
        Ok(score) => MatchOutcome::matched(score),
        Err(reason) => {
            debug!(
                "{} rejected for client {}: {}",
                subject.label(),
                profile.client_id,
                reason
            );
            MatchOutcome::REJECTED
        }
    }
}

/// Seam through which every matching entry point evaluates pairs.
pub trait CriteriaMatcher: Send + Sync {
    fn evaluate(&self, subject: &dyn MatchSubject, profile: &BuyerProfile) -> MatchOutcome;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ToleranceMatcher;

impl CriteriaMatcher for ToleranceMatcher {
    fn evaluate(&self, subject: &dyn MatchSubject, profile: &BuyerProfile) -> MatchOutcome {
        evaluate_match(subject, profile)
    }
}
