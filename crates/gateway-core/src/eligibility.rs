//! # Availability
//!
//! Decides whether the payment method is offered for a cart or order.

use crate::settings::GatewaySettings;
use tracing::debug;

/// Billing countries (ISO alpha-2) the provider lends in
pub const AVAILABLE_COUNTRIES: &[&str] = &["US", "AS", "GU", "MP", "PR", "VI", "CA"];

/// Why the method is hidden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    Disabled,
    UnsupportedCountry,
    BelowMinimum,
    AboveMaximum,
}

/// Evaluate availability from raw inputs. An empty country is unknown and
/// allowed; totals are cents.
pub fn check_availability(
    total: i64,
    customer_country: &str,
    min: i64,
    max: i64,
    enabled: bool,
) -> Result<(), Unavailable> {
    if !enabled {
        return Err(Unavailable::Disabled);
    }
    let country = customer_country.trim();
    if !country.is_empty()
        && !AVAILABLE_COUNTRIES
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country))
    {
        debug!(country, "country not supported");
        return Err(Unavailable::UnsupportedCountry);
    }
    if total < min {
        debug!(total, min, "order total is less than min amount");
        return Err(Unavailable::BelowMinimum);
    }
    if total > max {
        debug!(total, max, "order total is more than max amount");
        return Err(Unavailable::AboveMaximum);
    }
    Ok(())
}

/// Boolean form of [`check_availability`]
pub fn is_available(total: i64, customer_country: &str, min: i64, max: i64, enabled: bool) -> bool {
    check_availability(total, customer_country, min, max, enabled).is_ok()
}

impl GatewaySettings {
    /// Availability using the configured limits
    pub fn is_available_for(&self, total: i64, customer_country: &str) -> bool {
        is_available(
            total,
            customer_country,
            self.min_total(),
            self.max_total(),
            self.enabled,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled() {
        assert_eq!(
            check_availability(5000, "US", 100, 30_000_000, false),
            Err(Unavailable::Disabled)
        );
    }

    #[test]
    fn test_country_set() {
        assert!(is_available(5000, "US", 100, 30_000_000, true));
        assert!(is_available(5000, "pr", 100, 30_000_000, true));
        assert!(is_available(5000, "CA", 100, 30_000_000, true));
        assert!(is_available(5000, "", 100, 30_000_000, true));
        assert_eq!(
            check_availability(5000, "GB", 100, 30_000_000, true),
            Err(Unavailable::UnsupportedCountry)
        );
    }

    #[test]
    fn test_limits_are_inclusive() {
        assert!(is_available(100, "US", 100, 1000, true));
        assert!(is_available(1000, "US", 100, 1000, true));
        assert_eq!(
            check_availability(99, "US", 100, 1000, true),
            Err(Unavailable::BelowMinimum)
        );
        assert_eq!(
            check_availability(1001, "US", 100, 1000, true),
            Err(Unavailable::AboveMaximum)
        );
    }

    #[test]
    fn test_settings_defaults() {
        let settings = GatewaySettings::default();
        assert!(settings.is_available_for(100, "US"));
        assert!(!settings.is_available_for(99, "US"));
        assert!(settings.is_available_for(30_000_000, "VI"));
        assert!(!settings.is_available_for(30_000_001, "US"));
    }
}
