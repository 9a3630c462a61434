//! Validation module for common validation patterns
//!
//! This module consolidates validation logic shared by the wizards,
//! providing reusable validation functions for:
//!
//! - Tour and section titles
//! - Product titles and descriptions
//! - Guest counts
//! - Access durations
//!
//! Validators return `&'static str` error keys that double as localization
//! keys, so handlers can re-prompt in the user's language without mapping.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DURATION_PATTERN: Regex =
        Regex::new(r"^(\d{1,4})\s*(?:d|day|days)?$").expect("Invalid duration regex pattern");
}

/// Product display titles are capped by the payment platform.
pub const PRODUCT_TITLE_MAX: usize = 32;
/// Product descriptions are capped by the payment platform.
pub const PRODUCT_DESCRIPTION_MAX: usize = 255;

/// Validates a tour title input
///
/// # Arguments
/// * `title` - The tour title to validate
///
/// # Returns
/// * `Ok(&str)` - The trimmed title if valid
/// * `Err(&str)` - Error key: "title-empty" or "title-too-long"
///
/// # Examples
/// ```
/// use tourguide_bot::validation::validate_tour_title;
///
/// assert!(validate_tour_title("Old Town Walk").is_ok());
/// assert_eq!(validate_tour_title("  "), Err("title-empty"));
/// assert_eq!(validate_tour_title(&"a".repeat(256)), Err("title-too-long"));
/// ```
pub fn validate_tour_title(title: &str) -> Result<&str, &'static str> {
    let trimmed = title.trim();

    if trimmed.is_empty() {
        return Err("title-empty");
    }

    if trimmed.len() > 255 {
        return Err("title-too-long");
    }

    Ok(trimmed)
}

/// Validates a tour description input
///
/// # Arguments
/// * `description` - The description to validate
///
/// # Returns
/// * `Ok(&str)` - The trimmed description if valid
/// * `Err(&str)` - Error key: "description-empty" or "description-too-long"
pub fn validate_tour_description(description: &str) -> Result<&str, &'static str> {
    let trimmed = description.trim();

    if trimmed.is_empty() {
        return Err("description-empty");
    }

    if trimmed.len() > 1024 {
        return Err("description-too-long");
    }

    Ok(trimmed)
}

/// Validates a section title input
///
/// # Arguments
/// * `title` - The section title to validate
///
/// # Returns
/// * `Ok(&str)` - The trimmed title if valid
/// * `Err(&str)` - Error key: "title-empty" or "title-too-long"
pub fn validate_section_title(title: &str) -> Result<&str, &'static str> {
    validate_tour_title(title)
}

/// Validates a product display title against the platform cap
///
/// # Arguments
/// * `title` - The product title to validate
///
/// # Returns
/// * `Ok(&str)` - The trimmed title if valid
/// * `Err(&str)` - Error key: "title-empty" or "product-title-too-long"
///
/// # Examples
/// ```
/// use tourguide_bot::validation::validate_product_title;
///
/// assert!(validate_product_title("Day pass").is_ok());
/// assert_eq!(validate_product_title(&"a".repeat(33)), Err("product-title-too-long"));
/// ```
pub fn validate_product_title(title: &str) -> Result<&str, &'static str> {
    let trimmed = title.trim();

    if trimmed.is_empty() {
        return Err("title-empty");
    }

    if trimmed.len() > PRODUCT_TITLE_MAX {
        return Err("product-title-too-long");
    }

    Ok(trimmed)
}

/// Validates a product description against the platform cap
///
/// # Arguments
/// * `description` - The product description to validate
///
/// # Returns
/// * `Ok(&str)` - The trimmed description if valid
/// * `Err(&str)` - Error key: "description-empty" or "product-description-too-long"
pub fn validate_product_description(description: &str) -> Result<&str, &'static str> {
    let trimmed = description.trim();

    if trimmed.is_empty() {
        return Err("description-empty");
    }

    if trimmed.len() > PRODUCT_DESCRIPTION_MAX {
        return Err("product-description-too-long");
    }

    Ok(trimmed)
}

/// Parses and validates a guest count input
///
/// # Arguments
/// * `input` - The raw guest count text
///
/// # Returns
/// * `Ok(i32)` - The guest count if valid
/// * `Err(&str)` - Error key: "guests-invalid" or "guests-out-of-range"
///
/// # Examples
/// ```
/// use tourguide_bot::validation::parse_guest_count;
///
/// assert_eq!(parse_guest_count("4"), Ok(4));
/// assert_eq!(parse_guest_count("four"), Err("guests-invalid"));
/// assert_eq!(parse_guest_count("0"), Err("guests-out-of-range"));
/// ```
pub fn parse_guest_count(input: &str) -> Result<i32, &'static str> {
    let count: i32 = input.trim().parse().map_err(|_| "guests-invalid")?;

    if !(1..=50).contains(&count) {
        return Err("guests-out-of-range");
    }

    Ok(count)
}

/// Parses and validates an access duration input
///
/// Accepts a bare day count with an optional "d"/"day"/"days" suffix.
///
/// # Arguments
/// * `input` - The raw duration text
///
/// # Returns
/// * `Ok(i32)` - The duration in days if valid
/// * `Err(&str)` - Error key: "duration-invalid" or "duration-out-of-range"
///
/// # Examples
/// ```
/// use tourguide_bot::validation::parse_duration_days;
///
/// assert_eq!(parse_duration_days("30"), Ok(30));
/// assert_eq!(parse_duration_days("7 days"), Ok(7));
/// assert_eq!(parse_duration_days("1d"), Ok(1));
/// assert_eq!(parse_duration_days("soon"), Err("duration-invalid"));
/// assert_eq!(parse_duration_days("0"), Err("duration-out-of-range"));
/// ```
pub fn parse_duration_days(input: &str) -> Result<i32, &'static str> {
    let trimmed = input.trim().to_lowercase();

    let captures = DURATION_PATTERN
        .captures(&trimmed)
        .ok_or("duration-invalid")?;
    let days: i32 = captures[1].parse().map_err(|_| "duration-invalid")?;

    if !(1..=3650).contains(&days) {
        return Err("duration-out-of-range");
    }

    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tour_title() {
        // Valid titles
        assert!(validate_tour_title("Old Town Walk").is_ok());
        assert_eq!(validate_tour_title("  Harbor Tour  "), Ok("Harbor Tour"));

        // Empty titles
        assert_eq!(validate_tour_title(""), Err("title-empty"));
        assert_eq!(validate_tour_title("   "), Err("title-empty"));

        // Too long titles
        let long_title = "a".repeat(256);
        assert_eq!(validate_tour_title(&long_title), Err("title-too-long"));
    }

    #[test]
    fn test_validate_product_title() {
        assert!(validate_product_title("Day pass").is_ok());
        assert_eq!(validate_product_title(""), Err("title-empty"));

        // Exactly at the cap is fine, one past is not
        let at_cap = "a".repeat(PRODUCT_TITLE_MAX);
        assert!(validate_product_title(&at_cap).is_ok());
        let over_cap = "a".repeat(PRODUCT_TITLE_MAX + 1);
        assert_eq!(
            validate_product_title(&over_cap),
            Err("product-title-too-long")
        );
    }

    #[test]
    fn test_validate_product_description() {
        assert!(validate_product_description("Full access for one day").is_ok());
        assert_eq!(validate_product_description(" "), Err("description-empty"));

        let at_cap = "a".repeat(PRODUCT_DESCRIPTION_MAX);
        assert!(validate_product_description(&at_cap).is_ok());
        let over_cap = "a".repeat(PRODUCT_DESCRIPTION_MAX + 1);
        assert_eq!(
            validate_product_description(&over_cap),
            Err("product-description-too-long")
        );
    }

    #[test]
    fn test_parse_guest_count() {
        assert_eq!(parse_guest_count("1"), Ok(1));
        assert_eq!(parse_guest_count(" 12 "), Ok(12));
        assert_eq!(parse_guest_count("50"), Ok(50));

        assert_eq!(parse_guest_count("0"), Err("guests-out-of-range"));
        assert_eq!(parse_guest_count("51"), Err("guests-out-of-range"));
        assert_eq!(parse_guest_count("-3"), Err("guests-out-of-range"));
        assert_eq!(parse_guest_count("four"), Err("guests-invalid"));
        assert_eq!(parse_guest_count(""), Err("guests-invalid"));
    }

    #[test]
    fn test_parse_duration_days() {
        assert_eq!(parse_duration_days("30"), Ok(30));
        assert_eq!(parse_duration_days("7 days"), Ok(7));
        assert_eq!(parse_duration_days("1 day"), Ok(1));
        assert_eq!(parse_duration_days("14d"), Ok(14));
        assert_eq!(parse_duration_days(" 365 "), Ok(365));

        assert_eq!(parse_duration_days("0"), Err("duration-out-of-range"));
        assert_eq!(parse_duration_days("4000"), Err("duration-out-of-range"));
        assert_eq!(parse_duration_days("soon"), Err("duration-invalid"));
        assert_eq!(parse_duration_days("-7"), Err("duration-invalid"));
        assert_eq!(parse_duration_days(""), Err("duration-invalid"));
    }
}
