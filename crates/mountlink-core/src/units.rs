//! Unit Conversion Functions
//!
//! Provides conversion functions for mount coordinates and rates:
//! - Sexagesimal degrees/hours: `sDD*MM:SS` / `HH:MM:SS` ↔ decimal
//! - Site coordinates: degrees ↔ `DD*MM`
//! - Axis rates: radians per minute ↔ arcsec/s, RA seconds per sidereal second, degrees/s
//!
//! Parsers accept what the firmware actually sends, including the stray
//! leading digits it sometimes puts in front of rate pairs.

use regex::Regex;
use std::f64::consts::PI;
use std::sync::OnceLock;
use thiserror::Error;

use crate::protocol::ProtocolError;

/// Arcseconds per radian
const ARCSEC_PER_RADIAN: f64 = 206_264.806;

/// Seconds of time per radian of hour angle
const TIME_SECONDS_PER_RADIAN: f64 = 43_200.0 / PI;

/// Sidereal seconds per solar second
const SIDEREAL_RATIO: f64 = 0.997_269_57;

/// Fastest axis rate the firmware accepts, in radians per minute
pub const MAX_AXIS_RATE_RAD_PER_MIN: f64 = 4.188_790_2;

/// Errors from parsing mount responses
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Not a sexagesimal value
    #[error("Invalid sexagesimal value: {0:?}")]
    InvalidSexagesimal(String),

    /// Not a decimal rate
    #[error("Invalid rate: {0:?}")]
    InvalidRate(String),

    /// No signed `<ra>,<dec>` pair found
    #[error("Invalid rate pair: {0:?}")]
    InvalidRatePair(String),

    /// No single-digit `<ra>,<dec>` pair found
    #[error("Invalid code pair: {0:?}")]
    InvalidCodePair(String),
}

impl From<ConversionError> for ProtocolError {
    fn from(e: ConversionError) -> Self {
        ProtocolError::MalformedResponse(e.to_string())
    }
}

fn is_field_separator(c: char) -> bool {
    matches!(c, '*' | ':' | '\'' | '"' | '°' | ' ' | 'h' | 'm' | 's')
}

/// Parse a sexagesimal value (`sDD*MM:SS`, `HH:MM:SS`, `DD*MM`, ...) into decimal units
///
/// Up to three fields are accepted; each may carry a fraction. A leading
/// `-` applies to the whole value.
pub fn parse_sexagesimal(text: &str) -> Result<f64, ConversionError> {
    let invalid = || ConversionError::InvalidSexagesimal(text.to_string());

    let trimmed = text.trim().trim_end_matches('#').trim_end();
    let (negative, body) = if let Some(rest) = trimmed.strip_prefix('-') {
        (true, rest)
    } else {
        (false, trimmed.strip_prefix('+').unwrap_or(trimmed))
    };

    if body
        .chars()
        .any(|c| !(c.is_ascii_digit() || c == '.' || is_field_separator(c)))
    {
        return Err(invalid());
    }

    let fields: Vec<&str> = body
        .split(is_field_separator)
        .filter(|f| !f.is_empty())
        .collect();
    if fields.is_empty() || fields.len() > 3 {
        return Err(invalid());
    }

    let mut value = 0.0;
    let mut scale = 1.0;
    for field in fields {
        let n: f64 = field.parse().map_err(|_| invalid())?;
        value += n / scale;
        scale *= 60.0;
    }

    Ok(if negative { -value } else { value })
}

/// Parse `sDD*MM:SS` (or any accepted sexagesimal form) into decimal degrees
pub fn parse_dms(text: &str) -> Result<f64, ConversionError> {
    parse_sexagesimal(text)
}

/// Parse `HH:MM:SS` into decimal hours
pub fn parse_hms(text: &str) -> Result<f64, ConversionError> {
    parse_sexagesimal(text)
}

/// Split `|value|` into whole units, minutes and second ticks at the given precision
fn split_sexagesimal(value: f64, decimals: usize) -> (u64, u64, u64, u64) {
    let scale = 10u64.pow(decimals as u32);
    let ticks = (value.abs() * 3600.0 * scale as f64).round() as u64;
    let per_unit = 3600 * scale;
    let per_minute = 60 * scale;
    (
        ticks / per_unit,
        (ticks % per_unit) / per_minute,
        ticks % per_minute,
        scale,
    )
}

fn format_seconds(ticks: u64, scale: u64, decimals: usize) -> String {
    if decimals == 0 {
        format!("{:02}", ticks)
    } else {
        format!(
            "{:0width$.prec$}",
            ticks as f64 / scale as f64,
            width = decimals + 3,
            prec = decimals
        )
    }
}

fn sign_of(value: f64, all_zero: bool) -> &'static str {
    if value < 0.0 && !all_zero {
        "-"
    } else {
        ""
    }
}

/// Format degrees as `sDD*MM:SS` with `decimals` digits of fractional seconds
///
/// Only negative values carry a sign, which is what the target-declination
/// setter expects.
pub fn format_dms(degrees: f64, decimals: usize) -> String {
    let (d, m, s, scale) = split_sexagesimal(degrees, decimals);
    format!(
        "{}{:02}*{:02}:{}",
        sign_of(degrees, d == 0 && m == 0 && s == 0),
        d,
        m,
        format_seconds(s, scale, decimals)
    )
}

/// Format hours as `HH:MM:SS` with `decimals` digits of fractional seconds
pub fn format_hms(hours: f64, decimals: usize) -> String {
    let (h, m, s, scale) = split_sexagesimal(hours, decimals);
    format!(
        "{}{:02}:{:02}:{}",
        sign_of(hours, h == 0 && m == 0 && s == 0),
        h,
        m,
        format_seconds(s, scale, decimals)
    )
}

/// Format degrees as `DD*MM`, rounded to the nearest arcminute
pub fn format_dm(degrees: f64) -> String {
    let minutes = (degrees.abs() * 60.0).round() as u64;
    format!(
        "{}{:02}*{:02}",
        sign_of(degrees, minutes == 0),
        minutes / 60,
        minutes % 60
    )
}

/// Convert radians per minute to arcseconds per second
pub fn rad_per_min_to_arcsec_per_sec(rate: f64) -> f64 {
    rate * ARCSEC_PER_RADIAN / 60.0
}

/// Convert arcseconds per second to radians per minute
pub fn arcsec_per_sec_to_rad_per_min(rate: f64) -> f64 {
    rate * 60.0 / ARCSEC_PER_RADIAN
}

/// Convert radians per minute to RA seconds per sidereal second
pub fn rad_per_min_to_sec_per_sidereal_sec(rate: f64) -> f64 {
    rate * TIME_SECONDS_PER_RADIAN / 60.0 * SIDEREAL_RATIO
}

/// Convert RA seconds per sidereal second to radians per minute
pub fn sec_per_sidereal_sec_to_rad_per_min(rate: f64) -> f64 {
    rate / SIDEREAL_RATIO * 60.0 / TIME_SECONDS_PER_RADIAN
}

/// Convert degrees per second to radians per minute
pub fn deg_per_sec_to_rad_per_min(rate: f64) -> f64 {
    rate.to_radians() * 60.0
}

/// Convert radians per minute to degrees per second
pub fn rad_per_min_to_deg_per_sec(rate: f64) -> f64 {
    rate.to_degrees() / 60.0
}

/// Format a rate as a signed 7-decimal number (`+0.0000308`)
pub fn format_rate(rate: f64) -> String {
    format!("{:+.7}", rate)
}

/// Parse a signed decimal rate
pub fn parse_rate(text: &str) -> Result<f64, ConversionError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConversionError::InvalidRate(text.to_string()))
}

/// RA and Dec axis rates exactly as the mount reported them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePair {
    /// RA axis field, e.g. `+0.0000000`
    pub ra: String,
    /// Dec axis field, e.g. `-0.0000308`
    pub dec: String,
}

impl RatePair {
    /// RA rate in radians per minute
    pub fn ra_value(&self) -> Result<f64, ConversionError> {
        parse_rate(&self.ra)
    }

    /// Dec rate in radians per minute
    pub fn dec_value(&self) -> Result<f64, ConversionError> {
        parse_rate(&self.dec)
    }
}

fn rate_pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\d*([+-][\d.]+),([+-][\d.]+)").expect("rate pair pattern is valid")
    })
}

fn code_pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d),(\d)$").expect("code pair pattern is valid"))
}

/// Parse an `<ra>,<dec>` signed rate pair
///
/// Stray digits before the pair (`1+0.0000000,-0.0000308`) are dropped; the
/// last well-formed pair in the text wins.
pub fn parse_rate_pair(text: &str) -> Result<RatePair, ConversionError> {
    let caps = rate_pair_pattern()
        .captures_iter(text.trim())
        .last()
        .ok_or_else(|| ConversionError::InvalidRatePair(text.to_string()))?;
    Ok(RatePair {
        ra: caps[1].to_string(),
        dec: caps[2].to_string(),
    })
}

/// Parse a single-digit `<ra>,<dec>` code pair, e.g. the tracking state `1,0`
///
/// Stray leading digits (`10,0`, `110,0`) are dropped.
pub fn parse_code_pair(text: &str) -> Result<(u8, u8), ConversionError> {
    let invalid = || ConversionError::InvalidCodePair(text.to_string());
    let caps = code_pair_pattern().captures(text.trim()).ok_or_else(invalid)?;
    let ra = caps[1].parse().map_err(|_| invalid())?;
    let dec = caps[2].parse().map_err(|_| invalid())?;
    Ok((ra, dec))
}
