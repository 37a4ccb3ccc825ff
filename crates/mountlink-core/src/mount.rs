//! Mount facade
//!
//! Maps telescope properties and actions onto mount commands. Every exchange
//! goes through the [`CommandDispatcher`], so the facade can be shared by
//! threads and processes the same way the dispatcher can.
//!
//! Conventions on this side of the facade: degrees for angles, hours for
//! right ascension, east-positive longitude, UTC for time.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DriverSettings;
use crate::protocol::{
    CommandDispatcher, GuideDirection, Mnemonic, ProtocolError, SerialTransport, Transport,
};
use crate::units::{self, ConversionError};

/// Oldest firmware whose command set this facade speaks
pub const MINIMUM_FIRMWARE: &str = "5.60";

/// Fastest manual axis move, in degrees per second
pub const MAX_MOVE_RATE_DEG_PER_SEC: f64 = 4.0;

/// Longest guide pulse the firmware can express
pub const MAX_PULSE_DURATION: Duration = Duration::from_millis(9990);

/// Pause before a sync so the mount has applied the new target
const SYNC_SETTLE: Duration = Duration::from_millis(300);

/// Poll interval while waiting for a blocking slew to finish
const SLEW_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors from mount operations
#[derive(Error, Debug)]
pub enum MountError {
    /// The exchange with the mount failed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Argument outside the range the mount accepts
    #[error("Invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: f64 },

    /// Mount answered with failure, possibly after a retry
    #[error("Command rejected: {0}")]
    CommandRejected(String),

    /// Mount state does not allow the operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(&'static str),

    /// Firmware is too old or unrecognized
    #[error("Unsupported firmware {found} (minimum version: {required})")]
    UnsupportedFirmware { found: String, required: &'static str },

    /// `YGM` returned an unknown mount type
    #[error("Unknown mount type: {0}")]
    UnknownMountType(String),

    /// `YGS` returned an unknown tracking rate code
    #[error("Unknown tracking rate code: {0}")]
    UnknownTrackingRate(u8),
}

impl From<ConversionError> for MountError {
    fn from(e: ConversionError) -> Self {
        MountError::Protocol(e.into())
    }
}

/// Tracking rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveRate {
    /// Stars
    Sidereal,
    /// Moon
    Lunar,
    /// Sun
    Solar,
}

impl DriveRate {
    /// Rate code used by `YSS`/`YGS`
    pub fn code(&self) -> u8 {
        match self {
            DriveRate::Sidereal => 1,
            DriveRate::Lunar => 2,
            DriveRate::Solar => 3,
        }
    }

    /// Look up a rate by its code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(DriveRate::Sidereal),
            2 => Some(DriveRate::Lunar),
            3 => Some(DriveRate::Solar),
            _ => None,
        }
    }
}

/// Mount geometry reported by `YGM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentMode {
    /// German equatorial
    GermanPolar,
    /// Fork mount
    Polar,
    /// Altitude-azimuth
    AltAz,
}

/// Pointing state of a German equatorial mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PierSide {
    /// Flipped
    East,
    /// Normal
    West,
    /// Pointing state not recognized
    Unknown,
}

/// Axes that accept manual moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    /// RA / azimuth; positive moves west
    Primary,
    /// Dec / altitude; positive moves north
    Secondary,
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"PULSAR V([\d.]+)").expect("version pattern is valid"))
}

/// Extract the version number from the `YV` banner
pub fn parse_firmware_version(banner: &str) -> Option<String> {
    version_pattern()
        .captures(banner)
        .map(|caps| caps[1].trim_end_matches('.').to_string())
        .filter(|v| !v.is_empty())
}

/// Compare dotted version numbers component-wise
fn version_at_least(version: &str, minimum: &str) -> bool {
    let parts = |v: &str| -> Vec<u32> { v.split('.').filter_map(|p| p.parse().ok()).collect() };
    parts(version) >= parts(minimum)
}

/// Hour angle in (-12, 12]
fn hour_angle(sidereal_time: f64, right_ascension: f64) -> f64 {
    let mut ha = sidereal_time - right_ascension;
    if ha > 12.0 {
        ha -= 24.0;
    } else if ha <= -12.0 {
        ha += 24.0;
    }
    ha
}

/// Resolve the pier side from the `YGW` flip flag and the hour angle
pub fn pier_side_from(pointing_state: &str, hour_angle: f64) -> PierSide {
    let east_of_meridian = hour_angle > -12.0 && hour_angle <= 0.0;
    let west_of_meridian = hour_angle > 0.0 && hour_angle <= 12.0;
    match (pointing_state, east_of_meridian, west_of_meridian) {
        ("0", true, _) => PierSide::West,
        ("1", true, _) => PierSide::East,
        ("0", _, true) => PierSide::East,
        ("1", _, true) => PierSide::West,
        _ => PierSide::Unknown,
    }
}

/// Device longitude (positive west, 0..360) to east-positive ±180
pub fn longitude_from_device(degrees: f64) -> f64 {
    let west = if degrees > 180.0 { degrees - 360.0 } else { degrees };
    -west
}

/// East-positive ±180 longitude to the device's positive-west 0..360
pub fn longitude_to_device(degrees: f64) -> f64 {
    let west = -degrees;
    if west < 0.0 {
        west + 360.0
    } else {
        west
    }
}

/// Telescope facade over a dispatcher
pub struct Mount<T: Transport> {
    dispatcher: CommandDispatcher<T>,
    legacy_pulse_guide: bool,
    tracking_rate: Mutex<Option<DriveRate>>,
    pulse_guiding: AtomicBool,
}

impl Mount<SerialTransport> {
    /// Open the configured serial port and verify the firmware
    pub fn connect(settings: &DriverSettings) -> Result<Self, MountError> {
        let transport = SerialTransport::open(settings)?;
        let mount = Self::from_settings(transport, settings);
        mount.check_firmware()?;
        info!(port = %settings.port_name, device = %settings.device_id, "mount connected");
        Ok(mount)
    }
}

impl<T: Transport> Mount<T> {
    /// Wrap a dispatcher
    pub fn new(dispatcher: CommandDispatcher<T>, legacy_pulse_guide: bool) -> Self {
        Self {
            dispatcher,
            legacy_pulse_guide,
            tracking_rate: Mutex::new(None),
            pulse_guiding: AtomicBool::new(false),
        }
    }

    /// Build a mount over any transport using the driver settings
    pub fn from_settings(transport: T, settings: &DriverSettings) -> Self {
        Self::new(
            CommandDispatcher::from_settings(transport, settings),
            settings.legacy_pulse_guide,
        )
    }

    /// Underlying dispatcher
    pub fn dispatcher(&self) -> &CommandDispatcher<T> {
        &self.dispatcher
    }

    fn query(&self, mnemonic: Mnemonic) -> Result<String, MountError> {
        Ok(self.dispatcher.send(mnemonic, "")?)
    }

    fn query_bool(&self, mnemonic: Mnemonic) -> Result<bool, MountError> {
        Ok(self.dispatcher.send_bool(mnemonic, "")?)
    }

    fn blind(&self, mnemonic: Mnemonic, args: &str) -> Result<(), MountError> {
        self.dispatcher.send(mnemonic, args)?;
        Ok(())
    }

    /// Send a bool setter, retrying once when the mount answers with failure
    fn set_confirmed(&self, mnemonic: Mnemonic, args: &str) -> Result<(), MountError> {
        if self.dispatcher.send_bool(mnemonic, args)? {
            return Ok(());
        }
        warn!(command = mnemonic.code(), args, "mount rejected setter, retrying");
        if self.dispatcher.send_bool(mnemonic, args)? {
            return Ok(());
        }
        Err(MountError::CommandRejected(format!("{}{}", mnemonic.code(), args)))
    }

    // Firmware

    /// Firmware version from the `YV` banner
    pub fn firmware_version(&self) -> Result<String, MountError> {
        let banner = self.query(Mnemonic::GetVersion)?;
        parse_firmware_version(&banner).ok_or(MountError::UnsupportedFirmware {
            found: banner,
            required: MINIMUM_FIRMWARE,
        })
    }

    /// Reject firmware older than [`MINIMUM_FIRMWARE`]
    pub fn check_firmware(&self) -> Result<(), MountError> {
        let version = self.firmware_version()?;
        if !version_at_least(&version, MINIMUM_FIRMWARE) {
            return Err(MountError::UnsupportedFirmware {
                found: version,
                required: MINIMUM_FIRMWARE,
            });
        }
        debug!(version = %version, "firmware accepted");
        Ok(())
    }

    // Position

    /// Current right ascension in hours
    pub fn right_ascension(&self) -> Result<f64, MountError> {
        Ok(units::parse_hms(&self.query(Mnemonic::GetRightAscension)?)?)
    }

    /// Current declination in degrees
    pub fn declination(&self) -> Result<f64, MountError> {
        Ok(units::parse_dms(&self.query(Mnemonic::GetDeclination)?)?)
    }

    /// Current altitude in degrees
    pub fn altitude(&self) -> Result<f64, MountError> {
        Ok(units::parse_dms(&self.query(Mnemonic::GetAltitude)?)?)
    }

    /// Current azimuth in degrees
    pub fn azimuth(&self) -> Result<f64, MountError> {
        Ok(units::parse_dms(&self.query(Mnemonic::GetAzimuth)?)?)
    }

    /// Local sidereal time in hours
    pub fn sidereal_time(&self) -> Result<f64, MountError> {
        Ok(units::parse_hms(&self.query(Mnemonic::GetSiderealTime)?)?)
    }

    // Site

    /// Site latitude in degrees
    pub fn site_latitude(&self) -> Result<f64, MountError> {
        Ok(units::parse_dms(&self.query(Mnemonic::GetLatitude)?)?)
    }

    /// Set the site latitude in degrees
    pub fn set_site_latitude(&self, degrees: f64) -> Result<(), MountError> {
        if !(-90.0..=90.0).contains(&degrees) {
            return Err(MountError::InvalidValue {
                what: "site latitude",
                value: degrees,
            });
        }
        self.blind(Mnemonic::SetLatitude, &format!(" {}", units::format_dm(degrees)))
    }

    /// Site longitude in degrees, east positive
    pub fn site_longitude(&self) -> Result<f64, MountError> {
        let device = units::parse_dms(&self.query(Mnemonic::GetLongitude)?)?;
        Ok(longitude_from_device(device))
    }

    /// Set the site longitude in degrees, east positive
    pub fn set_site_longitude(&self, degrees: f64) -> Result<(), MountError> {
        if !(-180.0..=180.0).contains(&degrees) {
            return Err(MountError::InvalidValue {
                what: "site longitude",
                value: degrees,
            });
        }
        let device = longitude_to_device(degrees);
        self.blind(Mnemonic::SetLongitude, &format!(" {}", units::format_dm(device)))
    }

    // Targets

    /// Target right ascension in hours
    pub fn target_right_ascension(&self) -> Result<f64, MountError> {
        Ok(units::parse_hms(&self.query(Mnemonic::GetTargetRightAscension)?)?)
    }

    /// Set the target right ascension in hours, `[0, 24)`
    pub fn set_target_right_ascension(&self, hours: f64) -> Result<(), MountError> {
        if !(0.0..24.0).contains(&hours) {
            return Err(MountError::InvalidValue {
                what: "target right ascension",
                value: hours,
            });
        }
        // Round first so 23:59:59.7 wraps to 00:00:00 instead of 24:00:00
        let seconds = (hours * 3600.0).round() % 86_400.0;
        let args = format!(" {}", units::format_hms(seconds / 3600.0, 0));
        self.set_confirmed(Mnemonic::SetTargetRightAscension, &args)
    }

    /// Target declination in degrees
    pub fn target_declination(&self) -> Result<f64, MountError> {
        Ok(units::parse_dms(&self.query(Mnemonic::GetTargetDeclination)?)?)
    }

    /// Set the target declination in degrees, `[-90, 90]`
    pub fn set_target_declination(&self, degrees: f64) -> Result<(), MountError> {
        if !(-90.0..=90.0).contains(&degrees) {
            return Err(MountError::InvalidValue {
                what: "target declination",
                value: degrees,
            });
        }
        let args = format!(" {}", units::format_dms(degrees, 0));
        self.set_confirmed(Mnemonic::SetTargetDeclination, &args)
    }

    // State

    /// Check if the mount is slewing
    pub fn slewing(&self) -> Result<bool, MountError> {
        self.query_bool(Mnemonic::IsSlewing)
    }

    /// Check if the mount is parked
    pub fn at_park(&self) -> Result<bool, MountError> {
        self.query_bool(Mnemonic::IsParked)
    }

    /// Check if the mount is on its way to park
    pub fn is_parking(&self) -> Result<bool, MountError> {
        self.query_bool(Mnemonic::IsParking)
    }

    /// Mount geometry
    pub fn alignment_mode(&self) -> Result<AlignmentMode, MountError> {
        let code = self.query(Mnemonic::GetMountType)?;
        match code.trim() {
            "1" => Ok(AlignmentMode::GermanPolar),
            "2" => Ok(AlignmentMode::Polar),
            "3" => Ok(AlignmentMode::AltAz),
            _ => Err(MountError::UnknownMountType(code)),
        }
    }

    /// Side of the pier the optical tube is on
    ///
    /// Fork mounts always report east.
    pub fn side_of_pier(&self) -> Result<PierSide, MountError> {
        if self.alignment_mode()? == AlignmentMode::Polar {
            return Ok(PierSide::East);
        }
        let pointing_state = self.query(Mnemonic::GetPointingState)?;
        let ha = hour_angle(self.sidereal_time()?, self.right_ascension()?);
        let side = pier_side_from(pointing_state.trim(), ha);
        debug!(pointing_state = %pointing_state, hour_angle = ha, side = ?side, "side of pier");
        Ok(side)
    }

    // Motion

    /// Park the mount; no-op if parked or already parking
    pub fn park(&self) -> Result<(), MountError> {
        if self.at_park()? || self.is_parking()? {
            return Ok(());
        }
        if !self.query_bool(Mnemonic::Park)? {
            return Err(MountError::CommandRejected("park".to_string()));
        }
        info!("parking");
        Ok(())
    }

    /// Unpark the mount; no-op if not parked
    pub fn unpark(&self) -> Result<(), MountError> {
        if !self.at_park()? {
            return Ok(());
        }
        self.blind(Mnemonic::Unpark, "")?;
        info!("unparked");
        Ok(())
    }

    /// Stop a slew in progress
    pub fn abort_slew(&self) -> Result<(), MountError> {
        if self.at_park()? {
            return Err(MountError::InvalidOperation("cannot abort slew, mount is parked"));
        }
        if !self.slewing()? {
            debug!("abort requested but mount is not slewing");
            return Ok(());
        }
        self.blind(Mnemonic::Halt, "")?;
        info!("slew aborted");
        Ok(())
    }

    fn require_tracking_unparked(&self) -> Result<(), MountError> {
        if self.at_park()? {
            return Err(MountError::InvalidOperation("mount is parked"));
        }
        if !self.tracking()? {
            return Err(MountError::InvalidOperation("mount is not tracking"));
        }
        Ok(())
    }

    /// Start a slew to the current target
    pub fn slew_to_target_async(&self) -> Result<(), MountError> {
        self.require_tracking_unparked()?;
        // "1" means the target is unreachable
        if self.query(Mnemonic::SlewToTarget)? == "1" {
            return Err(MountError::CommandRejected("slew to target".to_string()));
        }
        info!("slew started");
        Ok(())
    }

    /// Slew to the current target and wait until the mount stops
    pub fn slew_to_target(&self) -> Result<(), MountError> {
        self.slew_to_target_async()?;
        while self.slewing()? {
            std::thread::sleep(SLEW_POLL_INTERVAL);
        }
        Ok(())
    }

    /// Set the target and start slewing to it
    pub fn slew_to_coordinates_async(&self, hours: f64, degrees: f64) -> Result<(), MountError> {
        self.set_target_right_ascension(hours)?;
        self.set_target_declination(degrees)?;
        self.slew_to_target_async()
    }

    /// Tell the mount it is pointing at the current target
    pub fn sync_to_target(&self) -> Result<(), MountError> {
        self.require_tracking_unparked()?;
        std::thread::sleep(SYNC_SETTLE);
        let reply = self.query(Mnemonic::SyncToTarget)?;
        info!(reply = %reply, "synced to target");
        Ok(())
    }

    /// Set the target and sync to it
    pub fn sync_to_coordinates(&self, hours: f64, degrees: f64) -> Result<(), MountError> {
        self.set_target_right_ascension(hours)?;
        self.set_target_declination(degrees)?;
        self.sync_to_target()
    }

    /// Move one axis at `rate` degrees per second, leaving the other axis as it is
    ///
    /// A rate of zero stops the axis.
    pub fn move_axis(&self, axis: Axis, rate: f64) -> Result<(), MountError> {
        if self.at_park()? {
            return Err(MountError::InvalidOperation("cannot move axis, mount is parked"));
        }
        if !rate.is_finite() || rate.abs() > MAX_MOVE_RATE_DEG_PER_SEC {
            return Err(MountError::InvalidValue {
                what: "axis rate",
                value: rate,
            });
        }
        let current = units::parse_rate_pair(&self.query(Mnemonic::GetAxisRates)?)?;
        let new_rate = units::format_rate(units::deg_per_sec_to_rad_per_min(rate));
        let args = match axis {
            Axis::Primary => format!("{},{}", new_rate, current.dec),
            Axis::Secondary => format!("{},{}", current.ra, new_rate),
        };
        debug!(axis = ?axis, rate, "move axis");
        self.blind(Mnemonic::SetAxisRates, &args)
    }

    /// Check if a legacy guide pulse is in progress
    pub fn is_pulse_guiding(&self) -> bool {
        self.pulse_guiding.load(Ordering::SeqCst)
    }

    /// Nudge the mount in `direction` for `duration`
    pub fn pulse_guide(
        &self,
        direction: GuideDirection,
        duration: Duration,
    ) -> Result<(), MountError> {
        if self.at_park()? {
            return Err(MountError::InvalidOperation("cannot pulse guide, mount is parked"));
        }
        if duration > MAX_PULSE_DURATION {
            return Err(MountError::InvalidValue {
                what: "pulse duration (ms)",
                value: duration.as_millis() as f64,
            });
        }
        debug!(
            direction = ?direction,
            duration_ms = duration.as_millis() as u64,
            legacy = self.legacy_pulse_guide,
            "pulse guide"
        );

        if !self.legacy_pulse_guide {
            // Duration goes out in units of 10 ms
            let tens = duration.as_millis() / 10;
            let args = format!("{}{:03}3", direction.letter(), tens);
            return self.blind(Mnemonic::PulseGuide, &args);
        }

        self.pulse_guiding.store(true, Ordering::SeqCst);
        let result = self.legacy_pulse(direction, duration);
        self.pulse_guiding.store(false, Ordering::SeqCst);
        result
    }

    /// Guide-rate manual move, timed on this side of the link
    fn legacy_pulse(
        &self,
        direction: GuideDirection,
        duration: Duration,
    ) -> Result<(), MountError> {
        self.blind(Mnemonic::SetGuideRate, "")?;
        self.blind(Mnemonic::Move, &direction.letter().to_string())?;
        std::thread::sleep(duration);
        self.blind(Mnemonic::Halt, "")
    }

    // Tracking

    /// Check if the mount is tracking
    pub fn tracking(&self) -> Result<bool, MountError> {
        let (ra_code, _) = units::parse_code_pair(&self.query(Mnemonic::GetTracking)?)?;
        Ok(ra_code != 0)
    }

    /// Start tracking at the selected rate, or stop tracking
    pub fn set_tracking(&self, enabled: bool) -> Result<(), MountError> {
        let args = if enabled {
            format!("{},0", self.tracking_rate()?.code())
        } else {
            "0,0".to_string()
        };
        info!(enabled, "set tracking");
        self.blind(Mnemonic::SetTracking, &args)
    }

    /// Selected tracking rate
    ///
    /// Read from the mount once, then remembered locally; a stopped mount
    /// reports sidereal.
    pub fn tracking_rate(&self) -> Result<DriveRate, MountError> {
        if let Some(rate) = *self.tracking_rate.lock() {
            return Ok(rate);
        }
        let (code, _) = units::parse_code_pair(&self.query(Mnemonic::GetTracking)?)?;
        let rate = match code {
            0 => DriveRate::Sidereal,
            other => DriveRate::from_code(other).ok_or(MountError::UnknownTrackingRate(other))?,
        };
        *self.tracking_rate.lock() = Some(rate);
        Ok(rate)
    }

    /// Select the tracking rate; applied immediately if the mount is tracking
    pub fn set_tracking_rate(&self, rate: DriveRate) -> Result<(), MountError> {
        if self.tracking_rate()? == rate {
            return Ok(());
        }
        *self.tracking_rate.lock() = Some(rate);
        if self.tracking()? {
            self.set_tracking(true)?;
        }
        Ok(())
    }

    // Rates

    /// RA axis rate offset in RA seconds per sidereal second
    pub fn right_ascension_rate(&self) -> Result<f64, MountError> {
        let pair = units::parse_rate_pair(&self.query(Mnemonic::GetAxisRates)?)?;
        Ok(units::rad_per_min_to_sec_per_sidereal_sec(pair.ra_value()?))
    }

    /// Set the RA axis rate in RA seconds per sidereal second
    pub fn set_right_ascension_rate(&self, rate: f64) -> Result<(), MountError> {
        let ra = units::sec_per_sidereal_sec_to_rad_per_min(rate);
        if !ra.is_finite() || ra.abs() > units::MAX_AXIS_RATE_RAD_PER_MIN {
            return Err(MountError::InvalidValue {
                what: "right ascension rate (rad/min)",
                value: ra,
            });
        }
        let current = units::parse_rate_pair(&self.query(Mnemonic::GetAxisRates)?)?;
        let args = format!("{},{}", units::format_rate(ra), current.dec);
        self.blind(Mnemonic::SetAxisRates, &args)
    }

    /// Dec axis rate offset in arcseconds per second
    pub fn declination_rate(&self) -> Result<f64, MountError> {
        let pair = units::parse_rate_pair(&self.query(Mnemonic::GetAxisRates)?)?;
        Ok(units::rad_per_min_to_arcsec_per_sec(pair.dec_value()?))
    }

    /// Set the Dec axis rate in arcseconds per second
    pub fn set_declination_rate(&self, rate: f64) -> Result<(), MountError> {
        let dec = units::arcsec_per_sec_to_rad_per_min(rate);
        if !dec.is_finite() || dec.abs() > units::MAX_AXIS_RATE_RAD_PER_MIN {
            return Err(MountError::InvalidValue {
                what: "declination rate (rad/min)",
                value: dec,
            });
        }
        let current = units::parse_rate_pair(&self.query(Mnemonic::GetAxisRates)?)?;
        let args = format!("{},{}", current.ra, units::format_rate(dec));
        self.blind(Mnemonic::SetAxisRates, &args)
    }

    // Time

    fn utc_offset(&self) -> Result<ChronoDuration, MountError> {
        let raw = self.query(Mnemonic::GetUtcOffset)?;
        let hours = units::parse_rate(&raw)?;
        Ok(ChronoDuration::minutes((hours * 60.0).round() as i64))
    }

    /// Mount clock in UTC
    ///
    /// The mount keeps local time plus an offset; UTC = local + offset.
    pub fn utc_date(&self) -> Result<DateTime<Utc>, MountError> {
        let date = self.query(Mnemonic::GetLocalDate)?;
        let time = self.query(Mnemonic::GetLocalTime)?;
        let offset = self.utc_offset()?;
        let stamp = format!("{} {}", date.trim(), time.trim());
        let local = NaiveDateTime::parse_from_str(&stamp, "%m/%d/%y %H:%M:%S")
            .map_err(|e| ProtocolError::MalformedResponse(format!("{}: {}", stamp, e)))?;
        Ok(Utc.from_utc_datetime(&(local + offset)))
    }

    /// Set the mount clock from a UTC instant
    pub fn set_utc_date(&self, utc: DateTime<Utc>) -> Result<(), MountError> {
        let local = utc.naive_utc() - self.utc_offset()?;
        self.query_with_args(Mnemonic::SetLocalDate, &local.format(" %m/%d/%y").to_string())?;
        self.query_with_args(Mnemonic::SetLocalTime, &local.format(" %H:%M:%S").to_string())?;
        info!(utc = %utc, "mount clock set");
        Ok(())
    }

    fn query_with_args(&self, mnemonic: Mnemonic, args: &str) -> Result<String, MountError> {
        Ok(self.dispatcher.send(mnemonic, args)?)
    }
}
