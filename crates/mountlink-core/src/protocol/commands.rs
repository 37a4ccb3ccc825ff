//! Protocol commands
//!
//! Defines the fixed command set of the mount firmware. Each mnemonic carries
//! its response kind, its cache lifetime (for polled queries) and the cached
//! queries it makes obsolete (for state-changing writes).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the mount answers a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Awaits a terminated response
    Query,
    /// Fire-and-forget, no response is read
    Blind,
    /// Terminated response meaning success ("1"/"Ok") or failure
    BoolQuery,
}

/// Mount command mnemonics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mnemonic {
    /// Altitude ('GA')
    GetAltitude,
    /// Azimuth ('GZ')
    GetAzimuth,
    /// Right ascension ('GR')
    GetRightAscension,
    /// Declination ('GD')
    GetDeclination,
    /// Local sidereal time ('GS')
    GetSiderealTime,
    /// Slew in progress ('YGi')
    IsSlewing,
    /// Parked ('YGk')
    IsParked,
    /// Park in progress ('YGj')
    IsParking,
    /// RA/Dec axis rates in rad/min ('YGZ')
    GetAxisRates,
    /// Site latitude ('Gt')
    GetLatitude,
    /// Site longitude, positive west ('Gg')
    GetLongitude,
    /// Target declination ('Gd')
    GetTargetDeclination,
    /// Target right ascension ('Gr')
    GetTargetRightAscension,
    /// Tracking rate and state ('YGS')
    GetTracking,
    /// Pointing state, normal or flipped ('YGW')
    GetPointingState,
    /// Mount type ('YGM')
    GetMountType,
    /// Firmware version banner ('YV')
    GetVersion,
    /// Local calendar date ('GC')
    GetLocalDate,
    /// Local time ('GL')
    GetLocalTime,
    /// UTC offset in hours ('GG')
    GetUtcOffset,
    /// Set local calendar date ('SC')
    SetLocalDate,
    /// Set local time ('SL')
    SetLocalTime,
    /// Set site latitude ('St')
    SetLatitude,
    /// Set site longitude ('Sg')
    SetLongitude,
    /// Set target declination ('Sd')
    SetTargetDeclination,
    /// Set target right ascension ('Sr')
    SetTargetRightAscension,
    /// Set tracking rate, legacy form ('YSS')
    SetTracking,
    /// Set RA/Dec axis rates ('YSZ')
    SetAxisRates,
    /// Sync to target ('CM')
    SyncToTarget,
    /// Slew to target ('MS')
    SlewToTarget,
    /// Halt all motion ('Q')
    Halt,
    /// Park ('YH')
    Park,
    /// Unpark ('YL')
    Unpark,
    /// Select guide rate for manual moves ('RG')
    SetGuideRate,
    /// Start a manual move in a direction ('M')
    Move,
    /// Timed guide pulse ('Mg')
    PulseGuide,
}

impl Mnemonic {
    /// Every mnemonic in the command set
    pub const ALL: [Mnemonic; 36] = [
        Mnemonic::GetAltitude,
        Mnemonic::GetAzimuth,
        Mnemonic::GetRightAscension,
        Mnemonic::GetDeclination,
        Mnemonic::GetSiderealTime,
        Mnemonic::IsSlewing,
        Mnemonic::IsParked,
        Mnemonic::IsParking,
        Mnemonic::GetAxisRates,
        Mnemonic::GetLatitude,
        Mnemonic::GetLongitude,
        Mnemonic::GetTargetDeclination,
        Mnemonic::GetTargetRightAscension,
        Mnemonic::GetTracking,
        Mnemonic::GetPointingState,
        Mnemonic::GetMountType,
        Mnemonic::GetVersion,
        Mnemonic::GetLocalDate,
        Mnemonic::GetLocalTime,
        Mnemonic::GetUtcOffset,
        Mnemonic::SetLocalDate,
        Mnemonic::SetLocalTime,
        Mnemonic::SetLatitude,
        Mnemonic::SetLongitude,
        Mnemonic::SetTargetDeclination,
        Mnemonic::SetTargetRightAscension,
        Mnemonic::SetTracking,
        Mnemonic::SetAxisRates,
        Mnemonic::SyncToTarget,
        Mnemonic::SlewToTarget,
        Mnemonic::Halt,
        Mnemonic::Park,
        Mnemonic::Unpark,
        Mnemonic::SetGuideRate,
        Mnemonic::Move,
        Mnemonic::PulseGuide,
    ];

    /// Get the protocol code sent between prefix and terminator
    pub fn code(&self) -> &'static str {
        match self {
            Mnemonic::GetAltitude => "GA",
            Mnemonic::GetAzimuth => "GZ",
            Mnemonic::GetRightAscension => "GR",
            Mnemonic::GetDeclination => "GD",
            Mnemonic::GetSiderealTime => "GS",
            Mnemonic::IsSlewing => "YGi",
            Mnemonic::IsParked => "YGk",
            Mnemonic::IsParking => "YGj",
            Mnemonic::GetAxisRates => "YGZ",
            Mnemonic::GetLatitude => "Gt",
            Mnemonic::GetLongitude => "Gg",
            Mnemonic::GetTargetDeclination => "Gd",
            Mnemonic::GetTargetRightAscension => "Gr",
            Mnemonic::GetTracking => "YGS",
            Mnemonic::GetPointingState => "YGW",
            Mnemonic::GetMountType => "YGM",
            Mnemonic::GetVersion => "YV",
            Mnemonic::GetLocalDate => "GC",
            Mnemonic::GetLocalTime => "GL",
            Mnemonic::GetUtcOffset => "GG",
            Mnemonic::SetLocalDate => "SC",
            Mnemonic::SetLocalTime => "SL",
            Mnemonic::SetLatitude => "St",
            Mnemonic::SetLongitude => "Sg",
            Mnemonic::SetTargetDeclination => "Sd",
            Mnemonic::SetTargetRightAscension => "Sr",
            Mnemonic::SetTracking => "YSS",
            Mnemonic::SetAxisRates => "YSZ",
            Mnemonic::SyncToTarget => "CM",
            Mnemonic::SlewToTarget => "MS",
            Mnemonic::Halt => "Q",
            Mnemonic::Park => "YH",
            Mnemonic::Unpark => "YL",
            Mnemonic::SetGuideRate => "RG",
            Mnemonic::Move => "M",
            Mnemonic::PulseGuide => "Mg",
        }
    }

    /// Get how the mount answers this command
    pub fn kind(&self) -> CommandKind {
        match self {
            Mnemonic::IsSlewing
            | Mnemonic::IsParked
            | Mnemonic::IsParking
            | Mnemonic::SetTargetDeclination
            | Mnemonic::SetTargetRightAscension
            | Mnemonic::Park => CommandKind::BoolQuery,
            Mnemonic::SetLatitude
            | Mnemonic::SetLongitude
            | Mnemonic::SetTracking
            | Mnemonic::SetAxisRates
            | Mnemonic::Halt
            | Mnemonic::Unpark
            | Mnemonic::SetGuideRate
            | Mnemonic::Move
            | Mnemonic::PulseGuide => CommandKind::Blind,
            _ => CommandKind::Query,
        }
    }

    /// Get the cache lifetime of this query's response, if it is cached at all
    ///
    /// Pointing data changes continuously, motion flags change on operator
    /// action, site coordinates almost never.
    pub fn cache_ttl(&self) -> Option<Duration> {
        let ms = match self {
            Mnemonic::GetAltitude
            | Mnemonic::GetAzimuth
            | Mnemonic::GetRightAscension
            | Mnemonic::GetDeclination
            | Mnemonic::GetSiderealTime => 3_000,
            Mnemonic::IsSlewing
            | Mnemonic::IsParked
            | Mnemonic::GetAxisRates
            | Mnemonic::GetTargetDeclination
            | Mnemonic::GetTargetRightAscension
            | Mnemonic::GetTracking
            | Mnemonic::GetPointingState => 10_000,
            Mnemonic::GetLatitude | Mnemonic::GetLongitude => 60_000,
            _ => return None,
        };
        Some(Duration::from_millis(ms))
    }

    /// Get the cached queries whose answers this command changes
    pub fn invalidates(&self) -> &'static [Mnemonic] {
        match self {
            Mnemonic::SyncToTarget => &[Mnemonic::GetRightAscension, Mnemonic::GetDeclination],
            Mnemonic::SlewToTarget | Mnemonic::Halt => &[Mnemonic::IsSlewing],
            Mnemonic::Park | Mnemonic::Unpark => &[Mnemonic::IsParked],
            Mnemonic::SetLatitude => &[Mnemonic::GetLatitude],
            Mnemonic::SetLongitude => &[Mnemonic::GetLongitude],
            Mnemonic::SetTargetDeclination => &[Mnemonic::GetTargetDeclination],
            Mnemonic::SetTargetRightAscension => &[Mnemonic::GetTargetRightAscension],
            Mnemonic::SetTracking => &[Mnemonic::GetTracking],
            Mnemonic::SetAxisRates => &[Mnemonic::GetAxisRates],
            _ => &[],
        }
    }

    /// Firmware needs a pause after this command before the link is usable again
    pub fn needs_settle_delay(&self) -> bool {
        matches!(self, Mnemonic::SetTracking)
    }
}

/// Direction for manual moves and guide pulses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuideDirection {
    /// 'n'
    North,
    /// 's'
    South,
    /// 'e'
    East,
    /// 'w'
    West,
}

impl GuideDirection {
    /// Direction letter used by 'M' and 'Mg'
    pub fn letter(&self) -> char {
        match self {
            GuideDirection::North => 'n',
            GuideDirection::South => 's',
            GuideDirection::East => 'e',
            GuideDirection::West => 'w',
        }
    }
}
