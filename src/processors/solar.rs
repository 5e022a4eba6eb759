//! Solar position from time and site coordinates.
//!
//! Implements the NOAA solar calculator equations (Meeus-derived, good to a
//! few hundredths of a degree for the current era), optionally followed by the
//! NOAA atmospheric refraction correction.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use thiserror::Error;

/// Julian date of the Unix epoch.
const JD_UNIX_EPOCH: f64 = 2_440_587.5;
/// Julian date of J2000.0.
const JD_J2000: f64 = 2_451_545.0;
const DAYS_PER_JULIAN_CENTURY: f64 = 36_525.0;

/// Errors for invalid solar geometry inputs.
#[derive(Debug, Error, PartialEq)]
pub enum SolarError {
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),
}

/// Sun position for one instant and site. Angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    pub elevation: f64,
    pub zenith: f64,
    /// Clockwise from north
    pub azimuth: f64,
    pub declination: f64,
    /// Equation of time in minutes
    pub equation_of_time: f64,
}

fn validate_site(latitude: f64, longitude: f64) -> Result<(), SolarError> {
    if !latitude.is_finite() || latitude.abs() > 90.0 {
        return Err(SolarError::InvalidLatitude(latitude));
    }
    if !longitude.is_finite() || longitude.abs() > 180.0 {
        return Err(SolarError::InvalidLongitude(longitude));
    }
    Ok(())
}

fn julian_day(utc: &DateTime<Utc>) -> f64 {
    let seconds = utc.timestamp() as f64 + f64::from(utc.timestamp_subsec_nanos()) * 1e-9;
    seconds / 86_400.0 + JD_UNIX_EPOCH
}

/// Refraction correction in degrees for a geometric elevation in degrees.
pub fn refraction_correction(elevation: f64) -> f64 {
    if elevation > 85.0 {
        return 0.0;
    }
    let te = elevation.to_radians().tan();
    let arcsec = if elevation > 5.0 {
        58.1 / te - 0.07 / te.powi(3) + 0.000_086 / te.powi(5)
    } else if elevation > -0.575 {
        1735.0
            + elevation * (-518.2 + elevation * (103.4 + elevation * (-12.79 + elevation * 0.711)))
    } else {
        -20.774 / te
    };
    arcsec / 3600.0
}

/// Compute the sun's position as seen from (`latitude`, `longitude`).
///
/// # Arguments
///
/// * `time` - Instant of observation, any time zone
/// * `latitude` - Degrees, north positive
/// * `longitude` - Degrees, east positive
/// * `refraction` - Apply the atmospheric refraction correction to elevation
///
/// # Errors
///
/// Returns an error if a coordinate is outside its valid range.
pub fn solar_position<Tz: TimeZone>(
    time: &DateTime<Tz>,
    latitude: f64,
    longitude: f64,
    refraction: bool,
) -> Result<SolarPosition, SolarError> {
    validate_site(latitude, longitude)?;

    let utc = time.with_timezone(&Utc);
    let t = (julian_day(&utc) - JD_J2000) / DAYS_PER_JULIAN_CENTURY;

    let mean_long = (280.46646 + t * (36000.76983 + t * 0.0003032)).rem_euclid(360.0);
    let mean_anom = 357.52911 + t * (35999.05029 - 0.0001537 * t);
    let eccentricity = 0.016708634 - t * (0.000042037 + 0.0000001267 * t);

    let m = mean_anom.to_radians();
    let center = m.sin() * (1.914602 - t * (0.004817 + 0.000014 * t))
        + (2.0 * m).sin() * (0.019993 - 0.000101 * t)
        + (3.0 * m).sin() * 0.000289;

    let omega = (125.04 - 1934.136 * t).to_radians();
    let apparent_long = (mean_long + center - 0.00569 - 0.00478 * omega.sin()).to_radians();

    let mean_obliquity =
        23.0 + (26.0 + (21.448 - t * (46.815 + t * (0.00059 - t * 0.001813))) / 60.0) / 60.0;
    let obliquity = (mean_obliquity + 0.00256 * omega.cos()).to_radians();

    let declination = (obliquity.sin() * apparent_long.sin()).asin();

    let y = (obliquity / 2.0).tan().powi(2);
    let l0 = mean_long.to_radians();
    let equation_of_time = 4.0
        * (y * (2.0 * l0).sin() - 2.0 * eccentricity * m.sin()
            + 4.0 * eccentricity * y * m.sin() * (2.0 * l0).cos()
            - 0.5 * y * y * (4.0 * l0).sin()
            - 1.25 * eccentricity * eccentricity * (2.0 * m).sin())
        .to_degrees();

    let minutes_utc = f64::from(utc.hour()) * 60.0
        + f64::from(utc.minute())
        + f64::from(utc.second()) / 60.0
        + f64::from(utc.nanosecond()) / 60e9;
    let true_solar_time = (minutes_utc + equation_of_time + 4.0 * longitude).rem_euclid(1440.0);
    let mut hour_angle = true_solar_time / 4.0 - 180.0;
    if hour_angle < -180.0 {
        hour_angle += 360.0;
    }

    let lat = latitude.to_radians();
    let ha = hour_angle.to_radians();
    let cos_zenith = (lat.sin() * declination.sin() + lat.cos() * declination.cos() * ha.cos())
        .clamp(-1.0, 1.0);
    let zenith_rad = cos_zenith.acos();

    let az_denom = lat.cos() * zenith_rad.sin();
    let azimuth = if az_denom.abs() > 0.001 {
        let cos_az = ((lat.sin() * cos_zenith - declination.sin()) / az_denom).clamp(-1.0, 1.0);
        let az = 180.0 - cos_az.acos().to_degrees();
        let az = if hour_angle > 0.0 { -az } else { az };
        az.rem_euclid(360.0)
    } else if latitude > 0.0 {
        180.0
    } else {
        0.0
    };

    let mut elevation = 90.0 - zenith_rad.to_degrees();
    if refraction {
        elevation += refraction_correction(elevation);
    }

    Ok(SolarPosition {
        elevation,
        zenith: 90.0 - elevation,
        azimuth,
        declination: declination.to_degrees(),
        equation_of_time,
    })
}

/// Solar elevation above the horizon in degrees, refraction included.
pub fn solar_elevation_deg<Tz: TimeZone>(
    time: &DateTime<Tz>,
    latitude: f64,
    longitude: f64,
) -> Result<f64, SolarError> {
    solar_position(time, latitude, longitude, true).map(|p| p.elevation)
}

/// Solar zenith angle (90° minus elevation) in degrees.
pub fn solar_zenith_deg<Tz: TimeZone>(
    time: &DateTime<Tz>,
    latitude: f64,
    longitude: f64,
) -> Result<f64, SolarError> {
    solar_position(time, latitude, longitude, true).map(|p| p.zenith)
}
