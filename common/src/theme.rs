use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Light,
    Dark,
}

impl ThemeMode {
    pub fn from_dark(is_dark: bool) -> Self {
        if is_dark {
            ThemeMode::Dark
        } else {
            ThemeMode::Light
        }
    }

    pub fn is_dark(self) -> bool {
        self == ThemeMode::Dark
    }

    /// Value stored in the personalization flags: 1 = light, 0 = dark.
    pub fn flag_value(self) -> u32 {
        match self {
            ThemeMode::Light => 1,
            ThemeMode::Dark => 0,
        }
    }

    pub fn from_flag_value(value: u32) -> Self {
        Self::from_dark(value == 0)
    }
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThemeMode::Light => write!(f, "light"),
            ThemeMode::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for ThemeMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            _ => Err(anyhow!("Unknown theme mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !latitude.is_finite() {
            return Err(anyhow!("Latitude out of range: {}", latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) || !longitude.is_finite() {
            return Err(anyhow!("Longitude out of range: {}", longitude));
        }
        Ok(Self { latitude, longitude })
    }
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Latitude {:.4}, Longitude {:.4}", self.latitude, self.longitude)
    }
}

/// Sunrise and sunset for one day, in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolarWindow {
    pub sunrise: DateTime<Local>,
    pub sunset: DateTime<Local>,
}

impl SolarWindow {
    /// Dark strictly before sunrise or strictly after sunset. The boundary
    /// instants themselves count as daylight.
    pub fn is_dark_at(&self, now: DateTime<Local>) -> bool {
        now < self.sunrise || now > self.sunset
    }

    pub fn mode_at(&self, now: DateTime<Local>) -> ThemeMode {
        ThemeMode::from_dark(self.is_dark_at(now))
    }

    /// The next boundary inside this window, if any remains today.
    pub fn next_change_after(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        if now < self.sunrise {
            Some(self.sunrise)
        } else if now <= self.sunset {
            Some(self.sunset)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn window() -> SolarWindow {
        SolarWindow {
            sunrise: Local.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
            sunset: Local.with_ymd_and_hms(2024, 6, 1, 20, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_daylight_is_light() {
        let w = window();
        let noon = Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(!w.is_dark_at(noon));
        assert!(!w.is_dark_at(w.sunrise + Duration::seconds(1)));
        assert!(!w.is_dark_at(w.sunset - Duration::seconds(1)));
        assert_eq!(w.mode_at(noon), ThemeMode::Light);
    }

    #[test]
    fn test_outside_window_is_dark() {
        let w = window();
        assert!(w.is_dark_at(w.sunrise - Duration::minutes(1)));
        assert!(w.is_dark_at(w.sunset + Duration::seconds(1)));
        // Past midnight, evaluated against yesterday's window
        assert!(w.is_dark_at(w.sunset + Duration::hours(5)));
    }

    #[test]
    fn test_boundaries_are_light() {
        let w = window();
        assert!(!w.is_dark_at(w.sunrise));
        assert!(!w.is_dark_at(w.sunset));
    }

    #[test]
    fn test_next_change() {
        let w = window();
        let early = w.sunrise - Duration::hours(1);
        assert_eq!(w.next_change_after(early), Some(w.sunrise));
        assert_eq!(w.next_change_after(w.sunrise), Some(w.sunset));
        assert_eq!(w.next_change_after(w.sunset + Duration::minutes(1)), None);
    }

    #[test]
    fn test_flag_values() {
        assert_eq!(ThemeMode::Light.flag_value(), 1);
        assert_eq!(ThemeMode::Dark.flag_value(), 0);
        assert_eq!(ThemeMode::from_flag_value(0), ThemeMode::Dark);
        assert_eq!(ThemeMode::from_flag_value(1), ThemeMode::Light);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("Dark".parse::<ThemeMode>().unwrap(), ThemeMode::Dark);
        assert_eq!("light".parse::<ThemeMode>().unwrap(), ThemeMode::Light);
        assert!("dusk".parse::<ThemeMode>().is_err());
    }

    #[test]
    fn test_coordinate_range() {
        assert!(GeoCoordinate::new(52.52, 13.40).is_ok());
        assert!(GeoCoordinate::new(91.0, 0.0).is_err());
        assert!(GeoCoordinate::new(0.0, -181.0).is_err());
        assert!(GeoCoordinate::new(f64::NAN, 0.0).is_err());
    }
}
