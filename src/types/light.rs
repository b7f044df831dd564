// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Light strip values: effect mode and brightness.

use std::fmt;

use crate::error::Error;

/// Effect mode of the L1 light strip.
///
/// The device reports the mode as a number from 1 to 12; the host sees the
/// symbolic name.
///
/// # Examples
///
/// ```
/// use ewelink_bridge::types::LightMode;
///
/// let mode = LightMode::from_code(3).unwrap();
/// assert_eq!(mode.name(), "Colorful Breath");
/// assert_eq!(LightMode::from_name("Sync to music").unwrap().code(), 12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightMode(u8);

impl LightMode {
    /// Mode names in device code order (code = index + 1).
    ///
    /// "RBG Strobe" is spelled the way the vendor app labels it.
    pub const NAMES: [&'static str; 12] = [
        "Colorful",
        "Colorful Gradient",
        "Colorful Breath",
        "DIY Gradient",
        "DIY Pulse",
        "DIY Breath",
        "DIY Strobe",
        "RGB Gradient",
        "RGB Pulse",
        "RGB Breath",
        "RBG Strobe",
        "Sync to music",
    ];

    /// Looks up a mode by its device code.
    #[must_use]
    pub fn from_code(code: u64) -> Option<Self> {
        let code = u8::try_from(code).ok()?;
        (1..=12).contains(&code).then_some(Self(code))
    }

    /// Looks up a mode by its symbolic name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if the name is not one of [`Self::NAMES`].
    pub fn from_name(name: &str) -> Result<Self, Error> {
        Self::NAMES
            .iter()
            .position(|candidate| *candidate == name)
            .and_then(|index| u8::try_from(index + 1).ok())
            .map(Self)
            .ok_or_else(|| Error::InvalidValue(name.to_string()))
    }

    /// Returns the device code (1-12).
    #[must_use]
    pub const fn code(&self) -> u8 {
        self.0
    }

    /// Returns the symbolic name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        Self::NAMES[usize::from(self.0 - 1)]
    }
}

impl fmt::Display for LightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Brightness as the integer percentage the light reports (`bright`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Brightness(u8);

impl Brightness {
    /// Creates a brightness, clamping to 0-100.
    #[must_use]
    pub fn new(percent: u64) -> Self {
        Self(u8::try_from(percent.min(100)).unwrap_or(100))
    }

    /// Converts a host dimming level (0.0-1.0) to a device brightness.
    ///
    /// The light treats 0 as invalid, so a level that rounds to 0 becomes 1.
    #[must_use]
    pub fn from_level(level: f64) -> Self {
        let percent = (level.clamp(0.0, 1.0) * 100.0).round();
        // Clamped to 0..=100 above.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = percent as u8;
        Self(percent.max(1))
    }

    /// Returns the integer percentage.
    #[must_use]
    pub const fn percent(&self) -> u8 {
        self.0
    }

    /// Returns the host dimming level (0.0-1.0).
    #[must_use]
    pub fn level(&self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_table_has_twelve_entries() {
        assert_eq!(LightMode::NAMES.len(), 12);
        for code in 1..=12 {
            let mode = LightMode::from_code(code).unwrap();
            assert_eq!(LightMode::from_name(mode.name()).unwrap(), mode);
        }
    }

    #[test]
    fn mode_codes_out_of_range() {
        assert!(LightMode::from_code(0).is_none());
        assert!(LightMode::from_code(13).is_none());
        assert!(LightMode::from_code(300).is_none());
    }

    #[test]
    fn unknown_mode_name() {
        assert!(matches!(
            LightMode::from_name("Disco"),
            Err(Error::InvalidValue(name)) if name == "Disco"
        ));
    }

    #[test]
    fn brightness_level_conversion() {
        assert!((Brightness::new(50).level() - 0.5).abs() < f64::EPSILON);
        assert_eq!(Brightness::from_level(0.75).percent(), 75);
        assert_eq!(Brightness::from_level(0.0).percent(), 1);
        assert_eq!(Brightness::from_level(0.004).percent(), 1);
        assert_eq!(Brightness::from_level(1.7).percent(), 100);
        assert_eq!(Brightness::new(250).percent(), 100);
    }
}
