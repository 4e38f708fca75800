//! Speed level commands.
//!
//! The printer has no direct "set speed percentage" command; a speed change
//! is expressed as an acceleration magnitude, a feed rate factor, a time
//! estimate ratio and a claimed speed level. The curves below were fitted to
//! the four stock speed presets (50 / 100 / 125 / 166 %).

/// Maps a speed percentage to device command text
pub trait SpeedCommandTranslator: Send + Sync {
    /// Commands that put the printer at `speed_percent`
    fn commands(&self, speed_percent: i32) -> Vec<String>;
}

/// Derived values for one speed percentage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedProfile {
    /// Percentage after normalisation
    pub percent: i32,
    /// Ratio of print time at this speed to print time at 100%
    pub speed_fraction: f64,
    /// Acceleration multiplier
    pub acceleration_magnitude: f64,
    /// Feed rate multiplier
    pub feed_rate: f64,
    /// Speed level claimed to the screen
    pub level: i64,
}

/// Translator for the printer's M204.2 / M220 / M73.2 speed control
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedLevelTranslator {
    min_percent: i32,
    max_percent: i32,
    fallback_percent: i32,
}

impl SpeedLevelTranslator {
    /// Translator accepting 30..=180 %, falling back to 100 %
    pub fn new() -> Self {
        Self::with_limits(30, 180, 100)
    }

    /// Translator with explicit limits
    pub fn with_limits(min_percent: i32, max_percent: i32, fallback_percent: i32) -> Self {
        Self {
            min_percent,
            max_percent,
            fallback_percent,
        }
    }

    /// Out-of-range percentages are replaced by the fallback, not clamped
    pub fn normalize(&self, percent: i32) -> i32 {
        if percent < self.min_percent || percent > self.max_percent {
            tracing::debug!(
                "Speed {}% outside {}..={}, using {}%",
                percent,
                self.min_percent,
                self.max_percent,
                self.fallback_percent
            );
            self.fallback_percent
        } else {
            percent
        }
    }

    /// Compute the command parameters for `percent`
    pub fn profile(&self, percent: i32) -> SpeedProfile {
        let percent = self.normalize(percent);
        let p = f64::from(percent);

        // Floor keeps the printer's own reported percentage identical to ours
        let speed_fraction = (10000.0 / p).floor() / 100.0;
        let acceleration_magnitude = ((speed_fraction - 1.0191) / -0.814).exp();
        let feed_rate = 0.00006426 * p * p - 0.002484 * p + 0.654;
        let level = 1.549 * acceleration_magnitude * acceleration_magnitude
            - 0.7032 * acceleration_magnitude
            + 4.0834;

        SpeedProfile {
            percent,
            speed_fraction,
            acceleration_magnitude,
            feed_rate,
            level: level.round() as i64,
        }
    }

    /// Render the gcode block for `percent`
    pub fn render(&self, percent: i32) -> String {
        let profile = self.profile(percent);
        format!(
            "M204.2 K{:.2}\nM220 K{:.2}\nM73.2 R{}\nM1002 set_gcode_claim_speed_level {}\n",
            profile.acceleration_magnitude,
            profile.feed_rate,
            profile.speed_fraction,
            profile.level
        )
    }
}

impl Default for SpeedLevelTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeedCommandTranslator for SpeedLevelTranslator {
    fn commands(&self, speed_percent: i32) -> Vec<String> {
        vec![self.render(speed_percent)]
    }
}
