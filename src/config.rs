//! Runtime settings for the display engine.
//!
//! The engine holds one immutable [`Settings`] snapshot per frame; the host
//! hands in a replacement through `update_settings` and the engine uses
//! [`Settings::diff`] to decide what to rebuild. Out-of-range values never
//! travel past [`Settings::sanitized`]: they are replaced by the default
//! for that field and logged, mirroring how the values behave when they
//! come from a hand-edited configuration file.

use std::path::PathBuf;

use crate::proto::DiscStyle;

const DEFAULT_WIDTH: i32 = 96;
const DEFAULT_HEIGHT: i32 = 16;
const DEFAULT_CONTRAST: i32 = 200;
const DEFAULT_BIG_FONT_HEIGHT: i32 = 14;
const DEFAULT_SMALL_FONT_HEIGHT: i32 = 7;
const DEFAULT_WAKEUP_MARGIN_MIN: u32 = 5;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// What the display shows after the engine shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnExit {
    /// Leave the last rendered frame on the panel.
    ShowMessage,
    /// Switch the panel to its builtin clock.
    ShowClock,
    /// Turn the backlight off.
    #[default]
    Blank,
    /// Render the next pending timer and leave it standing.
    NextTimer,
    /// Show the clock and arm the hardware wake-up alarm for the next
    /// timer.
    Wakeup,
}

/// When the daily suspend window applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuspendMode {
    /// Display stays on around the clock.
    #[default]
    Never,
    /// Display goes dark inside the window.
    Always,
    /// Display goes dark inside the window only while the user is idle.
    WhenInactive,
}

/// How text is laid out on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// One line, full panel height.
    #[default]
    SingleLine,
    /// Small header line above the scrolled body line.
    DualLine,
    /// Header only, at full height.
    TopicOnly,
}

/// Engine settings snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    // === Panel ===
    /// Display width in pixels.
    pub width: i32,
    /// Display height in pixels.
    pub height: i32,
    /// Contrast in permille.
    pub contrast: i32,
    /// Disc spin rendition.
    pub disc_style: DiscStyle,

    // === Text ===
    /// Font file to rasterize from; `None` disables text rendering.
    pub font: Option<PathBuf>,
    /// Layout of header and body lines.
    pub render_mode: RenderMode,
    /// Pixel height of the body (and single-line) font.
    pub big_font_height: i32,
    /// Pixel height of the header font in dual-line mode.
    pub small_font_height: i32,

    // === Lifecycle ===
    /// What to leave on the panel on close.
    pub on_exit: OnExit,
    /// Minutes before the next timer the wake-up alarm fires.
    pub wakeup_margin_min: u32,

    // === Suspend window ===
    /// Whether and when the daily dark window applies.
    pub suspend_mode: SuspendMode,
    /// Start of the daily dark window, minutes after midnight.
    pub suspend_begin_min: u32,
    /// End of the daily dark window, minutes after midnight.
    pub suspend_end_min: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            contrast: DEFAULT_CONTRAST,
            disc_style: DiscStyle::Slim,
            font: None,
            render_mode: RenderMode::SingleLine,
            big_font_height: DEFAULT_BIG_FONT_HEIGHT,
            small_font_height: DEFAULT_SMALL_FONT_HEIGHT,
            on_exit: OnExit::Blank,
            wakeup_margin_min: DEFAULT_WAKEUP_MARGIN_MIN,
            suspend_mode: SuspendMode::Never,
            suspend_begin_min: 0,
            suspend_end_min: 0,
        }
    }
}

impl Settings {
    /// Replace out-of-range values with their defaults, logging each
    /// substitution.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        if !(0..=320).contains(&self.width) {
            tracing::warn!(
                width = self.width,
                default = DEFAULT_WIDTH,
                "width must be between 0 and 320, using default"
            );
            self.width = DEFAULT_WIDTH;
        }
        if !(0..=240).contains(&self.height) {
            tracing::warn!(
                height = self.height,
                default = DEFAULT_HEIGHT,
                "height must be between 0 and 240, using default"
            );
            self.height = DEFAULT_HEIGHT;
        }
        if !(0..=1000).contains(&self.contrast) {
            tracing::warn!(
                contrast = self.contrast,
                default = DEFAULT_CONTRAST,
                "contrast must be between 0 and 1000, using default"
            );
            self.contrast = DEFAULT_CONTRAST;
        }
        if !(0..=240).contains(&self.big_font_height) {
            tracing::warn!(
                height = self.big_font_height,
                default = DEFAULT_BIG_FONT_HEIGHT,
                "big font height must be between 0 and 240, using default"
            );
            self.big_font_height = DEFAULT_BIG_FONT_HEIGHT;
        }
        if !(0..=240).contains(&self.small_font_height) {
            tracing::warn!(
                height = self.small_font_height,
                default = DEFAULT_SMALL_FONT_HEIGHT,
                "small font height must be between 0 and 240, using default"
            );
            self.small_font_height = DEFAULT_SMALL_FONT_HEIGHT;
        }
        if self.wakeup_margin_min > MINUTES_PER_DAY {
            tracing::warn!(
                minutes = self.wakeup_margin_min,
                default = DEFAULT_WAKEUP_MARGIN_MIN,
                "wake-up margin must be within one day, using default"
            );
            self.wakeup_margin_min = DEFAULT_WAKEUP_MARGIN_MIN;
        }
        if self.suspend_begin_min >= MINUTES_PER_DAY {
            tracing::warn!(
                minutes = self.suspend_begin_min,
                "suspend start is not a clock time, using midnight"
            );
            self.suspend_begin_min = 0;
        }
        if self.suspend_end_min >= MINUTES_PER_DAY {
            tracing::warn!(
                minutes = self.suspend_end_min,
                "suspend end is not a clock time, using midnight"
            );
            self.suspend_end_min = 0;
        }
        self
    }

    /// Compare with another snapshot and list what changed.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<SettingsChange> {
        let mut changes = Vec::new();

        if self.width != other.width || self.height != other.height {
            changes.push(SettingsChange::Geometry);
        }
        if self.contrast != other.contrast {
            changes.push(SettingsChange::Contrast);
        }
        if self.disc_style != other.disc_style {
            changes.push(SettingsChange::DiscStyle);
        }
        if self.font != other.font
            || self.big_font_height != other.big_font_height
            || self.small_font_height != other.small_font_height
        {
            changes.push(SettingsChange::Font);
        }
        if self.render_mode != other.render_mode {
            changes.push(SettingsChange::RenderMode);
        }
        if self.on_exit != other.on_exit || self.wakeup_margin_min != other.wakeup_margin_min {
            changes.push(SettingsChange::Exit);
        }
        if self.suspend_mode != other.suspend_mode
            || self.suspend_begin_min != other.suspend_begin_min
            || self.suspend_end_min != other.suspend_end_min
        {
            changes.push(SettingsChange::Suspend);
        }

        changes
    }
}

/// Categories of settings changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsChange {
    /// Panel dimensions changed (takes effect on reopen).
    Geometry,
    /// Contrast level changed.
    Contrast,
    /// Disc spin rendition changed.
    DiscStyle,
    /// Font file or a font size changed; faces are rebuilt.
    Font,
    /// Line layout changed.
    RenderMode,
    /// Exit behavior or wake-up margin changed.
    Exit,
    /// Suspend window changed.
    Suspend,
}
