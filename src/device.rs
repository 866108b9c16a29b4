//! The panel driver: transport, command layer and framebuffer flush.
//!
//! [`Lcd`] owns the framebuffer, the panel's last known contents, the two
//! sized faces and the disc animation phase. Every byte leaves through a
//! [`Transport`], which production backs with the raw character device and
//! tests back with a recorder.

use std::io::{self, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};

use crate::bitmap::Bitmap;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::font::{DrawOutcome, Font};
use crate::proto::{
    self, packet, pixel_packet, CommandSet, DiscStyle, Icons, Protocol, CMD_INIT,
    CMD_LOW_CONTRAST, CMD_SET_ICONS, CMD_SET_LINES0, CMD_SET_LINES1, CMD_SET_LINES2, PACKET_LEN,
    PIXEL_REG_FIRST, PIXEL_REG_LAST,
};

/// Pause after every packet; the firmware drops packets that arrive back
/// to back.
const WRITE_PACING: Duration = Duration::from_millis(2);

/// Byte sink for the eight-byte packets the panel accepts.
pub trait Transport: Send {
    /// Push one packet at the device, returning how many bytes went out.
    fn send(&mut self, packet: &[u8; PACKET_LEN]) -> io::Result<usize>;
}

/// [`Transport`] over the raw `/dev/lcdN` character device.
#[derive(Debug)]
pub struct DevFile {
    file: std::fs::File,
}

impl DevFile {
    /// Open the device node write-only.
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| Error::DeviceOpen {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self { file })
    }
}

impl Transport for DevFile {
    fn send(&mut self, packet: &[u8; PACKET_LEN]) -> io::Result<usize> {
        self.file.write(packet)
    }
}

/// Which of the two sized faces to draw with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSize {
    /// Body face; the only face used in single-line layouts.
    Big,
    /// Header face for dual-line layouts.
    Small,
}

/// What [`Lcd::flush`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Framebuffer matched the panel contents, nothing was sent.
    Unchanged,
    /// Pixel packets went out and the panel copy was updated.
    Flushed,
}

/// Driver for one iMON-style monochrome panel.
pub struct Lcd {
    transport: Option<Box<dyn Transport>>,
    cmd: CommandSet,
    framebuf: Bitmap,
    backingstore: Bitmap,
    big_font: Option<Font>,
    small_font: Option<Font>,
    spin_phase: u8,
    disc_style: DiscStyle,
}

impl Lcd {
    /// Open the character device and run the panel bring-up sequence.
    ///
    /// Only a missing device is fatal. A font that fails to load and init
    /// packets that fail to write are logged and the panel is used as-is.
    pub fn open(path: &Path, protocol: Protocol, settings: &Settings) -> Result<Self> {
        let dev = DevFile::open(path)?;
        tracing::info!(
            path = %path.display(),
            protocol = protocol.id(),
            "display device opened"
        );
        Ok(Self::with_transport(Box::new(dev), protocol, settings))
    }

    /// Drive an already-open transport. Used by tests and custom sinks.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        protocol: Protocol,
        settings: &Settings,
    ) -> Self {
        let mut backingstore = Bitmap::new(settings.width, settings.height);
        // Guarantees the first flush is a full refresh.
        backingstore.invalidate();

        let mut lcd = Self {
            transport: Some(transport),
            cmd: CommandSet::new(protocol),
            framebuf: Bitmap::new(settings.width, settings.height),
            backingstore,
            big_font: None,
            small_font: None,
            spin_phase: 0,
            disc_style: settings.disc_style,
        };

        if let Some(path) = &settings.font {
            if let Err(err) =
                lcd.set_font(path, settings.big_font_height, settings.small_font_height)
            {
                tracing::warn!(error = %err, "font unavailable, text rendering disabled");
            }
        }

        lcd.init(settings.contrast);
        lcd
    }

    /// Wake the panel and reset icons, lines and contrast.
    ///
    /// Runs at open and again on every resume edge of the suspend window.
    pub(crate) fn init(&mut self, contrast: i32) {
        self.send_cmd(self.cmd.alarm);
        self.send_cmd(self.cmd.display_on);
        self.send_cmd(CMD_INIT);
        self.send_cmd(CMD_SET_ICONS);
        self.send_cmd(CMD_SET_LINES0);
        self.send_cmd(CMD_SET_LINES1);
        self.send_cmd(CMD_SET_LINES2);
        self.contrast(contrast);
        tracing::debug!("display initialized");
    }

    /// Display width in pixels.
    pub fn width(&self) -> i32 {
        self.framebuf.width()
    }

    /// Display height in pixels.
    pub fn height(&self) -> i32 {
        self.framebuf.height()
    }

    /// Whether the transport is still attached.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Serialize and push one command word. Failures are logged.
    fn send_cmd(&mut self, cmd: u64) -> bool {
        self.send_raw(&packet(cmd))
    }

    fn send_raw(&mut self, buf: &[u8; PACKET_LEN]) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            tracing::debug!("dropping packet, display is closed");
            return false;
        };
        let res = transport.send(buf);
        thread::sleep(WRITE_PACING);
        match res {
            Ok(n) if n > 0 => true,
            Ok(_) => {
                tracing::error!("device write came back empty");
                false
            }
            Err(err) => {
                tracing::error!(error = %err, "device write failed");
                false
            }
        }
    }

    /// Like [`Self::send_cmd`] but for sequences whose failure the caller
    /// must see, such as the close-time shutdown and clock commands.
    fn send_checked(&mut self, cmd: u64, stage: &'static str) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(Error::NotOpen)?;
        let res = transport.send(&packet(cmd));
        thread::sleep(WRITE_PACING);
        match res {
            Ok(n) if n > 0 => Ok(()),
            Ok(_) => Err(Error::DeviceWrite {
                stage,
                source: io::Error::from(io::ErrorKind::WriteZero),
            }),
            Err(source) => Err(Error::DeviceWrite { stage, source }),
        }
    }

    /// Push the framebuffer to the panel.
    ///
    /// Packets go out only when the framebuffer differs from the panel's
    /// last known contents. The panel copy is updated even when writes
    /// fail so a wedged device does not trigger a full refresh on every
    /// tick; the next actual change resends everything anyway.
    pub fn flush(&mut self) -> FlushOutcome {
        if self.backingstore == self.framebuf {
            return FlushOutcome::Unchanged;
        }

        for reg in PIXEL_REG_FIRST..=PIXEL_REG_LAST {
            let buf = pixel_packet(self.framebuf.data(), reg);
            self.send_raw(&buf);
        }

        self.backingstore.copy_from(&self.framebuf);
        FlushOutcome::Flushed
    }

    /// Clear the framebuffer. Nothing reaches the panel until [`Self::flush`].
    pub fn clear(&mut self) {
        self.framebuf.clear();
    }

    /// Forget the panel's last known contents so the next flush resends
    /// the whole frame. Needed after the panel lost its display RAM.
    pub(crate) fn invalidate(&mut self) {
        self.backingstore.invalidate();
    }

    pub(crate) fn set_disc_style(&mut self, style: DiscStyle) {
        self.disc_style = style;
    }

    /// Send the icon word for `state`, advancing the disc animation phase.
    pub fn icons(&mut self, state: Icons) -> bool {
        let (word, next) = proto::icon_word(state, self.spin_phase, self.disc_style);
        self.spin_phase = next;
        self.send_cmd(CMD_SET_ICONS | word)
    }

    /// Set panel contrast, clamping to the 0..=1000 permille range.
    pub fn contrast(&mut self, permille: i32) -> bool {
        let level = permille.clamp(0, 1000);
        self.send_cmd(CMD_LOW_CONTRAST + (level / 25) as u64)
    }

    /// Set the lengths of the builtin text underlines and progress bars.
    ///
    /// Lengths run 0..=32 pixels; negative lengths fill from the right.
    pub fn progress_bars(
        &mut self,
        top_line: i32,
        bot_line: i32,
        top_progress: i32,
        bot_progress: i32,
    ) -> bool {
        let words = proto::progress_words(
            proto::length_to_pixmap(top_line),
            proto::length_to_pixmap(bot_line),
            proto::length_to_pixmap(top_progress),
            proto::length_to_pixmap(bot_progress),
        );
        let mut ok = true;
        for word in words {
            ok &= self.send_cmd(word);
        }
        ok
    }

    /// Power the panel down (backlight off on most units) and drop any
    /// armed wake-up.
    pub fn send_shutdown(&mut self) -> Result<()> {
        self.send_checked(self.cmd.shutdown, "shutdown")?;
        self.send_checked(self.cmd.alarm, "shutdown")
    }

    /// Hand the panel over to the firmware clock, optionally arming the
    /// hardware wake-up at `wake`.
    ///
    /// The panel keeps counting on its own once the current time is
    /// latched, so the clock stays correct after the host exits.
    pub fn send_clock(&mut self, wake: Option<NaiveDateTime>) -> Result<()> {
        let now = Local::now().naive_local();
        self.send_checked(proto::clock_word(self.cmd.display, now), "clock")?;
        match wake {
            Some(at) => self.send_checked(proto::clock_word(self.cmd.alarm, at), "clock"),
            None => self.send_checked(self.cmd.alarm, "clock"),
        }
    }

    /// Load the face at `path` in both configured pixel sizes.
    ///
    /// On failure the previously loaded faces stay in place.
    pub fn set_font(&mut self, path: &Path, big_px: i32, small_px: i32) -> Result<()> {
        let big = Font::load(path, big_px.max(1) as u32)?;
        let small = Font::load(path, small_px.max(1) as u32)?;
        self.big_font = Some(big);
        self.small_font = Some(small);
        Ok(())
    }

    /// Drop both faces; text rendering reports no font afterwards.
    pub(crate) fn clear_fonts(&mut self) {
        self.big_font = None;
        self.small_font = None;
    }

    /// Line height of the chosen face, 0 when no usable face is loaded.
    pub fn font_height(&self, size: FontSize) -> i32 {
        let font = match size {
            FontSize::Big => self.big_font.as_ref(),
            FontSize::Small => self.small_font.as_ref(),
        };
        font.map_or(0, Font::height)
    }

    /// Draw `text` into the framebuffer with the chosen face.
    pub fn draw_text(&mut self, size: FontSize, x: i32, y: i32, text: &str) -> DrawOutcome {
        let font = match size {
            FontSize::Big => self.big_font.as_mut(),
            FontSize::Small => self.small_font.as_mut(),
        };
        match font {
            Some(font) => font.draw_text(&mut self.framebuf, x, y, text, 0),
            None => DrawOutcome::NoFont,
        }
    }

    /// Drop the transport. Checked sends fail with [`Error::NotOpen`]
    /// afterwards; unchecked ones are logged and dropped.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            tracing::info!("display device closed");
        }
    }
}

impl std::fmt::Debug for Lcd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lcd")
            .field("open", &self.is_open())
            .field("width", &self.framebuf.width())
            .field("height", &self.framebuf.height())
            .field("spin_phase", &self.spin_phase)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every packet instead of writing anywhere.
    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<[u8; PACKET_LEN]>>>,
        fail: bool,
    }

    impl Recorder {
        fn new() -> Self {
            Self::default()
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn packets(&self) -> Vec<[u8; PACKET_LEN]> {
            self.sent.lock().clone()
        }
    }

    impl Transport for Recorder {
        fn send(&mut self, packet: &[u8; PACKET_LEN]) -> io::Result<usize> {
            if self.fail {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.sent.lock().push(*packet);
            Ok(packet.len())
        }
    }

    fn open_recorded() -> (Lcd, Recorder) {
        let rec = Recorder::new();
        let lcd = Lcd::with_transport(Box::new(rec.clone()), Protocol::Ffdc, &Settings::default());
        (lcd, rec)
    }

    #[test]
    fn init_sequence_wakes_the_panel() {
        let (_lcd, rec) = open_recorded();
        let sent = rec.packets();
        assert_eq!(sent.len(), 8);
        assert_eq!(sent[0], packet(0x5100000000000000)); // clear pending alarm
        assert_eq!(sent[1], packet(0x5000000000000040)); // display on
        assert_eq!(sent[2], packet(CMD_INIT));
        assert_eq!(sent[3], packet(CMD_SET_ICONS));
        assert_eq!(sent[4], packet(CMD_SET_LINES0));
        assert_eq!(sent[5], packet(CMD_SET_LINES1));
        assert_eq!(sent[6], packet(CMD_SET_LINES2));
        // Default contrast 200 permille maps to level 8.
        assert_eq!(sent[7], packet(CMD_LOW_CONTRAST + 8));
    }

    #[test]
    fn flush_streams_every_register_once() {
        let (mut lcd, rec) = open_recorded();
        let before = rec.packets().len();

        lcd.framebuf.set_pixel(3, 5);
        assert_eq!(lcd.flush(), FlushOutcome::Flushed);

        let sent = rec.packets();
        assert_eq!(sent.len() - before, 28);
        let regs: Vec<u8> = sent[before..].iter().map(|p| p[7]).collect();
        let expected: Vec<u8> = (PIXEL_REG_FIRST..=PIXEL_REG_LAST).collect();
        assert_eq!(regs, expected);

        // Same frame again goes nowhere.
        assert_eq!(lcd.flush(), FlushOutcome::Unchanged);
        assert_eq!(rec.packets().len(), sent.len());
    }

    #[test]
    fn flush_failure_still_updates_panel_copy() {
        let rec = Recorder::failing();
        let mut lcd =
            Lcd::with_transport(Box::new(rec), Protocol::Ffdc, &Settings::default());

        lcd.framebuf.set_pixel(3, 5);
        assert_eq!(lcd.flush(), FlushOutcome::Flushed);
        assert_eq!(lcd.flush(), FlushOutcome::Unchanged);
    }

    #[test]
    fn contrast_is_clamped_to_the_panel_range() {
        let (mut lcd, rec) = open_recorded();

        assert!(lcd.contrast(5000));
        let over = *rec.packets().last().unwrap();
        assert!(lcd.contrast(1000));
        let max = *rec.packets().last().unwrap();
        assert_eq!(over, max);

        // Level 40 lands in the low payload byte.
        assert_eq!(max[0], 0x28);
        assert_eq!(max[7], 0x03);
    }

    #[test]
    fn icons_take_the_icon_opcode() {
        let (mut lcd, rec) = open_recorded();
        assert!(lcd.icons(Icons::TOP_TV | Icons::VOLUME));
        let last = *rec.packets().last().unwrap();
        assert_eq!(last[7], 0x01);
        assert_ne!(&last[..7], &[0u8; 7]);
    }

    #[test]
    fn progress_bars_use_the_three_line_opcodes() {
        let (mut lcd, rec) = open_recorded();
        let before = rec.packets().len();
        assert!(lcd.progress_bars(4, 8, 16, 32));
        let sent = rec.packets();
        assert_eq!(sent.len() - before, 3);
        assert_eq!(sent[before][7], 0x10);
        assert_eq!(sent[before + 1][7], 0x11);
        assert_eq!(sent[before + 2][7], 0x12);
    }

    #[test]
    fn clock_packets_set_display_then_alarm() {
        let (mut lcd, rec) = open_recorded();

        let before = rec.packets().len();
        lcd.send_clock(None).unwrap();
        let sent = rec.packets();
        assert_eq!(sent.len() - before, 2);
        // Display base with the time-valid flag in the low byte.
        assert_eq!(sent[before][7], 0x50);
        assert_eq!(sent[before][0], 0x80);
        // Bare alarm word clears any pending wake-up.
        assert_eq!(sent[before + 1], packet(0x5100000000000000));

        let wake = chrono::NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(6, 30, 0)
            .unwrap();
        let before = rec.packets().len();
        lcd.send_clock(Some(wake)).unwrap();
        let sent = rec.packets();
        // The second packet now carries the wake-up time on the alarm base.
        assert_eq!(sent[before + 1][7], 0x51);
        assert_eq!(sent[before + 1][0], 0x80);
        assert_eq!(sent[before + 1][4], 6); // hour
        assert_eq!(sent[before + 1][5], 30); // minute
    }

    #[test]
    fn shutdown_blacks_out_and_clears_the_wakeup() {
        let (mut lcd, rec) = open_recorded();
        let before = rec.packets().len();
        lcd.send_shutdown().unwrap();
        let sent = rec.packets();
        assert_eq!(sent.len() - before, 2);
        assert_eq!(sent[before], packet(0x5000000000000008));
        assert_eq!(sent[before + 1], packet(0x5100000000000000));
    }

    #[test]
    fn closed_display_rejects_checked_commands() {
        let (mut lcd, rec) = open_recorded();
        lcd.close();
        assert!(!lcd.is_open());

        let before = rec.packets().len();
        assert!(matches!(lcd.send_shutdown(), Err(Error::NotOpen)));
        assert!(!lcd.icons(Icons::TOP_TV));
        assert_eq!(rec.packets().len(), before);
    }

    #[test]
    fn missing_font_reports_no_font() {
        let (mut lcd, _rec) = open_recorded();
        assert_eq!(lcd.font_height(FontSize::Big), 0);
        assert_eq!(
            lcd.draw_text(FontSize::Big, 0, 0, "no face loaded"),
            DrawOutcome::NoFont
        );
    }

    #[test]
    fn bad_font_path_keeps_previous_faces() {
        let (mut lcd, _rec) = open_recorded();
        let err = lcd
            .set_font(Path::new("/nonexistent/face.ttf"), 14, 7)
            .unwrap_err();
        assert!(matches!(err, Error::FontLoad { .. }));
        assert_eq!(lcd.font_height(FontSize::Small), 0);
    }
}
