//! Command words and wire encoding for the iMON LCD protocol.
//!
//! Every interaction with the device is a fixed 64-bit command word written
//! as one 8-byte little-endian packet. Pixel data rides on memory-register
//! writes `0x20..=0x3b`, seven payload bytes per packet. Two USB device
//! families exist and differ only in the opcode byte of the display and
//! alarm words.

use bitflags::bitflags;
use chrono::{Datelike, NaiveDateTime, Timelike};

/// Protocol variant, named after the USB product id of the device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// 15c2:ffdc devices
    #[default]
    Ffdc,
    /// 15c2:0038 devices
    V0038,
}

impl Protocol {
    /// USB product id string, for log lines.
    pub fn id(self) -> &'static str {
        match self {
            Protocol::Ffdc => "ffdc",
            Protocol::V0038 => "0038",
        }
    }
}

/// Set the icons around the outside of the display.
pub const CMD_SET_ICONS: u64 = 0x0100000000000000;
/// Required init command, nominally "set text mode".
pub const CMD_INIT: u64 = 0x0200000000000000;
/// Contrast base opcode.
pub const CMD_SET_CONTRAST: u64 = 0x0300000000000000;
/// First word of the builtin progress bars and lines.
pub const CMD_SET_LINES0: u64 = 0x1000000000000000;
/// Second word of the builtin progress bars and lines.
pub const CMD_SET_LINES1: u64 = 0x1100000000000000;
/// Third word of the builtin progress bars and lines.
pub const CMD_SET_LINES2: u64 = 0x1200000000000000;
/// Contrast word with the fixed payload the hardware expects; add the
/// normalized level (0..=40) to this.
pub const CMD_LOW_CONTRAST: u64 = CMD_SET_CONTRAST + 0x00FFFFFF00580A00;

// Modifier bits or'd onto the variant's display word.
const CMD_SHUTDOWN: u64 = 0x08;
const CMD_DISPLAY_ON: u64 = 0x40;

const CMD_DISPLAY_BYTE_FFDC: u64 = 0x5000000000000000;
const CMD_ALARM_BYTE_FFDC: u64 = 0x5100000000000000;
const CMD_DISPLAY_BYTE_0038: u64 = 0x8800000000000000;
const CMD_ALARM_BYTE_0038: u64 = 0x8a00000000000000;

/// Command words resolved for one protocol variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSet {
    /// Display base word; clock fields are added onto this.
    pub display: u64,
    /// Turn the display (backlight) off.
    pub shutdown: u64,
    /// Turn the display on.
    pub display_on: u64,
    /// Alarm base word. Sent bare it clears a pending hardware wake-up;
    /// with clock fields added it arms one.
    pub alarm: u64,
}

impl CommandSet {
    /// Resolve the words for a variant.
    pub fn new(protocol: Protocol) -> Self {
        let (display, alarm) = match protocol {
            Protocol::Ffdc => (CMD_DISPLAY_BYTE_FFDC, CMD_ALARM_BYTE_FFDC),
            Protocol::V0038 => (CMD_DISPLAY_BYTE_0038, CMD_ALARM_BYTE_0038),
        };
        Self {
            display,
            shutdown: display | CMD_SHUTDOWN,
            display_on: display | CMD_DISPLAY_ON,
            alarm,
        }
    }
}

/// Length of every packet the device accepts.
pub const PACKET_LEN: usize = 8;
/// Payload bytes carried per pixel-data packet.
pub const PIXEL_CHUNK: usize = 7;
/// First memory register of the pixel area.
pub const PIXEL_REG_FIRST: u8 = 0x20;
/// Last memory register of the pixel area (inclusive).
pub const PIXEL_REG_LAST: u8 = 0x3b;

/// Serialize a command word in the byte order the device requires.
#[inline]
pub fn packet(cmd: u64) -> [u8; PACKET_LEN] {
    cmd.to_le_bytes()
}

/// Build one pixel-data packet: seven frame bytes starting at the register's
/// offset, `0xFF` padding past the end of the frame, register byte last.
pub fn pixel_packet(frame: &[u8], reg: u8) -> [u8; PACKET_LEN] {
    let mut buf = [0xFF; PACKET_LEN];
    let offset = usize::from(reg.saturating_sub(PIXEL_REG_FIRST)) * PIXEL_CHUNK;
    if offset < frame.len() {
        let n = PIXEL_CHUNK.min(frame.len() - offset);
        buf[..n].copy_from_slice(&frame[offset..offset + n]);
    }
    buf[PIXEL_CHUNK] = reg;
    buf
}

// Wire bits of the icon word. Byte 6 (bits 40..47) holds the disc-spin
// segments and is driven by the phase table below.
const ICON_DISK_IN: u64 = 0x0080000000000000;

/* Byte 5 */
const ICON_AUDIO_WMA2: u64 = 1 << 39;
const ICON_AUDIO_WAV: u64 = 1 << 38;
const ICON_REP: u64 = 1 << 37;
const ICON_SFL: u64 = 1 << 36;
const ICON_ALARM: u64 = 1 << 35;
const ICON_REC: u64 = 1 << 34;
const ICON_VOL: u64 = 1 << 33;
const ICON_TIME: u64 = 1 << 32;

/* Byte 4 */
const ICON_XVID: u64 = 1 << 31;
const ICON_WMV: u64 = 1 << 30;
const ICON_AUDIO_MPG: u64 = 1 << 29;
const ICON_AUDIO_AC3: u64 = 1 << 28;
const ICON_AUDIO_DTS: u64 = 1 << 27;
const ICON_AUDIO_WMA: u64 = 1 << 26;
const ICON_AUDIO_MP3: u64 = 1 << 25;
const ICON_AUDIO_OGG: u64 = 1 << 24;

/* Byte 3 */
const ICON_SRC: u64 = 1 << 23;
const ICON_FIT: u64 = 1 << 22;
const ICON_TV_2: u64 = 1 << 21;
const ICON_HDTV: u64 = 1 << 20;
const ICON_SCR1: u64 = 1 << 19;
const ICON_SCR2: u64 = 1 << 18;
const ICON_MPG: u64 = 1 << 17;
const ICON_DIVX: u64 = 1 << 16;

/* Byte 2 */
const ICON_SPKR_FC: u64 = 1 << 15;
const ICON_SPKR_FR: u64 = 1 << 14;
const ICON_SPKR_SL: u64 = 1 << 13;
const ICON_SPKR_LFE: u64 = 1 << 12;
const ICON_SPKR_SR: u64 = 1 << 11;
const ICON_SPKR_RL: u64 = 1 << 10;
const ICON_SPKR_SPDIF: u64 = 1 << 9;
const ICON_SPKR_RR: u64 = 1 << 8;

// Compile-time layout check: byte 2 is entirely speaker segments.
const _: () = assert!(
    ICON_SPKR_FC
        | ICON_SPKR_FR
        | ICON_SPKR_SL
        | ICON_SPKR_LFE
        | ICON_SPKR_SR
        | ICON_SPKR_RL
        | ICON_SPKR_SPDIF
        | ICON_SPKR_RR
        == 0xFF << 8
);

/* Byte 1 */
const ICON_MUSIC: u64 = 1 << 7;
const ICON_MOVIE: u64 = 1 << 6;
const ICON_PHOTO: u64 = 1 << 5;
const ICON_CD_DVD: u64 = 1 << 4;
const ICON_TV: u64 = 1 << 3;
const ICON_WEBCAST: u64 = 1 << 2;
const ICON_NEWS: u64 = 1 << 1;
const ICON_SPKR_FL: u64 = 1 << 0;

bitflags! {
    /// Requested icon state, the input vocabulary of [`icon_word`].
    ///
    /// The top row, speakers and the three bottom groups are exclusive
    /// multi-value fields packed into three bits each; the `*_MASK` consts
    /// cover a whole field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Icons: u32 {
        /// Disc segments are in use (lit statically or animated)
        const DISC_SPIN = 1 << 0;

        /// Top row: music note
        const TOP_MUSIC = 1 << 1;
        /// Top row: movie strip
        const TOP_MOVIE = 2 << 1;
        /// Top row: photo
        const TOP_PHOTO = 3 << 1;
        /// Top row: CD/DVD
        const TOP_DVD = 4 << 1;
        /// Top row: television
        const TOP_TV = 5 << 1;
        /// Top row: webcast
        const TOP_WEB = 6 << 1;
        /// Top row: news/weather
        const TOP_NEWS = 7 << 1;
        /// All bits of the top-row field
        const TOP_MASK = 7 << 1;

        /// Front-left speaker only
        const SPEAKER_L = 1 << 4;
        /// Front-right speaker only
        const SPEAKER_R = 2 << 4;
        /// Front stereo pair
        const SPEAKER_LR = 3 << 4;
        /// 5.1 channel set
        const SPEAKER_51 = 4 << 4;
        /// 7.1 channel set
        const SPEAKER_71 = 5 << 4;
        /// SPDIF passthrough badge
        const SPEAKER_SPDIF = 6 << 4;
        /// Muted (no speaker segments)
        const SPEAKER_MUTE = 7 << 4;
        /// All bits of the speaker field
        const SPEAKER_MASK = 7 << 4;

        /// Source badge
        const SRC = 1 << 7;
        /// Fit badge
        const FIT = 1 << 8;
        /// TV badge
        const TV = 1 << 9;
        /// HDTV badge
        const HDTV = 1 << 10;
        /// Source 1 badge
        const SRC1 = 1 << 11;
        /// Source 2 badge
        const SRC2 = 1 << 12;

        /// Bottom right: MP3
        const BR_MP3 = 1 << 13;
        /// Bottom right: OGG
        const BR_OGG = 2 << 13;
        /// Bottom right: WMA
        const BR_WMA = 3 << 13;
        /// Bottom right: WAV
        const BR_WAV = 4 << 13;
        /// All bits of the bottom-right field
        const BR_MASK = 7 << 13;

        /// Bottom middle: MPG audio
        const BM_MPG = 1 << 16;
        /// Bottom middle: AC3
        const BM_AC3 = 2 << 16;
        /// Bottom middle: DTS
        const BM_DTS = 3 << 16;
        /// Bottom middle: WMA
        const BM_WMA = 4 << 16;
        /// All bits of the bottom-middle field
        const BM_MASK = 7 << 16;

        /// Bottom left: MPG video
        const BL_MPG = 1 << 19;
        /// Bottom left: DivX
        const BL_DIVX = 2 << 19;
        /// Bottom left: XviD
        const BL_XVID = 3 << 19;
        /// Bottom left: WMV
        const BL_WMV = 4 << 19;
        /// All bits of the bottom-left field
        const BL_MASK = 7 << 19;

        /// Volume badge
        const VOLUME = 1 << 22;
        /// Time badge
        const TIME = 1 << 23;
        /// Alarm badge
        const ALARM = 1 << 24;
        /// Recording badge
        const RECORDING = 1 << 25;
        /// Repeat badge
        const REPEAT = 1 << 26;
        /// Shuffle badge
        const SHUFFLE = 1 << 27;

        /// Disc ellipse around the segments
        const DISC_ELLIPSE = 1 << 28;
        /// Animate the disc segments
        const DISC_RUN_SPIN = 1 << 29;
        /// Animate backwards
        const DISC_SPIN_BACKWARD = 1 << 30;
    }
}

impl Default for Icons {
    fn default() -> Self {
        Icons::empty()
    }
}

/// Which disc rendition the spin segments draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscStyle {
    /// All segments lit except an opposing pair (a slim disc with a gap)
    #[default]
    Slim,
    /// Only the opposing pair lit
    Full,
}

// Opposing segment pair per animation phase, and the phase that follows in
// each direction.
const SPIN_SEGMENTS: [u8; 4] = [128 | 8, 1 | 16, 32 | 2, 4 | 64];
const SPIN_FORWARD: [u8; 4] = [1, 2, 3, 0];
const SPIN_BACKWARD: [u8; 4] = [3, 0, 1, 2];

/// Map the requested icon state to the payload of a [`CMD_SET_ICONS`] word.
///
/// `phase` is the caller's stored disc animation phase; the returned phase
/// replaces it. The segments render only when [`Icons::DISC_SPIN`] is set,
/// animated from `phase` when [`Icons::DISC_RUN_SPIN`] is also set and
/// frozen at the resting pattern otherwise.
pub fn icon_word(state: Icons, phase: u8, style: DiscStyle) -> (u64, u8) {
    let mut icon = 0u64;
    let mut next = phase;

    if state.contains(Icons::DISC_SPIN) {
        let cur = if state.contains(Icons::DISC_RUN_SPIN) {
            (phase & 3) as usize
        } else {
            3
        };
        let pair = SPIN_SEGMENTS[cur];
        let segments = match style {
            DiscStyle::Slim => 255 - pair,
            DiscStyle::Full => pair,
        };
        icon |= u64::from(segments) << 40;
        next = if state.contains(Icons::DISC_SPIN_BACKWARD) {
            SPIN_BACKWARD[cur]
        } else {
            SPIN_FORWARD[cur]
        };
    }

    icon |= match state & Icons::TOP_MASK {
        t if t == Icons::TOP_MUSIC => ICON_MUSIC,
        t if t == Icons::TOP_MOVIE => ICON_MOVIE,
        t if t == Icons::TOP_PHOTO => ICON_PHOTO,
        t if t == Icons::TOP_DVD => ICON_CD_DVD,
        t if t == Icons::TOP_TV => ICON_TV,
        t if t == Icons::TOP_WEB => ICON_WEBCAST,
        t if t == Icons::TOP_NEWS => ICON_NEWS,
        _ => 0,
    };

    icon |= match state & Icons::SPEAKER_MASK {
        s if s == Icons::SPEAKER_L => ICON_SPKR_FL,
        s if s == Icons::SPEAKER_R => ICON_SPKR_FR,
        s if s == Icons::SPEAKER_LR => ICON_SPKR_FL | ICON_SPKR_FR,
        s if s == Icons::SPEAKER_51 => {
            ICON_SPKR_FL | ICON_SPKR_FC | ICON_SPKR_FR | ICON_SPKR_RL | ICON_SPKR_RR
        }
        s if s == Icons::SPEAKER_71 => {
            ICON_SPKR_FL
                | ICON_SPKR_FC
                | ICON_SPKR_FR
                | ICON_SPKR_RL
                | ICON_SPKR_RR
                | ICON_SPKR_SL
                | ICON_SPKR_SR
        }
        s if s == Icons::SPEAKER_SPDIF => ICON_SPKR_SPDIF,
        _ => 0,
    };

    if state.contains(Icons::SRC) {
        icon |= ICON_SRC;
    }
    if state.contains(Icons::FIT) {
        icon |= ICON_FIT;
    }
    if state.contains(Icons::TV) {
        icon |= ICON_TV_2;
    }
    if state.contains(Icons::HDTV) {
        icon |= ICON_HDTV;
    }
    if state.contains(Icons::SRC1) {
        icon |= ICON_SCR1;
    }
    if state.contains(Icons::SRC2) {
        icon |= ICON_SCR2;
    }

    icon |= match state & Icons::BR_MASK {
        f if f == Icons::BR_MP3 => ICON_AUDIO_MP3,
        f if f == Icons::BR_OGG => ICON_AUDIO_OGG,
        f if f == Icons::BR_WMA => ICON_AUDIO_WMA2,
        f if f == Icons::BR_WAV => ICON_AUDIO_WAV,
        _ => 0,
    };

    icon |= match state & Icons::BM_MASK {
        f if f == Icons::BM_MPG => ICON_AUDIO_MPG,
        f if f == Icons::BM_AC3 => ICON_AUDIO_AC3,
        f if f == Icons::BM_DTS => ICON_AUDIO_DTS,
        f if f == Icons::BM_WMA => ICON_AUDIO_WMA,
        _ => 0,
    };

    icon |= match state & Icons::BL_MASK {
        f if f == Icons::BL_MPG => ICON_MPG,
        f if f == Icons::BL_DIVX => ICON_DIVX,
        f if f == Icons::BL_XVID => ICON_XVID,
        f if f == Icons::BL_WMV => ICON_WMV,
        _ => 0,
    };

    if state.contains(Icons::VOLUME) {
        icon |= ICON_VOL;
    }
    if state.contains(Icons::TIME) {
        icon |= ICON_TIME;
    }
    if state.contains(Icons::ALARM) {
        icon |= ICON_ALARM;
    }
    if state.contains(Icons::RECORDING) {
        icon |= ICON_REC;
    }
    if state.contains(Icons::REPEAT) {
        icon |= ICON_REP;
    }
    if state.contains(Icons::SHUFFLE) {
        icon |= ICON_SFL;
    }
    if state.contains(Icons::DISC_ELLIPSE) {
        icon |= ICON_DISK_IN;
    }

    (icon, next)
}

const PIXMAP: [u32; 33] = [
    0x00, 0x00000080, 0x000000c0, 0x000000e0, 0x000000f0, 0x000000f8, 0x000000fc, 0x000000fe,
    0x000000ff, 0x000080ff, 0x0000c0ff, 0x0000e0ff, 0x0000f0ff, 0x0000f8ff, 0x0000fcff, 0x0000feff,
    0x0000ffff, 0x0080ffff, 0x00c0ffff, 0x00e0ffff, 0x00f0ffff, 0x00f8ffff, 0x00fcffff, 0x00feffff,
    0x00ffffff, 0x80ffffff, 0xc0ffffff, 0xe0ffffff, 0xf0ffffff, 0xf8ffffff, 0xfcffffff, 0xfeffffff,
    0xffffffff,
];

/// Map a bar length to the pixmap of the builtin progress bars.
///
/// Lengths 0..=32 fill left to right; negative lengths fill right to left;
/// anything past 32 pixels is empty.
pub fn length_to_pixmap(length: i32) -> u32 {
    if !(-32..=32).contains(&length) {
        return 0;
    }
    if length >= 0 {
        PIXMAP[length as usize]
    } else {
        PIXMAP[(32 + length) as usize] ^ 0xffffffff
    }
}

/// Build the three `CMD_SET_LINES*` words carrying two 32-bit line pixmaps
/// and two 32-bit progress pixmaps.
pub fn progress_words(
    top_line: u32,
    bot_line: u32,
    top_progress: u32,
    bot_progress: u32,
) -> [u64; 3] {
    // Bytes 1-4 of the top line and 1-3 of the top progress bar.
    let mut data = u64::from(top_line);
    data |= (u64::from(top_progress) << 32) & 0x00FFFFFF00000000;
    let w0 = CMD_SET_LINES0 | data;

    // Byte 4 of the top progress bar, all of the bottom progress bar and
    // bytes 1-2 of the bottom line.
    let mut data = (u64::from(top_progress) >> 24) & 0xFF;
    data |= (u64::from(bot_progress) << 8) & 0x000000FFFFFFFF00;
    data |= (u64::from(bot_line) << 40) & 0x00FFFF0000000000;
    let w1 = CMD_SET_LINES1 | data;

    // Remaining bytes 3-4 of the bottom line.
    let w2 = CMD_SET_LINES2 | (u64::from(bot_line) >> 16);

    [w0, w1, w2]
}

/// Pack wall-clock fields onto a display or alarm base word.
///
/// The low `0x80` flag tells the firmware the time fields are valid; the
/// device keeps counting (or arms the wake-up) on its own afterwards.
pub fn clock_word(base: u64, t: NaiveDateTime) -> u64 {
    let mut data = base;
    data += u64::from(t.second()) << 48;
    data += u64::from(t.minute()) << 40;
    data += u64::from(t.hour()) << 32;
    data += u64::from(t.day()) << 24;
    data += u64::from(t.month0()) << 16;
    data += (((t.year() - 1900) as u64) & 0xFF) << 8;
    data += 0x80;
    data
}
