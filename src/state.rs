//! Presentation state: watch modes, replay classification and the mapping
//! from application state to icon bits.
//!
//! Everything in here is plain data and pure functions; the engine owns the
//! mutable copy and calls in under its own lock. The replay-name classifier
//! mirrors the free-text headers real player frontends emit, so its rules
//! are byte-oriented and deliberately picky about punctuation.

use crate::proto::Icons;
use bitflags::bitflags;

/// What the display is currently following.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchMode {
    /// Live TV with program information.
    #[default]
    LiveTv,
    /// Replay of an ordinary recording.
    ReplayNormal,
    /// Replay driven by a music player frontend.
    ReplayMusic,
    /// DVD playback.
    ReplayDvd,
    /// Playback of a plain media file.
    ReplayFile,
    /// Picture viewer.
    ReplayImage,
    /// Audio CD playback.
    ReplayAudioCd,
}

impl WatchMode {
    /// True for every mode except live TV.
    pub fn is_replay(self) -> bool {
        self != WatchMode::LiveTv
    }

    /// Mode badge and disc icons for this mode.
    pub fn icons(self) -> Icons {
        match self {
            WatchMode::LiveTv => Icons::TV,
            WatchMode::ReplayNormal => {
                Icons::DISC_SPIN | Icons::DISC_ELLIPSE | Icons::TOP_MOVIE
            }
            WatchMode::ReplayMusic => {
                Icons::DISC_SPIN | Icons::DISC_ELLIPSE | Icons::TOP_MUSIC
            }
            WatchMode::ReplayDvd | WatchMode::ReplayAudioCd => {
                Icons::DISC_SPIN | Icons::DISC_ELLIPSE | Icons::TOP_DVD
            }
            WatchMode::ReplayFile => Icons::DISC_SPIN | Icons::DISC_ELLIPSE | Icons::TOP_WEB,
            WatchMode::ReplayImage => {
                Icons::DISC_SPIN | Icons::DISC_ELLIPSE | Icons::TOP_PHOTO
            }
        }
    }
}

/// Shuffle and repeat flags parsed from a music player header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Straight playback.
    #[default]
    Normal,
    /// Random order.
    Shuffle,
    /// Start over at the end.
    Repeat,
    /// Both at once.
    RepeatShuffle,
}

impl LoopMode {
    /// Repeat and shuffle badges.
    pub fn icons(self) -> Icons {
        match self {
            LoopMode::Normal => Icons::empty(),
            LoopMode::Shuffle => Icons::SHUFFLE,
            LoopMode::Repeat => Icons::REPEAT,
            LoopMode::RepeatShuffle => Icons::SHUFFLE | Icons::REPEAT,
        }
    }
}

/// Video codec of the running program or replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoFormat {
    /// No video, or nothing known about it.
    #[default]
    None,
    /// MPEG 1/2.
    Mpg,
    /// DivX in an AVI container.
    DivX,
    /// XviD in an AVI container.
    XviD,
    /// Windows Media video.
    Wmv,
}

impl VideoFormat {
    /// Bottom-left badge field.
    pub fn icons(self) -> Icons {
        match self {
            VideoFormat::None => Icons::empty(),
            VideoFormat::Mpg => Icons::BL_MPG,
            VideoFormat::DivX => Icons::BL_DIVX,
            VideoFormat::XviD => Icons::BL_XVID,
            VideoFormat::Wmv => Icons::BL_WMV,
        }
    }
}

bitflags! {
    /// Audio codecs of the running program or replay. More than one can be
    /// present at once (a channel carrying both MPEG and AC3 tracks).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AudioFormats: u8 {
        /// MPEG audio track.
        const MPG = 1 << 0;
        /// Dolby Digital track.
        const AC3 = 1 << 1;
        /// DTS track.
        const DTS = 1 << 2;
        /// Windows Media audio.
        const WMA = 1 << 3;
        /// MP3 file.
        const MP3 = 1 << 4;
        /// Ogg Vorbis file.
        const OGG = 1 << 5;
        /// Uncompressed PCM.
        const WAV = 1 << 6;
    }
}

impl Default for AudioFormats {
    fn default() -> Self {
        AudioFormats::empty()
    }
}

impl AudioFormats {
    /// Bottom-middle and bottom-right badge fields. The badge fields are
    /// packed three-bit values, so combinations accumulate: a channel with
    /// both MPEG and AC3 tracks lights the DTS badge. The hardware offers
    /// no better rendition of "more than one codec".
    pub fn icons(self) -> Icons {
        let mut icons = Icons::empty();
        if self.contains(AudioFormats::MPG) {
            icons |= Icons::BM_MPG;
        }
        if self.contains(AudioFormats::AC3) {
            icons |= Icons::BM_AC3;
        }
        if self.contains(AudioFormats::DTS) {
            icons |= Icons::BM_DTS;
        }
        if self.contains(AudioFormats::WMA) {
            icons |= Icons::BR_WMA;
        }
        if self.contains(AudioFormats::MP3) {
            icons |= Icons::BR_MP3;
        }
        if self.contains(AudioFormats::OGG) {
            icons |= Icons::BR_OGG;
        }
        if self.contains(AudioFormats::WAV) {
            icons |= Icons::BR_WAV;
        }
        icons
    }
}

/// Raw trick-play state as the player reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayTrick {
    /// Playing (true) or pausing (false).
    pub play: bool,
    /// Going forward (true) or backward (false).
    pub forward: bool,
    /// -1 for normal play/pause, 0 for single-speed trick mode, >0 for
    /// multi-speed trick modes.
    pub speed: i32,
}

/// Position of a running replay, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayPosition {
    /// Seconds played so far.
    pub current: i64,
    /// Total length in seconds.
    pub total: i64,
}

/// Query interface to the player owning the current replay.
///
/// Polled once per tick from the worker thread; implementations must not
/// block on their own locks for long.
pub trait ReplayControl: Send {
    /// Current trick-play state, `None` when the player cannot tell.
    fn replay_mode(&self) -> Option<ReplayTrick>;

    /// Current position and total length, `None` when the player cannot
    /// tell.
    fn position(&self) -> Option<ReplayPosition>;
}

/// Normalized replay state driving the disc animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayState {
    /// No replay, or the player is not answering.
    #[default]
    None,
    /// Normal playback.
    Play,
    /// Paused.
    Paused,
    /// Single-speed forward trick mode (frame stepping).
    Forward1,
    /// Double-speed fast forward.
    Forward2,
    /// Triple-speed fast forward.
    Forward3,
    /// Single-speed backward trick mode.
    Backward1,
    /// Double-speed rewind.
    Backward2,
    /// Triple-speed rewind.
    Backward3,
}

impl ReplayState {
    /// Classify the player's raw trick state.
    pub fn classify(trick: Option<ReplayTrick>) -> Self {
        let Some(t) = trick else {
            return ReplayState::None;
        };
        match t.speed {
            0 | 1 => {
                if t.forward {
                    ReplayState::Forward1
                } else {
                    ReplayState::Backward1
                }
            }
            2 => {
                if t.forward {
                    ReplayState::Forward2
                } else {
                    ReplayState::Backward2
                }
            }
            3 => {
                if t.forward {
                    ReplayState::Forward3
                } else {
                    ReplayState::Backward3
                }
            }
            _ => {
                if t.play {
                    ReplayState::Play
                } else {
                    ReplayState::Paused
                }
            }
        }
    }

    /// Disc-animation contribution of this state on the given tick: icon
    /// bits to merge and whether the spin phase advances this tick.
    ///
    /// Normal play turns the disc a step every fourth tick, double speed
    /// every second, triple speed every tick. Single-speed trick mode
    /// shows a frozen disc, backward modes flip the turn direction, and
    /// pause stops the animation where it is.
    pub fn spin(self, tick: u32) -> (Icons, bool) {
        match self {
            ReplayState::None | ReplayState::Paused => (Icons::empty(), false),
            ReplayState::Play => (Icons::DISC_RUN_SPIN, tick % 4 == 0),
            ReplayState::Forward1 => (Icons::empty(), false),
            ReplayState::Backward1 => (Icons::DISC_SPIN_BACKWARD, false),
            ReplayState::Forward2 => (Icons::DISC_RUN_SPIN, tick % 2 == 0),
            ReplayState::Backward2 => (
                Icons::DISC_RUN_SPIN | Icons::DISC_SPIN_BACKWARD,
                tick % 2 == 0,
            ),
            ReplayState::Forward3 => (Icons::DISC_RUN_SPIN, true),
            ReplayState::Backward3 => (Icons::DISC_RUN_SPIN | Icons::DISC_SPIN_BACKWARD, true),
        }
    }
}

/// Everything the classifier derives from one replay display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayInfo {
    /// Watch mode the name maps to.
    pub mode: WatchMode,
    /// Cleaned-up title for the text line.
    pub title: String,
    /// Loop flags from a music player header.
    pub loop_mode: LoopMode,
    /// Video badge to light.
    pub video: VideoFormat,
    /// Audio badges to light.
    pub audio: AudioFormats,
}

impl ReplayInfo {
    /// Classify a replay display name.
    ///
    /// The rules are checked in priority order against well-known frontend
    /// header shapes:
    ///
    /// - `[LS] (n/m) title` marks a music player; the two characters in the
    ///   brackets carry the loop and shuffle flags (`.` meaning off).
    /// - Four comma-separated fields mark a DVD header; the last field is
    ///   the volume name.
    /// - An `[image] ` or `[audiocd] ` prefix marks the respective viewer.
    /// - A path with a file extension is reduced to its basename.
    /// - A `~` separator keeps only the text after it.
    /// - Anything else is shown verbatim.
    pub fn classify(name: &str) -> Self {
        let mut info = ReplayInfo {
            mode: WatchMode::ReplayNormal,
            title: String::new(),
            loop_mode: LoopMode::Normal,
            video: VideoFormat::Mpg,
            audio: AudioFormats::MPG,
        };

        let mut title = None;
        if !name.trim().is_empty() {
            let bytes = name.as_bytes();
            let len = bytes.len();
            let mut found = false;

            // Music player header: [LS] (444/666) title
            if len > 6 && bytes[0] == b'[' && bytes[3] == b']' && bytes[5] == b'(' {
                if let Some(i) = (6..len).find(|&i| bytes[i] == b' ' && bytes[i - 1] == b')') {
                    info.loop_mode = match (bytes[1] != b'.', bytes[2] != b'.') {
                        (true, true) => LoopMode::RepeatShuffle,
                        (true, false) => LoopMode::Repeat,
                        (false, true) => LoopMode::Shuffle,
                        (false, false) => LoopMode::Normal,
                    };
                    title = Some(name[i..].trim_start().to_string());
                    info.mode = WatchMode::ReplayMusic;
                    info.video = VideoFormat::None;
                    info.audio = AudioFormats::MP3;
                    found = true;
                }
            }

            // DVD header: titleinfo, audiolang, aspect, volumename
            if !found && len > 7 {
                let mut n = 0;
                for i in 1..len {
                    if bytes[i] == b' ' && bytes[i - 1] == b',' {
                        n += 1;
                        if n == 3 {
                            title = Some(name[i..].trim_start().to_string());
                            info.mode = WatchMode::ReplayDvd;
                            info.video = VideoFormat::Mpg;
                            info.audio = AudioFormats::MPG;
                            found = true;
                            break;
                        }
                    }
                }
            }

            // Path or subdirectory prefix, scanned from the right.
            if !found {
                let mut i = len - 1;
                while i > 0 {
                    match bytes[i] {
                        b'/' => {
                            // Only strip paths that end in a file extension.
                            if len > 5 && (bytes[len - 4] == b'.' || bytes[len - 5] == b'.') {
                                info.mode = WatchMode::ReplayFile;
                                title = Some(name[i + 1..].to_string());
                                found = true;
                                break;
                            }
                        }
                        b'~' => {
                            title = Some(name[i + 1..].to_string());
                            found = true;
                            break;
                        }
                        _ => {}
                    }
                    i -= 1;
                }
            }

            if bytes.starts_with(b"[image] ") {
                if info.mode != WatchMode::ReplayFile {
                    title = Some(name[8..].to_string());
                }
                info.mode = WatchMode::ReplayImage;
                info.video = VideoFormat::Mpg;
                info.audio = AudioFormats::empty();
                found = true;
            } else if bytes.starts_with(b"[audiocd] ") {
                title = Some(name[10..].to_string());
                info.mode = WatchMode::ReplayAudioCd;
                info.video = VideoFormat::None;
                info.audio = AudioFormats::WAV;
                found = true;
            }

            if !found {
                title = Some(name.to_string());
            }
        }

        info.title = title.unwrap_or_else(|| String::from("Unknown title"));
        info
    }
}

/// What the host resolved about the newly tuned channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelInfo {
    /// Channel number, used for logging only.
    pub number: i32,
    /// Channel display name.
    pub name: Option<String>,
    /// Channel carries a video stream.
    pub has_video: bool,
    /// Channel carries an MPEG audio track.
    pub has_mpeg_audio: bool,
    /// Channel carries a dolby (AC3) track.
    pub has_dolby: bool,
}

/// Present program information pushed by the host's schedule source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramEvent {
    /// Schedule-unique event id, used to drop duplicate pushes.
    pub id: u32,
    /// Program title.
    pub title: Option<String>,
    /// Episode or subtitle line.
    pub short_title: Option<String>,
    /// Start time, seconds since the unix epoch.
    pub start: i64,
    /// End time, seconds since the unix epoch.
    pub end: i64,
}

/// Kind of the active audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioTrackKind {
    /// Plain stereo/mono track.
    Analog,
    /// Dolby multi-channel track.
    Dolby,
}

/// Active downmix channel of an analog track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioChannel {
    /// Both channels.
    #[default]
    Stereo,
    /// Left channel only.
    Left,
    /// Right channel only.
    Right,
}

/// Speaker segments for the active audio track.
pub fn speaker_icons(kind: Option<AudioTrackKind>, channel: AudioChannel) -> Icons {
    match kind {
        None => Icons::empty(),
        Some(AudioTrackKind::Analog) => match channel {
            AudioChannel::Left => Icons::SPEAKER_L,
            AudioChannel::Right => Icons::SPEAKER_R,
            AudioChannel::Stereo => Icons::SPEAKER_LR,
        },
        Some(AudioTrackKind::Dolby) => Icons::SPEAKER_51,
    }
}

/// Per-device recording counters with the badge mapping.
///
/// Devices past the array simply share the last slot; the display has
/// source badges for the first three devices only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingCounters {
    counts: [u32; 16],
}

impl RecordingCounters {
    /// Track a recording start or stop on a device.
    pub fn update(&mut self, device_index: usize, starting: bool) {
        let i = device_index.min(self.counts.len() - 1);
        if starting {
            self.counts[i] = self.counts[i].saturating_add(1);
        } else if self.counts[i] > 0 {
            self.counts[i] -= 1;
        }
    }

    /// True when any device is recording.
    pub fn any(&self) -> bool {
        self.counts.iter().any(|&c| c != 0)
    }

    /// Recording badge plus a source badge per busy device.
    pub fn icons(&self) -> Icons {
        let mut icons = Icons::empty();
        for (i, &count) in self.counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            icons |= Icons::RECORDING;
            match i {
                0 => icons |= Icons::SRC,
                1 => icons |= Icons::SRC1,
                2 => icons |= Icons::SRC2,
                _ => {}
            }
        }
        icons
    }
}

/// Volume percentage tracker with edge-triggered mute detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeState {
    percent: i32,
    muted: bool,
}

impl VolumeState {
    /// Start from the host's current volume percentage.
    pub fn new(percent: i32) -> Self {
        Self {
            percent,
            muted: false,
        }
    }

    /// Feed a volume change. `value` is a raw 0..=255 level, absolute or
    /// relative to the current one. Returns true when the mute state
    /// flipped.
    pub fn update(&mut self, value: i32, absolute: bool) -> bool {
        let percent = if absolute {
            100 * value / 255
        } else {
            self.percent + 100 * value / 255
        };

        let mut changed = false;
        if self.percent > 0 && percent == 0 {
            self.muted = true;
            changed = true;
        } else if self.percent == 0 && percent > 0 {
            self.muted = false;
            changed = true;
        }
        self.percent = percent;
        changed
    }

    /// Whether the last change crossed into silence.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Current volume percentage.
    pub fn percent(&self) -> i32 {
        self.percent
    }
}

/// Collapse runs of whitespace the way the display wants its single-line
/// strings: tabs become spaces, runs shrink to one space, ends are
/// trimmed. Empty or blank input clears the slot.
pub fn normalize_osd(text: Option<&str>) -> Option<String> {
    let text = text?;
    if text.trim().is_empty() {
        return None;
    }
    let replaced = text.replace('\t', " ");
    Some(
        replaced
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// Requested or reported override state of an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconState {
    /// Report the current override without changing it.
    Query,
    /// Keep the icon lit whatever the engine derives.
    On,
    /// Keep the icon dark whatever the engine derives.
    Off,
    /// Give the icon back to automatic control.
    Auto,
}

// Exclusive badge fields; forcing one member takes the whole field out of
// automatic control.
const ICON_GROUPS: [Icons; 5] = [
    Icons::TOP_MASK,
    Icons::SPEAKER_MASK,
    Icons::BR_MASK,
    Icons::BM_MASK,
    Icons::BL_MASK,
];

/// Force-override sets applied on top of the automatically derived icons.
#[derive(Debug, Clone, Copy, Default)]
pub struct IconForce {
    force_on: Icons,
    force_off: Icons,
    mask: Icons,
}

impl IconForce {
    fn expand(icon: Icons) -> Icons {
        for group in ICON_GROUPS {
            if icon.intersects(group) {
                return icon | group;
            }
        }
        icon
    }

    /// Change (or query) the override of an icon and report the state it
    /// ends up in.
    ///
    /// Forcing a member of an exclusive field on or off claims the whole
    /// field, and forcing a second member of the same field replaces the
    /// first. `Auto` releases exactly the requested bits.
    pub fn set(&mut self, icon: Icons, state: IconState) -> IconState {
        let group = Self::expand(icon);
        match state {
            IconState::Auto => {
                self.force_on &= !icon;
                self.force_off &= !icon;
                self.mask &= !icon;
            }
            IconState::On => {
                self.force_on = (self.force_on & !group) | icon;
                self.force_off &= !group;
                self.mask |= group;
            }
            IconState::Off => {
                self.force_off = (self.force_off & !group) | icon;
                self.force_on &= !group;
                self.mask |= group;
            }
            IconState::Query => {}
        }

        if self.force_on.intersects(icon) {
            IconState::On
        } else if self.force_off.intersects(icon) {
            IconState::Off
        } else {
            IconState::Auto
        }
    }

    /// Apply the overrides to the automatically derived icons.
    pub fn apply(&self, auto: Icons) -> Icons {
        ((auto & !self.mask) | self.force_on) & !self.force_off
    }

    /// Currently forced-on icons.
    pub fn forced_on(&self) -> Icons {
        self.force_on
    }
}
