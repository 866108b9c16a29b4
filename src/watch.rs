//! The display engine: a worker thread driving the panel from shared
//! presentation state.
//!
//! [`Watch`] pairs one [`Lcd`] with the state the host pushes in through
//! the `on_*` methods. A background thread ticks roughly every 100 ms,
//! recomputes the icon mask and progress bar, runs the text pass with its
//! marquee, and sends only what changed since the previous tick. A daily
//! suspend window can power the panel down between configured clock times,
//! with the tick stretched to one second while dark.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{Datelike, Local, NaiveDateTime, Timelike, Utc};
use parking_lot::Mutex;

use crate::config::{OnExit, RenderMode, Settings, SettingsChange, SuspendMode};
use crate::device::{FontSize, Lcd, Transport};
use crate::error::Result;
use crate::font::DrawOutcome;
use crate::proto::{Icons, Protocol};
use crate::state::{
    normalize_osd, speaker_icons, AudioChannel, AudioFormats, AudioTrackKind, ChannelInfo,
    IconForce, IconState, LoopMode, ProgramEvent, RecordingCounters, ReplayControl, ReplayInfo,
    ReplayPosition, ReplayState, VideoFormat, VolumeState, WatchMode,
};

/// Tick period while the panel is lit.
const ACTIVE_TICK: Duration = Duration::from_millis(100);
/// Tick period inside the suspend window.
const SUSPEND_TICK: Duration = Duration::from_millis(1000);
/// Floor for the per-tick sleep, no matter how long the tick took.
const MIN_TICK_DELAY: Duration = Duration::from_millis(10);
/// How long after the last reported user activity the user counts as idle.
const USER_IDLE_AFTER: Duration = Duration::from_secs(300);
/// How long teardown waits for the worker before detaching it.
const STOP_TIMEOUT: Duration = Duration::from_millis(1500);
const STOP_POLL: Duration = Duration::from_millis(10);

/// Next pending host timer, rendered by the timer-preview exit policy and
/// used to arm the hardware wake-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerPreview {
    /// Start time of the timer, in local time.
    pub start: NaiveDateTime,
    /// Recording name shown after the start time.
    pub title: String,
}

/// Values already sent to the panel, used to suppress repeat packets.
/// `None` means "never sent", so the first tick pushes everything.
#[derive(Debug, Default)]
struct SentCache {
    icons: Option<Icons>,
    contrast: Option<i32>,
    progress: Option<i32>,
}

impl SentCache {
    fn invalidate(&mut self) {
        *self = Self::default();
    }
}

/// Everything the host pushes in, guarded by the engine mutex.
struct EngineState {
    settings: Settings,
    update_screen: bool,

    mode: WatchMode,
    video: VideoFormat,
    audio: AudioFormats,

    scroll_offset: i32,
    scroll_backward: bool,

    recording: RecordingCounters,
    volume: VolumeState,
    force: IconForce,

    channel_name: Option<String>,
    incoming_program: Option<ProgramEvent>,
    present: Option<ProgramEvent>,

    osd_title: Option<String>,
    osd_item: Option<String>,
    osd_message: Option<String>,

    control: Option<Box<dyn ReplayControl>>,
    loop_mode: LoopMode,
    replay_title: String,
    replay_generation: u64,
    replay_seen: u64,

    audio_track: Option<AudioTrackKind>,
    audio_channel: AudioChannel,

    clock_minute: Option<i64>,
    clock_text: Option<String>,
    replay_time_text: Option<String>,

    last_activity: Option<Instant>,
}

impl EngineState {
    fn new(settings: Settings) -> Self {
        Self {
            settings,
            update_screen: true,
            mode: WatchMode::default(),
            video: VideoFormat::default(),
            audio: AudioFormats::empty(),
            scroll_offset: 0,
            scroll_backward: false,
            recording: RecordingCounters::default(),
            // Assume an audible host until the first volume push; the
            // mute badge is driven by zero crossings only.
            volume: VolumeState::new(100),
            force: IconForce::default(),
            channel_name: None,
            incoming_program: None,
            present: None,
            osd_title: None,
            osd_item: None,
            osd_message: None,
            control: None,
            loop_mode: LoopMode::default(),
            replay_title: String::new(),
            replay_generation: 0,
            replay_seen: 0,
            audio_track: None,
            audio_channel: AudioChannel::default(),
            clock_minute: None,
            clock_text: None,
            replay_time_text: None,
            last_activity: None,
        }
    }

    /// Take over a pushed program event unless it is the one already shown.
    /// Events without a start time never match and are adopted again.
    fn adopt_program(&mut self, event: ProgramEvent) -> bool {
        if let Some(current) = &self.present {
            if current.start != 0 && current.id == event.id {
                return false;
            }
        }
        tracing::debug!(id = event.id, "present program adopted");
        self.present = Some(event);
        true
    }

    fn present_title(&self) -> Option<&str> {
        self.present
            .as_ref()?
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
    }

    /// Refresh the header clock, reporting true once per wall minute.
    fn refresh_clock(&mut self) -> bool {
        let now = Local::now();
        let minute = now.timestamp() / 60;
        if self.clock_minute == Some(minute) {
            return false;
        }
        self.clock_minute = Some(minute);
        self.clock_text = Some(now.format("%H:%M").to_string());
        true
    }

    /// True once after each replay start.
    fn replay_dirty(&mut self) -> bool {
        if self.replay_seen != self.replay_generation {
            self.replay_seen = self.replay_generation;
            return true;
        }
        false
    }

    /// Refresh the elapsed/total header, reporting true when it changed.
    fn refresh_replay_time(&mut self, position: Option<ReplayPosition>) -> bool {
        let text =
            position.map(|p| format!("{} / {}", format_hms(p.current), format_hms(p.total)));
        if self.replay_time_text == text {
            return false;
        }
        self.replay_time_text = text;
        true
    }

    fn user_idle(&self) -> bool {
        self.last_activity
            .map_or(true, |at| at.elapsed() >= USER_IDLE_AFTER)
    }
}

struct Shared {
    stop: AtomicBool,
    // Lock order: `state` before `lcd`, everywhere.
    state: Mutex<EngineState>,
    lcd: Mutex<Lcd>,
}

/// The driver engine for one panel.
///
/// `open` brings the panel up and starts the worker; the `on_*` methods
/// are safe to call from any host thread and return after updating state.
/// Dropping the engine closes the panel with the configured exit policy.
pub struct Watch {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Watch {
    /// Open the device node, bring the panel up and start the worker.
    pub fn open(path: &Path, protocol: Protocol, settings: Settings) -> Result<Self> {
        let settings = settings.sanitized();
        let lcd = Lcd::open(path, protocol, &settings)?;
        Self::start(lcd, settings)
    }

    /// Run the engine over an already-open transport. Used by tests and
    /// custom sinks.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        protocol: Protocol,
        settings: Settings,
    ) -> Result<Self> {
        let settings = settings.sanitized();
        let lcd = Lcd::with_transport(transport, protocol, &settings);
        Self::start(lcd, settings)
    }

    fn start(lcd: Lcd, settings: Settings) -> Result<Self> {
        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            state: Mutex::new(EngineState::new(settings)),
            lcd: Mutex::new(lcd),
        });
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("imonlcd-watch".into())
                .spawn(move || run(&shared))?
        };
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// The host tuned to another channel.
    ///
    /// Resets the watch mode to live TV and rebuilds the format badges
    /// from the channel's stream layout. Any running replay keeps its
    /// player reference until the replay-off notification arrives.
    pub fn on_channel_changed(&self, channel: ChannelInfo) {
        let mut st = self.shared.state.lock();
        st.present = None;
        st.incoming_program = None;
        st.channel_name = channel.name.filter(|n| !n.is_empty());
        st.video = if channel.has_video {
            VideoFormat::Mpg
        } else {
            VideoFormat::None
        };
        let mut audio = AudioFormats::empty();
        if channel.has_mpeg_audio {
            audio |= AudioFormats::MPG;
        }
        if channel.has_dolby {
            audio |= AudioFormats::AC3;
        }
        st.audio = audio;
        st.mode = WatchMode::LiveTv;
        st.update_screen = true;
        st.scroll_offset = 0;
        st.scroll_backward = false;
        tracing::debug!(number = channel.number, "channel switched");
    }

    /// Present-program data for the tuned channel. Adopted on the next
    /// render pass; duplicate pushes for the same event are dropped there.
    pub fn on_program(&self, event: ProgramEvent) {
        self.shared.state.lock().incoming_program = Some(event);
    }

    /// Volume changed on the host, as a raw 0..=255 level.
    pub fn on_volume(&self, value: i32, absolute: bool) {
        self.shared.state.lock().volume.update(value, absolute);
    }

    /// A recording started or stopped on a tuner device.
    pub fn on_recording(&self, device_index: usize, starting: bool) {
        self.shared
            .state
            .lock()
            .recording
            .update(device_index, starting);
    }

    /// A replay started or ended.
    ///
    /// On start the display name is classified into a watch mode, title
    /// and format badges, and `control` is polled each tick for position
    /// and trick-play state. On end the engine falls back to live TV.
    pub fn on_replay(&self, starting: bool, name: &str, control: Option<Box<dyn ReplayControl>>) {
        let mut st = self.shared.state.lock();
        st.update_screen = true;
        if starting {
            let info = ReplayInfo::classify(name);
            tracing::debug!(mode = ?info.mode, title = %info.title, "replay started");
            st.mode = info.mode;
            st.video = info.video;
            st.audio = info.audio;
            st.loop_mode = info.loop_mode;
            st.replay_title = info.title;
            st.replay_generation = st.replay_generation.wrapping_add(1);
            st.replay_time_text = None;
            st.control = control;
        } else {
            tracing::debug!("replay ended");
            st.mode = WatchMode::LiveTv;
            st.control = None;
        }
    }

    /// The active audio track or downmix channel changed.
    pub fn on_audio_track(&self, kind: Option<AudioTrackKind>, channel: AudioChannel) {
        let mut st = self.shared.state.lock();
        st.audio_track = kind;
        st.audio_channel = channel;
    }

    /// The user pressed a key or otherwise touched the host. Feeds the
    /// inactivity gate of the suspend window.
    pub fn on_user_activity(&self) {
        self.shared.state.lock().last_activity = Some(Instant::now());
    }

    /// The host closed its menu; all three overlay slots go away.
    pub fn on_osd_cleared(&self) {
        let mut st = self.shared.state.lock();
        let had =
            st.osd_title.is_some() || st.osd_item.is_some() || st.osd_message.is_some();
        st.osd_title = None;
        st.osd_item = None;
        st.osd_message = None;
        if had {
            st.update_screen = true;
        }
    }

    /// Menu title, shown as the header above the current item.
    pub fn on_osd_title(&self, text: Option<&str>) {
        let text = normalize_osd(text);
        let mut st = self.shared.state.lock();
        let st = &mut *st;
        replace_osd(&mut st.osd_title, &mut st.update_screen, text);
    }

    /// Currently selected menu item.
    pub fn on_osd_current_item(&self, text: Option<&str>) {
        let text = normalize_osd(text);
        let mut st = self.shared.state.lock();
        let st = &mut *st;
        replace_osd(&mut st.osd_item, &mut st.update_screen, text);
    }

    /// Transient status message; outranks every other text source.
    pub fn on_osd_status_message(&self, text: Option<&str>) {
        let text = normalize_osd(text);
        let mut st = self.shared.state.lock();
        let st = &mut *st;
        replace_osd(&mut st.osd_message, &mut st.update_screen, text);
    }

    /// Swap the font file, line layout and face heights in one step.
    ///
    /// On failure the previous faces and layout stay in place.
    pub fn set_font(
        &self,
        path: &Path,
        render_mode: RenderMode,
        big_px: i32,
        small_px: i32,
    ) -> Result<()> {
        let mut st = self.shared.state.lock();
        let mut lcd = self.shared.lcd.lock();
        lcd.set_font(path, big_px, small_px)?;
        st.settings.font = Some(path.to_path_buf());
        st.settings.render_mode = render_mode;
        st.settings.big_font_height = big_px;
        st.settings.small_font_height = small_px;
        st.update_screen = true;
        Ok(())
    }

    /// Replace the settings snapshot, applying what can change at runtime.
    pub fn update_settings(&self, settings: Settings) {
        let settings = settings.sanitized();
        let mut st = self.shared.state.lock();
        let changes = st.settings.diff(&settings);
        if changes.is_empty() {
            return;
        }
        let mut lcd = self.shared.lcd.lock();
        for change in &changes {
            match change {
                SettingsChange::Geometry => {
                    tracing::warn!("panel geometry changes take effect on the next open");
                }
                SettingsChange::DiscStyle => lcd.set_disc_style(settings.disc_style),
                SettingsChange::Font => {
                    match &settings.font {
                        Some(path) => {
                            if let Err(err) = lcd.set_font(
                                path,
                                settings.big_font_height,
                                settings.small_font_height,
                            ) {
                                tracing::warn!(
                                    error = %err,
                                    "font change failed, keeping the loaded faces"
                                );
                            }
                        }
                        None => lcd.clear_fonts(),
                    }
                    st.update_screen = true;
                }
                SettingsChange::RenderMode => st.update_screen = true,
                // Contrast is debounced on the next tick; exit and
                // suspend parameters are read where they apply.
                SettingsChange::Contrast
                | SettingsChange::Exit
                | SettingsChange::Suspend => {}
            }
        }
        st.settings = settings;
        tracing::debug!(changes = changes.len(), "settings updated");
    }

    /// Override one icon (or a whole badge field) on, off or back to
    /// automatic control, returning the override now in effect.
    pub fn force_icon(&self, icons: Icons, state: IconState) -> IconState {
        self.shared.state.lock().force.set(icons, state)
    }

    /// Stop the worker and leave the panel per the configured exit policy.
    pub fn close(&mut self, next_timer: Option<&TimerPreview>) {
        let policy = self.shared.state.lock().settings.on_exit;
        self.shutdown(policy, next_timer);
    }

    /// Stop the worker and leave the panel per an explicit exit policy.
    pub fn shutdown(&mut self, policy: OnExit, next_timer: Option<&TimerPreview>) {
        self.stop_worker();

        let margin = self.shared.state.lock().settings.wakeup_margin_min;
        let mut lcd = self.shared.lcd.lock();
        match policy {
            OnExit::NextTimer => {
                tracing::info!("closing, showing only the next timer");
                lcd.progress_bars(0, 0, 0, 0);
                lcd.clear();
                match next_timer {
                    Some(timer) => {
                        let line = timer_preview_line(timer, Local::now().naive_local());
                        lcd.draw_text(FontSize::Big, 0, 0, &line);
                        lcd.icons(Icons::TIME);
                    }
                    None => {
                        lcd.draw_text(FontSize::Big, 0, 0, "None active timer");
                        lcd.icons(Icons::empty());
                    }
                }
                lcd.flush();
            }
            OnExit::ShowMessage => {
                tracing::info!("closing, leaving the last message standing");
            }
            OnExit::Blank => {
                tracing::info!("closing, turning the backlight off");
                if let Err(err) = lcd.send_shutdown() {
                    tracing::warn!(error = %err, "shutdown command failed");
                }
            }
            OnExit::Wakeup => {
                tracing::info!("closing, arming the hardware wake-up");
                let wake = next_timer
                    .map(|t| t.start - chrono::Duration::minutes(i64::from(margin)));
                if let Err(err) = lcd.send_clock(wake) {
                    tracing::warn!(error = %err, "clock handover failed");
                }
            }
            OnExit::ShowClock => {
                tracing::info!("closing, handing the panel to its builtin clock");
                if let Err(err) = lcd.send_clock(None) {
                    tracing::warn!(error = %err, "clock handover failed");
                }
            }
        }
        lcd.close();
    }

    /// Flag the worker to stop and wait for it, bounded by
    /// [`STOP_TIMEOUT`]. A worker stuck in a device write is detached
    /// rather than joined forever.
    fn stop_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shared.stop.store(true, Ordering::Release);

        let deadline = Instant::now() + STOP_TIMEOUT;
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(STOP_POLL);
        }
        if worker.is_finished() {
            if worker.join().is_err() {
                tracing::error!("watch thread panicked");
            }
        } else {
            tracing::warn!("watch thread did not stop in time, detaching");
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.close(None);
        }
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("running", &self.worker.is_some())
            .finish()
    }
}

/// Worker loop: suspend bookkeeping around the per-tick work.
fn run(shared: &Shared) {
    tracing::debug!("watch thread running");

    let mut sent = SentCache::default();
    let mut suspended = false;
    let mut tick: u32 = 0;

    while !shared.stop.load(Ordering::Acquire) {
        let started = Instant::now();

        let now = Local::now();
        let minute = now.hour() * 60 + now.minute();
        let due = suspend_due(&shared.state.lock(), minute);
        if due != suspended {
            if due {
                tracing::info!("suspend window begins, panel going dark");
                let mut lcd = shared.lcd.lock();
                if let Err(err) = lcd.send_shutdown() {
                    tracing::warn!(error = %err, "suspend shutdown failed");
                }
            } else {
                tracing::info!("suspend window over, waking the panel");
                let mut st = shared.state.lock();
                let mut lcd = shared.lcd.lock();
                lcd.init(st.settings.contrast);
                lcd.invalidate();
                sent.invalidate();
                st.update_screen = true;
            }
            suspended = due;
        }

        if !suspended {
            run_tick(shared, &mut sent, tick);
        }

        let period = if suspended { SUSPEND_TICK } else { ACTIVE_TICK };
        let delay = period.saturating_sub(started.elapsed()).max(MIN_TICK_DELAY);
        thread::sleep(delay);
        tick = tick.wrapping_add(1);
    }

    tracing::debug!("watch thread closed");
}

/// One active tick: icons, text pass, progress bar, debounced sends.
fn run_tick(shared: &Shared, sent: &mut SentCache, tick: u32) {
    let mut st = shared.state.lock();
    let mut lcd = shared.lcd.lock();
    let st = &mut *st;

    let mut icons = st.mode.icons();
    let mut update_icons = false;

    let position = st.control.as_ref().and_then(|c| c.position());

    let rendered = render_screen(st, &mut lcd, position);

    let bottom = match st.mode {
        WatchMode::LiveTv => st.present.as_ref().map_or(0, live_progress),
        _ => match position {
            Some(pos) => {
                let trick = st.control.as_ref().and_then(|c| c.replay_mode());
                let (spin, advance) = ReplayState::classify(trick).spin(tick);
                icons |= spin;
                update_icons = advance;
                icons |= st.loop_mode.icons();

                let total = pos.total.max(1);
                (pos.current * 32 / total).clamp(0, 32) as i32
            }
            None => 0,
        },
    };

    icons |= st.video.icons();
    icons |= st.audio.icons();
    icons |= st.recording.icons();

    if st.volume.is_muted() {
        icons |= Icons::VOLUME;
    } else {
        icons |= speaker_icons(st.audio_track, st.audio_channel);
    }

    if sent.contrast != Some(st.settings.contrast) {
        sent.contrast = Some(st.settings.contrast);
        lcd.contrast(st.settings.contrast);
    }

    icons = st.force.apply(icons);
    if st.force.forced_on().contains(Icons::DISC_RUN_SPIN) {
        update_icons |= tick % 4 == 0;
        icons.remove(Icons::DISC_SPIN_BACKWARD);
    }

    if update_icons || sent.icons != Some(icons) {
        lcd.icons(icons);
        sent.icons = Some(icons);
    }
    if sent.progress != Some(bottom) {
        lcd.progress_bars(0, bottom, 0, bottom);
        sent.progress = Some(bottom);
    }
    if rendered {
        lcd.flush();
    }
}

/// The text pass: pick the line by precedence, draw it, advance the
/// marquee. Returns true when the framebuffer was redrawn.
///
/// Precedence is status message, then menu item, then program title or
/// channel name for live TV, then the replay title. A changed selection
/// forces a redraw and restarts the marquee; the ticking replay-time
/// header repaints without touching the scroll.
fn render_screen(st: &mut EngineState, lcd: &mut Lcd, position: Option<ReplayPosition>) -> bool {
    let mut force = st.update_screen;
    let mut repaint = false;

    if st.osd_message.is_none() && st.osd_item.is_none() {
        if st.mode == WatchMode::LiveTv {
            if let Some(event) = st.incoming_program.take() {
                if st.adopt_program(event) {
                    force = true;
                }
            }
            if st.present_title().is_none() && st.refresh_clock() {
                force = true;
            }
        } else {
            if st.replay_dirty() {
                force = true;
            }
            if st.refresh_replay_time(position) {
                repaint = true;
            }
        }
    }

    let mut offset = st.scroll_offset;
    let mut backward = st.scroll_backward;
    if force {
        offset = 0;
        backward = false;
    }
    if !(force || repaint || offset > 0 || backward) {
        return false;
    }

    lcd.clear();

    let (body, header): (Option<&str>, Option<&str>) =
        if let Some(message) = st.osd_message.as_deref() {
            (Some(message), None)
        } else if let Some(item) = st.osd_item.as_deref() {
            (Some(item), st.osd_title.as_deref())
        } else if st.mode == WatchMode::LiveTv {
            match st.present_title() {
                Some(title) => (Some(title), st.channel_name.as_deref()),
                None => (st.channel_name.as_deref(), st.clock_text.as_deref()),
            }
        } else {
            (Some(st.replay_title.as_str()), st.replay_time_text.as_deref())
        };

    let (line, y) = match st.settings.render_mode {
        RenderMode::SingleLine => (body, 0),
        RenderMode::DualLine => {
            if let Some(header) = header {
                lcd.draw_text(FontSize::Small, 0, 0, header);
            }
            (body, lcd.font_height(FontSize::Small))
        }
        RenderMode::TopicOnly => (header.or(body), 0),
    };

    if let Some(line) = line {
        let outcome = lcd.draw_text(FontSize::Big, -offset, y, line);
        match outcome {
            DrawOutcome::Fit if offset <= 0 => {
                offset = 0;
                backward = false;
            }
            DrawOutcome::Fit | DrawOutcome::Truncated => {
                if outcome == DrawOutcome::Fit {
                    backward = true;
                }
                offset += if backward { -2 } else { 2 };
                if offset < 0 {
                    offset = 0;
                    backward = false;
                }
            }
            DrawOutcome::NoFont => {
                offset = 0;
                backward = false;
            }
        }
    }

    st.scroll_offset = offset;
    st.scroll_backward = backward;
    st.update_screen = false;
    true
}

/// Progress through the present program, in bar pixels (0..=32).
fn live_progress(event: &ProgramEvent) -> i32 {
    if event.end <= event.start {
        return 0;
    }
    let now = Utc::now().timestamp();
    ((now - event.start) * 32 / (event.end - event.start)).clamp(0, 32) as i32
}

fn suspend_due(st: &EngineState, minute: u32) -> bool {
    let s = &st.settings;
    match s.suspend_mode {
        SuspendMode::Never => false,
        SuspendMode::Always => {
            clock_window_contains(s.suspend_begin_min, s.suspend_end_min, minute)
        }
        SuspendMode::WhenInactive => {
            st.user_idle() && clock_window_contains(s.suspend_begin_min, s.suspend_end_min, minute)
        }
    }
}

/// Whether `minute` falls inside a daily window that may wrap midnight.
/// A window with equal ends is empty.
fn clock_window_contains(begin: u32, end: u32, minute: u32) -> bool {
    if begin == end {
        return false;
    }
    if begin < end {
        minute >= begin && minute < end
    } else {
        minute >= begin || minute < end
    }
}

fn format_hms(seconds: i64) -> String {
    let s = seconds.max(0);
    format!("{}:{:02}:{:02}", s / 3600, s / 60 % 60, s % 60)
}

/// The line the timer-preview exit policy leaves on the panel. Timers
/// more than a day out get the day of month in front.
fn timer_preview_line(timer: &TimerPreview, now: NaiveDateTime) -> String {
    if timer.start - now > chrono::Duration::hours(24) {
        format!(
            "{}. {:02}:{:02} {}",
            timer.start.day(),
            timer.start.hour(),
            timer.start.minute(),
            timer.title
        )
    } else {
        format!(
            "{:02}:{:02} {}",
            timer.start.hour(),
            timer.start.minute(),
            timer.title
        )
    }
}

/// Replace an overlay slot, marking `dirty` on any visible change.
/// Re-pushing identical text is not a change.
fn replace_osd(slot: &mut Option<String>, dirty: &mut bool, text: Option<String>) {
    if let (Some(current), Some(new)) = (slot.as_deref(), text.as_deref()) {
        if current == new {
            return;
        }
    }
    if slot.take().is_some() {
        *dirty = true;
    }
    if let Some(new) = text {
        *slot = Some(new);
        *dirty = true;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io;

    struct Sink;

    impl Transport for Sink {
        fn send(&mut self, packet: &[u8; crate::proto::PACKET_LEN]) -> io::Result<usize> {
            Ok(packet.len())
        }
    }

    /// Panel over a discarding transport with a real system face loaded.
    /// None (and the callers skip themselves) when the machine has none.
    fn test_lcd() -> Option<Lcd> {
        let settings = Settings {
            font: Some(crate::font::system_font_path()?),
            ..Settings::default()
        };
        Some(Lcd::with_transport(
            Box::new(Sink),
            Protocol::Ffdc,
            &settings,
        ))
    }

    fn event(id: u32, title: Option<&str>, start: i64, end: i64) -> ProgramEvent {
        ProgramEvent {
            id,
            title: title.map(str::to_owned),
            short_title: None,
            start,
            end,
        }
    }

    #[test]
    fn suspend_window_wraps_past_midnight() {
        assert!(!clock_window_contains(0, 0, 30));
        assert!(clock_window_contains(60, 120, 60));
        assert!(clock_window_contains(60, 120, 119));
        assert!(!clock_window_contains(60, 120, 120));
        // 23:00 to 06:00 covers midnight but not noon.
        assert!(clock_window_contains(1380, 360, 1439));
        assert!(clock_window_contains(1380, 360, 0));
        assert!(clock_window_contains(1380, 360, 359));
        assert!(!clock_window_contains(1380, 360, 720));
    }

    #[test]
    fn suspend_schedule_honors_mode_and_activity() {
        let settings = Settings {
            suspend_begin_min: 0,
            suspend_end_min: 1439,
            ..Settings::default()
        };
        let mut st = EngineState::new(settings);

        st.settings.suspend_mode = SuspendMode::Never;
        assert!(!suspend_due(&st, 600));

        st.settings.suspend_mode = SuspendMode::Always;
        assert!(suspend_due(&st, 600));
        assert!(!suspend_due(&st, 1439));

        st.settings.suspend_mode = SuspendMode::WhenInactive;
        assert!(suspend_due(&st, 600));
        st.last_activity = Some(Instant::now());
        assert!(!suspend_due(&st, 600));
    }

    #[test]
    fn replay_times_format_as_hours_minutes_seconds() {
        assert_eq!(format_hms(0), "0:00:00");
        assert_eq!(format_hms(59), "0:00:59");
        assert_eq!(format_hms(61), "0:01:01");
        assert_eq!(format_hms(3600), "1:00:00");
        assert_eq!(format_hms(7325), "2:02:05");
        assert_eq!(format_hms(-5), "0:00:00");
    }

    #[test]
    fn timer_preview_shows_the_day_when_further_out() {
        let now = NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let soon = TimerPreview {
            start: NaiveDate::from_ymd_opt(2026, 3, 14)
                .unwrap()
                .and_hms_opt(20, 15, 0)
                .unwrap(),
            title: "News".into(),
        };
        assert_eq!(timer_preview_line(&soon, now), "20:15 News");

        let far = TimerPreview {
            start: NaiveDate::from_ymd_opt(2026, 3, 16)
                .unwrap()
                .and_hms_opt(8, 5, 0)
                .unwrap(),
            title: "Movie".into(),
        };
        assert_eq!(timer_preview_line(&far, now), "16. 08:05 Movie");
    }

    #[test]
    fn osd_slots_ignore_repeated_identical_text() {
        let mut slot = None;
        let mut dirty = false;

        replace_osd(&mut slot, &mut dirty, Some("Hello".into()));
        assert!(dirty);
        assert_eq!(slot.as_deref(), Some("Hello"));

        dirty = false;
        replace_osd(&mut slot, &mut dirty, Some("Hello".into()));
        assert!(!dirty);

        replace_osd(&mut slot, &mut dirty, Some("World".into()));
        assert!(dirty);
        assert_eq!(slot.as_deref(), Some("World"));

        dirty = false;
        replace_osd(&mut slot, &mut dirty, None);
        assert!(dirty);
        assert!(slot.is_none());

        dirty = false;
        replace_osd(&mut slot, &mut dirty, None);
        assert!(!dirty);
    }

    #[test]
    fn program_adoption_drops_duplicate_events() {
        let mut st = EngineState::new(Settings::default());
        let ev = event(7, Some("Show"), 1000, 2000);
        assert!(st.adopt_program(ev.clone()));
        assert!(!st.adopt_program(ev));
        assert!(st.adopt_program(event(8, Some("Next"), 2000, 3000)));

        // Events without a start time are adopted over and over.
        let open_end = event(9, None, 0, 0);
        assert!(st.adopt_program(open_end.clone()));
        assert!(st.adopt_program(open_end));
    }

    #[test]
    fn live_progress_clamps_to_the_bar_range() {
        let now = Utc::now().timestamp();
        let halfway = event(1, None, now - 50, now + 50);
        let p = live_progress(&halfway);
        assert!((14..=18).contains(&p), "got {p}");

        assert_eq!(live_progress(&event(2, None, now - 100, now - 50)), 32);
        assert_eq!(live_progress(&event(3, None, now + 100, now + 200)), 0);
        assert_eq!(live_progress(&event(4, None, now, now)), 0);
    }

    #[test]
    fn replay_time_header_updates_only_on_change() {
        let mut st = EngineState::new(Settings::default());
        let pos = ReplayPosition {
            current: 61,
            total: 3600,
        };
        assert!(st.refresh_replay_time(Some(pos)));
        assert_eq!(st.replay_time_text.as_deref(), Some("0:01:01 / 1:00:00"));
        assert!(!st.refresh_replay_time(Some(pos)));
        assert!(st.refresh_replay_time(Some(ReplayPosition {
            current: 62,
            total: 3600,
        })));
        assert!(st.refresh_replay_time(None));
        assert!(st.replay_time_text.is_none());
    }

    #[test]
    fn clock_header_refreshes_once_per_minute() {
        let mut st = EngineState::new(Settings::default());
        assert!(st.refresh_clock());
        assert!(st.clock_text.is_some());
        assert!(!st.refresh_clock());
    }

    #[test]
    fn long_titles_scroll_and_spring_back() {
        let Some(mut lcd) = test_lcd() else {
            eprintln!("skipping: no system font found");
            return;
        };
        let mut st = EngineState::new(Settings::default());
        st.osd_message =
            Some("A ridiculously long status message that cannot possibly fit".into());

        // Forced first pass resets the scroll and reports truncation.
        assert!(render_screen(&mut st, &mut lcd, None));
        assert_eq!(st.scroll_offset, 2);
        assert!(!st.scroll_backward);

        let mut seen_backward = false;
        let mut parked = false;
        for _ in 0..4000 {
            render_screen(&mut st, &mut lcd, None);
            seen_backward |= st.scroll_backward;
            if st.scroll_offset == 0 && !st.scroll_backward {
                parked = true;
                break;
            }
        }
        assert!(seen_backward, "marquee never turned around");
        assert!(parked, "marquee never came back to rest");

        // At rest nothing forces a redraw anymore.
        assert!(!render_screen(&mut st, &mut lcd, None));
    }

    #[test]
    fn replay_time_tick_does_not_restart_the_marquee() {
        let Some(mut lcd) = test_lcd() else {
            eprintln!("skipping: no system font found");
            return;
        };
        let mut st = EngineState::new(Settings::default());
        st.mode = WatchMode::ReplayNormal;
        st.replay_title =
            "An extremely long recording title that needs the marquee".into();

        let first = ReplayPosition {
            current: 1,
            total: 100,
        };
        assert!(render_screen(&mut st, &mut lcd, Some(first)));
        let moving = st.scroll_offset;
        assert!(moving > 0);

        // A new elapsed time repaints but keeps the scroll going.
        let second = ReplayPosition {
            current: 2,
            total: 100,
        };
        assert!(render_screen(&mut st, &mut lcd, Some(second)));
        assert!(st.scroll_offset > moving);
    }

    #[test]
    fn short_titles_render_without_scrolling() {
        let Some(mut lcd) = test_lcd() else {
            eprintln!("skipping: no system font found");
            return;
        };
        let mut st = EngineState::new(Settings::default());
        st.osd_message = Some("Hi".into());

        assert!(render_screen(&mut st, &mut lcd, None));
        assert_eq!(st.scroll_offset, 0);
        assert!(!st.scroll_backward);
        assert!(!render_screen(&mut st, &mut lcd, None));
    }

    #[test]
    fn missing_font_renders_without_panicking() {
        let mut lcd = Lcd::with_transport(Box::new(Sink), Protocol::Ffdc, &Settings::default());
        let mut st = EngineState::new(Settings::default());
        st.osd_message = Some("text without a face".into());
        assert!(render_screen(&mut st, &mut lcd, None));
        assert_eq!(st.scroll_offset, 0);
    }
}
