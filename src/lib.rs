//! Rendering and protocol engine for SoundGraph iMON front-panel LCDs
//!
//! Drives the 96x16 monochrome panels built into iMON-equipped HTPC cases
//! over their raw character device. The crate owns the wire protocol
//! (eight-byte command packets in two addressing variants), a 1-bit
//! framebuffer with change-tracked flushing, TTF rasterization for the
//! one- or two-line text layout, and a background engine that animates
//! icons, progress bars and a text marquee from the state a host
//! application pushes in.
//!
//! Most hosts only need [`Watch`]:
//!
//! ```no_run
//! use std::path::Path;
//! use imonlcd::{Protocol, Settings, Watch};
//!
//! # fn main() -> imonlcd::Result<()> {
//! let mut watch = Watch::open(Path::new("/dev/lcd0"), Protocol::Ffdc, Settings::default())?;
//! watch.on_volume(128, true);
//! // ... feed channel, replay and OSD events as they happen ...
//! watch.close(None);
//! # Ok(())
//! # }
//! ```
//!
//! [`Lcd`] is the lower layer for hosts that draw frames themselves.

pub mod bitmap;
pub mod config;
pub mod device;
pub mod error;
pub mod font;
pub mod proto;
pub mod state;
pub mod watch;

pub use bitmap::Bitmap;
pub use config::{OnExit, RenderMode, Settings, SettingsChange, SuspendMode};
pub use device::{DevFile, FlushOutcome, FontSize, Lcd, Transport};
pub use error::{Error, Result};
pub use font::{DrawOutcome, Font, Glyph};
pub use proto::{DiscStyle, Icons, Protocol};
pub use state::{
    AudioChannel, AudioFormats, AudioTrackKind, ChannelInfo, IconState, LoopMode, ProgramEvent,
    ReplayControl, ReplayPosition, ReplayTrick, VideoFormat, WatchMode,
};
pub use watch::{TimerPreview, Watch};
