//! Announcement playback: scheduling, dispatch and the display projection

pub mod dispatcher;
pub mod display;
pub mod events;
pub mod scheduler;

pub use dispatcher::{AnnouncementDispatcher, DispatcherSettings};
pub use display::{DisplayProjection, DisplayedCall};
pub use events::{dispatch_channel, DispatchInput, DispatchReceiver, DispatchSender, SessionId};
pub use scheduler::{PlaybackOutcome, PlaybackScheduler};
