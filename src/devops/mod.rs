//! Real-time pipeline log broadcasting.
//!
//! Producers publish through a [`LogBroadcaster`]; every connected observer
//! owns a [`Subscription`] drained by a [`StreamingSession`].

mod broadcaster;
mod event;
mod session;
mod subscription;

pub use broadcaster::{LogBroadcaster, DEFAULT_MAILBOX_CAPACITY};
pub use event::{EventKind, PipelineEvent};
pub use session::{
    encode_frame, EndReason, FrameSink, SessionEnd, SessionError, StreamingSession,
    KEEP_ALIVE_FRAME,
};
pub use subscription::{SubscriberId, Subscription};
