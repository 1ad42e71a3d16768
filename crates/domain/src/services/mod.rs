//! Domain services for the Agora social core.
//!
//! Engines hold no state of their own beyond a store handle; every decision is
//! made on rows read during the call.

pub mod content;
pub mod events;
pub mod feed;
pub mod follow;
pub mod membership;
pub mod social;
pub mod succession;
pub mod visibility;

pub use content::ContentEngine;
pub use events::{
    EventSink, MembershipEvent, MembershipEventKind, RecordingEventSink, TracingEventSink,
};
pub use feed::{FeedComposer, FeedOptions, DEFAULT_FEED_BATCH_SIZE};
pub use follow::FollowEngine;
pub use membership::MembershipEngine;
pub use social::SocialService;
pub use succession::{
    run_succession, select_successor, Departure, SuccessionEngine, SuccessionOutcome,
};
pub use visibility::{Disclosure, DisclosureRule, VisibilityEngine};
