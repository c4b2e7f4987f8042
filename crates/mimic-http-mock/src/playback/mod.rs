//! Playback listener: answers client requests from stored scenarios.
//!
//! Lookup outcomes map to statuses as follows: a selected scenario answers
//! with its own status, no structurally compatible scenario gives 404, a
//! validation mismatch gives 400 with the mismatch list, and any other
//! failure gives 500.

mod controls;
mod handler;
mod server;

pub use controls::{
    PlaybackControls, GROUP_HEADER, PATH_HEADER, RECORDED_HEADER, RECORD_HEADER,
    REQUEST_COUNT_HEADER, RESPONSE_STATUS_HEADER, SCENARIO_HEADER, URL_HEADER,
    WAIT_BEFORE_REPLY_HEADER,
};
pub use handler::handle_playback_request;
pub use server::PlaybackServer;
