//! Record mode: capture real upstream traffic as replayable scenarios.
//!
//! When a playback request matches no scenario and recording is active
//! (globally through config, or per request with `X-Mock-Record: true`), the
//! request is forwarded to the upstream and the response is saved as a new
//! scenario. The next identical request replays it.
//!
//! # Module Structure
//!
//! - `types` - forwarded request, captured response, errors
//! - `scenario_generator` - turns an exchange into a scenario
//! - `recorder` - upstream client and save path

mod recorder;
mod scenario_generator;
mod types;

pub use recorder::Recorder;
pub use scenario_generator::{generate_scenario, GeneratorOptions};
pub use types::{RecordError, RecordOutcome, RecordedResponse, UpstreamRequest};
