//! Streaming relay from the inference backend to the browser.

pub mod reframer;
pub mod sse;

pub use reframer::{reframe, DeltaEvent, LinePolicy, Reframer, RelayOptions};
pub use sse::{event_stream_response, relay_frames, TerminalEvent};
