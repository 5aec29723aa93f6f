pub mod handlers;
pub mod session;

pub use session::{ChatMessage, ChatSession, FrameDecoder, RelayFrame, ReplyState, Role};
