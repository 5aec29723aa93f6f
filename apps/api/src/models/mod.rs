pub mod prompt;
pub mod upload;

pub use prompt::{CompleteResponse, PromptRequest};
pub use upload::{ResumeStatusResponse, UploadResponse};
