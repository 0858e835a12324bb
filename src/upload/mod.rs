//! Upload module for voxlink
//!
//! Hand-framed multipart/form-data over a streamed HTTP body, plus the
//! connectivity probe against the agent server's status endpoint.

pub mod client;
pub mod multipart;

pub use client::{
    AgentClient, ServerReply, UploadError, UploadProgress, AGENT_FIELD, AUDIO_CONTENT_TYPE,
    AUDIO_FIELD, AUDIO_FILENAME,
};
pub use multipart::{Boundary, UploadPlan};
