//! Core Data Type Definitions
//!
//! Provider-agnostic data structures used across the orchestration path,
//! organized by concern:
//!
//! - **`message`** - Conversation turns (`Message`, `MessageRole`)
//! - **`model`** - Registry entries and tenant policies (`ModelDescriptor`,
//!   `ProviderKind`, `TenantAccessPolicy`)
//! - **`request`** - Inference requests, priorities and lifecycle states
//! - **`response`** - The normalized inference result
//!
//! Everything here is plain data: no I/O, no locks. The orchestrator owns a
//! request for its whole lifetime; descriptors are immutable once the registry
//! is built.

pub mod message;
pub mod model;
pub mod request;
pub mod response;

pub use message::{Message, MessageRole};
pub use model::{ModelDescriptor, ProviderKind, TenantAccessPolicy};
pub use request::{InferenceRequest, RequestPriority, RequestState};
pub use response::InferenceResult;
