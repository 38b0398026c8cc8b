//! Annotation model, persistence services and the optimistic store

mod registry;
mod remote;
mod service;
mod sqlite;
mod store;
mod types;

pub use registry::{RequirementBadge, RequirementInfo, RequirementRegistry, StaticRequirementRegistry};
pub use remote::RemoteAnnotationService;
pub use service::{AnnotationService, CreateContext, ServiceError};
pub use sqlite::{AnnotationRepository, SqliteAnnotationService};
pub use store::{
    effective_state, AnnotationStore, MutationHandle, PendingMutation, PendingOp, StoreEvent,
};
pub use types::*;

#[cfg(test)]
pub(crate) use service::mock::MockAnnotationService;
