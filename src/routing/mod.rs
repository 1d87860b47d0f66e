//! Path allow-list: resource matching and per-resource method authorization.

pub mod authorization;
pub mod resource;

pub use authorization::MethodAuthorizer;
pub use resource::{LookupType, Resource, ResourceMatch, ResourceMatcher};
