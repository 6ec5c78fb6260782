//! ABOUTME: Repository modules providing validated operations per entity kind
//! ABOUTME: Each repository composes a collection with validation and events

pub mod application_versions;
pub mod applications;
pub mod groups;
pub mod metrics;
pub mod users;
