//! Read model views over the app event streams.

pub mod contributors;
pub mod schema_index;

pub use contributors::{Contributor, ContributorsView};
pub use schema_index::{SchemaEntry, SchemaIndexView};
