//! Entity catalog for tableswap.
//!
//! The catalog records which entities exist, where they are stored, and which
//! fields relate them to each other.

mod entity;
mod field;
pub mod naming;
mod resolver;
mod schema;
mod store;

pub use entity::{EntityDef, EntityDescriptor, EntityIdent, ParseIdentError};
pub use field::{FieldDef, FieldKind};
pub use resolver::Catalog;
pub use schema::SchemaBundle;
pub use store::CatalogStore;
