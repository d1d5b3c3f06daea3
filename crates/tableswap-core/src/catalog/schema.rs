//! Schema bundle - versioned snapshot of registered entities.

use super::entity::{EntityDef, EntityIdent};
use super::resolver::Catalog;
use crate::error::Error;
use rkyv::Archive;
use serde::{Deserialize, Serialize};

/// Current time in microseconds since the Unix epoch.
pub(crate) fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// A versioned snapshot of the entity catalog.
#[derive(
    Debug, Clone, PartialEq, Archive, rkyv::Serialize, rkyv::Deserialize, Serialize, Deserialize,
)]
pub struct SchemaBundle {
    /// Schema version (monotonically increasing).
    #[serde(default)]
    pub version: u64,
    /// Creation timestamp (microseconds since Unix epoch).
    #[serde(default)]
    pub created_at: u64,
    /// Entity definitions in registration order.
    #[serde(default)]
    pub entities: Vec<EntityDef>,
}

impl SchemaBundle {
    /// Create an empty schema bundle.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            created_at: current_timestamp(),
            entities: Vec::new(),
        }
    }

    /// Add an entity, replacing any entity with the same identifier.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        let ident = entity.ident();
        self.entities.retain(|e| !e.ident().refers_to(&ident));
        self.entities.push(entity);
        self
    }

    /// Get an entity by identifier (case-insensitive).
    pub fn entity(&self, ident: &EntityIdent) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.ident().refers_to(ident))
    }

    /// Parse a schema bundle from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Render the schema bundle as pretty JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Serialize the schema bundle to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a schema bundle from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

impl Default for SchemaBundle {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Catalog for SchemaBundle {
    fn get_entity(&self, ident: &EntityIdent) -> Result<Option<EntityDef>, Error> {
        Ok(self.entity(ident).cloned())
    }

    fn entities(&self) -> Result<Vec<EntityDef>, Error> {
        Ok(self.entities.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;

    fn sample_schema() -> SchemaBundle {
        let user = EntityDef::new("auth", "User")
            .with_field(FieldDef::scalar("id"))
            .with_field(FieldDef::scalar("username"));

        let model = EntityDef::new("myapp", "MyModel")
            .with_field(FieldDef::scalar("id"))
            .with_field(FieldDef::foreign_key("owner", user.ident()));

        SchemaBundle::new(1).with_entity(user).with_entity(model)
    }

    #[test]
    fn test_schema_bundle_builder() {
        let schema = sample_schema();

        assert_eq!(schema.version, 1);
        assert_eq!(schema.entities.len(), 2);
        assert!(schema.entity(&EntityIdent::new("auth", "user")).is_some());
        assert!(schema.entity(&EntityIdent::new("auth", "Group")).is_none());
    }

    #[test]
    fn test_with_entity_replaces() {
        let schema = sample_schema().with_entity(EntityDef::new("auth", "user").with_table("users"));

        assert_eq!(schema.entities.len(), 2);
        assert_eq!(
            schema
                .entity(&EntityIdent::new("auth", "User"))
                .unwrap()
                .table_name(),
            "users"
        );
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "entities": [
                {"namespace": "auth", "name": "User",
                 "fields": [{"name": "id", "kind": "scalar"}]},
                {"namespace": "myapp", "name": "MyModel",
                 "fields": [{"name": "owner", "kind": "foreign_key", "target": "auth.User"}]}
            ]
        }"#;
        let schema = SchemaBundle::from_json(json).unwrap();

        assert_eq!(schema.entities.len(), 2);
        assert_eq!(schema.entities[0].primary_key, "id");
        assert_eq!(schema.entities[1].columns(), vec!["id", "owner_id"]);

        assert!(SchemaBundle::from_json("{not json").is_err());
    }

    #[test]
    fn test_bytes_preserve_entities() {
        let schema = sample_schema();
        let decoded = SchemaBundle::from_bytes(&schema.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, schema);
    }
}
