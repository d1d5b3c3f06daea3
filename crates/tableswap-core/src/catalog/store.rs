//! Persistent catalog holding versioned schema bundles.
//!
//! Every imported bundle is kept under its version number so a catalog can be
//! inspected as it stood before an entity was swapped out. Lookups through
//! [`Catalog`] always go to the head version.

use super::entity::{EntityDef, EntityIdent};
use super::resolver::Catalog;
use super::schema::SchemaBundle;
use crate::error::Error;
use parking_lot::RwLock;
use sled::{Db, Tree};
use std::path::Path;
use tracing::info;

const BUNDLES_TREE: &str = "tableswap:bundles";
const STATE_TREE: &str = "tableswap:state";
const HEAD_KEY: &[u8] = b"head";

fn version_key(version: u64) -> [u8; 8] {
    version.to_be_bytes()
}

fn decode_version(bytes: &[u8]) -> Option<u64> {
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}

/// A sled-backed catalog of entity definitions.
pub struct CatalogStore {
    db: Db,
    bundles: Tree,
    state: Tree,
    head: RwLock<Option<SchemaBundle>>,
}

impl CatalogStore {
    /// Open a catalog inside an existing sled database.
    pub fn open(db: &Db) -> Result<Self, Error> {
        let bundles = db.open_tree(BUNDLES_TREE)?;
        let state = db.open_tree(STATE_TREE)?;

        let head = match state.get(HEAD_KEY)?.and_then(|v| decode_version(&v)) {
            Some(version) => bundles
                .get(version_key(version))?
                .map(|bytes| SchemaBundle::from_bytes(&bytes))
                .transpose()?,
            None => None,
        };

        Ok(Self {
            db: db.clone(),
            bundles,
            state,
            head: RwLock::new(head),
        })
    }

    /// Open (or create) a catalog database directory.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open(&sled::open(path)?)
    }

    /// Head version, 0 while nothing has been imported.
    pub fn current_version(&self) -> u64 {
        self.head.read().as_ref().map_or(0, |b| b.version)
    }

    /// The head schema bundle.
    pub fn current_schema(&self) -> Option<SchemaBundle> {
        self.head.read().clone()
    }

    /// A stored bundle by version.
    pub fn schema_at_version(&self, version: u64) -> Result<Option<SchemaBundle>, Error> {
        self.bundles
            .get(version_key(version))?
            .map(|bytes| SchemaBundle::from_bytes(&bytes))
            .transpose()
    }

    /// Store `bundle` as the next version and make it the head.
    ///
    /// The bundle's own version number is replaced; the assigned one is
    /// returned.
    pub fn apply_schema(&self, mut bundle: SchemaBundle) -> Result<u64, Error> {
        let mut head = self.head.write();
        let version = head.as_ref().map_or(0, |b| b.version) + 1;
        bundle.version = version;

        self.bundles.insert(version_key(version), bundle.to_bytes()?)?;
        self.state.insert(HEAD_KEY, &version_key(version))?;

        info!(version, entities = bundle.entities.len(), "catalog version applied");
        *head = Some(bundle);
        Ok(version)
    }

    /// Parse a JSON schema bundle and apply it.
    pub fn import_json(&self, json: &str) -> Result<u64, Error> {
        self.apply_schema(SchemaBundle::from_json(json)?)
    }

    /// Stored versions in ascending order.
    pub fn list_versions(&self) -> Result<Vec<u64>, Error> {
        let mut versions = Vec::new();
        for key in self.bundles.iter().keys() {
            versions.extend(decode_version(&key?));
        }
        Ok(versions)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }
}

impl Catalog for CatalogStore {
    fn get_entity(&self, ident: &EntityIdent) -> Result<Option<EntityDef>, Error> {
        Ok(self
            .head
            .read()
            .as_ref()
            .and_then(|b| b.entity(ident).cloned()))
    }

    fn entities(&self) -> Result<Vec<EntityDef>, Error> {
        Ok(self
            .head
            .read()
            .as_ref()
            .map(|b| b.entities.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;

    fn user() -> EntityIdent {
        EntityIdent::new("auth", "User")
    }

    fn before_swap() -> SchemaBundle {
        SchemaBundle::new(0)
            .with_entity(EntityDef::new("auth", "User").with_field(FieldDef::scalar("username")))
            .with_entity(
                EntityDef::new("accounts", "MyUser").with_field(FieldDef::scalar("username")),
            )
            .with_entity(
                EntityDef::new("myapp", "OtherModel")
                    .with_field(FieldDef::many_to_many("owners", user())),
            )
    }

    fn after_swap() -> SchemaBundle {
        let myuser = EntityIdent::new("accounts", "MyUser");
        SchemaBundle::new(0)
            .with_entity(
                EntityDef::new("accounts", "MyUser").with_field(FieldDef::scalar("username")),
            )
            .with_entity(
                EntityDef::new("myapp", "OtherModel")
                    .with_field(FieldDef::many_to_many("owners", myuser)),
            )
    }

    fn temporary() -> CatalogStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        CatalogStore::open(&db).unwrap()
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = temporary();

        assert_eq!(catalog.current_version(), 0);
        assert!(catalog.current_schema().is_none());
        assert!(catalog.entities().unwrap().is_empty());
        assert!(catalog.list_versions().unwrap().is_empty());
    }

    #[test]
    fn test_versions_track_a_swap() {
        let catalog = temporary();

        assert_eq!(catalog.apply_schema(before_swap()).unwrap(), 1);
        assert!(catalog.get_entity(&user()).unwrap().is_some());

        assert_eq!(catalog.apply_schema(after_swap()).unwrap(), 2);
        assert!(catalog.get_entity(&user()).unwrap().is_none());
        assert_eq!(catalog.list_versions().unwrap(), vec![1, 2]);

        // The swapped-out entity is still visible in the earlier version.
        let earlier = catalog.schema_at_version(1).unwrap().unwrap();
        assert!(earlier.entity(&user()).is_some());
        assert!(catalog.schema_at_version(3).unwrap().is_none());

        // Join entities resolve against the head version.
        let join = catalog
            .resolve(&EntityIdent::new("myapp", "OtherModel_owners"))
            .unwrap();
        assert_eq!(join.columns, vec!["id", "othermodel_id", "myuser_id"]);
    }

    #[test]
    fn test_import_json() {
        let catalog = temporary();
        let version = catalog
            .import_json(r#"{"version": 40, "entities": [{"namespace": "auth", "name": "User"}]}"#)
            .unwrap();

        assert_eq!(version, 1);
        assert_eq!(catalog.current_schema().unwrap().version, 1);
        assert!(catalog.import_json("{not json").is_err());
        assert_eq!(catalog.current_version(), 1);
    }

    #[test]
    fn test_reopen_restores_head() {
        let dir = tempfile::tempdir().unwrap();

        {
            let catalog = CatalogStore::open_path(dir.path()).unwrap();
            catalog.apply_schema(before_swap()).unwrap();
            catalog.apply_schema(after_swap()).unwrap();
            catalog.flush().unwrap();
        }

        let catalog = CatalogStore::open_path(dir.path()).unwrap();
        assert_eq!(catalog.current_version(), 2);
        assert_eq!(
            catalog.table_name(&EntityIdent::new("accounts", "MyUser")).unwrap(),
            "accounts_myuser"
        );
        assert!(catalog.get_entity(&user()).unwrap().is_none());
    }
}
