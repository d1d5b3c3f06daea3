//! The catalog capability and entity resolution.

use super::entity::{EntityDef, EntityDescriptor, EntityIdent};
use super::field::FieldDef;
use crate::error::Error;
use crate::swap::SwapError;

/// Read access to registered entity definitions.
///
/// Implementors provide lookups; resolution of descriptors, auto-created join
/// entities and fallback naming is shared by the provided methods.
pub trait Catalog {
    /// Get a registered entity definition.
    fn get_entity(&self, ident: &EntityIdent) -> Result<Option<EntityDef>, Error>;

    /// All registered entity definitions, in registration order.
    fn entities(&self) -> Result<Vec<EntityDef>, Error>;

    /// Resolve an identifier to its current table and columns.
    ///
    /// Auto-created join entities (`namespace.Owner_field`) resolve through
    /// their owner's many-to-many field.
    fn resolve(&self, ident: &EntityIdent) -> Result<EntityDescriptor, SwapError> {
        if let Some(entity) = self.get_entity(ident)? {
            return Ok(entity.descriptor());
        }
        if let Some((owner, field)) = find_join_owner(self, ident)? {
            if let Some(descriptor) = owner.join_descriptor(&field) {
                return Ok(descriptor);
            }
        }
        Err(SwapError::EntityNotFound {
            entity: ident.to_string(),
        })
    }

    /// List the fields of an entity, including auto-created join entities.
    fn list_fields(&self, ident: &EntityIdent) -> Result<Vec<FieldDef>, SwapError> {
        if let Some(entity) = self.get_entity(ident)? {
            return Ok(entity.fields);
        }
        if let Some((owner, field)) = find_join_owner(self, ident)? {
            if let Some(fields) = owner.join_fields(&field) {
                return Ok(fields);
            }
        }
        Err(SwapError::EntityNotFound {
            entity: ident.to_string(),
        })
    }

    /// Table name for naming purposes.
    ///
    /// Falls back to the name derived from the identifier when the entity is
    /// not registered, e.g. a join table of a swapped-out entity.
    fn table_name(&self, ident: &EntityIdent) -> Result<String, SwapError> {
        match self.resolve(ident) {
            Ok(descriptor) => Ok(descriptor.table_name),
            Err(SwapError::EntityNotFound { .. }) => Ok(ident.default_table_name()),
            Err(e) => Err(e),
        }
    }

    /// Primary key column for naming purposes, `id` when unresolvable.
    fn primary_key(&self, ident: &EntityIdent) -> Result<String, SwapError> {
        match self.resolve(ident) {
            Ok(descriptor) => Ok(descriptor.primary_key),
            Err(SwapError::EntityNotFound { .. }) => Ok("id".to_string()),
            Err(e) => Err(e),
        }
    }
}

/// Find the entity and many-to-many field behind a join identifier.
fn find_join_owner<C: Catalog + ?Sized>(
    catalog: &C,
    ident: &EntityIdent,
) -> Result<Option<(EntityDef, FieldDef)>, Error> {
    for entity in catalog.entities()? {
        if !entity.namespace.eq_ignore_ascii_case(&ident.namespace) {
            continue;
        }
        let found = entity
            .many_to_many_fields()
            .find(|f| entity.ident().join(&f.name).refers_to(ident))
            .cloned();
        if let Some(field) = found {
            return Ok(Some((entity, field)));
        }
    }
    Ok(None)
}

impl<C: Catalog + ?Sized> Catalog for &C {
    fn get_entity(&self, ident: &EntityIdent) -> Result<Option<EntityDef>, Error> {
        (**self).get_entity(ident)
    }

    fn entities(&self) -> Result<Vec<EntityDef>, Error> {
        (**self).entities()
    }
}
