//! Property catalog: registration-time schemas for record types.
//!
//! A record type describes its persistable fields once, through a
//! [`Schema`] built from plain accessor functions. The catalog erases that
//! schema into a [`TypeSchema`] keyed by a stable type name, which is what
//! gets written into collection definitions. Two different Rust types may
//! use the same stable name in different catalogs; this is how an
//! application evolves a record type without losing stored data.
//!
//! # Example
//!
//! ```rust
//! use docstash_core::{PropertyCatalog, Record, Schema};
//!
//! #[derive(Default)]
//! struct Player {
//!     id: String,
//!     name: String,
//!     health: u32,
//! }
//!
//! impl Record for Player {
//!     fn schema() -> Schema<Self> {
//!         Schema::<Self>::new("Player")
//!             .collection("players")
//!             .id("id", |p| &p.id, |p| &mut p.id)
//!             .field("name", |p| &p.name, |p| &mut p.name)
//!             .field("health", |p| &p.health, |p| &mut p.health)
//!     }
//! }
//!
//! let catalog = PropertyCatalog::new();
//! catalog.register::<Player>().unwrap();
//! assert_eq!(catalog.identifier_field_for("Player").as_deref(), Some("id"));
//! ```

use crate::error::{CoreError, CoreResult};
use crate::id::DocumentId;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// A type-erased record instance.
pub type Payload = Box<dyn Any + Send + Sync>;

/// A type that can be stored as a document.
pub trait Record: Default + Send + Sync + 'static {
    /// Describes the persistable fields of this type.
    fn schema() -> Schema<Self>;
}

/// A value usable as a document identifier.
pub trait Identifier: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Returns true when no identifier has been assigned yet.
    fn is_unset(&self) -> bool;

    /// Generates a fresh identifier.
    fn generate() -> Self;

    /// Renders the identifier as a document id (and file name).
    fn to_document_id(&self) -> DocumentId;
}

impl Identifier for String {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }

    fn generate() -> Self {
        Uuid::new_v4().to_string()
    }

    fn to_document_id(&self) -> DocumentId {
        DocumentId::new(self.clone())
    }
}

impl Identifier for Uuid {
    fn is_unset(&self) -> bool {
        self.is_nil()
    }

    fn generate() -> Self {
        Uuid::new_v4()
    }

    fn to_document_id(&self) -> DocumentId {
        DocumentId::from(*self)
    }
}

type ReadFn = Box<dyn Fn(&dyn Any) -> CoreResult<Value> + Send + Sync>;
type WriteFn = Box<dyn Fn(&mut dyn Any, Value) -> CoreResult<()> + Send + Sync>;
type CopyFn = Box<dyn Fn(&dyn Any, &mut dyn Any) -> bool + Send + Sync>;
type IdReadFn = Box<dyn Fn(&dyn Any) -> CoreResult<Option<DocumentId>> + Send + Sync>;
type IdAssignFn = Box<dyn Fn(&mut dyn Any) -> CoreResult<DocumentId> + Send + Sync>;

/// One persistable field of a record type.
pub struct FieldDescriptor {
    name: String,
    kind: &'static str,
    read: ReadFn,
    write: WriteFn,
    copy: CopyFn,
}

impl FieldDescriptor {
    fn new<T, F>(name: &str, get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> Self
    where
        T: 'static,
        F: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            kind: std::any::type_name::<F>(),
            read: Box::new(move |payload: &dyn Any| {
                let record = downcast_ref::<T>(payload)?;
                Ok(serde_json::to_value(get(record))?)
            }),
            write: Box::new(move |payload: &mut dyn Any, value: Value| {
                let record = downcast_mut::<T>(payload)?;
                *get_mut(record) = serde_json::from_value(value)?;
                Ok(())
            }),
            copy: Box::new(move |source: &dyn Any, target: &mut dyn Any| {
                match (source.downcast_ref::<T>(), target.downcast_mut::<T>()) {
                    (Some(source), Some(target)) => {
                        *get_mut(target) = get(source).clone();
                        true
                    }
                    _ => false,
                }
            }),
        }
    }

    /// Returns the field name as stored in JSON.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the Rust type name of the field value.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Reads the field from a payload as JSON.
    ///
    /// # Errors
    ///
    /// Fails if the payload is of another type or the value cannot be encoded.
    pub fn get(&self, payload: &dyn Any) -> CoreResult<Value> {
        (self.read)(payload)
    }

    /// Writes a JSON value into the field of a payload.
    ///
    /// # Errors
    ///
    /// Fails if the payload is of another type or the value does not decode
    /// into the field's type.
    pub fn set(&self, payload: &mut dyn Any, value: Value) -> CoreResult<()> {
        (self.write)(payload, value)
    }

    fn copy(&self, source: &dyn Any, target: &mut dyn Any) -> bool {
        (self.copy)(source, target)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Read-only summary of a field, as reported by [`PropertyCatalog::descriptors_for`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name as stored in JSON.
    pub name: String,
    /// Rust type name of the field value.
    pub kind: &'static str,
    /// Whether this is the identifier field.
    pub is_identifier: bool,
}

struct IdAccess {
    field: usize,
    read: IdReadFn,
    assign: IdAssignFn,
}

/// Builder describing the persistable fields of `T`.
///
/// Fields are persisted in declaration order. Exactly one field should be
/// declared with [`Schema::id`]; it is persisted like any other field.
pub struct Schema<T> {
    type_name: String,
    collection: Option<String>,
    fields: Vec<FieldDescriptor>,
    identifier: Option<IdAccess>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Schema<T> {
    /// Starts a schema under a stable type name.
    ///
    /// The stable name is what collection definitions store, so it must not
    /// change between releases of the application. Inside
    /// [`Record::schema`] write `Schema::<Self>::new(..)` so the accessor
    /// closures know their argument type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            collection: None,
            fields: Vec::new(),
            identifier: None,
            _record: PhantomData,
        }
    }

    /// Marks the type as a collection root stored in `name` by default.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Declares the identifier field.
    #[must_use]
    pub fn id<I: Identifier>(
        mut self,
        name: &str,
        get: fn(&T) -> &I,
        get_mut: fn(&mut T) -> &mut I,
    ) -> Self {
        let index = self.push_field(FieldDescriptor::new(name, get, get_mut));

        self.identifier = Some(IdAccess {
            field: index,
            read: Box::new(move |payload: &dyn Any| {
                let record = downcast_ref::<T>(payload)?;
                let id = get(record);
                Ok((!id.is_unset()).then(|| id.to_document_id()))
            }),
            assign: Box::new(move |payload: &mut dyn Any| {
                let record = downcast_mut::<T>(payload)?;
                let id = get_mut(record);
                if id.is_unset() {
                    *id = I::generate();
                }
                Ok(id.to_document_id())
            }),
        });
        self
    }

    /// Declares a persistable field.
    #[must_use]
    pub fn field<F>(mut self, name: &str, get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> Self
    where
        F: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.push_field(FieldDescriptor::new(name, get, get_mut));
        self
    }

    fn push_field(&mut self, field: FieldDescriptor) -> usize {
        if let Some(index) = self.fields.iter().position(|f| f.name == field.name) {
            self.fields[index] = field;
            index
        } else {
            self.fields.push(field);
            self.fields.len() - 1
        }
    }

    fn build(self) -> TypeSchema {
        TypeSchema {
            type_name: self.type_name,
            type_id: TypeId::of::<T>(),
            rust_name: std::any::type_name::<T>(),
            collection: self.collection,
            fields: self.fields,
            identifier: self.identifier,
            construct: construct::<T>,
        }
    }
}

fn construct<T: Record>() -> Payload {
    Box::new(T::default())
}

fn downcast_ref<T: 'static>(payload: &dyn Any) -> CoreResult<&T> {
    payload.downcast_ref::<T>().ok_or_else(|| {
        CoreError::invalid_operation(format!(
            "payload is not a {}",
            std::any::type_name::<T>()
        ))
    })
}

fn downcast_mut<T: 'static>(payload: &mut dyn Any) -> CoreResult<&mut T> {
    payload.downcast_mut::<T>().ok_or_else(|| {
        CoreError::invalid_operation(format!(
            "payload is not a {}",
            std::any::type_name::<T>()
        ))
    })
}

/// The erased schema of one record type.
pub struct TypeSchema {
    type_name: String,
    type_id: TypeId,
    rust_name: &'static str,
    collection: Option<String>,
    fields: Vec<FieldDescriptor>,
    identifier: Option<IdAccess>,
    construct: fn() -> Payload,
}

impl TypeSchema {
    /// Builds the schema of `T`.
    #[must_use]
    pub fn of<T: Record>() -> Self {
        T::schema().build()
    }

    /// Returns the stable type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the [`TypeId`] of the record type this schema describes.
    #[must_use]
    pub fn rust_type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the Rust type path, for diagnostics.
    #[must_use]
    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    /// Returns the default collection, if this is a collection root type.
    #[must_use]
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Returns the persistable fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Looks up a field by exact name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the identifier field.
    #[must_use]
    pub fn identifier(&self) -> Option<&FieldDescriptor> {
        self.identifier.as_ref().map(|id| &self.fields[id.field])
    }

    /// Returns whether `payload` is an instance of this type.
    #[must_use]
    pub fn is_instance(&self, payload: &dyn Any) -> bool {
        payload.type_id() == self.type_id
    }

    /// Constructs a zero-state instance.
    #[must_use]
    pub fn construct(&self) -> Payload {
        (self.construct)()
    }

    /// Reads the identifier of a payload; `None` if it is unset.
    ///
    /// # Errors
    ///
    /// Returns `MissingIdentifier` if the type declares no identifier.
    pub fn document_id(&self, payload: &dyn Any) -> CoreResult<Option<DocumentId>> {
        let id = self
            .identifier
            .as_ref()
            .ok_or_else(|| CoreError::missing_identifier(&self.type_name))?;
        (id.read)(payload)
    }

    /// Returns the payload's identifier, generating and storing one first if
    /// it is unset.
    ///
    /// # Errors
    ///
    /// Returns `MissingIdentifier` if the type declares no identifier.
    pub fn assign_id(&self, payload: &mut dyn Any) -> CoreResult<DocumentId> {
        let id = self
            .identifier
            .as_ref()
            .ok_or_else(|| CoreError::missing_identifier(&self.type_name))?;
        (id.assign)(payload)
    }

    /// Encodes the declared fields of a payload into a sorted field map.
    ///
    /// # Errors
    ///
    /// Fails if the payload is of another type or a value cannot be encoded.
    pub fn to_field_map(&self, payload: &dyn Any) -> CoreResult<Map<String, Value>> {
        let mut map = Map::new();
        for field in &self.fields {
            map.insert(field.name.clone(), field.get(payload)?);
        }
        Ok(map)
    }

    /// Decodes a field map into a fresh instance.
    ///
    /// # Errors
    ///
    /// See [`TypeSchema::apply_field_map`].
    pub fn from_field_map(&self, map: &Map<String, Value>) -> CoreResult<Payload> {
        let mut payload = self.construct();
        self.apply_field_map(payload.as_mut(), map)?;
        Ok(payload)
    }

    /// Writes every declared field found in `map` into `payload`.
    ///
    /// Names match exactly first, then case-insensitively. Keys that match no
    /// declared field are ignored, and declared fields absent from the map
    /// keep their current value.
    ///
    /// # Errors
    ///
    /// Fails if a value does not decode into its field's type.
    pub fn apply_field_map(&self, payload: &mut dyn Any, map: &Map<String, Value>) -> CoreResult<()> {
        for field in &self.fields {
            let value = map.get(&field.name).or_else(|| {
                map.iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(&field.name))
                    .map(|(_, value)| value)
            });

            if let Some(value) = value {
                field.set(payload, value.clone())?;
            }
        }
        Ok(())
    }

    /// Copies every declared field from `source` to `target`, identifier last.
    ///
    /// # Errors
    ///
    /// Fails if either payload is of another type.
    pub fn copy_fields(&self, source: &dyn Any, target: &mut dyn Any) -> CoreResult<()> {
        if !self.is_instance(source) || !self.is_instance(target) {
            return Err(CoreError::invalid_operation(format!(
                "copy between payloads that are not {}",
                self.type_name
            )));
        }

        let id_index = self.identifier.as_ref().map(|id| id.field);
        for (index, field) in self.fields.iter().enumerate() {
            if Some(index) != id_index {
                field.copy(source, target);
            }
        }
        if let Some(index) = id_index {
            self.fields[index].copy(source, target);
        }
        Ok(())
    }

    fn field_infos(&self) -> Vec<FieldInfo> {
        let id_index = self.identifier.as_ref().map(|id| id.field);
        self.fields
            .iter()
            .enumerate()
            .map(|(index, field)| FieldInfo {
                name: field.name.clone(),
                kind: field.kind,
                is_identifier: Some(index) == id_index,
            })
            .collect()
    }
}

impl fmt::Debug for TypeSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeSchema")
            .field("type_name", &self.type_name)
            .field("rust_name", &self.rust_name)
            .field("collection", &self.collection)
            .field("fields", &self.fields)
            .finish()
    }
}

#[derive(Default)]
struct CatalogInner {
    by_name: HashMap<String, Arc<TypeSchema>>,
    by_type: HashMap<TypeId, Arc<TypeSchema>>,
}

/// Registry of record schemas, keyed by stable type name.
///
/// Every type whose collections should be loaded at open must be registered
/// before the database is opened; other types are registered on first use.
#[derive(Default)]
pub struct PropertyCatalog {
    inner: RwLock<CatalogInner>,
}

impl PropertyCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T` and returns the catalog, for chaining.
    ///
    /// # Errors
    ///
    /// See [`PropertyCatalog::register`].
    pub fn with<T: Record>(self) -> CoreResult<Self> {
        self.register::<T>()?;
        Ok(self)
    }

    /// Registers `T` under its stable type name.
    ///
    /// Registering the same type again returns the existing schema.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingRegistration` if another Rust type already uses
    /// the same stable name in this catalog.
    pub fn register<T: Record>(&self) -> CoreResult<Arc<TypeSchema>> {
        if let Some(schema) = self.inner.read().by_type.get(&TypeId::of::<T>()) {
            return Ok(Arc::clone(schema));
        }

        let schema = TypeSchema::of::<T>();
        let mut inner = self.inner.write();

        if let Some(existing) = inner.by_name.get(schema.type_name()) {
            return if existing.rust_type_id() == schema.rust_type_id() {
                Ok(Arc::clone(existing))
            } else {
                Err(CoreError::conflicting_registration(schema.type_name()))
            };
        }

        let schema = Arc::new(schema);
        inner
            .by_name
            .insert(schema.type_name().to_string(), Arc::clone(&schema));
        inner.by_type.insert(schema.rust_type_id(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Returns the schema of `T`, registering it if needed.
    ///
    /// # Errors
    ///
    /// See [`PropertyCatalog::register`].
    pub fn schema_of<T: Record>(&self) -> CoreResult<Arc<TypeSchema>> {
        self.register::<T>()
    }

    /// Resolves a stable type name.
    #[must_use]
    pub fn resolve(&self, type_name: &str) -> Option<Arc<TypeSchema>> {
        self.inner.read().by_name.get(type_name).cloned()
    }

    /// Returns the ordered persistable fields of a type.
    #[must_use]
    pub fn descriptors_for(&self, type_name: &str) -> Option<Vec<FieldInfo>> {
        self.resolve(type_name).map(|schema| schema.field_infos())
    }

    /// Returns the name of a type's identifier field.
    #[must_use]
    pub fn identifier_field_for(&self, type_name: &str) -> Option<String> {
        self.resolve(type_name)
            .and_then(|schema| schema.identifier().map(|f| f.name().to_string()))
    }

    /// Returns every registered type name, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for PropertyCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyCatalog")
            .field("types", &self.type_names())
            .finish()
    }
}
