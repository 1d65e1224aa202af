//! Builds the relational model from a type catalog.

use crate::flatten::{PropertyClass, flatten};
use crate::{
    ColumnInfo, IndexInfo, ModelError, MtmTableInfo, ObjectModelInfo, SchemaInfo, TableInfo,
    TypeCatalog, TypeKind, TypeRef, ViewInfo, ViewQuerySource,
};
use std::collections::{BTreeMap, BTreeSet};

/// Schemas by lowercased name.
pub type Schemas = BTreeMap<String, SchemaInfo>;

type TypeId = (&'static str, &'static str);

/// Build every table, view and join table for the catalogued types.
///
/// Entities reachable through relations are included even when the catalog
/// does not list them. Any defect aborts the build.
pub fn build_model(
    catalog: &dyn TypeCatalog,
    views: &dyn ViewQuerySource,
) -> Result<Schemas, ModelError> {
    let _span = tracing::debug_span!("build_model").entered();

    let mut pending: Vec<TypeRef> = catalog.types();
    for ty in &pending {
        let desc = ty.get();
        if !desc.is_entity() {
            return Err(ModelError::NotAnEntity {
                type_name: desc.key().to_string(),
            });
        }
    }
    pending.reverse();

    let mut seen: BTreeSet<TypeId> = BTreeSet::new();
    let mut objects: Vec<ObjectModelInfo> = Vec::new();
    // Unordered participant pair -> (declaring owners, left, right)
    let mut mtm_pairs: BTreeMap<(TypeId, TypeId), (BTreeSet<TypeId>, TypeRef, TypeRef)> =
        BTreeMap::new();

    while let Some(ty) = pending.pop() {
        if !seen.insert(ty.id()) {
            continue;
        }

        let (object, targets) = build_object(ty, views)?;
        for (multiple, target) in &targets {
            if *multiple {
                declare_mtm(&mut mtm_pairs, ty, *target);
            }
            if !seen.contains(&target.id()) {
                tracing::trace!(from = %ty.key(), to = %target.key(), "following relation");
                pending.push(*target);
            }
        }
        objects.push(object);
    }

    for (_, (owners, left, right)) in mtm_pairs {
        tracing::trace!(
            left = %left.key(),
            right = %right.key(),
            declared_by = owners.len(),
            "synthesizing join table"
        );
        objects.push(ObjectModelInfo::Mtm(MtmTableInfo::new(left, right)?));
    }

    let mut schemas = Schemas::new();
    for object in objects {
        let schema = schemas
            .entry(object.schema().to_lowercase())
            .or_insert_with(|| SchemaInfo::new(object.schema()));
        schema.add(object)?;
    }

    tracing::info!(
        schemas = schemas.len(),
        objects = schemas.values().map(|s| s.objects.len()).sum::<usize>(),
        "built model"
    );
    Ok(schemas)
}

/// Record that `owner` has a collection of `item`.
///
/// One join table per unordered pair. When both sides declare the
/// collection, Left is the participant with the smaller identity.
fn declare_mtm(
    pairs: &mut BTreeMap<(TypeId, TypeId), (BTreeSet<TypeId>, TypeRef, TypeRef)>,
    owner: TypeRef,
    item: TypeRef,
) {
    let pair = if owner.id() <= item.id() {
        (owner.id(), item.id())
    } else {
        (item.id(), owner.id())
    };
    let entry = pairs
        .entry(pair)
        .or_insert_with(|| (BTreeSet::new(), owner, item));
    entry.0.insert(owner.id());
    if entry.0.len() > 1 && entry.1.id() != pair.0 {
        let (left, right) = (entry.2, entry.1);
        entry.1 = left;
        entry.2 = right;
    }
}

/// Build the table or view for one entity type. Also returns the relation
/// targets found on its columns, flagged when the relation is multi-valued.
fn build_object(
    ty: TypeRef,
    views: &dyn ViewQuerySource,
) -> Result<(ObjectModelInfo, Vec<(bool, TypeRef)>), ModelError> {
    let desc = ty.get();
    let key = desc.key();
    let pk = desc.require_primary_key()?;

    let mut table = TableInfo::new(key.clone(), desc.schema_name(), desc.table_name());
    let mut targets = Vec::new();
    for chain in flatten(desc)? {
        let column = ColumnInfo::new(key.clone(), chain)?;
        let target = column.chain().iter().find_map(|p| match p.class() {
            PropertyClass::OneToOne(target) | PropertyClass::ManyToMany(target) => Some(target),
            _ => None,
        });
        if let Some(target) = target {
            targets.push((column.is_multiple_relation(), target));
        }
        table.add_column(column)?;
    }

    for attr in desc.indexes {
        let index = IndexInfo::resolve(&key, attr, &table.columns)?;
        table.add_index(index)?;
    }

    let object = match desc.kind {
        TypeKind::Table => ObjectModelInfo::Table(table),
        TypeKind::View => {
            if let Some(column) = table.columns.values().find(|c| c.is_multiple_relation()) {
                return Err(ModelError::ManyToManyInView {
                    view: key.to_string(),
                    property: column.name().to_string(),
                });
            }
            let key_type = match pk.class() {
                PropertyClass::Scalar(pg) => pg,
                _ => {
                    return Err(ModelError::UnsupportedColumnType {
                        owner: key.to_string(),
                        property: pk.name().to_string(),
                        type_name: pk.reflected().ty.type_name(),
                    });
                }
            };
            let query = views.view_query(desc, key_type).ok_or_else(|| {
                ModelError::ViewQueryNotFound {
                    view: key.to_string(),
                }
            })?;
            ObjectModelInfo::View(ViewInfo { table, query })
        }
        TypeKind::Inlined | TypeKind::Plain => {
            return Err(ModelError::NotAnEntity {
                type_name: key.to_string(),
            });
        }
    };

    tracing::debug!(
        object = %key,
        columns = object.columns().len(),
        indexes = object.indexes().len(),
        view = object.is_view(),
        "built object"
    );
    Ok((object, targets))
}
