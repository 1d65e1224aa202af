//! Property classification and column flattening.
//!
//! Every declared property is classified exactly once into a
//! [`PropertyClass`]. Flattening turns a type's properties into column
//! chains: inlined objects expand into one chain per leaf, relations keep only
//! the target's primary key.

use crate::{
    ColumnProperty, ModelError, PgType, PropertyType, TypeDescriptor, TypeKey, TypeKind, TypeRef,
};

/// What a property maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyClass {
    /// One column of the given type.
    Scalar(PgType),
    /// A value object whose properties become columns of the owner.
    Inlined(TypeRef),
    /// A reference to another entity, stored as its primary key.
    OneToOne(TypeRef),
    /// A collection of entities, realized as a join table.
    ManyToMany(TypeRef),
    /// Anything with no column mapping.
    Unsupported(Unsupported),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
    /// A type that is neither scalar, entity nor inlined object.
    Type(&'static str),
    /// A collection of something other than entities.
    Array,
}

/// Classify a property type.
pub fn classify(ty: &PropertyType) -> PropertyClass {
    match ty {
        PropertyType::Scalar(pg) => PropertyClass::Scalar(*pg),
        PropertyType::Object(target) => {
            let desc = target.get();
            match desc.kind {
                TypeKind::Table | TypeKind::View => PropertyClass::OneToOne(*target),
                TypeKind::Inlined => PropertyClass::Inlined(*target),
                TypeKind::Plain => PropertyClass::Unsupported(Unsupported::Type(desc.name)),
            }
        }
        PropertyType::Collection(item) => match item {
            PropertyType::Object(target) if target.get().is_entity() => {
                PropertyClass::ManyToMany(*target)
            }
            _ => PropertyClass::Unsupported(Unsupported::Array),
        },
        PropertyType::Opaque(name) => PropertyClass::Unsupported(Unsupported::Type(*name)),
    }
}

/// Flatten the properties of `owner` into column chains, in declaration order
/// (base types first).
pub fn flatten(owner: &'static TypeDescriptor) -> Result<Vec<Vec<ColumnProperty>>, ModelError> {
    let mut chains = Vec::new();
    let mut inlining = vec![owner.key()];
    for prop in owner.properties()? {
        flatten_property(&[], prop, &mut inlining, &mut chains)?;
    }
    tracing::trace!(owner = %owner.key(), columns = chains.len(), "flattened");
    Ok(chains)
}

fn flatten_property(
    prefix: &[ColumnProperty],
    prop: ColumnProperty,
    inlining: &mut Vec<TypeKey>,
    out: &mut Vec<Vec<ColumnProperty>>,
) -> Result<(), ModelError> {
    let chain_with = |prop: ColumnProperty| {
        let mut chain = prefix.to_vec();
        chain.push(prop);
        chain
    };

    match prop.class() {
        PropertyClass::Scalar(_) => out.push(chain_with(prop)),
        PropertyClass::OneToOne(target) | PropertyClass::ManyToMany(target) => {
            let pk = target.get().require_primary_key()?;
            let mut chain = chain_with(prop);
            chain.push(pk);
            out.push(chain);
        }
        PropertyClass::Inlined(target) => {
            let key = target.key();
            if inlining.contains(&key) {
                return Err(ModelError::RecursiveInlinedObject {
                    owner: prop.reflected_type().to_string(),
                    type_name: key.to_string(),
                });
            }
            tracing::trace!(property = prop.name(), inlined = %key, "inlining object");
            let prefix = chain_with(prop);
            inlining.push(key);
            for inner in target.get().properties()? {
                flatten_property(&prefix, inner, inlining, out)?;
            }
            inlining.pop();
        }
        PropertyClass::Unsupported(Unsupported::Array) => {
            return Err(ModelError::UnsupportedArray {
                owner: prop.reflected_type().to_string(),
                property: prop.name().to_string(),
            });
        }
        PropertyClass::Unsupported(Unsupported::Type(_)) => {
            return Err(ModelError::UnsupportedColumnType {
                owner: prop.reflected_type().to_string(),
                property: prop.name().to_string(),
                type_name: prop.reflected().ty.type_name(),
            });
        }
    }

    Ok(())
}
