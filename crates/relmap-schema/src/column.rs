//! Columns and the relations they carry.

use crate::flatten::{PropertyClass, classify};
use crate::{ModelError, PRIMARY_KEY, PgType, PropertyDescriptor, TypeKey, TypeKind, TypeRef};
use relmap_sql::{Ident, qualified_name};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A declared property as seen from a concrete type.
///
/// `declared` is the property as first declared (possibly on a base type),
/// `reflected` is the one that applies to the concrete type after overrides.
/// Identity is `(declaring type, reflected type, name)`.
#[derive(Debug, Clone)]
pub struct ColumnProperty {
    declaring_type: TypeKey,
    reflected_type: TypeKey,
    declared: PropertyDescriptor,
    reflected: PropertyDescriptor,
    class: PropertyClass,
}

impl ColumnProperty {
    pub fn new(
        declaring_type: TypeKey,
        reflected_type: TypeKey,
        declared: PropertyDescriptor,
        reflected: PropertyDescriptor,
    ) -> Self {
        Self {
            declaring_type,
            reflected_type,
            declared,
            reflected,
            class: classify(&reflected.ty),
        }
    }

    /// A property that exists on a synthesized type only, such as the
    /// `Left`/`Right` properties of a join table.
    pub fn synthesized(owner: &TypeKey, name: &'static str, target: TypeRef) -> Self {
        let prop = PropertyDescriptor::object(name, target);
        Self::new(owner.clone(), owner.clone(), prop, prop)
    }

    pub(crate) fn override_with(&mut self, reflected: PropertyDescriptor) {
        self.reflected = reflected;
        self.class = classify(&reflected.ty);
    }

    pub fn name(&self) -> &'static str {
        self.declared.name
    }

    pub fn declaring_type(&self) -> &TypeKey {
        &self.declaring_type
    }

    pub fn reflected_type(&self) -> &TypeKey {
        &self.reflected_type
    }

    pub fn declared(&self) -> &PropertyDescriptor {
        &self.declared
    }

    pub fn reflected(&self) -> &PropertyDescriptor {
        &self.reflected
    }

    pub fn class(&self) -> PropertyClass {
        self.class
    }

    /// Nullability follows the declared property: an override cannot relax
    /// a base type's `not null`.
    pub fn is_nullable(&self) -> bool {
        self.declared.nullable
    }
}

impl PartialEq for ColumnProperty {
    fn eq(&self, other: &Self) -> bool {
        self.declaring_type == other.declaring_type
            && self.reflected_type == other.reflected_type
            && self.name() == other.name()
    }
}

impl Eq for ColumnProperty {}

impl Hash for ColumnProperty {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring_type.hash(state);
        self.reflected_type.hash(state);
        self.name().hash(state);
    }
}

/// A directed edge from the table holding a column to the entity it points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relation {
    pub source: TypeKey,
    pub target: TypeKey,
    /// The property the relation originates from.
    pub property: ColumnProperty,
}

/// How a column came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Scalar,
    /// A leaf of an inlined object.
    Inlined,
    /// Foreign key to a single entity.
    SingleRelation,
    /// Key of a collection of entities. Not a physical column: the relation
    /// lives in a join table.
    MultipleRelation,
}

/// Column constraint, ordered the way constraints are rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnConstraint {
    NotNull,
    PrimaryKey,
    References {
        schema: String,
        table: String,
        column: String,
    },
}

impl fmt::Display for ColumnConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnConstraint::NotNull => write!(f, "not null"),
            ColumnConstraint::PrimaryKey => write!(f, "primary key"),
            ColumnConstraint::References {
                schema,
                table,
                column,
            } => write!(
                f,
                "references {} ({})",
                qualified_name(schema, table),
                Ident(column)
            ),
        }
    }
}

/// A physical (or, for multiple relations, logical) column.
///
/// Derived from a non-empty chain of properties; the name is the chain's
/// property names joined by `_`.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    table: TypeKey,
    chain: Vec<ColumnProperty>,
    name: String,
    kind: ColumnKind,
    data_type: PgType,
    nullable: bool,
    relation: Option<Relation>,
    references_column: Option<String>,
}

impl ColumnInfo {
    pub fn new(table: TypeKey, chain: Vec<ColumnProperty>) -> Result<Self, ModelError> {
        let Some(last) = chain.last() else {
            return Err(ModelError::EmptyColumnChain {
                table: table.to_string(),
            });
        };

        let name = chain
            .iter()
            .map(|p| p.name())
            .collect::<Vec<_>>()
            .join("_");

        let data_type = match last.class() {
            PropertyClass::Scalar(pg) => pg,
            PropertyClass::OneToOne(target) | PropertyClass::ManyToMany(target) => {
                key_type(target, last)?
            }
            PropertyClass::Inlined(_) | PropertyClass::Unsupported(_) => {
                return Err(ModelError::UnsupportedColumnType {
                    owner: last.reflected_type().to_string(),
                    property: last.name().to_string(),
                    type_name: last.reflected().ty.type_name(),
                });
            }
        };

        let mut kind = if chain.len() > 1 {
            ColumnKind::Inlined
        } else {
            ColumnKind::Scalar
        };
        let mut relation = None;
        let mut references_column = None;
        for prop in &chain {
            let (target, relation_kind) = match prop.class() {
                PropertyClass::OneToOne(target) => (target, ColumnKind::SingleRelation),
                PropertyClass::ManyToMany(target) => (target, ColumnKind::MultipleRelation),
                _ => continue,
            };
            // Foreign keys can only point at tables.
            if target.get().kind == TypeKind::View {
                return Err(ModelError::RelationToView {
                    owner: prop.reflected_type().to_string(),
                    property: prop.name().to_string(),
                    view: target.key().to_string(),
                });
            }
            kind = relation_kind;
            references_column = Some(target.get().require_primary_key()?.name().to_string());
            relation = Some(Relation {
                source: table.clone(),
                target: target.key(),
                property: prop.clone(),
            });
            break;
        }

        let nullable = chain.iter().any(|p| p.is_nullable());

        Ok(Self {
            table,
            chain,
            name,
            kind,
            data_type,
            nullable,
            relation,
            references_column,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &TypeKey {
        &self.table
    }

    pub fn chain(&self) -> &[ColumnProperty] {
        &self.chain
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn data_type(&self) -> PgType {
        self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn relation(&self) -> Option<&Relation> {
        self.relation.as_ref()
    }

    pub fn is_multiple_relation(&self) -> bool {
        self.kind == ColumnKind::MultipleRelation
    }

    pub fn is_inlined_object(&self) -> bool {
        self.kind == ColumnKind::Inlined
    }

    pub fn is_primary_key(&self) -> bool {
        self.name.eq_ignore_ascii_case(PRIMARY_KEY)
    }

    /// Constraints in rendering order.
    pub fn constraints(&self) -> Vec<ColumnConstraint> {
        let mut constraints = Vec::new();
        if !self.nullable {
            constraints.push(ColumnConstraint::NotNull);
        }
        if self.is_primary_key() {
            constraints.push(ColumnConstraint::PrimaryKey);
        }
        if let (Some(relation), Some(column)) = (&self.relation, &self.references_column) {
            constraints.push(ColumnConstraint::References {
                schema: relation.target.schema_name().to_string(),
                table: relation.target.name.clone(),
                column: column.clone(),
            });
        }
        constraints.sort();
        constraints
    }

    /// Constraints rendered as a single clause, e.g.
    /// `not null references "blogging"."Blog" ("PrimaryKey")`.
    pub fn constraint_clause(&self) -> String {
        self.constraints()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn key_type(target: TypeRef, via: &ColumnProperty) -> Result<PgType, ModelError> {
    let pk = target.get().require_primary_key()?;
    match pk.class() {
        PropertyClass::Scalar(pg) => Ok(pg),
        _ => Err(ModelError::UnsupportedColumnType {
            owner: via.reflected_type().to_string(),
            property: via.name().to_string(),
            type_name: pk.reflected().ty.type_name(),
        }),
    }
}

impl PartialEq for ColumnInfo {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.chain == other.chain
    }
}

impl Eq for ColumnInfo {}

impl Hash for ColumnInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.chain.hash(state);
    }
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", Ident(&self.name), self.data_type)?;
        let clause = self.constraint_clause();
        if !clause.is_empty() {
            write!(f, " {}", clause)?;
        }
        Ok(())
    }
}
