//! Entity fixtures shared by the integration tests.
#![allow(dead_code)]

use relmap::{
    IndexAttr, PropertyDescriptor, PropertyType, StaticCatalog, StaticViewQueries, TypeDescriptor,
    TypeKind, TypeRef,
};

pub const BLOGGING: &str = "blogging::model";
pub const IDENTITY: &str = "identity::model";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn entity() -> &'static TypeDescriptor {
    &ENTITY
}
pub fn blog() -> &'static TypeDescriptor {
    &BLOG
}
pub fn post() -> &'static TypeDescriptor {
    &POST
}
pub fn tag() -> &'static TypeDescriptor {
    &TAG
}
pub fn system_type() -> &'static TypeDescriptor {
    &SYSTEM_TYPE
}
pub fn setting() -> &'static TypeDescriptor {
    &SETTING
}
pub fn blog_summary() -> &'static TypeDescriptor {
    &BLOG_SUMMARY
}
pub fn user() -> &'static TypeDescriptor {
    &USER
}

static ENTITY: TypeDescriptor = TypeDescriptor::new(BLOGGING, "Entity", TypeKind::Plain)
    .with_properties(&[
        PropertyDescriptor::scalar::<uuid::Uuid>("PrimaryKey"),
        PropertyDescriptor::scalar::<i64>("Version"),
    ]);

static POST_ITEM: PropertyType = PropertyType::Object(TypeRef::new(post));
static TAG_ITEM: PropertyType = PropertyType::Object(TypeRef::new(tag));
static BLOG_ITEM: PropertyType = PropertyType::Object(TypeRef::new(blog));

static BLOG: TypeDescriptor = TypeDescriptor::new(BLOGGING, "Blog", TypeKind::Table)
    .with_base(TypeRef::new(entity))
    .with_properties(&[
        PropertyDescriptor::scalar::<String>("Title"),
        PropertyDescriptor::collection("Posts", &POST_ITEM),
    ])
    .with_indexes(&[IndexAttr::new(&["Title"]).unique()]);

static POST: TypeDescriptor = TypeDescriptor::new(BLOGGING, "Post", TypeKind::Table)
    .with_base(TypeRef::new(entity))
    .with_properties(&[
        PropertyDescriptor::object("Blog", TypeRef::new(blog)),
        PropertyDescriptor::scalar::<String>("Title"),
        PropertyDescriptor::scalar::<Option<String>>("Body"),
        PropertyDescriptor::scalar::<Option<jiff::Timestamp>>("PublishedAt"),
        PropertyDescriptor::collection("Tags", &TAG_ITEM),
    ])
    .with_indexes(&[
        IndexAttr::new(&["Title", "Blog_PrimaryKey"]),
        IndexAttr::new(&["PublishedAt"])
            .with_predicate("\"PublishedAt\" IS NOT NULL")
            .with_include(&["Title"]),
    ]);

static TAG: TypeDescriptor = TypeDescriptor::new(BLOGGING, "Tag", TypeKind::Table)
    .with_base(TypeRef::new(entity))
    .with_properties(&[PropertyDescriptor::scalar::<String>("Name")])
    .with_indexes(&[IndexAttr::new(&["Name"]).unique()]);

static SYSTEM_TYPE: TypeDescriptor =
    TypeDescriptor::new(BLOGGING, "SystemType", TypeKind::Inlined).with_properties(&[
        PropertyDescriptor::scalar::<String>("Assembly"),
        PropertyDescriptor::scalar::<String>("Type"),
    ]);

static SETTING: TypeDescriptor = TypeDescriptor::new(BLOGGING, "Setting", TypeKind::Table)
    .with_base(TypeRef::new(entity))
    .with_properties(&[
        PropertyDescriptor::scalar::<String>("Key"),
        PropertyDescriptor::object("Value", TypeRef::new(system_type)),
    ])
    .with_indexes(&[IndexAttr::new(&["Value_Type", "Key"]).unique()]);

static BLOG_SUMMARY: TypeDescriptor =
    TypeDescriptor::new(BLOGGING, "BlogSummary", TypeKind::View).with_properties(&[
        PropertyDescriptor::scalar::<uuid::Uuid>("PrimaryKey"),
        PropertyDescriptor::scalar::<String>("Title"),
        PropertyDescriptor::scalar::<i64>("PostCount"),
    ]);

static USER: TypeDescriptor = TypeDescriptor::new(IDENTITY, "User", TypeKind::Table)
    .with_properties(&[
        PropertyDescriptor::scalar::<uuid::Uuid>("PrimaryKey"),
        PropertyDescriptor::scalar::<String>("Email"),
        PropertyDescriptor::collection("Blogs", &BLOG_ITEM),
    ]);

pub const BLOG_SUMMARY_QUERY: &str = r#"SELECT b."PrimaryKey", b."Title", count(p."PrimaryKey") AS "PostCount"
FROM "blogging"."Blog" b
LEFT JOIN "blogging"."Post" p ON p."Blog_PrimaryKey" = b."PrimaryKey"
GROUP BY b."PrimaryKey", b."Title""#;

/// Blog, Post, Tag, Setting, the summary view and User. Post and Tag are
/// only reachable through relations.
pub fn catalog() -> StaticCatalog {
    StaticCatalog::new([
        TypeRef::new(blog),
        TypeRef::new(setting),
        TypeRef::new(blog_summary),
        TypeRef::new(user),
    ])
}

pub fn view_queries() -> StaticViewQueries {
    StaticViewQueries::new().with(TypeRef::new(blog_summary), BLOG_SUMMARY_QUERY)
}
