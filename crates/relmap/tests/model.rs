mod common;

use common::*;
use relmap::config::Config;
use relmap::{
    ColumnKind, LEFT_COLUMN, Model, ModelError, ModelProvider, NoViewQueries, ObjectModelInfo,
    PgType, PropertyDescriptor, PropertyType, RIGHT_COLUMN, StaticCatalog, TypeDescriptor,
    TypeKind, TypeRef,
};

fn model() -> Model {
    init_tracing();
    Model::build(&catalog(), &view_queries()).unwrap()
}

#[test]
fn test_lookup_by_type_and_name() {
    let model = model();

    let post = model.table_for(TypeRef::new(post)).unwrap();
    assert_eq!(post.schema, "blogging");
    assert_eq!(post.name, "Post");

    assert!(model.object("BLOGGING", "post").is_some());
    assert!(model.object("identity", "User").is_some());
    assert!(model.object("blogging", "User").is_none());

    let summary = model.object_for_type(TypeRef::new(blog_summary)).unwrap();
    assert!(summary.is_view());
}

#[test]
fn test_post_columns() {
    let model = model();
    let columns = model.columns_for(TypeRef::new(post)).unwrap();

    let rendered: Vec<String> = columns
        .values()
        .filter(|c| !c.is_multiple_relation())
        .map(|c| c.to_string())
        .collect();
    insta::assert_snapshot!(rendered.join("\n"), @r#"
    "Blog_PrimaryKey" UUID not null references "blogging"."Blog" ("PrimaryKey")
    "Body" TEXT
    "PrimaryKey" UUID not null primary key
    "PublishedAt" TIMESTAMPTZ
    "Title" TEXT not null
    "Version" BIGINT not null
    "#);

    assert_eq!(columns["Tags_PrimaryKey"].kind(), ColumnKind::MultipleRelation);
    assert_eq!(columns["Blog_PrimaryKey"].kind(), ColumnKind::SingleRelation);
}

#[test]
fn test_inlined_columns() {
    let model = model();
    let columns = model.columns_of("blogging", "Setting").unwrap();
    for name in ["Value_Assembly", "Value_Type"] {
        let column = &columns[name];
        assert!(column.is_inlined_object());
        assert_eq!(column.constraint_clause(), "not null");
    }
    let index = model
        .object("blogging", "Setting")
        .unwrap()
        .indexes()
        .values()
        .next()
        .unwrap();
    assert_eq!(index.name(), "Setting__Key_Value_Type");
    assert!(index.is_unique());
}

#[test]
fn test_join_tables() {
    let model = model();

    let blog_post = model
        .mtm_table_for(TypeRef::new(post), TypeRef::new(blog))
        .unwrap();
    assert_eq!(blog_post.table.schema, "blogging");
    assert_eq!(blog_post.table.name, "Blog_Post");
    for column in [LEFT_COLUMN, RIGHT_COLUMN] {
        assert_eq!(blog_post.table.columns[column].data_type(), PgType::Uuid);
    }
    assert_eq!(
        blog_post.table.columns[RIGHT_COLUMN].constraint_clause(),
        r#"not null references "blogging"."Post" ("PrimaryKey")"#
    );

    let user_blog = model
        .mtm_table_for(TypeRef::new(blog), TypeRef::new(user))
        .unwrap();
    assert_eq!(user_blog.table.schema, "bloggingidentity");
    assert_eq!(user_blog.table.name, "User_Blog");

    assert!(
        model
            .mtm_table_for(TypeRef::new(tag), TypeRef::new(blog))
            .is_none()
    );
}

#[test]
fn test_tables_for_follows_references() {
    let model = model();
    let mut names: Vec<String> = model
        .tables_for([TypeRef::new(post)])
        .iter()
        .map(|o| format!("{}.{}", o.schema(), o.name()))
        .collect();
    names.sort();
    assert_eq!(
        names,
        ["blogging.Blog", "blogging.Blog_Post", "blogging.Post"]
    );
}

#[test]
fn test_snapshot_excludes_logical_columns() {
    let model = model();
    let snapshot = model.snapshot("blog");

    let post = snapshot.table("blogging", "Post").unwrap();
    assert!(!post.columns.contains_key("tags_primarykey"));
    assert!(post.columns.contains_key("blog_primarykey"));

    let partial = post
        .indexes
        .values()
        .find(|i| i.predicate.is_some())
        .unwrap();
    assert_eq!(partial.name, "Post__PublishedAt");
    assert_eq!(partial.include, ["Title"]);

    let blog = snapshot.table("blogging", "Blog").unwrap();
    assert!(!blog.columns.contains_key("posts_primarykey"));

    let schema = snapshot.schema("blogging").unwrap();
    assert!(schema.views.contains_key("blogsummary"));
    assert!(!schema.tables.contains_key("blogsummary"));
    assert!(snapshot.table("bloggingidentity", "User_Blog").is_some());
}

#[test]
fn test_models_from_same_types_are_equal() {
    assert_eq!(model(), model());
    assert_ne!(
        model(),
        Model::build(&StaticCatalog::new([TypeRef::new(setting)]), &NoViewQueries).unwrap()
    );
}

#[test]
fn test_provider_builds_once() {
    let provider = ModelProvider::new(catalog(), view_queries());
    let models: Vec<&Model> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| provider.model())).collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    });
    assert!(models.windows(2).all(|w| std::ptr::eq(w[0], w[1])));
}

#[test]
fn test_expected_snapshot_uses_configured_database() {
    let provider = ModelProvider::new(catalog(), view_queries());

    let config = Config {
        database: Some("blog_prod".into()),
        ignored_schemas: vec![],
    };
    let expected = provider.expected(&config, "blog").unwrap();
    assert_eq!(expected.name, "blog_prod");
    assert!(expected.table("blogging", "Post").is_some());

    let unnamed = provider.expected(&Config::default(), "blog").unwrap();
    assert_eq!(unnamed.name, "blog");
}

static TEXT: PropertyType = PropertyType::Scalar(PgType::Text);

fn tagged() -> &'static TypeDescriptor {
    &TAGGED
}

static TAGGED: TypeDescriptor = TypeDescriptor::new(BLOGGING, "Tagged", TypeKind::Table)
    .with_properties(&[
        PropertyDescriptor::scalar::<uuid::Uuid>("PrimaryKey"),
        PropertyDescriptor::collection("Labels", &TEXT),
    ]);

#[test]
fn test_provider_remembers_failure() {
    let provider = ModelProvider::new(StaticCatalog::new([TypeRef::new(tagged)]), NoViewQueries);
    let first = provider.model().unwrap_err();
    let second = provider.model().unwrap_err();
    assert_eq!(first, second);
    assert!(matches!(first, ModelError::UnsupportedArray { .. }));
    assert!(first.to_string().contains("arrays are not supported"));
}

#[test]
fn test_object_variants() {
    let model = model();
    let schema = model.schema("blogging").unwrap();
    let mut kinds: Vec<(&str, &str)> = schema
        .objects
        .values()
        .map(|o| {
            let kind = match o {
                ObjectModelInfo::Table(_) => "table",
                ObjectModelInfo::View(_) => "view",
                ObjectModelInfo::Mtm(_) => "mtm",
            };
            (o.name(), kind)
        })
        .collect();
    kinds.sort();
    assert_eq!(
        kinds,
        [
            ("Blog", "table"),
            ("BlogSummary", "view"),
            ("Blog_Post", "mtm"),
            ("Post", "table"),
            ("Post_Tag", "mtm"),
            ("Setting", "table"),
            ("Tag", "table"),
        ]
    );
}
