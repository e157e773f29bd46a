mod common;

use intake_sqlite::{
    open_driver, DataSource, Error, Opened, SqlOptions, SqliteCatalog, SqliteCatalogArgs,
};
use serde_json::json;

use common::{expected_nopk, expected_pk, TempDb, ROWS, TABLE, TABLE_NOPK};

#[test]
fn local_catalog_lists_tables() {
    let db = TempDb::new();
    let catalog = SqliteCatalog::open(db.urlpath()).unwrap();
    assert!(catalog.contains(TABLE));
    assert!(catalog.contains(TABLE_NOPK));
    assert!(!catalog.contains("temp_small"));
    assert_eq!(catalog.names().collect::<Vec<_>>(), vec![TABLE, TABLE_NOPK]);
    assert_eq!(catalog.len(), 2);
}

#[test]
fn catalog_entries_read_their_tables() {
    let db = TempDb::new();
    let catalog = SqliteCatalog::open(db.urlpath()).unwrap();

    let entry = catalog.get(TABLE_NOPK).unwrap();
    assert_eq!(entry.sql_expr(), "SELECT * FROM \"temp_nopk\"");
    assert!(entry.description().starts_with("SQL table temp_nopk from sqlite:///"));
    assert_eq!(catalog.source(TABLE_NOPK).unwrap().read().unwrap(), expected_nopk());

    let keyed = catalog.get(TABLE).unwrap();
    assert_eq!(keyed.sql_options().index_col.as_deref(), Some("pk"));
    assert_eq!(keyed.source().read().unwrap(), expected_pk(0..ROWS));
    assert_eq!(catalog.get(TABLE_NOPK).unwrap().sql_options().index_col, None);
}

#[test]
fn catalog_sql_options_reach_entries() {
    let db = TempDb::new();
    let mut args = SqliteCatalogArgs::new(db.urlpath());
    args.sql_options = SqlOptions {
        index_col: Some("c".into()),
        ..SqlOptions::default()
    };
    let catalog = SqliteCatalog::new(args).unwrap();
    let frame = catalog.source(TABLE).unwrap().read().unwrap();
    assert_eq!(frame.index_name.as_deref(), Some("c"));
    assert_eq!(frame.columns, vec!["pk", "a", "b"]);
    assert_eq!(frame.len(), ROWS as usize);
}

#[test]
fn catalog_with_views() {
    let db = TempDb::new();
    let mut args = SqliteCatalogArgs::new(db.urlpath());
    args.views = true;
    let catalog = SqliteCatalog::new(args).unwrap();
    assert!(catalog.contains("temp_small"));
    let frame = catalog.source("temp_small").unwrap().read().unwrap();
    assert_eq!(frame.len(), 10);
}

#[test]
fn unknown_entry() {
    let db = TempDb::new();
    let catalog = SqliteCatalog::open(db.urlpath()).unwrap();
    assert!(catalog.get("missing").is_none());
    assert!(matches!(
        catalog.source("missing"),
        Err(Error::NoSuchEntry(name)) if name == "missing"
    ));
}

#[test]
fn catalog_iterates_entries() {
    let db = TempDb::new();
    let catalog = SqliteCatalog::open(db.urlpath()).unwrap();
    let names: Vec<_> = catalog.into_inner().entries().iter().map(|e| e.name().to_owned()).collect();
    assert_eq!(names, vec![TABLE, TABLE_NOPK]);
}

#[test]
fn catalog_options_are_kept() {
    let db = TempDb::new();
    let opened = open_driver(
        "sqlite_cat",
        json!({
            "urlpath": db.urlpath(),
            "name": "fixture",
            "description": "test tables",
            "metadata": {"version": 1},
        }),
    )
    .unwrap();
    let catalog = match opened {
        Opened::Catalog(catalog) => catalog,
        other => panic!("expected a catalog, got {:?}", other),
    };
    assert_eq!(catalog.name(), Some("fixture"));
    assert_eq!(catalog.description(), Some("test tables"));
    assert_eq!(catalog.metadata().get("version"), Some(&json!(1)));
    assert!(catalog.contains(TABLE));
}

#[test]
fn drivers_open_sources_from_json() {
    let db = TempDb::new();
    let opened = open_driver(
        "sqlite_manual",
        json!({
            "urlpath": db.urlpath(),
            "sql_expr": "SELECT * FROM temp",
            "where_values": ["WHERE pk < 20", "WHERE pk >= 20"],
            "sql_kwargs": {"index_col": "pk"},
        }),
    )
    .unwrap();
    let mut source = match opened {
        Opened::Source(source) => source,
        other => panic!("expected a source, got {:?}", other),
    };
    assert_eq!(source.npartitions().unwrap(), 2);
    assert_eq!(source.read().unwrap(), expected_pk(0..ROWS));

    let opened = open_driver(
        "sqlite_auto",
        json!({
            "urlpath": db.urlpath(),
            "table": TABLE,
            "index": "pk",
            "sql_kwargs": {"npartitions": 4},
        }),
    )
    .unwrap();
    if let Opened::Source(mut source) = opened {
        assert_eq!(source.npartitions().unwrap(), 4);
        assert_eq!(source.read().unwrap(), expected_pk(0..ROWS));
    } else {
        panic!("expected a source");
    }
}

#[test]
#[ignore = "requires network access"]
fn remote_sqlite_catalog() {
    let cache = tempfile::tempdir().unwrap();
    let catalog = open_driver(
        "sqlite_cat",
        json!({
            "urlpath": "https://global-power-plants.datasettes.com/global-power-plants.db",
            "open_kwargs": {"cache_storage": cache.path()},
        }),
    )
    .unwrap();
    match catalog {
        Opened::Catalog(catalog) => {
            assert_eq!(catalog.names().next(), Some("global-power-plants"))
        }
        other => panic!("expected a catalog, got {:?}", other),
    }
}
