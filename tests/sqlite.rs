//! End-to-end tests against in-memory SQLite: DDL, whitelist caching,
//! filtering, pagination, failure semantics.

use pretty_assertions::assert_eq;
use quern::{
    Bindings, ColumnDef, ColumnType, Connection, ConnectionConfig, Error, Registry, SqlDialect,
    Value,
};

/// Fresh in-memory database with `users` and `posts` tables and seed rows.
fn seeded() -> Connection {
    let conn = Connection::connect(ConnectionConfig::sqlite_in_memory()).unwrap();
    let dialect = conn.dialect().renderer();

    let users = [
        ColumnDef::id("id"),
        ColumnDef::new("name", ColumnType::Varchar(64)),
        ColumnDef::new("role", ColumnType::Varchar(32)).indexed("by_role"),
        ColumnDef::new("logins", ColumnType::Int).default_value(0),
    ];
    let posts = [
        ColumnDef::id("id"),
        ColumnDef::new("user_id", ColumnType::Int),
        ColumnDef::new("title", ColumnType::Varchar(128)),
    ];
    for table in [("users", &users[..]), ("posts", &posts[..])] {
        for sql in dialect.create_table(table.0, table.1).unwrap() {
            conn.execute(&sql, &Bindings::new()).unwrap();
        }
    }

    for (name, role, logins) in [
        ("ada", "admin", 5i64),
        ("bob", "user", 2),
        ("cyd", "admin", 9),
        ("dee", "editor", 1),
        ("eve", "admin", 3),
    ] {
        conn.table("users")
            .unwrap()
            .values([
                ("name", Value::from(name)),
                ("role", Value::from(role)),
                ("logins", Value::from(logins)),
            ])
            .insert()
            .unwrap();
    }
    for (user_id, title) in [(1i64, "hello"), (3, "world")] {
        conn.table("posts")
            .unwrap()
            .values([("user_id", Value::from(user_id)), ("title", Value::from(title))])
            .insert()
            .unwrap();
    }
    conn
}

#[test]
fn create_table_then_validate_round_trip() {
    let conn = seeded();
    let dialect = conn.dialect().renderer();

    let cols = [
        ColumnDef::id("id"),
        ColumnDef::new("label", ColumnType::Varchar(32)).unique(),
        ColumnDef::new("body", ColumnType::Text).nullable(),
    ];
    for sql in dialect.create_table("tags", &cols).unwrap() {
        conn.execute(&sql, &Bindings::new()).unwrap();
    }
    // The whitelist was already populated by the seeding queries.
    conn.refresh_schema();

    assert!(conn.validate_table("tags"));
    for col in &cols {
        assert!(
            conn.validate_column("tags", &col.name),
            "column {} should validate",
            col.name
        );
    }
    assert!(!conn.validate_column("tags", "ghost"));
}

#[test]
fn quoted_column_names_unquote_back() {
    let conn = seeded();
    let dialect = conn.dialect().renderer();
    let pairs = [
        ("users", &["id", "name", "role", "logins"][..]),
        ("posts", &["id", "user_id", "title"][..]),
    ];
    for (table, columns) in pairs {
        for column in columns {
            let quoted = dialect.column_name(&conn, table, column, false).unwrap();
            assert_eq!(dialect.unquote_identifier(&quoted), *column);
        }
    }
}

#[test]
fn admins_ordered_and_paged_with_full_total() {
    let conn = seeded();

    // Page 1 of 2: exactly the first two admins in name order.
    let page = conn
        .table("users")
        .unwrap()
        .filter([("role", "admin")])
        .order("name")
        .page(1, 2)
        .unwrap();
    let names: Vec<&Value> = page.iter().filter_map(|row| row.get("name")).collect();
    assert_eq!(
        names,
        vec![&Value::Text("ada".into()), &Value::Text("cyd".into())]
    );

    // Total reflects every admin, not the page size.
    let info = page.page_info().unwrap();
    assert_eq!(info.total, 3);
    assert_eq!(info.page, 1);
    assert_eq!(info.page_size, 2);
    assert_eq!(info.offset, 0);

    // Second page holds the remainder.
    let page = conn
        .table("users")
        .unwrap()
        .filter([("role", "admin")])
        .order("name")
        .page(2, 2)
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].get("name"), Some(&Value::Text("eve".into())));
    assert_eq!(page.page_info().unwrap().offset, 2);
}

#[test]
fn insert_drops_unknown_column_from_sql() {
    let conn = seeded();
    let id = conn
        .table("users")
        .unwrap()
        .values([("name", Value::from("zed")), ("ghost", Value::from("boo"))])
        .insert()
        .unwrap();
    assert!(id.is_some());

    // The column is absent from the emitted SQL, not merely unbound.
    let entry = conn.trace().last().cloned().unwrap();
    assert!(entry.query.starts_with(r#"INSERT INTO "users""#));
    assert!(entry.query.contains("name"));
    assert!(!entry.query.contains("ghost"));
    assert_eq!(entry.error, None);
}

#[test]
fn select_with_join_and_distinct() {
    let conn = seeded();
    let rows = conn
        .table("users")
        .unwrap()
        .select(&["name", "posts.title"])
        .distinct(true)
        .inner_join("posts", "posts.user_id = users.id")
        .order("users.name")
        .all()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&Value::Text("ada".into())));
    assert_eq!(rows[0].get("title"), Some(&Value::Text("hello".into())));
    assert_eq!(rows[1].get("name"), Some(&Value::Text("cyd".into())));
}

#[test]
fn failure_semantics_trace_and_one_shot_flag() {
    let conn = seeded();
    let bad = "SELECT nope FROM nowhere";

    // Default: swallowed, recorded, empty result.
    let rows = conn.query(bad, &Bindings::new()).unwrap();
    assert!(rows.is_empty());
    assert!(conn.last_error().is_some());
    let entry = conn.trace().last().cloned().unwrap();
    assert_eq!(entry.query, bad);
    assert!(entry.error.is_some());

    // One-shot flag: the next failure propagates, then resets.
    conn.fail_on_next_query(true);
    assert!(matches!(
        conn.query(bad, &Bindings::new()),
        Err(Error::Driver(_))
    ));
    assert!(conn.query(bad, &Bindings::new()).unwrap().is_empty());

    // A success clears the last error.
    conn.table("users").unwrap().count().unwrap();
    assert_eq!(conn.last_error(), None);
}

#[test]
fn builder_fail_on_error_propagates() {
    let conn = seeded();
    // Valid identifiers, unsatisfiable SQL at runtime: a raw fragment
    // referencing a missing function.
    let mut q = conn.table("users").unwrap();
    q.filter("missing_function(name) = 1").fail_on_error(true);
    assert!(matches!(q.all(), Err(Error::Driver(_))));

    let mut q = conn.table("users").unwrap();
    q.filter("missing_function(name) = 1");
    assert!(q.all().unwrap().is_empty());
}

#[test]
fn one_shot_flag_consumed_even_when_fail_on_error_is_set() {
    let conn = seeded();

    // The armed flag and the per-statement setting overlap on one statement.
    conn.fail_on_next_query(true);
    let rows = conn
        .table("users")
        .unwrap()
        .fail_on_error(true)
        .all()
        .unwrap();
    assert_eq!(rows.len(), 5);

    // The flag is spent: a later failure is swallowed as usual.
    let rows = conn
        .query("SELECT nope FROM nowhere", &Bindings::new())
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn typed_rows_decode() {
    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct User {
        name: String,
        logins: i64,
    }

    let conn = seeded();
    let users: Vec<User> = conn
        .table("users")
        .unwrap()
        .select(&["name", "logins"])
        .filter(("logins", ">", 4i64))
        .order("logins")
        .all_as()
        .unwrap();
    assert_eq!(
        users,
        vec![
            User {
                name: "ada".into(),
                logins: 5
            },
            User {
                name: "cyd".into(),
                logins: 9
            }
        ]
    );
}

#[test]
fn debug_mode_renders_without_executing() {
    let conn = seeded();
    let statements_before = conn.trace().len();

    let mut q = conn.table("users").unwrap();
    q.debug(true).filter([("role", "admin")]);
    let rows = q.all().unwrap();
    assert!(rows.is_empty());

    let out = q.take_debug().unwrap();
    assert!(out.query.contains(r#"WHERE "users"."role" = :role_"#));
    assert_eq!(out.bindings.len(), 1);
    assert_eq!(conn.trace().len(), statements_before);
}

#[test]
fn column_values_are_primary_key_ordered() {
    let conn = seeded();
    let logins = conn.table("users").unwrap().column("logins").unwrap();
    assert_eq!(
        logins,
        vec![
            Value::Int(5),
            Value::Int(2),
            Value::Int(9),
            Value::Int(1),
            Value::Int(3)
        ]
    );
}

#[test]
fn now_literal_passes_through_unbound() {
    let conn = Connection::connect(ConnectionConfig::sqlite_in_memory()).unwrap();
    let dialect = conn.dialect().renderer();
    let cols = [
        ColumnDef::id("id"),
        ColumnDef::new("title", ColumnType::Varchar(64)),
        ColumnDef::new("created", ColumnType::Timestamp).nullable(),
    ];
    for sql in dialect.create_table("notes", &cols).unwrap() {
        conn.execute(&sql, &Bindings::new()).unwrap();
    }

    conn.table("notes")
        .unwrap()
        .values([("title", Value::from("x")), ("created", Value::Now)])
        .insert()
        .unwrap();

    let entry = conn.trace().last().cloned().unwrap();
    assert!(entry.query.contains("CURRENT_TIMESTAMP"));
    assert_eq!(entry.bindings.len(), 1, "only the title is bound");

    let row = conn.table("notes").unwrap().first().unwrap().unwrap();
    assert!(matches!(row.get("created"), Some(Value::Text(_))));
}

#[test]
fn registry_holds_independent_connections() {
    let mut registry = Registry::new();
    registry
        .connect(ConnectionConfig::sqlite_in_memory().with_id("app"))
        .unwrap();
    registry
        .connect(ConnectionConfig::sqlite_in_memory().with_id("analytics"))
        .unwrap();

    let app = registry.get("app").unwrap();
    app.execute("CREATE TABLE only_here (id INTEGER)", &Bindings::new())
        .unwrap();
    app.refresh_schema();
    assert!(app.validate_table("only_here"));

    let analytics = registry.get("analytics").unwrap();
    assert!(!analytics.validate_table("only_here"));
}
