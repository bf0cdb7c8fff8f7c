mod helpers;

use helpers::test_db;
use lustre::db::{migrations, schema};
use rusqlite::Connection;

#[test]
fn fresh_database_reaches_current_version() {
    let conn = test_db();
    assert_eq!(
        migrations::get_schema_version(&conn).unwrap(),
        migrations::CURRENT_SCHEMA_VERSION
    );
}

#[test]
fn migrations_are_idempotent() {
    let conn = test_db();
    migrations::run_migrations(&conn).unwrap();
    migrations::run_migrations(&conn).unwrap();
    assert_eq!(
        migrations::get_schema_version(&conn).unwrap(),
        migrations::CURRENT_SCHEMA_VERSION
    );
}

#[test]
fn migrations_keep_existing_products() {
    let conn = Connection::open_in_memory().unwrap();
    schema::init_schema(&conn).unwrap();
    conn.execute(
        "INSERT INTO products (sku, title, image_path) VALUES ('R1', 'Ring', 'imgs/R1.jpg')",
        [],
    )
    .unwrap();

    migrations::run_migrations(&conn).unwrap();

    let title: String = conn
        .query_row("SELECT title FROM products WHERE sku = 'R1'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(title, "Ring");
}

#[test]
fn fresh_database_has_no_recorded_model() {
    let conn = test_db();
    assert_eq!(migrations::get_embedding_model(&conn).unwrap(), None);
}

#[test]
fn embedding_model_can_be_replaced() {
    let conn = test_db();
    migrations::set_embedding_model(&conn, "clip-ViT-L-14").unwrap();
    assert_eq!(
        migrations::get_embedding_model(&conn).unwrap().as_deref(),
        Some("clip-ViT-L-14")
    );
}
