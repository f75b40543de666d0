//! Schema migration tests

use dagwallet_storage_sqlite::migrations;
use dagwallet_storage_sqlite::{Database, Error};
use rusqlite::Connection;
use tempfile::NamedTempFile;

fn tables(conn: &Connection) -> Vec<String> {
    conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn test_fresh_migration() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();

    migrations::run_migrations(&conn).unwrap();

    let tables = tables(&conn);
    for name in [
        "manager_meta",
        "scopes",
        "accounts",
        "addresses",
        "sync_state",
        "sync_blocks",
        "ledger_blocks",
        "ledger_txs",
        "ledger_credits",
        "ledger_debits",
        "schema_version",
    ] {
        assert!(tables.contains(&name.to_string()), "missing table {}", name);
    }
}

#[test]
fn test_migration_idempotency() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();

    migrations::run_migrations(&conn).unwrap();
    migrations::run_migrations(&conn).unwrap();

    assert_eq!(
        migrations::get_schema_version(&conn).unwrap(),
        migrations::SCHEMA_VERSION
    );
}

#[test]
fn test_older_schema_needs_explicit_upgrade() {
    let file = NamedTempFile::new().unwrap();
    {
        // Strip the ledger back off to get a v1 database
        let conn = Connection::open(file.path()).unwrap();
        migrations::run_migrations(&conn).unwrap();
        conn.execute_batch(
            r#"
            DROP TABLE ledger_debits;
            DROP TABLE ledger_credits;
            DROP TABLE ledger_txs;
            DROP TABLE ledger_blocks;
            DELETE FROM schema_version WHERE version = 2;
            "#,
        )
        .unwrap();
    }

    assert!(matches!(Database::open(file.path()), Err(Error::Upgrade(_))));

    Database::upgrade(file.path()).unwrap();
    let db = Database::open(file.path()).unwrap();
    let version = db.read(migrations::get_schema_version).unwrap();
    assert_eq!(version, migrations::SCHEMA_VERSION);
}

#[test]
fn test_newer_schema_is_rejected() {
    let file = NamedTempFile::new().unwrap();
    {
        let conn = Connection::open(file.path()).unwrap();
        migrations::run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migrations::SCHEMA_VERSION + 1],
        )
        .unwrap();
    }

    assert!(matches!(Database::open(file.path()), Err(Error::Upgrade(_))));
    assert!(matches!(
        Database::upgrade(file.path()),
        Err(Error::Upgrade(_))
    ));
}

#[test]
fn test_unique_constraints() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();
    migrations::run_migrations(&conn).unwrap();

    conn.execute(
        "INSERT INTO ledger_txs (hash, block_height, raw, received, is_coinbase) VALUES (X'01', -1, X'00', 0, 0)",
        [],
    )
    .unwrap();
    // Same hash may exist once per height
    conn.execute(
        "INSERT INTO ledger_txs (hash, block_height, raw, received, is_coinbase) VALUES (X'01', 5, X'00', 0, 0)",
        [],
    )
    .unwrap();
    let result = conn.execute(
        "INSERT INTO ledger_txs (hash, block_height, raw, received, is_coinbase) VALUES (X'01', 5, X'00', 0, 0)",
        [],
    );
    assert!(result.is_err());
}

#[test]
fn test_indexes_exist() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();

    migrations::run_migrations(&conn).unwrap();

    let indexes: Vec<String> = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert!(indexes.contains(&"idx_addresses_account".to_string()));
    assert!(indexes.contains(&"idx_ledger_txs_height".to_string()));
    assert!(indexes.contains(&"idx_ledger_credits_address".to_string()));
    assert!(indexes.contains(&"idx_ledger_debits_credit".to_string()));
}
