//! Tests d'intégration PostgreSQL
//!
//! Ces tests nécessitent une base PostgreSQL/PostGIS disponible.
//! Configuration via variables d'environnement:
//! - PGHOST, PGPORT, PGUSER, PGPASSWORD, PGDATABASE
//!
//! Chaque test recrée son propre schéma à partir de `sql/toponyms.sql`.
//!
//! Exécution:
//! ```bash
//! # Avec Docker
//! docker run -d --name postgis-test -e POSTGRES_PASSWORD=test -p 5432:5432 postgis/postgis
//! PGUSER=postgres PGPASSWORD=test PGDATABASE=postgres \
//!     cargo test -p toponyms-pg --test postgres_integration -- --ignored
//! ```

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use deadpool_postgres::Pool;
use geo::{Geometry, Point};

use toponyms_pg::config::Provenance;
use toponyms_pg::names::derive_names;
use toponyms_pg::versioning::{
    geometry_hash, EntityChange, EntityDeletion, EntityUpsert, UpsertResult,
};
use toponyms_pg::{
    create_pool, DatabaseConfig, EntityType, LoadOptions, LoadStatus, PipelineConfig,
    PostgresSink, RetryPolicy, StoreClient, TemporalMode,
};

const DDL: &str = include_str!("../../sql/toponyms.sql");

/// Configuration de test
fn test_config() -> DatabaseConfig {
    let mut config = DatabaseConfig::from_env();
    if std::env::var("PGDATABASE").is_err() {
        config.dbname = "toponyms_test".into();
    }
    config
}

/// Recrée un schéma de test à partir du DDL de référence
async fn setup_test_schema(pool: &Pool, schema: &str) -> Result<()> {
    let client = pool.get().await?;
    client
        .batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE;", schema))
        .await?;
    client.batch_execute(&DDL.replace("toponyms", schema)).await?;
    Ok(())
}

async fn test_client(schema: &str) -> StoreClient {
    let pool = create_pool(&test_config()).expect("Failed to create pool");
    setup_test_schema(&pool, schema)
        .await
        .expect("Failed to setup schema");
    StoreClient::new(pool, RetryPolicy::default(), schema)
}

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

fn city(version: i32, name: &str, lon: f64, valid_start: DateTime<Utc>) -> EntityChange {
    let tags: osmhist::Tags = [("place", "city"), ("name", name)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let geometry = Geometry::Point(Point::new(lon, 47.10));

    EntityUpsert {
        osm_type: osmhist::ElementKind::Node,
        osm_id: 42,
        osm_version: version,
        entity_type: EntityType::City,
        geom_hash: geometry_hash(&geometry),
        geometry,
        valid_start,
        names: derive_names(&tags, &Default::default()),
    }
    .into()
}

fn city_deleted(version: i32, deleted_at: DateTime<Utc>) -> EntityChange {
    EntityDeletion {
        osm_type: osmhist::ElementKind::Node,
        osm_id: 42,
        osm_version: version,
        entity_type: EntityType::City,
        deleted_at,
    }
    .into()
}

async fn count(client: &StoreClient, query: &str) -> i64 {
    let conn = client.acquire().await.expect("Failed to get client");
    conn.query_one(query, &[])
        .await
        .expect("Failed to count")
        .get(0)
}

/// Test de vérification du système
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_verify_system() {
    let client = test_client("toponyms_it_verify").await;

    let status = client.verify().await.expect("Verification failed");
    assert!(status.is_ready(), "missing: {:?}", status.missing_tables);
    assert!(!status.postgis_version.is_empty());

    let supported = client.supported_types().await;
    assert_eq!(supported.len(), EntityType::ALL.len());
}

/// Un point nommé donne une entité et un nom; le rechargement ne duplique rien
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_load_and_reload_is_idempotent() {
    let schema = "toponyms_it_reload";
    let client = test_client(schema).await;

    let mut file = tempfile::Builder::new()
        .suffix(".osh.jsonl")
        .tempfile()
        .unwrap();
    writeln!(
        file,
        r#"{{"type":"node","meta":{{"id":1,"version":1,"timestamp":"2021-05-01T10:00:00Z"}},"tags":{{"place":"city","name":"Foo"}},"lon":37.55,"lat":47.10}}"#
    )
    .unwrap();
    file.flush().unwrap();

    let mut config = PipelineConfig::from_preset("mariupol").unwrap();
    config.schema = schema.into();
    let options = LoadOptions {
        mode: TemporalMode::Full,
        label: "full".into(),
        query_date: None,
    };

    let mut sink = PostgresSink::new(client, Provenance::default()).await;
    let first = toponyms_pg::load(file.path(), &config, &options, &mut sink)
        .await
        .unwrap();
    let second = toponyms_pg::load(file.path(), &config, &options, &mut sink)
        .await
        .unwrap();

    assert_eq!(first.status, LoadStatus::Success);
    assert_eq!(first.entities_inserted, 1);
    assert_eq!(first.names.inserted, 1);
    assert_eq!(second.entities_unchanged, 1);
    assert_eq!(second.names.inserted, 0);

    let client = sink.client();
    let entities = count(client, &format!("SELECT COUNT(*) FROM {}.entities", schema)).await;
    let names = count(
        client,
        &format!(
            "SELECT COUNT(*) FROM {}.names WHERE name_text = 'Foo' AND language_code = 'ukr' AND name_kind = 'official'",
            schema
        ),
    )
    .await;
    assert_eq!(entities, 1);
    assert_eq!(names, 1);
}

/// Un renommage ferme l'ancien nom et ouvre le nouveau
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_rename_supersedes_name() {
    let schema = "toponyms_it_rename";
    let client = test_client(schema).await;
    let provenance = Provenance::default();

    let batch = vec![
        city(1, "Жданов", 37.55, at(2010, 1, 1)),
        city(2, "Маріуполь", 37.55, at(2016, 5, 1)),
    ];
    let outcome = client.write_batch(&batch, &provenance).await.unwrap();
    assert_eq!(outcome.failures.len(), 0);
    assert_eq!(outcome.written[0].outcome.entity, UpsertResult::Inserted);
    assert_eq!(outcome.written[1].outcome.entity, UpsertResult::Unchanged);
    assert_eq!(outcome.written[1].outcome.names.superseded, 1);

    let conn = client.acquire().await.unwrap();
    let rows = conn
        .query(
            &format!(
                "SELECT name_text, valid_start, valid_end FROM {}.names ORDER BY valid_start",
                schema
            ),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let old_end: Option<DateTime<Utc>> = rows[0].get("valid_end");
    let new_start: DateTime<Utc> = rows[1].get("valid_start");
    let new_end: Option<DateTime<Utc>> = rows[1].get("valid_end");
    assert_eq!(rows[0].get::<_, String>("name_text"), "Жданов");
    assert_eq!(old_end, Some(at(2016, 5, 1)));
    assert_eq!(new_start, at(2016, 5, 1));
    assert!(new_end.is_none());
}

/// Une géométrie modifiée ferme la version courante de l'entité
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_moved_entity_gets_new_version() {
    let schema = "toponyms_it_moved";
    let client = test_client(schema).await;
    let provenance = Provenance::default();

    client
        .write_batch(&[city(1, "Foo", 37.55, at(2020, 1, 1))], &provenance)
        .await
        .unwrap();
    let outcome = client
        .write_batch(&[city(2, "Foo", 37.60, at(2021, 1, 1))], &provenance)
        .await
        .unwrap();
    assert_eq!(outcome.written[0].outcome.entity, UpsertResult::Updated);

    let open = count(
        &client,
        &format!("SELECT COUNT(*) FROM {}.entities WHERE valid_end IS NULL", schema),
    )
    .await;
    let total = count(&client, &format!("SELECT COUNT(*) FROM {}.entities", schema)).await;
    assert_eq!(open, 1);
    assert_eq!(total, 2);
}

/// Une suppression ferme l'entité courante et ses noms
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_deletion_closes_entity_and_names() {
    let schema = "toponyms_it_deleted";
    let client = test_client(schema).await;
    let provenance = Provenance::default();

    let batch = vec![
        city(1, "Foo", 37.55, at(2020, 1, 1)),
        city_deleted(2, at(2022, 4, 1)),
        // Rien à fermer: la suppression est rejouée
        city_deleted(2, at(2022, 4, 1)),
    ];
    let outcome = client.write_batch(&batch, &provenance).await.unwrap();
    assert_eq!(outcome.failures.len(), 0);
    assert_eq!(outcome.written[1].outcome.entity, UpsertResult::Closed);
    assert_eq!(outcome.written[1].outcome.names.closed, 1);
    assert_eq!(outcome.written[2].outcome.entity, UpsertResult::Unchanged);
    assert_eq!(outcome.written[2].outcome.entity_id, None);

    let open_entities = count(
        &client,
        &format!("SELECT COUNT(*) FROM {}.entities WHERE valid_end IS NULL", schema),
    )
    .await;
    let open_names = count(
        &client,
        &format!("SELECT COUNT(*) FROM {}.names WHERE valid_end IS NULL", schema),
    )
    .await;
    assert_eq!(open_entities, 0);
    assert_eq!(open_names, 0);
}

/// À instant de début égal, la première version écrite est conservée
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_same_start_keeps_first_version() {
    let schema = "toponyms_it_same_start";
    let client = test_client(schema).await;
    let provenance = Provenance::default();
    let query_date = at(2022, 2, 23);

    let batch = vec![
        city(1, "Жданов", 37.55, query_date),
        city(3, "Маріуполь", 37.60, query_date),
    ];
    let outcome = client.write_batch(&batch, &provenance).await.unwrap();
    assert_eq!(outcome.written[1].outcome.entity, UpsertResult::Unchanged);
    assert_eq!(outcome.written[1].outcome.names.unchanged, 1);

    let conn = client.acquire().await.unwrap();
    let row = conn
        .query_one(
            &format!(
                "SELECT e.osm_version, n.name_text FROM {0}.entities e
                 JOIN {0}.names n USING (entity_id)",
                schema
            ),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(row.get::<_, i32>("osm_version"), 1);
    assert_eq!(row.get::<_, String>("name_text"), "Жданов");
}
