//! Idempotence, additivity and convergence over arbitrary starting schemas.

use converge::{ColumnSpec, IndexSpec, LogicalType, SqliteBackend, TableSpec};
use proptest::prelude::*;

const TABLE: &str = "user_profiles";

/// Candidate columns after the primary key: (name, type, default).
const COLUMNS: &[(&str, &str, Option<&str>)] = &[
    ("display_name", "varchar(100)", None),
    ("bio", "text", None),
    ("location", "varchar(100)", None),
    ("website", "varchar(255)", None),
    ("is_private", "boolean", Some("0")),
    ("followers", "integer", Some("0")),
    ("score", "real", None),
    ("joined_at", "timestamp", None),
];

fn spec(picked: &[bool], indexed: &[bool]) -> TableSpec {
    let mut builder = TableSpec::builder(TABLE).column(
        ColumnSpec::new("id", LogicalType::Integer)
            .primary_key()
            .auto_increment(),
    );
    for ((name, ty, default), _) in COLUMNS.iter().zip(picked).filter(|(_, p)| **p) {
        let mut col = ColumnSpec::new(*name, ty.parse::<LogicalType>().unwrap());
        if let Some(default) = default {
            col = col.default_expr(*default);
        }
        builder = builder.column(col);
    }
    for ((name, _, _), _) in COLUMNS
        .iter()
        .zip(picked.iter().zip(indexed))
        .filter(|(_, (p, i))| **p && **i)
    {
        builder = builder.index(IndexSpec::on(TABLE, [*name]));
    }
    builder.build().unwrap()
}

/// Create the table with a subset of the target columns plus some extras,
/// and put a row in it.
async fn seed(backend: &mut SqliteBackend, present: &[bool], extras: usize) {
    let mut cols = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    for ((name, _, _), _) in COLUMNS.iter().zip(present).filter(|(_, p)| **p) {
        cols.push(format!("{} TEXT", name));
    }
    for i in 0..extras {
        cols.push(format!("extra_{} TEXT DEFAULT 'keep'", i));
    }
    let ddl = format!("CREATE TABLE {} ({})", TABLE, cols.join(", "));
    sqlx::raw_sql(&ddl)
        .execute(backend.connection())
        .await
        .unwrap();
    sqlx::raw_sql(&format!("INSERT INTO {} DEFAULT VALUES", TABLE))
        .execute(backend.connection())
        .await
        .unwrap();
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn mask() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), COLUMNS.len())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Whatever the table looks like beforehand, one run converges it,
    /// keeps its rows and extra columns, and a second run changes nothing.
    #[test]
    fn reconcile_converges_and_is_idempotent(
        table_exists in any::<bool>(),
        present in mask(),
        picked in mask(),
        indexed in mask(),
        extras in 0usize..3,
    ) {
        let spec = spec(&picked, &indexed);

        runtime().block_on(async {
            let mut backend = SqliteBackend::in_memory().await.unwrap();
            if table_exists {
                seed(&mut backend, &present, extras).await;
            }

            let first = converge::reconcile(&mut backend, &spec).await.unwrap();
            prop_assert!(first.is_success(), "{}", first);
            prop_assert_eq!(first.table_created, !table_exists);

            let verification = converge::verify(&mut backend, &spec).await.unwrap();
            prop_assert!(verification.is_converged(), "{}", verification);

            let second = converge::reconcile(&mut backend, &spec).await.unwrap();
            prop_assert!(second.is_noop(), "{}", second);
            prop_assert_eq!(second.columns_skipped_existing.len(), spec.columns.len());
            prop_assert_eq!(second.indexes_skipped_existing.len(), spec.indexes.len());

            if table_exists {
                let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", TABLE))
                    .fetch_one(backend.connection())
                    .await
                    .unwrap();
                prop_assert_eq!(rows, 1);

                let observed = backend_observe(&mut backend).await;
                for i in 0..extras {
                    let extra = format!("extra_{}", i);
                    prop_assert!(observed.has_column(&extra));
                }
            }
            Ok(())
        })?;
    }

    /// Only missing columns are added, in declared order.
    #[test]
    fn only_missing_columns_are_added(present in mask()) {
        let all = vec![true; COLUMNS.len()];
        let spec = spec(&all, &[false; 8]);

        runtime().block_on(async {
            let mut backend = SqliteBackend::in_memory().await.unwrap();
            seed(&mut backend, &present, 0).await;

            let result = converge::reconcile(&mut backend, &spec).await.unwrap();
            let expected: Vec<String> = COLUMNS
                .iter()
                .zip(&present)
                .filter(|(_, p)| !**p)
                .map(|((name, _, _), _)| name.to_string())
                .collect();
            prop_assert_eq!(result.columns_added, expected);
            Ok(())
        })?;
    }
}

async fn backend_observe(backend: &mut SqliteBackend) -> converge::ObservedSchema {
    use converge::Backend;
    backend.observe(TABLE).await.unwrap()
}
