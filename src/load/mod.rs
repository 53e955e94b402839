// src/load/mod.rs

pub mod db;
pub mod mapping;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use csv::StringRecord;
use std::{collections::HashSet, path::Path};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::{LoadConfig, LoadMode};
use crate::utils::{clean_text, non_null, parse_numeric};
use db::{Table, Value};
use mapping::{
    normalize_grade, source_for, FieldKind, CODE_COLUMN, GRADE_COLUMN, NAME_COLUMN,
    PRODUCT_COLUMNS,
};

/// Counters for one load run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows_read: usize,
    /// Rows without a usable barcode or name.
    pub dropped_invalid: usize,
    /// Rows whose barcode already appeared earlier in the input.
    pub dropped_duplicate: usize,
    pub inserted: usize,
}

/// The filtered CSV held in memory.
#[derive(Debug)]
pub struct InputCsv {
    pub headers: Vec<String>,
    pub records: Vec<StringRecord>,
}

impl InputCsv {
    pub fn read(path: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("opening input CSV {}", path.display()))?;
        let headers = rdr
            .headers()
            .with_context(|| format!("reading header of {}", path.display()))?
            .iter()
            .map(str::to_string)
            .collect();
        let records = rdr
            .records()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("reading rows of {}", path.display()))?;
        Ok(Self { headers, records })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Where a `Product` column takes its value from.
#[derive(Debug, Clone, Copy)]
enum Source {
    Id,
    Barcode,
    Name,
    Grade(Option<usize>),
    Field(usize, FieldKind),
}

/// Load the filtered CSV at `cfg.input` into the database at `cfg.database`.
#[instrument(level = "info", skip(cfg), fields(input = %cfg.input.display(), database = %cfg.database.display(), mode = ?cfg.mode))]
pub fn run_load(cfg: &LoadConfig) -> Result<LoadStats> {
    let mut conn = db::open_database(&cfg.database)?;
    db::apply_schema(&conn, cfg.schema.as_deref())?;

    let input = InputCsv::read(&cfg.input)?;
    info!(rows = input.records.len(), "input read");

    let (table, mut stats) = match cfg.mode {
        LoadMode::Full => shape_products(&input)?,
        LoadMode::Minimal => pass_through(&input),
    };

    let tx = conn.transaction().context("starting insert transaction")?;
    stats.inserted = db::insert_rows(&tx, "Product", &table)?;
    if cfg.mode == LoadMode::Minimal {
        let bundle = cfg
            .bundle_version
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y.%m.%d").to_string());
        db::insert_app_meta(&tx, &bundle, cfg.schema_version, stats.inserted as i64)?;
        debug!(bundle, schema_version = cfg.schema_version, "AppMeta stamped");
    }
    tx.commit().context("committing inserts")?;
    conn.close()
        .map_err(|(_, e)| e)
        .context("closing database")?;

    info!(
        inserted = stats.inserted,
        dropped_invalid = stats.dropped_invalid,
        dropped_duplicate = stats.dropped_duplicate,
        path = %cfg.database.display(),
        "products inserted"
    );
    Ok(stats)
}

/// Map, derive, validate and dedupe the input into `Product` rows.
pub fn shape_products(input: &InputCsv) -> Result<(Table, LoadStats)> {
    let code = input
        .column(CODE_COLUMN)
        .ok_or_else(|| anyhow!("input has no {:?} column", CODE_COLUMN))?;
    let name = input
        .column(NAME_COLUMN)
        .ok_or_else(|| anyhow!("input has no {:?} column", NAME_COLUMN))?;

    let mut plan: Vec<(&str, Source)> = Vec::with_capacity(PRODUCT_COLUMNS.len());
    for &dest in PRODUCT_COLUMNS {
        let src = match dest {
            "id" => Some(Source::Id),
            "barcode" => Some(Source::Barcode),
            "name" => Some(Source::Name),
            "nutriScore" => Some(Source::Grade(input.column(GRADE_COLUMN))),
            _ => source_for(dest)
                .and_then(|(col, kind)| input.column(col).map(|i| Source::Field(i, kind))),
        };
        match src {
            Some(s) => plan.push((dest, s)),
            None => debug!(column = dest, "source column absent, omitted"),
        }
    }

    let mut stats = LoadStats {
        rows_read: input.records.len(),
        ..LoadStats::default()
    };
    let mut seen: HashSet<String> = HashSet::with_capacity(input.records.len());
    let mut rows = Vec::with_capacity(input.records.len());

    for rec in &input.records {
        let field = move |i: usize| rec.get(i).unwrap_or("");
        let (Some(barcode), Some(product_name)) = (clean_text(field(code)), clean_text(field(name)))
        else {
            stats.dropped_invalid += 1;
            continue;
        };
        if seen.contains(&barcode) {
            stats.dropped_duplicate += 1;
            continue;
        }

        let row: Vec<Value> = plan
            .iter()
            .map(|(_, src)| match *src {
                Source::Id => Value::Text(Uuid::new_v4().to_string()),
                Source::Barcode => Value::Text(barcode.clone()),
                Source::Name => Value::Text(product_name.clone()),
                Source::Grade(i) => i
                    .and_then(|i| normalize_grade(field(i)))
                    .map(String::from)
                    .into(),
                Source::Field(i, FieldKind::Text) => non_null(field(i)).map(str::to_string).into(),
                Source::Field(i, FieldKind::Numeric) => parse_numeric(field(i)).into(),
            })
            .collect();

        seen.insert(barcode);
        rows.push(row);
    }

    let table = Table {
        columns: plan.iter().map(|(c, _)| c.to_string()).collect(),
        rows,
    };
    Ok((table, stats))
}

/// Input columns and values unchanged, null sentinels as NULL.
pub fn pass_through(input: &InputCsv) -> (Table, LoadStats) {
    let rows: Vec<Vec<Value>> = input
        .records
        .iter()
        .map(|rec| {
            (0..input.headers.len())
                .map(|i| Value::from(non_null(rec.get(i).unwrap_or("")).map(str::to_string)))
                .collect()
        })
        .collect();
    let stats = LoadStats {
        rows_read: input.records.len(),
        ..LoadStats::default()
    };
    (
        Table {
            columns: input.headers.clone(),
            rows,
        },
        stats,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use rusqlite::Connection;
    use std::fs;
    use tempfile::tempdir;

    const HEADER: &str = "code,product_name,brands,categories,quantity,nutriscore_grade,nutriscore_score,nova_group,energy-kcal_100g,proteins_100g,carbohydrates_100g,sugars_100g,fat_100g,saturated-fat_100g,fiber_100g,salt_100g,sodium_100g";

    fn config(dir: &Path, csv: &str) -> Result<LoadConfig> {
        let input = dir.join("products_clean.csv");
        fs::write(&input, csv)?;
        Ok(LoadConfig {
            input,
            database: dir.join("assets").join("db").join("nutriscore.db"),
            ..LoadConfig::default()
        })
    }

    fn filtered(rows: &[&str]) -> String {
        let mut s = HEADER.to_string();
        for r in rows {
            s.push('\n');
            s.push_str(r);
        }
        s.push('\n');
        s
    }

    fn count(conn: &Connection, sql: &str) -> Result<i64> {
        Ok(conn.query_row(sql, [], |r| r.get(0))?)
    }

    #[test]
    fn duplicate_barcode_keeps_first() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(
            dir.path(),
            &filtered(&[
                "789,First,BrandA,,,a,1,1,100,,,,,,,,",
                "789,Second,BrandB,,,b,2,2,200,,,,,,,,",
                "790,Other,,,,,,,50,,,,,,,,",
            ]),
        )?;

        let stats = run_load(&cfg)?;
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.dropped_duplicate, 1);

        let conn = Connection::open(&cfg.database)?;
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM Product WHERE barcode = '789'")?, 1);
        let (name, brand): (String, String) = conn.query_row(
            "SELECT name, brand FROM Product WHERE barcode = '789'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        assert_eq!(name, "First");
        assert_eq!(brand, "BrandA");
        Ok(())
    }

    #[test]
    fn grade_and_numeric_normalisation() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(
            dir.path(),
            &filtered(&[
                "1,Iogurte,,,,c,3,n/a,12.5,4,,,,,,,",
                "2,Sal,,,,X,,,0,,,,,,,1e2,",
                "3,Pão,,,,b,,,250,,,,,,,,",
            ]),
        )?;
        run_load(&cfg)?;

        let conn = Connection::open(&cfg.database)?;
        let grade = |code: &str| -> Result<Option<String>> {
            Ok(conn.query_row(
                "SELECT nutriScore FROM Product WHERE barcode = ?1",
                [code],
                |r| r.get(0),
            )?)
        };
        assert_eq!(grade("1")?.as_deref(), Some("C"));
        assert_eq!(grade("2")?, None);
        assert_eq!(grade("3")?.as_deref(), Some("B"));

        let (kcal, nova, score): (f64, Option<f64>, f64) = conn.query_row(
            "SELECT energyKcal_100g, novaGroup, nutriScoreScore FROM Product WHERE barcode = '1'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        assert_eq!(kcal, 12.5);
        assert_eq!(nova, None);
        assert_eq!(score, 3.0);

        let salt: f64 = conn.query_row(
            "SELECT salt_100g FROM Product WHERE barcode = '2'",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(salt, 100.0);
        Ok(())
    }

    #[test]
    fn drops_rows_without_barcode_or_name() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(
            dir.path(),
            &filtered(&[
                ",No code,,,,,,,1,,,,,,,,",
                "  ,Blank code,,,,,,,1,,,,,,,,",
                "10,   ,,,,,,,1,,,,,,,,",
                "11,nan,,,,,,,1,,,,,,,,",
                " 12 ,  Trimmed  ,,,,,,,1,,,,,,,,",
            ]),
        )?;

        let stats = run_load(&cfg)?;
        assert_eq!(stats.dropped_invalid, 4);
        assert_eq!(stats.inserted, 1);

        let conn = Connection::open(&cfg.database)?;
        let (barcode, name): (String, String) =
            conn.query_row("SELECT barcode, name FROM Product", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })?;
        assert_eq!(barcode, "12");
        assert_eq!(name, "Trimmed");
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM Product WHERE barcode = '' OR name = ''")?,
            0
        );
        Ok(())
    }

    #[test]
    fn barcode_keeps_leading_zeros() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(dir.path(), &filtered(&["0012345,Bolacha,,,,,,,480,,,,,,,,"]))?;
        run_load(&cfg)?;
        let conn = Connection::open(&cfg.database)?;
        let barcode: String = conn.query_row("SELECT barcode FROM Product", [], |r| r.get(0))?;
        assert_eq!(barcode, "0012345");
        Ok(())
    }

    #[test]
    fn absent_optional_columns_are_omitted() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(dir.path(), "code,product_name\n1,Água\n")?;
        run_load(&cfg)?;

        let conn = Connection::open(&cfg.database)?;
        let (brand, grade, kcal): (Option<String>, Option<String>, Option<f64>) = conn
            .query_row(
                "SELECT brand, nutriScore, energyKcal_100g FROM Product",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?;
        assert_eq!((brand, grade, kcal), (None, None, None));
        Ok(())
    }

    #[test]
    fn plan_follows_product_column_order() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("in.csv");
        fs::write(&path, "countries_tags,brands,product_name,code\nen:spain,Hacendado,Leche,5\n")?;
        let (table, _) = shape_products(&InputCsv::read(&path)?)?;
        assert_eq!(
            table.columns,
            vec!["id", "barcode", "name", "brand", "countries", "nutriScore"]
        );
        assert_eq!(table.rows[0][1], Value::Text("5".into()));
        assert_eq!(table.rows[0][4], Value::Text("en:spain".into()));
        Ok(())
    }

    #[test]
    fn rebuild_is_repeatable_and_ids_are_unique() -> Result<()> {
        let dir = tempdir()?;
        let csv = filtered(&[
            "1,A,,,,a,,,1,,,,,,,,",
            "2,B,,,,e,,,2,,,,,,,,",
            "2,B again,,,,e,,,2,,,,,,,,",
        ]);
        let first = config(dir.path(), &csv)?;
        let mut second = first.clone();
        second.database = dir.path().join("other.db");

        let a = run_load(&first)?;
        let b = run_load(&second)?;
        assert_eq!(a, b);

        let dump = |path: &Path| -> Result<Vec<(String, String, Option<String>)>> {
            let conn = Connection::open(path)?;
            let mut stmt =
                conn.prepare("SELECT barcode, name, nutriScore FROM Product ORDER BY barcode")?;
            let rows = stmt
                .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        };
        assert_eq!(dump(&first.database)?, dump(&second.database)?);

        let conn = Connection::open(&first.database)?;
        assert_eq!(count(&conn, "SELECT COUNT(DISTINCT id) FROM Product")?, 2);
        Ok(())
    }

    #[test]
    fn rerun_appends() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(dir.path(), &filtered(&["1,A,,,,,,,1,,,,,,,,"]))?;
        run_load(&cfg)?;
        run_load(&cfg)?;
        let conn = Connection::open(&cfg.database)?;
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM Product")?, 2);
        Ok(())
    }

    #[test]
    fn missing_code_column_aborts() -> Result<()> {
        let dir = tempdir()?;
        let cfg = config(dir.path(), "product_name\nBread\n")?;
        let err = run_load(&cfg).unwrap_err();
        assert!(err.to_string().contains("code"));
        Ok(())
    }

    #[test]
    fn custom_schema_script_is_used() -> Result<()> {
        let dir = tempdir()?;
        let schema = dir.path().join("schema.sql");
        fs::write(
            &schema,
            "CREATE TABLE IF NOT EXISTS Product (id TEXT, barcode TEXT, name TEXT, nutriScore TEXT);",
        )?;
        let mut cfg = config(dir.path(), "code,product_name\n1,Água\n")?;
        cfg.schema = Some(schema);
        assert_eq!(run_load(&cfg)?.inserted, 1);

        // schema that does not fit the mapped columns makes the run fail
        fs::write(dir.path().join("schema.sql"), "CREATE TABLE IF NOT EXISTS Other (x);")?;
        cfg.database = dir.path().join("fresh.db");
        assert!(run_load(&cfg).is_err());
        Ok(())
    }

    #[test]
    fn minimal_mode_passes_through_and_stamps_meta() -> Result<()> {
        let dir = tempdir()?;
        let mut cfg = config(
            dir.path(),
            "id,barcode,name,nutriScore,energyKcal_100g\nid-1,001,Pão,B,250\nid-2,001,Arroz,,\n",
        )?;
        cfg.mode = LoadMode::Minimal;
        cfg.bundle_version = Some("2024.11.02".into());
        cfg.schema_version = 2;

        let stats = run_load(&cfg)?;
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.dropped_invalid + stats.dropped_duplicate, 0);

        let conn = Connection::open(&cfg.database)?;
        // no dedupe in pass-through
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM Product WHERE barcode = '001'")?, 2);
        let grade: Option<String> =
            conn.query_row("SELECT nutriScore FROM Product WHERE id = 'id-2'", [], |r| {
                r.get(0)
            })?;
        assert_eq!(grade, None);

        let (bundle, schema, rows): (String, i64, i64) = conn.query_row(
            "SELECT bundleVersion, schemaVersion, rowCount FROM AppMeta",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        assert_eq!(bundle, "2024.11.02");
        assert_eq!(schema, 2);
        assert_eq!(rows, 2);
        Ok(())
    }

    #[test]
    fn minimal_mode_defaults_bundle_version_to_today() -> Result<()> {
        let dir = tempdir()?;
        let mut cfg = config(dir.path(), "id,barcode,name\nid-1,1,Leite\n")?;
        cfg.mode = LoadMode::Minimal;
        run_load(&cfg)?;

        let conn = Connection::open(&cfg.database)?;
        let bundle: String =
            conn.query_row("SELECT bundleVersion FROM AppMeta", [], |r| r.get(0))?;
        assert_eq!(bundle, Utc::now().format("%Y.%m.%d").to_string());
        Ok(())
    }
}
