//! [`SqliteStore`]: the SQLite implementation of [`IngestStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{
  OptionalExtension as _, TransactionBehavior, params, params_from_iter, types::Value,
};

use atlas_core::{
  audit::LoadAttempt,
  country::{CanonicalCountry, CountryUpsert, IsoReferenceEntry, NewCountry},
  dataset::{DatasetDescriptor, DatasetLoadState},
  deposit::{DepositEntity, DetailKind, DetailRecord, LocationDetail, WGS84_SRID, detail_columns},
  indicator::IndicatorFact,
  load::{FailureKind, LoadResult},
  store::IngestStore,
};

use crate::{
  Result,
  encode::{
    RawAttempt, RawCountry, RawLoadState, decode_detail, encode_count, encode_dt, encode_status,
    encode_uuid,
  },
  schema::{COUNTED_TABLES, SCHEMA},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Atlas store backed by a single SQLite file.
///
/// Clones share one connection thread; the handle is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let conn = tokio_rusqlite::Connection::open(&path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "opened sqlite store");
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Keyed upsert helper ─────────────────────────────────────────────────────

/// The message of a constraint violation, or `None` for any other error.
fn constraint_message(err: &rusqlite::Error) -> Option<String> {
  match err {
    rusqlite::Error::SqliteFailure(e, msg) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
      Some(msg.clone().unwrap_or_else(|| e.to_string()))
    }
    _ => None,
  }
}

/// Count a constraint violation against `row`; propagate anything else.
fn record_conflict(
  result: &mut LoadResult,
  row: usize,
  err: rusqlite::Error,
) -> rusqlite::Result<()> {
  match constraint_message(&err) {
    Some(message) => {
      result.fail(row, FailureKind::StorageConflict, message);
      Ok(())
    }
    None => Err(err),
  }
}

/// Run `upsert_sql` for every row inside one immediate transaction.
///
/// `exists_sql` is evaluated with the key parameters first, under the same
/// write lock, to tell inserts from updates.
fn upsert_keyed<T>(
  conn: &mut rusqlite::Connection,
  exists_sql: &str,
  upsert_sql: &str,
  rows: &[T],
  key: impl Fn(&T) -> Vec<Value>,
  values: impl Fn(&T) -> Vec<Value>,
) -> rusqlite::Result<LoadResult> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let mut result = LoadResult::default();
  {
    let mut exists = tx.prepare(exists_sql)?;
    let mut upsert = tx.prepare(upsert_sql)?;
    for (i, row) in rows.iter().enumerate() {
      let existed = exists.exists(params_from_iter(key(row)))?;
      match upsert.execute(params_from_iter(values(row))) {
        Ok(_) if existed => result.updated += 1,
        Ok(_) => result.inserted += 1,
        Err(e) => record_conflict(&mut result, i, e)?,
      }
    }
  }
  tx.commit()?;
  Ok(result)
}

fn text(s: &Option<String>) -> Value { Value::from(s.clone()) }

// ─── IngestStore impl ────────────────────────────────────────────────────────

impl IngestStore for SqliteStore {
  type Error = crate::Error;

  // ── Dataset registry ──────────────────────────────────────────────────────

  async fn seed_datasets(&self, descriptors: Vec<DatasetDescriptor>) -> Result<u64> {
    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0u64;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO dataset_config
               (dataset_id, source_name, source_url, format, update_frequency, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (dataset_id) DO UPDATE
             SET source_name      = excluded.source_name,
                 source_url       = excluded.source_url,
                 format           = excluded.format,
                 update_frequency = excluded.update_frequency,
                 is_active        = excluded.is_active",
          )?;
          for d in &descriptors {
            written += stmt.execute(params![
              d.dataset_id,
              d.display_name,
              d.origin,
              d.format,
              d.cadence,
              d.active,
            ])? as u64;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;
    Ok(written)
  }

  async fn get_dataset(&self, dataset_id: &str) -> Result<Option<DatasetDescriptor>> {
    let id = dataset_id.to_owned();
    let descriptor = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT dataset_id, source_name, source_url, format, update_frequency, is_active
               FROM dataset_config WHERE dataset_id = ?1",
              params![id],
              |row| {
                Ok(DatasetDescriptor {
                  dataset_id:   row.get(0)?,
                  display_name: row.get(1)?,
                  origin:       row.get(2)?,
                  format:       row.get(3)?,
                  cadence:      row.get(4)?,
                  active:       row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    Ok(descriptor)
  }

  // ── ISO reference ─────────────────────────────────────────────────────────

  async fn upsert_iso_entries(&self, entries: Vec<IsoReferenceEntry>) -> Result<LoadResult> {
    let result = self
      .conn
      .call(move |conn| {
        Ok(upsert_keyed(
          conn,
          "SELECT 1 FROM iso_country_codes WHERE iso3 = ?1",
          "INSERT INTO iso_country_codes (iso3, country_name, country_norm, iso2, iso_numeric)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (iso3) DO UPDATE
           SET country_name = excluded.country_name,
               country_norm = excluded.country_norm,
               iso2         = excluded.iso2,
               iso_numeric  = excluded.iso_numeric",
          &entries,
          |e| vec![Value::from(e.iso3.clone())],
          |e| {
            vec![
              Value::from(e.iso3.clone()),
              Value::from(e.display_name.clone()),
              Value::from(e.country_norm.clone()),
              text(&e.iso2),
              text(&e.iso_numeric),
            ]
          },
        )?)
      })
      .await?;
    Ok(result)
  }

  async fn list_iso_entries(&self) -> Result<Vec<IsoReferenceEntry>> {
    let entries = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT country_name, country_norm, iso2, iso3, iso_numeric
           FROM iso_country_codes ORDER BY iso3",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(IsoReferenceEntry {
              display_name: row.get(0)?,
              country_norm: row.get(1)?,
              iso2:         row.get(2)?,
              iso3:         row.get(3)?,
              iso_numeric:  row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(entries)
  }

  // ── Country dimension ─────────────────────────────────────────────────────

  async fn get_or_create_country(&self, input: NewCountry) -> Result<CountryUpsert> {
    let created_at = encode_dt(Utc::now());

    let (raw, created) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // Insert-or-fetch: the UNIQUE(country_norm) constraint decides the
        // winner; losers fall through to the read below.
        let inserted = tx.execute(
          "INSERT INTO dim_country (country_name, country_norm, iso3, created_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (country_norm) DO NOTHING",
          params![input.display_name, input.country_norm, input.iso3, created_at],
        )?;
        if inserted == 0 {
          tx.execute(
            "UPDATE dim_country SET iso3 = ?2
             WHERE country_norm = ?1 AND iso3 IS NULL AND ?2 IS NOT NULL",
            params![input.country_norm, input.iso3],
          )?;
        }
        let raw = tx.query_row(
          &format!("SELECT {} FROM dim_country WHERE country_norm = ?1", RawCountry::COLUMNS),
          params![input.country_norm],
          RawCountry::from_row,
        )?;
        tx.commit()?;
        Ok((raw, inserted == 1))
      })
      .await?;

    Ok(CountryUpsert { country: raw.into_country()?, created })
  }

  async fn find_country(&self, country_norm: &str) -> Result<Option<CanonicalCountry>> {
    let key = country_norm.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM dim_country WHERE country_norm = ?1", RawCountry::COLUMNS),
              params![key],
              RawCountry::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawCountry::into_country).transpose()
  }

  async fn list_countries(&self) -> Result<Vec<CanonicalCountry>> {
    let raws = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM dim_country ORDER BY country_id",
          RawCountry::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawCountry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawCountry::into_country).collect()
  }

  // ── Indicator facts ───────────────────────────────────────────────────────

  async fn upsert_indicators(&self, facts: Vec<IndicatorFact>) -> Result<LoadResult> {
    let result = self
      .conn
      .call(move |conn| {
        Ok(upsert_keyed(
          conn,
          "SELECT 1 FROM country_indicator
           WHERE country_id = ?1 AND dataset_id = ?2 AND indicator_code = ?3 AND year = ?4",
          "INSERT INTO country_indicator (country_id, dataset_id, indicator_code, year, value)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (country_id, dataset_id, indicator_code, year) DO UPDATE
           SET value = excluded.value",
          &facts,
          |f| {
            let (country_id, dataset_id, indicator_code, year) = f.key();
            vec![
              Value::from(country_id),
              Value::from(dataset_id.to_owned()),
              Value::from(indicator_code.to_owned()),
              Value::from(year),
            ]
          },
          |f| {
            let (country_id, dataset_id, indicator_code, year) = f.key();
            vec![
              Value::from(country_id),
              Value::from(dataset_id.to_owned()),
              Value::from(indicator_code.to_owned()),
              Value::from(year),
              Value::from(f.value),
            ]
          },
        )?)
      })
      .await?;
    Ok(result)
  }

  async fn list_indicators(&self, dataset_id: Option<&str>) -> Result<Vec<IndicatorFact>> {
    let filter = dataset_id.map(str::to_owned);
    let facts = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT country_id, dataset_id, indicator_code, year, value
           FROM country_indicator
           WHERE ?1 IS NULL OR dataset_id = ?1
           ORDER BY dataset_id, country_id, indicator_code, year",
        )?;
        let rows = stmt
          .query_map(params![filter], |row| {
            Ok(IndicatorFact {
              country_id:     row.get(0)?,
              dataset_id:     row.get(1)?,
              indicator_code: row.get(2)?,
              year:           row.get(3)?,
              value:          row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(facts)
  }

  // ── Deposits ──────────────────────────────────────────────────────────────

  async fn upsert_deposits(&self, deposits: Vec<DepositEntity>) -> Result<LoadResult> {
    let result = self
      .conn
      .call(move |conn| {
        Ok(upsert_keyed(
          conn,
          "SELECT 1 FROM mrds_deposit WHERE dep_id = ?1",
          "INSERT INTO mrds_deposit
             (dep_id, name, dev_stat, code_list, latitude, longitude, geom, srid)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT (dep_id) DO UPDATE
           SET name      = excluded.name,
               dev_stat  = excluded.dev_stat,
               code_list = excluded.code_list,
               latitude  = excluded.latitude,
               longitude = excluded.longitude,
               geom      = excluded.geom,
               srid      = excluded.srid",
          &deposits,
          |d| vec![Value::from(d.dep_id)],
          |d| {
            let point = d.point();
            vec![
              Value::from(d.dep_id),
              text(&d.name),
              text(&d.dev_stat),
              text(&d.code_list),
              Value::from(d.latitude),
              Value::from(d.longitude),
              Value::from(point.map(|p| p.to_wkt())),
              Value::from(point.map(|_| WGS84_SRID)),
            ]
          },
        )?)
      })
      .await?;
    Ok(result)
  }

  async fn get_deposit(&self, dep_id: i64) -> Result<Option<DepositEntity>> {
    let deposit = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT dep_id, name, dev_stat, code_list, latitude, longitude
               FROM mrds_deposit WHERE dep_id = ?1",
              params![dep_id],
              |row| {
                Ok(DepositEntity {
                  dep_id:    row.get(0)?,
                  name:      row.get(1)?,
                  dev_stat:  row.get(2)?,
                  code_list: row.get(3)?,
                  latitude:  row.get(4)?,
                  longitude: row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    Ok(deposit)
  }

  async fn delete_deposit(&self, dep_id: i64) -> Result<bool> {
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM mrds_deposit WHERE dep_id = ?1", params![dep_id])?)
      })
      .await?;
    Ok(deleted > 0)
  }

  async fn upsert_locations(&self, locations: Vec<LocationDetail>) -> Result<LoadResult> {
    let result = self
      .conn
      .call(move |conn| {
        Ok(upsert_keyed(
          conn,
          "SELECT 1 FROM mrds_location WHERE dep_id = ?1",
          "INSERT INTO mrds_location (dep_id, country_id, state_prov, region, county)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (dep_id) DO UPDATE
           SET country_id = excluded.country_id,
               state_prov = excluded.state_prov,
               region     = excluded.region,
               county     = excluded.county",
          &locations,
          |l| vec![Value::from(l.dep_id)],
          |l| {
            vec![
              Value::from(l.dep_id),
              Value::from(l.country_id),
              Value::from(l.state_prov.clone()),
              Value::from(l.region.clone()),
              Value::from(l.county.clone()),
            ]
          },
        )?)
      })
      .await?;
    Ok(result)
  }

  async fn get_location(&self, dep_id: i64) -> Result<Option<LocationDetail>> {
    let location = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT dep_id, country_id, state_prov, region, county
               FROM mrds_location WHERE dep_id = ?1",
              params![dep_id],
              |row| {
                Ok(LocationDetail {
                  dep_id:     row.get(0)?,
                  country_id: row.get(1)?,
                  state_prov: row.get(2)?,
                  region:     row.get(3)?,
                  county:     row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    Ok(location)
  }

  async fn replace_details(
    &self,
    kind: DetailKind,
    deposits: Vec<i64>,
    rows: Vec<DetailRecord>,
  ) -> Result<LoadResult> {
    let table = kind.as_ref().to_owned();
    let columns = detail_columns(kind);
    let placeholders: Vec<String> = (1..=columns.len() + 1).map(|i| format!("?{i}")).collect();
    let insert_sql = format!(
      "INSERT INTO {table} (dep_id, {}) VALUES ({})",
      columns.join(", "),
      placeholders.join(", ")
    );
    let delete_sql = format!("DELETE FROM {table} WHERE dep_id = ?1");

    let result = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut result = LoadResult::default();
        {
          let mut delete = tx.prepare(&delete_sql)?;
          for dep_id in &deposits {
            delete.execute(params![dep_id])?;
          }

          let mut insert = tx.prepare(&insert_sql)?;
          for (i, row) in rows.iter().enumerate() {
            if row.kind() != kind {
              result.fail(
                i,
                FailureKind::StorageConflict,
                format!("{} row submitted to {kind}", row.kind()),
              );
              continue;
            }
            let mut values = vec![Value::from(row.dep_id)];
            values.extend(
              row
                .value
                .columns()
                .into_iter()
                .map(|c| Value::from(c.map(str::to_owned))),
            );
            match insert.execute(params_from_iter(values)) {
              Ok(_) => result.inserted += 1,
              Err(e) => record_conflict(&mut result, i, e)?,
            }
          }
        }
        tx.commit()?;
        Ok(result)
      })
      .await?;
    Ok(result)
  }

  async fn list_details(&self, dep_id: i64, kind: DetailKind) -> Result<Vec<DetailRecord>> {
    let columns = detail_columns(kind);
    let width = columns.len();
    let sql = format!(
      "SELECT detail_id, dep_id, {} FROM {} WHERE dep_id = ?1 ORDER BY detail_id",
      columns.join(", "),
      kind.as_ref()
    );

    let raws: Vec<(i64, i64, Vec<Option<String>>)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![dep_id], |row| {
            let cols = (0..width)
              .map(|i| row.get::<_, Option<String>>(i + 2))
              .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((row.get(0)?, row.get(1)?, cols))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      raws
        .into_iter()
        .map(|(detail_id, dep_id, cols)| DetailRecord {
          detail_id: Some(detail_id),
          dep_id,
          value: decode_detail(kind, cols),
        })
        .collect(),
    )
  }

  // ── Change detection & audit ──────────────────────────────────────────────

  async fn get_load_state(&self, dataset_id: &str) -> Result<Option<DatasetLoadState>> {
    let id = dataset_id.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT dataset_id, last_hash, last_success, last_loaded_at
               FROM etl_dataset_state WHERE dataset_id = ?1",
              params![id],
              |row| {
                Ok(RawLoadState {
                  dataset_id:     row.get(0)?,
                  last_hash:      row.get(1)?,
                  last_success:   row.get(2)?,
                  last_loaded_at: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawLoadState::into_state).transpose()
  }

  async fn put_load_state(&self, state: DatasetLoadState) -> Result<()> {
    let at_str = encode_dt(state.last_loaded_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO etl_dataset_state (dataset_id, last_hash, last_success, last_loaded_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (dataset_id) DO UPDATE
           SET last_hash      = excluded.last_hash,
               last_success   = excluded.last_success,
               last_loaded_at = excluded.last_loaded_at",
          params![state.dataset_id, state.fingerprint, state.last_success, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn append_attempt(&self, attempt: LoadAttempt) -> Result<()> {
    let id_str = encode_uuid(attempt.attempt_id);
    let status_str = encode_status(attempt.status);
    let started_str = encode_dt(attempt.started_at);
    let recorded_str = encode_dt(attempt.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO etl_load_log (
             attempt_id, dataset_id, file_hash,
             rows_inserted, rows_updated, rows_failed,
             load_status, error_message, duration_ms, started_at, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
          params![
            id_str,
            attempt.dataset_id,
            attempt.fingerprint,
            encode_count(attempt.rows_inserted),
            encode_count(attempt.rows_updated),
            encode_count(attempt.rows_failed),
            status_str,
            attempt.error,
            encode_count(attempt.duration_ms),
            started_str,
            recorded_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_attempts(&self, dataset_id: Option<&str>) -> Result<Vec<LoadAttempt>> {
    let filter = dataset_id.map(str::to_owned);
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT attempt_id, dataset_id, file_hash, rows_inserted, rows_updated,
                  rows_failed, load_status, error_message, duration_ms,
                  started_at, recorded_at
           FROM etl_load_log
           WHERE ?1 IS NULL OR dataset_id = ?1
           ORDER BY seq",
        )?;
        let rows = stmt
          .query_map(params![filter], |row| {
            Ok(RawAttempt {
              attempt_id:    row.get(0)?,
              dataset_id:    row.get(1)?,
              file_hash:     row.get(2)?,
              rows_inserted: row.get(3)?,
              rows_updated:  row.get(4)?,
              rows_failed:   row.get(5)?,
              load_status:   row.get(6)?,
              error_message: row.get(7)?,
              duration_ms:   row.get(8)?,
              started_at:    row.get(9)?,
              recorded_at:   row.get(10)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawAttempt::into_attempt).collect()
  }

  // ── Diagnostics ───────────────────────────────────────────────────────────

  async fn table_counts(&self) -> Result<Vec<(String, u64)>> {
    let counts = self
      .conn
      .call(|conn| {
        let mut counts = Vec::with_capacity(COUNTED_TABLES.len());
        for table in COUNTED_TABLES {
          let n: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
          counts.push(((*table).to_owned(), u64::try_from(n).unwrap_or(0)));
        }
        Ok(counts)
      })
      .await?;
    Ok(counts)
  }
}
