//! SQL schema for the Atlas SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision; future migrations will be gated on it.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS dataset_config (
    dataset_id       TEXT PRIMARY KEY,
    source_name      TEXT NOT NULL,
    source_url       TEXT,
    format           TEXT NOT NULL,
    update_frequency TEXT,
    is_active        INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS iso_country_codes (
    iso3         TEXT PRIMARY KEY,
    country_name TEXT NOT NULL,
    country_norm TEXT NOT NULL,
    iso2         TEXT,
    iso_numeric  TEXT
);

-- One row per normalized key. The UNIQUE constraint is what serialises
-- concurrent get-or-create calls.
CREATE TABLE IF NOT EXISTS dim_country (
    country_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    country_name TEXT NOT NULL,
    country_norm TEXT NOT NULL UNIQUE,
    iso3         TEXT,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS country_indicator (
    indicator_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    country_id     INTEGER NOT NULL REFERENCES dim_country(country_id),
    dataset_id     TEXT NOT NULL REFERENCES dataset_config(dataset_id),
    indicator_code TEXT NOT NULL,
    year           INTEGER NOT NULL,
    value          REAL NOT NULL,
    UNIQUE (country_id, dataset_id, indicator_code, year)
);

-- geom is WKT in WGS84; srid is kept alongside for spatial consumers.
CREATE TABLE IF NOT EXISTS mrds_deposit (
    dep_id    INTEGER PRIMARY KEY,
    name      TEXT,
    dev_stat  TEXT,
    code_list TEXT,
    latitude  REAL,
    longitude REAL,
    geom      TEXT,
    srid      INTEGER
);

CREATE TABLE IF NOT EXISTS mrds_location (
    dep_id     INTEGER PRIMARY KEY REFERENCES mrds_deposit(dep_id) ON DELETE CASCADE,
    country_id INTEGER NOT NULL REFERENCES dim_country(country_id),
    state_prov TEXT NOT NULL DEFAULT 'N/A',
    region     TEXT NOT NULL DEFAULT 'N/A',
    county     TEXT NOT NULL DEFAULT 'N/A'
);

CREATE TABLE IF NOT EXISTS mrds_commodity (
    detail_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    dep_id       INTEGER NOT NULL REFERENCES mrds_deposit(dep_id) ON DELETE CASCADE,
    commod       TEXT,
    code         TEXT,
    commod_tp    TEXT,
    commod_group TEXT,
    import       TEXT
);

CREATE TABLE IF NOT EXISTS mrds_material (
    detail_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    dep_id     INTEGER NOT NULL REFERENCES mrds_deposit(dep_id) ON DELETE CASCADE,
    rec        TEXT,
    ore_gangue TEXT,
    material   TEXT
);

CREATE TABLE IF NOT EXISTS mrds_ownership (
    detail_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    dep_id     INTEGER NOT NULL REFERENCES mrds_deposit(dep_id) ON DELETE CASCADE,
    owner_name TEXT,
    owner_tp   TEXT
);

CREATE TABLE IF NOT EXISTS mrds_physiography (
    detail_id INTEGER PRIMARY KEY AUTOINCREMENT,
    dep_id    INTEGER NOT NULL REFERENCES mrds_deposit(dep_id) ON DELETE CASCADE,
    phys_div  TEXT,
    phys_prov TEXT,
    phys_sect TEXT,
    phys_det  TEXT
);

CREATE TABLE IF NOT EXISTS mrds_ages (
    detail_id INTEGER PRIMARY KEY AUTOINCREMENT,
    dep_id    INTEGER NOT NULL REFERENCES mrds_deposit(dep_id) ON DELETE CASCADE,
    age_tp    TEXT,
    age_young TEXT
);

CREATE TABLE IF NOT EXISTS mrds_rocks (
    detail_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    dep_id        INTEGER NOT NULL REFERENCES mrds_deposit(dep_id) ON DELETE CASCADE,
    rock_cls      TEXT,
    first_ord_nm  TEXT,
    second_ord_nm TEXT,
    third_ord_nm  TEXT,
    low_name      TEXT
);

-- Latest fingerprint per dataset; overwritten on every run.
CREATE TABLE IF NOT EXISTS etl_dataset_state (
    dataset_id     TEXT PRIMARY KEY,
    last_hash      TEXT NOT NULL,
    last_success   INTEGER NOT NULL,
    last_loaded_at TEXT NOT NULL
);

-- Strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS etl_load_log (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    attempt_id    TEXT NOT NULL UNIQUE,
    dataset_id    TEXT NOT NULL,
    file_hash     TEXT,
    rows_inserted INTEGER NOT NULL,
    rows_updated  INTEGER NOT NULL,
    rows_failed   INTEGER NOT NULL,
    load_status   TEXT NOT NULL,   -- 'success' | 'failed' | 'unchanged'
    error_message TEXT,
    duration_ms   INTEGER NOT NULL,
    started_at    TEXT NOT NULL,
    recorded_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS indicator_dataset_idx ON country_indicator(dataset_id);
CREATE INDEX IF NOT EXISTS location_country_idx  ON mrds_location(country_id);
CREATE INDEX IF NOT EXISTS commodity_dep_idx     ON mrds_commodity(dep_id);
CREATE INDEX IF NOT EXISTS material_dep_idx      ON mrds_material(dep_id);
CREATE INDEX IF NOT EXISTS ownership_dep_idx     ON mrds_ownership(dep_id);
CREATE INDEX IF NOT EXISTS physiography_dep_idx  ON mrds_physiography(dep_id);
CREATE INDEX IF NOT EXISTS ages_dep_idx          ON mrds_ages(dep_id);
CREATE INDEX IF NOT EXISTS rocks_dep_idx         ON mrds_rocks(dep_id);
CREATE INDEX IF NOT EXISTS load_log_dataset_idx  ON etl_load_log(dataset_id);

PRAGMA user_version = 1;
";

/// Tables reported by the sanity counts, in display order.
pub const COUNTED_TABLES: &[&str] = &[
  "dataset_config",
  "iso_country_codes",
  "dim_country",
  "country_indicator",
  "mrds_deposit",
  "mrds_location",
  "mrds_commodity",
  "mrds_material",
  "mrds_ownership",
  "mrds_physiography",
  "mrds_ages",
  "mrds_rocks",
  "etl_dataset_state",
  "etl_load_log",
];
