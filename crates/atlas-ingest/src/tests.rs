//! Pipeline tests against an in-memory `SqliteStore` and fixture files.

use std::{collections::HashMap, fs, path::Path, sync::Arc};

use atlas_core::{
  audit::AttemptStatus,
  country::CanonicalCountry,
  deposit::{CommodityValue, DepositEntity, DetailKind, DetailRecord, DetailValue, LocationDetail},
  indicator::IndicatorFact,
  load::{DetailBatch, FailureKind, LoadBatch},
  normalize::Normalizer,
  store::IngestStore,
  whitelist::{Whitelist, reference_entry},
};
use atlas_store_sqlite::SqliteStore;
use strum::IntoEnumIterator as _;
use tempfile::TempDir;

use crate::{
  Error,
  change::ChangeDetector,
  config::{DatasetConfig, DatasetKind, DatasetRegistry},
  loader::UpsertLoader,
  pipeline::{DatasetReport, RunOptions, RunSummary, run},
  resolver::{CountryResolver, Rejection, Resolved},
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

const ISO_CSV: &str = "\
CLDR display name,ISO3166-1-Alpha-2,ISO3166-1-Alpha-3,ISO3166-1-numeric
South Korea,KR,KOR,410
Chile,CL,CHL,152
United States,US,USA,840
Brazil,BR,BRA,076
Côte d’Ivoire,CI,CIV,384
";

const WORLD_BANK_JSON: &str = r#"[
  {"page": 1, "pages": 1, "per_page": 50, "total": 6},
  [
    {"indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP (current US$)"},
     "country": {"id": "KR", "value": "Korea, Rep."},
     "countryiso3code": "KOR", "date": "2022", "value": 1673916511799.17},
    {"indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP (current US$)"},
     "country": {"id": "KR", "value": "Korea, Rep."},
     "countryiso3code": "KOR", "date": "2021", "value": 1818432106880.08},
    {"indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP (current US$)"},
     "country": {"id": "1W", "value": "World"},
     "countryiso3code": "WLD", "date": "2022", "value": 100562011134034.0},
    {"indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP (current US$)"},
     "country": {"id": "XC", "value": "Euro area"},
     "countryiso3code": "EMU", "date": "2022", "value": 14040871664030.5},
    {"indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP (current US$)"},
     "country": {"id": "ZG", "value": "Sub-Saharan Africa"},
     "countryiso3code": "SSF", "date": "2022", "value": 2021354770458.1},
    {"indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP (current US$)"},
     "country": {"id": "XY", "value": "Not classified"},
     "countryiso3code": "", "date": "2022", "value": null},
    {"indicator": {"id": "NY.GDP.MKTP.CD", "value": "GDP (current US$)"},
     "country": {"id": "CL", "value": "Chile"},
     "countryiso3code": "CHL", "date": "2022", "value": null}
  ]
]"#;

const FSI_CSV: &str = "\
Country,Year,Rank,Total
Chile,2022,150th,40.1
Chile,2023,148th,39.5
Brazil,2023,71st,75.0
Atlantis,2023,1st,120.0
";

const CPI_CSV: &str = "\
Corruption Perceptions Index 2023,,,
,,,
Country / Territory,ISO3,Region,CPI score 2023
Chile,CHL,AME,66
\"Korea, South\",KOR,AP,63
Nowhereland,USA,AME,69
Brazil,BRA,AME,n/a
";

const MRDS_TXT: &str = "\
dep_id\tname\tdev_stat\tcode_list\tlatitude\tlongitude
10091234\tGold Hill\tPast Producer\tAU AG\t45.5\t-117.25
10091235\tCopper Flat\tProspect\tCU\t-33.4\t-70.6
10091236\tLos Andes\tOccurrence\tMO\t\t
";

const LOCATION_TXT: &str = "\
dep_id\tcountry\tstate_prov\tregion\tcounty
10091234\tUnited States\tOregon\t\tBaker
10091235\tChile\t\t\t
10091236\tSA\t\t\t
10099999\tChile\t\t\t
";

const COMMODITY_TXT: &str = "\
dep_id\tcommod\tcode\tcommod_tp\tcommod_group\timport
10091234\tGold\tAU\tMetallic\tPrecious\tY
10091234\tSilver\tAG\tMetallic\tPrecious\t
10091235\tCopper\tCU\tMetallic\tBase\t
10099999\tLead\tPB\tMetallic\tBase\t
";

const ROCKS_CSV: &str = "\
dep_id,rock_cls,first_ord_nm,second_ord_nm,third_ord_nm,low_name
10091234,Igneous,Plutonic,,,Granodiorite
";

struct Fixture {
  dir:      TempDir,
  registry: Arc<DatasetRegistry>,
}

fn dataset(id: &str, kind: DatasetKind, format: &str, path: &str) -> DatasetConfig {
  DatasetConfig {
    id: id.into(),
    name: format!("{id} source"),
    url: None,
    format: format.into(),
    cadence: Some("annual".into()),
    active: true,
    kind,
    path: path.into(),
    indicator_code: None,
    year: None,
  }
}

fn write(dir: &Path, rel: &str, body: &str) {
  let path = dir.join(rel);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, body).unwrap();
}

fn fixture_with(datasets: Vec<DatasetConfig>) -> Fixture {
  let dir = tempfile::tempdir().unwrap();
  write(dir.path(), "iso/codes.csv", ISO_CSV);
  write(dir.path(), "worldbank/gdp.json", WORLD_BANK_JSON);
  write(dir.path(), "fsi/fsi.csv", FSI_CSV);
  write(dir.path(), "cpi/cpi.csv", CPI_CSV);
  write(dir.path(), "mrds/MRDS.txt", MRDS_TXT);
  write(dir.path(), "mrds/Location.txt", LOCATION_TXT);
  write(dir.path(), "mrds/Commodity.txt", COMMODITY_TXT);
  write(dir.path(), "mrds/Rocks.csv", ROCKS_CSV);

  let registry = DatasetRegistry::new(dir.path(), datasets).unwrap();
  Fixture { dir, registry: Arc::new(registry) }
}

fn fixture() -> Fixture {
  fixture_with(vec![
    dataset("worldbank_gdp", DatasetKind::WorldBank, "json", "worldbank/gdp.json"),
    dataset("fsi", DatasetKind::Fsi, "csv", "fsi/fsi.csv"),
    dataset("cpi", DatasetKind::Cpi, "csv", "cpi/cpi.csv"),
    dataset("mrds", DatasetKind::Mrds, "txt", "mrds"),
    dataset("iso_country_codes", DatasetKind::IsoCountryCodes, "csv", "iso/codes.csv"),
  ])
}

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn normalizer() -> Arc<Normalizer> { Arc::new(Normalizer::bundled().unwrap()) }

async fn run_with(store: &SqliteStore, fx: &Fixture, options: RunOptions) -> RunSummary {
  run(store.clone(), Arc::clone(&fx.registry), normalizer(), options)
    .await
    .unwrap()
}

fn report<'a>(summary: &'a RunSummary, id: &str) -> &'a DatasetReport {
  summary.report(id).unwrap_or_else(|| panic!("no report for {id}"))
}

async fn count(store: &SqliteStore, table: &str) -> u64 {
  store
    .table_counts()
    .await
    .unwrap()
    .into_iter()
    .find(|(t, _)| t == table)
    .map(|(_, n)| n)
    .unwrap()
}

const FIXTURE_DEPOSITS: [i64; 4] = [10091234, 10091235, 10091236, 10099999];

/// Everything the loaders write, read back in a stable order.
#[derive(Debug, PartialEq)]
struct Snapshot {
  countries:  Vec<CanonicalCountry>,
  indicators: Vec<IndicatorFact>,
  deposits:   Vec<Option<DepositEntity>>,
  locations:  Vec<Option<LocationDetail>>,
  details:    Vec<DetailRecord>,
}

async fn snapshot(store: &SqliteStore) -> Snapshot {
  let mut deposits = Vec::new();
  let mut locations = Vec::new();
  let mut details = Vec::new();
  for dep_id in FIXTURE_DEPOSITS {
    deposits.push(store.get_deposit(dep_id).await.unwrap());
    locations.push(store.get_location(dep_id).await.unwrap());
    for kind in DetailKind::iter() {
      details.extend(store.list_details(dep_id, kind).await.unwrap());
    }
  }
  Snapshot {
    countries: store.list_countries().await.unwrap(),
    indicators: store.list_indicators(None).await.unwrap(),
    deposits,
    locations,
    details,
  }
}

async fn commodities(store: &SqliteStore, dep_id: i64) -> Vec<String> {
  store
    .list_details(dep_id, DetailKind::Commodity)
    .await
    .unwrap()
    .into_iter()
    .filter_map(|r| match r.value {
      DetailValue::Commodity(c) => c.commod,
      _ => None,
    })
    .collect()
}

async fn resolver(store: &SqliteStore) -> CountryResolver<SqliteStore> {
  let n = normalizer();
  let entries = [
    ("South Korea", "KOR"),
    ("Chile", "CHL"),
    ("United States", "USA"),
    ("Brazil", "BRA"),
  ]
  .iter()
  .map(|(name, iso3)| reference_entry(&n, name, None, iso3, None).unwrap())
  .collect::<Vec<_>>();
  CountryResolver::new(store.clone(), n, Arc::new(Whitelist::build(entries)))
}

// ─── Resolution ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn korea_spellings_resolve_to_one_country() {
  let s = store().await;
  let r = resolver(&s).await;

  let Resolved::Country(a) = r.resolve("Korea, Rep.").await.unwrap() else {
    panic!("Korea, Rep. should resolve");
  };
  let Resolved::Country(b) = r.resolve("South Korea").await.unwrap() else {
    panic!("South Korea should resolve");
  };

  assert_eq!(a.country_id, b.country_id);
  assert_eq!(a.iso3.as_deref(), Some("KOR"));
  assert_eq!(a.display_name, "South Korea");
  assert_eq!(s.list_countries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn aggregates_never_become_countries() {
  let s = store().await;
  let r = resolver(&s).await;

  for label in ["World", "Euro area", "Sub-Saharan Africa"] {
    assert!(
      matches!(
        r.resolve(label).await.unwrap(),
        Resolved::Rejected(Rejection::NonCountryAggregate { .. })
      ),
      "{label}"
    );
  }
  // An ISO3 hint never rescues an aggregate.
  assert!(matches!(
    r.resolve_with_hint("World", Some("USA")).await.unwrap(),
    Resolved::Rejected(Rejection::NonCountryAggregate { .. })
  ));
  assert!(matches!(
    r.resolve("Atlantis").await.unwrap(),
    Resolved::Rejected(Rejection::UnknownCountry { .. })
  ));
  assert!(s.list_countries().await.unwrap().is_empty());
}

#[tokio::test]
async fn iso3_hint_resolves_unknown_labels() {
  let s = store().await;
  let r = resolver(&s).await;

  let Resolved::Country(chile) = r.resolve_with_hint("Rep. de Chile", Some("chl")).await.unwrap()
  else {
    panic!("hint should resolve");
  };
  assert_eq!(chile.country_norm, "chile");

  assert!(matches!(
    r.resolve_with_hint("Rep. de Chile", Some("XXX")).await.unwrap(),
    Resolved::Rejected(Rejection::UnknownCountry { .. })
  ));
}

#[tokio::test]
async fn concurrent_resolution_creates_one_row() {
  let s = store().await;
  let r = Arc::new(resolver(&s).await);

  let mut tasks = tokio::task::JoinSet::new();
  for i in 0..20 {
    let r = Arc::clone(&r);
    let label = if i % 2 == 0 { "Korea, Rep." } else { "South Korea" };
    tasks.spawn(async move { r.resolve(label).await.unwrap() });
  }

  let mut ids = Vec::new();
  while let Some(joined) = tasks.join_next().await {
    let Resolved::Country(c) = joined.unwrap() else { panic!("should resolve") };
    ids.push(c.country_id);
  }
  ids.sort();
  ids.dedup();
  assert_eq!(ids.len(), 1);
  assert_eq!(s.list_countries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_resolution_of_mixed_labels_creates_one_row_per_country() {
  let s = store().await;
  let r = Arc::new(resolver(&s).await);
  let labels = [
    ("Korea, Rep.", "KOR"),
    ("South Korea", "KOR"),
    ("Chile", "CHL"),
    ("CHL", "CHL"),
    ("United States", "USA"),
    ("USA", "USA"),
    ("US", "USA"),
    ("Brazil", "BRA"),
    ("  BRAZIL ", "BRA"),
  ];

  let mut tasks = tokio::task::JoinSet::new();
  for round in 0..4 {
    for (i, (label, iso3)) in labels.iter().enumerate() {
      let r = Arc::clone(&r);
      // Vary the spawn order between rounds.
      let (label, iso3) =
        if round % 2 == 0 { (*label, *iso3) } else { labels[labels.len() - 1 - i] };
      tasks.spawn(async move { (iso3, r.resolve(label).await.unwrap()) });
    }
  }

  let mut by_iso3: HashMap<&str, Vec<i64>> = HashMap::new();
  while let Some(joined) = tasks.join_next().await {
    let (iso3, resolved) = joined.unwrap();
    let Resolved::Country(c) = resolved else { panic!("{iso3} should resolve") };
    assert_eq!(c.iso3.as_deref(), Some(iso3));
    by_iso3.entry(iso3).or_default().push(c.country_id);
  }

  assert_eq!(by_iso3.len(), 4);
  for ids in by_iso3.values() {
    assert!(ids.iter().all(|id| *id == ids[0]));
  }
  assert_eq!(s.list_countries().await.unwrap().len(), 4);
}

// ─── Loader ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_detail_rows_do_not_block_siblings() {
  let s = store().await;
  let deposits = (1..=10)
    .map(|dep_id| DepositEntity {
      dep_id,
      name: Some(format!("Deposit {dep_id}")),
      dev_stat: None,
      code_list: None,
      latitude: None,
      longitude: None,
    })
    .collect();
  let loader = UpsertLoader::new(&s);
  loader.upsert(LoadBatch::Deposits(deposits)).await.unwrap();

  let rows: Vec<DetailRecord> = (0..100)
    .map(|i| {
      let commod = (i % 20 != 0).then(|| format!("Commodity {i}"));
      DetailRecord::new(
        i64::from(i / 10 + 1),
        DetailValue::Commodity(CommodityValue { commod, ..Default::default() }),
      )
    })
    .collect();

  let result = loader
    .upsert(LoadBatch::Details(DetailBatch::from_rows(rows)))
    .await
    .unwrap();
  assert_eq!(result.inserted, 95);
  assert_eq!(result.failed, 5);
  assert!(result.failures.iter().all(|f| f.kind == FailureKind::Validation));
  let failed_rows: Vec<usize> = result.failures.iter().map(|f| f.row).collect();
  assert_eq!(failed_rows, vec![0, 20, 40, 60, 80]);

  let mut persisted = 0;
  for dep_id in 1..=10 {
    persisted += s.list_details(dep_id, DetailKind::Commodity).await.unwrap().len();
  }
  assert_eq!(persisted, 95);
}

#[tokio::test]
async fn failed_load_is_retried_with_same_fingerprint() {
  let s = store().await;
  let detector = ChangeDetector::new(&s, false);

  assert!(detector.should_load("cpi", "abc").await.unwrap());
  detector.record_state("cpi", "abc", false).await.unwrap();
  assert!(detector.should_load("cpi", "abc").await.unwrap());
  detector.record_state("cpi", "abc", true).await.unwrap();
  assert!(!detector.should_load("cpi", "abc").await.unwrap());
  assert!(detector.should_load("cpi", "abd").await.unwrap());
  assert!(ChangeDetector::new(&s, true).should_load("cpi", "abc").await.unwrap());
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_loads_every_dataset() {
  let s = store().await;
  let fx = fixture();
  let summary = run_with(&s, &fx, RunOptions::default()).await;

  assert_eq!(summary.exit_code(), 0);
  // ISO first, then the rest in configured order.
  let order: Vec<&str> = summary.datasets.iter().map(|r| r.dataset_id.as_str()).collect();
  assert_eq!(order, vec!["iso_country_codes", "worldbank_gdp", "fsi", "cpi", "mrds"]);
  assert!(summary.datasets.iter().all(|r| r.status == AttemptStatus::Success));

  let iso = report(&summary, "iso_country_codes");
  assert_eq!(iso.inserted, 5);

  let gdp = report(&summary, "worldbank_gdp");
  assert_eq!((gdp.inserted, gdp.failed), (2, 0));
  assert_eq!(gdp.excluded, 4);

  let fsi = report(&summary, "fsi");
  assert_eq!((fsi.inserted, fsi.excluded), (2, 1));

  let cpi = report(&summary, "cpi");
  assert_eq!((cpi.inserted, cpi.failed), (3, 1));

  let mrds = report(&summary, "mrds");
  assert_eq!(mrds.inserted, 3 + 2 + 3 + 1);
  assert_eq!(mrds.excluded, 3);

  assert_eq!(count(&s, "dim_country").await, 4);
  assert_eq!(count(&s, "mrds_location").await, 2);

  let fsi_facts = s.list_indicators(Some("fsi")).await.unwrap();
  let chile = s.find_country("chile").await.unwrap().unwrap();
  let chile_rank = fsi_facts.iter().find(|f| f.country_id == chile.country_id).unwrap();
  assert_eq!((chile_rank.year, chile_rank.value), (2023, 148.0));
  assert_eq!(chile_rank.indicator_code, "RANK");

  let cpi_facts = s.list_indicators(Some("cpi")).await.unwrap();
  assert!(cpi_facts.iter().all(|f| f.year == 2023));

  let location = s.get_location(10091235).await.unwrap().unwrap();
  assert_eq!(location.country_id, chile.country_id);
  assert_eq!(location.state_prov, "N/A");

  let rocks = s.list_details(10091234, DetailKind::Rock).await.unwrap();
  let DetailValue::Rock(rock) = &rocks[0].value else { panic!("rock row") };
  assert_eq!(rock.second_ord_nm.as_deref(), Some("N/A"));
}

#[tokio::test]
async fn second_run_of_unchanged_files_is_skipped() {
  let s = store().await;
  let fx = fixture();
  run_with(&s, &fx, RunOptions::default()).await;
  let before = s.table_counts().await.unwrap();
  let contents = snapshot(&s).await;

  let summary = run_with(&s, &fx, RunOptions::default()).await;
  assert!(summary.datasets.iter().all(|r| r.status == AttemptStatus::Unchanged));
  assert_eq!(snapshot(&s).await, contents);

  let after = s.table_counts().await.unwrap();
  let strip_audit = |counts: Vec<(String, u64)>| {
    counts
      .into_iter()
      .filter(|(t, _)| t != "etl_load_log")
      .collect::<Vec<_>>()
  };
  assert_eq!(strip_audit(before), strip_audit(after));

  let attempts = s.list_attempts(Some("worldbank_gdp")).await.unwrap();
  assert_eq!(attempts.len(), 2);
  assert_eq!(attempts[0].status, AttemptStatus::Success);
  assert_eq!(attempts[1].status, AttemptStatus::Unchanged);
  assert_eq!(
    (attempts[1].rows_inserted, attempts[1].rows_updated, attempts[1].rows_failed),
    (0, 0, 0)
  );
  assert_eq!(attempts[0].fingerprint, attempts[1].fingerprint);
}

#[tokio::test]
async fn force_reloads_unchanged_files() {
  let s = store().await;
  let fx = fixture();
  run_with(&s, &fx, RunOptions::default()).await;

  let summary = run_with(&s, &fx, RunOptions { force: true, only: vec![] }).await;
  let gdp = report(&summary, "worldbank_gdp");
  assert_eq!(gdp.status, AttemptStatus::Success);
  assert_eq!((gdp.inserted, gdp.updated), (0, 2));
  assert_eq!(s.list_indicators(Some("worldbank_gdp")).await.unwrap().len(), 2);
}

#[tokio::test]
async fn reloaded_deposit_is_updated_in_place() {
  let s = store().await;
  let fx = fixture();
  run_with(&s, &fx, RunOptions::default()).await;

  write(
    fx.dir.path(),
    "mrds/MRDS.txt",
    &MRDS_TXT.replace("Gold Hill\t", "Gold Hill Mine\t"),
  );
  let summary = run_with(&s, &fx, RunOptions::default()).await;

  let mrds = report(&summary, "mrds");
  assert_eq!(mrds.status, AttemptStatus::Success);
  assert_eq!(mrds.updated, 3 + 2);
  assert_eq!(report(&summary, "fsi").status, AttemptStatus::Unchanged);

  let deposit = s.get_deposit(10091234).await.unwrap().unwrap();
  assert_eq!(deposit.name.as_deref(), Some("Gold Hill Mine"));
  assert_eq!(count(&s, "mrds_deposit").await, 3);
  assert_eq!(count(&s, "mrds_commodity").await, 3);
  assert_eq!(count(&s, "dim_country").await, 4);
}

#[tokio::test]
async fn mrds_reload_replaces_detail_rows_of_every_listed_deposit() {
  let s = store().await;
  let fx = fixture();
  run_with(&s, &fx, RunOptions::default()).await;
  assert_eq!(commodities(&s, 10091235).await, vec!["Copper"]);

  // Copper Flat is still in MRDS.txt but lost its only commodity row.
  write(
    fx.dir.path(),
    "mrds/Commodity.txt",
    &COMMODITY_TXT.replace("10091235\tCopper\tCU\tMetallic\tBase\t\n", ""),
  );
  let summary = run_with(&s, &fx, RunOptions::default()).await;
  assert_eq!(report(&summary, "mrds").status, AttemptStatus::Success);
  assert!(commodities(&s, 10091235).await.is_empty());
  assert_eq!(commodities(&s, 10091234).await, vec!["Gold", "Silver"]);

  // A header-only table clears its kind for every deposit; other kinds stay.
  write(
    fx.dir.path(),
    "mrds/Commodity.txt",
    "dep_id\tcommod\tcode\tcommod_tp\tcommod_group\timport\n",
  );
  run_with(&s, &fx, RunOptions::default()).await;
  assert_eq!(count(&s, "mrds_commodity").await, 0);
  assert_eq!(count(&s, "mrds_rocks").await, 1);

  // A table missing from the bundle leaves its rows alone.
  fs::remove_file(fx.dir.path().join("mrds/Rocks.csv")).unwrap();
  run_with(&s, &fx, RunOptions::default()).await;
  assert_eq!(count(&s, "mrds_rocks").await, 1);
}

#[tokio::test]
async fn missing_file_fails_only_its_dataset() {
  let s = store().await;
  let fx = fixture_with(vec![
    dataset("iso_country_codes", DatasetKind::IsoCountryCodes, "csv", "iso/codes.csv"),
    dataset("fsi", DatasetKind::Fsi, "csv", "fsi/missing.csv"),
    dataset("cpi", DatasetKind::Cpi, "csv", "cpi/cpi.csv"),
  ]);
  let summary = run_with(&s, &fx, RunOptions::default()).await;

  assert_eq!(summary.exit_code(), 0);
  let fsi = report(&summary, "fsi");
  assert_eq!(fsi.status, AttemptStatus::Failed);
  assert!(!fsi.fatal);
  assert!(fsi.error.as_deref().unwrap().contains("raw file not found"));
  assert_eq!(report(&summary, "cpi").status, AttemptStatus::Success);

  let attempts = s.list_attempts(Some("fsi")).await.unwrap();
  assert_eq!(attempts.len(), 1);
  assert_eq!(attempts[0].status, AttemptStatus::Failed);
  assert!(attempts[0].fingerprint.is_none());
}

#[tokio::test]
async fn unsupported_format_fails_the_dataset() {
  let s = store().await;
  let fx = fixture_with(vec![dataset("fsi", DatasetKind::Fsi, "xlsx", "fsi/fsi.csv")]);
  let summary = run_with(&s, &fx, RunOptions::default()).await;

  let fsi = report(&summary, "fsi");
  assert_eq!(fsi.status, AttemptStatus::Failed);
  assert!(fsi.error.as_deref().unwrap().contains("unsupported format"));

  // A failed load is retried even though the payload did not change.
  let again = run_with(&s, &fx, RunOptions::default()).await;
  assert_eq!(report(&again, "fsi").status, AttemptStatus::Failed);
}

#[tokio::test]
async fn empty_whitelist_excludes_every_row() {
  let s = store().await;
  let fx = fixture();
  let summary = run_with(&s, &fx, RunOptions { force: false, only: vec!["fsi".into()] }).await;

  assert_eq!(summary.datasets.len(), 1);
  let fsi = report(&summary, "fsi");
  assert_eq!(fsi.status, AttemptStatus::Success);
  assert_eq!((fsi.inserted, fsi.excluded), (0, 4));
  assert_eq!(count(&s, "dim_country").await, 0);
}

#[tokio::test]
async fn selected_run_uses_stored_whitelist() {
  let s = store().await;
  let fx = fixture();
  run_with(&s, &fx, RunOptions::default()).await;

  let summary =
    run_with(&s, &fx, RunOptions { force: true, only: vec!["cpi".into()] }).await;
  assert_eq!(summary.datasets.len(), 1);
  let cpi = report(&summary, "cpi");
  assert_eq!((cpi.updated, cpi.failed), (3, 1));
}

#[tokio::test]
async fn unknown_selection_is_fatal() {
  let s = store().await;
  let fx = fixture();
  let err = run(
    s.clone(),
    Arc::clone(&fx.registry),
    normalizer(),
    RunOptions { force: false, only: vec!["gdp_2030".into()] },
  )
  .await
  .unwrap_err();

  assert!(matches!(err, Error::UnknownDataset(_)));
  assert!(err.is_fatal());
  assert!(s.list_attempts(None).await.unwrap().is_empty());
}

#[test]
fn exit_code_reflects_fatal_reports_only() {
  let failed = DatasetReport {
    dataset_id: "fsi".into(),
    status:     AttemptStatus::Failed,
    inserted:   0,
    updated:    0,
    failed:     0,
    excluded:   0,
    error:      Some("raw file not found: fsi.csv".into()),
    fatal:      false,
  };
  let mut summary = RunSummary { datasets: vec![failed.clone()] };
  assert_eq!(summary.exit_code(), 0);

  summary.datasets.push(DatasetReport { fatal: true, ..failed });
  assert_eq!(summary.exit_code(), 1);
}
