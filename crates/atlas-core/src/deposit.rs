//! Mineral deposit types from the MRDS registry.
//!
//! A deposit's identity (`dep_id`) comes from the source dataset, so reloading
//! the registry updates rows in place. Its location and detail rows are owned
//! by the deposit and disappear with it.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

// ─── Geometry ────────────────────────────────────────────────────────────────

/// SRID of every stored point (WGS84 longitude/latitude).
pub const WGS84_SRID: i32 = 4326;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
  pub latitude:  f64,
  pub longitude: f64,
}

impl GeoPoint {
  /// Well-known-text form, longitude first.
  pub fn to_wkt(&self) -> String {
    format!("POINT({} {})", self.longitude, self.latitude)
  }

  pub fn is_valid(&self) -> bool {
    self.latitude.is_finite()
      && self.longitude.is_finite()
      && (-90.0..=90.0).contains(&self.latitude)
      && (-180.0..=180.0).contains(&self.longitude)
  }
}

// ─── Deposit ─────────────────────────────────────────────────────────────────

/// One mineral deposit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositEntity {
  pub dep_id:    i64,
  pub name:      Option<String>,
  /// Development status, e.g. "Past Producer".
  pub dev_stat:  Option<String>,
  /// Space-separated commodity codes as delivered by MRDS.
  pub code_list: Option<String>,
  pub latitude:  Option<f64>,
  pub longitude: Option<f64>,
}

impl DepositEntity {
  /// The derived point geometry; `None` unless both coordinates are present.
  pub fn point(&self) -> Option<GeoPoint> {
    match (self.latitude, self.longitude) {
      (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
      _ => None,
    }
  }
}

/// Administrative placement of a deposit. Exactly one per deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationDetail {
  pub dep_id:     i64,
  pub country_id: i64,
  pub state_prov: String,
  pub region:     String,
  pub county:     String,
}

// ─── Detail variants ─────────────────────────────────────────────────────────

/// The six one-to-many detail relationships of a deposit. The string form is
/// the backing table name.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr, Display, EnumIter, EnumString,
)]
pub enum DetailKind {
  #[strum(serialize = "mrds_commodity")]
  Commodity,
  #[strum(serialize = "mrds_material")]
  Material,
  #[strum(serialize = "mrds_ownership")]
  Ownership,
  #[strum(serialize = "mrds_physiography")]
  Physiography,
  #[strum(serialize = "mrds_ages")]
  Age,
  #[strum(serialize = "mrds_rocks")]
  Rock,
}

impl DetailKind {
  /// The file stem of this variant inside an MRDS bundle.
  pub fn source_stem(self) -> &'static str {
    match self {
      Self::Commodity => "Commodity",
      Self::Material => "Materials",
      Self::Ownership => "Ownership",
      Self::Physiography => "Physiography",
      Self::Age => "Ages",
      Self::Rock => "Rocks",
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommodityValue {
  pub commod:       Option<String>,
  pub code:         Option<String>,
  pub commod_tp:    Option<String>,
  pub commod_group: Option<String>,
  pub import:       Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialValue {
  pub rec:        Option<String>,
  pub ore_gangue: Option<String>,
  pub material:   Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipValue {
  pub owner_name: Option<String>,
  pub owner_tp:   Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysiographyValue {
  pub phys_div:  Option<String>,
  pub phys_prov: Option<String>,
  pub phys_sect: Option<String>,
  pub phys_det:  Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeValue {
  pub age_tp:    Option<String>,
  pub age_young: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RockValue {
  pub rock_cls:      Option<String>,
  pub first_ord_nm:  Option<String>,
  pub second_ord_nm: Option<String>,
  pub third_ord_nm:  Option<String>,
  pub low_name:      Option<String>,
}

/// Variant-specific attributes of a detail row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum DetailValue {
  Commodity(CommodityValue),
  Material(MaterialValue),
  Ownership(OwnershipValue),
  Physiography(PhysiographyValue),
  Age(AgeValue),
  Rock(RockValue),
}

impl DetailValue {
  pub fn kind(&self) -> DetailKind {
    match self {
      Self::Commodity(_) => DetailKind::Commodity,
      Self::Material(_) => DetailKind::Material,
      Self::Ownership(_) => DetailKind::Ownership,
      Self::Physiography(_) => DetailKind::Physiography,
      Self::Age(_) => DetailKind::Age,
      Self::Rock(_) => DetailKind::Rock,
    }
  }

  /// Column values in table order, excluding `dep_id`.
  pub fn columns(&self) -> Vec<Option<&str>> {
    match self {
      Self::Commodity(v) => vec![
        v.commod.as_deref(),
        v.code.as_deref(),
        v.commod_tp.as_deref(),
        v.commod_group.as_deref(),
        v.import.as_deref(),
      ],
      Self::Material(v) => {
        vec![v.rec.as_deref(), v.ore_gangue.as_deref(), v.material.as_deref()]
      }
      Self::Ownership(v) => vec![v.owner_name.as_deref(), v.owner_tp.as_deref()],
      Self::Physiography(v) => vec![
        v.phys_div.as_deref(),
        v.phys_prov.as_deref(),
        v.phys_sect.as_deref(),
        v.phys_det.as_deref(),
      ],
      Self::Age(v) => vec![v.age_tp.as_deref(), v.age_young.as_deref()],
      Self::Rock(v) => vec![
        v.rock_cls.as_deref(),
        v.first_ord_nm.as_deref(),
        v.second_ord_nm.as_deref(),
        v.third_ord_nm.as_deref(),
        v.low_name.as_deref(),
      ],
    }
  }

  /// `true` when every attribute is missing or blank.
  pub fn is_blank(&self) -> bool {
    self
      .columns()
      .into_iter()
      .all(|c| c.is_none_or(|s| s.trim().is_empty()))
  }
}

/// Column names of each detail table, excluding the surrogate id and `dep_id`.
pub fn detail_columns(kind: DetailKind) -> &'static [&'static str] {
  match kind {
    DetailKind::Commodity => &["commod", "code", "commod_tp", "commod_group", "import"],
    DetailKind::Material => &["rec", "ore_gangue", "material"],
    DetailKind::Ownership => &["owner_name", "owner_tp"],
    DetailKind::Physiography => &["phys_div", "phys_prov", "phys_sect", "phys_det"],
    DetailKind::Age => &["age_tp", "age_young"],
    DetailKind::Rock => {
      &["rock_cls", "first_ord_nm", "second_ord_nm", "third_ord_nm", "low_name"]
    }
  }
}

/// One detail row. `detail_id` is `None` until the store assigns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRecord {
  pub detail_id: Option<i64>,
  pub dep_id:    i64,
  pub value:     DetailValue,
}

impl DetailRecord {
  pub fn new(dep_id: i64, value: DetailValue) -> Self {
    Self { detail_id: None, dep_id, value }
  }

  pub fn kind(&self) -> DetailKind { self.value.kind() }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn detail_kind_round_trips_through_table_name() {
    for kind in DetailKind::iter() {
      assert_eq!(DetailKind::from_str(kind.as_ref()).unwrap(), kind);
    }
  }

  #[test]
  fn columns_match_declared_table_columns() {
    let values = [
      DetailValue::Commodity(CommodityValue::default()),
      DetailValue::Material(MaterialValue::default()),
      DetailValue::Ownership(OwnershipValue::default()),
      DetailValue::Physiography(PhysiographyValue::default()),
      DetailValue::Age(AgeValue::default()),
      DetailValue::Rock(RockValue::default()),
    ];
    for value in values {
      assert_eq!(value.columns().len(), detail_columns(value.kind()).len());
      assert!(value.is_blank());
    }
  }

  #[test]
  fn point_requires_both_coordinates() {
    let mut deposit = DepositEntity {
      dep_id:    10091234,
      name:      Some("Gold Hill".into()),
      dev_stat:  None,
      code_list: None,
      latitude:  Some(45.5),
      longitude: None,
    };
    assert!(deposit.point().is_none());

    deposit.longitude = Some(-117.25);
    let point = deposit.point().unwrap();
    assert_eq!(point.to_wkt(), "POINT(-117.25 45.5)");
    assert!(point.is_valid());
  }
}
