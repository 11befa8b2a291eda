//! The ISO 3166-1 admission whitelist.
//!
//! Built once per run from the ISO reference entries. A normalized key is
//! admissible only if it equals an entry's normalized key or one of the
//! entry's declared aliases (its folded display name and its lowercase ISO3
//! code). The whitelist is the last gate before country creation, so an
//! incomplete alias table can at worst reject a country, never admit an
//! aggregate.

use std::collections::HashMap;

use crate::{
  Error, Result,
  country::IsoReferenceEntry,
  normalize::{NormalizedKey, Normalizer, fold_label, normalize_iso3},
};

/// Build an [`IsoReferenceEntry`], normalizing its display name and codes.
pub fn reference_entry(
  normalizer: &Normalizer,
  display_name: &str,
  iso2: Option<&str>,
  iso3: &str,
  iso_numeric: Option<&str>,
) -> Result<IsoReferenceEntry> {
  let iso3_norm = normalize_iso3(iso3).ok_or_else(|| Error::InvalidIso3(iso3.to_owned()))?;
  let key = normalizer.normalize(display_name);
  if key.is_non_country() || key.as_str().is_empty() {
    return Err(Error::NonCountryReference(display_name.to_owned()));
  }

  let clean = |v: Option<&str>| {
    v.map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_owned)
  };

  Ok(IsoReferenceEntry {
    display_name: display_name.trim().to_owned(),
    country_norm: key.as_str().to_owned(),
    iso2:         clean(iso2).map(|s| s.to_ascii_uppercase()),
    iso3:         iso3_norm,
    iso_numeric:  clean(iso_numeric),
  })
}

/// Admission set of canonical countries.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
  entries: Vec<IsoReferenceEntry>,
  /// Normalized key or alias → index into `entries`.
  index:   HashMap<String, usize>,
  by_iso3: HashMap<String, usize>,
}

impl Whitelist {
  /// Index `entries`. Canonical keys take precedence over aliases; among
  /// entries sharing an ISO3 the first wins.
  pub fn build(entries: impl IntoIterator<Item = IsoReferenceEntry>) -> Self {
    let mut list: Vec<IsoReferenceEntry> = Vec::new();
    let mut by_iso3 = HashMap::new();
    for entry in entries {
      if by_iso3.contains_key(&entry.iso3) {
        continue;
      }
      by_iso3.insert(entry.iso3.clone(), list.len());
      list.push(entry);
    }

    let mut index = HashMap::with_capacity(list.len() * 3);
    for (i, entry) in list.iter().enumerate() {
      index.entry(entry.country_norm.clone()).or_insert(i);
    }
    for (i, entry) in list.iter().enumerate() {
      index.entry(fold_label(&entry.display_name)).or_insert(i);
      index.entry(entry.iso3.to_ascii_lowercase()).or_insert(i);
    }

    Self { entries: list, index, by_iso3 }
  }

  pub fn is_admissible(&self, key: &NormalizedKey) -> bool {
    self.lookup(key).is_some()
  }

  /// The entry a key resolves to, if admissible.
  pub fn lookup(&self, key: &NormalizedKey) -> Option<&IsoReferenceEntry> {
    if key.is_non_country() {
      return None;
    }
    self.index.get(key.as_str()).map(|&i| &self.entries[i])
  }

  /// Look an entry up by a raw ISO3 code.
  pub fn lookup_iso3(&self, iso3: &str) -> Option<&IsoReferenceEntry> {
    let code = normalize_iso3(iso3)?;
    self.by_iso3.get(&code).map(|&i| &self.entries[i])
  }

  pub fn resolve_iso3(&self, key: &NormalizedKey) -> Option<&str> {
    self.lookup(key).map(|e| e.iso3.as_str())
  }

  pub fn entries(&self) -> &[IsoReferenceEntry] { &self.entries }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn normalizer() -> Normalizer { Normalizer::bundled().unwrap() }

  fn whitelist(n: &Normalizer) -> Whitelist {
    let rows = [
      ("South Korea", "KR", "KOR", "410"),
      ("Côte d’Ivoire", "CI", "CIV", "384"),
      ("US", "US", "USA", "840"),
      ("Brazil", "BR", "BRA", "076"),
    ];
    Whitelist::build(rows.iter().map(|(name, iso2, iso3, num)| {
      reference_entry(n, name, Some(iso2), iso3, Some(num)).unwrap()
    }))
  }

  #[test]
  fn admits_canonical_keys_and_aliases() {
    let n = normalizer();
    let w = whitelist(&n);

    assert_eq!(w.resolve_iso3(&n.normalize("Korea, Rep.")), Some("KOR"));
    assert_eq!(w.resolve_iso3(&n.normalize("United States of America")), Some("USA"));
    assert_eq!(w.resolve_iso3(&n.normalize("Cote d'Ivoire")), Some("CIV"));
    assert_eq!(w.resolve_iso3(&n.normalize("bra")), Some("BRA"));
  }

  #[test]
  fn rejects_aggregates_and_unknown_labels() {
    let n = normalizer();
    let w = whitelist(&n);

    assert!(!w.is_admissible(&n.normalize("World")));
    assert!(!w.is_admissible(&NormalizedKey::non_country()));
    assert!(!w.is_admissible(&n.normalize("Atlantis")));
  }

  #[test]
  fn duplicate_iso3_keeps_first_entry() {
    let n = normalizer();
    let w = Whitelist::build([
      reference_entry(&n, "Brazil", None, "BRA", None).unwrap(),
      reference_entry(&n, "Brasil", None, "bra", None).unwrap(),
    ]);
    assert_eq!(w.len(), 1);
    assert_eq!(w.lookup_iso3("bra").unwrap().display_name, "Brazil");
    assert!(!w.is_admissible(&n.normalize("Brasil")));
  }

  #[test]
  fn reference_entry_validates_codes() {
    let n = normalizer();
    assert!(matches!(
      reference_entry(&n, "Nowhere", None, "N1", None),
      Err(Error::InvalidIso3(_))
    ));
    assert!(matches!(
      reference_entry(&n, "World", None, "WLD", None),
      Err(Error::NonCountryReference(_))
    ));

    let entry = reference_entry(&n, " Korea, Republic of ", Some(" kr "), "kor", Some("")).unwrap();
    assert_eq!(entry.country_norm, "south korea");
    assert_eq!(entry.iso2.as_deref(), Some("KR"));
    assert_eq!(entry.iso3, "KOR");
    assert!(entry.iso_numeric.is_none());
  }

  #[test]
  fn empty_whitelist_admits_nothing() {
    let n = normalizer();
    let w = Whitelist::default();
    assert!(w.is_empty());
    assert!(!w.is_admissible(&n.normalize("Brazil")));
  }
}
