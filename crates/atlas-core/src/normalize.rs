//! Country label normalization.
//!
//! Every raw country label, alias, or code from any source passes through
//! [`Normalizer::normalize`] before it can reach the country dimension. The
//! function is total: unrecognisable input still yields a key, which the ISO
//! whitelist then refuses.
//!
//! The alias table and the region-token list are versioned JSON documents.
//! The copies bundled with this crate live in `data/`; deployments may supply
//! their own.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{Error, Result};

/// Bundled alias table.
pub const BUNDLED_ALIASES: &str = include_str!("../data/country_aliases.json");

/// Bundled region/aggregate token list.
pub const BUNDLED_REGION_TOKENS: &str = include_str!("../data/region_tokens.json");

// Cannot collide with folded text: folding never emits control characters.
const NON_COUNTRY: &str = "\u{1}non-country";

// ─── Key ─────────────────────────────────────────────────────────────────────

/// The deterministic matching form of a country label.
///
/// A key may be the non-country sentinel; callers must check
/// [`NormalizedKey::is_non_country`] and drop such rows instead of creating a
/// country for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NormalizedKey(String);

impl NormalizedKey {
  pub fn non_country() -> Self { Self(NON_COUNTRY.to_owned()) }

  pub fn is_non_country(&self) -> bool { self.0 == NON_COUNTRY }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for NormalizedKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_non_country() {
      f.write_str("<non-country>")
    } else {
      f.write_str(&self.0)
    }
  }
}

// ─── Text folding ────────────────────────────────────────────────────────────

/// Trim, case-fold, strip diacritics, unify apostrophes, and collapse
/// internal whitespace. No alias or region handling.
pub fn fold_label(raw: &str) -> String {
  let folded: String = raw
    .trim()
    .to_lowercase()
    .nfkd()
    .filter(|c| !is_combining_mark(*c))
    .map(|c| match c {
      '\u{2018}' | '\u{2019}' | '\u{02BC}' | '`' => '\'',
      other => other,
    })
    .collect();
  folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize an ISO 3166-1 alpha-3 code: trimmed, uppercase, exactly three
/// ASCII letters.
pub fn normalize_iso3(raw: &str) -> Option<String> {
  let code = raw.trim().to_ascii_uppercase();
  (code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())).then_some(code)
}

// ─── Data files ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AliasFile {
  version: u32,
  aliases: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct RegionFile {
  version: u32,
  tokens:  Vec<String>,
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

/// Maps raw labels to [`NormalizedKey`]s using an alias table and a list of
/// region tokens.
#[derive(Debug, Clone)]
pub struct Normalizer {
  aliases:         HashMap<String, String>,
  region_tokens:   HashSet<String>,
  alias_version:   u32,
  regions_version: u32,
}

impl Normalizer {
  /// Build from the data files shipped with this crate.
  pub fn bundled() -> Result<Self> {
    Self::from_json(BUNDLED_ALIASES, BUNDLED_REGION_TOKENS)
  }

  /// Build from alias-table and region-token JSON documents.
  pub fn from_json(aliases_json: &str, region_tokens_json: &str) -> Result<Self> {
    let alias_file: AliasFile = serde_json::from_str(aliases_json)?;
    let region_file: RegionFile = serde_json::from_str(region_tokens_json)?;

    let mut aliases = HashMap::with_capacity(alias_file.aliases.len());
    for (from, to) in alias_file.aliases {
      let (from, to) = (fold_label(&from), fold_label(&to));
      if from.is_empty() || to.is_empty() {
        return Err(Error::AliasTable(format!(
          "blank alias entry {from:?} -> {to:?}"
        )));
      }
      aliases.insert(from, to);
    }

    let region_tokens: HashSet<String> = region_file
      .tokens
      .iter()
      .map(|t| fold_label(t))
      .filter(|t| !t.is_empty())
      .collect();

    if let Some(target) = aliases.values().find(|t| region_tokens.contains(*t)) {
      return Err(Error::AliasTable(format!(
        "alias target {target:?} is also a region token"
      )));
    }

    Ok(Self {
      aliases,
      region_tokens,
      alias_version: alias_file.version,
      regions_version: region_file.version,
    })
  }

  /// Map a raw label to its normalized key. Never fails.
  pub fn normalize(&self, raw: &str) -> NormalizedKey {
    let folded = fold_label(raw);
    if self.region_tokens.contains(&folded) {
      return NormalizedKey::non_country();
    }
    NormalizedKey(self.aliases.get(&folded).cloned().unwrap_or(folded))
  }


  /// `(alias table version, region token version)`.
  pub fn versions(&self) -> (u32, u32) {
    (self.alias_version, self.regions_version)
  }
}
