use anyhow::{anyhow, Context, Result};
use csv::StringRecord;
use regex::{Regex, RegexBuilder};

use super::chunk::{COUNTRIES_TAGS, ENERGY_KCAL, PRODUCT_NAME};
use crate::utils::{is_null, non_null};

/// Case-insensitive substring match of `countries_tags` against a set of names.
#[derive(Debug, Clone)]
pub struct CountryFilter {
    re: Regex,
}

impl CountryFilter {
    pub fn new(countries: &[String]) -> Result<Self> {
        let alternatives: Vec<String> = countries
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Err(anyhow!("at least one target country is required"));
        }

        let re = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()
            .context("building country pattern")?;
        Ok(Self { re })
    }

    pub fn matches(&self, countries_tags: &str) -> bool {
        non_null(countries_tags).is_some_and(|tags| self.re.is_match(tags))
    }

    pub fn as_str(&self) -> &str {
        self.re.as_str()
    }
}

/// Apply the country mask, then drop rows without a name or energy value.
///
/// Returns the row projected to the filtered-CSV shape (without
/// `countries_tags`), null sentinels written as empty fields.
pub fn keep_row(filter: &CountryFilter, row: &StringRecord) -> Option<StringRecord> {
    if !filter.matches(row.get(COUNTRIES_TAGS).unwrap_or("")) {
        return None;
    }
    let name = row.get(PRODUCT_NAME).unwrap_or("");
    let energy = row.get(ENERGY_KCAL).unwrap_or("");
    if is_null(name) || is_null(energy) {
        return None;
    }

    Some(
        row.iter()
            .take(COUNTRIES_TAGS)
            .map(|f| if is_null(f) { "" } else { f })
            .collect(),
    )
}
