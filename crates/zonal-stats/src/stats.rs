//! Statistic selection, the masked-array reducer and split recombination.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use ndarray::Array2;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

use grid_io::GridView;

use crate::error::{Result, ZonalError};
use crate::features::Properties;
use crate::mask::CoverageMask;

/// Every named statistic, in canonical order.
pub const VALID_STATS: [&str; 13] = [
    "count", "min", "max", "mean", "sum", "std", "median", "majority", "minority", "unique",
    "range", "nodata", "nan",
];

/// Statistics computed when none are requested.
pub const DEFAULT_STATS: [&str; 4] = ["count", "min", "max", "mean"];

const PERCENTILE_PREFIX: &str = "percentile_";

// ============================================================================
// Statistic names
// ============================================================================

/// One requested statistic.
#[derive(Debug, Clone, PartialEq)]
pub enum Stat {
    Count,
    Min,
    Max,
    Mean,
    Sum,
    Std,
    Median,
    Majority,
    Minority,
    Unique,
    Range,
    Nodata,
    Nan,
    /// `percentile_<q>`; `name` is the requested spelling and the result key.
    Percentile { q: f64, name: String },
}

impl Stat {
    /// Parse a statistic name.
    pub fn parse(name: &str) -> Result<Self> {
        let stat = match name {
            "count" => Self::Count,
            "min" => Self::Min,
            "max" => Self::Max,
            "mean" => Self::Mean,
            "sum" => Self::Sum,
            "std" => Self::Std,
            "median" => Self::Median,
            "majority" => Self::Majority,
            "minority" => Self::Minority,
            "unique" => Self::Unique,
            "range" => Self::Range,
            "nodata" => Self::Nodata,
            "nan" => Self::Nan,
            other if other.starts_with(PERCENTILE_PREFIX) => Self::Percentile {
                q: get_percentile(other)?,
                name: other.to_string(),
            },
            other => return Err(ZonalError::invalid_stat(other, &VALID_STATS)),
        };
        Ok(stat)
    }

    /// Result key for this statistic.
    pub fn name(&self) -> &str {
        match self {
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Std => "std",
            Self::Median => "median",
            Self::Majority => "majority",
            Self::Minority => "minority",
            Self::Unique => "unique",
            Self::Range => "range",
            Self::Nodata => "nodata",
            Self::Nan => "nan",
            Self::Percentile { name, .. } => name,
        }
    }

    /// Whether partial results for this statistic can be merged across split pieces.
    pub fn is_composable(&self) -> bool {
        matches!(
            self,
            Self::Count
                | Self::Min
                | Self::Max
                | Self::Mean
                | Self::Sum
                | Self::Range
                | Self::Nodata
                | Self::Nan
        )
    }

    fn needs_frequency_table(&self) -> bool {
        matches!(self, Self::Majority | Self::Minority | Self::Unique)
    }

    fn needs_sorted_values(&self) -> bool {
        matches!(self, Self::Median | Self::Percentile { .. })
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse the `q` out of a `percentile_<q>` name, requiring `0 <= q <= 100`.
pub fn get_percentile(name: &str) -> Result<f64> {
    let q_str = name
        .strip_prefix(PERCENTILE_PREFIX)
        .ok_or_else(|| ZonalError::invalid_percentile(name, "must start with 'percentile_'"))?;
    let q: f64 = q_str
        .parse()
        .map_err(|_| ZonalError::invalid_percentile(name, format!("`{q_str}` is not a number")))?;
    if !q.is_finite() || q > 100.0 {
        return Err(ZonalError::invalid_percentile(name, "percentiles must be <= 100"));
    }
    if q < 0.0 {
        return Err(ZonalError::invalid_percentile(name, "percentiles must be >= 0"));
    }
    Ok(q)
}

/// Which statistics to compute.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StatSelection {
    /// `count min max mean`, or nothing in categorical mode.
    #[default]
    Default,
    /// Every name in [`VALID_STATS`].
    All,
    Names(Vec<String>),
}

impl StatSelection {
    /// Parse a space-delimited list; `*` and `ALL` select everything.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text == "*" || text == "ALL" {
            return Self::All;
        }
        Self::Names(text.split_whitespace().map(str::to_string).collect())
    }
}

impl From<&str> for StatSelection {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<Vec<String>> for StatSelection {
    fn from(names: Vec<String>) -> Self {
        Self::Names(names)
    }
}

impl From<&[&str]> for StatSelection {
    fn from(names: &[&str]) -> Self {
        Self::Names(names.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for StatSelection {
    fn from(names: [&str; N]) -> Self {
        Self::Names(names.iter().map(|s| s.to_string()).collect())
    }
}

/// Resolve a selection into the ordered statistics to compute.
pub fn check_stats(selection: &StatSelection, categorical: bool) -> Result<Vec<Stat>> {
    let names: Vec<&str> = match selection {
        StatSelection::All => VALID_STATS.to_vec(),
        StatSelection::Names(names) if !names.is_empty() => {
            if names.len() == 1 && (names[0] == "*" || names[0] == "ALL") {
                VALID_STATS.to_vec()
            } else {
                names.iter().map(String::as_str).collect()
            }
        }
        _ if categorical => Vec::new(),
        _ => DEFAULT_STATS.to_vec(),
    };
    names.into_iter().map(Stat::parse).collect()
}

// ============================================================================
// Values and keys
// ============================================================================

/// A pixel value usable as an ordered map key.
#[derive(Debug, Clone, Copy)]
pub struct PixelValue(f64);

impl PixelValue {
    pub fn new(value: f64) -> Self {
        // fold -0.0 into 0.0 so both land on one category
        Self(if value == 0.0 { 0.0 } else { value })
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl From<f64> for PixelValue {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl PartialEq for PixelValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PixelValue {}

impl PartialOrd for PixelValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PixelValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for PixelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_finite() && self.0.fract() == 0.0 && self.0.abs() < 1e15 {
            write!(f, "{}", self.0 as i64)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Maps raw pixel values to category labels.
pub type CategoryMap = BTreeMap<PixelValue, String>;

/// Pixel value counts, ordered by value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencyTable(BTreeMap<PixelValue, u64>);

impl FrequencyTable {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut table = BTreeMap::new();
        for v in values {
            *table.entry(PixelValue::new(v)).or_insert(0) += 1;
        }
        Self(table)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, value: f64) -> Option<u64> {
        self.0.get(&PixelValue::new(value)).copied()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, u64)> + '_ {
        self.0.iter().map(|(k, &c)| (k.value(), c))
    }

    /// Most frequent value; ties go to the lowest value.
    pub fn majority(&self) -> Option<f64> {
        self.select(|count, best| count > best)
    }

    /// Least frequent value; ties go to the lowest value.
    pub fn minority(&self) -> Option<f64> {
        self.select(|count, best| count < best)
    }

    fn select(&self, better: impl Fn(u64, u64) -> bool) -> Option<f64> {
        let mut best: Option<(PixelValue, u64)> = None;
        for (&value, &count) in &self.0 {
            match best {
                Some((_, best_count)) if !better(count, best_count) => {}
                _ => best = Some((value, count)),
            }
        }
        best.map(|(value, _)| value.value())
    }
}

/// A single statistic value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Null,
    Int(i64),
    Float(f64),
}

impl StatValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Null => None,
            Self::Int(i) => Some(i as f64),
            Self::Float(f) => Some(f),
        }
    }

    pub fn to_json(&self) -> Value {
        match *self {
            Self::Null => Value::Null,
            Self::Int(i) => Value::from(i),
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

impl From<f64> for StatValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for StatValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Option<f64>> for StatValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Float)
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Key of a result entry.
#[derive(Debug, Clone, PartialEq)]
pub enum StatKey {
    /// A statistic or custom stat name.
    Name(String),
    /// A raw pixel value from the categorical table.
    Category(PixelValue),
    /// A category label from the category map.
    Label(String),
}

impl StatKey {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn is_category(&self) -> bool {
        matches!(self, Self::Category(_) | Self::Label(_))
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) | Self::Label(name) => f.write_str(name),
            Self::Category(value) => write!(f, "{value}"),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Statistics for one zone, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZonalStats {
    entries: Vec<(StatKey, StatValue)>,
}

impl ZonalStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by its rendered key (stat name, label or category value).
    pub fn get(&self, key: &str) -> Option<&StatValue> {
        self.entries
            .iter()
            .find(|(k, _)| match k {
                StatKey::Name(name) | StatKey::Label(name) => name == key,
                StatKey::Category(value) => value.to_string() == key,
            })
            .map(|(_, v)| v)
    }

    pub fn get_key(&self, key: &StatKey) -> Option<&StatValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Count for a raw category value.
    pub fn category(&self, value: f64) -> Option<&StatValue> {
        self.get_key(&StatKey::Category(PixelValue::new(value)))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert an entry, replacing an existing value in place.
    pub fn insert(&mut self, key: StatKey, value: StatValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn insert_stat(&mut self, name: impl Into<String>, value: impl Into<StatValue>) {
        self.insert(StatKey::Name(name.into()), value.into());
    }

    fn add_count(&mut self, key: StatKey, count: i64) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, StatValue::Int(existing))) => *existing += count,
            Some(entry) => entry.1 = StatValue::Int(count),
            None => self.entries.push((key, StatValue::Int(count))),
        }
    }

    pub fn remove(&mut self, key: &StatKey) -> Option<StatValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StatKey, &StatValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Rendered keys in order.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().map(|(k, _)| k.to_string())
    }

    /// Category entries only.
    pub fn categories(&self) -> impl Iterator<Item = (&StatKey, &StatValue)> {
        self.iter().filter(|(k, _)| k.is_category())
    }

    /// Prefix statistic names; category keys are left alone.
    pub fn prefixed(self, prefix: &str) -> Self {
        let entries = self
            .entries
            .into_iter()
            .map(|(key, value)| match key {
                StatKey::Name(name) => (StatKey::Name(format!("{prefix}{name}")), value),
                other => (other, value),
            })
            .collect();
        Self { entries }
    }

    /// Entries as JSON properties.
    pub fn to_properties(&self) -> Properties {
        self.entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect()
    }
}

impl Serialize for ZonalStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(&key.to_string(), value)?;
        }
        map.end()
    }
}

// ============================================================================
// Masked arrays and hooks
// ============================================================================

/// Cell values with an explicit exclusion mask (`true` = excluded).
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedArray {
    pub data: Array2<f64>,
    pub mask: Array2<bool>,
}

impl MaskedArray {
    pub fn new(data: Array2<f64>, mask: Array2<bool>) -> Self {
        Self { data, mask }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Unmasked values in row-major order.
    pub fn compressed(&self) -> Vec<f64> {
        self.data
            .iter()
            .zip(self.mask.iter())
            .filter(|(_, m)| !**m)
            .map(|(v, _)| *v)
            .collect()
    }

    /// Number of unmasked cells.
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|m| !**m).count()
    }

    /// Whether every cell is masked.
    pub fn is_fully_masked(&self) -> bool {
        self.mask.iter().all(|m| *m)
    }
}

/// A caller-supplied statistic, in one of three call shapes.
pub enum AddStat {
    Masked(Box<dyn Fn(&MaskedArray) -> StatValue>),
    WithProperties(Box<dyn Fn(&MaskedArray, &Properties) -> StatValue>),
    WithCoverage(Box<dyn Fn(&MaskedArray, &Properties, &CoverageMask) -> StatValue>),
}

impl AddStat {
    pub fn masked(f: impl Fn(&MaskedArray) -> StatValue + 'static) -> Self {
        Self::Masked(Box::new(f))
    }

    pub fn with_properties(f: impl Fn(&MaskedArray, &Properties) -> StatValue + 'static) -> Self {
        Self::WithProperties(Box::new(f))
    }

    pub fn with_coverage(
        f: impl Fn(&MaskedArray, &Properties, &CoverageMask) -> StatValue + 'static,
    ) -> Self {
        Self::WithCoverage(Box::new(f))
    }

    pub fn call(&self, array: &MaskedArray, properties: &Properties, coverage: &CoverageMask) -> StatValue {
        match self {
            Self::Masked(f) => f(array),
            Self::WithProperties(f) => f(array, properties),
            Self::WithCoverage(f) => f(array, properties, coverage),
        }
    }
}

impl fmt::Debug for AddStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arity = match self {
            Self::Masked(_) => "Masked",
            Self::WithProperties(_) => "WithProperties",
            Self::WithCoverage(_) => "WithCoverage",
        };
        write!(f, "AddStat::{arity}")
    }
}

/// Hook run on each zone's masked array before reduction.
pub type ZoneFn = Box<dyn FnMut(&mut MaskedArray)>;

// ============================================================================
// Reduction
// ============================================================================

/// Reduces masked arrays to the requested statistics.
#[derive(Debug, Clone, Default)]
pub struct Reducer {
    stats: Vec<Stat>,
    categorical: bool,
    category_map: Option<CategoryMap>,
}

impl Reducer {
    pub fn new(stats: Vec<Stat>, categorical: bool) -> Self {
        Self {
            stats,
            categorical,
            category_map: None,
        }
    }

    pub fn with_category_map(mut self, category_map: Option<CategoryMap>) -> Self {
        self.category_map = category_map;
        self
    }

    pub fn stats(&self) -> &[Stat] {
        &self.stats
    }

    /// Reduce one zone.
    ///
    /// With `weights`, `count`, `sum` and `mean` are coverage-weighted.
    pub fn reduce(&self, array: &MaskedArray, weights: Option<&Array2<f64>>) -> ZonalStats {
        self.reduce_with(&self.stats, array, weights)
    }

    /// Reduce one split piece, keeping the partials [`recombine`] needs.
    pub fn reduce_piece(&self, array: &MaskedArray, weights: Option<&Array2<f64>>) -> ZonalStats {
        let mut stats = self.stats.clone();
        let needs_partials = stats.iter().any(|s| matches!(s, Stat::Mean | Stat::Range));
        if needs_partials {
            for extra in [Stat::Count, Stat::Min, Stat::Max] {
                if !stats.contains(&extra) {
                    stats.push(extra);
                }
            }
        }
        self.reduce_with(&stats, array, weights)
    }

    /// Merge split pieces into one result for the requested statistics.
    pub fn recombine(&self, pieces: &[ZonalStats]) -> ZonalStats {
        recombine(pieces, &self.stats)
    }

    fn reduce_with(&self, stats: &[Stat], array: &MaskedArray, weights: Option<&Array2<f64>>) -> ZonalStats {
        let mut values = Vec::new();
        let mut cell_weights = Vec::new();
        for ((index, &v), &masked) in array.data.indexed_iter().zip(array.mask.iter()) {
            if masked {
                continue;
            }
            values.push(v);
            if let Some(w) = weights {
                cell_weights.push(w.get(index).copied().unwrap_or(0.0));
            }
        }

        let mut out = ZonalStats::new();
        if values.is_empty() {
            for stat in stats {
                let value = match stat {
                    Stat::Count => StatValue::Int(0),
                    _ => StatValue::Null,
                };
                out.insert_stat(stat.name(), value);
            }
            return out;
        }

        let n = values.len();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let plain_sum: f64 = values.iter().sum();
        let plain_mean = plain_sum / n as f64;

        let (count, sum) = if weights.is_some() {
            let count: f64 = cell_weights.iter().sum();
            let sum: f64 = values.iter().zip(&cell_weights).map(|(v, w)| v * w).sum();
            (StatValue::Float(count), sum)
        } else {
            (StatValue::Int(n as i64), plain_sum)
        };
        let mean = match count.as_f64() {
            Some(c) if c > 0.0 => StatValue::Float(sum / c),
            _ => StatValue::Null,
        };

        let sorted = stats.iter().any(Stat::needs_sorted_values).then(|| {
            let mut sorted = values.clone();
            sorted.sort_by(f64::total_cmp);
            sorted
        });
        let frequencies = (self.categorical || stats.iter().any(Stat::needs_frequency_table))
            .then(|| FrequencyTable::from_values(values.iter().copied()));

        for stat in stats {
            let value = match stat {
                Stat::Count => count,
                Stat::Min => StatValue::Float(min),
                Stat::Max => StatValue::Float(max),
                Stat::Mean => mean,
                Stat::Sum => StatValue::Float(sum),
                Stat::Std => {
                    let variance =
                        values.iter().map(|v| (v - plain_mean).powi(2)).sum::<f64>() / n as f64;
                    StatValue::Float(variance.sqrt())
                }
                Stat::Median => sorted.as_deref().and_then(|s| percentile(s, 50.0)).into(),
                Stat::Percentile { q, .. } => sorted.as_deref().and_then(|s| percentile(s, *q)).into(),
                Stat::Majority => frequencies.as_ref().and_then(FrequencyTable::majority).into(),
                Stat::Minority => frequencies.as_ref().and_then(FrequencyTable::minority).into(),
                Stat::Unique => frequencies
                    .as_ref()
                    .map_or(StatValue::Null, |t| StatValue::Int(t.len() as i64)),
                Stat::Range => StatValue::Float(max - min),
                // filled from the unmasked window by the pipeline
                Stat::Nodata | Stat::Nan => StatValue::Null,
            };
            out.insert_stat(stat.name(), value);
        }

        if self.categorical {
            if let Some(table) = &frequencies {
                for (value, count) in table.iter() {
                    out.add_count(self.category_key(value), count as i64);
                }
            }
        }

        out
    }

    fn category_key(&self, value: f64) -> StatKey {
        let key = PixelValue::new(value);
        match self.category_map.as_ref().and_then(|m| m.get(&key)) {
            Some(label) => StatKey::Label(label.clone()),
            None => StatKey::Category(key),
        }
    }
}

/// Linear-interpolation percentile of ascending `sorted` values.
pub fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let position = (q / 100.0).clamp(0.0, 1.0) * last as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;
    let fraction = position - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * fraction)
}

/// Count covered cells equal to no-data, and covered NaN cells.
///
/// Only coverage is considered, not the validity mask.
pub fn count_nodata_nan(view: &GridView, covered: &Array2<bool>) -> (i64, i64) {
    let mut nodata = 0;
    let mut nan = 0;
    for (&v, &c) in view.data.iter().zip(covered.iter()) {
        if !c {
            continue;
        }
        if v.is_nan() {
            nan += 1;
        } else if view.is_nodata(v) {
            nodata += 1;
        }
    }
    (nodata, nan)
}

/// Merge per-piece results of a split geometry.
///
/// Pieces where a statistic is `Null` do not contribute to it.
pub fn recombine(pieces: &[ZonalStats], stats: &[Stat]) -> ZonalStats {
    let values = |name: &str| -> Vec<StatValue> {
        pieces
            .iter()
            .filter_map(|p| p.get_key(&StatKey::name(name)).copied())
            .filter(|v| !v.is_null())
            .collect()
    };
    let extreme = |name: &str, pick: fn(f64, f64) -> f64| -> Option<f64> {
        values(name).iter().filter_map(StatValue::as_f64).reduce(pick)
    };

    let mut out = ZonalStats::new();
    for stat in stats {
        let value = match stat {
            Stat::Count | Stat::Sum | Stat::Nodata | Stat::Nan => add_values(&values(stat.name())),
            Stat::Min => extreme("min", f64::min).into(),
            Stat::Max => extreme("max", f64::max).into(),
            Stat::Range => match (extreme("min", f64::min), extreme("max", f64::max)) {
                (Some(lo), Some(hi)) => StatValue::Float(hi - lo),
                _ => StatValue::Null,
            },
            Stat::Mean => {
                let mut numerator = 0.0;
                let mut denominator = 0.0;
                for piece in pieces {
                    let mean = piece.get_key(&StatKey::name("mean")).and_then(StatValue::as_f64);
                    let count = piece.get_key(&StatKey::name("count")).and_then(StatValue::as_f64);
                    if let (Some(mean), Some(count)) = (mean, count) {
                        numerator += mean * count;
                        denominator += count;
                    }
                }
                if denominator > 0.0 {
                    StatValue::Float(numerator / denominator)
                } else {
                    StatValue::Null
                }
            }
            _ => StatValue::Null,
        };
        out.insert_stat(stat.name(), value);
    }

    for piece in pieces {
        for (key, value) in piece.categories() {
            if let StatValue::Int(count) = value {
                out.add_count(key.clone(), *count);
            }
        }
    }

    out
}

fn add_values(values: &[StatValue]) -> StatValue {
    if values.is_empty() {
        return StatValue::Null;
    }
    if values.iter().all(|v| matches!(v, StatValue::Int(_))) {
        StatValue::Int(
            values
                .iter()
                .map(|v| match v {
                    StatValue::Int(i) => *i,
                    _ => 0,
                })
                .sum(),
        )
    } else {
        StatValue::Float(values.iter().filter_map(StatValue::as_f64).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn unmasked(data: Array2<f64>) -> MaskedArray {
        let mask = Array2::from_elem(data.dim(), false);
        MaskedArray::new(data, mask)
    }

    fn float(stats: &ZonalStats, key: &str) -> f64 {
        stats.get(key).and_then(StatValue::as_f64).unwrap()
    }

    // ========================================================================
    // Selection
    // ========================================================================

    #[test]
    fn test_check_stats_defaults() {
        let stats = check_stats(&StatSelection::Default, false).unwrap();
        let names: Vec<_> = stats.iter().map(Stat::name).collect();
        assert_eq!(names, DEFAULT_STATS);
        assert!(check_stats(&StatSelection::Default, true).unwrap().is_empty());
        assert_eq!(check_stats(&StatSelection::Names(vec![]), false).unwrap().len(), 4);
    }

    #[test]
    fn test_check_stats_all() {
        assert_eq!(check_stats(&"*".into(), false).unwrap().len(), VALID_STATS.len());
        assert_eq!(check_stats(&"ALL".into(), false).unwrap().len(), VALID_STATS.len());
    }

    #[test]
    fn test_check_stats_rejects_unknown() {
        let err = check_stats(&"min foo".into(), false).unwrap_err();
        assert!(matches!(err, ZonalError::InvalidStat { ref name, .. } if name == "foo"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_get_percentile() {
        assert_eq!(get_percentile("percentile_50").unwrap(), 50.0);
        assert_eq!(get_percentile("percentile_12.5").unwrap(), 12.5);
        assert!(get_percentile("percentile_101").is_err());
        assert!(get_percentile("percentile_-1").is_err());
        assert!(get_percentile("percentile_abc").is_err());
        assert!(get_percentile("pct_50").is_err());
    }

    // ========================================================================
    // Reduction
    // ========================================================================

    #[test]
    fn test_basic_reduction() {
        let stats = check_stats(&"count min max mean sum std median range unique".into(), false).unwrap();
        let result = Reducer::new(stats, false).reduce(&unmasked(array![[1.0, 2.0], [3.0, 4.0]]), None);

        assert_eq!(result.get("count"), Some(&StatValue::Int(4)));
        assert_eq!(float(&result, "min"), 1.0);
        assert_eq!(float(&result, "max"), 4.0);
        assert_eq!(float(&result, "mean"), 2.5);
        assert_eq!(float(&result, "sum"), 10.0);
        assert_relative_eq!(float(&result, "std"), 1.25f64.sqrt());
        assert_eq!(float(&result, "median"), 2.5);
        assert_eq!(float(&result, "range"), 3.0);
        assert_eq!(result.get("unique"), Some(&StatValue::Int(4)));
    }

    #[test]
    fn test_empty_zone() {
        let stats = check_stats(&"count min mean majority".into(), false).unwrap();
        let data = array![[1.0, 2.0]];
        let array = MaskedArray::new(data, array![[true, true]]);
        let result = Reducer::new(stats, false).reduce(&array, None);

        assert_eq!(result.get("count"), Some(&StatValue::Int(0)));
        assert_eq!(result.get("min"), Some(&StatValue::Null));
        assert_eq!(result.get("mean"), Some(&StatValue::Null));
        assert_eq!(result.get("majority"), Some(&StatValue::Null));
    }

    #[test]
    fn test_range_alone_hides_min_max() {
        let stats = check_stats(&"range".into(), false).unwrap();
        let result = Reducer::new(stats, false).reduce(&unmasked(array![[5.0, -2.0]]), None);
        assert_eq!(float(&result, "range"), 7.0);
        assert!(!result.contains("min"));
        assert!(!result.contains("max"));
    }

    #[test]
    fn test_percentile_matches_median() {
        let stats = check_stats(&"median percentile_50 percentile_25".into(), false).unwrap();
        let data = array![[7.0, 1.0, 3.0, 10.0, 4.0]];
        let result = Reducer::new(stats, false).reduce(&unmasked(data), None);
        assert_eq!(result.get("median"), result.get("percentile_50"));
        assert_eq!(float(&result, "percentile_25"), 3.0);
    }

    #[test]
    fn test_majority_minority_tie_break_lowest() {
        let stats = check_stats(&"majority minority".into(), false).unwrap();
        let data = array![[3.0, 3.0, 1.0, 1.0, 2.0, 5.0]];
        let result = Reducer::new(stats, false).reduce(&unmasked(data), None);
        assert_eq!(float(&result, "majority"), 1.0);
        assert_eq!(float(&result, "minority"), 2.0);
    }

    #[test]
    fn test_categorical_counts_and_remap() {
        let data = array![[1.0, 1.0, 2.0], [3.0, 3.0, 3.0]];
        let raw = Reducer::new(vec![], true).reduce(&unmasked(data.clone()), None);
        assert_eq!(raw.category(1.0), Some(&StatValue::Int(2)));
        assert_eq!(raw.category(3.0), Some(&StatValue::Int(3)));
        assert_eq!(raw.get("2"), Some(&StatValue::Int(1)));

        let map: CategoryMap = [(PixelValue::new(1.0), "low".to_string()), (PixelValue::new(2.0), "low".to_string())]
            .into_iter()
            .collect();
        let remapped = Reducer::new(vec![], true)
            .with_category_map(Some(map))
            .reduce(&unmasked(data), None);
        assert_eq!(remapped.get("low"), Some(&StatValue::Int(3)));
        assert_eq!(remapped.category(3.0), Some(&StatValue::Int(3)));

        let total = |s: &ZonalStats| -> f64 { s.categories().filter_map(|(_, v)| v.as_f64()).sum() };
        assert_eq!(total(&raw), total(&remapped));
    }

    #[test]
    fn test_weighted_reduction() {
        let stats = check_stats(&StatSelection::Default, false).unwrap();
        let weights = array![[1.0, 0.5]];
        let result = Reducer::new(stats, false).reduce(&unmasked(array![[2.0, 4.0]]), Some(&weights));
        assert_eq!(result.get("count"), Some(&StatValue::Float(1.5)));
        assert_relative_eq!(float(&result, "mean"), 4.0 / 1.5);
    }

    #[test]
    fn test_prefix_skips_categories() {
        let result = Reducer::new(check_stats(&"count".into(), true).unwrap(), true)
            .reduce(&unmasked(array![[4.0]]), None)
            .prefixed("_");
        let keys: Vec<_> = result.keys().collect();
        assert_eq!(keys, vec!["_count", "4"]);
    }

    #[test]
    fn test_serialize_preserves_order() {
        let mut stats = ZonalStats::new();
        stats.insert_stat("min", 1.5);
        stats.insert_stat("count", 3i64);
        stats.insert_stat("mean", StatValue::Null);
        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(json, r#"{"min":1.5,"count":3,"mean":null}"#);
    }

    #[test]
    fn test_pixel_value_display() {
        assert_eq!(PixelValue::new(3.0).to_string(), "3");
        assert_eq!(PixelValue::new(-0.0).to_string(), "0");
        assert_eq!(PixelValue::new(2.5).to_string(), "2.5");
    }

    // ========================================================================
    // Recombination
    // ========================================================================

    #[test]
    fn test_recombine() {
        let stats = check_stats(&"count sum min max mean range".into(), false).unwrap();
        let reducer = Reducer::new(stats, false);
        let a = reducer.reduce_piece(&unmasked(array![[1.0, 2.0]]), None);
        let b = reducer.reduce_piece(&unmasked(array![[6.0]]), None);
        let empty = reducer.reduce_piece(&MaskedArray::new(array![[0.0]], array![[true]]), None);

        let merged = reducer.recombine(&[a, empty, b]);
        assert_eq!(merged.get("count"), Some(&StatValue::Int(3)));
        assert_eq!(float(&merged, "sum"), 9.0);
        assert_eq!(float(&merged, "min"), 1.0);
        assert_eq!(float(&merged, "max"), 6.0);
        assert_eq!(float(&merged, "mean"), 3.0);
        assert_eq!(float(&merged, "range"), 5.0);
    }

    #[test]
    fn test_recombine_all_empty() {
        let reducer = Reducer::new(check_stats(&"count mean range".into(), false).unwrap(), false);
        let empty = reducer.reduce_piece(&MaskedArray::new(array![[0.0]], array![[true]]), None);
        let merged = reducer.recombine(&[empty.clone(), empty]);
        assert_eq!(merged.get("count"), Some(&StatValue::Int(0)));
        assert_eq!(merged.get("mean"), Some(&StatValue::Null));
        assert_eq!(merged.get("range"), Some(&StatValue::Null));
        assert!(!merged.contains("min"));
    }

    #[test]
    fn test_recombine_categories() {
        let reducer = Reducer::new(vec![], true);
        let a = reducer.reduce_piece(&unmasked(array![[1.0, 2.0]]), None);
        let b = reducer.reduce_piece(&unmasked(array![[2.0, 2.0]]), None);
        let merged = reducer.recombine(&[a, b]);
        assert_eq!(merged.category(1.0), Some(&StatValue::Int(1)));
        assert_eq!(merged.category(2.0), Some(&StatValue::Int(3)));
    }

    #[test]
    fn test_count_nodata_nan() {
        let view = GridView {
            data: array![[f64::NAN, 12.25], [-999.0, 12.75]],
            transform: zonal_common::Affine::identity(),
            nodata: Some(-999.0),
            mask: None,
            band: 1,
        };
        let covered = array![[true, true], [true, false]];
        assert_eq!(count_nodata_nan(&view, &covered), (1, 1));
    }
}
