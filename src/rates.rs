//! # Payout Rates
//!
//! Per-author payout multipliers and their persistence.
//!
//! - `RateTable` maps an author name to a non-negative rate; missing authors pay 0.
//! - Every value entering the table goes through `sanitize_rate`, so negative,
//!   NaN or infinite rates never reach the payout engine.
//! - `FileRateStore` keeps the table under the `payoutRates` key of a small JSON
//!   key-value file; other keys in that file are left alone.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Key under which the rate table is stored in the key-value file.
pub const RATES_KEY: &str = "payoutRates";

/// Author → rate. Ordered so that serialization and hashing are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateTable {
    rates: BTreeMap<String, f64>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rate for `author`, 0 when absent.
    pub fn get(&self, author: &str) -> f64 {
        self.rates.get(author).copied().map(sanitize_rate).unwrap_or(0.0)
    }

    /// Set one author's rate. Invalid values are stored as 0.
    pub fn set(&mut self, author: impl Into<String>, rate: f64) {
        self.rates.insert(author.into(), sanitize_rate(rate));
    }

    pub fn contains(&self, author: &str) -> bool {
        self.rates.contains_key(author)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.rates.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Build a table from loosely-typed JSON (numbers or numeric strings).
    fn from_json_object(obj: &Map<String, Value>) -> Self {
        let mut table = Self::new();
        for (author, v) in obj {
            let rate = match v {
                Value::Number(n) => n.as_f64().unwrap_or(0.0),
                Value::String(s) => parse_rate_input(s),
                _ => 0.0,
            };
            table.set(author.clone(), rate);
        }
        table
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for RateTable {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (author, rate) in iter {
            table.set(author, rate);
        }
        table
    }
}

/// Clamp a rate into the valid domain: negative, NaN and infinite become 0.
pub fn sanitize_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        0.0
    }
}

/// Parse user-typed rate text. Reads the leading decimal number and ignores the rest,
/// so `"12.5/article"` gives 12.5; anything without a leading number gives 0.
pub fn parse_rate_input(raw: &str) -> f64 {
    static RE_LEADING_NUM: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^\s*[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?").unwrap()
    });
    RE_LEADING_NUM
        .find(raw)
        .and_then(|m| m.as_str().trim().parse::<f64>().ok())
        .map(sanitize_rate)
        .unwrap_or(0.0)
}

/// Persistence for the rate table. Writes are whole-table.
pub trait RateStore: Send + Sync {
    fn load_rates(&self) -> Result<RateTable>;
    fn save_rates(&self, rates: &RateTable) -> Result<()>;
}

/// JSON key-value file; rates live under [`RATES_KEY`].
#[derive(Debug, Clone)]
pub struct FileRateStore {
    path: PathBuf,
}

impl FileRateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_kv(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("reading rate store {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content)
            .with_context(|| format!("parsing rate store {}", self.path.display()))?
        {
            Value::Object(map) => Ok(map),
            _ => Err(anyhow::anyhow!(
                "rate store {} is not a JSON object",
                self.path.display()
            )),
        }
    }
}

impl RateStore for FileRateStore {
    fn load_rates(&self) -> Result<RateTable> {
        let kv = self.read_kv()?;
        Ok(match kv.get(RATES_KEY) {
            Some(Value::Object(obj)) => RateTable::from_json_object(obj),
            _ => RateTable::new(),
        })
    }

    fn save_rates(&self, rates: &RateTable) -> Result<()> {
        // An unreadable document is left alone; overwriting it would drop every key.
        let mut kv = self.read_kv()?;
        kv.insert(RATES_KEY.to_string(), serde_json::to_value(rates)?);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating rate store dir {}", dir.display()))?;
        }
        // Write-then-rename: readers never see a partial document.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(kv))?)
            .with_context(|| format!("writing rate store {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing rate store {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), authors = rates.len(), "rates saved");
        Ok(())
    }
}

/// In-process store, used by tests and when no file path is configured.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    inner: Mutex<RateTable>,
}

impl MemoryRateStore {
    pub fn new(initial: RateTable) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }
}

impl RateStore for MemoryRateStore {
    fn load_rates(&self) -> Result<RateTable> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("rate store mutex poisoned"))?;
        Ok(guard.clone())
    }

    fn save_rates(&self, rates: &RateTable) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("rate store mutex poisoned"))?;
        *guard = rates.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_author_has_zero_rate() {
        let t = RateTable::new();
        assert_eq!(t.get("nobody"), 0.0);
    }

    #[test]
    fn set_sanitizes_bad_values() {
        let mut t = RateTable::new();
        t.set("neg", -4.0);
        t.set("nan", f64::NAN);
        t.set("inf", f64::INFINITY);
        t.set("ok", 2.5);
        assert_eq!(t.get("neg"), 0.0);
        assert_eq!(t.get("nan"), 0.0);
        assert_eq!(t.get("inf"), 0.0);
        assert_eq!(t.get("ok"), 2.5);
    }

    #[test]
    fn parse_rate_input_reads_leading_number() {
        assert_eq!(parse_rate_input("12.5"), 12.5);
        assert_eq!(parse_rate_input("  7abc"), 7.0);
        assert_eq!(parse_rate_input(".5"), 0.5);
        assert_eq!(parse_rate_input("1e2"), 100.0);
        assert_eq!(parse_rate_input("abc"), 0.0);
        assert_eq!(parse_rate_input(""), 0.0);
        assert_eq!(parse_rate_input("-3"), 0.0);
    }

    #[test]
    fn file_store_round_trip_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        fs::write(&path, r#"{"theme":"dark"}"#).unwrap();

        let store = FileRateStore::new(&path);
        let rates: RateTable = [("A", 10.0), ("B", 5.0)].into_iter().collect();
        store.save_rates(&rates).unwrap();

        assert_eq!(store.load_rates().unwrap(), rates);
        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw[RATES_KEY]["A"], 10.0);
    }

    #[test]
    fn corrupt_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        let truncated = r#"{"theme":"dark","payoutRates":{"A":10,"B":5}"#;
        fs::write(&path, truncated).unwrap();

        let store = FileRateStore::new(&path);
        assert!(store.load_rates().is_err());
        let rates: RateTable = [("C", 1.0)].into_iter().collect();
        assert!(store.save_rates(&rates).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), truncated);

        fs::write(&path, "[1,2]").unwrap();
        assert!(store.save_rates(&rates).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1,2]");
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRateStore::new(dir.path().join("nope.json"));
        assert!(store.load_rates().unwrap().is_empty());
    }

    #[test]
    fn file_store_coerces_loose_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        fs::write(
            &path,
            r#"{"payoutRates":{"A":"12","B":null,"C":-1,"D":3.5}}"#,
        )
        .unwrap();
        let t = FileRateStore::new(&path).load_rates().unwrap();
        assert_eq!(t.get("A"), 12.0);
        assert_eq!(t.get("B"), 0.0);
        assert_eq!(t.get("C"), 0.0);
        assert_eq!(t.get("D"), 3.5);
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryRateStore::default();
        let mut r = RateTable::new();
        r.set("Ada", 1.25);
        store.save_rates(&r).unwrap();
        assert_eq!(store.load_rates().unwrap(), r);
    }
}
