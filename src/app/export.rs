//! The four-table export: global totals, per-category, per-tier and
//! per-physician detail. Each table is one CSV file; the bundle can also be
//! packed into a single zip archive and read back.

use crate::domain::model::{
    CategoryTotals, DistributionResult, DistributionTotals, PhysicianDistribution, Standing, Tier,
    TierSummary,
};
use crate::utils::error::{Result, SplitError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Write};
use zip::write::{SimpleFileOptions, ZipWriter};

pub const TOTALS_FILE: &str = "totals.csv";
pub const CATEGORIES_FILE: &str = "categories.csv";
pub const TIERS_FILE: &str = "tiers.csv";
pub const PHYSICIANS_FILE: &str = "physicians.csv";
pub const JSON_FILE: &str = "distribution.json";
pub const ZIP_FILE: &str = "distribution.zip";

const METRIC_GROSS: &str = "gross";
const METRIC_ENTITY_A: &str = "entity_a";
const METRIC_POOL: &str = "entity_b_pool";
const METRIC_PAYOUT: &str = "total_payout";
const METRIC_RETAINED: &str = "retained_in_pool";
const METRIC_BALANCE: &str = "pool_balance_after";
const METRIC_OVERDRAWN: &str = "pool_overdrawn";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalsRow {
    pub metric: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicianRow {
    pub physician: String,
    pub tier: Tier,
    pub gross: f64,
    pub entity_a: f64,
    pub pool_share: f64,
    pub tier_average: f64,
    pub standing: Standing,
    pub percentage: f64,
    pub payout: f64,
    pub retained_in_pool: f64,
    pub performance_delta: f64,
    pub projected_if_above: f64,
    /// `;`-separated
    pub idle_categories: String,
}

impl From<&PhysicianDistribution> for PhysicianRow {
    fn from(p: &PhysicianDistribution) -> Self {
        Self {
            physician: p.name.clone(),
            tier: p.tier.clone(),
            gross: p.gross,
            entity_a: p.entity_a,
            pool_share: p.pool_share,
            tier_average: p.tier_average,
            standing: p.standing,
            percentage: p.percentage,
            payout: p.payout,
            retained_in_pool: p.retained_in_pool,
            performance_delta: p.performance_delta,
            projected_if_above: p.projected_if_above,
            idle_categories: p.idle_categories.join(";"),
        }
    }
}

/// JSON companion file: the full result plus run metadata.
#[derive(Debug, Serialize)]
pub struct ExportManifest<'a> {
    pub run: &'a str,
    pub entity_a: &'a str,
    pub entity_b: &'a str,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub result: &'a DistributionResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportTables {
    pub totals: Vec<TotalsRow>,
    pub categories: Vec<CategoryTotals>,
    pub tiers: Vec<TierSummary>,
    pub physicians: Vec<PhysicianRow>,
}

fn write_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.into_inner()
        .map_err(|e| SplitError::IoError(e.into_error()))
}

fn read_csv<T: DeserializeOwned>(data: &[u8]) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_reader(data);
    rdr.deserialize::<T>()
        .map(|row| row.map_err(SplitError::from))
        .collect()
}

fn close_enough(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

impl ExportTables {
    pub fn from_result(result: &DistributionResult) -> Self {
        let t = &result.totals;
        let totals = [
            (METRIC_GROSS, t.gross),
            (METRIC_ENTITY_A, t.entity_a),
            (METRIC_POOL, t.entity_b_pool),
            (METRIC_PAYOUT, t.total_payout),
            (METRIC_RETAINED, t.retained_in_pool),
            (METRIC_BALANCE, t.pool_balance_after),
            (METRIC_OVERDRAWN, if t.pool_overdrawn { 1.0 } else { 0.0 }),
        ]
        .into_iter()
        .map(|(metric, value)| TotalsRow {
            metric: metric.to_string(),
            value,
        })
        .collect();

        Self {
            totals,
            categories: result.categories.clone(),
            tiers: result.tiers.clone(),
            physicians: result.physicians.iter().map(PhysicianRow::from).collect(),
        }
    }

    fn metric(&self, name: &str) -> Result<f64> {
        self.totals
            .iter()
            .find(|row| row.metric == name)
            .map(|row| row.value)
            .ok_or_else(|| SplitError::ExportError {
                message: format!("totals table has no '{}' row", name),
            })
    }

    /// Rebuilds the aggregate totals from the totals table.
    pub fn totals(&self) -> Result<DistributionTotals> {
        Ok(DistributionTotals {
            gross: self.metric(METRIC_GROSS)?,
            entity_a: self.metric(METRIC_ENTITY_A)?,
            entity_b_pool: self.metric(METRIC_POOL)?,
            total_payout: self.metric(METRIC_PAYOUT)?,
            retained_in_pool: self.metric(METRIC_RETAINED)?,
            pool_balance_after: self.metric(METRIC_BALANCE)?,
            pool_overdrawn: self.metric(METRIC_OVERDRAWN)? != 0.0,
        })
    }

    /// Checks that the detail tables add up to the totals table.
    pub fn reconcile(&self) -> Result<()> {
        let totals = self.totals()?;
        let checks = [
            (
                "categories.total vs gross",
                self.categories.iter().map(|c| c.total).sum::<f64>(),
                totals.gross,
            ),
            (
                "categories.entity_a vs entity_a",
                self.categories.iter().map(|c| c.entity_a).sum(),
                totals.entity_a,
            ),
            (
                "categories.entity_b vs entity_b_pool",
                self.categories.iter().map(|c| c.entity_b).sum(),
                totals.entity_b_pool,
            ),
            (
                "physicians.gross vs gross",
                self.physicians.iter().map(|p| p.gross).sum(),
                totals.gross,
            ),
            (
                "physicians.payout vs total_payout",
                self.physicians.iter().map(|p| p.payout).sum(),
                totals.total_payout,
            ),
            (
                "tiers.total_payout vs total_payout",
                self.tiers.iter().map(|t| t.total_payout).sum(),
                totals.total_payout,
            ),
        ];

        for (label, detail, total) in checks {
            if !close_enough(detail, total) {
                return Err(SplitError::ExportError {
                    message: format!("{} mismatch: {} != {}", label, detail, total),
                });
            }
        }
        Ok(())
    }

    pub fn to_csv_files(&self) -> Result<Vec<(&'static str, Vec<u8>)>> {
        Ok(vec![
            (TOTALS_FILE, write_csv(&self.totals)?),
            (CATEGORIES_FILE, write_csv(&self.categories)?),
            (TIERS_FILE, write_csv(&self.tiers)?),
            (PHYSICIANS_FILE, write_csv(&self.physicians)?),
        ])
    }

    pub fn from_csv_files(
        totals: &[u8],
        categories: &[u8],
        tiers: &[u8],
        physicians: &[u8],
    ) -> Result<Self> {
        Ok(Self {
            totals: read_csv(totals)?,
            categories: read_csv(categories)?,
            tiers: read_csv(tiers)?,
            physicians: read_csv(physicians)?,
        })
    }

    /// Packs the four tables (and the JSON manifest, if given) into a zip.
    pub fn to_zip(&self, manifest_json: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        for (name, data) in self.to_csv_files()? {
            zip.start_file(name, options)?;
            zip.write_all(&data)?;
        }
        if let Some(json) = manifest_json {
            zip.start_file(JSON_FILE, options)?;
            zip.write_all(json)?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }

    pub fn from_zip(data: &[u8]) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
        let mut read = |name: &str| -> Result<Vec<u8>> {
            let mut file = archive.by_name(name)?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(buf)
        };

        let totals = read(TOTALS_FILE)?;
        let categories = read(CATEGORIES_FILE)?;
        let tiers = read(TIERS_FILE)?;
        let physicians = read(PHYSICIANS_FILE)?;
        Self::from_csv_files(&totals, &categories, &tiers, &physicians)
    }
}
