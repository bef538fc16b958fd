use anyhow::bail;
use indexmap::IndexSet;
use nalgebra::DMatrix;

pub type KeyString = smartstring::alias::String;

/// Ordered identifiers along one axis of a sector×region matrix. Positions are stable for the
/// lifetime of a run, so matrices are indexed by position and identifiers are only looked up at
/// the edges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Labels(IndexSet<KeyString>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an identifier if not already present, returning its position.
    pub fn insert(&mut self, id: &str) -> usize {
        self.0.insert_full(id.into()).0
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.0.get_index_of(id)
    }

    pub fn label(&self, position: usize) -> &str {
        self.0[position].as_str()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|id| id.as_str())
    }
}

impl<'a> FromIterator<&'a str> for Labels {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        let mut labels = Labels::new();
        for id in iter {
            labels.insert(id);
        }
        labels
    }
}

/// Employee counts per sector (rows) and region (columns). Only ever read: it is the spatial
/// prior for allocation.
#[derive(Clone, Debug)]
pub struct EmploymentMatrix {
    sectors: Labels,
    regions: Labels,
    counts: DMatrix<f64>,
}

impl EmploymentMatrix {
    pub fn new(sectors: Labels, regions: Labels, counts: DMatrix<f64>) -> anyhow::Result<Self> {
        if counts.nrows() != sectors.len() || counts.ncols() != regions.len() {
            bail!(
                "Employment matrix has shape {}x{} but {} sectors and {} regions were labelled",
                counts.nrows(),
                counts.ncols(),
                sectors.len(),
                regions.len()
            );
        }
        if let Some(bad) = counts.iter().find(|count| !count.is_finite() || **count < 0.) {
            bail!("Employment counts must be finite and non-negative, found {bad}");
        }

        Ok(Self {
            sectors,
            regions,
            counts,
        })
    }

    pub fn from_rows(sectors: Labels, regions: Labels, rows: &[Vec<u64>]) -> anyhow::Result<Self> {
        if rows.iter().any(|row| row.len() != regions.len()) {
            bail!("Every employment row must have one count per region");
        }
        let counts = DMatrix::from_fn(rows.len(), regions.len(), |s, r| rows[s][r] as f64);

        Self::new(sectors, regions, counts)
    }

    pub fn sectors(&self) -> &Labels {
        &self.sectors
    }

    pub fn regions(&self) -> &Labels {
        &self.regions
    }

    pub fn count(&self, sector: usize, region: usize) -> f64 {
        self.counts[(sector, region)]
    }

    pub fn sector_row(&self, sector: usize) -> Vec<f64> {
        self.counts.row(sector).iter().copied().collect()
    }

    pub fn sector_total(&self, sector: usize) -> f64 {
        self.counts.row(sector).sum()
    }
}

/// Working and output matrix of energy consumption, rows indexed by position in a sector list
/// owned by whoever created it and columns by region position.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsumptionMatrix {
    values: DMatrix<f64>,
}

impl ConsumptionMatrix {
    pub fn zeros(sectors: usize, regions: usize) -> Self {
        Self {
            values: DMatrix::zeros(sectors, regions),
        }
    }

    pub fn n_sectors(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_regions(&self) -> usize {
        self.values.ncols()
    }

    pub fn get(&self, sector: usize, region: usize) -> f64 {
        self.values[(sector, region)]
    }

    pub fn set_row(&mut self, sector: usize, row: &[f64]) {
        for (region, value) in row.iter().enumerate() {
            self.values[(sector, region)] = *value;
        }
    }

    pub fn row(&self, sector: usize) -> Vec<f64> {
        self.values.row(sector).iter().copied().collect()
    }

    pub fn row_sum(&self, sector: usize) -> f64 {
        self.values.row(sector).sum()
    }

    pub fn column_sum(&self, region: usize) -> f64 {
        self.values.column(region).sum()
    }

    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.n_sectors()).map(|s| self.row_sum(s)).collect()
    }

    pub fn column_sums(&self) -> Vec<f64> {
        (0..self.n_regions()).map(|r| self.column_sum(r)).collect()
    }

    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    pub fn scale_row(&mut self, sector: usize, factor: f64) {
        for region in 0..self.n_regions() {
            self.values[(sector, region)] *= factor;
        }
    }

    pub fn scale_column(&mut self, region: usize, factor: f64) {
        for sector in 0..self.n_sectors() {
            self.values[(sector, region)] *= factor;
        }
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|value| value.is_finite())
    }
}
