use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Area occupied by one class in one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRecord {
    pub ano: i32,
    pub classe: u16,
    pub nome_classe: Option<String>,
    #[serde(rename = "Area_ha")]
    pub area_ha: f64,
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Area records across years; at most one row per (year, class).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaTable {
    records: Vec<AreaRecord>,
}

impl AreaTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records, folding any (year, class) already present into the
    /// existing row.
    pub fn extend(&mut self, records: impl IntoIterator<Item = AreaRecord>) {
        for rec in records {
            match self
                .records
                .iter_mut()
                .find(|r| r.ano == rec.ano && r.classe == rec.classe)
            {
                Some(existing) => existing.area_ha = round2(existing.area_ha + rec.area_ha),
                None => self.records.push(AreaRecord { area_ha: round2(rec.area_ha), ..rec }),
            }
        }
    }

    pub fn records(&self) -> &[AreaRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct years, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.ano).collect();
        years.sort_unstable();
        years.dedup();
        years
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.records.iter().map(|r| r.ano).max()
    }

    pub fn for_year(&self, year: i32) -> impl Iterator<Item = &AreaRecord> {
        self.records.iter().filter(move |r| r.ano == year)
    }

    /// Write as CSV with header `ano,classe,nome_classe,Area_ha`.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        for rec in &self.records {
            csv.serialize(rec).map_err(csv_error)?;
        }
        csv.flush()?;
        Ok(())
    }
}

impl FromIterator<AreaRecord> for AreaTable {
    fn from_iter<I: IntoIterator<Item = AreaRecord>>(iter: I) -> Self {
        let mut table = AreaTable::new();
        table.extend(iter);
        table
    }
}

fn csv_error(e: csv::Error) -> Error {
    Error::remote(format!("CSV: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(ano: i32, classe: u16, area_ha: f64) -> AreaRecord {
        AreaRecord { ano, classe, nome_classe: None, area_ha }
    }

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(0.18), 0.18);
        assert_eq!(round2(12.344), 12.34);
    }

    #[test]
    fn duplicate_year_class_rows_are_merged() {
        let table: AreaTable = [rec(2000, 3, 1.0), rec(2000, 7, 2.0), rec(2000, 3, 0.5), rec(2001, 3, 4.0)]
            .into_iter()
            .collect();
        assert_eq!(table.len(), 3);
        assert_eq!(table.records()[0].area_ha, 1.5);
        assert_eq!(table.years(), [2000, 2001]);
        assert_eq!(table.latest_year(), Some(2001));
        assert_eq!(table.for_year(2000).count(), 2);
    }

    #[test]
    fn serialises_with_dashboard_column_names() {
        let table: AreaTable = [AreaRecord {
            ano: 2022,
            classe: 3,
            nome_classe: Some("Formação Florestal".into()),
            area_ha: 0.18,
        }]
        .into_iter()
        .collect();
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json[0]["ano"], 2022);
        assert_eq!(json[0]["Area_ha"], 0.18);

        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "ano,classe,nome_classe,Area_ha\n2022,3,Formação Florestal,0.18\n");
    }

    #[test]
    fn missing_label_writes_an_empty_csv_field() {
        let table: AreaTable = [rec(1990, 99, 2.5)].into_iter().collect();
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().ends_with("1990,99,,2.5\n"));
    }
}
