//! Chart-ready views of an area table: the stacked area-over-time chart and
//! the latest-year pie. Rows without a class label are left out of both.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::legend::Legend;
use crate::table::{round2, AreaTable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub ano: i32,
    #[serde(rename = "Area_ha")]
    pub area_ha: f64,
}

/// One stacked layer: a class label and its area per year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaSeries {
    pub nome_classe: String,
    pub color: Option<String>,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieSlice {
    pub nome_classe: String,
    #[serde(rename = "Area_ha")]
    pub area_ha: f64,
    /// Share of the year's labelled area, 0–100.
    pub percent: f64,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieChart {
    pub ano: i32,
    pub slices: Vec<PieSlice>,
}

/// Area summed per (year, label).
fn totals_by_label(table: &AreaTable) -> BTreeMap<(i32, &str), f64> {
    let mut totals = BTreeMap::new();
    for rec in table.records() {
        let Some(label) = rec.nome_classe.as_deref() else {
            continue;
        };
        *totals.entry((rec.ano, label)).or_insert(0.0) += rec.area_ha;
    }
    totals
}

/// Series per label, labels in alphabetical order, points by year.
pub fn stacked_area(table: &AreaTable, legend: &Legend) -> Vec<AreaSeries> {
    let mut series: BTreeMap<&str, Vec<SeriesPoint>> = BTreeMap::new();
    for ((ano, label), area) in totals_by_label(table) {
        series
            .entry(label)
            .or_default()
            .push(SeriesPoint { ano, area_ha: round2(area) });
    }
    series
        .into_iter()
        .map(|(label, mut points)| {
            points.sort_by_key(|p| p.ano);
            AreaSeries {
                nome_classe: label.to_string(),
                color: legend.color_for_label(label).map(str::to_string),
                points,
            }
        })
        .collect()
}

/// Pie of the most recent year with labelled rows.
pub fn latest_year_pie(table: &AreaTable, legend: &Legend) -> Option<PieChart> {
    let totals = totals_by_label(table);
    let ano = totals.keys().map(|(year, _)| *year).max()?;
    let year_totals: Vec<(&str, f64)> = totals
        .iter()
        .filter(|((year, _), _)| *year == ano)
        .map(|((_, label), area)| (*label, *area))
        .collect();
    let sum: f64 = year_totals.iter().map(|(_, a)| a).sum();

    let slices = year_totals
        .into_iter()
        .map(|(label, area)| PieSlice {
            nome_classe: label.to_string(),
            area_ha: round2(area),
            percent: if sum > 0.0 { round2(area / sum * 100.0) } else { 0.0 },
            color: legend.color_for_label(label).map(str::to_string),
        })
        .collect();
    Some(PieChart { ano, slices })
}
