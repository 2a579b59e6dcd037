//! Indicator catalog listing

use anyhow::Result;
use forecast_lib::indicators;
use tabled::Tabled;

use crate::output::{print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct IndicatorRow {
    #[tabled(rename = "Name")]
    name: &'static str,
    #[tabled(rename = "Table")]
    table: &'static str,
    #[tabled(rename = "Columns")]
    targets: String,
    #[tabled(rename = "Per cohort")]
    per_cohort: &'static str,
    #[tabled(rename = "Description")]
    description: &'static str,
}

/// List every indicator the engine can forecast
pub fn list_indicators(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(indicators::all()),
        OutputFormat::Table => {
            let rows: Vec<IndicatorRow> = indicators::all()
                .iter()
                .map(|i| IndicatorRow {
                    name: i.name,
                    table: i.table,
                    targets: i.targets.join(", "),
                    per_cohort: if i.cohort_key.is_some() { "yes" } else { "no" },
                    description: i.description,
                })
                .collect();
            print_table(&rows);
            Ok(())
        }
    }
}
