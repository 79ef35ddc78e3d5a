use tabled::{builder::Builder, settings::Style, Table, Tabled};

use crate::row::Row;

#[derive(Tabled)]
pub struct StatRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Two-column metric/value table
pub fn stats_table(stats: &[(&str, String)]) -> String {
    if stats.is_empty() {
        return String::new();
    }
    let rows: Vec<StatRow> = stats
        .iter()
        .map(|(metric, value)| StatRow {
            metric: metric.to_string(),
            value: value.clone(),
        })
        .collect();
    Table::new(&rows).with(Style::rounded()).to_string()
}

/// Result rows as a table, columns taken from the first row
pub fn rows_table(rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };

    let mut builder = Builder::default();
    builder.push_record(first.columns().map(str::to_string));
    for row in rows {
        builder.push_record(row.values().map(|v| v.to_string()));
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}
