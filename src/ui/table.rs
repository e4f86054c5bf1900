use crate::workspace::Workspace;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: impl ToString) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &[(&str, String)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

/// One line of the resolution order
#[derive(Tabled)]
pub struct LayerRow {
    #[tabled(rename = "#")]
    pub position: usize,
    #[tabled(rename = "Layer")]
    pub name: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Units")]
    pub units: usize,
    #[tabled(rename = "Resources")]
    pub resources: usize,
}

/// Render the workspace's layers in resolution order
pub fn layers_table(workspace: &Workspace) -> String {
    let rows: Vec<LayerRow> = workspace
        .layers()
        .enumerate()
        .map(|(position, layer)| LayerRow {
            position,
            name: layer.name().to_string(),
            kind: layer.kind().to_string(),
            units: layer.unit_count(),
            resources: layer.resource_count(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
