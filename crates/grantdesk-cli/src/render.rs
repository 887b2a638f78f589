use std::fmt::Write;

use grantdesk_core::{ApplicationPicker, PermissionTable, Projection};

// Presentation units per terminal column.
const UNITS_PER_CHAR: u32 = 8;

pub(crate) fn format_picker(picker: &ApplicationPicker) -> String {
    let mut out = String::new();
    if !picker.enabled {
        for entry in &picker.entries {
            let _ = writeln!(out, "  {entry}");
        }
        return out;
    }
    for (index, entry) in picker.entries.iter().enumerate() {
        let marker = if picker.selected == Some(index) { '*' } else { ' ' };
        let _ = writeln!(out, "{marker} [{index}] {entry}");
    }
    out
}

pub(crate) fn format_table(table: &Projection<PermissionTable>) -> String {
    let mut out = String::new();
    match table {
        Projection::Placeholder(text) => {
            let _ = writeln!(out, "{text}");
        }
        Projection::Error { message, detail } => {
            let _ = writeln!(out, "{message}");
            let _ = writeln!(out, "  {detail}");
        }
        Projection::Rows(table) => {
            let longest = table
                .rows
                .iter()
                .map(|row| row.service.chars().count())
                .max()
                .unwrap_or(0) as u32;
            let width =
                (table.service_column.clamp(longest * UNITS_PER_CHAR) / UNITS_PER_CHAR) as usize;
            let _ = writeln!(out, "ROW  {:<width$}  PERMISSIONS", "SERVICE");
            for row in &table.rows {
                let service: String = row.service.chars().take(width).collect();
                let _ = writeln!(out, "{:<3}  {service:<width$}  {}", row.row, row.summary);
            }
        }
    }
    out
}
