// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Record dumps.
use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use weft_store::{FieldValue, Record, RecordSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// One row per record field.
    Table,
    /// Records as a JSON array.
    Json,
}

pub fn write_records(out: &mut impl Write, source: &RecordSource, format: Format) -> Result<()> {
    match format {
        Format::Json => {
            let records: Vec<&Record> = source.records().collect();
            serde_json::to_writer_pretty(&mut *out, &records)?;
            writeln!(out)?;
        }
        Format::Table => writeln!(out, "{}", records_table(source))?,
    }
    Ok(())
}

fn records_table(source: &RecordSource) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["id", "type", "field", "value"]);
    for record in source.records() {
        let id = record.id().to_string();
        if record.field_count() == 0 {
            table.add_row(vec![id, record.type_name().to_owned(), String::new(), String::new()]);
            continue;
        }
        for (key, value) in record.fields() {
            table.add_row(vec![
                id.clone(),
                record.type_name().to_owned(),
                key.clone(),
                describe(value),
            ]);
        }
    }
    table
}

fn describe(value: &FieldValue) -> String {
    match value {
        FieldValue::Scalar(value) => value.to_string(),
        FieldValue::Linked(id) => format!("-> {id}"),
        FieldValue::LinkedList(ids) => {
            let items: Vec<String> = ids
                .iter()
                .map(|id| id.as_ref().map_or_else(|| "null".to_owned(), ToString::to_string))
                .collect();
            format!("-> [{}]", items.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_store::DataId;

    #[test]
    fn linked_lists_keep_null_slots() {
        let value = FieldValue::LinkedList(vec![Some(DataId::new("a")), None]);
        assert_eq!(describe(&value), "-> [a, null]");
        assert_eq!(describe(&FieldValue::NULL), "null");
    }
}
