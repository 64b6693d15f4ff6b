//! Field resolution order
//!
//! Schema order, except that a computed field's prerequisites (when they are
//! schema fields themselves) are moved ahead of it. Prerequisites outside the
//! schema, such as the intake date, are read from the record as supplied.

use super::FieldStrategies;
use crate::error::{MapperError, MapperResult};
use crate::schema::FieldSchema;
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

pub(crate) fn resolution_order(
    schema: &FieldSchema,
    table: &BTreeMap<String, FieldStrategies>,
) -> MapperResult<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut order = Vec::with_capacity(schema.len());

    for name in schema.names() {
        visit(name, schema, table, &mut marks, &mut Vec::new(), &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    field: &'a str,
    schema: &'a FieldSchema,
    table: &'a BTreeMap<String, FieldStrategies>,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> MapperResult<()> {
    match marks.get(field) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            path.push(field);
            return Err(MapperError::ConfigurationLoad(format!(
                "Computed field dependency cycle: {}",
                path.join(" -> ")
            )));
        }
        None => {}
    }

    marks.insert(field, Mark::Visiting);
    path.push(field);
    if let Some(rule) = table.get(field).and_then(|s| s.computed.as_ref()) {
        for prerequisite in rule.prerequisites() {
            if schema.contains(prerequisite) {
                visit(prerequisite, schema, table, marks, path, order)?;
            }
        }
    }
    path.pop();
    marks.insert(field, Mark::Done);
    order.push(field.to_string());
    Ok(())
}
