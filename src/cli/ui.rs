use crate::history::Snapshot;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    TotalLabel,
    TotalValue,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::TotalLabel => style(text).bold(),
        StyleType::TotalValue => style(text).green().bold(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn value_cell(value: f64) -> Cell {
    Cell::new(format!("{value:.2}")).set_alignment(CellAlignment::Right)
}

/// Renders a snapshot as a table followed by per-reference totals.
pub fn display_snapshot(snapshot: &Snapshot) -> String {
    let mut output = format!(
        "Snapshot: {}\n\n",
        style_text(&snapshot.date, StyleType::Title)
    );

    if snapshot.data.is_empty() {
        output.push_str(&style_text("No converted values", StyleType::Subtle));
        return output;
    }

    let mut table = new_styled_table();
    table.set_header(vec![
        header_cell("Asset"),
        header_cell("Reference"),
        header_cell("Value"),
    ]);

    // References in first-seen order.
    let mut totals: Vec<(&str, f64)> = Vec::new();
    for item in &snapshot.data {
        table.add_row(vec![
            Cell::new(&item.asset),
            Cell::new(&item.reference),
            value_cell(item.value),
        ]);
        match totals.iter_mut().find(|(r, _)| *r == item.reference) {
            Some((_, total)) => *total += item.value,
            None => totals.push((item.reference.as_str(), item.value)),
        }
    }
    output.push_str(&table.to_string());

    for (reference, total) in totals {
        output.push_str(&format!(
            "\nTotal ({}): {}",
            style_text(reference, StyleType::TotalLabel),
            style_text(&format!("{total:.2}"), StyleType::TotalValue)
        ));
    }
    output
}
