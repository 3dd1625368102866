use anyhow::{Result, anyhow};
use printpdf::{BuiltinFont, Mm, PdfDocument};

use crate::{
    cart::SaleUnit,
    models::{SaleEntity, SaleItemEntity},
};

const PAGE_WIDTH_MM: f32 = 80.0;
const MARGIN_MM: f32 = 5.0;
const LINE_HEIGHT_MM: f32 = 5.0;
const FONT_SIZE: f32 = 9.0;

/// Text lines of a receipt, top to bottom.
pub fn receipt_lines(pharmacy_name: &str, sale: &SaleEntity, items: &[SaleItemEntity]) -> Vec<String> {
    let mut lines = vec![
        pharmacy_name.to_string(),
        format!("Branch: {}", sale.branch_name),
        format!("Receipt: {}", sale.id),
        format!("Date: {}", sale.created_at.format("%Y-%m-%d %H:%M UTC")),
    ];

    match (sale.temperature_c, &sale.weather_condition) {
        (Some(temp), Some(condition)) => lines.push(format!("Weather: {condition}, {temp:.1} C")),
        (Some(temp), None) => lines.push(format!("Weather: {temp:.1} C")),
        _ => {}
    }

    lines.push(String::new());

    for item in items {
        let unit = item.unit.parse::<SaleUnit>().unwrap_or_default();
        lines.push(item.medicine_name.clone());
        lines.push(format!(
            "  {} x ${:.2}  ${:.2}",
            unit.label(item.quantity),
            item.unit_price,
            item.line_total
        ));
    }

    lines.push(String::new());
    lines.push(format!("Total: ${:.2}", sale.total));
    lines
}

/// Renders the receipt as a single-page PDF sized to its content.
pub fn render_pdf(pharmacy_name: &str, sale: &SaleEntity, items: &[SaleItemEntity]) -> Result<Vec<u8>> {
    let lines = receipt_lines(pharmacy_name, sale, items);
    let page_height = MARGIN_MM * 2.0 + LINE_HEIGHT_MM * lines.len() as f32;

    let (doc, page, layer) = PdfDocument::new(
        format!("Receipt {}", sale.id),
        Mm(PAGE_WIDTH_MM),
        Mm(page_height),
        "Receipt".to_string(),
    );

    let font = doc
        .add_builtin_font(BuiltinFont::Courier)
        .map_err(|e| anyhow!("Failed to load receipt font: {e:?}"))?;
    let canvas = doc.get_page(page).get_layer(layer);

    for (i, line) in lines.iter().enumerate() {
        let y = page_height - MARGIN_MM - LINE_HEIGHT_MM * (i as f32 + 1.0);
        canvas.use_text(line.as_str(), FONT_SIZE, Mm(MARGIN_MM), Mm(y), &font);
    }

    doc.save_to_bytes()
        .map_err(|e| anyhow!("Failed to render receipt: {e:?}"))
}
