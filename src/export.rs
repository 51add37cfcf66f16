//! Payout report writers: CSV and a PDF table.
//!
//! Both are fed by `AggregationResult` (rows and total), so exported figures
//! always equal what the dashboard shows.

use std::fmt::Write as _;

use anyhow::{anyhow, Result};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};

use crate::aggregate::{AggregationResult, PayoutRow};

pub const HEADER: [&str; 4] = ["Author", "Articles", "Rate", "Total"];
pub const CSV_FILENAME: &str = "payouts.csv";
pub const PDF_FILENAME: &str = "payouts.pdf";

/// Money/rate formatting shared by every surface: at most two decimals, no
/// trailing zeros (`20`, `12.5`, `0.33`).
pub fn format_amount(v: f64) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    // -0.0 would print as "-0"
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{rounded}")
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn to_csv(rows: &[PayoutRow]) -> String {
    let mut out = String::new();
    out.push_str(&HEADER.join(","));
    out.push_str("\r\n");
    for r in rows {
        let _ = write!(
            out,
            "{},{},{},{}\r\n",
            csv_field(&r.author),
            r.articles,
            format_amount(r.rate),
            format_amount(r.total)
        );
    }
    out
}

// --- PDF ---------------------------------------------------------------

const PAGE_W_MM: f32 = 210.0; // A4
const PAGE_H_MM: f32 = 297.0;
const MARGIN_MM: f32 = 18.0;
const ROW_MM: f32 = 6.5;
const HEADER_Y_MM: f32 = PAGE_H_MM - 38.0;
const COL_X_MM: [f32; 4] = [MARGIN_MM, 115.0, 145.0, 172.0];
const AUTHOR_MAX_CHARS: usize = 48;
pub const ROWS_PER_PAGE: usize = 34;

/// One laid-out report page. Only the last page carries the total line.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPage {
    pub number: usize,
    pub of: usize,
    pub rows: Vec<[String; 4]>,
    pub total: Option<[String; 4]>,
}

/// The built-in Helvetica covers WinAnsi only; anything else prints as `?`.
fn pdf_safe(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ' '..='~' | '\u{A0}'..='\u{FF}' => c,
            _ => '?',
        })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut t: String = s.chars().take(max.saturating_sub(3)).collect();
    t.push_str("...");
    t
}

fn row_cells(r: &PayoutRow) -> [String; 4] {
    [
        pdf_safe(&truncate_chars(&r.author, AUTHOR_MAX_CHARS)),
        r.articles.to_string(),
        format_amount(r.rate),
        format_amount(r.total),
    ]
}

/// Split the payout table into pages. The total line uses the engine's
/// `total_payout`, never a sum over the printed rows.
pub fn report_pages(result: &AggregationResult) -> Vec<ReportPage> {
    let cells: Vec<[String; 4]> = result.payout_rows().iter().map(row_cells).collect();
    let mut chunks: Vec<Vec<[String; 4]>> =
        cells.chunks(ROWS_PER_PAGE).map(<[_]>::to_vec).collect();
    if chunks.is_empty() {
        chunks.push(Vec::new());
    }
    let of = chunks.len();
    let total = [
        "Total".to_string(),
        (result.total_articles - result.unattributed).to_string(),
        String::new(),
        format_amount(result.total_payout),
    ];

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, rows)| ReportPage {
            number: i + 1,
            of,
            rows,
            total: (i + 1 == of).then(|| total.clone()),
        })
        .collect()
}

fn draw_page(
    layer: &PdfLayerReference,
    page: &ReportPage,
    title: &str,
    regular: &IndirectFontRef,
    bold: &IndirectFontRef,
) {
    layer.use_text(pdf_safe(title), 16.0, Mm(MARGIN_MM), Mm(PAGE_H_MM - 22.0), bold);

    let mut y = HEADER_Y_MM;
    for (x, h) in COL_X_MM.iter().zip(HEADER) {
        layer.use_text(h, 10.0, Mm(*x), Mm(y), bold);
    }
    y -= ROW_MM;

    for row in &page.rows {
        for (x, cell) in COL_X_MM.iter().zip(row) {
            layer.use_text(cell.as_str(), 10.0, Mm(*x), Mm(y), regular);
        }
        y -= ROW_MM;
    }

    if let Some(total) = &page.total {
        for (x, cell) in COL_X_MM.iter().zip(total) {
            layer.use_text(cell.as_str(), 10.0, Mm(*x), Mm(y), bold);
        }
    }

    let footer = format!("Page {} of {}", page.number, page.of);
    layer.use_text(footer, 8.0, Mm(PAGE_W_MM - MARGIN_MM - 22.0), Mm(10.0), regular);
}

/// Render the payout table as a PDF document (A4, built-in Helvetica).
pub fn to_pdf(result: &AggregationResult, title: &str) -> Result<Vec<u8>> {
    let pages = report_pages(result);
    let (doc, first_page, first_layer) =
        PdfDocument::new(pdf_safe(title), Mm(PAGE_W_MM), Mm(PAGE_H_MM), "table".to_string());
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("loading Helvetica: {e:?}"))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| anyhow!("loading Helvetica-Bold: {e:?}"))?;

    for (i, page) in pages.iter().enumerate() {
        let layer = if i == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (p, l) = doc.add_page(Mm(PAGE_W_MM), Mm(PAGE_H_MM), "table");
            doc.get_page(p).get_layer(l)
        };
        draw_page(&layer, page, title, &regular, &bold);
    }

    doc.save_to_bytes()
        .map_err(|e| anyhow!("writing payout pdf: {e:?}"))
}
