#![cfg(feature = "web")]
use crate::table::Table;
use log::warn;
use plotters::prelude::*;
use std::collections::HashMap;

/// Column names recognised as a status column, in priority order.
pub const STATUS_COLUMNS: [&str; 3] = ["Statut", "Status", "state"];

/// Configuration options for the status chart
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the graph
    pub title: String,

    /// Label for the Y-axis
    pub y_label: String,

    /// Width of the graph in pixels
    pub width: u32,

    /// Height of the graph in pixels
    pub height: u32,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            title: "Répartition par statut".to_string(),
            y_label: "Nombre".to_string(),
            width: 720,
            height: 420,
        }
    }
}

/// First column whose name is one of [`STATUS_COLUMNS`].
pub fn status_column(table: &Table) -> Option<&str> {
    STATUS_COLUMNS
        .iter()
        .copied()
        .find(|name| table.column(name).is_some())
}

/// Frequency of each value in a column, missing cells skipped.
///
/// Sorted by count, most frequent first; ties keep first-appearance order.
pub fn value_counts(table: &Table, column: &str) -> Vec<(String, u32)> {
    let Some(column) = table.column(column) else {
        return Vec::new();
    };

    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, u32> = HashMap::new();
    for value in column.values.iter().filter(|v| !v.is_missing()) {
        let label = value.to_string();
        let count = counts.entry(label.clone()).or_insert(0);
        if *count == 0 {
            order.push(label);
        }
        *count += 1;
    }

    let mut result: Vec<(String, u32)> = order
        .into_iter()
        .map(|label| {
            let count = counts[&label];
            (label, count)
        })
        .collect();
    result.sort_by(|a, b| b.1.cmp(&a.1));
    result
}

/// Creates the status bar chart for a table
///
/// Looks for a status column (see [`STATUS_COLUMNS`]) and draws one bar per
/// distinct value with its frequency.
///
/// # Returns
/// * `Ok(None)` if the table has no status column
/// * `Ok(Some(png))` with the encoded chart otherwise
pub fn chart_for(table: &Table) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error>> {
    let Some(column) = status_column(table) else {
        return Ok(None);
    };

    let counts = value_counts(table, column);
    if counts.is_empty() {
        return Ok(None);
    }

    create_bar_graph(&counts, &GraphOptions::default()).map(Some)
}

/// Creates a bar graph from labelled counts
///
/// Draws into an in-memory RGB buffer and encodes it as PNG. When the
/// labelled chart cannot be drawn (no usable font, for instance) the bars are
/// drawn alone.
fn create_bar_graph(
    counts: &[(String, u32)],
    options: &GraphOptions,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let (width, height) = (options.width, options.height);
    let mut pixels = vec![0u8; (width * height * 3) as usize];

    if let Err(e) = draw_labelled_chart(&mut pixels, counts, options) {
        warn!("labelled chart unavailable ({}), drawing bars only", e);
        draw_plain_bars(&mut pixels, counts, options)?;
    }

    encode_png(width, height, pixels)
}

fn draw_labelled_chart(
    pixels: &mut [u8],
    counts: &[(String, u32)],
    options: &GraphOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::with_buffer(pixels, (options.width, options.height))
        .into_drawing_area();
    root.fill(&WHITE)?;

    let max_y = counts.iter().map(|(_, c)| *c).max().unwrap_or(1);
    let labels: Vec<&str> = counts.iter().map(|(l, _)| l.as_str()).collect();

    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 24).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d((0u32..counts.len() as u32).into_segmented(), 0u32..max_y + 1)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(counts.len())
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(i) => labels.get(*i as usize).unwrap_or(&"").to_string(),
            _ => String::new(),
        })
        .y_desc(&options.y_label)
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(BLUE.filled())
            .margin(12)
            .data(counts.iter().enumerate().map(|(i, (_, c))| (i as u32, *c))),
    )?;

    root.present()?;
    Ok(())
}

/// Bars only, no text, so no font is needed.
fn draw_plain_bars(
    pixels: &mut [u8],
    counts: &[(String, u32)],
    options: &GraphOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let (width, height) = (options.width as i32, options.height as i32);
    let root = BitMapBackend::with_buffer(pixels, (options.width, options.height))
        .into_drawing_area();
    root.fill(&WHITE)?;

    let max_y = counts.iter().map(|(_, c)| *c).max().unwrap_or(1).max(1) as f64;
    let slot = (width / counts.len().max(1) as i32).max(1);
    let gap = slot / 8;
    let baseline = height - 10;
    let usable = (height - 20) as f64;

    for (i, (_, count)) in counts.iter().enumerate() {
        let left = i as i32 * slot + gap;
        let right = (i as i32 + 1) * slot - gap;
        let top = baseline - (usable * *count as f64 / max_y) as i32;
        root.draw(&Rectangle::new([(left, top), (right, baseline)], BLUE.filled()))?;
    }

    root.present()?;
    Ok(())
}

fn encode_png(width: u32, height: u32, pixels: Vec<u8>) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let rgb = image::RgbImage::from_raw(width, height, pixels)
        .ok_or("chart buffer has the wrong size")?;
    let mut png = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(rgb).write_to(&mut png, image::ImageOutputFormat::Png)?;

    Ok(png.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, Value};

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn status_column_priority() {
        let table = Table::from_columns(vec![
            Column::new("state", vec![text("a")]),
            Column::new("Status", vec![text("b")]),
        ]);
        assert_eq!(status_column(&table), Some("Status"));
    }

    #[test]
    fn status_lookup_is_case_sensitive() {
        let table = Table::from_columns(vec![Column::new("status", vec![text("a")])]);
        assert_eq!(status_column(&table), None);
        assert!(chart_for(&table).unwrap().is_none());
    }

    #[test]
    fn counts_sorted_by_frequency() {
        let table = Table::from_columns(vec![Column::new(
            "Statut",
            vec![text("ouvert"), text("fermé"), text("fermé"), Value::Missing, text("attente")],
        )]);

        assert_eq!(
            value_counts(&table, "Statut"),
            vec![
                ("fermé".to_string(), 2),
                ("ouvert".to_string(), 1),
                ("attente".to_string(), 1),
            ]
        );
    }

    const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

    #[test]
    fn status_column_gives_png_chart() {
        let table = Table::from_columns(vec![
            Column::new("id", vec![Value::Numeric(1.0), Value::Numeric(2.0), Value::Numeric(3.0)]),
            Column::new("Status", vec![text("open"), text("closed"), text("open")]),
        ]);

        let png = chart_for(&table).unwrap().expect("a status column yields a chart");
        assert!(png.starts_with(PNG_SIGNATURE));

        let decoded = image::load_from_memory(&png).unwrap();
        let options = GraphOptions::default();
        assert_eq!((decoded.width(), decoded.height()), (options.width, options.height));
    }

    #[test]
    fn plain_bars_need_no_font() {
        let options = GraphOptions::default();
        let counts = vec![("open".to_string(), 2), ("closed".to_string(), 1)];
        let mut pixels = vec![0u8; (options.width * options.height * 3) as usize];

        draw_plain_bars(&mut pixels, &counts, &options).unwrap();

        // white background with blue bars drawn over it
        assert!(pixels.chunks(3).any(|p| p == [255, 255, 255]));
        assert!(pixels.chunks(3).any(|p| p == [0, 0, 255]));

        let png = encode_png(options.width, options.height, pixels).unwrap();
        assert!(png.starts_with(PNG_SIGNATURE));
    }

    #[test]
    fn all_missing_status_has_no_chart() {
        let table = Table::from_columns(vec![Column::new("Status", vec![Value::Missing])]);
        assert!(chart_for(&table).unwrap().is_none());
    }
}
