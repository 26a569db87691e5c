//! Report renderers
//!
//! A renderer turns the ordered results into an artifact and writes it to
//! disk. The shipped [`TextTableRenderer`] produces a fixed-width table.

use crate::{
    error::{AppError, Result},
    models::ProbeResult,
    output::{format_bytes_iec, format_elapsed, LayoutConfig},
    stats::BatchSummary,
};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

/// Turns batch results into a persisted artifact
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Render the table and the summary line into artifact bytes
    fn render(&self, results: &[ProbeResult], summary_line: &str, layout: &LayoutConfig) -> Result<Vec<u8>>;

    /// One-line batch summary shown under the table
    fn format_summary(&self, summary: &BatchSummary, elapsed: Duration) -> String;

    /// MIME type used in the data URI
    fn mime_type(&self) -> &'static str;

    /// File extension of the persisted artifact, without the dot
    fn extension(&self) -> &'static str;

    /// Write the artifact to `path`, creating parent directories
    async fn persist(&self, artifact: &[u8], path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::render(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(path, artifact)
            .await
            .map_err(|e| AppError::render(format!("Failed to write {}: {}", path.display(), e)))
    }
}

/// Text alignment options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Right,
    Center,
}

/// Column definition for table formatting
#[derive(Debug, Clone)]
pub struct Column {
    pub header: String,
    pub alignment: Alignment,
    pub min_width: usize,
    pub max_width: usize,
}

impl Column {
    fn new(header: &str, alignment: Alignment, max_width: usize) -> Self {
        Self {
            header: header.to_string(),
            alignment,
            min_width: 2,
            max_width,
        }
    }
}

/// Fixed-width plain text table
///
/// Pixel metrics of the layout apply to raster output; this renderer only
/// honors the language.
#[derive(Debug, Clone, Default)]
pub struct TextTableRenderer;

impl TextTableRenderer {
    pub fn new() -> Self {
        Self
    }

    fn columns(language: &str) -> Vec<Column> {
        let headers: [&str; 7] = if language.eq_ignore_ascii_case("cn") {
            ["序号", "组", "备注", "协议", "延迟", "平均速度", "最高速度"]
        } else {
            ["No.", "Group", "Remarks", "Protocol", "Ping", "AvgSpeed", "MaxSpeed"]
        };

        vec![
            Column::new(headers[0], Alignment::Right, 6),
            Column::new(headers[1], Alignment::Left, 24),
            Column::new(headers[2], Alignment::Left, 48),
            Column::new(headers[3], Alignment::Center, 10),
            Column::new(headers[4], Alignment::Right, 10),
            Column::new(headers[5], Alignment::Right, 14),
            Column::new(headers[6], Alignment::Right, 14),
        ]
    }

    fn row(result: &ProbeResult) -> Vec<String> {
        let ping = if result.ping >= 1 {
            format!("{}ms", result.ping)
        } else {
            "-".to_string()
        };
        let speed = |value: i64| {
            if value > 0 {
                format!("{}/s", format_bytes_iec(value))
            } else {
                "N/A".to_string()
            }
        };

        vec![
            (result.id + 1).to_string(),
            result.group.clone(),
            result.remarks.clone(),
            result.protocol.clone(),
            ping,
            speed(result.avg_speed),
            speed(result.max_speed),
        ]
    }

    fn create_table(columns: &[Column], rows: &[Vec<String>]) -> String {
        let widths = Self::calculate_column_widths(columns, rows);
        let headers: Vec<String> = columns.iter().map(|c| c.header.clone()).collect();

        let mut output = String::new();
        output.push_str(&Self::create_horizontal_border(&widths));
        output.push('\n');
        output.push_str(&Self::create_row(&headers, &widths, columns));
        output.push('\n');
        output.push_str(&Self::create_horizontal_border(&widths));
        output.push('\n');

        for row in rows {
            output.push_str(&Self::create_row(row, &widths, columns));
            output.push('\n');
        }

        output.push_str(&Self::create_horizontal_border(&widths));
        output
    }

    fn calculate_column_widths(columns: &[Column], rows: &[Vec<String>]) -> Vec<usize> {
        columns
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let content = rows
                    .iter()
                    .filter_map(|row| row.get(idx))
                    .map(|cell| display_width(cell))
                    .max()
                    .unwrap_or(0);
                content
                    .max(display_width(&column.header))
                    .max(column.min_width)
                    .min(column.max_width)
            })
            .collect()
    }

    fn create_row(data: &[String], widths: &[usize], columns: &[Column]) -> String {
        let mut row = String::from("|");
        for ((cell, &width), column) in data.iter().zip(widths).zip(columns) {
            row.push(' ');
            row.push_str(&align_text(cell, width, column.alignment));
            row.push_str(" |");
        }
        row
    }

    fn create_horizontal_border(widths: &[usize]) -> String {
        let mut border = String::from("+");
        for &width in widths {
            border.push_str(&"-".repeat(width + 2));
            border.push('+');
        }
        border
    }
}

#[async_trait]
impl ReportRenderer for TextTableRenderer {
    fn render(&self, results: &[ProbeResult], summary_line: &str, layout: &LayoutConfig) -> Result<Vec<u8>> {
        let columns = Self::columns(&layout.language);
        let rows: Vec<Vec<String>> = results.iter().map(Self::row).collect();

        let mut output = Self::create_table(&columns, &rows);
        writeln!(output)
            .and_then(|_| writeln!(output, "{}", summary_line))
            .map_err(|e| AppError::render(format!("Failed to format report: {}", e)))?;

        Ok(output.into_bytes())
    }

    fn format_summary(&self, summary: &BatchSummary, elapsed: Duration) -> String {
        format!(
            "Total Traffic : {}. Total Time : {}. Working Nodes: [{}]",
            format_bytes_iec(summary.total_traffic),
            format_elapsed(elapsed),
            summary.success_fraction()
        )
    }

    fn mime_type(&self) -> &'static str {
        "text/plain"
    }

    fn extension(&self) -> &'static str {
        "txt"
    }
}

/// Terminal column count; wide characters take two
fn display_width(text: &str) -> usize {
    text.chars().map(|c| if (c as u32) >= 0x1100 { 2 } else { 1 }).sum()
}

/// Pad or truncate `text` to exactly `width` display columns
fn align_text(text: &str, width: usize, alignment: Alignment) -> String {
    let current = display_width(text);
    if current >= width {
        let mut truncated = String::new();
        let mut used = 0;
        for c in text.chars() {
            let w = display_width(c.encode_utf8(&mut [0; 4]));
            if used + w > width {
                break;
            }
            truncated.push(c);
            used += w;
        }
        truncated.push_str(&" ".repeat(width - used));
        return truncated;
    }

    let padding = width - current;
    match alignment {
        Alignment::Left => format!("{}{}", text, " ".repeat(padding)),
        Alignment::Right => format!("{}{}", " ".repeat(padding), text),
        Alignment::Center => {
            let left_pad = padding / 2;
            let right_pad = padding - left_pad;
            format!("{}{}{}", " ".repeat(left_pad), text, " ".repeat(right_pad))
        }
    }
}
