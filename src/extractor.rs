use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error, instrument, warn};

use crate::extract_error::ExtractError;
use crate::utils::{clean_cell_text, parse_decimal, strip_footnotes};

/// CSS selector of the data tables on both published pages
pub const TABLE_SELECTOR: &str = "table.table-striped";

/// Leading header cells of the heights table that identify the row, not a time
pub const IDENTIFYING_COLUMNS: usize = 2;

/// A heights row needs at least the identifying columns
pub const HEIGHTS_MIN_CELLS: usize = 2;

/// place, state, time, height, date
pub const FORECAST_MIN_CELLS: usize = 5;

/// The forecast page publishes an interior and an exterior river table
pub const FORECAST_TABLE_COUNT: usize = 2;

/// Cell texts of one HTML table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One value of a wide heights table: the header label it sits under and the parsed height
#[derive(Debug, Clone, PartialEq)]
pub struct HeightCell {
    pub label: String,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeightRow {
    pub station: String,
    pub values: Vec<HeightCell>,
}

/// One forecast table row with the place already carried forward
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub place: String,
    pub state: String,
    pub time: String,
    pub height: Option<f64>,
    pub date: String,
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css)
        .map_err(|e| ExtractError::MalformedTable(format!("invalid selector '{}': {}", css, e)))
}

/// Parse the hourly heights page into its single data table
#[instrument(skip(html), fields(html_size = html.len()))]
pub fn parse_heights_page(html: &str) -> Result<RawTable, ExtractError> {
    debug!("Parsing heights HTML document");
    let document = Html::parse_document(html);
    let table_selector = selector(TABLE_SELECTOR)?;

    let table = document.select(&table_selector).next().ok_or_else(|| {
        error!("No heights table found in HTML");
        debug!("HTML preview (first 500 chars): {}", &html.chars().take(500).collect::<String>());
        ExtractError::MalformedTable("hourly heights table not found".to_string())
    })?;

    let raw = read_table(table, true)?;
    debug!(
        "Read heights table with {} header cells and {} body rows",
        raw.headers.len(),
        raw.rows.len()
    );
    Ok(raw)
}

/// Parse the forecast page into its interior and exterior tables
#[instrument(skip(html), fields(html_size = html.len()))]
pub fn parse_forecast_page(html: &str) -> Result<Vec<RawTable>, ExtractError> {
    debug!("Parsing forecast HTML document");
    let document = Html::parse_document(html);
    let table_selector = selector(TABLE_SELECTOR)?;

    let tables: Vec<ElementRef> = document.select(&table_selector).collect();
    if tables.len() < FORECAST_TABLE_COUNT {
        error!(
            "Expected {} forecast tables, found {}",
            FORECAST_TABLE_COUNT,
            tables.len()
        );
        return Err(ExtractError::MalformedTable(format!(
            "expected {} forecast tables, found {}",
            FORECAST_TABLE_COUNT,
            tables.len()
        )));
    }

    tables
        .into_iter()
        .take(FORECAST_TABLE_COUNT)
        .map(|table| read_table(table, false))
        .collect()
}

fn read_table(table: ElementRef, require_header: bool) -> Result<RawTable, ExtractError> {
    let thead_selector = selector("thead")?;
    let th_selector = selector("th")?;
    let tbody_selector = selector("tbody")?;
    let tr_selector = selector("tr")?;
    let td_selector = selector("td")?;

    let headers = match table.select(&thead_selector).next() {
        Some(thead) => thead
            .select(&th_selector)
            .map(|th| header_text(&th))
            .collect(),
        None if require_header => {
            return Err(ExtractError::MalformedTable("table has no <thead>".to_string()));
        }
        None => Vec::new(),
    };

    let tbody = table
        .select(&tbody_selector)
        .next()
        .ok_or_else(|| ExtractError::MalformedTable("table has no <tbody>".to_string()))?;

    let rows = tbody
        .select(&tr_selector)
        .map(|tr| {
            tr.select(&td_selector)
                .map(|td| clean_cell_text(&td.text().collect::<String>()))
                .collect()
        })
        .collect();

    Ok(RawTable { headers, rows })
}

/// Header labels may split date and time across elements or lines
fn header_text(th: &ElementRef) -> String {
    th.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turn the wide heights table into one row per gauge
///
/// Header cells after the identifying columns label the value columns.
/// Rows too short to carry a gauge name are skipped. A value that does not
/// parse is kept as `None`.
#[instrument(skip(table), fields(rows = table.rows.len()))]
pub fn extract_heights(table: &RawTable) -> Result<Vec<HeightRow>, ExtractError> {
    if table.headers.len() <= IDENTIFYING_COLUMNS {
        return Err(ExtractError::MalformedTable(format!(
            "heights table has {} header cells, expected more than {}",
            table.headers.len(),
            IDENTIFYING_COLUMNS
        )));
    }
    let labels = &table.headers[IDENTIFYING_COLUMNS..];

    let mut rows = Vec::new();
    let mut skipped_rows = 0;
    let mut null_values = 0;

    for (row_idx, cells) in table.rows.iter().enumerate() {
        if cells.len() < HEIGHTS_MIN_CELLS {
            debug!("Row {} has {} cells, skipping", row_idx, cells.len());
            skipped_rows += 1;
            continue;
        }

        let station = strip_footnotes(&cells[1]);
        let values: Vec<HeightCell> = labels
            .iter()
            .zip(&cells[IDENTIFYING_COLUMNS..])
            .map(|(label, cell)| HeightCell {
                label: label.clone(),
                height: parse_decimal(cell).ok(),
            })
            .collect();

        null_values += values.iter().filter(|v| v.height.is_none()).count();
        rows.push(HeightRow { station, values });
    }

    if null_values > 0 {
        warn!("{} height cells could not be parsed and were kept as null", null_values);
    }
    debug!(
        "Extracted {} gauge rows ({} short rows skipped)",
        rows.len(),
        skipped_rows
    );
    Ok(rows)
}

/// Read forecast rows, carrying the last non-empty place down the table
///
/// The carried place starts empty on every call.
#[instrument(skip(table), fields(rows = table.rows.len()))]
pub fn extract_forecast(table: &RawTable) -> Vec<ForecastRow> {
    let rows: Vec<ForecastRow> = table
        .rows
        .iter()
        .filter(|cells| cells.len() >= FORECAST_MIN_CELLS)
        .scan(String::new(), |current_place, cells| {
            if !cells[0].is_empty() {
                *current_place = cells[0].clone();
            }
            Some(ForecastRow {
                place: current_place.clone(),
                state: cells[1].clone(),
                time: cells[2].clone(),
                height: parse_decimal(&cells[3]).ok(),
                date: cells[4].clone(),
            })
        })
        .collect();

    let skipped = table.rows.len() - rows.len();
    if skipped > 0 {
        debug!("Skipped {} forecast rows with fewer than {} cells", skipped, FORECAST_MIN_CELLS);
    }
    let unparsed = rows.iter().filter(|r| r.height.is_none()).count();
    if unparsed > 0 {
        warn!("{} forecast heights could not be parsed and were kept as null", unparsed);
    }
    debug!("Extracted {} forecast rows", rows.len());
    rows
}
