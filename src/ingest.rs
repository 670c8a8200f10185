use crate::error::{PipelineError, Result};
use crate::schema::{generate_id, Address, Client, ClientMetadata, CustomValue};
use crate::store::ClientStore;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Header aliases recognized as standard client fields. Anything else in a
/// source row lands in `custom_fields`.
const STANDARD_FIELDS: &[&str] = &[
    "id", "ID", "firstName", "first_name", "FirstName", "lastName", "last_name", "LastName",
    "dateOfBirth", "dob", "DOB", "date_of_birth", "email", "Email", "phone", "Phone",
    "phoneNumber", "street", "address", "Address", "city", "City", "state", "State", "zipCode",
    "zip", "ZIP", "country", "Country",
];

/// Loads client records from a JSON, CSV or spreadsheet file.
///
/// Rows that fail validation are dropped with a warning; one malformed row
/// never aborts the load. Survivors are inserted into the store (overwriting
/// by id) and returned in source-row order.
pub async fn load_clients_from_file(path: &Path, store: &mut ClientStore) -> Result<Vec<Client>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let rows = match extension.as_str() {
        "json" => load_json(path).await?,
        "csv" => load_csv(path).await?,
        "xlsx" | "xls" => load_excel(path)?,
        _ => return Err(PipelineError::UnsupportedFormat { extension }),
    };

    let mut clients = Vec::new();
    for row in &rows {
        if let Some(client) = parse_client_row(row) {
            store.insert(client.clone());
            clients.push(client);
        }
    }

    tracing::info!(
        "Loaded {} of {} rows from {:?}",
        clients.len(),
        rows.len(),
        path.file_name().unwrap_or_default()
    );
    Ok(clients)
}

async fn load_json(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let content = tokio::fs::read_to_string(path).await?;
    let data: Value = serde_json::from_str(&content)
        .map_err(|e| PipelineError::Extraction(format!("invalid JSON: {}", e)))?;

    let entries = match data {
        Value::Array(items) => items,
        single => vec![single],
    };

    let mut rows = Vec::new();
    for entry in entries {
        match entry {
            Value::Object(map) => rows.push(map),
            other => tracing::warn!("Skipping non-object JSON entry: {}", other),
        }
    }
    Ok(rows)
}

async fn load_csv(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::Extraction(format!("invalid CSV header: {}", e)))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping unreadable CSV row: {}", e);
                continue;
            }
        };
        // Empty lines come through as a single empty cell.
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        let mut row = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), Value::String(cell.to_string()));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Reads the first sheet only, using the header row as keys.
fn load_excel(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| PipelineError::Extraction(format!("cannot open workbook: {}", e)))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::Extraction("workbook has no sheets".to_string()))?
        .map_err(|e| PipelineError::Extraction(format!("cannot read sheet: {}", e)))?;

    let mut row_iter = range.rows();
    let headers: Vec<String> = match row_iter.next() {
        Some(header_row) => header_row.iter().map(|cell| cell.to_string()).collect(),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for cells in row_iter {
        let mut row = Map::new();
        for (header, cell) in headers.iter().zip(cells.iter()) {
            if let Some(value) = cell_to_json(cell) {
                row.insert(header.clone(), value);
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn cell_to_json(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Int(i) => Some(Value::Number((*i).into())),
        Data::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number),
        Data::Bool(b) => Some(Value::Bool(*b)),
        other => Some(Value::String(other.to_string())),
    }
}

/// Normalizes one raw row into a canonical client. Returns `None` (with a
/// warning) when the row fails validation.
fn parse_client_row(row: &Map<String, Value>) -> Option<Client> {
    let address = Address {
        street: pick(row, &["street", "address", "Address"]),
        city: pick(row, &["city", "City"]),
        state: pick(row, &["state", "State"]),
        zip_code: pick(row, &["zipCode", "zip", "ZIP"]),
        country: pick(row, &["country", "Country"]).or_else(|| Some("USA".to_string())),
    };

    let client = Client {
        id: pick(row, &["id", "ID"]).unwrap_or_else(|| generate_id("client")),
        first_name: pick(row, &["firstName", "first_name", "FirstName"]).unwrap_or_default(),
        last_name: pick(row, &["lastName", "last_name", "LastName"]).unwrap_or_default(),
        date_of_birth: pick(row, &["dateOfBirth", "dob", "DOB", "date_of_birth"]),
        email: pick(row, &["email", "Email"]),
        phone: pick(row, &["phone", "Phone", "phoneNumber"]),
        address: Some(address),
        custom_fields: extract_custom_fields(row),
        metadata: ClientMetadata {
            source: "file".to_string(),
            last_updated: Utc::now(),
        },
    };

    match client.validate() {
        Ok(()) => Some(client),
        Err(errors) => {
            tracing::warn!("Client validation failed, row dropped: {}", errors.join("; "));
            None
        }
    }
}

/// First alias that holds a non-empty value wins.
fn pick(row: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .find_map(|alias| row.get(*alias).and_then(value_to_string))
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn extract_custom_fields(row: &Map<String, Value>) -> BTreeMap<String, CustomValue> {
    row.iter()
        .filter(|(key, _)| !STANDARD_FIELDS.contains(&key.as_str()))
        .filter_map(|(key, value)| CustomValue::from_json(value).map(|v| (key.clone(), v)))
        .collect()
}
