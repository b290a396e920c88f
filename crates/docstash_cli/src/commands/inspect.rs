//! Inspect command implementation.

use super::open_reader;
use docstash_core::MergeWriter;
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Root folder name.
    pub root: String,
    /// Total number of document files.
    pub document_count: usize,
    /// Per-collection details.
    pub collections: Vec<CollectionSummary>,
}

/// Summary of a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionSummary {
    /// Collection name.
    pub name: String,
    /// Stored document type, if the definition is readable.
    pub document_type: Option<String>,
    /// Identifier field, if the definition is readable.
    pub id_field: Option<String>,
    /// Number of document files.
    pub document_count: usize,
    /// Total size of the document files in bytes.
    pub data_size: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, root: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let reader = open_reader(path, root)?;
    let result = inspect(&reader, path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects collection summaries.
pub fn inspect(reader: &MergeWriter, path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let mut collections = Vec::new();

    for name in reader.list_collections()? {
        // An unreadable definition is reported by `verify`, not here.
        let definition = reader.read_definition(&name).ok().flatten();
        let documents = reader.read_raw_documents(&name)?;

        collections.push(CollectionSummary {
            document_type: definition.as_ref().map(|d| d.document_type.clone()),
            id_field: definition.map(|d| d.id_field),
            document_count: documents.len(),
            data_size: documents.iter().map(|(_, text)| text.len()).sum(),
            name,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        root: reader.root().to_string(),
        document_count: collections.iter().map(|c| c.document_count).sum(),
        collections,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("docstash database: {}", result.path);
    println!("Root folder: {}", result.root);
    println!("Collections: {}", result.collections.len());
    println!("Documents: {}", result.document_count);

    if !result.collections.is_empty() {
        println!();
        println!("=== Collections ===");
        for collection in &result.collections {
            println!(
                "  {:<24} {:<20} id={:<12} {:>8} docs {:>10}",
                collection.name,
                collection.document_type.as_deref().unwrap_or("<unknown>"),
                collection.id_field.as_deref().unwrap_or("?"),
                collection.document_count,
                format_size(collection.data_size),
            );
        }
    }
}

fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
