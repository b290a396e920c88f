//! Verify command implementation.

use super::open_reader;
use docstash_core::MergeWriter;
use serde_json::Value;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of collections checked.
    pub collections_checked: usize,
    /// Number of document files checked.
    pub documents_checked: usize,
    /// Number of valid documents.
    pub valid_documents: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, root: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying database at {:?}", path);
    println!();

    let reader = open_reader(path, root)?;
    let result = verify(&reader)?;
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Database verification passed");
        Ok(())
    } else {
        println!("✗ Database verification failed");
        Err("Verification failed".into())
    }
}

/// Checks every collection under the root.
pub fn verify(reader: &MergeWriter) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();

    for collection in reader.list_collections()? {
        result.collections_checked += 1;

        let id_field = match reader.read_definition(&collection) {
            Ok(Some(definition)) if definition.name == collection => Some(definition.id_field),
            Ok(Some(definition)) => {
                result.errors.push(format!(
                    "{collection}: definition names collection {:?}",
                    definition.name
                ));
                None
            }
            Ok(None) => {
                result
                    .errors
                    .push(format!("{collection}: definition.txt is missing"));
                None
            }
            Err(e) => {
                result.errors.push(format!("{collection}: {e}"));
                None
            }
        };

        for (file_name, contents) in reader.read_raw_documents(&collection)? {
            result.documents_checked += 1;
            match check_document(&file_name, &contents, id_field.as_deref()) {
                Ok(()) => result.valid_documents += 1,
                Err(problem) => result
                    .errors
                    .push(format!("{collection}/{file_name}: {problem}")),
            }
        }
    }

    Ok(result)
}

fn check_document(file_name: &str, contents: &str, id_field: Option<&str>) -> Result<(), String> {
    let value: Value = serde_json::from_str(contents).map_err(|e| format!("invalid JSON: {e}"))?;
    let Value::Object(fields) = value else {
        return Err("not a JSON object".to_string());
    };

    // Without a readable definition only the JSON itself can be checked.
    let Some(id_field) = id_field else {
        return Ok(());
    };

    let id = fields
        .get(id_field)
        .or_else(|| {
            fields
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(id_field))
                .map(|(_, value)| value)
        })
        .ok_or_else(|| format!("identifier field {id_field:?} is missing"))?;

    let id = match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if id == file_name {
        Ok(())
    } else {
        Err(format!("identifier {id:?} does not match the file name"))
    }
}

fn print_result(result: &VerifyResult) {
    println!("  Collections checked: {}", result.collections_checked);
    println!("  Documents checked: {}", result.documents_checked);
    println!("  Valid documents: {}", result.valid_documents);

    if !result.errors.is_empty() {
        println!("  Errors:");
        for error in result.errors.iter().take(20) {
            println!("    - {}", error);
        }
        if result.errors.len() > 20 {
            println!("    ... and {} more", result.errors.len() - 20);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn players_dir(root: &Path) -> std::path::PathBuf {
        let players = root.join("docstash").join("players");
        fs::create_dir_all(&players).unwrap();
        players
    }

    #[test]
    fn clean_database_passes() {
        let dir = tempfile::tempdir().unwrap();
        let players = players_dir(dir.path());
        fs::write(
            players.join("definition.txt"),
            r#"{"name":"players","document_type":"Player","id_field":"id"}"#,
        )
        .unwrap();
        fs::write(players.join("p1"), r#"{"id":"p1","name":"ada"}"#).unwrap();
        fs::write(players.join("p2"), r#"{"Id":"p2"}"#).unwrap();

        let result = verify(&open_reader(dir.path(), "docstash").unwrap()).unwrap();
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.collections_checked, 1);
        assert_eq!(result.valid_documents, 2);
    }

    #[test]
    fn reports_every_problem() {
        let dir = tempfile::tempdir().unwrap();
        let players = players_dir(dir.path());
        fs::write(
            players.join("definition.txt"),
            r#"{"name":"heroes","document_type":"Player","id_field":"id"}"#,
        )
        .unwrap();

        let items = dir.path().join("docstash").join("items");
        fs::create_dir_all(&items).unwrap();
        fs::write(
            items.join("definition.txt"),
            r#"{"name":"items","document_type":"Item","id_field":"id"}"#,
        )
        .unwrap();
        fs::write(items.join("a"), r#"{"id":"b"}"#).unwrap();
        fs::write(items.join("c"), "[1, 2]").unwrap();
        fs::write(items.join("d"), "{not json").unwrap();
        fs::write(items.join("e"), r#"{"label":"lamp"}"#).unwrap();

        let result = verify(&open_reader(dir.path(), "docstash").unwrap()).unwrap();
        assert!(!result.is_ok());
        assert_eq!(result.documents_checked, 4);
        assert_eq!(result.valid_documents, 0);
        assert_eq!(result.errors.len(), 5);
        assert!(result.errors.iter().any(|e| e.starts_with("players: definition names")));
    }

    #[test]
    fn numeric_identifiers_compare_as_text() {
        assert!(check_document("42", r#"{"id":42}"#, Some("id")).is_ok());
        assert!(check_document("43", r#"{"id":42}"#, Some("id")).is_err());
        assert!(check_document("x", r#"{"id":1}"#, None).is_ok());
    }
}
