//! Create/update/delete semantics shared by the accounting doubles.

use chrono::Utc;
use ledgerbridge_core::record::field_text;
use ledgerbridge_core::{EntityType, Record, UpstreamError};
use serde_json::Value;

const ID_FIELD: &str = "id";

fn id_prefix(entity: EntityType) -> &'static str {
    match entity {
        EntityType::Customer => "CUS",
        EntityType::Invoice => "INV",
    }
}

fn touch(record: &mut Record) {
    record.insert("updated_at".into(), Value::String(Utc::now().to_rfc3339()));
}

/// One past the highest `XXX-nnnnn` suffix in use, so deleted ids are never
/// handed out again while a higher one exists.
fn next_id(rows: &[Record], entity: EntityType) -> String {
    let prefix = id_prefix(entity);
    let highest = rows
        .iter()
        .filter_map(|r| field_text(r, ID_FIELD))
        .filter_map(|id| {
            id.strip_prefix(prefix)?
                .strip_prefix('-')?
                .parse::<u64>()
                .ok()
        })
        .max()
        .unwrap_or(0);
    format!("{prefix}-{:05}", highest.saturating_add(1))
}

/// Append a record, assigning the next free `XXX-nnnnn` id when it has none.
pub(crate) fn create(rows: &mut Vec<Record>, entity: EntityType, mut record: Record) -> Record {
    if field_text(&record, ID_FIELD).is_none() {
        let id = next_id(rows, entity);
        record.insert(ID_FIELD.into(), Value::String(id));
    }
    touch(&mut record);
    rows.push(record.clone());
    record
}

/// Merge `changes` into the row whose id matches.
pub(crate) fn update(
    rows: &mut [Record],
    id: &str,
    changes: Record,
) -> Result<Record, UpstreamError> {
    let row = rows
        .iter_mut()
        .find(|r| field_text(r, ID_FIELD).as_deref() == Some(id))
        .ok_or_else(|| UpstreamError::NotFound(id.to_string()))?;
    for (k, v) in changes {
        if k != ID_FIELD {
            row.insert(k, v);
        }
    }
    touch(row);
    Ok(row.clone())
}

/// Remove the row whose id matches. Returns `true` if one was removed.
pub(crate) fn delete(rows: &mut Vec<Record>, id: &str) -> bool {
    let before = rows.len();
    rows.retain(|r| field_text(r, ID_FIELD).as_deref() != Some(id));
    rows.len() < before
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn create_assigns_sequential_ids() {
        let mut rows = Vec::new();
        let a = create(&mut rows, EntityType::Invoice, record(json!({"total": 10})));
        let b = create(&mut rows, EntityType::Invoice, record(json!({"total": 20})));
        assert_eq!(a["id"], "INV-00001");
        assert_eq!(b["id"], "INV-00002");
        assert!(b.contains_key("updated_at"));
    }

    #[test]
    fn ids_stay_unique_after_delete() {
        let mut rows = Vec::new();
        create(&mut rows, EntityType::Invoice, record(json!({"total": 10})));
        create(&mut rows, EntityType::Invoice, record(json!({"total": 20})));
        assert!(delete(&mut rows, "INV-00001"));

        let c = create(&mut rows, EntityType::Invoice, record(json!({"total": 30})));
        assert_eq!(c["id"], "INV-00003");
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("INV-00002"), json!("INV-00003")]);
    }

    #[test]
    fn next_id_follows_supplied_ids() {
        let mut rows = Vec::new();
        create(&mut rows, EntityType::Customer, record(json!({"id": "CUS-00900"})));
        create(&mut rows, EntityType::Customer, record(json!({"id": "legacy-7"})));
        let r = create(&mut rows, EntityType::Customer, record(json!({"name": "Harbor LLC"})));
        assert_eq!(r["id"], "CUS-00901");
    }

    #[test]
    fn create_keeps_supplied_id() {
        let mut rows = Vec::new();
        let r = create(&mut rows, EntityType::Customer, record(json!({"id": "CUS-00900"})));
        assert_eq!(r["id"], "CUS-00900");
    }

    #[test]
    fn update_merges_and_protects_id() {
        let mut rows = vec![record(json!({"id": "INV-00001", "status": "open"}))];
        let updated = update(
            &mut rows,
            "INV-00001",
            record(json!({"id": "INV-99999", "status": "paid"})),
        )
        .unwrap();
        assert_eq!(updated["id"], "INV-00001");
        assert_eq!(updated["status"], "paid");
        assert!(matches!(
            update(&mut rows, "INV-00404", Record::new()),
            Err(UpstreamError::NotFound(_))
        ));
    }

    #[test]
    fn delete_reports_removal() {
        let mut rows = vec![record(json!({"id": "CUS-00001"}))];
        assert!(delete(&mut rows, "CUS-00001"));
        assert!(!delete(&mut rows, "CUS-00001"));
    }
}
