// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory record store, for tests and one-off batch jobs.

use std::collections::HashMap;

use super::{
    check_vector, is_usable, new_record_id, now_millis, NewRecord, Record, RecordStore,
    VectorCoverage,
};
use crate::errors::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Vec<Record>,
    by_id: HashMap<String, usize>,
    dimension: Option<usize>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed record as-is, bypassing dimension checks.
    ///
    /// Lets tests seed corrupt or legacy rows.
    pub fn push_raw(&mut self, record: Record) {
        self.by_id.insert(record.id.clone(), self.records.len());
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn in_scope(record: &Record, scope: Option<&str>) -> bool {
        scope.map_or(true, |s| record.origin.as_deref() == Some(s))
    }

    fn has_usable_vector(&self, record: &Record) -> bool {
        is_usable(record.vector.as_deref(), self.dimension)
    }

    /// Newest first, id ascending on ties.
    fn sorted<'a>(mut records: Vec<&'a Record>) -> Vec<&'a Record> {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }
}

impl RecordStore for MemoryRecordStore {
    fn list_candidates(
        &self,
        scope: Option<&str>,
        exclude_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let matching = self
            .records
            .iter()
            .filter(|r| r.vector.is_some())
            .filter(|r| Self::in_scope(r, scope))
            .filter(|r| exclude_id != Some(r.id.as_str()))
            .collect();

        Ok(Self::sorted(matching)
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    fn get_record(&self, id: &str) -> Result<Record> {
        let idx = self.index_of(id)?;
        Ok(self.records[idx].clone())
    }

    fn insert_record(&mut self, record: NewRecord) -> Result<String> {
        if let Some(vector) = record.vector.as_deref() {
            check_vector(vector, self.dimension)?;
        }
        if let Some(external_ref) = record.external_ref.as_deref() {
            if self.find_by_external_ref(external_ref)?.is_some() {
                return Err(Error::InvalidInput(format!(
                    "external reference {} already imported",
                    external_ref
                )));
            }
        }

        if let Some(vector) = record.vector.as_deref() {
            self.dimension.get_or_insert(vector.len());
        }

        let id = new_record_id();
        self.push_raw(Record {
            id: id.clone(),
            text: record.text,
            narrative: record.narrative,
            vector: record.vector,
            created_at: now_millis(),
            origin: record.origin,
            external_ref: record.external_ref,
        });
        Ok(id)
    }

    fn attach_vector(&mut self, id: &str, vector: &[f32]) -> Result<bool> {
        let idx = self.index_of(id)?;
        check_vector(vector, self.dimension)?;
        if self.has_usable_vector(&self.records[idx]) {
            return Ok(false);
        }
        self.dimension.get_or_insert(vector.len());
        self.records[idx].vector = Some(vector.to_vec());
        Ok(true)
    }

    fn set_narrative(&mut self, id: &str, narrative: &str) -> Result<()> {
        let idx = self.index_of(id)?;
        self.records[idx].narrative = Some(narrative.to_string());
        Ok(())
    }

    fn records_missing_vector(&self, scope: Option<&str>, limit: usize) -> Result<Vec<Record>> {
        let matching = self
            .records
            .iter()
            .filter(|r| !self.has_usable_vector(r))
            .filter(|r| Self::in_scope(r, scope))
            .collect();

        Ok(Self::sorted(matching)
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    fn coverage(&self, scope: Option<&str>) -> Result<VectorCoverage> {
        let mut coverage = VectorCoverage {
            total: 0,
            with_vector: 0,
            missing: 0,
            malformed: 0,
        };
        for record in self.records.iter().filter(|r| Self::in_scope(r, scope)) {
            coverage.total += 1;
            if self.has_usable_vector(record) {
                coverage.with_vector += 1;
            } else {
                coverage.missing += 1;
                coverage.malformed += u64::from(record.vector.is_some());
            }
        }
        Ok(coverage)
    }

    fn find_by_external_ref(&self, external_ref: &str) -> Result<Option<String>> {
        Ok(self
            .records
            .iter()
            .find(|r| r.external_ref.as_deref() == Some(external_ref))
            .map(|r| r.id.clone()))
    }

    fn dimension(&self) -> Result<Option<usize>> {
        Ok(self.dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_and_scope() {
        let mut store = MemoryRecordStore::new();
        let a = store
            .insert_record(NewRecord::new("a").with_vector(vec![1.0, 0.0]).with_origin("internal"))
            .unwrap();
        store
            .insert_record(NewRecord::new("b").with_origin("imported"))
            .unwrap();

        assert_eq!(store.get_record(&a).unwrap().text, "a");
        assert_eq!(store.list_candidates(None, None, 10).unwrap().len(), 1);
        assert!(store
            .list_candidates(Some("imported"), None, 10)
            .unwrap()
            .is_empty());
        assert!(store.list_candidates(None, Some(&a), 10).unwrap().is_empty());
        assert_eq!(store.coverage(None).unwrap().missing, 1);
    }

    #[test]
    fn rejects_wrong_dimension_and_unknown_ids() {
        let mut store = MemoryRecordStore::new();
        store
            .insert_record(NewRecord::new("a").with_vector(vec![1.0, 0.0]))
            .unwrap();
        let pending = store.insert_record(NewRecord::new("b")).unwrap();

        assert!(matches!(
            store.attach_vector(&pending, &[1.0, 0.0, 0.0]),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(store.attach_vector(&pending, &[0.0, 1.0]).unwrap());
        assert!(!store.attach_vector(&pending, &[1.0, 1.0]).unwrap());
        assert!(matches!(store.get_record("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn unusable_vectors_are_repaired() {
        let mut store = MemoryRecordStore::new();
        store
            .insert_record(NewRecord::new("a").with_vector(vec![1.0, 0.0]))
            .unwrap();
        store.push_raw(Record {
            id: "legacy".to_string(),
            text: "b".to_string(),
            narrative: None,
            vector: Some(vec![1.0, 0.0, 0.0]),
            created_at: 1,
            origin: None,
            external_ref: None,
        });

        let coverage = store.coverage(None).unwrap();
        assert_eq!(coverage.with_vector, 1);
        assert_eq!(coverage.missing, 1);
        assert_eq!(coverage.malformed, 1);
        assert_eq!(store.records_missing_vector(None, 10).unwrap()[0].id, "legacy");

        assert!(store.attach_vector("legacy", &[0.0, 1.0]).unwrap());
        assert_eq!(store.coverage(None).unwrap().malformed, 0);
        assert!(!store.attach_vector("legacy", &[1.0, 0.0]).unwrap());
    }

    #[test]
    fn duplicate_external_refs_are_rejected() {
        let mut store = MemoryRecordStore::new();
        store
            .insert_record(NewRecord::new("a").with_external_ref("X1"))
            .unwrap();
        assert!(store
            .insert_record(NewRecord::new("b").with_external_ref("X1"))
            .is_err());
        assert_eq!(store.len(), 1);
    }
}
