use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::config::EngineConfig;
use crate::record::{CodeDetail, CodeRecord, CodeSummary, CodeType};

pub const DEFAULT_PAGE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Code,
    Description,
    Type,
}

impl SortField {
    pub fn parse(s: Option<&str>) -> SortField {
        match s.unwrap_or("code").to_ascii_lowercase().as_str() {
            "description" => SortField::Description,
            "type" => SortField::Type,
            _ => SortField::Code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(s: Option<&str>) -> SortOrder {
        match s.unwrap_or("asc").to_ascii_lowercase().as_str() {
            "desc" => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListQuery {
    pub limit: usize,
    pub offset: usize,
    pub code_type: Option<CodeType>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
            code_type: None,
            sort_by: SortField::Code,
            sort_order: SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodePage {
    pub codes: Vec<CodeSummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub q: String,
    pub limit: usize,
    pub code_type: Option<CodeType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub codes: Vec<CodeSummary>,
    pub total: usize,
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total_codes: usize,
    pub types: BTreeMap<&'static str, usize>,
}

struct SearchEntry {
    slot: usize,
    /// Lowercased "code description", the scoring corpus for this record.
    text: String,
}

/// In-memory index over the full code collection: O(1) lookup by code, O(1)
/// grouping by type, and a flattened corpus for scored free-text search.
///
/// A `CodeIndex` only exists fully built; it is constructed once at startup
/// and published behind an `Arc`, so readers never observe partial state.
pub struct CodeIndex {
    records: Vec<CodeRecord>,
    by_code: HashMap<String, usize>,
    by_type: HashMap<CodeType, Vec<usize>>,
    corpus: Vec<SearchEntry>,
}

impl CodeIndex {
    pub fn build(records: Vec<CodeRecord>) -> CodeIndex {
        let mut by_code = HashMap::with_capacity(records.len());
        let mut by_type: HashMap<CodeType, Vec<usize>> = HashMap::new();
        let mut corpus = Vec::with_capacity(records.len());

        for (slot, record) in records.iter().enumerate() {
            // Duplicate codes keep the last occurrence, matching the source
            // dataset's own precedence.
            by_code.insert(record.code.clone(), slot);
            by_type.entry(record.code_type).or_default().push(slot);
            corpus.push(SearchEntry {
                slot,
                text: format!("{} {}", record.code, record.description).to_lowercase(),
            });
        }

        tracing::info!(
            "Code index built: {} records, {} distinct codes, {} types",
            records.len(),
            by_code.len(),
            by_type.len()
        );

        CodeIndex {
            records,
            by_code,
            by_type,
            corpus,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact lookup with a case-insensitive fallback (raw, then uppercased).
    pub fn get(&self, code: &str) -> Option<&CodeRecord> {
        let slot = self
            .by_code
            .get(code)
            .or_else(|| self.by_code.get(&code.to_uppercase()))?;
        self.records.get(*slot)
    }

    pub fn detail(&self, code: &str, config: &EngineConfig) -> Option<CodeDetail> {
        self.get(code).map(|r| CodeDetail::from_record(r, config))
    }

    /// Paged listing, optionally filtered by type, sorted lexicographically
    /// on the requested field. The sort is stable, so equal keys keep load
    /// order.
    pub fn list(&self, q: &ListQuery) -> CodePage {
        let mut slots: Vec<usize> = match q.code_type {
            Some(t) => self.by_type.get(&t).cloned().unwrap_or_default(),
            None => (0..self.records.len()).collect(),
        };

        slots.sort_by(|&a, &b| {
            let (ra, rb) = (&self.records[a], &self.records[b]);
            let ord = match q.sort_by {
                SortField::Code => ra.code.cmp(&rb.code),
                SortField::Description => ra.description.cmp(&rb.description),
                SortField::Type => ra.code_type.as_str().cmp(rb.code_type.as_str()),
            };
            match q.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = slots.len();
        let codes = slots
            .iter()
            .skip(q.offset)
            .take(q.limit)
            .map(|&s| CodeSummary::from_record(&self.records[s]))
            .collect();

        CodePage {
            codes,
            total,
            limit: q.limit,
            offset: q.offset,
            has_more: q.offset + q.limit < total,
        }
    }

    /// Weighted term-matching search. Exact code match scores 100, substring
    /// code match 80, and every query term found in the code+description
    /// corpus adds 10 on top. Results sort by score descending; ties break
    /// lexicographically by code so ranking never depends on load order.
    pub fn search(&self, q: &SearchQuery) -> SearchResponse {
        let term = q.q.trim().to_lowercase();
        if term.len() < 2 {
            return SearchResponse {
                codes: Vec::new(),
                total: 0,
                query: q.q.clone(),
            };
        }
        let terms: Vec<&str> = term.split_whitespace().collect();

        let mut scored: Vec<(u32, usize)> = Vec::new();
        for entry in &self.corpus {
            let record = &self.records[entry.slot];
            if let Some(filter) = q.code_type {
                if record.code_type != filter {
                    continue;
                }
            }

            let code_lower = record.code.to_lowercase();
            let mut score: u32 = if code_lower == term {
                100
            } else if code_lower.contains(&term) {
                80
            } else {
                0
            };
            for t in &terms {
                if entry.text.contains(t) {
                    score += 10;
                }
            }

            if score > 0 {
                scored.push((score, entry.slot));
            }
        }

        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| self.records[a.1].code.cmp(&self.records[b.1].code))
        });

        let total = scored.len();
        let codes = scored
            .iter()
            .take(q.limit)
            .map(|&(_, slot)| CodeSummary::from_record(&self.records[slot]))
            .collect();

        SearchResponse {
            codes,
            total,
            query: q.q.clone(),
        }
    }

    pub fn stats(&self) -> IndexStats {
        let mut types = BTreeMap::new();
        for (t, slots) in &self.by_type {
            types.insert(t.as_str(), slots.len());
        }
        IndexStats {
            total_codes: self.records.len(),
            types,
        }
    }
}
