use std::collections::HashMap;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::payments::{self, SitePayments};

/// Normalized code set. Raw dataset labels `DX` and `PCS` map to the ICD-10
/// variants; anything unrecognized lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CodeType {
    #[serde(rename = "CPT")]
    Cpt,
    #[serde(rename = "HCPCS")]
    Hcpcs,
    #[serde(rename = "ICD10")]
    Icd10,
    #[serde(rename = "ICD10-PCS")]
    Icd10Pcs,
    #[serde(rename = "OTHER")]
    Other,
}

impl CodeType {
    pub fn from_label(label: Option<&str>) -> CodeType {
        let Some(label) = label.map(str::trim).filter(|s| !s.is_empty()) else {
            return CodeType::Other;
        };
        Self::parse(label).unwrap_or(CodeType::Other)
    }

    /// Strict variant used for query filters: unknown labels are `None`
    /// instead of being folded into `Other`.
    pub fn parse(label: &str) -> Option<CodeType> {
        match label.trim().to_uppercase().as_str() {
            "CPT" => Some(CodeType::Cpt),
            "HCPCS" => Some(CodeType::Hcpcs),
            "DX" | "ICD10" | "ICD-10" => Some(CodeType::Icd10),
            "PCS" | "ICD10-PCS" | "ICD-10-PCS" => Some(CodeType::Icd10Pcs),
            "OTHER" => Some(CodeType::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CodeType::Cpt => "CPT",
            CodeType::Hcpcs => "HCPCS",
            CodeType::Icd10 => "ICD10",
            CodeType::Icd10Pcs => "ICD10-PCS",
            CodeType::Other => "OTHER",
        }
    }
}

/// Rate-setting attributes attached to a code, keyed on the wire by the raw
/// type label. Unknown keys in the source JSON are ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RateMetadata {
    pub apc: Option<i64>,
    pub si: Option<String>,
    pub rank: Option<i64>,
    pub facility_rvu: Option<f64>,
    pub nonfacility_rvu: Option<f64>,
    pub mue_unit: Option<String>,
    pub modifiers: Vec<String>,
    pub effective_date: Option<String>,
    pub guidelines: Option<String>,
}

/// One record as it appears in the source JSON, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCode {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub code_type: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, RateMetadata>,
}

/// A validated billing code. Immutable once built; the index never hands out
/// mutable references.
#[derive(Debug, Clone)]
pub struct CodeRecord {
    pub code: String,
    pub description: String,
    pub code_type: CodeType,
    raw_type: String,
    pub labels: Vec<String>,
    pub metadata: HashMap<String, RateMetadata>,
}

impl CodeRecord {
    /// Validating constructor. Malformed records fail the load instead of
    /// degrading per request.
    pub fn from_raw(raw: RawCode) -> anyhow::Result<CodeRecord> {
        let code = raw.code.trim().to_string();
        if code.is_empty() {
            return Err(anyhow!("record has empty code"));
        }
        let raw_type = raw.code_type.unwrap_or_default();
        Ok(CodeRecord {
            code,
            description: raw.description,
            code_type: CodeType::from_label(Some(&raw_type)),
            raw_type,
            labels: raw.labels,
            metadata: raw.metadata,
        })
    }

    /// First label wins; otherwise the category is derived from the code set
    /// (and, for CPT, the numeric range).
    pub fn category(&self) -> String {
        if let Some(first) = self.labels.first() {
            return first.clone();
        }
        match self.code_type {
            CodeType::Cpt => self.cpt_category().to_string(),
            CodeType::Hcpcs => "HCPCS Level II".to_string(),
            CodeType::Icd10 => "ICD-10 Diagnosis".to_string(),
            CodeType::Icd10Pcs => "ICD-10 Procedure".to_string(),
            CodeType::Other => "OTHER".to_string(),
        }
    }

    fn cpt_category(&self) -> &'static str {
        if self.code.ends_with('F') {
            return "Category II - Performance Measurement";
        }
        if self.code.ends_with('T') {
            return "Category III - Emerging Technology";
        }
        let digits = self.code.trim_end_matches(|c: char| c.is_ascii_alphabetic());
        let Ok(n) = digits.parse::<u32>() else {
            return "CPT";
        };
        match n {
            10000..=19999 => "Integumentary System",
            20000..=29999 => "Musculoskeletal System",
            30000..=32999 => "Respiratory System",
            33000..=37999 => "Cardiovascular System",
            38000..=38999 => "Hemic and Lymphatic Systems",
            40000..=49999 => "Digestive System",
            50000..=53999 => "Urinary System",
            54000..=55999 => "Male Genital System",
            56000..=59999 => "Female Genital System",
            60000..=60999 => "Endocrine System",
            61000..=64999 => "Nervous System",
            65000..=68999 => "Eye and Ocular Adnexa",
            69000..=69999 => "Auditory System",
            70000..=79999 => "Radiology",
            80000..=89999 => "Pathology and Laboratory",
            90000..=99999 => "Medicine",
            _ => "CPT",
        }
    }

    /// Metadata bag used for payment derivation. CPT and HCPCS codes carry
    /// their rates under their own type key.
    pub fn fee_metadata(&self) -> Option<&RateMetadata> {
        self.metadata
            .get("CPT")
            .or_else(|| self.metadata.get("HCPCS"))
    }

    /// Metadata bag keyed by this record's raw type label, for display.
    pub fn own_metadata(&self) -> Option<&RateMetadata> {
        self.metadata.get(&self.raw_type)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeSummary {
    pub code: String,
    pub description: String,
    pub category: String,
    #[serde(rename = "type")]
    pub code_type: CodeType,
    pub labels: Vec<String>,
}

impl CodeSummary {
    pub fn from_record(record: &CodeRecord) -> CodeSummary {
        CodeSummary {
            code: record.code.clone(),
            description: record.description.clone(),
            category: record.category(),
            code_type: record.code_type,
            labels: record.labels.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalInfo {
    pub apc: Option<String>,
    pub si: Option<String>,
    pub rank: Option<i64>,
    pub modifiers: Vec<String>,
    pub effective_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeDetail {
    pub code: String,
    pub description: String,
    pub category: String,
    #[serde(rename = "type")]
    pub code_type: CodeType,
    pub labels: Vec<String>,
    pub payments: SitePayments,
    pub optional: OptionalInfo,
}

impl CodeDetail {
    pub fn from_record(record: &CodeRecord, config: &EngineConfig) -> CodeDetail {
        let meta = record.own_metadata();
        CodeDetail {
            code: record.code.clone(),
            description: record.description.clone(),
            category: record.category(),
            code_type: record.code_type,
            labels: record.labels.clone(),
            payments: payments::derive_payments(record, config),
            optional: OptionalInfo {
                apc: meta.and_then(|m| m.apc).map(|a| a.to_string()),
                si: meta.and_then(|m| m.si.clone()),
                rank: meta.and_then(|m| m.rank),
                modifiers: meta.map(|m| m.modifiers.clone()).unwrap_or_default(),
                effective_date: meta.and_then(|m| m.effective_date.clone()),
            },
        }
    }
}
