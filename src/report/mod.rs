// Report documents: the shape written to the report database.
//
// Each requested section yields two documents: the full one and a
// `-compact` one filtered by the compaction threshold.

pub mod sink;
pub mod summary;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::aggregate::models::{FanCountEntity, LikeEntity};
use crate::pipeline::run::RunReport;
use crate::source::ids::CohortType;

/// Which slice of the results a document carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Section {
    All,
    Gender,
    Likes,
    Music,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::All => "all",
            Section::Gender => "gender",
            Section::Likes => "likes",
            Section::Music => "music",
        }
    }

    fn includes(&self, other: Section) -> bool {
        *self == Section::All || *self == other
    }
}

/// Default section list for a run.
pub const DEFAULT_SECTIONS: [Section; 4] = [Section::All, Section::Gender, Section::Likes, Section::Music];

/// Document ID: `<type>-<id>-<section>[-compact]`.
pub fn document_id(kind: CohortType, id: &str, section: Section, compacted: bool) -> String {
    let suffix = if compacted { "-compact" } else { "" };
    format!("{}-{}-{}{}", kind.as_str(), id, section.as_str(), suffix)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub generated_at: String,
    pub data: ReportData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportData {
    #[serde(rename = "customerIDs", skip_serializing_if = "Option::is_none")]
    pub customer_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<GenderData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<Vec<LikeRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub musicstreaming: Option<Vec<FanCountEntity>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenderData {
    pub male: u64,
    pub female: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LikeRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub count: u64,
    #[serde(rename = "userIDs")]
    pub user_ids: Vec<String>,
}

impl From<&LikeEntity> for LikeRow {
    fn from(like: &LikeEntity) -> Self {
        Self {
            id: like.id.clone(),
            name: like.item.name.clone(),
            category: like.item.category.clone(),
            count: like.count,
            user_ids: like.members.as_slice().to_vec(),
        }
    }
}

/// Options that shape the documents but not the aggregation.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub kind: CohortType,
    pub id: String,
    pub sections: Vec<Section>,
    pub include_ids: bool,
}

/// Build one compact and one full document per requested section.
pub fn build_documents(
    report: &RunReport,
    options: &ReportOptions,
    generated_at: DateTime<Utc>,
) -> Vec<ReportDocument> {
    let timestamp = generated_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut docs = Vec::with_capacity(options.sections.len() * 2);

    for &section in &options.sections {
        for compacted in [true, false] {
            let mut data = ReportData::default();
            if options.include_ids {
                data.customer_ids = Some(report.customer_ids.clone());
            }
            if section.includes(Section::Gender) {
                let g = report.context.gender;
                data.gender = Some(GenderData {
                    male: g.male,
                    female: g.female,
                });
            }
            if section.includes(Section::Likes) {
                data.likes = Some(if compacted {
                    report.compact_likes().into_iter().map(LikeRow::from).collect()
                } else {
                    report.likes().iter().map(LikeRow::from).collect()
                });
            }
            if section.includes(Section::Music) {
                data.musicstreaming = Some(if compacted {
                    report.compact_fan_counts().into_iter().cloned().collect()
                } else {
                    report.fan_counts.clone()
                });
            }

            docs.push(ReportDocument {
                id: document_id(options.kind, &options.id, section, compacted),
                rev: None,
                kind: options.kind.as_str().to_string(),
                generated_at: timestamp.clone(),
                data,
            });
        }
    }

    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_ids() {
        assert_eq!(document_id(CohortType::Event, "623", Section::All, false), "event-623-all");
        assert_eq!(
            document_id(CohortType::Brand, "138", Section::Music, true),
            "brand-138-music-compact"
        );
    }

    #[test]
    fn test_section_inclusion() {
        assert!(Section::All.includes(Section::Likes));
        assert!(Section::Likes.includes(Section::Likes));
        assert!(!Section::Gender.includes(Section::Music));
    }
}
