use crate::jobs::JobType;
use std::fmt;

/// The remote datasets mirrored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Cards,
    Sets,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 2] = [DatasetKind::Cards, DatasetKind::Sets];

    /// Prefix of every settings key belonging to this dataset.
    pub fn key(&self) -> &'static str {
        match self {
            DatasetKind::Cards => "card_data",
            DatasetKind::Sets => "set_data",
        }
    }

    pub fn job_type(&self) -> JobType {
        match self {
            DatasetKind::Cards => JobType::CardDataImport,
            DatasetKind::Sets => JobType::SetDataImport,
        }
    }

    pub fn refresh_task_name(&self) -> String {
        format!("{}_refresh", self.key())
    }

    /// Type marker looked up in the catalog-of-datasets response when the
    /// `{key}_dataset_type` setting is absent.
    pub fn default_dataset_type(&self) -> &'static str {
        match self {
            DatasetKind::Cards => "default_cards",
            DatasetKind::Sets => "sets",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
