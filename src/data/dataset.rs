use burn::data::dataset::Dataset;

use crate::data::feature::FeatureRecord;

/// Encoded features of one split, served to burn's DataLoader.
#[derive(Debug, Clone, Default)]
pub struct AtepcDataset {
    features: Vec<FeatureRecord>,
}

impl AtepcDataset {
    pub fn new(features: Vec<FeatureRecord>) -> Self {
        Self { features }
    }
}

impl Dataset<FeatureRecord> for AtepcDataset {
    fn get(&self, index: usize) -> Option<FeatureRecord> {
        self.features.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.features.len()
    }
}
