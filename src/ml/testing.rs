//! Tiny fixtures shared by the model and trainer tests.

use burn::backend::NdArray;
use burn::data::dataloader::batcher::Batcher;

use crate::data::batcher::{AtepcBatch, AtepcBatcher};
use crate::data::feature::{FeatureRecord, NUM_LABELS};
use crate::data::srd::LcfMode;
use crate::ml::encoder::ContextEncoderConfig;
use crate::ml::model::{AtepcModelConfig, EncoderSharing};

pub type TestBackend = NdArray;

/// Hidden size 8, two heads, one layer, 3 polarity classes.
pub fn tiny_config(lcf: LcfMode, sharing: EncoderSharing) -> AtepcModelConfig {
    AtepcModelConfig {
        encoder: ContextEncoderConfig::new(16, 8, 8, 2, 1, 16, 0.0),
        num_labels: NUM_LABELS,
        polarities_dim: 3,
        dropout: 0.0,
        use_bert_spc: true,
        sharing,
        lcf,
    }
}

/// `[CLS] great battery [SEP] battery [SEP]`, aspect "battery", label 2.
pub fn tiny_record() -> FeatureRecord {
    FeatureRecord {
        words: vec!["great".into(), "battery".into()],
        aspect_positions: vec![1],
        input_ids_spc: vec![2, 5, 6, 3, 6, 3, 0, 0],
        input_ids_local: vec![2, 5, 6, 3, 0, 0, 0, 0],
        input_mask: vec![1, 1, 1, 1, 1, 1, 0, 0],
        local_mask: vec![1, 1, 1, 1, 0, 0, 0, 0],
        segment_ids: vec![0, 0, 0, 0, 1, 1, 0, 0],
        valid_ids: vec![1, 1, 1, 1, 1, 1, 0, 0],
        label_ids: vec![4, 1, 2, 5, 2, 5, 0, 0],
        polarity: 2,
        cdm_vec: vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        cdw_vec: vec![0.5, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0],
        neighbours: None,
    }
}

pub fn tiny_batch() -> AtepcBatch<TestBackend> {
    AtepcBatcher::<TestBackend>::new(Default::default()).batch(vec![tiny_record(), tiny_record()])
}
