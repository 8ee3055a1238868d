// ============================================================
// Layer 4 — ATEPC Batcher
// ============================================================
// Implements Burn's Batcher trait to stack FeatureRecords into
// tensors of shape [batch, seq].
//
// Every record is already padded to max_seq_len, so stacking
// is a flatten followed by a reshape, the same way for every
// field:
//
//   [r1_t1, ..., r1_tS, r2_t1, ..., rN_tS] → [N, S]
//
// Two things are derived here instead of in the feature
// encoder because they only make sense as tensors:
//   - padding masks as Bool tensors for multi-head attention
//   - the word alignment (gather index + word mask) built from
//     valid_ids, used to compress subword output to words

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::feature::{word_alignment, FeatureRecord};

// ─── AtepcBatch ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct AtepcBatch<B: Backend> {
    /// `[CLS] text [SEP] aspect [SEP]` ids — [batch, seq]
    pub input_ids_spc: Tensor<B, 2, Int>,
    /// `[CLS] text [SEP]` ids — [batch, seq]
    pub input_ids_local: Tensor<B, 2, Int>,
    pub segment_ids: Tensor<B, 2, Int>,

    /// True at padded subword positions of the SPC form
    pub pad_mask_spc: Tensor<B, 2, Bool>,
    /// True at subword positions outside the context form
    pub pad_mask_local: Tensor<B, 2, Bool>,

    /// Subword position of word j — [batch, seq]
    pub word_index: Tensor<B, 2, Int>,
    /// 1.0 for real word positions, 0.0 beyond the word count
    pub word_mask: Tensor<B, 2>,

    /// Word-level tag ids — [batch, seq]
    pub label_ids: Tensor<B, 2, Int>,
    /// [batch]
    pub polarity: Tensor<B, 1, Int>,

    pub cdm: Tensor<B, 2>,
    pub cdw: Tensor<B, 2>,
    pub left_cdm: Tensor<B, 2>,
    pub left_cdw: Tensor<B, 2>,
    pub right_cdm: Tensor<B, 2>,
    pub right_cdw: Tensor<B, 2>,
}

impl<B: Backend> AtepcBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.polarity.dims()[0]
    }

    pub fn seq_len(&self) -> usize {
        self.label_ids.dims()[1]
    }

    /// True at word positions that hold no word.
    pub fn word_pad_mask(&self) -> Tensor<B, 2, Bool> {
        self.word_mask.clone().equal_elem(0.0)
    }
}

// ─── AtepcBatcher ─────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct AtepcBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> AtepcBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn ints(&self, rows: Vec<Vec<i32>>, shape: [usize; 2]) -> Tensor<B, 2, Int> {
        let flat: Vec<i32> = rows.into_iter().flatten().collect();
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device).reshape(shape)
    }

    fn floats(&self, rows: Vec<&[f32]>, shape: [usize; 2]) -> Tensor<B, 2> {
        let flat: Vec<f32> = rows.into_iter().flatten().copied().collect();
        Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device).reshape(shape)
    }
}

fn widen(v: &[u32]) -> Vec<i32> {
    v.iter().map(|&x| x as i32).collect()
}

impl<B: Backend> Batcher<FeatureRecord, AtepcBatch<B>> for AtepcBatcher<B> {
    fn batch(&self, items: Vec<FeatureRecord>) -> AtepcBatch<B> {
        let batch_size = items.len();
        let seq_len = items.first().map_or(0, |f| f.seq_len());
        let shape = [batch_size, seq_len];

        let int_field = |f: fn(&FeatureRecord) -> &Vec<u32>| {
            self.ints(items.iter().map(|r| widen(f(r))).collect(), shape)
        };
        let input_ids_spc = int_field(|r| &r.input_ids_spc);
        let input_ids_local = int_field(|r| &r.input_ids_local);
        let segment_ids = int_field(|r| &r.segment_ids);
        let pad_mask_spc = int_field(|r| &r.input_mask).equal_elem(0);
        let pad_mask_local = int_field(|r| &r.local_mask).equal_elem(0);

        let (index_rows, mask_rows): (Vec<Vec<i32>>, Vec<Vec<f32>>) =
            items.iter().map(|r| word_alignment(&r.valid_ids)).unzip();
        let word_index = self.ints(index_rows, shape);
        let word_mask = self.floats(mask_rows.iter().map(Vec::as_slice).collect(), shape);

        let label_ids = self.ints(
            items
                .iter()
                .map(|r| r.label_ids.iter().map(|&l| l as i32).collect())
                .collect(),
            shape,
        );
        let polarities: Vec<i32> = items.iter().map(|r| r.polarity as i32).collect();
        let polarity = Tensor::<B, 1, Int>::from_ints(polarities.as_slice(), &self.device);

        let float_field = |f: fn(&FeatureRecord) -> &[f32]| {
            self.floats(items.iter().map(f).collect(), shape)
        };
        let cdm = float_field(|r| r.cdm_vec.as_slice());
        let cdw = float_field(|r| r.cdw_vec.as_slice());
        // records without neighbours stand in for their own neighbours
        let left_cdm = float_field(|r| match &r.neighbours {
            Some(n) => n.left_cdm.as_slice(),
            None => r.cdm_vec.as_slice(),
        });
        let left_cdw = float_field(|r| match &r.neighbours {
            Some(n) => n.left_cdw.as_slice(),
            None => r.cdw_vec.as_slice(),
        });
        let right_cdm = float_field(|r| match &r.neighbours {
            Some(n) => n.right_cdm.as_slice(),
            None => r.cdm_vec.as_slice(),
        });
        let right_cdw = float_field(|r| match &r.neighbours {
            Some(n) => n.right_cdw.as_slice(),
            None => r.cdw_vec.as_slice(),
        });

        AtepcBatch {
            input_ids_spc,
            input_ids_local,
            segment_ids,
            pad_mask_spc,
            pad_mask_local,
            word_index,
            word_mask,
            label_ids,
            polarity,
            cdm,
            cdw,
            left_cdm,
            left_cdw,
            right_cdm,
            right_cdw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn record(valid: Vec<u32>, polarity: i64) -> FeatureRecord {
        let n = valid.len();
        let mask: Vec<u32> = valid.iter().map(|_| 1).collect();
        FeatureRecord {
            words: vec!["w".into()],
            aspect_positions: vec![0],
            input_ids_spc: vec![5; n],
            input_ids_local: vec![5; n],
            input_mask: mask.clone(),
            local_mask: mask,
            segment_ids: vec![0; n],
            valid_ids: valid,
            label_ids: vec![1; n],
            polarity,
            cdm_vec: vec![1.0; n],
            cdw_vec: vec![0.5; n],
            neighbours: None,
        }
    }

    #[test]
    fn test_batch_shapes() {
        let batcher = AtepcBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![record(vec![1, 0, 1, 0], 2), record(vec![1, 1, 1, 0], -999)]);
        assert_eq!(batch.input_ids_spc.dims(), [2, 4]);
        assert_eq!(batch.word_mask.dims(), [2, 4]);
        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.seq_len(), 4);

        let pol: Vec<i64> = batch.polarity.into_data().iter::<i64>().collect();
        assert_eq!(pol, vec![2, -999]);
    }

    #[test]
    fn test_word_alignment_is_packed() {
        let batcher = AtepcBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![record(vec![1, 0, 1, 0], 0)]);
        let idx: Vec<i64> = batch.word_index.into_data().iter::<i64>().collect();
        assert_eq!(idx, vec![0, 2, 0, 0]);
        let mask: Vec<f32> = batch.word_mask.into_data().iter::<f32>().collect();
        assert_eq!(mask, vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_neighbours_fall_back_to_own_vectors() {
        let batcher = AtepcBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![record(vec![1, 1], 1)]);
        let left: Vec<f32> = batch.left_cdw.into_data().iter::<f32>().collect();
        assert_eq!(left, vec![0.5, 0.5]);
    }
}
