//! Reshapes ranked buckets into a [`CompressedMinerIndex`].

use std::collections::HashMap;

use crate::models::{CompressedEntityBucket, CompressedMinerIndex, DataEntityBucket, DataLabel, DataSource};

/// Group ranked cells by source, then by label.
///
/// Rank order is preserved: labels appear in the order their first cell was
/// ranked, and each label's parallel sequences follow rank order.
pub fn compress(buckets: &[DataEntityBucket]) -> CompressedMinerIndex {
    let mut index = CompressedMinerIndex::default();
    let mut positions: HashMap<(DataSource, Option<DataLabel>), usize> = HashMap::new();

    for bucket in buckets {
        let source = bucket.id.source;
        let label = bucket.id.label.clone();
        let entries = index.sources.entry(source).or_default();
        let pos = *positions.entry((source, label.clone())).or_insert_with(|| {
            entries.push(CompressedEntityBucket::new(label));
            entries.len() - 1
        });
        entries[pos].push(bucket.id.time_bucket.id, bucket.size_bytes);
    }

    index
}
