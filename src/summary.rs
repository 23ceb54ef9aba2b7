//! Whole-dump record census: one drain of the stream that counts every
//! top-level tag and every heap dump sub-tag.

use crate::{Hprof, HprofError, RecordTag};
use crate::heap_dump::SubTag;
use std::collections::BTreeMap;

/// Counts keyed by tag byte order, so reports come out in wire-code order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DumpSummary {
    pub num_records: u64,
    pub num_sub_records: u64,
    pub tag_counts: BTreeMap<RecordTag, u64>,
    pub sub_tag_counts: BTreeMap<SubTag, u64>,
}

/// Tallies every record and sub-record in the dump.
///
/// Heap dump segments are fully drained rather than skipped, so a segment
/// whose sub-records don't exactly cover the declared body length fails here
/// even when nothing downstream would have looked at it.
pub fn summarize(hprof: &Hprof) -> Result<DumpSummary, HprofError> {
    let mut summary = DumpSummary::default();

    for record in hprof.records() {
        let record = record?;

        *summary.tag_counts.entry(record.tag()).or_insert(0) += 1;
        summary.num_records += 1;

        if let Some(segment) = record.as_heap_dump_segment() {
            for sub_record in segment.sub_records() {
                let sub_record = sub_record?;

                *summary.sub_tag_counts.entry(sub_record.sub_tag()).or_insert(0) += 1;
                summary.num_sub_records += 1;
            }
        }
    }

    log::debug!(
        "summarized {} records, {} heap dump sub-records",
        summary.num_records,
        summary.num_sub_records
    );

    Ok(summary)
}
