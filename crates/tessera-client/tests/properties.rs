//! Property-based tests for formatting, filter canonicalisation, progress
//! and event decoding.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;

use tessera_client::{
    FilterCondition, FilterModel, FilterOperator, JobCounts, Progress, SseDecoder, SseFrame,
    format_bytes,
};

const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Generates a column id like `asset/name`.
fn arb_column() -> impl Strategy<Value = String> {
    "(asset|meta)/[a-z]{1,8}".prop_map(|s| s)
}

/// Generates a simple filter operand.
fn arb_operand() -> impl Strategy<Value = String> {
    "[a-z0-9 ]{0,6}".prop_map(|s| s)
}

fn arb_operator() -> impl Strategy<Value = FilterOperator> {
    prop::sample::select(vec![
        FilterOperator::Eq,
        FilterOperator::Ne,
        FilterOperator::Contains,
        FilterOperator::Gt,
        FilterOperator::Empty,
    ])
}

fn decode_all(decoder: &mut SseDecoder, chunks: &[&[u8]]) -> Vec<SseFrame> {
    chunks.iter().flat_map(|chunk| decoder.push(chunk)).collect()
}

proptest! {
    #[test]
    fn bytes_below_one_kib_are_exact(bytes in 1u64..1024) {
        prop_assert_eq!(format_bytes(bytes), format!("{bytes} B"));
    }

    #[test]
    fn scaled_bytes_stay_within_unit(bytes in 1024u64..u64::MAX) {
        let text = format_bytes(bytes);
        let (number, unit) = text.split_once(' ').expect("number and unit");
        prop_assert!(UNITS.contains(&unit));
        let value: f64 = number.parse().expect("numeric part");
        prop_assert!(value >= 1.0);
        if unit != "EB" {
            prop_assert!(value <= 1024.0);
        }
        if value >= 10.0 {
            prop_assert!(!number.contains('.'), "no decimals at or above 10: {}", text);
        }
    }

    #[test]
    fn filter_serialization_ignores_insertion_order(
        entries in prop::collection::vec((arb_column(), arb_operator(), arb_operand()), 0..8)
    ) {
        let mut forward = FilterModel::new();
        let mut backward = FilterModel::new();
        for (i, (column, op, operand)) in entries.iter().enumerate() {
            let condition = FilterCondition::single(column.as_str(), *op, operand.as_str());
            forward.set(format!("f{i}"), condition);
        }
        for (i, (column, op, operand)) in entries.iter().enumerate().rev() {
            let condition = FilterCondition::single(column.as_str(), *op, operand.as_str());
            backward.set(format!("f{i}"), condition);
        }

        let serialized = forward.serialize();
        prop_assert_eq!(&serialized, &backward.serialize());
        prop_assert!(serialized.windows(2).all(|w| w[0] < w[1]), "sorted and unique");
        prop_assert!(serialized.iter().all(|f| !f.ends_with(' ')), "no empty operands");
    }

    #[test]
    fn known_counts_give_bounded_percent(
        queued in 0u64..10_000,
        running in 0u64..10_000,
        finished in 0u64..10_000,
    ) {
        let counts = JobCounts { queued: Some(queued), running: Some(running), finished: Some(finished) };
        match counts.progress() {
            Progress::Percent(p) => {
                prop_assert!(p <= 100);
                if finished == 0 {
                    prop_assert_eq!(p, 0);
                }
                if queued + running == 0 && finished > 0 {
                    prop_assert_eq!(p, 100);
                }
            }
            other => prop_assert!(false, "expected a percentage, got {:?}", other),
        }
    }

    #[test]
    fn unknown_queue_is_never_computed(running in 0u64..100, finished in 0u64..100) {
        let counts = JobCounts { queued: None, running: Some(running), finished: Some(finished) };
        prop_assert_eq!(counts.progress(), Progress::Midpoint);
    }

    #[test]
    fn chunking_does_not_change_decoded_frames(
        lines in prop::collection::vec("[a-z ]{0,12}", 1..6),
        cut_points in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let mut body = String::from("retry: 900\r\n");
        for (i, line) in lines.iter().enumerate() {
            body.push_str(&format!("id: {i}\r\nevent: log\ndata: {line}\r\n\n: comment\n\n"));
        }
        let bytes = body.as_bytes();

        let whole = decode_all(&mut SseDecoder::new(), &[bytes]);

        let mut cuts: Vec<usize> = cut_points.iter().map(|ix| ix.index(bytes.len() + 1)).collect();
        cuts.sort_unstable();
        let mut chunks: Vec<&[u8]> = Vec::new();
        let mut start = 0;
        for cut in cuts {
            chunks.push(&bytes[start..cut]);
            start = cut;
        }
        chunks.push(&bytes[start..]);
        let pieces = decode_all(&mut SseDecoder::new(), &chunks);

        prop_assert_eq!(&whole, &pieces);
        prop_assert_eq!(whole.len(), lines.len() + 1);
    }
}
