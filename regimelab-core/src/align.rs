//! Backward as-of alignment of a coarse series onto a fine series.
//!
//! For every fine timestamp, pick the latest coarse record at or before it.
//! A single forward two-pointer sweep over both sorted sequences makes the
//! no-lookahead invariant structural: the coarse cursor only ever advances,
//! so a fine bar can never observe a coarse record from its future.

use chrono::NaiveDateTime;

use crate::error::DataOrderingError;

/// Align coarse values onto fine timestamps (backward as-of join).
///
/// `coarse` is a sorted sequence of (timestamp, value) pairs; `fine_ts` is a
/// sorted sequence of timestamps. Output has one entry per fine timestamp:
/// the value of the latest coarse record with `coarse_ts <= fine_ts`, or
/// `None` if no coarse record has occurred yet.
///
/// Both inputs must be strictly increasing or the join would be silently
/// wrong, so disorder fails with a `DataOrderingError`. O(|fine| + |coarse|).
pub fn align_backward<T: Copy>(
    fine_ts: &[NaiveDateTime],
    coarse: &[(NaiveDateTime, T)],
    symbol: &str,
    timeframe: &str,
) -> Result<Vec<Option<T>>, DataOrderingError> {
    check_sorted(fine_ts.iter().copied(), symbol, timeframe)?;
    check_sorted(coarse.iter().map(|(ts, _)| *ts), symbol, timeframe)?;

    let mut out = Vec::with_capacity(fine_ts.len());
    let mut ci = 0usize;
    let mut latest: Option<T> = None;

    for &ft in fine_ts {
        while ci < coarse.len() && coarse[ci].0 <= ft {
            latest = Some(coarse[ci].1);
            ci += 1;
        }
        out.push(latest);
    }

    Ok(out)
}

/// Verify a timestamp sequence is strictly increasing.
pub fn check_sorted<I>(
    timestamps: I,
    symbol: &str,
    timeframe: &str,
) -> Result<(), DataOrderingError>
where
    I: IntoIterator<Item = NaiveDateTime>,
{
    let mut prev: Option<NaiveDateTime> = None;
    for (index, ts) in timestamps.into_iter().enumerate() {
        if let Some(p) = prev {
            if ts <= p {
                return Err(DataOrderingError {
                    symbol: symbol.to_string(),
                    timeframe: timeframe.to_string(),
                    timestamp: ts,
                    index,
                });
            }
        }
        prev = Some(ts);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn ts(minute: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::minutes(minute)
    }

    #[test]
    fn fine_bars_before_first_coarse_are_none() {
        let fine = vec![ts(0), ts(30), ts(60)];
        let coarse = vec![(ts(60), 'a')];
        let aligned = align_backward(&fine, &coarse, "X", "30min").unwrap();
        assert_eq!(aligned, vec![None, None, Some('a')]);
    }

    #[test]
    fn picks_latest_at_or_before() {
        // Coarse at 0 and 240; fine every 30 minutes.
        let fine: Vec<_> = (0..10).map(|i| ts(30 * i)).collect();
        let coarse = vec![(ts(0), 1), (ts(240), 2)];
        let aligned = align_backward(&fine, &coarse, "X", "30min").unwrap();
        for (i, got) in aligned.iter().enumerate() {
            let expected = if 30 * i >= 240 { Some(2) } else { Some(1) };
            assert_eq!(*got, expected, "at fine index {i}");
        }
    }

    #[test]
    fn exact_timestamp_match_is_visible() {
        // A coarse bar stamped exactly at the fine bar's time counts: <=, not <.
        let aligned = align_backward(&[ts(240)], &[(ts(240), 7)], "X", "30min").unwrap();
        assert_eq!(aligned, vec![Some(7)]);
    }

    #[test]
    fn unsorted_fine_is_rejected() {
        let fine = vec![ts(30), ts(0)];
        let err = align_backward(&fine, &[(ts(0), 0)], "EURUSD", "30min").unwrap_err();
        assert_eq!(err.symbol, "EURUSD");
        assert_eq!(err.index, 1);
    }

    #[test]
    fn duplicate_coarse_timestamp_is_rejected() {
        let coarse = vec![(ts(0), 1), (ts(0), 2)];
        assert!(align_backward(&[ts(30)], &coarse, "X", "4h").is_err());
    }

    #[test]
    fn empty_coarse_yields_all_none() {
        let fine = vec![ts(0), ts(30)];
        let aligned = align_backward::<u8>(&fine, &[], "X", "30min").unwrap();
        assert_eq!(aligned, vec![None, None]);
    }

    #[test]
    fn empty_fine_yields_empty() {
        let aligned = align_backward(&[], &[(ts(0), 1)], "X", "30min").unwrap();
        assert!(aligned.is_empty());
    }
}
