//! HTTP `Range` header negotiation.
//!
//! Only single `bytes=` ranges are honoured. A header listing several
//! intervals degrades to a full-entity response instead of a multipart one;
//! browsers seeking in a `<video>` element never send multiple ranges.

/// Inclusive byte interval validated against a specific entity length.
///
/// Can only be built through [`ByteRange::new`] or [`ByteRange::full`], so
/// holding one means `start <= end < total_length` for the entity it was
/// validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

impl ByteRange {
    /// Validates `[start, end]` against an entity of `total_length` bytes.
    ///
    /// Returns `None` when the interval is reversed or reaches past the end.
    ///
    /// # Examples
    /// ```
    /// use reel_core::streaming::ByteRange;
    ///
    /// let range = ByteRange::new(200, 299, 1000).unwrap();
    /// assert_eq!(range.len(), 100);
    /// assert!(ByteRange::new(0, 1000, 1000).is_none());
    /// ```
    pub fn new(start: u64, end: u64, total_length: u64) -> Option<Self> {
        (start <= end && end < total_length).then_some(Self { start, end })
    }

    /// The whole entity, or `None` for an empty one.
    pub fn full(total_length: u64) -> Option<Self> {
        total_length
            .checked_sub(1)
            .map(|end| Self { start: 0, end })
    }

    /// First byte offset, inclusive.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last byte offset, inclusive.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered; never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self, total_length: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total_length)
    }
}

/// Outcome of negotiating a `Range` header against an entity length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// Send the full entity with 200.
    NoRange,
    /// Send exactly this interval with 206.
    Single(ByteRange),
    /// Answer 416 with `Content-Range: bytes */{total}`.
    Unsatisfiable,
}

impl RangeRequest {
    /// Parses a raw `Range` header value against `total_length`.
    ///
    /// Handles `bytes=start-end`, `bytes=start-` and `bytes=-suffix`. An
    /// omitted or overlong end is clamped to the last byte; a start at or
    /// past the end of the entity is never clamped.
    ///
    /// # Examples
    /// ```
    /// use reel_core::streaming::{ByteRange, RangeRequest};
    ///
    /// assert_eq!(
    ///     RangeRequest::parse(Some("bytes=900-2000"), 1000),
    ///     RangeRequest::Single(ByteRange::new(900, 999, 1000).unwrap())
    /// );
    /// assert_eq!(RangeRequest::parse(Some("bytes=1000-"), 1000), RangeRequest::Unsatisfiable);
    /// assert_eq!(RangeRequest::parse(None, 1000), RangeRequest::NoRange);
    /// ```
    pub fn parse(header: Option<&str>, total_length: u64) -> Self {
        let Some(raw) = header else {
            return RangeRequest::NoRange;
        };

        let Some((unit, range_set)) = raw.trim().split_once('=') else {
            return RangeRequest::Unsatisfiable;
        };
        if !unit.trim().eq_ignore_ascii_case("bytes") {
            return RangeRequest::Unsatisfiable;
        }
        if range_set.contains(',') {
            return RangeRequest::NoRange;
        }

        let Some((first, last)) = range_set.trim().split_once('-') else {
            return RangeRequest::Unsatisfiable;
        };
        let (first, last) = (first.trim(), last.trim());

        let Some(last_byte) = total_length.checked_sub(1) else {
            return RangeRequest::Unsatisfiable;
        };

        let interval = match (first.is_empty(), last.is_empty()) {
            (true, true) => None,
            (true, false) => parse_bound(last)
                .filter(|&suffix| suffix > 0)
                .map(|suffix| (total_length.saturating_sub(suffix), last_byte)),
            (false, true) => parse_bound(first).map(|start| (start, last_byte)),
            (false, false) => match (parse_bound(first), parse_bound(last)) {
                (Some(start), Some(end)) if start <= end => Some((start, end.min(last_byte))),
                _ => None,
            },
        };

        interval
            .and_then(|(start, end)| ByteRange::new(start, end, total_length))
            .map_or(RangeRequest::Unsatisfiable, RangeRequest::Single)
    }
}

/// Parses an unsigned decimal bound; values past `u64::MAX` saturate.
fn parse_bound(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(text.parse::<u64>().unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn single(start: u64, end: u64, total: u64) -> RangeRequest {
        RangeRequest::Single(ByteRange::new(start, end, total).unwrap())
    }

    #[test]
    fn test_parse_closed_range() {
        assert_eq!(
            RangeRequest::parse(Some("bytes=200-299"), 1000),
            single(200, 299, 1000)
        );
    }

    #[test]
    fn test_parse_open_end() {
        assert_eq!(
            RangeRequest::parse(Some("bytes=500-"), 1000),
            single(500, 999, 1000)
        );
    }

    #[test]
    fn test_overlong_end_is_clamped() {
        let parsed = RangeRequest::parse(Some("bytes=900-2000"), 1000);
        assert_eq!(parsed, single(900, 999, 1000));

        let huge = RangeRequest::parse(Some("bytes=0-99999999999999999999999"), 1000);
        assert_eq!(huge, single(0, 999, 1000));
    }

    #[test]
    fn test_suffix_ranges() {
        assert_eq!(
            RangeRequest::parse(Some("bytes=-100"), 1000),
            single(900, 999, 1000)
        );
        // Suffix longer than the entity yields the whole entity
        assert_eq!(RangeRequest::parse(Some("bytes=-10"), 5), single(0, 4, 5));
        assert_eq!(
            RangeRequest::parse(Some("bytes=-0"), 1000),
            RangeRequest::Unsatisfiable
        );
    }

    #[test]
    fn test_start_at_or_past_eof_is_unsatisfiable() {
        assert_eq!(
            RangeRequest::parse(Some("bytes=1000-"), 1000),
            RangeRequest::Unsatisfiable
        );
        assert_eq!(
            RangeRequest::parse(Some("bytes=1500-1600"), 1000),
            RangeRequest::Unsatisfiable
        );
        assert_eq!(
            RangeRequest::parse(Some("bytes=999-"), 1000),
            single(999, 999, 1000)
        );
    }

    #[test]
    fn test_malformed_headers_are_unsatisfiable() {
        for header in [
            "",
            "bytes",
            "bytes=",
            "bytes=-",
            "bytes=abc-def",
            "bytes=10",
            "bytes=+5-10",
            "bytes=-5-10",
            "bytes=300-200",
            "items=0-10",
            "bytes=1.5-2",
        ] {
            assert_eq!(
                RangeRequest::parse(Some(header), 1000),
                RangeRequest::Unsatisfiable,
                "header {header:?}"
            );
        }
    }

    #[test]
    fn test_multiple_ranges_degrade_to_full_content() {
        assert_eq!(
            RangeRequest::parse(Some("bytes=0-99,200-299"), 1000),
            RangeRequest::NoRange
        );
    }

    #[test]
    fn test_whitespace_and_unit_case_tolerated() {
        assert_eq!(
            RangeRequest::parse(Some("  Bytes = 10 - 19 "), 1000),
            single(10, 19, 1000)
        );
    }

    #[test]
    fn test_empty_entity_cannot_satisfy_any_range() {
        assert_eq!(
            RangeRequest::parse(Some("bytes=0-"), 0),
            RangeRequest::Unsatisfiable
        );
        assert_eq!(
            RangeRequest::parse(Some("bytes=-10"), 0),
            RangeRequest::Unsatisfiable
        );
        assert_eq!(RangeRequest::parse(None, 0), RangeRequest::NoRange);
    }

    #[test]
    fn test_byte_range_helpers() {
        let range = ByteRange::new(200, 299, 1000).unwrap();
        assert_eq!(range.len(), 100);
        assert_eq!(range.content_range(1000), "bytes 200-299/1000");
        assert_eq!(ByteRange::full(1000), ByteRange::new(0, 999, 1000));
        assert_eq!(ByteRange::full(0), None);
        assert_eq!(ByteRange::new(5, 4, 1000), None);
    }

    proptest! {
        #[test]
        fn prop_valid_closed_ranges_round_trip(
            total in 1u64..10_000_000,
            a in 0u64..10_000_000,
            b in 0u64..10_000_000,
        ) {
            let start = a % total;
            let end = start + (b % (total - start));
            let header = format!("bytes={start}-{end}");

            let parsed = RangeRequest::parse(Some(&header), total);
            let range = match parsed {
                RangeRequest::Single(range) => range,
                other => return Err(TestCaseError::fail(format!("{header} -> {other:?}"))),
            };
            prop_assert_eq!(range.start(), start);
            prop_assert_eq!(range.end(), end);
            prop_assert_eq!(range.len(), end - start + 1);
        }

        #[test]
        fn prop_parsed_ranges_always_fit(header in "bytes=[0-9]{0,6}-[0-9]{0,6}", total in 0u64..1_000_000) {
            if let RangeRequest::Single(range) = RangeRequest::parse(Some(&header), total) {
                prop_assert!(range.start() <= range.end());
                prop_assert!(range.end() < total);
            }
        }
    }
}
