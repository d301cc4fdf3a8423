use thiserror::Error;

/// Parameters of a single page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

impl PageRequest {
    /// Socrata query pairs for this page, in a fixed order.
    pub fn query_pairs(&self) -> [(&'static str, String); 2] {
        [
            ("$limit", self.limit.to_string()),
            ("$offset", self.offset.to_string()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorState {
    pub offset: u64,
    pub limit: u64,
    pub max_offset: u64,
    pub exhausted: bool,
}

/// Which rule ended the pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The last page held fewer items than the limit.
    ShortPage { item_count: usize },
    /// The offset reached the configured ceiling.
    MaxOffset,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("page limit must be positive")]
    ZeroLimit,
    #[error("maximum offset must be positive")]
    ZeroMaxOffset,
}

/// Offset pagination over an endpoint that never reports a total count.
///
/// The cursor stops on a short page or once the offset reaches `max_offset`.
/// `max_offset` should be the best known upper bound on the resource's row
/// count; anything beyond it is not fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    state: CursorState,
    stop_reason: Option<StopReason>,
}

impl PaginationCursor {
    pub fn new(limit: u64, max_offset: u64) -> Result<Self, CursorError> {
        Self::starting_at(0, limit, max_offset)
    }

    /// Starts at `offset` instead of zero. A start at or past the ceiling is
    /// exhausted before the first request.
    pub fn starting_at(offset: u64, limit: u64, max_offset: u64) -> Result<Self, CursorError> {
        if limit == 0 {
            return Err(CursorError::ZeroLimit);
        }
        if max_offset == 0 {
            return Err(CursorError::ZeroMaxOffset);
        }
        let exhausted = offset >= max_offset;
        Ok(Self {
            state: CursorState {
                offset,
                limit,
                max_offset,
                exhausted,
            },
            stop_reason: exhausted.then_some(StopReason::MaxOffset),
        })
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.exhausted
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// The request for the next page, or `None` once exhausted.
    pub fn next_request(&self) -> Option<PageRequest> {
        (!self.state.exhausted).then_some(PageRequest {
            offset: self.state.offset,
            limit: self.state.limit,
        })
    }

    /// Records the item count of the page just fetched and moves to the next
    /// offset. Calling this on an exhausted cursor changes nothing.
    pub fn advance(&mut self, item_count: usize) -> CursorState {
        if self.state.exhausted {
            return self.state;
        }

        self.state.offset = self.state.offset.saturating_add(self.state.limit);

        // A short page wins when both rules fire: nothing was left unfetched.
        if (item_count as u64) < self.state.limit {
            self.state.exhausted = true;
            self.stop_reason = Some(StopReason::ShortPage { item_count });
        } else if self.state.offset >= self.state.max_offset {
            self.state.exhausted = true;
            self.stop_reason = Some(StopReason::MaxOffset);
        }

        self.state
    }
}
