// src/download/resume.rs
// =============================================================================
// Works out where an interrupted download picks up again.
//
// The remote site serves items in fixed-size pages. Given how many items the
// gallery has and how many images are already on disk, the plan says which
// page to start at and how many entries of that page to skip.
//
// Example (page size 40, 83 items, 45 on disk):
//   start page 1, skip 5 -> page 1 from its 6th entry, then page 2
//
// Progress is inferred from the *count* of local files. A hole left in an
// earlier page by a failed item is invisible here; the verifier reports it.
// =============================================================================

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePlan {
    /// First page (0-based) that still has missing items
    pub start_page_index: usize,
    /// Entries at the front of the start page that are already on disk
    pub skip_count_on_first_page: usize,
    /// Nothing left to download; the other fields are zero
    pub already_complete: bool,
}

impl ResumePlan {
    fn complete() -> Self {
        Self {
            start_page_index: 0,
            skip_count_on_first_page: 0,
            already_complete: true,
        }
    }
}

// Computes the resume point.
//
// More local files than the gallery has items means the directory does not
// belong to this gallery state; that is reported, never clamped.
//
// `page_size` is validated to be non-zero at startup.
pub fn plan(total_item_count: usize, local_item_count: usize, page_size: usize) -> Result<ResumePlan, SessionError> {
    if local_item_count > total_item_count {
        return Err(SessionError::CorruptedResume {
            local: local_item_count,
            total: total_item_count,
        });
    }
    if local_item_count == total_item_count {
        return Ok(ResumePlan::complete());
    }

    let start_page_index = local_item_count / page_size;
    Ok(ResumePlan {
        start_page_index,
        skip_count_on_first_page: local_item_count - page_size * start_page_index,
        already_complete: false,
    })
}

/// Number of index pages a gallery spans (exclusive upper bound for paging).
pub fn page_count(total_item_count: usize, page_size: usize) -> usize {
    total_item_count.div_ceil(page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_mid_page() {
        let plan = plan(83, 45, 40).unwrap();
        assert_eq!(plan.start_page_index, 1);
        assert_eq!(plan.skip_count_on_first_page, 5);
        assert!(!plan.already_complete);
        assert_eq!(page_count(83, 40), 3);
    }

    #[test]
    fn test_fresh_start() {
        let plan = plan(83, 0, 40).unwrap();
        assert_eq!(plan.start_page_index, 0);
        assert_eq!(plan.skip_count_on_first_page, 0);
        assert!(!plan.already_complete);
    }

    #[test]
    fn test_resume_on_page_boundary() {
        let plan = plan(83, 80, 40).unwrap();
        assert_eq!(plan.start_page_index, 2);
        assert_eq!(plan.skip_count_on_first_page, 0);
    }

    #[test]
    fn test_complete_when_counts_match() {
        for n in [0, 1, 39, 40, 41, 500] {
            assert!(plan(n, n, 40).unwrap().already_complete);
        }
    }

    #[test]
    fn test_more_local_than_total_is_corrupted() {
        for n in [0, 1, 40, 83] {
            let err = plan(n, n + 1, 40).unwrap_err();
            assert!(matches!(
                err,
                SessionError::CorruptedResume { local, total } if local == n + 1 && total == n
            ));
        }
    }

    #[test]
    fn test_plan_accounts_for_every_local_item() {
        for page_size in [1, 3, 40] {
            for total in 0..=90 {
                for local in 0..=total {
                    let p = plan(total, local, page_size).unwrap();
                    if p.already_complete {
                        assert_eq!(local, total);
                        continue;
                    }
                    assert_eq!(p.start_page_index * page_size + p.skip_count_on_first_page, local);
                    assert!(p.skip_count_on_first_page < page_size);
                    assert!(p.start_page_index < page_count(total, page_size));
                }
            }
        }
    }
}
