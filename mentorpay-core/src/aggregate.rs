//! Session/Payout Aggregator — pure functions over in-memory collections.
//!
//! Everything here is recomputed from scratch on each refresh; no function
//! performs I/O or mutates its inputs. Amounts are `rust_decimal::Decimal`
//! and currency results are rounded to two places, half-up, to match what
//! the backend displays.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

use crate::models::{Payment, PaymentStatus, Session, SessionStatus};

// ============================================================================
// Payout derivation
// ============================================================================

/// Sessions payable for one mentor: APPROVED and belonging to `mentor_id`.
/// Input order is preserved; applying the filter to its own output is a
/// no-op.
pub fn payable_sessions(sessions: &[Session], mentor_id: i64) -> Vec<&Session> {
    sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Approved && s.mentor.id == mentor_id)
        .collect()
}

/// Sum of `finalPayoutAmount` across sessions, missing values counted as 0,
/// rounded to 2 decimal places half-up.
pub fn compute_payout_total<'a, I>(sessions: I) -> Decimal
where
    I: IntoIterator<Item = &'a Session>,
{
    let total = sessions
        .into_iter()
        .map(|s| s.final_payout_amount.unwrap_or(Decimal::ZERO))
        .fold(Decimal::ZERO, |acc, v| acc + v);
    let mut total = total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    // Currency display always carries two places
    total.rescale(2);
    total
}

// ============================================================================
// Reporting aggregates
// ============================================================================

/// One trailing calendar-month bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    pub label: String,
    pub count: usize,
    pub total: Decimal,
}

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn month_label(year: i32, month: u32) -> String {
    format!("{} {}", MONTH_NAMES[(month - 1) as usize], year)
}

/// The trailing `month_count` calendar months ending at the month of `now`,
/// oldest first. Bucketing is by `(year, month)` equality on the record's
/// date; records outside the window (or with no date) are excluded, not
/// clipped. Not a rolling 30-day window.
pub fn monthly_buckets<T, D, A>(
    records: &[T],
    date_of: D,
    amount_of: A,
    month_count: usize,
    now: NaiveDate,
) -> Vec<MonthBucket>
where
    D: Fn(&T) -> Option<NaiveDateTime>,
    A: Fn(&T) -> Decimal,
{
    let mut months: Vec<(i32, u32)> = Vec::with_capacity(month_count);
    let (mut year, mut month) = (now.year(), now.month());
    for _ in 0..month_count {
        months.push((year, month));
        if month == 1 {
            year -= 1;
            month = 12;
        } else {
            month -= 1;
        }
    }
    months.reverse();

    let mut buckets: Vec<MonthBucket> = months
        .into_iter()
        .map(|(y, m)| MonthBucket {
            year: y,
            month: m,
            label: month_label(y, m),
            count: 0,
            total: Decimal::ZERO,
        })
        .collect();

    for record in records {
        let Some(date) = date_of(record) else {
            continue;
        };
        let key = (date.year(), date.month());
        if let Some(bucket) = buckets.iter_mut().find(|b| (b.year, b.month) == key) {
            bucket.count += 1;
            bucket.total += amount_of(record);
        }
    }

    buckets
}

/// Tax/fee split across a payment collection. Absent fields count as 0;
/// authoritative values come from the backend fields only.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeBreakdown {
    pub total_gst: Decimal,
    pub total_platform_fee: Decimal,
    pub net_total: Decimal,
}

pub fn fee_breakdown(payments: &[Payment]) -> FeeBreakdown {
    let mut gross = Decimal::ZERO;
    let mut gst = Decimal::ZERO;
    let mut fee = Decimal::ZERO;
    for p in payments {
        gross += p.total_amount;
        gst += p.gst_amount.unwrap_or(Decimal::ZERO);
        fee += p.platform_fee.unwrap_or(Decimal::ZERO);
    }
    FeeBreakdown {
        total_gst: gst,
        total_platform_fee: fee,
        net_total: gross - gst - fee,
    }
}

/// Per-mentor sum of COMPLETED payment totals, descending.
#[derive(Debug, Clone, PartialEq)]
pub struct TopEarner {
    pub mentor_id: i64,
    pub name: String,
    pub total: Decimal,
}

pub fn top_earners(payments: &[Payment], limit: usize) -> Vec<TopEarner> {
    let mut totals: HashMap<i64, (String, Decimal)> = HashMap::new();
    for p in payments {
        if p.status != PaymentStatus::Completed {
            continue;
        }
        let entry = totals
            .entry(p.mentor.id)
            .or_insert_with(|| (p.mentor.display_name().to_string(), Decimal::ZERO));
        entry.1 += p.total_amount;
    }

    let mut earners: Vec<TopEarner> = totals
        .into_iter()
        .map(|(mentor_id, (name, total))| TopEarner {
            mentor_id,
            name,
            total,
        })
        .collect();
    earners.sort_by(|a, b| b.total.cmp(&a.total).then(a.mentor_id.cmp(&b.mentor_id)));
    earners.truncate(limit);
    earners
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawDuration, UserRef};

    fn mentor(id: i64) -> UserRef {
        UserRef {
            id,
            username: Some(format!("mentor{}", id)),
            full_name: None,
        }
    }

    fn session(id: i64, mentor_id: i64, status: SessionStatus, payout: Option<&str>) -> Session {
        Session {
            id,
            mentor: mentor(mentor_id),
            session_type: "ONE_ON_ONE".to_string(),
            duration: RawDuration::Iso("PT60M".to_string()),
            hourly_rate: Decimal::from(1000),
            calculated_amount: None,
            platform_fee: None,
            gst_amount: None,
            deductions: None,
            final_payout_amount: payout.map(|p| p.parse().expect("test decimal")),
            session_date_time: None,
            status,
            notes: None,
        }
    }

    fn payment(
        id: i64,
        mentor_id: i64,
        status: PaymentStatus,
        total: &str,
        gst: Option<&str>,
        fee: Option<&str>,
        date: Option<&str>,
    ) -> Payment {
        Payment {
            id,
            mentor: mentor(mentor_id),
            sessions: None,
            total_amount: total.parse().expect("test decimal"),
            base_amount: None,
            gst_amount: gst.map(|g| g.parse().expect("test decimal")),
            gst_rate: None,
            platform_fee: fee.map(|f| f.parse().expect("test decimal")),
            platform_fee_rate: None,
            other_deductions: None,
            payment_date: date.map(|d| {
                format!("{}T09:00:00", d)
                    .parse()
                    .expect("test timestamp")
            }),
            transaction_id: None,
            status,
            receipt_url: None,
            receipt_sent: false,
            notes: None,
        }
    }

    // ========================================================================
    // TEST: payable_sessions filters exactly and is idempotent
    // ========================================================================
    #[test]
    fn test_payable_sessions_exact_subset() {
        let sessions = vec![
            session(1, 7, SessionStatus::Approved, Some("500")),
            session(2, 7, SessionStatus::Pending, Some("100")),
            session(3, 8, SessionStatus::Approved, Some("200")),
            session(4, 7, SessionStatus::Paid, Some("300")),
            session(5, 7, SessionStatus::Approved, Some("750")),
        ];

        let payable = payable_sessions(&sessions, 7);
        let ids: Vec<i64> = payable.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 5]);

        // Re-applying the filter to its own output changes nothing
        let owned: Vec<Session> = payable.into_iter().cloned().collect();
        let again: Vec<i64> = payable_sessions(&owned, 7).iter().map(|s| s.id).collect();
        assert_eq!(again, ids);
    }

    // ========================================================================
    // TEST: compute_payout_total — additivity, empty, missing amounts
    // ========================================================================
    #[test]
    fn test_payout_total_additive() {
        let a = vec![
            session(1, 7, SessionStatus::Approved, Some("500")),
            session(2, 7, SessionStatus::Approved, Some("750")),
        ];
        let b = vec![session(3, 7, SessionStatus::Approved, Some("250"))];

        let total_a = compute_payout_total(&a);
        let total_b = compute_payout_total(&b);
        let union: Vec<Session> = a.iter().chain(b.iter()).cloned().collect();
        assert_eq!(compute_payout_total(&union), total_a + total_b);
        assert_eq!(compute_payout_total(&union).to_string(), "1500.00");
    }

    #[test]
    fn test_payout_total_empty_and_missing() {
        assert_eq!(compute_payout_total(&Vec::<Session>::new()), Decimal::ZERO);

        let with_missing = vec![
            session(1, 7, SessionStatus::Approved, Some("500")),
            session(2, 7, SessionStatus::Approved, None),
        ];
        assert_eq!(compute_payout_total(&with_missing).to_string(), "500.00");
    }

    #[test]
    fn test_payout_total_rounds_half_up() {
        let s = vec![
            session(1, 7, SessionStatus::Approved, Some("333.335")),
            session(2, 7, SessionStatus::Approved, Some("0.01")),
        ];
        assert_eq!(compute_payout_total(&s).to_string(), "333.35");
    }

    // ========================================================================
    // TEST: monthly buckets — trailing 6 calendar months run "in July 2024"
    // ========================================================================
    #[test]
    fn test_monthly_buckets_feb_to_jul() {
        let payments = vec![
            payment(1, 7, PaymentStatus::Completed, "100", None, None, Some("2024-01-15")),
            payment(2, 7, PaymentStatus::Completed, "200", None, None, Some("2024-02-01")),
            payment(3, 7, PaymentStatus::Completed, "300", None, None, Some("2024-07-31")),
            payment(4, 7, PaymentStatus::Completed, "400", None, None, None),
        ];

        let now = NaiveDate::from_ymd_opt(2024, 7, 10).expect("valid date");
        let buckets = monthly_buckets(
            &payments,
            |p| p.payment_date,
            |p| p.total_amount,
            6,
            now,
        );

        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Feb 2024", "Mar 2024", "Apr 2024", "May 2024", "Jun 2024", "Jul 2024"]
        );

        // January record and the undated record are excluded entirely
        assert_eq!(buckets[0].count, 1);
        assert_eq!(buckets[0].total, Decimal::from(200));
        assert_eq!(buckets[5].count, 1);
        assert_eq!(buckets[5].total, Decimal::from(300));
        assert_eq!(buckets.iter().map(|b| b.count).sum::<usize>(), 2);
    }

    #[test]
    fn test_monthly_buckets_cross_year_window() {
        let now = NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid date");
        let buckets = monthly_buckets::<Payment, _, _>(&[], |p| p.payment_date, |p| p.total_amount, 6, now);
        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Sep 2023", "Oct 2023", "Nov 2023", "Dec 2023", "Jan 2024", "Feb 2024"]
        );
    }

    // ========================================================================
    // TEST: fee breakdown treats absent fields as zero
    // ========================================================================
    #[test]
    fn test_fee_breakdown() {
        let payments = vec![
            payment(1, 7, PaymentStatus::Completed, "1500", Some("270"), Some("75"), None),
            payment(2, 8, PaymentStatus::Pending, "500", None, None, None),
        ];
        let b = fee_breakdown(&payments);
        assert_eq!(b.total_gst, Decimal::from(270));
        assert_eq!(b.total_platform_fee, Decimal::from(75));
        assert_eq!(b.net_total, Decimal::from(1655));
    }

    // ========================================================================
    // TEST: top earners — completed only, descending
    // ========================================================================
    #[test]
    fn test_top_earners() {
        let payments = vec![
            payment(1, 7, PaymentStatus::Completed, "1000", None, None, None),
            payment(2, 8, PaymentStatus::Completed, "2500", None, None, None),
            payment(3, 7, PaymentStatus::Completed, "600", None, None, None),
            payment(4, 9, PaymentStatus::Failed, "9999", None, None, None),
        ];
        let earners = top_earners(&payments, 2);
        assert_eq!(earners.len(), 2);
        assert_eq!(earners[0].mentor_id, 8);
        assert_eq!(earners[0].total, Decimal::from(2500));
        assert_eq!(earners[1].mentor_id, 7);
        assert_eq!(earners[1].total, Decimal::from(1600));
    }

    // ========================================================================
    // TEST: zero approved sessions yields 0, not an error
    // ========================================================================
    #[test]
    fn test_mentor_with_no_approved_sessions() {
        let sessions = vec![session(1, 7, SessionStatus::Pending, Some("500"))];
        let payable = payable_sessions(&sessions, 7);
        assert!(payable.is_empty());
        assert_eq!(compute_payout_total(payable), Decimal::ZERO);
    }
}
