use chrono::NaiveDate;
use ingest_core::DateInterval;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn both_ends_are_kept() {
    let interval = DateInterval::resolve(
        Some(date("2024-04-01")),
        Some(date("2024-05-30")),
        30,
        date("2024-08-09"),
    );
    assert_eq!(interval.start, date("2024-04-01"));
    assert_eq!(interval.stop, date("2024-05-30"));
}

#[test]
fn missing_ends_are_derived_from_the_span() {
    let today = date("2024-08-09");
    let neither = DateInterval::resolve(None, None, 30, today);
    assert_eq!((neither.start, neither.stop), (date("2024-07-10"), today));

    let only_stop = DateInterval::resolve(None, Some(date("2024-06-15")), 21, today);
    assert_eq!(only_stop.start, date("2024-05-25"));

    let only_start = DateInterval::resolve(Some(date("2024-06-15")), None, 21, today);
    assert_eq!(only_start.stop, date("2024-07-06"));
}

#[test]
fn predicate_quotes_iso_dates() {
    let interval = DateInterval {
        start: date("2024-07-10"),
        stop: date("2024-08-09"),
    };
    assert_eq!(
        interval.between_predicate("created_date"),
        "created_date between '2024-07-10' and '2024-08-09'"
    );
}
