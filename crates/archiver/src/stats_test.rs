//! Tests for the mark/reset counter

use super::*;

#[test]
fn test_mark_and_reset() {
    let c = Counter::new();
    c.mark();
    c.mark();
    c.mark_n(3);
    assert_eq!(c.current(), 5);
    assert_eq!(c.reset(), 5);
    assert_eq!(c.current(), 0);
    assert_eq!(c.last(), 5);
}

#[test]
fn test_reset_remembers_only_latest_interval() {
    let c = Counter::new();
    c.mark_n(7);
    c.reset();
    c.mark_n(2);
    assert_eq!(c.reset(), 2);
    assert_eq!(c.last(), 2);
}
