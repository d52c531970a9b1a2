use corvid_core::Severity;

#[test]
fn fail_on_passes_when_no_finding_meets_threshold() {
    // Only medium/low findings, threshold is critical
    let findings = vec![Severity::Medium, Severity::Low];
    let threshold = Severity::Critical;

    let blocking = findings.iter().any(|s| s.meets_threshold(threshold));
    assert!(!blocking, "should not gate when nothing reaches critical");
}

#[test]
fn fail_on_blocks_when_finding_meets_threshold() {
    // Critical finding present, threshold is high
    let findings = vec![Severity::Critical, Severity::Low];
    let threshold = Severity::High;

    let blocking = findings.iter().any(|s| s.meets_threshold(threshold));
    assert!(blocking, "critical finding must gate a high threshold");
}

#[test]
fn fail_on_high_catches_critical_and_high() {
    let threshold = Severity::High;

    assert!(Severity::Critical.meets_threshold(threshold));
    assert!(Severity::High.meets_threshold(threshold));
    assert!(!Severity::Medium.meets_threshold(threshold));
    assert!(!Severity::Low.meets_threshold(threshold));
}

#[test]
fn fail_on_threshold_parses_from_cli_style_strings() {
    let threshold: Severity = "high".parse().unwrap();
    assert_eq!(threshold, Severity::High);
    assert!("blocker".parse::<Severity>().is_err());
}
