//! End-to-end scenarios over the full pipeline
//!
//! Each scenario is a literal YAML questionnaire with pinned expectations
//! for every verdict the report carries.

use canvass_core::{Analyzer, CanvassError, GlobalVerdict, ItemErrorKind, Report};

fn analyze(yaml: &str) -> Report {
    match Analyzer::default().analyze_str(yaml) {
        Ok(outcome) => Report::from_outcome(&outcome),
        Err(error) => Report::from_structural(&error),
    }
}

fn item<'a>(report: &'a Report, id: &str) -> &'a canvass_core::pipeline::ItemReport {
    report
        .items
        .iter()
        .find(|i| i.id == id)
        .unwrap_or_else(|| panic!("item {} missing from report", id))
}

// S1: basic linear survey, no predicates
#[test]
fn s1_basic_linear_survey() {
    let report = analyze(
        r#"
qmlVersion: "1.0"
questionnaire:
  title: Basic survey
  blocks:
    - id: main
      title: Main
      items:
        - id: q_age
          kind: Question
          title: Your age
          input: { control: Editbox, min: 0, max: 120 }
        - id: q_gender
          kind: Question
          title: Gender
          input:
            control: RadioButton
            options:
              - { value: 1, label: female }
              - { value: 2, label: male }
              - { value: 3, label: other }
        - id: c_thanks
          kind: Comment
          title: Thank you!
"#,
    );

    assert!(report.valid);
    assert_eq!(report.cycle, None);
    assert_eq!(report.items.len(), 3);
    for entry in &report.items {
        assert_eq!(entry.reach.as_deref(), Some("ALWAYS"));
        assert_eq!(entry.post.as_deref(), Some("NONE"));
        assert!(!entry.dead);
        assert!(entry.errors.is_empty());
    }
    assert_eq!(report.global.verdict, GlobalVerdict::Valid);
    assert_eq!(report.exit_code(), 0);
}

// S2: conflicting postconditions over a shared variable
#[test]
fn s2_conflicting_postconditions() {
    let report = analyze(
        r#"
questionnaire:
  title: Conflict
  blocks:
    - id: main
      items:
        - id: q_rating
          kind: Question
          input: { control: Editbox, min: 0, max: 100 }
        - id: q_one
          kind: Question
          input: { control: Editbox, min: 0, max: 100 }
          postcondition:
            - { predicate: "q_rating.outcome > 50" }
        - id: q_two
          kind: Question
          input: { control: Editbox, min: 0, max: 100 }
          postcondition:
            - { predicate: "q_rating.outcome < 30" }
"#,
    );

    assert_eq!(item(&report, "q_one").post.as_deref(), Some("CONSTRAINING"));
    assert_eq!(item(&report, "q_two").post.as_deref(), Some("CONSTRAINING"));

    assert_eq!(report.global.verdict, GlobalVerdict::Inconsistent);
    assert_eq!(
        report.global.conflict,
        Some(vec!["q_one".to_string(), "q_two".to_string()])
    );

    // Accumulated constraints kill the later of the two
    assert!(!item(&report, "q_one").dead);
    assert!(item(&report, "q_two").dead);
    assert!(!report.valid);
}

// S3: accumulated dead code (the income example)
#[test]
fn s3_accumulated_dead_code() {
    let report = analyze(
        r#"
questionnaire:
  title: Income
  blocks:
    - id: main
      items:
        - id: q_income
          kind: Question
          input: { control: Editbox, min: 0, max: 10000000 }
          postcondition:
            - { predicate: "q_income.outcome >= 50000" }
        - id: q_assistance
          kind: Question
          input: { control: Editbox, min: 0, max: 10 }
          precondition:
            - { predicate: "q_income.outcome < 30000" }
"#,
    );

    let assistance = item(&report, "q_assistance");
    assert_eq!(assistance.reach.as_deref(), Some("CONDITIONAL"));
    assert_eq!(assistance.post.as_deref(), Some("NONE"));
    assert!(assistance.dead);

    assert_eq!(report.global.verdict, GlobalVerdict::Valid);
    assert_eq!(report.exit_code(), 3);
}

// S4: driving experience, constraining but satisfiable
#[test]
fn s4_driving_experience() {
    let report = analyze(
        r#"
questionnaire:
  title: Driving
  blocks:
    - id: main
      items:
        - id: q_age
          kind: Question
          input: { control: Editbox, min: 0, max: 120 }
        - id: q_experience
          kind: Question
          input: { control: Editbox, min: 0, max: 120 }
          precondition:
            - { predicate: "q_age.outcome >= 16" }
          postcondition:
            - { predicate: "q_experience.outcome <= q_age.outcome - 16" }
"#,
    );

    let experience = item(&report, "q_experience");
    assert_eq!(experience.reach.as_deref(), Some("CONDITIONAL"));
    assert_eq!(experience.post.as_deref(), Some("CONSTRAINING"));
    assert!(!experience.dead);

    assert_eq!(report.global.verdict, GlobalVerdict::Valid);

    // The global witness satisfies domain and implication
    let witness = report
        .items
        .iter()
        .find(|i| i.id == "q_experience")
        .and_then(|i| i.witness.as_ref())
        .expect("witness for constraining item");
    let age = witness["q_age"].as_i64().unwrap();
    let exp = witness["q_experience"].as_i64().unwrap();
    assert!((0..=120).contains(&age));
    assert!(age >= 16);
    assert!(exp <= age - 16);

    assert_eq!(report.exit_code(), 0);
}

// S5: dependency cycle
#[test]
fn s5_cycle() {
    let result = Analyzer::default().analyze_str(
        r#"
questionnaire:
  title: Cycle
  blocks:
    - id: main
      items:
        - id: a
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "c.outcome > 1" } ]
        - id: b
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "a.outcome > 1" } ]
        - id: c
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "b.outcome > 1" } ]
"#,
    );

    let error = result.expect_err("cycle must abort the analysis");
    match &error {
        CanvassError::CycleDetected(path) => {
            assert_eq!(path.len(), 4);
            assert_eq!(path.first(), path.last());
            for id in ["a", "b", "c"] {
                assert!(path.contains(&id.to_string()), "path misses {}", id);
            }
        }
        other => panic!("expected CycleDetected, got {:?}", other),
    }

    let report = Report::from_structural(&error);
    assert!(report.items.is_empty());
    assert_eq!(report.exit_code(), 2);
}

// S6: malformed predicate stays local to its item
#[test]
fn s6_malformed_predicate_is_local() {
    let report = analyze(
        r#"
questionnaire:
  title: Local failure
  blocks:
    - id: main
      items:
        - id: q_first
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
        - id: q_bad
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition:
            - { predicate: "undefined_function(q_first.outcome)" }
        - id: q_after
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition:
            - { predicate: "q_first.outcome > 3" }
"#,
    );

    let bad = item(&report, "q_bad");
    assert_eq!(bad.reach, None);
    assert_eq!(bad.post, None);
    assert_eq!(bad.errors.len(), 1);
    assert_eq!(bad.errors[0].kind, ItemErrorKind::UnknownFunction);

    // Neighbors unaffected; global computed ignoring the failed item
    assert_eq!(item(&report, "q_first").reach.as_deref(), Some("ALWAYS"));
    assert_eq!(
        item(&report, "q_after").reach.as_deref(),
        Some("CONDITIONAL")
    );
    assert_eq!(report.global.verdict, GlobalVerdict::Valid);
    assert_eq!(report.exit_code(), 1);
}
