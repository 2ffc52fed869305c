//! Solver and pipeline micro-benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use canvass_core::features::smt::domain::{Atom, Formula, LinExpr};
use canvass_core::features::smt::infrastructure::SolverContext;
use canvass_core::{AnalysisConfig, Analyzer, CancelFlag, SolverConfig};

fn bench_solver_chain(c: &mut Criterion) {
    // x0 < x1 < … < x19, all in [0, 100]
    let mut ctx = SolverContext::new(SolverConfig::default(), CancelFlag::new());
    for i in 0..20 {
        let var = LinExpr::var(format!("x{}", i));
        ctx.assert_formula(Formula::Atom(Atom::ge(&var, &LinExpr::constant(0))));
        ctx.assert_formula(Formula::Atom(Atom::le(&var, &LinExpr::constant(100))));
        if i > 0 {
            let prev = LinExpr::var(format!("x{}", i - 1));
            ctx.assert_formula(Formula::Atom(Atom::lt(&prev, &var)));
        }
    }
    c.bench_function("solver_ordered_chain_sat", |b| {
        b.iter(|| black_box(ctx.check()))
    });
}

fn bench_solver_unsat(c: &mut Criterion) {
    let mut ctx = SolverContext::new(SolverConfig::default(), CancelFlag::new());
    let x = LinExpr::var("x");
    ctx.assert_formula(Formula::Atom(Atom::ge(&x, &LinExpr::constant(50_000))));
    ctx.assert_formula(Formula::Atom(Atom::lt(&x, &LinExpr::constant(30_000))));
    c.bench_function("solver_conflict_unsat", |b| {
        b.iter(|| black_box(ctx.check()))
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let yaml = r#"
questionnaire:
  title: Bench
  blocks:
    - id: main
      items:
        - id: q_age
          kind: Question
          input: { control: Editbox, min: 0, max: 120 }
        - id: q_exp
          kind: Question
          input: { control: Editbox, min: 0, max: 120 }
          precondition: [ { predicate: "q_age.outcome >= 16" } ]
          postcondition: [ { predicate: "q_exp.outcome <= q_age.outcome - 16" } ]
        - id: q_assist
          kind: Question
          input: { control: Editbox, min: 0, max: 9 }
          precondition: [ { predicate: "q_age.outcome < 10" } ]
"#;
    let analyzer = Analyzer::new(AnalysisConfig::default());
    c.bench_function("pipeline_three_items", |b| {
        b.iter(|| black_box(analyzer.analyze_str(yaml).unwrap()))
    });
}

criterion_group!(benches, bench_solver_chain, bench_solver_unsat, bench_pipeline);
criterion_main!(benches);
